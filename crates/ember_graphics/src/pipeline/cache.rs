//! Pipeline Cache
//!
//! Pipelines are keyed by an order-sensitive 64-bit hash over everything
//! that selects one:
//!
//! 1. the full [`PipelineState`] bitfield,
//! 2. the render target's identity,
//! 3. the program's root signature,
//! 4. the topology class of the draw, and
//! 5. every bound vertex layout as `(slot, layout hash)`.
//!
//! A miss compiles synchronously and inserts; entries are never evicted.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use xxhash_rust::xxh3::Xxh3;

use crate::error::Result;
use crate::hal::{Device, GraphicsPipelineDesc, InputElement, RawPipeline, RawRootSignature, TopologyType};
use crate::pipeline::PipelineState;
use crate::program::Program;
use crate::vertex::BoundVertexLayout;

/// What a pipeline renders into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineTarget {
    /// Stable identity of the render target.
    pub id: u32,
    pub format: wgpu::TextureFormat,
    pub sample_count: u32,
}

#[derive(Debug, Default)]
pub struct PipelineCache {
    pipelines: FxHashMap<u64, RawPipeline>,
    compile_count: u64,
}

impl PipelineCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn pipeline_hash(
        state: &PipelineState,
        target: &PipelineTarget,
        root_signature: RawRootSignature,
        topology: TopologyType,
        layouts: &[Option<BoundVertexLayout>],
    ) -> u64 {
        let mut hasher = Xxh3::new();
        state.hash(&mut hasher);
        target.id.hash(&mut hasher);
        root_signature.hash(&mut hasher);
        topology.hash(&mut hasher);
        for (slot, layout) in layouts.iter().enumerate() {
            if let Some(layout) = layout {
                slot.hash(&mut hasher);
                layout.hash.hash(&mut hasher);
            }
        }
        hasher.finish()
    }

    /// Returns the cached pipeline for these inputs, compiling it on a miss.
    pub fn get_or_create<D: Device>(
        &mut self,
        device: &mut D,
        state: &PipelineState,
        target: &PipelineTarget,
        program: &Program,
        topology: TopologyType,
        layouts: &[Option<BoundVertexLayout>],
    ) -> Result<RawPipeline> {
        let hash = Self::pipeline_hash(state, target, program.root_signature(), topology, layouts);
        if let Some(&pipeline) = self.pipelines.get(&hash) {
            return Ok(pipeline);
        }

        let input_layout: SmallVec<[InputElement; 16]> = layouts
            .iter()
            .flatten()
            .flat_map(|layout| layout.elements.iter().copied())
            .collect();

        let pipeline = device.create_graphics_pipeline(&GraphicsPipelineDesc {
            root_signature: program.root_signature(),
            vertex_shader: program.vertex_bytecode(),
            fragment_shader: program.fragment_bytecode(),
            input_layout: &input_layout,
            rasterizer: state.rasterizer_desc(),
            blend: state.blend_desc(),
            depth_stencil: state.depth_stencil_desc(),
            topology_type: topology,
            render_target_format: target.format,
            sample_count: target.sample_count,
        })?;

        self.compile_count += 1;
        self.pipelines.insert(hash, pipeline);
        log::debug!(
            "Compiled pipeline {hash:#018x} ({} cached)",
            self.pipelines.len()
        );
        Ok(pipeline)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Number of compilations performed over the cache's lifetime.
    #[inline]
    #[must_use]
    pub fn compile_count(&self) -> u64 {
        self.compile_count
    }

    pub fn release<D: Device>(&mut self, device: &mut D) {
        for (_, pipeline) in self.pipelines.drain() {
            device.release_pipeline(pipeline);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::headless::HeadlessDevice;
    use crate::shader::{ResourceType, ShaderDataType, ShaderMeta, ShaderModule, ShaderResourceBinding, ShaderStage};
    use crate::types::{DataType, State};
    use crate::vertex::{VertexDeclaration, VertexStreamDeclaration};

    const TARGET: PipelineTarget = PipelineTarget {
        id: 0,
        format: wgpu::TextureFormat::Rgba8Unorm,
        sample_count: 1,
    };

    fn program(device: &mut HeadlessDevice) -> Program {
        let vs = ShaderMeta {
            inputs: vec![ShaderResourceBinding::new(
                "position",
                ResourceType::Data(ShaderDataType::Vec3),
                0,
                0,
            )],
            ..Default::default()
        };
        Program::link(
            device,
            &ShaderModule::new(ShaderStage::Vertex, b"vs", vs),
            &ShaderModule::new(ShaderStage::Fragment, b"fs", ShaderMeta::default()),
        )
        .unwrap()
    }

    fn layout(program: &Program, stride: Option<u32>) -> Option<BoundVertexLayout> {
        let mut decl = VertexStreamDeclaration::new();
        decl.add_stream("position", 3, DataType::Float, false);
        let decl = VertexDeclaration::new(&decl, stride).unwrap();
        Some(decl.bind(0, program.vertex_inputs()))
    }

    #[test]
    fn test_identical_inputs_hit() {
        let mut device = HeadlessDevice::new();
        let program = program(&mut device);
        let layouts = [layout(&program, None)];
        let state = PipelineState::default();
        let mut cache = PipelineCache::new();

        let a = cache
            .get_or_create(&mut device, &state, &TARGET, &program, TopologyType::Triangle, &layouts)
            .unwrap();
        let b = cache
            .get_or_create(&mut device, &state, &TARGET, &program, TopologyType::Triangle, &layouts)
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(cache.compile_count(), 1);
    }

    #[test]
    fn test_each_input_misses() {
        let mut device = HeadlessDevice::new();
        let program = program(&mut device);
        let layouts = [layout(&program, None)];
        let state = PipelineState::default();
        let base = PipelineCache::pipeline_hash(
            &state,
            &TARGET,
            program.root_signature(),
            TopologyType::Triangle,
            &layouts,
        );

        let mut blended = state;
        blended.set_state(State::Blend, true);
        let other_target = PipelineTarget { id: 1, ..TARGET };
        let other_program = self::program(&mut device);
        let wider = [layout(&program, Some(32))];

        for hash in [
            PipelineCache::pipeline_hash(&blended, &TARGET, program.root_signature(), TopologyType::Triangle, &layouts),
            PipelineCache::pipeline_hash(&state, &other_target, program.root_signature(), TopologyType::Triangle, &layouts),
            PipelineCache::pipeline_hash(&state, &TARGET, other_program.root_signature(), TopologyType::Triangle, &layouts),
            PipelineCache::pipeline_hash(&state, &TARGET, program.root_signature(), TopologyType::Line, &layouts),
            PipelineCache::pipeline_hash(&state, &TARGET, program.root_signature(), TopologyType::Triangle, &wider),
        ] {
            assert_ne!(hash, base);
        }
    }

    #[test]
    fn test_compile_failure_is_not_cached() {
        let mut device = HeadlessDevice::new();
        let controller = device.controller();
        let program = program(&mut device);
        let state = PipelineState::default();
        let mut cache = PipelineCache::new();

        controller.fail_next_pipeline("bad bytecode");
        assert!(
            cache
                .get_or_create(&mut device, &state, &TARGET, &program, TopologyType::Triangle, &[])
                .is_err()
        );
        assert!(cache.is_empty());
        assert!(
            cache
                .get_or_create(&mut device, &state, &TARGET, &program, TopologyType::Triangle, &[])
                .is_ok()
        );
    }
}
