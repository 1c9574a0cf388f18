//! Linked Programs
//!
//! A [`Program`] pairs a vertex and a fragment module, owns the merged
//! [`ResourceBindingTable`], the root signature derived from it and the
//! host-side uniform blob that `set_constant_*` writes into. The blob is
//! copied into scratch memory block by block on every draw.

use std::sync::Arc;

use ember_core::NameHash;
use glam::{Mat4, Vec4};

use crate::error::{GraphicsError, Result};
use crate::hal::{Device, RawRootSignature};
use crate::shader::binding::{BindingSlot, ResourceBindingTable, UniformInfo, UniformLocation};
use crate::shader::{ResourceType, ShaderMeta, ShaderModule, ShaderResourceBinding, ShaderStage};

/// A vertex attribute consumed by the program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributeInfo {
    pub name_hash: NameHash,
    pub ty: ResourceType,
    pub element_count: u32,
    pub location: u32,
}

#[derive(Debug)]
pub struct Program {
    vertex_bytecode: Arc<[u8]>,
    fragment_bytecode: Arc<[u8]>,
    vertex_meta: Arc<ShaderMeta>,
    bindings: ResourceBindingTable,
    root_signature: RawRootSignature,
    uniform_data: Vec<u8>,
}

impl Program {
    pub(crate) fn link<D: Device>(
        device: &mut D,
        vertex: &ShaderModule,
        fragment: &ShaderModule,
    ) -> Result<Self> {
        if vertex.stage != ShaderStage::Vertex || fragment.stage != ShaderStage::Fragment {
            return Err(GraphicsError::Unsupported(format!(
                "program from {:?} + {:?} modules",
                vertex.stage, fragment.stage
            )));
        }

        let bindings = ResourceBindingTable::build([
            (ShaderStage::Vertex, &vertex.meta),
            (ShaderStage::Fragment, &fragment.meta),
        ])?;
        let root_signature = device.create_root_signature(&bindings.root_signature_desc())?;
        log::debug!(
            "Linked program: {} uniform blocks ({} bytes), {} textures",
            bindings.uniform_buffer_count(),
            bindings.uniform_data_size(),
            bindings.texture_count()
        );

        Ok(Self {
            vertex_bytecode: Arc::clone(&vertex.bytecode),
            fragment_bytecode: Arc::clone(&fragment.bytecode),
            vertex_meta: Arc::clone(&vertex.meta),
            uniform_data: vec![0; bindings.uniform_data_size() as usize],
            bindings,
            root_signature,
        })
    }

    #[inline]
    #[must_use]
    pub fn bindings(&self) -> &ResourceBindingTable {
        &self.bindings
    }

    #[inline]
    #[must_use]
    pub fn root_signature(&self) -> RawRootSignature {
        self.root_signature
    }

    #[inline]
    #[must_use]
    pub fn vertex_bytecode(&self) -> &[u8] {
        &self.vertex_bytecode
    }

    #[inline]
    #[must_use]
    pub fn fragment_bytecode(&self) -> &[u8] {
        &self.fragment_bytecode
    }

    #[inline]
    #[must_use]
    pub fn vertex_inputs(&self) -> &[ShaderResourceBinding] {
        &self.vertex_meta.inputs
    }

    /// Host copy of the uniform blob.
    #[inline]
    #[must_use]
    pub fn uniform_data(&self) -> &[u8] {
        &self.uniform_data
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    #[must_use]
    pub fn attribute_count(&self) -> u32 {
        self.vertex_meta.inputs.len() as u32
    }

    #[must_use]
    pub fn attribute(&self, index: u32) -> Option<AttributeInfo> {
        self.vertex_meta.inputs.get(index as usize).map(|input| AttributeInfo {
            name_hash: input.name_hash,
            ty: input.ty,
            element_count: input.element_count,
            location: input.binding,
        })
    }

    #[must_use]
    pub fn uniform_count(&self) -> u32 {
        self.bindings.uniform_count()
    }

    #[must_use]
    pub fn uniform_info(&self, index: u32) -> Option<UniformInfo> {
        self.bindings.uniform_info(index)
    }

    #[must_use]
    pub fn uniform_location(&self, name: NameHash) -> UniformLocation {
        self.bindings.uniform_location(name)
    }

    // ── Uniform Writes ───────────────────────────────────────────────────────

    pub fn set_constant_v4(&mut self, location: UniformLocation, values: &[Vec4]) -> Result<()> {
        self.write_member(location, bytemuck::cast_slice(values))
    }

    pub fn set_constant_m4(&mut self, location: UniformLocation, values: &[Mat4]) -> Result<()> {
        self.write_member(location, bytemuck::cast_slice(values))
    }

    /// Points a texture binding at texture unit `unit`.
    pub fn set_sampler(&mut self, location: UniformLocation, unit: u32) -> Result<()> {
        match self.bindings.get_mut(location.set(), location.binding()) {
            Some(cell) => match &mut cell.slot {
                BindingSlot::Texture { unit: current, .. } => {
                    *current = unit;
                    Ok(())
                }
                BindingSlot::UniformBuffer { .. } => Err(GraphicsError::InvalidHandle("sampler location")),
            },
            None => Err(GraphicsError::InvalidHandle("sampler location")),
        }
    }

    /// Copies `bytes` to the member's offset, clipped to the end of its block.
    fn write_member(&mut self, location: UniformLocation, bytes: &[u8]) -> Result<()> {
        const INVALID: GraphicsError = GraphicsError::InvalidHandle("uniform location");
        if !location.is_valid() {
            return Err(INVALID);
        }
        let cell = self.bindings.get(location.set(), location.binding()).ok_or(INVALID)?;
        let BindingSlot::UniformBuffer { data_offset, .. } = cell.slot else {
            return Err(INVALID);
        };
        let member = cell
            .type_info()
            .and_then(|info| info.members.get(location.member() as usize))
            .ok_or(INVALID)?;

        let block_end = (data_offset + cell.res.block_size) as usize;
        let start = (data_offset + member.offset) as usize;
        let end = (start + bytes.len()).min(block_end);
        if start >= end {
            return Ok(());
        }
        self.uniform_data[start..end].copy_from_slice(&bytes[..end - start]);
        Ok(())
    }

    pub(crate) fn release<D: Device>(self, device: &mut D) {
        device.release_root_signature(self.root_signature);
    }
}
