//! Draw-time state commit.
//!
//! [`prepare_draw`] turns the current [`BindingState`] into commands on the
//! recording list: vertex buffers, lazily applied viewport and scissor,
//! the pipeline for the state/target/program/layout combination, and every
//! uniform block and texture of the bound program.

use smallvec::SmallVec;

use crate::binding_state::{BindingState, MAX_VERTEX_BUFFERS};
use crate::error::{GraphicsError, Result, fatal};
use crate::frame::{FrameResource, RenderTarget};
use crate::hal::{CommandList, Device, TopologyType, VertexBufferView};
use crate::pipeline::PipelineCache;
use crate::program::Program;
use crate::resources::{ArenaLookup, ResourceArena};
use crate::shader::binding::BindingSlot;
use crate::texture::SamplerPool;
use crate::types::PrimitiveType;

pub(crate) struct DrawTargets<'a, D: Device> {
    pub device: &'a mut D,
    pub list: &'a mut D::CommandList,
    pub frame: &'a mut FrameResource<D>,
    pub target: &'a RenderTarget,
}

/// Records everything a draw depends on. Pipeline compilation failures and
/// scratch exhaustion are fatal.
pub(crate) fn prepare_draw<D: Device>(
    out: DrawTargets<'_, D>,
    arena: &ResourceArena,
    bindings: &mut BindingState,
    pipelines: &mut PipelineCache,
    samplers: &SamplerPool,
    primitive: PrimitiveType,
) -> Result<()> {
    let DrawTargets {
        device,
        list,
        frame,
        target,
    } = out;
    let program_handle = bindings.program.ok_or(GraphicsError::NoProgramBound)?;
    let program = arena.programs.lookup(program_handle, "program")?;

    bind_vertex_buffers(&*device, list, arena, bindings)?;

    if bindings.viewport_changed {
        list.set_viewport(&bindings.viewport);
        bindings.viewport_changed = false;
        bindings.scissor_changed = true;
    }
    if bindings.scissor_changed {
        list.set_scissor_rect(&bindings.effective_scissor());
        bindings.scissor_changed = false;
    }

    let topology_type = match primitive {
        PrimitiveType::Lines => TopologyType::Line,
        PrimitiveType::Triangles | PrimitiveType::TriangleStrip => TopologyType::Triangle,
    };
    let pipeline = pipelines
        .get_or_create(
            device,
            &bindings.pipeline_state,
            &target.pipeline_target(),
            program,
            topology_type,
            &bindings.vertex_layouts,
        )
        .unwrap_or_else(|err| fatal(&err));

    list.set_graphics_root_signature(program.root_signature());
    list.set_pipeline_state(pipeline);
    list.set_primitive_topology(primitive.topology());

    commit_uniforms(device, list, frame, arena, bindings, samplers, program);
    Ok(())
}

fn bind_vertex_buffers<D: Device>(
    device: &D,
    list: &mut D::CommandList,
    arena: &ResourceArena,
    bindings: &BindingState,
) -> Result<()> {
    let mut views: SmallVec<[VertexBufferView; MAX_VERTEX_BUFFERS]> = SmallVec::new();
    for (slot, (buffer, layout)) in bindings
        .vertex_buffers
        .iter()
        .zip(&bindings.vertex_layouts)
        .enumerate()
    {
        let (Some(buffer), Some(layout)) = (buffer, layout) else {
            continue;
        };
        let buffer = arena.vertex_buffers.lookup(*buffer, "vertex buffer")?;
        let Some(location) = buffer.gpu_address(device) else {
            log::warn!("Vertex buffer in slot {slot} has no data; skipped");
            continue;
        };
        views.resize(slot + 1, VertexBufferView::default());
        views[slot] = VertexBufferView {
            buffer_location: location,
            size_in_bytes: buffer.data_size(),
            stride_in_bytes: layout.stride,
        };
    }
    if !views.is_empty() {
        list.set_vertex_buffers(0, &views);
    }
    Ok(())
}

fn commit_uniforms<D: Device>(
    device: &mut D,
    list: &mut D::CommandList,
    frame: &mut FrameResource<D>,
    arena: &ResourceArena,
    bindings: &BindingState,
    samplers: &SamplerPool,
    program: &Program,
) {
    let table = program.bindings();
    for cell in table.iter() {
        match cell.slot {
            BindingSlot::UniformBuffer {
                data_offset,
                root_index,
                ..
            } => {
                let size = cell.res.block_size as usize;
                let block = frame
                    .scratch
                    .allocate_uniform_block(list, root_index, cell.res.block_size)
                    .unwrap_or_else(|err| fatal(&err));
                let start = data_offset as usize;
                block.data[..size].copy_from_slice(&program.uniform_data()[start..start + size]);
            }
            BindingSlot::Texture { unit, link_unit } => {
                let Some(handle) = bindings.textures.get(unit as usize).copied().flatten() else {
                    log::warn!("No texture bound to unit {unit} for '{}'", cell.res.name);
                    continue;
                };
                let Some(texture) = arena.textures.get(handle) else {
                    log::warn!("Texture bound to unit {unit} was deleted");
                    continue;
                };
                let Some(view) = texture.view() else {
                    log::warn!("Texture bound to unit {unit} has no data");
                    continue;
                };
                let Some(sampler) = samplers.gpu_descriptor(texture.sampler_index()) else {
                    log::warn!("Texture sampler {} does not exist", texture.sampler_index());
                    continue;
                };
                let root_index = table.texture_root_index(link_unit);
                frame
                    .scratch
                    .allocate_texture_binding(device, list, &view, root_index, sampler, root_index + 1)
                    .unwrap_or_else(|err| fatal(&err));
            }
        }
    }
}
