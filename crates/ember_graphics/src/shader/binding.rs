//! Program Resource Binding Table
//!
//! Linking a program merges the reflection of its stages into a dense
//! `[set][binding]` table. Each populated cell records the resource, the
//! stages that reference it and its slot:
//!
//! - **Uniform blocks** get a byte offset into the program's flat uniform
//!   blob (blocks packed back to back) and one root CBV parameter.
//! - **Textures** get the next texture unit and a pair of descriptor-table
//!   parameters (SRV + sampler).
//! - **Storage buffers** are rejected.
//!
//! Root parameters are laid out at link time: every uniform block in table
//! order first, then one SRV/sampler pair per texture in link-unit order.
//!
//! ```text
//!   root index   0 .. ubo_count        │ ubo_count + 2u   │ ubo_count + 2u + 1
//!                root CBVs             │ SRV table (u)    │ sampler table (u)
//! ```

use std::sync::Arc;

use ember_core::NameHash;

use crate::error::{GraphicsError, Result};
use crate::hal::{DescriptorRangeKind, RootParameter, RootSignatureDesc, ShaderVisibility};
use crate::shader::{ResourceType, ResourceTypeInfo, ShaderMeta, ShaderResourceBinding, ShaderStage};

pub const MAX_SET_COUNT: usize = 4;
pub const MAX_BINDINGS_PER_SET: usize = 32;

// ─── Locations ───────────────────────────────────────────────────────────────

/// Opaque uniform handle packing `{set, binding, member}`.
///
/// Layout: bits 0..16 set, 16..32 binding, 32..64 member index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u64);

impl UniformLocation {
    pub const INVALID: Self = Self(u64::MAX);

    #[inline]
    #[must_use]
    pub const fn new(set: u32, binding: u32, member: u32) -> Self {
        Self((set as u64 & 0xffff) | ((binding as u64 & 0xffff) << 16) | ((member as u64) << 32))
    }

    #[inline]
    #[must_use]
    pub const fn set(self) -> u32 {
        (self.0 & 0xffff) as u32
    }

    #[inline]
    #[must_use]
    pub const fn binding(self) -> u32 {
        ((self.0 >> 16) & 0xffff) as u32
    }

    #[inline]
    #[must_use]
    pub const fn member(self) -> u32 {
        (self.0 >> 32) as u32
    }

    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }
}

// ─── Cells ───────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BindingFamily {
    Texture,
    UniformBuffer,
    StorageBuffer,
    Generic,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingSlot {
    Texture {
        /// Texture unit read at draw time; changed by `set_sampler`.
        unit: u32,
        /// Unit assigned at link time; fixes the root parameter pair.
        link_unit: u32,
    },
    UniformBuffer {
        data_offset: u32,
        root_index: u32,
    },
}

#[derive(Clone, Debug)]
pub struct ProgramResourceBinding {
    pub res: ShaderResourceBinding,
    /// Metadata of the stage that claimed the cell; resolves type indices.
    pub meta: Arc<ShaderMeta>,
    pub stage_flags: wgpu::ShaderStages,
    pub slot: BindingSlot,
}

impl ProgramResourceBinding {
    #[must_use]
    pub fn family(&self) -> BindingFamily {
        match self.slot {
            BindingSlot::Texture { .. } => BindingFamily::Texture,
            BindingSlot::UniformBuffer { .. } => BindingFamily::UniformBuffer,
        }
    }

    #[must_use]
    pub fn visibility(&self) -> ShaderVisibility {
        let stages = self.stage_flags;
        if stages == wgpu::ShaderStages::VERTEX {
            ShaderVisibility::Vertex
        } else if stages == wgpu::ShaderStages::FRAGMENT {
            ShaderVisibility::Pixel
        } else {
            ShaderVisibility::All
        }
    }

    #[must_use]
    pub fn type_info(&self) -> Option<&ResourceTypeInfo> {
        self.meta.type_info(self.res.ty)
    }

    fn uniform_count(&self) -> u32 {
        match self.slot {
            BindingSlot::Texture { .. } => 1,
            BindingSlot::UniformBuffer { .. } => {
                self.type_info().map_or(0, |info| info.members.len() as u32)
            }
        }
    }
}

/// Public description of one uniform, as enumerated by index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniformInfo {
    pub name: String,
    pub name_hash: NameHash,
    pub ty: ResourceType,
    pub count: u32,
    pub location: UniformLocation,
}

// ─── Table ───────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct ResourceBindingTable {
    cells: Vec<Option<ProgramResourceBinding>>,
    max_set: u32,
    max_binding: u32,
    uniform_buffer_count: u32,
    texture_count: u32,
    uniform_count: u32,
    uniform_data_size: u32,
}

impl Default for ResourceBindingTable {
    fn default() -> Self {
        Self {
            cells: vec![None; MAX_SET_COUNT * MAX_BINDINGS_PER_SET],
            max_set: 0,
            max_binding: 0,
            uniform_buffer_count: 0,
            texture_count: 0,
            uniform_count: 0,
            uniform_data_size: 0,
        }
    }
}

impl ResourceBindingTable {
    /// Builds the table from stage reflection, in the order given.
    ///
    /// Within a stage, uniform blocks are claimed before textures. A cell
    /// already claimed by an earlier stage only gains the new stage's flag.
    pub fn build<'a>(stages: impl IntoIterator<Item = (ShaderStage, &'a Arc<ShaderMeta>)>) -> Result<Self> {
        let mut table = Self::default();
        for (stage, meta) in stages {
            for res in &meta.uniform_buffers {
                table.claim(stage, meta, res, BindingFamily::UniformBuffer)?;
            }
            if let Some(res) = meta.storage_buffers.first() {
                return Err(GraphicsError::Unsupported(format!(
                    "storage buffer '{}' at set {}, binding {}",
                    res.name, res.set, res.binding
                )));
            }
            for res in &meta.textures {
                table.claim(stage, meta, res, BindingFamily::Texture)?;
            }
        }
        table.assign_root_indices();
        Ok(table)
    }

    fn claim(
        &mut self,
        stage: ShaderStage,
        meta: &Arc<ShaderMeta>,
        res: &ShaderResourceBinding,
        family: BindingFamily,
    ) -> Result<()> {
        let index = Self::cell_index(res.set, res.binding).ok_or_else(|| {
            GraphicsError::BindingOutOfRange {
                name: res.name.clone(),
                set: res.set,
                binding: res.binding,
            }
        })?;

        if let Some(existing) = &mut self.cells[index] {
            existing.stage_flags |= stage.stages();
            return Ok(());
        }

        let slot = match family {
            BindingFamily::Texture => {
                let unit = self.texture_count;
                self.texture_count += 1;
                BindingSlot::Texture {
                    unit,
                    link_unit: unit,
                }
            }
            _ => {
                let slot = BindingSlot::UniformBuffer {
                    data_offset: self.uniform_data_size,
                    root_index: 0,
                };
                self.uniform_buffer_count += 1;
                self.uniform_data_size += res.block_size;
                slot
            }
        };

        let binding = ProgramResourceBinding {
            res: res.clone(),
            meta: Arc::clone(meta),
            stage_flags: stage.stages(),
            slot,
        };
        self.uniform_count += binding.uniform_count();
        self.cells[index] = Some(binding);
        self.max_set = self.max_set.max(res.set + 1);
        self.max_binding = self.max_binding.max(res.binding + 1);
        Ok(())
    }

    fn assign_root_indices(&mut self) {
        let mut next = 0;
        for cell in self.cells.iter_mut().flatten() {
            if let BindingSlot::UniformBuffer { root_index, .. } = &mut cell.slot {
                *root_index = next;
                next += 1;
            }
        }
    }

    fn cell_index(set: u32, binding: u32) -> Option<usize> {
        let (set, binding) = (set as usize, binding as usize);
        (set < MAX_SET_COUNT && binding < MAX_BINDINGS_PER_SET)
            .then_some(set * MAX_BINDINGS_PER_SET + binding)
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    #[must_use]
    pub fn get(&self, set: u32, binding: u32) -> Option<&ProgramResourceBinding> {
        Self::cell_index(set, binding).and_then(|i| self.cells[i].as_ref())
    }

    pub(crate) fn get_mut(&mut self, set: u32, binding: u32) -> Option<&mut ProgramResourceBinding> {
        Self::cell_index(set, binding).and_then(|i| self.cells[i].as_mut())
    }

    /// Populated cells in `[set][binding]` order.
    pub fn iter(&self) -> impl Iterator<Item = &ProgramResourceBinding> {
        let max_binding = self.max_binding as usize;
        (0..self.max_set as usize).flat_map(move |set| {
            self.cells[set * MAX_BINDINGS_PER_SET..set * MAX_BINDINGS_PER_SET + max_binding]
                .iter()
                .flatten()
        })
    }

    #[inline]
    #[must_use]
    pub fn max_set(&self) -> u32 {
        self.max_set
    }

    #[inline]
    #[must_use]
    pub fn max_binding(&self) -> u32 {
        self.max_binding
    }

    #[inline]
    #[must_use]
    pub fn uniform_buffer_count(&self) -> u32 {
        self.uniform_buffer_count
    }

    #[inline]
    #[must_use]
    pub fn texture_count(&self) -> u32 {
        self.texture_count
    }

    /// Uniform-block members plus textures.
    #[inline]
    #[must_use]
    pub fn uniform_count(&self) -> u32 {
        self.uniform_count
    }

    /// Size of the host-side uniform blob.
    #[inline]
    #[must_use]
    pub fn uniform_data_size(&self) -> u32 {
        self.uniform_data_size
    }

    /// Root parameter of the SRV table for a texture; the sampler table
    /// follows at `+ 1`.
    #[inline]
    #[must_use]
    pub fn texture_root_index(&self, link_unit: u32) -> u32 {
        self.uniform_buffer_count + link_unit * 2
    }

    /// Looks a uniform up by name: textures by their own name, block
    /// members by member name.
    #[must_use]
    pub fn uniform_location(&self, name: NameHash) -> UniformLocation {
        for cell in self.iter() {
            match cell.slot {
                BindingSlot::Texture { .. } if cell.res.name_hash == name => {
                    return UniformLocation::new(cell.res.set, cell.res.binding, 0);
                }
                BindingSlot::UniformBuffer { .. } => {
                    let member = cell
                        .type_info()
                        .and_then(|info| info.members.iter().position(|m| m.name_hash == name));
                    if let Some(member) = member {
                        return UniformLocation::new(cell.res.set, cell.res.binding, member as u32);
                    }
                }
                BindingSlot::Texture { .. } => {}
            }
        }
        UniformLocation::INVALID
    }

    /// Enumerates uniforms in table order; block members expand in place.
    #[must_use]
    pub fn uniform_info(&self, index: u32) -> Option<UniformInfo> {
        let mut remaining = index;
        for cell in self.iter() {
            let count = cell.uniform_count();
            if remaining >= count {
                remaining -= count;
                continue;
            }
            return Some(match cell.slot {
                BindingSlot::Texture { .. } => UniformInfo {
                    name: cell.res.name.clone(),
                    name_hash: cell.res.name_hash,
                    ty: cell.res.ty,
                    count: cell.res.element_count,
                    location: UniformLocation::new(cell.res.set, cell.res.binding, 0),
                },
                BindingSlot::UniformBuffer { .. } => {
                    let member = &cell.type_info()?.members[remaining as usize];
                    UniformInfo {
                        name: member.name.clone(),
                        name_hash: member.name_hash,
                        ty: member.ty,
                        count: member.element_count,
                        location: UniformLocation::new(cell.res.set, cell.res.binding, remaining),
                    }
                }
            });
        }
        None
    }

    /// Root signature matching the table's root-parameter layout.
    #[must_use]
    pub fn root_signature_desc(&self) -> RootSignatureDesc {
        let mut parameters = Vec::with_capacity((self.uniform_buffer_count + self.texture_count * 2) as usize);
        for cell in self.iter() {
            if let BindingSlot::UniformBuffer { .. } = cell.slot {
                parameters.push(RootParameter::ConstantBufferView {
                    shader_register: cell.res.binding,
                    register_space: cell.res.set,
                    visibility: cell.visibility(),
                });
            }
        }

        let mut textures: Vec<(u32, &ProgramResourceBinding)> = self
            .iter()
            .filter_map(|cell| match cell.slot {
                BindingSlot::Texture { link_unit, .. } => Some((link_unit, cell)),
                BindingSlot::UniformBuffer { .. } => None,
            })
            .collect();
        textures.sort_by_key(|(link_unit, _)| *link_unit);
        for (_, cell) in textures {
            for range in [DescriptorRangeKind::ShaderResourceView, DescriptorRangeKind::Sampler] {
                parameters.push(RootParameter::DescriptorTable {
                    range,
                    shader_register: cell.res.binding,
                    register_space: cell.res.set,
                    visibility: cell.visibility(),
                });
            }
        }

        RootSignatureDesc {
            parameters,
            allow_input_layout: true,
        }
    }
}
