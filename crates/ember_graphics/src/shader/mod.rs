//! Shader Modules & Reflection
//!
//! Shaders arrive precompiled. Alongside the bytecode, each module carries
//! its reflection metadata ([`ShaderMeta`]): vertex inputs, uniform buffers
//! with their member layout, storage buffers and textures, each placed at a
//! `(set, binding)` slot. The program linker in [`binding`] merges the
//! metadata of both stages into one flat binding table.

pub mod binding;

use std::sync::Arc;

use ember_core::NameHash;

// ─── Data Types ──────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderDataType {
    Int,
    UInt,
    Float,
    Vec2,
    Vec3,
    Vec4,
    IVec2,
    IVec3,
    IVec4,
    UVec2,
    UVec3,
    UVec4,
    Mat2,
    Mat3,
    Mat4,
    Sampler2D,
    Sampler2DArray,
    SamplerCube,
}

impl ShaderDataType {
    /// Scalar components per element; `0` for samplers.
    #[must_use]
    pub const fn component_count(self) -> u32 {
        match self {
            Self::Int | Self::UInt | Self::Float => 1,
            Self::Vec2 | Self::IVec2 | Self::UVec2 => 2,
            Self::Vec3 | Self::IVec3 | Self::UVec3 => 3,
            Self::Vec4 | Self::IVec4 | Self::UVec4 | Self::Mat2 => 4,
            Self::Mat3 => 9,
            Self::Mat4 => 16,
            Self::Sampler2D | Self::Sampler2DArray | Self::SamplerCube => 0,
        }
    }

    #[inline]
    #[must_use]
    pub const fn byte_size(self) -> u32 {
        self.component_count() * 4
    }

    #[inline]
    #[must_use]
    pub const fn is_sampler(self) -> bool {
        matches!(
            self,
            Self::Sampler2D | Self::Sampler2DArray | Self::SamplerCube
        )
    }
}

/// Type of a reflected resource or member: either a plain data type or an
/// index into [`ShaderMeta::type_infos`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Data(ShaderDataType),
    TypeIndex(u16),
}

// ─── Reflection Records ──────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceMember {
    pub name: String,
    pub name_hash: NameHash,
    pub ty: ResourceType,
    pub element_count: u32,
    /// Byte offset inside the enclosing block.
    pub offset: u32,
}

impl ResourceMember {
    #[must_use]
    pub fn new(name: &str, ty: ShaderDataType, element_count: u32, offset: u32) -> Self {
        Self {
            name: name.to_owned(),
            name_hash: NameHash::new(name),
            ty: ResourceType::Data(ty),
            element_count,
            offset,
        }
    }
}

/// A struct type referenced by uniform blocks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceTypeInfo {
    pub name: String,
    pub name_hash: NameHash,
    pub members: Vec<ResourceMember>,
}

impl ResourceTypeInfo {
    #[must_use]
    pub fn new(name: &str, members: Vec<ResourceMember>) -> Self {
        Self {
            name: name.to_owned(),
            name_hash: NameHash::new(name),
            members,
        }
    }
}

/// One reflected vertex input, uniform buffer, storage buffer or texture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderResourceBinding {
    pub name: String,
    pub name_hash: NameHash,
    pub ty: ResourceType,
    pub set: u32,
    /// Binding slot; for vertex inputs, the shader location.
    pub binding: u32,
    pub element_count: u32,
    /// Byte size of a uniform block; `0` for everything else.
    pub block_size: u32,
}

impl ShaderResourceBinding {
    #[must_use]
    pub fn new(name: &str, ty: ResourceType, set: u32, binding: u32) -> Self {
        Self {
            name: name.to_owned(),
            name_hash: NameHash::new(name),
            ty,
            set,
            binding,
            element_count: 1,
            block_size: 0,
        }
    }

    #[must_use]
    pub fn with_block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size;
        self
    }

    #[must_use]
    pub fn with_element_count(mut self, element_count: u32) -> Self {
        self.element_count = element_count;
        self
    }
}

/// Reflection metadata of one shader stage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShaderMeta {
    pub inputs: Vec<ShaderResourceBinding>,
    pub uniform_buffers: Vec<ShaderResourceBinding>,
    pub storage_buffers: Vec<ShaderResourceBinding>,
    pub textures: Vec<ShaderResourceBinding>,
    pub type_infos: Vec<ResourceTypeInfo>,
}

impl ShaderMeta {
    #[must_use]
    pub fn type_info(&self, ty: ResourceType) -> Option<&ResourceTypeInfo> {
        match ty {
            ResourceType::TypeIndex(index) => self.type_infos.get(usize::from(index)),
            ResourceType::Data(_) => None,
        }
    }
}

// ─── Modules ─────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl ShaderStage {
    #[inline]
    #[must_use]
    pub const fn stages(self) -> wgpu::ShaderStages {
        match self {
            Self::Vertex => wgpu::ShaderStages::VERTEX,
            Self::Fragment => wgpu::ShaderStages::FRAGMENT,
            Self::Compute => wgpu::ShaderStages::COMPUTE,
        }
    }
}

/// Compiled bytecode plus reflection of one stage.
#[derive(Clone, Debug)]
pub struct ShaderModule {
    pub stage: ShaderStage,
    pub bytecode: Arc<[u8]>,
    pub meta: Arc<ShaderMeta>,
}

impl ShaderModule {
    #[must_use]
    pub fn new(stage: ShaderStage, bytecode: &[u8], meta: ShaderMeta) -> Self {
        Self {
            stage,
            bytecode: Arc::from(bytecode),
            meta: Arc::new(meta),
        }
    }
}
