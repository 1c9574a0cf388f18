//! Vertex Declarations
//!
//! A [`VertexStreamDeclaration`] lists named streams (element count, type,
//! normalization). It is frozen into a [`VertexDeclaration`] with byte
//! offsets, a stride and a layout hash. Binding a declaration to a program
//! resolves every stream's shader location by name and yields a
//! [`BoundVertexLayout`], which feeds the pipeline's input layout.

use std::hash::{Hash, Hasher};

use ember_core::NameHash;
use smallvec::SmallVec;
use xxhash_rust::xxh3::Xxh3;

use crate::error::{GraphicsError, Result};
use crate::hal::InputElement;
use crate::shader::ShaderResourceBinding;
use crate::types::DataType;

pub const MAX_VERTEX_STREAMS: usize = 8;

/// Per-vertex or per-instance stepping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum VertexStepFunction {
    #[default]
    Vertex,
    Instance,
}

impl VertexStepFunction {
    #[must_use]
    pub const fn step_mode(self) -> wgpu::VertexStepMode {
        match self {
            Self::Vertex => wgpu::VertexStepMode::Vertex,
            Self::Instance => wgpu::VertexStepMode::Instance,
        }
    }
}

/// Maps a stream's component type and count to a vertex format.
///
/// Three-component 8- and 16-bit formats do not exist on the target API.
#[must_use]
pub fn vertex_format(ty: DataType, size: u32, normalize: bool) -> Option<wgpu::VertexFormat> {
    use wgpu::VertexFormat as F;
    let format = match (ty, size, normalize) {
        (DataType::Float, 1, _) => F::Float32,
        (DataType::Float, 2, _) => F::Float32x2,
        (DataType::Float, 3, _) => F::Float32x3,
        (DataType::Float, 4, _) => F::Float32x4,
        (DataType::Int, 1, _) => F::Sint32,
        (DataType::Int, 2, _) => F::Sint32x2,
        (DataType::Int, 3, _) => F::Sint32x3,
        (DataType::Int, 4, _) => F::Sint32x4,
        (DataType::UnsignedInt, 1, _) => F::Uint32,
        (DataType::UnsignedInt, 2, _) => F::Uint32x2,
        (DataType::UnsignedInt, 3, _) => F::Uint32x3,
        (DataType::UnsignedInt, 4, _) => F::Uint32x4,
        (DataType::Byte, 1, true) => F::Snorm8,
        (DataType::Byte, 2, true) => F::Snorm8x2,
        (DataType::Byte, 4, true) => F::Snorm8x4,
        (DataType::Byte, 1, false) => F::Sint8,
        (DataType::Byte, 2, false) => F::Sint8x2,
        (DataType::Byte, 4, false) => F::Sint8x4,
        (DataType::UnsignedByte, 1, true) => F::Unorm8,
        (DataType::UnsignedByte, 2, true) => F::Unorm8x2,
        (DataType::UnsignedByte, 4, true) => F::Unorm8x4,
        (DataType::UnsignedByte, 1, false) => F::Uint8,
        (DataType::UnsignedByte, 2, false) => F::Uint8x2,
        (DataType::UnsignedByte, 4, false) => F::Uint8x4,
        (DataType::Short, 1, true) => F::Snorm16,
        (DataType::Short, 2, true) => F::Snorm16x2,
        (DataType::Short, 4, true) => F::Snorm16x4,
        (DataType::Short, 1, false) => F::Sint16,
        (DataType::Short, 2, false) => F::Sint16x2,
        (DataType::Short, 4, false) => F::Sint16x4,
        (DataType::UnsignedShort, 1, true) => F::Unorm16,
        (DataType::UnsignedShort, 2, true) => F::Unorm16x2,
        (DataType::UnsignedShort, 4, true) => F::Unorm16x4,
        (DataType::UnsignedShort, 1, false) => F::Uint16,
        (DataType::UnsignedShort, 2, false) => F::Uint16x2,
        (DataType::UnsignedShort, 4, false) => F::Uint16x4,
        _ => return None,
    };
    Some(format)
}

// ─── Declaration Builder ─────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq)]
struct StreamDesc {
    name: String,
    size: u32,
    ty: DataType,
    normalize: bool,
}

/// Mutable list of streams, frozen by
/// [`Context::new_vertex_declaration`](crate::Context::new_vertex_declaration).
#[derive(Clone, Debug, Default)]
pub struct VertexStreamDeclaration {
    streams: SmallVec<[StreamDesc; MAX_VERTEX_STREAMS]>,
    step_function: VertexStepFunction,
}

impl VertexStreamDeclaration {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stream(&mut self, name: &str, size: u32, ty: DataType, normalize: bool) -> &mut Self {
        self.streams.push(StreamDesc {
            name: name.to_owned(),
            size,
            ty,
            normalize,
        });
        self
    }

    pub fn set_step_function(&mut self, step_function: VertexStepFunction) -> &mut Self {
        self.step_function = step_function;
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

// ─── Frozen Declaration ──────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VertexStream {
    pub name: String,
    pub name_hash: NameHash,
    pub size: u32,
    pub ty: DataType,
    pub normalize: bool,
    pub offset: u32,
    pub format: wgpu::VertexFormat,
}

#[derive(Clone, Debug)]
pub struct VertexDeclaration {
    streams: SmallVec<[VertexStream; MAX_VERTEX_STREAMS]>,
    stride: u32,
    step_function: VertexStepFunction,
    layout_hash: u64,
}

impl VertexDeclaration {
    /// Freezes `decl`. `stride` overrides the packed stride when given.
    pub fn new(decl: &VertexStreamDeclaration, stride: Option<u32>) -> Result<Self> {
        let mut streams: SmallVec<[VertexStream; MAX_VERTEX_STREAMS]> = SmallVec::new();
        let mut offset = 0;
        for desc in &decl.streams {
            let format = vertex_format(desc.ty, desc.size, desc.normalize).ok_or_else(|| {
                GraphicsError::UnsupportedVertexFormat {
                    name: desc.name.clone(),
                    size: desc.size,
                    ty: desc.ty,
                }
            })?;
            streams.push(VertexStream {
                name: desc.name.clone(),
                name_hash: NameHash::new(&desc.name),
                size: desc.size,
                ty: desc.ty,
                normalize: desc.normalize,
                offset,
                format,
            });
            offset += desc.size * desc.ty.size();
        }

        let stride = stride.unwrap_or(offset);
        let mut hasher = Xxh3::new();
        for stream in &streams {
            stream.name_hash.hash(&mut hasher);
            stream.format.hash(&mut hasher);
            stream.offset.hash(&mut hasher);
        }
        stride.hash(&mut hasher);
        decl.step_function.hash(&mut hasher);

        Ok(Self {
            streams,
            stride,
            step_function: decl.step_function,
            layout_hash: hasher.finish(),
        })
    }

    #[inline]
    #[must_use]
    pub fn streams(&self) -> &[VertexStream] {
        &self.streams
    }

    #[inline]
    #[must_use]
    pub fn stride(&self) -> u32 {
        self.stride
    }

    #[inline]
    #[must_use]
    pub fn step_function(&self) -> VertexStepFunction {
        self.step_function
    }

    #[inline]
    #[must_use]
    pub fn layout_hash(&self) -> u64 {
        self.layout_hash
    }

    /// Resolves stream locations against a program's vertex inputs. Streams
    /// the program does not consume are left out of the layout.
    #[must_use]
    pub fn bind(&self, binding_index: u32, inputs: &[ShaderResourceBinding]) -> BoundVertexLayout {
        let mut elements: SmallVec<[InputElement; MAX_VERTEX_STREAMS]> = SmallVec::new();
        let mut hasher = Xxh3::new();
        self.layout_hash.hash(&mut hasher);
        binding_index.hash(&mut hasher);

        for stream in &self.streams {
            let Some(input) = inputs.iter().find(|i| i.name_hash == stream.name_hash) else {
                log::debug!("Vertex stream '{}' is not consumed by the program", stream.name);
                continue;
            };
            let element = InputElement {
                semantic_index: input.binding,
                format: stream.format,
                input_slot: binding_index,
                aligned_byte_offset: stream.offset,
                step_mode: self.step_function.step_mode(),
            };
            element.hash(&mut hasher);
            elements.push(element);
        }

        BoundVertexLayout {
            binding: binding_index,
            stride: self.stride,
            elements,
            hash: hasher.finish(),
        }
    }
}

/// A declaration bound to a vertex-buffer slot for one program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoundVertexLayout {
    pub binding: u32,
    pub stride: u32,
    pub elements: SmallVec<[InputElement; MAX_VERTEX_STREAMS]>,
    pub hash: u64,
}
