//! Graphics Vocabulary
//!
//! Engine-facing enums accepted by the [`Context`](crate::Context) API and
//! their translation into the fixed-function vocabulary of the low-level
//! API (which reuses the `wgpu` enums for formats, topologies, filters and
//! address modes).

use bitflags::bitflags;

// ─── Data Types ──────────────────────────────────────────────────────────────

/// Element type of vertex streams and index buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    Byte,
    UnsignedByte,
    Short,
    UnsignedShort,
    Int,
    UnsignedInt,
    Float,
}

impl DataType {
    /// Size of one component in bytes.
    #[inline]
    #[must_use]
    pub const fn size(self) -> u32 {
        match self {
            Self::Byte | Self::UnsignedByte => 1,
            Self::Short | Self::UnsignedShort => 2,
            Self::Int | Self::UnsignedInt | Self::Float => 4,
        }
    }
}

/// Index element width for indexed draws.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexType {
    U16,
    U32,
}

impl IndexType {
    #[inline]
    #[must_use]
    pub const fn size(self) -> u32 {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }

    #[inline]
    #[must_use]
    pub const fn format(self) -> wgpu::IndexFormat {
        match self {
            Self::U16 => wgpu::IndexFormat::Uint16,
            Self::U32 => wgpu::IndexFormat::Uint32,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Lines,
    Triangles,
    TriangleStrip,
}

impl PrimitiveType {
    #[inline]
    #[must_use]
    pub const fn topology(self) -> wgpu::PrimitiveTopology {
        match self {
            Self::Lines => wgpu::PrimitiveTopology::LineList,
            Self::Triangles => wgpu::PrimitiveTopology::TriangleList,
            Self::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
        }
    }
}

// ─── Textures ────────────────────────────────────────────────────────────────

/// Pixel layout of texture uploads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Luminance,
    LuminanceAlpha,
    /// Repacked to RGBA on upload.
    Rgb,
    Rgba,
    Rgba16Float,
    Rgba32Float,
    Depth,
    Stencil,
}

impl TextureFormat {
    /// Device format the texture is stored in, `None` for formats that
    /// cannot be sampled through this layer.
    #[must_use]
    pub const fn device_format(self) -> Option<wgpu::TextureFormat> {
        match self {
            Self::Luminance => Some(wgpu::TextureFormat::R8Unorm),
            Self::LuminanceAlpha => Some(wgpu::TextureFormat::Rg8Unorm),
            Self::Rgb | Self::Rgba => Some(wgpu::TextureFormat::Rgba8Unorm),
            Self::Rgba16Float => Some(wgpu::TextureFormat::Rgba16Float),
            Self::Rgba32Float => Some(wgpu::TextureFormat::Rgba32Float),
            Self::Depth | Self::Stencil => None,
        }
    }

    /// Bytes per pixel of the *source* data.
    #[must_use]
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::Luminance | Self::Stencil => 1,
            Self::LuminanceAlpha => 2,
            Self::Rgb => 3,
            Self::Rgba | Self::Depth => 4,
            Self::Rgba16Float => 8,
            Self::Rgba32Float => 16,
        }
    }

    /// Bytes per pixel once stored on the device.
    #[must_use]
    pub const fn device_bytes_per_pixel(self) -> u32 {
        match self {
            Self::Rgb => 4,
            other => other.bytes_per_pixel(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum TextureFilter {
    /// Resolved to the context's default min/mag filter.
    #[default]
    Default,
    Nearest,
    Linear,
    NearestMipmapNearest,
    NearestMipmapLinear,
    LinearMipmapNearest,
    LinearMipmapLinear,
}

impl TextureFilter {
    /// Splits into (texel filter, mip filter).
    #[must_use]
    pub const fn modes(self) -> (wgpu::FilterMode, wgpu::FilterMode) {
        use wgpu::FilterMode::{Linear, Nearest};
        match self {
            Self::Default | Self::Linear | Self::LinearMipmapNearest => (Linear, Nearest),
            Self::Nearest | Self::NearestMipmapNearest => (Nearest, Nearest),
            Self::NearestMipmapLinear => (Nearest, Linear),
            Self::LinearMipmapLinear => (Linear, Linear),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum TextureWrap {
    ClampToBorder,
    ClampToEdge,
    MirroredRepeat,
    #[default]
    Repeat,
}

impl TextureWrap {
    #[must_use]
    pub const fn address_mode(self) -> wgpu::AddressMode {
        match self {
            Self::ClampToBorder => wgpu::AddressMode::ClampToBorder,
            Self::ClampToEdge => wgpu::AddressMode::ClampToEdge,
            Self::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
            Self::Repeat => wgpu::AddressMode::Repeat,
        }
    }
}

// ─── Render State ────────────────────────────────────────────────────────────

/// Toggleable render states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum State {
    DepthTest,
    ScissorTest,
    StencilTest,
    Blend,
    CullFace,
    PolygonOffsetFill,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum FaceType {
    Front,
    #[default]
    Back,
    FrontAndBack,
}

bitflags! {
    /// Colour channels written by draws.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ColorMask: u8 {
        const R = 1 << 0;
        const G = 1 << 1;
        const B = 1 << 2;
        const A = 1 << 3;
    }
}

impl ColorMask {
    #[must_use]
    pub fn from_channels(r: bool, g: bool, b: bool, a: bool) -> Self {
        let mut mask = Self::empty();
        mask.set(Self::R, r);
        mask.set(Self::G, g);
        mask.set(Self::B, b);
        mask.set(Self::A, a);
        mask
    }

    #[must_use]
    pub fn color_writes(self) -> wgpu::ColorWrites {
        let mut writes = wgpu::ColorWrites::empty();
        writes.set(wgpu::ColorWrites::RED, self.contains(Self::R));
        writes.set(wgpu::ColorWrites::GREEN, self.contains(Self::G));
        writes.set(wgpu::ColorWrites::BLUE, self.contains(Self::B));
        writes.set(wgpu::ColorWrites::ALPHA, self.contains(Self::A));
        writes
    }
}

bitflags! {
    /// Buffers affected by [`Context::clear`](crate::Context::clear).
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u8 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}
