//! Ember
//!
//! A frame-pipelined GPU resource layer for explicit graphics APIs.
//!
//! - [`core`]: name hashing and alignment helpers
//! - [`graphics`]: the context, frame ring, scratch memory, deferred
//!   destruction, pipeline cache and program bindings
//! - [`render`]: named shader constants

pub use ember_core as core;
pub use ember_graphics as graphics;
pub use ember_render as render;

pub use ember_core::NameHash;
pub use ember_graphics::{
    ClearFlags, Context, ContextParams, FrameState, GraphicsError, IndexType, PrimitiveType,
    ShaderMeta, ShaderStage, State, TextureCreationParams, TextureParams, VertexStreamDeclaration,
};
pub use ember_render::{Constant, ConstantError, ConstantType, NamedConstantBuffer};

/// Common imports.
pub mod prelude {
    pub use crate::{
        ClearFlags, Constant, ConstantType, Context, ContextParams, IndexType, NameHash,
        NamedConstantBuffer, PrimitiveType, ShaderMeta, ShaderStage, State,
        VertexStreamDeclaration,
    };
    pub use ember_graphics::hal::Device;
    pub use glam::{Mat4, Vec4};
}
