//! Ember Graphics
//!
//! A frame-pipelined GPU resource layer for explicit graphics APIs.
//!
//! - [`Context`]: the single owner of the device, frame ring and resources
//! - [`frame`]: per-slot fences, command allocators and the frame state machine
//! - [`scratch`]: per-frame bump allocation of uniform memory and descriptors
//! - [`graveyard`]: deferred destruction until the GPU is done with a resource
//! - [`pipeline`]: render-state bitfield and the compiled-pipeline cache
//! - [`shader`]: reflection metadata and the per-program binding table
//! - [`hal`]: the low-level API seam, with a recording [`hal::headless`] backend

pub mod binding_state;
pub mod context;
pub mod device_buffer;
mod draw;
pub mod error;
pub mod frame;
pub mod graveyard;
pub mod hal;
pub mod pipeline;
pub mod program;
pub mod resources;
pub mod scratch;
pub mod settings;
pub mod shader;
pub mod texture;
pub mod types;
pub mod vertex;
pub mod window;

pub use binding_state::BindingState;
pub use context::Context;
pub use error::{GraphicsError, Result};
pub use frame::{FrameState, RenderTargetId};
pub use pipeline::{PipelineCache, PipelineState};
pub use program::{AttributeInfo, Program};
pub use resources::{
    IndexBufferHandle, ProgramHandle, ShaderModuleHandle, TextureHandle, VertexBufferHandle,
    VertexDeclarationHandle,
};
pub use settings::{ContextParams, ScratchSettings};
pub use shader::binding::{UniformInfo, UniformLocation};
pub use shader::{ShaderMeta, ShaderStage};
pub use texture::{TextureCreationParams, TextureParams};
pub use types::{
    ClearFlags, DataType, FaceType, IndexType, PrimitiveType, State, TextureFilter, TextureFormat,
    TextureWrap,
};
pub use vertex::VertexStreamDeclaration;
pub use window::WindowSurface;
