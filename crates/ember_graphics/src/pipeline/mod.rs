//! Pipeline State & Cache
//!
//! - [`state`]: the render-state bitfield mutated by the context's state
//!   setters, and its translation into rasterizer/blend/depth descriptions.
//! - [`cache`]: hash-keyed, grow-only cache of compiled pipeline objects.

pub mod cache;
pub mod state;

pub use cache::{PipelineCache, PipelineTarget};
pub use state::{PipelineState, StencilFace};
