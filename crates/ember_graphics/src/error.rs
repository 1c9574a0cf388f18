//! Error Types
//!
//! [`GraphicsError`] covers every failure the resource layer reports to its
//! caller. Failures are split into three groups:
//!
//! - **Initialization**: the context could not be brought up. The caller
//!   must not proceed.
//! - **Resource / binding**: stale handles, unsupported content, exhausted
//!   pools. Returned as typed errors.
//! - **Device calls**: a low-level API call failed. Inside the frame loop
//!   these go through [`verify`], which traps when strict verification is
//!   enabled.

use std::panic::Location;

use thiserror::Error;

use crate::frame::FrameState;
use crate::hal::{HalError, HalResult};

/// The main error type for the graphics layer.
#[derive(Error, Debug)]
pub enum GraphicsError {
    // ========================================================================
    // Initialization Errors
    // ========================================================================
    /// A second context was requested while one is still alive.
    #[error("A graphics context already exists; only one may be alive at a time")]
    ContextAlreadyExists,

    /// The supplied [`ContextParams`](crate::ContextParams) are inconsistent.
    #[error("Invalid context settings: {0}")]
    InvalidSettings(String),

    /// The platform window is closed or exposes no native surface.
    #[error("Window is closed or has no native surface handle")]
    WindowUnavailable,

    /// A low-level API call failed.
    #[error("Device call failed: {0}")]
    Device(#[from] HalError),

    // ========================================================================
    // Frame Errors
    // ========================================================================
    /// A frame-loop call was made in the wrong state.
    #[error("Invalid frame state for {operation}: currently {actual:?}")]
    InvalidFrameState {
        /// The rejected operation
        operation: &'static str,
        /// The state the frame controller was in
        actual: FrameState,
    },

    /// Draw issued without a bound program.
    #[error("No program is bound")]
    NoProgramBound,

    // ========================================================================
    // Resource Errors
    // ========================================================================
    /// The handle was deleted or never belonged to this context.
    #[error("Invalid or stale {0} handle")]
    InvalidHandle(&'static str),

    /// A reflected resource lives outside the binding table.
    #[error("Shader resource '{name}' at set {set}, binding {binding} is out of range")]
    BindingOutOfRange {
        name: String,
        set: u32,
        binding: u32,
    },

    /// The vertex stream has no matching vertex format.
    #[error("Vertex stream '{name}' ({size} x {ty:?}) has no vertex format")]
    UnsupportedVertexFormat {
        name: String,
        size: u32,
        ty: crate::types::DataType,
    },

    /// Feature outside the implemented subset.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Texture data is shorter than its declared dimensions.
    #[error("Texture data is {actual} bytes, expected at least {expected}")]
    TextureDataSize { expected: usize, actual: usize },

    #[error("Texture upload of {width}x{height} has no texels")]
    InvalidTextureSize { width: u32, height: u32 },

    // ========================================================================
    // Allocation Errors
    // ========================================================================
    /// A uniform block is larger than the largest scratch bucket.
    #[error("Uniform block of {size} bytes exceeds the largest scratch block ({max} bytes)")]
    ScratchBlockTooLarge { size: u32, max: u32 },

    /// A scratch pool ran out of memory or descriptors for this frame.
    #[error("Scratch pool {pool} exhausted ({what})")]
    ScratchExhausted { pool: usize, what: &'static str },

    /// The global sampler pool is full.
    #[error("Sampler pool exhausted ({0} samplers)")]
    SamplerPoolExhausted(u32),
}

/// Alias for `Result<T, GraphicsError>`.
pub type Result<T> = std::result::Result<T, GraphicsError>;

/// Checks the outcome of a device call made inside the frame loop.
///
/// With `strict` set, a failure is logged with the caller's location and the
/// process panics. Otherwise the failure is logged at debug level and
/// swallowed.
#[track_caller]
pub(crate) fn verify<T>(result: HalResult<T>, strict: bool) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            let location = Location::caller();
            if strict {
                log::error!(
                    "Graphics call failed at {}:{}: {err}",
                    location.file(),
                    location.line()
                );
                panic!(
                    "graphics call failed at {}:{}: {err}",
                    location.file(),
                    location.line()
                );
            }
            log::debug!(
                "Ignoring graphics call failure at {}:{}: {err}",
                location.file(),
                location.line()
            );
            None
        }
    }
}

/// Reports an unrecoverable error (pipeline compilation, pool exhaustion)
/// and aborts the current operation.
#[track_caller]
pub(crate) fn fatal(err: &GraphicsError) -> ! {
    let location = Location::caller();
    log::error!("Fatal graphics error at {}:{}: {err}", location.file(), location.line());
    panic!("fatal graphics error: {err}");
}
