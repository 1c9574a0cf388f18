//! Error types for constant management.

use ember_core::NameHash;
use ember_graphics::GraphicsError;
use thiserror::Error;

use crate::constant::ConstantType;

#[derive(Error, Debug)]
pub enum ConstantError {
    /// The constant already exists with a different type; the existing type
    /// is kept.
    #[error("Constant {name:?} is {existing:?}, not {requested:?}")]
    TypeMismatch {
        name: NameHash,
        existing: ConstantType,
        requested: ConstantType,
    },

    /// Growing the value storage failed.
    #[error("Out of memory growing constant storage by {0} values")]
    OutOfResources(usize),

    #[error(transparent)]
    Graphics(#[from] GraphicsError),
}

/// Alias for `Result<T, ConstantError>`.
pub type Result<T> = std::result::Result<T, ConstantError>;
