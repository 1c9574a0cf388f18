//! Ember Render
//!
//! Name-keyed shader constants that live independently of any program's
//! binding layout, and their application to the program bound on a
//! [`Context`](ember_graphics::Context).

pub mod constant;
pub mod error;

pub use constant::{Constant, ConstantType, ConstantView, NamedConstantBuffer};
pub use error::{ConstantError, Result};
