//! Ember Core
//!
//! Foundational helpers shared by every Ember crate: stable name hashing
//! and power-of-two alignment math.

pub mod align;
pub mod hash;

pub use align::{align_up, align_up_u64};
pub use hash::{NameHash, hash_name};
