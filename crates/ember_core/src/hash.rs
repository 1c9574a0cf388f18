//! Name Hashing
//!
//! [`NameHash`] is a stable 64-bit xxh3 digest of a UTF-8 name. Shader
//! reflection metadata, uniform lookups and named constants all key off
//! this value, so it must not change between runs.

use std::fmt;

use xxhash_rust::xxh3::xxh3_64;

/// Stable 64-bit hash of a resource, attribute or constant name.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NameHash(pub u64);

impl NameHash {
    #[inline]
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(xxh3_64(name.as_bytes()))
    }

    #[inline]
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl From<&str> for NameHash {
    #[inline]
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Debug for NameHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NameHash({:#018x})", self.0)
    }
}

/// Shorthand for [`NameHash::new`].
#[inline]
#[must_use]
pub fn hash_name(name: &str) -> NameHash {
    NameHash::new(name)
}
