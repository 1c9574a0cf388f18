//! Alignment helpers for GPU placement rules (constant-buffer and
//! texture-pitch alignment are both powers of two).

/// Rounds `value` up to the next multiple of `alignment`.
///
/// `alignment` must be a non-zero power of two.
#[inline]
#[must_use]
pub const fn align_up(value: u32, alignment: u32) -> u32 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// 64-bit variant of [`align_up`], for byte offsets into large heaps.
#[inline]
#[must_use]
pub const fn align_up_u64(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}
