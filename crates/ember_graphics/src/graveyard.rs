//! Deferred Resource Destruction
//!
//! A resource retired while frame *N* is being recorded may still be read by
//! the GPU for any frame already in flight. Each frame slot therefore owns a
//! [`ResourceGraveyard`]: retirements append to the current slot's queue,
//! and the queue is released in bulk the next time that slot begins, right
//! after its fence has been waited on.

use crate::hal::{Device, RawResource};

/// Capacity added whenever the queue is full.
pub const GRAVEYARD_GROW_STEP: usize = 8;

/// Per-frame queue of resources awaiting release.
#[derive(Debug, Default)]
pub struct ResourceGraveyard {
    entries: Vec<RawResource>,
}

impl ResourceGraveyard {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::with_capacity(GRAVEYARD_GROW_STEP),
        }
    }

    /// Takes the resource out of `slot` and queues it. Returns `false` if the
    /// slot was already empty.
    pub fn retire(&mut self, slot: &mut Option<RawResource>) -> bool {
        match slot.take() {
            Some(resource) => {
                self.push(resource);
                true
            }
            None => false,
        }
    }

    /// Queues a resource that has no owning wrapper (e.g. a staging buffer).
    pub fn push(&mut self, resource: RawResource) {
        if self.entries.len() == self.entries.capacity() {
            self.entries.reserve_exact(GRAVEYARD_GROW_STEP);
            log::debug!(
                "Graveyard growing to {} entries",
                self.entries.capacity()
            );
        }
        self.entries.push(resource);
    }

    /// Releases every queued resource. Only safe once the owning frame's
    /// fence has been reached.
    pub fn flush<D: Device>(&mut self, device: &mut D) -> usize {
        let count = self.entries.len();
        for resource in self.entries.drain(..) {
            device.release_resource(resource);
        }
        if count > 0 {
            log::debug!("Graveyard released {count} resources");
        }
        count
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    #[must_use]
    pub fn contains(&self, resource: RawResource) -> bool {
        self.entries.contains(&resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::headless::HeadlessDevice;
    use crate::hal::{HeapType, ResourceDesc, ResourceState};

    fn buffer(device: &mut HeadlessDevice) -> RawResource {
        device
            .create_committed_resource(
                &ResourceDesc::buffer(16),
                HeapType::Default,
                ResourceState::Common,
            )
            .unwrap()
    }

    #[test]
    fn test_retire_clears_slot_and_skips_empty() {
        let mut device = HeadlessDevice::new();
        let mut graveyard = ResourceGraveyard::new();
        let mut slot = Some(buffer(&mut device));

        assert!(graveyard.retire(&mut slot));
        assert!(slot.is_none());
        assert!(!graveyard.retire(&mut slot));
        assert_eq!(graveyard.len(), 1);
    }

    #[test]
    fn test_grows_past_initial_capacity() {
        let mut device = HeadlessDevice::new();
        let mut graveyard = ResourceGraveyard::new();
        for _ in 0..GRAVEYARD_GROW_STEP * 3 + 1 {
            let res = buffer(&mut device);
            graveyard.push(res);
        }
        assert_eq!(graveyard.len(), GRAVEYARD_GROW_STEP * 3 + 1);
        assert!(graveyard.capacity() >= graveyard.len());
    }

    #[test]
    fn test_flush_releases_everything() {
        let mut device = HeadlessDevice::new();
        let controller = device.controller();
        let mut graveyard = ResourceGraveyard::new();
        let a = buffer(&mut device);
        let b = buffer(&mut device);
        graveyard.push(a);
        graveyard.push(b);

        assert_eq!(graveyard.flush(&mut device), 2);
        assert!(graveyard.is_empty());
        assert!(!controller.is_live(a));
        assert!(!controller.is_live(b));
        assert_eq!(graveyard.flush(&mut device), 0);
    }
}
