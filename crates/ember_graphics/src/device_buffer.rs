//! Device Buffers
//!
//! A [`DeviceBuffer`] owns one default-heap GPU buffer plus its byte size.
//! Uploads go through a transient upload-heap staging buffer: the staging
//! data is copied on the GPU timeline, and the staging buffer itself is
//! retired to the frame graveyard instead of being released immediately.
//!
//! Re-uploading with a different size retires the old resource (deferred)
//! and creates a fresh one; same-size uploads reuse the resource and only
//! transition it back to `CopyDest` for the copy.

use crate::error::Result;
use crate::graveyard::ResourceGraveyard;
use crate::hal::{
    CommandList, Device, HeapType, RawResource, ResourceDesc, ResourceState, TransitionBarrier,
};

/// What the buffer feeds; selects the post-upload resource state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
}

impl BufferKind {
    #[inline]
    #[must_use]
    pub const fn ready_state(self) -> ResourceState {
        match self {
            Self::Vertex => ResourceState::VertexAndConstantBuffer,
            Self::Index => ResourceState::IndexBuffer,
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Vertex => "VertexBuffer",
            Self::Index => "IndexBuffer",
        }
    }
}

#[derive(Debug)]
pub struct DeviceBuffer {
    kind: BufferKind,
    resource: Option<RawResource>,
    state: ResourceState,
    data_size: u32,
    destroyed: bool,
}

impl DeviceBuffer {
    #[must_use]
    pub fn new(kind: BufferKind) -> Self {
        Self {
            kind,
            resource: None,
            state: ResourceState::Common,
            data_size: 0,
            destroyed: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    #[inline]
    #[must_use]
    pub fn resource(&self) -> Option<RawResource> {
        self.resource
    }

    #[inline]
    #[must_use]
    pub fn data_size(&self) -> u32 {
        self.data_size
    }

    /// Set once the resource has been handed to a graveyard.
    #[inline]
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    #[must_use]
    pub fn gpu_address<D: Device>(&self, device: &D) -> Option<u64> {
        self.resource.map(|r| device.gpu_virtual_address(r))
    }

    /// Records an upload of `data` on `list`. Empty data is a no-op.
    pub fn upload<D: Device>(
        &mut self,
        device: &mut D,
        list: &mut D::CommandList,
        graveyard: &mut ResourceGraveyard,
        data: &[u8],
    ) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let size = data.len() as u64;

        if self.resource.is_some() && u64::from(self.data_size) != size {
            self.retire(graveyard);
        }

        let target = match self.resource {
            Some(resource) if !self.destroyed => {
                if self.state != ResourceState::CopyDest {
                    list.resource_barrier(&TransitionBarrier {
                        resource,
                        subresource: None,
                        before: self.state,
                        after: ResourceState::CopyDest,
                    });
                }
                resource
            }
            _ => {
                let resource = device.create_committed_resource(
                    &ResourceDesc::buffer(size),
                    HeapType::Default,
                    ResourceState::CopyDest,
                )?;
                device.set_name(resource, self.kind.label());
                self.resource = Some(resource);
                self.destroyed = false;
                resource
            }
        };

        let staging = device.create_committed_resource(
            &ResourceDesc::buffer(size),
            HeapType::Upload,
            ResourceState::GenericRead,
        )?;
        device.map(staging)?.as_mut_slice()[..data.len()].copy_from_slice(data);

        list.copy_buffer_region(target, 0, staging, 0, size);
        list.resource_barrier(&TransitionBarrier {
            resource: target,
            subresource: None,
            before: ResourceState::CopyDest,
            after: self.kind.ready_state(),
        });
        graveyard.push(staging);

        self.state = self.kind.ready_state();
        self.data_size = data.len() as u32;
        Ok(())
    }

    /// Hands the resource to `graveyard` and marks the buffer destroyed.
    pub fn retire(&mut self, graveyard: &mut ResourceGraveyard) {
        if graveyard.retire(&mut self.resource) {
            self.destroyed = true;
            self.state = ResourceState::Common;
        }
    }
}
