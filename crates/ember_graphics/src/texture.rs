//! Textures & Samplers
//!
//! A [`Texture`] owns one 2D GPU texture with a resource state tracked per
//! mip. The resource is created lazily by the first upload. Uploads are
//! written row by row into a pitched staging buffer (rows padded to
//! [`TEXTURE_ROW_PITCH_ALIGNMENT`]), copied on the GPU timeline, and the
//! staging buffer is retired like any other transient resource.
//!
//! Samplers live in one context-wide [`SamplerPool`]: a shader-visible
//! sampler heap filled on demand and searched linearly for an identical
//! description before a new descriptor is written.

use std::borrow::Cow;

use ember_core::align_up;

use crate::error::{GraphicsError, Result};
use crate::graveyard::ResourceGraveyard;
use crate::hal::{
    CommandList, CpuDescriptor, DescriptorHeapDesc, DescriptorHeapKind, Device, GpuDescriptor,
    HeapType, RawDescriptorHeap, RawResource, ResourceDesc, ResourceState, SamplerDesc,
    TextureRegionCopy, TransitionBarrier,
};
use crate::scratch::TextureView;
use crate::types::{TextureFilter, TextureFormat, TextureWrap};

/// Row alignment of buffer-to-texture copies.
pub const TEXTURE_ROW_PITCH_ALIGNMENT: u32 = 256;

pub const MAX_ANISOTROPY: u32 = 32;

// ─── Parameters ──────────────────────────────────────────────────────────────

/// Dimensions a texture is created with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureCreationParams {
    pub width: u32,
    pub height: u32,
    /// Size of the source image before any power-of-two padding.
    pub original_width: u32,
    pub original_height: u32,
    pub mip_map_count: u16,
}

impl TextureCreationParams {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            original_width: width,
            original_height: height,
            mip_map_count: 1,
        }
    }
}

/// One upload: pixel data for a mip (or a sub-rectangle of it) plus the
/// sampling parameters to apply.
#[derive(Clone, Copy, Debug)]
pub struct TextureParams<'a> {
    pub data: &'a [u8],
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
    pub mip_map: u16,
    pub x: u32,
    pub y: u32,
    pub sub_update: bool,
    pub min_filter: TextureFilter,
    pub mag_filter: TextureFilter,
    pub u_wrap: TextureWrap,
    pub v_wrap: TextureWrap,
    pub max_anisotropy: f32,
}

impl<'a> TextureParams<'a> {
    #[must_use]
    pub fn new(data: &'a [u8], format: TextureFormat, width: u32, height: u32) -> Self {
        Self {
            data,
            format,
            width,
            height,
            mip_map: 0,
            x: 0,
            y: 0,
            sub_update: false,
            min_filter: TextureFilter::Default,
            mag_filter: TextureFilter::Default,
            u_wrap: TextureWrap::Repeat,
            v_wrap: TextureWrap::Repeat,
            max_anisotropy: 1.0,
        }
    }
}

/// Expands tightly packed RGB to RGBA with opaque alpha.
#[must_use]
pub fn repack_rgb_to_rgba(rgb: &[u8]) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(rgb.len() / 3 * 4);
    for pixel in rgb.chunks_exact(3) {
        rgba.extend_from_slice(pixel);
        rgba.push(0xff);
    }
    rgba
}

// ─── Texture ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Texture {
    resource: Option<RawResource>,
    format: Option<TextureFormat>,
    device_format: Option<wgpu::TextureFormat>,
    width: u32,
    height: u32,
    original_width: u32,
    original_height: u32,
    mip_map_count: u16,
    resource_states: Vec<ResourceState>,
    sampler_index: u32,
}

impl Texture {
    #[must_use]
    pub fn new(params: &TextureCreationParams, sampler_index: u32) -> Self {
        Self {
            resource: None,
            format: None,
            device_format: None,
            width: params.width,
            height: params.height,
            original_width: params.original_width,
            original_height: params.original_height,
            mip_map_count: params.mip_map_count.max(1),
            resource_states: Vec::new(),
            sampler_index,
        }
    }

    #[inline]
    #[must_use]
    pub fn resource(&self) -> Option<RawResource> {
        self.resource
    }

    #[inline]
    #[must_use]
    pub fn format(&self) -> Option<TextureFormat> {
        self.format
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    #[must_use]
    pub fn original_width(&self) -> u32 {
        self.original_width
    }

    #[inline]
    #[must_use]
    pub fn original_height(&self) -> u32 {
        self.original_height
    }

    #[inline]
    #[must_use]
    pub fn mip_map_count(&self) -> u16 {
        self.mip_map_count
    }

    #[must_use]
    pub fn mip_state(&self, mip: u16) -> Option<ResourceState> {
        self.resource_states.get(usize::from(mip)).copied()
    }

    #[inline]
    #[must_use]
    pub fn sampler_index(&self) -> u32 {
        self.sampler_index
    }

    pub(crate) fn set_sampler_index(&mut self, index: u32) {
        self.sampler_index = index;
    }

    /// SRV description, once the texture has a resource.
    #[must_use]
    pub fn view(&self) -> Option<TextureView> {
        Some(TextureView {
            resource: self.resource?,
            format: self.device_format?,
            mip_levels: u32::from(self.mip_map_count),
        })
    }

    /// Records an upload of one mip (or sub-rectangle). Creates or recreates
    /// the resource when the format or the base size changes. Empty data
    /// only (re)allocates.
    pub fn upload<D: Device>(
        &mut self,
        device: &mut D,
        list: &mut D::CommandList,
        graveyard: &mut ResourceGraveyard,
        params: &TextureParams<'_>,
    ) -> Result<()> {
        let Some(device_format) = params.format.device_format() else {
            log::error!("Texture format {:?} cannot be uploaded", params.format);
            return Err(GraphicsError::Unsupported(format!(
                "texture format {:?}",
                params.format
            )));
        };
        if params.width == 0 || params.height == 0 {
            return Err(GraphicsError::InvalidTextureSize {
                width: params.width,
                height: params.height,
            });
        }

        let resize = params.mip_map == 0
            && !params.sub_update
            && (params.width != self.width || params.height != self.height);
        if resize {
            self.width = params.width;
            self.height = params.height;
        }
        if self.resource.is_some() && (resize || self.device_format != Some(device_format)) {
            graveyard.retire(&mut self.resource);
        }

        let resource = match self.resource {
            Some(resource) => resource,
            None => {
                let resource = device.create_committed_resource(
                    &ResourceDesc::texture_2d(
                        self.width,
                        self.height,
                        u32::from(self.mip_map_count),
                        device_format,
                    ),
                    HeapType::Default,
                    ResourceState::CopyDest,
                )?;
                device.set_name(resource, "Texture");
                self.resource = Some(resource);
                self.resource_states = vec![ResourceState::CopyDest; usize::from(self.mip_map_count)];
                resource
            }
        };
        self.format = Some(params.format);
        self.device_format = Some(device_format);

        let mip = usize::from(params.mip_map);
        if mip >= self.resource_states.len() {
            log::warn!(
                "Mip {} is beyond the {} levels of the texture; skipped",
                params.mip_map,
                self.resource_states.len()
            );
            return Ok(());
        }
        if params.data.is_empty() {
            return Ok(());
        }

        let pixels: Cow<'_, [u8]> = if params.format == TextureFormat::Rgb {
            Cow::Owned(repack_rgb_to_rgba(params.data))
        } else {
            Cow::Borrowed(params.data)
        };
        let row_bytes = params.width * params.format.device_bytes_per_pixel();
        let row_pitch = align_up(row_bytes, TEXTURE_ROW_PITCH_ALIGNMENT);
        let expected = (row_bytes * params.height) as usize;
        if pixels.len() < expected {
            return Err(GraphicsError::TextureDataSize {
                expected,
                actual: pixels.len(),
            });
        }

        let staging = device.create_committed_resource(
            &ResourceDesc::buffer(u64::from(row_pitch) * u64::from(params.height)),
            HeapType::Upload,
            ResourceState::GenericRead,
        )?;
        {
            let mut mapped = device.map(staging)?;
            let dst = mapped.as_mut_slice();
            for (row, src) in pixels.chunks_exact(row_bytes as usize).take(params.height as usize).enumerate() {
                let start = row * row_pitch as usize;
                dst[start..start + src.len()].copy_from_slice(src);
            }
        }

        let before = self.resource_states[mip];
        if before != ResourceState::CopyDest {
            list.resource_barrier(&TransitionBarrier {
                resource,
                subresource: Some(u32::from(params.mip_map)),
                before,
                after: ResourceState::CopyDest,
            });
        }
        list.copy_texture_region(&TextureRegionCopy {
            dst: resource,
            mip_level: u32::from(params.mip_map),
            dst_x: if params.sub_update { params.x } else { 0 },
            dst_y: if params.sub_update { params.y } else { 0 },
            src: staging,
            src_offset: 0,
            row_pitch,
            width: params.width,
            height: params.height,
            format: device_format,
        });
        list.resource_barrier(&TransitionBarrier {
            resource,
            subresource: Some(u32::from(params.mip_map)),
            before: ResourceState::CopyDest,
            after: ResourceState::PixelShaderResource,
        });
        self.resource_states[mip] = ResourceState::PixelShaderResource;
        graveyard.push(staging);
        Ok(())
    }

    pub fn retire(&mut self, graveyard: &mut ResourceGraveyard) {
        graveyard.retire(&mut self.resource);
        self.resource_states.clear();
    }
}

// ─── Sampler Pool ────────────────────────────────────────────────────────────

/// Builds a sampler description, resolving `Default` filters to the
/// context defaults and clamping anisotropy to `1..=32`.
#[must_use]
pub fn sampler_desc(
    min_filter: TextureFilter,
    mag_filter: TextureFilter,
    u_wrap: TextureWrap,
    v_wrap: TextureWrap,
    max_lod: f32,
    max_anisotropy: f32,
    defaults: (TextureFilter, TextureFilter),
) -> SamplerDesc {
    let resolve = |filter: TextureFilter, default: TextureFilter| match filter {
        TextureFilter::Default => default,
        other => other,
    };
    let (min, mip) = resolve(min_filter, defaults.0).modes();
    let (mag, _) = resolve(mag_filter, defaults.1).modes();
    SamplerDesc {
        min_filter: min,
        mag_filter: mag,
        mip_filter: mip,
        address_u: u_wrap.address_mode(),
        address_v: v_wrap.address_mode(),
        max_lod,
        max_anisotropy: (max_anisotropy.round() as u32).clamp(1, MAX_ANISOTROPY),
    }
}

#[derive(Debug)]
struct SamplerEntry {
    desc: SamplerDesc,
    descriptor_offset: u32,
}

/// Context-wide cache of sampler descriptors.
#[derive(Debug)]
pub struct SamplerPool {
    heap: RawDescriptorHeap,
    cpu_start: CpuDescriptor,
    gpu_start: GpuDescriptor,
    increment: u32,
    capacity: u32,
    entries: Vec<SamplerEntry>,
}

impl SamplerPool {
    pub fn new<D: Device>(device: &mut D, capacity: u32) -> Result<Self> {
        let heap = device.create_descriptor_heap(&DescriptorHeapDesc {
            kind: DescriptorHeapKind::Sampler,
            count: capacity,
            shader_visible: true,
        })?;
        Ok(Self {
            heap,
            cpu_start: device.cpu_descriptor_start(heap),
            gpu_start: device.gpu_descriptor_start(heap),
            increment: device.descriptor_increment_size(DescriptorHeapKind::Sampler),
            capacity,
            entries: Vec::with_capacity(capacity as usize),
        })
    }

    /// Index of a sampler matching `desc`, writing a new descriptor if none
    /// exists yet.
    pub fn get_or_create<D: Device>(&mut self, device: &mut D, desc: &SamplerDesc) -> Result<u32> {
        if let Some(index) = self.entries.iter().position(|entry| entry.desc == *desc) {
            return Ok(index as u32);
        }
        let index = self.entries.len() as u32;
        if index >= self.capacity {
            return Err(GraphicsError::SamplerPoolExhausted(self.capacity));
        }
        device.create_sampler(desc, self.cpu_start.offset(index, self.increment));
        self.entries.push(SamplerEntry {
            desc: *desc,
            descriptor_offset: index * self.increment,
        });
        log::debug!("Sampler {index} created: {desc:?}");
        Ok(index)
    }

    #[must_use]
    pub fn gpu_descriptor(&self, index: u32) -> Option<GpuDescriptor> {
        self.entries
            .get(index as usize)
            .map(|entry| self.gpu_start.offset_bytes(entry.descriptor_offset))
    }

    #[inline]
    #[must_use]
    pub fn heap(&self) -> RawDescriptorHeap {
        self.heap
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

    pub fn release<D: Device>(&mut self, device: &mut D) {
        device.release_descriptor_heap(self.heap);
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::headless::{Command, HeadlessCommandList, HeadlessDevice};

    const DEFAULTS: (TextureFilter, TextureFilter) = (TextureFilter::Linear, TextureFilter::Linear);

    fn recording(device: &mut HeadlessDevice) -> HeadlessCommandList {
        let allocator = device.create_command_allocator().unwrap();
        let mut list = device.create_command_list(allocator).unwrap();
        list.reset(allocator).unwrap();
        list
    }

    #[test]
    fn test_rgb_repack() {
        assert_eq!(repack_rgb_to_rgba(&[1, 2, 3, 4, 5, 6]), [1, 2, 3, 255, 4, 5, 6, 255]);
    }

    #[test]
    fn test_upload_pitches_rows_and_transitions() {
        let mut device = HeadlessDevice::new();
        let controller = device.controller();
        let mut list = recording(&mut device);
        let mut graveyard = ResourceGraveyard::new();
        let mut texture = Texture::new(&TextureCreationParams::new(2, 2), 0);

        let data = [7u8; 2 * 2 * 3];
        texture
            .upload(&mut device, &mut list, &mut graveyard, &TextureParams::new(&data, TextureFormat::Rgb, 2, 2))
            .unwrap();

        let resource = texture.resource().unwrap();
        assert_eq!(texture.mip_state(0), Some(ResourceState::PixelShaderResource));
        assert_eq!(graveyard.len(), 1);

        let staging = list
            .commands()
            .iter()
            .find_map(|c| match c {
                Command::CopyTextureRegion(copy) => Some(*copy),
                _ => None,
            })
            .unwrap();
        assert_eq!(staging.dst, resource);
        assert_eq!(staging.row_pitch, 256);
        let bytes = controller.buffer_contents(staging.src).unwrap();
        assert_eq!(bytes.len(), 512);
        assert_eq!(&bytes[..8], &[7, 7, 7, 255, 7, 7, 7, 255]);
        assert_eq!(&bytes[256..264], &[7, 7, 7, 255, 7, 7, 7, 255]);
    }

    #[test]
    fn test_reupload_transitions_from_shader_resource() {
        let mut device = HeadlessDevice::new();
        let mut list = recording(&mut device);
        let mut graveyard = ResourceGraveyard::new();
        let mut texture = Texture::new(&TextureCreationParams::new(1, 1), 0);
        let params = TextureParams::new(&[1, 2, 3, 4], TextureFormat::Rgba, 1, 1);

        texture.upload(&mut device, &mut list, &mut graveyard, &params).unwrap();
        let resource = texture.resource().unwrap();
        texture.upload(&mut device, &mut list, &mut graveyard, &params).unwrap();

        assert_eq!(texture.resource(), Some(resource));
        assert!(list.commands().contains(&Command::Barrier(TransitionBarrier {
            resource,
            subresource: Some(0),
            before: ResourceState::PixelShaderResource,
            after: ResourceState::CopyDest,
        })));
    }

    #[test]
    fn test_zero_sized_upload_rejected() {
        let mut device = HeadlessDevice::new();
        let controller = device.controller();
        let mut list = recording(&mut device);
        let mut graveyard = ResourceGraveyard::new();
        let mut texture = Texture::new(&TextureCreationParams::new(4, 4), 0);
        let live_before = controller.live_resource_count();

        let err = texture
            .upload(&mut device, &mut list, &mut graveyard, &TextureParams::new(&[0; 4], TextureFormat::Rgba, 0, 4))
            .unwrap_err();
        assert!(matches!(err, GraphicsError::InvalidTextureSize { width: 0, height: 4 }));
        assert!(texture.resource().is_none());
        assert_eq!((texture.width(), texture.height()), (4, 4));
        assert_eq!(controller.live_resource_count(), live_before);
        assert!(list.commands().is_empty());
    }

    #[test]
    fn test_resize_and_short_data() {
        let mut device = HeadlessDevice::new();
        let mut list = recording(&mut device);
        let mut graveyard = ResourceGraveyard::new();
        let mut texture = Texture::new(&TextureCreationParams::new(1, 1), 0);

        texture
            .upload(&mut device, &mut list, &mut graveyard, &TextureParams::new(&[0; 4], TextureFormat::Rgba, 1, 1))
            .unwrap();
        let first = texture.resource().unwrap();
        let err = texture
            .upload(&mut device, &mut list, &mut graveyard, &TextureParams::new(&[0; 4], TextureFormat::Rgba, 4, 4))
            .unwrap_err();

        assert!(matches!(err, GraphicsError::TextureDataSize { expected: 64, actual: 4 }));
        assert!(graveyard.contains(first));
        assert_eq!((texture.width(), texture.height()), (4, 4));
    }

    #[test]
    fn test_depth_format_rejected() {
        let mut device = HeadlessDevice::new();
        let mut list = recording(&mut device);
        let mut graveyard = ResourceGraveyard::new();
        let mut texture = Texture::new(&TextureCreationParams::new(1, 1), 0);
        assert!(
            texture
                .upload(&mut device, &mut list, &mut graveyard, &TextureParams::new(&[0; 4], TextureFormat::Depth, 1, 1))
                .is_err()
        );
        assert!(texture.resource().is_none());
    }

    #[test]
    fn test_sampler_pool_dedupes_and_fills() {
        let mut device = HeadlessDevice::new();
        let mut pool = SamplerPool::new(&mut device, 2).unwrap();
        let linear = sampler_desc(
            TextureFilter::Default,
            TextureFilter::Default,
            TextureWrap::Repeat,
            TextureWrap::Repeat,
            1.0,
            64.0,
            DEFAULTS,
        );
        assert_eq!(linear.max_anisotropy, MAX_ANISOTROPY);
        assert_eq!(linear.min_filter, wgpu::FilterMode::Linear);

        let nearest = SamplerDesc {
            min_filter: wgpu::FilterMode::Nearest,
            ..linear
        };
        let clamp = SamplerDesc {
            address_u: wgpu::AddressMode::ClampToEdge,
            ..linear
        };

        assert_eq!(pool.get_or_create(&mut device, &linear).unwrap(), 0);
        assert_eq!(pool.get_or_create(&mut device, &nearest).unwrap(), 1);
        assert_eq!(pool.get_or_create(&mut device, &linear).unwrap(), 0);
        assert!(matches!(
            pool.get_or_create(&mut device, &clamp),
            Err(GraphicsError::SamplerPoolExhausted(2))
        ));

        let base = pool.gpu_descriptor(0).unwrap();
        let second = pool.gpu_descriptor(1).unwrap();
        assert_eq!(
            second.0 - base.0,
            u64::from(device.descriptor_increment_size(DescriptorHeapKind::Sampler))
        );
    }
}
