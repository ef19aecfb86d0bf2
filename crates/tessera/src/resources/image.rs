use std::{
    hash::{Hash, Hasher},
    sync::Arc,
};

use ash::vk;

use super::{DeviceResource, SharingMode};
use crate::{
    allocator::{ManagedAllocation, MappedRange},
    context::Device,
    error::ResourceError,
    flags::{
        AddressMode, BorderColour, CompareOp, Filter, ImageAspect, ImageFormat, ImageLayout,
        ImageType, ImageUsage, ImageViewType, MemoryType, MipmapMode, SampleCount,
    },
    swapchain::SwapchainHandle,
};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ImageDesc {
    pub image_type: ImageType,
    pub format: ImageFormat,
    ///Host visible images are created with linear tiling. Those have to be 2d, single sampled and have exactly one
    /// mip level and array layer.
    pub memory: MemoryType,
    pub usage: ImageUsage,
    pub extent: vk::Extent3D,
    pub samples: SampleCount,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub sharing: SharingMode,
}

impl Default for ImageDesc {
    fn default() -> Self {
        ImageDesc {
            image_type: ImageType::Tex2d,
            format: ImageFormat::R8G8B8A8Unorm,
            memory: MemoryType::DeviceLocal,
            usage: ImageUsage::SAMPLED,
            extent: vk::Extent3D {
                width: 1,
                height: 1,
                depth: 1,
            },
            samples: SampleCount::X1,
            mip_levels: 1,
            array_layers: 1,
            sharing: SharingMode::Exclusive,
        }
    }
}

impl ImageDesc {
    ///Creates a simple 2d image description meant as colour attachment. You might have to add additional usages
    /// depending on your use case.
    pub fn colour_attachment_2d(width: u32, height: u32, format: ImageFormat) -> Self {
        ImageDesc {
            format,
            usage: ImageUsage::COLOUR_ATTACHMENT | ImageUsage::SAMPLED,
            extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
            ..Default::default()
        }
    }

    pub fn depth_attachment_2d(width: u32, height: u32, format: ImageFormat) -> Self {
        ImageDesc {
            format,
            usage: ImageUsage::DEPTH_STENCIL_ATTACHMENT,
            extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
            ..Default::default()
        }
    }

    ///Creates a simple texture image that has the sampled bit set as well as the transfer destination bit.
    pub fn texture_2d(width: u32, height: u32, format: ImageFormat) -> Self {
        ImageDesc {
            format,
            usage: ImageUsage::SAMPLED | ImageUsage::TRANSFER_DESTINATION,
            extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
            ..Default::default()
        }
    }

    pub fn add_usage(mut self, usage: ImageUsage) -> Self {
        self.usage |= usage;
        self
    }

    ///True if the description can be backed by linear, host visible memory.
    pub(crate) fn is_valid_linear(&self) -> bool {
        self.image_type == ImageType::Tex2d
            && self.samples == SampleCount::X1
            && self.mip_levels == 1
            && self.array_layers == 1
            && !self.format.is_depth_stencil()
    }
}

enum ImageStorage {
    Allocated(ManagedAllocation),
    ///Owned by the swapchain. Keeps it alive while the image is in use.
    Swapchain(#[allow(dead_code)] Arc<SwapchainHandle>),
}

///Self managing image that allocates its memory from the device's allocator and frees it when dropped.
///
/// Images of a swapchain are never destroyed by the image itself.
//Note Freeing happens in `ManagedAllocation`'s implementation.
pub struct Image {
    ///vulkan image handle
    pub inner: vk::Image,
    pub desc: ImageDesc,
    pub device: Arc<Device>,
    format: vk::Format,
    size: u64,
    storage: ImageStorage,
}

impl Image {
    ///Creates the image based on the description. Device local images start in the *undefined* layout, host
    /// visible ones in the *preinitialized* layout.
    pub fn new(
        device: &Arc<Device>,
        mut desc: ImageDesc,
        name: Option<&str>,
    ) -> Result<Self, ResourceError> {
        let linear = desc.memory == MemoryType::HostVisible;
        if linear && !desc.is_valid_linear() {
            return Err(ResourceError::UnsupportedLinearImage);
        }
        desc.extent = desc.image_type.valid_extent(desc.extent);

        let format = device.resolve_format(desc.format)?;
        let (tiling, initial_layout) = if linear {
            (vk::ImageTiling::LINEAR, vk::ImageLayout::PREINITIALIZED)
        } else {
            (vk::ImageTiling::OPTIMAL, vk::ImageLayout::UNDEFINED)
        };

        let (sharing_mode, families) = desc.sharing.to_vk();
        let create_info = vk::ImageCreateInfo::default()
            .image_type(desc.image_type.to_vk())
            .format(format)
            .extent(desc.extent)
            .mip_levels(desc.mip_levels)
            .array_layers(desc.array_layers)
            .samples(desc.samples.to_vk())
            .tiling(tiling)
            .usage(desc.usage.to_vk())
            .sharing_mode(sharing_mode)
            .queue_family_indices(families)
            .initial_layout(initial_layout);

        let image = unsafe { device.inner.create_image(&create_info, None)? };
        let requirements = unsafe { device.inner.get_image_memory_requirements(image) };

        let allocation = match device.allocate(
            name.unwrap_or("tessera image"),
            requirements,
            desc.memory,
            linear,
        ) {
            Ok(a) => a,
            Err(e) => {
                unsafe { device.inner.destroy_image(image, None) };
                return Err(e.into());
            }
        };

        if let Err(e) = unsafe {
            device
                .inner
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        } {
            device.free(allocation);
            unsafe { device.inner.destroy_image(image, None) };
            return Err(e.into());
        }

        let storage = ImageStorage::Allocated(ManagedAllocation::new(
            device,
            allocation,
            desc.memory,
        ));
        Ok(Image {
            inner: image,
            desc,
            device: device.clone(),
            format,
            size: requirements.size,
            storage,
        })
    }

    ///Wraps an image owned by a swapchain.
    pub(crate) fn from_swapchain(
        device: &Arc<Device>,
        swapchain: &Arc<SwapchainHandle>,
        image: vk::Image,
        format: vk::Format,
        desc: ImageDesc,
    ) -> Self {
        Image {
            inner: image,
            desc,
            device: device.clone(),
            format,
            size: 0,
            storage: ImageStorage::Swapchain(swapchain.clone()),
        }
    }

    pub fn format(&self) -> ImageFormat {
        self.desc.format
    }

    ///The concrete format the image was created with.
    pub fn vk_format(&self) -> vk::Format {
        self.format
    }

    pub fn image_type(&self) -> ImageType {
        self.desc.image_type
    }

    pub fn usage(&self) -> ImageUsage {
        self.desc.usage
    }

    pub fn extent(&self) -> vk::Extent3D {
        self.desc.extent
    }

    ///In case of 3d image formats the depth is ignored.
    pub fn extent_2d(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.desc.extent.width,
            height: self.desc.extent.height,
        }
    }

    pub fn samples(&self) -> SampleCount {
        self.desc.samples
    }

    pub fn mip_levels(&self) -> u32 {
        self.desc.mip_levels
    }

    pub fn array_layers(&self) -> u32 {
        self.desc.array_layers
    }

    ///Size of the memory backing the image in bytes. Zero for swapchain images.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_swapchain_image(&self) -> bool {
        matches!(self.storage, ImageStorage::Swapchain(_))
    }

    pub fn can_be_mapped(&self) -> bool {
        match &self.storage {
            ImageStorage::Allocated(allocation) => allocation.can_be_mapped(),
            ImageStorage::Swapchain(_) => false,
        }
    }

    ///Memory layout of the image's only subresource. Only meaningful for host visible, linear images.
    pub fn linear_layout(&self) -> Option<vk::SubresourceLayout> {
        if !self.can_be_mapped() {
            return None;
        }
        let subresource = vk::ImageSubresource::default()
            .aspect_mask(self.desc.format.aspect().to_vk())
            .mip_level(0)
            .array_layer(0);
        Some(unsafe {
            self.device
                .inner
                .get_image_subresource_layout(self.inner, subresource)
        })
    }

    ///Maps `size` bytes of the image's memory starting at `offset`. Use [linear_layout](Image::linear_layout) to
    /// find the row pitch.
    pub fn map(&mut self, size: u64, offset: u64) -> Result<MappedRange<'_>, ResourceError> {
        let capacity = self.size;
        match &mut self.storage {
            ImageStorage::Allocated(allocation) => allocation.map(size, offset, capacity),
            ImageStorage::Swapchain(_) => Err(ResourceError::NotMappable),
        }
    }

    ///Layout the image is in right after creation.
    pub fn initial_layout(&self) -> ImageLayout {
        if self.desc.memory == MemoryType::HostVisible && !self.is_swapchain_image() {
            ImageLayout::Preinitialized
        } else {
            ImageLayout::Undefined
        }
    }
}

impl DeviceResource for Image {
    type Raw = vk::Image;
    fn raw(&self) -> Self::Raw {
        self.inner
    }
}

///The hash implementation is based on [Image](ash::vk::Image)'s hash.
impl Hash for Image {
    fn hash<H: Hasher>(&self, hasher: &mut H) {
        self.inner.hash(hasher)
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        if let ImageStorage::Allocated(_) = self.storage {
            unsafe { self.device.inner.destroy_image(self.inner, None) }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImageViewDesc {
    pub view_type: ImageViewType,
    pub aspect: ImageAspect,
    pub base_mip_level: u32,
    pub level_count: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
}

impl ImageViewDesc {
    ///View over all mip levels and layers of `image`.
    pub fn full(image: &Image) -> Self {
        ImageViewDesc {
            view_type: image.desc.image_type.default_view_type(),
            aspect: image.desc.format.aspect(),
            base_mip_level: 0,
            level_count: image.desc.mip_levels,
            base_array_layer: 0,
            layer_count: image.desc.array_layers,
        }
    }

    pub fn with_aspect(mut self, aspect: ImageAspect) -> Self {
        self.aspect = aspect;
        self
    }

    ///True if the described range lies within `mip_levels` and `array_layers`.
    pub(crate) fn fits(&self, mip_levels: u32, array_layers: u32) -> bool {
        let levels = self
            .base_mip_level
            .checked_add(self.level_count)
            .map(|end| end <= mip_levels)
            .unwrap_or(false);
        let layers = self
            .base_array_layer
            .checked_add(self.layer_count)
            .map(|end| end <= array_layers)
            .unwrap_or(false);
        self.level_count > 0 && self.layer_count > 0 && levels && layers && !self.aspect.is_empty()
    }
}

///Image view that keeps its image alive.
pub struct ImageView {
    pub inner: vk::ImageView,
    pub desc: ImageViewDesc,
    pub image: Arc<Image>,
}

impl ImageView {
    pub fn new(image: &Arc<Image>, desc: ImageViewDesc) -> Result<Self, ResourceError> {
        if !desc.fits(image.desc.mip_levels, image.desc.array_layers) {
            return Err(ResourceError::InvalidViewRange);
        }

        let create_info = vk::ImageViewCreateInfo::default()
            .image(image.inner)
            .view_type(desc.view_type.to_vk())
            .format(image.format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(desc.aspect.to_vk())
                    .base_mip_level(desc.base_mip_level)
                    .level_count(desc.level_count)
                    .base_array_layer(desc.base_array_layer)
                    .layer_count(desc.layer_count),
            );
        let inner = unsafe { image.device.inner.create_image_view(&create_info, None)? };

        Ok(ImageView {
            inner,
            desc,
            image: image.clone(),
        })
    }

    ///View over the whole `image`.
    pub fn full(image: &Arc<Image>) -> Result<Self, ResourceError> {
        Self::new(image, ImageViewDesc::full(image))
    }

    pub fn view_type(&self) -> ImageViewType {
        self.desc.view_type
    }

    pub fn base_mip_level(&self) -> u32 {
        self.desc.base_mip_level
    }

    pub fn level_count(&self) -> u32 {
        self.desc.level_count
    }

    pub fn base_array_layer(&self) -> u32 {
        self.desc.base_array_layer
    }

    pub fn layer_count(&self) -> u32 {
        self.desc.layer_count
    }
}

impl DeviceResource for ImageView {
    type Raw = vk::ImageView;
    fn raw(&self) -> Self::Raw {
        self.inner
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        unsafe {
            self.image
                .device
                .inner
                .destroy_image_view(self.inner, None)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplerDesc {
    pub mag_filter: Filter,
    pub min_filter: Filter,
    pub mipmap_mode: MipmapMode,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
    pub mip_lod_bias: f32,
    ///Ignored if the device does not support anisotropic filtering. Clamped to the device limit otherwise.
    pub max_anisotropy: Option<f32>,
    pub compare: Option<CompareOp>,
    pub min_lod: f32,
    pub max_lod: f32,
    pub border: BorderColour,
    pub unnormalized_coordinates: bool,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        SamplerDesc {
            mag_filter: Filter::default(),
            min_filter: Filter::default(),
            mipmap_mode: MipmapMode::default(),
            address_u: AddressMode::default(),
            address_v: AddressMode::default(),
            address_w: AddressMode::default(),
            mip_lod_bias: 0.0,
            max_anisotropy: None,
            compare: None,
            min_lod: 0.0,
            max_lod: vk::LOD_CLAMP_NONE,
            border: BorderColour::default(),
            unnormalized_coordinates: false,
        }
    }
}

pub struct Sampler {
    pub inner: vk::Sampler,
    pub desc: SamplerDesc,
    pub device: Arc<Device>,
}

impl Sampler {
    pub fn new(device: &Arc<Device>, desc: SamplerDesc) -> Result<Self, vk::Result> {
        let anisotropy = match desc.max_anisotropy {
            Some(max) if device.enabled_features.sampler_anisotropy == vk::TRUE => {
                Some(max.clamp(1.0, device.limits().max_sampler_anisotropy))
            }
            Some(_max) => {
                #[cfg(feature = "logging")]
                log::warn!("Anisotropic filtering is not supported, ignoring max anisotropy");
                None
            }
            None => None,
        };

        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(desc.mag_filter.to_vk())
            .min_filter(desc.min_filter.to_vk())
            .mipmap_mode(desc.mipmap_mode.to_vk())
            .address_mode_u(desc.address_u.to_vk())
            .address_mode_v(desc.address_v.to_vk())
            .address_mode_w(desc.address_w.to_vk())
            .mip_lod_bias(desc.mip_lod_bias)
            .anisotropy_enable(anisotropy.is_some())
            .max_anisotropy(anisotropy.unwrap_or(1.0))
            .compare_enable(desc.compare.is_some())
            .compare_op(desc.compare.unwrap_or(CompareOp::Always).to_vk())
            .min_lod(desc.min_lod)
            .max_lod(desc.max_lod)
            .border_color(desc.border.to_vk())
            .unnormalized_coordinates(desc.unnormalized_coordinates);

        let inner = unsafe { device.inner.create_sampler(&create_info, None)? };
        Ok(Sampler {
            inner,
            desc,
            device: device.clone(),
        })
    }
}

impl DeviceResource for Sampler {
    type Raw = vk::Sampler;
    fn raw(&self) -> Self::Raw {
        self.inner
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_sampler(self.inner, None) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(Image: Send, Sync);
        assert_impl_all!(ImageView: Send, Sync);
        assert_impl_all!(Sampler: Send, Sync);
    }

    #[test]
    fn linear_images_are_restricted() {
        let mut desc = ImageDesc {
            memory: MemoryType::HostVisible,
            ..ImageDesc::texture_2d(64, 64, ImageFormat::R8G8B8A8Unorm)
        };
        assert!(desc.is_valid_linear());

        desc.mip_levels = 4;
        assert!(!desc.is_valid_linear());
        desc.mip_levels = 1;

        desc.image_type = ImageType::Tex3d;
        assert!(!desc.is_valid_linear());
        desc.image_type = ImageType::Tex2d;

        desc.format = ImageFormat::DepthOnly;
        assert!(!desc.is_valid_linear());
    }

    #[test]
    fn view_range_must_fit_image() {
        let desc = ImageViewDesc {
            view_type: ImageViewType::Tex2d,
            aspect: ImageAspect::COLOUR,
            base_mip_level: 0,
            level_count: 4,
            base_array_layer: 0,
            layer_count: 1,
        };
        assert!(desc.fits(4, 1));
        assert!(!desc.fits(3, 1));

        let shifted = ImageViewDesc {
            base_mip_level: 2,
            level_count: 2,
            ..desc
        };
        assert!(shifted.fits(4, 1));
        assert!(!shifted.fits(4, 0));

        let empty = ImageViewDesc {
            level_count: 0,
            ..desc
        };
        assert!(!empty.fits(4, 1));

        let overflow = ImageViewDesc {
            base_array_layer: u32::MAX,
            layer_count: 2,
            ..desc
        };
        assert!(!overflow.fits(4, u32::MAX));
    }

    #[test]
    fn default_sampler_is_trilinear_repeat() {
        let desc = SamplerDesc::default();
        assert_eq!(desc.mag_filter, Filter::Linear);
        assert_eq!(desc.mipmap_mode, MipmapMode::Linear);
        assert_eq!(desc.address_u, AddressMode::Repeat);
        assert!(desc.compare.is_none());
        assert_eq!(desc.max_lod, vk::LOD_CLAMP_NONE);
    }
}
