//! Presentation of rendered images.
//!
//! A [Swapchain] rotates a fixed set of images between the application and the presentation engine. The usual
//! frame looks like this:
//!
//! 1. [acquire_next_image](Swapchain::acquire_next_image) signals a semaphore once the image is available.
//! 2. A submission waits on that semaphore, renders into [image_index](Swapchain::image_index) and signals a second
//!    semaphore.
//! 3. [present_next_image](Swapchain::present_next_image) waits on the second semaphore and queues the present.
//!
//! If either step returns `false`, [should_recreate](Swapchain::should_recreate) is set. The caller then waits for
//! the device to be idle, calls [recreate](Swapchain::recreate) and rebuilds every framebuffer that used the old
//! image views.

use std::sync::Arc;

use ash::vk;

use crate::{
    context::{Device, Queue},
    error::SwapchainError,
    flags::{ImageFormat, ImageType, ImageUsage, MemoryType},
    resources::{DeviceResource, Image, ImageDesc, ImageView, SharingMode},
    surface::Surface,
    sync::Semaphore,
};

///Coarse outcome of a swapchain operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwapchainResult {
    Success,
    ///Nothing can be presented right now, for instance because the window is minimised. Try again later.
    Busy,
    ///The surface changed. Recreate the swapchain before continuing.
    Pending,
    Failed,
}

impl SwapchainError {
    ///Category a render loop usually reacts to.
    pub fn result(&self) -> SwapchainResult {
        match self {
            SwapchainError::ZeroExtent(_) => SwapchainResult::Busy,
            SwapchainError::OutOfDate | SwapchainError::WindowInUse | SwapchainError::SurfaceLost => {
                SwapchainResult::Pending
            }
            _ => SwapchainResult::Failed,
        }
    }
}

///Native swapchain. Shared by the [Swapchain] and all of its images, so the swapchain is only destroyed once the
/// last image of it is dropped. Keeps the device and surface alive until then.
pub(crate) struct SwapchainHandle {
    loader: ash::khr::swapchain::Device,
    inner: vk::SwapchainKHR,
    #[allow(dead_code)]
    device: Arc<Device>,
    #[allow(dead_code)]
    surface: Arc<Surface>,
}

impl Drop for SwapchainHandle {
    fn drop(&mut self) {
        #[cfg(feature = "logging")]
        log::trace!("Destroying swapchain {:?}", self.inner);
        unsafe { self.loader.destroy_swapchain(self.inner, None) }
    }
}

pub struct SwapchainCreateInfo<'a> {
    pub surface: &'a Arc<Surface>,
    pub device: &'a Arc<Device>,
    ///Queue presents are submitted to. Its family must be able to present to `surface`.
    pub present_queue: &'a Queue,
    ///Swapchain that is replaced by the new one. Only used as a hint, the old swapchain stays valid until it is
    /// dropped.
    pub old_swapchain: Option<&'a Swapchain>,
    ///Minimum number of images. Zero selects one more than the surface's minimum. Clamped to what the surface
    /// supports.
    pub requested_image_count: u32,
    ///If true, presentation waits for the vertical blank (FIFO).
    pub should_synchronise: bool,
    ///Used if the surface leaves the extent to the application.
    pub extent: vk::Extent2D,
}

///Prefers 8-bit sRGB formats, otherwise takes the first format tessera can describe.
pub(crate) fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
) -> Result<(vk::SurfaceFormatKHR, ImageFormat), SwapchainError> {
    const PREFERRED: [vk::Format; 2] = [vk::Format::B8G8R8A8_SRGB, vk::Format::B8G8R8A8_UNORM];

    PREFERRED
        .iter()
        .find_map(|preferred| formats.iter().find(|f| f.format == *preferred))
        .into_iter()
        .chain(formats.iter())
        .find_map(|f| ImageFormat::from_vk(f.format).map(|format| (*f, format)))
        .ok_or(SwapchainError::NoSurfaceFormat)
}

///FIFO is always available and the only vsync'd mode that is guaranteed. Otherwise prefers mailbox, then immediate.
pub(crate) fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    synchronise: bool,
) -> vk::PresentModeKHR {
    if synchronise {
        return vk::PresentModeKHR::FIFO;
    }
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| modes.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

///A `max` of zero means there is no upper limit.
pub(crate) fn choose_image_count(requested: u32, min: u32, max: u32) -> u32 {
    let count = if requested == 0 { min + 1 } else { requested };
    let count = count.max(min);
    if max == 0 { count } else { count.min(max) }
}

pub(crate) fn choose_extent(
    requested: vk::Extent2D,
    capabilities: &vk::SurfaceCapabilitiesKHR,
) -> Result<vk::Extent2D, SwapchainError> {
    let extent = if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else if requested.width == 0 || requested.height == 0 {
        //caller reports a minimised window, clamping would hide it
        return Err(SwapchainError::ZeroExtent(requested));
    } else {
        vk::Extent2D {
            width: requested.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width.max(capabilities.min_image_extent.width),
            ),
            height: requested.height.clamp(
                capabilities.min_image_extent.height,
                capabilities
                    .max_image_extent
                    .height
                    .max(capabilities.min_image_extent.height),
            ),
        }
    };

    if extent.width == 0 || extent.height == 0 {
        return Err(SwapchainError::ZeroExtent(extent));
    }
    Ok(extent)
}

///Tracks the last acquired image and whether it still has to be presented. Each acquisition allows exactly one
/// present.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct AcquireState {
    last: u32,
    pending: Option<u32>,
}

impl AcquireState {
    fn acquired(&mut self, index: u32) {
        self.last = index;
        self.pending = Some(index);
    }

    ///A failed acquire leaves nothing to present.
    fn failed(&mut self) {
        self.pending = None;
    }

    ///Index to present, if an image was acquired since the last present.
    fn take_presentable(&mut self) -> Option<u32> {
        self.pending.take()
    }

    fn is_acquired(&self) -> bool {
        self.pending.is_some()
    }
}

///Everything that is replaced when the swapchain is (re)created.
struct Generation {
    handle: Arc<SwapchainHandle>,
    images: Vec<Arc<Image>>,
    views: Vec<Arc<ImageView>>,
    format: ImageFormat,
    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
}

impl Generation {
    fn create(
        device: &Arc<Device>,
        surface: &Arc<Surface>,
        old: vk::SwapchainKHR,
        requested_image_count: u32,
        synchronise: bool,
        extent: vk::Extent2D,
    ) -> Result<Self, SwapchainError> {
        let capabilities = surface.get_capabilities(device.physical_device)?;
        let formats = surface.get_formats(device.physical_device)?;
        let present_modes = surface.get_present_modes(device.physical_device)?;

        let (surface_format, format) = choose_surface_format(&formats)?;
        let present_mode = choose_present_mode(&present_modes, synchronise);
        let image_count = choose_image_count(
            requested_image_count,
            capabilities.min_image_count,
            capabilities.max_image_count,
        );
        let extent = choose_extent(extent, &capabilities)?;

        let mut usage = ImageUsage::COLOUR_ATTACHMENT;
        if capabilities
            .supported_usage_flags
            .contains(vk::ImageUsageFlags::TRANSFER_DST)
        {
            usage |= ImageUsage::TRANSFER_DESTINATION;
        }
        let transform = if capabilities
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            capabilities.current_transform
        };
        let composite_alpha = if capabilities
            .supported_composite_alpha
            .contains(vk::CompositeAlphaFlagsKHR::OPAQUE)
        {
            vk::CompositeAlphaFlagsKHR::OPAQUE
        } else {
            vk::CompositeAlphaFlagsKHR::INHERIT
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(usage.to_vk())
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(transform)
            .composite_alpha(composite_alpha)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old);

        let loader = ash::khr::swapchain::Device::new(&device.instance.inner, &device.inner);
        let inner = unsafe { loader.create_swapchain(&create_info, None)? };
        let handle = Arc::new(SwapchainHandle {
            loader,
            inner,
            device: device.clone(),
            surface: surface.clone(),
        });

        let desc = ImageDesc {
            image_type: ImageType::Tex2d,
            format,
            memory: MemoryType::DeviceLocal,
            usage,
            extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            sharing: SharingMode::Exclusive,
            ..Default::default()
        };

        //If this fails, `handle` is dropped and destroys the new swapchain again.
        let images = unsafe { handle.loader.get_swapchain_images(handle.inner)? }
            .into_iter()
            .map(|image| {
                Arc::new(Image::from_swapchain(
                    device,
                    &handle,
                    image,
                    surface_format.format,
                    desc.clone(),
                ))
            })
            .collect::<Vec<_>>();
        let views = images
            .iter()
            .map(|image| ImageView::full(image).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        #[cfg(feature = "logging")]
        log::info!(
            "Created swapchain with {} images of {:?}, extent={:?}, mode={:?}",
            images.len(),
            surface_format.format,
            extent,
            present_mode
        );

        Ok(Generation {
            handle,
            images,
            views,
            format,
            surface_format,
            present_mode,
            extent,
        })
    }
}

///Swapchain that tracks the acquired image and whether it needs to be recreated.
pub struct Swapchain {
    pub device: Arc<Device>,
    pub surface: Arc<Surface>,
    present_queue: Queue,
    generation: Generation,
    requested_image_count: u32,
    synchronised: bool,
    acquire: AcquireState,
    recreate: bool,
}

impl Swapchain {
    pub fn new(info: &SwapchainCreateInfo) -> Result<Self, SwapchainError> {
        if !info.device.swapchain_enabled {
            return Err(SwapchainError::VkError(vk::Result::ERROR_EXTENSION_NOT_PRESENT));
        }
        let family = info.present_queue.family_index;
        if !info
            .surface
            .supports_queue_family(info.device.physical_device, family)
        {
            return Err(SwapchainError::PresentNotSupported(family));
        }

        let old = info
            .old_swapchain
            .map(|sc| sc.generation.handle.inner)
            .unwrap_or_else(vk::SwapchainKHR::null);

        let generation = Generation::create(
            info.device,
            info.surface,
            old,
            info.requested_image_count,
            info.should_synchronise,
            info.extent,
        )?;

        Ok(Swapchain {
            device: info.device.clone(),
            surface: info.surface.clone(),
            present_queue: info.present_queue.clone(),
            generation,
            requested_image_count: info.requested_image_count,
            synchronised: info.should_synchronise,
            acquire: AcquireState::default(),
            recreate: false,
        })
    }

    ///Acquires the next image and signals `signal` once it can be written to. Returns false if no image was
    /// acquired. In that case [should_recreate](Self::should_recreate) is set and `signal` is not signalled.
    ///
    /// A suboptimal swapchain still acquires the image, but flags the swapchain for recreation.
    pub fn acquire_next_image(&mut self, signal: &Semaphore) -> bool {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        let handle = &self.generation.handle;
        match unsafe {
            handle
                .loader
                .acquire_next_image(handle.inner, u64::MAX, signal.raw(), vk::Fence::null())
        } {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    #[cfg(feature = "logging")]
                    log::warn!("Acquired image {} is suboptimal", index);
                    self.recreate = true;
                }
                self.acquire.acquired(index);
                true
            }
            Err(e) => {
                #[cfg(feature = "logging")]
                log::warn!("Failed to acquire swapchain image: {}", e);
                let _ = e;
                self.acquire.failed();
                self.recreate = true;
                false
            }
        }
    }

    ///Presents the last acquired image after `wait` is signalled. Returns false if the swapchain is out of date,
    /// suboptimal or presenting failed. In that case [should_recreate](Self::should_recreate) is set.
    ///
    /// Also returns false, without touching the driver, if no image was acquired since the last present or
    /// recreation.
    pub fn present_next_image(&mut self, wait: &Semaphore) -> bool {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        let Some(image_index) = self.acquire.take_presentable() else {
            #[cfg(feature = "logging")]
            log::error!("Present without an acquired swapchain image");
            return false;
        };

        let handle = &self.generation.handle;
        let wait = wait.raw();
        let present_info = vk::PresentInfoKHR::default()
            .swapchains(core::slice::from_ref(&handle.inner))
            .image_indices(core::slice::from_ref(&image_index))
            .wait_semaphores(core::slice::from_ref(&wait));

        let result = self
            .present_queue
            .with_locked(|queue| unsafe { handle.loader.queue_present(queue, &present_info) });

        match result {
            Ok(false) => true,
            Ok(true) => {
                #[cfg(feature = "logging")]
                log::warn!("Swapchain is suboptimal on present");
                self.recreate = true;
                false
            }
            Err(e) => {
                #[cfg(feature = "logging")]
                log::warn!("Failed to present image {}: {}", image_index, e);
                let _ = e;
                self.recreate = true;
                false
            }
        }
    }

    ///Recreates the swapchain for `extent` with the settings it was created with. The current swapchain is handed
    /// to the driver as the old swapchain and only replaced once the new one exists. On failure `self` is left
    /// untouched.
    ///
    /// The caller must make sure the device no longer uses the old images, and has to rebuild every framebuffer
    /// that references the old [image_views](Self::image_views).
    pub fn recreate(&mut self, extent: vk::Extent2D) -> Result<(), SwapchainError> {
        #[cfg(feature = "logging")]
        log::info!("Recreating swapchain for {:?}", extent);

        let generation = Generation::create(
            &self.device,
            &self.surface,
            self.generation.handle.inner,
            self.requested_image_count,
            self.synchronised,
            extent,
        )?;
        self.generation = generation;
        self.acquire = AcquireState::default();
        self.recreate = false;
        Ok(())
    }

    ///Index of the last acquired image.
    pub fn image_index(&self) -> u32 {
        self.acquire.last
    }

    ///True if an image was acquired and not yet presented.
    pub fn has_acquired_image(&self) -> bool {
        self.acquire.is_acquired()
    }

    pub fn image_count(&self) -> u32 {
        self.generation.images.len() as u32
    }

    pub fn images(&self) -> &[Arc<Image>] {
        &self.generation.images
    }

    ///One full view per image, in image order.
    pub fn image_views(&self) -> &[Arc<ImageView>] {
        &self.generation.views
    }

    ///The image that was acquired last.
    pub fn current_image(&self) -> &Arc<Image> {
        &self.generation.images[self.acquire.last as usize]
    }

    pub fn current_image_view(&self) -> &Arc<ImageView> {
        &self.generation.views[self.acquire.last as usize]
    }

    pub fn format(&self) -> ImageFormat {
        self.generation.format
    }

    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.generation.surface_format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.generation.extent
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.generation.present_mode
    }

    pub fn should_recreate(&self) -> bool {
        self.recreate
    }

    ///True if presentation is synchronised to the vertical blank. Fixed at creation.
    pub fn is_synchronised(&self) -> bool {
        self.synchronised
    }

    pub fn present_queue(&self) -> &Queue {
        &self.present_queue
    }
}

impl DeviceResource for Swapchain {
    type Raw = vk::SwapchainKHR;
    fn raw(&self) -> Self::Raw {
        self.generation.handle.inner
    }
}

impl PartialEq for Swapchain {
    fn eq(&self, other: &Self) -> bool {
        self.generation.handle.inner == other.generation.handle.inner
    }
}

impl Eq for Swapchain {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InstanceError;
    use static_assertions::assert_impl_all;

    fn format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(Swapchain: Send, Sync);
        assert_impl_all!(SwapchainHandle: Send, Sync);
    }

    #[test]
    fn surface_format_prefers_srgb() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM),
            format(vk::Format::B8G8R8A8_UNORM),
            format(vk::Format::B8G8R8A8_SRGB),
        ];
        let (chosen, image_format) = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(image_format, ImageFormat::B8G8R8A8Srgb);

        let (chosen, _) = choose_surface_format(&formats[..2]).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);
    }

    #[test]
    fn surface_format_falls_back_to_known_format() {
        let formats = [
            format(vk::Format::A2B10G10R10_UNORM_PACK32),
            format(vk::Format::R8G8B8A8_SRGB),
        ];
        let (chosen, image_format) = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_SRGB);
        assert_eq!(image_format, ImageFormat::R8G8B8A8Srgb);

        assert!(matches!(
            choose_surface_format(&formats[..1]),
            Err(SwapchainError::NoSurfaceFormat)
        ));
        assert!(matches!(
            choose_surface_format(&[]),
            Err(SwapchainError::NoSurfaceFormat)
        ));
    }

    #[test]
    fn present_mode_selection() {
        let all = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
        ];
        assert_eq!(choose_present_mode(&all, true), vk::PresentModeKHR::FIFO);
        assert_eq!(choose_present_mode(&all, false), vk::PresentModeKHR::MAILBOX);
        assert_eq!(
            choose_present_mode(&all[..2], false),
            vk::PresentModeKHR::IMMEDIATE
        );
        assert_eq!(
            choose_present_mode(&all[..1], false),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn image_count_is_clamped() {
        assert_eq!(choose_image_count(0, 2, 8), 3);
        assert_eq!(choose_image_count(2, 2, 8), 2);
        assert_eq!(choose_image_count(1, 2, 8), 2);
        assert_eq!(choose_image_count(16, 2, 8), 8);
        //no upper limit
        assert_eq!(choose_image_count(16, 2, 0), 16);
    }

    #[test]
    fn extent_follows_surface() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            ..Default::default()
        };
        let extent = choose_extent(
            vk::Extent2D {
                width: 10,
                height: 10,
            },
            &capabilities,
        )
        .unwrap();
        assert_eq!(
            extent,
            vk::Extent2D {
                width: 800,
                height: 600
            }
        );
    }

    #[test]
    fn extent_is_clamped_if_application_decides() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        };
        let extent = choose_extent(
            vk::Extent2D {
                width: 8000,
                height: 720,
            },
            &capabilities,
        )
        .unwrap();
        assert_eq!(
            extent,
            vk::Extent2D {
                width: 4096,
                height: 720
            }
        );
    }

    #[test]
    fn zero_extent_is_busy() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 0,
                height: 0,
            },
            ..Default::default()
        };
        let err = choose_extent(
            vk::Extent2D {
                width: 800,
                height: 600,
            },
            &capabilities,
        )
        .unwrap_err();
        assert_eq!(err.result(), SwapchainResult::Busy);
    }

    #[test]
    fn zero_requested_extent_is_busy() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        };
        let err = choose_extent(
            vk::Extent2D {
                width: 800,
                height: 0,
            },
            &capabilities,
        )
        .unwrap_err();
        assert_eq!(err.result(), SwapchainResult::Busy);
    }

    #[test]
    fn each_acquire_allows_one_present() {
        let mut state = AcquireState::default();
        //fresh or recreated swapchain
        assert_eq!(state.take_presentable(), None);

        state.acquired(2);
        assert!(state.is_acquired());
        assert_eq!(state.take_presentable(), Some(2));
        assert_eq!(state.take_presentable(), None);
        assert_eq!(state.last, 2);

        state.acquired(1);
        state.failed();
        assert_eq!(state.take_presentable(), None);
        assert_eq!(state.last, 1);
    }

    #[test]
    fn surface_query_errors_keep_their_category() {
        let lost = SwapchainError::from(InstanceError::VkError(vk::Result::ERROR_SURFACE_LOST_KHR));
        assert_eq!(lost.result(), SwapchainResult::Pending);
        let out_of_date =
            SwapchainError::from(InstanceError::VkError(vk::Result::ERROR_OUT_OF_DATE_KHR));
        assert_eq!(out_of_date.result(), SwapchainResult::Pending);
        assert_eq!(
            SwapchainError::from(InstanceError::NoPhysicalDevice).result(),
            SwapchainResult::Failed
        );
    }
}
