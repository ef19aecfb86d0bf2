use std::sync::Arc;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::error::InstanceError;

///using [ash-window](https://crates.io/crates/ash-window) to safely find a surface for a given window
/// handle. Also keeps the instance alive long enough to destroy the created surface in time.
///
/// The instance has to be created with [for_surface](crate::context::InstanceBuilder::for_surface) for the same window.
pub struct Surface {
    ///keeps the surface alive
    pub instance: Arc<crate::context::Instance>,
    pub surface: vk::SurfaceKHR,
    pub surface_loader: ash::khr::surface::Instance,
}

impl Surface {
    pub fn new<T>(
        instance: &Arc<crate::context::Instance>,
        window_handle: &T,
    ) -> Result<Self, InstanceError>
    where
        T: HasWindowHandle + HasDisplayHandle,
    {
        let display = window_handle
            .display_handle()
            .map_err(|e| InstanceError::WindowHandle(e.to_string()))?;
        let window = window_handle
            .window_handle()
            .map_err(|e| InstanceError::WindowHandle(e.to_string()))?;

        let surface = unsafe {
            ash_window::create_surface(
                &instance.entry,
                &instance.inner,
                display.as_raw(),
                window.as_raw(),
                None,
            )?
        };
        let surface_loader = ash::khr::surface::Instance::new(&instance.entry, &instance.inner);

        Ok(Surface {
            instance: instance.clone(),
            surface,
            surface_loader,
        })
    }

    ///Creates a surface that is not backed by a window. The instance has to be created with
    /// [headless_surface](crate::context::InstanceBuilder::headless_surface).
    ///
    /// The surface never reports an extent, so swapchains use the extent they are created with.
    pub fn headless(instance: &Arc<crate::context::Instance>) -> Result<Self, InstanceError> {
        let loader = ash::ext::headless_surface::Instance::new(&instance.entry, &instance.inner);
        let create_info = vk::HeadlessSurfaceCreateInfoEXT::default();
        let surface = unsafe { loader.create_headless_surface(&create_info, None)? };
        let surface_loader = ash::khr::surface::Instance::new(&instance.entry, &instance.inner);

        Ok(Surface {
            instance: instance.clone(),
            surface,
            surface_loader,
        })
    }

    pub fn get_capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<vk::SurfaceCapabilitiesKHR, InstanceError> {
        Ok(unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)?
        })
    }

    pub fn get_formats(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Vec<vk::SurfaceFormatKHR>, InstanceError> {
        Ok(unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(physical_device, self.surface)?
        })
    }

    pub fn get_present_modes(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Vec<vk::PresentModeKHR>, InstanceError> {
        Ok(unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(physical_device, self.surface)?
        })
    }

    ///Returns true if queues of `family` can present to this surface. Query errors count as *not supported*.
    pub fn supports_queue_family(&self, physical_device: vk::PhysicalDevice, family: u32) -> bool {
        match unsafe {
            self.surface_loader.get_physical_device_surface_support(
                physical_device,
                family,
                self.surface,
            )
        } {
            Ok(supported) => supported,
            Err(e) => {
                #[cfg(feature = "logging")]
                log::warn!("Failed to query present support of family {}: {}", family, e);
                let _ = e;
                false
            }
        }
    }

    ///Tries to read the current surface extent. This can fail on some platforms (like Linux+Wayland), where the
    /// application decides the extent.
    /// Note that this can be different than the swapchain extent, for instace right after a resize.
    pub fn get_current_extent(&self, physical_device: vk::PhysicalDevice) -> Option<vk::Extent2D> {
        let extent = self.get_capabilities(physical_device).ok()?.current_extent;
        match extent {
            vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            }
            | vk::Extent2D {
                width: 0,
                height: 0,
            } => None,
            vk::Extent2D { width, height } => Some(vk::Extent2D { width, height }),
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe { self.surface_loader.destroy_surface(self.surface, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(Surface: Send, Sync);
    }
}
