//! # Synchronisation
//!
//! tessera wraps Vulkan's binary synchronisation primitives:
//! - [Fence]: signalled by a queue submission, observed by the host. Waiting and resetting goes through the
//!   [Device](crate::context::Device), so multiple fences can be handled in one call.
//! - [Semaphore]: binary, device-only. Orders a submission (or presentation) after another one that signals it.
//!
//! Every semaphore signal must be consumed by exactly one wait. Waiting twice on one signal is not checked and
//! leads to a driver error or a hang.
//!
//! Memory barriers are recorded on a command buffer, see
//! [pipeline_barrier](crate::resources::CommandBuffer::pipeline_barrier).

use std::sync::Arc;

use ash::vk;

use crate::{context::Device, flags::FenceFlags, resources::DeviceResource};

///Host-device synchronisation primitive. Can only be reset through [Device::reset_fences], and only while no
/// submission that signals it is pending.
pub struct Fence {
    pub inner: vk::Fence,
    pub device: Arc<Device>,
}

impl Fence {
    pub fn new(device: &Arc<Device>, flags: FenceFlags) -> Result<Self, vk::Result> {
        let create_info = vk::FenceCreateInfo::default().flags(flags.to_vk());
        let inner = unsafe { device.inner.create_fence(&create_info, None)? };

        Ok(Fence {
            inner,
            device: device.clone(),
        })
    }

    ///Polls the fence without blocking. Errors while querying (for instance a lost device) are reported
    /// as *not signalled*.
    pub fn signalled(&self) -> bool {
        match unsafe { self.device.inner.get_fence_status(self.inner) } {
            Ok(signalled) => signalled,
            Err(e) => {
                #[cfg(feature = "logging")]
                log::error!("Failed to query fence status: {}", e);
                let _ = e;
                false
            }
        }
    }

    ///Blocks until the fence is signalled or `timeout_ns` elapsed. Returns `Ok(false)` on timeout.
    pub fn wait(&self, timeout_ns: u64) -> Result<bool, crate::error::DeviceError> {
        self.device.wait_for_fences(&[self], true, timeout_ns)
    }
}

impl DeviceResource for Fence {
    type Raw = vk::Fence;
    fn raw(&self) -> Self::Raw {
        self.inner
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_fence(self.inner, None) };
    }
}

///Binary semaphore. Signalled by one submission (or image acquisition) and consumed by exactly one wait.
pub struct Semaphore {
    pub inner: vk::Semaphore,
    pub device: Arc<Device>,
}

impl Semaphore {
    pub fn new(device: &Arc<Device>) -> Result<Self, vk::Result> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let inner = unsafe { device.inner.create_semaphore(&create_info, None)? };

        Ok(Semaphore {
            inner,
            device: device.clone(),
        })
    }
}

impl DeviceResource for Semaphore {
    type Raw = vk::Semaphore;
    fn raw(&self) -> Self::Raw {
        self.inner
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_semaphore(self.inner, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(Fence: Send, Sync);
        assert_impl_all!(Semaphore: Send, Sync);
    }
}
