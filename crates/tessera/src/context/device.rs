use std::sync::{Arc, Mutex, PoisonError};

use ahash::AHashMap;
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};

use super::{
    Instance, Queue,
    queue::{FamilyCandidate, select_queue_family},
};
use crate::{
    error::{DeviceError, PipelineError},
    flags::{ImageFormat, MemoryType, QueueFlags},
    resources::{GraphicsPipeline, GraphicsPipelineDesc},
    surface::Surface,
    sync::Fence,
};

///Requested queue. The device selects a family that supports all `flags`. If `PRESENT` is requested the family must be
/// able to present to `surface`.
#[derive(Clone, Copy)]
pub struct QueueSpec<'a> {
    pub flags: QueueFlags,
    pub surface: Option<&'a Surface>,
}

impl<'a> QueueSpec<'a> {
    ///A queue that can do graphics work and present to `surface`.
    pub fn graphics_present(surface: &'a Surface) -> Self {
        QueueSpec {
            flags: QueueFlags::GRAPHICS | QueueFlags::PRESENT,
            surface: Some(surface),
        }
    }

    pub fn headless(flags: QueueFlags) -> Self {
        QueueSpec {
            flags,
            surface: None,
        }
    }
}

///Thin device abstraction that keeps the underlying instance (and therfore entrypoint) alive,
/// owns the memory allocator and takes care of device destruction once its dropped.
///
/// Every resource keeps an `Arc<Device>`. Therefore the device is destroyed only after all of them are gone.
pub struct Device {
    ///The raw ash device
    pub inner: ash::Device,
    pub instance: Arc<Instance>,
    pub physical_device: vk::PhysicalDevice,
    ///Features that were enabled at creation time.
    pub enabled_features: vk::PhysicalDeviceFeatures,
    ///True if the swapchain extension was enabled.
    pub swapchain_enabled: bool,
    queues: Vec<Queue>,
    ///Number of queues of each family this device reserved on the instance.
    reserved: Vec<u32>,
    allocator: Mutex<Option<Allocator>>,
}

impl Device {
    ///Creates the device, one [Queue] per entry in `specs` (in that order) and the memory allocator.
    ///
    /// Fails without creating anything if any spec can't be satisfied by a queue family of the instance's
    /// physical device.
    pub fn new(instance: &Arc<Instance>, specs: &[QueueSpec]) -> Result<Arc<Self>, DeviceError> {
        if specs.is_empty() {
            return Err(DeviceError::NoQueueRequested);
        }

        let physical_device = instance.physical_device;
        let mut occupation = instance.occupation();
        let mut local = occupation.clone();

        //(family, index, flags) for each spec
        let mut picks = Vec::with_capacity(specs.len());
        for spec in specs {
            if spec.flags.contains(QueueFlags::PRESENT) && spec.surface.is_none() {
                return Err(DeviceError::PresentWithoutSurface(spec.flags));
            }

            let candidates = instance
                .queue_families
                .iter()
                .enumerate()
                .map(|(idx, props)| {
                    let mut flags = QueueFlags::from_family(props.queue_flags);
                    if let Some(surface) = spec.surface {
                        if surface.supports_queue_family(physical_device, idx as u32) {
                            flags |= QueueFlags::PRESENT;
                        }
                    }
                    FamilyCandidate {
                        flags,
                        capacity: props.queue_count,
                        in_use: local[idx],
                    }
                })
                .collect::<Vec<_>>();

            let Some(selection) = select_queue_family(&candidates, spec.flags) else {
                #[cfg(feature = "logging")]
                log::error!("No queue family satisfies {:?}", spec.flags);
                return Err(DeviceError::NoSuitableQueueFamily(spec.flags));
            };

            #[cfg(feature = "logging")]
            {
                if selection.shared {
                    log::warn!(
                        "All queues of family {} are in use, sharing queue {} for {:?}",
                        selection.family,
                        selection.queue_index,
                        spec.flags
                    );
                } else {
                    log::info!(
                        "Using queue {} of family {} for {:?}",
                        selection.queue_index,
                        selection.family,
                        spec.flags
                    );
                }
            }

            local[selection.family] += 1;
            picks.push((
                selection.family as u32,
                selection.queue_index,
                candidates[selection.family].flags,
            ));
        }

        //per family the number of queues that has to be created
        let mut queue_counts: AHashMap<u32, u32> = AHashMap::default();
        for (family, index, _) in &picks {
            let count = queue_counts.entry(*family).or_insert(0);
            *count = (*count).max(index + 1);
        }
        let mut families = queue_counts.into_iter().collect::<Vec<_>>();
        families.sort_by_key(|(family, _)| *family);
        let priorities = families
            .iter()
            .map(|(_, count)| vec![1.0f32; *count as usize])
            .collect::<Vec<_>>();
        let queue_create_infos = families
            .iter()
            .zip(priorities.iter())
            .map(|((family, _), prio)| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(*family)
                    .queue_priorities(prio)
            })
            .collect::<Vec<_>>();

        let swapchain_enabled = specs
            .iter()
            .any(|s| s.surface.is_some() || s.flags.contains(QueueFlags::PRESENT));
        let mut extensions = Vec::new();
        if swapchain_enabled {
            if !instance.is_device_extension_supported(ash::khr::swapchain::NAME)? {
                return Err(DeviceError::UnsupportedExtension(
                    ash::khr::swapchain::NAME.to_string_lossy().into_owned(),
                ));
            }
            extensions.push(ash::khr::swapchain::NAME.as_ptr());
        }

        //Enable the optional features the dynamic states and samplers can make use of
        let supported = instance.supported_features();
        let enabled_features = vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(supported.sampler_anisotropy == vk::TRUE)
            .wide_lines(supported.wide_lines == vk::TRUE)
            .depth_bounds(supported.depth_bounds == vk::TRUE)
            .depth_bias_clamp(supported.depth_bias_clamp == vk::TRUE)
            .depth_clamp(supported.depth_clamp == vk::TRUE);

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&enabled_features);

        let device = unsafe {
            instance
                .inner
                .create_device(physical_device, &create_info, None)?
        };

        let allocator = Allocator::new(&gpu_allocator::vulkan::AllocatorCreateDesc {
            instance: instance.inner.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_leaks_on_shutdown: true,
                ..Default::default()
            },
            buffer_device_address: false,
            allocation_sizes: gpu_allocator::AllocationSizes::default(),
        });
        let allocator = match allocator {
            Ok(a) => a,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(DeviceError::GpuAllocatorError(Box::new(e)));
            }
        };

        //one queue object (and lock) per distinct (family, index)
        let mut locks: AHashMap<(u32, u32), Arc<Mutex<()>>> = AHashMap::default();
        let queues = picks
            .iter()
            .map(|(family, index, flags)| {
                let lock = locks
                    .entry((*family, *index))
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .clone();
                Queue::new(&device, *family, *index, *flags, lock)
            })
            .collect::<Vec<_>>();

        let reserved = local
            .iter()
            .zip(occupation.iter())
            .map(|(new, old)| new - old)
            .collect::<Vec<_>>();
        *occupation = local;
        drop(occupation);

        Ok(Arc::new(Device {
            inner: device,
            instance: instance.clone(),
            physical_device,
            enabled_features,
            swapchain_enabled,
            queues,
            reserved,
            allocator: Mutex::new(Some(allocator)),
        }))
    }

    ///All queues in the order of the specs the device was created with.
    pub fn queues(&self) -> &[Queue] {
        &self.queues
    }

    pub fn queue(&self, index: usize) -> Option<&Queue> {
        self.queues.get(index)
    }

    ///Returns the first queue for the given family, if there is any.
    pub fn get_first_queue_for_family(&self, family: u32) -> Option<&Queue> {
        self.queues.iter().find(|q| q.family_index == family)
    }

    ///Blocks until all work on the device has finished. Meant for teardown, not for per-frame synchronisation.
    pub fn wait_idle(&self) -> Result<(), DeviceError> {
        //vkDeviceWaitIdle needs all queues to be externally synchronised. Shared queues share their lock, so
        //each lock is taken once.
        let mut locks: Vec<&Arc<Mutex<()>>> = Vec::with_capacity(self.queues.len());
        for queue in &self.queues {
            if !locks.iter().any(|l| Arc::ptr_eq(*l, queue.lock_handle())) {
                locks.push(queue.lock_handle());
            }
        }
        let _guards = locks
            .iter()
            .map(|l| l.lock().unwrap_or_else(PoisonError::into_inner))
            .collect::<Vec<_>>();
        unsafe { self.inner.device_wait_idle()? };
        Ok(())
    }

    ///Waits for `fences`. If `wait_all` is false, returns as soon as one fence is signalled.
    ///
    /// Returns `Ok(false)` if `timeout_ns` elapsed. A timeout of zero polls without blocking.
    pub fn wait_for_fences(
        &self,
        fences: &[&Fence],
        wait_all: bool,
        timeout_ns: u64,
    ) -> Result<bool, DeviceError> {
        if fences.is_empty() {
            return Ok(true);
        }
        let raw = fences
            .iter()
            .map(|f| f.inner)
            .collect::<smallvec::SmallVec<[vk::Fence; 4]>>();
        match unsafe { self.inner.wait_for_fences(&raw, wait_all, timeout_ns) } {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    ///Resets `fences` to the unsignalled state. None of them may be in use by a pending submission.
    pub fn reset_fences(&self, fences: &[&Fence]) -> Result<(), DeviceError> {
        if fences.is_empty() {
            return Ok(());
        }
        let raw = fences
            .iter()
            .map(|f| f.inner)
            .collect::<smallvec::SmallVec<[vk::Fence; 4]>>();
        unsafe { self.inner.reset_fences(&raw)? };
        Ok(())
    }

    ///Flush granularity of non-coherent host visible memory.
    pub fn non_coherent_atom_size(&self) -> u64 {
        self.instance.properties.limits.non_coherent_atom_size.max(1)
    }

    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.instance.properties.limits
    }

    ///Resolves `format` to the first concrete candidate the device supports for optimal tiling. Depth and
    /// stencil formats need depth-stencil attachment support, colour formats are taken as is.
    pub fn resolve_format(&self, format: ImageFormat) -> Result<vk::Format, DeviceError> {
        let candidates = format.candidates();
        if !format.is_depth_stencil() {
            return Ok(candidates[0]);
        }

        candidates
            .iter()
            .copied()
            .find(|candidate| {
                self.instance
                    .format_properties(*candidate)
                    .optimal_tiling_features
                    .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
            })
            .ok_or(DeviceError::UnsupportedFormat(format))
    }

    ///Creates all `descs` in a single driver call. Nothing is created if any description is invalid.
    pub fn create_pipelines(
        self: &Arc<Self>,
        descs: &[GraphicsPipelineDesc],
    ) -> Result<Vec<GraphicsPipeline>, PipelineError> {
        GraphicsPipeline::new_batch(self, descs)
    }

    ///Allocates memory for `requirements`. Host visible allocations are padded to the non-coherent atom size, so
    /// mapped ranges can always be flushed on atom boundaries.
    pub(crate) fn allocate(
        &self,
        name: &str,
        mut requirements: vk::MemoryRequirements,
        memory: MemoryType,
        linear: bool,
    ) -> Result<Allocation, DeviceError> {
        if memory == MemoryType::HostVisible {
            let atom = self.non_coherent_atom_size();
            requirements.alignment = requirements.alignment.max(atom);
            requirements.size = requirements.size.div_ceil(atom) * atom;
        }

        let mut lock = self
            .allocator
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let allocator = lock.as_mut().ok_or(DeviceError::AllocatorUnavailable)?;
        allocator
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: memory.to_location(),
                linear,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| DeviceError::GpuAllocatorError(Box::new(e)))
    }

    pub(crate) fn free(&self, allocation: Allocation) {
        let mut lock = self
            .allocator
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(allocator) = lock.as_mut() {
            if let Err(e) = allocator.free(allocation) {
                //NOTE: the allocator won't hand out the allocation again, so we only report.
                #[cfg(feature = "logging")]
                log::error!("Freeing allocation failed with: {}", e);
                let _ = e;
            }
        } else {
            #[cfg(feature = "logging")]
            log::warn!("Could not free allocation, allocator is gone");
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        //allocator frees its memory blocks, needs the device to still exist.
        drop(
            self.allocator
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );

        let mut occupation = self.instance.occupation();
        for (used, reserved) in occupation.iter_mut().zip(self.reserved.iter()) {
            *used = used.saturating_sub(*reserved);
        }
        drop(occupation);

        unsafe { self.inner.destroy_device(None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(Device: Send, Sync);
        assert_impl_all!(QueueSpec<'static>: Send, Sync);
    }
}
