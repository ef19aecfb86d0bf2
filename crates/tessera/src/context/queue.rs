use std::sync::{Arc, Mutex, PoisonError};

use ash::vk;
use smallvec::SmallVec;

use crate::{
    error::SubmitError,
    flags::{PipelineStages, QueueFlags},
    resources::{CommandBuffer, DeviceResource},
    sync::{Fence, Semaphore},
};

///Abstract queue that collects a [ash::vk::Queue](ash::vk::Queue), its family and the index within that family.
///
/// Queues are created once together with the [Device](crate::context::Device) and live as long as it does. Clones
/// of a queue share one submission lock, so concurrent submissions from different threads are serialised.
#[derive(Clone)]
pub struct Queue {
    pub inner: vk::Queue,
    pub family_index: u32,
    pub queue_index: u32,
    ///Capabilities of the queue's family. Includes `PRESENT` if the queue was requested for presentation.
    pub flags: QueueFlags,
    device: ash::Device,
    lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("inner", &self.inner)
            .field("family_index", &self.family_index)
            .field("queue_index", &self.queue_index)
            .field("flags", &self.flags)
            .finish()
    }
}

///Single submission to a [Queue]. The command buffers are executed in order, after all `waits` are signalled
/// (each at its pipeline stage). When the work finishes, all `signals` and the `fence` are signalled.
pub struct SubmitInfo<'a> {
    pub command_buffers: &'a [&'a CommandBuffer],
    pub waits: &'a [(&'a Semaphore, PipelineStages)],
    pub signals: &'a [&'a Semaphore],
    pub fence: &'a Fence,
}

impl Queue {
    pub(crate) fn new(
        device: &ash::Device,
        family_index: u32,
        queue_index: u32,
        flags: QueueFlags,
        lock: Arc<Mutex<()>>,
    ) -> Self {
        Queue {
            inner: unsafe { device.get_device_queue(family_index, queue_index) },
            family_index,
            queue_index,
            flags,
            device: device.clone(),
            lock,
        }
    }

    ///Runs `f` while holding the queue's submission lock.
    pub(crate) fn with_locked<R>(&self, f: impl FnOnce(vk::Queue) -> R) -> R {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        f(self.inner)
    }

    pub(crate) fn lock_handle(&self) -> &Arc<Mutex<()>> {
        &self.lock
    }

    ///Submits `info` to the queue. Every command buffer has to be executable (recorded and ended) and must
    /// have been allocated for this queue's family.
    ///
    /// Nothing is submitted if any of those checks fail.
    ///
    /// The fence must be unsignalled, and each wait semaphore must have a pending signal that no other submission
    /// waits on. Neither is checked.
    pub fn submit(&self, info: &SubmitInfo) -> Result<(), SubmitError> {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        for (index, cb) in info.command_buffers.iter().enumerate() {
            if !cb.is_executable() {
                return Err(SubmitError::NotExecutable { index });
            }
            if cb.queue_family() != self.family_index {
                return Err(SubmitError::FamilyMismatch {
                    index,
                    buffer_family: cb.queue_family(),
                    queue_family: self.family_index,
                });
            }
        }

        let command_buffers = info
            .command_buffers
            .iter()
            .map(|cb| cb.raw())
            .collect::<SmallVec<[vk::CommandBuffer; 4]>>();
        let wait_semaphores = info
            .waits
            .iter()
            .map(|(s, _)| s.raw())
            .collect::<SmallVec<[vk::Semaphore; 4]>>();
        let wait_stages = info
            .waits
            .iter()
            .map(|(_, stage)| stage.to_vk())
            .collect::<SmallVec<[vk::PipelineStageFlags; 4]>>();
        let signal_semaphores = info
            .signals
            .iter()
            .map(|s| s.raw())
            .collect::<SmallVec<[vk::Semaphore; 4]>>();

        let submit_info = vk::SubmitInfo::default()
            .command_buffers(&command_buffers)
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .signal_semaphores(&signal_semaphores);

        let result = self.with_locked(|queue| unsafe {
            self.device.queue_submit(
                queue,
                core::slice::from_ref(&submit_info),
                info.fence.raw(),
            )
        });

        if let Err(e) = result {
            #[cfg(feature = "logging")]
            log::error!(
                "Submission to queue {}/{} failed: {}",
                self.family_index,
                self.queue_index,
                e
            );
            return Err(SubmitError::Rejected(e));
        }

        Ok(())
    }

    ///Blocks until all work on this queue has finished.
    pub fn wait_idle(&self) -> Result<(), vk::Result> {
        self.with_locked(|queue| unsafe { self.device.queue_wait_idle(queue) })
    }
}

///Queue family as seen by the selection in [select_queue_family].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct FamilyCandidate {
    ///Capabilities. Includes `PRESENT` if the family can present to the surface of the request.
    pub flags: QueueFlags,
    ///Number of queues the family exposes.
    pub capacity: u32,
    ///Queues that are already handed out.
    pub in_use: u32,
}

///Result of a queue family selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct FamilySelection {
    pub family: usize,
    pub queue_index: u32,
    ///True if no free queue was left and an occupied one is shared.
    pub shared: bool,
}

///Selects a queue family that supports all of `requested`.
///
/// The most dedicated family wins, which is the family with the fewest capabilities besides the requested ones. Families that
/// still have a free queue are preferred. If all satisfying families are exhausted, a queue of the most dedicated one is
/// shared. Ties are resolved by family index.
pub(crate) fn select_queue_family(
    families: &[FamilyCandidate],
    requested: QueueFlags,
) -> Option<FamilySelection> {
    let satisfying = || {
        families
            .iter()
            .enumerate()
            .filter(|(_, f)| f.capacity > 0 && f.flags.contains(requested))
    };
    let extra_bits = |f: &FamilyCandidate| f.flags.difference(requested).bits().count_ones();

    if let Some((family, candidate)) = satisfying()
        .filter(|(_, f)| f.in_use < f.capacity)
        .min_by_key(|(idx, f)| (extra_bits(*f), *idx))
    {
        return Some(FamilySelection {
            family,
            queue_index: candidate.in_use,
            shared: false,
        });
    }

    satisfying()
        .min_by_key(|(idx, f)| (extra_bits(*f), *idx))
        .map(|(family, candidate)| FamilySelection {
            family,
            queue_index: candidate.in_use % candidate.capacity,
            shared: true,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    fn family(flags: QueueFlags, capacity: u32) -> FamilyCandidate {
        FamilyCandidate {
            flags,
            capacity,
            in_use: 0,
        }
    }

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(Queue: Send, Sync);
    }

    #[test]
    fn prefers_dedicated_transfer_family() {
        let families = [
            family(
                QueueFlags::GRAPHICS | QueueFlags::COMPUTE | QueueFlags::TRANSFER,
                16,
            ),
            family(QueueFlags::COMPUTE | QueueFlags::TRANSFER, 8),
            family(QueueFlags::TRANSFER, 2),
        ];
        let selection = select_queue_family(&families, QueueFlags::TRANSFER).unwrap();
        assert_eq!(selection.family, 2);
        assert!(!selection.shared);

        let selection = select_queue_family(&families, QueueFlags::COMPUTE).unwrap();
        assert_eq!(selection.family, 1);
    }

    #[test]
    fn graphics_present_needs_surface_support() {
        let families = [
            family(QueueFlags::GRAPHICS | QueueFlags::TRANSFER, 1),
            family(
                QueueFlags::GRAPHICS | QueueFlags::TRANSFER | QueueFlags::PRESENT,
                1,
            ),
        ];
        let selection =
            select_queue_family(&families, QueueFlags::GRAPHICS | QueueFlags::PRESENT).unwrap();
        assert_eq!(selection.family, 1);
    }

    #[test]
    fn unsatisfiable_request_fails() {
        let families = [family(QueueFlags::TRANSFER, 4)];
        assert_eq!(select_queue_family(&families, QueueFlags::GRAPHICS), None);
        assert_eq!(select_queue_family(&[], QueueFlags::TRANSFER), None);
    }

    #[test]
    fn exhausted_family_moves_to_next_best() {
        let mut families = [
            family(QueueFlags::COMPUTE | QueueFlags::TRANSFER, 1),
            family(
                QueueFlags::GRAPHICS | QueueFlags::COMPUTE | QueueFlags::TRANSFER,
                4,
            ),
        ];
        families[0].in_use = 1;

        let selection = select_queue_family(&families, QueueFlags::COMPUTE).unwrap();
        assert_eq!(selection.family, 1);
        assert_eq!(selection.queue_index, 0);
        assert!(!selection.shared);
    }

    #[test]
    fn fully_occupied_families_are_shared() {
        let mut families = [family(QueueFlags::GRAPHICS | QueueFlags::TRANSFER, 2)];
        families[0].in_use = 2;

        let selection = select_queue_family(&families, QueueFlags::GRAPHICS).unwrap();
        assert_eq!(selection.family, 0);
        assert_eq!(selection.queue_index, 0);
        assert!(selection.shared);

        families[0].in_use = 3;
        let selection = select_queue_family(&families, QueueFlags::GRAPHICS).unwrap();
        assert_eq!(selection.queue_index, 1);
    }

    #[test]
    fn next_free_queue_index_is_handed_out() {
        let mut families = [family(QueueFlags::GRAPHICS | QueueFlags::TRANSFER, 4)];
        families[0].in_use = 2;
        let selection = select_queue_family(&families, QueueFlags::GRAPHICS).unwrap();
        assert_eq!(selection.queue_index, 2);
    }
}
