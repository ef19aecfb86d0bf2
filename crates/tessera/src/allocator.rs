//! ## Allocator
//!
//! In Vulkan the application itself is responsible for allocating memory. tessera uses
//! [gpu-allocator](https://github.com/Traverse-Research/gpu-allocator), owned by the [Device].
//!
//! Buffers and images hold a [ManagedAllocation] that returns its memory to the device's allocator when dropped.
//! Host visible memory is persistently mapped by the allocator. [ManagedAllocation::map] hands out a [MappedRange]
//! over a part of it that takes care of invalidating and flushing non-coherent memory.

use std::{
    ops::{Deref, DerefMut},
    sync::Arc,
};

use ash::vk;
use gpu_allocator::vulkan::Allocation;

use crate::{context::Device, error::ResourceError, flags::MemoryType};

///Expands the range `[offset, offset + size)` to multiples of `atom`, clamped to `capacity`.
/// Returns `(aligned_offset, aligned_size)`.
///
/// `capacity` is expected to be a multiple of `atom` itself.
pub(crate) fn align_mapping(offset: u64, size: u64, atom: u64, capacity: u64) -> (u64, u64) {
    if size == 0 {
        return (offset, 0);
    }
    let atom = atom.max(1);
    let aligned_offset = (offset / atom) * atom;
    let aligned_end = (offset + size).div_ceil(atom).saturating_mul(atom).min(capacity);
    (aligned_offset, aligned_end - aligned_offset)
}

///An allocation that frees itself when dropped.
pub struct ManagedAllocation {
    pub device: Arc<Device>,
    allocation: Option<Allocation>,
    memory: MemoryType,
}

impl ManagedAllocation {
    pub(crate) fn new(device: &Arc<Device>, allocation: Allocation, memory: MemoryType) -> Self {
        ManagedAllocation {
            device: device.clone(),
            allocation: Some(allocation),
            memory,
        }
    }

    ///Returns false if the allocation is for some reason invalid, aka. shouldn't be used.
    pub fn is_valid(&self) -> bool {
        self.allocation.is_some()
    }

    pub fn memory_type(&self) -> MemoryType {
        self.memory
    }

    pub fn allocation(&self) -> Option<&Allocation> {
        self.allocation.as_ref()
    }

    ///True if the allocation is host visible and persistently mapped.
    pub fn can_be_mapped(&self) -> bool {
        self.memory == MemoryType::HostVisible
            && self
                .allocation
                .as_ref()
                .map(|a| a.mapped_ptr().is_some())
                .unwrap_or(false)
    }

    fn is_coherent(&self) -> bool {
        self.allocation
            .as_ref()
            .map(|a| {
                a.memory_properties()
                    .contains(vk::MemoryPropertyFlags::HOST_COHERENT)
            })
            .unwrap_or(true)
    }

    ///Maps `size` bytes starting at `offset` of a resource that is `capacity` bytes big.
    ///
    /// Fails if the memory isn't host visible or the range exceeds `capacity`.
    pub fn map(
        &mut self,
        size: u64,
        offset: u64,
        capacity: u64,
    ) -> Result<MappedRange<'_>, ResourceError> {
        if !self.can_be_mapped() {
            return Err(ResourceError::NotMappable);
        }
        let end = offset
            .checked_add(size)
            .filter(|end| *end <= capacity)
            .ok_or(ResourceError::OutOfRange {
                offset,
                size,
                capacity,
            })?;

        let coherent = self.is_coherent();
        let atom = self.device.non_coherent_atom_size();
        let device = &self.device;
        let allocation = self
            .allocation
            .as_mut()
            .ok_or(ResourceError::NotMappable)?;

        let (aligned_offset, aligned_size) =
            align_mapping(offset, size, atom, allocation.size());
        let memory = unsafe { allocation.memory() };
        let base = allocation.offset();

        if !coherent && aligned_size > 0 {
            let range = vk::MappedMemoryRange::default()
                .memory(memory)
                .offset(base + aligned_offset)
                .size(aligned_size);
            unsafe {
                device
                    .inner
                    .invalidate_mapped_memory_ranges(core::slice::from_ref(&range))?
            };
        }

        let slice = allocation
            .mapped_slice_mut()
            .ok_or(ResourceError::NotMappable)?;
        let data = &mut slice[offset as usize..end as usize];

        Ok(MappedRange {
            data,
            device: device.as_ref(),
            memory,
            base,
            coherent,
            offset,
            aligned_offset,
            aligned_size,
            flushed: false,
        })
    }
}

impl Drop for ManagedAllocation {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            self.device.free(allocation);
        }
    }
}

///Host view of a mapped memory range. Deref's to the requested bytes.
///
/// Writes become visible to the device once the range is [unmapped](MappedRange::unmap), or dropped. For
/// non-coherent memory this flushes the aligned range.
pub struct MappedRange<'a> {
    data: &'a mut [u8],
    device: &'a Device,
    memory: vk::DeviceMemory,
    ///Offset of the allocation on `memory`.
    base: u64,
    coherent: bool,
    offset: u64,
    aligned_offset: u64,
    aligned_size: u64,
    flushed: bool,
}

impl MappedRange<'_> {
    ///Requested offset within the resource.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    ///Requested size in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    ///Offset of the range that is actually flushed. Multiple of the device's non-coherent atom size.
    pub fn aligned_offset(&self) -> u64 {
        self.aligned_offset
    }

    ///Size of the range that is actually flushed.
    pub fn aligned_size(&self) -> u64 {
        self.aligned_size
    }

    fn flush(&mut self) -> Result<(), vk::Result> {
        self.flushed = true;
        if self.coherent || self.aligned_size == 0 {
            return Ok(());
        }
        let range = vk::MappedMemoryRange::default()
            .memory(self.memory)
            .offset(self.base + self.aligned_offset)
            .size(self.aligned_size);
        unsafe {
            self.device
                .inner
                .flush_mapped_memory_ranges(core::slice::from_ref(&range))
        }
    }

    ///Ends the mapping, flushing host writes if needed.
    pub fn unmap(mut self) -> Result<(), ResourceError> {
        self.flush()?;
        Ok(())
    }
}

impl Deref for MappedRange<'_> {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        self.data
    }
}

impl DerefMut for MappedRange<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data
    }
}

impl Drop for MappedRange<'_> {
    fn drop(&mut self) {
        if !self.flushed {
            if let Err(e) = self.flush() {
                #[cfg(feature = "logging")]
                log::error!("Failed to flush mapped range: {}", e);
                let _ = e;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(ManagedAllocation: Send, Sync);
    }

    #[test]
    fn aligned_range_covers_request() {
        assert_eq!(align_mapping(0, 64, 64, 256), (0, 64));
        assert_eq!(align_mapping(10, 20, 64, 256), (0, 64));
        assert_eq!(align_mapping(70, 60, 64, 256), (64, 128));
    }

    #[test]
    fn aligned_range_is_clamped_to_capacity() {
        assert_eq!(align_mapping(200, 56, 64, 256), (192, 64));
        assert_eq!(align_mapping(0, 256, 128, 256), (0, 256));
    }

    #[test]
    fn atom_of_one_keeps_request() {
        assert_eq!(align_mapping(3, 5, 1, 16), (3, 5));
        assert_eq!(align_mapping(3, 5, 0, 16), (3, 5));
    }

    #[test]
    fn empty_range_stays_empty() {
        assert_eq!(align_mapping(32, 0, 64, 256), (32, 0));
    }
}
