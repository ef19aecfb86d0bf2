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
    flags::{BufferUsage, MemoryType},
};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BufferDesc {
    pub memory: MemoryType,
    pub usage: BufferUsage,
    ///Size in bytes.
    pub size: u64,
    pub sharing: SharingMode,
}

impl BufferDesc {
    ///Host visible buffer that can be used as copy source and destination.
    pub fn staging(size: u64) -> Self {
        BufferDesc {
            memory: MemoryType::HostVisible,
            usage: BufferUsage::TRANSFER_SOURCE | BufferUsage::TRANSFER_DESTINATION,
            size,
            sharing: SharingMode::Exclusive,
        }
    }
}

///Self managing buffer that allocates its memory from the device's allocator, and frees it when dropped.
//Note Freeing happens in `ManagedAllocation`'s implementation.
pub struct Buffer {
    pub desc: BufferDesc,
    pub inner: vk::Buffer,
    pub device: Arc<Device>,
    allocation: ManagedAllocation,
}

impl Buffer {
    ///Creates a buffer for `desc`. The underlying allocation can be bigger than requested. `name` tags the
    /// allocation for debugging.
    pub fn new(
        device: &Arc<Device>,
        desc: BufferDesc,
        name: Option<&str>,
    ) -> Result<Self, ResourceError> {
        let (sharing_mode, families) = desc.sharing.to_vk();
        let create_info = vk::BufferCreateInfo::default()
            .size(desc.size)
            .usage(desc.usage.to_vk())
            .sharing_mode(sharing_mode)
            .queue_family_indices(families);

        let buffer = unsafe { device.inner.create_buffer(&create_info, None)? };
        let requirements = unsafe { device.inner.get_buffer_memory_requirements(buffer) };

        //NOTE: Buffers are always "linear" in memory
        let allocation = match device.allocate(
            name.unwrap_or("tessera buffer"),
            requirements,
            desc.memory,
            true,
        ) {
            Ok(a) => a,
            Err(e) => {
                unsafe { device.inner.destroy_buffer(buffer, None) };
                return Err(e.into());
            }
        };

        if let Err(e) = unsafe {
            device
                .inner
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        } {
            device.free(allocation);
            unsafe { device.inner.destroy_buffer(buffer, None) };
            return Err(e.into());
        }

        let allocation = ManagedAllocation::new(device, allocation, desc.memory);
        Ok(Buffer {
            desc,
            inner: buffer,
            device: device.clone(),
            allocation,
        })
    }

    pub fn size(&self) -> u64 {
        self.desc.size
    }

    pub fn usage(&self) -> BufferUsage {
        self.desc.usage
    }

    pub fn memory_type(&self) -> MemoryType {
        self.desc.memory
    }

    ///True if the buffer was created host visible. Device local buffers can never be mapped.
    pub fn can_be_mapped(&self) -> bool {
        self.allocation.can_be_mapped()
    }

    ///Maps `size` bytes starting at `offset`. See [MappedRange] for the aligned range that gets flushed.
    pub fn map(&mut self, size: u64, offset: u64) -> Result<MappedRange<'_>, ResourceError> {
        let capacity = self.desc.size;
        self.allocation.map(size, offset, capacity)
    }

    ///Copies `data` into the buffer, starting at `offset`. Nothing is written if the range does not fit.
    pub fn write(&mut self, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        let mut range = self.map(data.len() as u64, offset)?;
        range.copy_from_slice(data);
        range.unmap()
    }

    ///Reads `size` bytes starting at `offset`.
    pub fn read(&mut self, offset: u64, size: u64) -> Result<Vec<u8>, ResourceError> {
        let range = self.map(size, offset)?;
        let data = range.to_vec();
        range.unmap()?;
        Ok(data)
    }
}

impl DeviceResource for Buffer {
    type Raw = vk::Buffer;
    fn raw(&self) -> Self::Raw {
        self.inner
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_buffer(self.inner, None) }
    }
}

///The hash implementation is based on [Buffer](ash::vk::Buffer)'s hash.
impl Hash for Buffer {
    fn hash<H: Hasher>(&self, hasher: &mut H) {
        self.inner.hash(hasher)
    }
}

impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl Eq for Buffer {}
