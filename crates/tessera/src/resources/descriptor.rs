use std::sync::Arc;

use ahash::AHashMap;
use ash::vk;
use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;

use super::{Buffer, DeviceResource, ImageView, Sampler};
use crate::{
    context::Device,
    error::DescriptorError,
    flags::{DescriptorKind, ImageLayout, ShaderStages},
};

new_key_type! {
    ///Key of a [DescriptorSet] within its [DescriptorPool]. Becomes stale once the set is freed.
    pub struct DescriptorSetKey;
}

///Single binding of a [DescriptorSetLayout].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub kind: DescriptorKind,
    pub stages: ShaderStages,
    ///Number of array elements. Must be at least one.
    pub count: u32,
}

impl DescriptorBinding {
    pub fn new(binding: u32, kind: DescriptorKind, stages: ShaderStages) -> Self {
        DescriptorBinding {
            binding,
            kind,
            stages,
            count: 1,
        }
    }
}

///Sums the descriptor counts per kind.
fn merge_pool_sizes(
    sizes: &[(DescriptorKind, u32)],
) -> Result<AHashMap<DescriptorKind, u32>, DescriptorError> {
    let mut merged: AHashMap<DescriptorKind, u32> = AHashMap::default();
    for (kind, count) in sizes {
        let total = merged.entry(*kind).or_insert(0);
        *total = total
            .checked_add(*count)
            .ok_or(DescriptorError::PoolTooLarge)?;
    }
    Ok(merged)
}

///Pool sizes and set count for `copies` sets of each layout, given by its bindings.
fn sizes_for_layouts(
    layouts: &[&[DescriptorBinding]],
    copies: u32,
) -> Result<(Vec<(DescriptorKind, u32)>, u32), DescriptorError> {
    let sizes = layouts
        .iter()
        .flat_map(|l| l.iter())
        .map(|b| {
            b.count
                .checked_mul(copies)
                .map(|count| (b.kind, count))
                .ok_or(DescriptorError::PoolTooLarge)
        })
        .collect::<Result<Vec<_>, _>>()?;
    let max_sets = u32::try_from(layouts.len())
        .ok()
        .and_then(|n| n.checked_mul(copies))
        .ok_or(DescriptorError::PoolTooLarge)?;
    Ok((sizes, max_sets))
}

///Checks a layout's binding list for duplicates and empty bindings.
pub(crate) fn validate_bindings(bindings: &[DescriptorBinding]) -> Result<(), DescriptorError> {
    for (idx, binding) in bindings.iter().enumerate() {
        if binding.count == 0 {
            return Err(DescriptorError::EmptyBinding(binding.binding));
        }
        if bindings[..idx].iter().any(|b| b.binding == binding.binding) {
            return Err(DescriptorError::DuplicateBinding(binding.binding));
        }
    }
    Ok(())
}

///Checks an update of `count` elements starting at `array_element` of `binding` against the layout. Returns the
/// descriptor kind of the binding.
pub(crate) fn validate_update(
    bindings: &[DescriptorBinding],
    binding: u32,
    array_element: u32,
    writes_buffers: bool,
    count: usize,
) -> Result<DescriptorKind, DescriptorError> {
    if count == 0 {
        return Err(DescriptorError::EmptyUpdate);
    }
    let layout_binding = bindings
        .iter()
        .find(|b| b.binding == binding)
        .ok_or(DescriptorError::NoSuchBinding(binding))?;
    if layout_binding.kind.is_buffer() != writes_buffers {
        return Err(DescriptorError::KindMismatch {
            binding,
            expected: layout_binding.kind,
        });
    }
    let end = u32::try_from(count)
        .ok()
        .and_then(|c| array_element.checked_add(c))
        .unwrap_or(u32::MAX);
    if end > layout_binding.count {
        return Err(DescriptorError::ArrayOutOfRange {
            first: array_element,
            end,
            count: layout_binding.count,
        });
    }
    Ok(layout_binding.kind)
}

///Immutable description of the bindings of a descriptor set.
pub struct DescriptorSetLayout {
    pub inner: vk::DescriptorSetLayout,
    pub device: Arc<Device>,
    bindings: Vec<DescriptorBinding>,
}

impl DescriptorSetLayout {
    pub fn new(
        device: &Arc<Device>,
        bindings: &[DescriptorBinding],
    ) -> Result<Self, DescriptorError> {
        validate_bindings(bindings)?;

        let vk_bindings = bindings
            .iter()
            .map(|b| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(b.binding)
                    .descriptor_type(b.kind.to_vk())
                    .descriptor_count(b.count)
                    .stage_flags(b.stages.to_vk())
            })
            .collect::<SmallVec<[vk::DescriptorSetLayoutBinding; 8]>>();
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&vk_bindings);
        let inner = unsafe {
            device
                .inner
                .create_descriptor_set_layout(&create_info, None)?
        };

        Ok(DescriptorSetLayout {
            inner,
            device: device.clone(),
            bindings: bindings.to_vec(),
        })
    }

    pub fn bindings(&self) -> &[DescriptorBinding] {
        &self.bindings
    }
}

impl DeviceResource for DescriptorSetLayout {
    type Raw = vk::DescriptorSetLayout;
    fn raw(&self) -> Self::Raw {
        self.inner
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .inner
                .destroy_descriptor_set_layout(self.inner, None)
        }
    }
}

///Pool that owns the descriptor sets allocated from it. Sets are referenced by [DescriptorSetKey] and freed
/// together with the pool.
pub struct DescriptorPool {
    pub inner: vk::DescriptorPool,
    pub device: Arc<Device>,
    pub max_sets: u32,
    sizes: AHashMap<DescriptorKind, u32>,
    sets: SlotMap<DescriptorSetKey, DescriptorSet>,
}

impl DescriptorPool {
    ///Creates a pool that can hold up to `max_sets` sets, and in total `count` descriptors of each `(kind, count)`
    /// pair.
    pub fn new(
        device: &Arc<Device>,
        sizes: &[(DescriptorKind, u32)],
        max_sets: u32,
    ) -> Result<Self, DescriptorError> {
        let merged = merge_pool_sizes(sizes)?;

        let pool_sizes = merged
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(kind, count)| {
                vk::DescriptorPoolSize::default()
                    .ty(kind.to_vk())
                    .descriptor_count(*count)
            })
            .collect::<SmallVec<[vk::DescriptorPoolSize; 4]>>();
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(max_sets)
            .pool_sizes(&pool_sizes);
        let inner = unsafe { device.inner.create_descriptor_pool(&create_info, None)? };

        Ok(DescriptorPool {
            inner,
            device: device.clone(),
            max_sets,
            sizes: merged,
            sets: SlotMap::with_key(),
        })
    }

    ///Creates a pool big enough for `copies` sets of each layout in `layouts`.
    pub fn for_layouts(
        device: &Arc<Device>,
        layouts: &[&DescriptorSetLayout],
        copies: u32,
    ) -> Result<Self, DescriptorError> {
        let bindings = layouts.iter().map(|l| l.bindings()).collect::<Vec<_>>();
        let (sizes, max_sets) = sizes_for_layouts(&bindings, copies)?;
        Self::new(device, &sizes, max_sets)
    }

    ///Number of descriptors of `kind` the pool was created for.
    pub fn capacity(&self, kind: DescriptorKind) -> u32 {
        self.sizes.get(&kind).copied().unwrap_or(0)
    }

    ///Allocates one set per entry in `layouts`. Either all sets are allocated, or none.
    pub fn allocate(
        &mut self,
        layouts: &[&Arc<DescriptorSetLayout>],
    ) -> Result<Vec<DescriptorSetKey>, DescriptorError> {
        if layouts.is_empty() {
            return Ok(Vec::new());
        }

        let raw_layouts = layouts
            .iter()
            .map(|l| l.inner)
            .collect::<SmallVec<[vk::DescriptorSetLayout; 4]>>();
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.inner)
            .set_layouts(&raw_layouts);
        let raw = match unsafe { self.device.inner.allocate_descriptor_sets(&allocate_info) } {
            Ok(raw) => raw,
            Err(e) => {
                #[cfg(feature = "logging")]
                log::error!("Failed to allocate {} descriptor sets: {}", layouts.len(), e);
                return Err(e.into());
            }
        };

        if raw.len() != layouts.len() {
            if !raw.is_empty() {
                unsafe {
                    self.device
                        .inner
                        .free_descriptor_sets(self.inner, &raw)?
                };
            }
            return Err(DescriptorError::Allocation {
                requested: layouts.len(),
                count: raw.len(),
            });
        }

        Ok(raw
            .into_iter()
            .zip(layouts.iter())
            .map(|(inner, layout)| {
                self.sets.insert(DescriptorSet {
                    inner,
                    device: self.device.clone(),
                    layout: (*layout).clone(),
                })
            })
            .collect())
    }

    pub fn get(&self, key: DescriptorSetKey) -> Result<&DescriptorSet, DescriptorError> {
        self.sets.get(key).ok_or(DescriptorError::StaleHandle)
    }

    pub fn get_mut(&mut self, key: DescriptorSetKey) -> Result<&mut DescriptorSet, DescriptorError> {
        self.sets.get_mut(key).ok_or(DescriptorError::StaleHandle)
    }

    ///Frees the given sets. If any key is stale, nothing is freed.
    ///
    /// None of the sets may be in use by a pending submission.
    pub fn free(&mut self, keys: &[DescriptorSetKey]) -> Result<(), DescriptorError> {
        if keys.iter().any(|k| !self.sets.contains_key(*k)) {
            return Err(DescriptorError::StaleHandle);
        }
        let raw = keys
            .iter()
            .filter_map(|k| self.sets.remove(*k))
            .map(|s| s.inner)
            .collect::<SmallVec<[vk::DescriptorSet; 8]>>();
        if !raw.is_empty() {
            unsafe { self.device.inner.free_descriptor_sets(self.inner, &raw)? };
        }
        Ok(())
    }
}

impl DeviceResource for DescriptorPool {
    type Raw = vk::DescriptorPool;
    fn raw(&self) -> Self::Raw {
        self.inner
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        //frees all sets as well
        self.sets.clear();
        unsafe { self.device.inner.destroy_descriptor_pool(self.inner, None) }
    }
}

///Buffer range bound to a uniform or storage buffer binding.
#[derive(Clone, Copy)]
pub struct BufferBinding<'a> {
    pub buffer: &'a Buffer,
    pub offset: u64,
    ///`None` binds everything from `offset` to the end of the buffer.
    pub range: Option<u64>,
}

impl<'a> BufferBinding<'a> {
    pub fn whole(buffer: &'a Buffer) -> Self {
        BufferBinding {
            buffer,
            offset: 0,
            range: None,
        }
    }
}

///Image view and sampler bound to a combined image sampler binding.
#[derive(Clone, Copy)]
pub struct ImageBinding<'a> {
    pub view: &'a ImageView,
    pub sampler: &'a Sampler,
    ///Layout the image is in while the set is used.
    pub layout: ImageLayout,
}

#[derive(Clone, Copy)]
pub enum DescriptorResources<'a> {
    Buffers(&'a [BufferBinding<'a>]),
    Images(&'a [ImageBinding<'a>]),
}

impl DescriptorResources<'_> {
    fn len(&self) -> usize {
        match self {
            DescriptorResources::Buffers(b) => b.len(),
            DescriptorResources::Images(i) => i.len(),
        }
    }
}

///Writes `resources` into consecutive array elements of `binding`, starting at `array_element`.
#[derive(Clone, Copy)]
pub struct DescriptorWrite<'a> {
    pub binding: u32,
    pub array_element: u32,
    pub resources: DescriptorResources<'a>,
}

///Set of descriptors, allocated from a [DescriptorPool] for a [DescriptorSetLayout].
pub struct DescriptorSet {
    pub inner: vk::DescriptorSet,
    pub device: Arc<Device>,
    pub layout: Arc<DescriptorSetLayout>,
}

impl DescriptorSet {
    ///Writes resources into the set. All writes are validated against the layout before anything is written.
    ///
    /// The set must not be in use by a pending submission.
    pub fn update(&mut self, writes: &[DescriptorWrite]) -> Result<(), DescriptorError> {
        let mut kinds = SmallVec::<[DescriptorKind; 4]>::with_capacity(writes.len());
        for write in writes {
            kinds.push(validate_update(
                self.layout.bindings(),
                write.binding,
                write.array_element,
                matches!(write.resources, DescriptorResources::Buffers(_)),
                write.resources.len(),
            )?);
        }

        //infos need to stay at a stable location while the writes reference them.
        let infos = writes
            .iter()
            .map(|w| match w.resources {
                DescriptorResources::Buffers(buffers) => (
                    buffers
                        .iter()
                        .map(|b| {
                            vk::DescriptorBufferInfo::default()
                                .buffer(b.buffer.inner)
                                .offset(b.offset)
                                .range(b.range.unwrap_or(vk::WHOLE_SIZE))
                        })
                        .collect::<Vec<_>>(),
                    Vec::new(),
                ),
                DescriptorResources::Images(images) => (
                    Vec::new(),
                    images
                        .iter()
                        .map(|i| {
                            vk::DescriptorImageInfo::default()
                                .image_view(i.view.inner)
                                .sampler(i.sampler.inner)
                                .image_layout(i.layout.to_vk())
                        })
                        .collect::<Vec<_>>(),
                ),
            })
            .collect::<SmallVec<[_; 4]>>();

        let vk_writes = writes
            .iter()
            .zip(kinds.iter())
            .zip(infos.iter())
            .map(|((write, kind), (buffer_infos, image_infos))| {
                let vk_write = vk::WriteDescriptorSet::default()
                    .dst_set(self.inner)
                    .dst_binding(write.binding)
                    .dst_array_element(write.array_element)
                    .descriptor_type(kind.to_vk());
                if kind.is_buffer() {
                    vk_write.buffer_info(buffer_infos)
                } else {
                    vk_write.image_info(image_infos)
                }
            })
            .collect::<SmallVec<[vk::WriteDescriptorSet; 4]>>();

        unsafe { self.device.inner.update_descriptor_sets(&vk_writes, &[]) };
        Ok(())
    }
}

impl DeviceResource for DescriptorSet {
    type Raw = vk::DescriptorSet;
    fn raw(&self) -> Self::Raw {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn pool_sizes_for_layouts() {
        let bindings = layout();
        let (sizes, max_sets) = sizes_for_layouts(&[&bindings, &bindings[..1]], 3).unwrap();
        assert_eq!(max_sets, 6);
        let merged = merge_pool_sizes(&sizes).unwrap();
        assert_eq!(merged.get(&DescriptorKind::UniformBuffer), Some(&6));
        assert_eq!(merged.get(&DescriptorKind::ImageSampler), Some(&12));
    }

    #[test]
    fn pool_size_overflow_is_an_error() {
        let bindings = layout();
        assert_eq!(
            sizes_for_layouts(&[&bindings], u32::MAX).err(),
            Some(DescriptorError::PoolTooLarge)
        );
        assert_eq!(
            merge_pool_sizes(&[
                (DescriptorKind::UniformBuffer, u32::MAX),
                (DescriptorKind::UniformBuffer, 1)
            ])
            .err(),
            Some(DescriptorError::PoolTooLarge)
        );
    }

    fn layout() -> Vec<DescriptorBinding> {
        vec![
            DescriptorBinding::new(0, DescriptorKind::UniformBuffer, ShaderStages::VERTEX),
            DescriptorBinding {
                count: 4,
                ..DescriptorBinding::new(1, DescriptorKind::ImageSampler, ShaderStages::FRAGMENT)
            },
        ]
    }

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(DescriptorSetLayout: Send, Sync);
        assert_impl_all!(DescriptorPool: Send, Sync);
        assert_impl_all!(DescriptorSet: Send, Sync);
    }

    #[test]
    fn layout_bindings_are_checked() {
        assert!(validate_bindings(&layout()).is_ok());

        let mut duplicate = layout();
        duplicate[1].binding = 0;
        assert_eq!(
            validate_bindings(&duplicate),
            Err(DescriptorError::DuplicateBinding(0))
        );

        let mut empty = layout();
        empty[0].count = 0;
        assert_eq!(validate_bindings(&empty), Err(DescriptorError::EmptyBinding(0)));
    }

    #[test]
    fn valid_update_returns_kind() {
        let layout = layout();
        assert_eq!(
            validate_update(&layout, 0, 0, true, 1),
            Ok(DescriptorKind::UniformBuffer)
        );
        assert_eq!(
            validate_update(&layout, 1, 2, false, 2),
            Ok(DescriptorKind::ImageSampler)
        );
    }

    #[test]
    fn update_shape_errors() {
        let layout = layout();
        assert_eq!(
            validate_update(&layout, 0, 0, true, 0),
            Err(DescriptorError::EmptyUpdate)
        );
        assert_eq!(
            validate_update(&layout, 7, 0, true, 1),
            Err(DescriptorError::NoSuchBinding(7))
        );
        assert_eq!(
            validate_update(&layout, 0, 0, false, 1),
            Err(DescriptorError::KindMismatch {
                binding: 0,
                expected: DescriptorKind::UniformBuffer
            })
        );
        assert_eq!(
            validate_update(&layout, 1, 3, false, 2),
            Err(DescriptorError::ArrayOutOfRange {
                first: 3,
                end: 5,
                count: 4
            })
        );
    }
}
