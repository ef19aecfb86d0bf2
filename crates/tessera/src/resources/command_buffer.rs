use std::sync::Arc;

use ash::vk;
use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;

use super::{
    Buffer, DescriptorSet, DeviceResource, Framebuffer, GraphicsPipeline, Image, PipelineLayout,
    RenderPass,
};
use crate::{
    context::{Device, Queue},
    error::CommandBufferError,
    flags::{
        Access, BindPoint, ImageAspect, ImageLayout, IndexType, PipelineStages, StencilFaces,
    },
};

new_key_type! {
    ///Key of a [CommandBuffer] within its [CommandPool]. Becomes stale once the buffer is destroyed.
    pub struct CommandBufferKey;
}

///Recording state of a [CommandBuffer].
///
/// ```text
/// Initial --begin_capture--> Capturing --end_capture--> Executable
///    ^                                                      |
///    +-------------------------reset------------------------+
/// ```
///
/// `begin_capture` on an executable buffer implicitly resets it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum RecordingState {
    #[default]
    Initial,
    Capturing {
        ///True between `begin_render_pass` and `end_render_pass`.
        rendering: bool,
    },
    Executable,
}

impl RecordingState {
    pub fn begin_capture(&mut self) -> Result<(), CommandBufferError> {
        match self {
            RecordingState::Capturing { .. } => Err(CommandBufferError::AlreadyCapturing),
            _ => {
                *self = RecordingState::Capturing { rendering: false };
                Ok(())
            }
        }
    }

    pub fn end_capture(&mut self) -> Result<(), CommandBufferError> {
        match self {
            RecordingState::Capturing { rendering: true } => {
                Err(CommandBufferError::InsideRenderPass)
            }
            RecordingState::Capturing { rendering: false } => {
                *self = RecordingState::Executable;
                Ok(())
            }
            _ => Err(CommandBufferError::NotCapturing),
        }
    }

    pub fn begin_render_pass(&mut self) -> Result<(), CommandBufferError> {
        self.require_outside_pass()?;
        *self = RecordingState::Capturing { rendering: true };
        Ok(())
    }

    pub fn end_render_pass(&mut self) -> Result<(), CommandBufferError> {
        self.require_rendering()?;
        *self = RecordingState::Capturing { rendering: false };
        Ok(())
    }

    pub fn reset(&mut self) {
        *self = RecordingState::Initial;
    }

    ///Capturing, inside or outside of a render pass.
    pub fn require_capturing(&self) -> Result<(), CommandBufferError> {
        match self {
            RecordingState::Capturing { .. } => Ok(()),
            _ => Err(CommandBufferError::NotCapturing),
        }
    }

    ///Capturing and inside a render pass.
    pub fn require_rendering(&self) -> Result<(), CommandBufferError> {
        match self {
            RecordingState::Capturing { rendering: true } => Ok(()),
            RecordingState::Capturing { rendering: false } => Err(CommandBufferError::NotRendering),
            _ => Err(CommandBufferError::NotCapturing),
        }
    }

    ///Capturing and outside of any render pass.
    pub fn require_outside_pass(&self) -> Result<(), CommandBufferError> {
        match self {
            RecordingState::Capturing { rendering: false } => Ok(()),
            RecordingState::Capturing { rendering: true } => {
                Err(CommandBufferError::InsideRenderPass)
            }
            _ => Err(CommandBufferError::NotCapturing),
        }
    }
}

///Pool of command buffers for one queue family. The pool owns its buffers. They are referenced by
/// [CommandBufferKey] and freed together with the pool.
///
/// Pools are not meant to be shared between threads. Use one pool per recording thread.
pub struct CommandPool {
    ///Device this pool was created on.
    pub device: Arc<Device>,
    ///The queue family this pool's buffers can be used on.
    pub queue_family: u32,
    ///the raw vulkan handle.
    pub inner: vk::CommandPool,
    buffers: SlotMap<CommandBufferKey, CommandBuffer>,
}

impl CommandPool {
    ///Creates a pool whose buffers can be submitted to `queue`, and to any other queue of the same family.
    pub fn new(device: &Arc<Device>, queue: &Queue) -> Result<Self, CommandBufferError> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue.family_index);

        let pool = unsafe { device.inner.create_command_pool(&create_info, None)? };

        Ok(CommandPool {
            device: device.clone(),
            inner: pool,
            queue_family: queue.family_index,
            buffers: SlotMap::with_key(),
        })
    }

    ///Allocates `count` primary command buffers. Either all of them are allocated, or none.
    pub fn allocate_command_buffers(
        &mut self,
        count: usize,
    ) -> Result<Vec<CommandBufferKey>, CommandBufferError> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.inner)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count as u32);
        let raw = unsafe { self.device.inner.allocate_command_buffers(&allocate_info)? };

        if raw.len() != count {
            #[cfg(feature = "logging")]
            log::error!(
                "Allocated wrong number of command buffers, expected {}, got {}",
                count,
                raw.len()
            );
            if !raw.is_empty() {
                unsafe { self.device.inner.free_command_buffers(self.inner, &raw) };
            }
            return Err(CommandBufferError::FailedToAllocate {
                allocated: raw.len(),
                count,
            });
        }

        Ok(raw
            .into_iter()
            .map(|inner| {
                self.buffers.insert(CommandBuffer {
                    inner,
                    device: self.device.clone(),
                    family_index: self.queue_family,
                    state: RecordingState::Initial,
                    subpass: None,
                })
            })
            .collect())
    }

    pub fn get(&self, key: CommandBufferKey) -> Result<&CommandBuffer, CommandBufferError> {
        self.buffers
            .get(key)
            .ok_or(CommandBufferError::StaleHandle)
    }

    pub fn get_mut(
        &mut self,
        key: CommandBufferKey,
    ) -> Result<&mut CommandBuffer, CommandBufferError> {
        self.buffers
            .get_mut(key)
            .ok_or(CommandBufferError::StaleHandle)
    }

    ///Number of live command buffers.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    ///Frees the given buffers. If any key is stale, nothing is freed.
    ///
    /// None of the buffers may be part of a pending submission.
    pub fn destroy_command_buffers(
        &mut self,
        keys: &[CommandBufferKey],
    ) -> Result<(), CommandBufferError> {
        if keys.iter().any(|k| !self.buffers.contains_key(*k)) {
            return Err(CommandBufferError::StaleHandle);
        }

        let raw = keys
            .iter()
            .filter_map(|k| self.buffers.remove(*k))
            .map(|cb| cb.inner)
            .collect::<SmallVec<[vk::CommandBuffer; 8]>>();
        if !raw.is_empty() {
            unsafe { self.device.inner.free_command_buffers(self.inner, &raw) };
        }
        Ok(())
    }

    ///Resets every buffer of the pool to the initial state. None of them may be part of a pending submission.
    pub fn reset_all_command_buffers(&mut self) -> Result<(), CommandBufferError> {
        unsafe {
            self.device
                .inner
                .reset_command_pool(self.inner, vk::CommandPoolResetFlags::empty())?
        };
        for cb in self.buffers.values_mut() {
            cb.state.reset();
            cb.subpass = None;
        }
        Ok(())
    }
}

impl DeviceResource for CommandPool {
    type Raw = vk::CommandPool;
    fn raw(&self) -> Self::Raw {
        self.inner
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        //destroying the pool frees all its buffers
        self.buffers.clear();
        unsafe { self.device.inner.destroy_command_pool(self.inner, None) }
    }
}

///Clear values and area of a render pass instance.
pub struct RenderPassBeginInfo<'a> {
    pub render_pass: &'a RenderPass,
    pub framebuffer: &'a Framebuffer,
    pub area: vk::Rect2D,
    ///Clear colour per colour attachment. Missing entries are cleared to transparent black.
    pub colour_clear_values: &'a [[f32; 4]],
    pub depth_clear: f32,
    pub stencil_clear: u32,
}

impl<'a> RenderPassBeginInfo<'a> {
    ///Begin info covering the whole framebuffer, with depth cleared to 1.0.
    pub fn new(
        render_pass: &'a RenderPass,
        framebuffer: &'a Framebuffer,
        colour_clear_values: &'a [[f32; 4]],
    ) -> Self {
        RenderPassBeginInfo {
            render_pass,
            framebuffer,
            area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: framebuffer.extent,
            },
            colour_clear_values,
            depth_clear: 1.0,
            stencil_clear: 0,
        }
    }
}

///Region of a copy between a buffer and an image.
#[derive(Clone, Copy, Debug)]
pub struct BufferImageCopy {
    pub buffer_offset: u64,
    ///Zero means tightly packed.
    pub buffer_row_length: u32,
    pub buffer_image_height: u32,
    pub aspect: ImageAspect,
    pub mip_level: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
    pub image_offset: vk::Offset3D,
    pub image_extent: vk::Extent3D,
}

impl BufferImageCopy {
    ///Copies tightly packed data at the start of the buffer into mip level 0 of all layers of `image`.
    pub fn whole(image: &Image) -> Self {
        BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            aspect: image.format().aspect(),
            mip_level: 0,
            base_array_layer: 0,
            layer_count: image.array_layers(),
            image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            image_extent: image.extent(),
        }
    }

    fn to_vk(self) -> vk::BufferImageCopy {
        vk::BufferImageCopy::default()
            .buffer_offset(self.buffer_offset)
            .buffer_row_length(self.buffer_row_length)
            .buffer_image_height(self.buffer_image_height)
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(self.aspect.to_vk())
                    .mip_level(self.mip_level)
                    .base_array_layer(self.base_array_layer)
                    .layer_count(self.layer_count),
            )
            .image_offset(self.image_offset)
            .image_extent(self.image_extent)
    }
}

///Layout transition and access synchronisation of an image subresource range.
#[derive(Clone, Copy)]
pub struct ImageMemoryBarrier<'a> {
    pub image: &'a Image,
    pub src_access: Access,
    pub dst_access: Access,
    pub old_layout: ImageLayout,
    pub new_layout: ImageLayout,
    pub aspect: ImageAspect,
    pub base_mip_level: u32,
    pub level_count: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
    ///Queue family ownership transfer `(source, destination)`. `None` keeps the current owner.
    pub queue_transfer: Option<(u32, u32)>,
}

impl<'a> ImageMemoryBarrier<'a> {
    ///Transitions all mips and layers of `image` from `old_layout` to `new_layout`.
    pub fn whole(image: &'a Image, old_layout: ImageLayout, new_layout: ImageLayout) -> Self {
        ImageMemoryBarrier {
            image,
            src_access: Access::empty(),
            dst_access: Access::empty(),
            old_layout,
            new_layout,
            aspect: image.format().aspect(),
            base_mip_level: 0,
            level_count: image.mip_levels(),
            base_array_layer: 0,
            layer_count: image.array_layers(),
            queue_transfer: None,
        }
    }

    pub fn with_access(mut self, src: Access, dst: Access) -> Self {
        self.src_access = src;
        self.dst_access = dst;
        self
    }

    fn to_vk(self) -> vk::ImageMemoryBarrier<'static> {
        let (src_family, dst_family) = self
            .queue_transfer
            .unwrap_or((vk::QUEUE_FAMILY_IGNORED, vk::QUEUE_FAMILY_IGNORED));
        vk::ImageMemoryBarrier::default()
            .image(self.image.inner)
            .src_access_mask(self.src_access.to_vk())
            .dst_access_mask(self.dst_access.to_vk())
            .old_layout(self.old_layout.to_vk())
            .new_layout(self.new_layout.to_vk())
            .src_queue_family_index(src_family)
            .dst_queue_family_index(dst_family)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(self.aspect.to_vk())
                    .base_mip_level(self.base_mip_level)
                    .level_count(self.level_count)
                    .base_array_layer(self.base_array_layer)
                    .layer_count(self.layer_count),
            )
    }
}

///Primary command buffer. Single threaded recording context, owned by a [CommandPool].
///
/// Every command checks the [RecordingState] before anything is recorded. A command that fails leaves the
/// buffer unchanged.
pub struct CommandBuffer {
    ///the raw vulkan handle
    pub inner: vk::CommandBuffer,
    pub device: Arc<Device>,
    family_index: u32,
    state: RecordingState,
    ///`(current, count)` while inside a render pass.
    subpass: Option<(u32, u32)>,
}

impl CommandBuffer {
    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self.state, RecordingState::Capturing { .. })
    }

    pub fn is_rendering(&self) -> bool {
        self.state == RecordingState::Capturing { rendering: true }
    }

    pub fn is_executable(&self) -> bool {
        self.state == RecordingState::Executable
    }

    ///Queue family the buffer can be submitted to.
    pub fn queue_family(&self) -> u32 {
        self.family_index
    }

    ///Resets the buffer to the initial state.
    ///
    /// The buffer must not be part of a pending submission, wait for the submission's fence first.
    pub fn reset(&mut self) -> Result<(), CommandBufferError> {
        unsafe {
            self.device
                .inner
                .reset_command_buffer(self.inner, vk::CommandBufferResetFlags::empty())?
        };
        self.state.reset();
        self.subpass = None;
        Ok(())
    }

    ///Starts recording. Any previously recorded commands are discarded.
    pub fn begin_capture(&mut self) -> Result<(), CommandBufferError> {
        let mut next = self.state;
        next.begin_capture()?;
        let begin_info = vk::CommandBufferBeginInfo::default();
        unsafe {
            self.device
                .inner
                .begin_command_buffer(self.inner, &begin_info)?
        };
        self.state = next;
        Ok(())
    }

    ///Ends recording, after which the buffer can be submitted.
    pub fn end_capture(&mut self) -> Result<(), CommandBufferError> {
        let mut next = self.state;
        next.end_capture()?;
        unsafe { self.device.inner.end_command_buffer(self.inner)? };
        self.state = next;
        Ok(())
    }

    pub fn begin_render_pass(
        &mut self,
        info: &RenderPassBeginInfo,
    ) -> Result<(), CommandBufferError> {
        let mut next = self.state;
        next.begin_render_pass()?;
        if !info.render_pass.is_valid() || !info.framebuffer.is_valid() {
            return Err(CommandBufferError::InvalidResource("render pass"));
        }

        let mut clear_values = (0..info.render_pass.colour_attachment_count())
            .map(|idx| vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: info
                        .colour_clear_values
                        .get(idx)
                        .copied()
                        .unwrap_or([0.0; 4]),
                },
            })
            .collect::<SmallVec<[vk::ClearValue; 8]>>();
        if info.render_pass.has_depth_stencil() {
            clear_values.push(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: info.depth_clear,
                    stencil: info.stencil_clear,
                },
            });
        }

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(info.render_pass.inner)
            .framebuffer(info.framebuffer.inner)
            .render_area(info.area)
            .clear_values(&clear_values);
        unsafe {
            self.device.inner.cmd_begin_render_pass(
                self.inner,
                &begin_info,
                vk::SubpassContents::INLINE,
            )
        };
        self.state = next;
        self.subpass = Some((0, info.render_pass.subpass_count() as u32));
        Ok(())
    }

    ///Advances to the next subpass of the current render pass.
    pub fn next_subpass(&mut self) -> Result<(), CommandBufferError> {
        self.state.require_rendering()?;
        let (current, count) = self.subpass.ok_or(CommandBufferError::NotRendering)?;
        if current + 1 >= count {
            return Err(CommandBufferError::NoNextSubpass);
        }
        unsafe {
            self.device
                .inner
                .cmd_next_subpass(self.inner, vk::SubpassContents::INLINE)
        };
        self.subpass = Some((current + 1, count));
        Ok(())
    }

    ///Index of the current subpass, if rendering.
    pub fn subpass(&self) -> Option<u32> {
        self.subpass.map(|(current, _)| current)
    }

    pub fn end_render_pass(&mut self) -> Result<(), CommandBufferError> {
        let mut next = self.state;
        next.end_render_pass()?;
        unsafe { self.device.inner.cmd_end_render_pass(self.inner) };
        self.state = next;
        self.subpass = None;
        Ok(())
    }

    ///Copies `size` bytes from `src` at `src_offset` to `dst` at `dst_offset`. Both ranges are checked against the
    /// buffer sizes. A copy of zero bytes records nothing.
    pub fn copy_buffer(
        &mut self,
        src: &Buffer,
        src_offset: u64,
        dst: &Buffer,
        dst_offset: u64,
        size: u64,
    ) -> Result<(), CommandBufferError> {
        self.state.require_outside_pass()?;
        check_range(src_offset, size, src.size())?;
        check_range(dst_offset, size, dst.size())?;
        if !src.is_valid() || !dst.is_valid() {
            return Err(CommandBufferError::InvalidResource("buffer"));
        }
        if size == 0 {
            return Ok(());
        }

        let region = vk::BufferCopy::default()
            .src_offset(src_offset)
            .dst_offset(dst_offset)
            .size(size);
        unsafe {
            self.device.inner.cmd_copy_buffer(
                self.inner,
                src.inner,
                dst.inner,
                core::slice::from_ref(&region),
            )
        };
        Ok(())
    }

    ///Copies buffer data into `dst`, which has to be in `dst_layout` (usually *transfer destination optimal*).
    pub fn copy_buffer_to_image(
        &mut self,
        src: &Buffer,
        dst: &Image,
        dst_layout: ImageLayout,
        regions: &[BufferImageCopy],
    ) -> Result<(), CommandBufferError> {
        self.state.require_outside_pass()?;
        if !src.is_valid() || !dst.is_valid() {
            return Err(CommandBufferError::InvalidResource("buffer or image"));
        }
        for (index, region) in regions.iter().enumerate() {
            check_image_copy(
                region,
                index,
                src.size(),
                dst.extent(),
                dst.mip_levels(),
                dst.array_layers(),
                dst.format().texel_size(),
            )?;
        }
        if regions.is_empty() {
            return Ok(());
        }

        let regions = regions
            .iter()
            .map(|r| r.to_vk())
            .collect::<SmallVec<[vk::BufferImageCopy; 4]>>();
        unsafe {
            self.device.inner.cmd_copy_buffer_to_image(
                self.inner,
                src.inner,
                dst.inner,
                dst_layout.to_vk(),
                &regions,
            )
        };
        Ok(())
    }

    ///Copies regions of `src`, which has to be in `src_layout` (usually *transfer source optimal*), into `dst`.
    /// Regions are checked like the ones of [copy_buffer_to_image](Self::copy_buffer_to_image).
    pub fn copy_image_to_buffer(
        &mut self,
        src: &Image,
        src_layout: ImageLayout,
        dst: &Buffer,
        regions: &[BufferImageCopy],
    ) -> Result<(), CommandBufferError> {
        self.state.require_outside_pass()?;
        if !src.is_valid() || !dst.is_valid() {
            return Err(CommandBufferError::InvalidResource("buffer or image"));
        }
        for (index, region) in regions.iter().enumerate() {
            check_image_copy(
                region,
                index,
                dst.size(),
                src.extent(),
                src.mip_levels(),
                src.array_layers(),
                src.format().texel_size(),
            )?;
        }
        if regions.is_empty() {
            return Ok(());
        }

        let regions = regions
            .iter()
            .map(|r| r.to_vk())
            .collect::<SmallVec<[vk::BufferImageCopy; 4]>>();
        unsafe {
            self.device.inner.cmd_copy_image_to_buffer(
                self.inner,
                src.inner,
                src_layout.to_vk(),
                dst.inner,
                &regions,
            )
        };
        Ok(())
    }

    ///Records a pipeline barrier with the given image barriers. Allowed inside and outside of render passes.
    pub fn pipeline_barrier(
        &mut self,
        src_stages: PipelineStages,
        dst_stages: PipelineStages,
        image_barriers: &[ImageMemoryBarrier],
    ) -> Result<(), CommandBufferError> {
        self.state.require_capturing()?;
        let barriers = image_barriers
            .iter()
            .map(|b| b.to_vk())
            .collect::<SmallVec<[vk::ImageMemoryBarrier; 4]>>();
        unsafe {
            self.device.inner.cmd_pipeline_barrier(
                self.inner,
                src_stages.to_vk(),
                dst_stages.to_vk(),
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &barriers,
            )
        };
        Ok(())
    }

    ///Global memory barrier. Makes `src_access` of `src_stages` available to `dst_access` of `dst_stages`.
    pub fn memory_barrier(
        &mut self,
        src_stages: PipelineStages,
        src_access: Access,
        dst_stages: PipelineStages,
        dst_access: Access,
    ) -> Result<(), CommandBufferError> {
        self.state.require_capturing()?;
        let barrier = vk::MemoryBarrier::default()
            .src_access_mask(src_access.to_vk())
            .dst_access_mask(dst_access.to_vk());
        unsafe {
            self.device.inner.cmd_pipeline_barrier(
                self.inner,
                src_stages.to_vk(),
                dst_stages.to_vk(),
                vk::DependencyFlags::empty(),
                core::slice::from_ref(&barrier),
                &[],
                &[],
            )
        };
        Ok(())
    }

    pub fn bind_pipeline(&mut self, pipeline: &GraphicsPipeline) -> Result<(), CommandBufferError> {
        self.state.require_rendering()?;
        if !pipeline.is_valid() {
            return Err(CommandBufferError::InvalidResource("pipeline"));
        }
        unsafe {
            self.device.inner.cmd_bind_pipeline(
                self.inner,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.inner,
            )
        };
        Ok(())
    }

    ///Binds `sets` starting at set index `first_set`. Graphics bindings need an active render pass, compute
    /// bindings only a capturing buffer.
    pub fn bind_descriptor_sets(
        &mut self,
        bind_point: BindPoint,
        layout: &PipelineLayout,
        first_set: u32,
        sets: &[&DescriptorSet],
    ) -> Result<(), CommandBufferError> {
        match bind_point {
            BindPoint::Graphics => self.state.require_rendering()?,
            BindPoint::Compute => self.state.require_capturing()?,
        }
        if sets.iter().any(|s| !s.is_valid()) {
            return Err(CommandBufferError::InvalidResource("descriptor set"));
        }
        let declared = layout
            .set_layouts
            .iter()
            .map(|l| l.inner)
            .collect::<SmallVec<[vk::DescriptorSetLayout; 4]>>();
        let bound = sets
            .iter()
            .map(|s| s.layout.inner)
            .collect::<SmallVec<[vk::DescriptorSetLayout; 4]>>();
        check_set_layouts(&declared, first_set, &bound)?;
        let raw = sets
            .iter()
            .map(|s| s.raw())
            .collect::<SmallVec<[vk::DescriptorSet; 4]>>();
        unsafe {
            self.device.inner.cmd_bind_descriptor_sets(
                self.inner,
                bind_point.to_vk(),
                layout.inner,
                first_set,
                &raw,
                &[],
            )
        };
        Ok(())
    }

    ///Binds `(buffer, offset)` pairs to consecutive vertex input bindings, starting at `first_binding`.
    pub fn bind_vertex_buffers(
        &mut self,
        first_binding: u32,
        buffers: &[(&Buffer, u64)],
    ) -> Result<(), CommandBufferError> {
        self.state.require_rendering()?;
        if buffers.iter().any(|(b, _)| !b.is_valid()) {
            return Err(CommandBufferError::InvalidResource("vertex buffer"));
        }
        let (raw, offsets): (SmallVec<[vk::Buffer; 4]>, SmallVec<[u64; 4]>) =
            buffers.iter().map(|(b, offset)| (b.inner, *offset)).unzip();
        unsafe {
            self.device
                .inner
                .cmd_bind_vertex_buffers(self.inner, first_binding, &raw, &offsets)
        };
        Ok(())
    }

    pub fn bind_index_buffer(
        &mut self,
        buffer: &Buffer,
        offset: u64,
        index_type: IndexType,
    ) -> Result<(), CommandBufferError> {
        self.state.require_rendering()?;
        if !buffer.is_valid() {
            return Err(CommandBufferError::InvalidResource("index buffer"));
        }
        unsafe {
            self.device.inner.cmd_bind_index_buffer(
                self.inner,
                buffer.inner,
                offset,
                index_type.to_vk(),
            )
        };
        Ok(())
    }

    pub fn set_viewports(
        &mut self,
        first_viewport: u32,
        viewports: &[vk::Viewport],
    ) -> Result<(), CommandBufferError> {
        self.state.require_rendering()?;
        unsafe {
            self.device
                .inner
                .cmd_set_viewport(self.inner, first_viewport, viewports)
        };
        Ok(())
    }

    pub fn set_scissors(
        &mut self,
        first_scissor: u32,
        scissors: &[vk::Rect2D],
    ) -> Result<(), CommandBufferError> {
        self.state.require_rendering()?;
        unsafe {
            self.device
                .inner
                .cmd_set_scissor(self.inner, first_scissor, scissors)
        };
        Ok(())
    }

    pub fn set_line_width(&mut self, width: f32) -> Result<(), CommandBufferError> {
        self.state.require_rendering()?;
        unsafe { self.device.inner.cmd_set_line_width(self.inner, width) };
        Ok(())
    }

    pub fn set_depth_bias(
        &mut self,
        constant_factor: f32,
        clamp: f32,
        slope_factor: f32,
    ) -> Result<(), CommandBufferError> {
        self.state.require_rendering()?;
        unsafe {
            self.device
                .inner
                .cmd_set_depth_bias(self.inner, constant_factor, clamp, slope_factor)
        };
        Ok(())
    }

    pub fn set_blend_constants(&mut self, constants: [f32; 4]) -> Result<(), CommandBufferError> {
        self.state.require_rendering()?;
        unsafe {
            self.device
                .inner
                .cmd_set_blend_constants(self.inner, &constants)
        };
        Ok(())
    }

    pub fn set_depth_bounds(&mut self, min: f32, max: f32) -> Result<(), CommandBufferError> {
        self.state.require_rendering()?;
        unsafe { self.device.inner.cmd_set_depth_bounds(self.inner, min, max) };
        Ok(())
    }

    pub fn set_stencil_compare_mask(
        &mut self,
        faces: StencilFaces,
        mask: u32,
    ) -> Result<(), CommandBufferError> {
        self.state.require_rendering()?;
        unsafe {
            self.device
                .inner
                .cmd_set_stencil_compare_mask(self.inner, faces.to_vk(), mask)
        };
        Ok(())
    }

    pub fn set_stencil_write_mask(
        &mut self,
        faces: StencilFaces,
        mask: u32,
    ) -> Result<(), CommandBufferError> {
        self.state.require_rendering()?;
        unsafe {
            self.device
                .inner
                .cmd_set_stencil_write_mask(self.inner, faces.to_vk(), mask)
        };
        Ok(())
    }

    pub fn set_stencil_reference(
        &mut self,
        faces: StencilFaces,
        reference: u32,
    ) -> Result<(), CommandBufferError> {
        self.state.require_rendering()?;
        unsafe {
            self.device
                .inner
                .cmd_set_stencil_reference(self.inner, faces.to_vk(), reference)
        };
        Ok(())
    }

    ///Writes `data` into push constant range `range_index` of `layout`. `data` must not be bigger than the range
    /// and its size must be a non-zero multiple of 4.
    pub fn push_constants(
        &mut self,
        layout: &PipelineLayout,
        range_index: usize,
        data: &[u8],
    ) -> Result<(), CommandBufferError> {
        self.state.require_rendering()?;
        let range = layout
            .push_constant_range(range_index)
            .ok_or(CommandBufferError::NoSuchPushRange(range_index))?;
        if data.is_empty() || data.len() % 4 != 0 || data.len() as u64 > range.size as u64 {
            return Err(CommandBufferError::PushConstantSize {
                len: data.len(),
                size: range.size,
            });
        }
        unsafe {
            self.device.inner.cmd_push_constants(
                self.inner,
                layout.inner,
                range.stage_flags,
                range.offset,
                data,
            )
        };
        Ok(())
    }

    ///Typed version of [push_constants](CommandBuffer::push_constants).
    pub fn push_constant<T: bytemuck::Pod>(
        &mut self,
        layout: &PipelineLayout,
        range_index: usize,
        value: &T,
    ) -> Result<(), CommandBufferError> {
        self.push_constants(layout, range_index, bytemuck::bytes_of(value))
    }

    pub fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Result<(), CommandBufferError> {
        self.state.require_rendering()?;
        unsafe {
            self.device.inner.cmd_draw(
                self.inner,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            )
        };
        Ok(())
    }

    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> Result<(), CommandBufferError> {
        self.state.require_rendering()?;
        unsafe {
            self.device.inner.cmd_draw_indexed(
                self.inner,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            )
        };
        Ok(())
    }
}

impl DeviceResource for CommandBuffer {
    type Raw = vk::CommandBuffer;
    fn raw(&self) -> Self::Raw {
        self.inner
    }
}

fn check_range(offset: u64, size: u64, capacity: u64) -> Result<(), CommandBufferError> {
    match offset.checked_add(size) {
        Some(end) if end <= capacity => Ok(()),
        end => Err(CommandBufferError::CopyOutOfRange {
            offset,
            end: end.unwrap_or(u64::MAX),
            size: capacity,
        }),
    }
}

///Checks that `bound[i]` is the set layout `declared` at set index `first_set + i`.
fn check_set_layouts(
    declared: &[vk::DescriptorSetLayout],
    first_set: u32,
    bound: &[vk::DescriptorSetLayout],
) -> Result<(), CommandBufferError> {
    for (offset, layout) in bound.iter().enumerate() {
        let set = first_set as usize + offset;
        if declared.get(set) != Some(layout) {
            return Err(CommandBufferError::SetLayoutMismatch { set });
        }
    }
    Ok(())
}

///Checks a buffer to image copy region against the subresources of the image. If the texel size is known, the
/// bytes the region reads are checked against the buffer as well.
fn check_image_copy(
    region: &BufferImageCopy,
    index: usize,
    buffer_size: u64,
    image_extent: vk::Extent3D,
    mip_levels: u32,
    array_layers: u32,
    texel_size: Option<u64>,
) -> Result<(), CommandBufferError> {
    let invalid = CommandBufferError::ImageRegionOutOfRange(index);
    if region.mip_level >= mip_levels || region.layer_count == 0 {
        return Err(invalid);
    }
    match region.base_array_layer.checked_add(region.layer_count) {
        Some(end) if end <= array_layers => {}
        _ => return Err(invalid),
    }

    let copy = region.image_extent;
    if copy.width == 0 || copy.height == 0 || copy.depth == 0 {
        return Err(invalid);
    }
    let level = |size: u32| (size >> region.mip_level).max(1);
    let fits = |offset: i32, size: u32, limit: u32| {
        u32::try_from(offset)
            .ok()
            .and_then(|o| o.checked_add(size))
            .is_some_and(|end| end <= limit)
    };
    if !fits(region.image_offset.x, copy.width, level(image_extent.width))
        || !fits(region.image_offset.y, copy.height, level(image_extent.height))
        || !fits(region.image_offset.z, copy.depth, level(image_extent.depth))
    {
        return Err(invalid);
    }
    if (region.buffer_row_length != 0 && region.buffer_row_length < copy.width)
        || (region.buffer_image_height != 0 && region.buffer_image_height < copy.height)
    {
        return Err(invalid);
    }

    let Some(texel) = texel_size else {
        return check_range(region.buffer_offset, 1, buffer_size);
    };
    let row = u64::from(if region.buffer_row_length == 0 {
        copy.width
    } else {
        region.buffer_row_length
    });
    let rows = u64::from(if region.buffer_image_height == 0 {
        copy.height
    } else {
        region.buffer_image_height
    });
    let slices = u64::from(copy.depth) * u64::from(region.layer_count);
    //texels up to and including the last one the copy reads
    let footprint = (slices - 1)
        .checked_mul(rows * row)
        .and_then(|t| t.checked_add((u64::from(copy.height) - 1) * row + u64::from(copy.width)))
        .and_then(|t| t.checked_mul(texel));
    match footprint {
        Some(size) => check_range(region.buffer_offset, size, buffer_size),
        None => Err(CommandBufferError::CopyOutOfRange {
            offset: region.buffer_offset,
            end: u64::MAX,
            size: buffer_size,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;
    use ash::vk::Handle;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(CommandPool: Send, Sync);
        assert_impl_all!(CommandBuffer: Send, Sync);
    }

    #[test]
    fn full_recording_cycle() {
        let mut state = RecordingState::default();
        assert_eq!(state, RecordingState::Initial);

        state.begin_capture().unwrap();
        state.begin_render_pass().unwrap();
        state.require_rendering().unwrap();
        state.end_render_pass().unwrap();
        state.end_capture().unwrap();
        assert_eq!(state, RecordingState::Executable);

        state.reset();
        assert_eq!(state, RecordingState::Initial);
    }

    #[test]
    fn double_begin_capture_keeps_state() {
        let mut state = RecordingState::default();
        state.begin_capture().unwrap();
        state.begin_render_pass().unwrap();

        assert_eq!(
            state.begin_capture(),
            Err(CommandBufferError::AlreadyCapturing)
        );
        assert_eq!(state, RecordingState::Capturing { rendering: true });
    }

    #[test]
    fn executable_buffer_can_be_recaptured() {
        let mut state = RecordingState::Executable;
        state.begin_capture().unwrap();
        assert_eq!(state, RecordingState::Capturing { rendering: false });
    }

    #[test]
    fn end_capture_inside_render_pass_fails() {
        let mut state = RecordingState::default();
        state.begin_capture().unwrap();
        state.begin_render_pass().unwrap();
        assert_eq!(state.end_capture(), Err(CommandBufferError::InsideRenderPass));
        assert!(state.require_rendering().is_ok());
    }

    #[test]
    fn commands_outside_capture_fail() {
        let mut state = RecordingState::default();
        assert_eq!(state.end_capture(), Err(CommandBufferError::NotCapturing));
        assert_eq!(
            state.begin_render_pass(),
            Err(CommandBufferError::NotCapturing)
        );
        assert_eq!(state.require_capturing(), Err(CommandBufferError::NotCapturing));
        assert_eq!(state, RecordingState::Initial);

        let state = RecordingState::Executable;
        assert_eq!(state.require_rendering(), Err(CommandBufferError::NotCapturing));
    }

    #[test]
    fn draws_need_a_render_pass() {
        let mut state = RecordingState::default();
        state.begin_capture().unwrap();
        assert_eq!(state.require_rendering(), Err(CommandBufferError::NotRendering));
        assert_eq!(state.end_render_pass(), Err(CommandBufferError::NotRendering));
    }

    #[test]
    fn copies_need_to_be_outside_a_render_pass() {
        let mut state = RecordingState::default();
        state.begin_capture().unwrap();
        assert!(state.require_outside_pass().is_ok());
        state.begin_render_pass().unwrap();
        assert_eq!(
            state.require_outside_pass(),
            Err(CommandBufferError::InsideRenderPass)
        );
        assert_eq!(
            state.begin_render_pass(),
            Err(CommandBufferError::InsideRenderPass)
        );
        //barriers are fine either way
        assert!(state.require_capturing().is_ok());
    }

    #[test]
    fn copy_ranges_are_checked() {
        assert!(check_range(0, 64, 64).is_ok());
        assert!(check_range(32, 0, 32).is_ok());
        assert_eq!(
            check_range(32, 64, 64),
            Err(CommandBufferError::CopyOutOfRange {
                offset: 32,
                end: 96,
                size: 64
            })
        );
        assert_eq!(
            check_range(u64::MAX, 2, 64),
            Err(CommandBufferError::CopyOutOfRange {
                offset: u64::MAX,
                end: u64::MAX,
                size: 64
            })
        );
    }

    fn region(width: u32, height: u32) -> BufferImageCopy {
        BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            aspect: ImageAspect::COLOUR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
            image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            image_extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
        }
    }

    const IMAGE: vk::Extent3D = vk::Extent3D {
        width: 64,
        height: 32,
        depth: 1,
    };

    #[test]
    fn image_copy_footprint_is_checked() {
        //64x32 rgba8 is 8192 bytes
        assert!(check_image_copy(&region(64, 32), 0, 8192, IMAGE, 1, 1, Some(4)).is_ok());
        assert_eq!(
            check_image_copy(&region(64, 32), 0, 8191, IMAGE, 1, 1, Some(4)),
            Err(CommandBufferError::CopyOutOfRange {
                offset: 0,
                end: 8192,
                size: 8191
            })
        );

        //padded rows: the last row only reads its copied texels
        let padded = BufferImageCopy {
            buffer_row_length: 80,
            buffer_offset: 16,
            ..region(64, 2)
        };
        assert!(check_image_copy(&padded, 0, 16 + (80 + 64) * 4, IMAGE, 1, 1, Some(4)).is_ok());
        assert!(check_image_copy(&padded, 0, 15 + (80 + 64) * 4, IMAGE, 1, 1, Some(4)).is_err());

        let short_rows = BufferImageCopy {
            buffer_row_length: 10,
            ..region(64, 2)
        };
        assert_eq!(
            check_image_copy(&short_rows, 3, u64::MAX, IMAGE, 1, 1, Some(4)),
            Err(CommandBufferError::ImageRegionOutOfRange(3))
        );
    }

    #[test]
    fn image_copy_subresource_is_checked() {
        let out_of_mips = BufferImageCopy {
            mip_level: 1,
            ..region(32, 16)
        };
        assert!(check_image_copy(&out_of_mips, 0, u64::MAX, IMAGE, 1, 1, Some(4)).is_err());
        //mip 1 of a 64x32 image is 32x16
        assert!(check_image_copy(&out_of_mips, 0, u64::MAX, IMAGE, 2, 1, Some(4)).is_ok());
        let too_wide = BufferImageCopy {
            mip_level: 1,
            ..region(33, 16)
        };
        assert!(check_image_copy(&too_wide, 0, u64::MAX, IMAGE, 2, 1, Some(4)).is_err());

        let layers = BufferImageCopy {
            base_array_layer: 2,
            layer_count: 2,
            ..region(64, 32)
        };
        assert!(check_image_copy(&layers, 0, u64::MAX, IMAGE, 1, 3, Some(4)).is_err());
        assert!(check_image_copy(&layers, 0, u64::MAX, IMAGE, 1, 4, Some(4)).is_ok());

        let negative = BufferImageCopy {
            image_offset: vk::Offset3D { x: -1, y: 0, z: 0 },
            ..region(8, 8)
        };
        assert!(check_image_copy(&negative, 0, u64::MAX, IMAGE, 1, 1, Some(4)).is_err());

        //unknown texel size only checks the start offset
        let depth = BufferImageCopy {
            buffer_offset: 100,
            ..region(64, 32)
        };
        assert!(check_image_copy(&depth, 0, 101, IMAGE, 1, 1, None).is_ok());
        assert!(check_image_copy(&depth, 0, 100, IMAGE, 1, 1, None).is_err());
    }

    #[test]
    fn bound_sets_must_match_declared_layouts() {
        let layouts = [1u64, 2, 3].map(vk::DescriptorSetLayout::from_raw);
        assert!(check_set_layouts(&layouts, 0, &layouts).is_ok());
        assert!(check_set_layouts(&layouts, 1, &layouts[1..]).is_ok());
        assert!(check_set_layouts(&layouts, 0, &[]).is_ok());

        //swapped order
        assert_eq!(
            check_set_layouts(&layouts, 0, &[layouts[1], layouts[0]]),
            Err(CommandBufferError::SetLayoutMismatch { set: 0 })
        );
        //past the last declared set
        assert!(check_set_layouts(&layouts, 2, &layouts[2..]).is_ok());
        assert_eq!(
            check_set_layouts(&layouts, 2, &[layouts[2], layouts[0]]),
            Err(CommandBufferError::SetLayoutMismatch { set: 3 })
        );
    }
}
