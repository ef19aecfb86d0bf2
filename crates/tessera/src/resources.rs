//! # Resources
//!
//! GPU side objects that are created on a [Device](crate::context::Device). Every resource keeps the device alive
//! through an `Arc` and destroys its native handle when dropped.
//!
//! Command buffers and descriptor sets are owned by their pool and referenced through generational keys, see
//! [CommandPool] and [DescriptorPool].

mod buffer;
pub use buffer::{Buffer, BufferDesc};

mod image;
pub use image::{Image, ImageDesc, ImageView, ImageViewDesc, Sampler, SamplerDesc};

mod command_buffer;
pub use command_buffer::{
    BufferImageCopy, CommandBuffer, CommandBufferKey, CommandPool, ImageMemoryBarrier,
    RecordingState, RenderPassBeginInfo,
};

mod descriptor;
pub use descriptor::{
    BufferBinding, DescriptorBinding, DescriptorPool, DescriptorResources, DescriptorSet,
    DescriptorSetKey, DescriptorSetLayout, DescriptorWrite, ImageBinding,
};

pub mod pipeline;
pub use pipeline::{
    GraphicsPipeline, GraphicsPipelineDesc, PipelineLayout, PushConstantRange, ShaderStageDesc,
};

mod render_pass;
pub use render_pass::{
    ColourAttachment, DepthStencilAttachment, Framebuffer, RenderPass, RenderPassDesc,
    SubpassDependency, SubpassDesc,
};

mod shader_module;
pub use shader_module::ShaderModule;

use ash::vk;
use smallvec::SmallVec;

///Implemented by every object that wraps a native Vulkan handle.
pub trait DeviceResource {
    type Raw: vk::Handle + Copy;

    ///The native handle.
    fn raw(&self) -> Self::Raw;

    ///False if the handle is null.
    fn is_valid(&self) -> bool {
        vk::Handle::as_raw(self.raw()) != 0
    }
}

///Queue family access of buffers and images.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum SharingMode {
    #[default]
    Exclusive,
    Concurrent {
        ///The queue family indices of families that can access the resource concurrently.
        queue_family_indices: SmallVec<[u32; 4]>,
    },
}

impl SharingMode {
    pub(crate) fn to_vk(&self) -> (vk::SharingMode, &[u32]) {
        match self {
            SharingMode::Exclusive => (vk::SharingMode::EXCLUSIVE, &[]),
            SharingMode::Concurrent {
                queue_family_indices,
            } => (vk::SharingMode::CONCURRENT, queue_family_indices.as_slice()),
        }
    }
}
