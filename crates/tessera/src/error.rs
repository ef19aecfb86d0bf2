use std::error::Error;

use ash::{LoadingError, vk};

use thiserror::Error;

use crate::flags::QueueFlags;

#[derive(Error, Debug)]
pub enum InstanceError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Failed to load Vulkan entry point: {0}")]
    EntryLoading(#[from] LoadingError),
    #[error("Instance extension {0:?} is not available")]
    MissingExtension(std::ffi::CString),
    #[error("Instance layer {0:?} is not available")]
    MissingLayer(std::ffi::CString),
    #[error("Application name contains a nul byte")]
    InvalidApplicationName,
    #[error("Window handle unavailable: {0}")]
    WindowHandle(String),
    #[error("No physical device found. Is a Vulkan capable GPU and driver installed?")]
    NoPhysicalDevice,
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Extension {0} is not supported by device")]
    UnsupportedExtension(String),
    #[error("Device creation needs at least one queue specification")]
    NoQueueRequested,
    #[error("No queue family supports {0:?}")]
    NoSuitableQueueFamily(QueueFlags),
    #[error("Queue flags {0:?} request presentation, but no surface was supplied")]
    PresentWithoutSurface(QueueFlags),
    #[error("No supported format for {0:?}")]
    UnsupportedFormat(crate::flags::ImageFormat),
    #[error("Memory allocator is not available anymore")]
    AllocatorUnavailable,
    #[error("GpuAllocator error: {0}")]
    GpuAllocatorError(#[from] Box<dyn Error + Send + Sync + 'static>),
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
}

#[derive(Error, Debug)]
pub enum ShaderError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Filesystem error: {0}")]
    FileError(#[from] std::io::Error),
    #[error("Shader code is empty")]
    EmptyCode,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandBufferError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Command buffer is already capturing")]
    AlreadyCapturing,
    #[error("Command buffer is not capturing")]
    NotCapturing,
    #[error("Command is not allowed inside a render pass")]
    InsideRenderPass,
    #[error("Command needs an active render pass")]
    NotRendering,
    #[error("Render pass has no subpass after the current one")]
    NoNextSubpass,
    #[error("Command buffer handle is stale, the buffer was destroyed")]
    StaleHandle,
    #[error("Resource {0} is not valid anymore")]
    InvalidResource(&'static str),
    #[error("Copy region [{offset}..{end}) exceeds resource of size {size}")]
    CopyOutOfRange { offset: u64, end: u64, size: u64 },
    #[error("Push constant range {0} does not exist on the pipeline layout")]
    NoSuchPushRange(usize),
    #[error("Push constant data of {len} bytes does not fit range of {size} bytes")]
    PushConstantSize { len: usize, size: u32 },
    #[error("Failed to allocate command buffer. Requested {count}, got {allocated}")]
    FailedToAllocate { allocated: usize, count: usize },
    #[error("Descriptor set {set} does not use the set layout the pipeline layout declares for it")]
    SetLayoutMismatch { set: usize },
    #[error("Copy region {0} exceeds the image subresources or has an invalid buffer layout")]
    ImageRegionOutOfRange(usize),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Command buffer {index} of the submission is not executable")]
    NotExecutable { index: usize },
    #[error("Command buffer {index} was recorded for queue family {buffer_family}, but queue is of family {queue_family}")]
    FamilyMismatch {
        index: usize,
        buffer_family: u32,
        queue_family: u32,
    },
    #[error("Queue rejected submission with {0}")]
    Rejected(vk::Result),
}

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Device error: {0}")]
    DeviceError(#[from] DeviceError),
    #[error("Resource is not host visible and can not be mapped")]
    NotMappable,
    #[error("Mapped range offset={offset} size={size} exceeds resource of size {capacity}")]
    OutOfRange { offset: u64, size: u64, capacity: u64 },
    #[error("Host visible images must be 2d, single sampled and have one mip level and layer")]
    UnsupportedLinearImage,
    #[error("Image view range exceeds the image")]
    InvalidViewRange,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Failed to allocate Descriptors from pool. Requested {requested} got {count}")]
    Allocation { requested: usize, count: usize },
    #[error("Binding {0} is declared twice")]
    DuplicateBinding(u32),
    #[error("Binding {0} has a descriptor count of zero")]
    EmptyBinding(u32),
    #[error("Layout has no binding {0}")]
    NoSuchBinding(u32),
    #[error("Binding {binding} expects {expected:?} descriptors")]
    KindMismatch {
        binding: u32,
        expected: crate::flags::DescriptorKind,
    },
    #[error("Update writes elements [{first}..{end}) but binding only has {count}")]
    ArrayOutOfRange { first: u32, end: u32, count: u32 },
    #[error("Update does not write any descriptor")]
    EmptyUpdate,
    #[error("Descriptor set handle is stale, the set was freed")]
    StaleHandle,
    #[error("Descriptor pool size overflows")]
    PoolTooLarge,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Failed to allocate pipeline")]
    Allocation,
    #[error("No supported format for {0:?}")]
    UnsupportedFormat(crate::flags::ImageFormat),
    #[error("Push constant range {0} must have a non-zero size that is a multiple of 4")]
    InvalidPushRange(usize),
    #[error("Push constants need {size} bytes, device allows {max}")]
    PushConstantsTooLarge { size: u32, max: u32 },
    #[error("Render pass needs at least one subpass")]
    NoSubpass,
    #[error("Subpass {subpass} references colour attachment {index}, but only {count} exist")]
    InvalidAttachmentIndex { subpass: usize, index: u32, count: usize },
    #[error("Subpass {0} uses depth, but the render pass has no depth attachment")]
    MissingDepthAttachment(usize),
    #[error("Subpass index {0} does not exist")]
    InvalidSubpass(u32),
    #[error("Framebuffer got {got} attachments, render pass expects {expected}")]
    AttachmentCountMismatch { got: usize, expected: usize },
    #[error("Subpass writes {expected} colour attachments, but {got} blend states were supplied")]
    BlendAttachmentMismatch { got: usize, expected: usize },
    #[error("Pipeline has no shader stages")]
    NoShaderStage,
}

///Errors that can happen while (re-)creating a swapchain. Use [SwapchainError::result] to get the
/// coarse category a render loop usually reacts to.
#[derive(Error, Debug)]
pub enum SwapchainError {
    #[error("Swapchain can't have a extent of 0 on either axis, was: {0:?}")]
    ZeroExtent(vk::Extent2D),
    #[error("Surface is out of date")]
    OutOfDate,
    #[error("Native window is in use by another swapchain")]
    WindowInUse,
    #[error("Surface was lost")]
    SurfaceLost,
    #[error("Queue family {0} can not present to the surface")]
    PresentNotSupported(u32),
    #[error("Surface exposes no usable format")]
    NoSurfaceFormat,
    #[error("Instance error: {0}")]
    InstanceError(InstanceError),
    #[error("Resource error: {0}")]
    ResourceError(#[from] ResourceError),
    #[error("Vulkan error: {0}")]
    VkError(vk::Result),
}

impl From<InstanceError> for SwapchainError {
    fn from(value: InstanceError) -> Self {
        match value {
            //surface queries report through the instance, keep their swapchain meaning
            InstanceError::VkError(result) => SwapchainError::from(result),
            other => SwapchainError::InstanceError(other),
        }
    }
}

impl From<vk::Result> for SwapchainError {
    fn from(value: vk::Result) -> Self {
        match value {
            vk::Result::ERROR_OUT_OF_DATE_KHR => SwapchainError::OutOfDate,
            vk::Result::ERROR_NATIVE_WINDOW_IN_USE_KHR => SwapchainError::WindowInUse,
            vk::Result::ERROR_SURFACE_LOST_KHR => SwapchainError::SurfaceLost,
            other => SwapchainError::VkError(other),
        }
    }
}

#[derive(Error, Debug)]
pub enum TesseraError {
    #[error("CommandBuffer error: {0}")]
    CommandBufferError(#[from] CommandBufferError),
    #[error("Submit error: {0}")]
    SubmitError(#[from] SubmitError),
    #[error("Device error: {0}")]
    DeviceError(#[from] DeviceError),
    #[error("Desriptor error: {0}")]
    DescriptorError(#[from] DescriptorError),
    #[error("Instance error: {0}")]
    InstanceError(#[from] InstanceError),
    #[error("Pipeline error: {0}")]
    PipelineError(#[from] PipelineError),
    #[error("Resource error: {0}")]
    ResourceError(#[from] ResourceError),
    #[error("Shader/ShaderModule error: {0}")]
    ShaderError(#[from] ShaderError),
    #[error("Swapchain error: {0}")]
    SwapchainError(#[from] SwapchainError),
}

#[cfg(test)]
mod test {
    use static_assertions::assert_impl_all;

    use crate::{
        TesseraError,
        error::{
            CommandBufferError, DescriptorError, DeviceError, InstanceError, PipelineError,
            ResourceError, ShaderError, SubmitError, SwapchainError,
        },
        swapchain::SwapchainResult,
    };

    #[test]
    fn assure_send_sync() {
        assert_impl_all!(DeviceError: Send, Sync);
        assert_impl_all!(ShaderError: Send, Sync);
        assert_impl_all!(CommandBufferError: Send, Sync);
        assert_impl_all!(SubmitError: Send, Sync);
        assert_impl_all!(InstanceError: Send, Sync);
        assert_impl_all!(DescriptorError: Send, Sync);
        assert_impl_all!(PipelineError: Send, Sync);
        assert_impl_all!(ResourceError: Send, Sync);
        assert_impl_all!(SwapchainError: Send, Sync);
        assert_impl_all!(TesseraError: Send, Sync);
    }

    #[test]
    fn swapchain_errors_map_to_result_categories() {
        use ash::vk;

        assert_eq!(
            SwapchainError::from(vk::Result::ERROR_OUT_OF_DATE_KHR).result(),
            SwapchainResult::Pending
        );
        assert_eq!(
            SwapchainError::from(vk::Result::ERROR_NATIVE_WINDOW_IN_USE_KHR).result(),
            SwapchainResult::Pending
        );
        assert_eq!(
            SwapchainError::ZeroExtent(vk::Extent2D {
                width: 0,
                height: 600
            })
            .result(),
            SwapchainResult::Busy
        );
        assert_eq!(
            SwapchainError::from(vk::Result::ERROR_DEVICE_LOST).result(),
            SwapchainResult::Failed
        );
    }
}
