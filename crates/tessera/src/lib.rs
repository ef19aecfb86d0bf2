//! # Tessera
//!
//! Resource lifetime and synchronisation layer on top of [ash].
//!
//! # Usage
//!
//! Tessera provides thin wrappers around the Vulkan objects whose lifetime or state is easy to get wrong. That is
//! the [Device](context::Device) with its [queues](context::Queue), command buffers and their recording state,
//! host mapping of [buffers](resources::Buffer) and [images](resources::Image) and the acquire → render → present
//! cycle of a [Swapchain](swapchain::Swapchain).
//!
//! A typical setup looks like this:
//!
//! 1. Build an [Instance](context::Instance) for your window and create a [Surface](surface::Surface).
//! 2. Create the [Device](context::Device) with one [QueueSpec](context::QueueSpec) per queue you need.
//! 3. Create a [Swapchain](swapchain::Swapchain), a [RenderPass](resources::RenderPass) and one
//!    [Framebuffer](resources::Framebuffer) per swapchain image view.
//! 4. Record [command buffers](resources::CommandBuffer) from a [CommandPool](resources::CommandPool) and
//!    [submit](context::Queue::submit) them, gated by [semaphores](sync::Semaphore) and a [Fence](sync::Fence).
//!
//! Every resource keeps an `Arc` of the device it was created on, so drop order is never a correctness concern.
//! What is *not* tracked is GPU side usage. Before dropping a resource that is referenced by a submission, wait for
//! that submission's fence.
//!
//! Structures that are not sensitive to lifetime requirements (like create info) are plain data.

pub use ash;
pub use gpu_allocator;

///Memory allocation and host mapping.
pub mod allocator;

///Structures you need to get started. Basically [Instance](context::Instance) and [Device](context::Device)
/// creation, as well as [queues](context::Queue).
pub mod context;

///Backend independent flags and formats, translated to Vulkan at the boundary.
pub mod flags;

///Device resources. Mostly [Buffer](resources::Buffer), [Image](resources::Image), command buffers, descriptors
/// and pipelines.
pub mod resources;

///Window surface related structures. Includes a self managed [Surface](surface::Surface) type.
pub mod surface;

///[Swapchain](swapchain::Swapchain) that can be created from a [Surface](surface::Surface).
pub mod swapchain;

///Vulkan synchronisation primitives
pub mod sync;

mod error;
pub use error::{
    CommandBufferError, DescriptorError, DeviceError, InstanceError, PipelineError, ResourceError,
    ShaderError, SubmitError, SwapchainError, TesseraError,
};
