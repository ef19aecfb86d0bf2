//! ## Context
//!
//! The [Instance] loads Vulkan, selects the physical device every [Device] is created on and keeps track of the
//! queues that are handed out per queue family.
//!
//! The [Device] is the entry point for most operations. It owns the memory allocator and a fixed list of
//! [queues](Queue), one per [QueueSpec] it was created with. Queues can be understood as a kind of "thread" on the
//! GPU. Multiple queue families exist that can do different types of work, see [QueueFlags](crate::flags::QueueFlags).
//!
//! Every resource created on a device keeps an `Arc<Device>`, which keeps the device (and in turn the instance)
//! alive until the last resource is dropped.

mod debugger;
pub use debugger::Debugger;

mod instance;
pub use instance::{Instance, InstanceBuilder};

mod device;
pub use device::{Device, QueueSpec};

mod queue;
pub use queue::{Queue, SubmitInfo};
