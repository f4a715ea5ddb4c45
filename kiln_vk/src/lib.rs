//! Thin Vulkan layer used by the kiln frame graph
//!
//! Every call into the driver goes through [`device::Device`], which keeps the graph testable with
//! [`device::TestDevice`].
pub mod allocators;
pub mod command;
pub mod device;
pub mod error;
pub mod sync;
pub mod traits;
pub mod util;

pub use error::VkError;

// Re-exports
pub use ash;
#[cfg(feature = "vk-mem-rs")]
pub use vk_mem;
