use std::sync::PoisonError;

use ash::vk;
/// Possible errors
use thiserror::Error;

#[derive(Debug, Error, Copy, Clone, PartialEq, Eq, Hash)]
pub enum VkError {
    #[error("Poisoned mutex")]
    PoisonError,

    #[error("Expected command buffer to be {expected}, found {found}")]
    InvalidCommandBufferState {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Vulkan resource does not have a mapped pointer. You're most likely using GPU only")]
    NoMappedPointer,

    #[error("Insufficient space to upload the data")]
    InsufficientSpace,

    #[error("Device was created without VK_KHR_swapchain")]
    NoSwapchainExtension,

    #[error("Unknown handle {0:#x} passed to the device")]
    UnknownHandle(u64),

    #[error(transparent)]
    Vk(#[from] vk::Result),
}

impl<T> From<PoisonError<T>> for VkError {
    fn from(_: PoisonError<T>) -> Self {
        VkError::PoisonError
    }
}
