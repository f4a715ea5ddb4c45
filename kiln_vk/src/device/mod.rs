//! # Device
//! Every Vulkan call made by the frame graph goes through the [`Device`] trait. The production
//! implementation is [`LogicalDevice`] which forwards to [`ash::Device`]; [`TestDevice`] records
//! every call instead so graphs can be exercised without a GPU.

use std::fmt::Debug;

use ash::vk;

pub mod logical_device;
pub mod queue;
pub mod test_device;

pub use logical_device::{LogicalDevice, LogicalDeviceCreateInfo};
pub use queue::{Queue, QueueInfo};
pub use test_device::{RecordedCommand, RecordedSubmission, TestDevice};

use crate::sync::{DependencyInfo, Submission};
use crate::VkError;

/// Kind of semaphore to create
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SemaphoreKind {
    Binary,
    Timeline { initial_value: u64 },
}

/// Abstraction over the subset of a Vulkan device the frame graph needs
pub trait Device: Clone + Debug + 'static {
    fn create_command_pool(
        &self,
        queue_family_index: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<vk::CommandPool, VkError>;

    fn destroy_command_pool(&self, command_pool: vk::CommandPool);

    /// Allocates `count` primary command buffers out of `command_pool`
    fn allocate_command_buffers(
        &self,
        command_pool: vk::CommandPool,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>, VkError>;

    fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<(), VkError>;

    fn begin_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    ) -> Result<(), VkError>;

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<(), VkError>;

    fn cmd_pipeline_barrier(&self, command_buffer: vk::CommandBuffer, dependency: &DependencyInfo);

    fn cmd_copy_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: &[vk::BufferCopy],
    );

    fn cmd_copy_buffer_to_image(
        &self,
        command_buffer: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    );

    fn create_semaphore(&self, kind: SemaphoreKind) -> Result<vk::Semaphore, VkError>;

    fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    /// Current counter value of a timeline semaphore
    fn semaphore_counter_value(&self, semaphore: vk::Semaphore) -> Result<u64, VkError>;

    /// Blocks until every `semaphores[i]` reached `values[i]`
    fn wait_semaphores(
        &self,
        semaphores: &[vk::Semaphore],
        values: &[u64],
        timeout: u64,
    ) -> Result<(), VkError>;

    fn queue_submit(&self, queue: vk::Queue, submission: &Submission) -> Result<(), VkError>;

    /// Returns the acquired image index and whether the swapchain is suboptimal
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> Result<(u32, bool), VkError>;

    /// Returns whether the swapchain is suboptimal
    fn queue_present(
        &self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<bool, VkError>;

    fn wait_idle(&self) -> Result<(), VkError>;
}
