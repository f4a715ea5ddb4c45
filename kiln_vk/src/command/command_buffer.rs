//! Command buffers track their lifecycle state at runtime so commands are only recorded while the
//! buffer is recording and only executable buffers are submitted.
//!
//! **Safety:** a buffer which failed to begin or end is left in whatever state the driver put it
//! in. Resetting it is the only way back.

use ash::vk;

use crate::device::Device;
use crate::sync::{DependencyInfo, Submission};
use crate::traits::AsRaw;
use crate::VkError;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CommandBufferState {
    /// Freshly allocated or reset
    Ready,
    Recording,
    Executable,
}

impl CommandBufferState {
    fn name(&self) -> &'static str {
        match self {
            CommandBufferState::Ready => "ready",
            CommandBufferState::Recording => "recording",
            CommandBufferState::Executable => "executable",
        }
    }
}

#[derive(Debug)]
pub struct CommandBuffer<D: Device> {
    handle: vk::CommandBuffer,
    device: D,
    state: CommandBufferState,
}

impl<D: Device> CommandBuffer<D> {
    pub fn new(handle: vk::CommandBuffer, device: D) -> Self {
        Self {
            handle,
            device,
            state: CommandBufferState::Ready,
        }
    }

    pub fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    pub fn state(&self) -> CommandBufferState {
        self.state
    }

    pub fn get_device(&self) -> &D {
        &self.device
    }

    fn expect_state(&self, expected: CommandBufferState) -> Result<(), VkError> {
        if self.state != expected {
            return Err(VkError::InvalidCommandBufferState {
                expected: expected.name(),
                found: self.state.name(),
            });
        }
        Ok(())
    }

    /// Resets the command buffer back into the ready state, from any state
    pub fn reset(&mut self) -> Result<(), VkError> {
        self.device.reset_command_buffer(self.handle)?;
        self.state = CommandBufferState::Ready;
        Ok(())
    }

    pub fn begin(&mut self, flags: vk::CommandBufferUsageFlags) -> Result<(), VkError> {
        self.expect_state(CommandBufferState::Ready)?;
        self.device.begin_command_buffer(self.handle, flags)?;
        self.state = CommandBufferState::Recording;
        Ok(())
    }

    /// Ends recording into the command buffer
    pub fn end(&mut self) -> Result<(), VkError> {
        self.expect_state(CommandBufferState::Recording)?;
        self.device.end_command_buffer(self.handle)?;
        self.state = CommandBufferState::Executable;
        Ok(())
    }

    /// Records a single `vkCmdPipelineBarrier2`. Empty batches are skipped.
    pub fn pipeline_barrier(&self, dependency: &DependencyInfo) -> Result<(), VkError> {
        self.expect_state(CommandBufferState::Recording)?;
        if !dependency.is_empty() {
            self.device.cmd_pipeline_barrier(self.handle, dependency);
        }
        Ok(())
    }

    pub fn copy_buffer(
        &self,
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: &[vk::BufferCopy],
    ) -> Result<(), VkError> {
        self.expect_state(CommandBufferState::Recording)?;
        self.device.cmd_copy_buffer(self.handle, src, dst, regions);
        Ok(())
    }

    pub fn copy_buffer_to_image(
        &self,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) -> Result<(), VkError> {
        self.expect_state(CommandBufferState::Recording)?;
        self.device
            .cmd_copy_buffer_to_image(self.handle, src, dst, dst_layout, regions);
        Ok(())
    }

    /// Submits the command buffer to `queue`
    ///
    /// The submission's command buffer is replaced by this buffer's handle. The buffer stays
    /// executable until it is reset.
    pub fn submit(&self, queue: vk::Queue, submission: Submission) -> Result<(), VkError> {
        self.expect_state(CommandBufferState::Executable)?;
        self.device.queue_submit(
            queue,
            &Submission {
                command_buffer: self.handle,
                ..submission
            },
        )
    }
}

impl<D: Device> AsRaw for CommandBuffer<D> {
    type RawType = vk::CommandBuffer;

    unsafe fn as_raw(&self) -> &Self::RawType {
        &self.handle
    }
}
