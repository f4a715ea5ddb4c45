use ash::vk;
#[cfg(feature = "log-lifetimes")]
use tracing::trace;

use crate::device::{Device, Queue};
use crate::traits::{AsRaw, Destructible};
use crate::VkError;

/// Owns a [`vk::CommandPool`] tied to a single queue family
#[derive(Debug)]
pub struct CommandPool<D: Device> {
    handle: vk::CommandPool,
    device: D,
}

impl<D: Device> CommandPool<D> {
    pub fn new(device: D, queue: &Queue, flags: vk::CommandPoolCreateFlags) -> Result<Self, VkError> {
        let handle = device.create_command_pool(queue.get_family_index(), flags)?;

        #[cfg(feature = "log-lifetimes")]
        trace!("Created VkCommandPool {:p}", handle);

        Ok(Self { handle, device })
    }

    pub fn handle(&self) -> vk::CommandPool {
        self.handle
    }

    pub fn get_device(&self) -> &D {
        &self.device
    }

    /// Allocate `count` primary command buffers from the pool
    pub fn allocate(&self, count: u32) -> Result<Vec<crate::command::CommandBuffer<D>>, VkError> {
        Ok(self
            .device
            .allocate_command_buffers(self.handle, count)?
            .into_iter()
            .map(|handle| crate::command::CommandBuffer::new(handle, self.device.clone()))
            .collect())
    }
}

impl<D: Device> AsRaw for CommandPool<D> {
    type RawType = vk::CommandPool;

    unsafe fn as_raw(&self) -> &Self::RawType {
        &self.handle
    }
}

impl<D: Device> Destructible for CommandPool<D> {
    fn destroy(&mut self) {
        #[cfg(feature = "log-lifetimes")]
        trace!("Destroying VkCommandPool {:p}", self.handle);

        self.device.destroy_command_pool(self.handle);
    }
}

#[cfg(feature = "raii")]
impl<D: Device> Drop for CommandPool<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}
