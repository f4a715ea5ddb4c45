use ash::vk;

use crate::device::{Device, SemaphoreKind};
use crate::traits::{AsRaw, Destructible};
use crate::VkError;

/// A timeline semaphore
///
/// Every node of the graph owns one and signals it once per frame with the cumulative frame count.
#[derive(Debug)]
pub struct TimelineSemaphore<D: Device> {
    handle: vk::Semaphore,
    device: D,
}

impl<D: Device> TimelineSemaphore<D> {
    pub fn new(device: D, initial_value: u64) -> Result<Self, VkError> {
        let handle = device.create_semaphore(SemaphoreKind::Timeline { initial_value })?;

        #[cfg(feature = "log-lifetimes")]
        tracing::trace!("Creating VkSemaphore {:p}", handle);

        Ok(Self { handle, device })
    }

    pub fn handle(&self) -> vk::Semaphore {
        self.handle
    }

    /// Get semaphore current value
    pub fn current_value(&self) -> Result<u64, VkError> {
        self.device.semaphore_counter_value(self.handle)
    }

    /// Block until the semaphore reaches `value`
    pub fn wait(&self, value: u64, timeout: u64) -> Result<(), VkError> {
        self.device.wait_semaphores(&[self.handle], &[value], timeout)
    }
}

impl<D: Device> Destructible for TimelineSemaphore<D> {
    fn destroy(&mut self) {
        #[cfg(feature = "log-lifetimes")]
        tracing::trace!("Destroying VkSemaphore {:p}", self.handle);

        self.device.destroy_semaphore(self.handle);
    }
}

impl<D: Device> AsRaw for TimelineSemaphore<D> {
    type RawType = vk::Semaphore;

    unsafe fn as_raw(&self) -> &Self::RawType {
        &self.handle
    }
}

#[cfg(feature = "raii")]
impl<D: Device> Drop for TimelineSemaphore<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}
