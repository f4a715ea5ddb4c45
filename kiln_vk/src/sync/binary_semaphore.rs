use ash::vk;

use crate::device::{Device, SemaphoreKind};
use crate::traits::{AsRaw, Destructible};
use crate::VkError;

/// A binary semaphore, used to talk to the presentation engine
#[derive(Debug)]
pub struct BinarySemaphore<D: Device> {
    handle: vk::Semaphore,
    device: D,
}

impl<D: Device> BinarySemaphore<D> {
    pub fn new(device: D) -> Result<Self, VkError> {
        let handle = device.create_semaphore(SemaphoreKind::Binary)?;

        #[cfg(feature = "log-lifetimes")]
        tracing::trace!("Creating VkSemaphore {:p}", handle);

        Ok(Self { handle, device })
    }

    pub fn handle(&self) -> vk::Semaphore {
        self.handle
    }
}

impl<D: Device> Destructible for BinarySemaphore<D> {
    fn destroy(&mut self) {
        #[cfg(feature = "log-lifetimes")]
        tracing::trace!("Destroying VkSemaphore {:p}", self.handle);

        self.device.destroy_semaphore(self.handle);
    }
}

impl<D: Device> AsRaw for BinarySemaphore<D> {
    type RawType = vk::Semaphore;

    unsafe fn as_raw(&self) -> &Self::RawType {
        &self.handle
    }
}

#[cfg(feature = "raii")]
impl<D: Device> Drop for BinarySemaphore<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}
