//! GPU resources which retire through the graph
//!
//! [`Buffer`] and [`Image`] own their state. When dropped they hand it to the graph through a
//! [`Retirer`], the graph keeps it alive until every frame which could still reference it has
//! completed and only then frees it.
use std::ffi::c_void;
use std::fmt::Debug;
use std::ptr::NonNull;

use ash::vk;
use crossbeam_channel::{Receiver, Sender};
use derivative::Derivative;
use kiln_vk::allocators::{Allocation, Allocator, BufferCreateInfo, ImageCreateInfo};
use kiln_vk::VkError;

/// A resource waiting to be freed. Dropping it frees it.
#[derive(Debug)]
pub enum Retired {
    Buffer(Box<dyn Debug + Send>),
    Image(Box<dyn Debug + Send>),
}

/// Sends retired resources to the graph's destroy queues
///
/// Resources retired after the graph is gone are freed on the spot.
#[derive(Debug, Clone)]
pub struct Retirer {
    send: Sender<Retired>,
}

impl Retirer {
    pub(crate) fn channel() -> (Retirer, Receiver<Retired>) {
        let (send, recv) = crossbeam_channel::unbounded();
        (Retirer { send }, recv)
    }

    pub fn retire_buffer<A: Allocator>(&self, state: BufferState<A>) {
        // a closed channel hands the resource back, dropping it frees it
        let _ = self.send.send(Retired::Buffer(Box::new(state)));
    }

    pub fn retire_image<A: Allocator>(&self, state: ImageState<A>) {
        let _ = self.send.send(Retired::Image(Box::new(state)));
    }
}

/// Handle and memory of a buffer, freed on drop
#[derive(Derivative)]
#[derivative(Debug)]
pub struct BufferState<A: Allocator> {
    handle: vk::Buffer,
    size: vk::DeviceSize,
    allocation: Option<A::Allocation>,
    #[derivative(Debug = "ignore")]
    allocator: A,
}

impl<A: Allocator> BufferState<A> {
    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl<A: Allocator> Drop for BufferState<A> {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            #[cfg(feature = "log-lifetimes")]
            tracing::trace!("Freeing buffer {}", allocation.name());

            self.allocator.destroy_buffer(self.handle, allocation);
        }
    }
}

/// Handle and memory of an image, freed on drop
#[derive(Derivative)]
#[derivative(Debug)]
pub struct ImageState<A: Allocator> {
    handle: vk::Image,
    format: vk::Format,
    extent: vk::Extent3D,
    allocation: Option<A::Allocation>,
    #[derivative(Debug = "ignore")]
    allocator: A,
}

impl<A: Allocator> ImageState<A> {
    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }
}

impl<A: Allocator> Drop for ImageState<A> {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            #[cfg(feature = "log-lifetimes")]
            tracing::trace!("Freeing image {}", allocation.name());

            self.allocator.destroy_image(self.handle, allocation);
        }
    }
}

/// A buffer retired through the graph when dropped
#[derive(Debug)]
pub struct Buffer<A: Allocator> {
    state: Option<BufferState<A>>,
    retirer: Retirer,
}

impl<A: Allocator> Buffer<A> {
    pub fn new(allocator: &A, buffer_ci: &BufferCreateInfo, retirer: Retirer) -> Result<Self, VkError> {
        let (handle, allocation) = allocator.create_buffer(buffer_ci)?;
        Ok(Self {
            state: Some(BufferState {
                handle,
                size: buffer_ci.size,
                allocation: Some(allocation),
                allocator: allocator.clone(),
            }),
            retirer,
        })
    }

    fn state(&self) -> Option<&BufferState<A>> {
        self.state.as_ref()
    }

    pub fn handle(&self) -> vk::Buffer {
        self.state().map(|state| state.handle).unwrap_or_default()
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.state().map(|state| state.size).unwrap_or(0)
    }

    /// Host pointer to the buffer's memory, if it is mapped
    pub fn mapped_ptr(&self) -> Option<NonNull<c_void>> {
        self.state()
            .and_then(|state| state.allocation.as_ref())
            .and_then(|allocation| allocation.mapped_ptr())
    }

    /// Copies `data` into the mapped memory at `offset`
    pub fn write(&mut self, offset: vk::DeviceSize, data: &[u8]) -> Result<(), VkError> {
        let ptr = self.mapped_ptr().ok_or(VkError::NoMappedPointer)?;
        let end = offset
            .checked_add(data.len() as vk::DeviceSize)
            .ok_or(VkError::InsufficientSpace)?;
        if end > self.size() {
            return Err(VkError::InsufficientSpace);
        }
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                ptr.cast::<u8>().as_ptr().add(offset as usize),
                data.len(),
            );
        }
        Ok(())
    }

    /// Takes the state out, it will not be retired through the graph anymore
    pub fn into_state(mut self) -> Option<BufferState<A>> {
        self.state.take()
    }
}

impl<A: Allocator> Drop for Buffer<A> {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            self.retirer.retire_buffer(state);
        }
    }
}

/// An image retired through the graph when dropped
#[derive(Debug)]
pub struct Image<A: Allocator> {
    state: Option<ImageState<A>>,
    retirer: Retirer,
}

impl<A: Allocator> Image<A> {
    pub fn new(allocator: &A, image_ci: &ImageCreateInfo, retirer: Retirer) -> Result<Self, VkError> {
        let (handle, allocation) = allocator.create_image(image_ci)?;
        Ok(Self {
            state: Some(ImageState {
                handle,
                format: image_ci.format,
                extent: image_ci.extent,
                allocation: Some(allocation),
                allocator: allocator.clone(),
            }),
            retirer,
        })
    }

    pub fn handle(&self) -> vk::Image {
        self.state
            .as_ref()
            .map(|state| state.handle)
            .unwrap_or_default()
    }

    pub fn format(&self) -> vk::Format {
        self.state
            .as_ref()
            .map(|state| state.format)
            .unwrap_or_default()
    }

    pub fn extent(&self) -> vk::Extent3D {
        self.state
            .as_ref()
            .map(|state| state.extent)
            .unwrap_or_default()
    }

    pub fn into_state(mut self) -> Option<ImageState<A>> {
        self.state.take()
    }
}

impl<A: Allocator> Drop for Image<A> {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            self.retirer.retire_image(state);
        }
    }
}
