use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ash::vk;
use ash::vk::Handle;

use crate::allocators::{Allocation, Allocator, BufferCreateInfo, ImageCreateInfo};
use crate::VkError;

#[derive(Debug, Default)]
struct TestAllocatorState {
    next_handle: u64,
    live_buffers: usize,
    live_images: usize,
    destroyed_buffers: Vec<vk::Buffer>,
    destroyed_images: Vec<vk::Image>,
}

/// An allocator backed by host memory, for testing purposes only
///
/// Host visible buffers get a real heap allocation so mapped writes can be inspected. Images and
/// gpu only buffers only get a handle.
#[derive(Clone, Debug, Default)]
pub struct TestAllocator {
    state: Arc<Mutex<TestAllocatorState>>,
}

impl TestAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, TestAllocatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn live_buffers(&self) -> usize {
        self.state().live_buffers
    }

    pub fn live_images(&self) -> usize {
        self.state().live_images
    }

    pub fn destroyed_buffers(&self) -> Vec<vk::Buffer> {
        self.state().destroyed_buffers.clone()
    }

    pub fn destroyed_images(&self) -> Vec<vk::Image> {
        self.state().destroyed_images.clone()
    }

    fn next_raw(&self) -> u64 {
        let mut state = self.state();
        state.next_handle += 1;
        state.next_handle
    }
}

impl Allocator for TestAllocator {
    type Allocation = TestAllocation;

    fn create_buffer(
        &self,
        buffer_ci: &BufferCreateInfo,
    ) -> Result<(vk::Buffer, Self::Allocation), VkError> {
        let handle = vk::Buffer::from_raw(self.next_raw());
        let allocation = if buffer_ci.location.is_host_visible() {
            TestAllocation::host(buffer_ci.name, buffer_ci.size as usize)
        } else {
            TestAllocation::device(buffer_ci.name, buffer_ci.size)
        };
        self.state().live_buffers += 1;
        Ok((handle, allocation))
    }

    fn destroy_buffer(&self, buffer: vk::Buffer, allocation: Self::Allocation) {
        let mut state = self.state();
        state.live_buffers = state.live_buffers.saturating_sub(1);
        state.destroyed_buffers.push(buffer);
        drop(allocation);
    }

    fn create_image(
        &self,
        image_ci: &ImageCreateInfo,
    ) -> Result<(vk::Image, Self::Allocation), VkError> {
        let handle = vk::Image::from_raw(self.next_raw());
        let texels = image_ci.extent.width as u64
            * image_ci.extent.height as u64
            * image_ci.extent.depth as u64
            * image_ci.array_layers as u64;
        let size = texels * crate::util::format::texel_size(image_ci.format).unwrap_or(0) as u64;
        self.state().live_images += 1;
        Ok((handle, TestAllocation::device(image_ci.name, size)))
    }

    fn destroy_image(&self, image: vk::Image, allocation: Self::Allocation) {
        let mut state = self.state();
        state.live_images = state.live_images.saturating_sub(1);
        state.destroyed_images.push(image);
        drop(allocation);
    }
}

#[derive(Debug)]
pub struct TestAllocation {
    name: String,
    size: vk::DeviceSize,
    /// Host backing, leaked from a boxed slice and reclaimed on drop
    host: Option<NonNull<u8>>,
}

// The host allocation is exclusively owned by this allocation
unsafe impl Send for TestAllocation {}

impl TestAllocation {
    fn host(name: &str, size: usize) -> Self {
        let data: Box<[u8]> = vec![0u8; size].into_boxed_slice();
        let ptr = Box::into_raw(data) as *mut u8;
        Self {
            name: name.to_string(),
            size: size as vk::DeviceSize,
            host: NonNull::new(ptr),
        }
    }

    fn device(name: &str, size: vk::DeviceSize) -> Self {
        Self {
            name: name.to_string(),
            size,
            host: None,
        }
    }

    /// Contents of the host backing, if any
    pub fn bytes(&self) -> Option<&[u8]> {
        self.host
            .map(|ptr| unsafe { std::slice::from_raw_parts(ptr.as_ptr(), self.size as usize) })
    }
}

impl Drop for TestAllocation {
    fn drop(&mut self) {
        if let Some(ptr) = self.host.take() {
            let slice = std::ptr::slice_from_raw_parts_mut(ptr.as_ptr(), self.size as usize);
            drop(unsafe { Box::from_raw(slice) });
        }
    }
}

impl Allocation for TestAllocation {
    fn mapped_ptr(&self) -> Option<NonNull<c_void>> {
        self.host.map(|ptr| ptr.cast::<c_void>())
    }

    fn size(&self) -> vk::DeviceSize {
        self.size
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocators::MemoryLocation;

    #[test]
    fn host_visible_buffers_are_mapped() {
        let allocator = TestAllocator::new();
        let (buffer, allocation) = allocator
            .create_buffer(&BufferCreateInfo {
                name: "staging",
                size: 16,
                usage_flags: vk::BufferUsageFlags::TRANSFER_SRC,
                location: MemoryLocation::CpuToGpu,
            })
            .unwrap();
        let ptr = allocation.mapped_ptr().unwrap();
        unsafe { ptr.cast::<u8>().as_ptr().write(7) };
        assert_eq!(allocation.bytes().unwrap()[0], 7);
        assert_eq!(allocator.live_buffers(), 1);
        allocator.destroy_buffer(buffer, allocation);
        assert_eq!(allocator.live_buffers(), 0);
        assert_eq!(allocator.destroyed_buffers(), vec![buffer]);
    }

    #[test]
    fn gpu_only_buffers_are_not_mapped() {
        let allocator = TestAllocator::new();
        let (_, allocation) = allocator
            .create_buffer(&BufferCreateInfo {
                name: "vertices",
                size: 64,
                usage_flags: vk::BufferUsageFlags::VERTEX_BUFFER,
                location: MemoryLocation::GpuOnly,
            })
            .unwrap();
        assert!(allocation.mapped_ptr().is_none());
        assert_eq!(allocation.size(), 64);
    }
}
