use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;
use derivative::Derivative;
#[cfg(feature = "log-lifetimes")]
use tracing::trace;
use vk_mem::Alloc;

use crate::allocators::{BufferCreateInfo, ImageCreateInfo, MemoryLocation};
use crate::VkError;

/// [`super::Allocator`] backed by the Vulkan Memory Allocator
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct VkMemAllocator {
    #[derivative(Debug = "ignore")]
    handle: Arc<Mutex<vk_mem::Allocator>>,
}

unsafe impl Send for VkMemAllocator {}
unsafe impl Sync for VkMemAllocator {}

impl VkMemAllocator {
    pub fn new(
        instance: &ash::Instance,
        device: &ash::Device,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self, VkError> {
        let allocator_ci = vk_mem::AllocatorCreateInfo::new(instance, device, physical_device);
        Ok(Self {
            handle: Arc::new(Mutex::new(unsafe { vk_mem::Allocator::new(allocator_ci)? })),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, vk_mem::Allocator>, VkError> {
        Ok(self.handle.lock()?)
    }

    fn allocation_ci(location: MemoryLocation) -> vk_mem::AllocationCreateInfo {
        let (usage, flags) = match location {
            MemoryLocation::GpuOnly => (
                vk_mem::MemoryUsage::AutoPreferDevice,
                vk_mem::AllocationCreateFlags::empty(),
            ),
            MemoryLocation::CpuToGpu => (
                vk_mem::MemoryUsage::Auto,
                vk_mem::AllocationCreateFlags::MAPPED
                    | vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE,
            ),
            MemoryLocation::GpuToCpu => (
                vk_mem::MemoryUsage::Auto,
                vk_mem::AllocationCreateFlags::MAPPED
                    | vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM,
            ),
            MemoryLocation::CpuOnly => (
                vk_mem::MemoryUsage::AutoPreferHost,
                vk_mem::AllocationCreateFlags::MAPPED
                    | vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM,
            ),
        };
        vk_mem::AllocationCreateInfo {
            usage,
            flags,
            ..Default::default()
        }
    }

    fn wrap(
        &self,
        allocator: &vk_mem::Allocator,
        allocation: vk_mem::Allocation,
        name: &str,
    ) -> VkMemAllocation {
        let allocation_info = allocator.get_allocation_info(&allocation);
        VkMemAllocation {
            mapped: NonNull::new(allocation_info.mapped_data),
            size: allocation_info.size,
            handle: allocation,
            name: name.to_string(),
        }
    }
}

impl super::Allocator for VkMemAllocator {
    type Allocation = VkMemAllocation;

    fn create_buffer(
        &self,
        buffer_ci: &BufferCreateInfo,
    ) -> Result<(vk::Buffer, Self::Allocation), VkError> {
        let allocator = self.lock()?;
        let vk_buffer_ci = vk::BufferCreateInfo {
            size: buffer_ci.size,
            usage: buffer_ci.usage_flags,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        let (handle, allocation) = unsafe {
            allocator.create_buffer(&vk_buffer_ci, &Self::allocation_ci(buffer_ci.location))?
        };

        #[cfg(feature = "log-lifetimes")]
        trace!("Creating VkBuffer {:p}", handle);

        Ok((handle, self.wrap(&allocator, allocation, buffer_ci.name)))
    }

    fn destroy_buffer(&self, buffer: vk::Buffer, mut allocation: Self::Allocation) {
        #[cfg(feature = "log-lifetimes")]
        trace!("Destroying VkBuffer {:p}", buffer);

        match self.lock() {
            Ok(allocator) => unsafe { allocator.destroy_buffer(buffer, &mut allocation.handle) },
            Err(error) => tracing::warn!("Leaking buffer {}: {}", allocation.name, error),
        }
    }

    fn create_image(
        &self,
        image_ci: &ImageCreateInfo,
    ) -> Result<(vk::Image, Self::Allocation), VkError> {
        let allocator = self.lock()?;
        let vk_image_ci = vk::ImageCreateInfo {
            image_type: if image_ci.extent.depth > 1 {
                vk::ImageType::TYPE_3D
            } else {
                vk::ImageType::TYPE_2D
            },
            format: image_ci.format,
            extent: image_ci.extent,
            mip_levels: image_ci.mip_levels,
            array_layers: image_ci.array_layers,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: image_ci.usage_flags,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };
        let (handle, allocation) = unsafe {
            allocator.create_image(&vk_image_ci, &Self::allocation_ci(image_ci.location))?
        };

        #[cfg(feature = "log-lifetimes")]
        trace!("Creating VkImage {:p}", handle);

        Ok((handle, self.wrap(&allocator, allocation, image_ci.name)))
    }

    fn destroy_image(&self, image: vk::Image, mut allocation: Self::Allocation) {
        #[cfg(feature = "log-lifetimes")]
        trace!("Destroying VkImage {:p}", image);

        match self.lock() {
            Ok(allocator) => unsafe { allocator.destroy_image(image, &mut allocation.handle) },
            Err(error) => tracing::warn!("Leaking image {}: {}", allocation.name, error),
        }
    }
}

/// Represents an allocation using [`vk_mem`]
#[derive(Derivative)]
#[derivative(Debug)]
pub struct VkMemAllocation {
    #[derivative(Debug = "ignore")]
    handle: vk_mem::Allocation,
    mapped: Option<NonNull<c_void>>,
    size: vk::DeviceSize,
    name: String,
}

unsafe impl Send for VkMemAllocation {}
unsafe impl Sync for VkMemAllocation {}

impl super::Allocation for VkMemAllocation {
    fn mapped_ptr(&self) -> Option<NonNull<c_void>> {
        self.mapped
    }

    fn size(&self) -> vk::DeviceSize {
        self.size
    }

    fn name(&self) -> &str {
        &self.name
    }
}
