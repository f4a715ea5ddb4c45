//! Provides traits for implementing allocators
//!
//! The graph never decides where memory lives, it only asks an [`Allocator`] for buffers and
//! images and hands them back once the GPU is done with them.
use std::ffi::c_void;
use std::fmt::Debug;
use std::ptr::NonNull;

use ash::vk;

#[cfg(feature = "vk-mem-rs")]
pub mod vk_mem_impl;
#[cfg(feature = "vk-mem-rs")]
pub use vk_mem_impl::*;

pub mod memory_type;
pub mod test_allocator;

pub use memory_type::*;
pub use test_allocator::{TestAllocation, TestAllocator};

use crate::VkError;

#[derive(Debug, Clone, Copy)]
pub struct BufferCreateInfo<'a> {
    pub name: &'a str,
    pub size: vk::DeviceSize,
    pub usage_flags: vk::BufferUsageFlags,
    pub location: MemoryLocation,
}

#[derive(Debug, Clone, Copy)]
pub struct ImageCreateInfo<'a> {
    pub name: &'a str,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub usage_flags: vk::ImageUsageFlags,
    pub location: MemoryLocation,
}

/// Expectation of an allocator
///
/// Allocators are cloned into every resource they create, so resources can free themselves.
pub trait Allocator: Clone + Debug + Send + Sync + 'static {
    type Allocation: Allocation;

    /// Create a buffer along with its backing memory
    fn create_buffer(
        &self,
        buffer_ci: &BufferCreateInfo,
    ) -> Result<(vk::Buffer, Self::Allocation), VkError>;

    fn destroy_buffer(&self, buffer: vk::Buffer, allocation: Self::Allocation);

    /// Create an image along with its backing memory
    fn create_image(
        &self,
        image_ci: &ImageCreateInfo,
    ) -> Result<(vk::Image, Self::Allocation), VkError>;

    fn destroy_image(&self, image: vk::Image, allocation: Self::Allocation);
}

pub trait Allocation: Debug + Send + 'static {
    /// Get the raw ptr that underlies the allocation, if the memory is host visible and mapped
    fn mapped_ptr(&self) -> Option<NonNull<c_void>>;

    /// Size of the allocation in bytes
    fn size(&self) -> vk::DeviceSize;

    /// Get name of the allocation
    fn name(&self) -> &str;
}
