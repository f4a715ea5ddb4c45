use std::sync::Arc;

use ash::vk;
use derivative::Derivative;

use crate::sync::{DependencyInfo, Submission};
use crate::traits::Destructible;
use crate::VkError;

#[derive(Derivative)]
#[derivative(Debug)]
struct LogicalDeviceInner {
    #[derivative(Debug = "ignore")]
    handle: ash::Device,
    /// Swapchain loader, only present if the device enabled `VK_KHR_swapchain`
    #[derivative(Debug = "ignore")]
    swapchain: Option<ash::khr::swapchain::Device>,
}

impl PartialEq for LogicalDeviceInner {
    fn eq(&self, other: &Self) -> bool {
        self.handle.handle() == other.handle.handle()
    }
}

impl Eq for LogicalDeviceInner {}

impl Destructible for LogicalDeviceInner {
    fn destroy(&mut self) {
        #[cfg(feature = "log-lifetimes")]
        tracing::trace!("Destroying VkDevice {:p}", self.handle.handle());

        unsafe {
            self.handle.destroy_device(None);
        }
    }
}

#[cfg(feature = "raii")]
impl Drop for LogicalDeviceInner {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Effectively the same as [`ash::Device`], but will automatically clean itself up if raii is enabled
///
/// The inner device is reference counted, cloning a [`LogicalDevice`] is cheap and every node of
/// the graph holds its own clone.
#[derive(Derivative, Clone, PartialEq, Eq)]
#[derivative(Debug)]
pub struct LogicalDevice {
    #[derivative(Debug = "ignore")]
    inner: Arc<LogicalDeviceInner>,
}

pub struct LogicalDeviceCreateInfo<'a> {
    pub instance: &'a ash::Instance,
    /// Device created by the device selection logic. Ownership moves into the [`LogicalDevice`].
    pub device: ash::Device,
    /// Whether `VK_KHR_swapchain` was enabled on `device`
    pub swapchain: bool,
}

impl LogicalDevice {
    pub fn new(device_ci: LogicalDeviceCreateInfo) -> Self {
        let swapchain = device_ci
            .swapchain
            .then(|| ash::khr::swapchain::Device::new(device_ci.instance, &device_ci.device));

        #[cfg(feature = "log-lifetimes")]
        tracing::trace!("Creating VkDevice {:p}", device_ci.device.handle());

        Self {
            inner: Arc::new(LogicalDeviceInner {
                handle: device_ci.device,
                swapchain,
            }),
        }
    }

    /// Get a reference to the underlying [`ash::Device`]
    pub fn get_handle(&self) -> &ash::Device {
        &self.inner.handle
    }

    fn swapchain_ext(&self) -> Result<&ash::khr::swapchain::Device, VkError> {
        self.inner
            .swapchain
            .as_ref()
            .ok_or(VkError::NoSwapchainExtension)
    }
}

impl super::Device for LogicalDevice {
    fn create_command_pool(
        &self,
        queue_family_index: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<vk::CommandPool, VkError> {
        let command_pool_ci = vk::CommandPoolCreateInfo {
            flags,
            queue_family_index,
            ..Default::default()
        };
        Ok(unsafe {
            self.get_handle()
                .create_command_pool(&command_pool_ci, None)?
        })
    }

    fn destroy_command_pool(&self, command_pool: vk::CommandPool) {
        unsafe {
            self.get_handle().destroy_command_pool(command_pool, None);
        }
    }

    fn allocate_command_buffers(
        &self,
        command_pool: vk::CommandPool,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>, VkError> {
        let allocate_info = vk::CommandBufferAllocateInfo {
            command_pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count,
            ..Default::default()
        };
        Ok(unsafe {
            self.get_handle()
                .allocate_command_buffers(&allocate_info)?
        })
    }

    fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<(), VkError> {
        unsafe {
            self.get_handle()
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())?
        };
        Ok(())
    }

    fn begin_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    ) -> Result<(), VkError> {
        let begin_info = vk::CommandBufferBeginInfo {
            flags,
            ..Default::default()
        };
        unsafe {
            self.get_handle()
                .begin_command_buffer(command_buffer, &begin_info)?
        };
        Ok(())
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<(), VkError> {
        unsafe { self.get_handle().end_command_buffer(command_buffer)? };
        Ok(())
    }

    fn cmd_pipeline_barrier(&self, command_buffer: vk::CommandBuffer, dependency: &DependencyInfo) {
        let buffer_barriers: Vec<vk::BufferMemoryBarrier2> = dependency
            .buffer_barriers
            .iter()
            .map(|barrier| barrier.to_vk())
            .collect();
        let image_barriers: Vec<vk::ImageMemoryBarrier2> = dependency
            .image_barriers
            .iter()
            .map(|barrier| barrier.to_vk())
            .collect();
        let dependency_info = vk::DependencyInfo::default()
            .buffer_memory_barriers(&buffer_barriers)
            .image_memory_barriers(&image_barriers);
        unsafe {
            self.get_handle()
                .cmd_pipeline_barrier2(command_buffer, &dependency_info);
        }
    }

    fn cmd_copy_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: &[vk::BufferCopy],
    ) {
        unsafe {
            self.get_handle()
                .cmd_copy_buffer(command_buffer, src, dst, regions);
        }
    }

    fn cmd_copy_buffer_to_image(
        &self,
        command_buffer: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        unsafe {
            self.get_handle()
                .cmd_copy_buffer_to_image(command_buffer, src, dst, dst_layout, regions);
        }
    }

    fn create_semaphore(&self, kind: super::SemaphoreKind) -> Result<vk::Semaphore, VkError> {
        let handle = match kind {
            super::SemaphoreKind::Binary => unsafe {
                self.get_handle()
                    .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?
            },
            super::SemaphoreKind::Timeline { initial_value } => {
                let mut type_ci = vk::SemaphoreTypeCreateInfo::default()
                    .semaphore_type(vk::SemaphoreType::TIMELINE)
                    .initial_value(initial_value);
                let semaphore_ci = vk::SemaphoreCreateInfo::default().push_next(&mut type_ci);
                unsafe { self.get_handle().create_semaphore(&semaphore_ci, None)? }
            }
        };
        Ok(handle)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe {
            self.get_handle().destroy_semaphore(semaphore, None);
        }
    }

    fn semaphore_counter_value(&self, semaphore: vk::Semaphore) -> Result<u64, VkError> {
        Ok(unsafe { self.get_handle().get_semaphore_counter_value(semaphore)? })
    }

    fn wait_semaphores(
        &self,
        semaphores: &[vk::Semaphore],
        values: &[u64],
        timeout: u64,
    ) -> Result<(), VkError> {
        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(semaphores)
            .values(values);
        unsafe { self.get_handle().wait_semaphores(&wait_info, timeout)? };
        Ok(())
    }

    fn queue_submit(&self, queue: vk::Queue, submission: &Submission) -> Result<(), VkError> {
        let wait_infos: Vec<vk::SemaphoreSubmitInfo> = submission
            .wait_semaphores
            .iter()
            .map(|wait| wait.to_vk())
            .collect();
        let signal_infos: Vec<vk::SemaphoreSubmitInfo> = submission
            .signal_semaphores
            .iter()
            .map(|signal| signal.to_vk())
            .collect();
        let command_buffer_infos =
            [vk::CommandBufferSubmitInfo::default().command_buffer(submission.command_buffer)];
        let submit_info = vk::SubmitInfo2::default()
            .wait_semaphore_infos(&wait_infos)
            .command_buffer_infos(&command_buffer_infos)
            .signal_semaphore_infos(&signal_infos);
        unsafe {
            self.get_handle()
                .queue_submit2(queue, &[submit_info], vk::Fence::null())?
        };
        Ok(())
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> Result<(u32, bool), VkError> {
        let ext = self.swapchain_ext()?;
        Ok(unsafe { ext.acquire_next_image(swapchain, timeout, semaphore, vk::Fence::null())? })
    }

    fn queue_present(
        &self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<bool, VkError> {
        let ext = self.swapchain_ext()?;
        let swapchains = [swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        Ok(unsafe { ext.queue_present(queue, &present_info)? })
    }

    fn wait_idle(&self) -> Result<(), VkError> {
        unsafe { self.get_handle().device_wait_idle()? };
        Ok(())
    }
}
