use ash::vk;

/// Describes a single buffer memory barrier
///
/// Mirrors [`vk::BufferMemoryBarrier2`] without the pointer chain so barriers can be computed,
/// stored and compared before they are handed to the device.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub struct BufferBarrier {
    pub src_stage_mask: vk::PipelineStageFlags2,
    pub src_access_mask: vk::AccessFlags2,
    pub dst_stage_mask: vk::PipelineStageFlags2,
    pub dst_access_mask: vk::AccessFlags2,
    pub src_queue_family_index: u32,
    pub dst_queue_family_index: u32,
    pub buffer: vk::Buffer,
    pub offset: vk::DeviceSize,
    pub size: vk::DeviceSize,
}

impl BufferBarrier {
    /// Whether the barrier moves ownership between two queue families
    pub fn is_ownership_transfer(&self) -> bool {
        self.src_queue_family_index != self.dst_queue_family_index
    }

    pub fn to_vk(&self) -> vk::BufferMemoryBarrier2<'static> {
        vk::BufferMemoryBarrier2 {
            src_stage_mask: self.src_stage_mask,
            src_access_mask: self.src_access_mask,
            dst_stage_mask: self.dst_stage_mask,
            dst_access_mask: self.dst_access_mask,
            src_queue_family_index: self.src_queue_family_index,
            dst_queue_family_index: self.dst_queue_family_index,
            buffer: self.buffer,
            offset: self.offset,
            size: self.size,
            ..Default::default()
        }
    }
}

/// Describes a single image memory barrier, including its layout transition
#[derive(Debug, Copy, Clone)]
pub struct ImageBarrier {
    pub src_stage_mask: vk::PipelineStageFlags2,
    pub src_access_mask: vk::AccessFlags2,
    pub dst_stage_mask: vk::PipelineStageFlags2,
    pub dst_access_mask: vk::AccessFlags2,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_queue_family_index: u32,
    pub dst_queue_family_index: u32,
    pub image: vk::Image,
    pub subresource_range: vk::ImageSubresourceRange,
}

impl ImageBarrier {
    /// Whether the barrier moves ownership between two queue families
    pub fn is_ownership_transfer(&self) -> bool {
        self.src_queue_family_index != self.dst_queue_family_index
    }

    pub fn to_vk(&self) -> vk::ImageMemoryBarrier2<'static> {
        vk::ImageMemoryBarrier2 {
            src_stage_mask: self.src_stage_mask,
            src_access_mask: self.src_access_mask,
            dst_stage_mask: self.dst_stage_mask,
            dst_access_mask: self.dst_access_mask,
            old_layout: self.old_layout,
            new_layout: self.new_layout,
            src_queue_family_index: self.src_queue_family_index,
            dst_queue_family_index: self.dst_queue_family_index,
            image: self.image,
            subresource_range: self.subresource_range,
            ..Default::default()
        }
    }
}

/// A batch of barriers recorded with a single `vkCmdPipelineBarrier2`
#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyInfo<'a> {
    pub buffer_barriers: &'a [BufferBarrier],
    pub image_barriers: &'a [ImageBarrier],
}

impl DependencyInfo<'_> {
    pub fn is_empty(&self) -> bool {
        self.buffer_barriers.is_empty() && self.image_barriers.is_empty()
    }
}

/// One semaphore entry of a queue submission
///
/// Binary semaphores are always submitted with a `value` of 0; timeline semaphores carry the
/// value to wait for or to signal.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub struct SemaphoreSubmit {
    pub semaphore: vk::Semaphore,
    pub value: u64,
    pub stage_mask: vk::PipelineStageFlags2,
}

impl SemaphoreSubmit {
    pub fn to_vk(&self) -> vk::SemaphoreSubmitInfo<'static> {
        vk::SemaphoreSubmitInfo {
            semaphore: self.semaphore,
            value: self.value,
            stage_mask: self.stage_mask,
            device_index: 0,
            ..Default::default()
        }
    }
}

/// Everything needed for a single `vkQueueSubmit2` of one command buffer
#[derive(Debug, Clone, Copy)]
pub struct Submission<'a> {
    pub command_buffer: vk::CommandBuffer,
    pub wait_semaphores: &'a [SemaphoreSubmit],
    pub signal_semaphores: &'a [SemaphoreSubmit],
}
