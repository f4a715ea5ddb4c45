#![allow(dead_code)]

use anyhow::Result;
use ash::vk;
use kiln::prelude::*;
use kiln_vk::device::{RecordedCommand, RecordedSubmission, TestDevice};
use kiln_vk::sync::{BufferBarrier, ImageBarrier};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

pub fn graph(device: &TestDevice, frames_in_flight: usize) -> RenderGraph<TestDevice> {
    init_tracing();
    RenderGraph::new(RenderGraphCreateInfo::new(device.clone(), frames_in_flight)).unwrap()
}

pub fn color_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// Generic node syncing a fixed set of resources every frame
#[derive(Debug, Default)]
pub struct Pass {
    pub buffer_usages: Vec<BufferUsageId>,
    pub image_usages: Vec<ImageUsageId>,
    pub buffers: Vec<(BufferUsageId, vk::Buffer, BufferRegion)>,
    pub images: Vec<(ImageUsageId, vk::Image, vk::ImageSubresourceRange)>,
    /// `(current_frame, frame_count)` seen by every pre render
    pub frames: Vec<(usize, u64)>,
    pub rendered: usize,
    pub post_rendered: usize,
}

impl Pass {
    pub fn with_buffer(
        builder: &mut NodeBuilder<TestDevice>,
        access: vk::AccessFlags2,
        stage: vk::PipelineStageFlags2,
    ) -> Result<Self> {
        Ok(Self {
            buffer_usages: vec![builder.buffer_usage(access, stage)?],
            ..Default::default()
        })
    }

    pub fn with_image(
        builder: &mut NodeBuilder<TestDevice>,
        layout: vk::ImageLayout,
        access: vk::AccessFlags2,
        stage: vk::PipelineStageFlags2,
    ) -> Result<Self> {
        Ok(Self {
            image_usages: vec![builder.image_usage(layout, access, stage)?],
            ..Default::default()
        })
    }

    pub fn sync_buffer(&mut self, buffer: vk::Buffer, region: BufferRegion) {
        self.buffers.push((self.buffer_usages[0], buffer, region));
    }

    pub fn sync_image(&mut self, image: vk::Image) {
        self.images.push((self.image_usages[0], image, color_range()));
    }
}

impl<D: Device> Node<D> for Pass {
    fn pre_render(&mut self, ctx: &mut FrameContext<D>) -> Result<()> {
        self.frames.push((ctx.current_frame(), ctx.frame_count()));
        for (usage, buffer, region) in self.buffers.iter() {
            ctx.sync_buffer(*usage, *buffer, *region)?;
        }
        for (usage, image, range) in self.images.iter() {
            ctx.sync_image(*usage, *image, *range)?;
        }
        Ok(())
    }

    fn render(&mut self, _ctx: &mut RenderContext<D>) -> Result<()> {
        self.rendered += 1;
        Ok(())
    }

    fn post_render(&mut self, _ctx: &mut FrameContext<D>) -> Result<()> {
        self.post_rendered += 1;
        Ok(())
    }
}

/// The submission of `command_buffer` recorded last
pub fn submission_of(device: &TestDevice, command_buffer: vk::CommandBuffer) -> RecordedSubmission {
    device
        .submissions()
        .into_iter()
        .rev()
        .find(|submission| submission.command_buffer == command_buffer)
        .unwrap()
}

pub fn barrier_commands(
    submission: &RecordedSubmission,
) -> Vec<(Vec<BufferBarrier>, Vec<ImageBarrier>)> {
    submission
        .commands
        .iter()
        .filter_map(|command| match command {
            RecordedCommand::PipelineBarrier {
                buffer_barriers,
                image_barriers,
            } => Some((buffer_barriers.clone(), image_barriers.clone())),
            _ => None,
        })
        .collect()
}
