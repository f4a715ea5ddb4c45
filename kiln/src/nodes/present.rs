use std::sync::{Arc, Mutex};

use anyhow::Result;
use ash::vk;
use derivative::Derivative;
use kiln_vk::device::Device;
use kiln_vk::sync::BinarySemaphore;
use kiln_vk::VkError;
use tracing::warn;

use crate::error::RenderGraphError;
use crate::node::{FrameContext, Node, NodeBuilder, RenderContext};
use crate::nodes::{color_range, AcquiredImage};
use crate::usage::ImageUsageId;

/// Presents the image an [`crate::nodes::AcquireNode`] acquired this frame
///
/// The node's own submission signals the present semaphore, [`Node::post_render`] then queues
/// the present waiting on it. Its image usage carries no access and exists to pull the image
/// into `PRESENT_SRC_KHR` and to wire the semaphore dependency on whatever rendered it. The
/// acquired image is synced during [`Node::pre_render`], so the present node must come after the
/// acquire node. A frame without an acquired image fails with
/// [`RenderGraphError::NothingAcquired`] before anything signals the present semaphore.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct PresentNode<D: Device> {
    semaphore: BinarySemaphore<D>,
    queue: vk::Queue,
    acquired: Arc<Mutex<AcquiredImage>>,
    image_usage: ImageUsageId,
}

impl<D: Device> PresentNode<D> {
    /// `stage` is the stage of the image usage, usually the last stage writing the image
    pub fn new(
        builder: &mut NodeBuilder<D>,
        acquired: Arc<Mutex<AcquiredImage>>,
        stage: vk::PipelineStageFlags2,
    ) -> Result<Self> {
        let semaphore = BinarySemaphore::new(builder.device().clone())?;
        builder.add_external_signal(semaphore.handle());
        let image_usage = builder.image_usage(
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::AccessFlags2::NONE,
            stage,
        )?;
        Ok(Self {
            semaphore,
            queue: builder.queue().handle(),
            acquired,
            image_usage,
        })
    }

    pub fn image_usage(&self) -> ImageUsageId {
        self.image_usage
    }

    /// Semaphore the present waits on
    pub fn semaphore(&self) -> vk::Semaphore {
        self.semaphore.handle()
    }
}

impl<D: Device> Node<D> for PresentNode<D> {
    fn pre_render(&mut self, ctx: &mut FrameContext<D>) -> Result<()> {
        let acquired = *self.acquired.lock().map_err(VkError::from)?;
        if acquired.index.is_none() {
            return Err(RenderGraphError::NothingAcquired.into());
        }
        if acquired.image != vk::Image::null() {
            ctx.sync_image(self.image_usage, acquired.image, color_range())?;
        }
        Ok(())
    }

    fn render(&mut self, _ctx: &mut RenderContext<D>) -> Result<()> {
        Ok(())
    }

    fn post_render(&mut self, ctx: &mut FrameContext<D>) -> Result<()> {
        let acquired = *self.acquired.lock().map_err(VkError::from)?;
        let Some(index) = acquired.index else {
            return Err(RenderGraphError::NothingAcquired.into());
        };
        match ctx.device().queue_present(
            self.queue,
            acquired.swapchain,
            index,
            self.semaphore.handle(),
        ) {
            Ok(false) => Ok(()),
            Ok(true) => {
                warn!("Presented to suboptimal swapchain {:?}", acquired.swapchain);
                Ok(())
            }
            Err(VkError::Vk(vk::Result::ERROR_OUT_OF_DATE_KHR)) => {
                Err(RenderGraphError::SwapchainOutOfDate.into())
            }
            Err(error) => Err(error.into()),
        }
    }
}
