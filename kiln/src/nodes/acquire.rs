use std::sync::{Arc, Mutex};

use anyhow::Result;
use ash::vk;
use derivative::Derivative;
use kiln_vk::device::Device;
use kiln_vk::sync::BinarySemaphore;
use kiln_vk::VkError;
use tracing::debug;

use crate::error::RenderGraphError;
use crate::event::EventReceiver;
use crate::node::{FrameContext, Node, NodeBuilder, RenderContext};
use crate::nodes::color_range;
use crate::usage::ImageUsageId;

/// Swapchain image acquired this frame, shared between an [`AcquireNode`] and a
/// [`crate::nodes::PresentNode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AcquiredImage {
    pub swapchain: vk::SwapchainKHR,
    /// [`None`] until the first successful acquire
    pub index: Option<u32>,
    /// Null if the node was not told about the swapchain's images
    pub image: vk::Image,
}

/// Sent to an [`AcquireNode`] once the swapchain was recreated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapchainChanged {
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
}

/// Acquires the next swapchain image during [`Node::pre_render`]
///
/// Its submission waits on the acquire semaphore, so every node depending on it runs after the
/// presentation engine released the image. The acquired image is synced through
/// [`AcquireNode::image_usage`] in layout `UNDEFINED`.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct AcquireNode<D: Device> {
    semaphore: BinarySemaphore<D>,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    acquired: Arc<Mutex<AcquiredImage>>,
    #[derivative(Debug = "ignore")]
    swapchain_events: Option<EventReceiver<SwapchainChanged>>,
    image_usage: ImageUsageId,
}

impl<D: Device> AcquireNode<D> {
    pub fn new(
        builder: &mut NodeBuilder<D>,
        swapchain: vk::SwapchainKHR,
        images: Vec<vk::Image>,
        swapchain_events: Option<EventReceiver<SwapchainChanged>>,
    ) -> Result<Self> {
        let semaphore = BinarySemaphore::new(builder.device().clone())?;
        builder.add_external_wait(
            semaphore.handle(),
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        );
        let image_usage = builder.image_usage(
            vk::ImageLayout::UNDEFINED,
            vk::AccessFlags2::NONE,
            vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
        )?;
        Ok(Self {
            semaphore,
            swapchain,
            images,
            acquired: Arc::new(Mutex::new(AcquiredImage {
                swapchain,
                ..Default::default()
            })),
            swapchain_events,
            image_usage,
        })
    }

    pub fn image_usage(&self) -> ImageUsageId {
        self.image_usage
    }

    /// Slot updated by every acquire
    pub fn acquired(&self) -> Arc<Mutex<AcquiredImage>> {
        self.acquired.clone()
    }

    pub fn swapchain(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Semaphore signaled by the presentation engine
    pub fn semaphore(&self) -> vk::Semaphore {
        self.semaphore.handle()
    }

    /// Replaces the swapchain images are acquired from
    pub fn set_swapchain(&mut self, swapchain: vk::SwapchainKHR, images: Vec<vk::Image>) {
        debug!("Acquiring from new swapchain {:?}", swapchain);
        self.swapchain = swapchain;
        self.images = images;
    }
}

impl<D: Device> Node<D> for AcquireNode<D> {
    fn pre_render(&mut self, ctx: &mut FrameContext<D>) -> Result<()> {
        if let Some(changed) = self
            .swapchain_events
            .as_mut()
            .and_then(|events| events.latest())
        {
            self.set_swapchain(changed.swapchain, changed.images);
        }

        let index = match ctx.device().acquire_next_image(
            self.swapchain,
            u64::MAX,
            self.semaphore.handle(),
        ) {
            Ok((index, false)) => index,
            Ok((_, true)) => return Err(RenderGraphError::SwapchainSuboptimal.into()),
            Err(VkError::Vk(vk::Result::ERROR_OUT_OF_DATE_KHR)) => {
                return Err(RenderGraphError::SwapchainOutOfDate.into())
            }
            Err(error) => return Err(error.into()),
        };

        let image = self
            .images
            .get(index as usize)
            .copied()
            .unwrap_or_default();
        *self.acquired.lock().map_err(VkError::from)? = AcquiredImage {
            swapchain: self.swapchain,
            index: Some(index),
            image,
        };
        if image != vk::Image::null() {
            ctx.sync_image(self.image_usage, image, color_range())?;
        }
        Ok(())
    }

    fn render(&mut self, _ctx: &mut RenderContext<D>) -> Result<()> {
        Ok(())
    }

    fn post_render(&mut self, _ctx: &mut FrameContext<D>) -> Result<()> {
        Ok(())
    }
}
