//! Nodes shipped with the graph
//!
//! [`AcquireNode`] and [`PresentNode`] bracket a frame which renders to a swapchain, they share the
//! [`AcquiredImage`] slot. [`TransferNode`] uploads host data through per frame staging buffers.
pub mod acquire;
pub mod present;
pub mod transfer;

pub use acquire::{AcquireNode, AcquiredImage, SwapchainChanged};
pub use present::PresentNode;
pub use transfer::{TransferNode, TransferNodeCreateInfo, TransferQueue};

use ash::vk;

/// First mip and layer of a color image, the only part of a swapchain image the graph touches
pub(crate) fn color_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}
