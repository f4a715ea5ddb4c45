use ash::vk;
use thiserror::Error;

use crate::node::NodeId;

/// Errors raised by the frame graph itself
///
/// Device errors surface as [`kiln_vk::VkError`], both are carried through [`anyhow::Error`] and
/// can be recovered with `downcast_ref`.
#[derive(Debug, Error, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RenderGraphError {
    #[error("Render graph must be baked before it is executed")]
    NotBaked,

    #[error("Render graph was already baked, its topology is fixed")]
    AlreadyBaked,

    #[error("Render graph contains a cycle through node {node:?}")]
    Cycle { node: NodeId },

    #[error("Frames in flight must be at least 1")]
    InvalidFramesInFlight,

    #[error("Node does not exist in this render graph")]
    UnknownNode,

    #[error("Edge does not exist in this render graph")]
    UnknownEdge,

    #[error("Usage does not exist in this render graph")]
    UnknownUsage,

    #[error("Usage is owned by another node")]
    UsageNotOwned,

    #[error("Edge connects a node to itself")]
    SelfEdge,

    #[error("Node is not of the requested type")]
    NodeTypeMismatch,

    #[error("Swapchain is out of date")]
    SwapchainOutOfDate,

    #[error("Swapchain is suboptimal")]
    SwapchainSuboptimal,

    #[error("No swapchain image was acquired for this frame")]
    NothingAcquired,

    #[error("Transfers must have a non zero extent")]
    EmptyTransfer,

    #[error("Format {format:?} has no known texel size")]
    UnsupportedFormat { format: vk::Format },
}
