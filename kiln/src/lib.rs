//! # kiln
//! A baked frame graph for Vulkan.
//!
//! Nodes are bound to a queue and declare how they touch buffers and images through usages.
//! Edges between usages tell the graph which barriers and semaphore waits to insert. After a
//! one time [`RenderGraph::bake`], every [`RenderGraph::execute`] records and submits one frame
//! while keeping at most `frames_in_flight` frames ahead of the GPU.
pub mod edge;
pub mod error;
pub mod event;
pub mod graph;
pub mod node;
pub mod nodes;
pub mod resource;
pub mod usage;

pub use edge::{BufferEdge, Edge, EdgeEntry, EdgeId, ImageEdge};
pub use error::RenderGraphError;
pub use graph::{RenderGraph, RenderGraphCreateInfo};
pub use node::{FrameContext, Node, NodeBuilder, NodeHandle, NodeId, RenderContext};
pub use usage::{BufferRegion, BufferUsageId, ImageRegion, ImageUsageId};

pub use kiln_vk;

pub mod prelude {
    pub use crate::edge::{BufferEdge, ImageEdge};
    pub use crate::error::RenderGraphError;
    pub use crate::event::{event_channel, EventReceiver, EventSender};
    pub use crate::graph::{RenderGraph, RenderGraphCreateInfo};
    pub use crate::node::{FrameContext, Node, NodeBuilder, NodeHandle, NodeId, RenderContext};
    pub use crate::nodes::{
        AcquireNode, AcquiredImage, PresentNode, SwapchainChanged, TransferNode,
        TransferNodeCreateInfo, TransferQueue,
    };
    pub use crate::resource::{Buffer, BufferState, Image, ImageState, Retirer};
    pub use crate::usage::{BufferRegion, BufferUsageId, ImageRegion, ImageUsageId};
    pub use kiln_vk::device::{Device, LogicalDevice, Queue, QueueInfo};
}
