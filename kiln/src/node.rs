//! # Node
//! A node is a unit of GPU work bound to a single queue. The graph owns one command pool per node,
//! one command buffer per frame in flight and a timeline semaphore the node signals with the
//! cumulative frame count every frame.
//!
//! Each frame a node goes through three phases, all driven by [`crate::RenderGraph::execute`]:
//! [`Node::pre_render`] before the CPU waits on older frames, [`Node::render`] while its command
//! buffer is recording, and [`Node::post_render`] once every node was submitted.
use std::any::Any;
use std::fmt::Debug;
use std::marker::PhantomData;

use anyhow::Result;
use ash::vk;
use derivative::Derivative;
use kiln_containers::prelude::PerFrame;
use kiln_vk::command::{CommandBuffer, CommandPool};
use kiln_vk::device::{Device, Queue};
use kiln_vk::sync::{SemaphoreSubmit, Submission, TimelineSemaphore};

use crate::edge::{Barriers, EdgeEntry, EdgeId};
use crate::error::RenderGraphError;
use crate::resource::Retirer;
use crate::usage::{
    BufferRegion, BufferUsage, BufferUsageId, ImageRegion, ImageUsage, ImageUsageId, Usages,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

/// Typed reference to a node of a graph, returned by [`crate::RenderGraph::add_node`]
#[derive(Derivative)]
#[derivative(
    Debug(bound = ""),
    Clone(bound = ""),
    Copy(bound = ""),
    PartialEq(bound = ""),
    Eq(bound = ""),
    Hash(bound = "")
)]
pub struct NodeHandle<T> {
    id: NodeId,
    #[derivative(Debug = "ignore", PartialEq = "ignore", Hash = "ignore")]
    _marker: PhantomData<fn() -> T>,
}

impl<T> NodeHandle<T> {
    pub(crate) fn new(id: NodeId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }
}

/// Allows recovering the concrete type behind a `dyn Node`
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Work scheduled by the graph
pub trait Node<D: Device>: AsAny + Debug {
    /// Runs before the CPU waits on the frame which last used this frame slot
    ///
    /// Syncs made here count towards the current frame.
    fn pre_render(&mut self, ctx: &mut FrameContext<D>) -> Result<()>;

    /// Record commands into [`RenderContext::command_buffer`]
    ///
    /// Barriers for input edges were recorded before, barriers for output edges are recorded
    /// after this returns. Syncs made here still reach the output edges, but a consumer has to
    /// sync during [`Node::pre_render`] for its input edges to see them.
    fn render(&mut self, ctx: &mut RenderContext<D>) -> Result<()>;

    /// Runs after every node of the frame was submitted
    fn post_render(&mut self, ctx: &mut FrameContext<D>) -> Result<()>;
}

/// Frame counters handed to nodes
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct FrameInfo {
    pub current_frame: usize,
    pub frame_count: u64,
    pub frames_in_flight: usize,
}

/// Access to the graph for a node during [`Node::pre_render`] and [`Node::post_render`]
pub struct FrameContext<'a, D: Device> {
    device: &'a D,
    node: NodeId,
    frame: FrameInfo,
    usages: &'a mut Usages,
}

impl<'a, D: Device> FrameContext<'a, D> {
    pub(crate) fn new(
        device: &'a D,
        node: NodeId,
        frame: FrameInfo,
        usages: &'a mut Usages,
    ) -> Self {
        Self {
            device,
            node,
            frame,
            usages,
        }
    }

    pub fn device(&self) -> &D {
        self.device
    }

    pub fn node_id(&self) -> NodeId {
        self.node
    }

    /// Frame slot in `0..frames_in_flight` being recorded
    pub fn current_frame(&self) -> usize {
        self.frame.current_frame
    }

    /// Cumulative frame count, also the value every node semaphore is signaled with this frame
    pub fn frame_count(&self) -> u64 {
        self.frame.frame_count
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frame.frames_in_flight
    }

    /// Records that `region` of `buffer` is touched this frame through `usage`
    pub fn sync_buffer(
        &mut self,
        usage: BufferUsageId,
        buffer: vk::Buffer,
        region: BufferRegion,
    ) -> Result<(), RenderGraphError> {
        self.usages
            .sync_buffer(self.node, usage, self.frame.current_frame, buffer, region)
    }

    /// Records that `subresource_range` of `image` is touched this frame through `usage`
    pub fn sync_image(
        &mut self,
        usage: ImageUsageId,
        image: vk::Image,
        subresource_range: vk::ImageSubresourceRange,
    ) -> Result<(), RenderGraphError> {
        self.usages.sync_image(
            self.node,
            usage,
            self.frame.current_frame,
            image,
            ImageRegion::from(subresource_range),
        )
    }
}

/// [`FrameContext`] along with the command buffer being recorded
pub struct RenderContext<'a, D: Device> {
    frame: FrameContext<'a, D>,
    command_buffer: &'a CommandBuffer<D>,
}

impl<'a, D: Device> RenderContext<'a, D> {
    pub fn command_buffer(&self) -> &CommandBuffer<D> {
        self.command_buffer
    }
}

impl<'a, D: Device> std::ops::Deref for RenderContext<'a, D> {
    type Target = FrameContext<'a, D>;

    fn deref(&self) -> &Self::Target {
        &self.frame
    }
}

impl<D: Device> std::ops::DerefMut for RenderContext<'_, D> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.frame
    }
}

/// Passed to the constructor of a node to declare its usages and external semaphores
pub struct NodeBuilder<'a, D: Device> {
    device: &'a D,
    queue: Queue,
    node: NodeId,
    frames_in_flight: usize,
    retirer: &'a Retirer,
    usages: &'a mut Usages,
    external_waits: Vec<SemaphoreSubmit>,
    external_signals: Vec<SemaphoreSubmit>,
}

impl<'a, D: Device> NodeBuilder<'a, D> {
    pub(crate) fn new(
        device: &'a D,
        queue: Queue,
        node: NodeId,
        frames_in_flight: usize,
        retirer: &'a Retirer,
        usages: &'a mut Usages,
    ) -> Self {
        Self {
            device,
            queue,
            node,
            frames_in_flight,
            retirer,
            usages,
            external_waits: Vec::new(),
            external_signals: Vec::new(),
        }
    }

    pub fn device(&self) -> &D {
        self.device
    }

    /// Queue the node will be submitted to
    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn node_id(&self) -> NodeId {
        self.node
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Handle to retire resources through the graph's destroy queues
    pub fn retirer(&self) -> Retirer {
        self.retirer.clone()
    }

    pub fn buffer_usage(
        &mut self,
        access: vk::AccessFlags2,
        stage: vk::PipelineStageFlags2,
    ) -> Result<BufferUsageId> {
        Ok(self.usages.add_buffer(BufferUsage::new(
            self.node,
            access,
            stage,
            self.frames_in_flight,
        )?))
    }

    pub fn image_usage(
        &mut self,
        layout: vk::ImageLayout,
        access: vk::AccessFlags2,
        stage: vk::PipelineStageFlags2,
    ) -> Result<ImageUsageId> {
        Ok(self.usages.add_image(ImageUsage::new(
            self.node,
            layout,
            access,
            stage,
            self.frames_in_flight,
        )?))
    }

    /// Waits on a binary semaphore at `stage` every submission
    pub fn add_external_wait(&mut self, semaphore: vk::Semaphore, stage: vk::PipelineStageFlags2) {
        self.external_waits.push(SemaphoreSubmit {
            semaphore,
            value: 0,
            stage_mask: stage,
        });
    }

    /// Signals a binary semaphore every submission
    pub fn add_external_signal(&mut self, semaphore: vk::Semaphore) {
        self.external_signals.push(SemaphoreSubmit {
            semaphore,
            value: 0,
            stage_mask: vk::PipelineStageFlags2::ALL_COMMANDS,
        });
    }

    pub(crate) fn into_external(self) -> (Vec<SemaphoreSubmit>, Vec<SemaphoreSubmit>) {
        (self.external_waits, self.external_signals)
    }
}

/// Wait on another node's timeline semaphore, wired at bake
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct NodeWait {
    pub node: NodeId,
    pub semaphore: vk::Semaphore,
    pub stage: vk::PipelineStageFlags2,
}

/// Everything the graph keeps per node
#[derive(Derivative)]
#[derivative(Debug)]
pub(crate) struct NodeEntry<D: Device> {
    pub node: Box<dyn Node<D>>,
    pub type_name: &'static str,
    #[derivative(Debug = "ignore")]
    pub device: D,
    pub queue: Queue,
    pub command_buffers: PerFrame<CommandBuffer<D>>,
    pub command_pool: CommandPool<D>,
    pub semaphore: TimelineSemaphore<D>,
    pub external_waits: Vec<SemaphoreSubmit>,
    pub external_signals: Vec<SemaphoreSubmit>,
    pub waits: Vec<NodeWait>,
    pub input_edges: Vec<EdgeId>,
    pub output_edges: Vec<EdgeId>,
}

impl<D: Device> NodeEntry<D> {
    pub fn new(
        node: Box<dyn Node<D>>,
        type_name: &'static str,
        device: D,
        queue: Queue,
        frames_in_flight: usize,
        external: (Vec<SemaphoreSubmit>, Vec<SemaphoreSubmit>),
    ) -> Result<Self> {
        let command_pool = CommandPool::new(
            device.clone(),
            &queue,
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;
        let command_buffers = PerFrame::from_vec(command_pool.allocate(frames_in_flight as u32)?)?;
        let semaphore = TimelineSemaphore::new(device.clone(), 0)?;
        let (external_waits, external_signals) = external;
        Ok(Self {
            node,
            type_name,
            device,
            queue,
            command_buffers,
            command_pool,
            semaphore,
            external_waits,
            external_signals,
            waits: Vec::new(),
            input_edges: Vec::new(),
            output_edges: Vec::new(),
        })
    }

    pub fn pre_render(&mut self, id: NodeId, frame: FrameInfo, usages: &mut Usages) -> Result<()> {
        let mut ctx = FrameContext::new(&self.device, id, frame, usages);
        self.node.pre_render(&mut ctx)
    }

    pub fn post_render(
        &mut self,
        id: NodeId,
        frame: FrameInfo,
        usages: &mut Usages,
    ) -> Result<()> {
        let mut ctx = FrameContext::new(&self.device, id, frame, usages);
        self.node.post_render(&mut ctx)
    }

    /// Records the frame's command buffer: acquire barriers of input edges, the node's own
    /// commands, then barriers of output edges
    pub fn internal_render(
        &mut self,
        id: NodeId,
        frame: FrameInfo,
        edges: &[EdgeEntry],
        usages: &mut Usages,
    ) -> Result<()> {
        let command_buffer = self.command_buffers.get_mut(frame.current_frame);
        command_buffer.reset()?;
        command_buffer.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;

        let mut barriers = Barriers::default();
        for edge in self.input_edges.iter() {
            edges[edge.0].dest_barriers(usages, frame.current_frame, &mut barriers);
        }
        command_buffer.pipeline_barrier(&barriers.dependency_info())?;

        {
            let mut ctx = RenderContext {
                frame: FrameContext::new(&self.device, id, frame, usages),
                command_buffer,
            };
            self.node.render(&mut ctx)?;
        }

        let mut barriers = Barriers::default();
        for edge in self.output_edges.iter() {
            edges[edge.0].source_barriers(usages, frame.current_frame, &mut barriers);
        }
        let command_buffer = self.command_buffers.get_mut(frame.current_frame);
        command_buffer.pipeline_barrier(&barriers.dependency_info())?;
        command_buffer.end()?;
        Ok(())
    }

    /// Submits the frame's command buffer, graph owned semaphores use the frame count as value
    pub fn submit(&self, frame: FrameInfo) -> Result<()> {
        let wait_semaphores: Vec<SemaphoreSubmit> = self
            .external_waits
            .iter()
            .copied()
            .chain(self.waits.iter().map(|wait| SemaphoreSubmit {
                semaphore: wait.semaphore,
                value: frame.frame_count,
                stage_mask: wait.stage,
            }))
            .collect();
        let signal_semaphores: Vec<SemaphoreSubmit> = std::iter::once(SemaphoreSubmit {
            semaphore: self.semaphore.handle(),
            value: frame.frame_count,
            stage_mask: vk::PipelineStageFlags2::ALL_COMMANDS,
        })
        .chain(self.external_signals.iter().copied())
        .collect();

        let command_buffer = self.command_buffers.get(frame.current_frame);
        command_buffer.submit(
            self.queue.handle(),
            Submission {
                command_buffer: command_buffer.handle(),
                wait_semaphores: &wait_semaphores,
                signal_semaphores: &signal_semaphores,
            },
        )?;
        Ok(())
    }
}
