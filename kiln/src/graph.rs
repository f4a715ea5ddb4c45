//! # Render graph
//! Owns every node, edge and usage. Topology is fixed by a single [`RenderGraph::bake`], after
//! which [`RenderGraph::execute`] runs one frame per call:
//!
//! 1. clear this frame slot's usage records
//! 2. [`Node::pre_render`] every node
//! 3. wait until the frame which last used this frame slot completed
//! 4. free resources retired `frames_in_flight` frames ago
//! 5. record every node's command buffer
//! 6. submit every node
//! 7. [`Node::post_render`] every node
//!
//! Every phase walks the nodes in topological order.
use ash::vk;
use crossbeam_channel::Receiver;
use derivative::Derivative;
use kiln_containers::prelude::DeferredDeletion;
use kiln_vk::allocators::Allocator;
use kiln_vk::device::{Device, Queue};
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{debug, trace, warn};

use anyhow::Result;

use crate::edge::{Edge, EdgeEntry, EdgeId};
use crate::error::RenderGraphError;
use crate::node::{FrameInfo, Node, NodeBuilder, NodeEntry, NodeHandle, NodeId, NodeWait};
use crate::resource::{BufferState, ImageState, Retired, Retirer};
use crate::usage::{BufferUsage, BufferUsageId, ImageUsage, ImageUsageId, Usages};

/// Parameters of a [`RenderGraph`]
#[derive(Debug, Clone)]
pub struct RenderGraphCreateInfo<D: Device> {
    pub device: D,
    /// How many frames the CPU may record ahead of the GPU, at least 1
    pub frames_in_flight: usize,
    /// Timeout in nanoseconds of the per frame CPU wait
    pub wait_timeout: u64,
    /// Name used in logs
    pub name: String,
}

impl<D: Device> RenderGraphCreateInfo<D> {
    pub fn new(device: D, frames_in_flight: usize) -> Self {
        Self {
            device,
            frames_in_flight,
            wait_timeout: u64::MAX,
            name: String::from("render graph"),
        }
    }
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct RenderGraph<D: Device> {
    name: String,
    nodes: Vec<NodeEntry<D>>,
    edges: Vec<EdgeEntry>,
    usages: Usages,
    /// Topological order, filled by bake
    order: Vec<NodeId>,
    /// Every node's timeline semaphore, in topological order
    frame_semaphores: Vec<vk::Semaphore>,
    baked: bool,
    frames_in_flight: usize,
    frame_count: u64,
    current_frame: usize,
    wait_timeout: u64,
    destroy_buffers: DeferredDeletion<Retired>,
    destroy_images: DeferredDeletion<Retired>,
    retirer: Retirer,
    retired: Receiver<Retired>,
    #[derivative(Debug = "ignore")]
    device: D,
}

impl<D: Device> RenderGraph<D> {
    pub fn new(graph_ci: RenderGraphCreateInfo<D>) -> Result<Self> {
        if graph_ci.frames_in_flight == 0 {
            return Err(RenderGraphError::InvalidFramesInFlight.into());
        }
        let (retirer, retired) = Retirer::channel();
        Ok(Self {
            name: graph_ci.name,
            nodes: Vec::new(),
            edges: Vec::new(),
            usages: Usages::default(),
            order: Vec::new(),
            frame_semaphores: Vec::new(),
            baked: false,
            frames_in_flight: graph_ci.frames_in_flight,
            frame_count: graph_ci.frames_in_flight as u64,
            current_frame: 0,
            wait_timeout: graph_ci.wait_timeout,
            destroy_buffers: DeferredDeletion::new(graph_ci.frames_in_flight)?,
            destroy_images: DeferredDeletion::new(graph_ci.frames_in_flight)?,
            retirer,
            retired,
            device: graph_ci.device,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Cumulative frame count. Starts at `frames_in_flight` so the first wait targets 0.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// `frame_count % frames_in_flight`
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn is_baked(&self) -> bool {
        self.baked
    }

    /// Order every phase of [`Self::execute`] walks the nodes in, empty until baked
    pub fn execution_order(&self) -> &[NodeId] {
        &self.order
    }

    /// Hands out a [`Retirer`] feeding this graph's destroy queues
    pub fn retirer(&self) -> Retirer {
        self.retirer.clone()
    }

    pub fn buffer_usage(&self, id: BufferUsageId) -> Result<&BufferUsage, RenderGraphError> {
        self.usages.buffer(id)
    }

    pub fn image_usage(&self, id: ImageUsageId) -> Result<&ImageUsage, RenderGraphError> {
        self.usages.image(id)
    }

    /// Edge added as `id`, along with the stages and nodes it was resolved to
    pub fn edge(&self, id: EdgeId) -> Result<&EdgeEntry, RenderGraphError> {
        self.edges.get(id.0).ok_or(RenderGraphError::UnknownEdge)
    }

    fn entry(&self, id: NodeId) -> Result<&NodeEntry<D>, RenderGraphError> {
        self.nodes.get(id.0).ok_or(RenderGraphError::UnknownNode)
    }

    /// Borrows the node behind `handle`
    pub fn node<T: Node<D>>(&self, handle: NodeHandle<T>) -> Result<&T, RenderGraphError> {
        let node: &dyn Node<D> = &*self.entry(handle.id())?.node;
        node.as_any()
            .downcast_ref::<T>()
            .ok_or(RenderGraphError::NodeTypeMismatch)
    }

    /// Mutably borrows the node behind `handle`, only possible between two executes
    pub fn node_mut<T: Node<D>>(
        &mut self,
        handle: NodeHandle<T>,
    ) -> Result<&mut T, RenderGraphError> {
        let entry = self
            .nodes
            .get_mut(handle.id().0)
            .ok_or(RenderGraphError::UnknownNode)?;
        let node: &mut dyn Node<D> = &mut *entry.node;
        node.as_any_mut()
            .downcast_mut::<T>()
            .ok_or(RenderGraphError::NodeTypeMismatch)
    }

    /// Timeline semaphore signaled by the node every frame
    pub fn node_semaphore(&self, id: NodeId) -> Result<vk::Semaphore, RenderGraphError> {
        Ok(self.entry(id)?.semaphore.handle())
    }

    /// Command buffer the node records into for frame slot `frame`
    pub fn node_command_buffer(
        &self,
        id: NodeId,
        frame: usize,
    ) -> Result<vk::CommandBuffer, RenderGraphError> {
        Ok(self.entry(id)?.command_buffers.get(frame).handle())
    }

    pub fn node_queue(&self, id: NodeId) -> Result<Queue, RenderGraphError> {
        Ok(self.entry(id)?.queue)
    }

    /// Amount of resources waiting in the destroy queues
    pub fn pending_destruction(&self) -> usize {
        self.destroy_buffers.pending() + self.destroy_images.pending()
    }

    /// Adds a node submitted to `queue`, built by `build`
    ///
    /// Usages created through the builder belong to the new node. If `build` fails, they are
    /// removed again.
    pub fn add_node<T, F>(&mut self, queue: Queue, build: F) -> Result<NodeHandle<T>>
    where
        T: Node<D>,
        F: FnOnce(&mut NodeBuilder<D>) -> Result<T>,
    {
        if self.baked {
            return Err(RenderGraphError::AlreadyBaked.into());
        }
        let id = NodeId(self.nodes.len());
        let watermark = self.usages.watermark();

        let mut builder = NodeBuilder::new(
            &self.device,
            queue,
            id,
            self.frames_in_flight,
            &self.retirer,
            &mut self.usages,
        );
        let built = build(&mut builder);
        let external = builder.into_external();

        let entry = built.and_then(|node| {
            NodeEntry::new(
                Box::new(node),
                std::any::type_name::<T>(),
                self.device.clone(),
                queue,
                self.frames_in_flight,
                external,
            )
        });
        match entry {
            Ok(entry) => {
                #[cfg(feature = "log-lifetimes")]
                trace!("Adding node {} to {}", entry.type_name, self.name);

                self.nodes.push(entry);
                Ok(NodeHandle::new(id))
            }
            Err(error) => {
                self.usages.truncate(watermark);
                Err(error)
            }
        }
    }

    /// Connects two usages of different nodes
    pub fn add_edge(&mut self, edge: impl Into<Edge>) -> Result<EdgeId> {
        if self.baked {
            return Err(RenderGraphError::AlreadyBaked.into());
        }
        let edge = edge.into();
        let (source_node, dest_node, source_stage, dest_stage) = match edge {
            Edge::Buffer(edge) => {
                let source = self.usages.buffer(edge.source)?;
                let dest = self.usages.buffer(edge.dest)?;
                (source.node(), dest.node(), source.stage(), dest.stage())
            }
            Edge::Image(edge) => {
                let source = self.usages.image(edge.source)?;
                let dest = self.usages.image(edge.dest)?;
                (source.node(), dest.node(), source.stage(), dest.stage())
            }
        };
        if source_node == dest_node {
            return Err(RenderGraphError::SelfEdge.into());
        }
        let source_family = self.entry(source_node)?.queue.get_family_index();
        let dest_family = self.entry(dest_node)?.queue.get_family_index();

        let id = EdgeId(self.edges.len());
        self.edges.push(EdgeEntry {
            edge,
            source_node,
            dest_node,
            source_family,
            dest_family,
            source_stage,
            dest_stage,
        });
        self.nodes[source_node.0].output_edges.push(id);
        self.nodes[dest_node.0].input_edges.push(id);
        Ok(id)
    }

    /// Fixes the execution order and wires semaphores between dependent nodes
    pub fn bake(&mut self) -> Result<()> {
        if self.baked {
            return Err(RenderGraphError::AlreadyBaked.into());
        }

        let mut graph: DiGraph<NodeId, EdgeId> =
            DiGraph::with_capacity(self.nodes.len(), self.edges.len());
        let indices: Vec<NodeIndex> = (0..self.nodes.len())
            .map(|index| graph.add_node(NodeId(index)))
            .collect();
        for (index, edge) in self.edges.iter().enumerate() {
            graph.add_edge(
                indices[edge.source_node.0],
                indices[edge.dest_node.0],
                EdgeId(index),
            );
        }
        let order = petgraph::algo::toposort(&graph, None).map_err(|cycle| {
            RenderGraphError::Cycle {
                node: graph[cycle.node_id()],
            }
        })?;
        self.order = order.into_iter().map(|index| graph[index]).collect();

        // Edges between the same pair of nodes share one wait
        for edge in self.edges.iter() {
            let semaphore = self.nodes[edge.source_node.0].semaphore.handle();
            let waits = &mut self.nodes[edge.dest_node.0].waits;
            match waits.iter_mut().find(|wait| wait.node == edge.source_node) {
                Some(wait) => wait.stage |= edge.dest_stage(),
                None => waits.push(NodeWait {
                    node: edge.source_node,
                    semaphore,
                    stage: edge.dest_stage(),
                }),
            }
        }

        self.frame_semaphores = self
            .order
            .iter()
            .map(|id| self.nodes[id.0].semaphore.handle())
            .collect();
        self.baked = true;

        debug!(
            "Baked {} with execution order {:?}",
            self.name,
            self.order
                .iter()
                .map(|id| self.nodes[id.0].type_name)
                .collect::<Vec<&str>>()
        );
        Ok(())
    }

    fn frame_info(&self) -> FrameInfo {
        FrameInfo {
            current_frame: self.current_frame,
            frame_count: self.frame_count,
            frames_in_flight: self.frames_in_flight,
        }
    }

    /// Records and submits one frame
    pub fn execute(&mut self) -> Result<()> {
        if !self.baked {
            return Err(RenderGraphError::NotBaked.into());
        }
        let frame = self.frame_info();
        trace!(
            "Executing frame {} (slot {}) of {}",
            frame.frame_count,
            frame.current_frame,
            self.name
        );

        self.usages.clear(frame.current_frame);

        for &id in self.order.iter() {
            self.nodes[id.0].pre_render(id, frame, &mut self.usages)?;
        }

        self.wait()?;
        self.retire();

        for &id in self.order.iter() {
            self.nodes[id.0].internal_render(id, frame, &self.edges, &mut self.usages)?;
        }

        for &id in self.order.iter() {
            self.nodes[id.0].submit(frame)?;
        }

        for &id in self.order.iter() {
            self.nodes[id.0].post_render(id, frame, &mut self.usages)?;
        }

        self.frame_count += 1;
        self.current_frame = (self.frame_count % self.frames_in_flight as u64) as usize;
        Ok(())
    }

    /// Blocks until the frame which last used the current frame slot completed
    pub fn wait(&self) -> Result<()> {
        if !self.baked {
            return Err(RenderGraphError::NotBaked.into());
        }
        let target = self
            .frame_count
            .saturating_sub(self.frames_in_flight as u64);
        self.wait_for(target)
    }

    fn wait_for(&self, value: u64) -> Result<()> {
        if self.frame_semaphores.is_empty() {
            return Ok(());
        }
        let values = vec![value; self.frame_semaphores.len()];
        self.device
            .wait_semaphores(&self.frame_semaphores, &values, self.wait_timeout)?;
        Ok(())
    }

    /// Blocks until every submitted frame completed, then frees every retired resource
    pub fn wait_idle(&mut self) -> Result<()> {
        if self.baked && self.frame_count > self.frames_in_flight as u64 {
            self.wait_for(self.frame_count - 1)?;
        }
        self.drain_retired();
        drop(self.destroy_buffers.flush());
        drop(self.destroy_images.flush());
        Ok(())
    }

    /// Frees `state` once every frame recorded so far completed
    pub fn queue_destroy_buffer<A: Allocator>(&mut self, state: BufferState<A>) {
        self.destroy_buffers.push(Retired::Buffer(Box::new(state)));
    }

    /// Frees `state` once every frame recorded so far completed
    pub fn queue_destroy_image<A: Allocator>(&mut self, state: ImageState<A>) {
        self.destroy_images.push(Retired::Image(Box::new(state)));
    }

    fn drain_retired(&mut self) {
        for retired in self.retired.try_iter() {
            match retired {
                Retired::Buffer(_) => self.destroy_buffers.push(retired),
                Retired::Image(_) => self.destroy_images.push(retired),
            }
        }
    }

    fn retire(&mut self) {
        self.drain_retired();
        let buffers = self.destroy_buffers.rotate();
        let images = self.destroy_images.rotate();
        if !buffers.is_empty() || !images.is_empty() {
            trace!(
                "Freeing {} buffers and {} images retired by {}",
                buffers.len(),
                images.len(),
                self.name
            );
        }
    }
}

impl<D: Device> Drop for RenderGraph<D> {
    fn drop(&mut self) {
        if let Err(error) = self.device.wait_idle() {
            warn!("Failed to wait for the device while dropping {}: {}", self.name, error);
        }
        self.drain_retired();
        drop(self.destroy_buffers.flush());
        drop(self.destroy_images.flush());

        // Nodes may own resources which retire on drop
        self.nodes.clear();
        self.drain_retired();
        drop(self.destroy_buffers.flush());
        drop(self.destroy_images.flush());
    }
}
