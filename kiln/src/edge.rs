//! Edges connect a usage of one node to a usage of another
//!
//! Every frame, an edge turns the regions both of its ends recorded into barriers. Same queue
//! family edges emit one full barrier per region from the source node. Cross family edges split
//! the barrier into a release recorded by the source node and a matching acquire recorded by the
//! destination node.
use ash::vk;
use kiln_vk::sync::{BufferBarrier, DependencyInfo, ImageBarrier};

use crate::node::NodeId;
use crate::usage::{BufferUsageId, ImageUsageId, Usages};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub(crate) usize);

/// Dependency between two buffer usages
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BufferEdge {
    pub source: BufferUsageId,
    pub dest: BufferUsageId,
}

impl BufferEdge {
    pub fn new(source: BufferUsageId, dest: BufferUsageId) -> Self {
        Self { source, dest }
    }
}

/// Dependency between two image usages
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ImageEdge {
    pub source: ImageUsageId,
    pub dest: ImageUsageId,
}

impl ImageEdge {
    pub fn new(source: ImageUsageId, dest: ImageUsageId) -> Self {
        Self { source, dest }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Edge {
    Buffer(BufferEdge),
    Image(ImageEdge),
}

impl From<BufferEdge> for Edge {
    fn from(edge: BufferEdge) -> Self {
        Edge::Buffer(edge)
    }
}

impl From<ImageEdge> for Edge {
    fn from(edge: ImageEdge) -> Self {
        Edge::Image(edge)
    }
}

/// Barriers collected for a single `vkCmdPipelineBarrier2`
#[derive(Debug, Default, Clone)]
pub struct Barriers {
    pub buffer_barriers: Vec<BufferBarrier>,
    pub image_barriers: Vec<ImageBarrier>,
}

impl Barriers {
    pub fn is_empty(&self) -> bool {
        self.buffer_barriers.is_empty() && self.image_barriers.is_empty()
    }

    pub fn dependency_info(&self) -> DependencyInfo<'_> {
        DependencyInfo {
            buffer_barriers: &self.buffer_barriers,
            image_barriers: &self.image_barriers,
        }
    }
}

/// An edge whose ends were resolved against the graph when it was added
///
/// Returned by [`crate::RenderGraph::edge`].
#[derive(Debug, Clone)]
pub struct EdgeEntry {
    pub(crate) edge: Edge,
    pub(crate) source_node: NodeId,
    pub(crate) dest_node: NodeId,
    pub(crate) source_family: u32,
    pub(crate) dest_family: u32,
    pub(crate) source_stage: vk::PipelineStageFlags2,
    pub(crate) dest_stage: vk::PipelineStageFlags2,
}

impl EdgeEntry {
    pub fn edge(&self) -> Edge {
        self.edge
    }

    /// Node owning the producing usage
    pub fn source_node(&self) -> NodeId {
        self.source_node
    }

    /// Node owning the consuming usage
    pub fn dest_node(&self) -> NodeId {
        self.dest_node
    }

    /// Stage of the producing usage, the source scope of the edge's barriers
    pub fn source_stage(&self) -> vk::PipelineStageFlags2 {
        self.source_stage
    }

    /// Stage of the consuming usage, also the stage the consumer's semaphore wait blocks
    pub fn dest_stage(&self) -> vk::PipelineStageFlags2 {
        self.dest_stage
    }

    /// Whether the resource changes queue family along this edge
    pub fn is_cross_queue(&self) -> bool {
        self.source_family != self.dest_family
    }

    /// Barriers recorded by the source node after it rendered `frame`
    ///
    /// Full transitions on the same family, release halves across families.
    pub(crate) fn source_barriers(&self, usages: &Usages, frame: usize, out: &mut Barriers) {
        let cross_queue = self.is_cross_queue();
        match self.edge {
            Edge::Buffer(edge) => {
                let (Ok(source), Ok(dest)) = (usages.buffer(edge.source), usages.buffer(edge.dest))
                else {
                    return;
                };
                let dest_syncs = dest.syncs(frame);
                for (buffer, regions) in source.syncs(frame) {
                    if !dest_syncs.contains_key(buffer) {
                        continue;
                    }
                    for region in regions {
                        out.buffer_barriers.push(BufferBarrier {
                            src_stage_mask: source.stage(),
                            src_access_mask: source.access(),
                            dst_stage_mask: if cross_queue {
                                vk::PipelineStageFlags2::NONE
                            } else {
                                dest.stage()
                            },
                            dst_access_mask: if cross_queue {
                                vk::AccessFlags2::NONE
                            } else {
                                dest.access()
                            },
                            src_queue_family_index: self.source_family,
                            dst_queue_family_index: self.dest_family,
                            buffer: *buffer,
                            offset: region.offset,
                            size: region.size,
                        });
                    }
                }
            }
            Edge::Image(edge) => {
                let (Ok(source), Ok(dest)) = (usages.image(edge.source), usages.image(edge.dest))
                else {
                    return;
                };
                let dest_syncs = dest.syncs(frame);
                for (image, regions) in source.syncs(frame) {
                    if !dest_syncs.contains_key(image) {
                        continue;
                    }
                    for region in regions {
                        out.image_barriers.push(ImageBarrier {
                            src_stage_mask: source.stage(),
                            src_access_mask: source.access(),
                            dst_stage_mask: if cross_queue {
                                vk::PipelineStageFlags2::NONE
                            } else {
                                dest.stage()
                            },
                            dst_access_mask: if cross_queue {
                                vk::AccessFlags2::NONE
                            } else {
                                dest.access()
                            },
                            old_layout: source.layout(),
                            new_layout: dest.layout(),
                            src_queue_family_index: self.source_family,
                            dst_queue_family_index: self.dest_family,
                            image: *image,
                            subresource_range: region.subresource_range,
                        });
                    }
                }
            }
        }
    }

    /// Barriers recorded by the destination node before it renders `frame`
    ///
    /// Only cross family edges emit anything: the acquire half of every release, built from the
    /// source's regions so both halves match.
    pub(crate) fn dest_barriers(&self, usages: &Usages, frame: usize, out: &mut Barriers) {
        if !self.is_cross_queue() {
            return;
        }
        match self.edge {
            Edge::Buffer(edge) => {
                let (Ok(source), Ok(dest)) = (usages.buffer(edge.source), usages.buffer(edge.dest))
                else {
                    return;
                };
                let dest_syncs = dest.syncs(frame);
                for (buffer, regions) in source.syncs(frame) {
                    if !dest_syncs.contains_key(buffer) {
                        continue;
                    }
                    for region in regions {
                        out.buffer_barriers.push(BufferBarrier {
                            src_stage_mask: vk::PipelineStageFlags2::NONE,
                            src_access_mask: vk::AccessFlags2::NONE,
                            dst_stage_mask: dest.stage(),
                            dst_access_mask: dest.access(),
                            src_queue_family_index: self.source_family,
                            dst_queue_family_index: self.dest_family,
                            buffer: *buffer,
                            offset: region.offset,
                            size: region.size,
                        });
                    }
                }
            }
            Edge::Image(edge) => {
                let (Ok(source), Ok(dest)) = (usages.image(edge.source), usages.image(edge.dest))
                else {
                    return;
                };
                let dest_syncs = dest.syncs(frame);
                for (image, regions) in source.syncs(frame) {
                    if !dest_syncs.contains_key(image) {
                        continue;
                    }
                    for region in regions {
                        out.image_barriers.push(ImageBarrier {
                            src_stage_mask: vk::PipelineStageFlags2::NONE,
                            src_access_mask: vk::AccessFlags2::NONE,
                            dst_stage_mask: dest.stage(),
                            dst_access_mask: dest.access(),
                            old_layout: source.layout(),
                            new_layout: dest.layout(),
                            src_queue_family_index: self.source_family,
                            dst_queue_family_index: self.dest_family,
                            image: *image,
                            subresource_range: region.subresource_range,
                        });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::{BufferRegion, BufferUsage, ImageUsage};
    use ash::vk::Handle;

    struct Fixture {
        usages: Usages,
        buffer_edge: EdgeEntry,
        image_edge: EdgeEntry,
        producer: (BufferUsageId, ImageUsageId),
        consumer: (BufferUsageId, ImageUsageId),
    }

    fn fixture(source_family: u32, dest_family: u32) -> Fixture {
        let mut usages = Usages::default();
        let producer = (
            usages.add_buffer(
                BufferUsage::new(
                    NodeId(0),
                    vk::AccessFlags2::TRANSFER_WRITE,
                    vk::PipelineStageFlags2::TRANSFER,
                    2,
                )
                .unwrap(),
            ),
            usages.add_image(
                ImageUsage::new(
                    NodeId(0),
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::AccessFlags2::TRANSFER_WRITE,
                    vk::PipelineStageFlags2::TRANSFER,
                    2,
                )
                .unwrap(),
            ),
        );
        let consumer = (
            usages.add_buffer(
                BufferUsage::new(
                    NodeId(1),
                    vk::AccessFlags2::VERTEX_ATTRIBUTE_READ,
                    vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT,
                    2,
                )
                .unwrap(),
            ),
            usages.add_image(
                ImageUsage::new(
                    NodeId(1),
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    vk::AccessFlags2::SHADER_SAMPLED_READ,
                    vk::PipelineStageFlags2::FRAGMENT_SHADER,
                    2,
                )
                .unwrap(),
            ),
        );
        let entry = |edge: Edge| EdgeEntry {
            edge,
            source_node: NodeId(0),
            dest_node: NodeId(1),
            source_family,
            dest_family,
            source_stage: vk::PipelineStageFlags2::TRANSFER,
            dest_stage: vk::PipelineStageFlags2::FRAGMENT_SHADER,
        };
        Fixture {
            buffer_edge: entry(BufferEdge::new(producer.0, consumer.0).into()),
            image_edge: entry(ImageEdge::new(producer.1, consumer.1).into()),
            usages,
            producer,
            consumer,
        }
    }

    fn color_range() -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        }
    }

    #[test]
    fn same_family_full_transition() {
        let mut fixture = fixture(0, 0);
        let buffer = vk::Buffer::from_raw(10);
        let region = BufferRegion::new(0, 256);
        fixture
            .usages
            .sync_buffer(NodeId(0), fixture.producer.0, 0, buffer, region)
            .unwrap();
        fixture
            .usages
            .sync_buffer(NodeId(1), fixture.consumer.0, 0, buffer, region)
            .unwrap();

        let mut barriers = Barriers::default();
        fixture
            .buffer_edge
            .source_barriers(&fixture.usages, 0, &mut barriers);
        assert_eq!(
            barriers.buffer_barriers,
            vec![BufferBarrier {
                src_stage_mask: vk::PipelineStageFlags2::TRANSFER,
                src_access_mask: vk::AccessFlags2::TRANSFER_WRITE,
                dst_stage_mask: vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT,
                dst_access_mask: vk::AccessFlags2::VERTEX_ATTRIBUTE_READ,
                src_queue_family_index: 0,
                dst_queue_family_index: 0,
                buffer,
                offset: 0,
                size: 256,
            }]
        );

        let mut acquire = Barriers::default();
        fixture
            .buffer_edge
            .dest_barriers(&fixture.usages, 0, &mut acquire);
        assert!(acquire.is_empty());
    }

    #[test]
    fn cross_family_release_and_acquire() {
        let mut fixture = fixture(1, 0);
        let image = vk::Image::from_raw(20);
        fixture
            .usages
            .sync_image(NodeId(0), fixture.producer.1, 1, image, color_range().into())
            .unwrap();
        fixture
            .usages
            .sync_image(NodeId(1), fixture.consumer.1, 1, image, color_range().into())
            .unwrap();

        let mut release = Barriers::default();
        fixture
            .image_edge
            .source_barriers(&fixture.usages, 1, &mut release);
        let mut acquire = Barriers::default();
        fixture
            .image_edge
            .dest_barriers(&fixture.usages, 1, &mut acquire);

        assert_eq!(release.image_barriers.len(), 1);
        assert_eq!(acquire.image_barriers.len(), 1);
        let release = release.image_barriers[0];
        let acquire = acquire.image_barriers[0];

        assert!(release.is_ownership_transfer());
        assert_eq!(release.src_queue_family_index, 1);
        assert_eq!(release.dst_queue_family_index, 0);
        assert_eq!(release.src_access_mask, vk::AccessFlags2::TRANSFER_WRITE);
        assert_eq!(release.dst_access_mask, vk::AccessFlags2::NONE);
        assert_eq!(release.dst_stage_mask, vk::PipelineStageFlags2::NONE);

        assert_eq!(acquire.src_queue_family_index, 1);
        assert_eq!(acquire.dst_queue_family_index, 0);
        assert_eq!(acquire.src_access_mask, vk::AccessFlags2::NONE);
        assert_eq!(acquire.src_stage_mask, vk::PipelineStageFlags2::NONE);
        assert_eq!(acquire.dst_access_mask, vk::AccessFlags2::SHADER_SAMPLED_READ);

        for barrier in [release, acquire] {
            assert_eq!(barrier.old_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
            assert_eq!(barrier.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
            assert_eq!(barrier.image, image);
        }
    }

    #[test]
    fn disjoint_ranges_get_their_own_barrier() {
        let mut fixture = fixture(0, 0);
        let buffer = vk::Buffer::from_raw(10);
        for region in [BufferRegion::new(0, 64), BufferRegion::new(128, 64)] {
            fixture
                .usages
                .sync_buffer(NodeId(0), fixture.producer.0, 0, buffer, region)
                .unwrap();
        }
        fixture
            .usages
            .sync_buffer(
                NodeId(1),
                fixture.consumer.0,
                0,
                buffer,
                BufferRegion::new(0, 192),
            )
            .unwrap();

        let mut barriers = Barriers::default();
        fixture
            .buffer_edge
            .source_barriers(&fixture.usages, 0, &mut barriers);
        let ranges: Vec<(u64, u64)> = barriers
            .buffer_barriers
            .iter()
            .map(|barrier| (barrier.offset, barrier.size))
            .collect();
        assert_eq!(ranges, vec![(0, 64), (128, 64)]);
    }

    #[test]
    fn one_sided_resources_are_skipped() {
        let mut fixture = fixture(1, 0);
        fixture
            .usages
            .sync_buffer(
                NodeId(0),
                fixture.producer.0,
                0,
                vk::Buffer::from_raw(10),
                BufferRegion::new(0, 4),
            )
            .unwrap();
        fixture
            .usages
            .sync_buffer(
                NodeId(1),
                fixture.consumer.0,
                0,
                vk::Buffer::from_raw(11),
                BufferRegion::new(0, 4),
            )
            .unwrap();

        let mut barriers = Barriers::default();
        fixture
            .buffer_edge
            .source_barriers(&fixture.usages, 0, &mut barriers);
        fixture
            .buffer_edge
            .dest_barriers(&fixture.usages, 0, &mut barriers);
        assert!(barriers.is_empty());
    }

    #[test]
    fn other_frames_are_ignored() {
        let mut fixture = fixture(0, 0);
        let buffer = vk::Buffer::from_raw(10);
        fixture
            .usages
            .sync_buffer(NodeId(0), fixture.producer.0, 0, buffer, BufferRegion::new(0, 4))
            .unwrap();
        fixture
            .usages
            .sync_buffer(NodeId(1), fixture.consumer.0, 1, buffer, BufferRegion::new(0, 4))
            .unwrap();

        let mut barriers = Barriers::default();
        fixture
            .buffer_edge
            .source_barriers(&fixture.usages, 0, &mut barriers);
        assert!(barriers.is_empty());
    }
}
