//! Usage trackers
//!
//! A usage declares how one node touches buffers or images (access, stage and for images the
//! layout) and records, per frame in flight, which regions of which resources were touched during
//! the current frame. Edges compare the records of both of their ends to build barriers.
use std::collections::BTreeMap;

use ash::vk;
use kiln_containers::prelude::{ContainerError, PerFrame};

use crate::error::RenderGraphError;
use crate::node::NodeId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferUsageId(pub(crate) usize);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageUsageId(pub(crate) usize);

/// Byte range of a buffer
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BufferRegion {
    pub offset: vk::DeviceSize,
    pub size: vk::DeviceSize,
}

impl BufferRegion {
    pub fn new(offset: vk::DeviceSize, size: vk::DeviceSize) -> Self {
        Self { offset, size }
    }

    /// Covers the buffer from `offset` to its end
    pub fn from_offset(offset: vk::DeviceSize) -> Self {
        Self {
            offset,
            size: vk::WHOLE_SIZE,
        }
    }
}

/// Subresource range of an image
#[derive(Debug, Copy, Clone)]
pub struct ImageRegion {
    pub subresource_range: vk::ImageSubresourceRange,
}

impl From<vk::ImageSubresourceRange> for ImageRegion {
    fn from(subresource_range: vk::ImageSubresourceRange) -> Self {
        Self { subresource_range }
    }
}

/// Per frame record of touched regions, keyed by resource handle
#[derive(Debug)]
pub struct FrameSyncs<H, R> {
    frames: PerFrame<BTreeMap<H, Vec<R>>>,
}

impl<H: Ord + Copy, R: Copy> FrameSyncs<H, R> {
    fn new(frames_in_flight: usize) -> Result<Self, ContainerError> {
        Ok(Self {
            frames: PerFrame::try_new(frames_in_flight, |_| {
                Ok::<_, ContainerError>(BTreeMap::new())
            })?,
        })
    }

    /// Appends `region`, never merging with earlier regions of the same resource
    fn sync(&mut self, frame: usize, handle: H, region: R) {
        self.frames
            .get_mut(frame)
            .entry(handle)
            .or_default()
            .push(region);
    }

    fn clear(&mut self, frame: usize) {
        self.frames.get_mut(frame).clear();
    }

    fn get(&self, frame: usize) -> &BTreeMap<H, Vec<R>> {
        self.frames.get(frame)
    }
}

/// How a node accesses buffers
#[derive(Debug)]
pub struct BufferUsage {
    node: NodeId,
    access: vk::AccessFlags2,
    stage: vk::PipelineStageFlags2,
    syncs: FrameSyncs<vk::Buffer, BufferRegion>,
}

impl BufferUsage {
    pub(crate) fn new(
        node: NodeId,
        access: vk::AccessFlags2,
        stage: vk::PipelineStageFlags2,
        frames_in_flight: usize,
    ) -> Result<Self, ContainerError> {
        Ok(Self {
            node,
            access,
            stage,
            syncs: FrameSyncs::new(frames_in_flight)?,
        })
    }

    /// Node owning the usage
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn access(&self) -> vk::AccessFlags2 {
        self.access
    }

    pub fn stage(&self) -> vk::PipelineStageFlags2 {
        self.stage
    }

    /// Regions recorded during `frame`
    pub fn syncs(&self, frame: usize) -> &BTreeMap<vk::Buffer, Vec<BufferRegion>> {
        self.syncs.get(frame)
    }
}

/// How a node accesses images, including the layout it expects them in
#[derive(Debug)]
pub struct ImageUsage {
    node: NodeId,
    layout: vk::ImageLayout,
    access: vk::AccessFlags2,
    stage: vk::PipelineStageFlags2,
    syncs: FrameSyncs<vk::Image, ImageRegion>,
}

impl ImageUsage {
    pub(crate) fn new(
        node: NodeId,
        layout: vk::ImageLayout,
        access: vk::AccessFlags2,
        stage: vk::PipelineStageFlags2,
        frames_in_flight: usize,
    ) -> Result<Self, ContainerError> {
        Ok(Self {
            node,
            layout,
            access,
            stage,
            syncs: FrameSyncs::new(frames_in_flight)?,
        })
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn layout(&self) -> vk::ImageLayout {
        self.layout
    }

    pub fn access(&self) -> vk::AccessFlags2 {
        self.access
    }

    pub fn stage(&self) -> vk::PipelineStageFlags2 {
        self.stage
    }

    pub fn syncs(&self, frame: usize) -> &BTreeMap<vk::Image, Vec<ImageRegion>> {
        self.syncs.get(frame)
    }
}

/// Arena of every usage in a graph
#[derive(Debug, Default)]
pub struct Usages {
    buffers: Vec<BufferUsage>,
    images: Vec<ImageUsage>,
}

impl Usages {
    pub(crate) fn add_buffer(&mut self, usage: BufferUsage) -> BufferUsageId {
        self.buffers.push(usage);
        BufferUsageId(self.buffers.len() - 1)
    }

    pub(crate) fn add_image(&mut self, usage: ImageUsage) -> ImageUsageId {
        self.images.push(usage);
        ImageUsageId(self.images.len() - 1)
    }

    pub fn buffer(&self, id: BufferUsageId) -> Result<&BufferUsage, RenderGraphError> {
        self.buffers.get(id.0).ok_or(RenderGraphError::UnknownUsage)
    }

    pub fn image(&self, id: ImageUsageId) -> Result<&ImageUsage, RenderGraphError> {
        self.images.get(id.0).ok_or(RenderGraphError::UnknownUsage)
    }

    /// Amount of buffer and image usages, used to roll back a failed node construction
    pub(crate) fn watermark(&self) -> (usize, usize) {
        (self.buffers.len(), self.images.len())
    }

    pub(crate) fn truncate(&mut self, (buffers, images): (usize, usize)) {
        self.buffers.truncate(buffers);
        self.images.truncate(images);
    }

    /// Empties the record of `frame` for every usage
    pub(crate) fn clear(&mut self, frame: usize) {
        for usage in self.buffers.iter_mut() {
            usage.syncs.clear(frame);
        }
        for usage in self.images.iter_mut() {
            usage.syncs.clear(frame);
        }
    }

    pub(crate) fn sync_buffer(
        &mut self,
        node: NodeId,
        id: BufferUsageId,
        frame: usize,
        buffer: vk::Buffer,
        region: BufferRegion,
    ) -> Result<(), RenderGraphError> {
        let usage = self
            .buffers
            .get_mut(id.0)
            .ok_or(RenderGraphError::UnknownUsage)?;
        if usage.node != node {
            return Err(RenderGraphError::UsageNotOwned);
        }
        usage.syncs.sync(frame, buffer, region);
        Ok(())
    }

    pub(crate) fn sync_image(
        &mut self,
        node: NodeId,
        id: ImageUsageId,
        frame: usize,
        image: vk::Image,
        region: ImageRegion,
    ) -> Result<(), RenderGraphError> {
        let usage = self
            .images
            .get_mut(id.0)
            .ok_or(RenderGraphError::UnknownUsage)?;
        if usage.node != node {
            return Err(RenderGraphError::UsageNotOwned);
        }
        usage.syncs.sync(frame, image, region);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn usages() -> (Usages, BufferUsageId, ImageUsageId) {
        let mut usages = Usages::default();
        let buffer = usages.add_buffer(
            BufferUsage::new(
                NodeId(0),
                vk::AccessFlags2::TRANSFER_WRITE,
                vk::PipelineStageFlags2::TRANSFER,
                2,
            )
            .unwrap(),
        );
        let image = usages.add_image(
            ImageUsage::new(
                NodeId(0),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::AccessFlags2::TRANSFER_WRITE,
                vk::PipelineStageFlags2::TRANSFER,
                2,
            )
            .unwrap(),
        );
        (usages, buffer, image)
    }

    #[test]
    fn repeated_syncs_append() {
        let (mut usages, id, _) = usages();
        let buffer = vk::Buffer::from_raw(1);
        usages
            .sync_buffer(NodeId(0), id, 0, buffer, BufferRegion::new(0, 16))
            .unwrap();
        usages
            .sync_buffer(NodeId(0), id, 0, buffer, BufferRegion::new(64, 16))
            .unwrap();
        let syncs = usages.buffer(id).unwrap().syncs(0);
        assert_eq!(
            syncs.get(&buffer).unwrap(),
            &vec![BufferRegion::new(0, 16), BufferRegion::new(64, 16)]
        );
        assert!(usages.buffer(id).unwrap().syncs(1).is_empty());
    }

    #[test]
    fn clear_is_idempotent() {
        let (mut usages, buffer_id, image_id) = usages();
        usages
            .sync_buffer(
                NodeId(0),
                buffer_id,
                1,
                vk::Buffer::from_raw(1),
                BufferRegion::new(0, 4),
            )
            .unwrap();
        usages
            .sync_image(
                NodeId(0),
                image_id,
                1,
                vk::Image::from_raw(2),
                vk::ImageSubresourceRange::default().into(),
            )
            .unwrap();
        usages.clear(1);
        usages.clear(1);
        assert!(usages.buffer(buffer_id).unwrap().syncs(1).is_empty());
        assert!(usages.image(image_id).unwrap().syncs(1).is_empty());
    }

    #[test]
    fn clearing_one_frame_keeps_the_other() {
        let (mut usages, id, _) = usages();
        let buffer = vk::Buffer::from_raw(1);
        usages
            .sync_buffer(NodeId(0), id, 0, buffer, BufferRegion::new(0, 4))
            .unwrap();
        usages
            .sync_buffer(NodeId(0), id, 1, buffer, BufferRegion::new(0, 4))
            .unwrap();
        usages.clear(0);
        assert!(usages.buffer(id).unwrap().syncs(0).is_empty());
        assert_eq!(usages.buffer(id).unwrap().syncs(1).len(), 1);
    }

    #[test]
    fn foreign_usage_rejected() {
        let (mut usages, buffer_id, image_id) = usages();
        assert_eq!(
            usages.sync_buffer(
                NodeId(1),
                buffer_id,
                0,
                vk::Buffer::from_raw(1),
                BufferRegion::new(0, 4)
            ),
            Err(RenderGraphError::UsageNotOwned)
        );
        assert_eq!(
            usages.sync_image(
                NodeId(0),
                ImageUsageId(image_id.0 + 1),
                0,
                vk::Image::from_raw(1),
                vk::ImageSubresourceRange::default().into()
            ),
            Err(RenderGraphError::UnknownUsage)
        );
    }

    #[test]
    fn truncate_rolls_back() {
        let (mut usages, _, _) = usages();
        let watermark = usages.watermark();
        usages.add_buffer(
            BufferUsage::new(
                NodeId(1),
                vk::AccessFlags2::SHADER_READ,
                vk::PipelineStageFlags2::FRAGMENT_SHADER,
                2,
            )
            .unwrap(),
        );
        usages.truncate(watermark);
        assert_eq!(usages.watermark(), (1, 1));
    }
}
