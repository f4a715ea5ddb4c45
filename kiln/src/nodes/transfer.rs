//! # Transfer node
//! Uploads host data into buffers and images. Every transfer is staged on the host first and
//! only written into the frame's staging buffer during [`Node::render`], after the graph waited
//! for the frame which last used that staging buffer.
//!
//! Uploads go through a [`TransferQueue`], which other nodes may hold on to and feed from their
//! own [`Node::pre_render`].
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use ash::vk;
use derivative::Derivative;
use kiln_containers::prelude::PerFrame;
use kiln_vk::allocators::{Allocator, BufferCreateInfo, MemoryLocation};
use kiln_vk::device::Device;
use kiln_vk::sync::{DependencyInfo, ImageBarrier};
use kiln_vk::util::align;
use kiln_vk::util::format::texel_size;
use kiln_vk::VkError;
use tracing::trace;

use crate::error::RenderGraphError;
use crate::node::{FrameContext, Node, NodeBuilder, RenderContext};
use crate::resource::Buffer;
use crate::usage::{BufferRegion, BufferUsageId, ImageUsageId};

/// Alignment of every staged copy inside the staging buffer
const STAGING_ALIGNMENT: vk::DeviceSize = 4;

#[derive(Debug, Clone)]
pub struct TransferNodeCreateInfo<'a, A: Allocator> {
    pub allocator: &'a A,
    /// Size in bytes of each staging buffer, bounds the bytes transferred per frame
    pub staging_size: vk::DeviceSize,
    pub name: &'a str,
}

#[derive(Debug, Clone, Copy)]
struct BufferTransfer {
    dst: vk::Buffer,
    copy: vk::BufferCopy,
}

#[derive(Debug, Clone)]
struct ImageTransfer {
    dst: vk::Image,
    range: vk::ImageSubresourceRange,
    copies: Vec<vk::BufferImageCopy>,
}

fn subresource_range(layers: vk::ImageSubresourceLayers) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: layers.aspect_mask,
        base_mip_level: layers.mip_level,
        level_count: 1,
        base_array_layer: layers.base_array_layer,
        layer_count: layers.layer_count,
    }
}

fn is_empty(extent: vk::Extent3D) -> bool {
    extent.width == 0 || extent.height == 0 || extent.depth == 0
}

/// Bytes spanned by a copy of `extent` texels out of rows of `row_length` texels and slices of
/// `image_height` rows, starting at the copy's first texel. Extents and `layer_count` must be
/// non zero.
fn copy_span(
    extent: vk::Extent3D,
    layer_count: u32,
    row_length: u32,
    image_height: u32,
    texel_size: u32,
) -> Option<vk::DeviceSize> {
    let row = (row_length as u64).checked_mul(texel_size as u64)?;
    let slice = (image_height as u64).checked_mul(row)?;
    let layer = (extent.depth as u64).checked_mul(slice)?;
    ((layer_count as u64 - 1).checked_mul(layer)?)
        .checked_add((extent.depth as u64 - 1).checked_mul(slice)?)?
        .checked_add((extent.height as u64 - 1).checked_mul(row)?)?
        .checked_add((extent.width as u64).checked_mul(texel_size as u64)?)
}

/// Uploads waiting for the next render of a [`TransferNode`]
#[derive(Derivative, Default)]
#[derivative(Debug)]
struct PendingTransfers {
    #[derivative(Debug = "ignore")]
    staged: Vec<u8>,
    buffer_transfers: Vec<BufferTransfer>,
    image_transfers: Vec<ImageTransfer>,
}

impl PendingTransfers {
    fn is_empty(&self) -> bool {
        self.buffer_transfers.is_empty() && self.image_transfers.is_empty()
    }

    /// Appends `data` to the staged bytes, returns its offset in the staging buffer
    fn stage(
        &mut self,
        staging_size: vk::DeviceSize,
        data: &[u8],
    ) -> Result<vk::DeviceSize, VkError> {
        let offset = align(self.staged.len() as vk::DeviceSize, STAGING_ALIGNMENT);
        let end = offset
            .checked_add(data.len() as vk::DeviceSize)
            .ok_or(VkError::InsufficientSpace)?;
        if end > staging_size {
            return Err(VkError::InsufficientSpace);
        }
        self.staged.resize(offset as usize, 0);
        self.staged.extend_from_slice(data);
        Ok(offset)
    }
}

/// Cloneable handle queueing uploads on a [`TransferNode`]
///
/// An upload lands in the frame whose [`Node::render`] of the transfer node runs next, so uploads
/// queued from another node's [`Node::pre_render`] are recorded in that same frame.
#[derive(Debug, Clone)]
pub struct TransferQueue {
    staging_size: vk::DeviceSize,
    pending: Arc<Mutex<PendingTransfers>>,
}

impl TransferQueue {
    fn new(staging_size: vk::DeviceSize) -> Self {
        Self {
            staging_size,
            pending: Arc::new(Mutex::new(PendingTransfers::default())),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, PendingTransfers>, VkError> {
        Ok(self.pending.lock()?)
    }

    pub fn staging_size(&self) -> vk::DeviceSize {
        self.staging_size
    }

    /// Bytes staged for the next render, including alignment padding
    pub fn staged_bytes(&self) -> Result<vk::DeviceSize> {
        Ok(self.lock()?.staged.len() as vk::DeviceSize)
    }

    /// Whether the next render has nothing to record
    pub fn is_idle(&self) -> Result<bool> {
        Ok(self.lock()?.is_empty())
    }

    /// Copies `data` into `buffer` at `offset`. Empty transfers are ignored.
    pub fn transfer_buffer(
        &self,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        data: &[u8],
    ) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let mut pending = self.lock()?;
        let src_offset = pending.stage(self.staging_size, data)?;
        pending.buffer_transfers.push(BufferTransfer {
            dst: buffer,
            copy: vk::BufferCopy {
                src_offset,
                dst_offset: offset,
                size: data.len() as vk::DeviceSize,
            },
        });
        Ok(())
    }

    /// Copies tightly packed `data` into a single region of `image`
    ///
    /// `data` must hold `extent` texels of `format` for every layer, extra bytes are not staged.
    pub fn transfer_image(
        &self,
        image: vk::Image,
        format: vk::Format,
        offset: vk::Offset3D,
        extent: vk::Extent3D,
        layers: vk::ImageSubresourceLayers,
        data: &[u8],
    ) -> Result<()> {
        if is_empty(extent) || layers.layer_count == 0 {
            return Err(RenderGraphError::EmptyTransfer.into());
        }
        let texel_size =
            texel_size(format).ok_or(RenderGraphError::UnsupportedFormat { format })?;
        let required = copy_span(
            extent,
            layers.layer_count,
            extent.width,
            extent.height,
            texel_size,
        )
        .ok_or(VkError::InsufficientSpace)?;
        if (data.len() as vk::DeviceSize) < required {
            return Err(VkError::InsufficientSpace.into());
        }

        let mut pending = self.lock()?;
        let buffer_offset = pending.stage(self.staging_size, &data[..required as usize])?;
        pending.image_transfers.push(ImageTransfer {
            dst: image,
            range: subresource_range(layers),
            copies: vec![vk::BufferImageCopy {
                buffer_offset,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: layers,
                image_offset: offset,
                image_extent: extent,
            }],
        });
        Ok(())
    }

    /// Copies several regions out of `data`, which holds a whole image of `total_extent` texels
    ///
    /// Each copy's `buffer_offset` is relative to the start of `data`, every copy must end inside
    /// `data`.
    pub fn transfer_image_regions(
        &self,
        image: vk::Image,
        format: vk::Format,
        copies: &[vk::BufferImageCopy],
        total_extent: vk::Extent3D,
        data: &[u8],
    ) -> Result<()> {
        if copies.is_empty()
            || is_empty(total_extent)
            || copies.iter().any(|copy| {
                is_empty(copy.image_extent) || copy.image_subresource.layer_count == 0
            })
        {
            return Err(RenderGraphError::EmptyTransfer.into());
        }
        let texel_size =
            texel_size(format).ok_or(RenderGraphError::UnsupportedFormat { format })?;
        let available = data.len() as vk::DeviceSize;
        let required = copy_span(
            total_extent,
            1,
            total_extent.width,
            total_extent.height,
            texel_size,
        )
        .ok_or(VkError::InsufficientSpace)?;
        if available < required {
            return Err(VkError::InsufficientSpace.into());
        }
        for copy in copies {
            let end = copy_span(
                copy.image_extent,
                copy.image_subresource.layer_count,
                total_extent.width,
                total_extent.height,
                texel_size,
            )
            .and_then(|span| span.checked_add(copy.buffer_offset));
            if end.map_or(true, |end| end > available) {
                return Err(VkError::InsufficientSpace.into());
            }
        }

        let mut pending = self.lock()?;
        let start = pending.stage(self.staging_size, data)?;
        let mut range = subresource_range(copies[0].image_subresource);
        let copies = copies
            .iter()
            .map(|copy| {
                let copy_range = subresource_range(copy.image_subresource);
                let mip_end = (range.base_mip_level + range.level_count)
                    .max(copy_range.base_mip_level + copy_range.level_count);
                let layer_end = (range.base_array_layer + range.layer_count)
                    .max(copy_range.base_array_layer + copy_range.layer_count);
                range.aspect_mask |= copy_range.aspect_mask;
                range.base_mip_level = range.base_mip_level.min(copy_range.base_mip_level);
                range.base_array_layer = range.base_array_layer.min(copy_range.base_array_layer);
                range.level_count = mip_end - range.base_mip_level;
                range.layer_count = layer_end - range.base_array_layer;
                vk::BufferImageCopy {
                    buffer_offset: start + copy.buffer_offset,
                    buffer_row_length: total_extent.width,
                    buffer_image_height: total_extent.height,
                    ..*copy
                }
            })
            .collect();
        pending.image_transfers.push(ImageTransfer {
            dst: image,
            range,
            copies,
        });
        Ok(())
    }
}

/// Copies host data into buffers and images on the node's queue
///
/// Uploads are queued through [`TransferNode::queue`]. Destinations are synced through
/// [`TransferNode::buffer_usage`] (`TRANSFER_WRITE`) and [`TransferNode::image_usage`]
/// (`TRANSFER_DST_OPTIMAL`), connect those to the consumers. Uploads queued before the frame are
/// synced in [`Node::pre_render`], later ones in [`Node::render`].
#[derive(Derivative)]
#[derivative(Debug)]
pub struct TransferNode<A: Allocator> {
    staging: PerFrame<Buffer<A>>,
    buffer_usage: BufferUsageId,
    image_usage: ImageUsageId,
    queue: TransferQueue,
    /// Buffer and image transfers already synced by this frame's pre render
    synced: (usize, usize),
}

impl<A: Allocator> TransferNode<A> {
    pub fn new<D: Device>(
        builder: &mut NodeBuilder<D>,
        transfer_ci: TransferNodeCreateInfo<A>,
    ) -> Result<Self> {
        let retirer = builder.retirer();
        let staging = PerFrame::try_new(builder.frames_in_flight(), |frame| -> Result<Buffer<A>> {
            Ok(Buffer::new(
                transfer_ci.allocator,
                &BufferCreateInfo {
                    name: &format!("{} staging {}", transfer_ci.name, frame),
                    size: transfer_ci.staging_size,
                    usage_flags: vk::BufferUsageFlags::TRANSFER_SRC,
                    location: MemoryLocation::CpuToGpu,
                },
                retirer.clone(),
            )?)
        })?;
        let buffer_usage = builder.buffer_usage(
            vk::AccessFlags2::TRANSFER_WRITE,
            vk::PipelineStageFlags2::TRANSFER,
        )?;
        let image_usage = builder.image_usage(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::AccessFlags2::TRANSFER_WRITE,
            vk::PipelineStageFlags2::TRANSFER,
        )?;
        Ok(Self {
            staging,
            buffer_usage,
            image_usage,
            queue: TransferQueue::new(transfer_ci.staging_size),
            synced: (0, 0),
        })
    }

    pub fn buffer_usage(&self) -> BufferUsageId {
        self.buffer_usage
    }

    pub fn image_usage(&self) -> ImageUsageId {
        self.image_usage
    }

    /// Queue feeding this node, clone it to upload from elsewhere
    pub fn queue(&self) -> &TransferQueue {
        &self.queue
    }

    /// Staging buffer used by frame slot `frame`
    pub fn staging_buffer(&self, frame: usize) -> vk::Buffer {
        self.staging.get(frame).handle()
    }
}

impl<D: Device, A: Allocator> Node<D> for TransferNode<A> {
    fn pre_render(&mut self, ctx: &mut FrameContext<D>) -> Result<()> {
        let pending = self.queue.lock()?;
        for transfer in pending.buffer_transfers.iter() {
            ctx.sync_buffer(
                self.buffer_usage,
                transfer.dst,
                BufferRegion::new(transfer.copy.dst_offset, transfer.copy.size),
            )?;
        }
        for transfer in pending.image_transfers.iter() {
            ctx.sync_image(self.image_usage, transfer.dst, transfer.range)?;
        }
        self.synced = (pending.buffer_transfers.len(), pending.image_transfers.len());
        Ok(())
    }

    fn render(&mut self, ctx: &mut RenderContext<D>) -> Result<()> {
        let pending = std::mem::take(&mut *self.queue.lock()?);
        let (synced_buffers, synced_images) = std::mem::take(&mut self.synced);
        // queued after pre render, still in time for the output edges
        for transfer in pending.buffer_transfers.iter().skip(synced_buffers) {
            ctx.sync_buffer(
                self.buffer_usage,
                transfer.dst,
                BufferRegion::new(transfer.copy.dst_offset, transfer.copy.size),
            )?;
        }
        for transfer in pending.image_transfers.iter().skip(synced_images) {
            ctx.sync_image(self.image_usage, transfer.dst, transfer.range)?;
        }
        if pending.is_empty() {
            return Ok(());
        }
        trace!(
            "Recording {} buffer and {} image transfers, {} staged bytes",
            pending.buffer_transfers.len(),
            pending.image_transfers.len(),
            pending.staged.len()
        );

        let staging = self.staging.get_mut(ctx.current_frame());
        staging.write(0, &pending.staged)?;
        let src = staging.handle();

        for transfer in pending.buffer_transfers.iter() {
            ctx.command_buffer()
                .copy_buffer(src, transfer.dst, &[transfer.copy])?;
        }
        for transfer in pending.image_transfers.iter() {
            let barrier = ImageBarrier {
                src_stage_mask: vk::PipelineStageFlags2::TOP_OF_PIPE,
                src_access_mask: vk::AccessFlags2::NONE,
                dst_stage_mask: vk::PipelineStageFlags2::TRANSFER,
                dst_access_mask: vk::AccessFlags2::TRANSFER_WRITE,
                old_layout: vk::ImageLayout::UNDEFINED,
                new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                image: transfer.dst,
                subresource_range: transfer.range,
            };
            ctx.command_buffer().pipeline_barrier(&DependencyInfo {
                buffer_barriers: &[],
                image_barriers: &[barrier],
            })?;
            ctx.command_buffer().copy_buffer_to_image(
                src,
                transfer.dst,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &transfer.copies,
            )?;
        }
        Ok(())
    }

    fn post_render(&mut self, _ctx: &mut FrameContext<D>) -> Result<()> {
        Ok(())
    }
}
