// SPDX-License-Identifier: CEPL-1.0
//! Staged uploads: host data -> host-visible staging buffer -> device-local
//! resource, through a one-shot command buffer on the graphics queue.
//!
//! Every call blocks on `queue_wait_idle`. Uploads only happen at startup, so
//! nothing here is pipelined.

use anyhow::{bail, Context, Result};
use ash::vk;

use crate::commands::CommandPool;
use crate::device::DeviceContext;
use crate::error::RenderError;
use crate::memory::{Buffer, BufferKind};

/// Records `record` into a temporary command buffer, submits it and waits.
pub unsafe fn run_one_shot<F>(ctx: &DeviceContext, pool: &CommandPool, record: F) -> Result<()>
where
    F: FnOnce(vk::CommandBuffer) -> Result<()>,
{
    let d = &ctx.device;
    let ai = vk::CommandBufferAllocateInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
        command_pool: pool.handle,
        level: vk::CommandBufferLevel::PRIMARY,
        command_buffer_count: 1,
        ..Default::default()
    };
    let cmd = d
        .allocate_command_buffers(&ai)
        .context("allocate_command_buffers(one-shot)")?[0];

    let result = (|| -> Result<()> {
        let bi = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        d.begin_command_buffer(cmd, &bi)
            .context("begin_command_buffer(one-shot)")?;
        record(cmd)?;
        d.end_command_buffer(cmd)
            .context("end_command_buffer(one-shot)")?;

        let si = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            ..Default::default()
        };
        d.queue_submit(ctx.graphics_queue, std::slice::from_ref(&si), vk::Fence::null())
            .context("queue_submit(one-shot)")?;
        d.queue_wait_idle(ctx.graphics_queue)
            .context("queue_wait_idle(one-shot)")
    })();

    d.free_command_buffers(pool.handle, std::slice::from_ref(&cmd));
    result
}

/// Copies `data` into the start of a device-local buffer via staging.
pub unsafe fn upload_to_device(
    ctx: &DeviceContext,
    pool: &CommandPool,
    dst: &Buffer,
    data: &[u8],
) -> Result<()> {
    let size = data.len() as vk::DeviceSize;
    if size == 0 {
        return Ok(());
    }
    if size > dst.size {
        bail!("upload of {size} bytes into a {}-byte buffer", dst.size);
    }
    let staging = Buffer::new(ctx, size, BufferKind::Staging)?;
    staging.write(data)?;

    run_one_shot(ctx, pool, |cmd| {
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        ctx.device
            .cmd_copy_buffer(cmd, staging.handle, dst.handle, std::slice::from_ref(&region));
        Ok(())
    })
}

/// Allocates a device-local buffer of `kind` sized for `data` and fills it.
pub unsafe fn create_device_local_buffer(
    ctx: &DeviceContext,
    pool: &CommandPool,
    kind: BufferKind,
    data: &[u8],
) -> Result<Buffer> {
    let buffer = Buffer::new(ctx, data.len() as vk::DeviceSize, kind)?;
    upload_to_device(ctx, pool, &buffer, data)?;
    Ok(buffer)
}

/// Reads a buffer back through a host-visible copy.
pub unsafe fn download_from_device(
    ctx: &DeviceContext,
    pool: &CommandPool,
    src: &Buffer,
) -> Result<Vec<u8>> {
    let readback = Buffer::new(ctx, src.size, BufferKind::Readback)?;
    run_one_shot(ctx, pool, |cmd| {
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size: src.size,
        };
        ctx.device.cmd_copy_buffer(
            cmd,
            src.handle,
            readback.handle,
            std::slice::from_ref(&region),
        );
        Ok(())
    })?;
    readback.read()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionMasks {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// Barrier masks for the two layout transitions texture uploads use. Any
/// other pair is a logic error.
pub fn layout_transition(
    from: vk::ImageLayout,
    to: vk::ImageLayout,
) -> Result<TransitionMasks, RenderError> {
    use vk::ImageLayout as L;
    match (from, to) {
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => Ok(TransitionMasks {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        }),
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => Ok(TransitionMasks {
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_access: vk::AccessFlags::SHADER_READ,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        }),
        _ => Err(RenderError::UnsupportedLayoutTransition { from, to }),
    }
}

pub unsafe fn transition_image_layout(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    from: vk::ImageLayout,
    to: vk::ImageLayout,
) -> Result<()> {
    let masks = layout_transition(from, to)?;
    let barrier = vk::ImageMemoryBarrier {
        s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
        src_access_mask: masks.src_access,
        dst_access_mask: masks.dst_access,
        old_layout: from,
        new_layout: to,
        src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        image,
        subresource_range: vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        },
        ..Default::default()
    };
    device.cmd_pipeline_barrier(
        cmd,
        masks.src_stage,
        masks.dst_stage,
        vk::DependencyFlags::empty(),
        &[],
        &[],
        std::slice::from_ref(&barrier),
    );
    Ok(())
}

pub unsafe fn copy_buffer_to_image(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    buffer: vk::Buffer,
    image: vk::Image,
    width: u32,
    height: u32,
) {
    let region = vk::BufferImageCopy {
        buffer_offset: 0,
        buffer_row_length: 0,
        buffer_image_height: 0,
        image_subresource: vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        },
        image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
        image_extent: vk::Extent3D {
            width,
            height,
            depth: 1,
        },
    };
    device.cmd_copy_buffer_to_image(
        cmd,
        buffer,
        image,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        std::slice::from_ref(&region),
    );
}
