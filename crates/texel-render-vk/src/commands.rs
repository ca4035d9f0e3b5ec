// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;
use texel_render::{IndexWidth, MeshData};

use crate::descriptors::FrameUniforms;
use crate::device::DeviceContext;
use crate::memory::{Buffer, BufferKind};
use crate::swapchain::SwapchainResources;
use crate::upload::create_device_local_buffer;

pub struct CommandPool {
    device: ash::Device,
    pub handle: vk::CommandPool,
}

impl CommandPool {
    pub unsafe fn new(device: &ash::Device, queue_family: u32) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            queue_family_index: queue_family,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            ..Default::default()
        };
        let handle = device
            .create_command_pool(&pool_info, None)
            .context("create_command_pool")?;
        Ok(Self {
            device: device.clone(),
            handle,
        })
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe { self.device.destroy_command_pool(self.handle, None) };
    }
}

/// Device-local vertex and index buffers for the scene mesh.
pub struct Geometry {
    pub vertices: Buffer,
    pub indices: Buffer,
    pub index_type: vk::IndexType,
    pub index_count: u32,
}

impl Geometry {
    pub unsafe fn upload(
        ctx: &DeviceContext,
        pool: &CommandPool,
        mesh: &MeshData,
    ) -> Result<Self> {
        let vertices =
            create_device_local_buffer(ctx, pool, BufferKind::Vertex, mesh.vertex_bytes())
                .context("vertex buffer upload")?;
        let indices =
            create_device_local_buffer(ctx, pool, BufferKind::Index, mesh.indices.as_bytes())
                .context("index buffer upload")?;
        Ok(Self {
            vertices,
            indices,
            index_type: index_type(mesh.indices.width()),
            index_count: mesh.index_count(),
        })
    }
}

pub fn index_type(width: IndexWidth) -> vk::IndexType {
    match width {
        IndexWidth::U16 => vk::IndexType::UINT16,
        IndexWidth::U32 => vk::IndexType::UINT32,
    }
}

pub fn clear_values(color: [f32; 4]) -> [vk::ClearValue; 2] {
    [
        vk::ClearValue {
            color: vk::ClearColorValue { float32: color },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        },
    ]
}

/// One primary command buffer per swapchain image, recorded once per
/// resource set. Per-frame data lives in the uniform buffers.
pub struct RecordedCommands {
    device: ash::Device,
    pool: vk::CommandPool,
    pub buffers: Vec<vk::CommandBuffer>,
}

impl RecordedCommands {
    pub unsafe fn record(
        device: &ash::Device,
        pool: &CommandPool,
        swapchain: &SwapchainResources,
        uniforms: &FrameUniforms,
        geometry: &Geometry,
        clear_color: [f32; 4],
    ) -> Result<Self> {
        let count = swapchain.framebuffers.len();
        let alloc_info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: pool.handle,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count as u32,
            ..Default::default()
        };
        let me = Self {
            device: device.clone(),
            pool: pool.handle,
            buffers: device
                .allocate_command_buffers(&alloc_info)
                .context("allocate_command_buffers")?,
        };

        let clears = clear_values(clear_color);
        for (i, &cmd) in me.buffers.iter().enumerate() {
            me.record_one(
                cmd,
                swapchain,
                swapchain.framebuffers[i],
                uniforms.sets[i],
                geometry,
                &clears,
            )?;
        }
        Ok(me)
    }

    // begin pass -> pipeline -> vertex -> index -> set -> draw -> end pass
    unsafe fn record_one(
        &self,
        cmd: vk::CommandBuffer,
        swapchain: &SwapchainResources,
        framebuffer: vk::Framebuffer,
        set: vk::DescriptorSet,
        geometry: &Geometry,
        clears: &[vk::ClearValue; 2],
    ) -> Result<()> {
        let d = &self.device;
        let begin = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            ..Default::default()
        };
        d.begin_command_buffer(cmd, &begin)
            .context("begin_command_buffer")?;

        let rp_begin = vk::RenderPassBeginInfo {
            s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
            render_pass: swapchain.render_pass,
            framebuffer,
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: swapchain.extent,
            },
            clear_value_count: clears.len() as u32,
            p_clear_values: clears.as_ptr(),
            ..Default::default()
        };
        d.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);
        d.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, swapchain.pipeline);
        d.cmd_bind_vertex_buffers(cmd, 0, &[geometry.vertices.handle], &[0]);
        d.cmd_bind_index_buffer(cmd, geometry.indices.handle, 0, geometry.index_type);
        d.cmd_bind_descriptor_sets(
            cmd,
            vk::PipelineBindPoint::GRAPHICS,
            swapchain.pipeline_layout,
            0,
            &[set],
            &[],
        );
        d.cmd_draw_indexed(cmd, geometry.index_count, 1, 0, 0, 0);
        d.cmd_end_render_pass(cmd);

        d.end_command_buffer(cmd).context("end_command_buffer")?;
        Ok(())
    }

    pub fn get(&self, image_index: usize) -> Option<vk::CommandBuffer> {
        self.buffers.get(image_index).copied()
    }
}

impl Drop for RecordedCommands {
    fn drop(&mut self) {
        if !self.buffers.is_empty() {
            unsafe { self.device.free_command_buffers(self.pool, &self.buffers) };
        }
    }
}
