// SPDX-License-Identifier: CEPL-1.0
//! [`FrameBackend`] over the Vulkan objects.

use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use ash::vk;
use texel_math::UniformBlock;
use texel_render::{
    AcquireOutcome, FrameBackend, PresentOutcome, RebuildOutcome, RenderSize, SceneAssets,
};
use tracing::{debug, info};

use crate::commands::{CommandPool, Geometry, RecordedCommands};
use crate::config::RendererOptions;
use crate::descriptors::{FrameUniforms, SetLayout};
use crate::device::DeviceContext;
use crate::swapchain::{choose_extent, SurfaceSupport, SwapchainResources};
use crate::sync::FrameSlots;
use crate::texture::Texture;

// Field order is teardown order: command buffers, then the swapchain set
// (framebuffers .. swapchain), then per-image uniforms and their pool.
struct FrameResources {
    commands: RecordedCommands,
    swapchain: SwapchainResources,
    uniforms: FrameUniforms,
}

/// Owns every GPU object. Fields drop top to bottom; the device goes last.
pub struct VkBackend {
    frame: Option<FrameResources>,
    slots: FrameSlots,
    texture: Texture,
    geometry: Geometry,
    set_layout: SetLayout,
    pool: CommandPool,
    depth_format: vk::Format,
    size_hint: RenderSize,
    options: RendererOptions,
    started: Instant,
    ctx: DeviceContext,
}

impl VkBackend {
    /// One-time setup: command pool, set layout, mesh and texture uploads,
    /// frame slots. The swapchain set is left to the first rebuild.
    pub fn new(
        ctx: DeviceContext,
        scene: &SceneAssets,
        size: RenderSize,
        options: RendererOptions,
    ) -> Result<Self> {
        unsafe {
            let depth_format = ctx.find_depth_format()?;
            let pool = CommandPool::new(&ctx.device, ctx.families.graphics)?;
            let set_layout = SetLayout::new(&ctx.device)?;
            let geometry = Geometry::upload(&ctx, &pool, &scene.mesh)?;
            let texture = Texture::upload(&ctx, &pool, &scene.texture)?;
            let slots = FrameSlots::new(&ctx.device)?;

            info!(
                "vk: scene uploaded ({} vertices, {} indices as {:?}), depth {:?}",
                scene.mesh.vertices.len(),
                geometry.index_count,
                geometry.index_type,
                depth_format
            );

            Ok(Self {
                frame: None,
                slots,
                texture,
                geometry,
                set_layout,
                pool,
                depth_format,
                size_hint: size,
                options,
                started: Instant::now(),
                ctx,
            })
        }
    }

    pub fn set_size_hint(&mut self, size: RenderSize) {
        self.size_hint = size;
    }

    fn frame(&self) -> Result<&FrameResources> {
        self.frame
            .as_ref()
            .ok_or_else(|| anyhow!("no live swapchain resource set"))
    }
}

impl FrameBackend for VkBackend {
    // STRICT ORDER (rebuild):
    // 1) query the surface; a zero extent defers without touching anything
    // 2) device_wait_idle(): no GPU reference to the old set may remain
    // 3) drop the old set (commands, swapchain set, uniforms)
    // 4) build swapchain set, uniforms, then record commands against both
    fn rebuild(&mut self) -> Result<RebuildOutcome> {
        unsafe {
            let support = SurfaceSupport::query(&self.ctx)?;
            let extent = choose_extent(&support.caps, self.size_hint);
            if self.size_hint.is_zero() || extent.width == 0 || extent.height == 0 {
                debug!("vk: zero extent, swapchain build deferred");
                return Ok(RebuildOutcome::Deferred);
            }

            self.ctx
                .device
                .device_wait_idle()
                .context("device_wait_idle")?;
            self.frame = None;

            let swapchain = SwapchainResources::build(
                &self.ctx,
                &support,
                extent,
                self.options.present_mode,
                self.set_layout.handle,
                self.depth_format,
            )?;
            let image_count = swapchain.image_count();
            let uniforms =
                FrameUniforms::new(&self.ctx, &self.set_layout, &self.texture, image_count)?;
            let commands = RecordedCommands::record(
                &self.ctx.device,
                &self.pool,
                &swapchain,
                &uniforms,
                &self.geometry,
                self.options.clear_color,
            )?;

            self.frame = Some(FrameResources {
                commands,
                swapchain,
                uniforms,
            });
            Ok(RebuildOutcome::Ready { image_count })
        }
    }

    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        unsafe { self.slots.wait(slot) }
    }

    fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome> {
        let frame = self.frame()?;
        let semaphore = self.slots.get(slot)?.image_available;
        let loader = self.ctx.swapchain_loader()?;
        let acquired = unsafe {
            loader.acquire_next_image(
                frame.swapchain.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };
        match acquired {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(anyhow!("acquire_next_image: {e:?}")),
        }
    }

    fn write_uniforms(&mut self, image_index: u32) -> Result<()> {
        let frame = self.frame()?;
        let extent = frame.swapchain.extent;
        let block = UniformBlock::animated(
            self.started.elapsed().as_secs_f32(),
            extent.width,
            extent.height,
        );
        unsafe { frame.uniforms.write(image_index as usize, &block) }
    }

    fn reset_slot(&mut self, slot: usize) -> Result<()> {
        unsafe { self.slots.reset(slot) }
    }

    fn submit(&mut self, slot: usize, image_index: u32) -> Result<()> {
        let frame = self.frame()?;
        let sync = self.slots.get(slot)?;
        let cmd = frame
            .commands
            .get(image_index as usize)
            .with_context(|| format!("no command buffer for image {image_index}"))?;
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];

        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &sync.image_available,
            p_wait_dst_stage_mask: wait_stages.as_ptr(),
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            signal_semaphore_count: 1,
            p_signal_semaphores: &sync.render_finished,
            ..Default::default()
        };
        unsafe {
            self.ctx
                .device
                .queue_submit(
                    self.ctx.graphics_queue,
                    std::slice::from_ref(&submit),
                    sync.in_flight,
                )
                .context("queue_submit")
        }
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome> {
        let frame = self.frame()?;
        let sync = self.slots.get(slot)?;
        let loader = self.ctx.swapchain_loader()?;
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &sync.render_finished,
            swapchain_count: 1,
            p_swapchains: &frame.swapchain.swapchain,
            p_image_indices: &image_index,
            ..Default::default()
        };
        match unsafe { loader.queue_present(self.ctx.present_queue, &present) } {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(anyhow!("queue_present: {e:?}")),
        }
    }
}

impl Drop for VkBackend {
    fn drop(&mut self) {
        unsafe { self.ctx.device.device_wait_idle().ok() };
    }
}
