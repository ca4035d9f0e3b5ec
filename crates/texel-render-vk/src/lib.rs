// SPDX-License-Identifier: CEPL-1.0
//! Vulkan renderer for a single textured mesh.
//!
//! [`VkRenderer`] wires a [`VkBackend`] into the backend-agnostic
//! [`FrameScheduler`]; the scheduler decides when to wait, acquire, submit,
//! present and rebuild, the backend owns the Vulkan objects.

pub mod backend;
pub mod commands;
pub mod config;
pub mod debug;
pub mod descriptors;
pub mod device;
pub mod error;
pub mod memory;
pub mod pipeline;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod upload;

use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use texel_render::{FrameScheduler, FrameStatus, RenderSize, Renderer, SceneAssets, SchedulerStats};
use tracing::info;

pub use backend::VkBackend;
pub use commands::CommandPool;
pub use config::{DeviceConfig, PresentModePreference, RendererOptions};
pub use device::{DeviceContext, SurfaceSource};
pub use error::RenderError;
pub use memory::{Buffer, BufferKind};
pub use texture::Texture;

pub struct VkRenderer {
    scheduler: FrameScheduler<VkBackend>,
}

impl VkRenderer {
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        scene: &SceneAssets,
        device_cfg: &DeviceConfig,
        options: RendererOptions,
    ) -> Result<Self> {
        let ctx = DeviceContext::new(device_cfg, Some(SurfaceSource { window, display }))?;
        let backend = VkBackend::new(ctx, scene, size, options)?;
        let mut scheduler = FrameScheduler::new(backend);
        if !scheduler.ensure_ready()? {
            info!("vk: window is zero-sized, swapchain build postponed");
        }
        Ok(Self { scheduler })
    }

    pub fn stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

}

impl Renderer for VkRenderer {
    fn resize(&mut self, size: RenderSize) {
        self.scheduler.backend_mut().set_size_hint(size);
        self.scheduler.notify_resized();
    }

    fn render(&mut self) -> Result<FrameStatus> {
        self.scheduler.draw_frame()
    }
}
