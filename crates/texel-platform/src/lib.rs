// SPDX-License-Identifier: CEPL-1.0
//! Host window layer.

pub use winit;

use texel_render::RenderSize;
use winit::dpi::PhysicalSize;

pub fn render_size(size: PhysicalSize<u32>) -> RenderSize {
    RenderSize::new(size.width, size.height)
}

/// Zero-sized or hidden windows get no frames.
pub fn should_pause(size: RenderSize, occluded: bool) -> bool {
    occluded || size.is_zero()
}
