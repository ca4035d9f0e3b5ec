// SPDX-License-Identifier: CEPL-1.0
//! The swapchain resource set: everything sized to the surface extent.
//!
//! The set is built and destroyed as a unit. A half-built set (an error part
//! way through [`SwapchainResources::build`]) is released by the same `Drop`
//! that tears down a live one; destroying a null handle is a no-op.

use anyhow::{Context, Result};
use ash::vk;
use texel_render::RenderSize;
use tracing::info;

use crate::config::PresentModePreference;
use crate::device::DeviceContext;
use crate::error::RenderError;
use crate::memory::{create_image_view, ImageAllocation};
use crate::pipeline::{create_framebuffers, create_pipeline, create_render_pass};

pub const PREFERRED_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Preferred BGRA8/sRGB pair if listed, otherwise the first listed format.
pub fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
) -> Result<vk::SurfaceFormatKHR, RenderError> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == PREFERRED_FORMAT.format && f.color_space == PREFERRED_FORMAT.color_space
        })
        .or_else(|| formats.first().copied())
        .ok_or(RenderError::NoSupportedFormat("surface"))
}

pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    pref: PresentModePreference,
) -> vk::PresentModeKHR {
    if pref == PresentModePreference::Mailbox && modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        // always supported
        vk::PresentModeKHR::FIFO
    }
}

/// The surface's current extent, or the window size clamped into the
/// supported range when the surface leaves it to the application.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum, capped by the maximum (0 means no maximum).
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = caps.min_image_count + 1;
    if caps.max_image_count == 0 {
        wanted
    } else {
        wanted.min(caps.max_image_count)
    }
}

/// Surface capabilities queried at the start of every build.
pub struct SurfaceSupport {
    pub caps: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    pub unsafe fn query(ctx: &DeviceContext) -> Result<Self> {
        let s = ctx.surface()?;
        Ok(Self {
            caps: s
                .loader
                .get_physical_device_surface_capabilities(ctx.phys, s.handle)
                .context("get_physical_device_surface_capabilities")?,
            formats: s
                .loader
                .get_physical_device_surface_formats(ctx.phys, s.handle)
                .context("get_physical_device_surface_formats")?,
            present_modes: s
                .loader
                .get_physical_device_surface_present_modes(ctx.phys, s.handle)
                .context("get_physical_device_surface_present_modes")?,
        })
    }
}

pub struct SwapchainResources {
    device: ash::Device,
    loader: ash::khr::swapchain::Device,
    pub swapchain: vk::SwapchainKHR,
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
    pub depth: Option<ImageAllocation>,
    pub render_pass: vk::RenderPass,
    pub pipeline_layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
    pub framebuffers: Vec<vk::Framebuffer>,
}

impl SwapchainResources {
    // STRICT ORDER:
    // swapchain -> views -> depth -> render pass -> pipeline -> framebuffers
    // Drop runs the exact reverse.
    pub unsafe fn build(
        ctx: &DeviceContext,
        support: &SurfaceSupport,
        extent: vk::Extent2D,
        pref: PresentModePreference,
        set_layout: vk::DescriptorSetLayout,
        depth_format: vk::Format,
    ) -> Result<Self> {
        let surface = ctx.surface()?;
        let loader = ctx.swapchain_loader()?.clone();

        let format = choose_surface_format(&support.formats)?;
        let present_mode = choose_present_mode(&support.present_modes, pref);
        let min_image_count = choose_image_count(&support.caps);

        let pre_transform = if support
            .caps
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            support.caps.current_transform
        };

        let family_indices = ctx.families.unique();
        let (sharing_mode, index_count, p_indices) = if ctx.families.is_shared() {
            (vk::SharingMode::EXCLUSIVE, 0, std::ptr::null())
        } else {
            (
                vk::SharingMode::CONCURRENT,
                family_indices.len() as u32,
                family_indices.as_ptr(),
            )
        };

        let swap_info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: surface.handle,
            min_image_count,
            image_format: format.format,
            image_color_space: format.color_space,
            image_extent: extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: sharing_mode,
            queue_family_index_count: index_count,
            p_queue_family_indices: p_indices,
            pre_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode,
            clipped: vk::TRUE,
            // the previous set is fully destroyed before a rebuild
            old_swapchain: vk::SwapchainKHR::null(),
            ..Default::default()
        };

        let mut set = Self {
            device: ctx.device.clone(),
            loader,
            swapchain: vk::SwapchainKHR::null(),
            format,
            present_mode,
            extent,
            images: Vec::new(),
            views: Vec::new(),
            depth: None,
            render_pass: vk::RenderPass::null(),
            pipeline_layout: vk::PipelineLayout::null(),
            pipeline: vk::Pipeline::null(),
            framebuffers: Vec::new(),
        };

        set.swapchain = set
            .loader
            .create_swapchain(&swap_info, None)
            .context("create_swapchain")?;
        set.images = set
            .loader
            .get_swapchain_images(set.swapchain)
            .context("get_swapchain_images")?;

        for &image in &set.images {
            let view =
                create_image_view(&set.device, image, format.format, vk::ImageAspectFlags::COLOR)?;
            set.views.push(view);
        }

        set.depth = Some(ImageAllocation::new(
            ctx,
            extent.width,
            extent.height,
            depth_format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            vk::ImageAspectFlags::DEPTH,
        )?);
        let depth_view = set.depth.as_ref().map(|d| d.view).unwrap_or_default();

        set.render_pass = create_render_pass(&set.device, format.format, depth_format)?;
        let (layout, pipeline) = create_pipeline(&set.device, set.render_pass, extent, set_layout)?;
        set.pipeline_layout = layout;
        set.pipeline = pipeline;
        set.framebuffers =
            create_framebuffers(&set.device, set.render_pass, &set.views, depth_view, extent)?;

        info!(
            "vk: swapchain {}x{}, format {:?} / {:?}, present mode {:?}, {} images (min {})",
            extent.width,
            extent.height,
            format.format,
            format.color_space,
            present_mode,
            set.images.len(),
            support.caps.min_image_count
        );

        Ok(set)
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

impl Drop for SwapchainResources {
    fn drop(&mut self) {
        unsafe {
            let d = &self.device;
            for &fb in &self.framebuffers {
                d.destroy_framebuffer(fb, None);
            }
            d.destroy_pipeline(self.pipeline, None);
            d.destroy_pipeline_layout(self.pipeline_layout, None);
            d.destroy_render_pass(self.render_pass, None);
            self.depth = None;
            for &iv in &self.views {
                d.destroy_image_view(iv, None);
            }
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    fn caps(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min.0,
                height: min.1,
            },
            max_image_extent: vk::Extent2D {
                width: max.0,
                height: max.1,
            },
            min_image_count: 2,
            max_image_count: 8,
            ..Default::default()
        }
    }

    #[test]
    fn preferred_format_wins_wherever_listed() {
        let formats = [
            fmt(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            fmt(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            PREFERRED_FORMAT,
        ];
        let picked = choose_surface_format(&formats).unwrap();
        assert_eq!(picked.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(picked.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn colour_space_must_match_too() {
        let formats = [
            fmt(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
            fmt(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::HDR10_ST2084_EXT),
        ];
        let picked = choose_surface_format(&formats).unwrap();
        assert_eq!(picked.format, vk::Format::R16G16B16A16_SFLOAT);
    }

    #[test]
    fn empty_format_list_is_an_error() {
        assert!(matches!(
            choose_surface_format(&[]),
            Err(RenderError::NoSupportedFormat("surface"))
        ));
    }

    #[test]
    fn mailbox_only_when_listed_and_preferred() {
        use vk::PresentModeKHR as P;
        let modes = [P::IMMEDIATE, P::FIFO, P::MAILBOX];
        assert_eq!(choose_present_mode(&modes, PresentModePreference::Mailbox), P::MAILBOX);
        assert_eq!(choose_present_mode(&modes, PresentModePreference::Fifo), P::FIFO);
        assert_eq!(
            choose_present_mode(&[P::IMMEDIATE, P::FIFO], PresentModePreference::Mailbox),
            P::FIFO
        );
    }

    #[test]
    fn fixed_extent_is_taken_verbatim() {
        let c = caps((1280, 720), (1, 1), (4096, 4096));
        let e = choose_extent(&c, RenderSize::new(10, 10));
        assert_eq!((e.width, e.height), (1280, 720));
    }

    #[test]
    fn adaptive_extent_clamps_the_window_size() {
        let c = caps((u32::MAX, u32::MAX), (200, 100), (1920, 1080));
        let e = choose_extent(&c, RenderSize::new(800, 600));
        assert_eq!((e.width, e.height), (800, 600));

        let e = choose_extent(&c, RenderSize::new(50, 20));
        assert_eq!((e.width, e.height), (200, 100));

        let e = choose_extent(&c, RenderSize::new(5000, 3000));
        assert_eq!((e.width, e.height), (1920, 1080));

        let e = choose_extent(&c, RenderSize::new(100, 2000));
        assert_eq!((e.width, e.height), (200, 1080));
    }

    #[test]
    fn image_count_is_min_plus_one_within_max() {
        let mut c = caps((1, 1), (1, 1), (1, 1));
        assert_eq!(choose_image_count(&c), 3);
        c.max_image_count = 2;
        assert_eq!(choose_image_count(&c), 2);
        c.max_image_count = 0;
        c.min_image_count = 5;
        assert_eq!(choose_image_count(&c), 6);
    }
}
