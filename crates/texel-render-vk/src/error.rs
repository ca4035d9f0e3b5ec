// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use texel_render::AssetError;

/// Startup and contract failures. All of them are fatal; they travel inside
/// `anyhow::Error` and can be recovered with `downcast_ref`.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(
        "no physical device with graphics, present, swapchain and anisotropic sampling support"
    )]
    NoSuitableDevice,
    #[error("no suitable memory type (type bits {type_bits:#034b}, wanted {wanted:?})")]
    NoSuitableMemoryType {
        type_bits: u32,
        wanted: vk::MemoryPropertyFlags,
    },
    #[error("no supported {0} format")]
    NoSupportedFormat(&'static str),
    #[error("layer {0} is not available")]
    MissingLayer(String),
    #[error("extension {0} is not available")]
    MissingExtension(String),
    #[error("unsupported image layout transition {from:?} -> {to:?}")]
    UnsupportedLayoutTransition {
        from: vk::ImageLayout,
        to: vk::ImageLayout,
    },
    #[error("invalid texture")]
    InvalidTexture(#[from] AssetError),
    #[error("renderer was created without a surface")]
    Headless,
}
