// SPDX-License-Identifier: CEPL-1.0
//! Backend-agnostic half of the renderer: the scene data handed over by the
//! asset decoders and the frame-lifecycle state machine that drives a
//! [`FrameBackend`].

pub mod mesh;
pub mod scheduler;
pub mod texture;

pub use mesh::{IndexData, IndexWidth, MeshData, Vertex};
pub use scheduler::{
    AcquireOutcome, FrameBackend, FrameScheduler, FrameStatus, InvalidationCause, PresentOutcome,
    RebuildOutcome, ResourceState, SchedulerStats, SkipReason, MAX_FRAMES_IN_FLIGHT,
};
pub use texture::TextureData;

use anyhow::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A minimised window reports a zero dimension; no swapchain can be built for it.
    pub fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Everything the renderer uploads once at startup.
#[derive(Clone, Debug)]
pub struct SceneAssets {
    pub mesh: MeshData,
    pub texture: TextureData,
}

impl SceneAssets {
    /// The textured quad and checker texture used when no assets are configured.
    pub fn demo() -> Self {
        Self {
            mesh: MeshData::quad(),
            texture: TextureData::checker(64, 8, [230, 230, 230, 255], [40, 40, 48, 255]),
        }
    }
}

/// What the host application drives each frame.
pub trait Renderer {
    /// The host window's framebuffer size changed. Zero sizes are allowed;
    /// frames are skipped until the size is usable again.
    fn resize(&mut self, size: RenderSize);
    fn render(&mut self) -> Result<FrameStatus>;
}

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("mesh has no vertices")]
    EmptyMesh,
    #[error("mesh has no indices")]
    NoIndices,
    #[error("index {index} at position {position} is out of range for {vertex_count} vertices")]
    IndexOutOfRange {
        index: u32,
        position: usize,
        vertex_count: usize,
    },
    #[error("index count {0} is not a multiple of 3")]
    NotTriangles(usize),
    #[error("texture is {width}x{height}; both dimensions must be non-zero")]
    EmptyTexture { width: u32, height: u32 },
    #[error("texture holds {actual} bytes, {width}x{height} RGBA8 needs {expected}")]
    TextureSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}
