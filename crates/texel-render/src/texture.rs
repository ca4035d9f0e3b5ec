// SPDX-License-Identifier: CEPL-1.0
use crate::AssetError;

/// Decoded RGBA8 pixels, rows top to bottom, no padding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TextureData {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, AssetError> {
        if width == 0 || height == 0 {
            return Err(AssetError::EmptyTexture { width, height });
        }
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(AssetError::TextureSize {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = rgba.repeat(width as usize * height as usize);
        Self {
            width,
            height,
            pixels,
        }
    }

    /// `size`x`size` checkerboard with `cells` squares per side.
    pub fn checker(size: u32, cells: u32, a: [u8; 4], b: [u8; 4]) -> Self {
        let cell = (size / cells.max(1)).max(1);
        let mut pixels = Vec::with_capacity(size as usize * size as usize * 4);
        for y in 0..size {
            for x in 0..size {
                let texel = if ((x / cell) + (y / cell)) % 2 == 0 { a } else { b };
                pixels.extend_from_slice(&texel);
            }
        }
        Self {
            width: size,
            height: size,
            pixels,
        }
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}
