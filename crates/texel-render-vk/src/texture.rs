// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;
use texel_render::{AssetError, TextureData};
use tracing::info;

use crate::commands::CommandPool;
use crate::device::DeviceContext;
use crate::error::RenderError;
use crate::memory::{Buffer, BufferKind, ImageAllocation};
use crate::upload::{copy_buffer_to_image, run_one_shot, transition_image_layout};

pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Sampled RGBA8 texture. Immutable once uploaded.
pub struct Texture {
    device: ash::Device,
    sampler: vk::Sampler,
    image: ImageAllocation,
    pub width: u32,
    pub height: u32,
}

impl Texture {
    pub unsafe fn upload(
        ctx: &DeviceContext,
        pool: &CommandPool,
        data: &TextureData,
    ) -> Result<Self> {
        check_pixels(data)?;

        let staging = Buffer::new(ctx, data.byte_len() as vk::DeviceSize, BufferKind::Staging)?;
        staging.write(&data.pixels)?;

        let image = ImageAllocation::new(
            ctx,
            data.width,
            data.height,
            TEXTURE_FORMAT,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            vk::ImageAspectFlags::COLOR,
        )?;

        let d = &ctx.device;
        run_one_shot(ctx, pool, |cmd| {
            transition_image_layout(
                d,
                cmd,
                image.image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )?;
            copy_buffer_to_image(d, cmd, staging.handle, image.image, data.width, data.height);
            transition_image_layout(
                d,
                cmd,
                image.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )
        })?;

        let sampler = create_sampler(d, ctx.max_anisotropy)?;
        info!("vk: texture {}x{} uploaded", data.width, data.height);

        Ok(Self {
            device: d.clone(),
            sampler,
            image,
            width: data.width,
            height: data.height,
        })
    }

    pub fn view(&self) -> vk::ImageView {
        self.image.view
    }

    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe { self.device.destroy_sampler(self.sampler, None) };
    }
}

fn check_pixels(data: &TextureData) -> Result<(), RenderError> {
    if data.width == 0 || data.height == 0 {
        return Err(AssetError::EmptyTexture {
            width: data.width,
            height: data.height,
        }
        .into());
    }
    let expected = data.width as usize * data.height as usize * 4;
    if data.pixels.len() != expected {
        return Err(AssetError::TextureSize {
            width: data.width,
            height: data.height,
            expected,
            actual: data.pixels.len(),
        }
        .into());
    }
    Ok(())
}

unsafe fn create_sampler(device: &ash::Device, max_anisotropy: f32) -> Result<vk::Sampler> {
    let ci = vk::SamplerCreateInfo {
        s_type: vk::StructureType::SAMPLER_CREATE_INFO,
        mag_filter: vk::Filter::LINEAR,
        min_filter: vk::Filter::LINEAR,
        mipmap_mode: vk::SamplerMipmapMode::LINEAR,
        address_mode_u: vk::SamplerAddressMode::REPEAT,
        address_mode_v: vk::SamplerAddressMode::REPEAT,
        address_mode_w: vk::SamplerAddressMode::REPEAT,
        anisotropy_enable: vk::TRUE,
        max_anisotropy,
        compare_enable: vk::FALSE,
        compare_op: vk::CompareOp::ALWAYS,
        border_color: vk::BorderColor::INT_OPAQUE_BLACK,
        unnormalized_coordinates: vk::FALSE,
        ..Default::default()
    };
    device.create_sampler(&ci, None).context("create_sampler")
}
