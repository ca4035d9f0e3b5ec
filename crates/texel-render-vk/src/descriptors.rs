// SPDX-License-Identifier: CEPL-1.0
//! Per-image uniform buffers and descriptor sets.
//!
//! Sized by swapchain image count, not by frame slot: an image's set stays
//! bound in its recorded command buffer until the image fence for that image
//! has been observed.

use anyhow::{bail, Context, Result};
use ash::vk;
use texel_math::UniformBlock;

use crate::device::DeviceContext;
use crate::memory::{Buffer, BufferKind};
use crate::texture::Texture;

pub const UNIFORM_BINDING: u32 = 0;
pub const SAMPLER_BINDING: u32 = 1;

pub fn layout_bindings() -> [vk::DescriptorSetLayoutBinding<'static>; 2] {
    [
        vk::DescriptorSetLayoutBinding {
            binding: UNIFORM_BINDING,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::VERTEX,
            ..Default::default()
        },
        vk::DescriptorSetLayoutBinding {
            binding: SAMPLER_BINDING,
            descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
            ..Default::default()
        },
    ]
}

pub fn pool_sizes(image_count: u32) -> [vk::DescriptorPoolSize; 2] {
    [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: image_count,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: image_count,
        },
    ]
}

/// The set layout outlives every swapchain resource set.
pub struct SetLayout {
    device: ash::Device,
    pub handle: vk::DescriptorSetLayout,
}

impl SetLayout {
    pub unsafe fn new(device: &ash::Device) -> Result<Self> {
        let bindings = layout_bindings();
        let ci = vk::DescriptorSetLayoutCreateInfo {
            s_type: vk::StructureType::DESCRIPTOR_SET_LAYOUT_CREATE_INFO,
            binding_count: bindings.len() as u32,
            p_bindings: bindings.as_ptr(),
            ..Default::default()
        };
        let handle = device
            .create_descriptor_set_layout(&ci, None)
            .context("create_descriptor_set_layout")?;
        Ok(Self {
            device: device.clone(),
            handle,
        })
    }
}

impl Drop for SetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .destroy_descriptor_set_layout(self.handle, None)
        };
    }
}

pub struct FrameUniforms {
    device: ash::Device,
    pool: vk::DescriptorPool,
    pub buffers: Vec<Buffer>,
    pub sets: Vec<vk::DescriptorSet>,
}

impl FrameUniforms {
    pub unsafe fn new(
        ctx: &DeviceContext,
        layout: &SetLayout,
        texture: &Texture,
        image_count: usize,
    ) -> Result<Self> {
        let ubo_size = std::mem::size_of::<UniformBlock>() as vk::DeviceSize;
        let d = &ctx.device;

        let mut me = Self {
            device: d.clone(),
            pool: vk::DescriptorPool::null(),
            buffers: Vec::with_capacity(image_count),
            sets: Vec::new(),
        };

        // 1) UBOs
        for _ in 0..image_count {
            me.buffers
                .push(Buffer::new(ctx, ubo_size, BufferKind::Uniform)?);
        }

        // 2) Pool
        let sizes = pool_sizes(image_count as u32);
        let pool_ci = vk::DescriptorPoolCreateInfo {
            s_type: vk::StructureType::DESCRIPTOR_POOL_CREATE_INFO,
            max_sets: image_count as u32,
            pool_size_count: sizes.len() as u32,
            p_pool_sizes: sizes.as_ptr(),
            ..Default::default()
        };
        me.pool = d
            .create_descriptor_pool(&pool_ci, None)
            .context("create_descriptor_pool")?;

        // 3) Sets
        let layouts = vec![layout.handle; image_count];
        let alloc = vk::DescriptorSetAllocateInfo {
            s_type: vk::StructureType::DESCRIPTOR_SET_ALLOCATE_INFO,
            descriptor_pool: me.pool,
            descriptor_set_count: image_count as u32,
            p_set_layouts: layouts.as_ptr(),
            ..Default::default()
        };
        me.sets = d
            .allocate_descriptor_sets(&alloc)
            .context("allocate_descriptor_sets")?;

        // 4) Writes
        let buffer_infos: Vec<vk::DescriptorBufferInfo> = me
            .buffers
            .iter()
            .map(|b| vk::DescriptorBufferInfo {
                buffer: b.handle,
                offset: 0,
                range: ubo_size,
            })
            .collect();
        let image_info = vk::DescriptorImageInfo {
            sampler: texture.sampler(),
            image_view: texture.view(),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        };
        let mut writes = Vec::with_capacity(image_count * 2);
        for (set, info) in me.sets.iter().zip(&buffer_infos) {
            writes.push(vk::WriteDescriptorSet {
                s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
                dst_set: *set,
                dst_binding: UNIFORM_BINDING,
                descriptor_count: 1,
                descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
                p_buffer_info: info,
                ..Default::default()
            });
            writes.push(vk::WriteDescriptorSet {
                s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
                dst_set: *set,
                dst_binding: SAMPLER_BINDING,
                descriptor_count: 1,
                descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                p_image_info: &image_info,
                ..Default::default()
            });
        }
        d.update_descriptor_sets(&writes, &[]);

        Ok(me)
    }

    /// Caller guarantees the GPU is done with this image's previous frame.
    pub unsafe fn write(&self, image_index: usize, block: &UniformBlock) -> Result<()> {
        let Some(buffer) = self.buffers.get(image_index) else {
            bail!(
                "no uniform buffer for image {image_index} ({} images)",
                self.buffers.len()
            );
        };
        buffer.write(block.as_bytes())
    }
}

impl Drop for FrameUniforms {
    fn drop(&mut self) {
        // buffers first, then the pool (frees the sets with it)
        self.buffers.clear();
        unsafe { self.device.destroy_descriptor_pool(self.pool, None) };
    }
}
