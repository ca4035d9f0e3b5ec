// SPDX-License-Identifier: CEPL-1.0
//! Resource factory: buffers and images with their own bound memory.

use anyhow::{bail, Context, Result};
use ash::vk;

use crate::device::DeviceContext;
use crate::error::RenderError;

/// Index of the first memory type allowed by `type_bits` whose flags are a
/// superset of `wanted`.
pub fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    wanted: vk::MemoryPropertyFlags,
) -> Result<u32, RenderError> {
    (0..props.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32))
        .find(|&i| {
            type_bits & (1 << i) != 0
                && props.memory_types[i as usize]
                    .property_flags
                    .contains(wanted)
        })
        .ok_or(RenderError::NoSuitableMemoryType { type_bits, wanted })
}

unsafe fn allocate(
    ctx: &DeviceContext,
    req: vk::MemoryRequirements,
    props: vk::MemoryPropertyFlags,
) -> Result<vk::DeviceMemory> {
    let memory_type_index = find_memory_type(&ctx.memory_properties, req.memory_type_bits, props)?;
    let alloc = vk::MemoryAllocateInfo {
        s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
        allocation_size: req.size,
        memory_type_index,
        ..Default::default()
    };
    ctx.device
        .allocate_memory(&alloc, None)
        .context("allocate_memory")
}

/// Creates a buffer, allocates matching memory and binds it.
pub unsafe fn create_buffer(
    ctx: &DeviceContext,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    props: vk::MemoryPropertyFlags,
) -> Result<(vk::Buffer, vk::DeviceMemory)> {
    let d = &ctx.device;
    let bci = vk::BufferCreateInfo {
        s_type: vk::StructureType::BUFFER_CREATE_INFO,
        size,
        usage,
        sharing_mode: vk::SharingMode::EXCLUSIVE,
        ..Default::default()
    };
    let buffer = d.create_buffer(&bci, None).context("create_buffer")?;
    let req = d.get_buffer_memory_requirements(buffer);
    let memory = match allocate(ctx, req, props) {
        Ok(m) => m,
        Err(e) => {
            d.destroy_buffer(buffer, None);
            return Err(e);
        }
    };
    if let Err(e) = d.bind_buffer_memory(buffer, memory, 0) {
        d.destroy_buffer(buffer, None);
        d.free_memory(memory, None);
        return Err(e).context("bind_buffer_memory");
    }
    Ok((buffer, memory))
}

/// 2D single-mip image with bound memory.
pub unsafe fn create_image(
    ctx: &DeviceContext,
    width: u32,
    height: u32,
    format: vk::Format,
    tiling: vk::ImageTiling,
    usage: vk::ImageUsageFlags,
    props: vk::MemoryPropertyFlags,
) -> Result<(vk::Image, vk::DeviceMemory)> {
    let d = &ctx.device;
    let ici = vk::ImageCreateInfo {
        s_type: vk::StructureType::IMAGE_CREATE_INFO,
        image_type: vk::ImageType::TYPE_2D,
        format,
        extent: vk::Extent3D {
            width,
            height,
            depth: 1,
        },
        mip_levels: 1,
        array_layers: 1,
        samples: vk::SampleCountFlags::TYPE_1,
        tiling,
        usage,
        sharing_mode: vk::SharingMode::EXCLUSIVE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        ..Default::default()
    };
    let image = d.create_image(&ici, None).context("create_image")?;
    let req = d.get_image_memory_requirements(image);
    let memory = match allocate(ctx, req, props) {
        Ok(m) => m,
        Err(e) => {
            d.destroy_image(image, None);
            return Err(e);
        }
    };
    if let Err(e) = d.bind_image_memory(image, memory, 0) {
        d.destroy_image(image, None);
        d.free_memory(memory, None);
        return Err(e).context("bind_image_memory");
    }
    Ok((image, memory))
}

pub unsafe fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    aspect_mask: vk::ImageAspectFlags,
) -> Result<vk::ImageView> {
    let view_ci = vk::ImageViewCreateInfo {
        s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
        image,
        view_type: vk::ImageViewType::TYPE_2D,
        format,
        subresource_range: vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        },
        ..Default::default()
    };
    device
        .create_image_view(&view_ci, None)
        .context("create_image_view")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferKind {
    Vertex,
    Index,
    Uniform,
    Staging,
    Readback,
}

impl BufferKind {
    pub fn usage(self) -> vk::BufferUsageFlags {
        use vk::BufferUsageFlags as U;
        match self {
            // TRANSFER_SRC so device-local geometry can be read back
            BufferKind::Vertex => U::VERTEX_BUFFER | U::TRANSFER_DST | U::TRANSFER_SRC,
            BufferKind::Index => U::INDEX_BUFFER | U::TRANSFER_DST | U::TRANSFER_SRC,
            BufferKind::Uniform => U::UNIFORM_BUFFER,
            BufferKind::Staging => U::TRANSFER_SRC,
            BufferKind::Readback => U::TRANSFER_DST,
        }
    }

    pub fn memory_properties(self) -> vk::MemoryPropertyFlags {
        match self {
            BufferKind::Vertex | BufferKind::Index => vk::MemoryPropertyFlags::DEVICE_LOCAL,
            BufferKind::Uniform | BufferKind::Staging | BufferKind::Readback => {
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
            }
        }
    }

    pub fn is_host_visible(self) -> bool {
        self.memory_properties()
            .contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
    }
}

/// A buffer and the memory bound to it, released together on drop.
pub struct Buffer {
    device: ash::Device,
    pub handle: vk::Buffer,
    memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
    pub kind: BufferKind,
}

impl Buffer {
    pub unsafe fn new(ctx: &DeviceContext, size: vk::DeviceSize, kind: BufferKind) -> Result<Self> {
        if size == 0 {
            bail!("zero-sized {kind:?} buffer");
        }
        let (handle, memory) = create_buffer(ctx, size, kind.usage(), kind.memory_properties())?;
        Ok(Self {
            device: ctx.device.clone(),
            handle,
            memory,
            size,
            kind,
        })
    }

    /// Map, copy, unmap. Host-visible kinds only.
    pub unsafe fn write(&self, bytes: &[u8]) -> Result<()> {
        if !self.kind.is_host_visible() {
            bail!("{:?} buffer is not host visible", self.kind);
        }
        if bytes.len() as vk::DeviceSize > self.size {
            bail!("{} bytes do not fit a {}-byte buffer", bytes.len(), self.size);
        }
        let ptr = self
            .device
            .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
            .context("map_memory")?;
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr as *mut u8, bytes.len());
        self.device.unmap_memory(self.memory);
        Ok(())
    }

    pub unsafe fn read(&self) -> Result<Vec<u8>> {
        if !self.kind.is_host_visible() {
            bail!("{:?} buffer is not host visible", self.kind);
        }
        let ptr = self
            .device
            .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
            .context("map_memory")?;
        let out = std::slice::from_raw_parts(ptr as *const u8, self.size as usize).to_vec();
        self.device.unmap_memory(self.memory);
        Ok(out)
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.handle, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Image, bound memory and a full-resource view.
pub struct ImageAllocation {
    device: ash::Device,
    pub image: vk::Image,
    memory: vk::DeviceMemory,
    pub view: vk::ImageView,
    pub format: vk::Format,
}

impl ImageAllocation {
    pub unsafe fn new(
        ctx: &DeviceContext,
        width: u32,
        height: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
    ) -> Result<Self> {
        let (image, memory) = create_image(
            ctx,
            width,
            height,
            format,
            vk::ImageTiling::OPTIMAL,
            usage,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        let mut alloc = Self {
            device: ctx.device.clone(),
            image,
            memory,
            view: vk::ImageView::null(),
            format,
        };
        alloc.view = create_image_view(&ctx.device, image, format, aspect)?;
        Ok(alloc)
    }
}

impl Drop for ImageAllocation {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut p = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (slot, &flags) in p.memory_types.iter_mut().zip(types) {
            slot.property_flags = flags;
        }
        p
    }

    const HOST: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
        vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw()
            | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
    );

    #[test]
    fn picks_first_type_allowed_by_both_masks() {
        let p = props(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            HOST,
            HOST | vk::MemoryPropertyFlags::HOST_CACHED,
        ]);
        assert_eq!(find_memory_type(&p, 0b111, HOST).unwrap(), 1);
        // type 1 excluded by the requirement bits
        assert_eq!(find_memory_type(&p, 0b101, HOST).unwrap(), 2);
        assert_eq!(
            find_memory_type(&p, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(),
            0
        );
    }

    #[test]
    fn superset_of_requested_flags_qualifies() {
        let p = props(&[vk::MemoryPropertyFlags::DEVICE_LOCAL | HOST]);
        assert_eq!(find_memory_type(&p, 1, HOST).unwrap(), 0);
    }

    #[test]
    fn no_match_is_a_configuration_error() {
        let p = props(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        let err = find_memory_type(&p, 1, HOST).unwrap_err();
        assert!(matches!(
            err,
            RenderError::NoSuitableMemoryType { type_bits: 1, .. }
        ));
        // bits outside memory_type_count are ignored
        let err = find_memory_type(&p, 0b10, vk::MemoryPropertyFlags::DEVICE_LOCAL);
        assert!(err.is_err());
    }

    #[test]
    fn buffer_kinds_pick_their_memory() {
        assert!(!BufferKind::Vertex.is_host_visible());
        assert!(!BufferKind::Index.is_host_visible());
        assert!(BufferKind::Uniform.is_host_visible());
        assert!(BufferKind::Staging
            .usage()
            .contains(vk::BufferUsageFlags::TRANSFER_SRC));
        assert!(BufferKind::Vertex
            .usage()
            .contains(vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST));
        assert_eq!(BufferKind::Readback.memory_properties(), HOST);
    }
}
