// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;
use texel_render::MAX_FRAMES_IN_FLIGHT;

/// Per-slot synchronisation. Reused every `MAX_FRAMES_IN_FLIGHT` frames.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameSlot {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight: vk::Fence,
}

pub struct FrameSlots {
    device: ash::Device,
    slots: Vec<FrameSlot>,
}

impl FrameSlots {
    /// Fences start signaled so the first wait on each slot returns at once.
    pub unsafe fn new(device: &ash::Device) -> Result<Self> {
        let mut me = Self {
            device: device.clone(),
            slots: Vec::with_capacity(MAX_FRAMES_IN_FLIGHT),
        };
        let sem_ci = vk::SemaphoreCreateInfo::default();
        let fence_ci = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: vk::FenceCreateFlags::SIGNALED,
            ..Default::default()
        };
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            me.slots.push(FrameSlot::default());
            let slot = me.slots.last_mut().context("frame slot")?;
            slot.image_available = device
                .create_semaphore(&sem_ci, None)
                .context("create_semaphore(image_available)")?;
            slot.render_finished = device
                .create_semaphore(&sem_ci, None)
                .context("create_semaphore(render_finished)")?;
            slot.in_flight = device
                .create_fence(&fence_ci, None)
                .context("create_fence(in_flight)")?;
        }
        Ok(me)
    }

    pub fn get(&self, slot: usize) -> Result<&FrameSlot> {
        self.slots
            .get(slot)
            .with_context(|| format!("frame slot {slot} out of range"))
    }

    pub unsafe fn wait(&self, slot: usize) -> Result<()> {
        let fence = self.get(slot)?.in_flight;
        self.device
            .wait_for_fences(&[fence], true, u64::MAX)
            .context("wait_for_fences(in_flight)")
    }

    pub unsafe fn reset(&self, slot: usize) -> Result<()> {
        let fence = self.get(slot)?.in_flight;
        self.device
            .reset_fences(&[fence])
            .context("reset_fences(in_flight)")
    }
}

impl Drop for FrameSlots {
    fn drop(&mut self) {
        unsafe {
            for s in &self.slots {
                self.device.destroy_fence(s.in_flight, None);
                self.device.destroy_semaphore(s.render_finished, None);
                self.device.destroy_semaphore(s.image_available, None);
            }
        }
    }
}
