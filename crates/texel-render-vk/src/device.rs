// SPDX-License-Identifier: CEPL-1.0
//! Instance, surface, physical-device selection and the logical device.

use std::ffi::{c_char, CStr, CString};

use anyhow::{anyhow, Context, Result};
use ash::ext::debug_utils as ext_debug;
use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
use tracing::{debug, info};

use crate::config::DeviceConfig;
use crate::debug::DebugMessenger;
use crate::error::RenderError;

/// Host window handles the presentable surface is created from.
#[derive(Clone, Copy)]
pub struct SurfaceSource<'a> {
    pub window: &'a dyn HasWindowHandle,
    pub display: &'a dyn HasDisplayHandle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

pub struct SurfaceContext {
    pub loader: surface::Instance,
    pub handle: vk::SurfaceKHR,
}

// Instance-scoped objects. Released after the logical device.
struct InstanceContext {
    entry: Entry,
    instance: Instance,
    debug: Option<DebugMessenger>,
    surface: Option<SurfaceContext>,
}

impl Drop for InstanceContext {
    fn drop(&mut self) {
        unsafe {
            if let Some(s) = self.surface.take() {
                s.loader.destroy_surface(s.handle, None);
            }
            if let Some(d) = self.debug.as_mut() {
                d.destroy();
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Logical device, its queues and the physical device's capabilities.
/// Created once; owned by the renderer and dropped last.
pub struct DeviceContext {
    pub device: ash::Device,
    pub phys: vk::PhysicalDevice,
    pub families: QueueFamilies,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub max_anisotropy: f32,
    pub device_name: String,
    swapchain_loader: Option<swapchain::Device>,
    core: InstanceContext,
}

impl DeviceContext {
    // STRICT ORDER:
    // 1) instance (WSI + debug extensions, validation layers)
    // 2) debug messenger
    // 3) surface FROM THIS INSTANCE
    // 4) physical device + queue families checked AGAINST THIS SURFACE
    // 5) logical device, then queues from their own families
    pub fn new(cfg: &DeviceConfig, target: Option<SurfaceSource<'_>>) -> Result<Self> {
        let handles = match target {
            Some(t) => {
                let dh = t
                    .display
                    .display_handle()
                    .map_err(|e| anyhow!("{e}"))?
                    .as_raw();
                let wh = t
                    .window
                    .window_handle()
                    .map_err(|e| anyhow!("{e}"))?
                    .as_raw();
                Some((dh, wh))
            }
            None => None,
        };

        unsafe {
            let entry = Entry::linked();
            let instance = create_instance(&entry, cfg, handles.map(|(dh, _)| dh))
                .context("create_instance")?;
            let mut core = InstanceContext {
                entry,
                instance,
                debug: None,
                surface: None,
            };

            if cfg.validation {
                core.debug = Some(DebugMessenger::new(&core.entry, &core.instance)?);
            }

            if let Some((dh, wh)) = handles {
                let handle = ash_window::create_surface(&core.entry, &core.instance, dh, wh, None)
                    .context("ash_window::create_surface")?;
                core.surface = Some(SurfaceContext {
                    loader: surface::Instance::new(&core.entry, &core.instance),
                    handle,
                });
            }

            let (phys, families) =
                pick_physical_device(&core.instance, core.surface.as_ref(), cfg)?;
            let device = create_logical_device(&core.instance, phys, families, cfg)?;
            let graphics_queue = device.get_device_queue(families.graphics, 0);
            let present_queue = device.get_device_queue(families.present, 0);

            let props = core.instance.get_physical_device_properties(phys);
            let memory_properties = core.instance.get_physical_device_memory_properties(phys);
            let device_name = props
                .device_name_as_c_str()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let swapchain_loader = core
                .surface
                .is_some()
                .then(|| swapchain::Device::new(&core.instance, &device));

            info!(
                "vk: device \"{device_name}\", graphics family {}, present family {}, \
                 validation={}",
                families.graphics, families.present, cfg.validation
            );

            Ok(Self {
                device,
                phys,
                families,
                graphics_queue,
                present_queue,
                memory_properties,
                max_anisotropy: props.limits.max_sampler_anisotropy,
                device_name,
                swapchain_loader,
                core,
            })
        }
    }

    /// Device without a presentation surface, for uploads and tests.
    pub fn headless(cfg: &DeviceConfig) -> Result<Self> {
        Self::new(cfg, None)
    }

    pub fn instance(&self) -> &Instance {
        &self.core.instance
    }

    pub fn surface(&self) -> Result<&SurfaceContext, RenderError> {
        self.core.surface.as_ref().ok_or(RenderError::Headless)
    }

    pub fn swapchain_loader(&self) -> Result<&swapchain::Device, RenderError> {
        self.swapchain_loader.as_ref().ok_or(RenderError::Headless)
    }

    pub fn find_depth_format(&self) -> Result<vk::Format, RenderError> {
        pick_format(
            &DEPTH_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |f| unsafe {
                self.instance()
                    .get_physical_device_format_properties(self.phys, f)
            },
            "depth",
        )
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();
            self.device.destroy_device(None);
        }
    }
}

pub const DEPTH_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// First candidate whose tiling supports every requested feature. Scans the
/// whole list before failing.
pub fn pick_format(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
    props_of: impl Fn(vk::Format) -> vk::FormatProperties,
    what: &'static str,
) -> Result<vk::Format, RenderError> {
    candidates
        .iter()
        .copied()
        .find(|&f| {
            let props = props_of(f);
            let supported = if tiling == vk::ImageTiling::LINEAR {
                props.linear_tiling_features
            } else {
                props.optimal_tiling_features
            };
            supported.contains(features)
        })
        .ok_or(RenderError::NoSupportedFormat(what))
}

/// Graphics family first; the present family is the graphics one when it can
/// present, otherwise the first family that can.
pub fn select_queue_families(
    props: &[vk::QueueFamilyProperties],
    can_present: &[bool],
) -> Option<QueueFamilies> {
    let graphics = props
        .iter()
        .position(|q| q.queue_count > 0 && q.queue_flags.contains(vk::QueueFlags::GRAPHICS))?;
    let present = if can_present.get(graphics).copied().unwrap_or(false) {
        graphics
    } else {
        can_present.iter().position(|&p| p)?
    };
    Some(QueueFamilies {
        graphics: graphics as u32,
        present: present as u32,
    })
}

pub fn first_missing<'a>(available: &[&CStr], required: &'a [CString]) -> Option<&'a CString> {
    required
        .iter()
        .find(|r| !available.iter().any(|a| *a == r.as_c_str()))
}

unsafe fn create_instance(
    entry: &Entry,
    cfg: &DeviceConfig,
    display: Option<RawDisplayHandle>,
) -> Result<Instance> {
    let app = CString::new(cfg.app_name.as_str()).context("application name")?;
    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: app.as_ptr(),
        application_version: vk::make_api_version(0, 1, 0, 0),
        p_engine_name: c"texel".as_ptr(),
        engine_version: vk::make_api_version(0, 1, 0, 0),
        api_version: vk::API_VERSION_1_0,
        ..Default::default()
    };

    let mut extensions: Vec<CString> = Vec::new();
    if let Some(dh) = display {
        let required =
            ash_window::enumerate_required_extensions(dh).context("enumerate_required_extensions")?;
        extensions.extend(required.iter().map(|&p| CStr::from_ptr(p).to_owned()));
    }
    extensions.extend(cfg.instance_extensions.iter().cloned());
    if cfg.validation {
        extensions.push(CString::from(ext_debug::NAME));
    }

    let available = entry
        .enumerate_instance_extension_properties(None)
        .context("enumerate_instance_extension_properties")?;
    let names: Vec<&CStr> = available
        .iter()
        .filter_map(|e| e.extension_name_as_c_str().ok())
        .collect();
    if let Some(missing) = first_missing(&names, &extensions) {
        return Err(RenderError::MissingExtension(missing.to_string_lossy().into_owned()).into());
    }

    let layers = cfg.enabled_layers();
    if !layers.is_empty() {
        let available = entry
            .enumerate_instance_layer_properties()
            .context("enumerate_instance_layer_properties")?;
        let names: Vec<&CStr> = available
            .iter()
            .filter_map(|l| l.layer_name_as_c_str().ok())
            .collect();
        if let Some(missing) = first_missing(&names, layers) {
            return Err(RenderError::MissingLayer(missing.to_string_lossy().into_owned()).into());
        }
    }

    let ext_ptrs: Vec<*const c_char> = extensions.iter().map(|e| e.as_ptr()).collect();
    let layer_ptrs: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();
    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: ext_ptrs.len() as u32,
        pp_enabled_extension_names: ext_ptrs.as_ptr(),
        enabled_layer_count: layer_ptrs.len() as u32,
        pp_enabled_layer_names: layer_ptrs.as_ptr(),
        ..Default::default()
    };

    Ok(entry.create_instance(&create_info, None)?)
}

unsafe fn pick_physical_device(
    instance: &Instance,
    surface: Option<&SurfaceContext>,
    cfg: &DeviceConfig,
) -> Result<(vk::PhysicalDevice, QueueFamilies)> {
    for phys in instance
        .enumerate_physical_devices()
        .context("enumerate_physical_devices")?
    {
        if let Some(families) = suitability(instance, surface, cfg, phys)? {
            return Ok((phys, families));
        }
    }
    Err(RenderError::NoSuitableDevice.into())
}

unsafe fn suitability(
    instance: &Instance,
    surface: Option<&SurfaceContext>,
    cfg: &DeviceConfig,
    phys: vk::PhysicalDevice,
) -> Result<Option<QueueFamilies>> {
    let props = instance.get_physical_device_properties(phys);
    let name = props
        .device_name_as_c_str()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let qprops = instance.get_physical_device_queue_family_properties(phys);
    let mut can_present = Vec::with_capacity(qprops.len());
    for (i, q) in qprops.iter().enumerate() {
        let ok = match surface {
            Some(s) => s
                .loader
                .get_physical_device_surface_support(phys, i as u32, s.handle)
                .context("get_physical_device_surface_support")?,
            None => q.queue_flags.contains(vk::QueueFlags::GRAPHICS),
        };
        can_present.push(ok);
    }
    let Some(families) = select_queue_families(&qprops, &can_present) else {
        debug!("vk: skipping \"{name}\": no graphics/present queue family");
        return Ok(None);
    };

    let exts = instance
        .enumerate_device_extension_properties(phys)
        .context("enumerate_device_extension_properties")?;
    let ext_names: Vec<&CStr> = exts
        .iter()
        .filter_map(|e| e.extension_name_as_c_str().ok())
        .collect();
    if let Some(missing) = first_missing(&ext_names, &cfg.device_extensions) {
        debug!("vk: skipping \"{name}\": missing {missing:?}");
        return Ok(None);
    }

    if let Some(s) = surface {
        let formats = s
            .loader
            .get_physical_device_surface_formats(phys, s.handle)
            .context("get_physical_device_surface_formats")?;
        let modes = s
            .loader
            .get_physical_device_surface_present_modes(phys, s.handle)
            .context("get_physical_device_surface_present_modes")?;
        if formats.is_empty() || modes.is_empty() {
            debug!("vk: skipping \"{name}\": surface has no formats or present modes");
            return Ok(None);
        }
    }

    if instance.get_physical_device_features(phys).sampler_anisotropy != vk::TRUE {
        debug!("vk: skipping \"{name}\": no sampler anisotropy");
        return Ok(None);
    }

    Ok(Some(families))
}

unsafe fn create_logical_device(
    instance: &Instance,
    phys: vk::PhysicalDevice,
    families: QueueFamilies,
    cfg: &DeviceConfig,
) -> Result<ash::Device> {
    let priority = [1.0f32];
    let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
        .unique()
        .into_iter()
        .map(|family| vk::DeviceQueueCreateInfo {
            s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
            queue_family_index: family,
            queue_count: 1,
            p_queue_priorities: priority.as_ptr(),
            ..Default::default()
        })
        .collect();

    let features = vk::PhysicalDeviceFeatures {
        sampler_anisotropy: vk::TRUE,
        ..Default::default()
    };
    let ext_ptrs: Vec<*const c_char> = cfg.device_extensions.iter().map(|e| e.as_ptr()).collect();
    // device layers are ignored by current loaders; set for older ones
    let layer_ptrs: Vec<*const c_char> = cfg.enabled_layers().iter().map(|l| l.as_ptr()).collect();

    let create_info = vk::DeviceCreateInfo {
        s_type: vk::StructureType::DEVICE_CREATE_INFO,
        queue_create_info_count: queue_infos.len() as u32,
        p_queue_create_infos: queue_infos.as_ptr(),
        enabled_extension_count: ext_ptrs.len() as u32,
        pp_enabled_extension_names: ext_ptrs.as_ptr(),
        enabled_layer_count: layer_ptrs.len() as u32,
        pp_enabled_layer_names: layer_ptrs.as_ptr(),
        p_enabled_features: &features,
        ..Default::default()
    };
    instance
        .create_device(phys, &create_info, None)
        .context("create_device")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn shared_family_is_preferred_for_present() {
        let props = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        ];
        let f = select_queue_families(&props, &[true, true]).unwrap();
        assert_eq!(f, QueueFamilies { graphics: 1, present: 1 });
        assert!(f.is_shared());
        assert_eq!(f.unique(), vec![1]);
    }

    #[test]
    fn present_may_live_in_another_family() {
        let props = [family(vk::QueueFlags::GRAPHICS), family(vk::QueueFlags::TRANSFER)];
        let f = select_queue_families(&props, &[false, true]).unwrap();
        assert_eq!(f, QueueFamilies { graphics: 0, present: 1 });
        assert_eq!(f.unique(), vec![0, 1]);
    }

    #[test]
    fn incomplete_families_are_rejected() {
        let props = [family(vk::QueueFlags::COMPUTE)];
        assert!(select_queue_families(&props, &[true]).is_none());
        let props = [family(vk::QueueFlags::GRAPHICS)];
        assert!(select_queue_families(&props, &[false]).is_none());
    }

    #[test]
    fn format_search_scans_every_candidate() {
        let only_last = |f: vk::Format| vk::FormatProperties {
            optimal_tiling_features: if f == vk::Format::D24_UNORM_S8_UINT {
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
            } else {
                vk::FormatFeatureFlags::empty()
            },
            ..Default::default()
        };
        let picked = pick_format(
            &DEPTH_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            only_last,
            "depth",
        )
        .unwrap();
        assert_eq!(picked, vk::Format::D24_UNORM_S8_UINT);
    }

    #[test]
    fn format_search_respects_tiling() {
        let linear_only = |_| vk::FormatProperties {
            linear_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            ..Default::default()
        };
        let err = pick_format(
            &DEPTH_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            linear_only,
            "depth",
        )
        .unwrap_err();
        assert!(matches!(err, RenderError::NoSupportedFormat("depth")));
    }

    #[test]
    fn missing_names_are_reported() {
        let available = [c"VK_KHR_surface", c"VK_KHR_swapchain"];
        let required = vec![CString::from(c"VK_KHR_swapchain")];
        assert!(first_missing(&available, &required).is_none());

        let required = vec![
            CString::from(c"VK_KHR_swapchain"),
            CString::from(c"VK_EXT_debug_utils"),
        ];
        assert_eq!(
            first_missing(&available, &required),
            Some(&CString::from(c"VK_EXT_debug_utils"))
        );
    }
}
