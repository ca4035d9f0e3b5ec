// SPDX-License-Identifier: CEPL-1.0
use std::ffi::CString;

use ash::khr::swapchain;

pub const VALIDATION_LAYER: &std::ffi::CStr = c"VK_LAYER_KHRONOS_validation";

/// Instance and device creation parameters. Fixed for the lifetime of a
/// [`DeviceContext`](crate::DeviceContext).
#[derive(Clone, Debug)]
pub struct DeviceConfig {
    pub app_name: String,
    pub validation: bool,
    pub validation_layers: Vec<CString>,
    pub instance_extensions: Vec<CString>,
    pub device_extensions: Vec<CString>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            app_name: "texel".to_owned(),
            validation: cfg!(debug_assertions),
            validation_layers: vec![CString::from(VALIDATION_LAYER)],
            instance_extensions: Vec::new(),
            device_extensions: vec![CString::from(swapchain::NAME)],
        }
    }
}

impl DeviceConfig {
    /// Offscreen device: no swapchain extension, no validation.
    pub fn headless() -> Self {
        Self {
            validation: false,
            device_extensions: Vec::new(),
            ..Self::default()
        }
    }

    pub fn with_validation(mut self, on: bool) -> Self {
        self.validation = on;
        self
    }

    /// Layers actually requested at instance creation.
    pub fn enabled_layers(&self) -> &[CString] {
        if self.validation {
            &self.validation_layers
        } else {
            &[]
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PresentModePreference {
    #[default]
    Mailbox,
    Fifo,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RendererOptions {
    pub clear_color: [f32; 4],
    pub present_mode: PresentModePreference,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            present_mode: PresentModePreference::Mailbox,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_requires_swapchain() {
        let cfg = DeviceConfig::default();
        assert_eq!(cfg.device_extensions, vec![CString::from(swapchain::NAME)]);
        assert_eq!(cfg.validation, cfg!(debug_assertions));
    }

    #[test]
    fn layers_follow_the_validation_toggle() {
        let cfg = DeviceConfig::default().with_validation(false);
        assert!(cfg.enabled_layers().is_empty());
        let cfg = cfg.with_validation(true);
        assert_eq!(cfg.enabled_layers(), &[CString::from(VALIDATION_LAYER)]);
    }

    #[test]
    fn headless_needs_no_device_extensions() {
        let cfg = DeviceConfig::headless();
        assert!(cfg.device_extensions.is_empty());
        assert!(!cfg.validation);
    }
}
