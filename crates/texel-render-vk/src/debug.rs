// SPDX-License-Identifier: CEPL-1.0
//! Validation-layer output, forwarded into `tracing`.

use std::ffi::{c_void, CStr};

use anyhow::{Context, Result};
use ash::ext::debug_utils as ext_debug;
use ash::vk;
use tracing::{debug, error, trace, warn, Dispatch, Level};

/// Log sink handed to the debug messenger through its user-data pointer.
///
/// Captures the subscriber that was current when the device was created, so
/// messages emitted on driver threads still reach it.
pub struct DebugSink {
    dispatch: Dispatch,
}

impl DebugSink {
    pub fn capture() -> Self {
        Self {
            dispatch: tracing::dispatcher::get_default(Dispatch::clone),
        }
    }

    pub fn forward(&self, severity: vk::DebugUtilsMessageSeverityFlagsEXT, message: &str) {
        let level = severity_level(severity);
        tracing::dispatcher::with_default(&self.dispatch, || {
            if level == Level::ERROR {
                error!(target: "vulkan", "{message}");
            } else if level == Level::WARN {
                warn!(target: "vulkan", "{message}");
            } else if level == Level::DEBUG {
                debug!(target: "vulkan", "{message}");
            } else {
                trace!(target: "vulkan", "{message}");
            }
        });
    }
}

pub fn severity_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> Level {
    use vk::DebugUtilsMessageSeverityFlagsEXT as S;
    if severity.contains(S::ERROR) {
        Level::ERROR
    } else if severity.contains(S::WARNING) {
        Level::WARN
    } else if severity.contains(S::INFO) {
        Level::DEBUG
    } else {
        Level::TRACE
    }
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() || user.is_null() || (*data).p_message.is_null() {
        return vk::FALSE;
    }
    let sink = &*(user as *const DebugSink);
    let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
    sink.forward(severity, &msg);
    vk::FALSE
}

/// Messenger plus the boxed sink its callback points at. Destroyed by the
/// owning instance context before the instance itself.
pub struct DebugMessenger {
    loader: ext_debug::Instance,
    handle: vk::DebugUtilsMessengerEXT,
    _sink: Box<DebugSink>,
}

impl DebugMessenger {
    pub unsafe fn new(entry: &ash::Entry, instance: &ash::Instance) -> Result<Self> {
        let loader = ext_debug::Instance::new(entry, instance);
        let sink = Box::new(DebugSink::capture());
        let ci = vk::DebugUtilsMessengerCreateInfoEXT {
            s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
            message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            pfn_user_callback: Some(debug_callback),
            p_user_data: (&*sink as *const DebugSink) as *mut c_void,
            ..Default::default()
        };
        let handle = loader
            .create_debug_utils_messenger(&ci, None)
            .context("create_debug_utils_messenger")?;
        Ok(Self {
            loader,
            handle,
            _sink: sink,
        })
    }

    pub unsafe fn destroy(&mut self) {
        if self.handle != vk::DebugUtilsMessengerEXT::null() {
            self.loader.destroy_debug_utils_messenger(self.handle, None);
            self.handle = vk::DebugUtilsMessengerEXT::null();
        }
    }
}
