// Copyright 2026 The PixelMachine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Instance
//!
//! The entry, the instance, and the instance-level loaders every other object is created from.
//! Shared through `Rc` so that surfaces and logical devices keep it alive.

use std::borrow::Cow;
use std::ffi::{CStr, CString, c_char, c_void};

use ash::vk;
use raw_window_handle::RawDisplayHandle;

use crate::config::ContextConfig;
use crate::prelude::*;

static VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

pub struct Instance {
    pub entry: ash::Entry,
    pub instance: ash::Instance,
    /// Used to access surface queries and destruction.
    pub surface_loader: ash::khr::surface::Instance,
    debug: Option<DebugMessenger>,
}

struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl Instance {
    /// Load the Vulkan library and create an instance.  With a display handle, the surface
    /// extensions for that platform are enabled as well.
    pub fn new(
        config: &ContextConfig,
        display: Option<RawDisplayHandle>,
    ) -> Result<Self, VulkanError> {
        let entry = unsafe { ash::Entry::load()? };

        // Headless instances enable no surface extensions.
        let mut extensions: Vec<*const c_char> = match display {
            Some(display) => ash_window::enumerate_required_extensions(display)?.to_vec(),
            None => Vec::new(),
        };

        let validation = config.validation && validation_available(&entry)?;
        if config.validation && !validation {
            tracing::warn!("validation requested but {VALIDATION_LAYER:?} is not installed");
        }
        let mut layers = Vec::new();
        if validation {
            layers.push(VALIDATION_LAYER.as_ptr());
            extensions.push(vk::EXT_DEBUG_UTILS_NAME.as_ptr());
        }

        let app_name = CString::new(config.app_name.as_str()).unwrap_or_default();
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"PixelMachine")
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_3);

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe { entry.create_instance(&create_info, None)? };
        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

        let debug = if validation {
            let loader = ash::ext::debug_utils::Instance::new(&entry, &instance);
            let messenger_ci = vk::DebugUtilsMessengerCreateInfoEXT::default()
                .message_severity(
                    vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                        | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                        | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
                )
                .message_type(
                    vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                        | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                        | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                )
                .pfn_user_callback(Some(debug_callback));
            match unsafe { loader.create_debug_utils_messenger(&messenger_ci, None) } {
                Ok(messenger) => Some(DebugMessenger { loader, messenger }),
                Err(e) => {
                    tracing::warn!("debug messenger unavailable: {e}");
                    None
                }
            }
        } else {
            None
        };

        tracing::info!(validation, "Vulkan instance created");

        Ok(Self {
            entry,
            instance,
            surface_loader,
            debug,
        })
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let Some(debug) = self.debug.take() {
                debug
                    .loader
                    .destroy_debug_utils_messenger(debug.messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        tracing::debug!("Vulkan instance destroyed");
    }
}

fn validation_available(entry: &ash::Entry) -> Result<bool, VulkanError> {
    let layers = unsafe { entry.enumerate_instance_layer_properties()? };
    Ok(layers
        .iter()
        .any(|layer| layer.layer_name_as_c_str() == Ok(VALIDATION_LAYER)))
}

/// Forwards validation layer output into tracing.
unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    kind: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    let message = unsafe {
        data.as_ref()
            .and_then(|data| data.message_as_c_str())
            .map(CStr::to_string_lossy)
            .unwrap_or(Cow::Borrowed("<no message>"))
    };

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        tracing::error!(target: "vulkan", ?kind, "{message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        tracing::warn!(target: "vulkan", ?kind, "{message}");
    } else {
        tracing::debug!(target: "vulkan", ?kind, "{message}");
    }
    vk::FALSE
}
