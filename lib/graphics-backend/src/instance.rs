//! Instance bring-up and the validation debug messenger (C1), grounded in
//! the original engine's `vk_backend.cpp` instance setup (Vulkan 1.3
//! requirement, validation layers + debug messenger in debug builds).

use std::ffi::{CStr, CString};

use ash::vk;
use log::{debug, error, info, trace, warn};

use crate::error::{BackendError, Result};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

pub struct Instance {
    pub entry: ash::Entry,
    pub raw: ash::Instance,
    debug_utils: Option<ash::ext::debug_utils::Instance>,
    debug_messenger: vk::DebugUtilsMessengerEXT,
}

impl Instance {
    pub fn new(app_name: &str, extensions: &[*const i8], debug: bool) -> Result<Instance> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| BackendError::DeviceUnavailable(format!("failed to load Vulkan: {e}")))?;

        let app_name_c = CString::new(app_name).unwrap_or_default();
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name_c)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"engine")
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_3);

        let mut layers: Vec<*const i8> = Vec::new();
        if debug && Self::validation_layer_available(&entry) {
            layers.push(VALIDATION_LAYER.as_ptr());
        }

        let mut extensions = extensions.to_vec();
        if debug {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_layer_names(&layers)
            .enabled_extension_names(&extensions);

        let raw = unsafe { entry.create_instance(&create_info, None) }
            .map_err(|e| BackendError::DeviceUnavailable(format!("vkCreateInstance failed: {e}")))?;

        let (debug_utils, debug_messenger) = if debug {
            let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &raw);
            let messenger_info = Self::debug_messenger_info();
            let messenger = unsafe {
                debug_utils.create_debug_utils_messenger(&messenger_info, None)
            }
            .map_err(|e| BackendError::DeviceUnavailable(format!("debug messenger: {e}")))?;
            (Some(debug_utils), messenger)
        } else {
            (None, vk::DebugUtilsMessengerEXT::null())
        };

        Ok(Instance { entry, raw, debug_utils, debug_messenger })
    }

    fn validation_layer_available(entry: &ash::Entry) -> bool {
        let Ok(layers) = unsafe { entry.enumerate_instance_layer_properties() } else {
            return false;
        };
        layers.iter().any(|l| {
            let name = unsafe { CStr::from_ptr(l.layer_name.as_ptr()) };
            name == VALIDATION_LAYER
        })
    }

    fn debug_messenger_info<'a>() -> vk::DebugUtilsMessengerCreateInfoEXT<'a> {
        vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback))
    }
}

/// Routes validation-layer messages to the `log` facade at the severity
/// the driver reports; a Fatal-severity validation error is the §7
/// "validation-layer error in debug builds" case but is only logged here
/// — turning it into a hard abort is the caller's decision via the
/// OBJECT callback data if they choose to track one.
unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = if callback_data.is_null() {
        "<no message>".to_string()
    } else {
        let data = &*callback_data;
        if data.p_message.is_null() {
            "<no message>".to_string()
        } else {
            CStr::from_ptr(data.p_message).to_string_lossy().into_owned()
        }
    };

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(target: "vulkan", "{message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!(target: "vulkan", "{message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        info!(target: "vulkan", "{message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE) {
        trace!(target: "vulkan", "{message}");
    } else {
        debug!(target: "vulkan", "{message}");
    }

    vk::FALSE
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let Some(debug_utils) = &self.debug_utils {
                if self.debug_messenger != vk::DebugUtilsMessengerEXT::null() {
                    debug_utils.destroy_debug_utils_messenger(self.debug_messenger, None);
                }
            }
            self.raw.destroy_instance(None);
        }
    }
}
