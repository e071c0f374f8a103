// SPDX-License-Identifier: CEPL-1.0
use crate::debug::debug_callback;
use crate::error::{VkError, VkResultExt};
use anyhow::{Context, Result};
use ash::ext::debug_utils;
use ash::khr::surface;
use ash::{vk, Entry};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::{c_char, CStr};
use tracing::{info, warn};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Instance-scoped objects: loader, instance, the window surface and, in
/// debug builds, the validation messenger.
pub struct InstanceContext {
    entry: Entry,
    instance: ash::Instance,
    surface_loader: surface::Instance,
    surface: vk::SurfaceKHR,
    debug: Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl InstanceContext {
    // STRICT ORDER: instance, then the surface from this instance, then the
    // messenger. Devices are picked later against this surface.
    pub fn new(window: &dyn HasWindowHandle, display: &dyn HasDisplayHandle) -> Result<Self> {
        let dh = display.display_handle().map_err(VkError::from)?.as_raw();
        let wh = window.window_handle().map_err(VkError::from)?.as_raw();

        let entry = unsafe { Entry::load() }.map_err(VkError::from)?;
        let wsi_exts = ash_window::enumerate_required_extensions(dh)
            .call("enumerate_required_extensions")?;

        let validation = cfg!(debug_assertions) && has_layer(&entry, VALIDATION_LAYER);
        if cfg!(debug_assertions) && !validation {
            warn!("validation layer not installed; running without it");
        }
        let instance = unsafe { create_instance(&entry, wsi_exts, validation) }
            .context("create_instance")?;

        let surface_loader = surface::Instance::new(&entry, &instance);
        let surface = match unsafe { ash_window::create_surface(&entry, &instance, dh, wh, None) } {
            Ok(s) => s,
            Err(result) => {
                unsafe { instance.destroy_instance(None) };
                return Err(VkError::Vulkan {
                    call: "create_surface",
                    result,
                }
                .into());
            }
        };

        let debug = if validation {
            let loader = debug_utils::Instance::new(&entry, &instance);
            let ci = messenger_info();
            match unsafe { loader.create_debug_utils_messenger(&ci, None) } {
                Ok(m) => Some((loader, m)),
                Err(e) => {
                    warn!("debug messenger unavailable: {e}");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            entry,
            instance,
            surface_loader,
            surface,
            debug,
        })
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    pub fn surface_loader(&self) -> &surface::Instance {
        &self.surface_loader
    }
}

impl Drop for InstanceContext {
    fn drop(&mut self) {
        unsafe {
            if let Some((loader, messenger)) = self.debug.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.surface_loader.destroy_surface(self.surface, None);
            self.instance.destroy_instance(None);
        }
    }
}

fn messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    }
}

fn has_layer(entry: &Entry, name: &CStr) -> bool {
    unsafe { entry.enumerate_instance_layer_properties() }
        .unwrap_or_default()
        .iter()
        .any(|l| unsafe { CStr::from_ptr(l.layer_name.as_ptr()) } == name)
}

unsafe fn create_instance(
    entry: &Entry,
    wsi_exts: &[*const c_char],
    validation: bool,
) -> Result<ash::Instance> {
    let app = c"lumen";
    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: app.as_ptr(),
        application_version: 0,
        p_engine_name: app.as_ptr(),
        engine_version: 0,
        api_version: vk::API_VERSION_1_1,
        ..Default::default()
    };

    let mut exts = wsi_exts.to_vec();
    let mut flags = vk::InstanceCreateFlags::empty();
    if cfg!(target_os = "macos") {
        exts.push(ash::khr::portability_enumeration::NAME.as_ptr());
        exts.push(ash::khr::get_physical_device_properties2::NAME.as_ptr());
        flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    }
    if validation {
        exts.push(debug_utils::NAME.as_ptr());
    }
    let layers = [VALIDATION_LAYER.as_ptr()];
    let (enabled_layer_count, pp_enabled_layer_names) = if validation {
        (layers.len() as u32, layers.as_ptr())
    } else {
        (0, std::ptr::null())
    };

    // Chained so instance creation itself is covered by the messenger.
    let debug_ci = messenger_info();
    let p_next = if validation {
        &debug_ci as *const _ as *const std::ffi::c_void
    } else {
        std::ptr::null()
    };

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_next,
        flags,
        p_application_info: &app_info,
        enabled_extension_count: exts.len() as u32,
        pp_enabled_extension_names: exts.as_ptr(),
        enabled_layer_count,
        pp_enabled_layer_names,
        ..Default::default()
    };

    info!(
        extensions = exts.len(),
        validation, "creating Vulkan instance"
    );
    Ok(entry
        .create_instance(&create_info, None)
        .call("vkCreateInstance")?)
}
