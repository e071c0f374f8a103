// SPDX-License-Identifier: CEPL-1.0
use crate::error::{VkError, VkResultExt};
use crate::instance::InstanceContext;
use anyhow::{Context, Result};
use ash::khr::{portability_subset, swapchain};
use ash::vk;
use std::ffi::{c_char, CStr};
use tracing::{debug, info};

/// Graphics and present family indices. They may be the same family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, for `CONCURRENT` sharing.
    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// Lower is better: discrete, integrated, cpu, everything else.
pub fn device_rank(ty: vk::PhysicalDeviceType) -> u8 {
    match ty {
        vk::PhysicalDeviceType::DISCRETE_GPU => 0,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
        vk::PhysicalDeviceType::CPU => 2,
        _ => 3,
    }
}

/// A family that does both graphics and present wins; otherwise the first
/// graphics family is paired with the first present-capable family.
pub fn choose_queue_families(
    families: &[vk::QueueFamilyProperties],
    present_support: impl Fn(u32) -> bool,
) -> Option<QueueFamilies> {
    let graphics: Vec<u32> = families
        .iter()
        .enumerate()
        .filter(|(_, f)| f.queue_count > 0 && f.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|(i, _)| i as u32)
        .collect();
    let present: Vec<u32> = (0..families.len() as u32)
        .filter(|&i| present_support(i))
        .collect();

    if let Some(&both) = graphics.iter().find(|i| present.contains(i)) {
        return Some(QueueFamilies {
            graphics: both,
            present: both,
        });
    }
    Some(QueueFamilies {
        graphics: *graphics.first()?,
        present: *present.first()?,
    })
}

#[derive(Clone, Debug)]
pub struct Candidate {
    pub device_type: vk::PhysicalDeviceType,
    pub families: Option<QueueFamilies>,
    pub has_swapchain: bool,
}

impl Candidate {
    fn eligible(&self) -> bool {
        self.families.is_some() && self.has_swapchain
    }
}

/// Index of the best eligible candidate; ties go to enumeration order.
pub fn pick_candidate(candidates: &[Candidate]) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.eligible())
        .min_by_key(|&(i, c)| (device_rank(c.device_type), i))
        .map(|(i, _)| i)
}

pub struct Device {
    physical: vk::PhysicalDevice,
    device: ash::Device,
    families: QueueFamilies,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    command_pool: vk::CommandPool,
    properties: vk::PhysicalDeviceProperties,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    anisotropy: bool,
}

impl Device {
    pub fn new(ctx: &InstanceContext) -> Result<Self> {
        let instance = ctx.handle();
        let physicals =
            unsafe { instance.enumerate_physical_devices() }.call("vkEnumeratePhysicalDevices")?;
        if physicals.is_empty() {
            return Err(VkError::NoPhysicalDevice.into());
        }

        let mut candidates = Vec::with_capacity(physicals.len());
        for &phys in &physicals {
            let props = unsafe { instance.get_physical_device_properties(phys) };
            let qprops = unsafe { instance.get_physical_device_queue_family_properties(phys) };
            let families = choose_queue_families(&qprops, |i| unsafe {
                ctx.surface_loader()
                    .get_physical_device_surface_support(phys, i, ctx.surface())
                    .unwrap_or(false)
            });
            let exts = unsafe { device_extensions(instance, phys) }?;
            debug!(
                name = %device_name(&props),
                ty = ?props.device_type,
                ?families,
                "physical device candidate"
            );
            candidates.push(Candidate {
                device_type: props.device_type,
                families,
                has_swapchain: exts.iter().any(|e| e.as_c_str() == swapchain::NAME),
            });
        }

        let chosen = pick_candidate(&candidates).ok_or(VkError::NoSuitableDevice)?;
        let physical = physicals[chosen];
        let families = candidates[chosen]
            .families
            .ok_or(VkError::NoSuitableDevice)?;

        unsafe { Self::create(ctx, physical, families) }
    }

    unsafe fn create(
        ctx: &InstanceContext,
        physical: vk::PhysicalDevice,
        families: QueueFamilies,
    ) -> Result<Self> {
        let instance = ctx.handle();
        let properties = instance.get_physical_device_properties(physical);
        let memory_properties = instance.get_physical_device_memory_properties(physical);
        let supported = instance.get_physical_device_features(physical);
        let exts = device_extensions(instance, physical)?;

        let mut enabled: Vec<*const c_char> = vec![swapchain::NAME.as_ptr()];
        if exts.iter().any(|e| e.as_c_str() == portability_subset::NAME) {
            enabled.push(portability_subset::NAME.as_ptr());
        }

        let priorities = [1.0_f32];
        let qinfos: Vec<vk::DeviceQueueCreateInfo> = families
            .unique()
            .into_iter()
            .map(|family| vk::DeviceQueueCreateInfo {
                s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
                queue_family_index: family,
                queue_count: 1,
                p_queue_priorities: priorities.as_ptr(),
                ..Default::default()
            })
            .collect();

        let anisotropy = supported.sampler_anisotropy == vk::TRUE;
        let features = vk::PhysicalDeviceFeatures {
            sampler_anisotropy: supported.sampler_anisotropy,
            ..Default::default()
        };

        let dinfo = vk::DeviceCreateInfo {
            s_type: vk::StructureType::DEVICE_CREATE_INFO,
            queue_create_info_count: qinfos.len() as u32,
            p_queue_create_infos: qinfos.as_ptr(),
            enabled_extension_count: enabled.len() as u32,
            pp_enabled_extension_names: enabled.as_ptr(),
            p_enabled_features: &features,
            ..Default::default()
        };
        let device = instance
            .create_device(physical, &dinfo, None)
            .call("vkCreateDevice")?;

        let graphics_queue = device.get_device_queue(families.graphics, 0);
        let present_queue = device.get_device_queue(families.present, 0);

        let pool_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            queue_family_index: families.graphics,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            ..Default::default()
        };
        let command_pool = match device.create_command_pool(&pool_info, None) {
            Ok(p) => p,
            Err(result) => {
                device.destroy_device(None);
                return Err(VkError::Vulkan {
                    call: "vkCreateCommandPool",
                    result,
                })
                .context("device command pool");
            }
        };

        info!(
            name = %device_name(&properties),
            ty = ?properties.device_type,
            graphics = families.graphics,
            present = families.present,
            anisotropy,
            "logical device ready"
        );

        Ok(Self {
            physical,
            device,
            families,
            graphics_queue,
            present_queue,
            command_pool,
            properties,
            memory_properties,
            anisotropy,
        })
    }

    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    pub fn physical(&self) -> vk::PhysicalDevice {
        self.physical
    }

    pub fn families(&self) -> QueueFamilies {
        self.families
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    pub fn command_pool(&self) -> vk::CommandPool {
        self.command_pool
    }

    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.properties.limits
    }

    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    pub fn anisotropy_supported(&self) -> bool {
        self.anisotropy
    }

    pub fn wait_idle(&self) -> Result<(), VkError> {
        unsafe { self.device.device_wait_idle() }.call("vkDeviceWaitIdle")
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_device(None);
        }
    }
}

fn device_name(props: &vk::PhysicalDeviceProperties) -> String {
    unsafe { CStr::from_ptr(props.device_name.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

unsafe fn device_extensions(
    instance: &ash::Instance,
    phys: vk::PhysicalDevice,
) -> Result<Vec<std::ffi::CString>> {
    let props = instance
        .enumerate_device_extension_properties(phys)
        .call("vkEnumerateDeviceExtensionProperties")?;
    Ok(props
        .iter()
        .map(|e| CStr::from_ptr(e.extension_name.as_ptr()).to_owned())
        .collect())
}
