// SPDX-License-Identifier: CEPL-1.0
use crate::allocator::{Allocator, GpuImage};
use crate::device::Device;
use crate::error::{VkError, VkResultExt};
use crate::frame::{Acquire, Present};
use crate::instance::InstanceContext;
use crate::pipeline::depth_aspect;
use anyhow::{Context, Result};
use ash::khr::swapchain;
use ash::vk;
use lumen_render::{PresentPreference, RenderSize};
use tracing::{debug, info};

/// `None` while the surface has no area (a minimised window): no swapchain
/// can be created until it grows again.
pub fn choose_extent(
    caps: &vk::SurfaceCapabilitiesKHR,
    requested: RenderSize,
) -> Option<vk::Extent2D> {
    let extent = if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: requested
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: requested
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    };
    (extent.width > 0 && extent.height > 0).then_some(extent)
}

/// One more than the minimum, capped by the maximum (0 = no maximum).
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = caps.min_image_count.saturating_add(1);
    if caps.max_image_count > 0 {
        count.min(caps.max_image_count)
    } else {
        count
    }
}

pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    let srgb = |format| {
        formats.iter().copied().find(|f| {
            f.format == format && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
    };
    srgb(vk::Format::B8G8R8A8_SRGB)
        .or_else(|| srgb(vk::Format::R8G8B8A8_SRGB))
        .or_else(|| formats.first().copied())
}

pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    preference: PresentPreference,
) -> vk::PresentModeKHR {
    match preference {
        PresentPreference::Mailbox if modes.contains(&vk::PresentModeKHR::MAILBOX) => {
            vk::PresentModeKHR::MAILBOX
        }
        _ => vk::PresentModeKHR::FIFO,
    }
}

fn choose_transform(caps: &vk::SurfaceCapabilitiesKHR) -> vk::SurfaceTransformFlagsKHR {
    if caps
        .supported_transforms
        .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
    {
        vk::SurfaceTransformFlagsKHR::IDENTITY
    } else {
        caps.current_transform
    }
}

fn choose_composite_alpha(caps: &vk::SurfaceCapabilitiesKHR) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
    ]
    .into_iter()
    .find(|&a| caps.supported_composite_alpha.contains(a))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::INHERIT)
}

fn surface_caps(ctx: &InstanceContext, device: &Device) -> Result<vk::SurfaceCapabilitiesKHR> {
    let caps = unsafe {
        ctx.surface_loader()
            .get_physical_device_surface_capabilities(device.physical(), ctx.surface())
    }
    .call("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?;
    Ok(caps)
}

/// Build one `U` per item. On failure everything built so far is handed to
/// `destroy` before the error is returned.
pub fn create_per_image<T, U>(
    items: &[T],
    mut create: impl FnMut(&T) -> Result<U, VkError>,
    mut destroy: impl FnMut(U),
) -> Result<Vec<U>, VkError> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match create(item) {
            Ok(u) => out.push(u),
            Err(e) => {
                out.into_iter().for_each(&mut destroy);
                return Err(e);
            }
        }
    }
    Ok(out)
}

/// Attachment order matches the main render pass: colour, depth, resolve.
pub fn framebuffer_attachments(
    swap_view: vk::ImageView,
    depth_view: vk::ImageView,
    msaa_view: Option<vk::ImageView>,
) -> Vec<vk::ImageView> {
    match msaa_view {
        Some(msaa) => vec![msaa, depth_view, swap_view],
        None => vec![swap_view, depth_view],
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SwapchainConfig {
    pub depth_format: vk::Format,
    pub samples: vk::SampleCountFlags,
    pub present: PresentPreference,
}

struct Attachment {
    image: GpuImage,
    view: vk::ImageView,
}

fn attachment(
    alloc: &mut Allocator,
    extent: vk::Extent2D,
    format: vk::Format,
    usage: vk::ImageUsageFlags,
    aspect: vk::ImageAspectFlags,
    samples: vk::SampleCountFlags,
) -> Result<Attachment> {
    let image = alloc.create_image(extent, format, usage, 1, samples)?;
    match alloc.create_image_view(image.handle(), format, aspect, 1) {
        Ok(view) => Ok(Attachment { image, view }),
        Err(e) => {
            alloc.destroy_image(image);
            Err(e.into())
        }
    }
}

/// The presentable chain plus everything sized to it: image views, the
/// shared depth target, the optional multisample colour target and one
/// framebuffer per image.
pub struct Swapchain {
    loader: swapchain::Device,
    handle: vk::SwapchainKHR,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    depth: Option<Attachment>,
    msaa: Option<Attachment>,
    framebuffers: Vec<vk::Framebuffer>,
}

impl Swapchain {
    pub fn surface_format(ctx: &InstanceContext, device: &Device) -> Result<vk::SurfaceFormatKHR> {
        let formats = unsafe {
            ctx.surface_loader()
                .get_physical_device_surface_formats(device.physical(), ctx.surface())
        }
        .call("vkGetPhysicalDeviceSurfaceFormatsKHR")?;
        Ok(choose_surface_format(&formats).ok_or(VkError::NoSuitableDevice)?)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ctx: &InstanceContext,
        device: &Device,
        alloc: &mut Allocator,
        render_pass: vk::RenderPass,
        format: vk::SurfaceFormatKHR,
        requested: RenderSize,
        cfg: &SwapchainConfig,
        old: vk::SwapchainKHR,
    ) -> Result<Self> {
        let loader = swapchain::Device::new(ctx.handle(), device.handle());
        let surf = ctx.surface_loader();
        let phys = device.physical();
        let caps = surface_caps(ctx, device)?;
        let modes = unsafe { surf.get_physical_device_surface_present_modes(phys, ctx.surface()) }
            .call("vkGetPhysicalDeviceSurfacePresentModesKHR")?;

        let extent = choose_extent(&caps, requested).ok_or(VkError::SurfaceHidden)?;
        let present_mode = choose_present_mode(&modes, cfg.present);
        let min_image_count = choose_image_count(&caps);
        let families = device.families().unique();
        let (sharing, family_count, p_families) = if families.len() > 1 {
            (
                vk::SharingMode::CONCURRENT,
                families.len() as u32,
                families.as_ptr(),
            )
        } else {
            (vk::SharingMode::EXCLUSIVE, 0, std::ptr::null())
        };

        let info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: ctx.surface(),
            min_image_count,
            image_format: format.format,
            image_color_space: format.color_space,
            image_extent: extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: sharing,
            queue_family_index_count: family_count,
            p_queue_family_indices: p_families,
            pre_transform: choose_transform(&caps),
            composite_alpha: choose_composite_alpha(&caps),
            present_mode,
            clipped: vk::TRUE,
            old_swapchain: old,
            ..Default::default()
        };
        let handle = unsafe { loader.create_swapchain(&info, None) }.call("vkCreateSwapchainKHR")?;

        let mut chain = Self {
            loader,
            handle,
            format,
            extent,
            images: Vec::new(),
            views: Vec::new(),
            depth: None,
            msaa: None,
            framebuffers: Vec::new(),
        };
        // From here on `chain` owns what exists; on error it is torn down.
        if let Err(e) = chain.build_views(device, alloc, render_pass, cfg) {
            chain.destroy(device.handle(), alloc);
            return Err(e);
        }

        info!(
            width = extent.width,
            height = extent.height,
            images = chain.images.len(),
            mode = ?present_mode,
            format = ?format.format,
            samples = ?cfg.samples,
            "swapchain ready"
        );
        Ok(chain)
    }

    fn build_views(
        &mut self,
        device: &Device,
        alloc: &mut Allocator,
        render_pass: vk::RenderPass,
        cfg: &SwapchainConfig,
    ) -> Result<()> {
        let d = device.handle();
        self.images = unsafe { self.loader.get_swapchain_images(self.handle) }
            .call("vkGetSwapchainImagesKHR")?;
        self.views = create_per_image(
            &self.images,
            |&img| {
                alloc.create_image_view(img, self.format.format, vk::ImageAspectFlags::COLOR, 1)
            },
            |view| unsafe { d.destroy_image_view(view, None) },
        )?;
        self.depth = Some(attachment(
            alloc,
            self.extent,
            cfg.depth_format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            depth_aspect(cfg.depth_format),
            cfg.samples,
        )?);
        if cfg.samples != vk::SampleCountFlags::TYPE_1 {
            self.msaa = Some(attachment(
                alloc,
                self.extent,
                self.format.format,
                vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
                vk::ImageAspectFlags::COLOR,
                cfg.samples,
            )?);
        }

        let depth_view = self.depth.as_ref().map_or(vk::ImageView::null(), |a| a.view);
        let msaa_view = self.msaa.as_ref().map(|m| m.view);
        let extent = self.extent;
        self.framebuffers = create_per_image(
            &self.views,
            |&view| {
                let attachments = framebuffer_attachments(view, depth_view, msaa_view);
                let ci = vk::FramebufferCreateInfo {
                    s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
                    render_pass,
                    attachment_count: attachments.len() as u32,
                    p_attachments: attachments.as_ptr(),
                    width: extent.width,
                    height: extent.height,
                    layers: 1,
                    ..Default::default()
                };
                unsafe { d.create_framebuffer(&ci, None) }.call("vkCreateFramebuffer")
            },
            |fb| unsafe { d.destroy_framebuffer(fb, None) },
        )?;
        debug_assert_eq!(self.framebuffers.len(), self.images.len());
        Ok(())
    }

    /// Rebuild against the current window size. The old chain is passed as
    /// a hint and destroyed only after the new one exists. Returns `false`
    /// without touching anything when the surface currently has no area.
    #[allow(clippy::too_many_arguments)]
    pub fn recreate(
        &mut self,
        ctx: &InstanceContext,
        device: &Device,
        alloc: &mut Allocator,
        render_pass: vk::RenderPass,
        window: RenderSize,
        cfg: &SwapchainConfig,
    ) -> Result<bool> {
        let caps = surface_caps(ctx, device)?;
        if choose_extent(&caps, window).is_none() {
            debug!(
                width = window.width,
                height = window.height,
                "surface has no area; swapchain rebuild deferred"
            );
            return Ok(false);
        }
        device.wait_idle()?;
        let next = Swapchain::new(
            ctx,
            device,
            alloc,
            render_pass,
            self.format,
            window,
            cfg,
            self.handle,
        )
        .context("recreating swapchain")?;
        let mut old = std::mem::replace(self, next);
        old.destroy(device.handle(), alloc);
        debug!(
            width = self.extent.width,
            height = self.extent.height,
            "swapchain recreated"
        );
        Ok(true)
    }

    /// Framebuffers, views and attachments first, then the chain itself.
    /// Leaves `self` empty; calling it twice is harmless.
    pub fn destroy(&mut self, device: &ash::Device, alloc: &mut Allocator) {
        unsafe {
            for fb in self.framebuffers.drain(..) {
                device.destroy_framebuffer(fb, None);
            }
            for view in self.views.drain(..) {
                device.destroy_image_view(view, None);
            }
        }
        for target in [self.depth.take(), self.msaa.take()].into_iter().flatten() {
            alloc.destroy_image_view(target.view);
            alloc.destroy_image(target.image);
        }
        self.images.clear();
        if self.handle != vk::SwapchainKHR::null() {
            unsafe { self.loader.destroy_swapchain(self.handle, None) };
            self.handle = vk::SwapchainKHR::null();
        }
    }

    pub fn acquire(&self, semaphore: vk::Semaphore) -> Result<Acquire, VkError> {
        match unsafe {
            self.loader
                .acquire_next_image(self.handle, u64::MAX, semaphore, vk::Fence::null())
        } {
            Ok((image_index, suboptimal)) => Ok(Acquire::Ready {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquire::OutOfDate),
            Err(result) => Err(VkError::Vulkan {
                call: "vkAcquireNextImageKHR",
                result,
            }),
        }
    }

    pub fn present(
        &self,
        queue: vk::Queue,
        wait: vk::Semaphore,
        image_index: u32,
    ) -> Result<Present, VkError> {
        let info = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait,
            swapchain_count: 1,
            p_swapchains: &self.handle,
            p_image_indices: &image_index,
            ..Default::default()
        };
        match unsafe { self.loader.queue_present(queue, &info) } {
            Ok(false) => Ok(Present::Optimal),
            Ok(true) => Ok(Present::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Present::OutOfDate),
            Err(result) => Err(VkError::Vulkan {
                call: "vkQueuePresentKHR",
                result,
            }),
        }
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn framebuffer(&self, image_index: u32) -> vk::Framebuffer {
        self.framebuffers[image_index as usize]
    }
}
