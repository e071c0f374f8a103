// SPDX-License-Identifier: CEPL-1.0
//! Vulkan side of the frame loop: per-slot sync objects and uniforms, the
//! shadow map, pipelines, and the GPU copy of the current scene.

use crate::allocator::{
    Allocator, GpuBuffer, GpuImage, HostAccess, SampledTexture, SamplerDesc, NORMAL_MAP_FORMAT,
    TEXTURE_FORMAT,
};
use crate::device::Device;
use crate::error::{VkError, VkResultExt};
use crate::frame::{
    wait_with_watchdog, Acquire, ClearValues, DepthBias, FrameBackend, PassKind, Present, Resident,
    Viewport,
};
use crate::instance::InstanceContext;
use crate::mips::mip_level_count;
use crate::pipeline::{
    build_pipeline, create_frame_set_layout, create_main_render_pass, create_material_set_layout,
    create_shadow_render_pass, push_constant_range, shadow_compare_op, usable_samples, Pipeline,
    PipelineDesc,
};
use crate::swapchain::{Swapchain, SwapchainConfig};
use crate::uniforms::{FrameUniforms, PushConstants};
use anyhow::{Context, Result};
use ash::vk;
use lumen_math::DepthConvention;
use lumen_render::{RenderSettings, RenderSize, Scene, TextureData, Vertex};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::slice::from_ref;
use tracing::{debug, info, warn};

const FRAME_UBO_SIZE: vk::DeviceSize = std::mem::size_of::<FrameUniforms>() as vk::DeviceSize;

/// One uniform buffer and one shadow-map sampler per frame slot.
pub fn frame_pool_sizes(frames: u32) -> [vk::DescriptorPoolSize; 2] {
    [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: frames,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: frames,
        },
    ]
}

/// Base colour plus normal map per material.
pub fn material_pool_sizes(materials: u32) -> [vk::DescriptorPoolSize; 1] {
    [vk::DescriptorPoolSize {
        ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        descriptor_count: materials * 2,
    }]
}

/// Upload format per scene texture: normal maps are linear, everything
/// else (including a texture used both ways) is sRGB.
pub fn texture_formats(scene: &Scene) -> Vec<vk::Format> {
    let mut formats = vec![TEXTURE_FORMAT; scene.textures.len()];
    for index in scene.materials.iter().filter_map(|m| m.normal_map) {
        if let Some(f) = formats.get_mut(index) {
            *f = NORMAL_MAP_FORMAT;
        }
    }
    for index in scene.materials.iter().filter_map(|m| m.base_color) {
        if let Some(f) = formats.get_mut(index) {
            *f = TEXTURE_FORMAT;
        }
    }
    formats
}

/// Outside the light frustum counts as unoccluded: the border is the far
/// value of the depth convention.
pub fn shadow_border(depth: DepthConvention) -> vk::BorderColor {
    match depth {
        DepthConvention::Standard => vk::BorderColor::FLOAT_OPAQUE_WHITE,
        DepthConvention::Reversed => vk::BorderColor::FLOAT_TRANSPARENT_BLACK,
    }
}

pub fn upload_texture(
    alloc: &mut Allocator,
    texture: &TextureData,
    format: vk::Format,
) -> Result<SampledTexture> {
    let extent = vk::Extent2D {
        width: texture.width,
        height: texture.height,
    };
    alloc.create_texture_image(
        &texture.pixels,
        extent,
        mip_level_count(texture.width, texture.height),
        format,
    )
}

struct FrameSlot {
    command_buffer: vk::CommandBuffer,
    image_available: vk::Semaphore,
    render_finished: vk::Semaphore,
    in_flight: vk::Fence,
    uniforms: GpuBuffer,
    descriptor_set: vk::DescriptorSet,
}

/// The image itself is released by the allocator at teardown.
struct ShadowMap {
    image: GpuImage,
    view: vk::ImageView,
    sampler: vk::Sampler,
    framebuffer: vk::Framebuffer,
}

struct Fallback {
    white: SampledTexture,
    flat_normal: SampledTexture,
}

struct SceneResources {
    resident: Resident,
    vertices: GpuBuffer,
    indices: GpuBuffer,
    textures: Vec<SampledTexture>,
    sampler: vk::Sampler,
    pool: vk::DescriptorPool,
    material_sets: Vec<vk::DescriptorSet>,
}

pub struct VulkanBackend {
    settings: RenderSettings,
    swapchain_cfg: SwapchainConfig,
    main_pass: vk::RenderPass,
    shadow_pass: vk::RenderPass,
    frame_layout: vk::DescriptorSetLayout,
    material_layout: vk::DescriptorSetLayout,
    scene_pipeline: Pipeline,
    shadow_pipeline: Pipeline,
    frame_pool: vk::DescriptorPool,
    slots: Vec<FrameSlot>,
    shadow: ShadowMap,
    fallback: Option<Fallback>,
    scene: Option<SceneResources>,
    swapchain: Swapchain,
    // Declaration order is drop order: allocator, then device, then instance.
    allocator: Allocator,
    device: Device,
    ctx: InstanceContext,
}

impl VulkanBackend {
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        settings: &RenderSettings,
    ) -> Result<Self> {
        let ctx = InstanceContext::new(window, display)?;
        let device = Device::new(&ctx)?;
        let mut allocator = Allocator::new(&ctx, &device);
        let d = device.handle();

        let samples = usable_samples(device.limits(), settings.msaa_samples);
        let depth_format = allocator.pick_depth_format(false);
        let shadow_format = allocator.pick_depth_format(true);
        let surface_format = Swapchain::surface_format(&ctx, &device)?;

        let main_pass = create_main_render_pass(d, surface_format.format, depth_format, samples)?;
        let shadow_pass = create_shadow_render_pass(d, shadow_format)?;
        let frame_layout = create_frame_set_layout(d)?;
        let material_layout = create_material_set_layout(d)?;
        let scene_pipeline = build_pipeline(
            d,
            main_pass,
            &[frame_layout, material_layout],
            &PipelineDesc::scene(&settings.shader_dir, settings.depth, samples),
        )
        .context("scene pipeline")?;
        let shadow_pipeline = build_pipeline(
            d,
            shadow_pass,
            &[frame_layout],
            &PipelineDesc::shadow(&settings.shader_dir, settings.depth),
        )
        .context("shadow pipeline")?;

        let swapchain_cfg = SwapchainConfig {
            depth_format,
            samples,
            present: settings.present,
        };
        let swapchain = Swapchain::new(
            &ctx,
            &device,
            &mut allocator,
            main_pass,
            surface_format,
            size,
            &swapchain_cfg,
            vk::SwapchainKHR::null(),
        )?;

        let shadow = create_shadow_map(d, &mut allocator, shadow_pass, shadow_format, settings)?;
        let fallback = Fallback {
            white: upload_texture(
                &mut allocator,
                &TextureData::solid(1, 1, [255; 4]),
                TEXTURE_FORMAT,
            )?,
            flat_normal: upload_texture(
                &mut allocator,
                &TextureData::solid(1, 1, [128, 128, 255, 255]),
                NORMAL_MAP_FORMAT,
            )?,
        };

        let frames = settings.frames_in_flight();
        let frame_pool = create_pool(d, frames as u32, &frame_pool_sizes(frames as u32))?;
        let slots = create_slots(
            d,
            device.command_pool(),
            &mut allocator,
            frame_pool,
            frame_layout,
            &shadow,
            frames,
        )?;

        info!(
            frames,
            samples = ?samples,
            depth = ?settings.depth,
            depth_format = ?depth_format,
            shadow_format = ?shadow_format,
            shadow_size = shadow.image.extent.width,
            "vulkan backend ready"
        );
        Ok(Self {
            settings: settings.clone(),
            swapchain_cfg,
            main_pass,
            shadow_pass,
            frame_layout,
            material_layout,
            scene_pipeline,
            shadow_pipeline,
            frame_pool,
            slots,
            shadow,
            fallback: Some(fallback),
            scene: None,
            swapchain,
            allocator,
            device,
            ctx,
        })
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Replace whatever scene is resident. Every transfer has finished when
    /// this returns.
    pub fn upload_scene(&mut self, scene: &Scene) -> Result<()> {
        scene.validate()?;
        self.device.wait_idle()?;
        self.release_scene();

        let (vertices, indices) =
            self.upload_vertex_index_buffers(&scene.vertices, &scene.indices)?;
        let mut textures = Vec::with_capacity(scene.textures.len());
        for (i, (texture, format)) in scene
            .textures
            .iter()
            .zip(texture_formats(scene))
            .enumerate()
        {
            textures.push(
                upload_texture(&mut self.allocator, texture, format)
                    .with_context(|| format!("scene texture {i}"))?,
            );
        }
        let levels = textures
            .iter()
            .map(SampledTexture::mip_levels)
            .max()
            .unwrap_or(1);
        let sampler = self.allocator.create_sampler(&SamplerDesc {
            anisotropy: self.settings.anisotropy,
            mip_levels: levels,
            ..SamplerDesc::default()
        })?;

        let d = self.device.handle();
        let material_count = scene.materials.len().max(1) as u32;
        let pool = create_pool(d, material_count, &material_pool_sizes(material_count))?;
        let layouts = vec![self.material_layout; material_count as usize];
        let ai = vk::DescriptorSetAllocateInfo {
            s_type: vk::StructureType::DESCRIPTOR_SET_ALLOCATE_INFO,
            descriptor_pool: pool,
            descriptor_set_count: material_count,
            p_set_layouts: layouts.as_ptr(),
            ..Default::default()
        };
        let material_sets =
            unsafe { d.allocate_descriptor_sets(&ai) }.call("vkAllocateDescriptorSets")?;

        let fallback = self.fallback.as_ref().context("fallback textures released")?;
        for (i, &set) in material_sets.iter().enumerate() {
            let material = scene.materials.get(i);
            let base = material
                .and_then(|m| m.base_color)
                .and_then(|t| textures.get(t))
                .unwrap_or(&fallback.white);
            let normal = material
                .and_then(|m| m.normal_map)
                .and_then(|t| textures.get(t))
                .unwrap_or(&fallback.flat_normal);
            write_material_set(d, set, base.descriptor(sampler), normal.descriptor(sampler));
        }

        info!(
            vertices = scene.vertices.len(),
            indices = scene.indices.len(),
            textures = textures.len(),
            materials = material_sets.len(),
            primitives = scene.primitive_count(),
            "scene resident"
        );
        self.scene = Some(SceneResources {
            resident: Resident {
                indices: scene.indices.len() as u64,
                materials: scene.materials.len(),
            },
            vertices,
            indices,
            textures,
            sampler,
            pool,
            material_sets,
        });
        Ok(())
    }

    /// Device-local vertex and index buffers filled through staging copies.
    pub fn upload_vertex_index_buffers(
        &mut self,
        vertices: &[Vertex],
        indices: &[u32],
    ) -> Result<(GpuBuffer, GpuBuffer)> {
        let vertex_bytes: &[u8] = bytemuck::cast_slice(vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(indices);
        let vb = self.allocator.create_buffer(
            vertex_bytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            HostAccess::None,
        )?;
        self.allocator
            .upload_to_buffer(&vb, vertex_bytes)
            .context("vertex upload")?;
        let ib = self.allocator.create_buffer(
            index_bytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            HostAccess::None,
        )?;
        self.allocator
            .upload_to_buffer(&ib, index_bytes)
            .context("index upload")?;
        debug!(
            vertex_bytes = vertex_bytes.len(),
            index_bytes = index_bytes.len(),
            "geometry uploaded"
        );
        Ok((vb, ib))
    }

    /// Caller guarantees the device is idle.
    fn release_scene(&mut self) {
        if let Some(scene) = self.scene.take() {
            unsafe {
                self.device
                    .handle()
                    .destroy_descriptor_pool(scene.pool, None)
            };
            self.allocator.destroy_sampler(scene.sampler);
            for texture in scene.textures {
                self.allocator.destroy_texture(texture);
            }
            self.allocator.destroy_buffer(scene.vertices);
            self.allocator.destroy_buffer(scene.indices);
        }
    }

    fn pipeline(&self, pass: PassKind) -> &Pipeline {
        match pass {
            PassKind::Shadow => &self.shadow_pipeline,
            PassKind::Main => &self.scene_pipeline,
        }
    }

    fn cmd(&self, slot: usize) -> vk::CommandBuffer {
        self.slots[slot].command_buffer
    }
}

impl FrameBackend for VulkanBackend {
    fn extent(&self) -> RenderSize {
        let e = self.swapchain.extent();
        RenderSize::new(e.width, e.height)
    }

    fn shadow_extent(&self) -> RenderSize {
        let e = self.shadow.image.extent;
        RenderSize::new(e.width, e.height)
    }

    fn resident(&self) -> Resident {
        self.scene.as_ref().map_or(Resident::default(), |s| s.resident)
    }

    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        let d = self.device.handle();
        let fence = self.slots[slot].in_flight;
        wait_with_watchdog(
            "frame fence",
            self.settings.fence_timeout_ms,
            self.settings.max_fence_timeouts,
            |timeout| match unsafe { d.wait_for_fences(from_ref(&fence), true, timeout) } {
                Ok(()) => Ok(true),
                Err(vk::Result::TIMEOUT) => Ok(false),
                Err(result) => Err(VkError::Vulkan {
                    call: "vkWaitForFences",
                    result,
                }),
            },
        )?;
        Ok(())
    }

    fn acquire_image(&mut self, slot: usize) -> Result<Acquire> {
        Ok(self.swapchain.acquire(self.slots[slot].image_available)?)
    }

    fn replace_image_available(&mut self, slot: usize) -> Result<()> {
        let d = self.device.handle();
        let fresh = create_semaphore(d)?;
        let stale = std::mem::replace(&mut self.slots[slot].image_available, fresh);
        unsafe { d.destroy_semaphore(stale, None) };
        Ok(())
    }

    fn recreate_swapchain(&mut self, size: RenderSize) -> Result<bool> {
        if size.is_empty() {
            debug!("zero-sized window; swapchain left as is");
            return Ok(false);
        }
        self.swapchain.recreate(
            &self.ctx,
            &self.device,
            &mut self.allocator,
            self.main_pass,
            size,
            &self.swapchain_cfg,
        )
    }

    fn write_uniforms(&mut self, slot: usize, uniforms: &FrameUniforms) -> Result<()> {
        self.allocator
            .upload_to_buffer_direct(&self.slots[slot].uniforms, bytemuck::bytes_of(uniforms))?;
        Ok(())
    }

    fn begin_recording(&mut self, slot: usize) -> Result<()> {
        let d = self.device.handle();
        let s = &self.slots[slot];
        let bi = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        unsafe {
            d.reset_fences(from_ref(&s.in_flight)).call("vkResetFences")?;
            d.reset_command_buffer(s.command_buffer, vk::CommandBufferResetFlags::empty())
                .call("vkResetCommandBuffer")?;
            d.begin_command_buffer(s.command_buffer, &bi)
                .call("vkBeginCommandBuffer")?;
        }
        Ok(())
    }

    fn begin_pass(&mut self, slot: usize, pass: PassKind, image_index: u32, clear: &ClearValues) {
        let clears = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: clear.color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: clear.depth,
                    stencil: 0,
                },
            },
        ];
        let (render_pass, framebuffer, extent, clears) = match pass {
            PassKind::Shadow => (
                self.shadow_pass,
                self.shadow.framebuffer,
                self.shadow.image.extent,
                &clears[1..],
            ),
            PassKind::Main => (
                self.main_pass,
                self.swapchain.framebuffer(image_index),
                self.swapchain.extent(),
                &clears[..],
            ),
        };
        let bi = vk::RenderPassBeginInfo {
            s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
            render_pass,
            framebuffer,
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
            clear_value_count: clears.len() as u32,
            p_clear_values: clears.as_ptr(),
            ..Default::default()
        };
        unsafe {
            self.device
                .handle()
                .cmd_begin_render_pass(self.cmd(slot), &bi, vk::SubpassContents::INLINE)
        };
    }

    fn set_viewport(&mut self, slot: usize, viewport: &Viewport, scissor: RenderSize) {
        let vp = vk::Viewport {
            x: viewport.x,
            y: viewport.y,
            width: viewport.width,
            height: viewport.height,
            min_depth: viewport.min_depth,
            max_depth: viewport.max_depth,
        };
        let sc = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: vk::Extent2D {
                width: scissor.width,
                height: scissor.height,
            },
        };
        let d = self.device.handle();
        unsafe {
            d.cmd_set_viewport(self.cmd(slot), 0, from_ref(&vp));
            d.cmd_set_scissor(self.cmd(slot), 0, from_ref(&sc));
        }
    }

    fn set_depth_bias(&mut self, slot: usize, bias: DepthBias) {
        unsafe {
            self.device
                .handle()
                .cmd_set_depth_bias(self.cmd(slot), bias.constant, 0.0, bias.slope)
        };
    }

    fn bind_pipeline(&mut self, slot: usize, pass: PassKind) {
        unsafe {
            self.device.handle().cmd_bind_pipeline(
                self.cmd(slot),
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline(pass).pipeline,
            )
        };
    }

    fn bind_geometry(&mut self, slot: usize) {
        let Some(scene) = &self.scene else {
            return;
        };
        let d = self.device.handle();
        unsafe {
            d.cmd_bind_vertex_buffers(self.cmd(slot), 0, &[scene.vertices.handle()], &[0]);
            d.cmd_bind_index_buffer(
                self.cmd(slot),
                scene.indices.handle(),
                0,
                vk::IndexType::UINT32,
            );
        }
    }

    fn bind_frame_set(&mut self, slot: usize, pass: PassKind) {
        unsafe {
            self.device.handle().cmd_bind_descriptor_sets(
                self.cmd(slot),
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline(pass).layout,
                0,
                from_ref(&self.slots[slot].descriptor_set),
                &[],
            )
        };
    }

    fn bind_material(&mut self, slot: usize, material: usize) {
        let Some(set) = self.scene.as_ref().and_then(|s| {
            s.material_sets
                .get(material)
                .or_else(|| s.material_sets.first())
        }) else {
            return;
        };
        unsafe {
            self.device.handle().cmd_bind_descriptor_sets(
                self.cmd(slot),
                vk::PipelineBindPoint::GRAPHICS,
                self.scene_pipeline.layout,
                1,
                from_ref(set),
                &[],
            )
        };
    }

    fn push_constants(&mut self, slot: usize, pass: PassKind, constants: &PushConstants) {
        unsafe {
            self.device.handle().cmd_push_constants(
                self.cmd(slot),
                self.pipeline(pass).layout,
                push_constant_range().stage_flags,
                0,
                bytemuck::bytes_of(constants),
            )
        };
    }

    fn draw_indexed(&mut self, slot: usize, index_count: u32, first_index: u32) {
        unsafe {
            self.device
                .handle()
                .cmd_draw_indexed(self.cmd(slot), index_count, 1, first_index, 0, 0)
        };
    }

    fn end_pass(&mut self, slot: usize) {
        unsafe { self.device.handle().cmd_end_render_pass(self.cmd(slot)) };
    }

    fn end_recording(&mut self, slot: usize) -> Result<()> {
        unsafe { self.device.handle().end_command_buffer(self.cmd(slot)) }
            .call("vkEndCommandBuffer")?;
        Ok(())
    }

    fn submit(&mut self, slot: usize, _image_index: u32) -> Result<()> {
        let s = &self.slots[slot];
        let wait_stage = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        let si = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &s.image_available,
            p_wait_dst_stage_mask: &wait_stage,
            command_buffer_count: 1,
            p_command_buffers: &s.command_buffer,
            signal_semaphore_count: 1,
            p_signal_semaphores: &s.render_finished,
            ..Default::default()
        };
        unsafe {
            self.device
                .handle()
                .queue_submit(self.device.graphics_queue(), from_ref(&si), s.in_flight)
        }
        .call("vkQueueSubmit")?;
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<Present> {
        Ok(self.swapchain.present(
            self.device.present_queue(),
            self.slots[slot].render_finished,
            image_index,
        )?)
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            warn!(error = %e, "device not idle at teardown");
        }
        self.release_scene();
        let d = self.device.handle().clone();
        for slot in self.slots.drain(..) {
            unsafe {
                d.destroy_semaphore(slot.image_available, None);
                d.destroy_semaphore(slot.render_finished, None);
                d.destroy_fence(slot.in_flight, None);
            }
            self.allocator.destroy_buffer(slot.uniforms);
        }
        if let Some(fallback) = self.fallback.take() {
            self.allocator.destroy_texture(fallback.white);
            self.allocator.destroy_texture(fallback.flat_normal);
        }
        self.swapchain.destroy(&d, &mut self.allocator);
        unsafe {
            d.destroy_descriptor_pool(self.frame_pool, None);
            d.destroy_framebuffer(self.shadow.framebuffer, None);
            d.destroy_image_view(self.shadow.view, None);
            d.destroy_sampler(self.shadow.sampler, None);
            self.scene_pipeline.destroy(&d);
            self.shadow_pipeline.destroy(&d);
            d.destroy_descriptor_set_layout(self.frame_layout, None);
            d.destroy_descriptor_set_layout(self.material_layout, None);
            d.destroy_render_pass(self.main_pass, None);
            d.destroy_render_pass(self.shadow_pass, None);
        }
        debug!("vulkan backend released");
    }
}

fn create_semaphore(d: &ash::Device) -> Result<vk::Semaphore, VkError> {
    let ci = vk::SemaphoreCreateInfo {
        s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
        ..Default::default()
    };
    unsafe { d.create_semaphore(&ci, None) }.call("vkCreateSemaphore")
}

fn create_pool(
    d: &ash::Device,
    max_sets: u32,
    sizes: &[vk::DescriptorPoolSize],
) -> Result<vk::DescriptorPool, VkError> {
    let ci = vk::DescriptorPoolCreateInfo {
        s_type: vk::StructureType::DESCRIPTOR_POOL_CREATE_INFO,
        max_sets,
        pool_size_count: sizes.len() as u32,
        p_pool_sizes: sizes.as_ptr(),
        ..Default::default()
    };
    unsafe { d.create_descriptor_pool(&ci, None) }.call("vkCreateDescriptorPool")
}

fn create_shadow_map(
    d: &ash::Device,
    alloc: &mut Allocator,
    render_pass: vk::RenderPass,
    format: vk::Format,
    settings: &RenderSettings,
) -> Result<ShadowMap> {
    // Disabled shadows still need something to bind at set 0 binding 1.
    let side = if settings.shadows {
        settings.shadow_map_size.max(1)
    } else {
        1
    };
    let extent = vk::Extent2D {
        width: side,
        height: side,
    };
    let image = alloc.create_image(
        extent,
        format,
        vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
        1,
        vk::SampleCountFlags::TYPE_1,
    )?;
    let view = alloc.create_image_view(image.handle(), format, vk::ImageAspectFlags::DEPTH, 1)?;
    let sampler = alloc.create_sampler(&SamplerDesc {
        filter: vk::Filter::LINEAR,
        address_mode: vk::SamplerAddressMode::CLAMP_TO_BORDER,
        anisotropy: 1.0,
        mip_levels: 1,
        compare: Some(shadow_compare_op(settings.depth)),
        border: shadow_border(settings.depth),
    })?;
    let fci = vk::FramebufferCreateInfo {
        s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
        render_pass,
        attachment_count: 1,
        p_attachments: &view,
        width: side,
        height: side,
        layers: 1,
        ..Default::default()
    };
    let framebuffer =
        unsafe { d.create_framebuffer(&fci, None) }.call("vkCreateFramebuffer(shadow)")?;

    // Sampleable before the first shadow pass has written it.
    let cmd = alloc.begin_one_time()?;
    let barrier = vk::ImageMemoryBarrier {
        s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
        src_access_mask: vk::AccessFlags::empty(),
        dst_access_mask: vk::AccessFlags::SHADER_READ,
        old_layout: vk::ImageLayout::UNDEFINED,
        new_layout: vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        image: image.handle(),
        subresource_range: vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::DEPTH,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        },
        ..Default::default()
    };
    unsafe {
        d.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            from_ref(&barrier),
        )
    };
    alloc.end_one_time(cmd).context("shadow map layout")?;

    debug!(side, format = ?format, "shadow map ready");
    Ok(ShadowMap {
        image,
        view,
        sampler,
        framebuffer,
    })
}

fn create_slots(
    d: &ash::Device,
    command_pool: vk::CommandPool,
    alloc: &mut Allocator,
    frame_pool: vk::DescriptorPool,
    frame_layout: vk::DescriptorSetLayout,
    shadow: &ShadowMap,
    frames: usize,
) -> Result<Vec<FrameSlot>> {
    let layouts = vec![frame_layout; frames];
    let sai = vk::DescriptorSetAllocateInfo {
        s_type: vk::StructureType::DESCRIPTOR_SET_ALLOCATE_INFO,
        descriptor_pool: frame_pool,
        descriptor_set_count: frames as u32,
        p_set_layouts: layouts.as_ptr(),
        ..Default::default()
    };
    let sets = unsafe { d.allocate_descriptor_sets(&sai) }.call("vkAllocateDescriptorSets")?;
    let cai = vk::CommandBufferAllocateInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
        command_pool,
        level: vk::CommandBufferLevel::PRIMARY,
        command_buffer_count: frames as u32,
        ..Default::default()
    };
    let cmds = unsafe { d.allocate_command_buffers(&cai) }.call("vkAllocateCommandBuffers")?;
    // Signalled so the first wait on every slot returns at once.
    let fence_ci = vk::FenceCreateInfo {
        s_type: vk::StructureType::FENCE_CREATE_INFO,
        flags: vk::FenceCreateFlags::SIGNALED,
        ..Default::default()
    };

    let shadow_info = vk::DescriptorImageInfo {
        sampler: shadow.sampler,
        image_view: shadow.view,
        image_layout: vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
    };
    let mut slots = Vec::with_capacity(frames);
    for (&descriptor_set, &command_buffer) in sets.iter().zip(&cmds) {
        let uniforms = alloc.create_buffer(
            FRAME_UBO_SIZE,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            HostAccess::SequentialWrite,
        )?;
        let buffer_info = vk::DescriptorBufferInfo {
            buffer: uniforms.handle(),
            offset: 0,
            range: FRAME_UBO_SIZE,
        };
        let writes = [
            vk::WriteDescriptorSet {
                s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
                dst_set: descriptor_set,
                dst_binding: 0,
                descriptor_count: 1,
                descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
                p_buffer_info: &buffer_info,
                ..Default::default()
            },
            vk::WriteDescriptorSet {
                s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
                dst_set: descriptor_set,
                dst_binding: 1,
                descriptor_count: 1,
                descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                p_image_info: &shadow_info,
                ..Default::default()
            },
        ];
        unsafe { d.update_descriptor_sets(&writes, &[]) };
        slots.push(FrameSlot {
            command_buffer,
            image_available: create_semaphore(d)?,
            render_finished: create_semaphore(d)?,
            in_flight: unsafe { d.create_fence(&fence_ci, None) }.call("vkCreateFence")?,
            uniforms,
            descriptor_set,
        });
    }
    Ok(slots)
}

fn write_material_set(
    d: &ash::Device,
    set: vk::DescriptorSet,
    base_color: vk::DescriptorImageInfo,
    normal_map: vk::DescriptorImageInfo,
) {
    let write = |binding, info: &vk::DescriptorImageInfo| vk::WriteDescriptorSet {
        s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
        dst_set: set,
        dst_binding: binding,
        descriptor_count: 1,
        descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        p_image_info: info,
        ..Default::default()
    };
    let writes = [write(0, &base_color), write(1, &normal_map)];
    unsafe { d.update_descriptor_sets(&writes, &[]) };
}
