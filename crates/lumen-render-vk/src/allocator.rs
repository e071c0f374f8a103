// SPDX-License-Identifier: CEPL-1.0
use crate::device::Device;
use crate::error::{VkError, VkResultExt};
use crate::instance::InstanceContext;
use crate::mips::{layout_access, upload_levels, upload_texture_levels, TextureSink, TextureStep};
use anyhow::{ensure, Context, Result};
use ash::vk;
use std::collections::HashMap;
use tracing::debug;

/// Base-colour textures are sRGB-encoded.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;
/// Normal maps hold linear vectors.
pub const NORMAL_MAP_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

static DEPTH_FORMATS: [vk::Format; 4] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
    vk::Format::D16_UNORM,
];
static SAMPLED_DEPTH_FORMATS: [vk::Format; 2] = [vk::Format::D32_SFLOAT, vk::Format::D16_UNORM];

/// How the CPU touches a buffer after creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostAccess {
    /// Device-local; filled through a staging copy.
    None,
    /// Host-visible and coherent; mapped and written directly.
    SequentialWrite,
}

impl HostAccess {
    pub fn memory_flags(self) -> vk::MemoryPropertyFlags {
        match self {
            HostAccess::None => vk::MemoryPropertyFlags::DEVICE_LOCAL,
            HostAccess::SequentialWrite => {
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
            }
        }
    }
}

#[derive(Debug)]
struct Allocation {
    memory: vk::DeviceMemory,
    host_visible: bool,
}

#[derive(Debug)]
pub struct GpuBuffer {
    buffer: vk::Buffer,
    size: vk::DeviceSize,
    allocation: Allocation,
}

impl GpuBuffer {
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    pub fn is_host_visible(&self) -> bool {
        self.allocation.host_visible
    }
}

#[derive(Debug)]
pub struct GpuImage {
    image: vk::Image,
    allocation: Allocation,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub mip_levels: u32,
    pub samples: vk::SampleCountFlags,
}

impl GpuImage {
    pub fn handle(&self) -> vk::Image {
        self.image
    }
}

/// A texture whose upload has completed on the GPU. Only
/// [`Allocator::create_texture_image`] hands these out, and only after the
/// queue-idle wait, so descriptor writes can never reference a texture
/// that is still being copied.
#[derive(Debug)]
pub struct SampledTexture {
    image: GpuImage,
    view: vk::ImageView,
}

impl SampledTexture {
    pub fn mip_levels(&self) -> u32 {
        self.image.mip_levels
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent
    }

    pub fn descriptor(&self, sampler: vk::Sampler) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler,
            image_view: self.view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SamplerDesc {
    pub filter: vk::Filter,
    pub address_mode: vk::SamplerAddressMode,
    pub anisotropy: f32,
    pub mip_levels: u32,
    pub compare: Option<vk::CompareOp>,
    pub border: vk::BorderColor,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            filter: vk::Filter::LINEAR,
            address_mode: vk::SamplerAddressMode::REPEAT,
            anisotropy: 1.0,
            mip_levels: 1,
            compare: None,
            border: vk::BorderColor::FLOAT_OPAQUE_BLACK,
        }
    }
}

/// Requested anisotropy clamped to the device limit, or `None` when the
/// feature is off or the request is 1x or less.
pub fn clamp_anisotropy(requested: f32, device_max: f32, supported: bool) -> Option<f32> {
    if !supported || requested <= 1.0 || !requested.is_finite() {
        return None;
    }
    Some(requested.min(device_max).max(1.0))
}

pub fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> Result<u32, VkError> {
    (0..props.memory_type_count)
        .find(|&i| {
            type_bits & (1 << i) != 0
                && props.memory_types[i as usize].property_flags.contains(flags)
        })
        .ok_or(VkError::NoMemoryType { type_bits, flags })
}

/// Creates buffers, images, views and samplers, runs one-time transfer
/// command buffers, and tracks every live buffer and image so teardown can
/// release whatever is left.
pub struct Allocator {
    device: ash::Device,
    instance: ash::Instance,
    physical: vk::PhysicalDevice,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    queue: vk::Queue,
    pool: vk::CommandPool,
    max_anisotropy: f32,
    anisotropy: bool,
    live_buffers: HashMap<vk::Buffer, vk::DeviceMemory>,
    live_images: HashMap<vk::Image, vk::DeviceMemory>,
}

impl Allocator {
    pub fn new(ctx: &InstanceContext, device: &Device) -> Self {
        Self {
            device: device.handle().clone(),
            instance: ctx.handle().clone(),
            physical: device.physical(),
            memory_properties: *device.memory_properties(),
            queue: device.graphics_queue(),
            pool: device.command_pool(),
            max_anisotropy: device.limits().max_sampler_anisotropy,
            anisotropy: device.anisotropy_supported(),
            live_buffers: HashMap::new(),
            live_images: HashMap::new(),
        }
    }

    pub fn live_count(&self) -> (usize, usize) {
        (self.live_buffers.len(), self.live_images.len())
    }

    pub fn create_buffer(
        &mut self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        access: HostAccess,
    ) -> Result<GpuBuffer> {
        let d = &self.device;
        let bci = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            size: size.max(1),
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        let buffer = unsafe { d.create_buffer(&bci, None) }.call("vkCreateBuffer")?;
        let req = unsafe { d.get_buffer_memory_requirements(buffer) };
        let memory = match self.allocate(req, access.memory_flags()) {
            Ok(m) => m,
            Err(e) => {
                unsafe { d.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };
        bind_or_release(
            unsafe { d.bind_buffer_memory(buffer, memory, 0) }.call("vkBindBufferMemory"),
            || unsafe {
                d.destroy_buffer(buffer, None);
                d.free_memory(memory, None);
            },
        )?;
        self.live_buffers.insert(buffer, memory);
        Ok(GpuBuffer {
            buffer,
            size,
            allocation: Allocation {
                memory,
                host_visible: access == HostAccess::SequentialWrite,
            },
        })
    }

    /// Map, copy, unmap. Only valid for host-visible buffers.
    pub fn upload_to_buffer_direct(&self, dst: &GpuBuffer, bytes: &[u8]) -> Result<(), VkError> {
        if !dst.allocation.host_visible {
            return Err(VkError::NotHostVisible);
        }
        let len = bytes.len() as vk::DeviceSize;
        if len > dst.size {
            return Err(VkError::UploadTooLarge {
                len,
                capacity: dst.size,
            });
        }
        if bytes.is_empty() {
            return Ok(());
        }
        unsafe {
            let ptr = self
                .device
                .map_memory(dst.allocation.memory, 0, len, vk::MemoryMapFlags::empty())
                .call("vkMapMemory")?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
            self.device.unmap_memory(dst.allocation.memory);
        }
        Ok(())
    }

    /// Stage `bytes` and copy them into `dst`. Returns once the copy has
    /// finished on the GPU and the staging buffer is gone.
    pub fn upload_to_buffer(&mut self, dst: &GpuBuffer, bytes: &[u8]) -> Result<()> {
        let len = bytes.len() as vk::DeviceSize;
        if len > dst.size {
            return Err(VkError::UploadTooLarge {
                len,
                capacity: dst.size,
            }
            .into());
        }
        if bytes.is_empty() {
            return Ok(());
        }
        let staging = self.create_buffer(
            len,
            vk::BufferUsageFlags::TRANSFER_SRC,
            HostAccess::SequentialWrite,
        )?;
        let result = self
            .upload_to_buffer_direct(&staging, bytes)
            .map_err(anyhow::Error::from)
            .and_then(|_| {
                let cmd = self.begin_one_time()?;
                let region = vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: 0,
                    size: len,
                };
                unsafe {
                    self.device.cmd_copy_buffer(
                        cmd,
                        staging.buffer,
                        dst.buffer,
                        std::slice::from_ref(&region),
                    )
                };
                self.end_one_time(cmd)
            });
        self.destroy_buffer(staging);
        result.context("staged buffer upload")
    }

    pub fn create_image(
        &mut self,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        mip_levels: u32,
        samples: vk::SampleCountFlags,
    ) -> Result<GpuImage> {
        let d = &self.device;
        let ci = vk::ImageCreateInfo {
            s_type: vk::StructureType::IMAGE_CREATE_INFO,
            image_type: vk::ImageType::TYPE_2D,
            format,
            extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            mip_levels,
            array_layers: 1,
            samples,
            tiling: vk::ImageTiling::OPTIMAL,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };
        let image = unsafe { d.create_image(&ci, None) }.call("vkCreateImage")?;
        let req = unsafe { d.get_image_memory_requirements(image) };
        let memory = match self.allocate(req, vk::MemoryPropertyFlags::DEVICE_LOCAL) {
            Ok(m) => m,
            Err(e) => {
                unsafe { d.destroy_image(image, None) };
                return Err(e);
            }
        };
        bind_or_release(
            unsafe { d.bind_image_memory(image, memory, 0) }.call("vkBindImageMemory"),
            || unsafe {
                d.destroy_image(image, None);
                d.free_memory(memory, None);
            },
        )?;
        self.live_images.insert(image, memory);
        Ok(GpuImage {
            image,
            allocation: Allocation {
                memory,
                host_visible: false,
            },
            format,
            extent,
            mip_levels,
            samples,
        })
    }

    /// Upload RGBA8 pixels and build `mip_levels` levels with linear blits,
    /// all in one one-time command buffer. Formats without linear blit
    /// support get a single level.
    pub fn create_texture_image(
        &mut self,
        pixels: &[u8],
        extent: vk::Extent2D,
        mip_levels: u32,
        format: vk::Format,
    ) -> Result<SampledTexture> {
        let expected = extent.width as usize * extent.height as usize * 4;
        ensure!(
            pixels.len() == expected && expected > 0,
            "texture {}x{} needs {expected} bytes, got {}",
            extent.width,
            extent.height,
            pixels.len()
        );

        let levels = upload_levels(mip_levels, self.supports_linear_blit(format));
        let image = self.create_image(
            extent,
            format,
            vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::SAMPLED,
            levels,
            vk::SampleCountFlags::TYPE_1,
        )?;
        let staging = match self.create_buffer(
            pixels.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            HostAccess::SequentialWrite,
        ) {
            Ok(b) => b,
            Err(e) => {
                self.destroy_image(image);
                return Err(e);
            }
        };

        let uploaded = self
            .upload_to_buffer_direct(&staging, pixels)
            .map_err(anyhow::Error::from)
            .and_then(|_| {
                let sink = OneTimeUpload {
                    alloc: &*self,
                    cmd: self.begin_one_time()?,
                    image: &image,
                    staging: staging.buffer,
                    format,
                };
                upload_texture_levels(sink, extent.width, extent.height, levels)
            });
        self.destroy_buffer(staging);
        let view = match uploaded {
            Ok(v) => v,
            Err(e) => {
                self.destroy_image(image);
                return Err(e.context("texture upload"));
            }
        };
        debug!(
            width = extent.width,
            height = extent.height,
            levels,
            "texture resident"
        );
        Ok(SampledTexture { image, view })
    }

    unsafe fn record_texture_step(
        &self,
        cmd: vk::CommandBuffer,
        image: &GpuImage,
        staging: vk::Buffer,
        step: TextureStep,
    ) {
        let d = &self.device;
        match step {
            TextureStep::Transition {
                base_level,
                level_count,
                old,
                new,
            } => {
                let (src_access, src_stage) = layout_access(old);
                let (dst_access, dst_stage) = layout_access(new);
                let barrier = vk::ImageMemoryBarrier {
                    s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
                    src_access_mask: src_access,
                    dst_access_mask: dst_access,
                    old_layout: old,
                    new_layout: new,
                    src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                    dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                    image: image.image,
                    subresource_range: color_range(base_level, level_count),
                    ..Default::default()
                };
                d.cmd_pipeline_barrier(
                    cmd,
                    src_stage,
                    dst_stage,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    std::slice::from_ref(&barrier),
                );
            }
            TextureStep::CopyToBaseLevel => {
                let region = vk::BufferImageCopy {
                    buffer_offset: 0,
                    buffer_row_length: 0,
                    buffer_image_height: 0,
                    image_subresource: color_layers(0),
                    image_offset: vk::Offset3D::default(),
                    image_extent: vk::Extent3D {
                        width: image.extent.width,
                        height: image.extent.height,
                        depth: 1,
                    },
                };
                d.cmd_copy_buffer_to_image(
                    cmd,
                    staging,
                    image.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    std::slice::from_ref(&region),
                );
            }
            TextureStep::Blit {
                src_level,
                src,
                dst,
            } => {
                let blit = vk::ImageBlit {
                    src_subresource: color_layers(src_level),
                    src_offsets: [vk::Offset3D::default(), corner(src)],
                    dst_subresource: color_layers(src_level + 1),
                    dst_offsets: [vk::Offset3D::default(), corner(dst)],
                };
                d.cmd_blit_image(
                    cmd,
                    image.image,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    image.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    std::slice::from_ref(&blit),
                    vk::Filter::LINEAR,
                );
            }
        }
    }

    fn supports_linear_blit(&self, format: vk::Format) -> bool {
        let props = unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical, format)
        };
        props.optimal_tiling_features.contains(
            vk::FormatFeatureFlags::BLIT_SRC
                | vk::FormatFeatureFlags::BLIT_DST
                | vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR,
        )
    }

    /// First depth format with optimal-tiling attachment support. Sampled
    /// targets (the shadow map) also need `SAMPLED_IMAGE` and skip the
    /// stencil formats.
    pub fn pick_depth_format(&self, sampled: bool) -> vk::Format {
        let attachment = vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;
        let (candidates, required) = if sampled {
            (
                SAMPLED_DEPTH_FORMATS.as_slice(),
                attachment | vk::FormatFeatureFlags::SAMPLED_IMAGE,
            )
        } else {
            (DEPTH_FORMATS.as_slice(), attachment)
        };
        candidates
            .iter()
            .copied()
            .find(|&fmt| {
                let props = unsafe {
                    self.instance
                        .get_physical_device_format_properties(self.physical, fmt)
                };
                props.optimal_tiling_features.contains(required)
            })
            .unwrap_or(vk::Format::D32_SFLOAT)
    }

    pub fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
        mip_levels: u32,
    ) -> Result<vk::ImageView, VkError> {
        let ci = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            image,
            view_type: vk::ImageViewType::TYPE_2D,
            format,
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: mip_levels,
                base_array_layer: 0,
                layer_count: 1,
            },
            ..Default::default()
        };
        unsafe { self.device.create_image_view(&ci, None) }.call("vkCreateImageView")
    }

    pub fn create_sampler(&self, desc: &SamplerDesc) -> Result<vk::Sampler, VkError> {
        let aniso = clamp_anisotropy(desc.anisotropy, self.max_anisotropy, self.anisotropy);
        let ci = vk::SamplerCreateInfo {
            s_type: vk::StructureType::SAMPLER_CREATE_INFO,
            mag_filter: desc.filter,
            min_filter: desc.filter,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
            address_mode_u: desc.address_mode,
            address_mode_v: desc.address_mode,
            address_mode_w: desc.address_mode,
            anisotropy_enable: aniso.is_some().into(),
            max_anisotropy: aniso.unwrap_or(1.0),
            compare_enable: desc.compare.is_some().into(),
            compare_op: desc.compare.unwrap_or(vk::CompareOp::ALWAYS),
            min_lod: 0.0,
            max_lod: desc.mip_levels.max(1) as f32,
            border_color: desc.border,
            ..Default::default()
        };
        unsafe { self.device.create_sampler(&ci, None) }.call("vkCreateSampler")
    }

    pub fn begin_one_time(&self) -> Result<vk::CommandBuffer, VkError> {
        let ai = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: self.pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: 1,
            ..Default::default()
        };
        let cmd = unsafe { self.device.allocate_command_buffers(&ai) }
            .call("vkAllocateCommandBuffers")?[0];
        let bi = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        if let Err(result) = unsafe { self.device.begin_command_buffer(cmd, &bi) } {
            unsafe { self.device.free_command_buffers(self.pool, &[cmd]) };
            return Err(VkError::Vulkan {
                call: "vkBeginCommandBuffer",
                result,
            });
        }
        Ok(cmd)
    }

    /// Submit, block until the queue is idle, free the buffer.
    pub fn end_one_time(&self, cmd: vk::CommandBuffer) -> Result<()> {
        let d = &self.device;
        let submitted = unsafe {
            d.end_command_buffer(cmd)
                .call("vkEndCommandBuffer")
                .and_then(|_| {
                    let si = vk::SubmitInfo {
                        s_type: vk::StructureType::SUBMIT_INFO,
                        command_buffer_count: 1,
                        p_command_buffers: &cmd,
                        ..Default::default()
                    };
                    d.queue_submit(self.queue, std::slice::from_ref(&si), vk::Fence::null())
                        .call("vkQueueSubmit")
                })
                .and_then(|_| d.queue_wait_idle(self.queue).call("vkQueueWaitIdle"))
        };
        unsafe { d.free_command_buffers(self.pool, std::slice::from_ref(&cmd)) };
        Ok(submitted?)
    }

    pub fn destroy_buffer(&mut self, buffer: GpuBuffer) {
        if let Some(memory) = self.live_buffers.remove(&buffer.buffer) {
            unsafe {
                self.device.destroy_buffer(buffer.buffer, None);
                self.device.free_memory(memory, None);
            }
        }
    }

    pub fn destroy_image(&mut self, image: GpuImage) {
        if let Some(memory) = self.live_images.remove(&image.image) {
            unsafe {
                self.device.destroy_image(image.image, None);
                self.device.free_memory(memory, None);
            }
        }
    }

    pub fn destroy_texture(&mut self, texture: SampledTexture) {
        unsafe { self.device.destroy_image_view(texture.view, None) };
        self.destroy_image(texture.image);
    }

    pub fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) };
    }

    pub fn destroy_sampler(&self, sampler: vk::Sampler) {
        unsafe { self.device.destroy_sampler(sampler, None) };
    }

    /// Release every buffer and image still alive, after the device is idle.
    pub fn destroy_all(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();
            for (buffer, memory) in self.live_buffers.drain() {
                self.device.destroy_buffer(buffer, None);
                self.device.free_memory(memory, None);
            }
            for (image, memory) in self.live_images.drain() {
                self.device.destroy_image(image, None);
                self.device.free_memory(memory, None);
            }
        }
    }

    fn allocate(
        &self,
        req: vk::MemoryRequirements,
        flags: vk::MemoryPropertyFlags,
    ) -> Result<vk::DeviceMemory> {
        let memory_type_index =
            find_memory_type(&self.memory_properties, req.memory_type_bits, flags)?;
        let mai = vk::MemoryAllocateInfo {
            s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
            allocation_size: req.size,
            memory_type_index,
            ..Default::default()
        };
        Ok(unsafe { self.device.allocate_memory(&mai, None) }.call("vkAllocateMemory")?)
    }
}

impl Drop for Allocator {
    fn drop(&mut self) {
        let (buffers, images) = self.live_count();
        if buffers + images > 0 {
            debug!(buffers, images, "allocator releasing leftovers");
        }
        self.destroy_all();
    }
}

/// Texture upload recorded into a one-time command buffer. The buffer is
/// freed by `submit_and_wait` whether or not the submit succeeds.
struct OneTimeUpload<'a> {
    alloc: &'a Allocator,
    cmd: vk::CommandBuffer,
    image: &'a GpuImage,
    staging: vk::Buffer,
    format: vk::Format,
}

impl TextureSink for OneTimeUpload<'_> {
    type Texture = vk::ImageView;

    fn record(&mut self, step: TextureStep) {
        unsafe {
            self.alloc
                .record_texture_step(self.cmd, self.image, self.staging, step)
        };
    }

    fn submit_and_wait(&mut self) -> Result<()> {
        self.alloc.end_one_time(self.cmd)
    }

    fn hand_out(self, levels: u32) -> Result<vk::ImageView> {
        let view = self.alloc.create_image_view(
            self.image.image,
            self.format,
            vk::ImageAspectFlags::COLOR,
            levels,
        )?;
        Ok(view)
    }
}

/// A failed bind leaves a live object and an allocation nobody tracks yet;
/// `release` frees both before the error is returned.
fn bind_or_release(bound: Result<(), VkError>, release: impl FnOnce()) -> Result<(), VkError> {
    if bound.is_err() {
        release();
    }
    bound
}

fn color_range(base_mip_level: u32, level_count: u32) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level,
        level_count,
        base_array_layer: 0,
        layer_count: 1,
    }
}

fn color_layers(mip_level: u32) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level,
        base_array_layer: 0,
        layer_count: 1,
    }
}

fn corner(extent: vk::Extent2D) -> vk::Offset3D {
    vk::Offset3D {
        x: extent.width as i32,
        y: extent.height as i32,
        z: 1,
    }
}
