// SPDX-License-Identifier: CEPL-1.0
use crate::error::{VkError, VkResultExt};
use crate::uniforms::PUSH_CONSTANT_SIZE;
use anyhow::{Context, Result};
use ash::util::read_spv;
use ash::vk;
use lumen_math::DepthConvention;
use lumen_render::Vertex;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const SCENE_VERT: &str = "scene.vert.spv";
pub const SCENE_FRAG: &str = "scene.frag.spv";
pub const SHADOW_VERT: &str = "shadow.vert.spv";

pub fn depth_compare_op(depth: DepthConvention) -> vk::CompareOp {
    match depth {
        DepthConvention::Standard => vk::CompareOp::LESS,
        DepthConvention::Reversed => vk::CompareOp::GREATER_OR_EQUAL,
    }
}

/// Compare op for the shadow sampler: a fragment is lit when its light-space
/// depth passes against the stored occluder depth.
pub fn shadow_compare_op(depth: DepthConvention) -> vk::CompareOp {
    match depth {
        DepthConvention::Standard => vk::CompareOp::LESS_OR_EQUAL,
        DepthConvention::Reversed => vk::CompareOp::GREATER_OR_EQUAL,
    }
}

/// Largest sample count not above `requested` that colour and depth
/// framebuffer attachments both support.
pub fn usable_samples(limits: &vk::PhysicalDeviceLimits, requested: u32) -> vk::SampleCountFlags {
    let supported =
        limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts;
    [
        (64, vk::SampleCountFlags::TYPE_64),
        (32, vk::SampleCountFlags::TYPE_32),
        (16, vk::SampleCountFlags::TYPE_16),
        (8, vk::SampleCountFlags::TYPE_8),
        (4, vk::SampleCountFlags::TYPE_4),
        (2, vk::SampleCountFlags::TYPE_2),
    ]
    .into_iter()
    .find(|&(n, flag)| n <= requested && supported.contains(flag))
    .map(|(_, flag)| flag)
    .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: vk::Format,
    pub offset: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VertexLayout {
    pub stride: u32,
    pub attributes: Vec<VertexAttribute>,
}

impl VertexLayout {
    /// position, normal, colour, uv.
    pub fn scene() -> Self {
        let f3 = std::mem::size_of::<[f32; 3]>() as u32;
        let attr = |location, format, offset| VertexAttribute {
            location,
            format,
            offset,
        };
        Self {
            stride: std::mem::size_of::<Vertex>() as u32,
            attributes: vec![
                attr(0, vk::Format::R32G32B32_SFLOAT, 0),
                attr(1, vk::Format::R32G32B32_SFLOAT, f3),
                attr(2, vk::Format::R32G32B32_SFLOAT, 2 * f3),
                attr(3, vk::Format::R32G32_SFLOAT, 3 * f3),
            ],
        }
    }
}

#[derive(Clone, Debug)]
pub struct PipelineDesc {
    pub vertex_shader: PathBuf,
    /// `None` for depth-only pipelines.
    pub fragment_shader: Option<PathBuf>,
    pub vertex_layout: VertexLayout,
    pub depth_compare: vk::CompareOp,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub blend: bool,
    pub samples: vk::SampleCountFlags,
    /// Depth-only variant: no colour attachment, dynamic depth bias.
    pub shadow: bool,
}

impl PipelineDesc {
    pub fn scene(shader_dir: &Path, depth: DepthConvention, samples: vk::SampleCountFlags) -> Self {
        Self {
            vertex_shader: shader_dir.join(SCENE_VERT),
            fragment_shader: Some(shader_dir.join(SCENE_FRAG)),
            vertex_layout: VertexLayout::scene(),
            depth_compare: depth_compare_op(depth),
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            blend: false,
            samples,
            shadow: false,
        }
    }

    pub fn shadow(shader_dir: &Path, depth: DepthConvention) -> Self {
        Self {
            vertex_shader: shader_dir.join(SHADOW_VERT),
            fragment_shader: None,
            vertex_layout: VertexLayout::scene(),
            depth_compare: depth_compare_op(depth),
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            blend: false,
            samples: vk::SampleCountFlags::TYPE_1,
            shadow: true,
        }
    }

    pub fn dynamic_states(&self) -> Vec<vk::DynamicState> {
        let mut states = vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        if self.shadow {
            states.push(vk::DynamicState::DEPTH_BIAS);
        }
        states
    }
}

pub struct Pipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

impl Pipeline {
    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_pipeline(self.pipeline, None);
            device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// Read and validate a SPIR-V binary. A missing or malformed file is fatal.
pub fn read_shader(path: &Path) -> Result<Vec<u32>, VkError> {
    let missing = |reason: String| VkError::ShaderMissing {
        path: path.to_path_buf(),
        reason,
    };
    let bytes = std::fs::read(path).map_err(|e| missing(e.to_string()))?;
    read_spv(&mut Cursor::new(&bytes[..])).map_err(|e| missing(e.to_string()))
}

pub fn load_shader_module(device: &ash::Device, path: &Path) -> Result<vk::ShaderModule> {
    let code = read_shader(path)?;
    let ci = vk::ShaderModuleCreateInfo {
        s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
        p_code: code.as_ptr(),
        code_size: code.len() * 4,
        ..Default::default()
    };
    let module = unsafe { device.create_shader_module(&ci, None) }
        .call("vkCreateShaderModule")
        .with_context(|| format!("shader {}", path.display()))?;
    debug!(path = %path.display(), words = code.len(), "shader module loaded");
    Ok(module)
}

/// Set 0: per-frame uniforms and the shadow map.
pub fn create_frame_set_layout(device: &ash::Device) -> Result<vk::DescriptorSetLayout> {
    let bindings = [
        vk::DescriptorSetLayoutBinding {
            binding: 0,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            ..Default::default()
        },
        vk::DescriptorSetLayoutBinding {
            binding: 1,
            descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
            ..Default::default()
        },
    ];
    set_layout(device, &bindings)
}

/// Set 1: base colour and normal map.
pub fn create_material_set_layout(device: &ash::Device) -> Result<vk::DescriptorSetLayout> {
    let sampler = |binding| vk::DescriptorSetLayoutBinding {
        binding,
        descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        descriptor_count: 1,
        stage_flags: vk::ShaderStageFlags::FRAGMENT,
        ..Default::default()
    };
    set_layout(device, &[sampler(0), sampler(1)])
}

fn set_layout(
    device: &ash::Device,
    bindings: &[vk::DescriptorSetLayoutBinding],
) -> Result<vk::DescriptorSetLayout> {
    let ci = vk::DescriptorSetLayoutCreateInfo {
        s_type: vk::StructureType::DESCRIPTOR_SET_LAYOUT_CREATE_INFO,
        binding_count: bindings.len() as u32,
        p_bindings: bindings.as_ptr(),
        ..Default::default()
    };
    Ok(unsafe { device.create_descriptor_set_layout(&ci, None) }
        .call("vkCreateDescriptorSetLayout")?)
}

pub fn push_constant_range() -> vk::PushConstantRange {
    vk::PushConstantRange {
        stage_flags: vk::ShaderStageFlags::VERTEX,
        offset: 0,
        size: PUSH_CONSTANT_SIZE,
    }
}

fn has_stencil(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D16_UNORM_S8_UINT
    )
}

pub fn depth_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    if has_stencil(format) {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else {
        vk::ImageAspectFlags::DEPTH
    }
}

/// Attachments of the main pass, in framebuffer order: colour, depth and,
/// when multisampled, the single-sample resolve target.
pub fn main_pass_attachments(
    color_format: vk::Format,
    depth_format: vk::Format,
    samples: vk::SampleCountFlags,
) -> Vec<vk::AttachmentDescription> {
    let msaa = samples != vk::SampleCountFlags::TYPE_1;
    let color = vk::AttachmentDescription {
        format: color_format,
        samples,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: if msaa {
            vk::AttachmentStoreOp::DONT_CARE
        } else {
            vk::AttachmentStoreOp::STORE
        },
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: if msaa {
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        } else {
            vk::ImageLayout::PRESENT_SRC_KHR
        },
        ..Default::default()
    };
    let depth = vk::AttachmentDescription {
        format: depth_format,
        samples,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::DONT_CARE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ..Default::default()
    };
    let mut attachments = vec![color, depth];
    if msaa {
        attachments.push(vk::AttachmentDescription {
            format: color_format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::DONT_CARE,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            ..Default::default()
        });
    }
    attachments
}

/// The depth and msaa images are shared by every frame in flight, so the
/// previous frame's depth writes and multisampled colour writes are both in
/// the source scope.
pub fn main_pass_dependency() -> vk::SubpassDependency {
    vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
            | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        src_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ..Default::default()
    }
}

pub fn create_main_render_pass(
    device: &ash::Device,
    color_format: vk::Format,
    depth_format: vk::Format,
    samples: vk::SampleCountFlags,
) -> Result<vk::RenderPass> {
    let attachments = main_pass_attachments(color_format, depth_format, samples);
    let color_ref = vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    };
    let depth_ref = vk::AttachmentReference {
        attachment: 1,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };
    let resolve_ref = vk::AttachmentReference {
        attachment: 2,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    };
    let subpass = vk::SubpassDescription {
        pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
        color_attachment_count: 1,
        p_color_attachments: &color_ref,
        p_resolve_attachments: if attachments.len() == 3 {
            &resolve_ref
        } else {
            std::ptr::null()
        },
        p_depth_stencil_attachment: &depth_ref,
        ..Default::default()
    };
    let dependency = main_pass_dependency();
    let ci = vk::RenderPassCreateInfo {
        s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
        attachment_count: attachments.len() as u32,
        p_attachments: attachments.as_ptr(),
        subpass_count: 1,
        p_subpasses: &subpass,
        dependency_count: 1,
        p_dependencies: &dependency,
        ..Default::default()
    };
    Ok(unsafe { device.create_render_pass(&ci, None) }.call("vkCreateRenderPass")?)
}

/// Depth-only pass whose result is sampled by the main pass.
pub fn create_shadow_render_pass(
    device: &ash::Device,
    depth_format: vk::Format,
) -> Result<vk::RenderPass> {
    let attachment = vk::AttachmentDescription {
        format: depth_format,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::STORE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        ..Default::default()
    };
    let depth_ref = vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };
    let subpass = vk::SubpassDescription {
        pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
        p_depth_stencil_attachment: &depth_ref,
        ..Default::default()
    };
    let dependencies = [
        vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: vk::PipelineStageFlags::FRAGMENT_SHADER,
            src_access_mask: vk::AccessFlags::SHADER_READ,
            dst_stage_mask: vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            dst_access_mask: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            dependency_flags: vk::DependencyFlags::BY_REGION,
        },
        vk::SubpassDependency {
            src_subpass: 0,
            dst_subpass: vk::SUBPASS_EXTERNAL,
            src_stage_mask: vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            src_access_mask: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            dst_stage_mask: vk::PipelineStageFlags::FRAGMENT_SHADER,
            dst_access_mask: vk::AccessFlags::SHADER_READ,
            dependency_flags: vk::DependencyFlags::BY_REGION,
        },
    ];
    let ci = vk::RenderPassCreateInfo {
        s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
        attachment_count: 1,
        p_attachments: &attachment,
        subpass_count: 1,
        p_subpasses: &subpass,
        dependency_count: dependencies.len() as u32,
        p_dependencies: dependencies.as_ptr(),
        ..Default::default()
    };
    Ok(unsafe { device.create_render_pass(&ci, None) }.call("vkCreateRenderPass(shadow)")?)
}

pub fn build_pipeline(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    set_layouts: &[vk::DescriptorSetLayout],
    desc: &PipelineDesc,
) -> Result<Pipeline> {
    let vs = load_shader_module(device, &desc.vertex_shader)?;
    let fs = match &desc.fragment_shader {
        Some(path) => match load_shader_module(device, path) {
            Ok(m) => Some(m),
            Err(e) => {
                unsafe { device.destroy_shader_module(vs, None) };
                return Err(e);
            }
        },
        None => None,
    };
    let built = unsafe { build_with_modules(device, render_pass, set_layouts, desc, vs, fs) };
    unsafe {
        device.destroy_shader_module(vs, None);
        if let Some(fs) = fs {
            device.destroy_shader_module(fs, None);
        }
    }
    built
}

unsafe fn build_with_modules(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    set_layouts: &[vk::DescriptorSetLayout],
    desc: &PipelineDesc,
    vs: vk::ShaderModule,
    fs: Option<vk::ShaderModule>,
) -> Result<Pipeline> {
    let entry = c"main";
    let mut stages = vec![vk::PipelineShaderStageCreateInfo {
        s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
        stage: vk::ShaderStageFlags::VERTEX,
        module: vs,
        p_name: entry.as_ptr(),
        ..Default::default()
    }];
    if let Some(fs) = fs {
        stages.push(vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::FRAGMENT,
            module: fs,
            p_name: entry.as_ptr(),
            ..Default::default()
        });
    }

    let binding = vk::VertexInputBindingDescription {
        binding: 0,
        stride: desc.vertex_layout.stride,
        input_rate: vk::VertexInputRate::VERTEX,
    };
    let attributes: Vec<vk::VertexInputAttributeDescription> = desc
        .vertex_layout
        .attributes
        .iter()
        .map(|a| vk::VertexInputAttributeDescription {
            location: a.location,
            binding: 0,
            format: a.format,
            offset: a.offset,
        })
        .collect();
    let vertex_input = vk::PipelineVertexInputStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
        vertex_binding_description_count: 1,
        p_vertex_binding_descriptions: &binding,
        vertex_attribute_description_count: attributes.len() as u32,
        p_vertex_attribute_descriptions: attributes.as_ptr(),
        ..Default::default()
    };
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
        topology: vk::PrimitiveTopology::TRIANGLE_LIST,
        ..Default::default()
    };
    let dyn_states = desc.dynamic_states();
    let dynamic_state = vk::PipelineDynamicStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DYNAMIC_STATE_CREATE_INFO,
        dynamic_state_count: dyn_states.len() as u32,
        p_dynamic_states: dyn_states.as_ptr(),
        ..Default::default()
    };
    let viewport_state = vk::PipelineViewportStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
        viewport_count: 1,
        scissor_count: 1,
        ..Default::default()
    };
    let raster = vk::PipelineRasterizationStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: desc.cull_mode,
        front_face: desc.front_face,
        depth_bias_enable: desc.shadow.into(),
        line_width: 1.0,
        ..Default::default()
    };
    let multisample = vk::PipelineMultisampleStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
        rasterization_samples: desc.samples,
        ..Default::default()
    };
    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DEPTH_STENCIL_STATE_CREATE_INFO,
        depth_test_enable: vk::TRUE,
        depth_write_enable: vk::TRUE,
        depth_compare_op: desc.depth_compare,
        ..Default::default()
    };
    let blend_attachment = vk::PipelineColorBlendAttachmentState {
        blend_enable: desc.blend.into(),
        src_color_blend_factor: vk::BlendFactor::SRC_ALPHA,
        dst_color_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        color_blend_op: vk::BlendOp::ADD,
        src_alpha_blend_factor: vk::BlendFactor::ONE,
        dst_alpha_blend_factor: vk::BlendFactor::ZERO,
        alpha_blend_op: vk::BlendOp::ADD,
        color_write_mask: vk::ColorComponentFlags::RGBA,
    };
    let color_blend = vk::PipelineColorBlendStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
        attachment_count: if desc.shadow { 0 } else { 1 },
        p_attachments: &blend_attachment,
        ..Default::default()
    };

    let push_range = push_constant_range();
    let layout_info = vk::PipelineLayoutCreateInfo {
        s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
        set_layout_count: set_layouts.len() as u32,
        p_set_layouts: set_layouts.as_ptr(),
        push_constant_range_count: 1,
        p_push_constant_ranges: &push_range,
        ..Default::default()
    };
    let layout = device
        .create_pipeline_layout(&layout_info, None)
        .call("vkCreatePipelineLayout")?;

    let pipeline_info = vk::GraphicsPipelineCreateInfo {
        s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
        stage_count: stages.len() as u32,
        p_stages: stages.as_ptr(),
        p_vertex_input_state: &vertex_input,
        p_input_assembly_state: &input_assembly,
        p_viewport_state: &viewport_state,
        p_rasterization_state: &raster,
        p_multisample_state: &multisample,
        p_depth_stencil_state: &depth_stencil,
        p_color_blend_state: &color_blend,
        p_dynamic_state: &dynamic_state,
        layout,
        render_pass,
        subpass: 0,
        ..Default::default()
    };
    let pipelines = match device.create_graphics_pipelines(
        vk::PipelineCache::null(),
        std::slice::from_ref(&pipeline_info),
        None,
    ) {
        Ok(p) => p,
        Err((_, result)) => {
            device.destroy_pipeline_layout(layout, None);
            return Err(VkError::Vulkan {
                call: "vkCreateGraphicsPipelines",
                result,
            }
            .into());
        }
    };
    debug!(shadow = desc.shadow, samples = ?desc.samples, "graphics pipeline built");
    Ok(Pipeline {
        pipeline: pipelines[0],
        layout,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::FailureClass;

    #[test]
    fn shared_attachments_are_ordered_against_the_previous_frame() {
        let dep = main_pass_dependency();
        assert_eq!(dep.src_subpass, vk::SUBPASS_EXTERNAL);
        // Write-after-write on the shared msaa colour and depth images.
        for access in [
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ] {
            assert!(dep.src_access_mask.contains(access), "{access:?}");
            assert!(dep.dst_access_mask.contains(access), "{access:?}");
        }
        assert!(dep
            .src_stage_mask
            .contains(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT));
        assert!(dep
            .src_stage_mask
            .contains(vk::PipelineStageFlags::LATE_FRAGMENT_TESTS));
    }

    #[test]
    fn depth_ops_follow_convention() {
        assert_eq!(depth_compare_op(DepthConvention::Standard), vk::CompareOp::LESS);
        assert_eq!(
            depth_compare_op(DepthConvention::Reversed),
            vk::CompareOp::GREATER_OR_EQUAL
        );
        assert_eq!(
            shadow_compare_op(DepthConvention::Reversed),
            vk::CompareOp::GREATER_OR_EQUAL
        );
    }

    #[test]
    fn scene_vertex_layout_matches_vertex_struct() {
        let layout = VertexLayout::scene();
        assert_eq!(layout.stride, 44);
        let offsets: Vec<u32> = layout.attributes.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 24, 36]);
        assert_eq!(layout.attributes[3].format, vk::Format::R32G32_SFLOAT);
    }

    #[test]
    fn shadow_variant_adds_depth_bias_and_disables_culling() {
        let dir = Path::new("shaders");
        let shadow = PipelineDesc::shadow(dir, DepthConvention::Reversed);
        assert!(shadow.dynamic_states().contains(&vk::DynamicState::DEPTH_BIAS));
        assert_eq!(shadow.cull_mode, vk::CullModeFlags::NONE);
        assert!(shadow.fragment_shader.is_none());
        assert_eq!(shadow.vertex_shader, dir.join(SHADOW_VERT));

        let main = PipelineDesc::scene(dir, DepthConvention::Reversed, vk::SampleCountFlags::TYPE_4);
        assert_eq!(
            main.dynamic_states(),
            vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR]
        );
        assert_eq!(main.depth_compare, vk::CompareOp::GREATER_OR_EQUAL);
    }

    #[test]
    fn msaa_pass_resolves_into_presentable_attachment() {
        let atts = main_pass_attachments(
            vk::Format::B8G8R8A8_SRGB,
            vk::Format::D32_SFLOAT,
            vk::SampleCountFlags::TYPE_4,
        );
        assert_eq!(atts.len(), 3);
        assert_eq!(atts[0].samples, vk::SampleCountFlags::TYPE_4);
        assert_eq!(atts[2].samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(atts[2].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(atts[1].load_op, vk::AttachmentLoadOp::CLEAR);
    }

    #[test]
    fn single_sample_pass_presents_colour_directly() {
        let atts = main_pass_attachments(
            vk::Format::B8G8R8A8_SRGB,
            vk::Format::D32_SFLOAT,
            vk::SampleCountFlags::TYPE_1,
        );
        assert_eq!(atts.len(), 2);
        assert_eq!(atts[0].store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(atts[0].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }

    #[test]
    fn samples_are_clamped_to_device_support() {
        let limits = vk::PhysicalDeviceLimits {
            framebuffer_color_sample_counts: vk::SampleCountFlags::TYPE_1
                | vk::SampleCountFlags::TYPE_2
                | vk::SampleCountFlags::TYPE_4
                | vk::SampleCountFlags::TYPE_8,
            framebuffer_depth_sample_counts: vk::SampleCountFlags::TYPE_1
                | vk::SampleCountFlags::TYPE_2
                | vk::SampleCountFlags::TYPE_4,
            ..Default::default()
        };
        assert_eq!(usable_samples(&limits, 8), vk::SampleCountFlags::TYPE_4);
        assert_eq!(usable_samples(&limits, 3), vk::SampleCountFlags::TYPE_2);
        assert_eq!(usable_samples(&limits, 1), vk::SampleCountFlags::TYPE_1);
        assert_eq!(usable_samples(&limits, 0), vk::SampleCountFlags::TYPE_1);
    }

    #[test]
    fn missing_shader_is_a_shader_failure() {
        let path = std::env::temp_dir().join("lumen-does-not-exist.spv");
        let err = read_shader(&path).unwrap_err();
        assert_eq!(err.class(), FailureClass::Shader);
        assert!(matches!(err, VkError::ShaderMissing { path: p, .. } if p == path));
    }

    #[test]
    fn malformed_shader_is_rejected() {
        let path = std::env::temp_dir().join(format!("lumen-bad-{}.spv", std::process::id()));
        std::fs::write(&path, [1u8, 2, 3]).unwrap();
        let err = read_shader(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, VkError::ShaderMissing { .. }));
    }

    #[test]
    fn valid_spirv_words_are_read() {
        let path = std::env::temp_dir().join(format!("lumen-ok-{}.spv", std::process::id()));
        let mut bytes = 0x0723_0203u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0x0001_0000u32.to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();
        let words = read_shader(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(words, vec![0x0723_0203, 0x0001_0000]);
    }

    #[test]
    fn push_range_covers_model_and_flag() {
        let range = push_constant_range();
        assert_eq!(range.size, 68);
        assert_eq!(range.stage_flags, vk::ShaderStageFlags::VERTEX);
    }
}
