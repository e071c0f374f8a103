// SPDX-License-Identifier: CEPL-1.0
use bytemuck::{Pod, Zeroable};
use lumen_math::{DepthConvention, Mat4, Vec3};
use lumen_render::FrameView;

/// Per-frame uniform block, set 0 binding 0. std140-compatible: only
/// matrices and vec4s.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub light_view_projection: [[f32; 4]; 4],
    pub camera_position: [f32; 4],
    /// xyz = direction light travels, w = 1 when shadows are sampled.
    pub light_direction: [f32; 4],
}

impl FrameUniforms {
    pub fn new(view: &FrameView, light_view_projection: Mat4, shadows: bool) -> Self {
        Self {
            view: view.view.to_cols_array_2d(),
            projection: view.projection.to_cols_array_2d(),
            light_view_projection: light_view_projection.to_cols_array_2d(),
            camera_position: view.camera_position.extend(1.0).to_array(),
            light_direction: view
                .light_direction
                .normalize_or_zero()
                .extend(if shadows { 1.0 } else { 0.0 })
                .to_array(),
        }
    }
}

/// Per-draw data pushed to the vertex stage: model matrix plus a flag
/// telling the shader whether the material has a normal map.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PushConstants {
    pub model: [[f32; 4]; 4],
    pub has_normal_map: f32,
}

pub const PUSH_CONSTANT_SIZE: u32 = std::mem::size_of::<PushConstants>() as u32;

impl PushConstants {
    pub fn new(model: Mat4, has_normal_map: bool) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            has_normal_map: if has_normal_map { 1.0 } else { 0.0 },
        }
    }
}

/// Orthographic light camera covering a sphere of `radius` around
/// `center`, looking along `direction`. Depth follows `depth`.
pub fn light_view_projection(
    direction: Vec3,
    center: Vec3,
    radius: f32,
    depth: DepthConvention,
) -> Mat4 {
    let dir = direction.try_normalize().unwrap_or(Vec3::NEG_Y);
    let radius = radius.max(0.01);
    let eye = center - dir * radius * 2.0;
    let up = if dir.abs_diff_eq(Vec3::Y, 1e-3) || dir.abs_diff_eq(Vec3::NEG_Y, 1e-3) {
        Vec3::Z
    } else {
        Vec3::Y
    };
    let view = Mat4::look_at_rh(eye, center, up);
    let (near, far) = (radius * 0.01, radius * 4.0);
    let projection = match depth {
        DepthConvention::Standard => {
            Mat4::orthographic_rh(-radius, radius, -radius, radius, near, far)
        }
        DepthConvention::Reversed => {
            Mat4::orthographic_rh(-radius, radius, -radius, radius, far, near)
        }
    };
    projection * view
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_math::Vec4;

    #[test]
    fn push_constants_fill_the_declared_range() {
        assert_eq!(PUSH_CONSTANT_SIZE, 68);
        assert_eq!(std::mem::size_of::<FrameUniforms>(), 224);
    }

    #[test]
    fn normal_map_flag_is_one_or_zero() {
        assert_eq!(PushConstants::new(Mat4::IDENTITY, true).has_normal_map, 1.0);
        assert_eq!(PushConstants::new(Mat4::IDENTITY, false).has_normal_map, 0.0);
    }

    #[test]
    fn light_matrix_keeps_scene_center_inside_clip_space() {
        for depth in [DepthConvention::Standard, DepthConvention::Reversed] {
            let m = light_view_projection(Vec3::new(-0.4, -1.0, -0.3), Vec3::ZERO, 5.0, depth);
            let clip = m * Vec4::new(0.0, 0.0, 0.0, 1.0);
            let ndc = clip.truncate() / clip.w;
            assert!(ndc.x.abs() < 1e-4 && ndc.y.abs() < 1e-4);
            assert!((0.0..=1.0).contains(&ndc.z), "{depth:?}: {}", ndc.z);
        }
    }

    #[test]
    fn reversed_light_depth_maps_near_to_one() {
        let dir = Vec3::NEG_Y;
        let standard = light_view_projection(dir, Vec3::ZERO, 2.0, DepthConvention::Standard);
        let rev = light_view_projection(dir, Vec3::ZERO, 2.0, DepthConvention::Reversed);
        let top = Vec4::new(0.0, 1.5, 0.0, 1.0);
        assert!((standard * top).z < (rev * top).z);
    }

    #[test]
    fn uniforms_flag_shadow_sampling_in_light_w() {
        let view = FrameView::default();
        let on = FrameUniforms::new(&view, Mat4::IDENTITY, true);
        let off = FrameUniforms::new(&view, Mat4::IDENTITY, false);
        assert_eq!(on.light_direction[3], 1.0);
        assert_eq!(off.light_direction[3], 0.0);
        assert_eq!(on.camera_position[3], 1.0);
    }
}
