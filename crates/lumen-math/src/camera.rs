// SPDX-License-Identifier: CEPL-1.0
use bitflags::bitflags;
use glam::{Mat4, Vec2, Vec3};

bitflags! {
    /// Movement keys held during a frame.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Movement: u8 {
        const FORWARD = 1 << 0;
        const BACK    = 1 << 1;
        const LEFT    = 1 << 2;
        const RIGHT   = 1 << 3;
        const UP      = 1 << 4;
        const DOWN    = 1 << 5;
    }
}

/// Which end of the depth range the near plane maps to.
///
/// `Reversed` maps near to 1.0 and far to 0.0, which spreads float
/// precision evenly over distance. Clear value and compare op follow.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DepthConvention {
    Standard,
    #[default]
    Reversed,
}

impl DepthConvention {
    /// Depth value the attachment is cleared to (the far plane).
    pub const fn clear_depth(self) -> f32 {
        match self {
            DepthConvention::Standard => 1.0,
            DepthConvention::Reversed => 0.0,
        }
    }
}

/// Input deltas accumulated since the last frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct CameraInput {
    pub movement: Movement,
    /// Mouse delta in pixels, +x right, +y down.
    pub look_delta: Vec2,
    pub boost: bool,
}

/// Free-fly camera, right handed, Y up.
#[derive(Clone, Debug)]
pub struct Camera {
    pub position: Vec3,
    /// Radians around +Y, 0 looks down -Z.
    pub yaw: f32,
    /// Radians, clamped just short of straight up/down.
    pub pitch: f32,
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
    pub speed: f32,
    pub sensitivity: f32,
    aspect: f32,
}

const PITCH_LIMIT: f32 = 1.54;

impl Camera {
    pub fn looking_at(position: Vec3, target: Vec3, aspect: f32) -> Self {
        let dir = (target - position).normalize_or(Vec3::NEG_Z);
        let yaw = (-dir.x).atan2(-dir.z);
        let pitch = dir.y.clamp(-1.0, 1.0).asin().clamp(-PITCH_LIMIT, PITCH_LIMIT);
        let mut cam = Self {
            position,
            yaw,
            pitch,
            fov_y: 60f32.to_radians(),
            near: 0.05,
            far: 500.0,
            speed: 3.0,
            sensitivity: 0.0025,
            aspect: 1.0,
        };
        cam.on_resize(aspect);
        cam
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    /// Called by the renderer after a swapchain rebuild. Degenerate ratios
    /// (minimised window) are ignored so the projection stays finite.
    pub fn on_resize(&mut self, aspect: f32) {
        if aspect.is_finite() && aspect > 0.0 {
            self.aspect = aspect;
        }
    }

    pub fn forward(&self) -> Vec3 {
        let (sy, cy) = self.yaw.sin_cos();
        let (sp, cp) = self.pitch.sin_cos();
        Vec3::new(-sy * cp, sp, -cy * cp)
    }

    pub fn right(&self) -> Vec3 {
        self.forward().cross(Vec3::Y).normalize_or(Vec3::X)
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward(), Vec3::Y)
    }

    pub fn projection(&self, depth: DepthConvention) -> Mat4 {
        match depth {
            DepthConvention::Standard => {
                Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
            }
            DepthConvention::Reversed => {
                Mat4::perspective_infinite_reverse_rh(self.fov_y, self.aspect, self.near)
            }
        }
    }

    pub fn apply_input(&mut self, input: &CameraInput, dt: f32) {
        self.yaw -= input.look_delta.x * self.sensitivity;
        self.pitch = (self.pitch - input.look_delta.y * self.sensitivity)
            .clamp(-PITCH_LIMIT, PITCH_LIMIT);

        let fwd = self.forward();
        let right = self.right();
        let mut dir = Vec3::ZERO;
        let m = input.movement;
        if m.contains(Movement::FORWARD) {
            dir += fwd;
        }
        if m.contains(Movement::BACK) {
            dir -= fwd;
        }
        if m.contains(Movement::RIGHT) {
            dir += right;
        }
        if m.contains(Movement::LEFT) {
            dir -= right;
        }
        if m.contains(Movement::UP) {
            dir += Vec3::Y;
        }
        if m.contains(Movement::DOWN) {
            dir -= Vec3::Y;
        }
        let speed = if input.boost { self.speed * 4.0 } else { self.speed };
        self.position += dir.normalize_or_zero() * speed * dt;
    }
}
