// SPDX-License-Identifier: CEPL-1.0
//! Backend-agnostic contract between the lumen engine and its
//! collaborators: window state in, scene data in, frames out.

mod scene;
mod settings;

use anyhow::Result;
use lumen_math::{Mat4, Vec3};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

pub use lumen_math::DepthConvention;
pub use scene::{DrawNode, Material, Mesh, Primitive, Scene, SceneError, TextureData, Vertex};
pub use settings::{PresentPreference, RenderSettings};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A minimised window reports zero client area.
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

/// What the window provider knows at the start of a frame. The renderer
/// polls it and clears `resized` once it has rebuilt the swapchain.
#[derive(Clone, Copy, Debug, Default)]
pub struct WindowState {
    pub extent: RenderSize,
    pub resized: bool,
    pub quit: bool,
}

impl WindowState {
    pub fn new(extent: RenderSize) -> Self {
        Self {
            extent,
            resized: false,
            quit: false,
        }
    }
}

/// Per-frame camera and light data, produced by the camera collaborator.
#[derive(Clone, Copy, Debug)]
pub struct FrameView {
    pub view: Mat4,
    pub projection: Mat4,
    pub camera_position: Vec3,
    pub light_direction: Vec3,
}

impl Default for FrameView {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            camera_position: Vec3::ZERO,
            light_direction: Vec3::new(-0.4, -1.0, -0.3).normalize(),
        }
    }
}

/// Outcome of one pass through the frame loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    /// The frame was submitted and handed to the presentation engine.
    Presented { image_index: u32 },
    /// The swapchain was rebuilt and the frame abandoned before recording.
    Recreated,
    /// Zero-area window; nothing was acquired.
    Suspended,
}

pub trait Renderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        settings: &RenderSettings,
    ) -> Result<Self>
    where
        Self: Sized;

    /// Upload geometry and textures. Blocks until every transfer finished.
    fn upload_scene(&mut self, scene: &Scene) -> Result<()>;

    /// Run one iteration of the frame loop against `window`.
    fn render(&mut self, scene: &Scene, view: &FrameView, window: &mut WindowState)
        -> Result<FrameStatus>;

    /// Aspect ratio of the current swapchain, for the camera.
    fn aspect(&self) -> f32;

    fn set_clear_color(&mut self, rgba: [f32; 4]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_size_detects_minimised_window() {
        assert!(RenderSize::new(0, 600).is_empty());
        assert!(RenderSize::new(800, 0).is_empty());
        assert!(!RenderSize::new(800, 600).is_empty());
    }

    #[test]
    fn aspect_of_zero_height_is_one() {
        assert_eq!(RenderSize::new(800, 0).aspect(), 1.0);
        assert!((RenderSize::new(800, 600).aspect() - 4.0 / 3.0).abs() < 1e-6);
    }
}
