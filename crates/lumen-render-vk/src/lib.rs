// SPDX-License-Identifier: CEPL-1.0
//! Vulkan renderer for lumen.
//!
//! Layers, bottom up: [`instance`] and [`device`] own the API objects,
//! [`allocator`] hands out buffers, images and samplers, [`pipeline`]
//! builds render passes and pipelines, [`swapchain`] owns the presentable
//! chain and everything sized to it, and [`frame`] drives the per-frame
//! loop through the [`backend`].

pub mod allocator;
pub mod backend;
pub mod debug;
pub mod device;
pub mod error;
pub mod frame;
pub mod instance;
pub mod mips;
pub mod pipeline;
pub mod swapchain;
pub mod uniforms;

use anyhow::Result;
use lumen_math::Vec3;
use lumen_render::{FrameStatus, FrameView, RenderSettings, RenderSize, Renderer, Scene, WindowState};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info};

use backend::VulkanBackend;
use frame::{FrameBackend, FrameOrchestrator};
use uniforms::{light_view_projection, FrameUniforms};

pub use error::{failure_class, VkError};

/// Bounding sphere of the scene's vertices, used to fit the shadow
/// camera. An empty scene gets a unit sphere at the origin.
pub fn scene_bounds(scene: &Scene) -> (Vec3, f32) {
    let mut points = scene.vertices.iter().map(|v| Vec3::from_array(v.position));
    let Some(first) = points.next() else {
        return (Vec3::ZERO, 1.0);
    };
    let (min, max) = points.fold((first, first), |(lo, hi), p| (lo.min(p), hi.max(p)));
    let center = (min + max) * 0.5;
    (center, ((max - min).length() * 0.5).max(0.01))
}

pub struct VkRenderer {
    orchestrator: FrameOrchestrator,
    backend: VulkanBackend,
    bounds: (Vec3, f32),
}

impl VkRenderer {
    pub fn frame_number(&self) -> u64 {
        self.orchestrator.frame_number()
    }

    fn uniforms(&self, view: &FrameView) -> FrameUniforms {
        let settings = self.backend.settings();
        let (center, radius) = self.bounds;
        let light = light_view_projection(view.light_direction, center, radius, settings.depth);
        FrameUniforms::new(view, light, settings.shadows)
    }
}

impl Renderer for VkRenderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        settings: &RenderSettings,
    ) -> Result<Self> {
        let backend = VulkanBackend::new(window, display, size, settings)?;
        let orchestrator = FrameOrchestrator::new(settings);
        info!(
            frames = orchestrator.frames_in_flight(),
            width = backend.extent().width,
            height = backend.extent().height,
            "vulkan renderer ready"
        );
        Ok(Self {
            orchestrator,
            backend,
            bounds: (Vec3::ZERO, 1.0),
        })
    }

    fn upload_scene(&mut self, scene: &Scene) -> Result<()> {
        self.backend.upload_scene(scene)?;
        self.bounds = scene_bounds(scene);
        Ok(())
    }

    fn render(
        &mut self,
        scene: &Scene,
        view: &FrameView,
        window: &mut WindowState,
    ) -> Result<FrameStatus> {
        let uniforms = self.uniforms(view);
        let status = self
            .orchestrator
            .draw_frame(&mut self.backend, scene, &uniforms, window)?;
        if status == FrameStatus::Recreated {
            let extent = self.backend.extent();
            debug!(width = extent.width, height = extent.height, "frame skipped for swapchain rebuild");
        }
        Ok(status)
    }

    fn aspect(&self) -> f32 {
        self.backend.extent().aspect()
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.orchestrator.set_clear_color(rgba);
    }
}
