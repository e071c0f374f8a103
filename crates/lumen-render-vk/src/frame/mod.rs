// SPDX-License-Identifier: CEPL-1.0
//! The per-frame loop: wait, acquire, record, submit, present, advance.
//!
//! [`FrameOrchestrator`] owns the slot bookkeeping and the order of
//! operations; everything that touches the GPU goes through
//! [`FrameBackend`], which the Vulkan backend implements.

use crate::error::VkError;
use crate::uniforms::{FrameUniforms, PushConstants};
use anyhow::Result;
use lumen_math::{DepthConvention, Mat4};
use lumen_render::{FrameStatus, Primitive, RenderSettings, RenderSize, Scene, WindowState};
use tracing::{debug, trace, warn};

#[cfg(test)]
mod tests;

/// Viewports start at the bottom edge with a negative height so clip-space
/// +Y points up on screen. Applied to every pass.
pub const VIEWPORT_FLIP_Y: bool = true;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquire {
    Ready { image_index: u32, suboptimal: bool },
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Present {
    Optimal,
    Suboptimal,
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PassKind {
    Shadow,
    Main,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClearValues {
    pub color: [f32; 4],
    pub depth: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn covering(extent: RenderSize) -> Self {
        let (width, height) = (extent.width as f32, extent.height as f32);
        let (y, height) = if VIEWPORT_FLIP_Y {
            (height, -height)
        } else {
            (0.0, height)
        };
        Self {
            x: 0.0,
            y,
            width,
            height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Shadow-pass depth bias. Pushes stored occluder depth away from the
/// light in whichever direction the depth convention counts as "farther".
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthBias {
    pub constant: f32,
    pub slope: f32,
}

impl DepthBias {
    pub fn for_convention(depth: DepthConvention) -> Self {
        let sign = match depth {
            DepthConvention::Standard => 1.0,
            DepthConvention::Reversed => -1.0,
        };
        Self {
            constant: 1.25 * sign,
            slope: 1.75 * sign,
        }
    }
}

/// What the last scene upload left on the GPU.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Resident {
    pub indices: u64,
    pub materials: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SlotState {
    #[default]
    Idle,
    Acquiring,
    Recording,
    Submitted,
    Presenting,
}

/// GPU-facing half of the frame loop. Recording calls cannot fail; anything
/// that talks to the queue or the swapchain returns a `Result`.
pub trait FrameBackend {
    fn extent(&self) -> RenderSize;
    fn shadow_extent(&self) -> RenderSize;
    fn resident(&self) -> Resident;

    /// Block until the slot's previous submission has retired.
    fn wait_for_slot(&mut self, slot: usize) -> Result<()>;
    fn acquire_image(&mut self, slot: usize) -> Result<Acquire>;
    /// Swap the slot's image-available semaphore for a fresh one.
    fn replace_image_available(&mut self, slot: usize) -> Result<()>;
    /// `Ok(false)` when the surface has no area and nothing was rebuilt.
    fn recreate_swapchain(&mut self, size: RenderSize) -> Result<bool>;

    fn write_uniforms(&mut self, slot: usize, uniforms: &FrameUniforms) -> Result<()>;
    /// Reset the slot's fence and command buffer and begin recording.
    fn begin_recording(&mut self, slot: usize) -> Result<()>;
    fn begin_pass(&mut self, slot: usize, pass: PassKind, image_index: u32, clear: &ClearValues);
    fn set_viewport(&mut self, slot: usize, viewport: &Viewport, scissor: RenderSize);
    fn set_depth_bias(&mut self, slot: usize, bias: DepthBias);
    fn bind_pipeline(&mut self, slot: usize, pass: PassKind);
    fn bind_geometry(&mut self, slot: usize);
    fn bind_frame_set(&mut self, slot: usize, pass: PassKind);
    fn bind_material(&mut self, slot: usize, material: usize);
    fn push_constants(&mut self, slot: usize, pass: PassKind, constants: &PushConstants);
    fn draw_indexed(&mut self, slot: usize, index_count: u32, first_index: u32);
    /// Extra work recorded at the end of the main pass (UI overlays).
    fn record_overlay(&mut self, _slot: usize) -> Result<()> {
        Ok(())
    }
    fn end_pass(&mut self, slot: usize);
    fn end_recording(&mut self, slot: usize) -> Result<()>;

    fn submit(&mut self, slot: usize, image_index: u32) -> Result<()>;
    fn present(&mut self, slot: usize, image_index: u32) -> Result<Present>;
}

/// One primitive with the global transform of the node that owns it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawItem {
    pub transform: Mat4,
    pub primitive: Primitive,
    pub has_normal_map: bool,
}

/// Depth-first walk of the node tree, parents before children, siblings in
/// order. Iterative so deep trees cannot overflow the stack.
pub fn draw_list(scene: &Scene) -> Vec<DrawItem> {
    let mut items = Vec::with_capacity(scene.primitive_count());
    let mut stack: Vec<_> = scene
        .roots
        .iter()
        .rev()
        .map(|node| (node, Mat4::IDENTITY))
        .collect();
    while let Some((node, parent)) = stack.pop() {
        let global = parent * node.transform;
        if let Some(mesh) = &node.mesh {
            for &primitive in &mesh.primitives {
                let has_normal_map = scene
                    .materials
                    .get(primitive.material)
                    .is_some_and(|m| m.normal_map.is_some());
                items.push(DrawItem {
                    transform: global,
                    primitive,
                    has_normal_map,
                });
            }
        }
        stack.extend(node.children.iter().rev().map(|child| (child, global)));
    }
    items
}

/// Every draw must stay inside the uploaded index buffer and name an
/// uploaded material; anything else would read past GPU allocations.
pub fn check_resident(draws: &[DrawItem], resident: Resident) -> Result<(), VkError> {
    for item in draws {
        let p = item.primitive;
        let end = p.first_index as u64 + p.index_count as u64;
        if end > resident.indices {
            return Err(VkError::DrawOutOfRange {
                first: p.first_index,
                end,
                resident: resident.indices,
            });
        }
        if p.material >= resident.materials {
            return Err(VkError::MaterialNotResident {
                material: p.material,
                resident: resident.materials,
            });
        }
    }
    Ok(())
}

/// Wait in `slice_ms` slices. Each timed-out slice is logged; after
/// `max_timeouts` in a row the wait is abandoned as a device hang.
/// `wait` receives the slice in nanoseconds and reports whether the
/// object signalled.
pub fn wait_with_watchdog(
    what: &'static str,
    slice_ms: u64,
    max_timeouts: u32,
    mut wait: impl FnMut(u64) -> Result<bool, VkError>,
) -> Result<(), VkError> {
    let slice_ms = slice_ms.max(1);
    let max_timeouts = max_timeouts.max(1);
    let mut timeouts = 0;
    while !wait(slice_ms.saturating_mul(1_000_000))? {
        timeouts += 1;
        warn!(what, timeouts, slice_ms, "fence wait timed out");
        if timeouts >= max_timeouts {
            return Err(VkError::DeviceHang {
                what,
                timeouts,
                slice_ms,
            });
        }
    }
    Ok(())
}

pub struct FrameOrchestrator {
    frames: usize,
    current: usize,
    states: Vec<SlotState>,
    depth: DepthConvention,
    shadows: bool,
    clear_color: [f32; 4],
    frame_number: u64,
}

impl FrameOrchestrator {
    pub fn new(settings: &RenderSettings) -> Self {
        let frames = settings.frames_in_flight();
        Self {
            frames,
            current: 0,
            states: vec![SlotState::Idle; frames],
            depth: settings.depth,
            shadows: settings.shadows,
            clear_color: settings.clear_color,
            frame_number: 0,
        }
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames
    }

    pub fn current_slot(&self) -> usize {
        self.current
    }

    pub fn slot_state(&self, slot: usize) -> SlotState {
        self.states[slot]
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear_color = rgba;
    }

    pub fn clear_values(&self) -> ClearValues {
        ClearValues {
            color: self.clear_color,
            depth: self.depth.clear_depth(),
        }
    }

    fn enter(&mut self, slot: usize, next: SlotState) {
        trace!(slot, from = ?self.states[slot], to = ?next, "slot state");
        self.states[slot] = next;
    }

    /// One pass through the loop for the current slot.
    pub fn draw_frame<B: FrameBackend>(
        &mut self,
        backend: &mut B,
        scene: &Scene,
        uniforms: &FrameUniforms,
        window: &mut WindowState,
    ) -> Result<FrameStatus> {
        if window.extent.is_empty() {
            return Ok(FrameStatus::Suspended);
        }
        let slot = self.current;
        let draws = if scene.is_empty() {
            Vec::new()
        } else {
            draw_list(scene)
        };
        check_resident(&draws, backend.resident())?;

        backend.wait_for_slot(slot)?;
        self.enter(slot, SlotState::Acquiring);
        let image_index = match backend.acquire_image(slot)? {
            Acquire::Ready {
                image_index,
                suboptimal: false,
            } => image_index,
            stale => {
                debug!(slot, ?stale, "swapchain stale at acquire");
                let rebuilt = backend.recreate_swapchain(window.extent)?;
                backend.replace_image_available(slot)?;
                self.enter(slot, SlotState::Idle);
                // A surface that reports no area keeps the resize pending.
                window.resized = !rebuilt;
                return Ok(if rebuilt {
                    FrameStatus::Recreated
                } else {
                    FrameStatus::Suspended
                });
            }
        };

        self.enter(slot, SlotState::Recording);
        backend.write_uniforms(slot, uniforms)?;
        backend.begin_recording(slot)?;
        if self.shadows {
            self.record_pass(backend, slot, PassKind::Shadow, image_index, &draws)?;
        }
        self.record_pass(backend, slot, PassKind::Main, image_index, &draws)?;
        backend.end_recording(slot)?;

        backend.submit(slot, image_index)?;
        self.enter(slot, SlotState::Submitted);

        self.enter(slot, SlotState::Presenting);
        let presented = backend.present(slot, image_index)?;
        if presented != Present::Optimal || window.resized {
            debug!(slot, ?presented, resized = window.resized, "recreating after present");
            window.resized = !backend.recreate_swapchain(window.extent)?;
        }
        self.enter(slot, SlotState::Idle);

        self.current = (self.current + 1) % self.frames;
        self.frame_number += 1;
        Ok(FrameStatus::Presented { image_index })
    }

    fn record_pass<B: FrameBackend>(
        &self,
        backend: &mut B,
        slot: usize,
        pass: PassKind,
        image_index: u32,
        draws: &[DrawItem],
    ) -> Result<()> {
        let extent = match pass {
            PassKind::Shadow => backend.shadow_extent(),
            PassKind::Main => backend.extent(),
        };
        backend.begin_pass(slot, pass, image_index, &self.clear_values());
        backend.set_viewport(slot, &Viewport::covering(extent), extent);
        if pass == PassKind::Shadow {
            backend.set_depth_bias(slot, DepthBias::for_convention(self.depth));
        }
        if !draws.is_empty() {
            backend.bind_pipeline(slot, pass);
            backend.bind_geometry(slot);
            backend.bind_frame_set(slot, pass);
            let mut bound_material = None;
            for item in draws {
                let constants = PushConstants::new(item.transform, item.has_normal_map);
                backend.push_constants(slot, pass, &constants);
                if pass == PassKind::Main && bound_material != Some(item.primitive.material) {
                    backend.bind_material(slot, item.primitive.material);
                    bound_material = Some(item.primitive.material);
                }
                backend.draw_indexed(slot, item.primitive.index_count, item.primitive.first_index);
            }
        }
        if pass == PassKind::Main {
            backend.record_overlay(slot)?;
        }
        backend.end_pass(slot);
        Ok(())
    }
}
