// SPDX-License-Identifier: CEPL-1.0
use std::path::PathBuf;

use crate::DepthConvention;

/// Preferred presentation mode. Mailbox falls back to FIFO when the
/// surface does not offer it; FIFO is always available.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PresentPreference {
    Fifo,
    #[default]
    Mailbox,
}

/// Engine knobs, filled from `lumen.toml` by the app.
#[derive(Clone, Debug)]
pub struct RenderSettings {
    /// Depth of CPU/GPU pipelining (frames in flight).
    pub concurrent_frames: usize,
    /// Requested MSAA sample count, clamped to what the device supports.
    pub msaa_samples: u32,
    pub depth: DepthConvention,
    pub present: PresentPreference,
    pub shadows: bool,
    pub shadow_map_size: u32,
    pub clear_color: [f32; 4],
    /// Requested sampler anisotropy, clamped to the device limit.
    pub anisotropy: f32,
    /// Directory holding `scene.vert.spv`, `scene.frag.spv`, `shadow.vert.spv`.
    pub shader_dir: PathBuf,
    /// Length of one fence wait slice before a hang warning is logged.
    pub fence_timeout_ms: u64,
    /// Consecutive timed-out slices before the wait is treated as a hang.
    pub max_fence_timeouts: u32,
}

impl RenderSettings {
    /// Frames in flight, never less than one.
    pub fn frames_in_flight(&self) -> usize {
        self.concurrent_frames.max(1)
    }
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            concurrent_frames: 2,
            msaa_samples: 4,
            depth: DepthConvention::Reversed,
            present: PresentPreference::Mailbox,
            shadows: true,
            shadow_map_size: 2048,
            clear_color: [0.02, 0.02, 0.04, 1.0],
            anisotropy: 16.0,
            shader_dir: PathBuf::from("shaders"),
            fence_timeout_ms: 2_000,
            max_fence_timeouts: 5,
        }
    }
}
