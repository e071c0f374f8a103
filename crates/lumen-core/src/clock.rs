// SPDX-License-Identifier: CEPL-1.0
use std::time::{Duration, Instant};

/// Delta-time source for the run loop, plus a once-per-second fps sample.
#[derive(Debug)]
pub struct FrameClock {
    last_tick: Instant,
    window_start: Instant,
    frames_in_window: u32,
}

impl FrameClock {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            last_tick: now,
            window_start: now,
            frames_in_window: 0,
        }
    }

    /// Seconds since the previous call.
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let dt = now - self.last_tick;
        self.last_tick = now;
        dt.as_secs_f32()
    }

    /// Count a rendered frame. Returns the frame count of the last full
    /// second once a second has elapsed.
    pub fn frame_rendered(&mut self) -> Option<u32> {
        self.frames_in_window = self.frames_in_window.saturating_add(1);
        let now = Instant::now();
        if now.duration_since(self.window_start) >= Duration::from_secs(1) {
            let fps = self.frames_in_window;
            self.frames_in_window = 0;
            self.window_start = now;
            Some(fps)
        } else {
            None
        }
    }

    /// Drop the partial sample, used while rendering is paused.
    pub fn reset_sample(&mut self) {
        self.frames_in_window = 0;
        self.window_start = Instant::now();
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
