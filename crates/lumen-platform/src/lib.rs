// SPDX-License-Identifier: CEPL-1.0
//! Window and input glue on top of winit. The renderer never sees winit
//! events; it polls the [`WindowState`] and [`CameraInput`] built here.

pub use winit;

use anyhow::{Context, Result};
use lumen_core::FailureClass;
use lumen_math::{CameraInput, Movement, Vec2};
use lumen_render::{RenderSize, WindowState};
use tracing::{debug, info};
use winit::{
    dpi::{LogicalSize, PhysicalSize},
    event::{DeviceEvent, ElementState, KeyEvent, MouseButton, WindowEvent},
    event_loop::ActiveEventLoop,
    keyboard::{KeyCode, PhysicalKey},
    window::Window,
};

pub fn render_size(size: PhysicalSize<u32>) -> RenderSize {
    RenderSize::new(size.width, size.height)
}

pub fn open_window(
    event_loop: &ActiveEventLoop,
    title: &str,
    width: u32,
    height: u32,
) -> Result<Window> {
    let attrs = Window::default_attributes()
        .with_title(title)
        .with_inner_size(LogicalSize::new(width.max(1), height.max(1)));
    let window = event_loop
        .create_window(attrs)
        .context("creating the main window")?;
    let size = window.inner_size();
    info!(width = size.width, height = size.height, "window created");
    Ok(window)
}

/// Classification probe for [`lumen_core::classify`].
pub fn failure_class(err: &(dyn std::error::Error + 'static)) -> Option<FailureClass> {
    if err.is::<winit::error::OsError>() || err.is::<winit::error::EventLoopError>() {
        Some(FailureClass::Window)
    } else {
        None
    }
}

fn movement_for(code: KeyCode) -> Option<Movement> {
    Some(match code {
        KeyCode::KeyW | KeyCode::ArrowUp => Movement::FORWARD,
        KeyCode::KeyS | KeyCode::ArrowDown => Movement::BACK,
        KeyCode::KeyA | KeyCode::ArrowLeft => Movement::LEFT,
        KeyCode::KeyD | KeyCode::ArrowRight => Movement::RIGHT,
        KeyCode::KeyE | KeyCode::Space => Movement::UP,
        KeyCode::KeyQ | KeyCode::ControlLeft => Movement::DOWN,
        _ => return None,
    })
}

/// Input accumulated between frames plus the window flags the renderer
/// polls. Mouse look is active while the right button is held.
#[derive(Debug, Default)]
pub struct InputState {
    window: WindowState,
    movement: Movement,
    look: Vec2,
    boost: bool,
    looking: bool,
}

impl InputState {
    pub fn new(extent: RenderSize) -> Self {
        Self {
            window: WindowState::new(extent),
            ..Self::default()
        }
    }

    pub fn window(&self) -> &WindowState {
        &self.window
    }

    pub fn window_mut(&mut self) -> &mut WindowState {
        &mut self.window
    }

    pub fn quit_requested(&self) -> bool {
        self.window.quit
    }

    pub fn key(&mut self, code: KeyCode, pressed: bool) {
        match code {
            KeyCode::Escape if pressed => self.request_quit(),
            KeyCode::ShiftLeft | KeyCode::ShiftRight => self.boost = pressed,
            _ => {
                if let Some(m) = movement_for(code) {
                    self.movement.set(m, pressed);
                }
            }
        }
    }

    pub fn mouse_button(&mut self, button: MouseButton, pressed: bool) {
        if button == MouseButton::Right {
            self.looking = pressed;
        }
    }

    pub fn mouse_motion(&mut self, dx: f64, dy: f64) {
        if self.looking {
            self.look += Vec2::new(dx as f32, dy as f32);
        }
    }

    pub fn resized(&mut self, extent: RenderSize) {
        if extent != self.window.extent {
            debug!(width = extent.width, height = extent.height, "resize");
            self.window.extent = extent;
            self.window.resized = true;
        }
    }

    pub fn request_quit(&mut self) {
        self.window.quit = true;
    }

    /// Focus loss drops every held key so nothing keeps moving.
    pub fn focus_lost(&mut self) {
        self.movement = Movement::empty();
        self.boost = false;
        self.looking = false;
        self.look = Vec2::ZERO;
    }

    /// Drain the accumulated deltas for this frame.
    pub fn take_camera_input(&mut self) -> CameraInput {
        CameraInput {
            movement: self.movement,
            look_delta: std::mem::take(&mut self.look),
            boost: self.boost,
        }
    }

    pub fn handle_window_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.request_quit(),
            WindowEvent::Resized(size) => self.resized(render_size(*size)),
            WindowEvent::Focused(false) => self.focus_lost(),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state,
                        repeat: false,
                        ..
                    },
                ..
            } => self.key(*code, *state == ElementState::Pressed),
            WindowEvent::MouseInput { state, button, .. } => {
                self.mouse_button(*button, *state == ElementState::Pressed)
            }
            _ => {}
        }
    }

    pub fn handle_device_event(&mut self, event: &DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            self.mouse_motion(*dx, *dy);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn held_keys_combine_into_movement() {
        let mut input = InputState::new(RenderSize::new(800, 600));
        input.key(KeyCode::KeyW, true);
        input.key(KeyCode::KeyD, true);
        input.key(KeyCode::ShiftLeft, true);
        let cam = input.take_camera_input();
        assert_eq!(cam.movement, Movement::FORWARD | Movement::RIGHT);
        assert!(cam.boost);

        input.key(KeyCode::KeyW, false);
        assert_eq!(input.take_camera_input().movement, Movement::RIGHT);
    }

    #[test]
    fn mouse_look_only_while_right_button_held() {
        let mut input = InputState::new(RenderSize::new(800, 600));
        input.mouse_motion(5.0, 5.0);
        assert_eq!(input.take_camera_input().look_delta, Vec2::ZERO);

        input.mouse_button(MouseButton::Right, true);
        input.mouse_motion(3.0, -1.0);
        input.mouse_motion(1.0, 2.0);
        assert_eq!(input.take_camera_input().look_delta, Vec2::new(4.0, 1.0));
        assert_eq!(input.take_camera_input().look_delta, Vec2::ZERO);
    }

    #[test]
    fn resize_sets_flag_once_per_change() {
        let mut input = InputState::new(RenderSize::new(800, 600));
        input.handle_window_event(&WindowEvent::Resized(PhysicalSize::new(800, 600)));
        assert!(!input.window().resized);

        input.handle_window_event(&WindowEvent::Resized(PhysicalSize::new(0, 0)));
        assert!(input.window().resized);
        assert!(input.window().extent.is_empty());

        input.window_mut().resized = false;
        input.handle_window_event(&WindowEvent::Resized(PhysicalSize::new(1024, 768)));
        assert!(input.window().resized);
        assert_eq!(input.window().extent, RenderSize::new(1024, 768));
    }

    #[test]
    fn close_and_escape_request_quit() {
        let mut input = InputState::new(RenderSize::new(1, 1));
        input.handle_window_event(&WindowEvent::CloseRequested);
        assert!(input.quit_requested());

        let mut input = InputState::new(RenderSize::new(1, 1));
        input.key(KeyCode::Escape, true);
        assert!(input.quit_requested());
    }

    #[test]
    fn focus_loss_releases_everything() {
        let mut input = InputState::new(RenderSize::new(1, 1));
        input.key(KeyCode::KeyA, true);
        input.mouse_button(MouseButton::Right, true);
        input.mouse_motion(2.0, 2.0);
        input.handle_window_event(&WindowEvent::Focused(false));
        let cam = input.take_camera_input();
        assert!(cam.movement.is_empty());
        assert_eq!(cam.look_delta, Vec2::ZERO);
        input.mouse_motion(2.0, 2.0);
        assert_eq!(input.take_camera_input().look_delta, Vec2::ZERO);
    }
}
