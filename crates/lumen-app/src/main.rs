// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use lumen_core::{classify, init_tracing, FailureClass, FrameClock};
use lumen_math::{Camera, Vec3};
use lumen_platform::{open_window, render_size, InputState};
use lumen_render::{FrameStatus, FrameView, RenderSettings, Renderer, Scene};
use lumen_render_vk::VkRenderer;
use tracing::{debug, error, info};

use lumen_platform::winit::{
    application::ApplicationHandler,
    event::{DeviceEvent, DeviceId, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

use config::{load_cfg, AppCfg};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Wavefront OBJ file to view; the demo scene is used when omitted
    #[arg(long)]
    scene: Option<PathBuf>,
    /// Image used as the base colour of every material
    #[arg(long)]
    texture: Option<PathBuf>,
    /// Configuration file
    #[arg(long, default_value = "lumen.toml")]
    config: PathBuf,
    /// Exit after this many presented frames
    #[arg(long)]
    frames: Option<u64>,
    /// Directory holding the compiled SPIR-V shaders
    #[arg(long)]
    shaders: Option<PathBuf>,
}

fn probe(err: &(dyn std::error::Error + 'static)) -> Option<FailureClass> {
    lumen_render_vk::failure_class(err)
        .or_else(|| lumen_scene::failure_class(err))
        .or_else(|| lumen_platform::failure_class(err))
        .or_else(|| config::failure_class(err))
}

// Field order matters: the renderer must drop before the window it draws to.
struct App {
    renderer: Option<VkRenderer>,
    window: Option<Window>,
    scene: Scene,
    settings: RenderSettings,
    cfg: AppCfg,
    camera: Camera,
    input: InputState,
    clock: FrameClock,
    frame_limit: Option<u64>,
    presented: u64,
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(cfg: AppCfg, settings: RenderSettings, scene: Scene, frame_limit: Option<u64>) -> Self {
        let aspect = cfg.window.width.max(1) as f32 / cfg.window.height.max(1) as f32;
        App {
            renderer: None,
            window: None,
            scene,
            settings,
            cfg,
            camera: Camera::looking_at(Vec3::new(4.0, 3.0, 6.0), Vec3::ZERO, aspect),
            input: InputState::default(),
            clock: FrameClock::new(),
            frame_limit,
            presented: 0,
            failure: None,
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = open_window(
            event_loop,
            &self.cfg.window.title,
            self.cfg.window.width,
            self.cfg.window.height,
        )?;
        let size = render_size(window.inner_size());
        let mut renderer = VkRenderer::new(&window, &window, size, &self.settings)
            .context("initialising the renderer")?;
        renderer.upload_scene(&self.scene).context("uploading the scene")?;
        self.camera.on_resize(renderer.aspect());
        self.input = InputState::new(size);
        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    fn stop(&mut self, event_loop: &ActiveEventLoop) {
        self.renderer = None;
        self.window = None;
        event_loop.exit();
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        self.failure = Some(err);
        self.stop(event_loop);
    }

    fn frame(&mut self) -> Result<()> {
        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(());
        };
        let dt = self.clock.tick();
        self.camera.apply_input(&self.input.take_camera_input(), dt);
        let view = FrameView {
            view: self.camera.view(),
            projection: self.camera.projection(self.settings.depth),
            camera_position: self.camera.position,
            ..FrameView::default()
        };

        match renderer.render(&self.scene, &view, self.input.window_mut())? {
            FrameStatus::Presented { .. } => {
                self.presented += 1;
                if let Some(fps) = self.clock.frame_rendered() {
                    info!("fps ~ {fps}");
                }
                // Suboptimal presents and resizes rebuild inside the call.
                self.camera.on_resize(renderer.aspect());
            }
            FrameStatus::Recreated => self.camera.on_resize(renderer.aspect()),
            FrameStatus::Suspended => self.clock.reset_sample(),
        }
        Ok(())
    }

    fn done(&self) -> bool {
        self.input.quit_requested() || self.frame_limit.is_some_and(|n| self.presented >= n)
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.start(event_loop) {
                self.fail(event_loop, e);
                return;
            }
        }
        event_loop.set_control_flow(ControlFlow::Poll);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.window.as_ref().is_some_and(|w| w.id() != window_id) {
            return;
        }
        self.input.handle_window_event(&event);

        if let WindowEvent::RedrawRequested = event {
            if let Err(e) = self.frame() {
                self.fail(event_loop, e);
                return;
            }
        }
        if self.done() {
            info!(frames = self.presented, "exiting");
            self.stop(event_loop);
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: DeviceId,
        event: DeviceEvent,
    ) {
        self.input.handle_device_event(&event);
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(window) = &self.window else {
            return;
        };
        // A minimised window has nothing to draw; sleep until the next event.
        if self.input.window().extent.is_empty() {
            event_loop.set_control_flow(ControlFlow::Wait);
        } else {
            event_loop.set_control_flow(ControlFlow::Poll);
            window.request_redraw();
        }
    }
}

fn run(args: Args) -> Result<()> {
    let cfg = load_cfg(&args.config);
    let settings = cfg.render.settings(args.shaders.as_deref())?;
    debug!(?settings, "render settings");

    // Nothing to show without a scene; fail before a window ever opens.
    let scene = lumen_scene::load(args.scene.as_deref(), args.texture.as_deref())?;

    let event_loop: EventLoop<()> = EventLoop::new().context("creating the event loop")?;
    let mut app = App::new(cfg, settings, scene, args.frames);
    event_loop.run_app(&mut app).context("running the event loop")?;
    match app.failure.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let class = classify(&err, probe);
            error!(%class, "fatal: {err:#}");
            ExitCode::from(class.exit_code())
        }
    }
}
