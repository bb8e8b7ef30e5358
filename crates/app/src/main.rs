//! dither - Vulkan renderer demo with a standard and a PS1-style retro mode.

mod controller;
mod overlay;
mod scene;

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use glam::Vec3;
use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::window::WindowId;

use dither_core::{RenderMode, RendererConfig, Timer};
use dither_platform::{InputState, KeyCode, Window};
use dither_renderer::{FrameToggles, Renderer};
use dither_scene::Camera;

use controller::CameraController;
use overlay::TitleOverlay;
use scene::Scene;

const FOV_Y_DEGREES: f32 = 50.0;
const NEAR_PLANE: f32 = 0.1;
const FAR_PLANE: f32 = 1000.0;
const START_POSITION: Vec3 = Vec3::new(0.0, 0.0, -2.5);
const LIGHT_INTENSITY_STEP: f32 = 0.1;

/// Number keys flip material maps, `-`/`=` scale the lights.
/// Returns whether anything changed.
fn apply_toggle_keys(input: &InputState, toggles: &mut FrameToggles) -> bool {
    let mut changed = false;
    let maps = [
        (KeyCode::Digit1, &mut toggles.use_albedo_map),
        (KeyCode::Digit2, &mut toggles.use_normal_map),
        (KeyCode::Digit3, &mut toggles.use_emissive_map),
        (KeyCode::Digit4, &mut toggles.use_ao_map),
    ];
    for (key, flag) in maps {
        if input.is_just_pressed(key) {
            *flag = !*flag;
            changed = true;
        }
    }
    if input.is_just_pressed(KeyCode::Equal) {
        toggles.light_intensity += LIGHT_INTENSITY_STEP;
        changed = true;
    }
    if input.is_just_pressed(KeyCode::Minus) {
        toggles.light_intensity = (toggles.light_intensity - LIGHT_INTENSITY_STEP).max(0.0);
        changed = true;
    }
    changed
}

#[derive(Parser, Debug)]
#[command(name = "dither", version, about = "Vulkan renderer with a PS1-style retro mode")]
struct Args {
    /// TOML configuration file
    #[arg(long, default_value = RendererConfig::DEFAULT_PATH)]
    config: PathBuf,

    /// Render mode (standard or retro)
    #[arg(long)]
    mode: Option<RenderMode>,

    /// Disable the Vulkan validation layer
    #[arg(long)]
    no_validation: bool,

    /// Frames recorded ahead of the GPU (1-3)
    #[arg(long)]
    frames_in_flight: Option<usize>,

    /// Log filter, e.g. "info,dither_renderer=trace"
    #[arg(long)]
    log: Option<String>,
}

impl Args {
    fn apply(&self, config: &mut RendererConfig) {
        if let Some(mode) = self.mode {
            config.render.mode = mode;
        }
        if self.no_validation {
            config.render.validation = false;
        }
        if let Some(frames) = self.frames_in_flight {
            config.render.frames_in_flight = frames;
        }
        if let Some(filter) = &self.log {
            config.log.filter = Some(filter.clone());
        }
    }
}

/// Window, renderer and scene exist only between `resumed` and shutdown.
struct Running {
    // Declaration order is drop order: scene resources go before the renderer.
    scene: Scene,
    overlay: TitleOverlay,
    renderer: Renderer,
    window: Window,
}

struct App {
    config: RendererConfig,
    running: Option<Running>,
    input: InputState,
    controller: CameraController,
    camera: Camera,
    timer: Timer,
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(config: RendererConfig) -> Self {
        Self {
            config,
            running: None,
            input: InputState::new(),
            controller: CameraController::new(START_POSITION),
            camera: Camera::new(),
            timer: Timer::new(),
            fatal: None,
        }
    }

    fn start(&self, event_loop: &ActiveEventLoop) -> Result<Running> {
        let window =
            Window::new(event_loop, &self.config.window).context("Failed to create window")?;
        let renderer =
            Renderer::new(&window, &self.config).context("Failed to initialize renderer")?;
        let scene = Scene::build(&renderer).context("Failed to build scene")?;
        let overlay = TitleOverlay::new(window.shared(), self.config.window.title.clone());

        Ok(Running {
            scene,
            overlay,
            renderer,
            window,
        })
    }

    fn redraw(&mut self) -> Result<()> {
        let Some(running) = self.running.as_mut() else {
            return Ok(());
        };

        let dt = self.timer.delta_secs();
        if self.controller.update(&self.input, dt) {
            running.window.set_cursor_captured(self.controller.mouse_look());
        }
        if apply_toggle_keys(&self.input, running.renderer.toggles_mut()) {
            info!("Frame toggles: {:?}", running.renderer.toggles());
        }
        self.input.end_frame();

        self.controller.apply(&mut self.camera);
        let aspect = running.renderer.aspect_ratio();
        if aspect > 0.0 {
            self.camera.set_perspective_projection(
                FOV_Y_DEGREES.to_radians(),
                aspect,
                NEAR_PLANE,
                FAR_PLANE,
            );
        }

        running
            .renderer
            .render_frame(
                &self.camera,
                &mut running.scene.objects,
                dt,
                Some(&mut running.overlay),
            )
            .context("Failed to render frame")?;
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Some(running) = self.running.take() {
            if let Err(e) = running.renderer.wait_idle() {
                error!("Failed to wait for device idle: {:?}", e);
            }
            drop(running);
            info!("Shut down after {:.1}s", self.timer.elapsed_secs());
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, e: anyhow::Error) {
        error!("{:#}", e);
        self.fatal = Some(e);
        self.shutdown();
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() {
            return;
        }
        match self.start(event_loop) {
            Ok(running) => {
                info!("Initialization complete, entering main loop");
                self.timer.reset();
                self.running = Some(running);
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                self.shutdown();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(running) = self.running.as_mut() {
                    running.renderer.request_resize(size.width, size.height);
                }
            }
            WindowEvent::Focused(false) => self.input.clear(),
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    if event.state.is_pressed() {
                        self.input.on_key_pressed(key);
                    } else {
                        self.input.on_key_released(key);
                    }
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    self.fail(event_loop, e);
                }
            }
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _id: DeviceId, event: DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            self.input.on_mouse_motion(dx, dy);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(running) = self.running.as_ref() {
            running.window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = RendererConfig::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    match config.log.filter.as_deref() {
        Some(filter) => dither_core::init_logging_with(filter),
        None => dither_core::init_logging(),
    }
    info!("Starting dither in {:?} mode", config.render.mode);
    if config.render.validation && !cfg!(debug_assertions) {
        warn!("Validation layer enabled in a release build");
    }

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop
        .run_app(&mut app)
        .map_err(|e| anyhow!("Event loop error: {e}"))?;

    match app.fatal.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let args = Args::parse_from([
            "dither",
            "--mode",
            "retro",
            "--no-validation",
            "--frames-in-flight",
            "3",
            "--log",
            "warn",
        ]);
        let mut config = RendererConfig::default();
        args.apply(&mut config);

        assert_eq!(config.render.mode, RenderMode::Retro);
        assert!(!config.render.validation);
        assert_eq!(config.render.frames_in_flight, 3);
        assert_eq!(config.log.filter.as_deref(), Some("warn"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_no_flags_keep_file_values() {
        let args = Args::parse_from(["dither"]);
        let mut config = RendererConfig::from_toml("[render]\nmode = \"retro\"\n").unwrap();
        args.apply(&mut config);
        assert_eq!(config.render.mode, RenderMode::Retro);
        assert_eq!(args.config, PathBuf::from("dither.toml"));
    }

    #[test]
    fn test_toggle_keys_flip_maps_and_scale_lights() {
        let mut input = InputState::new();
        let mut toggles = FrameToggles::default();
        assert!(!apply_toggle_keys(&input, &mut toggles));

        input.on_key_pressed(KeyCode::Digit2);
        input.on_key_pressed(KeyCode::Minus);
        assert!(apply_toggle_keys(&input, &mut toggles));
        assert!(toggles.use_albedo_map);
        assert!(!toggles.use_normal_map);
        assert!((toggles.light_intensity - 0.4).abs() < 1e-6);

        // Held keys do not repeat.
        input.end_frame();
        assert!(!apply_toggle_keys(&input, &mut toggles));
        assert!(!toggles.use_normal_map);
    }

    #[test]
    fn test_light_intensity_never_negative() {
        let mut input = InputState::new();
        let mut toggles = FrameToggles {
            light_intensity: 0.05,
            ..FrameToggles::default()
        };
        input.on_key_pressed(KeyCode::Minus);
        apply_toggle_keys(&input, &mut toggles);
        assert_eq!(toggles.light_intensity, 0.0);
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        assert!(Args::try_parse_from(["dither", "--mode", "vector"]).is_err());
    }
}
