//! Deferred vs forward shading demo
//!
//! Keys: 1/2/3 switch between textured quad, deferred and forward.
//! G, K and N toggle the light gizmos, the skybox and relief mapping.
//! WASD/RF move and the left mouse button looks around.

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use winit::{
    event::{Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
};

use deferred_renderer::backend::BackendError;
use deferred_renderer::window::Action;
use deferred_renderer::{
    Engine, GraphicsBackend, RenderMode, RendererConfig, RendererError, WgpuBackend, Window,
};

/// Render mode selection for CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
enum CliMode {
    /// A single texture on a fullscreen quad.
    Quad,
    /// G-buffer geometry pass followed by a fullscreen lighting pass.
    #[default]
    Deferred,
    /// One lit pass per entity.
    Forward,
}

impl From<CliMode> for RenderMode {
    fn from(cli: CliMode) -> Self {
        match cli {
            CliMode::Quad => RenderMode::TexturedQuad,
            CliMode::Deferred => RenderMode::Deferred,
            CliMode::Forward => RenderMode::Forward,
        }
    }
}

/// Deferred renderer demo arguments.
#[derive(Parser, Debug)]
#[command(
    name = "deferred-demo",
    about = "Deferred vs forward shading over a small static scene",
    version
)]
struct Args {
    /// Directory holding Cube/, dice.png and skybox/.
    #[arg(long, default_value = "assets")]
    assets: PathBuf,

    /// Directory of <program>.wgsl overrides, reloaded when they change.
    #[arg(long)]
    shaders: Option<PathBuf>,

    /// Render mode of the first frame.
    #[arg(long, default_value = "deferred", value_enum)]
    mode: CliMode,

    /// Initial window width in pixels.
    #[arg(long, default_value = "1280")]
    width: u32,

    /// Initial window height in pixels.
    #[arg(long, default_value = "720")]
    height: u32,

    /// Disable vertical sync (may cause tearing).
    #[arg(long)]
    no_vsync: bool,

    /// Start without the skybox.
    #[arg(long)]
    no_skybox: bool,

    /// Start without light gizmos.
    #[arg(long)]
    no_gizmos: bool,

    /// Exit after rendering N frames (useful for testing).
    #[arg(long)]
    max_frames: Option<u64>,
}

impl From<&Args> for RendererConfig {
    fn from(args: &Args) -> Self {
        Self {
            width: args.width,
            height: args.height,
            vsync: !args.no_vsync,
            asset_dir: args.assets.clone(),
            shader_dir: args.shaders.clone(),
            mode: args.mode.into(),
            show_skybox: !args.no_skybox,
            show_gizmos: !args.no_gizmos,
            ..Default::default()
        }
    }
}

fn apply_action<B: GraphicsBackend>(engine: &mut Engine<B>, action: Action) {
    match action {
        Action::SetMode(mode) => engine.set_mode(mode),
        Action::ToggleGizmos => {
            let settings = engine.settings_mut();
            settings.show_gizmos = !settings.show_gizmos;
            log::info!("Gizmos: {}", settings.show_gizmos);
        }
        Action::ToggleSkybox => {
            let settings = engine.settings_mut();
            settings.show_skybox = !settings.show_skybox;
            log::info!("Skybox: {}", settings.show_skybox);
        }
        Action::ToggleRelief => {
            let settings = engine.settings_mut();
            settings.show_relief = !settings.show_relief;
            log::info!("Relief mapping: {}", settings.show_relief);
        }
        // Handled by the event loop
        Action::Exit => {}
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let config = RendererConfig::from(&args);
    let max_frames = args.max_frames;

    let event_loop = EventLoop::new()?;
    let mut window = Window::new(&event_loop, &config.title, config.width, config.height)?;
    let backend = WgpuBackend::new(window.window_arc(), config.vsync)?;
    let mut engine = Engine::new(backend, config)?;

    let mut last_frame = Instant::now();
    let mut fps_timer = Instant::now();
    let mut fps_frames = 0u32;
    let mut frame_count = 0u64;

    event_loop.run(move |event, elwt| {
        elwt.set_control_flow(ControlFlow::Poll);

        match event {
            Event::WindowEvent { event, .. } => {
                window.handle_event(&event);

                for action in window.input_mut().take_actions() {
                    if action == Action::Exit {
                        elwt.exit();
                    }
                    apply_action(&mut engine, action);
                }
                if window.should_close() {
                    elwt.exit();
                }

                if let WindowEvent::RedrawRequested = event {
                    if window.take_resized() {
                        let (width, height) = window.dimensions();
                        if let Err(e) = engine.resize(width, height) {
                            log::error!("Resize failed: {}", e);
                            elwt.exit();
                            return;
                        }
                    }

                    let now = Instant::now();
                    let dt = (now - last_frame).as_secs_f32();
                    last_frame = now;

                    engine.update(dt, window.input().camera());
                    window.input_mut().end_frame();

                    match engine.render() {
                        Ok(()) => {}
                        // The backend reconfigures the surface, the next frame recovers
                        Err(RendererError::Backend(BackendError::SurfaceLost)) => {
                            log::warn!("Surface lost, skipping frame");
                        }
                        Err(e) => log::error!("Frame failed: {}", e),
                    }

                    fps_frames += 1;
                    frame_count += 1;
                    let elapsed = fps_timer.elapsed().as_secs_f32();
                    if elapsed >= 1.0 {
                        log::info!(
                            "{:.1} fps ({})",
                            fps_frames as f32 / elapsed,
                            engine.settings().mode
                        );
                        fps_frames = 0;
                        fps_timer = Instant::now();
                    }

                    if max_frames.is_some_and(|max| frame_count >= max) {
                        log::info!("Reached {} frames, exiting", frame_count);
                        elwt.exit();
                    }
                }
            }
            Event::AboutToWait => {
                window.request_redraw();
            }
            _ => {}
        }
    })?;

    Ok(())
}
