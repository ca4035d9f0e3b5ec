// SPDX-License-Identifier: CEPL-1.0
mod assets;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;
use texel_core::{init_tracing, report_fatal};
use texel_platform::{render_size, should_pause};
use texel_render::{FrameStatus, RenderSize, Renderer, SceneAssets};
use texel_render_vk::{DeviceConfig, RendererOptions, VkRenderer};
use tracing::{debug, info};

use texel_platform::winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

use config::{AppCfg, WindowCfg};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file; `texel.toml` in the working directory when omitted
    #[arg(long)]
    config: Option<PathBuf>,
    /// Wavefront OBJ model to draw instead of the built-in quad
    #[arg(long)]
    model: Option<PathBuf>,
    /// Image used as the model's texture instead of the checkerboard
    #[arg(long)]
    texture: Option<PathBuf>,
    /// Exit cleanly after this many presented frames
    #[arg(long)]
    frames: Option<u64>,
    /// Enable or disable the Vulkan validation layers
    #[arg(long)]
    validation: Option<bool>,
}

struct App {
    // Dropped before the window it draws into.
    renderer: Option<VkRenderer>,
    window: Option<Window>,
    window_cfg: WindowCfg,
    device_cfg: DeviceConfig,
    options: RendererOptions,
    scene: SceneAssets,
    render_size: RenderSize,

    frame_limit: Option<u64>,
    presented: u64,
    fatal: Option<anyhow::Error>,

    exiting: bool,
    frames: u32,
    last_fps_instant: Instant,

    paused: bool,
    occluded: bool,
}

impl App {
    fn create_renderer(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title(self.window_cfg.title.clone())
            .with_inner_size(LogicalSize::new(self.window_cfg.width, self.window_cfg.height));
        let window = event_loop.create_window(attrs).context("create_window")?;
        self.render_size = render_size(window.inner_size());

        let renderer = VkRenderer::new(
            &window,
            &window,
            self.render_size,
            &self.scene,
            &self.device_cfg,
            self.options,
        )
        .context("vk init")?;
        info!(
            "renderer ready: {}x{}, validation={}",
            self.render_size.width, self.render_size.height, self.device_cfg.validation
        );

        self.window = Some(window);
        self.renderer = Some(renderer);
        Ok(())
    }

    /// Records the first fatal error and shuts the loop down.
    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        if self.fatal.is_none() {
            self.fatal = Some(err);
        }
        self.shutdown(event_loop);
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.exiting = true;
        self.renderer = None;
        self.window = None;
        event_loop.exit();
    }

    fn update_paused(&mut self, why: &str) {
        let now_paused = should_pause(self.render_size, self.occluded);
        if self.paused != now_paused {
            self.paused = now_paused;
            info!("{why} → paused={}", self.paused);
        } else {
            debug!("{why} (paused unchanged={})", self.paused);
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(renderer) = &mut self.renderer else {
            return;
        };
        match renderer.render() {
            Ok(FrameStatus::Presented { .. }) => {
                self.frames = self.frames.saturating_add(1);
                self.presented += 1;
                if self.frame_limit.is_some_and(|n| self.presented >= n) {
                    let stats = renderer.stats();
                    info!(
                        "frame limit reached: presented={} dropped={} skipped={} rebuilds={}",
                        stats.frames_presented,
                        stats.frames_dropped,
                        stats.frames_skipped,
                        stats.rebuilds
                    );
                    self.shutdown(event_loop);
                }
            }
            Ok(status) => debug!("frame not presented: {status:?}"),
            Err(e) => self.fail(event_loop, e.context("render")),
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_none() && !self.exiting {
            if let Err(e) = self.create_renderer(event_loop) {
                self.fail(event_loop, e);
                return;
            }
        }

        event_loop.set_control_flow(ControlFlow::Wait);
        self.update_paused("resumed");

        if !self.paused {
            if let Some(w) = &self.window {
                w.request_redraw();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.shutdown(event_loop);
            }

            WindowEvent::Resized(new_size) => {
                self.render_size = render_size(new_size);
                if let Some(renderer) = &mut self.renderer {
                    renderer.resize(self.render_size);
                }
                self.update_paused(&format!(
                    "Resized → {}x{}",
                    self.render_size.width, self.render_size.height
                ));
                if !self.paused {
                    if let Some(w) = &self.window {
                        w.request_redraw();
                    }
                }
            }

            WindowEvent::Occluded(occluded) => {
                self.occluded = occluded;
                self.update_paused(&format!("Occluded={occluded}"));
            }

            WindowEvent::RedrawRequested => {
                if self.exiting || self.paused {
                    return;
                }
                self.redraw(event_loop);
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }

        if self.paused {
            // zero-sized or occluded: sleep until the next window event
            event_loop.set_control_flow(ControlFlow::Wait);
            self.frames = 0;
            return;
        }

        event_loop.set_control_flow(ControlFlow::Wait);
        if let Some(w) = &self.window {
            w.request_redraw();
        }

        let now = Instant::now();
        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            info!("fps ~ {}", self.frames);
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }
}

fn run(args: Args) -> Result<()> {
    let cfg = AppCfg::load(args.config.as_deref())?;

    let validation = args
        .validation
        .or(cfg.render.validation)
        .unwrap_or(cfg!(debug_assertions));
    let device_cfg = DeviceConfig::default().with_validation(validation);

    let scene = assets::load_scene(
        args.model.as_deref().or(cfg.assets.model.as_deref()),
        args.texture.as_deref().or(cfg.assets.texture.as_deref()),
    )?;

    let event_loop: EventLoop<()> = EventLoop::new().context("EventLoop::new")?;
    let mut app = App {
        renderer: None,
        window: None,
        window_cfg: cfg.window.clone(),
        device_cfg,
        options: cfg.renderer_options(),
        scene,
        render_size: RenderSize::new(1, 1),
        frame_limit: args.frames,
        presented: 0,
        fatal: None,
        exiting: false,
        frames: 0,
        last_fps_instant: Instant::now(),
        paused: false,
        occluded: false,
    };

    event_loop.run_app(&mut app).context("run_app")?;
    // renderer and window are already gone; only the error remains
    match app.fatal.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    if let Err(err) = run(args) {
        report_fatal(&err);
        std::process::exit(1);
    }
    Ok(())
}
