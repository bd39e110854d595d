//! Application runner and event loop.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use vksandbox_core::{ClearColor, Extent2D, FrameConfig, FrameError};
use vksandbox_gpu::GpuContextBuilder;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::app::DrawHook;
use crate::context::AppContext;
use crate::frame::FrameContext;

/// Application configuration.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Window title.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Start the window maximized.
    pub maximized: bool,
    /// Enable vsync.
    pub vsync: bool,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
    /// Color the frame is cleared to before drawing.
    pub clear_color: ClearColor,
    /// Flip the viewport so Y points up.
    pub flip_viewport_y: bool,
    /// Fence wait timeout in nanoseconds (`u64::MAX` waits forever).
    pub fence_timeout_ns: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "vksandbox".to_string(),
            width: 1280,
            height: 720,
            maximized: true,
            vsync: true,
            validation: cfg!(debug_assertions),
            clear_color: ClearColor::BLACK,
            flip_viewport_y: true,
            fence_timeout_ns: u64::MAX,
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions used when not maximized.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_maximized(mut self, maximized: bool) -> Self {
        self.maximized = maximized;
        self
    }

    /// Enable or disable vsync.
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_clear_color(mut self, clear_color: ClearColor) -> Self {
        self.clear_color = clear_color;
        self
    }

    pub fn with_flip_viewport_y(mut self, flip: bool) -> Self {
        self.flip_viewport_y = flip;
        self
    }

    pub fn with_fence_timeout_ns(mut self, timeout_ns: u64) -> Self {
        self.fence_timeout_ns = timeout_ns;
        self
    }

    /// Scheduler configuration derived from this config.
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig::default()
            .with_clear_color(self.clear_color)
            .with_flip_viewport_y(self.flip_viewport_y)
            .with_fence_timeout_ns(self.fence_timeout_ns)
    }
}

/// Run the frame loop with `hook` drawing every frame.
///
/// This function initializes logging, creates the window and GPU context,
/// and runs the event loop until the window is closed or a frame fails.
pub fn run_app<H: DrawHook + 'static>(config: AppConfig, hook: H) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("{} starting...", config.title);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner {
        config,
        hook,
        state: None,
        failure: None,
    };

    event_loop.run_app(&mut runner)?;

    match runner.failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Internal application runner that implements winit's ApplicationHandler.
struct AppRunner<H: DrawHook> {
    config: AppConfig,
    hook: H,
    state: Option<AppState>,
    failure: Option<anyhow::Error>,
}

/// Internal application state.
struct AppState {
    ctx: AppContext,
    last_frame_time: Instant,
    // FPS tracking
    min_fps: f64,
    max_fps: f64,
    fps_sum: f64,
    fps_samples: u64,
    resynchronizations: u32,
}

impl<H: DrawHook> ApplicationHandler for AppRunner<H> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        info!("Creating application state...");

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Application ready!");
            }
            Err(e) => {
                error!("Failed to initialize application: {e:#}");
                self.failure = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                self.shutdown(event_loop);
            }
            WindowEvent::RedrawRequested => {
                let Some(state) = &mut self.state else {
                    return;
                };
                match state.render_frame(&mut self.hook) {
                    Ok(()) => state.ctx.window.request_redraw(),
                    Err(e) => {
                        if let Err(fatal) = state.recover(e) {
                            error!("Render error: {fatal:#}");
                            self.failure = Some(fatal);
                            self.shutdown(event_loop);
                        }
                    }
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    state
                        .ctx
                        .render
                        .request_recreate(Extent2D::new(size.width, size.height));
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.ctx.window.request_redraw();
        }
    }
}

impl<H: DrawHook> AppRunner<H> {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState> {
        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height))
            .with_maximized(self.config.maximized);

        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let gpu = GpuContextBuilder::new()
            .app_name(&self.config.title)
            .validation(self.config.validation)
            .build()?;

        // SAFETY: The window is kept alive by the context that owns the surface
        let ctx = unsafe {
            AppContext::new(
                window,
                Arc::new(gpu),
                self.config.vsync,
                self.config.frame_config(),
            )?
        };

        Ok(AppState {
            ctx,
            last_frame_time: Instant::now(),
            min_fps: f64::MAX,
            max_fps: 0.0,
            fps_sum: 0.0,
            fps_samples: 0,
            resynchronizations: 0,
        })
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(state) = self.state.take() {
            state.cleanup();
        }
        event_loop.exit();
    }
}

impl AppState {
    fn render_frame<H: DrawHook>(&mut self, hook: &mut H) -> anyhow::Result<()> {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;

        let size = self.ctx.window_extent();
        if !self.ctx.render.begin_frame(size)? {
            return Ok(());
        }

        let Some(active) = self.ctx.render.active_frame() else {
            return Err(FrameError::InvalidState("no open frame after begin_frame".to_string()).into());
        };

        let frame = FrameContext::new(
            self.ctx.gpu.clone(),
            active.command_buffer,
            active.image_index,
            active.extent,
            active.frame_number,
            dt,
        );
        let drawn = hook.draw(&frame);

        // The scope is closed and submitted even if drawing failed, so the
        // slot's fence is signaled again before shutdown waits on it.
        self.ctx.render.end_frame()?;
        drawn?;

        if dt > 0.0 {
            let fps = 1.0 / f64::from(dt);
            self.min_fps = self.min_fps.min(fps);
            self.max_fps = self.max_fps.max(fps);
            self.fps_sum += fps;
            self.fps_samples += 1;
        }

        Ok(())
    }

    /// Resynchronize after a submission failure; any other error is fatal.
    fn recover(&mut self, err: anyhow::Error) -> anyhow::Result<()> {
        let submission_failed = err
            .downcast_ref::<FrameError>()
            .is_some_and(FrameError::is_submission_failure);
        if !submission_failed {
            return Err(err);
        }

        warn!("Frame submission failed, resynchronizing: {err}");
        self.ctx.render.resynchronize()?;
        self.resynchronizations += 1;
        self.ctx.window.request_redraw();
        Ok(())
    }

    fn cleanup(self) {
        let frames = self.ctx.render.frame_number();
        if self.fps_samples > 0 {
            let avg_fps = self.fps_sum / self.fps_samples as f64;
            info!("FPS Statistics:");
            info!("  Min: {:.1}", self.min_fps);
            info!("  Max: {:.1}", self.max_fps);
            info!("  Avg: {:.1}", avg_fps);
        }
        info!("  Total frames: {frames}");
        if self.resynchronizations > 0 {
            warn!("  Resynchronizations: {}", self.resynchronizations);
        }

        info!("Starting cleanup...");
        self.ctx.destroy();
        info!("Cleanup complete");
    }
}
