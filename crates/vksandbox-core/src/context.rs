//! The render context owning backend, swapchain and scheduler.

use std::fmt;

use tracing::{debug, error, info};

use crate::backend::GraphicsBackend;
use crate::error::{FrameError, Result};
use crate::scheduler::{
    AcquireResult, ActiveFrame, FrameConfig, FrameScheduler, PresentOutcome,
};
use crate::swapchain::SwapchainManager;
use crate::types::Extent2D;

/// Ties a backend and surface to a swapchain and a frame scheduler.
///
/// Recreation signals from acquire or present are remembered and acted on
/// at the start of the next [`begin_frame`](Self::begin_frame), after every
/// in-flight frame has completed.
pub struct RenderContext<B: GraphicsBackend> {
    backend: B,
    surface: B::Surface,
    swapchain: SwapchainManager<B>,
    scheduler: FrameScheduler<B>,
    vsync: bool,
    built_for: Extent2D,
    recreate_requested: bool,
}

/// A failed [`RenderContext::new`].
///
/// Everything the context created has been released; the backend and
/// surface are handed back so the caller can destroy the surface.
pub struct CreateError<B: GraphicsBackend> {
    pub error: FrameError,
    pub backend: B,
    pub surface: B::Surface,
}

impl<B: GraphicsBackend> fmt::Debug for CreateError<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateError")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<B: GraphicsBackend> fmt::Display for CreateError<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl<B: GraphicsBackend> From<CreateError<B>> for FrameError {
    fn from(failed: CreateError<B>) -> Self {
        failed.error
    }
}

impl<B: GraphicsBackend> RenderContext<B> {
    /// Create the frame slots and, unless `size` is empty, the first
    /// swapchain generation.
    pub fn new(
        backend: B,
        surface: B::Surface,
        size: Extent2D,
        vsync: bool,
        config: FrameConfig,
    ) -> std::result::Result<Self, CreateError<B>> {
        let scheduler = match FrameScheduler::new(&backend, config) {
            Ok(scheduler) => scheduler,
            Err(error) => {
                return Err(CreateError {
                    error,
                    backend,
                    surface,
                })
            }
        };
        let mut swapchain = SwapchainManager::new();

        if !size.is_empty() {
            if let Err(error) = swapchain.build(&backend, &surface, size, vsync) {
                scheduler.destroy(&backend);
                return Err(CreateError {
                    error,
                    backend,
                    surface,
                });
            }
        }

        info!(
            "Render context created ({}x{}, vsync: {vsync})",
            size.width, size.height
        );

        Ok(Self {
            backend,
            surface,
            swapchain,
            scheduler,
            vsync,
            built_for: size,
            recreate_requested: size.is_empty(),
        })
    }

    /// Start a frame for a window of `size`.
    ///
    /// Returns `false` when nothing should be drawn this tick: the window is
    /// minimized or the surface turned out to be outdated. In the latter case
    /// the swapchain is rebuilt on the next call.
    ///
    /// Fails with [`FrameError::InvalidState`] while a frame is open or the
    /// scheduler is faulted; the swapchain is never rebuilt under an open
    /// frame.
    pub fn begin_frame(&mut self, size: Extent2D) -> Result<bool> {
        self.scheduler.ensure_idle()?;
        if size.is_empty() {
            return Ok(false);
        }

        if self.recreate_requested || !self.swapchain.is_built() || size != self.built_for {
            self.recreate(size)?;
        }

        let target = self.swapchain.extent().unwrap_or(size);
        match self
            .scheduler
            .begin_frame(&self.backend, &self.swapchain, target)?
        {
            AcquireResult::Ready(_) => Ok(true),
            AcquireResult::NeedsRecreate => {
                self.recreate_requested = true;
                Ok(false)
            }
        }
    }

    /// Submit and present the open frame.
    pub fn end_frame(&mut self) -> Result<()> {
        match self.scheduler.end_frame(&self.backend, &self.swapchain)? {
            PresentOutcome::Presented => {}
            PresentOutcome::NeedsRecreate => self.recreate_requested = true,
        }
        Ok(())
    }

    /// Handles of the frame between [`begin_frame`](Self::begin_frame) and
    /// [`end_frame`](Self::end_frame).
    pub fn active_frame(&self) -> Option<ActiveFrame<B>> {
        self.scheduler.active_frame()
    }

    /// Ask for a rebuild at the start of the next frame.
    ///
    /// The size passed to the next `begin_frame` is the one that is built.
    pub fn request_recreate(&mut self, size: Extent2D) {
        debug!(
            "Swapchain recreation requested ({}x{})",
            size.width, size.height
        );
        self.recreate_requested = true;
    }

    /// Recover from a submission failure. The swapchain is rebuilt on the
    /// next frame.
    pub fn resynchronize(&mut self) -> Result<()> {
        self.scheduler.resynchronize(&self.backend)?;
        self.recreate_requested = true;
        Ok(())
    }

    /// Release every resource and hand back the backend and surface.
    pub fn destroy(mut self) -> (B, B::Surface) {
        if let Err(e) = self.backend.wait_idle() {
            error!("Failed to wait for device idle during shutdown: {e}");
        }
        self.scheduler.destroy(&self.backend);
        self.swapchain.teardown(&self.backend);
        info!("Render context destroyed");
        (self.backend, self.surface)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn swapchain(&self) -> &SwapchainManager<B> {
        &self.swapchain
    }

    pub fn scheduler(&self) -> &FrameScheduler<B> {
        &self.scheduler
    }

    /// Extent of the live swapchain.
    pub fn extent(&self) -> Option<Extent2D> {
        self.swapchain.extent()
    }

    pub fn frame_number(&self) -> u64 {
        self.scheduler.frame_number()
    }

    pub fn recreate_pending(&self) -> bool {
        self.recreate_requested
    }

    fn recreate(&mut self, size: Extent2D) -> Result<()> {
        self.scheduler.wait_all_in_flight(&self.backend)?;
        self.swapchain
            .rebuild(&self.backend, &self.surface, size, self.vsync)?;
        self.built_for = size;
        self.recreate_requested = false;
        debug!("Swapchain recreated for {}x{}", size.width, size.height);
        Ok(())
    }
}
