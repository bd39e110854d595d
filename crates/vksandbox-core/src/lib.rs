//! Frame scheduling and swapchain lifecycle for the vksandbox renderer.
//!
//! This crate holds the backend-agnostic half of the renderer:
//! - [`SwapchainManager`]: presentable images, views, render pass and framebuffers
//! - [`FrameScheduler`]: per-slot fences and semaphores, acquire/submit/present
//! - [`RenderContext`]: owns both and turns recreation signals into rebuilds
//!
//! Graphics API calls go through the [`GraphicsBackend`] trait.

pub mod backend;
pub mod context;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod scheduler;
pub mod swapchain;
pub mod types;

pub use backend::{
    AcquireStatus, GraphicsBackend, PresentStatus, RecordingScope, RenderTarget, Submission,
    SwapchainInfo, SwapchainRequest,
};
pub use context::{CreateError, RenderContext};
pub use error::{FrameError, Result};
pub use scheduler::{
    AcquireResult, ActiveFrame, FrameConfig, FrameCursor, FramePhase, FrameScheduler, FrameSlot,
    PresentOutcome, MAX_FRAMES_IN_FLIGHT,
};
pub use swapchain::{PresentableImage, SwapchainManager};
pub use types::{ClearColor, Extent2D, PresentMode, ScissorRect, Viewport};
