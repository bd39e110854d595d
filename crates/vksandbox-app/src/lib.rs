//! Windowed frame loop for the vksandbox renderer.
//!
//! This crate wires a winit window to a Vulkan [`RenderContext`] and takes
//! care of:
//! - Window creation and the event loop
//! - GPU context initialization
//! - Swapchain creation and recreation on resize
//! - Frame pacing and recovery from failed submissions
//!
//! The caller supplies a [`DrawHook`] that records commands for each frame.
//!
//! # Example
//!
//! ```no_run
//! use vksandbox_app::{run_app, AppConfig, FrameContext};
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app(
//!         AppConfig::new("My Sandbox"),
//!         |frame: &FrameContext| -> anyhow::Result<()> {
//!             // Record draw calls into frame.command_buffer
//!             let _ = frame.extent;
//!             Ok(())
//!         },
//!     )
//! }
//! ```
//!
//! [`RenderContext`]: vksandbox_core::RenderContext

mod app;
mod context;
mod frame;
mod runner;

pub use app::DrawHook;
pub use context::AppContext;
pub use frame::FrameContext;
pub use runner::{run_app, AppConfig};

// Re-export commonly used types for convenience
pub use vksandbox_core::{ClearColor, Extent2D};
pub use vksandbox_gpu::{ash, GpuContext};
