//! Vulkan backend for the vksandbox renderer.
//!
//! This crate provides:
//! - Vulkan instance and device management, with validation routed to `tracing`
//! - GPU capability detection
//! - Memory allocation via gpu-allocator
//! - Surface, swapchain, render pass and command buffer helpers
//! - [`VulkanBackend`], the [`vksandbox_core::GraphicsBackend`] implementation

pub mod backend;
pub mod capabilities;
pub mod command;
pub mod context;
pub mod debug;
pub mod error;
pub mod instance;
pub mod memory;
pub mod render_target;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use ash;
pub use backend::VulkanBackend;
pub use capabilities::{GpuCapabilities, GpuVendor};
pub use context::{GpuContext, GpuContextBuilder};
pub use error::{GpuError, Result};
pub use memory::GpuAllocator;
pub use surface::{SurfaceCapabilities, SurfaceContext};
