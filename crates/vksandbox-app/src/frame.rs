//! Per-frame context for drawing.

use std::sync::Arc;

use ash::vk;
use vksandbox_core::Extent2D;
use vksandbox_gpu::GpuContext;

/// Context for the frame being recorded.
pub struct FrameContext {
    /// Command buffer with the render pass already begun.
    pub command_buffer: vk::CommandBuffer,
    /// Index of the acquired swapchain image.
    pub image_index: u32,
    /// Size of the render area.
    pub extent: Extent2D,
    /// Number of frames completed before this one.
    pub frame_number: u64,
    /// Delta time since last frame in seconds.
    pub dt: f32,
    gpu: Arc<GpuContext>,
}

impl FrameContext {
    pub(crate) fn new(
        gpu: Arc<GpuContext>,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
        extent: Extent2D,
        frame_number: u64,
        dt: f32,
    ) -> Self {
        Self {
            command_buffer,
            image_index,
            extent,
            frame_number,
            dt,
            gpu,
        }
    }

    /// The GPU context, for device calls and allocations.
    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    pub fn device(&self) -> &ash::Device {
        self.gpu.device()
    }
}
