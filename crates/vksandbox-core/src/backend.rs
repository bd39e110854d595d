//! The graphics backend seam.
//!
//! The swapchain manager and frame scheduler never talk to a graphics API
//! directly. They drive a [`GraphicsBackend`], which owns the device, queues
//! and surface and hands out small copyable handles. `vksandbox-gpu`
//! implements it over Vulkan; tests use [`MockBackend`](crate::mock::MockBackend).

use std::fmt::Debug;

use crate::error::Result;
use crate::swapchain::PresentableImage;
use crate::types::{ClearColor, Extent2D, PresentMode, ScissorRect, Viewport};

/// Parameters for a swapchain request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainRequest {
    /// Desired image size; the backend may clamp it to surface limits.
    pub extent: Extent2D,
    /// Presentation preference.
    pub present_mode: PresentMode,
}

/// A freshly created swapchain as reported by the backend.
pub struct SwapchainInfo<B: GraphicsBackend> {
    /// Swapchain handle.
    pub swapchain: B::Swapchain,
    /// Format shared by every image.
    pub format: B::Format,
    /// Actual image size.
    pub extent: Extent2D,
    /// Presentable images, in swapchain index order.
    pub images: Vec<B::Image>,
}

/// Render pass and one framebuffer per presentable image.
pub struct RenderTarget<B: GraphicsBackend> {
    pub render_pass: B::RenderPass,
    pub framebuffers: Vec<B::Framebuffer>,
}

/// Everything a backend needs to open a frame's command recording.
pub struct RecordingScope<B: GraphicsBackend> {
    pub command_buffer: B::CommandBuffer,
    pub render_pass: B::RenderPass,
    pub framebuffer: B::Framebuffer,
    pub extent: Extent2D,
    pub clear_color: ClearColor,
    pub viewport: Viewport,
    pub scissor: ScissorRect,
}

/// A single graphics queue submission.
pub struct Submission<B: GraphicsBackend> {
    pub command_buffer: B::CommandBuffer,
    /// Waited on before color output.
    pub wait_semaphore: B::Semaphore,
    /// Signaled when the commands complete.
    pub signal_semaphore: B::Semaphore,
    /// Signaled when the commands complete; must be unsignaled at submit.
    pub fence: B::Fence,
}

/// Result of asking the backend for the next presentable image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireStatus {
    /// An image was acquired; its availability semaphore will be signaled.
    Acquired { index: u32, suboptimal: bool },
    /// The surface changed; no image was acquired and nothing was signaled.
    Outdated,
}

/// Result of presenting an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentStatus {
    /// Presented and the swapchain still matches the surface.
    Optimal,
    /// Presented, but the swapchain no longer matches the surface exactly.
    Suboptimal,
    /// The surface changed; the swapchain must be rebuilt.
    Outdated,
}

/// Operations the frame protocol consumes from a graphics API.
///
/// Handle types are plain copyable identifiers. Creation methods return
/// errors; destruction methods are infallible and must only be called on
/// handles that are no longer referenced by in-flight GPU work.
pub trait GraphicsBackend: Sized {
    type Surface;
    type Swapchain: Copy + Debug;
    type Image: Copy + Debug;
    type ImageView: Copy + Debug;
    type Format: Copy + PartialEq + Debug;
    type RenderPass: Copy + Debug;
    type Framebuffer: Copy + Debug;
    type Semaphore: Copy + PartialEq + Debug;
    type Fence: Copy + PartialEq + Debug;
    type CommandBuffer: Copy + Debug;

    /// Create a swapchain for `surface`.
    fn create_swapchain(
        &self,
        surface: &Self::Surface,
        request: &SwapchainRequest,
    ) -> Result<SwapchainInfo<Self>>;

    /// Destroy a swapchain. Its images are owned by the swapchain.
    fn destroy_swapchain(&self, swapchain: Self::Swapchain);

    /// Create a color view of a swapchain image.
    fn create_image_view(&self, image: Self::Image, format: Self::Format)
        -> Result<Self::ImageView>;

    fn destroy_image_view(&self, view: Self::ImageView);

    /// Create a render pass compatible with `images` and a framebuffer per image.
    fn build_render_target(
        &self,
        images: &[PresentableImage<Self>],
        extent: Extent2D,
    ) -> Result<RenderTarget<Self>>;

    fn destroy_framebuffer(&self, framebuffer: Self::Framebuffer);

    fn destroy_render_pass(&self, render_pass: Self::RenderPass);

    fn create_semaphore(&self) -> Result<Self::Semaphore>;

    fn destroy_semaphore(&self, semaphore: Self::Semaphore);

    /// Create a fence, optionally already signaled.
    fn create_fence(&self, signaled: bool) -> Result<Self::Fence>;

    fn destroy_fence(&self, fence: Self::Fence);

    /// Block until `fence` is signaled. `u64::MAX` waits indefinitely; a
    /// bounded wait that expires returns [`FrameError::WaitTimeout`](crate::FrameError::WaitTimeout).
    fn wait_for_fence(&self, fence: Self::Fence, timeout_ns: u64) -> Result<()>;

    /// Return a fence to the unsignaled state.
    fn reset_fence(&self, fence: Self::Fence) -> Result<()>;

    fn allocate_command_buffer(&self) -> Result<Self::CommandBuffer>;

    fn free_command_buffer(&self, command_buffer: Self::CommandBuffer);

    /// Reset and begin `scope.command_buffer`, begin the render pass on
    /// `scope.framebuffer` and set viewport and scissor.
    fn begin_recording(&self, scope: &RecordingScope<Self>) -> Result<()>;

    /// End the render pass and finish the command buffer.
    fn end_recording(&self, command_buffer: Self::CommandBuffer) -> Result<()>;

    /// Acquire the next presentable image, signaling `signal` when it is ready.
    fn acquire_image(
        &self,
        swapchain: Self::Swapchain,
        signal: Self::Semaphore,
        timeout_ns: u64,
    ) -> Result<AcquireStatus>;

    /// Submit recorded commands to the graphics queue.
    fn submit(&self, submission: &Submission<Self>) -> Result<()>;

    /// Queue `image_index` for presentation once `wait` is signaled.
    fn present(
        &self,
        swapchain: Self::Swapchain,
        wait: Self::Semaphore,
        image_index: u32,
    ) -> Result<PresentStatus>;

    /// Block until the device has finished all submitted work.
    fn wait_idle(&self) -> Result<()>;
}
