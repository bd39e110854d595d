//! Application context.

use std::sync::Arc;

use vksandbox_core::{Extent2D, FrameConfig, RenderContext};
use vksandbox_gpu::{GpuContext, SurfaceContext, VulkanBackend};
use winit::window::Window;

/// Window, GPU and the render context presenting to the window.
pub struct AppContext {
    /// The window handle.
    pub window: Arc<Window>,
    /// GPU context with device and queues.
    pub gpu: Arc<GpuContext>,
    /// Swapchain and frame scheduling for the window's surface.
    pub render: RenderContext<VulkanBackend>,
}

impl AppContext {
    /// Create the surface, backend and render context for `window`.
    ///
    /// # Safety
    /// The window must have valid handles and outlive the context.
    pub(crate) unsafe fn new(
        window: Arc<Window>,
        gpu: Arc<GpuContext>,
        vsync: bool,
        frame_config: FrameConfig,
    ) -> anyhow::Result<Self> {
        // SAFETY: Caller guarantees window has valid handles
        let surface = unsafe { SurfaceContext::from_window(&gpu, window.as_ref())? };

        let backend = match VulkanBackend::new(gpu.clone(), &surface) {
            Ok(backend) => backend,
            Err(e) => {
                // SAFETY: Nothing references the surface yet
                unsafe { surface.destroy() };
                return Err(e.into());
            }
        };

        let size = window_extent(&window);
        let render = match RenderContext::new(backend, surface, size, vsync, frame_config) {
            Ok(render) => render,
            Err(failed) => {
                drop(failed.backend);
                // SAFETY: The render context released its swapchain before failing
                unsafe { failed.surface.destroy() };
                return Err(failed.error.into());
            }
        };

        Ok(Self {
            window,
            gpu,
            render,
        })
    }

    /// Current inner size of the window.
    pub fn window_extent(&self) -> Extent2D {
        window_extent(&self.window)
    }

    /// Tear down the render context, backend and surface.
    pub(crate) fn destroy(self) {
        let Self {
            window,
            gpu,
            render,
        } = self;

        let (backend, surface) = render.destroy();
        drop(backend);
        // SAFETY: The swapchain was torn down with the render context
        unsafe { surface.destroy() };

        drop(gpu);
        drop(window);
    }
}

fn window_extent(window: &Window) -> Extent2D {
    let size = window.inner_size();
    Extent2D::new(size.width, size.height)
}
