//! Swapchain lifecycle management.
//!
//! A [`SwapchainManager`] owns one *generation* at a time: the swapchain, a
//! view per presentable image, the render pass and a framebuffer per image.
//! Generations are built and torn down as a unit. The manager never retries
//! on its own; the caller decides when to rebuild.

use tracing::{debug, info};

use crate::backend::{GraphicsBackend, SwapchainRequest};
use crate::error::{FrameError, Result};
use crate::types::{Extent2D, PresentMode};

/// A swapchain image together with its color view.
pub struct PresentableImage<B: GraphicsBackend> {
    pub format: B::Format,
    pub image: B::Image,
    pub view: B::ImageView,
}

struct Generation<B: GraphicsBackend> {
    swapchain: B::Swapchain,
    format: B::Format,
    extent: Extent2D,
    present_mode: PresentMode,
    images: Vec<PresentableImage<B>>,
    render_pass: B::RenderPass,
    framebuffers: Vec<B::Framebuffer>,
}

/// Owns the presentable images and the render targets built on them.
pub struct SwapchainManager<B: GraphicsBackend> {
    current: Option<Generation<B>>,
    builds: u64,
}

impl<B: GraphicsBackend> Default for SwapchainManager<B> {
    fn default() -> Self {
        Self {
            current: None,
            builds: 0,
        }
    }
}

impl<B: GraphicsBackend> SwapchainManager<B> {
    /// Create an empty manager. Call [`build`](Self::build) before rendering.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a new generation for `surface`.
    ///
    /// Fails with [`FrameError::BackendUnavailable`] when the backend cannot
    /// produce a compatible swapchain. Anything created before the failure is
    /// released again. Building over a live generation is an
    /// [`FrameError::InvalidState`]; call [`teardown`](Self::teardown) first.
    pub fn build(
        &mut self,
        backend: &B,
        surface: &B::Surface,
        desired: Extent2D,
        vsync: bool,
    ) -> Result<()> {
        if self.current.is_some() {
            return Err(FrameError::InvalidState(
                "swapchain is already built; tear it down before rebuilding".to_string(),
            ));
        }

        let request = SwapchainRequest {
            extent: desired,
            present_mode: PresentMode::from_vsync(vsync),
        };
        let info = backend
            .create_swapchain(surface, &request)
            .map_err(FrameError::into_unavailable)?;

        if info.images.is_empty() {
            backend.destroy_swapchain(info.swapchain);
            return Err(FrameError::BackendUnavailable(
                "swapchain reported no presentable images".to_string(),
            ));
        }

        let mut images = Vec::with_capacity(info.images.len());
        for &image in &info.images {
            match backend.create_image_view(image, info.format) {
                Ok(view) => images.push(PresentableImage {
                    format: info.format,
                    image,
                    view,
                }),
                Err(e) => {
                    release_images(backend, &images);
                    backend.destroy_swapchain(info.swapchain);
                    return Err(e.into_unavailable());
                }
            }
        }

        let target = match backend.build_render_target(&images, info.extent) {
            Ok(target) => target,
            Err(e) => {
                release_images(backend, &images);
                backend.destroy_swapchain(info.swapchain);
                return Err(e.into_unavailable());
            }
        };

        if target.framebuffers.len() != images.len() {
            for &framebuffer in target.framebuffers.iter().rev() {
                backend.destroy_framebuffer(framebuffer);
            }
            backend.destroy_render_pass(target.render_pass);
            release_images(backend, &images);
            backend.destroy_swapchain(info.swapchain);
            return Err(FrameError::BackendUnavailable(format!(
                "render target has {} framebuffers for {} images",
                target.framebuffers.len(),
                images.len()
            )));
        }

        self.builds += 1;
        info!(
            "Swapchain built: {}x{} ({} images, {:?}, generation {})",
            info.extent.width,
            info.extent.height,
            images.len(),
            request.present_mode,
            self.builds
        );

        self.current = Some(Generation {
            swapchain: info.swapchain,
            format: info.format,
            extent: info.extent,
            present_mode: request.present_mode,
            images,
            render_pass: target.render_pass,
            framebuffers: target.framebuffers,
        });

        Ok(())
    }

    /// Release the current generation in reverse creation order.
    ///
    /// Does nothing when no generation is built. The caller must ensure no
    /// in-flight submission references any of the images.
    pub fn teardown(&mut self, backend: &B) {
        let Some(generation) = self.current.take() else {
            return;
        };

        for &framebuffer in generation.framebuffers.iter().rev() {
            backend.destroy_framebuffer(framebuffer);
        }
        backend.destroy_render_pass(generation.render_pass);
        release_images(backend, &generation.images);
        backend.destroy_swapchain(generation.swapchain);

        debug!(
            "Swapchain generation {} torn down ({} images)",
            self.builds,
            generation.images.len()
        );
    }

    /// Tear down the current generation and build a new one.
    pub fn rebuild(
        &mut self,
        backend: &B,
        surface: &B::Surface,
        desired: Extent2D,
        vsync: bool,
    ) -> Result<()> {
        self.teardown(backend);
        self.build(backend, surface, desired, vsync)
    }

    /// Returns true if a generation is alive.
    pub fn is_built(&self) -> bool {
        self.current.is_some()
    }

    /// Identifier of the live generation, increasing with every build.
    pub fn generation(&self) -> Option<u64> {
        self.current.as_ref().map(|_| self.builds)
    }

    /// Number of presentable images, or 0 when not built.
    pub fn image_count(&self) -> usize {
        self.current.as_ref().map_or(0, |g| g.images.len())
    }

    pub fn format(&self) -> Option<B::Format> {
        self.current.as_ref().map(|g| g.format)
    }

    pub fn extent(&self) -> Option<Extent2D> {
        self.current.as_ref().map(|g| g.extent)
    }

    pub fn present_mode(&self) -> Option<PresentMode> {
        self.current.as_ref().map(|g| g.present_mode)
    }

    pub fn swapchain(&self) -> Option<B::Swapchain> {
        self.current.as_ref().map(|g| g.swapchain)
    }

    pub fn render_pass(&self) -> Option<B::RenderPass> {
        self.current.as_ref().map(|g| g.render_pass)
    }

    /// Presentable images of the live generation.
    pub fn images(&self) -> &[PresentableImage<B>] {
        self.current.as_ref().map_or(&[], |g| g.images.as_slice())
    }

    /// Framebuffer for a swapchain image index.
    pub fn framebuffer(&self, image_index: u32) -> Option<B::Framebuffer> {
        self.current
            .as_ref()
            .and_then(|g| g.framebuffers.get(image_index as usize).copied())
    }
}

fn release_images<B: GraphicsBackend>(backend: &B, images: &[PresentableImage<B>]) {
    for image in images.iter().rev() {
        backend.destroy_image_view(image.view);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Call, MockBackend, MockFormat, ResourceKind};

    const SIZE: Extent2D = Extent2D::new(1280, 720);

    #[test]
    fn build_creates_view_and_framebuffer_per_image() {
        let backend = MockBackend::new(3);
        let mut manager = SwapchainManager::new();
        manager.build(&backend, &0, SIZE, true).unwrap();

        assert!(manager.is_built());
        assert_eq!(manager.image_count(), 3);
        assert_eq!(manager.extent(), Some(SIZE));
        assert_eq!(manager.present_mode(), Some(PresentMode::Vsync));
        assert_eq!(backend.live(ResourceKind::ImageView), 3);
        assert_eq!(backend.live(ResourceKind::Framebuffer), 3);
        assert_eq!(backend.live(ResourceKind::RenderPass), 1);
        assert!(manager.framebuffer(2).is_some());
        assert!(manager.framebuffer(3).is_none());
    }

    #[test]
    fn image_count_follows_backend() {
        for count in [1, 2, 3, 4] {
            let backend = MockBackend::new(count);
            let mut manager = SwapchainManager::new();
            manager.build(&backend, &0, SIZE, false).unwrap();
            assert_eq!(manager.image_count(), count as usize);
            assert_eq!(manager.present_mode(), Some(PresentMode::LowLatency));
        }
    }

    #[test]
    fn build_then_teardown_leaks_nothing() {
        let backend = MockBackend::new(3);
        let mut manager = SwapchainManager::new();
        manager.build(&backend, &0, SIZE, true).unwrap();
        manager.teardown(&backend);

        assert!(!manager.is_built());
        assert_eq!(manager.image_count(), 0);
        assert_eq!(backend.live_total(), 0);
        assert!(backend.violations().is_empty());
    }

    #[test]
    fn teardown_runs_in_reverse_creation_order() {
        let backend = MockBackend::new(2);
        let mut manager = SwapchainManager::new();
        manager.build(&backend, &0, SIZE, true).unwrap();
        let views: Vec<u64> = manager.images().iter().map(|i| i.view).collect();
        backend.clear_calls();

        manager.teardown(&backend);

        let calls = backend.calls();
        let framebuffers_first = matches!(calls[0], Call::DestroyFramebuffer(_))
            && matches!(calls[1], Call::DestroyFramebuffer(_));
        assert!(framebuffers_first, "{calls:?}");
        assert!(matches!(calls[2], Call::DestroyRenderPass(_)));
        assert_eq!(calls[3], Call::DestroyImageView(views[1]));
        assert_eq!(calls[4], Call::DestroyImageView(views[0]));
        assert!(matches!(calls[5], Call::DestroySwapchain(_)));
        assert_eq!(calls.len(), 6);
    }

    #[test]
    fn teardown_without_build_is_noop() {
        let backend = MockBackend::new(2);
        let mut manager: SwapchainManager<MockBackend> = SwapchainManager::new();
        manager.teardown(&backend);
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn building_twice_requires_teardown() {
        let backend = MockBackend::new(2);
        let mut manager = SwapchainManager::new();
        manager.build(&backend, &0, SIZE, true).unwrap();
        let err = manager.build(&backend, &0, SIZE, true).unwrap_err();
        assert!(matches!(err, FrameError::InvalidState(_)));
        assert_eq!(backend.live(ResourceKind::Swapchain), 1);
    }

    #[test]
    fn rebuild_at_same_size_is_stable() {
        let backend = MockBackend::new(3);
        let mut manager = SwapchainManager::new();
        manager.build(&backend, &0, SIZE, true).unwrap();
        let first_count = manager.image_count();
        let first_format = manager.format();
        let first_generation = manager.generation().unwrap();

        for _ in 0..4 {
            manager.rebuild(&backend, &0, SIZE, true).unwrap();
            assert_eq!(manager.image_count(), first_count);
            assert_eq!(manager.format(), first_format);
        }

        assert_eq!(manager.generation(), Some(first_generation + 4));
        assert_eq!(backend.live(ResourceKind::ImageView), 3);
        assert_eq!(backend.live(ResourceKind::Swapchain), 1);
    }

    #[test]
    fn rebuild_picks_up_new_surface_format() {
        let backend = MockBackend::new(2);
        let mut manager = SwapchainManager::new();
        manager.build(&backend, &0, SIZE, true).unwrap();
        assert_eq!(manager.format(), Some(MockFormat::Bgra8Srgb));

        backend.set_format(MockFormat::Rgba8Unorm);
        manager.rebuild(&backend, &0, SIZE, true).unwrap();
        assert_eq!(manager.format(), Some(MockFormat::Rgba8Unorm));
        assert!(manager
            .images()
            .iter()
            .all(|image| image.format == MockFormat::Rgba8Unorm));
    }

    #[test]
    fn lost_surface_reports_unavailable() {
        let backend = MockBackend::new(3);
        backend.set_surface_lost(true);
        let mut manager = SwapchainManager::new();

        let err = manager.build(&backend, &0, SIZE, true).unwrap_err();
        assert!(matches!(err, FrameError::BackendUnavailable(_)));
        assert!(!manager.is_built());
        assert_eq!(backend.live_total(), 0);

        backend.set_surface_lost(false);
        manager.build(&backend, &0, SIZE, true).unwrap();
        assert!(manager.is_built());
    }

    #[test]
    fn failed_view_creation_releases_partial_generation() {
        let backend = MockBackend::new(3);
        backend.fail_image_view_at(2);
        let mut manager = SwapchainManager::new();

        let err = manager.build(&backend, &0, SIZE, true).unwrap_err();
        assert!(matches!(err, FrameError::BackendUnavailable(_)));
        assert_eq!(backend.live_total(), 0);
        assert!(backend.violations().is_empty());
    }

    #[test]
    fn failed_render_target_releases_views() {
        let backend = MockBackend::new(3);
        backend.set_render_target_failure(true);
        let mut manager = SwapchainManager::new();

        assert!(manager.build(&backend, &0, SIZE, true).is_err());
        assert_eq!(backend.live_total(), 0);
    }
}
