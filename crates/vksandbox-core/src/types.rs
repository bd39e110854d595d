//! Backend-agnostic value types shared by the swapchain and frame layers.

/// Two-dimensional size in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

impl Extent2D {
    /// Create a new extent.
    #[inline]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns true if either dimension is zero (e.g. a minimized window).
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// RGBA clear color applied when a frame's render pass begins.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClearColor(pub [f32; 4]);

impl ClearColor {
    /// Opaque black.
    pub const BLACK: Self = Self([0.0, 0.0, 0.0, 1.0]);

    /// Create a clear color from components.
    #[inline]
    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self([r, g, b, a])
    }
}

impl Default for ClearColor {
    fn default() -> Self {
        Self::BLACK
    }
}

/// Viewport transform for a recording scope.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Viewport covering the whole extent.
    ///
    /// With `flip_y` the origin moves to the bottom edge and the height is
    /// negated, so a Y-up clip space lands upright on a top-left-origin
    /// surface. Negative heights need Vulkan 1.1 or `VK_KHR_maintenance1`.
    pub fn full(extent: Extent2D, flip_y: bool) -> Self {
        let width = extent.width as f32;
        let height = extent.height as f32;
        if flip_y {
            Self {
                x: 0.0,
                y: height,
                width,
                height: -height,
                min_depth: 0.0,
                max_depth: 1.0,
            }
        } else {
            Self {
                x: 0.0,
                y: 0.0,
                width,
                height,
                min_depth: 0.0,
                max_depth: 1.0,
            }
        }
    }
}

/// Scissor rectangle for a recording scope.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScissorRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl ScissorRect {
    /// Scissor covering the whole extent.
    #[inline]
    pub const fn full(extent: Extent2D) -> Self {
        Self {
            x: 0,
            y: 0,
            width: extent.width,
            height: extent.height,
        }
    }
}

/// Presentation preference requested from the backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PresentMode {
    /// Block on vertical blank (FIFO).
    #[default]
    Vsync,
    /// Prefer the lowest latency mode the surface offers.
    LowLatency,
}

impl PresentMode {
    /// Map a vsync toggle to a present mode.
    #[inline]
    pub const fn from_vsync(vsync: bool) -> Self {
        if vsync {
            Self::Vsync
        } else {
            Self::LowLatency
        }
    }

    #[inline]
    pub const fn is_vsync(self) -> bool {
        matches!(self, Self::Vsync)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flipped_viewport_starts_at_bottom_edge() {
        let vp = Viewport::full(Extent2D::new(800, 600), true);
        assert_eq!(vp.y, 600.0);
        assert_eq!(vp.height, -600.0);
        assert_eq!(vp.width, 800.0);
    }

    #[test]
    fn unflipped_viewport_matches_extent() {
        let vp = Viewport::full(Extent2D::new(800, 600), false);
        assert_eq!(vp.y, 0.0);
        assert_eq!(vp.height, 600.0);
    }

    #[test]
    fn empty_extent_detection() {
        assert!(Extent2D::new(0, 720).is_empty());
        assert!(Extent2D::new(1280, 0).is_empty());
        assert!(!Extent2D::new(1, 1).is_empty());
    }

    #[test]
    fn present_mode_from_vsync() {
        assert_eq!(PresentMode::from_vsync(true), PresentMode::Vsync);
        assert_eq!(PresentMode::from_vsync(false), PresentMode::LowLatency);
        assert!(PresentMode::from_vsync(true).is_vsync());
    }
}
