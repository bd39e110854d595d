//! `DrawHook` trait definition.

use crate::frame::FrameContext;

/// Records a frame's drawing commands.
///
/// Called once per presented frame, between the render pass opening on the
/// acquired image and the frame being submitted. The viewport and scissor
/// already cover the whole image.
///
/// Implemented for any `FnMut(&FrameContext) -> anyhow::Result<()>`.
pub trait DrawHook {
    /// Record commands into `frame.command_buffer`.
    fn draw(&mut self, frame: &FrameContext) -> anyhow::Result<()>;
}

impl<F> DrawHook for F
where
    F: FnMut(&FrameContext) -> anyhow::Result<()>,
{
    fn draw(&mut self, frame: &FrameContext) -> anyhow::Result<()> {
        self(frame)
    }
}
