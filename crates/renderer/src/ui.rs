//! UI overlay hook.

use crate::frame::FrameContext;

/// Drawn once per frame, last, inside the swap-chain render pass.
pub trait UiOverlay {
    fn draw_ui(&mut self, frame: &FrameContext<'_>);
}
