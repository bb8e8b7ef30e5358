//! Frame statistics in the window title.

use std::sync::Arc;
use std::time::{Duration, Instant};

use winit::window::Window;

use dither_renderer::{FrameContext, UiOverlay};

const REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Averages frame time and rewrites the title once per interval.
pub struct TitleOverlay {
    window: Arc<Window>,
    base_title: String,
    frames: u32,
    accumulated: f32,
    last_refresh: Instant,
}

impl TitleOverlay {
    pub fn new(window: Arc<Window>, base_title: impl Into<String>) -> Self {
        Self {
            window,
            base_title: base_title.into(),
            frames: 0,
            accumulated: 0.0,
            last_refresh: Instant::now(),
        }
    }
}

impl UiOverlay for TitleOverlay {
    fn draw_ui(&mut self, frame: &FrameContext<'_>) {
        self.frames += 1;
        self.accumulated += frame.frame_time;

        if self.last_refresh.elapsed() < REFRESH_INTERVAL {
            return;
        }
        if let Some(title) = stats_title(&self.base_title, self.frames, self.accumulated) {
            self.window.set_title(&title);
        }
        self.frames = 0;
        self.accumulated = 0.0;
        self.last_refresh = Instant::now();
    }
}

fn stats_title(base: &str, frames: u32, seconds: f32) -> Option<String> {
    if frames == 0 || seconds <= 0.0 {
        return None;
    }
    let frame_ms = seconds * 1000.0 / frames as f32;
    let fps = frames as f32 / seconds;
    Some(format!("{base} | {fps:.0} FPS | {frame_ms:.2} ms"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_title() {
        assert_eq!(
            stats_title("dither", 120, 2.0).as_deref(),
            Some("dither | 60 FPS | 16.67 ms")
        );
    }

    #[test]
    fn test_stats_title_without_frames() {
        assert_eq!(stats_title("dither", 0, 1.0), None);
        assert_eq!(stats_title("dither", 10, 0.0), None);
    }
}
