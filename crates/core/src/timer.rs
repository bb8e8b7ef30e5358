//! Frame timing.

use std::time::{Duration, Instant};

/// Measures per-frame delta time and a rolling frames-per-second figure.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    last_tick: Instant,
    frames_in_window: u32,
    window_start: Instant,
    fps: f32,
}

impl Timer {
    /// Length of the window the FPS figure is averaged over.
    pub const FPS_WINDOW: Duration = Duration::from_secs(1);

    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            frames_in_window: 0,
            window_start: now,
            fps: 0.0,
        }
    }

    /// Total time since the timer was created or reset.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed().as_secs_f32()
    }

    /// Advance one frame and return the time since the previous tick.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;

        self.frames_in_window += 1;
        let window = now - self.window_start;
        if window >= Self::FPS_WINDOW {
            self.fps = self.frames_in_window as f32 / window.as_secs_f32();
            self.frames_in_window = 0;
            self.window_start = now;
        }

        delta
    }

    /// Advance one frame and return the delta in seconds.
    pub fn delta_secs(&mut self) -> f32 {
        self.tick().as_secs_f32()
    }

    /// Frames per second averaged over the last completed window.
    pub fn fps(&self) -> f32 {
        self.fps
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
