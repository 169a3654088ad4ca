//! Render loop helpers for the `kinescope` binary.

use std::time::{Duration, Instant};

/// Measures how fast the player pushes source frames through the effect
/// chain. The binary logs the rate next to the surface size and the number
/// of running effects.
pub struct FpsCounter {
    frame_count: u32,
    last_time: Instant,
    interval: Duration,
}

impl FpsCounter {
    /// Reports once a second.
    pub fn new() -> Self {
        Self::with_interval(Duration::from_secs(1))
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            frame_count: 0,
            last_time: Instant::now(),
            interval,
        }
    }

    /// Counts one composited frame.
    ///
    /// Returns frames per second once `interval` has elapsed since the last
    /// report, then starts a new window.
    pub fn update(&mut self) -> Option<f32> {
        self.frame_count += 1;
        let elapsed = self.last_time.elapsed();

        if elapsed >= self.interval {
            let fps = self.frame_count as f32 / elapsed.as_secs_f32();
            self.frame_count = 0;
            self.last_time = Instant::now();
            Some(fps)
        } else {
            None
        }
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}
