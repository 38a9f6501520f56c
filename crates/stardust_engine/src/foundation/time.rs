//! Frame timing and rolling frame statistics.

use std::time::Instant;

/// Length of the FPS averaging window in seconds.
const STATS_WINDOW_SECS: f64 = 0.5;

/// Rolling FPS / frame-time statistics.
///
/// Accumulates frame timestamps and recomputes the averages once per
/// half-second window. Kept separate from the wall clock so tests can drive
/// it with synthetic timestamps.
#[derive(Debug, Clone)]
pub struct FrameStats {
    window_start: f64,
    window_frames: u32,
    fps: f32,
    frame_ms: f32,
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameStats {
    pub fn new() -> Self {
        Self {
            window_start: 0.0,
            window_frames: 0,
            fps: 0.0,
            frame_ms: 0.0,
        }
    }

    /// Record one finished frame at `now` seconds.
    ///
    /// Returns `true` when the averaging window rolled over and the FPS and
    /// frame-time figures were recomputed. Callers use that flag to gate
    /// once-per-window work such as CPU-load sampling.
    pub fn accumulate(&mut self, now: f64) -> bool {
        self.window_frames += 1;
        let elapsed = now - self.window_start;
        if elapsed < STATS_WINDOW_SECS {
            return false;
        }
        self.fps = (self.window_frames as f64 / elapsed) as f32;
        self.frame_ms = (elapsed * 1000.0 / self.window_frames as f64) as f32;
        self.window_start = now;
        self.window_frames = 0;
        true
    }

    /// Frames per second over the last completed window.
    pub fn fps(&self) -> f32 {
        self.fps
    }

    /// Average frame time in milliseconds over the last completed window.
    pub fn frame_ms(&self) -> f32 {
        self.frame_ms
    }
}

/// Wall-clock frame timer.
///
/// Tracks total elapsed time, per-frame delta, and the rolling
/// [`FrameStats`] window.
pub struct FrameClock {
    started: Instant,
    last_frame: Instant,
    delta: f32,
    stats: FrameStats,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            started: now,
            last_frame: now,
            delta: 0.0,
            stats: FrameStats::new(),
        }
    }

    /// Advance the clock by one frame.
    ///
    /// Returns `true` when the stats window rolled over this frame.
    pub fn tick(&mut self) -> bool {
        let now = Instant::now();
        self.delta = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.stats.accumulate(now.duration_since(self.started).as_secs_f64())
    }

    /// Seconds since the previous `tick`.
    pub fn delta_time(&self) -> f32 {
        self.delta
    }

    /// Seconds since the clock was created.
    pub fn total_time(&self) -> f32 {
        self.last_frame.duration_since(self.started).as_secs_f32()
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn window_rolls_at_half_second() {
        let mut stats = FrameStats::new();
        // 60 fps frames: window must roll at the first frame past 0.5 s.
        let mut rolled_at = None;
        for i in 1..=40 {
            let now = i as f64 / 60.0;
            if stats.accumulate(now) {
                rolled_at = Some(i);
                break;
            }
        }
        assert_eq!(rolled_at, Some(30));
        assert_relative_eq!(stats.fps(), 60.0, epsilon = 0.5);
        assert_relative_eq!(stats.frame_ms(), 16.666, epsilon = 0.1);
    }

    #[test]
    fn figures_hold_between_windows() {
        let mut stats = FrameStats::new();
        for i in 1..=30 {
            stats.accumulate(i as f64 / 60.0);
        }
        let fps = stats.fps();
        // Mid-window frames must not disturb the published figures.
        assert!(!stats.accumulate(31.0 / 60.0));
        assert_relative_eq!(stats.fps(), fps);
    }

    #[test]
    fn slow_frames_report_low_fps() {
        let mut stats = FrameStats::new();
        let mut rolled = false;
        for i in 1..=5 {
            rolled = stats.accumulate(i as f64 * 0.1);
        }
        assert!(rolled);
        assert_relative_eq!(stats.fps(), 10.0, epsilon = 0.5);
    }
}
