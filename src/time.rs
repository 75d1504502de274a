//! Frame timing.
//!
//! [`FrameClock`] is the only source of time for the simulation loop. It is
//! driven by a monotonic [`Instant`] passed in by the caller, so tests can
//! step it with synthetic instants.
//!
//! ```ignore
//! let mut clock = FrameClock::new(Instant::now());
//!
//! // once per frame:
//! let tick = clock.tick(Instant::now());
//! println!("t = {:.2}s, dt = {:.4}s", tick.now, tick.delta);
//! ```

use std::time::{Duration, Instant};

/// Timing values for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTick {
    /// Seconds since the clock started.
    pub now: f32,
    /// Seconds since the previous tick. Zero on the first frame.
    pub delta: f32,
    /// Frame number, starting at 1.
    pub frame: u64,
}

/// Monotonic frame clock with delta guarding and frame-rate estimates.
#[derive(Debug)]
pub struct FrameClock {
    start: Instant,
    last_frame: Option<Instant>,
    elapsed_secs: f32,
    delta_secs: f32,
    frame_count: u64,
    /// Averaged FPS, refreshed every `fps_update_interval`.
    fps: f32,
    fps_frame_count: u64,
    fps_update_time: Instant,
    fps_update_interval: Duration,
}

impl FrameClock {
    pub fn new(start: Instant) -> Self {
        Self {
            start,
            last_frame: None,
            elapsed_secs: 0.0,
            delta_secs: 0.0,
            frame_count: 0,
            fps: 0.0,
            fps_frame_count: 0,
            fps_update_time: start,
            fps_update_interval: Duration::from_millis(500),
        }
    }

    /// Advance to `now`. Call once per frame.
    ///
    /// The first tick reports a zero delta, as does any tick whose instant is
    /// not after the previous one.
    pub fn tick(&mut self, now: Instant) -> FrameTick {
        self.delta_secs = match self.last_frame {
            Some(last) => now.saturating_duration_since(last).as_secs_f32(),
            None => 0.0,
        };
        self.last_frame = Some(now);
        self.elapsed_secs = now.saturating_duration_since(self.start).as_secs_f32();
        self.frame_count += 1;

        let since_update = now.saturating_duration_since(self.fps_update_time);
        if since_update >= self.fps_update_interval {
            let frames = self.frame_count - self.fps_frame_count;
            self.fps = frames as f32 / since_update.as_secs_f32();
            self.fps_frame_count = self.frame_count;
            self.fps_update_time = now;
        }

        FrameTick {
            now: self.elapsed_secs,
            delta: self.delta_secs,
            frame: self.frame_count,
        }
    }

    /// Seconds since start, as of the last tick.
    #[inline]
    pub fn elapsed(&self) -> f32 {
        self.elapsed_secs
    }

    /// Seconds between the last two ticks.
    #[inline]
    pub fn delta(&self) -> f32 {
        self.delta_secs
    }

    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame_count
    }

    /// Frame rate derived from the last delta alone, `None` when the delta is zero.
    pub fn instant_fps(&self) -> Option<f32> {
        (self.delta_secs > 0.0).then(|| 1.0 / self.delta_secs)
    }

    /// Frame rate averaged over the last half second.
    #[inline]
    pub fn average_fps(&self) -> f32 {
        self.fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_tick_has_zero_delta() {
        let start = Instant::now();
        let mut clock = FrameClock::new(start);
        let tick = clock.tick(start + Duration::from_millis(250));

        assert_eq!(tick.delta, 0.0);
        assert_eq!(tick.frame, 1);
        assert!((tick.now - 0.25).abs() < 1e-6);
        assert_eq!(clock.instant_fps(), None);
    }

    #[test]
    fn test_delta_between_ticks() {
        let start = Instant::now();
        let mut clock = FrameClock::new(start);
        clock.tick(start);
        let tick = clock.tick(start + Duration::from_millis(20));

        assert!((tick.delta - 0.02).abs() < 1e-6);
        let fps = clock.instant_fps().unwrap();
        assert!((fps - 50.0).abs() < 0.01);
    }

    #[test]
    fn test_non_advancing_instant_gives_zero_delta() {
        let start = Instant::now();
        let mut clock = FrameClock::new(start);
        clock.tick(start + Duration::from_millis(10));
        let tick = clock.tick(start + Duration::from_millis(5));

        assert_eq!(tick.delta, 0.0);
        assert_eq!(clock.instant_fps(), None);
    }

    #[test]
    fn test_average_fps_updates_after_interval() {
        let start = Instant::now();
        let mut clock = FrameClock::new(start);
        for i in 1..=30 {
            clock.tick(start + Duration::from_millis(i * 20));
        }
        // 30 frames over 600ms; the estimate is refreshed at the 500ms mark
        assert!((clock.average_fps() - 50.0).abs() < 1.0);
    }
}
