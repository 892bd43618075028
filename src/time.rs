//! Time facilities.
//!
//! Two notions of time run side by side:
//!
//! - **Wall-clock time**, read from an injected [`TimeSource`] and turned
//!   into per-frame deltas by [`FrameTimer`]. It drives color drift and FPS.
//! - **Simulated time**, accumulated by [`SimulatedClock`] only while the
//!   simulation runs, scaled (and possibly negated) by `sim_speed`. It is the
//!   sole time input to attractor motion.
//!
//! # Example
//!
//! ```ignore
//! let clock = ManualClock::new();
//! let mut timer = FrameTimer::new(clock.clone());
//!
//! clock.advance(0.016);
//! let (elapsed, delta) = timer.update();
//! ```

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// A monotonic source of wall-clock seconds.
pub trait TimeSource {
    /// Seconds since some fixed origin.
    fn now(&self) -> f64;
}

/// Real time, measured from when the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// A clock that only moves when told to. Clones share the same reading.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward by `seconds`.
    pub fn advance(&self, seconds: f64) {
        self.now.set(self.now.get() + seconds);
    }

    pub fn set(&self, seconds: f64) {
        self.now.set(seconds);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> f64 {
        self.now.get()
    }
}

/// Per-frame timing derived from a [`TimeSource`].
///
/// Provides elapsed wall-clock time, delta time, frame counting, and FPS.
#[derive(Debug)]
pub struct FrameTimer<T: TimeSource> {
    source: T,
    /// Reading at construction.
    start: f64,
    /// Reading at the last update.
    last_frame: f64,
    /// Total elapsed time in seconds (cached for fast access).
    elapsed_secs: f32,
    /// Time since last frame in seconds.
    delta_secs: f32,
    /// Total frames since start.
    frame_count: u64,
    /// Calculated FPS (updated periodically).
    fps: f32,
    /// Frame count at last FPS update.
    fps_frame_count: u64,
    /// Reading at last FPS calculation.
    fps_update_time: f64,
    /// How often to update FPS calculation.
    fps_update_interval: Duration,
}

impl<T: TimeSource> FrameTimer<T> {
    pub fn new(source: T) -> Self {
        let now = source.now();
        Self {
            source,
            start: now,
            last_frame: now,
            elapsed_secs: 0.0,
            delta_secs: 0.0,
            frame_count: 0,
            fps: 0.0,
            fps_frame_count: 0,
            fps_update_time: now,
            fps_update_interval: Duration::from_millis(500),
        }
    }

    /// Update timing values. Call once per frame.
    ///
    /// Returns `(elapsed_time, delta_time)` for convenience.
    pub fn update(&mut self) -> (f32, f32) {
        let now = self.source.now();

        // A source that steps backwards is treated as standing still.
        self.delta_secs = (now - self.last_frame).max(0.0) as f32;
        self.last_frame = now.max(self.last_frame);
        self.elapsed_secs = (self.last_frame - self.start) as f32;

        self.frame_count += 1;

        let fps_elapsed = self.last_frame - self.fps_update_time;
        if fps_elapsed >= self.fps_update_interval.as_secs_f64() {
            let frames_since = self.frame_count - self.fps_frame_count;
            self.fps = (frames_since as f64 / fps_elapsed) as f32;
            self.fps_frame_count = self.frame_count;
            self.fps_update_time = self.last_frame;
        }

        (self.elapsed_secs, self.delta_secs)
    }

    /// Total wall-clock seconds since start.
    #[inline]
    pub fn elapsed(&self) -> f32 {
        self.elapsed_secs
    }

    /// Time since last frame in seconds (delta time).
    #[inline]
    pub fn delta(&self) -> f32 {
        self.delta_secs
    }

    /// Total frames since start.
    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame_count
    }

    /// Calculated frames per second.
    #[inline]
    pub fn fps(&self) -> f32 {
        self.fps
    }
}

/// The simulated-time accumulator (`simTime`).
///
/// Advanced only by [`SimulatedClock::advance`], which the simulation driver
/// calls while running. Not reset by restarting particles.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SimulatedClock {
    sim_time: f32,
}

impl SimulatedClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance by `real_delta * sim_speed` and return that simulated delta.
    pub fn advance(&mut self, real_delta: f32, sim_speed: f32) -> f32 {
        let delta = real_delta * sim_speed;
        self.sim_time += delta;
        delta
    }

    #[inline]
    pub fn sim_time(&self) -> f32 {
        self.sim_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_new() {
        let timer = FrameTimer::new(ManualClock::new());
        assert_eq!(timer.frame(), 0);
        assert_eq!(timer.elapsed(), 0.0);
    }

    #[test]
    fn test_timer_update() {
        let clock = ManualClock::new();
        let mut timer = FrameTimer::new(clock.clone());

        clock.advance(0.25);
        let (elapsed, delta) = timer.update();
        assert_eq!(elapsed, 0.25);
        assert_eq!(delta, 0.25);

        clock.advance(0.5);
        let (elapsed, delta) = timer.update();
        assert_eq!(elapsed, 0.75);
        assert_eq!(delta, 0.5);
        assert_eq!(timer.frame(), 2);
    }

    #[test]
    fn test_timer_fps() {
        let clock = ManualClock::new();
        let mut timer = FrameTimer::new(clock.clone());
        for _ in 0..60 {
            clock.advance(1.0 / 60.0);
            timer.update();
        }
        assert!((timer.fps() - 60.0).abs() < 1.0, "fps was {}", timer.fps());
    }

    #[test]
    fn test_timer_ignores_backwards_source() {
        let clock = ManualClock::new();
        clock.set(10.0);
        let mut timer = FrameTimer::new(clock.clone());
        clock.set(9.0);
        let (_, delta) = timer.update();
        assert_eq!(delta, 0.0);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        std::thread::sleep(Duration::from_millis(2));
        assert!(clock.now() > a);
    }

    #[test]
    fn test_sim_clock_scales_and_reverses() {
        let mut clock = SimulatedClock::new();
        assert_eq!(clock.advance(1.0, 2.0), 2.0);
        assert_eq!(clock.advance(0.5, -1.0), -0.5);
        assert_eq!(clock.sim_time(), 1.5);
    }
}
