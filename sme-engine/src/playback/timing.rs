//! Timing controller
//!
//! Maps wall-clock time to media time. While running, media time advances at
//! `speed` times wall-clock rate from the last anchor; while stopped it holds
//! a frozen value.
//!
//! Uses `tokio::time::Instant` so paused-clock tests can drive it with
//! `tokio::time::advance`.

use tokio::time::Instant;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct TimingController {
    /// Wall-clock anchor; `None` while stopped
    anchor_wall: Option<Instant>,
    /// Media time at the anchor (or the frozen value while stopped)
    anchor_media: f64,
    speed: f64,
}

impl Default for TimingController {
    fn default() -> Self {
        Self::new()
    }
}

impl TimingController {
    /// Stopped at media time 0, speed 1.0
    pub fn new() -> Self {
        Self {
            anchor_wall: None,
            anchor_media: 0.0,
            speed: 1.0,
        }
    }

    /// Start advancing from `media_time` at `speed`.
    ///
    /// An invalid speed is ignored and the previous speed kept.
    pub fn start(&mut self, media_time: f64, speed: f64) {
        if valid_speed(speed) {
            self.speed = speed;
        } else {
            warn!("Ignoring invalid playback speed {} on start", speed);
        }
        self.anchor_media = media_time;
        self.anchor_wall = Some(Instant::now());
    }

    /// Current media time in seconds
    pub fn current_time(&self) -> f64 {
        match self.anchor_wall {
            Some(anchor) => self.anchor_media + anchor.elapsed().as_secs_f64() * self.speed,
            None => self.anchor_media,
        }
    }

    /// Stop advancing; returns the frozen media time
    pub fn pause(&mut self) -> f64 {
        let now = self.current_time();
        self.freeze_at(now);
        now
    }

    /// Stop and hold at an explicit media time
    pub fn freeze_at(&mut self, media_time: f64) {
        self.anchor_wall = None;
        self.anchor_media = media_time;
    }

    /// Change the rate multiplier without a jump in media time.
    ///
    /// Returns false (and changes nothing) for non-finite or non-positive speeds.
    pub fn set_speed(&mut self, speed: f64) -> bool {
        if !valid_speed(speed) {
            warn!("Rejecting invalid playback speed {}", speed);
            return false;
        }
        if self.anchor_wall.is_some() {
            self.anchor_media = self.current_time();
            self.anchor_wall = Some(Instant::now());
        }
        self.speed = speed;
        true
    }

    pub fn is_running(&self) -> bool {
        self.anchor_wall.is_some()
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }
}

fn valid_speed(speed: f64) -> bool {
    speed.is_finite() && speed > 0.0
}
