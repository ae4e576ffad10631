//! Transport control - play, pause, seek, speed and point lookups
//!
//! Operations that do not apply to the current state are logged at `warn`
//! and ignored.

use super::core::PlaybackEngine;
use crate::media::BufferedUnit;
use crate::playback::pipeline::{Delivered, PassOutcome};
use crate::playback::state::{PlaybackState, ResumeMode};
use sme_common::events::StateTag;
use sme_common::time::clamp_position;
use tracing::{debug, info, warn};

impl PlaybackEngine {
    /// Start presenting from `start_time` at `speed`.
    ///
    /// Refills the buffer first when `start_time` lies outside it.
    pub async fn play(&mut self, start_time: f64, speed: f64) {
        if !self.permits("play", StateTag::Playing) {
            return;
        }
        let start = self.clamp_to_track(start_time);

        let covered = self
            .state
            .loaded()
            .is_some_and(|loaded| loaded.buffer.covers(start));
        if !covered {
            self.run_seek_fill(start).await;
        }

        let from = self.state.tag();
        match std::mem::take(&mut self.state).into_loaded() {
            Ok(mut loaded) => {
                loaded.timing.start(start, speed);
                self.delivered = Delivered::Nothing;
                self.ended_notified = false;
                info!("Play from {:.3}s at {}x", start, loaded.timing.speed());
                self.set_state(from, PlaybackState::Playing(loaded));
            }
            Err(state) => self.state = state,
        }
    }

    /// Freeze presentation; returns the media time it stopped at
    pub fn pause(&mut self) -> f64 {
        if self.state.tag() != StateTag::Playing {
            warn!("Ignoring pause while {}", self.state.tag());
            return self.current_time();
        }

        match std::mem::take(&mut self.state) {
            PlaybackState::Playing(mut loaded) => {
                let position = loaded.timing.pause();
                info!("Paused at {:.3}s", position);
                self.set_state(StateTag::Playing, PlaybackState::Paused(loaded));
                position
            }
            other => {
                self.state = other;
                self.current_time()
            }
        }
    }

    /// Jump to `time`: clear the buffer, restart decoding from the keyframe at
    /// or before it, and refill the lookahead.
    ///
    /// Playing stays playing (re-anchored at `time`); paused stays paused; a
    /// ready engine ends up paused at `time`.
    pub async fn seek(&mut self, time: f64) {
        if !self.permits("seek", StateTag::Seeking) {
            return;
        }
        let time = self.clamp_to_track(time);
        let from = self.state.tag();

        let mut loaded = match std::mem::take(&mut self.state).into_loaded() {
            Ok(loaded) => loaded,
            Err(state) => {
                self.state = state;
                return;
            }
        };
        let resume = match from {
            StateTag::Playing => ResumeMode::Playing {
                speed: loaded.timing.speed(),
            },
            _ => ResumeMode::Paused,
        };
        loaded.timing.freeze_at(time);
        self.set_state(from, PlaybackState::Seeking { loaded, resume });

        let report = self.run_seek_fill(time).await;

        match std::mem::take(&mut self.state) {
            PlaybackState::Seeking {
                mut loaded,
                resume,
            } => {
                let next = match resume {
                    ResumeMode::Playing { speed } => {
                        loaded.timing.start(time, speed);
                        PlaybackState::Playing(loaded)
                    }
                    ResumeMode::Paused => {
                        loaded.timing.freeze_at(time);
                        PlaybackState::Paused(loaded)
                    }
                };
                self.delivered = Delivered::Nothing;
                self.ended_notified = false;
                self.set_state(StateTag::Seeking, next);
            }
            other => self.state = other,
        }

        if report.is_some_and(|r| r.outcome == PassOutcome::Superseded) {
            debug!("Seek to {:.3}s superseded by a newer request", time);
            return;
        }
        info!(
            "Seek to {:.3}s complete ({} buffered, {:?})",
            time,
            report.map(|r| r.buffered).unwrap_or(0),
            report.map(|r| r.outcome)
        );
        self.events.seek_completed(time);
    }

    /// Change the playback rate without a jump in position
    pub fn set_speed(&mut self, speed: f64) {
        match self.state.loaded_mut() {
            Some(loaded) => {
                if loaded.timing.set_speed(speed) {
                    info!("Playback speed set to {}x", speed);
                }
            }
            None => warn!("Ignoring set_speed while {}", self.state.tag()),
        }
    }

    /// Unit whose interval contains `time`.
    ///
    /// Seeks there first when no buffered unit contains `time`, including
    /// holes inside the buffered window; the playing/paused status is kept.
    pub async fn point_at_time(&mut self, time: f64) -> Option<BufferedUnit> {
        let hit = match self.state.loaded() {
            Some(loaded) => loaded.buffer.find_at(time, true).cloned(),
            None => {
                warn!("Ignoring point_at_time while {}", self.state.tag());
                return None;
            }
        };
        if hit.is_some() {
            return hit;
        }

        self.seek(time).await;
        self.state
            .loaded()
            .and_then(|loaded| loaded.buffer.find_at(time, true))
            .cloned()
    }

    /// Clamp a requested position into the track (unknown durations only clamp at 0)
    pub(crate) fn clamp_to_track(&self, time: f64) -> f64 {
        let duration = self.duration();
        if duration > 0.0 {
            clamp_position(time, duration)
        } else if time.is_finite() {
            time.max(0.0)
        } else {
            0.0
        }
    }
}
