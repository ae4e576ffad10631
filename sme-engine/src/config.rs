//! Configuration for the playback engine and the `sme-play` binary
//!
//! All settings have built-in defaults; a TOML file only needs the keys it
//! overrides.
//!
//! ```toml
//! [engine]
//! track_kind = "video"
//! buffer_capacity = 60
//! lookahead_secs = 1.0
//!
//! [logging]
//! level = "debug"
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sme_common::config::{load_or_default, ConfigPathResolver};
use sme_common::events::TrackKind;
use std::path::Path;
use std::time::Duration;

/// Default number of units the output buffer may hold
pub const DEFAULT_BUFFER_CAPACITY: usize = 60;

/// Default lookahead horizon in seconds
pub const DEFAULT_LOOKAHEAD_SECS: f64 = 1.0;

/// Default decode attempts per buffer-ahead pass
pub const DEFAULT_FRAMES_PER_PASS: usize = 8;

/// Default decode attempts allowed for one seek refill
pub const DEFAULT_SEEK_FRAME_BUDGET: usize = 300;

/// Default retention window behind the presentation time, in seconds
pub const DEFAULT_RETENTION_SECS: f64 = 0.25;

/// Default tick cadence (≈60 Hz presentation)
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 16;

/// Playback engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Which kind of track `load` selects
    pub track_kind: TrackKind,

    /// Maximum units held in the output buffer (oldest dropped on overflow)
    pub buffer_capacity: usize,

    /// How far ahead of the presentation time the buffer is filled
    pub lookahead_secs: f64,

    /// Decode attempts allowed per buffer-ahead pass (bounds one tick)
    pub frames_per_pass: usize,

    /// Decode attempts allowed while refilling after a seek
    pub seek_frame_budget: usize,

    /// Units ending more than this far behind the presentation time are evicted
    pub retention_secs: f64,

    /// Streaming loop cadence when driven by [`crate::spawn_engine`]
    pub tick_interval_ms: u64,

    /// Present the latest earlier unit when nothing covers the current time.
    ///
    /// `None` picks the track-kind default: on for video, off for audio.
    pub allow_stale_fallback: Option<bool>,

    /// Capacity of the engine event broadcast channel
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            track_kind: TrackKind::Audio,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            lookahead_secs: DEFAULT_LOOKAHEAD_SECS,
            frames_per_pass: DEFAULT_FRAMES_PER_PASS,
            seek_frame_budget: DEFAULT_SEEK_FRAME_BUDGET,
            retention_secs: DEFAULT_RETENTION_SECS,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            allow_stale_fallback: None,
            event_channel_capacity: 64,
        }
    }
}

impl EngineConfig {
    /// Defaults for an engine playing the given track kind
    pub fn for_kind(track_kind: TrackKind) -> Self {
        Self {
            track_kind,
            ..Self::default()
        }
    }

    /// Whether the streaming loop may fall back to an earlier unit
    pub fn stale_fallback(&self) -> bool {
        self.allow_stale_fallback
            .unwrap_or(self.track_kind == TrackKind::Video)
    }

    /// Tick cadence as Duration
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            return Err(Error::Config("buffer_capacity must be > 0".to_string()));
        }
        if self.frames_per_pass == 0 {
            return Err(Error::Config("frames_per_pass must be > 0".to_string()));
        }
        if self.seek_frame_budget == 0 {
            return Err(Error::Config("seek_frame_budget must be > 0".to_string()));
        }
        if !self.lookahead_secs.is_finite() || self.lookahead_secs <= 0.0 {
            return Err(Error::Config(format!(
                "lookahead_secs must be a positive number, got {}",
                self.lookahead_secs
            )));
        }
        if !self.retention_secs.is_finite() || self.retention_secs < 0.0 {
            return Err(Error::Config(format!(
                "retention_secs must be >= 0, got {}",
                self.retention_secs
            )));
        }
        if self.event_channel_capacity == 0 {
            return Err(Error::Config("event_channel_capacity must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full EnvFilter directive
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Configuration file for the `sme-play` binary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

impl PlayerConfig {
    /// Load from CLI path → `SME_CONFIG` → user config dir → defaults
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let resolver = ConfigPathResolver::new("config.toml");
        let config: PlayerConfig = load_or_default(&resolver, cli_path)?;
        config.engine.validate()?;
        Ok(config)
    }
}
