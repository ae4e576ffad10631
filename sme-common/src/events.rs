//! Event types for the SME event system
//!
//! Engines broadcast these to any number of subscribers (UI store, logging,
//! tests). They carry plain data only; decoded media never travels here.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tag naming the active playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateTag {
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Seeking,
}

impl StateTag {
    /// Whether a media source is loaded in this state
    pub fn is_loaded(self) -> bool {
        matches!(
            self,
            StateTag::Ready | StateTag::Playing | StateTag::Paused | StateTag::Seeking
        )
    }

    /// Whether the transition `self -> to` is one the engine may perform
    pub fn can_transition_to(self, to: StateTag) -> bool {
        use StateTag::*;
        match (self, to) {
            (Idle, Loading) => true,
            (Loading, Ready) | (Loading, Idle) => true,
            (Ready, Playing) | (Paused, Playing) => true,
            (Playing, Paused) => true,
            (Ready, Seeking) | (Playing, Seeking) | (Paused, Seeking) => true,
            (Seeking, Playing) | (Seeking, Paused) => true,
            // Re-load from any loaded state
            (Ready, Loading) | (Playing, Loading) | (Paused, Loading) | (Seeking, Loading) => true,
            // Unload
            (_, Idle) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for StateTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StateTag::Idle => "idle",
            StateTag::Loading => "loading",
            StateTag::Ready => "ready",
            StateTag::Playing => "playing",
            StateTag::Paused => "paused",
            StateTag::Seeking => "seeking",
        };
        f.write_str(name)
    }
}

/// Kind of track an engine plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    #[default]
    Audio,
    Video,
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackKind::Audio => f.write_str("audio"),
            TrackKind::Video => f.write_str("video"),
        }
    }
}

/// Engine event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    /// Playback state changed
    StateChanged {
        engine_id: Uuid,
        from: StateTag,
        to: StateTag,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A load finished (track is None when the container had no usable track)
    Loaded {
        engine_id: Uuid,
        duration: f64,
        has_track: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Seek completed and the lookahead buffer was refilled
    SeekCompleted {
        engine_id: Uuid,
        position: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Presentation reached the end of the track
    Ended {
        engine_id: Uuid,
        duration: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A packet failed to decode; playback continues with a gap
    DecodeError {
        engine_id: Uuid,
        position: f64,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The media source could not be opened
    SourceError {
        engine_id: Uuid,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl EngineEvent {
    /// Get event type as string
    pub fn event_type(&self) -> &'static str {
        match self {
            EngineEvent::StateChanged { .. } => "StateChanged",
            EngineEvent::Loaded { .. } => "Loaded",
            EngineEvent::SeekCompleted { .. } => "SeekCompleted",
            EngineEvent::Ended { .. } => "Ended",
            EngineEvent::DecodeError { .. } => "DecodeError",
            EngineEvent::SourceError { .. } => "SourceError",
        }
    }

    /// Engine that emitted this event
    pub fn engine_id(&self) -> Uuid {
        match self {
            EngineEvent::StateChanged { engine_id, .. }
            | EngineEvent::Loaded { engine_id, .. }
            | EngineEvent::SeekCompleted { engine_id, .. }
            | EngineEvent::Ended { engine_id, .. }
            | EngineEvent::DecodeError { engine_id, .. }
            | EngineEvent::SourceError { engine_id, .. } => *engine_id,
        }
    }
}
