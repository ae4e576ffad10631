//! Playback state
//!
//! Exactly one state is active. Loaded resources live inside the state
//! variant, so leaving the loaded states means giving them up.

use crate::media::{Decoder, DecoderState, Demuxer, EncodedPacket, MediaSource, TrackDescriptor};
use crate::playback::buffer::OutputBuffer;
use crate::playback::timing::TimingController;
use sme_common::events::StateTag;

/// Resources held while a track is loaded
pub struct Loaded {
    pub source: Box<dyn MediaSource>,
    pub track: TrackDescriptor,
    pub demuxer: Box<dyn Demuxer>,
    pub decoder: Box<dyn Decoder>,
    pub timing: TimingController,
    pub buffer: OutputBuffer,
    /// Media time up to which the pipeline has decoded
    pub cursor: Option<f64>,
    /// Last packet submitted, for sequential demuxing
    pub last_packet: Option<EncodedPacket>,
    /// Decoding forward from a keyframe behind the presentation time
    pub catching_up: bool,
}

impl Loaded {
    pub fn duration(&self) -> f64 {
        self.track.duration
    }

    /// Forget decode progress (buffer contents are left alone)
    pub fn reset_cursor(&mut self) {
        self.cursor = None;
        self.last_packet = None;
        self.catching_up = false;
    }

    /// Close the source; hand back the decoder if it is still usable
    pub fn release(mut self) -> Option<Box<dyn Decoder>> {
        self.source.close();
        if self.decoder.state() == DecoderState::Closed {
            None
        } else {
            Some(self.decoder)
        }
    }
}

/// How playback resumes once a seek finishes
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResumeMode {
    Playing { speed: f64 },
    Paused,
}

impl ResumeMode {
    pub fn tag(self) -> StateTag {
        match self {
            ResumeMode::Playing { .. } => StateTag::Playing,
            ResumeMode::Paused => StateTag::Paused,
        }
    }
}

pub enum PlaybackState {
    /// Nothing loaded; `preserved` is a decoder kept for reuse by the next load
    Idle { preserved: Option<Box<dyn Decoder>> },
    Loading { preserved: Option<Box<dyn Decoder>> },
    Ready(Loaded),
    Playing(Loaded),
    Paused(Loaded),
    Seeking { loaded: Loaded, resume: ResumeMode },
}

impl Default for PlaybackState {
    fn default() -> Self {
        PlaybackState::Idle { preserved: None }
    }
}

impl PlaybackState {
    pub fn tag(&self) -> StateTag {
        match self {
            PlaybackState::Idle { .. } => StateTag::Idle,
            PlaybackState::Loading { .. } => StateTag::Loading,
            PlaybackState::Ready(_) => StateTag::Ready,
            PlaybackState::Playing(_) => StateTag::Playing,
            PlaybackState::Paused(_) => StateTag::Paused,
            PlaybackState::Seeking { .. } => StateTag::Seeking,
        }
    }

    pub fn loaded(&self) -> Option<&Loaded> {
        match self {
            PlaybackState::Ready(l) | PlaybackState::Playing(l) | PlaybackState::Paused(l) => {
                Some(l)
            }
            PlaybackState::Seeking { loaded, .. } => Some(loaded),
            PlaybackState::Idle { .. } | PlaybackState::Loading { .. } => None,
        }
    }

    pub fn loaded_mut(&mut self) -> Option<&mut Loaded> {
        match self {
            PlaybackState::Ready(l) | PlaybackState::Playing(l) | PlaybackState::Paused(l) => {
                Some(l)
            }
            PlaybackState::Seeking { loaded, .. } => Some(loaded),
            PlaybackState::Idle { .. } | PlaybackState::Loading { .. } => None,
        }
    }

    /// Take the loaded resources out of a loaded state
    pub fn into_loaded(self) -> Result<Loaded, Self> {
        match self {
            PlaybackState::Ready(l) | PlaybackState::Playing(l) | PlaybackState::Paused(l) => Ok(l),
            PlaybackState::Seeking { loaded, .. } => Ok(loaded),
            other => Err(other),
        }
    }
}

impl std::fmt::Debug for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle { preserved } | PlaybackState::Loading { preserved } => f
                .debug_struct(&self.tag().to_string())
                .field("preserved", &preserved.is_some())
                .finish(),
            PlaybackState::Seeking { loaded, resume } => f
                .debug_struct("seeking")
                .field("track", &loaded.track.id)
                .field("resume", resume)
                .finish(),
            other => {
                let track = other.loaded().map(|l| l.track.id);
                f.debug_struct(&other.tag().to_string())
                    .field("track", &track)
                    .finish()
            }
        }
    }
}
