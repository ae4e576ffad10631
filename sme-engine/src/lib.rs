//! # SME Engine Library (sme-engine)
//!
//! Streaming media playback engine: turns an encoded container into a steady
//! stream of precisely-timed decoded units (audio blocks or video pictures)
//! delivered to an output sink, with play, pause, seek and speed changes.
//!
//! **Architecture:** one engine instance per track, owned by a single
//! cooperative task. Demuxing and decoding are external collaborators behind
//! the traits in [`media`]; [`media::symphonia_backend`] provides an audio
//! implementation.
//!
//! ```text
//! MediaBackend ──open──▶ MediaSource ──▶ Demuxer ──packets──▶ Decoder
//!                                                              │
//!        TimingController ──now──▶ streaming tick ◀── OutputBuffer ◀──┘
//!                                        │
//!                                        ▼
//!                                   OutputSink
//! ```

pub mod config;
pub mod error;
pub mod media;
pub mod playback;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use playback::{spawn_engine, EngineHandle, PlaybackEngine};
