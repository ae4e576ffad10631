//! # SME Common Library
//!
//! Shared code for the streaming media engine crates:
//! - Error type used by configuration helpers
//! - Engine event types (EngineEvent enum) and playback state tags
//! - Configuration file resolution and TOML loading
//! - Media-time helpers (tolerant comparison, display formatting)

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
pub use events::{EngineEvent, StateTag};
