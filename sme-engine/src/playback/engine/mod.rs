//! Playback engine
//!
//! **Module Structure:**
//! - `core.rs`: Engine struct, construction, state transitions, load/unload
//! - `playback.rs`: Transport control (play, pause, seek, speed, point lookup)
//! - `diagnostics.rs`: Status accessors, perf stats, event subscription
//!
//! The streaming tick and the driver task live in `playback::streaming`.

mod core;
mod diagnostics;
mod playback;

pub use core::PlaybackEngine;
pub use diagnostics::EngineStatus;
