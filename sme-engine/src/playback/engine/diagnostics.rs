//! Diagnostics and status accessors

use super::core::PlaybackEngine;
use crate::config::EngineConfig;
use crate::playback::buffer::BufferRange;
use crate::playback::perf::PerfStats;
use serde::Serialize;
use sme_common::events::{EngineEvent, StateTag};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Point-in-time view of an engine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatus {
    pub state: StateTag,
    pub position: f64,
    pub duration: f64,
    pub buffer_range: BufferRange,
    pub buffered_units: usize,
}

impl PlaybackEngine {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> StateTag {
        self.state.tag()
    }

    /// Presentation time in seconds (0 when nothing is loaded)
    pub fn current_time(&self) -> f64 {
        self.state
            .loaded()
            .map(|loaded| loaded.timing.current_time())
            .unwrap_or(0.0)
    }

    /// Track duration in seconds (0 when nothing is loaded)
    pub fn duration(&self) -> f64 {
        self.state
            .loaded()
            .map(|loaded| loaded.duration())
            .unwrap_or(0.0)
    }

    /// Buffered time span; `{0, 0}` when empty
    pub fn buffer_range(&self) -> BufferRange {
        self.state
            .loaded()
            .and_then(|loaded| loaded.buffer.range())
            .unwrap_or(BufferRange::EMPTY)
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            state: self.state(),
            position: self.current_time(),
            duration: self.duration(),
            buffer_range: self.buffer_range(),
            buffered_units: self.state.loaded().map(|l| l.buffer.len()).unwrap_or(0),
        }
    }

    pub fn perf_stats(&self) -> PerfStats {
        self.perf.stats()
    }

    pub fn reset_perf_stats(&mut self) {
        self.perf.reset();
    }

    /// Receive engine events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }
}
