//! Engine event emission
//!
//! Wraps the broadcast sender so engine code emits typed events without
//! repeating the engine id and timestamp. Events are fire-and-forget: having
//! no subscribers is normal.

use sme_common::events::{EngineEvent, StateTag};
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventEmitter {
    engine_id: Uuid,
    tx: broadcast::Sender<EngineEvent>,
}

impl EventEmitter {
    pub fn new(engine_id: Uuid, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { engine_id, tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    pub fn sender(&self) -> broadcast::Sender<EngineEvent> {
        self.tx.clone()
    }

    fn emit(&self, event: EngineEvent) {
        // Ignore send errors (no receivers is OK)
        let _ = self.tx.send(event);
    }

    pub fn state_changed(&self, from: StateTag, to: StateTag) {
        self.emit(EngineEvent::StateChanged {
            engine_id: self.engine_id,
            from,
            to,
            timestamp: chrono::Utc::now(),
        });
    }

    pub fn loaded(&self, duration: f64, has_track: bool) {
        self.emit(EngineEvent::Loaded {
            engine_id: self.engine_id,
            duration,
            has_track,
            timestamp: chrono::Utc::now(),
        });
    }

    pub fn seek_completed(&self, position: f64) {
        self.emit(EngineEvent::SeekCompleted {
            engine_id: self.engine_id,
            position,
            timestamp: chrono::Utc::now(),
        });
    }

    pub fn ended(&self, duration: f64) {
        self.emit(EngineEvent::Ended {
            engine_id: self.engine_id,
            duration,
            timestamp: chrono::Utc::now(),
        });
    }

    pub fn decode_error(&self, position: f64, message: impl Into<String>) {
        self.emit(EngineEvent::DecodeError {
            engine_id: self.engine_id,
            position,
            message: message.into(),
            timestamp: chrono::Utc::now(),
        });
    }

    pub fn source_error(&self, message: impl Into<String>) {
        self.emit(EngineEvent::SourceError {
            engine_id: self.engine_id,
            message: message.into(),
            timestamp: chrono::Utc::now(),
        });
    }
}
