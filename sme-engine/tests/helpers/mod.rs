//! Test helper modules for sme-engine integration tests
//!
//! Provides reusable test infrastructure components:
//! - SyntheticBackend: scripted container/decoder with an ordered op log
//! - RecordingSink: captures what the streaming loop delivers
//! - Engine constructors and event collection

#![allow(dead_code)]

pub mod sink;
pub mod synthetic;

pub use sink::RecordingSink;
pub use synthetic::{OpLog, SyntheticBackend, SyntheticTrack, SYNTH_SAMPLE_RATE};

use sme_common::events::EngineEvent;
use sme_engine::media::MediaInput;
use sme_engine::{EngineConfig, PlaybackEngine};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Tolerance for wall-clock-derived positions
pub const POSITION_TOLERANCE: f64 = 0.05;

pub fn assert_near(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {} ± {}, got {}",
        expected,
        tolerance,
        actual
    );
}

/// Input the synthetic backend opens successfully
pub fn media_input() -> MediaInput {
    MediaInput::File("synthetic.media".into())
}

/// Input the synthetic backend refuses to open
pub fn missing_input() -> MediaInput {
    MediaInput::File("missing.media".into())
}

/// Engine over a synthetic backend serving `track`
pub fn synthetic_engine(
    track: SyntheticTrack,
    config: EngineConfig,
) -> (PlaybackEngine, SyntheticBackend) {
    let backend = SyntheticBackend::new(track);
    let engine = PlaybackEngine::new(Arc::new(backend.clone()), config)
        .expect("valid engine config");
    (engine, backend)
}

/// Engine with a loaded 10 s audio track and a recording sink
pub async fn loaded_audio_engine() -> (PlaybackEngine, SyntheticBackend, RecordingSink) {
    let (mut engine, backend) =
        synthetic_engine(SyntheticTrack::audio(), EngineConfig::default());
    let sink = RecordingSink::new();
    engine.set_output_sink(sink.boxed());
    engine.load(media_input()).await.expect("load succeeds");
    (engine, backend, sink)
}

/// Advance the paused test clock and run one tick
pub async fn advance_and_tick(engine: &mut PlaybackEngine, by: Duration) {
    tokio::time::advance(by).await;
    engine.tick().await;
}

/// Drain every event currently queued on `rx`
pub fn drain_events(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn count_events(events: &[EngineEvent], event_type: &str) -> usize {
    events
        .iter()
        .filter(|e| e.event_type() == event_type)
        .count()
}
