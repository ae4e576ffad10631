//! Core playback engine - construction, state transitions and loading
//!
//! **Responsibilities:**
//! - PlaybackEngine struct definition and initialization
//! - State transition bookkeeping (logging + `StateChanged` events)
//! - Source lifecycle (load, unload) and decoder preservation across loads
//! - Glue between engine fields and the decode pipeline

use crate::config::EngineConfig;
use crate::error::Result;
use crate::media::{Decoder, LoadResult, MediaBackend, MediaInput, OutputSink};
use crate::playback::buffer::OutputBuffer;
use crate::playback::events::EventEmitter;
use crate::playback::perf::PerfRecorder;
use crate::playback::pipeline::{
    DecodePipeline, Delivered, LiveDelivery, PassContext, PassReport, SupersedeSignal,
};
use crate::playback::state::{Loaded, PlaybackState};
use crate::playback::timing::TimingController;
use sme_common::events::StateTag;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Streaming playback engine for one track.
///
/// Owned by a single task; every operation takes `&mut self`. Use
/// [`crate::spawn_engine`] to run it behind a cloneable handle with a
/// presentation-rate ticker.
pub struct PlaybackEngine {
    pub(crate) id: Uuid,

    pub(crate) config: EngineConfig,

    /// Opens media sources on `load`
    pub(crate) backend: Arc<dyn MediaBackend>,

    /// Active state; owns every loaded resource
    pub(crate) state: PlaybackState,

    pub(crate) pipeline: DecodePipeline,

    pub(crate) perf: PerfRecorder,

    pub(crate) events: EventEmitter,

    /// Consumer of presented units
    pub(crate) sink: Option<Box<dyn OutputSink>>,

    /// What the sink last received (suppresses redelivery)
    pub(crate) delivered: Delivered,

    /// `Ended` already fired for the current play-through
    pub(crate) ended_notified: bool,
}

impl PlaybackEngine {
    /// Create an idle engine
    pub fn new(backend: Arc<dyn MediaBackend>, config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let id = Uuid::new_v4();
        let pipeline = DecodePipeline::new(
            config.lookahead_secs,
            config.frames_per_pass,
            config.seek_frame_budget,
            SupersedeSignal::new(),
        );
        let events = EventEmitter::new(id, config.event_channel_capacity);

        info!(
            engine_id = %id,
            track_kind = %config.track_kind,
            stale_fallback = config.stale_fallback(),
            "Playback engine created"
        );

        Ok(Self {
            id,
            config,
            backend,
            state: PlaybackState::default(),
            pipeline,
            perf: PerfRecorder::new(),
            events,
            sink: None,
            delivered: Delivered::Nothing,
            ended_notified: false,
        })
    }

    /// Open `input` and prepare its first track of the configured kind.
    ///
    /// Only a source that cannot be opened is an error. A container without
    /// a usable track leaves the engine idle and returns
    /// `{ duration: 0, track: None }`.
    pub async fn load(&mut self, input: MediaInput) -> Result<LoadResult> {
        info!("Loading {}", input);
        self.pipeline.generation().bump();

        let from = self.state.tag();
        let preserved = match std::mem::take(&mut self.state) {
            PlaybackState::Idle { preserved } | PlaybackState::Loading { preserved } => preserved,
            loaded_state => match loaded_state.into_loaded() {
                Ok(loaded) => loaded.release(),
                Err(_) => None,
            },
        };
        self.delivered = Delivered::Nothing;
        self.ended_notified = false;
        self.set_state(from, PlaybackState::Loading { preserved });

        let opened = self.backend.open(&input).await;
        let preserved = self.take_preserved();

        let mut source = match opened {
            Ok(source) => source,
            Err(e) => {
                error!("Failed to open {}: {}", input, e);
                self.events.source_error(e.to_string());
                self.set_state(StateTag::Loading, PlaybackState::Idle { preserved });
                return Err(e);
            }
        };

        let kind = self.config.track_kind;
        let Some(track) = source.tracks().iter().find(|t| t.kind == kind).cloned() else {
            info!("No {} track in {}", kind, input);
            source.close();
            return Ok(self.finish_empty_load(preserved));
        };

        let demuxer = match source.demuxer(track.id) {
            Ok(demuxer) => demuxer,
            Err(e) => {
                warn!("Track {} cannot be demuxed: {}", track.id, e);
                source.close();
                return Ok(self.finish_empty_load(preserved));
            }
        };

        let decoder =
            match DecodePipeline::acquire_decoder(preserved, source.as_ref(), &track).await {
                Ok(decoder) => decoder,
                Err(e) => {
                    warn!("No usable decoder for {} track {}: {}", track.codec, track.id, e);
                    source.close();
                    return Ok(self.finish_empty_load(None));
                }
            };

        let result = LoadResult {
            duration: track.duration,
            track: Some(track.info()),
        };
        let loaded = Loaded {
            source,
            track,
            demuxer,
            decoder,
            timing: TimingController::new(),
            buffer: OutputBuffer::new(self.config.buffer_capacity),
            cursor: None,
            last_packet: None,
            catching_up: false,
        };
        self.set_state(StateTag::Loading, PlaybackState::Ready(loaded));

        if let Some(report) = self.run_buffer_ahead(0.0, None).await {
            debug!(
                buffered = report.buffered,
                outcome = ?report.outcome,
                "Initial lookahead fill"
            );
        }

        info!(
            "Loaded {} ({:.3}s, codec {})",
            input,
            result.duration,
            result.track.as_ref().map(|t| t.codec.as_str()).unwrap_or("-")
        );
        self.events.loaded(result.duration, true);
        Ok(result)
    }

    /// Release every resource, including a decoder preserved for reuse
    pub fn unload(&mut self) {
        let from = self.state.tag();
        self.pipeline.generation().bump();

        let leftover = match std::mem::take(&mut self.state) {
            PlaybackState::Idle { preserved } | PlaybackState::Loading { preserved } => preserved,
            loaded_state => match loaded_state.into_loaded() {
                Ok(loaded) => loaded.release(),
                Err(_) => None,
            },
        };
        if let Some(mut decoder) = leftover {
            decoder.close();
        }

        self.delivered = Delivered::Nothing;
        self.ended_notified = false;
        self.set_state(from, PlaybackState::Idle { preserved: None });
        debug!("Engine unloaded");
    }

    /// Replace the output consumer; `None` detaches it
    pub fn set_output_sink(&mut self, sink: Option<Box<dyn OutputSink>>) {
        self.sink = sink;
        self.delivered = Delivered::Nothing;
    }

    fn finish_empty_load(
        &mut self,
        preserved: Option<Box<dyn Decoder>>,
    ) -> LoadResult {
        self.set_state(StateTag::Loading, PlaybackState::Idle { preserved });
        self.events.loaded(0.0, false);
        LoadResult::empty()
    }

    fn take_preserved(&mut self) -> Option<Box<dyn Decoder>> {
        match &mut self.state {
            PlaybackState::Idle { preserved } | PlaybackState::Loading { preserved } => {
                preserved.take()
            }
            _ => None,
        }
    }

    /// Whether the current state may move to `to`; logs a rejection
    pub(crate) fn permits(&self, operation: &str, to: StateTag) -> bool {
        let from = self.state.tag();
        if from.can_transition_to(to) {
            true
        } else {
            warn!("Ignoring {} while {}", operation, from);
            false
        }
    }

    /// Install `next` as the active state, logging and broadcasting the change
    pub(crate) fn set_state(&mut self, from: StateTag, next: PlaybackState) {
        let to = next.tag();
        if from != to && !from.can_transition_to(to) {
            error!("Unexpected state transition {} -> {}", from, to);
        }
        self.state = next;
        if from != to {
            info!("Playback state changed: {} -> {}", from, to);
            self.events.state_changed(from, to);
        }
    }

    /// Run one buffer-ahead pass; `live_now` enables direct sink delivery
    pub(crate) async fn run_buffer_ahead(
        &mut self,
        target: f64,
        live_now: Option<f64>,
    ) -> Option<PassReport> {
        let loaded = self.state.loaded_mut()?;
        let live = match (live_now, self.sink.as_deref_mut()) {
            (Some(now), Some(sink)) => Some(LiveDelivery {
                now,
                sink,
                delivered: &mut self.delivered,
            }),
            _ => None,
        };
        let mut ctx = PassContext {
            perf: &mut self.perf,
            events: &self.events,
            live,
        };
        Some(self.pipeline.buffer_ahead(loaded, target, &mut ctx).await)
    }

    /// Run a seek refill at `time`
    pub(crate) async fn run_seek_fill(&mut self, time: f64) -> Option<PassReport> {
        let loaded = self.state.loaded_mut()?;
        let mut ctx = PassContext {
            perf: &mut self.perf,
            events: &self.events,
            live: None,
        };
        Some(self.pipeline.seek_fill(loaded, time, &mut ctx).await)
    }
}

impl std::fmt::Debug for PlaybackEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackEngine")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}
