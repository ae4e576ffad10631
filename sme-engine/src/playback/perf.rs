//! Pipeline instrumentation
//!
//! Timing samples for the demux, decode and transfer phases plus counters for
//! the events the pipeline recovers from. Snapshots serialize to JSON for the
//! `--stats` dump.

use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;

/// Recent samples kept per phase for mean/p95
pub const PERF_WINDOW: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Fetching a packet from the demuxer
    Demux,
    /// Submitting a packet to the decoder
    Decode,
    /// Copying/normalizing output and handing it to the sink or buffer
    Transfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    DecodeFault,
    KeyframeRecovery,
    StaleDrop,
    SkippedPass,
    /// Units presented by the streaming tick
    DeliveredUnit,
    /// Units handed straight from the decoder to the sink
    LiveDelivery,
    BufferedUnit,
    /// Seek pre-roll output discarded
    PrerollDiscard,
}

/// Snapshot of one phase
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PhaseStats {
    pub samples: u64,
    pub total_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub last_ms: f64,
    /// Mean over the recent window
    pub mean_ms: f64,
    /// 95th percentile over the recent window
    pub p95_ms: f64,
}

/// Snapshot of all instrumentation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerfStats {
    pub demux: PhaseStats,
    pub decode: PhaseStats,
    pub transfer: PhaseStats,
    pub decode_faults: u64,
    pub keyframe_recoveries: u64,
    pub stale_drops: u64,
    pub skipped_passes: u64,
    pub delivered_units: u64,
    pub live_deliveries: u64,
    pub buffered_units: u64,
    pub preroll_discards: u64,
}

#[derive(Debug, Default)]
struct PhaseWindow {
    samples: u64,
    total_ms: f64,
    min_ms: f64,
    max_ms: f64,
    last_ms: f64,
    recent: VecDeque<f64>,
}

impl PhaseWindow {
    fn record(&mut self, ms: f64) {
        if self.samples == 0 || ms < self.min_ms {
            self.min_ms = ms;
        }
        if ms > self.max_ms {
            self.max_ms = ms;
        }
        self.samples += 1;
        self.total_ms += ms;
        self.last_ms = ms;

        if self.recent.len() == PERF_WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(ms);
    }

    fn stats(&self) -> PhaseStats {
        let (mean_ms, p95_ms) = if self.recent.is_empty() {
            (0.0, 0.0)
        } else {
            let mut sorted: Vec<f64> = self.recent.iter().copied().collect();
            sorted.sort_by(|a, b| a.total_cmp(b));
            let mean = sorted.iter().sum::<f64>() / sorted.len() as f64;
            let rank = ((sorted.len() as f64 * 0.95).ceil() as usize).clamp(1, sorted.len());
            (mean, sorted[rank - 1])
        };

        PhaseStats {
            samples: self.samples,
            total_ms: self.total_ms,
            min_ms: self.min_ms,
            max_ms: self.max_ms,
            last_ms: self.last_ms,
            mean_ms,
            p95_ms,
        }
    }
}

/// Accumulates phase timings and counters for one engine
#[derive(Debug, Default)]
pub struct PerfRecorder {
    demux: PhaseWindow,
    decode: PhaseWindow,
    transfer: PhaseWindow,
    counters: PerfStats,
}

impl PerfRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, phase: Phase, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        match phase {
            Phase::Demux => self.demux.record(ms),
            Phase::Decode => self.decode.record(ms),
            Phase::Transfer => self.transfer.record(ms),
        }
    }

    pub fn count(&mut self, counter: Counter) {
        let c = &mut self.counters;
        let slot = match counter {
            Counter::DecodeFault => &mut c.decode_faults,
            Counter::KeyframeRecovery => &mut c.keyframe_recoveries,
            Counter::StaleDrop => &mut c.stale_drops,
            Counter::SkippedPass => &mut c.skipped_passes,
            Counter::DeliveredUnit => &mut c.delivered_units,
            Counter::LiveDelivery => &mut c.live_deliveries,
            Counter::BufferedUnit => &mut c.buffered_units,
            Counter::PrerollDiscard => &mut c.preroll_discards,
        };
        *slot += 1;
    }

    pub fn stats(&self) -> PerfStats {
        PerfStats {
            demux: self.demux.stats(),
            decode: self.decode.stats(),
            transfer: self.transfer.stats(),
            ..self.counters.clone()
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
