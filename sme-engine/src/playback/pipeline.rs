//! Decode pipeline
//!
//! Drives packets from the demuxer through the decoder and places the output
//! either straight into the sink (a unit that is already due while playing)
//! or into the output buffer. Work per call is bounded by a frame quota and
//! by the lookahead horizon.
//!
//! **Supersede:** every pass captures the generation counter when it starts
//! and checks it after each await point. A seek bumps the counter, so a pass
//! that was overtaken drops whatever it decoded and returns
//! [`PassOutcome::Superseded`].

use crate::error::Result;
use crate::media::{
    BufferedUnit, DecodeOutcome, DecodedUnit, Decoder, DecoderState, EncodedPacket, MediaSource,
    OutputSink, TrackDescriptor,
};
use crate::playback::events::EventEmitter;
use crate::playback::perf::{Counter, PerfRecorder, Phase};
use crate::playback::state::Loaded;
use sme_common::time::{approx_eq, TIME_EPSILON};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Shared seek generation counter
#[derive(Debug, Clone, Default)]
pub struct SupersedeSignal(Arc<AtomicU64>);

impl SupersedeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Invalidate in-flight passes; returns the new generation
    pub fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// Holds an in-flight flag for the lifetime of a pass
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// What the sink last received
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Delivered {
    #[default]
    Nothing,
    Unit { timestamp: f64, end: f64 },
    /// `None` was delivered
    Gap,
}

impl Delivered {
    pub fn for_unit(unit: &BufferedUnit) -> Self {
        Delivered::Unit {
            timestamp: unit.timestamp,
            end: unit.end(),
        }
    }

    pub fn is_unit(&self, timestamp: f64) -> bool {
        matches!(self, Delivered::Unit { timestamp: ts, .. } if approx_eq(*ts, timestamp))
    }

    /// Whether the last delivered unit is still current at `time`
    pub fn covers(&self, time: f64) -> bool {
        match self {
            Delivered::Unit { timestamp, end } => {
                time >= timestamp - TIME_EPSILON && time < end - TIME_EPSILON
            }
            _ => false,
        }
    }
}

/// Direct-to-sink path, present only while playing with a sink attached
pub struct LiveDelivery<'a> {
    /// Presentation time sampled at the start of the tick
    pub now: f64,
    pub sink: &'a mut dyn OutputSink,
    pub delivered: &'a mut Delivered,
}

/// Per-call collaborators of a pass
pub struct PassContext<'a> {
    pub perf: &'a mut PerfRecorder,
    pub events: &'a EventEmitter,
    pub live: Option<LiveDelivery<'a>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Decoded up to the lookahead horizon
    HorizonReached,
    /// Frame quota used up before the horizon
    QuotaExhausted,
    EndOfStream,
    /// Buffer at capacity; continuing would evict current units
    BufferFull,
    /// Decoder reported it was not ready
    NotReady,
    /// Another pass of the same kind was in flight
    Busy,
    /// A seek overtook this pass; its output was dropped
    Superseded,
    /// The demuxer failed to produce a packet
    DemuxFailed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassReport {
    pub decoded: usize,
    pub buffered: usize,
    pub delivered_live: usize,
    pub discarded: usize,
    pub faults: usize,
    pub outcome: PassOutcome,
}

impl PassReport {
    fn new(outcome: PassOutcome) -> Self {
        Self {
            decoded: 0,
            buffered: 0,
            delivered_live: 0,
            discarded: 0,
            faults: 0,
            outcome,
        }
    }
}

/// Bounds of one decode run
struct RunLimits {
    horizon: f64,
    quota: usize,
    /// Output ending at or before this time is dropped
    discard_before: Option<f64>,
    /// Presentation target of the pass; keyframe recovery discards up to it
    target: f64,
}

/// Result of handling one decoder outcome
enum Step {
    /// Move on to the packet after the current one
    Advance,
    /// Resubmit from this packet (keyframe recovery)
    Jump(EncodedPacket),
    Stop(PassOutcome),
}

pub struct DecodePipeline {
    lookahead: f64,
    frames_per_pass: usize,
    seek_budget: usize,
    generation: SupersedeSignal,
    buffering: AtomicBool,
    seeking: AtomicBool,
}

impl DecodePipeline {
    pub fn new(
        lookahead: f64,
        frames_per_pass: usize,
        seek_budget: usize,
        generation: SupersedeSignal,
    ) -> Self {
        Self {
            lookahead,
            frames_per_pass: frames_per_pass.max(1),
            seek_budget: seek_budget.max(1),
            generation,
            buffering: AtomicBool::new(false),
            seeking: AtomicBool::new(false),
        }
    }

    pub fn generation(&self) -> &SupersedeSignal {
        &self.generation
    }

    pub fn is_buffering(&self) -> bool {
        self.buffering.load(Ordering::Acquire)
    }

    pub fn is_seeking(&self) -> bool {
        self.seeking.load(Ordering::Acquire)
    }

    fn horizon(&self, loaded: &Loaded, from: f64) -> f64 {
        let duration = loaded.duration();
        let horizon = from + self.lookahead;
        if duration > 0.0 {
            horizon.min(duration)
        } else {
            horizon
        }
    }

    /// Decode ahead of `target` until the lookahead horizon, the frame quota,
    /// or the end of the stream.
    pub async fn buffer_ahead(
        &self,
        loaded: &mut Loaded,
        target: f64,
        ctx: &mut PassContext<'_>,
    ) -> PassReport {
        let Some(_guard) = InFlight::try_acquire(&self.buffering) else {
            debug!("Buffer-ahead already in flight");
            return PassReport::new(PassOutcome::Busy);
        };
        let generation = self.generation.current();
        let horizon = self.horizon(loaded, target);

        // Resume where decoding left off unless playback has overtaken it.
        // A keyframe recovery keeps decoding forward toward `target` instead
        // of restarting from it, dropping output that is already late.
        let mut discard_before = None;
        let from = match loaded.cursor {
            Some(cursor) if cursor + TIME_EPSILON >= target => {
                loaded.catching_up = false;
                cursor
            }
            Some(cursor) if loaded.catching_up && loaded.last_packet.is_some() => {
                discard_before = Some(target);
                cursor
            }
            _ => {
                loaded.reset_cursor();
                target
            }
        };
        if from >= horizon - TIME_EPSILON {
            return PassReport::new(PassOutcome::HorizonReached);
        }
        if loaded.buffer.is_full() {
            return PassReport::new(PassOutcome::BufferFull);
        }

        let first = match loaded.last_packet.clone() {
            Some(prev) => self.fetch_next(loaded, &prev, ctx.perf).await,
            None => self.fetch_at(loaded, from, ctx.perf).await,
        };
        if self.generation.current() != generation {
            ctx.perf.count(Counter::StaleDrop);
            return PassReport::new(PassOutcome::Superseded);
        }

        let mut report = PassReport::new(PassOutcome::EndOfStream);
        match first {
            Ok(Some(packet)) => {
                let limits = RunLimits {
                    horizon,
                    quota: self.frames_per_pass,
                    discard_before,
                    target,
                };
                let outcome = self
                    .decode_run(loaded, packet, limits, generation, ctx, &mut report)
                    .await;
                report.outcome = outcome;
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Demux failed at {:.3}s: {}", from, e);
                report.outcome = PassOutcome::DemuxFailed;
            }
        }

        debug!(
            target,
            horizon,
            decoded = report.decoded,
            buffered = report.buffered,
            live = report.delivered_live,
            outcome = ?report.outcome,
            "Buffer-ahead pass"
        );
        report
    }

    /// Refill after a seek: reset the decoder, restart from the keyframe at
    /// or before `time`, and discard pre-roll output that ends before `time`.
    pub async fn seek_fill(
        &self,
        loaded: &mut Loaded,
        time: f64,
        ctx: &mut PassContext<'_>,
    ) -> PassReport {
        let Some(_guard) = InFlight::try_acquire(&self.seeking) else {
            debug!("Seek already in flight");
            return PassReport::new(PassOutcome::Busy);
        };
        let generation = self.generation.bump();

        loaded.buffer.clear();
        loaded.reset_cursor();

        if let Err(e) = reconfigure(loaded.decoder.as_mut(), &loaded.track).await {
            warn!("Decoder reconfigure failed during seek: {}", e);
            ctx.perf.count(Counter::DecodeFault);
            let mut report = PassReport::new(PassOutcome::NotReady);
            report.faults = 1;
            return report;
        }
        if self.generation.current() != generation {
            ctx.perf.count(Counter::StaleDrop);
            return PassReport::new(PassOutcome::Superseded);
        }

        let started = Instant::now();
        let key = match loaded.demuxer.key_packet_at(time).await {
            Ok(None) => loaded.demuxer.first_packet().await,
            other => other,
        };
        ctx.perf.record(Phase::Demux, started.elapsed());
        if self.generation.current() != generation {
            ctx.perf.count(Counter::StaleDrop);
            return PassReport::new(PassOutcome::Superseded);
        }

        let mut report = PassReport::new(PassOutcome::EndOfStream);
        match key {
            Ok(Some(packet)) => {
                let limits = RunLimits {
                    horizon: self.horizon(loaded, time),
                    quota: self.seek_budget,
                    discard_before: Some(time),
                    target: time,
                };
                let outcome = self
                    .decode_run(loaded, packet, limits, generation, ctx, &mut report)
                    .await;
                report.outcome = outcome;
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Demux failed seeking to {:.3}s: {}", time, e);
                report.outcome = PassOutcome::DemuxFailed;
            }
        }

        debug!(
            time,
            decoded = report.decoded,
            buffered = report.buffered,
            discarded = report.discarded,
            outcome = ?report.outcome,
            "Seek fill"
        );
        report
    }

    /// Reuse `preserved` when it is open and bound to an identical config;
    /// otherwise close it and create a decoder from `source`.
    pub async fn acquire_decoder(
        preserved: Option<Box<dyn Decoder>>,
        source: &dyn MediaSource,
        track: &TrackDescriptor,
    ) -> Result<Box<dyn Decoder>> {
        if let Some(mut decoder) = preserved {
            if decoder.state() != DecoderState::Closed && decoder.config() == &track.config {
                match reconfigure(decoder.as_mut(), track).await {
                    Ok(()) => {
                        info!("Reusing decoder for {}", track.codec);
                        return Ok(decoder);
                    }
                    Err(e) => {
                        warn!("Preserved decoder could not be reconfigured: {}", e);
                        decoder.close();
                    }
                }
            } else {
                debug!(
                    "Closing preserved {} decoder (new track is {})",
                    decoder.config().codec(),
                    track.codec
                );
                decoder.close();
            }
        }

        let mut decoder = source.create_decoder(track)?;
        if !decoder.is_ready() {
            decoder.configure(&track.config).await?;
        }
        debug!("Created decoder for {}", track.codec);
        Ok(decoder)
    }

    async fn decode_run(
        &self,
        loaded: &mut Loaded,
        first: EncodedPacket,
        limits: RunLimits,
        generation: u64,
        ctx: &mut PassContext<'_>,
        report: &mut PassReport,
    ) -> PassOutcome {
        let RunLimits {
            horizon,
            quota,
            mut discard_before,
            target,
        } = limits;
        let mut packet = first;
        let mut recovering: Option<u64> = None;
        let mut attempts = 0;

        loop {
            if packet.timestamp >= horizon - TIME_EPSILON {
                return PassOutcome::HorizonReached;
            }
            if attempts >= quota {
                return PassOutcome::QuotaExhausted;
            }
            if loaded.buffer.is_full() {
                return PassOutcome::BufferFull;
            }
            attempts += 1;

            let started = Instant::now();
            let outcome = loaded.decoder.decode(&packet).await;
            ctx.perf.record(Phase::Decode, started.elapsed());
            if self.generation.current() != generation {
                ctx.perf.count(Counter::StaleDrop);
                return PassOutcome::Superseded;
            }

            let step = match outcome {
                Ok(DecodeOutcome::Frame(unit)) => {
                    report.decoded += 1;
                    self.place(loaded, unit, discard_before, ctx, report);
                    Step::Advance
                }
                Ok(DecodeOutcome::Pending) => Step::Advance,
                Ok(DecodeOutcome::Skipped) => {
                    warn!("Decoder not ready at {:.3}s; abandoning pass", packet.timestamp);
                    ctx.perf.count(Counter::SkippedPass);
                    Step::Stop(PassOutcome::NotReady)
                }
                Ok(DecodeOutcome::NeedsKeyframe) if recovering == Some(packet.sequence) => {
                    warn!(
                        "Packet at {:.3}s still needs a keyframe after recovery; skipping",
                        packet.timestamp
                    );
                    ctx.perf.count(Counter::DecodeFault);
                    report.faults += 1;
                    Step::Advance
                }
                Ok(DecodeOutcome::NeedsKeyframe) => {
                    recovering = Some(packet.sequence);
                    ctx.perf.count(Counter::KeyframeRecovery);
                    let started = Instant::now();
                    let key = loaded.demuxer.key_packet_at(packet.timestamp).await;
                    ctx.perf.record(Phase::Demux, started.elapsed());
                    if self.generation.current() != generation {
                        ctx.perf.count(Counter::StaleDrop);
                        return PassOutcome::Superseded;
                    }
                    match key {
                        Ok(Some(key)) => {
                            debug!(
                                "Recovering from keyframe at {:.3}s (failed at {:.3}s)",
                                key.timestamp, packet.timestamp
                            );
                            // Output between the keyframe and the target is late
                            let cutoff = discard_before.map_or(target, |d| d.max(target));
                            discard_before = Some(cutoff);
                            loaded.catching_up = true;
                            Step::Jump(key)
                        }
                        Ok(None) => Step::Advance,
                        Err(e) => {
                            warn!("Keyframe lookup failed at {:.3}s: {}", packet.timestamp, e);
                            Step::Stop(PassOutcome::DemuxFailed)
                        }
                    }
                }
                Err(e) => {
                    warn!("Decode error at {:.3}s: {}", packet.timestamp, e);
                    ctx.perf.count(Counter::DecodeFault);
                    ctx.events.decode_error(packet.timestamp, e.to_string());
                    report.faults += 1;
                    Step::Advance
                }
            };

            match step {
                Step::Stop(outcome) => return outcome,
                Step::Jump(key) => {
                    packet = key;
                    continue;
                }
                Step::Advance => {}
            }

            let prev = packet;
            let end = prev.end();
            loaded.cursor = Some(loaded.cursor.map_or(end, |c| c.max(end)));
            loaded.last_packet = Some(prev.clone());

            let next = self.fetch_next(loaded, &prev, ctx.perf).await;
            if self.generation.current() != generation {
                ctx.perf.count(Counter::StaleDrop);
                return PassOutcome::Superseded;
            }
            packet = match next {
                Ok(Some(next)) => next,
                Ok(None) => return PassOutcome::EndOfStream,
                Err(e) => {
                    warn!("Demux failed after {:.3}s: {}", prev.timestamp, e);
                    return PassOutcome::DemuxFailed;
                }
            };
        }
    }

    /// Hand one decoded unit to exactly one consumer: the sink when it is
    /// already due during playback, the buffer otherwise.
    fn place(
        &self,
        loaded: &mut Loaded,
        unit: DecodedUnit,
        discard_before: Option<f64>,
        ctx: &mut PassContext<'_>,
        report: &mut PassReport,
    ) {
        if let Some(cutoff) = discard_before {
            if unit.timestamp + unit.duration <= cutoff + TIME_EPSILON {
                ctx.perf.count(Counter::PrerollDiscard);
                report.discarded += 1;
                return;
            }
        }

        let started = Instant::now();
        let buffered = match BufferedUnit::from_decoded(&unit) {
            Ok(buffered) => buffered,
            Err(e) => {
                warn!("Dropping unusable output at {:.3}s: {}", unit.timestamp, e);
                ctx.perf.count(Counter::DecodeFault);
                ctx.events.decode_error(unit.timestamp, e.to_string());
                report.faults += 1;
                return;
            }
        };
        drop(unit);

        if let Some(live) = ctx.live.as_mut() {
            if buffered.contains(live.now) && !live.delivered.is_unit(buffered.timestamp) {
                live.sink.deliver(Some(&buffered));
                *live.delivered = Delivered::for_unit(&buffered);
                ctx.perf.count(Counter::LiveDelivery);
                ctx.perf.record(Phase::Transfer, started.elapsed());
                report.delivered_live += 1;
                return;
            }
        }

        if loaded.buffer.insert(buffered) {
            ctx.perf.count(Counter::BufferedUnit);
            report.buffered += 1;
        }
        ctx.perf.record(Phase::Transfer, started.elapsed());
    }

    async fn fetch_at(
        &self,
        loaded: &mut Loaded,
        time: f64,
        perf: &mut PerfRecorder,
    ) -> Result<Option<EncodedPacket>> {
        let started = Instant::now();
        let mut packet = loaded.demuxer.packet_at(time).await;
        // Nothing at the cursor on a fresh start: begin from the first packet
        if matches!(packet, Ok(None)) && loaded.buffer.is_empty() && time < loaded.duration() {
            packet = loaded.demuxer.first_packet().await;
        }
        perf.record(Phase::Demux, started.elapsed());
        packet
    }

    async fn fetch_next(
        &self,
        loaded: &mut Loaded,
        prev: &EncodedPacket,
        perf: &mut PerfRecorder,
    ) -> Result<Option<EncodedPacket>> {
        let started = Instant::now();
        let packet = loaded.demuxer.next_packet(prev).await;
        perf.record(Phase::Demux, started.elapsed());
        packet
    }
}

/// Reset and re-bind a decoder to the track's config
async fn reconfigure(decoder: &mut dyn Decoder, track: &TrackDescriptor) -> Result<()> {
    decoder.reset().await?;
    decoder.configure(&track.config).await
}
