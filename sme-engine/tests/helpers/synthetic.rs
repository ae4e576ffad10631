//! Synthetic media backend
//!
//! A fully scripted container: fixed-duration packets, a keyframe every
//! `keyframe_interval` packets, and decoders that behave like stateful codecs
//! (a non-key packet after a discontinuity needs a keyframe). Every decoder
//! operation lands in a shared [`OpLog`] so tests can assert ordering.

use async_trait::async_trait;
use sme_common::events::TrackKind;
use sme_engine::error::{Error, Result};
use sme_engine::media::{
    AudioFrame, DecodeOutcome, DecodedPayload, DecodedUnit, Decoder, DecoderConfig, DecoderState,
    Demuxer, EncodedPacket, MediaBackend, MediaInput, MediaSource, PixelFormat, SampleData,
    TrackDescriptor, VideoFrame,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Audio rate used by synthetic tracks (10 samples per 0.1 s packet)
pub const SYNTH_SAMPLE_RATE: u32 = 100;

/// Shape of the single track a synthetic source exposes
#[derive(Debug, Clone)]
pub struct SyntheticTrack {
    pub kind: TrackKind,
    pub duration: f64,
    pub packet_duration: f64,
    pub keyframe_interval: u64,
    pub codec: String,
}

impl SyntheticTrack {
    /// 10 s audio track, 0.1 s packets, keyframe every second
    pub fn audio() -> Self {
        Self {
            kind: TrackKind::Audio,
            duration: 10.0,
            packet_duration: 0.1,
            keyframe_interval: 10,
            codec: "synth-pcm".to_string(),
        }
    }

    /// 10 s video track, 0.1 s pictures, keyframe every second
    pub fn video() -> Self {
        Self {
            kind: TrackKind::Video,
            codec: "synth-video".to_string(),
            ..Self::audio()
        }
    }

    pub fn with_codec(mut self, codec: &str) -> Self {
        self.codec = codec.to_string();
        self
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_keyframe_interval(mut self, interval: u64) -> Self {
        self.keyframe_interval = interval;
        self
    }

    pub fn config(&self) -> DecoderConfig {
        match self.kind {
            TrackKind::Audio => DecoderConfig::Audio {
                codec: self.codec.clone(),
                sample_rate: SYNTH_SAMPLE_RATE,
                channels: 1,
                description: None,
            },
            TrackKind::Video => DecoderConfig::Video {
                codec: self.codec.clone(),
                width: 2,
                height: 2,
                description: None,
            },
        }
    }

    fn descriptor(&self) -> TrackDescriptor {
        TrackDescriptor {
            id: 1,
            kind: self.kind,
            codec: self.codec.clone(),
            config: self.config(),
            duration: self.duration,
        }
    }

    fn packet_count(&self) -> u64 {
        (self.duration / self.packet_duration - 1e-6).ceil().max(0.0) as u64
    }

    fn packet(&self, sequence: u64) -> Option<EncodedPacket> {
        if sequence >= self.packet_count() {
            return None;
        }
        let timestamp = sequence as f64 * self.packet_duration;
        Some(EncodedPacket {
            timestamp,
            duration: self.packet_duration.min(self.duration - timestamp),
            is_keyframe: sequence % self.keyframe_interval == 0,
            sequence,
            data: vec![(sequence % 256) as u8],
        })
    }

    fn index_at(&self, time: f64) -> u64 {
        (time.max(0.0) / self.packet_duration + 1e-6).floor() as u64
    }
}

/// Ordered record of decoder operations ("create#1", "reset#1", "close#1", ...)
#[derive(Debug, Clone, Default)]
pub struct OpLog(Arc<Mutex<Vec<String>>>);

impl OpLog {
    fn push(&self, op: &str, decoder: u64) {
        self.0.lock().unwrap().push(format!("{}#{}", op, decoder));
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Entries of one operation kind, e.g. `"create"`
    pub fn of(&self, op: &str) -> Vec<String> {
        let prefix = format!("{}#", op);
        self.entries()
            .into_iter()
            .filter(|entry| entry.starts_with(&prefix))
            .collect()
    }

    /// Position of an entry, panicking when it is missing
    pub fn position(&self, entry: &str) -> usize {
        let entries = self.entries();
        entries
            .iter()
            .position(|e| e == entry)
            .unwrap_or_else(|| panic!("{} not in op log {:?}", entry, entries))
    }
}

/// Knobs shared by the backend and every source/decoder it hands out
#[derive(Debug, Default)]
pub struct Controls {
    /// Upcoming decode calls that report `Skipped`
    pub skip_next: AtomicUsize,
    /// Packet sequences whose decode fails
    pub corrupt: Mutex<HashSet<u64>>,
    /// Packet sequences whose next decode fails, once
    pub corrupt_once: Mutex<HashSet<u64>>,
    /// Simulated decode latency in milliseconds
    pub decode_delay_ms: AtomicU64,
    /// Packets submitted to any decoder
    pub decode_calls: AtomicUsize,
}

/// Backend that serves [`SyntheticTrack`]s
#[derive(Clone)]
pub struct SyntheticBackend {
    track: Arc<Mutex<Option<SyntheticTrack>>>,
    pub log: OpLog,
    pub controls: Arc<Controls>,
    next_decoder: Arc<AtomicU64>,
}

impl SyntheticBackend {
    pub fn new(track: SyntheticTrack) -> Self {
        Self {
            track: Arc::new(Mutex::new(Some(track))),
            log: OpLog::default(),
            controls: Arc::new(Controls::default()),
            next_decoder: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Sources opened from now on expose `track` (`None`: no tracks at all)
    pub fn set_track(&self, track: Option<SyntheticTrack>) {
        *self.track.lock().unwrap() = track;
    }

    pub fn corrupt(&self, sequence: u64) {
        self.controls.corrupt.lock().unwrap().insert(sequence);
    }

    pub fn corrupt_once(&self, sequence: u64) {
        self.controls.corrupt_once.lock().unwrap().insert(sequence);
    }

    pub fn skip_next(&self, count: usize) {
        self.controls.skip_next.store(count, Ordering::SeqCst);
    }

    pub fn set_decode_delay(&self, delay: Duration) {
        self.controls
            .decode_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn decode_calls(&self) -> usize {
        self.controls.decode_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaBackend for SyntheticBackend {
    async fn open(&self, input: &MediaInput) -> Result<Box<dyn MediaSource>> {
        if let MediaInput::File(path) = input {
            if path.to_string_lossy().contains("missing") {
                return Err(Error::Source(format!("{} not found", path.display())));
            }
        }
        let track = self.track.lock().unwrap().clone();
        Ok(Box::new(SyntheticSource {
            tracks: track.iter().map(SyntheticTrack::descriptor).collect(),
            track,
            log: self.log.clone(),
            controls: self.controls.clone(),
            next_decoder: self.next_decoder.clone(),
        }))
    }
}

struct SyntheticSource {
    track: Option<SyntheticTrack>,
    tracks: Vec<TrackDescriptor>,
    log: OpLog,
    controls: Arc<Controls>,
    next_decoder: Arc<AtomicU64>,
}

impl MediaSource for SyntheticSource {
    fn tracks(&self) -> &[TrackDescriptor] {
        &self.tracks
    }

    fn demuxer(&mut self, track_id: u32) -> Result<Box<dyn Demuxer>> {
        match &self.track {
            Some(track) if track_id == 1 => Ok(Box::new(SyntheticDemuxer {
                track: track.clone(),
            })),
            _ => Err(Error::Demux(format!("no track {}", track_id))),
        }
    }

    fn create_decoder(&self, track: &TrackDescriptor) -> Result<Box<dyn Decoder>> {
        if track.codec == "unsupported" {
            return Err(Error::DecoderConfig(format!("{} is not supported", track.codec)));
        }
        let id = self.next_decoder.fetch_add(1, Ordering::SeqCst);
        self.log.push("create", id);
        Ok(Box::new(SyntheticDecoder {
            id,
            config: track.config.clone(),
            state: DecoderState::Configured,
            last_sequence: None,
            log: self.log.clone(),
            controls: self.controls.clone(),
        }))
    }

    fn close(&mut self) {}
}

struct SyntheticDemuxer {
    track: SyntheticTrack,
}

#[async_trait]
impl Demuxer for SyntheticDemuxer {
    async fn packet_at(&mut self, time: f64) -> Result<Option<EncodedPacket>> {
        if time >= self.track.duration {
            return Ok(None);
        }
        Ok(self.track.packet(self.track.index_at(time)))
    }

    async fn first_packet(&mut self) -> Result<Option<EncodedPacket>> {
        Ok(self.track.packet(0))
    }

    async fn next_packet(&mut self, prev: &EncodedPacket) -> Result<Option<EncodedPacket>> {
        Ok(self.track.packet(prev.sequence + 1))
    }

    async fn key_packet_at(&mut self, time: f64) -> Result<Option<EncodedPacket>> {
        let count = self.track.packet_count();
        if count == 0 {
            return Ok(None);
        }
        let index = self.track.index_at(time).min(count - 1);
        Ok(self.track.packet(index - index % self.track.keyframe_interval))
    }
}

struct SyntheticDecoder {
    id: u64,
    config: DecoderConfig,
    state: DecoderState,
    last_sequence: Option<u64>,
    log: OpLog,
    controls: Arc<Controls>,
}

impl SyntheticDecoder {
    fn output(&self, packet: &EncodedPacket) -> DecodedUnit {
        let payload = match &self.config {
            DecoderConfig::Audio { sample_rate, .. } => {
                let frames = (packet.duration * *sample_rate as f64).round() as usize;
                DecodedPayload::Audio(AudioFrame {
                    sample_rate: *sample_rate,
                    channels: 1,
                    samples: SampleData::F32Interleaved(vec![packet.timestamp as f32; frames]),
                })
            }
            DecoderConfig::Video { width, height, .. } => DecodedPayload::Video(VideoFrame {
                width: *width,
                height: *height,
                format: PixelFormat::Rgba8,
                data: vec![packet.data[0]; PixelFormat::Rgba8.frame_size(*width, *height)],
            }),
        };
        DecodedUnit {
            timestamp: packet.timestamp,
            duration: packet.duration,
            payload,
        }
    }
}

#[async_trait]
impl Decoder for SyntheticDecoder {
    fn config(&self) -> &DecoderConfig {
        &self.config
    }

    fn state(&self) -> DecoderState {
        self.state
    }

    async fn configure(&mut self, config: &DecoderConfig) -> Result<()> {
        if config != &self.config {
            return Err(Error::DecoderConfig("config mismatch".to_string()));
        }
        self.log.push("configure", self.id);
        self.state = DecoderState::Configured;
        Ok(())
    }

    async fn decode(&mut self, packet: &EncodedPacket) -> Result<DecodeOutcome> {
        self.controls.decode_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.controls.decode_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.state != DecoderState::Configured {
            return Ok(DecodeOutcome::Skipped);
        }
        let skip = self
            .controls
            .skip_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if skip.is_ok() {
            return Ok(DecodeOutcome::Skipped);
        }

        let continues = self.last_sequence.map(|s| s + 1) == Some(packet.sequence);
        if !packet.is_keyframe && !continues {
            return Ok(DecodeOutcome::NeedsKeyframe);
        }
        self.last_sequence = Some(packet.sequence);

        let fails_once = self.controls.corrupt_once.lock().unwrap().remove(&packet.sequence);
        if fails_once || self.controls.corrupt.lock().unwrap().contains(&packet.sequence) {
            return Err(Error::Decode(format!("corrupt packet {}", packet.sequence)));
        }
        Ok(DecodeOutcome::Frame(self.output(packet)))
    }

    async fn reset(&mut self) -> Result<()> {
        self.log.push("reset", self.id);
        self.last_sequence = None;
        self.state = DecoderState::Unconfigured;
        Ok(())
    }

    fn close(&mut self) {
        self.log.push("close", self.id);
        self.state = DecoderState::Closed;
    }
}
