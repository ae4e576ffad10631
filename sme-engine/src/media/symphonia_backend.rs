//! Audio collaborator backed by symphonia
//!
//! Opens files or in-memory containers, exposes their audio tracks, and
//! decodes packets to interleaved f32. Every symphonia packet decodes
//! independently for the formats enabled here, so all packets are reported
//! as keyframes; a decoder that asks for a reset mid-stream is surfaced as
//! `DecodeOutcome::NeedsKeyframe`.

use super::traits::{DecodeOutcome, Decoder, DecoderState, Demuxer, MediaBackend, MediaSource};
use super::types::{
    AudioFrame, DecodedPayload, DecodedUnit, DecoderConfig, EncodedPacket, MediaInput, SampleData,
    TrackDescriptor,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use sme_common::events::TrackKind;
use std::collections::HashMap;
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet, SeekMode, SeekTo};
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};
use tracing::{debug, warn};

/// [`MediaBackend`] using symphonia's default format and codec registries
#[derive(Debug, Clone, Default)]
pub struct SymphoniaBackend;

impl SymphoniaBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaBackend for SymphoniaBackend {
    async fn open(&self, input: &MediaInput) -> Result<Box<dyn MediaSource>> {
        let input = input.clone();
        // Probing reads the container header; keep it off the engine task
        let source = tokio::task::spawn_blocking(move || SymphoniaSource::open(&input))
            .await
            .map_err(|e| Error::Internal(format!("probe task failed: {}", e)))??;
        Ok(Box::new(source))
    }
}

/// Probed container
pub struct SymphoniaSource {
    reader: Option<Box<dyn FormatReader>>,
    tracks: Vec<TrackDescriptor>,
    params: HashMap<u32, CodecParameters>,
}

impl SymphoniaSource {
    fn open(input: &MediaInput) -> Result<Self> {
        let stream: Box<dyn symphonia::core::io::MediaSource> = match input {
            MediaInput::File(path) => Box::new(std::fs::File::open(path)?),
            MediaInput::Memory { data, .. } => Box::new(Cursor::new(data.clone())),
        };
        let mss = MediaSourceStream::new(stream, MediaSourceStreamOptions::default());

        let mut hint = Hint::new();
        if let Some(ext) = input.extension() {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| Error::Source(format!("failed to probe {}: {}", input, e)))?;

        let reader = probed.format;
        let mut tracks = Vec::new();
        let mut params = HashMap::new();

        for track in reader.tracks() {
            let codec_params = &track.codec_params;
            if codec_params.codec == CODEC_TYPE_NULL {
                continue;
            }

            let codec = symphonia::default::get_codecs()
                .get_codec(codec_params.codec)
                .map(|d| d.short_name.to_string())
                .unwrap_or_else(|| format!("{:?}", codec_params.codec));

            let duration = match (codec_params.n_frames, track_time_base(codec_params)) {
                (Some(frames), Some(tb)) => time_to_secs(tb.calc_time(frames)),
                _ => 0.0,
            };

            let config = DecoderConfig::Audio {
                codec: codec.clone(),
                sample_rate: codec_params.sample_rate.unwrap_or(0),
                channels: codec_params.channels.map(|c| c.count() as u16).unwrap_or(0),
                description: codec_params.extra_data.as_ref().map(|d| d.to_vec()),
            };

            debug!(
                track_id = track.id,
                codec = %codec,
                duration,
                "Found audio track"
            );

            tracks.push(TrackDescriptor {
                id: track.id,
                kind: TrackKind::Audio,
                codec,
                config,
                duration,
            });
            params.insert(track.id, codec_params.clone());
        }

        Ok(Self {
            reader: Some(reader),
            tracks,
            params,
        })
    }
}

impl MediaSource for SymphoniaSource {
    fn tracks(&self) -> &[TrackDescriptor] {
        &self.tracks
    }

    fn demuxer(&mut self, track_id: u32) -> Result<Box<dyn Demuxer>> {
        let time_base = self
            .params
            .get(&track_id)
            .and_then(track_time_base)
            .ok_or_else(|| Error::Demux(format!("track {} has no time base", track_id)))?;
        let reader = self
            .reader
            .take()
            .ok_or_else(|| Error::Demux("container reader already in use".to_string()))?;

        Ok(Box::new(SymphoniaDemuxer {
            reader,
            track_id,
            time_base,
            last_ts: None,
        }))
    }

    fn create_decoder(&self, track: &TrackDescriptor) -> Result<Box<dyn Decoder>> {
        let params = self
            .params
            .get(&track.id)
            .ok_or_else(|| Error::DecoderConfig(format!("unknown track {}", track.id)))?;
        let time_base = track_time_base(params).ok_or_else(|| {
            Error::DecoderConfig(format!("track {} has no time base", track.id))
        })?;
        let inner = make_decoder(params)?;

        Ok(Box::new(SymphoniaDecoder {
            inner: Some(inner),
            params: params.clone(),
            config: track.config.clone(),
            track_id: track.id,
            time_base,
            state: DecoderState::Configured,
        }))
    }

    fn close(&mut self) {
        self.reader = None;
        debug!("Closed symphonia source");
    }
}

/// Packet reader over a symphonia `FormatReader`.
///
/// Reads are synchronous and small; they run inline on the engine task.
pub struct SymphoniaDemuxer {
    reader: Box<dyn FormatReader>,
    track_id: u32,
    time_base: TimeBase,
    /// Raw timestamp of the last packet read (reader position)
    last_ts: Option<u64>,
}

impl SymphoniaDemuxer {
    fn read_track_packet(&mut self) -> Result<Option<EncodedPacket>> {
        loop {
            match self.reader.next_packet() {
                Ok(packet) if packet.track_id() != self.track_id => continue,
                Ok(packet) => {
                    self.last_ts = Some(packet.ts());
                    return Ok(Some(EncodedPacket {
                        timestamp: time_to_secs(self.time_base.calc_time(packet.ts())),
                        duration: time_to_secs(self.time_base.calc_time(packet.dur())),
                        is_keyframe: true,
                        sequence: packet.ts(),
                        data: packet.buf().to_vec(),
                    }));
                }
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    self.last_ts = None;
                    return Ok(None);
                }
                Err(e) => return Err(Error::Demux(e.to_string())),
            }
        }
    }

    /// Position the reader at or before `to`; `false` when out of range
    fn seek(&mut self, to: SeekTo) -> Result<bool> {
        self.last_ts = None;
        match self.reader.seek(SeekMode::Accurate, to) {
            Ok(seeked) => {
                debug!(
                    required_ts = seeked.required_ts,
                    actual_ts = seeked.actual_ts,
                    "Demuxer seeked"
                );
                Ok(true)
            }
            Err(SymphoniaError::SeekError(kind)) => {
                debug!("Seek rejected: {:?}", kind);
                Ok(false)
            }
            Err(e) => Err(Error::Demux(e.to_string())),
        }
    }

    fn seek_time(&mut self, time: f64) -> Result<bool> {
        self.seek(SeekTo::Time {
            time: Time::from(time.max(0.0)),
            track_id: Some(self.track_id),
        })
    }
}

#[async_trait]
impl Demuxer for SymphoniaDemuxer {
    async fn packet_at(&mut self, time: f64) -> Result<Option<EncodedPacket>> {
        if !self.seek_time(time)? {
            return Ok(None);
        }
        // Accurate seeks land at or before `time`; walk forward to the covering packet
        while let Some(packet) = self.read_track_packet()? {
            if packet.end() > time {
                return Ok(Some(packet));
            }
        }
        Ok(None)
    }

    async fn first_packet(&mut self) -> Result<Option<EncodedPacket>> {
        let rewound = self.seek(SeekTo::TimeStamp {
            ts: 0,
            track_id: self.track_id,
        })?;
        if !rewound {
            return Ok(None);
        }
        self.read_track_packet()
    }

    async fn next_packet(&mut self, prev: &EncodedPacket) -> Result<Option<EncodedPacket>> {
        if self.last_ts != Some(prev.sequence) {
            // Reader moved since `prev` was read; reposition past it
            return self.packet_at(prev.end()).await;
        }
        self.read_track_packet()
    }

    async fn key_packet_at(&mut self, time: f64) -> Result<Option<EncodedPacket>> {
        if !self.seek_time(time)? {
            return Ok(None);
        }
        self.read_track_packet()
    }
}

/// [`Decoder`] wrapping a symphonia codec
pub struct SymphoniaDecoder {
    inner: Option<Box<dyn symphonia::core::codecs::Decoder>>,
    params: CodecParameters,
    config: DecoderConfig,
    track_id: u32,
    time_base: TimeBase,
    state: DecoderState,
}

impl SymphoniaDecoder {
    /// Seconds to raw container ticks
    fn secs_to_ticks(&self, secs: f64) -> u64 {
        let ticks = secs * self.time_base.denom as f64 / self.time_base.numer.max(1) as f64;
        ticks.round().max(0.0) as u64
    }
}

#[async_trait]
impl Decoder for SymphoniaDecoder {
    fn config(&self) -> &DecoderConfig {
        &self.config
    }

    fn state(&self) -> DecoderState {
        self.state
    }

    async fn configure(&mut self, config: &DecoderConfig) -> Result<()> {
        if self.state == DecoderState::Closed {
            return Err(Error::DecoderConfig("decoder is closed".to_string()));
        }
        if config != &self.config {
            return Err(Error::DecoderConfig(format!(
                "decoder bound to {} cannot take {}",
                self.config.codec(),
                config.codec()
            )));
        }
        if self.inner.is_none() {
            self.inner = Some(make_decoder(&self.params)?);
        }
        self.state = DecoderState::Configured;
        Ok(())
    }

    async fn decode(&mut self, packet: &EncodedPacket) -> Result<DecodeOutcome> {
        if self.state != DecoderState::Configured {
            return Ok(DecodeOutcome::Skipped);
        }
        let raw = Packet::new_from_slice(
            self.track_id,
            packet.sequence,
            self.secs_to_ticks(packet.duration),
            &packet.data,
        );
        let Some(inner) = self.inner.as_mut() else {
            return Ok(DecodeOutcome::Skipped);
        };

        match inner.decode(&raw) {
            Ok(decoded) => {
                let frames = decoded.frames();
                if frames == 0 {
                    return Ok(DecodeOutcome::Pending);
                }
                let spec = *decoded.spec();
                let mut samples = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                samples.copy_interleaved_ref(decoded);

                return Ok(DecodeOutcome::Frame(DecodedUnit {
                    timestamp: packet.timestamp,
                    duration: frames as f64 / spec.rate.max(1) as f64,
                    payload: DecodedPayload::Audio(AudioFrame {
                        sample_rate: spec.rate,
                        channels: spec.channels.count() as u16,
                        samples: SampleData::F32Interleaved(samples.samples().to_vec()),
                    }),
                }))
            }
            Err(SymphoniaError::ResetRequired) => {}
            Err(e) => return Err(Error::Decode(e.to_string())),
        }

        warn!("Symphonia decoder requires reset at {:.3}s", packet.timestamp);
        inner.reset();
        Ok(DecodeOutcome::NeedsKeyframe)
    }

    async fn reset(&mut self) -> Result<()> {
        if self.state == DecoderState::Closed {
            return Err(Error::InvalidState("decoder is closed".to_string()));
        }
        if let Some(inner) = self.inner.as_mut() {
            inner.reset();
        }
        self.state = DecoderState::Unconfigured;
        Ok(())
    }

    fn close(&mut self) {
        self.inner = None;
        self.state = DecoderState::Closed;
    }
}

fn make_decoder(params: &CodecParameters) -> Result<Box<dyn symphonia::core::codecs::Decoder>> {
    symphonia::default::get_codecs()
        .make(params, &DecoderOptions::default())
        .map_err(|e| Error::DecoderConfig(e.to_string()))
}

fn track_time_base(params: &CodecParameters) -> Option<TimeBase> {
    params
        .time_base
        .or_else(|| params.sample_rate.map(|rate| TimeBase::new(1, rate)))
}

fn time_to_secs(time: Time) -> f64 {
    time.seconds as f64 + time.frac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_to_secs_includes_fraction() {
        let tb = TimeBase::new(1, 48_000);
        assert_eq!(time_to_secs(tb.calc_time(72_000)), 1.5);
    }

    #[test]
    fn test_time_base_falls_back_to_sample_rate() {
        let mut params = CodecParameters::new();
        params.with_sample_rate(44_100);
        let tb = track_time_base(&params).unwrap();
        assert_eq!(tb.denom, 44_100);
        assert_eq!(tb.numer, 1);
    }

    #[tokio::test]
    async fn test_garbage_input_is_source_error() {
        let backend = SymphoniaBackend::new();
        let input = MediaInput::Memory {
            data: std::sync::Arc::from(vec![0x42u8; 64]),
            extension: None,
        };
        assert!(matches!(backend.open(&input).await, Err(Error::Source(_))));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let backend = SymphoniaBackend::new();
        let input = MediaInput::File("/nonexistent/track.wav".into());
        assert!(matches!(backend.open(&input).await, Err(Error::Io(_))));
    }
}
