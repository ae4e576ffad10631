//! Core media data types
//!
//! Defines the units that flow through the engine:
//! `EncodedPacket` (demuxer → decoder), `DecodedUnit` (decoder output, owned
//! by whichever consumer takes it) and `BufferedUnit` (a normalized copy that
//! is safe to hold in the output buffer and hand to sinks).

use crate::error::{Error, Result};
use serde::Serialize;
use sme_common::events::TrackKind;
use sme_common::time::TIME_EPSILON;
use std::path::PathBuf;
use std::sync::Arc;

/// What `load` opens
#[derive(Debug, Clone)]
pub enum MediaInput {
    /// A container file on disk
    File(PathBuf),

    /// A container already in memory; `extension` helps format probing
    Memory {
        data: Arc<[u8]>,
        extension: Option<String>,
    },
}

impl MediaInput {
    /// File-name extension used as a probing hint
    pub fn extension(&self) -> Option<&str> {
        match self {
            MediaInput::File(path) => path.extension().and_then(|e| e.to_str()),
            MediaInput::Memory { extension, .. } => extension.as_deref(),
        }
    }
}

impl std::fmt::Display for MediaInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaInput::File(path) => write!(f, "{}", path.display()),
            MediaInput::Memory { data, extension } => write!(
                f,
                "<memory: {} bytes{}>",
                data.len(),
                extension
                    .as_deref()
                    .map(|e| format!(", .{}", e))
                    .unwrap_or_default()
            ),
        }
    }
}

/// Configuration a decoder is bound to.
///
/// A decoder is only reused for a new track when the two configurations
/// compare equal, codec description bytes included.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DecoderConfig {
    Audio {
        codec: String,
        sample_rate: u32,
        channels: u16,
        description: Option<Vec<u8>>,
    },
    Video {
        codec: String,
        width: u32,
        height: u32,
        description: Option<Vec<u8>>,
    },
}

impl DecoderConfig {
    pub fn codec(&self) -> &str {
        match self {
            DecoderConfig::Audio { codec, .. } | DecoderConfig::Video { codec, .. } => codec,
        }
    }

    pub fn kind(&self) -> TrackKind {
        match self {
            DecoderConfig::Audio { .. } => TrackKind::Audio,
            DecoderConfig::Video { .. } => TrackKind::Video,
        }
    }
}

/// A track found in an opened source; immutable after load
#[derive(Debug, Clone)]
pub struct TrackDescriptor {
    /// Container-level track id (used to request a demuxer)
    pub id: u32,
    pub kind: TrackKind,
    pub codec: String,
    pub config: DecoderConfig,
    /// Total duration in seconds (0 when the container does not say)
    pub duration: f64,
}

impl TrackDescriptor {
    /// Caller-facing summary of this track
    pub fn info(&self) -> TrackInfo {
        let (sample_rate, channels, width, height) = match &self.config {
            DecoderConfig::Audio {
                sample_rate,
                channels,
                ..
            } => (Some(*sample_rate), Some(*channels), None, None),
            DecoderConfig::Video { width, height, .. } => {
                (None, None, Some(*width), Some(*height))
            }
        };
        TrackInfo {
            id: self.id,
            kind: self.kind,
            codec: self.codec.clone(),
            duration: self.duration,
            sample_rate,
            channels,
            width,
            height,
        }
    }
}

/// Track summary returned from `load`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackInfo {
    pub id: u32,
    pub kind: TrackKind,
    pub codec: String,
    pub duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// Result of `load`: `track` is `None` when no usable track was found
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadResult {
    pub duration: f64,
    pub track: Option<TrackInfo>,
}

impl LoadResult {
    /// The non-fatal "nothing to play" result
    pub fn empty() -> Self {
        Self {
            duration: 0.0,
            track: None,
        }
    }
}

/// One compressed unit of media data
#[derive(Debug, Clone)]
pub struct EncodedPacket {
    /// Presentation timestamp in seconds
    pub timestamp: f64,
    /// Duration in seconds
    pub duration: f64,
    /// Decodable without reference to earlier packets
    pub is_keyframe: bool,
    /// Demuxer-assigned position (packet index or raw container timestamp)
    pub sequence: u64,
    pub data: Vec<u8>,
}

impl EncodedPacket {
    /// End of this packet's validity interval
    pub fn end(&self) -> f64 {
        self.timestamp + self.duration
    }
}

/// Sample layouts decoders may produce
#[derive(Debug, Clone, PartialEq)]
pub enum SampleData {
    F32Interleaved(Vec<f32>),
    F32Planar(Vec<Vec<f32>>),
    S16Interleaved(Vec<i16>),
}

/// Decoded audio block
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: SampleData,
}

/// Pixel layouts decoders may produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Packed 8-bit RGBA
    Rgba8,
    /// Packed 8-bit BGRA (normalized to RGBA when buffered)
    Bgra8,
    /// Planar YUV 4:2:0, three planes
    I420,
    /// Semi-planar YUV 4:2:0, interleaved UV plane
    Nv12,
}

impl PixelFormat {
    /// Bytes a tightly packed picture of this format occupies
    pub fn frame_size(self, width: u32, height: u32) -> usize {
        let (w, h) = (width as usize, height as usize);
        match self {
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => w * h * 4,
            PixelFormat::I420 | PixelFormat::Nv12 => {
                let chroma = w.div_ceil(2) * h.div_ceil(2);
                w * h + 2 * chroma
            }
        }
    }
}

/// Decoded picture
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum DecodedPayload {
    Audio(AudioFrame),
    Video(VideoFrame),
}

/// Decoder output.
///
/// Ownership moves to whichever consumer accepts it (live sink or buffer);
/// dropping it releases the decoder-side resources.
#[derive(Debug, Clone)]
pub struct DecodedUnit {
    pub timestamp: f64,
    pub duration: f64,
    pub payload: DecodedPayload,
}

/// Normalized sample/pixel data held by a [`BufferedUnit`]
#[derive(Debug, Clone, PartialEq)]
pub enum UnitData {
    /// Planar f32 samples, one Vec per channel
    Audio {
        sample_rate: u32,
        planes: Vec<Vec<f32>>,
    },
    /// Tightly packed picture; packed formats are always RGBA8
    Video {
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
    },
}

/// Copied, format-normalized extraction of a decoded unit.
///
/// Cloning shares the payload.
#[derive(Debug, Clone)]
pub struct BufferedUnit {
    pub timestamp: f64,
    pub duration: f64,
    pub data: Arc<UnitData>,
}

impl BufferedUnit {
    pub fn new(timestamp: f64, duration: f64, data: UnitData) -> Self {
        Self {
            timestamp,
            duration,
            data: Arc::new(data),
        }
    }

    /// Copy and normalize a decoder output
    pub fn from_decoded(unit: &DecodedUnit) -> Result<Self> {
        if !unit.timestamp.is_finite() || !unit.duration.is_finite() || unit.duration < 0.0 {
            return Err(Error::Decode(format!(
                "decoded unit has invalid timing (ts={}, dur={})",
                unit.timestamp, unit.duration
            )));
        }

        let data = match &unit.payload {
            DecodedPayload::Audio(frame) => normalize_audio(frame)?,
            DecodedPayload::Video(frame) => normalize_video(frame)?,
        };

        Ok(Self::new(unit.timestamp, unit.duration, data))
    }

    /// End of the validity interval `[timestamp, timestamp + duration)`
    pub fn end(&self) -> f64 {
        self.timestamp + self.duration
    }

    /// Whether `time` falls inside the validity interval
    pub fn contains(&self, time: f64) -> bool {
        time >= self.timestamp - TIME_EPSILON && time < self.end() - TIME_EPSILON
    }

    /// Approximate payload size in bytes
    pub fn byte_size(&self) -> usize {
        match self.data.as_ref() {
            UnitData::Audio { planes, .. } => {
                planes.iter().map(|p| p.len()).sum::<usize>() * std::mem::size_of::<f32>()
            }
            UnitData::Video { data, .. } => data.len(),
        }
    }
}

fn deinterleave<T: Copy>(samples: &[T], channels: usize, convert: impl Fn(T) -> f32) -> Vec<Vec<f32>> {
    let frames = samples.len() / channels;
    let mut planes = vec![Vec::with_capacity(frames); channels];
    for (i, sample) in samples.iter().enumerate() {
        planes[i % channels].push(convert(*sample));
    }
    planes
}

fn normalize_audio(frame: &AudioFrame) -> Result<UnitData> {
    let channels = frame.channels as usize;
    if channels == 0 {
        return Err(Error::Decode("audio frame has zero channels".to_string()));
    }

    let planes = match &frame.samples {
        SampleData::F32Interleaved(samples) => {
            if samples.len() % channels != 0 {
                return Err(Error::Decode(format!(
                    "{} interleaved samples do not divide into {} channels",
                    samples.len(),
                    channels
                )));
            }
            deinterleave(samples, channels, |s| s)
        }
        SampleData::S16Interleaved(samples) => {
            if samples.len() % channels != 0 {
                return Err(Error::Decode(format!(
                    "{} interleaved samples do not divide into {} channels",
                    samples.len(),
                    channels
                )));
            }
            deinterleave(samples, channels, |s| s as f32 / 32768.0)
        }
        SampleData::F32Planar(planes) => {
            if planes.len() != channels {
                return Err(Error::Decode(format!(
                    "expected {} planes, got {}",
                    channels,
                    planes.len()
                )));
            }
            let frames = planes[0].len();
            if planes.iter().any(|p| p.len() != frames) {
                return Err(Error::Decode("planar channels differ in length".to_string()));
            }
            planes.clone()
        }
    };

    Ok(UnitData::Audio {
        sample_rate: frame.sample_rate,
        planes,
    })
}

fn normalize_video(frame: &VideoFrame) -> Result<UnitData> {
    let expected = frame.format.frame_size(frame.width, frame.height);
    if frame.data.len() < expected {
        return Err(Error::Decode(format!(
            "{:?} picture {}x{} needs {} bytes, got {}",
            frame.format,
            frame.width,
            frame.height,
            expected,
            frame.data.len()
        )));
    }

    let (format, data) = match frame.format {
        PixelFormat::Bgra8 => {
            let mut rgba = Vec::with_capacity(expected);
            for px in frame.data[..expected].chunks_exact(4) {
                rgba.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
            }
            (PixelFormat::Rgba8, rgba)
        }
        format => (format, frame.data[..expected].to_vec()),
    };

    Ok(UnitData::Video {
        width: frame.width,
        height: frame.height,
        format,
        data,
    })
}
