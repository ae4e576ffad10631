//! Collaborator interfaces
//!
//! Container parsing and codec work live behind these traits so the engine
//! can be driven by symphonia, a platform decoder, or a synthetic source in
//! tests. Every handle is `Send`: the engine task owns them and may move
//! between runtime worker threads.

use super::types::{BufferedUnit, DecodedUnit, DecoderConfig, EncodedPacket, MediaInput, TrackDescriptor};
use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Opens media sources
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Open and probe a container.
    ///
    /// Errors here are the only failures `load` reports to its caller.
    async fn open(&self, input: &MediaInput) -> Result<Box<dyn MediaSource>>;
}

/// An opened container
pub trait MediaSource: Send + Sync {
    /// Tracks found in the container
    fn tracks(&self) -> &[TrackDescriptor];

    /// Packet reader for one track
    fn demuxer(&mut self, track_id: u32) -> Result<Box<dyn Demuxer>>;

    /// Create an unconfigured-or-ready decoder for a track.
    ///
    /// Fails with `Error::DecoderConfig` when the codec is unsupported.
    fn create_decoder(&self, track: &TrackDescriptor) -> Result<Box<dyn Decoder>>;

    /// Release the container; further calls are not expected
    fn close(&mut self);
}

/// Packet access for one track.
///
/// `Ok(None)` means end of stream (or nothing at that time).
#[async_trait]
pub trait Demuxer: Send {
    /// Packet whose interval contains `time`, or the first one after it
    async fn packet_at(&mut self, time: f64) -> Result<Option<EncodedPacket>>;

    /// First packet of the track
    async fn first_packet(&mut self) -> Result<Option<EncodedPacket>>;

    /// Packet following `prev` in decode order
    async fn next_packet(&mut self, prev: &EncodedPacket) -> Result<Option<EncodedPacket>>;

    /// Nearest keyframe at or before `time`
    async fn key_packet_at(&mut self, time: f64) -> Result<Option<EncodedPacket>>;
}

/// Lifecycle of a decoder handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    Unconfigured,
    Configured,
    Closed,
}

/// What happened to a submitted packet
#[derive(Debug)]
pub enum DecodeOutcome {
    /// Decoded output; ownership passes to the caller
    Frame(DecodedUnit),
    /// Packet accepted but produced no output yet (decoder priming)
    Pending,
    /// Decoder was not ready; packet was not consumed
    Skipped,
    /// Packet depends on data the decoder has not seen; resume from a keyframe
    NeedsKeyframe,
}

/// Stateful decoder bound to one [`DecoderConfig`]
#[async_trait]
pub trait Decoder: Send {
    /// Configuration this decoder was created for
    fn config(&self) -> &DecoderConfig;

    fn state(&self) -> DecoderState;

    /// Whether packets can be submitted
    fn is_ready(&self) -> bool {
        self.state() == DecoderState::Configured
    }

    async fn configure(&mut self, config: &DecoderConfig) -> Result<()>;

    /// Decode one packet.
    ///
    /// `Err` is a hard fault for this packet only; the caller skips it.
    async fn decode(&mut self, packet: &EncodedPacket) -> Result<DecodeOutcome>;

    /// Drop internal state; the decoder must be configured again
    async fn reset(&mut self) -> Result<()>;

    /// Release codec resources; the handle is unusable afterwards
    fn close(&mut self);
}

/// Consumer of presented units.
///
/// `None` means nothing is current (the consumer should blank or go silent).
pub trait OutputSink: Send {
    fn deliver(&mut self, unit: Option<&BufferedUnit>);
}

impl OutputSink for mpsc::UnboundedSender<Option<BufferedUnit>> {
    fn deliver(&mut self, unit: Option<&BufferedUnit>) {
        // Receiver gone means nobody is watching; nothing to do
        let _ = self.send(unit.cloned());
    }
}
