//! Media data model and collaborator interfaces
//!
//! The engine never parses containers or runs codecs itself. It talks to a
//! [`MediaBackend`] that opens sources, and to the [`Demuxer`] and
//! [`Decoder`] handles a source hands out.

pub mod symphonia_backend;
pub mod traits;
pub mod types;

pub use symphonia_backend::SymphoniaBackend;
pub use traits::{
    DecodeOutcome, Decoder, DecoderState, Demuxer, MediaBackend, MediaSource, OutputSink,
};
pub use types::{
    AudioFrame, BufferedUnit, DecodedPayload, DecodedUnit, DecoderConfig, EncodedPacket,
    LoadResult, MediaInput, PixelFormat, SampleData, TrackDescriptor, TrackInfo, UnitData,
    VideoFrame,
};
