//! Error types for sme-engine
//!
//! Only `load` surfaces errors to engine callers; everything else is logged
//! and absorbed by the engine (see the playback module docs). Collaborator
//! implementations use these variants to classify what went wrong.

use thiserror::Error;

/// Main error type for sme-engine
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Media source could not be opened or probed
    #[error("Source error: {0}")]
    Source(String),

    /// Demuxer failed to produce a packet
    #[error("Demux error: {0}")]
    Demux(String),

    /// Decoder rejected a packet (malformed stream)
    #[error("Decode error: {0}")]
    Decode(String),

    /// Decoder configuration is missing or unsupported
    #[error("Decoder configuration error: {0}")]
    DecoderConfig(String),

    /// Engine configuration is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The engine driver task is no longer running
    #[error("Engine stopped")]
    EngineStopped,

    /// Errors from shared helpers
    #[error(transparent)]
    Common(#[from] sme_common::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using sme-engine Error
pub type Result<T> = std::result::Result<T, Error>;
