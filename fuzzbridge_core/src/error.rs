use bincode::error::{DecodeError, EncodeError};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while setting up or running a bridge session.
///
/// Harness faults are not errors: they are reported to the engine as a crash
/// status and never surface here. Channel faults during the run loop are also
/// swallowed by the bridge; they only appear here when they happen during startup.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// An I/O error on a pipe, the shared segment file, or an input file.
    #[error("Bridge I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The shared segment exists but cannot hold the coverage map and the payload buffer.
    #[error("Shared segment {path:?} holds {actual} bytes, expected at least {expected}")]
    SegmentTooSmall {
        path: PathBuf,
        actual: u64,
        expected: usize,
    },

    /// A buffer handed to `CoverageMap` does not have exactly `MAP_SIZE` bytes.
    #[error("Coverage map must be {expected} bytes, got {actual}")]
    MapSizeMismatch { expected: usize, actual: usize },

    /// The engine announced a payload length outside the shared payload buffer.
    #[error("Engine sent payload length {0}, outside the shared payload buffer")]
    InvalidLength(i32),

    /// A coverage target is already installed in the process-wide trace slot.
    #[error("A coverage target is already installed")]
    TargetInstalled,

    /// A fixed-width protocol value could not be encoded.
    #[error("Protocol encoding error: {0}")]
    Encode(String),

    /// A fixed-width protocol value could not be decoded.
    #[error("Protocol decoding error: {0}")]
    Decode(String),
}

impl From<EncodeError> for BridgeError {
    fn from(err: EncodeError) -> Self {
        match err {
            EncodeError::Io { inner, .. } => BridgeError::Io(inner),
            other => BridgeError::Encode(other.to_string()),
        }
    }
}

impl From<DecodeError> for BridgeError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Io { inner, .. } => BridgeError::Io(inner),
            other => BridgeError::Decode(other.to_string()),
        }
    }
}

impl BridgeError {
    /// True when the error means the engine hung up or a pipe broke.
    ///
    /// The run loop treats these as the normal end of a session.
    pub fn is_disconnect(&self) -> bool {
        match self {
            BridgeError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            BridgeError::Decode(_) => true,
            _ => false,
        }
    }
}
