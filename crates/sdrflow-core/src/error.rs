//! Error types for the streaming engine
//!
//! Four families matter to collaborators:
//! - [`SourceError`]: acquisition failures, fatal to a running engine
//! - [`ConfigError`]: unreachable parameters, rejected with the previous
//!   configuration kept
//! - [`FifoError`]: audio fifo overflow/underflow, reported while the stream
//!   continues degraded
//! - [`Error::ResourceBusy`]: a source device already owned by another engine
//!
//! Every error maps onto an [`ErrorKind`] so status reports can carry a
//! structured kind next to the message text.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::AudioError;

/// Structured error kind carried by error reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Acquisition,
    Configuration,
    Overflow,
    Underflow,
    ResourceBusy,
    InvalidState,
    Audio,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Acquisition => write!(f, "acquisition"),
            Self::Configuration => write!(f, "configuration"),
            Self::Overflow => write!(f, "overflow"),
            Self::Underflow => write!(f, "underflow"),
            Self::ResourceBusy => write!(f, "resource busy"),
            Self::InvalidState => write!(f, "invalid state"),
            Self::Audio => write!(f, "audio"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Failures of a sample source
#[derive(Error, Debug)]
pub enum SourceError {
    /// The device or file could not be opened
    #[error("Failed to open source {device}: {reason}")]
    Open { device: String, reason: String },

    /// A read from a started source failed
    #[error("Source read failed: {0}")]
    Read(String),

    /// The source was read before being started
    #[error("Source {0} is not started")]
    NotStarted(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

/// Rejected configuration parameters
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Target rate cannot be reached by an integer decimation of the input rate
    #[error("Target rate {target_rate}Hz is not an integer decimation of {input_rate}Hz")]
    NonIntegerDecimation { input_rate: u32, target_rate: u32 },

    /// Channel offset outside the input Nyquist band
    #[error("Offset {offset}Hz is outside the +/-{half_band}Hz input band")]
    OffsetOutOfBand { offset: i64, half_band: u32 },

    /// Bandwidth must be positive and fit the output rate
    #[error("Bandwidth {bandwidth}Hz does not fit an output rate of {output_rate}Hz")]
    InvalidBandwidth { bandwidth: u32, output_rate: u32 },

    /// Generic invalid parameter
    #[error("Invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Audio fifo capacity conditions
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FifoError {
    /// Producer outran the consumer; the newest frames were dropped
    #[error("Audio fifo overflow: {dropped} frames dropped")]
    Overflow { dropped: usize },

    /// Consumer outran the producer; the missing frames were zero-filled
    #[error("Audio fifo underflow: {missing} frames zero-filled")]
    Underflow { missing: usize },
}

/// Top-level error for engine and registry operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Acquisition error: {0}")]
    Acquisition(#[from] SourceError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error(transparent)]
    Fifo(#[from] FifoError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    /// The source device is already owned by another engine
    #[error("Source {device} is already attached to another engine")]
    ResourceBusy { device: String },

    /// Operation not allowed in the current engine state
    #[error("Operation not allowed in state {0}")]
    InvalidState(String),

    /// The engine worker thread is gone
    #[error("Device engine {0} is not running its worker thread")]
    EngineGone(u32),

    /// A sink reported a failure it could not recover from by itself
    #[error("Sink {sink} failed: {reason}")]
    Sink { sink: String, reason: String },
}

impl Error {
    /// Structured kind for reports
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Acquisition(_) => ErrorKind::Acquisition,
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::Fifo(FifoError::Overflow { .. }) => ErrorKind::Overflow,
            Error::Fifo(FifoError::Underflow { .. }) => ErrorKind::Underflow,
            Error::Audio(_) => ErrorKind::Audio,
            Error::ResourceBusy { .. } => ErrorKind::ResourceBusy,
            Error::InvalidState(_) => ErrorKind::InvalidState,
            Error::EngineGone(_) | Error::Sink { .. } => ErrorKind::Internal,
        }
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let e: Error = ConfigError::NonIntegerDecimation {
            input_rate: 48000,
            target_rate: 44100,
        }
        .into();
        assert_eq!(e.kind(), ErrorKind::Configuration);
        assert!(e.to_string().contains("44100"));

        let e: Error = FifoError::Overflow { dropped: 12 }.into();
        assert_eq!(e.kind(), ErrorKind::Overflow);

        let e = Error::ResourceBusy { device: "tone:1".into() };
        assert_eq!(e.kind(), ErrorKind::ResourceBusy);
        assert_eq!(ErrorKind::ResourceBusy.to_string(), "resource busy");
    }
}
