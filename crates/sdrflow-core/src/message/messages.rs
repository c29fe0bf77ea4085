//! Message types exchanged with device engines
//!
//! Inbound [`EngineMessage`]s are configuration commands posted to an
//! engine's input queue and applied by its worker thread between buffers.
//! Outbound [`Report`]s are status messages the engine and its sinks post to
//! the engine's output queue.

use chrono::{DateTime, Utc};

use crate::engine::EngineState;
use crate::error::ErrorKind;

use super::queue::MessageQueue;

/// Configuration commands for a device engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineMessage {
    /// Enable or disable the DC offset and IQ imbalance corrections
    ConfigureCorrections { dc_offset: bool, iq_imbalance: bool },
    /// Forwarded to the attached source
    ConfigureSource(SourceSettings),
}

/// Source parameters that can change at runtime
#[derive(Debug, Clone, PartialEq)]
pub enum SourceSettings {
    /// Nominal center frequency reported with every buffer
    CenterFrequency(u64),
    /// Restart file playback from the beginning at end of file
    Looping(bool),
    /// Synthetic tone parameters
    Tone { frequency: f64, amplitude: f32 },
}

/// Status reports posted to an engine's output queue
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    /// The engine moved to a new acquisition state
    StateChanged { engine: u32, state: EngineState },

    /// Acquisition started or stopped (stop includes end of stream)
    Acquisition { engine: u32, running: bool },

    /// Stream metadata of the started source
    StreamData {
        engine: u32,
        sample_rate: u32,
        center_frequency: u64,
        start_timestamp: DateTime<Utc>,
    },

    /// A channelizer swapped in a new plan
    ChannelConfigured {
        sink: String,
        center_offset: i64,
        output_rate: u32,
        decimation: u32,
    },

    /// Engine-level failure
    Error {
        engine: u32,
        kind: ErrorKind,
        message: String,
    },

    /// A sink failed to consume a buffer or apply a configuration
    SinkError {
        sink: String,
        kind: ErrorKind,
        message: String,
    },
}

impl Report {
    /// Error kind if this report describes a failure
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Report::Error { kind, .. } | Report::SinkError { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Output queue type shared by an engine and its sinks
pub type ReportQueue = MessageQueue<Report>;
