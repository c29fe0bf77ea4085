//! Audio output error types

use thiserror::Error;

/// Errors that can occur while opening or running the audio output
#[derive(Error, Debug)]
pub enum AudioError {
    /// No audio devices available
    #[error("No audio output devices found")]
    NoDevices,

    /// Device not found
    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    /// Failed to get device configuration
    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    /// Failed to build audio stream
    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    /// Failed to start/play stream
    #[error("Failed to start audio stream: {0}")]
    StreamPlayError(String),

    /// The output thread could not be started
    #[error("Failed to spawn audio output thread: {0}")]
    ThreadSpawn(String),

    /// Rate change requested while the device is open
    #[error("Sample rate cannot change while the output is open ({current}Hz in use)")]
    RateLocked { current: u32 },

    /// The fifo handle does not belong to this manager
    #[error("Unknown audio fifo handle {0}")]
    UnknownFifo(u64),
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;
