//! Audio output configuration
//!
//! Selects the output backend and the shared output rate. All fifos attached
//! to the output manager run at this one rate.

use serde::{Deserialize, Serialize};

use crate::types::AUDIO_SAMPLE_RATE;

/// Maximum number of frames rendered in one mixer call
/// Larger device periods are rendered in several passes.
pub const MAX_BUFFER_SIZE: usize = 8192;

/// Default render period in frames
/// 512 frames @ 48kHz = ~10.7ms
pub const DEFAULT_PERIOD_FRAMES: u32 = 512;

/// Which physical output to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Headless render thread paced by the system clock
    ///
    /// Spelled `clocked` in YAML, where a bare `null` is not a string.
    #[default]
    #[serde(rename = "clocked", alias = "none")]
    Null,
    /// Sound card through CPAL (requires the `cpal-output` feature)
    Cpal,
}

/// Configuration of the shared audio output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Frames rendered per period
    pub period_frames: u32,
    /// Output backend
    pub output: OutputKind,
    /// Device name for CPAL (None = system default)
    pub device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: AUDIO_SAMPLE_RATE,
            period_frames: DEFAULT_PERIOD_FRAMES,
            output: OutputKind::Null,
            device: None,
        }
    }
}

impl AudioConfig {
    /// Period length clamped to what the mixer renders in one pass
    pub fn clamped_period(&self) -> usize {
        (self.period_frames as usize).clamp(16, MAX_BUFFER_SIZE)
    }
}
