//! Sample sources: where raw I/Q comes from
//!
//! A [`SampleSource`] stands in for a hardware front end. The device engine
//! owns exactly one source, starts it when acquisition starts, and pulls
//! blocks from it on the acquisition thread until the source reports end of
//! stream or fails.

mod tone;
mod wav;

pub use tone::ToneSource;
pub use wav::WavSource;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, SourceError};
use crate::message::SourceSettings;
use crate::types::{IqSample, DEFAULT_BUFFER_LEN};

/// Stream parameters reported by a started source
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub sample_rate: u32,
    pub center_frequency: u64,
    pub start_timestamp: DateTime<Utc>,
}

/// Result of one read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `out` holds at least one new sample
    Data,
    /// No more samples will come
    EndOfStream,
}

/// A device delivering complex baseband samples
pub trait SampleSource: Send {
    /// Identifier used to claim the device; unique per physical device
    fn device_id(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> String;

    /// Check that the device can be opened with its current settings
    ///
    /// Called when acquisition is initialised, before any start.
    fn validate(&self) -> Result<(), SourceError> {
        Ok(())
    }

    /// Open the device and start streaming
    fn start(&mut self) -> Result<StreamInfo, SourceError>;

    fn stop(&mut self);

    /// Replace the contents of `out` with the next block
    fn read(&mut self, out: &mut Vec<IqSample>) -> Result<ReadOutcome, SourceError>;

    /// Apply a runtime setting
    fn configure(&mut self, settings: &SourceSettings) -> Result<(), ConfigError>;
}

/// Source selection in the configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    /// Synthetic complex tone
    Tone {
        #[serde(default = "default_tone_rate")]
        sample_rate: u32,
        #[serde(default)]
        center_frequency: u64,
        #[serde(default)]
        frequency: f64,
        #[serde(default = "default_amplitude")]
        amplitude: f32,
        #[serde(default = "default_true")]
        paced: bool,
        #[serde(default)]
        limit: Option<u64>,
    },
    /// Stereo 16-bit WAV recording of I/Q
    Wav {
        path: std::path::PathBuf,
        #[serde(default)]
        center_frequency: u64,
        #[serde(default)]
        looping: bool,
        #[serde(default = "default_true")]
        paced: bool,
    },
}

fn default_tone_rate() -> u32 {
    240_000
}

fn default_amplitude() -> f32 {
    0.5
}

fn default_true() -> bool {
    true
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Tone {
            sample_rate: default_tone_rate(),
            center_frequency: 0,
            frequency: 0.0,
            amplitude: default_amplitude(),
            paced: true,
            limit: None,
        }
    }
}

/// Build the configured source reading `block_len` samples per read
pub fn create_source(config: &SourceConfig, block_len: usize) -> Box<dyn SampleSource> {
    let block_len = if block_len == 0 { DEFAULT_BUFFER_LEN } else { block_len };
    match config {
        SourceConfig::Tone {
            sample_rate,
            center_frequency,
            frequency,
            amplitude,
            paced,
            limit,
        } => {
            let mut tone = ToneSource::new("tone", *sample_rate, *frequency, *amplitude)
                .with_block_len(block_len)
                .with_center_frequency(*center_frequency)
                .paced(*paced);
            if let Some(limit) = limit {
                tone = tone.with_limit(*limit);
            }
            Box::new(tone)
        }
        SourceConfig::Wav {
            path,
            center_frequency,
            looping,
            paced,
        } => Box::new(
            WavSource::new(path)
                .with_block_len(block_len)
                .with_center_frequency(*center_frequency)
                .looping(*looping)
                .paced(*paced),
        ),
    }
}

/// Sleeps so that samples are handed out no faster than real time
#[derive(Debug, Clone)]
pub(crate) struct Pacer {
    sample_rate: u32,
    origin: Option<std::time::Instant>,
    delivered: u64,
}

impl Pacer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            origin: None,
            delivered: 0,
        }
    }

    pub fn reset(&mut self) {
        self.origin = None;
        self.delivered = 0;
    }

    /// Wait until `count` more samples are due
    pub fn wait(&mut self, count: usize) {
        if self.sample_rate == 0 {
            return;
        }
        let origin = *self.origin.get_or_insert_with(std::time::Instant::now);
        self.delivered += count as u64;
        let due = origin + std::time::Duration::from_secs_f64(self.delivered as f64 / f64::from(self.sample_rate));
        let now = std::time::Instant::now();
        if due > now {
            std::thread::sleep(due - now);
        }
    }
}
