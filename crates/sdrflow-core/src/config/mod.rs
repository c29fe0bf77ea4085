//! Receiver configuration
//!
//! One YAML file describes a complete receiver: the audio output, the
//! engine's buffer and correction settings, the sample source and the list
//! of demodulated channels.
//!
//! ```yaml
//! audio:
//!   sample_rate: 48000
//!   output: clocked
//! source:
//!   kind: wav
//!   path: /data/airband-240k.wav
//!   center_frequency: 124000000
//!   looping: true
//! channels:
//!   - name: tower
//!     center_offset: -25000
//!     am:
//!       rf_bandwidth: 8330
//! ```

mod io;
mod paths;

pub use io::{load_config, save_config, try_load_config};
pub use paths::{config_dir, default_config_path};

use serde::{Deserialize, Serialize};

use crate::audio::AudioConfig;
use crate::demod::AmSettings;
use crate::error::ConfigError;
use crate::source::SourceConfig;
use crate::types::{AUDIO_SAMPLE_RATE, DEFAULT_BUFFER_LEN};

/// Default file name inside [`config_dir`]
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Default audio fifo capacity: 100ms at 48kHz
pub const DEFAULT_FIFO_FRAMES: usize = 4800;

/// Complete receiver configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RxConfig {
    pub audio: AudioConfig,
    pub engine: EngineConfig,
    pub source: SourceConfig,
    pub channels: Vec<ChannelConfig>,
}

impl RxConfig {
    /// Check every channel before anything is started
    pub fn validate(&self) -> Result<(), ConfigError> {
        for channel in &self.channels {
            channel.validate()?;
        }
        Ok(())
    }
}

/// Per-engine acquisition settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Complex samples per acquisition buffer
    pub buffer_len: usize,
    pub dc_offset: bool,
    pub iq_imbalance: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buffer_len: DEFAULT_BUFFER_LEN,
            dc_offset: false,
            iq_imbalance: false,
        }
    }
}

/// Demodulator behind a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DemodKind {
    #[default]
    Am,
    /// Raw I/Q to the left/right audio channels
    Passthrough,
}

/// One channelizer + demodulator pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub name: String,
    /// Offset from the device center frequency in Hz
    pub center_offset: i64,
    /// Channel sample rate after decimation
    pub target_rate: u32,
    /// Channel filter bandwidth (None = 80% of the channel rate)
    pub bandwidth: Option<u32>,
    pub demod: DemodKind,
    pub am: AmSettings,
    /// Audio fifo capacity in frames
    pub fifo_frames: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            name: "channel".to_string(),
            center_offset: 0,
            target_rate: AUDIO_SAMPLE_RATE,
            bandwidth: None,
            demod: DemodKind::Am,
            am: AmSettings::default(),
            fifo_frames: DEFAULT_FIFO_FRAMES,
        }
    }
}

impl ChannelConfig {
    pub fn new(name: impl Into<String>, center_offset: i64) -> Self {
        Self {
            name: name.into(),
            center_offset,
            ..Self::default()
        }
    }

    /// Checks that do not depend on the source rate
    ///
    /// Offset and decimation are validated by the channelizer once the
    /// stream rate is known.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_rate == 0 {
            return Err(ConfigError::Invalid {
                name: "target rate",
                reason: format!("channel {} needs a positive rate", self.name),
            });
        }
        if self.fifo_frames == 0 {
            return Err(ConfigError::Invalid {
                name: "fifo frames",
                reason: format!("channel {} needs a non-empty fifo", self.name),
            });
        }
        if self.demod == DemodKind::Am {
            self.am.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::OutputKind;

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
audio:
  sample_rate: 44100
source:
  kind: wav
  path: /tmp/iq.wav
  looping: true
channels:
  - name: tower
    center_offset: -25000
    am:
      rf_bandwidth: 8330
  - name: raw
    demod: passthrough
    target_rate: 24000
"#;
        let config: RxConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.audio.sample_rate, 44100);
        assert_eq!(config.audio.output, OutputKind::Null);
        assert_eq!(config.engine, EngineConfig::default());
        assert!(matches!(config.source, SourceConfig::Wav { looping: true, paced: true, .. }));

        let tower = &config.channels[0];
        assert_eq!(tower.center_offset, -25000);
        assert_eq!(tower.target_rate, 48000);
        assert_eq!(tower.am.rf_bandwidth, 8330);
        assert_eq!(tower.am.volume, 2.0);
        assert_eq!(tower.fifo_frames, DEFAULT_FIFO_FRAMES);
        assert_eq!(config.channels[1].demod, DemodKind::Passthrough);
        config.validate().unwrap();
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let mut config = RxConfig::default();
        config.engine.dc_offset = true;
        config.channels.push(ChannelConfig::new("ground", 12500));

        save_config(&config, &path).unwrap();
        let loaded: RxConfig = load_config(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_validate_rejects_empty_fifo() {
        let mut config = RxConfig::default();
        let mut channel = ChannelConfig::new("bad", 0);
        channel.fifo_frames = 0;
        config.channels.push(channel);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { name: "fifo frames", .. })
        ));
    }
}
