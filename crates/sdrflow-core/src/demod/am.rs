//! AM envelope demodulator
//!
//! Per input sample:
//! 1. RF low-pass at the selected RF bandwidth
//! 2. Envelope `|s|`, with the carrier (DC) removed by a slow mean tracker
//! 3. Audio low-pass at the AF bandwidth
//! 4. Power squelch with hold-off, then volume
//!
//! The audio is resampled to the fifo rate and written to the fifo.

use std::sync::Arc;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::biquad::{Biquad, BiquadCoeffs};
use super::output::FifoOutput;
use crate::audio::{AudioFifoWriter, FifoStats};
use crate::dsp::{window, DecimatingFir};
use crate::error::{ConfigError, Result};
use crate::sink::{SampleSink, SinkConfig};
use crate::types::{IqSample, SampleBuffer, StereoSample};

/// Selectable RF bandwidths in Hz
pub const RF_BANDWIDTHS: [u32; 9] = [5000, 6250, 8330, 10000, 12500, 15000, 20000, 25000, 40000];

/// Default RF bandwidth index (12.5 kHz)
pub const DEFAULT_RF_BANDWIDTH_INDEX: usize = 4;

const DC_ALPHA: f32 = 1.0e-3;
const POWER_ALPHA: f32 = 2.0e-3;
const AF_Q: f32 = 0.707;
const RF_ATTENUATION_DB: f64 = 50.0;

/// Squelch hold-off in seconds
const SQUELCH_HOLDOFF_SECS: f32 = 0.05;

/// AM demodulator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmSettings {
    /// RF filter bandwidth in Hz
    pub rf_bandwidth: u32,
    /// Audio bandwidth in Hz
    pub af_bandwidth: f32,
    /// Linear output gain
    pub volume: f32,
    /// Squelch threshold in dB relative to full scale
    pub squelch_db: f32,
}

impl Default for AmSettings {
    fn default() -> Self {
        Self {
            rf_bandwidth: RF_BANDWIDTHS[DEFAULT_RF_BANDWIDTH_INDEX],
            af_bandwidth: 3000.0,
            volume: 2.0,
            squelch_db: -40.0,
        }
    }
}

impl AmSettings {
    /// Settings with the RF bandwidth taken from [`RF_BANDWIDTHS`]
    pub fn with_rf_index(index: usize) -> std::result::Result<Self, ConfigError> {
        let rf_bandwidth = *RF_BANDWIDTHS.get(index).ok_or_else(|| ConfigError::Invalid {
            name: "rf bandwidth index",
            reason: format!("{} is outside 0..{}", index, RF_BANDWIDTHS.len()),
        })?;
        Ok(Self {
            rf_bandwidth,
            ..Self::default()
        })
    }

    /// Index of the RF bandwidth in [`RF_BANDWIDTHS`], if it is one of them
    pub fn rf_bandwidth_index(&self) -> Option<usize> {
        RF_BANDWIDTHS.iter().position(|bw| *bw == self.rf_bandwidth)
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.rf_bandwidth == 0 {
            return Err(ConfigError::Invalid {
                name: "rf bandwidth",
                reason: "must be positive".to_string(),
            });
        }
        if !(self.af_bandwidth > 0.0) {
            return Err(ConfigError::Invalid {
                name: "af bandwidth",
                reason: format!("{} must be positive", self.af_bandwidth),
            });
        }
        if !(self.volume >= 0.0) || !self.volume.is_finite() {
            return Err(ConfigError::Invalid {
                name: "volume",
                reason: format!("{} must be a non-negative gain", self.volume),
            });
        }
        if self.squelch_db.is_nan() {
            return Err(ConfigError::Invalid {
                name: "squelch",
                reason: "NaN".to_string(),
            });
        }
        Ok(())
    }
}

/// AM demodulator writing to an audio fifo
pub struct AmDemod {
    name: String,
    settings: AmSettings,
    input_rate: u32,
    output: FifoOutput,
    rf: Option<DecimatingFir>,
    af: Biquad,
    dc: f32,
    power: f32,
    holdoff: u32,
    holdoff_len: u32,
    squelch_open: bool,
    filtered: Vec<IqSample>,
    audio: Vec<StereoSample>,
}

impl AmDemod {
    /// Demodulator writing `output_rate` audio to `writer`
    pub fn new(name: impl Into<String>, writer: AudioFifoWriter, output_rate: u32) -> Self {
        let name = name.into();
        let output = FifoOutput::new(&name, writer, output_rate);
        Self {
            name,
            settings: AmSettings::default(),
            input_rate: 0,
            output,
            rf: None,
            af: Biquad::new(BiquadCoeffs::passthrough()),
            dc: 0.0,
            power: 0.0,
            holdoff: 0,
            holdoff_len: 0,
            squelch_open: false,
            filtered: Vec::new(),
            audio: Vec::new(),
        }
    }

    pub fn with_settings(mut self, settings: AmSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &AmSettings {
        &self.settings
    }

    pub fn is_squelch_open(&self) -> bool {
        self.squelch_open
    }

    pub fn fifo_stats(&self) -> Arc<FifoStats> {
        self.output.stats()
    }

    /// Rebuild the filters for the current rate and settings
    fn rebuild(&mut self) {
        if self.input_rate == 0 {
            return;
        }
        let rate = self.input_rate;

        self.rf = (self.settings.rf_bandwidth < rate).then(|| {
            let cutoff = f64::from(self.settings.rf_bandwidth) / 2.0;
            let transition = (cutoff / 2.0) / f64::from(rate);
            let taps = window::kaiser_length(RF_ATTENUATION_DB, transition).min(511);
            DecimatingFir::new(window::lowpass(taps, cutoff / f64::from(rate), RF_ATTENUATION_DB), 1)
        });
        self.af = Biquad::new(BiquadCoeffs::lowpass(self.settings.af_bandwidth, AF_Q, rate as f32));
        self.holdoff_len = (rate as f32 * SQUELCH_HOLDOFF_SECS) as u32;
        self.output.set_input_rate(rate);

        debug!(
            "{}: {}Hz in, rf {}Hz, af {}Hz, squelch {}dB",
            self.name, rate, self.settings.rf_bandwidth, self.settings.af_bandwidth, self.settings.squelch_db
        );
    }

    fn reset_state(&mut self) {
        self.dc = 0.0;
        self.power = 0.0;
        self.holdoff = 0;
        self.squelch_open = false;
    }

    fn apply_settings(&mut self, settings: &AmSettings) -> Result<()> {
        settings.validate()?;
        self.settings = settings.clone();
        self.rebuild();
        Ok(())
    }
}

impl SampleSink for AmDemod {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) {
        self.reset_state();
    }

    fn consume(&mut self, buffer: &SampleBuffer) -> Result<()> {
        if buffer.sample_rate != self.input_rate {
            self.input_rate = buffer.sample_rate;
            self.rebuild();
        }

        let samples = match self.rf.as_mut() {
            Some(rf) => {
                self.filtered.clear();
                rf.process(buffer.samples(), &mut self.filtered);
                &self.filtered[..]
            }
            None => buffer.samples(),
        };

        let threshold = self.settings.squelch_db;
        let volume = self.settings.volume;
        self.audio.clear();
        for s in samples {
            let power = s.norm_sqr();
            self.power += (power - self.power) * POWER_ALPHA;
            let level_db = 10.0 * self.power.max(1e-20).log10();
            if level_db >= threshold {
                self.holdoff = self.holdoff_len;
                self.squelch_open = true;
            } else if self.holdoff > 0 {
                self.holdoff -= 1;
            } else {
                self.squelch_open = false;
            }

            let magnitude = power.sqrt();
            self.dc += (magnitude - self.dc) * DC_ALPHA;
            let audio = self.af.process(magnitude - self.dc);

            let value = if self.squelch_open { audio * volume } else { 0.0 };
            self.audio.push(StereoSample::mono(value));
        }

        self.output.write(&self.audio)
    }

    fn configure(&mut self, config: &SinkConfig) -> Result<()> {
        match config {
            SinkConfig::StreamData { sample_rate, .. } => {
                info!("{}: input {}Hz", self.name, sample_rate);
                self.input_rate = *sample_rate;
                self.reset_state();
                self.rebuild();
                Ok(())
            }
            SinkConfig::Am(settings) => self.apply_settings(settings),
            SinkConfig::Bandwidth(bw) => {
                let settings = AmSettings {
                    rf_bandwidth: *bw,
                    ..self.settings.clone()
                };
                self.apply_settings(&settings)
            }
            SinkConfig::Channel { .. } => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::TAU;

    use super::*;
    use crate::audio::audio_fifo;

    fn am_signal(len: usize, carrier: f32, depth: f32, tone_hz: f32, rate: u32) -> Vec<IqSample> {
        (0..len)
            .map(|n| {
                let m = (TAU * tone_hz * n as f32 / rate as f32).sin();
                IqSample::new(carrier * (1.0 + depth * m), 0.0)
            })
            .collect()
    }

    fn rms(frames: &[StereoSample]) -> f32 {
        (frames.iter().map(|f| f.left * f.left).sum::<f32>() / frames.len() as f32).sqrt()
    }

    #[test]
    fn test_settings_defaults_and_table() {
        let s = AmSettings::default();
        assert_eq!(s.rf_bandwidth, 12500);
        assert_eq!(s.rf_bandwidth_index(), Some(DEFAULT_RF_BANDWIDTH_INDEX));
        assert_eq!(s.volume, 2.0);
        assert_eq!(s.squelch_db, -40.0);
        assert_eq!(AmSettings::with_rf_index(8).unwrap().rf_bandwidth, 40000);
        assert!(AmSettings::with_rf_index(9).is_err());

        let bad = AmSettings {
            volume: -1.0,
            ..AmSettings::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_demodulates_tone() {
        let (writer, mut reader) = audio_fifo(96000);
        let mut demod = AmDemod::new("am", writer, 48000);
        demod
            .configure(&SinkConfig::StreamData {
                sample_rate: 48000,
                center_frequency: 0,
            })
            .unwrap();

        let signal = am_signal(48000, 0.5, 0.5, 1000.0, 48000);
        for (i, chunk) in signal.chunks(4800).enumerate() {
            demod
                .consume(&SampleBuffer::new(chunk.to_vec(), 48000, 0, (i * 4800) as u64))
                .unwrap();
        }
        assert!(demod.is_squelch_open());

        let mut out = vec![StereoSample::silence(); 48000];
        assert_eq!(reader.read_available(&mut out), 48000);
        // Modulation amplitude 0.25 times volume 2.0, once the DC tracker has settled
        let level = rms(&out[24000..]);
        let expected = 0.5 / 2f32.sqrt();
        assert!((level - expected).abs() < 0.05 * expected * 2.0, "rms {}", level);
        assert_eq!(out[30000].left, out[30000].right);
    }

    #[test]
    fn test_squelch_mutes_weak_signal() {
        let (writer, mut reader) = audio_fifo(48000);
        let mut demod = AmDemod::new("am", writer, 48000);
        let weak = am_signal(9600, 1e-4, 0.5, 1000.0, 48000);
        demod.consume(&SampleBuffer::new(weak, 48000, 0, 0)).unwrap();
        assert!(!demod.is_squelch_open());

        let mut out = vec![StereoSample::mono(1.0); 9600];
        assert_eq!(reader.read_available(&mut out), 9600);
        assert!(out.iter().all(|f| f.left == 0.0));
    }

    #[test]
    fn test_squelch_holdoff_then_close() {
        let (writer, _reader) = audio_fifo(96000);
        let mut demod = AmDemod::new("am", writer, 48000);
        demod
            .consume(&SampleBuffer::new(am_signal(4800, 0.5, 0.3, 800.0, 48000), 48000, 0, 0))
            .unwrap();
        assert!(demod.is_squelch_open());

        // Signal gone: the power estimate decays, then the hold-off runs out
        demod
            .consume(&SampleBuffer::new(vec![IqSample::new(0.0, 0.0); 24000], 48000, 0, 4800))
            .unwrap();
        assert!(!demod.is_squelch_open());
    }

    #[test]
    fn test_resamples_channel_rate_to_audio_rate() {
        let (writer, reader) = audio_fifo(96000);
        let mut demod = AmDemod::new("am", writer, 48000);
        demod
            .configure(&SinkConfig::StreamData {
                sample_rate: 16000,
                center_frequency: 0,
            })
            .unwrap();
        demod
            .consume(&SampleBuffer::new(am_signal(1600, 0.5, 0.5, 500.0, 16000), 16000, 0, 0))
            .unwrap();
        assert_eq!(reader.available(), 4800);
    }

    #[test]
    fn test_invalid_settings_keep_previous() {
        let (writer, _reader) = audio_fifo(16);
        let mut demod = AmDemod::new("am", writer, 48000);
        let bad = AmSettings {
            af_bandwidth: 0.0,
            ..AmSettings::default()
        };
        assert!(demod.configure(&SinkConfig::Am(bad)).is_err());
        assert_eq!(demod.settings(), &AmSettings::default());

        demod.configure(&SinkConfig::Bandwidth(25000)).unwrap();
        assert_eq!(demod.settings().rf_bandwidth_index(), Some(7));
    }
}
