//! Synthetic tone source

use std::f64::consts::{PI, TAU};

use chrono::Utc;
use log::debug;

use super::{Pacer, ReadOutcome, SampleSource, StreamInfo};
use crate::error::{ConfigError, SourceError};
use crate::message::SourceSettings;
use crate::types::{IqSample, DEFAULT_BUFFER_LEN};

/// Complex exponential at `frequency` Hz from the center
///
/// With pacing on, blocks are released at the nominal rate like a real
/// receiver. An optional sample limit turns it into a finite stream.
#[derive(Debug, Clone)]
pub struct ToneSource {
    id: String,
    sample_rate: u32,
    center_frequency: u64,
    frequency: f64,
    amplitude: f32,
    block_len: usize,
    limit: Option<u64>,
    paced: bool,
    pacer: Pacer,
    phase: f64,
    produced: u64,
    started: bool,
}

impl ToneSource {
    pub fn new(id: impl Into<String>, sample_rate: u32, frequency: f64, amplitude: f32) -> Self {
        Self {
            id: id.into(),
            sample_rate,
            center_frequency: 0,
            frequency,
            amplitude,
            block_len: DEFAULT_BUFFER_LEN,
            limit: None,
            paced: false,
            pacer: Pacer::new(sample_rate),
            phase: 0.0,
            produced: 0,
            started: false,
        }
    }

    pub fn with_block_len(mut self, block_len: usize) -> Self {
        self.block_len = block_len.max(1);
        self
    }

    pub fn with_center_frequency(mut self, center_frequency: u64) -> Self {
        self.center_frequency = center_frequency;
        self
    }

    /// End the stream after `samples` samples
    pub fn with_limit(mut self, samples: u64) -> Self {
        self.limit = Some(samples);
        self
    }

    /// Release samples in real time
    pub fn paced(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }

    pub fn produced(&self) -> u64 {
        self.produced
    }

    fn check_frequency(&self, frequency: f64) -> Result<(), ConfigError> {
        let half_band = f64::from(self.sample_rate) / 2.0;
        if !frequency.is_finite() || frequency.abs() > half_band {
            return Err(ConfigError::Invalid {
                name: "tone frequency",
                reason: format!("{}Hz is outside +/-{}Hz", frequency, half_band),
            });
        }
        Ok(())
    }
}

impl SampleSource for ToneSource {
    fn device_id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> String {
        format!(
            "Tone {}Hz at {}Hz, {}S/s",
            self.frequency, self.center_frequency, self.sample_rate
        )
    }

    fn validate(&self) -> Result<(), SourceError> {
        if self.sample_rate == 0 {
            return Err(SourceError::Open {
                device: self.id.clone(),
                reason: "sample rate must be positive".to_string(),
            });
        }
        Ok(())
    }

    fn start(&mut self) -> Result<StreamInfo, SourceError> {
        self.validate()?;
        self.phase = 0.0;
        self.produced = 0;
        self.pacer = Pacer::new(self.sample_rate);
        self.started = true;
        debug!("Tone source {} started", self.id);
        Ok(StreamInfo {
            sample_rate: self.sample_rate,
            center_frequency: self.center_frequency,
            start_timestamp: Utc::now(),
        })
    }

    fn stop(&mut self) {
        self.started = false;
        self.pacer.reset();
    }

    fn read(&mut self, out: &mut Vec<IqSample>) -> Result<ReadOutcome, SourceError> {
        if !self.started {
            return Err(SourceError::NotStarted(self.id.clone()));
        }
        out.clear();

        let remaining = self.limit.map_or(u64::MAX, |l| l.saturating_sub(self.produced));
        let n = (self.block_len as u64).min(remaining) as usize;
        if n == 0 {
            return Ok(ReadOutcome::EndOfStream);
        }

        let step = TAU * self.frequency / f64::from(self.sample_rate);
        let amplitude = f64::from(self.amplitude);
        out.extend((0..n).map(|_| {
            let s = IqSample::new((amplitude * self.phase.cos()) as f32, (amplitude * self.phase.sin()) as f32);
            self.phase += step;
            if self.phase >= PI {
                self.phase -= TAU;
            } else if self.phase < -PI {
                self.phase += TAU;
            }
            s
        }));
        self.produced += n as u64;

        if self.paced {
            self.pacer.wait(n);
        }
        Ok(ReadOutcome::Data)
    }

    fn configure(&mut self, settings: &SourceSettings) -> Result<(), ConfigError> {
        match settings {
            SourceSettings::CenterFrequency(f) => {
                self.center_frequency = *f;
                Ok(())
            }
            SourceSettings::Tone { frequency, amplitude } => {
                self.check_frequency(*frequency)?;
                self.frequency = *frequency;
                self.amplitude = *amplitude;
                Ok(())
            }
            SourceSettings::Looping(_) => Ok(()),
        }
    }
}
