//! Pass-through demodulator: I to the left channel, Q to the right

use std::sync::Arc;

use super::output::FifoOutput;
use crate::audio::{AudioFifoWriter, FifoStats};
use crate::error::Result;
use crate::sink::{SampleSink, SinkConfig};
use crate::types::{SampleBuffer, StereoSample};

/// Writes the raw channel samples as stereo audio
pub struct PassthroughDemod {
    name: String,
    gain: f32,
    input_rate: u32,
    output: FifoOutput,
    frames: Vec<StereoSample>,
}

impl PassthroughDemod {
    pub fn new(name: impl Into<String>, writer: AudioFifoWriter, output_rate: u32) -> Self {
        let name = name.into();
        let output = FifoOutput::new(&name, writer, output_rate);
        Self {
            name,
            gain: 1.0,
            input_rate: output_rate,
            output,
            frames: Vec::new(),
        }
    }

    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }

    pub fn fifo_stats(&self) -> Arc<FifoStats> {
        self.output.stats()
    }

    fn set_input_rate(&mut self, rate: u32) {
        self.input_rate = rate;
        self.output.set_input_rate(rate);
    }
}

impl SampleSink for PassthroughDemod {
    fn name(&self) -> &str {
        &self.name
    }

    fn consume(&mut self, buffer: &SampleBuffer) -> Result<()> {
        if buffer.sample_rate != self.input_rate {
            self.set_input_rate(buffer.sample_rate);
        }
        self.frames.clear();
        self.frames.extend(
            buffer
                .samples()
                .iter()
                .map(|s| StereoSample::new(s.re * self.gain, s.im * self.gain)),
        );
        self.output.write(&self.frames)
    }

    fn configure(&mut self, config: &SinkConfig) -> Result<()> {
        if let SinkConfig::StreamData { sample_rate, .. } = config {
            self.set_input_rate(*sample_rate);
        }
        Ok(())
    }
}
