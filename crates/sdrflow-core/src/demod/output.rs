//! Audio fifo producer side shared by the demodulators

use std::sync::Arc;

use log::{debug, warn};

use super::resample::LinearResampler;
use crate::audio::{AudioFifoWriter, FifoStats};
use crate::error::{FifoError, Result};
use crate::types::StereoSample;

/// Resamples demodulated frames to the fifo rate and writes them
///
/// Overflow is reported once per burst: the first truncated write returns
/// the error, later truncated writes only count, and the next complete
/// write ends the burst.
pub(crate) struct FifoOutput {
    name: String,
    writer: AudioFifoWriter,
    output_rate: u32,
    resampler: LinearResampler,
    frames: Vec<StereoSample>,
    in_overflow: bool,
}

impl FifoOutput {
    pub fn new(name: &str, writer: AudioFifoWriter, output_rate: u32) -> Self {
        Self {
            name: name.to_string(),
            writer,
            output_rate,
            resampler: LinearResampler::new(output_rate, output_rate),
            frames: Vec::new(),
            in_overflow: false,
        }
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    pub fn stats(&self) -> Arc<FifoStats> {
        self.writer.stats()
    }

    /// Rate of the frames passed to [`write`](Self::write)
    pub fn set_input_rate(&mut self, input_rate: u32) {
        if self.resampler.input_rate() != input_rate {
            debug!("{}: resampling {}Hz -> {}Hz", self.name, input_rate, self.output_rate);
        }
        self.resampler = LinearResampler::new(input_rate, self.output_rate);
    }

    pub fn write(&mut self, frames: &[StereoSample]) -> Result<()> {
        self.frames.clear();
        self.resampler.process(frames, &mut self.frames);

        match self.writer.write(&self.frames) {
            Ok(()) => {
                self.in_overflow = false;
                Ok(())
            }
            Err(FifoError::Overflow { dropped }) if !self.in_overflow => {
                self.in_overflow = true;
                warn!("{}: audio fifo overflow, {} frames dropped", self.name, dropped);
                Err(FifoError::Overflow { dropped }.into())
            }
            Err(_) => Ok(()),
        }
    }
}
