//! Record the received stream to a stereo WAV file (I left, Q right)
//!
//! The file is created once the stream rate is known. A rate change
//! finalizes the current file and starts over with the new rate, since a
//! WAV header carries a single rate. Stopping finalizes the file; the next
//! acquisition overwrites it.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use log::info;

use super::{SampleSink, SinkConfig};
use crate::error::{Error, Result};
use crate::types::SampleBuffer;

type Writer = hound::WavWriter<BufWriter<File>>;

pub struct WavRecorder {
    name: String,
    path: PathBuf,
    sample_rate: u32,
    writer: Option<Writer>,
    samples_written: u64,
}

impl WavRecorder {
    pub fn new(name: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self {
            name: name.into(),
            path: path.as_ref().to_path_buf(),
            sample_rate: 0,
            writer: None,
            samples_written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Complex samples written to the current file
    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    fn sink_error(&self, e: impl std::fmt::Display) -> Error {
        Error::Sink {
            sink: self.name.clone(),
            reason: format!("{}: {}", self.path.display(), e),
        }
    }

    fn open(&mut self, sample_rate: u32) -> Result<()> {
        self.finalize()?;
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(&self.path, spec).map_err(|e| self.sink_error(e))?;
        info!("{}: recording {}Hz to {}", self.name, sample_rate, self.path.display());
        self.writer = Some(writer);
        self.sample_rate = sample_rate;
        self.samples_written = 0;
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().map_err(|e| self.sink_error(e))?;
        }
        Ok(())
    }
}

impl SampleSink for WavRecorder {
    fn name(&self) -> &str {
        &self.name
    }

    fn stop(&mut self) {
        if let Err(e) = self.finalize() {
            log::error!("{}", e);
        }
    }

    fn consume(&mut self, buffer: &SampleBuffer) -> Result<()> {
        if self.writer.is_none() || buffer.sample_rate != self.sample_rate {
            self.open(buffer.sample_rate)?;
        }
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };

        let to_i16 = |v: f32| (v.clamp(-1.0, 1.0) * 32767.0) as i16;
        let write = |writer: &mut Writer| -> std::result::Result<(), hound::Error> {
            for s in buffer.samples() {
                writer.write_sample(to_i16(s.re))?;
                writer.write_sample(to_i16(s.im))?;
            }
            Ok(())
        };
        write(writer).map_err(|e| self.sink_error(e))?;
        self.samples_written += buffer.len() as u64;
        Ok(())
    }

    fn configure(&mut self, config: &SinkConfig) -> Result<()> {
        if let SinkConfig::StreamData { sample_rate, .. } = config {
            if self.writer.is_none() || *sample_rate != self.sample_rate {
                self.open(*sample_rate)?;
            }
        }
        Ok(())
    }
}

impl Drop for WavRecorder {
    fn drop(&mut self) {
        let _ = self.finalize();
    }
}
