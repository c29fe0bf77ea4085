//! WAV file playback as an I/Q source
//!
//! Expects a stereo 16-bit integer file with I in the left channel and Q in
//! the right, the format [`WavRecorder`](crate::sink::WavRecorder) writes.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, info};

use super::{Pacer, ReadOutcome, SampleSource, StreamInfo};
use crate::error::{ConfigError, SourceError};
use crate::message::SourceSettings;
use crate::types::{IqSample, DEFAULT_BUFFER_LEN};

type Reader = hound::WavReader<BufReader<File>>;

pub struct WavSource {
    id: String,
    path: PathBuf,
    center_frequency: u64,
    block_len: usize,
    looping: bool,
    paced: bool,
    pacer: Pacer,
    reader: Option<Reader>,
}

impl WavSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            id: format!("file:{}", path.display()),
            path,
            center_frequency: 0,
            block_len: DEFAULT_BUFFER_LEN,
            looping: false,
            paced: false,
            pacer: Pacer::new(0),
            reader: None,
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

    /// Restart from the beginning at end of file
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn paced(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }

    /// Open the file and check it holds interleaved 16-bit I/Q
    fn open(&self) -> Result<Reader, SourceError> {
        let reader = hound::WavReader::open(&self.path)?;
        let spec = reader.spec();
        if spec.channels != 2 || spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
            return Err(self.open_error(format!(
                "expected stereo 16-bit integer I/Q, got {} channels of {}-bit {:?}",
                spec.channels, spec.bits_per_sample, spec.sample_format
            )));
        }
        if spec.sample_rate == 0 {
            return Err(self.open_error("sample rate must be positive"));
        }
        Ok(reader)
    }

    fn open_error(&self, reason: impl Into<String>) -> SourceError {
        SourceError::Open {
            device: self.path.display().to_string(),
            reason: reason.into(),
        }
    }
}

/// Append up to `block_len` frames from the current position
fn fill(reader: &mut Reader, out: &mut Vec<IqSample>, block_len: usize) -> Result<(), SourceError> {
    let mut samples = reader.samples::<i16>();
    while out.len() < block_len {
        let (Some(i), Some(q)) = (samples.next(), samples.next()) else {
            break;
        };
        out.push(IqSample::new(f32::from(i?) / 32768.0, f32::from(q?) / 32768.0));
    }
    Ok(())
}

impl SampleSource for WavSource {
    fn device_id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> String {
        format!("WAV file {}", self.path.display())
    }

    fn validate(&self) -> Result<(), SourceError> {
        self.open().map(|_| ())
    }

    fn start(&mut self) -> Result<StreamInfo, SourceError> {
        let reader = self.open()?;
        let spec = reader.spec();

        let modified = std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        info!(
            "Playing {} ({}S/s, {} frames{})",
            self.path.display(),
            spec.sample_rate,
            reader.duration(),
            if self.looping { ", looping" } else { "" }
        );
        self.pacer = Pacer::new(spec.sample_rate);
        self.reader = Some(reader);
        Ok(StreamInfo {
            sample_rate: spec.sample_rate,
            center_frequency: self.center_frequency,
            start_timestamp: modified,
        })
    }

    fn stop(&mut self) {
        if self.reader.take().is_some() {
            debug!("Closed {}", self.path.display());
        }
        self.pacer.reset();
    }

    fn read(&mut self, out: &mut Vec<IqSample>) -> Result<ReadOutcome, SourceError> {
        let Some(reader) = self.reader.as_mut() else {
            return Err(SourceError::NotStarted(self.id.clone()));
        };
        out.clear();

        loop {
            fill(reader, out, self.block_len)?;
            if out.len() == self.block_len || !self.looping || reader.duration() == 0 {
                break;
            }
            reader.seek(0)?;
        }

        if out.is_empty() {
            return Ok(ReadOutcome::EndOfStream);
        }
        if self.paced {
            self.pacer.wait(out.len());
        }
        Ok(ReadOutcome::Data)
    }

    fn configure(&mut self, settings: &SourceSettings) -> Result<(), ConfigError> {
        match settings {
            SourceSettings::Looping(looping) => {
                self.looping = *looping;
                Ok(())
            }
            SourceSettings::CenterFrequency(f) => {
                self.center_frequency = *f;
                Ok(())
            }
            SourceSettings::Tone { .. } => Err(ConfigError::Invalid {
                name: "source setting",
                reason: "tone parameters do not apply to a file source".to_string(),
            }),
        }
    }
}
