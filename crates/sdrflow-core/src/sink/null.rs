use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::{SampleSink, SinkConfig};
use crate::error::Result;
use crate::types::SampleBuffer;

/// Counts and discards everything it receives
#[derive(Debug)]
pub struct NullSink {
    name: String,
    samples: Arc<AtomicU64>,
    buffers: u64,
}

impl NullSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            samples: Arc::new(AtomicU64::new(0)),
            buffers: 0,
        }
    }

    /// Shared counter of discarded samples, readable from other threads
    pub fn sample_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.samples)
    }

    pub fn buffers(&self) -> u64 {
        self.buffers
    }
}

impl SampleSink for NullSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn consume(&mut self, buffer: &SampleBuffer) -> Result<()> {
        self.buffers += 1;
        self.samples.fetch_add(buffer.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn configure(&mut self, _config: &SinkConfig) -> Result<()> {
        Ok(())
    }
}
