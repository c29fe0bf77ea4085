//! Sample sinks: everything a device engine can feed
//!
//! A sink is a capability pair: [`SampleSink::consume`] for sample buffers
//! and [`SampleSink::configure`] for parameter changes. Concrete sinks are
//! plain structs (channelizer, demodulators, recorder, null sink) picked at
//! attach time; they compose by ownership, e.g. a channelizer owning the
//! demodulator it feeds.
//!
//! Sinks run either inline on the engine's acquisition thread or on their
//! own thread through [`ThreadedSink`]. Either way a sink is only ever
//! called from one thread at a time.

mod null;
mod recorder;
mod threaded;

#[cfg(test)]
pub(crate) mod testing;

pub use null::NullSink;
pub use recorder::WavRecorder;
pub use threaded::{SinkItem, ThreadedSink};

use log::warn;

use crate::demod::AmSettings;
use crate::error::{Error, Result};
use crate::message::{Report, ReportQueue};
use crate::types::SampleBuffer;

/// Parameter changes delivered to sinks
#[derive(Debug, Clone, PartialEq)]
pub enum SinkConfig {
    /// Rate and center frequency of the buffers that will follow
    StreamData { sample_rate: u32, center_frequency: u64 },
    /// Channel selection: offset from the device center and output rate
    Channel { center_offset: i64, target_rate: u32 },
    /// Channel filter bandwidth in Hz
    Bandwidth(u32),
    /// AM demodulator settings
    Am(AmSettings),
}

/// Consumer of sample buffers
pub trait SampleSink: Send {
    /// Name used in logs and reports
    fn name(&self) -> &str;

    /// Acquisition is starting
    fn start(&mut self) {}

    /// Acquisition stopped
    fn stop(&mut self) {}

    /// Process one buffer
    fn consume(&mut self, buffer: &SampleBuffer) -> Result<()>;

    /// Apply a parameter change; sinks ignore variants they do not use
    fn configure(&mut self, config: &SinkConfig) -> Result<()>;
}

impl<S: SampleSink + ?Sized> SampleSink for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn start(&mut self) {
        (**self).start();
    }

    fn stop(&mut self) {
        (**self).stop();
    }

    fn consume(&mut self, buffer: &SampleBuffer) -> Result<()> {
        (**self).consume(buffer)
    }

    fn configure(&mut self, config: &SinkConfig) -> Result<()> {
        (**self).configure(config)
    }
}

/// Log a contained sink failure and post it as a `SinkError` report
pub(crate) fn report_sink_error(reports: Option<&ReportQueue>, sink: &str, error: &Error) {
    warn!("Sink {}: {}", sink, error);
    if let Some(reports) = reports {
        reports.push(Report::SinkError {
            sink: sink.to_string(),
            kind: error.kind(),
            message: error.to_string(),
        });
    }
}
