//! Commands from a [`DeviceEngine`](super::DeviceEngine) handle to its worker
//!
//! Every command carries a bounded(1) reply channel. The worker handles
//! commands between buffers, so a call made while acquisition is running
//! takes effect at the next buffer boundary and returns once it has.

use crossbeam::channel::Sender;

use crate::error::Result;
use crate::sink::{SampleSink, ThreadedSink};
use crate::source::SampleSource;

/// Identifies a sink attached to an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SinkId(pub(crate) u64);

impl SinkId {
    pub fn id(&self) -> u64 {
        self.0
    }
}

pub(crate) enum EngineCommand {
    Init {
        reply: Sender<bool>,
    },
    Start {
        reply: Sender<bool>,
    },
    Stop {
        reply: Sender<()>,
    },
    /// Replace the source, replying with the previous one
    SetSource {
        source: Option<Box<dyn SampleSource>>,
        reply: Sender<Result<Option<Box<dyn SampleSource>>>>,
    },
    SourceDescription {
        reply: Sender<Option<String>>,
    },
    AddSink {
        id: SinkId,
        sink: Box<dyn SampleSink>,
        reply: Sender<()>,
    },
    RemoveSink {
        id: SinkId,
        reply: Sender<Option<Box<dyn SampleSink>>>,
    },
    AddThreadedSink {
        id: SinkId,
        sink: ThreadedSink,
        reply: Sender<()>,
    },
    RemoveThreadedSink {
        id: SinkId,
        reply: Sender<Option<ThreadedSink>>,
    },
    Shutdown,
}
