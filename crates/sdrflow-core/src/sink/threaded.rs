//! Run a sink on its own thread behind a message queue
//!
//! ```text
//! engine thread                      sink thread
//! ─────────────                      ───────────
//! post_buffer(B1) ──┐
//! post_config(C)  ──┼──► MessageQueue ──► consume(B1)
//! post_buffer(B2) ──┘    (FIFO)           configure(C)
//!                                         consume(B2)
//! ```
//!
//! Buffers and configuration changes share one queue, so a configuration
//! posted after a buffer is applied only once that buffer has been
//! consumed. Posting never blocks. The sink thread handles exactly one item
//! at a time; sink errors are logged and reported, never returned to the
//! poster.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error};

use super::{report_sink_error, SampleSink, SinkConfig};
use crate::error::{Error, Result};
use crate::message::{Envelope, MessageQueue, ReportQueue};
use crate::types::SampleBuffer;

/// Work items for a sink thread
#[derive(Debug, Clone)]
pub enum SinkItem {
    Buffer(SampleBuffer),
    Configure(SinkConfig),
    Start,
    Stop,
    Shutdown,
}

/// A sink running on a dedicated thread
pub struct ThreadedSink {
    name: String,
    queue: MessageQueue<SinkItem>,
    processed: Arc<AtomicU64>,
    handle: Option<JoinHandle<Box<dyn SampleSink>>>,
}

impl std::fmt::Debug for ThreadedSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadedSink")
            .field("name", &self.name)
            .field("pending", &self.queue.len())
            .finish()
    }
}

impl ThreadedSink {
    /// Move `sink` onto a new thread
    ///
    /// Failures of the sink are posted to `reports` when given.
    pub fn spawn<S: SampleSink + 'static>(sink: S, reports: Option<ReportQueue>) -> Result<Self> {
        let name = sink.name().to_string();
        let queue = MessageQueue::new();
        let processed = Arc::new(AtomicU64::new(0));

        let worker_queue = queue.clone();
        let worker_processed = Arc::clone(&processed);
        let handle = thread::Builder::new()
            .name(format!("sink-{}", name))
            .spawn(move || run(Box::new(sink), worker_queue, reports, worker_processed))
            .map_err(|e| Error::Sink {
                sink: name.clone(),
                reason: format!("failed to spawn thread: {}", e),
            })?;

        debug!("Sink {} running on its own thread", name);
        Ok(Self {
            name,
            queue,
            processed,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a buffer (never blocks)
    pub fn post_buffer(&self, buffer: SampleBuffer) -> u64 {
        self.queue.push(SinkItem::Buffer(buffer))
    }

    /// Queue a configuration change behind everything already posted
    pub fn post_config(&self, config: SinkConfig) -> u64 {
        self.queue.push(SinkItem::Configure(config))
    }

    pub fn post_start(&self) {
        self.queue.push(SinkItem::Start);
    }

    pub fn post_stop(&self) {
        self.queue.push(SinkItem::Stop);
    }

    /// The sink's input queue
    pub fn input_message_queue(&self) -> &MessageQueue<SinkItem> {
        &self.queue
    }

    /// Items waiting to be processed
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Buffers consumed so far
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Acquire)
    }

    /// Drain the queue, stop the thread and hand the sink back
    pub fn shutdown(mut self) -> Option<Box<dyn SampleSink>> {
        self.join()
    }

    fn join(&mut self) -> Option<Box<dyn SampleSink>> {
        let handle = self.handle.take()?;
        self.queue.push(SinkItem::Shutdown);
        match handle.join() {
            Ok(sink) => Some(sink),
            Err(_) => {
                error!("Sink thread {} panicked", self.name);
                None
            }
        }
    }
}

impl Drop for ThreadedSink {
    fn drop(&mut self) {
        self.join();
    }
}

fn run(
    mut sink: Box<dyn SampleSink>,
    queue: MessageQueue<SinkItem>,
    reports: Option<ReportQueue>,
    processed: Arc<AtomicU64>,
) -> Box<dyn SampleSink> {
    loop {
        let Envelope { payload, .. } = queue.pop();
        match payload {
            SinkItem::Buffer(buffer) => {
                if let Err(e) = sink.consume(&buffer) {
                    report_sink_error(reports.as_ref(), sink.name(), &e);
                }
                processed.fetch_add(1, Ordering::Release);
            }
            SinkItem::Configure(config) => {
                if let Err(e) = sink.configure(&config) {
                    report_sink_error(reports.as_ref(), sink.name(), &e);
                }
            }
            SinkItem::Start => sink.start(),
            SinkItem::Stop => sink.stop(),
            SinkItem::Shutdown => break,
        }
    }
    debug!("Sink thread {} exiting", sink.name());
    sink
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::error::ErrorKind;
    use crate::message::Report;
    use crate::sink::testing::{CaptureSink, Event};
    use crate::types::IqSample;

    fn buffer(first: u64) -> SampleBuffer {
        SampleBuffer::new(vec![IqSample::new(0.0, 0.0); 8], 48000, 0, first)
    }

    #[test]
    fn test_items_processed_in_posting_order() {
        let (mut sink, events) = CaptureSink::new("cap");
        sink.consume_delay = Some(Duration::from_millis(2));
        let threaded = ThreadedSink::spawn(sink, None).unwrap();

        let mut expected = vec![('s', 0)];
        threaded.post_start();
        for i in 0..20u64 {
            threaded.post_buffer(buffer(i));
            expected.push(('b', i));
            if i % 5 == 4 {
                threaded.post_config(SinkConfig::Bandwidth(i as u32));
                expected.push(('c', i));
            }
        }
        threaded.post_stop();
        expected.push(('e', 0));
        assert!(threaded.shutdown().is_some());

        let observed: Vec<(char, u64)> = events
            .lock()
            .unwrap()
            .iter()
            .map(|e| match e {
                Event::Start => ('s', 0),
                Event::Stop => ('e', 0),
                Event::Buffer(b) => ('b', b.first_sample),
                Event::Config(SinkConfig::Bandwidth(bw)) => ('c', u64::from(*bw)),
                Event::Config(_) => ('?', 0),
            })
            .collect();
        assert_eq!(observed, expected);
    }

    #[test]
    fn test_post_does_not_block() {
        let (mut sink, _events) = CaptureSink::new("slow");
        sink.consume_delay = Some(Duration::from_millis(20));
        let threaded = ThreadedSink::spawn(sink, None).unwrap();

        let t0 = Instant::now();
        for i in 0..10 {
            threaded.post_buffer(buffer(i));
        }
        assert!(t0.elapsed() < Duration::from_millis(20));
        drop(threaded);
    }

    #[test]
    fn test_sink_errors_are_reported_and_contained() {
        let (mut sink, events) = CaptureSink::new("picky");
        sink.reject_bandwidth = true;
        let reports = ReportQueue::new();
        let threaded = ThreadedSink::spawn(sink, Some(reports.clone())).unwrap();

        threaded.post_config(SinkConfig::Bandwidth(1));
        threaded.post_buffer(buffer(0));
        threaded.shutdown();

        let report = reports.pop_timeout(Duration::from_secs(1)).unwrap().payload;
        match report {
            Report::SinkError { sink, kind, .. } => {
                assert_eq!(sink, "picky");
                assert_eq!(kind, ErrorKind::Configuration);
            }
            other => panic!("unexpected report {:?}", other),
        }
        // The buffer after the failed config was still consumed
        assert_eq!(crate::sink::testing::buffers(&events).len(), 1);
    }

    #[test]
    fn test_processed_counter() {
        let (sink, _events) = CaptureSink::new("count");
        let threaded = ThreadedSink::spawn(sink, None).unwrap();
        for i in 0..5 {
            threaded.post_buffer(buffer(i));
        }
        let deadline = Instant::now() + Duration::from_secs(2);
        while threaded.processed() < 5 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(threaded.processed(), 5);
        assert_eq!(threaded.pending(), 0);
    }
}
