//! Recording sink shared by unit tests

use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{SampleSink, SinkConfig};
use crate::error::{ConfigError, Result};
use crate::types::SampleBuffer;

/// What a [`CaptureSink`] observed, in call order
#[derive(Debug, Clone)]
pub enum Event {
    Start,
    Stop,
    Buffer(SampleBuffer),
    Config(SinkConfig),
}

/// Sink that records every call
pub struct CaptureSink {
    name: String,
    events: Arc<Mutex<Vec<Event>>>,
    /// Reject `Bandwidth` configs (to exercise error containment)
    pub reject_bandwidth: bool,
    /// Sleep in every consume
    pub consume_delay: Option<Duration>,
}

impl CaptureSink {
    pub fn new(name: &str) -> (Self, Arc<Mutex<Vec<Event>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                name: name.to_string(),
                events: Arc::clone(&events),
                reject_bandwidth: false,
                consume_delay: None,
            },
            events,
        )
    }
}

impl SampleSink for CaptureSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) {
        self.events.lock().unwrap().push(Event::Start);
    }

    fn stop(&mut self) {
        self.events.lock().unwrap().push(Event::Stop);
    }

    fn consume(&mut self, buffer: &SampleBuffer) -> Result<()> {
        if let Some(delay) = self.consume_delay {
            std::thread::sleep(delay);
        }
        self.events.lock().unwrap().push(Event::Buffer(buffer.clone()));
        Ok(())
    }

    fn configure(&mut self, config: &SinkConfig) -> Result<()> {
        if self.reject_bandwidth {
            if let SinkConfig::Bandwidth(bw) = config {
                return Err(ConfigError::Invalid {
                    name: "bandwidth",
                    reason: format!("{} rejected", bw),
                }
                .into());
            }
        }
        self.events.lock().unwrap().push(Event::Config(config.clone()));
        Ok(())
    }
}

/// Buffers recorded so far
pub fn buffers(events: &Arc<Mutex<Vec<Event>>>) -> Vec<SampleBuffer> {
    events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            Event::Buffer(b) => Some(b.clone()),
            _ => None,
        })
        .collect()
}
