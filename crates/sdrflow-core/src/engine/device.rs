//! Device engine handle
//!
//! A [`DeviceEngine`] owns one worker thread which in turn exclusively owns
//! the sample source and every attached sink. The handle only sends
//! commands and waits for the reply; state is read from an atomic shared
//! with the worker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, unbounded, Sender};
use log::{debug, error, info};

use super::claims::SourceClaims;
use super::command::{EngineCommand, SinkId};
use super::state::{EngineState, SharedState};
use super::worker::Worker;
use crate::error::{Error, Result};
use crate::message::{EngineMessage, MessageQueue, ReportQueue};
use crate::sink::{SampleSink, ThreadedSink};
use crate::source::SampleSource;

pub struct DeviceEngine {
    uid: u32,
    shared: Arc<SharedState>,
    commands: Sender<EngineCommand>,
    input: MessageQueue<EngineMessage>,
    reports: ReportQueue,
    claims: SourceClaims,
    /// Device id of the attached source, held in `claims`
    source_id: Mutex<Option<String>>,
    next_sink: AtomicU64,
    handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for DeviceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceEngine")
            .field("uid", &self.uid)
            .field("state", &self.state())
            .finish()
    }
}

impl DeviceEngine {
    /// Spawn the worker thread of a new engine
    ///
    /// Source device ids are claimed in `claims`, which is shared by all
    /// engines of one context.
    pub fn new(uid: u32, claims: SourceClaims) -> Result<Self> {
        let shared = Arc::new(SharedState::new());
        let (commands, command_rx) = unbounded();
        let input = MessageQueue::new();
        let reports = ReportQueue::new();

        let worker = Worker::new(uid, Arc::clone(&shared), command_rx, input.clone(), reports.clone());
        let handle = thread::Builder::new()
            .name(format!("engine-{}", uid))
            .spawn(move || worker.run())
            .map_err(|e| {
                error!("Failed to spawn engine {} worker: {}", uid, e);
                Error::EngineGone(uid)
            })?;

        info!("Device engine {} created", uid);
        Ok(Self {
            uid,
            shared,
            commands,
            input,
            reports,
            claims,
            source_id: Mutex::new(None),
            next_sink: AtomicU64::new(1),
            handle: Some(handle),
        })
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn state(&self) -> EngineState {
        self.shared.state()
    }

    /// Message of the last failure, empty if none
    pub fn error_message(&self) -> String {
        self.shared.last_error()
    }

    /// Queue for [`EngineMessage`]s, applied between buffers
    pub fn input_message_queue(&self) -> &MessageQueue<EngineMessage> {
        &self.input
    }

    /// Queue the engine and its threaded sinks post reports to
    pub fn output_message_queue(&self) -> &ReportQueue {
        &self.reports
    }

    fn request<T>(&self, make: impl FnOnce(Sender<T>) -> EngineCommand) -> Result<T> {
        let (reply, rx) = bounded(1);
        self.commands
            .send(make(reply))
            .map_err(|_| Error::EngineGone(self.uid))?;
        rx.recv().map_err(|_| Error::EngineGone(self.uid))
    }

    fn source_id(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.source_id.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach `source`, returning the one it replaces
    ///
    /// Fails with `ResourceBusy` if another engine of the context holds the
    /// same device, and with `InvalidState` while acquisition is running.
    pub fn set_source(&self, source: Box<dyn SampleSource>) -> Result<Option<Box<dyn SampleSource>>> {
        let device = source.device_id().to_string();
        let already_ours = self.source_id().as_deref() == Some(device.as_str());
        if !already_ours {
            self.claims.claim(&device)?;
        }

        match self.request(|reply| EngineCommand::SetSource {
            source: Some(source),
            reply,
        }) {
            Ok(Ok(previous)) => {
                let mut current = self.source_id();
                if let Some(old) = current.replace(device) {
                    if !already_ours {
                        self.claims.release(&old);
                    }
                }
                Ok(previous)
            }
            Ok(Err(e)) | Err(e) => {
                if !already_ours {
                    self.claims.release(&device);
                }
                Err(e)
            }
        }
    }

    /// Detach the source and release its device claim
    pub fn clear_source(&self) -> Result<Option<Box<dyn SampleSource>>> {
        let previous = self.request(|reply| EngineCommand::SetSource { source: None, reply })??;
        if let Some(old) = self.source_id().take() {
            self.claims.release(&old);
        }
        Ok(previous)
    }

    pub fn source_description(&self) -> Option<String> {
        self.request(|reply| EngineCommand::SourceDescription { reply })
            .ok()
            .flatten()
    }

    /// `Idle -> Initialized`; false with `error_message` set on failure
    pub fn init_acquisition(&self) -> bool {
        self.request(|reply| EngineCommand::Init { reply }).unwrap_or(false)
    }

    /// `Initialized -> Running`; true without effect when already running
    pub fn start_acquisition(&self) -> bool {
        self.request(|reply| EngineCommand::Start { reply }).unwrap_or(false)
    }

    /// Stop after the in-flight buffer and return to `Idle`
    pub fn stop_acquisition(&self) {
        if self.request(|reply| EngineCommand::Stop { reply }).is_err() {
            debug!("Engine {} already gone on stop", self.uid);
        }
    }

    fn next_sink_id(&self) -> SinkId {
        SinkId(self.next_sink.fetch_add(1, Ordering::Relaxed))
    }

    /// Attach a sink run inline on the acquisition thread
    pub fn add_sink<S: SampleSink + 'static>(&self, sink: S) -> Result<SinkId> {
        let id = self.next_sink_id();
        self.request(|reply| EngineCommand::AddSink {
            id,
            sink: Box::new(sink),
            reply,
        })?;
        Ok(id)
    }

    pub fn remove_sink(&self, id: SinkId) -> Result<Option<Box<dyn SampleSink>>> {
        self.request(|reply| EngineCommand::RemoveSink { id, reply })
    }

    pub fn add_threaded_sink(&self, sink: ThreadedSink) -> Result<SinkId> {
        let id = self.next_sink_id();
        self.request(|reply| EngineCommand::AddThreadedSink { id, sink, reply })?;
        Ok(id)
    }

    /// Detach a threaded sink; dropping the result joins its thread
    pub fn remove_threaded_sink(&self, id: SinkId) -> Result<Option<ThreadedSink>> {
        self.request(|reply| EngineCommand::RemoveThreadedSink { id, reply })
    }

    /// Queue new correction settings, applied before the next buffer
    pub fn configure_corrections(&self, dc_offset: bool, iq_imbalance: bool) {
        self.input.push(EngineMessage::ConfigureCorrections {
            dc_offset,
            iq_imbalance,
        });
    }

    /// Stop acquisition, join the worker and release the source claim
    pub fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.commands.send(EngineCommand::Shutdown);
        if handle.join().is_err() {
            error!("Engine {} worker panicked", self.uid);
        }
        if let Some(old) = self.source_id().take() {
            self.claims.release(&old);
        }
        info!("Device engine {} shut down", self.uid);
    }
}

impl Drop for DeviceEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::error::{ConfigError, ErrorKind, SourceError};
    use crate::message::{Report, SourceSettings};
    use crate::sink::testing::{buffers, CaptureSink, Event};
    use crate::sink::{NullSink, SinkConfig};
    use crate::source::{ReadOutcome, StreamInfo, ToneSource, WavSource};
    use crate::types::IqSample;

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// Ramp source: `blocks` buffers of `len` samples, then end of stream or failure
    struct RampSource {
        id: String,
        len: usize,
        blocks: usize,
        fail_at_end: bool,
        read: usize,
        starts: Arc<AtomicU64>,
        delay: Duration,
    }

    impl RampSource {
        fn new(id: &str, len: usize, blocks: usize) -> Self {
            Self {
                id: id.to_string(),
                len,
                blocks,
                fail_at_end: false,
                read: 0,
                starts: Arc::new(AtomicU64::new(0)),
                delay: Duration::ZERO,
            }
        }
    }

    impl SampleSource for RampSource {
        fn device_id(&self) -> &str {
            &self.id
        }

        fn description(&self) -> String {
            format!("ramp {}", self.id)
        }

        fn start(&mut self) -> std::result::Result<StreamInfo, SourceError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.read = 0;
            Ok(StreamInfo {
                sample_rate: 1000,
                center_frequency: 100_000_000,
                start_timestamp: Utc::now(),
            })
        }

        fn stop(&mut self) {}

        fn read(&mut self, out: &mut Vec<IqSample>) -> std::result::Result<ReadOutcome, SourceError> {
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            if self.read == self.blocks {
                if self.fail_at_end {
                    return Err(SourceError::Read("device unplugged".to_string()));
                }
                return Ok(ReadOutcome::EndOfStream);
            }
            out.clear();
            let base = (self.read * self.len) as f32;
            out.extend((0..self.len).map(|i| IqSample::new(base + i as f32, 0.0)));
            self.read += 1;
            Ok(ReadOutcome::Data)
        }

        fn configure(&mut self, _settings: &SourceSettings) -> std::result::Result<(), ConfigError> {
            Ok(())
        }
    }

    fn wait_for(reports: &ReportQueue, pred: impl Fn(&Report) -> bool) -> Vec<Report> {
        let mut seen = Vec::new();
        while let Some(env) = reports.pop_timeout(TIMEOUT) {
            let done = pred(&env.payload);
            seen.push(env.payload);
            if done {
                return seen;
            }
        }
        panic!("report not seen, got {:?}", seen);
    }

    fn end_of_stream(r: &Report) -> bool {
        matches!(r, Report::Acquisition { running: false, .. })
    }

    #[test]
    fn test_lifecycle_through_end_of_stream() {
        let engine = DeviceEngine::new(1, SourceClaims::new()).unwrap();
        assert_eq!(engine.state(), EngineState::Idle);
        assert!(!engine.init_acquisition());
        assert!(!engine.error_message().is_empty());

        engine.set_source(Box::new(RampSource::new("ramp", 8, 4))).unwrap();
        assert_eq!(engine.source_description().as_deref(), Some("ramp ramp"));
        let (sink, events) = CaptureSink::new("capture");
        engine.add_sink(sink).unwrap();

        assert!(engine.init_acquisition());
        assert_eq!(engine.state(), EngineState::Initialized);
        assert!(engine.start_acquisition());

        let seen = wait_for(engine.output_message_queue(), end_of_stream);
        assert!(seen.iter().any(|r| matches!(
            r,
            Report::StreamData {
                sample_rate: 1000,
                center_frequency: 100_000_000,
                ..
            }
        )));
        assert!(seen.iter().any(|r| matches!(
            r,
            Report::StateChanged {
                state: EngineState::Running,
                ..
            }
        )));

        let got = buffers(&events);
        assert_eq!(got.len(), 4);
        let firsts: Vec<u64> = got.iter().map(|b| b.first_sample).collect();
        assert_eq!(firsts, vec![0, 8, 16, 24]);
        assert_eq!(got[3].samples()[7], IqSample::new(31.0, 0.0));

        let events = events.lock().unwrap();
        assert!(matches!(events[0], Event::Start));
        assert!(matches!(
            events[1],
            Event::Config(SinkConfig::StreamData { sample_rate: 1000, .. })
        ));
        assert!(matches!(events.last(), Some(Event::Stop)));
        drop(events);

        // Wait for the final transition posted after Acquisition{false}
        wait_for(engine.output_message_queue(), |r| {
            matches!(r, Report::StateChanged { state: EngineState::Idle, .. })
        });
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn test_start_is_idempotent_and_stop_returns_to_idle() {
        let engine = DeviceEngine::new(2, SourceClaims::new()).unwrap();
        let mut source = RampSource::new("slow", 4, usize::MAX);
        source.delay = Duration::from_millis(2);
        let starts = Arc::clone(&source.starts);
        engine.set_source(Box::new(source)).unwrap();

        assert!(!engine.start_acquisition(), "start requires init");
        assert!(engine.init_acquisition());
        assert!(engine.start_acquisition());
        assert!(engine.start_acquisition());
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(engine.state(), EngineState::Running);

        let Err(err) = engine.set_source(Box::new(RampSource::new("other", 4, 1))) else {
            panic!("replacing the source while running must fail");
        };
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        engine.stop_acquisition();
        assert_eq!(engine.state(), EngineState::Idle);
        // Releasing the rejected source's claim lets it be attached now
        engine.set_source(Box::new(RampSource::new("other", 4, 1))).unwrap();
    }

    #[test]
    fn test_init_rejects_unusable_source() {
        let engine = DeviceEngine::new(8, SourceClaims::new()).unwrap();
        engine.set_source(Box::new(ToneSource::new("norate", 0, 0.0, 0.5))).unwrap();
        assert!(!engine.init_acquisition());
        assert_eq!(engine.state(), EngineState::Idle);
        assert!(engine.error_message().contains("sample rate"));
        assert!(!engine.start_acquisition());

        engine.set_source(Box::new(WavSource::new("/nonexistent/iq.wav"))).unwrap();
        assert!(!engine.init_acquisition());
        assert_eq!(engine.state(), EngineState::Idle);

        engine.set_source(Box::new(ToneSource::new("tone", 48000, 0.0, 0.5))).unwrap();
        assert!(engine.init_acquisition());
        assert!(engine.error_message().is_empty());
        assert_eq!(engine.state(), EngineState::Initialized);
    }

    #[test]
    fn test_read_failure_enters_error_state() {
        let engine = DeviceEngine::new(3, SourceClaims::new()).unwrap();
        let mut source = RampSource::new("flaky", 4, 2);
        source.fail_at_end = true;
        engine.set_source(Box::new(source)).unwrap();
        engine.add_sink(NullSink::new("null")).unwrap();
        assert!(engine.init_acquisition());
        assert!(engine.start_acquisition());

        let seen = wait_for(engine.output_message_queue(), |r| {
            matches!(r, Report::StateChanged { state: EngineState::Error, .. })
        });
        assert!(seen.iter().any(|r| matches!(
            r,
            Report::Error {
                engine: 3,
                kind: ErrorKind::Acquisition,
                ..
            }
        )));
        assert_eq!(engine.state(), EngineState::Error);
        assert!(engine.error_message().contains("device unplugged"));
        assert!(!engine.init_acquisition());

        engine.stop_acquisition();
        assert_eq!(engine.state(), EngineState::Idle);
        assert!(engine.init_acquisition());
    }

    #[test]
    fn test_sinks_attached_while_running() {
        let engine = DeviceEngine::new(4, SourceClaims::new()).unwrap();
        engine
            .set_source(Box::new(ToneSource::new("tone", 48000, 1000.0, 0.5).with_block_len(480).paced(true)))
            .unwrap();
        assert!(engine.init_acquisition());
        assert!(engine.start_acquisition());

        let (sink, events) = CaptureSink::new("late");
        let threaded = ThreadedSink::spawn(sink, None).unwrap();
        let id = engine.add_threaded_sink(threaded).unwrap();
        std::thread::sleep(Duration::from_millis(50));

        let removed = engine.remove_threaded_sink(id).unwrap();
        let returned = removed.and_then(|s| s.shutdown());
        assert!(returned.is_some());
        engine.stop_acquisition();

        let events = events.lock().unwrap();
        assert!(matches!(events[0], Event::Start));
        assert!(matches!(
            events[1],
            Event::Config(SinkConfig::StreamData { sample_rate: 48000, .. })
        ));
        assert!(events.iter().any(|e| matches!(e, Event::Buffer(_))));
        assert!(matches!(events.last(), Some(Event::Stop)));
        assert!(engine.remove_threaded_sink(id).unwrap().is_none());
    }

    #[test]
    fn test_corrections_applied_between_buffers() {
        let engine = DeviceEngine::new(5, SourceClaims::new()).unwrap();
        let source = ToneSource::new("dc", 48000, 0.0, 0.5)
            .with_block_len(4800)
            .with_limit(48000 * 4);
        engine.set_source(Box::new(source)).unwrap();
        let (sink, events) = CaptureSink::new("capture");
        engine.add_sink(sink).unwrap();

        engine.configure_corrections(true, false);
        assert!(engine.init_acquisition());
        assert!(engine.start_acquisition());
        wait_for(engine.output_message_queue(), end_of_stream);

        // A 0 Hz tone is pure DC; the estimator converges onto it
        let got = buffers(&events);
        let last = got.last().unwrap().samples();
        let residual = last.iter().map(|s| s.re.abs()).fold(0.0f32, f32::max);
        assert!(residual < 0.01, "DC residual {}", residual);
    }

    #[test]
    fn test_shared_device_is_exclusive() {
        let claims = SourceClaims::new();
        let a = DeviceEngine::new(6, claims.clone()).unwrap();
        let b = DeviceEngine::new(7, claims.clone()).unwrap();
        a.set_source(Box::new(RampSource::new("hackrf:0", 4, 1))).unwrap();
        let Err(err) = b.set_source(Box::new(RampSource::new("hackrf:0", 4, 1))) else {
            panic!("second claim of hackrf:0 must fail");
        };
        assert_eq!(err.kind(), ErrorKind::ResourceBusy);

        a.clear_source().unwrap();
        b.set_source(Box::new(RampSource::new("hackrf:0", 4, 1))).unwrap();
        drop(b);
        assert!(claims.is_empty());
    }
}
