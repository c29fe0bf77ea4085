//! The engine's worker thread, which is also its acquisition thread
//!
//! While idle it blocks on both the command channel and the input message
//! queue. While running it alternates: drain pending commands and messages,
//! then read and dispatch exactly one buffer. Stopping therefore always
//! lets the in-flight buffer finish.

use std::sync::Arc;

use crossbeam::channel::{select, Receiver, TryRecvError};
use log::{debug, error, info, warn};

use super::command::{EngineCommand, SinkId};
use super::state::{EngineState, SharedState};
use crate::dsp::Corrections;
use crate::error::{Error, ErrorKind, Result};
use crate::message::{EngineMessage, MessageQueue, Report, ReportQueue, SourceSettings};
use crate::sink::{report_sink_error, SampleSink, SinkConfig, ThreadedSink};
use crate::source::{ReadOutcome, SampleSource, StreamInfo};
use crate::types::{IqSample, SampleBuffer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

pub(crate) struct Worker {
    uid: u32,
    shared: Arc<SharedState>,
    commands: Receiver<EngineCommand>,
    input: MessageQueue<EngineMessage>,
    reports: ReportQueue,
    source: Option<Box<dyn SampleSource>>,
    sinks: Vec<(SinkId, Box<dyn SampleSink>)>,
    threaded: Vec<(SinkId, ThreadedSink)>,
    corrections: Corrections,
    stream: Option<StreamInfo>,
    buffer: Vec<IqSample>,
    samples_acquired: u64,
}

impl Worker {
    pub fn new(
        uid: u32,
        shared: Arc<SharedState>,
        commands: Receiver<EngineCommand>,
        input: MessageQueue<EngineMessage>,
        reports: ReportQueue,
    ) -> Self {
        Self {
            uid,
            shared,
            commands,
            input,
            reports,
            source: None,
            sinks: Vec::new(),
            threaded: Vec::new(),
            corrections: Corrections::default(),
            stream: None,
            buffer: Vec::new(),
            samples_acquired: 0,
        }
    }

    /// Main worker loop
    pub fn run(mut self) {
        debug!("Engine {} worker started", self.uid);
        loop {
            let flow = if self.shared.state() == EngineState::Running {
                self.run_between_buffers()
            } else {
                self.wait_idle()
            };
            if flow == Flow::Exit {
                break;
            }
        }
        self.stop_acquisition();
        for (_, sink) in self.threaded.drain(..) {
            let _ = sink.shutdown();
        }
        debug!("Engine {} worker stopped", self.uid);
    }

    fn wait_idle(&mut self) -> Flow {
        let commands = self.commands.clone();
        let receiver = self.input.receiver().clone();
        select! {
            recv(commands) -> cmd => match cmd {
                Ok(cmd) => self.handle_command(cmd),
                // Handle dropped without Shutdown
                Err(_) => Flow::Exit,
            },
            recv(receiver) -> msg => {
                if let Ok(envelope) = msg {
                    self.apply_message(envelope.payload);
                }
                Flow::Continue
            },
        }
    }

    fn run_between_buffers(&mut self) -> Flow {
        loop {
            match self.commands.try_recv() {
                Ok(cmd) => {
                    if self.handle_command(cmd) == Flow::Exit {
                        return Flow::Exit;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return Flow::Exit,
            }
        }
        while let Some(envelope) = self.input.try_pop() {
            self.apply_message(envelope.payload);
        }
        if self.shared.state() == EngineState::Running {
            self.acquire_one();
        }
        Flow::Continue
    }

    fn handle_command(&mut self, cmd: EngineCommand) -> Flow {
        match cmd {
            EngineCommand::Init { reply } => {
                let _ = reply.send(self.init_acquisition());
            }
            EngineCommand::Start { reply } => {
                let _ = reply.send(self.start_acquisition());
            }
            EngineCommand::Stop { reply } => {
                self.stop_acquisition();
                let _ = reply.send(());
            }
            EngineCommand::SetSource { source, reply } => {
                let _ = reply.send(self.set_source(source));
            }
            EngineCommand::SourceDescription { reply } => {
                let _ = reply.send(self.source.as_ref().map(|s| s.description()));
            }
            EngineCommand::AddSink { id, mut sink, reply } => {
                if let Some(stream) = self.running_stream() {
                    sink.start();
                    if let Err(e) = sink.configure(&stream_config(&stream)) {
                        report_sink_error(Some(&self.reports), sink.name(), &e);
                    }
                }
                debug!("Engine {}: sink {} attached", self.uid, sink.name());
                self.sinks.push((id, sink));
                let _ = reply.send(());
            }
            EngineCommand::RemoveSink { id, reply } => {
                let removed = self
                    .sinks
                    .iter()
                    .position(|(sid, _)| *sid == id)
                    .map(|idx| self.sinks.remove(idx).1)
                    .map(|mut sink| {
                        if self.shared.state() == EngineState::Running {
                            sink.stop();
                        }
                        sink
                    });
                let _ = reply.send(removed);
            }
            EngineCommand::AddThreadedSink { id, sink, reply } => {
                if let Some(stream) = self.running_stream() {
                    sink.post_start();
                    sink.post_config(stream_config(&stream));
                }
                debug!("Engine {}: threaded sink {} attached", self.uid, sink.name());
                self.threaded.push((id, sink));
                let _ = reply.send(());
            }
            EngineCommand::RemoveThreadedSink { id, reply } => {
                let removed = self
                    .threaded
                    .iter()
                    .position(|(sid, _)| *sid == id)
                    .map(|idx| self.threaded.remove(idx).1);
                if let Some(sink) = &removed {
                    if self.shared.state() == EngineState::Running {
                        sink.post_stop();
                    }
                }
                let _ = reply.send(removed);
            }
            EngineCommand::Shutdown => return Flow::Exit,
        }
        Flow::Continue
    }

    fn running_stream(&self) -> Option<StreamInfo> {
        (self.shared.state() == EngineState::Running)
            .then(|| self.stream.clone())
            .flatten()
    }

    fn set_state(&self, state: EngineState) {
        let previous = self.shared.set_state(state);
        if previous != state {
            info!("Engine {}: {} -> {}", self.uid, previous, state);
            self.reports.push(Report::StateChanged { engine: self.uid, state });
        }
    }

    fn fail(&self, message: String) -> bool {
        warn!("Engine {}: {}", self.uid, message);
        self.shared.set_error(message);
        false
    }

    fn init_acquisition(&mut self) -> bool {
        match self.shared.state() {
            EngineState::Initialized => return true,
            EngineState::Running => return self.fail("cannot initialize while running".to_string()),
            EngineState::Error => return self.fail("stop the engine to clear the error first".to_string()),
            EngineState::Idle => {}
        }
        let Some(source) = self.source.as_ref() else {
            return self.fail("no sample source attached".to_string());
        };
        if let Err(e) = source.validate() {
            return self.fail(e.to_string());
        }
        self.shared.set_error(String::new());
        self.set_state(EngineState::Initialized);
        true
    }

    fn start_acquisition(&mut self) -> bool {
        match self.shared.state() {
            EngineState::Running => return true,
            EngineState::Initialized => {}
            state => return self.fail(format!("cannot start acquisition in state {}", state)),
        }
        let Some(source) = self.source.as_mut() else {
            return self.fail("no sample source attached".to_string());
        };

        let info = match source.start() {
            Ok(info) => info,
            Err(e) => {
                let message = e.to_string();
                error!("Engine {}: failed to start source: {}", self.uid, message);
                self.shared.set_error(message.clone());
                self.reports.push(Report::Error {
                    engine: self.uid,
                    kind: ErrorKind::Acquisition,
                    message,
                });
                self.set_state(EngineState::Error);
                return false;
            }
        };

        info!(
            "Engine {}: acquisition started ({}S/s at {}Hz)",
            self.uid, info.sample_rate, info.center_frequency
        );
        self.samples_acquired = 0;
        self.notify_start(&info);
        self.reports.push(Report::StreamData {
            engine: self.uid,
            sample_rate: info.sample_rate,
            center_frequency: info.center_frequency,
            start_timestamp: info.start_timestamp,
        });
        self.stream = Some(info);
        self.reports.push(Report::Acquisition {
            engine: self.uid,
            running: true,
        });
        self.set_state(EngineState::Running);
        true
    }

    fn stop_acquisition(&mut self) {
        match self.shared.state() {
            EngineState::Running => self.halt(),
            EngineState::Idle => return,
            EngineState::Initialized | EngineState::Error => {}
        }
        self.set_state(EngineState::Idle);
    }

    /// Stop the source and tell every sink, without changing state
    fn halt(&mut self) {
        if let Some(source) = self.source.as_mut() {
            source.stop();
        }
        for (_, sink) in &mut self.sinks {
            sink.stop();
        }
        for (_, sink) in &self.threaded {
            sink.post_stop();
        }
        self.stream = None;
        info!(
            "Engine {}: acquisition stopped after {} samples",
            self.uid, self.samples_acquired
        );
        self.reports.push(Report::Acquisition {
            engine: self.uid,
            running: false,
        });
    }

    fn set_source(&mut self, source: Option<Box<dyn SampleSource>>) -> Result<Option<Box<dyn SampleSource>>> {
        let state = self.shared.state();
        if state == EngineState::Running {
            return Err(Error::InvalidState(state.to_string()));
        }
        if state == EngineState::Initialized {
            // Parameters changed; init has to be redone
            self.set_state(EngineState::Idle);
        }
        if let Some(source) = &source {
            info!("Engine {}: source {}", self.uid, source.description());
        }
        Ok(std::mem::replace(&mut self.source, source))
    }

    fn notify_start(&mut self, info: &StreamInfo) {
        let config = stream_config(info);
        for (_, sink) in &mut self.sinks {
            sink.start();
            if let Err(e) = sink.configure(&config) {
                report_sink_error(Some(&self.reports), sink.name(), &e);
            }
        }
        for (_, sink) in &self.threaded {
            sink.post_start();
            sink.post_config(config.clone());
        }
    }

    fn apply_message(&mut self, message: EngineMessage) {
        match message {
            EngineMessage::ConfigureCorrections {
                dc_offset,
                iq_imbalance,
            } => {
                debug!(
                    "Engine {}: corrections dc_offset={} iq_imbalance={}",
                    self.uid, dc_offset, iq_imbalance
                );
                self.corrections.set(dc_offset, iq_imbalance);
            }
            EngineMessage::ConfigureSource(settings) => self.configure_source(settings),
        }
    }

    fn configure_source(&mut self, settings: SourceSettings) {
        let Some(source) = self.source.as_mut() else {
            warn!("Engine {}: source settings without a source", self.uid);
            return;
        };
        if let Err(e) = source.configure(&settings) {
            let e = Error::from(e);
            warn!("Engine {}: {}", self.uid, e);
            self.reports.push(Report::Error {
                engine: self.uid,
                kind: e.kind(),
                message: e.to_string(),
            });
            return;
        }

        if let SourceSettings::CenterFrequency(center_frequency) = settings {
            if let Some(mut info) = self.running_stream() {
                info.center_frequency = center_frequency;
                let config = stream_config(&info);
                for (_, sink) in &mut self.sinks {
                    if let Err(e) = sink.configure(&config) {
                        report_sink_error(Some(&self.reports), sink.name(), &e);
                    }
                }
                for (_, sink) in &self.threaded {
                    sink.post_config(config.clone());
                }
                self.reports.push(Report::StreamData {
                    engine: self.uid,
                    sample_rate: info.sample_rate,
                    center_frequency,
                    start_timestamp: info.start_timestamp,
                });
                self.stream = Some(info);
            }
        }
    }

    /// Read one block from the source and fan it out
    fn acquire_one(&mut self) {
        let Some(source) = self.source.as_mut() else {
            self.set_state(EngineState::Idle);
            return;
        };

        match source.read(&mut self.buffer) {
            Ok(ReadOutcome::Data) => self.dispatch(),
            Ok(ReadOutcome::EndOfStream) => {
                info!("Engine {}: end of stream", self.uid);
                self.halt();
                self.set_state(EngineState::Idle);
            }
            Err(e) => {
                let message = e.to_string();
                error!("Engine {}: acquisition failed: {}", self.uid, message);
                self.shared.set_error(message.clone());
                self.reports.push(Report::Error {
                    engine: self.uid,
                    kind: ErrorKind::Acquisition,
                    message,
                });
                self.halt();
                self.set_state(EngineState::Error);
            }
        }
    }

    fn dispatch(&mut self) {
        let Some(info) = self.stream.as_ref() else {
            return;
        };
        if self.corrections.is_enabled() {
            self.corrections.apply(&mut self.buffer);
        }

        let buffer = SampleBuffer::from_slice(
            &self.buffer,
            info.sample_rate,
            info.center_frequency,
            self.samples_acquired,
        );
        self.samples_acquired += buffer.len() as u64;

        for (_, sink) in &mut self.sinks {
            if let Err(e) = sink.consume(&buffer) {
                report_sink_error(Some(&self.reports), sink.name(), &e);
            }
        }
        for (_, sink) in &self.threaded {
            sink.post_buffer(buffer.clone());
        }
    }
}

fn stream_config(info: &StreamInfo) -> SinkConfig {
    SinkConfig::StreamData {
        sample_rate: info.sample_rate,
        center_frequency: info.center_frequency,
    }
}
