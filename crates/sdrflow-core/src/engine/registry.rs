//! Explicit context owning every device engine and the audio output
//!
//! There is no process-wide registry: whoever needs engines creates a
//! [`DspContext`] and passes it down. Engines are indexed in creation order
//! and by uid; device claims are shared by all engines of one context.

use log::{info, warn};

use super::claims::SourceClaims;
use super::command::SinkId;
use super::device::DeviceEngine;
use crate::audio::{
    audio_fifo, create_backend, AudioConfig, AudioFifoWriter, AudioOutputManager, ClockedBackend, FifoHandle,
    OutputBackend,
};
use crate::config::{ChannelConfig, DemodKind};
use crate::demod::{AmDemod, PassthroughDemod};
use crate::dsp::Channelizer;
use crate::error::{Error, Result};
use crate::message::{MessageQueue, ReportQueue};
use crate::sink::{SampleSink, SinkConfig, SinkItem, ThreadedSink};
use crate::types::AUDIO_SAMPLE_RATE;

/// A channelizer + demodulator attached to an engine and the audio output
#[derive(Debug)]
pub struct ChannelHandle {
    name: String,
    engine: u32,
    sink: SinkId,
    fifo: FifoHandle,
    queue: MessageQueue<SinkItem>,
}

impl ChannelHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Uid of the engine feeding this channel
    pub fn engine(&self) -> u32 {
        self.engine
    }

    pub fn sink_id(&self) -> SinkId {
        self.sink
    }

    /// Queue a configuration change; applied after the buffers already queued
    pub fn configure(&self, config: SinkConfig) -> u64 {
        self.queue.push(SinkItem::Configure(config))
    }
}

pub struct DspContext {
    engines: Vec<DeviceEngine>,
    audio: AudioOutputManager,
    claims: SourceClaims,
    next_uid: u32,
}

impl std::fmt::Debug for DspContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DspContext")
            .field("engines", &self.engines)
            .field("audio", &self.audio)
            .finish()
    }
}

impl Default for DspContext {
    /// Headless context with a clocked 48kHz output
    fn default() -> Self {
        Self::with_backend(Box::new(ClockedBackend::default()), AUDIO_SAMPLE_RATE)
    }
}

impl DspContext {
    pub fn new(audio: AudioOutputManager) -> Self {
        Self {
            engines: Vec::new(),
            audio,
            claims: SourceClaims::new(),
            next_uid: 0,
        }
    }

    pub fn with_backend(backend: Box<dyn OutputBackend>, sample_rate: u32) -> Self {
        Self::new(AudioOutputManager::new(backend, sample_rate))
    }

    /// Context with the backend selected by `config`
    pub fn from_config(config: &AudioConfig) -> Self {
        Self::with_backend(create_backend(config), config.sample_rate)
    }

    /// Create a new engine, returning its index
    pub fn add_engine(&mut self) -> Result<usize> {
        let engine = DeviceEngine::new(self.next_uid, self.claims.clone())?;
        self.next_uid += 1;
        self.engines.push(engine);
        Ok(self.engines.len() - 1)
    }

    pub fn engine(&self, index: usize) -> Option<&DeviceEngine> {
        self.engines.get(index)
    }

    pub fn engine_by_uid(&self, uid: u32) -> Option<&DeviceEngine> {
        self.engines.iter().find(|e| e.uid() == uid)
    }

    pub fn engines(&self) -> &[DeviceEngine] {
        &self.engines
    }

    pub fn engine_count(&self) -> usize {
        self.engines.len()
    }

    /// Shut down and drop the engine at `index`
    pub fn remove_engine(&mut self, index: usize) -> bool {
        if index >= self.engines.len() {
            return false;
        }
        let mut engine = self.engines.remove(index);
        engine.shutdown();
        true
    }

    pub fn audio(&self) -> &AudioOutputManager {
        &self.audio
    }

    pub fn claims(&self) -> &SourceClaims {
        &self.claims
    }

    /// Attach a demodulated channel to the engine with `uid`
    ///
    /// Opens the audio output if this is its first fifo, then spawns the
    /// channel's sink thread and hands it to the engine. Reports from the
    /// channel go to the engine's output queue.
    pub fn attach_channel(&self, uid: u32, config: &ChannelConfig) -> Result<ChannelHandle> {
        config.validate()?;
        let engine = self.engine_by_uid(uid).ok_or(Error::EngineGone(uid))?;

        let (writer, reader) = audio_fifo(config.fifo_frames);
        let fifo = self.audio.add_fifo(reader)?;
        // The backend may have negotiated another rate than requested
        let audio_rate = self.audio.sample_rate();

        let sink = match spawn_channel(engine, config, writer, audio_rate) {
            Ok(sink) => sink,
            Err(e) => {
                self.release_fifo(fifo);
                return Err(e);
            }
        };
        let queue = sink.input_message_queue().clone();
        let sink_id = match engine.add_threaded_sink(sink) {
            Ok(id) => id,
            Err(e) => {
                self.release_fifo(fifo);
                return Err(e);
            }
        };

        info!(
            "Channel {} attached to engine {} at {:+}Hz ({:?})",
            config.name, uid, config.center_offset, config.demod
        );
        Ok(ChannelHandle {
            name: config.name.clone(),
            engine: uid,
            sink: sink_id,
            fifo,
            queue,
        })
    }

    /// Detach a channel: its sink thread is joined and its fifo detached
    ///
    /// The fifo is released even when the engine is already gone, so the
    /// output closes once the last channel is detached. The engine error is
    /// still returned in that case.
    pub fn detach_channel(&self, channel: ChannelHandle) -> Result<()> {
        let removed = match self.engine_by_uid(channel.engine) {
            Some(engine) => engine.remove_threaded_sink(channel.sink).map(|sink| {
                if let Some(sink) = sink {
                    let _ = sink.shutdown();
                }
            }),
            None => Err(Error::EngineGone(channel.engine)),
        };
        let released = self.audio.remove_fifo(channel.fifo);
        removed?;
        released?;
        info!("Channel {} detached", channel.name);
        Ok(())
    }

    fn release_fifo(&self, fifo: FifoHandle) {
        if let Err(e) = self.audio.remove_fifo(fifo) {
            warn!("Failed to release audio fifo {}: {}", fifo.id(), e);
        }
    }

    /// Shut every engine down and close the audio output
    pub fn shutdown(&mut self) {
        for mut engine in self.engines.drain(..) {
            engine.shutdown();
        }
        self.audio.shutdown();
    }
}

impl Drop for DspContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_channel(
    engine: &DeviceEngine,
    config: &ChannelConfig,
    writer: AudioFifoWriter,
    audio_rate: u32,
) -> Result<ThreadedSink> {
    let reports = engine.output_message_queue().clone();
    match config.demod {
        DemodKind::Am => {
            let demod = AmDemod::new(config.name.clone(), writer, audio_rate).with_settings(config.am.clone());
            ThreadedSink::spawn(channelizer(config, demod, &reports), Some(reports))
        }
        DemodKind::Passthrough => {
            let demod = PassthroughDemod::new(config.name.clone(), writer, audio_rate);
            ThreadedSink::spawn(channelizer(config, demod, &reports), Some(reports))
        }
    }
}

fn channelizer<S: SampleSink>(
    config: &ChannelConfig,
    demod: S,
    reports: &ReportQueue,
) -> Channelizer<S> {
    let channelizer = Channelizer::new(config.name.clone(), config.center_offset, config.target_rate, demod)
        .with_reports(reports.clone());
    match config.bandwidth {
        Some(bw) => channelizer.with_bandwidth(bw),
        None => channelizer,
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use crossbeam::channel::unbounded;

    use super::*;
    use crate::engine::EngineState;
    use crate::error::ErrorKind;
    use crate::message::Report;
    use crate::source::ToneSource;
    use crate::types::StereoSample;

    #[test]
    fn test_engines_indexed_by_position_and_uid() {
        let mut ctx = DspContext::default();
        let a = ctx.add_engine().unwrap();
        let b = ctx.add_engine().unwrap();
        assert_eq!((a, b), (0, 1));
        assert_eq!(ctx.engine(1).unwrap().uid(), 1);
        assert!(ctx.engine_by_uid(0).is_some());

        assert!(ctx.remove_engine(0));
        assert_eq!(ctx.engine_count(), 1);
        assert!(ctx.engine_by_uid(0).is_none());
        assert_eq!(ctx.engine(0).unwrap().uid(), 1);
        assert_eq!(ctx.add_engine().unwrap(), 1);
        assert_eq!(ctx.engine(1).unwrap().uid(), 2);
    }

    #[test]
    fn test_source_claimed_by_one_engine_only() {
        let mut ctx = DspContext::default();
        ctx.add_engine().unwrap();
        ctx.add_engine().unwrap();
        let tone = || Box::new(ToneSource::new("rtl:0", 48000, 0.0, 0.1));

        ctx.engine(0).unwrap().set_source(tone()).unwrap();
        let Err(err) = ctx.engine(1).unwrap().set_source(tone()) else {
            panic!("second claim of rtl:0 must fail");
        };
        assert_eq!(err.kind(), ErrorKind::ResourceBusy);
        assert!(ctx.claims().is_claimed("rtl:0"));

        ctx.remove_engine(0);
        assert!(!ctx.claims().is_claimed("rtl:0"));
        ctx.engine(0).unwrap().set_source(tone()).unwrap();
    }

    #[test]
    fn test_tone_end_to_end_through_fifo() {
        // 48kHz tone, unit ratio channel, pass-through demod, one second of
        // audio through a 100ms fifo drained by a consumer thread
        let mut ctx = DspContext::default();
        ctx.add_engine().unwrap();
        let engine = ctx.engine(0).unwrap();
        let source = ToneSource::new("tone", 48000, 1000.0, 0.5)
            .with_block_len(480)
            .with_limit(48000)
            .paced(true);
        engine.set_source(Box::new(source)).unwrap();

        let (writer, mut reader) = audio_fifo(4800);
        let stats = reader.stats();
        let demod = PassthroughDemod::new("e2e", writer, 48000);
        let sink = ThreadedSink::spawn(Channelizer::new("e2e", 0, 48000, demod), None).unwrap();
        engine.add_threaded_sink(sink).unwrap();

        // Prime with 50ms, then pull one 10ms period per tick like an output callback
        let consumer = std::thread::spawn(move || {
            let mut received = Vec::with_capacity(48000);
            let mut chunk = vec![StereoSample::silence(); 480];
            let deadline = Instant::now() + Duration::from_secs(10);
            while reader.available() < 2400 {
                if Instant::now() > deadline {
                    return received;
                }
                std::thread::sleep(Duration::from_millis(1));
            }
            let mut tick = Instant::now();
            while received.len() < 48000 {
                let _ = reader.read(&mut chunk);
                received.extend_from_slice(&chunk);
                tick += Duration::from_millis(10);
                if let Some(wait) = tick.checked_duration_since(Instant::now()) {
                    std::thread::sleep(wait);
                }
            }
            received
        });

        assert!(engine.init_acquisition());
        assert!(engine.start_acquisition());
        let received = consumer.join().unwrap();

        assert_eq!(received.len(), 48000);
        assert_eq!(stats.dropped(), 0);
        assert_eq!(stats.overflows(), 0);
        assert_eq!(stats.underflows(), 0);
        assert_eq!(stats.zero_filled(), 0);
        for (n, frame) in received.iter().enumerate().step_by(997) {
            let phase = std::f64::consts::TAU * 1000.0 * n as f64 / 48000.0;
            assert!((frame.left - 0.5 * phase.cos() as f32).abs() < 1e-3, "frame {}", n);
            assert!((frame.right - 0.5 * phase.sin() as f32).abs() < 1e-3, "frame {}", n);
        }
    }

    #[test]
    fn test_channel_through_clocked_output() {
        let (tap_tx, tap_rx) = unbounded();
        let backend = ClockedBackend::new(480).with_tap(tap_tx);
        let mut ctx = DspContext::with_backend(Box::new(backend), 48000);
        ctx.add_engine().unwrap();
        let engine = ctx.engine(0).unwrap();
        let source = ToneSource::new("tone", 96000, 0.0, 0.5)
            .with_block_len(960)
            .with_limit(96000 / 2)
            .paced(true);
        engine.set_source(Box::new(source)).unwrap();

        let mut config = ChannelConfig::new("dc", 0);
        config.demod = DemodKind::Passthrough;
        let channel = ctx.attach_channel(0, &config).unwrap();
        assert!(ctx.audio().is_open());
        assert_eq!(ctx.audio().usage_count(), 1);

        assert!(engine.init_acquisition());
        assert!(engine.start_acquisition());

        let reports = engine.output_message_queue();
        let mut configured = None;
        while let Some(env) = reports.pop_timeout(Duration::from_secs(5)) {
            match env.payload {
                Report::ChannelConfigured { decimation, output_rate, .. } => {
                    configured = Some((decimation, output_rate))
                }
                Report::StateChanged {
                    state: EngineState::Idle,
                    ..
                } => break,
                _ => {}
            }
        }
        assert_eq!(configured, Some((2, 48000)));

        // The DC tone settles at 0.5 on the left channel; the filter rings
        // at both edges of the burst so the level is taken as the median
        let mut levels: Vec<f32> = tap_rx
            .try_iter()
            .flatten()
            .map(|frame| frame.left)
            .filter(|left| *left > 0.25)
            .collect();
        assert!(levels.len() > 12000, "{} frames above silence", levels.len());
        levels.sort_by(f32::total_cmp);
        let level = levels[levels.len() / 2];
        assert!((level - 0.5).abs() < 0.02, "level {}", level);

        ctx.detach_channel(channel).unwrap();
        assert!(!ctx.audio().is_open());
    }

    #[test]
    fn test_detach_after_engine_removed_releases_fifo() {
        let mut ctx = DspContext::with_backend(Box::new(ClockedBackend::new(480)), 48000);
        ctx.add_engine().unwrap();
        let channel = ctx.attach_channel(0, &ChannelConfig::new("orphan", 0)).unwrap();
        assert_eq!(ctx.audio().usage_count(), 1);

        assert!(ctx.remove_engine(0));
        let err = ctx.detach_channel(channel).unwrap_err();
        assert!(matches!(err, Error::EngineGone(0)));
        assert_eq!(ctx.audio().usage_count(), 0);
        assert!(!ctx.audio().is_open());
    }

    #[test]
    fn test_attach_rejects_invalid_channel() {
        let mut ctx = DspContext::default();
        ctx.add_engine().unwrap();
        let mut config = ChannelConfig::new("bad", 0);
        config.target_rate = 0;
        let err = ctx.attach_channel(0, &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(ctx.audio().usage_count(), 0);

        let err = ctx.attach_channel(7, &ChannelConfig::default()).unwrap_err();
        assert!(matches!(err, Error::EngineGone(7)));
    }
}
