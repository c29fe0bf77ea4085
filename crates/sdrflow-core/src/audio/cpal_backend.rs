//! CPAL audio backend
//!
//! Plays the mixer output on a sound card. `cpal::Stream` cannot move
//! between threads, so the stream lives on a dedicated owner thread that
//! builds it, reports the negotiated rate back to `open`, and keeps it alive
//! until `close` signals it to drop the stream.
//!
//! ```text
//! ┌──────────────┐  open()   ┌──────────────────┐  build + play  ┌──────────────────┐
//! │ OutputManager│ ────────► │ audio-cpal owner │ ─────────────► │ CPAL callback    │
//! │              │ ◄──rate── │ (holds Stream)   │                │ mixer.render()   │
//! └──────────────┘           └──────────────────┘                └──────────────────┘
//! ```

use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig};
use crossbeam::channel::{bounded, Sender};

use super::backend::OutputBackend;
use super::config::MAX_BUFFER_SIZE;
use super::error::{AudioError, AudioResult};
use super::mixer::Mixer;
use crate::types::StereoSample;

struct StreamOwner {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Sound card output through CPAL
pub struct CpalBackend {
    device_name: Option<String>,
    period_frames: u32,
    owner: Option<StreamOwner>,
}

impl CpalBackend {
    pub fn new(device_name: Option<String>, period_frames: u32) -> Self {
        Self {
            device_name,
            period_frames,
            owner: None,
        }
    }
}

impl OutputBackend for CpalBackend {
    fn name(&self) -> &str {
        "cpal"
    }

    fn open(&mut self, sample_rate: u32, mixer: Mixer) -> AudioResult<u32> {
        if self.owner.is_some() {
            return Ok(sample_rate);
        }

        let (ready_tx, ready_rx) = bounded::<AudioResult<u32>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let device_name = self.device_name.clone();
        let period_frames = self.period_frames;

        let handle = thread::Builder::new()
            .name("audio-cpal".to_string())
            .spawn(move || {
                let stream = match build_stream(device_name.as_deref(), sample_rate, period_frames, mixer) {
                    Ok((stream, rate)) => {
                        let _ = ready_tx.send(Ok(rate));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Keep the stream alive until close()
                let _ = stop_rx.recv();
                drop(stream);
                log::info!("CPAL audio stream stopped");
            })
            .map_err(|e| AudioError::ThreadSpawn(e.to_string()))?;

        let rate = ready_rx
            .recv()
            .map_err(|e| AudioError::StreamBuildError(e.to_string()))??;
        self.owner = Some(StreamOwner { stop_tx, handle });
        Ok(rate)
    }

    fn close(&mut self) {
        if let Some(owner) = self.owner.take() {
            let _ = owner.stop_tx.send(());
            if owner.handle.join().is_err() {
                log::error!("CPAL stream owner thread panicked");
            }
        }
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        self.close();
    }
}

fn find_device(name: Option<&str>) -> AudioResult<cpal::Device> {
    let host = cpal::default_host();
    match name {
        Some(wanted) => host
            .output_devices()
            .map_err(|e| AudioError::ConfigError(e.to_string()))?
            .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
            .ok_or_else(|| AudioError::DeviceNotFound(wanted.to_string())),
        None => host.default_output_device().ok_or(AudioError::NoDevices),
    }
}

/// Pick an f32 stereo config covering `sample_rate`, or the closest fallback
fn output_config(device: &cpal::Device, sample_rate: u32) -> AudioResult<cpal::SupportedStreamConfig> {
    let supported: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();

    let in_range = |c: &cpal::SupportedStreamConfigRange| {
        sample_rate >= c.min_sample_rate().0 && sample_rate <= c.max_sample_rate().0
    };

    let best = supported
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .filter(|c| c.channels() >= 2)
        .find(|c| in_range(c))
        .or_else(|| {
            supported
                .iter()
                .filter(|c| c.sample_format() == SampleFormat::F32)
                .find(|c| c.channels() >= 2)
        })
        .ok_or_else(|| AudioError::ConfigError("No f32 stereo output configuration".to_string()))?;

    let rate = if in_range(best) {
        cpal::SampleRate(sample_rate)
    } else {
        let fallback = best.max_sample_rate();
        log::warn!(
            "Audio device doesn't support {}Hz, falling back to {}Hz",
            sample_rate,
            fallback.0
        );
        fallback
    };
    Ok(best.clone().with_sample_rate(rate))
}

fn build_stream(
    device_name: Option<&str>,
    sample_rate: u32,
    period_frames: u32,
    mixer: Mixer,
) -> AudioResult<(Stream, u32)> {
    let device = find_device(device_name)?;
    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    let supported = output_config(&device, sample_rate)?;
    let rate = supported.sample_rate().0;

    let config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(period_frames),
    };
    let channels = config.channels as usize;
    log::info!(
        "Using audio device {}: {} channels, {}Hz, {} frames",
        name,
        channels,
        rate,
        period_frames
    );

    let mut scratch = vec![StereoSample::silence(); MAX_BUFFER_SIZE];
    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                for block in data.chunks_mut(MAX_BUFFER_SIZE * channels) {
                    let n_frames = block.len() / channels;
                    let frames = &mut scratch[..n_frames];
                    mixer.render(frames);
                    for (frame, sample) in block.chunks_mut(channels).zip(frames.iter()) {
                        frame[0] = sample.left;
                        if channels > 1 {
                            frame[1] = sample.right;
                        }
                        for ch in frame.iter_mut().skip(2) {
                            *ch = 0.0;
                        }
                    }
                }
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

    stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;
    Ok((stream, rate))
}
