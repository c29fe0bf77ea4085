//! Audio output backends
//!
//! A backend owns the physical output and its render thread. The output
//! manager opens it when the first fifo is attached and closes it when the
//! last one is removed; in between the backend pulls periods from the
//! [`Mixer`] at the output rate.
//!
//! - [`ClockedBackend`]: headless, paced by the system clock. Drives the
//!   pipeline without a sound card (CLI dry runs, tests).
//! - `CpalBackend`: sound card output (with the `cpal-output` feature).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::Sender;

use super::config::{AudioConfig, OutputKind, DEFAULT_PERIOD_FRAMES};
use super::error::{AudioError, AudioResult};
use super::mixer::Mixer;
use crate::types::StereoSample;

/// Physical audio output driven by the output manager
pub trait OutputBackend: Send {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Open the device and start pulling from `mixer`
    ///
    /// Returns the sample rate actually in use, which may differ from the
    /// requested one.
    fn open(&mut self, sample_rate: u32, mixer: Mixer) -> AudioResult<u32>;

    /// Stop pulling and release the device
    fn close(&mut self);
}

struct RenderThread {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Headless output rendering one period per period duration
pub struct ClockedBackend {
    period_frames: usize,
    tap: Option<Sender<Vec<StereoSample>>>,
    frames_rendered: Arc<AtomicU64>,
    thread: Option<RenderThread>,
}

impl ClockedBackend {
    pub fn new(period_frames: usize) -> Self {
        Self {
            period_frames: period_frames.max(1),
            tap: None,
            frames_rendered: Arc::new(AtomicU64::new(0)),
            thread: None,
        }
    }

    /// Also send every rendered period to `tap`
    pub fn with_tap(mut self, tap: Sender<Vec<StereoSample>>) -> Self {
        self.tap = Some(tap);
        self
    }

    /// Counter of frames rendered across all open/close cycles
    pub fn frames_rendered(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.frames_rendered)
    }
}

impl Default for ClockedBackend {
    fn default() -> Self {
        Self::new(DEFAULT_PERIOD_FRAMES as usize)
    }
}

impl OutputBackend for ClockedBackend {
    fn name(&self) -> &str {
        "clocked"
    }

    fn open(&mut self, sample_rate: u32, mixer: Mixer) -> AudioResult<u32> {
        if self.thread.is_some() {
            return Ok(sample_rate);
        }

        let sample_rate = sample_rate.max(1);
        let period_frames = self.period_frames;
        let period = Duration::from_secs_f64(period_frames as f64 / f64::from(sample_rate));
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let tap = self.tap.clone();
        let rendered = Arc::clone(&self.frames_rendered);

        let handle = thread::Builder::new()
            .name("audio-clocked".to_string())
            .spawn(move || {
                let mut buf = vec![StereoSample::silence(); period_frames];
                let mut deadline = Instant::now();
                while !stop_flag.load(Ordering::Acquire) {
                    mixer.render(&mut buf);
                    rendered.fetch_add(period_frames as u64, Ordering::Relaxed);
                    if let Some(tap) = &tap {
                        if tap.send(buf.clone()).is_err() {
                            log::debug!("Clocked output tap closed");
                        }
                    }

                    // Deadline pacing so sleep jitter does not accumulate
                    deadline += period;
                    let now = Instant::now();
                    if deadline > now {
                        thread::sleep(deadline - now);
                    } else {
                        deadline = now;
                    }
                }
            })
            .map_err(|e| AudioError::ThreadSpawn(e.to_string()))?;

        log::info!(
            "Clocked audio output opened: {}Hz, {} frames per period",
            sample_rate,
            period_frames
        );
        self.thread = Some(RenderThread { stop, handle });
        Ok(sample_rate)
    }

    fn close(&mut self) {
        if let Some(thread) = self.thread.take() {
            thread.stop.store(true, Ordering::Release);
            if thread.handle.join().is_err() {
                log::error!("Clocked audio render thread panicked");
            }
            log::info!("Clocked audio output closed");
        }
    }
}

impl Drop for ClockedBackend {
    fn drop(&mut self) {
        self.close();
    }
}

/// Build the backend selected by `config`
///
/// Falls back to the clocked backend when CPAL output is requested but the
/// crate was built without the `cpal-output` feature.
pub fn create_backend(config: &AudioConfig) -> Box<dyn OutputBackend> {
    match config.output {
        OutputKind::Null => Box::new(ClockedBackend::new(config.clamped_period())),
        OutputKind::Cpal => {
            #[cfg(feature = "cpal-output")]
            {
                Box::new(super::cpal_backend::CpalBackend::new(
                    config.device.clone(),
                    config.clamped_period() as u32,
                ))
            }

            #[cfg(not(feature = "cpal-output"))]
            {
                log::warn!("Built without cpal-output, using the clocked null output instead");
                Box::new(ClockedBackend::new(config.clamped_period()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::fifo::audio_fifo;
    use crate::audio::mixer::FifoHandle;

    #[test]
    fn test_clocked_backend_pulls_from_mixer() {
        let (tap_tx, tap_rx) = crossbeam::channel::unbounded();
        let mut backend = ClockedBackend::new(64).with_tap(tap_tx);
        let mixer = Mixer::new();
        let (mut w, r) = audio_fifo(256);
        w.write(&[StereoSample::mono(0.5); 64]).unwrap();
        mixer.attach(FifoHandle(0), r);

        assert_eq!(backend.open(48000, mixer.clone()).unwrap(), 48000);
        let first = tap_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(first.len(), 64);
        assert!(first.iter().all(|s| *s == StereoSample::mono(0.5)));

        backend.close();
        assert!(backend.frames_rendered().load(Ordering::Relaxed) >= 64);
        // Closing twice is harmless
        backend.close();
    }
}
