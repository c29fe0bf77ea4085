//! Audio output manager: reference-counted owner of the shared output
//!
//! Every demodulator writes into its own [`AudioFifoWriter`](super::AudioFifoWriter);
//! the matching reader is handed to the manager, which mixes all attached
//! readers into the one physical output.
//!
//! ```text
//!  demod A ──► fifo A ─┐
//!  demod B ──► fifo B ─┼──► Mixer ──► OutputBackend (render thread)
//!  demod C ──► fifo C ─┘
//! ```
//!
//! The device is open exactly while `usage_count > 0`: the 0→1 transition in
//! [`AudioOutputManager::add_fifo`] opens it and the 1→0 transition in
//! [`AudioOutputManager::remove_fifo`] closes it. All fifos share the manager's
//! rate; producers at other rates resample before writing.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::backend::OutputBackend;
use super::error::{AudioError, AudioResult};
use super::fifo::AudioFifoReader;
use super::mixer::{FifoHandle, Mixer};

struct ManagerState {
    backend: Box<dyn OutputBackend>,
    usage_count: usize,
    sample_rate: u32,
    next_handle: u64,
    open: bool,
}

/// Shared handle to the process audio output
#[derive(Clone)]
pub struct AudioOutputManager {
    state: Arc<Mutex<ManagerState>>,
    mixer: Mixer,
}

impl std::fmt::Debug for AudioOutputManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("AudioOutputManager")
            .field("backend", &state.backend.name())
            .field("usage_count", &state.usage_count)
            .field("sample_rate", &state.sample_rate)
            .field("open", &state.open)
            .finish()
    }
}

impl AudioOutputManager {
    pub fn new(backend: Box<dyn OutputBackend>, sample_rate: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManagerState {
                backend,
                usage_count: 0,
                sample_rate,
                next_handle: 0,
                open: false,
            })),
            mixer: Mixer::new(),
        }
    }

    /// Attach a fifo, opening the output if it is the first one
    ///
    /// If opening the device fails the fifo is not attached and the usage
    /// count stays at zero.
    pub fn add_fifo(&self, reader: AudioFifoReader) -> AudioResult<FifoHandle> {
        let mut state = self.lock();
        let handle = FifoHandle(state.next_handle);
        state.next_handle += 1;
        self.mixer.attach(handle, reader);

        if state.usage_count == 0 {
            let requested = state.sample_rate;
            match state.backend.open(requested, self.mixer.clone()) {
                Ok(actual) => {
                    if actual != requested {
                        log::warn!(
                            "Audio output runs at {}Hz instead of {}Hz, producers must resample",
                            actual,
                            requested
                        );
                    }
                    state.sample_rate = actual;
                    state.open = true;
                }
                Err(e) => {
                    self.mixer.detach(handle);
                    log::error!("Failed to open audio output: {}", e);
                    return Err(e);
                }
            }
        }

        state.usage_count += 1;
        log::debug!(
            "Audio fifo {} attached (usage count {})",
            handle.id(),
            state.usage_count
        );
        Ok(handle)
    }

    /// Detach a fifo, closing the output if it was the last one
    pub fn remove_fifo(&self, handle: FifoHandle) -> AudioResult<AudioFifoReader> {
        let mut state = self.lock();
        let reader = self
            .mixer
            .detach(handle)
            .ok_or(AudioError::UnknownFifo(handle.id()))?;

        state.usage_count -= 1;
        if state.usage_count == 0 && state.open {
            state.backend.close();
            state.open = false;
        }
        log::debug!(
            "Audio fifo {} removed (usage count {})",
            handle.id(),
            state.usage_count
        );
        Ok(reader)
    }

    /// Change the output rate; only allowed while the output is closed
    pub fn set_sample_rate(&self, sample_rate: u32) -> AudioResult<()> {
        let mut state = self.lock();
        if state.open {
            return Err(AudioError::RateLocked {
                current: state.sample_rate,
            });
        }
        state.sample_rate = sample_rate;
        Ok(())
    }

    pub fn sample_rate(&self) -> u32 {
        self.lock().sample_rate
    }

    pub fn usage_count(&self) -> usize {
        self.lock().usage_count
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    /// Detach everything and close the output (process teardown)
    pub fn shutdown(&self) {
        let mut state = self.lock();
        let attached = self.mixer.clear();
        if state.open {
            state.backend.close();
            state.open = false;
        }
        state.usage_count = 0;
        if attached > 0 {
            log::info!("Audio output shut down with {} fifos still attached", attached);
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
