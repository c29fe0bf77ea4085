//! Fan-in mixer for the shared audio output
//!
//! The mixer holds the reader half of every attached fifo. The backend's
//! render thread calls [`Mixer::render`] once per period: each fifo's queued
//! frames are summed into the output and the sum is clamped to [-1, 1].
//! Fifos that have nothing queued contribute silence for the missing frames.
//! Underflow is counted in the fifo's stats and logged once per burst.

use std::sync::{Arc, Mutex, PoisonError};

use super::fifo::AudioFifoReader;
use crate::error::FifoError;
use crate::types::StereoSample;

/// Handle identifying one attached fifo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FifoHandle(pub(crate) u64);

impl FifoHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

struct MixerInput {
    handle: FifoHandle,
    reader: AudioFifoReader,
    underflowing: bool,
}

#[derive(Default)]
struct MixerState {
    inputs: Vec<MixerInput>,
    frames_rendered: u64,
    clipped_frames: u64,
    underflow_bursts: u64,
}

/// Cloneable handle to the set of mixed fifos
#[derive(Clone, Default)]
pub struct Mixer {
    state: Arc<Mutex<MixerState>>,
}

impl std::fmt::Debug for Mixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mixer").field("inputs", &self.input_count()).finish()
    }
}

impl Mixer {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn attach(&self, handle: FifoHandle, reader: AudioFifoReader) {
        self.lock().inputs.push(MixerInput {
            handle,
            reader,
            underflowing: false,
        });
    }

    pub(crate) fn detach(&self, handle: FifoHandle) -> Option<AudioFifoReader> {
        let mut state = self.lock();
        let idx = state.inputs.iter().position(|i| i.handle == handle)?;
        Some(state.inputs.swap_remove(idx).reader)
    }

    /// Drop every input, returning how many there were
    pub(crate) fn clear(&self) -> usize {
        let mut state = self.lock();
        let n = state.inputs.len();
        state.inputs.clear();
        n
    }

    /// Render one period of mixed output into `out`
    pub fn render(&self, out: &mut [StereoSample]) {
        out.fill(StereoSample::silence());
        let mut state = self.lock();
        let mut bursts = 0u64;
        for input in &mut state.inputs {
            match input.reader.mix_into(out) {
                Ok(()) => input.underflowing = false,
                Err(FifoError::Underflow { missing }) if !input.underflowing => {
                    input.underflowing = true;
                    bursts += 1;
                    log::debug!(
                        "Audio fifo {} underflow, {} frames zero-filled",
                        input.handle.id(),
                        missing
                    );
                }
                Err(_) => {}
            }
        }
        state.underflow_bursts += bursts;

        let mut clipped = 0u64;
        for frame in out.iter_mut() {
            if frame.peak() > 1.0 {
                clipped += 1;
            }
            *frame = frame.clamped();
        }
        state.frames_rendered += out.len() as u64;
        state.clipped_frames += clipped;
    }

    pub fn input_count(&self) -> usize {
        self.lock().inputs.len()
    }

    /// Total frames rendered since creation
    pub fn frames_rendered(&self) -> u64 {
        self.lock().frames_rendered
    }

    /// Frames where the summed signal exceeded full scale
    pub fn clipped_frames(&self) -> u64 {
        self.lock().clipped_frames
    }

    /// Times an input ran dry after having kept up
    pub fn underflow_bursts(&self) -> u64 {
        self.lock().underflow_bursts
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MixerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
