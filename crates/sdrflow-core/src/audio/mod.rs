//! Shared audio output for all demodulators
//!
//! # Architecture
//!
//! - **Sink threads**: each demodulator owns the producer half of an
//!   [`AudioFifoWriter`] and writes frames at the output rate
//! - **Render thread**: the backend pulls one period at a time from the
//!   [`Mixer`], which sums every attached [`AudioFifoReader`]
//! - **Manager**: [`AudioOutputManager`] reference-counts attached fifos and
//!   opens/closes the backend on the 0↔1 transitions
//!
//! Fifos are lock-free SPSC rings (`rtrb`); only the attachment set and the
//! usage count sit behind a mutex.
//!
//! # Example Usage
//!
//! ```ignore
//! use sdrflow_core::audio::{audio_fifo, AudioOutputManager, ClockedBackend};
//!
//! let manager = AudioOutputManager::new(Box::new(ClockedBackend::default()), 48000);
//! let (writer, reader) = audio_fifo(4800);
//! let handle = manager.add_fifo(reader)?;   // opens the output
//! // hand `writer` to a demodulator...
//! manager.remove_fifo(handle)?;             // closes the output
//! ```

mod backend;
mod config;
mod error;
mod fifo;
mod mixer;
mod output;

#[cfg(feature = "cpal-output")]
mod cpal_backend;

pub use backend::{create_backend, ClockedBackend, OutputBackend};
pub use config::{AudioConfig, OutputKind, DEFAULT_PERIOD_FRAMES, MAX_BUFFER_SIZE};
pub use error::{AudioError, AudioResult};
pub use fifo::{audio_fifo, AudioFifoReader, AudioFifoWriter, FifoStats};
pub use mixer::{FifoHandle, Mixer};
pub use output::AudioOutputManager;

#[cfg(feature = "cpal-output")]
pub use cpal_backend::CpalBackend;
