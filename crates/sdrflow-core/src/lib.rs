//! sdrflow core - real-time SDR sample pipeline
//!
//! Device engines acquire I/Q buffers from a [`source::SampleSource`] and fan
//! them out to [`sink::SampleSink`]s; channelizers and demodulators turn a
//! slice of the band into audio mixed by the shared
//! [`audio::AudioOutputManager`].

pub mod audio;
pub mod config;
pub mod demod;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod message;
pub mod sink;
pub mod source;
pub mod types;

pub use engine::{DeviceEngine, DspContext, EngineState};
pub use error::{Error, ErrorKind, Result};
pub use types::*;
