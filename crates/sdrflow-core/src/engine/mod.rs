//! Device engines and the context that owns them
//!
//! A [`DeviceEngine`] drives one sample source on its own worker thread and
//! fans every buffer out to its sinks. A [`DspContext`] owns the engines of
//! a process together with the shared audio output.

mod claims;
mod command;
mod device;
mod registry;
mod state;
mod worker;

pub use claims::SourceClaims;
pub use command::SinkId;
pub use device::DeviceEngine;
pub use registry::{ChannelHandle, DspContext};
pub use state::EngineState;
