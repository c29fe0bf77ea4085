//! Signal processing building blocks
//!
//! - [`window`]: Kaiser window and windowed-sinc low-pass design
//! - [`Nco`]: frequency translation
//! - [`DecimatingFir`]: low-pass filter with integer decimation
//! - [`Channelizer`]: NCO + FIR + decimation as a [`SampleSink`](crate::sink::SampleSink)
//! - [`Corrections`]: DC offset and IQ imbalance removal

mod channelizer;
mod corrections;
mod fir;
mod nco;
pub mod window;

pub use channelizer::{ChannelPlan, Channelizer, STOPBAND_ATTENUATION_DB};
pub use corrections::Corrections;
pub use fir::DecimatingFir;
pub use nco::Nco;
