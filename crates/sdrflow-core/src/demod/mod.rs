//! Demodulators: channel samples in, audio fifo frames out
//!
//! Both demodulators are [`SampleSink`](crate::sink::SampleSink)s meant to
//! sit behind a [`Channelizer`](crate::dsp::Channelizer). They learn their
//! input rate from `StreamData` (or the buffers themselves) and resample to
//! the rate of the fifo they write.

mod am;
mod biquad;
mod output;
mod passthrough;
mod resample;

pub use am::{AmDemod, AmSettings, DEFAULT_RF_BANDWIDTH_INDEX, RF_BANDWIDTHS};
pub use biquad::{Biquad, BiquadCoeffs};
pub use passthrough::PassthroughDemod;
pub use resample::LinearResampler;
