//! Common types for sdrflow
//!
//! Fundamental sample types shared by sources, sinks, channelizers and the
//! audio output: complex baseband samples, sample buffers handed from an
//! engine to its sinks, and stereo audio frames.

use std::sync::Arc;

use num_complex::Complex32;

/// Default audio output rate (48kHz)
/// The output manager adopts the rate actually negotiated with the backend.
pub const AUDIO_SAMPLE_RATE: u32 = 48000;

/// Default number of complex samples per acquisition buffer
pub const DEFAULT_BUFFER_LEN: usize = 4096;

/// Complex I/Q sample, normalized to [-1.0, 1.0] per component
pub type IqSample = Complex32;

/// Audio sample type (32-bit float)
pub type Sample = f32;

/// A block of I/Q samples as captured from a source or produced by a channelizer
///
/// The samples are behind an `Arc` so one captured buffer can be handed to
/// every attached sink without copying. Sinks only ever see an immutable view.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: Arc<[IqSample]>,
    /// Sample rate of this block in samples per second
    pub sample_rate: u32,
    /// Absolute center frequency in Hz
    pub center_frequency: u64,
    /// Index of the first sample of this block since acquisition start
    pub first_sample: u64,
}

impl SampleBuffer {
    pub fn new(samples: Vec<IqSample>, sample_rate: u32, center_frequency: u64, first_sample: u64) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
            center_frequency,
            first_sample,
        }
    }

    /// Copy `samples` into a new shared block
    pub fn from_slice(samples: &[IqSample], sample_rate: u32, center_frequency: u64, first_sample: u64) -> Self {
        Self {
            samples: Arc::from(samples),
            sample_rate,
            center_frequency,
            first_sample,
        }
    }

    #[inline]
    pub fn samples(&self) -> &[IqSample] {
        &self.samples
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration of this block in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }

    /// Whether two handles point at the same captured block
    pub fn shares_storage(&self, other: &SampleBuffer) -> bool {
        Arc::ptr_eq(&self.samples, &other.samples)
    }
}

/// A single stereo audio frame (left and right channels)
///
/// `#[repr(C)]` keeps the layout [left, right] so a frame slice can be cast
/// to an interleaved `&[f32]` with bytemuck.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    /// Same value in both channels
    #[inline]
    pub fn mono(value: Sample) -> Self {
        Self { left: value, right: value }
    }

    /// Clamp both channels to the [-1.0, 1.0] output range
    #[inline]
    pub fn clamped(&self) -> Self {
        Self {
            left: self.left.clamp(-1.0, 1.0),
            right: self.right.clamp(-1.0, 1.0),
        }
    }

    /// Peak amplitude (max of abs(left), abs(right))
    #[inline]
    pub fn peak(&self) -> Sample {
        self.left.abs().max(self.right.abs())
    }
}

impl std::ops::Add for StereoSample {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self {
            left: self.left + other.left,
            right: self.right + other.right,
        }
    }
}

impl std::ops::AddAssign for StereoSample {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.left += other.left;
        self.right += other.right;
    }
}

impl std::ops::Mul<Sample> for StereoSample {
    type Output = Self;

    #[inline]
    fn mul(self, factor: Sample) -> Self {
        Self {
            left: self.left * factor,
            right: self.right * factor,
        }
    }
}
