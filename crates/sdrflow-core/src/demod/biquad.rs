//! Mono biquad filter for the audio path

use std::f32::consts::PI;

/// Biquad filter coefficients (normalized so a0 = 1)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

impl BiquadCoeffs {
    /// Low-pass filter coefficients
    /// freq: -3dB corner, q: 0.707 for Butterworth
    pub fn lowpass(freq: f32, q: f32, sample_rate: f32) -> Self {
        if freq <= 0.0 || freq >= sample_rate / 2.0 {
            return Self::passthrough();
        }
        let w0 = 2.0 * PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);

        let a0 = 1.0 + alpha;
        Self {
            b0: ((1.0 - cos_w0) / 2.0) / a0,
            b1: (1.0 - cos_w0) / a0,
            b2: ((1.0 - cos_w0) / 2.0) / a0,
            a1: (-2.0 * cos_w0) / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    /// Passthrough (unity gain, no filtering)
    pub fn passthrough() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }
}

/// Biquad state (direct form I)
#[derive(Debug, Clone)]
pub struct Biquad {
    coeffs: BiquadCoeffs,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl Biquad {
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let c = &self.coeffs;
        let out = c.b0 * input + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = out;
        out
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steady_state_gain(freq: f32) -> f32 {
        let mut f = Biquad::new(BiquadCoeffs::lowpass(3000.0, 0.707, 48000.0));
        let mut peak = 0.0f32;
        for n in 0..48000 {
            let y = f.process((2.0 * PI * freq * n as f32 / 48000.0).sin());
            if n > 24000 {
                peak = peak.max(y.abs());
            }
        }
        peak
    }

    #[test]
    fn test_lowpass_passes_low_and_cuts_high() {
        assert!((steady_state_gain(500.0) - 1.0).abs() < 0.02);
        assert!((steady_state_gain(3000.0) - 0.707).abs() < 0.03);
        assert!(steady_state_gain(12000.0) < 0.1);
    }

    #[test]
    fn test_out_of_range_corner_is_passthrough() {
        assert_eq!(BiquadCoeffs::lowpass(30000.0, 0.707, 48000.0), BiquadCoeffs::passthrough());
    }
}
