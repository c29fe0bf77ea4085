//! Numerically controlled oscillator for frequency translation

use std::f64::consts::{PI, TAU};

use num_complex::Complex64;

use crate::types::IqSample;

/// Complex oscillator `e^(j*2*pi*f*n/fs)` with phase carried across blocks
#[derive(Debug, Clone)]
pub struct Nco {
    phase: f64,
    step: f64,
}

impl Nco {
    /// Oscillator at `frequency` Hz (negative shifts down) for `sample_rate`
    pub fn new(frequency: f64, sample_rate: u32) -> Self {
        let step = if sample_rate == 0 {
            0.0
        } else {
            TAU * frequency / f64::from(sample_rate)
        };
        Self { phase: 0.0, step }
    }

    /// Whether mixing is a no-op
    pub fn is_identity(&self) -> bool {
        self.step == 0.0
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }

    /// Multiply `input` by the oscillator, appending to `out`
    pub fn mix(&mut self, input: &[IqSample], out: &mut Vec<IqSample>) {
        out.reserve(input.len());
        for &x in input {
            let lo = Complex64::from_polar(1.0, self.phase);
            let y = Complex64::new(f64::from(x.re), f64::from(x.im)) * lo;
            out.push(IqSample::new(y.re as f32, y.im as f32));
            self.phase += self.step;
            if self.phase >= PI {
                self.phase -= TAU;
            } else if self.phase < -PI {
                self.phase += TAU;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_tone_to_dc() {
        let fs = 48000;
        let f = 6000.0;
        let tone: Vec<IqSample> = (0..480)
            .map(|n| {
                let p = TAU * f * n as f64 / f64::from(fs);
                IqSample::new(p.cos() as f32, p.sin() as f32)
            })
            .collect();

        // Mix in two blocks to check phase continuity
        let mut nco = Nco::new(-f, fs);
        let mut out = Vec::new();
        nco.mix(&tone[..100], &mut out);
        nco.mix(&tone[100..], &mut out);
        for s in &out {
            assert!((s.re - 1.0).abs() < 1e-4, "re={}", s.re);
            assert!(s.im.abs() < 1e-4, "im={}", s.im);
        }
    }

    #[test]
    fn test_zero_frequency_is_identity() {
        let nco = Nco::new(0.0, 48000);
        assert!(nco.is_identity());
    }
}
