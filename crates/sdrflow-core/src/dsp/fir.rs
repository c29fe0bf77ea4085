//! Decimating complex FIR filter

use crate::types::IqSample;

/// FIR low-pass with integer decimation
///
/// Keeps its delay line across calls, so a stream split into arbitrary
/// blocks produces the same output as one long block. The delay line is
/// stored twice back to back so every dot product runs over one contiguous
/// slice.
#[derive(Debug, Clone)]
pub struct DecimatingFir {
    taps: Vec<f32>,
    history: Vec<IqSample>,
    pos: usize,
    decimation: usize,
    phase: usize,
}

impl DecimatingFir {
    pub fn new(taps: Vec<f32>, decimation: usize) -> Self {
        let n = taps.len().max(1);
        let taps = if taps.is_empty() { vec![1.0] } else { taps };
        Self {
            taps,
            history: vec![IqSample::new(0.0, 0.0); 2 * n],
            pos: 0,
            decimation: decimation.max(1),
            phase: 0,
        }
    }

    pub fn num_taps(&self) -> usize {
        self.taps.len()
    }

    pub fn decimation(&self) -> usize {
        self.decimation
    }

    /// Clear the delay line and decimation phase
    pub fn reset(&mut self) {
        self.history.fill(IqSample::new(0.0, 0.0));
        self.pos = 0;
        self.phase = 0;
    }

    /// Filter `input`, appending one output per `decimation` inputs to `out`
    pub fn process(&mut self, input: &[IqSample], out: &mut Vec<IqSample>) {
        let n = self.taps.len();
        out.reserve(input.len() / self.decimation + 1);

        for &x in input {
            self.pos = if self.pos == 0 { n - 1 } else { self.pos - 1 };
            self.history[self.pos] = x;
            self.history[self.pos + n] = x;

            self.phase += 1;
            if self.phase == self.decimation {
                self.phase = 0;
                let window = &self.history[self.pos..self.pos + n];
                let (mut re, mut im) = (0.0f32, 0.0f32);
                for (s, &h) in window.iter().zip(&self.taps) {
                    re += s.re * h;
                    im += s.im * h;
                }
                out.push(IqSample::new(re, im));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impulse_response_matches_taps() {
        let taps = vec![0.1, 0.2, 0.4, 0.2, 0.1];
        let mut fir = DecimatingFir::new(taps.clone(), 1);
        let mut input = vec![IqSample::new(0.0, 0.0); 8];
        input[0] = IqSample::new(1.0, -1.0);
        let mut out = Vec::new();
        fir.process(&input, &mut out);
        for (i, &h) in taps.iter().enumerate() {
            assert!((out[i].re - h).abs() < 1e-7);
            assert!((out[i].im + h).abs() < 1e-7);
        }
        assert_eq!(out[5].re, 0.0);
    }

    #[test]
    fn test_block_split_is_seamless() {
        let taps = vec![0.25; 4];
        let input: Vec<IqSample> = (0..64).map(|i| IqSample::new(i as f32, -(i as f32))).collect();

        let mut whole = DecimatingFir::new(taps.clone(), 4);
        let mut expected = Vec::new();
        whole.process(&input, &mut expected);
        assert_eq!(expected.len(), 16);

        let mut split = DecimatingFir::new(taps, 4);
        let mut got = Vec::new();
        split.process(&input[..7], &mut got);
        split.process(&input[7..30], &mut got);
        split.process(&input[30..], &mut got);
        assert_eq!(got, expected);
    }
}
