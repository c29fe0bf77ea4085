//! Linear-interpolation resampler from the channel rate to the audio rate

use crate::types::StereoSample;

/// Streaming linear resampler
///
/// The read position is kept as an exact fraction `pos / output_rate` of one
/// input period, so long streams never drift. The position and the last
/// input frame carry over between calls. Equal rates bypass interpolation.
#[derive(Debug, Clone)]
pub struct LinearResampler {
    input_rate: u32,
    output_rate: u32,
    pos: u64,
    prev: StereoSample,
}

impl LinearResampler {
    pub fn new(input_rate: u32, output_rate: u32) -> Self {
        Self {
            input_rate: input_rate.max(1),
            output_rate: output_rate.max(1),
            pos: 0,
            prev: StereoSample::silence(),
        }
    }

    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    pub fn is_bypass(&self) -> bool {
        self.input_rate == self.output_rate
    }

    pub fn reset(&mut self) {
        self.pos = 0;
        self.prev = StereoSample::silence();
    }

    /// Resample `input`, appending to `out`
    pub fn process(&mut self, input: &[StereoSample], out: &mut Vec<StereoSample>) {
        if self.is_bypass() {
            out.extend_from_slice(input);
            return;
        }

        let period = u64::from(self.output_rate);
        let step = u64::from(self.input_rate);
        out.reserve(input.len() * self.output_rate as usize / self.input_rate as usize + 1);
        for &x in input {
            // Emit every output position between prev (0) and x (period)
            while self.pos < period {
                let t = (self.pos as f64 / period as f64) as f32;
                out.push(self.prev * (1.0 - t) + x * t);
                self.pos += step;
            }
            self.pos -= period;
            self.prev = x;
        }
    }
}
