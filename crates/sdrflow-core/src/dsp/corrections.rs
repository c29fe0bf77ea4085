//! Front-end impairment corrections applied to raw captures
//!
//! - DC offset: a slow IIR estimate of the mean is subtracted
//! - IQ imbalance: running estimates of `E[I^2]`, `E[Q^2]` and `E[IQ]`
//!   drive a Gram-Schmidt step that removes the I component leaking into
//!   Q, then scales Q to the power of I

use crate::types::IqSample;

/// Smoothing factor of the running estimators
const ALPHA: f32 = 1.0e-3;

const MIN_POWER: f32 = 1.0e-12;

#[derive(Debug, Clone, Copy, Default)]
struct DcEstimator {
    mean: IqSample,
}

#[derive(Debug, Clone, Copy, Default)]
struct IqEstimator {
    p_ii: f32,
    p_qq: f32,
    p_iq: f32,
}

/// DC and IQ imbalance correction state for one source
#[derive(Debug, Clone, Default)]
pub struct Corrections {
    dc_offset: bool,
    iq_imbalance: bool,
    dc: DcEstimator,
    iq: IqEstimator,
}

impl Corrections {
    pub fn new(dc_offset: bool, iq_imbalance: bool) -> Self {
        Self {
            dc_offset,
            iq_imbalance,
            ..Default::default()
        }
    }

    /// Enable or disable each correction; disabling one clears its estimate
    pub fn set(&mut self, dc_offset: bool, iq_imbalance: bool) {
        if !dc_offset {
            self.dc = DcEstimator::default();
        }
        if !iq_imbalance {
            self.iq = IqEstimator::default();
        }
        self.dc_offset = dc_offset;
        self.iq_imbalance = iq_imbalance;
    }

    pub fn dc_offset(&self) -> bool {
        self.dc_offset
    }

    pub fn iq_imbalance(&self) -> bool {
        self.iq_imbalance
    }

    pub fn is_enabled(&self) -> bool {
        self.dc_offset || self.iq_imbalance
    }

    /// Correct a block in place
    pub fn apply(&mut self, samples: &mut [IqSample]) {
        if self.dc_offset {
            let dc = &mut self.dc;
            for s in samples.iter_mut() {
                dc.mean += (*s - dc.mean) * ALPHA;
                *s -= dc.mean;
            }
        }

        if self.iq_imbalance {
            let est = &mut self.iq;
            for s in samples.iter_mut() {
                let (i, q) = (s.re, s.im);
                est.p_ii += (i * i - est.p_ii) * ALPHA;
                est.p_qq += (q * q - est.p_qq) * ALPHA;
                est.p_iq += (i * q - est.p_iq) * ALPHA;
                if est.p_ii < MIN_POWER {
                    continue;
                }

                let leak = est.p_iq / est.p_ii;
                let p_orth = (est.p_qq - leak * est.p_iq).max(MIN_POWER);
                let gain = (est.p_ii / p_orth).sqrt();
                s.im = (q - leak * i) * gain;
            }
        }
    }
}
