//! Kaiser window and windowed-sinc low-pass design

use std::f64::consts::PI;

/// Modified Bessel function of the first kind, order 0
fn bessel_i0(x: f64) -> f64 {
    let mut sum = 1.0;
    let mut term = 1.0;
    let x_sq_over_4 = x * x / 4.0;
    for k in 1..=40 {
        term *= x_sq_over_4 / (k * k) as f64;
        sum += term;
        if term < sum * 1e-12 {
            break;
        }
    }
    sum
}

/// Kaiser window of length `n`
///
/// - `beta`: shape parameter (higher = wider mainlobe, lower sidelobes)
pub fn kaiser(n: usize, beta: f64) -> Vec<f64> {
    if n == 1 {
        return vec![1.0];
    }
    let n_f = n as f64;
    let denom = bessel_i0(beta);
    (0..n)
        .map(|i| {
            let x = 2.0 * i as f64 / (n_f - 1.0) - 1.0;
            bessel_i0(beta * (1.0 - x * x).max(0.0).sqrt()) / denom
        })
        .collect()
}

/// Kaiser beta for a stopband attenuation in dB
pub fn kaiser_beta(atten_db: f64) -> f64 {
    if atten_db > 50.0 {
        0.1102 * (atten_db - 8.7)
    } else if atten_db > 21.0 {
        0.5842 * (atten_db - 21.0).powf(0.4) + 0.07886 * (atten_db - 21.0)
    } else {
        0.0
    }
}

/// Filter length for a given attenuation and normalized transition width
///
/// Always odd, so the filter has an integer group delay.
pub fn kaiser_length(atten_db: f64, transition: f64) -> usize {
    let transition = transition.max(1e-6);
    let n = ((atten_db - 8.0) / (2.285 * 2.0 * PI * transition)).ceil().max(1.0) as usize + 1;
    n | 1
}

/// Low-pass windowed-sinc taps with unity DC gain
///
/// - `num_taps`: filter length
/// - `cutoff`: cutoff frequency normalized to the sample rate (0 < cutoff < 0.5)
/// - `atten_db`: stopband attenuation used for the Kaiser shape
pub fn lowpass(num_taps: usize, cutoff: f64, atten_db: f64) -> Vec<f32> {
    let win = kaiser(num_taps, kaiser_beta(atten_db));
    let half = (num_taps as f64 - 1.0) / 2.0;

    let h: Vec<f64> = win
        .iter()
        .enumerate()
        .map(|(n, w)| {
            let t = n as f64 - half;
            let sinc = if t.abs() < 1e-12 {
                1.0
            } else {
                let x = 2.0 * cutoff * t;
                (PI * x).sin() / (PI * x)
            };
            sinc * w
        })
        .collect();

    let gain: f64 = h.iter().sum();
    h.iter().map(|v| (v / gain) as f32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Magnitude response in dB at normalized frequency `f`
    fn response_db(taps: &[f32], f: f64) -> f64 {
        let (mut re, mut im) = (0.0, 0.0);
        for (n, &h) in taps.iter().enumerate() {
            let phase = -2.0 * PI * f * n as f64;
            re += f64::from(h) * phase.cos();
            im += f64::from(h) * phase.sin();
        }
        20.0 * (re * re + im * im).sqrt().max(1e-20).log10()
    }

    #[test]
    fn test_kaiser_window_is_symmetric_and_peaks_at_center() {
        let w = kaiser(33, 6.0);
        assert_eq!(w.len(), 33);
        assert!((w[16] - 1.0).abs() < 1e-12);
        for i in 0..16 {
            assert!((w[i] - w[32 - i]).abs() < 1e-12);
        }
        assert!(w[0] < 0.05);
    }

    #[test]
    fn test_lowpass_response() {
        let n = kaiser_length(60.0, 0.05);
        assert_eq!(n % 2, 1);
        let taps = lowpass(n, 0.1, 60.0);
        let dc: f32 = taps.iter().sum();
        assert!((dc - 1.0).abs() < 1e-5);
        assert!(response_db(&taps, 0.02).abs() < 0.1);
        assert!(response_db(&taps, 0.2) < -55.0);
        assert!(response_db(&taps, 0.4) < -55.0);
    }
}
