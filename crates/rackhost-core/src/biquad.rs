//! Biquad (bi-quadratic) filter in double precision.
//!
//! Coefficient calculation uses the RBJ Audio EQ Cookbook formulas. State is
//! kept in `f64` so both sample precisions share one implementation.

use core::f64::consts::PI;
use libm::{cos, pow, sin};

/// Normalized biquad coefficients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficients {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Coefficients {
    /// Pass-through (`y[n] = x[n]`).
    pub const IDENTITY: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// Normalizes raw `(b0, b1, b2, a0, a1, a2)` by `a0`.
    pub fn from_raw(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        let inv = 1.0 / a0;
        Self {
            b0: b0 * inv,
            b1: b1 * inv,
            b2: b2 * inv,
            a1: a1 * inv,
            a2: a2 * inv,
        }
    }

    /// Peaking EQ band.
    ///
    /// * `frequency` - Center frequency in Hz
    /// * `q` - Bandwidth control
    /// * `gain_db` - Boost or cut at the center
    /// * `sample_rate` - Sample rate in Hz
    pub fn peaking(frequency: f64, q: f64, gain_db: f64, sample_rate: f64) -> Self {
        let a = pow(10.0, gain_db / 40.0);
        let omega = 2.0 * PI * (frequency / sample_rate).min(0.499);
        let cos_omega = cos(omega);
        let alpha = sin(omega) / (2.0 * q.max(1e-3));

        Self::from_raw(
            1.0 + alpha * a,
            -2.0 * cos_omega,
            1.0 - alpha * a,
            1.0 + alpha / a,
            -2.0 * cos_omega,
            1.0 - alpha / a,
        )
    }
}

/// Direct Form I biquad state.
///
/// ```text
/// y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2]
///                - a1*y[n-1] - a2*y[n-2]
/// ```
#[derive(Debug, Clone)]
pub struct Biquad {
    coeffs: Coefficients,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Biquad {
    /// Creates a pass-through filter.
    pub fn new() -> Self {
        Self {
            coeffs: Coefficients::IDENTITY,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    /// Replaces the coefficients, keeping history.
    pub fn set_coefficients(&mut self, coeffs: Coefficients) {
        self.coeffs = coeffs;
    }

    /// Processes a single sample.
    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let c = &self.coeffs;
        let output = c.b0 * input + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = crate::math::flush_denormal(output);
        self.y1
    }

    /// Clears the delay lines.
    pub fn clear(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

impl Default for Biquad {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_passes_through() {
        let mut bq = Biquad::new();
        for x in [0.5, -0.25, 1.0] {
            assert_eq!(bq.process(x), x);
        }
    }

    #[test]
    fn zero_gain_peak_is_transparent() {
        let mut bq = Biquad::new();
        bq.set_coefficients(Coefficients::peaking(1000.0, 0.7, 0.0, 48000.0));
        for i in 0..256 {
            let x = (i as f64 * 0.1).sin();
            assert!((bq.process(x) - x).abs() < 1e-9);
        }
    }

    #[test]
    fn boost_raises_center_level() {
        let sr = 48000.0;
        let freq = 1000.0;
        let mut bq = Biquad::new();
        bq.set_coefficients(Coefficients::peaking(freq, 1.0, 12.0, sr));
        let mut peak: f64 = 0.0;
        for n in 0..9600 {
            let x = (2.0 * PI * freq * n as f64 / sr).sin();
            let y = bq.process(x);
            if n > 4800 {
                peak = peak.max(y.abs());
            }
        }
        // +12 dB is roughly 3.98x
        assert!(peak > 3.5 && peak < 4.5, "peak {peak}");
    }

    #[test]
    fn clear_resets_history() {
        let mut bq = Biquad::new();
        bq.set_coefficients(Coefficients::peaking(500.0, 1.0, 6.0, 44100.0));
        bq.process(1.0);
        bq.clear();
        let mut fresh = bq.clone();
        assert_eq!(bq.process(0.3), fresh.process(0.3));
    }
}
