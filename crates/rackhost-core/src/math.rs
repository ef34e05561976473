//! Small DSP helpers shared by module implementations.

use libm::{exp, log};

/// Decibels to linear gain.
///
/// ```rust
/// use rackhost_core::db_to_linear;
///
/// assert!((db_to_linear(0.0) - 1.0).abs() < 1e-12);
/// assert!((db_to_linear(-6.0206) - 0.5).abs() < 1e-4);
/// ```
#[inline]
pub fn db_to_linear(db: f64) -> f64 {
    const FACTOR: f64 = core::f64::consts::LN_10 / 20.0;
    exp(db * FACTOR)
}

/// Linear gain to decibels. Inputs at or below `1e-10` floor at -200 dB.
#[inline]
pub fn linear_to_db(linear: f64) -> f64 {
    const FACTOR: f64 = 20.0 / core::f64::consts::LN_10;
    log(linear.max(1e-10)) * FACTOR
}

/// Flushes denormal-range values to zero so feedback paths never stall the FPU.
#[inline]
pub fn flush_denormal(x: f64) -> f64 {
    if x.abs() < 1e-20 { 0.0 } else { x }
}

/// Linear crossfade: `dry + (wet - dry) * mix`.
#[inline]
pub fn mix(dry: f64, wet: f64, mix: f64) -> f64 {
    dry + (wet - dry) * mix
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_round_trip() {
        for db in [-60.0, -12.0, 0.0, 6.0, 18.0] {
            assert!((linear_to_db(db_to_linear(db)) - db).abs() < 1e-9);
        }
    }

    #[test]
    fn silence_floors() {
        assert!((linear_to_db(0.0) + 200.0).abs() < 1e-9);
    }

    #[test]
    fn denormals_flush() {
        assert_eq!(flush_denormal(1e-30), 0.0);
        assert_eq!(flush_denormal(0.25), 0.25);
    }

    #[test]
    fn mix_endpoints() {
        assert_eq!(mix(1.0, 3.0, 0.0), 1.0);
        assert_eq!(mix(1.0, 3.0, 1.0), 3.0);
    }
}
