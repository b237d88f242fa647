//! Shared numeric helpers for the device models.

use rand::{Rng, rngs::StdRng};

/// Reference line voltage used when converting transformer kW into amps.
pub const REFERENCE_VOLTAGE: f64 = 400.0;

/// Absolute slack applied before rounding a fractional step count up.
const CEIL_TOLERANCE: f64 = 1e-9;

/// Samples from a Gaussian distribution using the Box-Muller transform.
///
/// # Arguments
///
/// * `rng` - Random number generator
/// * `mean` - Mean of the distribution
/// * `std_dev` - Standard deviation; values `<= 0` return `mean` exactly
///
/// # Returns
///
/// A single draw from `N(mean, std_dev^2)`
pub fn gaussian(rng: &mut StdRng, mean: f64, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return mean;
    }

    let u1: f64 = rng.random::<f64>().clamp(1e-12, 1.0);
    let u2: f64 = rng.random::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + z0 * std_dev
}

/// Returns `voltage * sqrt(phases)`, the factor between amps and watts at a port.
pub fn effective_voltage(voltage: f64, phases: u32) -> f64 {
    voltage * f64::from(phases).sqrt()
}

/// Converts a port current in amps into kW.
pub fn amps_to_kw(amps: f64, voltage: f64, phases: u32) -> f64 {
    amps * effective_voltage(voltage, phases) / 1000.0
}

/// Converts a port power in kW into amps.
pub fn kw_to_amps(kw: f64, voltage: f64, phases: u32) -> f64 {
    let v = effective_voltage(voltage, phases);
    if v <= 0.0 { 0.0 } else { kw * 1000.0 / v }
}

/// Rounds up, ignoring floating-point noise just above an integer.
///
/// `ceil_tolerant(3.0000000001)` is `3.0`, not `4.0`.
pub fn ceil_tolerant(x: f64) -> f64 {
    (x - CEIL_TOLERANCE).ceil().max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;

    #[test]
    fn gaussian_zero_std_returns_mean() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(gaussian(&mut rng, 3.5, 0.0), 3.5);
        assert_eq!(gaussian(&mut rng, -1.0, -2.0), -1.0);
    }

    #[test]
    fn gaussian_sample_mean_is_close() {
        let mut rng = StdRng::seed_from_u64(7);
        let n = 20_000;
        let mean = (0..n).map(|_| gaussian(&mut rng, 10.0, 2.0)).sum::<f64>() / n as f64;
        assert!((mean - 10.0).abs() < 0.1, "sample mean {mean}");
    }

    #[test]
    fn amps_and_kw_are_inverse() {
        let kw = amps_to_kw(32.0, 230.0, 3);
        assert_relative_eq!(kw, 32.0 * 230.0 * 3f64.sqrt() / 1000.0);
        assert_relative_eq!(kw_to_amps(kw, 230.0, 3), 32.0, epsilon = 1e-12);
    }

    #[test]
    fn ceil_tolerant_ignores_noise() {
        assert_eq!(ceil_tolerant(3.0 + 1e-12), 3.0);
        assert_eq!(ceil_tolerant(3.2), 4.0);
        assert_eq!(ceil_tolerant(0.0), 0.0);
        assert_eq!(ceil_tolerant(-0.5), 0.0);
    }
}
