//! Raw daily profiles for background load and PV generation.
//!
//! Both generators return unitless series aligned to the episode's wall-clock
//! start. Transformers rescale them into kW (see
//! [`Transformer::normalize_inflexible_load`](super::Transformer::normalize_inflexible_load)).

use std::f64::consts::PI;

use rand::rngs::StdRng;

use super::types::gaussian;
use crate::config::{InflexibleLoadConfig, SolarPowerConfig};
use crate::sim::types::SimConfig;

/// Sinusoidal daily background load with Gaussian noise.
///
/// # Arguments
///
/// * `cfg` - Shape parameters (`base_level`, `daily_amplitude`, `phase_rad`, `noise_std`)
/// * `sim` - Timing of the episode
/// * `rng` - Random number generator for the noise
///
/// # Returns
///
/// One non-negative value per step.
pub fn inflexible_load_profile(
    cfg: &InflexibleLoadConfig,
    sim: &SimConfig,
    rng: &mut StdRng,
) -> Vec<f64> {
    (0..sim.simulation_length)
        .map(|t| {
            let day_pos = sim.minute_of_day(t) / 1440.0;
            let angle = 2.0 * PI * day_pos + cfg.phase_rad;
            let value = cfg.base_level + cfg.daily_amplitude * angle.sin();
            gaussian(rng, value, cfg.noise_std).max(0.0)
        })
        .collect()
}

/// Half-cosine daylight curve with multiplicative noise, peaking at 1.
pub fn solar_profile(cfg: &SolarPowerConfig, sim: &SimConfig, rng: &mut StdRng) -> Vec<f64> {
    let sunrise = cfg.sunrise_hour * 60.0;
    let sunset = cfg.sunset_hour * 60.0;
    (0..sim.simulation_length)
        .map(|t| {
            let frac = daylight_frac(sim.minute_of_day(t), sunrise, sunset);
            if frac <= 0.0 {
                0.0
            } else {
                (frac * gaussian(rng, 1.0, cfg.noise_std)).max(0.0)
            }
        })
        .collect()
}

/// Fraction of peak irradiance at `minute` for a day lit over `[sunrise, sunset)`.
///
/// Zero outside daylight, 1 at solar noon.
pub fn daylight_frac(minute: f64, sunrise: f64, sunset: f64) -> f64 {
    if sunset <= sunrise || minute < sunrise || minute >= sunset {
        return 0.0;
    }
    let x = (minute - sunrise) / (sunset - sunrise);
    (PI * (x - 0.5)).cos().max(0.0)
}
