//! Transformer load model.
//!
//! A transformer feeds a set of charging stations and carries a background
//! (inflexible) load and local PV generation. Its limits are per-step arrays
//! so demand-response events can curtail them for part of the horizon.
//!
//! Limits are checked either in amps or in kW, depending on [`LimitMode`].
//! Conversions between the two use a fixed 400 V reference.

use std::fmt;

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::{REFERENCE_VOLTAGE, gaussian};
use crate::config::{InflexibleLoadConfig, SolarPowerConfig};
use crate::sim::event::DemandResponseEvent;

/// Absolute tolerance when comparing realized draw against limits.
pub const OVERLOAD_TOLERANCE: f64 = 1e-4;

/// Standard deviation of the capacity multipliers for background load and PV.
const MULTIPLIER_STD: f64 = 0.1;

/// Unit in which a transformer's band is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitMode {
    #[default]
    Current,
    Power,
}

/// Static limits a transformer is built from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformerSpec {
    /// Current ceiling (A).
    pub max_current: f64,
    /// Power ceiling (kW).
    pub max_power: f64,
    pub mode: LimitMode,
}

/// Per-step series a transformer carries for the whole horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformerSeries {
    pub max_current: Vec<f64>,
    pub min_current: Vec<f64>,
    pub max_power: Vec<f64>,
    pub min_power: Vec<f64>,
    pub inflexible_load: Vec<f64>,
    pub inflexible_load_forecast: Vec<f64>,
    pub solar_power: Vec<f64>,
    pub pv_generation_forecast: Vec<f64>,
}

impl TransformerSeries {
    fn flat(spec: &TransformerSpec, len: usize) -> Self {
        Self {
            max_current: vec![spec.max_current; len],
            min_current: vec![-spec.max_current; len],
            max_power: vec![spec.max_power; len],
            min_power: vec![-spec.max_power; len],
            inflexible_load: vec![0.0; len],
            inflexible_load_forecast: vec![0.0; len],
            solar_power: vec![0.0; len],
            pv_generation_forecast: vec![0.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.max_power.len()
    }

    pub fn is_empty(&self) -> bool {
        self.max_power.is_empty()
    }

    /// Returns `true` when every series has the same length.
    pub fn is_consistent(&self) -> bool {
        let n = self.len();
        [
            &self.max_current,
            &self.min_current,
            &self.min_power,
            &self.inflexible_load,
            &self.inflexible_load_forecast,
            &self.solar_power,
            &self.pv_generation_forecast,
        ]
        .iter()
        .all(|s| s.len() == n)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transformer {
    id: usize,
    mode: LimitMode,
    station_ids: Vec<usize>,
    series: TransformerSeries,
    current_amps: f64,
    current_power: f64,
    current_step: usize,
}

impl Transformer {
    /// Creates a transformer with flat limits and no background load.
    ///
    /// # Arguments
    ///
    /// * `id` - Transformer id (its index in the episode)
    /// * `spec` - Static current and power ceilings
    /// * `station_ids` - Ids of the charging stations it feeds
    /// * `simulation_length` - Number of steps in the horizon
    ///
    /// # Panics
    ///
    /// Panics if the horizon is empty or a ceiling is negative.
    pub fn new(
        id: usize,
        spec: TransformerSpec,
        station_ids: Vec<usize>,
        simulation_length: usize,
    ) -> Self {
        assert!(simulation_length > 0);
        assert!(spec.max_current >= 0.0);
        assert!(spec.max_power >= 0.0);

        Self::from_series(
            id,
            spec.mode,
            station_ids,
            TransformerSeries::flat(&spec, simulation_length),
        )
    }

    /// Rebuilds a transformer from previously captured series.
    ///
    /// # Panics
    ///
    /// Panics if the series are empty or of unequal length.
    pub fn from_series(
        id: usize,
        mode: LimitMode,
        station_ids: Vec<usize>,
        series: TransformerSeries,
    ) -> Self {
        assert!(!series.is_empty());
        assert!(series.is_consistent());

        let mut tr = Self {
            id,
            mode,
            station_ids,
            series,
            current_amps: 0.0,
            current_power: 0.0,
            current_step: 0,
        };
        tr.reset(0);
        tr
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn mode(&self) -> LimitMode {
        self.mode
    }

    pub fn station_ids(&self) -> &[usize] {
        &self.station_ids
    }

    pub fn series(&self) -> &TransformerSeries {
        &self.series
    }

    pub fn simulation_length(&self) -> usize {
        self.series.len()
    }

    pub fn max_power(&self) -> &[f64] {
        &self.series.max_power
    }

    pub fn min_power(&self) -> &[f64] {
        &self.series.min_power
    }

    pub fn max_current(&self) -> &[f64] {
        &self.series.max_current
    }

    pub fn min_current(&self) -> &[f64] {
        &self.series.min_current
    }

    pub fn inflexible_load(&self) -> &[f64] {
        &self.series.inflexible_load
    }

    pub fn inflexible_load_forecast(&self) -> &[f64] {
        &self.series.inflexible_load_forecast
    }

    pub fn solar_power(&self) -> &[f64] {
        &self.series.solar_power
    }

    pub fn pv_generation_forecast(&self) -> &[f64] {
        &self.series.pv_generation_forecast
    }

    pub fn current_amps(&self) -> f64 {
        self.current_amps
    }

    pub fn current_power(&self) -> f64 {
        self.current_power
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Peak of the (possibly curtailed) power ceiling over the horizon.
    pub fn peak_max_power(&self) -> f64 {
        self.series.max_power.iter().copied().fold(0.0, f64::max)
    }

    /// Scales a raw background-load profile into this transformer's range.
    ///
    /// The profile peak maps to `multiplier * peak_max_power()`, where the
    /// multiplier is drawn around `cfg.capacity_multiplier_mean`. Each step is
    /// then clamped into `[min_power, max_power]` and a noisy forecast derived.
    pub fn normalize_inflexible_load(
        &mut self,
        raw: &[f64],
        cfg: &InflexibleLoadConfig,
        rng: &mut StdRng,
    ) {
        let multiplier = gaussian(rng, cfg.capacity_multiplier_mean, MULTIPLIER_STD).max(0.0);
        let capacity = self.peak_max_power();
        let peak = raw.iter().copied().fold(0.0, f64::max);
        let scale = if peak > 0.0 { multiplier * capacity / peak } else { 0.0 };

        let s = &mut self.series;
        for t in 0..s.len() {
            let value = raw.get(t).copied().unwrap_or(0.0) * scale;
            s.inflexible_load[t] = value.clamp(s.min_power[t], s.max_power[t]);
        }
        s.inflexible_load_forecast =
            noisy_forecast(&s.inflexible_load, cfg.forecast_mean, cfg.forecast_std, rng);
        self.reset(self.current_step);
    }

    /// Scales a raw PV profile (normalized units, `>= 0`) into generation.
    ///
    /// Generation is stored as negative load: `-raw * multiplier * peak_max_power()`.
    pub fn normalize_pv_generation(
        &mut self,
        raw: &[f64],
        cfg: &SolarPowerConfig,
        rng: &mut StdRng,
    ) {
        let multiplier = gaussian(rng, cfg.capacity_multiplier_mean, MULTIPLIER_STD).max(0.0);
        let capacity = self.peak_max_power();

        let s = &mut self.series;
        for t in 0..s.len() {
            s.solar_power[t] = -raw.get(t).copied().unwrap_or(0.0).max(0.0) * multiplier * capacity;
        }
        s.pv_generation_forecast =
            noisy_forecast(&s.solar_power, cfg.forecast_mean, cfg.forecast_std, rng);
    }

    /// Curtails the ceilings over the event window.
    ///
    /// The cut is a percentage of the value already in place, so overlapping
    /// events compound. If the curtailed ceiling drops below the background
    /// load anywhere in the window, the whole window is raised to the load peak.
    ///
    /// # Returns
    ///
    /// `true` if the window had to be raised back to the background-load peak.
    pub fn apply_demand_response(&mut self, event: &DemandResponseEvent) -> bool {
        let s = &mut self.series;
        let start = event.start_step.min(s.len());
        let end = event.end_step.min(s.len());
        if start >= end {
            return false;
        }

        let cut = event.capacity_percentage / 100.0;
        for t in start..end {
            s.max_power[t] -= s.max_power[t] * cut;
            s.max_current[t] -= s.max_current[t] * cut;
        }

        let load_peak = s.inflexible_load[start..end]
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let ceiling_floor = s.max_power[start..end]
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min);

        let raised = load_peak > ceiling_floor;
        if raised {
            let peak_amps = load_peak * 1000.0 / REFERENCE_VOLTAGE;
            for t in start..end {
                s.max_power[t] = load_peak;
                s.max_current[t] = s.max_current[t].max(peak_amps);
            }
        }

        debug!(
            transformer = self.id,
            start,
            end,
            percentage = event.capacity_percentage,
            raised,
            "demand response applied"
        );
        raised
    }

    /// Starts a new step with only the background load on the transformer.
    ///
    /// Steps past the horizon carry no background load.
    pub fn reset(&mut self, step: usize) {
        self.current_step = step;
        self.current_power = self.series.inflexible_load.get(step).copied().unwrap_or(0.0);
        self.current_amps = self.current_power * 1000.0 / REFERENCE_VOLTAGE;
    }

    /// Adds one station's contribution for the current step.
    pub fn step(&mut self, amps: f64, power: f64) {
        self.current_amps += amps;
        self.current_power += power;
    }

    /// Returns `true` when the current draw leaves the step's band by more
    /// than [`OVERLOAD_TOLERANCE`].
    pub fn is_overloaded(&self) -> bool {
        self.how_overloaded() > 0.0
    }

    /// Distance past the violated bound, in the transformer's limit unit.
    pub fn how_overloaded(&self) -> f64 {
        let t = self.current_step;
        let (value, lo, hi) = match self.mode {
            LimitMode::Current => (
                self.current_amps,
                self.series.min_current.get(t),
                self.series.max_current.get(t),
            ),
            LimitMode::Power => (
                self.current_power,
                self.series.min_power.get(t),
                self.series.max_power.get(t),
            ),
        };
        let (Some(&lo), Some(&hi)) = (lo, hi) else {
            return 0.0;
        };

        if value > hi + OVERLOAD_TOLERANCE {
            value - hi
        } else if value < lo - OVERLOAD_TOLERANCE {
            lo - value
        } else {
            0.0
        }
    }
}

impl fmt::Display for Transformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = self.current_step;
        let (hi, unit, value) = match self.mode {
            LimitMode::Current => (self.series.max_current.get(t), "A", self.current_amps),
            LimitMode::Power => (self.series.max_power.get(t), "kW", self.current_power),
        };
        write!(
            f,
            "T{}: {:.1}/{:.1} {} stations={:?}",
            self.id,
            value,
            hi.copied().unwrap_or(0.0),
            unit,
            self.station_ids
        )
    }
}

/// `truth[t] + N(mean_pct/100 * truth[t], |std_pct/100 * truth[t]|)`.
fn noisy_forecast(truth: &[f64], mean_pct: f64, std_pct: f64, rng: &mut StdRng) -> Vec<f64> {
    truth
        .iter()
        .map(|&x| x + gaussian(rng, mean_pct / 100.0 * x, (std_pct / 100.0 * x).abs()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;

    fn power_limited(len: usize) -> Transformer {
        Transformer::new(
            0,
            TransformerSpec {
                max_current: 250.0,
                max_power: 100.0,
                mode: LimitMode::Power,
            },
            vec![0],
            len,
        )
    }

    #[test]
    fn new_has_flat_symmetric_band() {
        let tr = power_limited(4);
        assert_eq!(tr.max_power(), &[100.0; 4]);
        assert_eq!(tr.min_power(), &[-100.0; 4]);
        assert_eq!(tr.min_current(), &[-250.0; 4]);
        assert_eq!(tr.current_power(), 0.0);
    }

    #[test]
    fn overload_tolerance_boundary() {
        let mut tr = power_limited(4);
        tr.reset(0);
        tr.step(0.0, 100.00005);
        assert!(!tr.is_overloaded());
        assert_eq!(tr.how_overloaded(), 0.0);

        tr.reset(0);
        tr.step(0.0, 101.0);
        assert!(tr.is_overloaded());
        assert_relative_eq!(tr.how_overloaded(), 1.0, epsilon = 1e-9);

        tr.reset(0);
        tr.step(0.0, -103.0);
        assert_relative_eq!(tr.how_overloaded(), 3.0, epsilon = 1e-9);
    }

    #[test]
    fn current_mode_checks_amps() {
        let mut tr = Transformer::new(
            0,
            TransformerSpec {
                max_current: 100.0,
                max_power: 1.0,
                mode: LimitMode::Current,
            },
            vec![0],
            2,
        );
        tr.step(90.0, 50.0);
        assert!(!tr.is_overloaded());
        tr.step(20.0, 0.0);
        assert_relative_eq!(tr.how_overloaded(), 10.0, epsilon = 1e-9);
    }

    #[test]
    fn reset_starts_from_background_load() {
        let mut tr = power_limited(3);
        let cfg = InflexibleLoadConfig {
            include: true,
            capacity_multiplier_mean: 0.5,
            forecast_std: 0.0,
            ..InflexibleLoadConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(3);
        tr.normalize_inflexible_load(&[1.0, 2.0, 4.0], &cfg, &mut rng);
        tr.reset(2);
        assert_eq!(tr.current_power(), tr.inflexible_load()[2]);
        assert_relative_eq!(tr.current_amps(), tr.current_power() * 2.5);
        assert_eq!(tr.inflexible_load_forecast(), tr.inflexible_load());
    }

    #[test]
    fn inflexible_load_stays_within_band() {
        let mut tr = power_limited(24);
        let cfg = InflexibleLoadConfig {
            include: true,
            capacity_multiplier_mean: 3.0,
            ..InflexibleLoadConfig::default()
        };
        let raw: Vec<f64> = (0..24).map(|h| 1.0 + (h as f64 / 4.0).sin()).collect();
        let mut rng = StdRng::seed_from_u64(11);
        tr.normalize_inflexible_load(&raw, &cfg, &mut rng);
        for (t, &load) in tr.inflexible_load().iter().enumerate() {
            assert!(load <= tr.max_power()[t] && load >= tr.min_power()[t]);
        }
    }

    #[test]
    fn pv_is_negative_generation() {
        let mut tr = power_limited(3);
        let cfg = SolarPowerConfig {
            include: true,
            capacity_multiplier_mean: 0.5,
            ..SolarPowerConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(5);
        tr.normalize_pv_generation(&[0.0, 0.5, 1.0], &cfg, &mut rng);
        assert_eq!(tr.solar_power()[0], 0.0);
        assert!(tr.solar_power()[2] < 0.0);
        assert_relative_eq!(tr.solar_power()[1] * 2.0, tr.solar_power()[2], epsilon = 1e-12);
    }

    #[test]
    fn demand_response_cuts_window_only() {
        let mut tr = power_limited(6);
        let raised = tr.apply_demand_response(&DemandResponseEvent::new(2, 4, 25.0));
        assert!(!raised);
        assert_eq!(tr.max_power(), &[100.0, 100.0, 75.0, 75.0, 100.0, 100.0]);
        assert_eq!(tr.max_current()[3], 187.5);
    }

    #[test]
    fn demand_response_events_compound() {
        let mut tr = power_limited(4);
        tr.apply_demand_response(&DemandResponseEvent::new(0, 2, 50.0));
        tr.apply_demand_response(&DemandResponseEvent::new(1, 3, 50.0));
        assert_eq!(tr.max_power(), &[50.0, 25.0, 50.0, 100.0]);
    }

    #[test]
    fn demand_response_window_clipped_to_horizon() {
        let mut tr = power_limited(4);
        tr.apply_demand_response(&DemandResponseEvent::new(3, 10, 50.0));
        assert_eq!(tr.max_power(), &[100.0, 100.0, 100.0, 50.0]);
        assert!(!tr.apply_demand_response(&DemandResponseEvent::new(5, 10, 50.0)));
    }

    #[test]
    fn demand_response_never_cuts_below_background_load() {
        let mut tr = power_limited(4);
        let cfg = InflexibleLoadConfig {
            include: true,
            capacity_multiplier_mean: 0.6,
            forecast_std: 0.0,
            ..InflexibleLoadConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(9);
        tr.normalize_inflexible_load(&[0.2, 1.0, 0.5, 0.2], &cfg, &mut rng);
        let peak = tr.inflexible_load()[1];
        assert!(peak > 10.0);

        assert!(tr.apply_demand_response(&DemandResponseEvent::new(0, 3, 90.0)));
        assert_eq!(&tr.max_power()[0..3], &[peak; 3]);
        assert_eq!(tr.max_power()[3], 100.0);
        assert!(tr.max_current()[1] >= peak * 1000.0 / REFERENCE_VOLTAGE);
    }
}
