use std::f64::consts::PI;

use rand::{Rng, rngs::StdRng};

use crate::config::{PriceConfig, SetpointConfig};

use super::types::SimConfig;

/// Day-ahead schedule generation utilities.
#[derive(Debug, Default, Clone, Copy)]
pub struct DayAheadSchedule;

impl DayAheadSchedule {
    /// Aggregate power targets, one per step.
    ///
    /// Each step is `power_kw` scaled by a uniform factor in
    /// `1 ± flexibility_pct / 100`.
    pub fn power_setpoints(cfg: &SetpointConfig, sim: &SimConfig, rng: &mut StdRng) -> Vec<f64> {
        let spread = cfg.flexibility_pct / 100.0;
        (0..sim.simulation_length)
            .map(|_| {
                let factor = if spread > 0.0 {
                    1.0 + rng.random_range(-spread..=spread)
                } else {
                    1.0
                };
                (cfg.power_kw * factor).max(0.0)
            })
            .collect()
    }

    /// Charge and discharge price curves (currency per kWh).
    ///
    /// Charge prices follow a daily sinusoid around `charge_price`, peaking in
    /// the evening; discharge prices are charge prices times
    /// `discharge_price_factor`.
    pub fn prices(cfg: &PriceConfig, sim: &SimConfig) -> (Vec<f64>, Vec<f64>) {
        let amplitude = cfg.daily_variation_pct / 100.0;
        let charge: Vec<f64> = (0..sim.simulation_length)
            .map(|t| {
                let angle = 2.0 * PI * (sim.minute_of_day(t) - 18.0 * 60.0) / 1440.0;
                cfg.charge_price * (1.0 + amplitude * angle.cos())
            })
            .collect();
        let discharge = charge.iter().map(|p| p * cfg.discharge_price_factor).collect();
        (charge, discharge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rand::SeedableRng;

    fn sim() -> SimConfig {
        let start = NaiveDate::from_ymd_opt(2024, 6, 3)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        SimConfig::new(24, 60, start, 0)
    }

    #[test]
    fn flat_setpoints_without_flexibility() {
        let cfg = SetpointConfig {
            power_kw: 40.0,
            flexibility_pct: 0.0,
        };
        let mut rng = StdRng::seed_from_u64(0);
        let sp = DayAheadSchedule::power_setpoints(&cfg, &sim(), &mut rng);
        assert_eq!(sp, vec![40.0; 24]);
    }

    #[test]
    fn flexible_setpoints_stay_in_band() {
        let cfg = SetpointConfig {
            power_kw: 40.0,
            flexibility_pct: 10.0,
        };
        let mut rng = StdRng::seed_from_u64(0);
        let sp = DayAheadSchedule::power_setpoints(&cfg, &sim(), &mut rng);
        assert!(sp.iter().all(|&p| (36.0..=44.0).contains(&p)));
    }

    #[test]
    fn prices_peak_in_the_evening() {
        let cfg = PriceConfig {
            charge_price: 0.2,
            discharge_price_factor: 1.5,
            daily_variation_pct: 50.0,
        };
        let (charge, discharge) = DayAheadSchedule::prices(&cfg, &sim());
        assert!((charge[18] - 0.3).abs() < 1e-12);
        assert!((charge[6] - 0.1).abs() < 1e-12);
        assert!((discharge[18] - 0.45).abs() < 1e-12);
    }
}
