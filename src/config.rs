//! TOML-based scenario configuration and preset definitions.

use std::fs;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Deserialize;

pub use crate::error::ConfigError;

use crate::devices::{LimitMode, StationSpec, TransformerSpec};
use crate::heuristics::StrategyKind;
use crate::sim::types::SimConfig;

/// Top-level scenario configuration parsed from TOML.
///
/// All fields have defaults matching the baseline scenario. Load from
/// TOML with [`ScenarioConfig::from_toml_file`] or use
/// [`ScenarioConfig::baseline`] for the built-in default.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Episode timing and global parameters.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Transformer count and limits.
    #[serde(default)]
    pub transformer: TransformerConfig,
    /// Charging station count and port electrical limits.
    #[serde(default)]
    pub charging_station: ChargingStationConfig,
    /// EV population parameters.
    #[serde(default)]
    pub ev: EvConfig,
    /// Background load on each transformer.
    #[serde(default)]
    pub inflexible_loads: InflexibleLoadConfig,
    /// PV generation on each transformer.
    #[serde(default)]
    pub solar_power: SolarPowerConfig,
    /// Demand-response event parameters.
    #[serde(default)]
    pub demand_response: DemandResponseConfig,
    /// Aggregate power target.
    #[serde(default)]
    pub setpoint: SetpointConfig,
    /// Energy price curves.
    #[serde(default)]
    pub prices: PriceConfig,
}

/// Episode timing and global parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Number of steps in the episode (must be > 0).
    pub simulation_length: usize,
    /// Step length in minutes (must be > 0).
    pub timescale_minutes: u32,
    /// Wall-clock start, e.g. `"2024-06-03T05:00:00"`.
    pub start_date: NaiveDateTime,
    /// Master random seed.
    pub seed: u64,
    /// Shortfall (kWh) under which a departing driver counts as satisfied.
    pub score_threshold: f64,
    /// Force every parked vehicle out on the final step.
    pub empty_ports_at_end: bool,
    /// Dispatch heuristic used by the binary.
    pub strategy: StrategyKind,
}

fn default_start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 3)
        .unwrap_or_default()
        .and_time(NaiveTime::MIN)
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            simulation_length: 96,
            timescale_minutes: 15,
            start_date: default_start(),
            seed: 42,
            score_threshold: 1.0,
            empty_ports_at_end: true,
            strategy: StrategyKind::default(),
        }
    }
}

/// Transformer count and limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformerConfig {
    /// Number of transformers; stations are assigned round-robin.
    pub count: usize,
    /// Current ceiling (A).
    pub max_current: f64,
    /// Power ceiling (kW).
    pub max_power: f64,
    /// Unit in which the ceiling is enforced: `"current"` or `"power"`.
    pub mode: LimitMode,
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            count: 1,
            max_current: 250.0,
            max_power: 100.0,
            mode: LimitMode::Current,
        }
    }
}

/// Charging station count and port electrical limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChargingStationConfig {
    pub count: usize,
    pub ports_per_station: usize,
    /// Station-wide charging current limit (A).
    pub max_charge_current: f64,
    /// Smallest non-zero port charging current (A).
    pub min_charge_current: f64,
    /// Station-wide discharging current limit (A, <= 0).
    pub max_discharge_current: f64,
    /// Smallest non-zero port discharging current (A, <= 0).
    pub min_discharge_current: f64,
    pub voltage: f64,
    pub phases: u32,
    pub charge_efficiency: f64,
    pub discharge_efficiency: f64,
}

impl Default for ChargingStationConfig {
    fn default() -> Self {
        Self {
            count: 5,
            ports_per_station: 2,
            max_charge_current: 56.0,
            min_charge_current: 0.0,
            max_discharge_current: -56.0,
            min_discharge_current: 0.0,
            voltage: 230.0,
            phases: 3,
            charge_efficiency: 1.0,
            discharge_efficiency: 1.0,
        }
    }
}

/// EV population parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvConfig {
    /// Per-step probability that an empty port receives a vehicle.
    pub spawn_probability: f64,
    /// Shortest stay (hours).
    pub stay_hours_min: f64,
    /// Longest stay (hours).
    pub stay_hours_max: f64,
    /// Smallest battery (kWh).
    pub battery_capacity_min: f64,
    /// Largest battery (kWh).
    pub battery_capacity_max: f64,
    /// Lowest state of charge at arrival (0.0-1.0).
    pub arrival_soc_min: f64,
    /// Highest state of charge at arrival (0.0-1.0).
    pub arrival_soc_max: f64,
    /// Desired state of charge at departure (0.0-1.0).
    pub desired_soc: f64,
    /// Vehicle AC charging power limit (kW).
    pub max_ac_charge_power: f64,
    /// Vehicle discharging power limit (kW, positive magnitude).
    pub max_discharge_power: f64,
    /// Probability that a vehicle leaves before its planned departure.
    pub early_departure_probability: f64,
}

impl Default for EvConfig {
    fn default() -> Self {
        Self {
            spawn_probability: 0.1,
            stay_hours_min: 2.0,
            stay_hours_max: 8.0,
            battery_capacity_min: 40.0,
            battery_capacity_max: 75.0,
            arrival_soc_min: 0.1,
            arrival_soc_max: 0.6,
            desired_soc: 1.0,
            max_ac_charge_power: 22.0,
            max_discharge_power: 22.0,
            early_departure_probability: 0.0,
        }
    }
}

/// Background load on each transformer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InflexibleLoadConfig {
    pub include: bool,
    /// Mean of the peak load as a fraction of the transformer's power ceiling.
    pub capacity_multiplier_mean: f64,
    /// Forecast bias (% of the true value).
    pub forecast_mean: f64,
    /// Forecast noise standard deviation (% of the true value).
    pub forecast_std: f64,
    /// Raw profile baseline (normalized units).
    pub base_level: f64,
    /// Raw profile daily amplitude (normalized units).
    pub daily_amplitude: f64,
    /// Raw profile phase offset (radians).
    pub phase_rad: f64,
    /// Raw profile noise standard deviation (normalized units).
    pub noise_std: f64,
}

impl Default for InflexibleLoadConfig {
    fn default() -> Self {
        Self {
            include: false,
            capacity_multiplier_mean: 0.8,
            forecast_mean: 0.0,
            forecast_std: 5.0,
            base_level: 0.8,
            daily_amplitude: 0.7,
            phase_rad: 1.2,
            noise_std: 0.05,
        }
    }
}

/// PV generation on each transformer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolarPowerConfig {
    pub include: bool,
    /// Mean of the peak generation as a fraction of the transformer's power ceiling.
    pub capacity_multiplier_mean: f64,
    /// Forecast bias (% of the true value).
    pub forecast_mean: f64,
    /// Forecast noise standard deviation (% of the true value).
    pub forecast_std: f64,
    /// Hour of day generation starts.
    pub sunrise_hour: f64,
    /// Hour of day generation ends.
    pub sunset_hour: f64,
    /// Multiplicative noise standard deviation.
    pub noise_std: f64,
}

impl Default for SolarPowerConfig {
    fn default() -> Self {
        Self {
            include: false,
            capacity_multiplier_mean: 0.5,
            forecast_mean: 0.0,
            forecast_std: 10.0,
            sunrise_hour: 6.0,
            sunset_hour: 20.0,
            noise_std: 0.05,
        }
    }
}

/// Demand-response event parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DemandResponseConfig {
    pub include: bool,
    /// Events drawn for every calendar day the episode touches.
    pub events_per_day: usize,
    pub event_length_minutes_min: u32,
    pub event_length_minutes_max: u32,
    pub event_start_hour_mean: f64,
    pub event_start_hour_std: f64,
    /// Mean share of the ceiling removed (%).
    pub event_capacity_percentage_mean: f64,
    pub event_capacity_percentage_std: f64,
}

impl Default for DemandResponseConfig {
    fn default() -> Self {
        Self {
            include: false,
            events_per_day: 1,
            event_length_minutes_min: 60,
            event_length_minutes_max: 180,
            event_start_hour_mean: 12.0,
            event_start_hour_std: 2.0,
            event_capacity_percentage_mean: 30.0,
            event_capacity_percentage_std: 5.0,
        }
    }
}

/// Aggregate power target.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SetpointConfig {
    /// Nominal target (kW).
    pub power_kw: f64,
    /// Uniform per-step spread around the nominal target (%).
    pub flexibility_pct: f64,
}

impl Default for SetpointConfig {
    fn default() -> Self {
        Self {
            power_kw: 50.0,
            flexibility_pct: 0.0,
        }
    }
}

/// Energy price curves.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PriceConfig {
    /// Mean charging price per kWh.
    pub charge_price: f64,
    /// Discharge price as a multiple of the charge price.
    pub discharge_price_factor: f64,
    /// Daily price swing around the mean (%).
    pub daily_variation_pct: f64,
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            charge_price: 0.25,
            discharge_price_factor: 1.2,
            daily_variation_pct: 20.0,
        }
    }
}

impl ScenarioConfig {
    /// Returns the baseline scenario: one transformer, five stations, no
    /// background load, PV or demand response.
    pub fn baseline() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            transformer: TransformerConfig::default(),
            charging_station: ChargingStationConfig::default(),
            ev: EvConfig::default(),
            inflexible_loads: InflexibleLoadConfig::default(),
            solar_power: SolarPowerConfig::default(),
            demand_response: DemandResponseConfig::default(),
            setpoint: SetpointConfig::default(),
            prices: PriceConfig::default(),
        }
    }

    /// Returns the grid-constrained preset: two power-limited transformers
    /// with background load, PV and demand-response events.
    pub fn grid_constrained() -> Self {
        Self {
            simulation: SimulationConfig {
                start_date: default_start() + chrono::Duration::hours(5),
                strategy: StrategyKind::RoundRobin,
                ..SimulationConfig::default()
            },
            transformer: TransformerConfig {
                count: 2,
                max_power: 60.0,
                mode: LimitMode::Power,
                ..TransformerConfig::default()
            },
            charging_station: ChargingStationConfig {
                count: 6,
                min_charge_current: 6.0,
                min_discharge_current: -6.0,
                charge_efficiency: 0.95,
                discharge_efficiency: 0.95,
                ..ChargingStationConfig::default()
            },
            ev: EvConfig {
                spawn_probability: 0.15,
                early_departure_probability: 0.1,
                ..EvConfig::default()
            },
            inflexible_loads: InflexibleLoadConfig {
                include: true,
                capacity_multiplier_mean: 0.6,
                ..InflexibleLoadConfig::default()
            },
            solar_power: SolarPowerConfig {
                include: true,
                ..SolarPowerConfig::default()
            },
            demand_response: DemandResponseConfig {
                include: true,
                ..DemandResponseConfig::default()
            },
            setpoint: SetpointConfig {
                power_kw: 40.0,
                flexibility_pct: 20.0,
            },
            prices: PriceConfig::default(),
        }
    }

    /// Returns the late-charging preset: long stays with a low target, run
    /// with the charge-as-late-as-possible heuristic.
    pub fn overnight() -> Self {
        Self {
            simulation: SimulationConfig {
                start_date: default_start() + chrono::Duration::hours(18),
                simulation_length: 64,
                strategy: StrategyKind::ChargeAsLateAsPossible,
                ..SimulationConfig::default()
            },
            ev: EvConfig {
                spawn_probability: 0.2,
                stay_hours_min: 8.0,
                stay_hours_max: 12.0,
                max_ac_charge_power: 11.0,
                ..EvConfig::default()
            },
            setpoint: SetpointConfig {
                power_kw: 25.0,
                flexibility_pct: 0.0,
            },
            ..Self::baseline()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["baseline", "grid_constrained", "overnight"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "grid_constrained" => Ok(Self::grid_constrained()),
            "overnight" => Ok(Self::overnight()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("scenario", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Timing configuration for the episode.
    ///
    /// # Panics
    ///
    /// Panics if `simulation_length` or `timescale_minutes` is zero; call
    /// [`validate`](Self::validate) first.
    pub fn sim_config(&self) -> SimConfig {
        let s = &self.simulation;
        SimConfig::new(s.simulation_length, s.timescale_minutes, s.start_date, s.seed)
            .with_score_threshold(s.score_threshold)
            .with_empty_ports_at_end(s.empty_ports_at_end)
    }

    pub fn station_spec(&self) -> StationSpec {
        let cs = &self.charging_station;
        StationSpec {
            n_ports: cs.ports_per_station,
            max_charge_current: cs.max_charge_current,
            min_charge_current: cs.min_charge_current,
            max_discharge_current: cs.max_discharge_current,
            min_discharge_current: cs.min_discharge_current,
            voltage: cs.voltage,
            phases: cs.phases,
            charge_efficiency: cs.charge_efficiency,
            discharge_efficiency: cs.discharge_efficiency,
        }
    }

    pub fn transformer_spec(&self) -> TransformerSpec {
        TransformerSpec {
            max_current: self.transformer.max_current,
            max_power: self.transformer.max_power,
            mode: self.transformer.mode,
        }
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut check = |ok: bool, field: &str, message: &str| {
            if !ok {
                errors.push(ConfigError::new(field, message));
            }
        };

        let s = &self.simulation;
        check(s.simulation_length > 0, "simulation.simulation_length", "must be > 0");
        check(s.timescale_minutes > 0, "simulation.timescale_minutes", "must be > 0");
        check(s.score_threshold >= 0.0, "simulation.score_threshold", "must be >= 0");

        let tr = &self.transformer;
        check(tr.count > 0, "transformer.count", "must be > 0");
        check(tr.max_current >= 0.0, "transformer.max_current", "must be >= 0");
        check(tr.max_power >= 0.0, "transformer.max_power", "must be >= 0");

        let cs = &self.charging_station;
        check(cs.count > 0, "charging_station.count", "must be > 0");
        check(cs.ports_per_station > 0, "charging_station.ports_per_station", "must be > 0");
        check(
            cs.max_charge_current > 0.0,
            "charging_station.max_charge_current",
            "must be > 0",
        );
        check(
            (0.0..=cs.max_charge_current).contains(&cs.min_charge_current),
            "charging_station.min_charge_current",
            "must be in [0, max_charge_current]",
        );
        check(
            cs.max_discharge_current <= 0.0,
            "charging_station.max_discharge_current",
            "must be <= 0",
        );
        check(
            (cs.max_discharge_current..=0.0).contains(&cs.min_discharge_current),
            "charging_station.min_discharge_current",
            "must be in [max_discharge_current, 0]",
        );
        check(cs.voltage > 0.0, "charging_station.voltage", "must be > 0");
        check(cs.phases > 0, "charging_station.phases", "must be > 0");
        check(
            cs.charge_efficiency > 0.0 && cs.charge_efficiency <= 1.0,
            "charging_station.charge_efficiency",
            "must be in (0.0, 1.0]",
        );
        check(
            cs.discharge_efficiency > 0.0 && cs.discharge_efficiency <= 1.0,
            "charging_station.discharge_efficiency",
            "must be in (0.0, 1.0]",
        );

        let ev = &self.ev;
        let unit = 0.0..=1.0;
        check(
            unit.contains(&ev.spawn_probability),
            "ev.spawn_probability",
            "must be in [0.0, 1.0]",
        );
        check(ev.stay_hours_min > 0.0, "ev.stay_hours_min", "must be > 0");
        check(
            ev.stay_hours_min <= ev.stay_hours_max,
            "ev.stay_hours_min",
            "must be <= ev.stay_hours_max",
        );
        check(ev.battery_capacity_min > 0.0, "ev.battery_capacity_min", "must be > 0");
        check(
            ev.battery_capacity_min <= ev.battery_capacity_max,
            "ev.battery_capacity_min",
            "must be <= ev.battery_capacity_max",
        );
        check(
            unit.contains(&ev.arrival_soc_min) && unit.contains(&ev.arrival_soc_max),
            "ev.arrival_soc_min",
            "arrival soc bounds must be in [0.0, 1.0]",
        );
        check(
            ev.arrival_soc_min <= ev.arrival_soc_max,
            "ev.arrival_soc_min",
            "must be <= ev.arrival_soc_max",
        );
        check(unit.contains(&ev.desired_soc), "ev.desired_soc", "must be in [0.0, 1.0]");
        check(ev.max_ac_charge_power >= 0.0, "ev.max_ac_charge_power", "must be >= 0");
        check(ev.max_discharge_power >= 0.0, "ev.max_discharge_power", "must be >= 0");
        check(
            unit.contains(&ev.early_departure_probability),
            "ev.early_departure_probability",
            "must be in [0.0, 1.0]",
        );

        let il = &self.inflexible_loads;
        check(
            il.capacity_multiplier_mean >= 0.0,
            "inflexible_loads.capacity_multiplier_mean",
            "must be >= 0",
        );
        check(il.forecast_std >= 0.0, "inflexible_loads.forecast_std", "must be >= 0");
        check(il.noise_std >= 0.0, "inflexible_loads.noise_std", "must be >= 0");

        let pv = &self.solar_power;
        check(
            pv.capacity_multiplier_mean >= 0.0,
            "solar_power.capacity_multiplier_mean",
            "must be >= 0",
        );
        check(pv.forecast_std >= 0.0, "solar_power.forecast_std", "must be >= 0");
        check(pv.noise_std >= 0.0, "solar_power.noise_std", "must be >= 0");
        check(
            pv.sunrise_hour >= 0.0 && pv.sunrise_hour < pv.sunset_hour && pv.sunset_hour <= 24.0,
            "solar_power.sunrise_hour",
            "must satisfy 0 <= sunrise_hour < sunset_hour <= 24",
        );

        let dr = &self.demand_response;
        check(
            dr.event_length_minutes_min > 0,
            "demand_response.event_length_minutes_min",
            "must be > 0",
        );
        check(
            dr.event_length_minutes_min <= dr.event_length_minutes_max,
            "demand_response.event_length_minutes_min",
            "must be <= demand_response.event_length_minutes_max",
        );
        check(
            dr.event_start_hour_std >= 0.0,
            "demand_response.event_start_hour_std",
            "must be >= 0",
        );
        check(
            (0.0..=100.0).contains(&dr.event_capacity_percentage_mean),
            "demand_response.event_capacity_percentage_mean",
            "must be in [0, 100]",
        );
        check(
            dr.event_capacity_percentage_std >= 0.0,
            "demand_response.event_capacity_percentage_std",
            "must be >= 0",
        );

        let sp = &self.setpoint;
        check(sp.power_kw >= 0.0, "setpoint.power_kw", "must be >= 0");
        check(
            (0.0..=100.0).contains(&sp.flexibility_pct),
            "setpoint.flexibility_pct",
            "must be in [0, 100]",
        );

        let pr = &self.prices;
        check(pr.charge_price >= 0.0, "prices.charge_price", "must be >= 0");
        check(
            pr.discharge_price_factor >= 0.0,
            "prices.discharge_price_factor",
            "must be >= 0",
        );
        check(
            (0.0..=100.0).contains(&pr.daily_variation_pct),
            "prices.daily_variation_pct",
            "must be in [0, 100]",
        );

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_preset_valid() {
        let cfg = ScenarioConfig::baseline();
        let errors = cfg.validate();
        assert!(errors.is_empty(), "baseline should be valid: {errors:?}");
    }

    #[test]
    fn from_preset_unknown() {
        let err = ScenarioConfig::from_preset("nonexistent");
        assert!(err.is_err());
        let e = err.unwrap_err();
        assert!(e.message.contains("unknown preset"));
    }

    #[test]
    fn all_presets_are_valid() {
        for name in ScenarioConfig::PRESETS {
            let cfg = ScenarioConfig::from_preset(name);
            assert!(cfg.is_ok(), "preset \"{name}\" should load");
            let errors = cfg.as_ref().map(|c| c.validate()).unwrap_or_default();
            assert!(
                errors.is_empty(),
                "preset \"{name}\" should be valid: {errors:?}"
            );
        }
    }

    #[test]
    fn valid_toml_parses() {
        let toml = r#"
[simulation]
simulation_length = 48
timescale_minutes = 30
start_date = "2024-01-17T05:00:00"
seed = 99
strategy = "round_robin"

[transformer]
count = 2
max_power = 80.0
mode = "power"

[charging_station]
count = 4
ports_per_station = 3
min_charge_current = 6.0

[ev]
spawn_probability = 0.3
early_departure_probability = 0.05

[inflexible_loads]
include = true

[demand_response]
include = true
event_length_minutes_min = 30
event_length_minutes_max = 90
"#;
        let cfg = ScenarioConfig::from_toml_str(toml);
        assert!(cfg.is_ok(), "valid TOML should parse: {:?}", cfg.err());
        let cfg = cfg.unwrap();
        assert_eq!(cfg.simulation.simulation_length, 48);
        assert_eq!(cfg.simulation.strategy, StrategyKind::RoundRobin);
        assert_eq!(cfg.transformer.mode, LimitMode::Power);
        assert_eq!(cfg.charging_station.ports_per_station, 3);
        assert!(cfg.validate().is_empty());

        let sim = cfg.sim_config();
        assert_eq!(sim.dt_hours, 0.5);
        assert_eq!(sim.start_step_of_day(), 10);
    }

    #[test]
    fn invalid_toml_unknown_field() {
        let toml = r#"
[simulation]
simulation_length = 24
bogus_field = true
"#;
        assert!(ScenarioConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let toml = r#"
[simulation]
strategy = "charge_whenever"
"#;
        let err = ScenarioConfig::from_toml_str(toml).unwrap_err();
        assert_eq!(err.field, "toml");
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let cfg = ScenarioConfig::from_toml_str("[simulation]\nseed = 99\n").unwrap();
        assert_eq!(cfg.simulation.seed, 99);
        assert_eq!(cfg.simulation.simulation_length, 96);
        assert_eq!(cfg.charging_station.count, 5);
        assert!(!cfg.demand_response.include);
    }

    #[test]
    fn validation_catches_zero_length() {
        let mut cfg = ScenarioConfig::baseline();
        cfg.simulation.simulation_length = 0;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "simulation.simulation_length"));
    }

    #[test]
    fn validation_catches_station_limits() {
        let mut cfg = ScenarioConfig::baseline();
        cfg.charging_station.count = 0;
        cfg.charging_station.max_discharge_current = 10.0;
        cfg.charging_station.charge_efficiency = 1.2;
        let fields: Vec<String> = cfg.validate().into_iter().map(|e| e.field).collect();
        assert!(fields.contains(&"charging_station.count".to_string()));
        assert!(fields.contains(&"charging_station.max_discharge_current".to_string()));
        assert!(fields.contains(&"charging_station.charge_efficiency".to_string()));
    }

    #[test]
    fn validation_catches_inverted_ranges() {
        let mut cfg = ScenarioConfig::baseline();
        cfg.ev.stay_hours_min = 10.0;
        cfg.demand_response.event_length_minutes_min = 200;
        cfg.solar_power.sunrise_hour = 21.0;
        let fields: Vec<String> = cfg.validate().into_iter().map(|e| e.field).collect();
        assert!(fields.contains(&"ev.stay_hours_min".to_string()));
        assert!(fields.contains(&"demand_response.event_length_minutes_min".to_string()));
        assert!(fields.contains(&"solar_power.sunrise_hour".to_string()));
    }

    #[test]
    fn grid_constrained_is_tighter_than_baseline() {
        let base = ScenarioConfig::baseline();
        let grid = ScenarioConfig::grid_constrained();
        assert!(grid.transformer.max_power < base.transformer.max_power);
        assert!(grid.demand_response.include && !base.demand_response.include);
    }
}
