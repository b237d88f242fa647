//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use chrono::NaiveDate;

use ev_fleet_sim::config::ScenarioConfig;
use ev_fleet_sim::devices::{
    ChargingStation, Ev, LimitMode, StationSpec, Transformer, TransformerSpec,
};
use ev_fleet_sim::sim::episode::Episode;
use ev_fleet_sim::sim::types::SimConfig;

/// Simulation configuration with 15-minute steps starting at midnight.
pub fn sim_config(len: usize) -> SimConfig {
    let start = NaiveDate::from_ymd_opt(2024, 6, 3)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap();
    SimConfig::new(len, 15, start, 42)
}

/// Two-port station: 56 A per direction at 230 V, three phases (about 22.3 kW).
pub fn station_spec() -> StationSpec {
    StationSpec {
        n_ports: 2,
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

/// One transformer feeding two stations with two ports each.
pub fn two_by_two_episode(len: usize, evs: Vec<Ev>, setpoint_kw: f64) -> Episode {
    Episode {
        stations: vec![
            ChargingStation::new(0, 0, station_spec()),
            ChargingStation::new(1, 0, station_spec()),
        ],
        transformers: vec![Transformer::new(
            0,
            TransformerSpec {
                max_current: 1000.0,
                max_power: 400.0,
                mode: LimitMode::Power,
            },
            vec![0, 1],
            len,
        )],
        evs,
        power_setpoints: vec![setpoint_kw; len],
        charge_prices: vec![0.25; len],
        discharge_prices: vec![0.3; len],
    }
}

/// A 50 kWh vehicle at 20% charge with a 22 kW charger.
pub fn ev(port: usize, station: usize, arrival: usize, departure: usize) -> Ev {
    Ev::new(port, station, 50.0, 10.0, 50.0, arrival, departure, 22.0, 22.0)
}

/// A short baseline scenario whose transformer limits never bind.
pub fn unconstrained_scenario(len: usize, seed: u64) -> ScenarioConfig {
    let mut cfg = ScenarioConfig::baseline();
    cfg.simulation.simulation_length = len;
    cfg.simulation.seed = seed;
    cfg.ev.spawn_probability = 0.3;
    cfg.ev.stay_hours_min = 0.5;
    cfg.ev.stay_hours_max = 2.0;
    cfg.transformer.max_current = 10_000.0;
    cfg.transformer.max_power = 5_000.0;
    cfg
}
