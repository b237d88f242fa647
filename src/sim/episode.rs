//! Episode construction.
//!
//! An [`Episode`] holds everything random about one simulation run: the
//! station/transformer topology with its load, PV and demand-response series,
//! the vehicle population, the power setpoints and the price curves. All of it
//! is drawn here, once, from the scenario seed; stepping the engine is
//! deterministic afterwards.

use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::{debug, info};

use crate::config::{EvConfig, ScenarioConfig};
use crate::devices::profiles::{inflexible_load_profile, solar_profile};
use crate::devices::{ChargingStation, Ev, Transformer};
use crate::error::SimError;

use super::event::DemandResponseEvent;
use super::replay::EpisodeTrajectory;
use super::schedule::DayAheadSchedule;
use super::types::SimConfig;

/// Seed offsets so each component draws from an independent stream.
const TRANSFORMER_SEED_OFFSET: u64 = 1_000;
const EV_SEED_OFFSET: u64 = 2_000;
const SETPOINT_SEED_OFFSET: u64 = 3_000;

/// All inputs of one simulation run.
#[derive(Debug, Clone)]
pub struct Episode {
    pub stations: Vec<ChargingStation>,
    pub transformers: Vec<Transformer>,
    /// Every vehicle of the episode, in arrival order per port.
    pub evs: Vec<Ev>,
    pub power_setpoints: Vec<f64>,
    pub charge_prices: Vec<f64>,
    pub discharge_prices: Vec<f64>,
}

impl Episode {
    /// Draws a new episode from a scenario.
    ///
    /// Stations are assigned to transformers round-robin (`station % count`).
    ///
    /// # Errors
    ///
    /// Returns `SimError::InvalidConfig` listing every validation failure.
    pub fn generate(cfg: &ScenarioConfig) -> Result<Self, SimError> {
        let errors = cfg.validate();
        if !errors.is_empty() {
            return Err(SimError::InvalidConfig(errors));
        }
        let sim = cfg.sim_config();
        let len = sim.simulation_length;
        let n_transformers = cfg.transformer.count;

        let stations: Vec<ChargingStation> = (0..cfg.charging_station.count)
            .map(|i| ChargingStation::new(i, i % n_transformers, cfg.station_spec()))
            .collect();

        let mut transformers = Vec::with_capacity(n_transformers);
        for j in 0..n_transformers {
            let mut rng = StdRng::seed_from_u64(
                sim.seed
                    .wrapping_add(TRANSFORMER_SEED_OFFSET)
                    .wrapping_add(j as u64),
            );
            let station_ids = stations
                .iter()
                .filter(|cs| cs.connected_transformer() == j)
                .map(ChargingStation::id)
                .collect();
            let mut tr = Transformer::new(j, cfg.transformer_spec(), station_ids, len);

            if cfg.inflexible_loads.include {
                let raw = inflexible_load_profile(&cfg.inflexible_loads, &sim, &mut rng);
                tr.normalize_inflexible_load(&raw, &cfg.inflexible_loads, &mut rng);
            }
            if cfg.demand_response.include {
                for day in 0..sim.days_spanned() {
                    for _ in 0..cfg.demand_response.events_per_day {
                        if let Some(event) =
                            DemandResponseEvent::sample(&cfg.demand_response, &sim, day, &mut rng)
                        {
                            tr.apply_demand_response(&event);
                        }
                    }
                }
            }
            if cfg.solar_power.include {
                let raw = solar_profile(&cfg.solar_power, &sim, &mut rng);
                tr.normalize_pv_generation(&raw, &cfg.solar_power, &mut rng);
            }
            transformers.push(tr);
        }

        let mut ev_rng = StdRng::seed_from_u64(sim.seed.wrapping_add(EV_SEED_OFFSET));
        let evs = spawn_evs(&cfg.ev, &stations, &sim, &mut ev_rng);

        let mut sp_rng = StdRng::seed_from_u64(sim.seed.wrapping_add(SETPOINT_SEED_OFFSET));
        let power_setpoints = DayAheadSchedule::power_setpoints(&cfg.setpoint, &sim, &mut sp_rng);
        let (charge_prices, discharge_prices) = DayAheadSchedule::prices(&cfg.prices, &sim);

        info!(
            stations = stations.len(),
            transformers = transformers.len(),
            evs = evs.len(),
            steps = len,
            seed = sim.seed,
            "episode generated"
        );

        Ok(Self {
            stations,
            transformers,
            evs,
            power_setpoints,
            charge_prices,
            discharge_prices,
        })
    }

    /// Rebuilds the episode captured in a trajectory.
    ///
    /// Vehicles are restored to their arrival state.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Trajectory` if the payload is internally inconsistent.
    pub fn from_trajectory(trajectory: &EpisodeTrajectory) -> Result<Self, SimError> {
        trajectory.validate()?;

        let stations = trajectory
            .stations
            .iter()
            .enumerate()
            .map(|(i, spec)| ChargingStation::new(i, trajectory.cs_transformer[i], spec.clone()))
            .collect::<Vec<_>>();
        let transformers = trajectory
            .transformers
            .iter()
            .enumerate()
            .map(|(j, series)| {
                let station_ids = stations
                    .iter()
                    .filter(|cs| cs.connected_transformer() == j)
                    .map(ChargingStation::id)
                    .collect();
                Transformer::from_series(
                    j,
                    trajectory.transformer_mode[j],
                    station_ids,
                    series.clone(),
                )
            })
            .collect();
        let evs = trajectory
            .evs
            .iter()
            .cloned()
            .map(|mut ev| {
                ev.reset();
                ev
            })
            .collect();

        Ok(Self {
            stations,
            transformers,
            evs,
            power_setpoints: trajectory.power_setpoints.clone(),
            charge_prices: trajectory.charge_prices.clone(),
            discharge_prices: trajectory.discharge_prices.clone(),
        })
    }

    pub fn total_ports(&self) -> usize {
        self.stations.iter().map(ChargingStation::n_ports).sum()
    }
}

/// Draws the vehicle population, port by port.
///
/// Each empty port receives a vehicle with probability `spawn_probability`
/// per step. The next arrival on a port is at least one step after the
/// previous departure, so a port never hosts two vehicles in one step.
fn spawn_evs(cfg: &EvConfig, stations: &[ChargingStation], sim: &SimConfig, rng: &mut StdRng) -> Vec<Ev> {
    let len = sim.simulation_length;
    let steps_per_hour = 60.0 / f64::from(sim.timescale_minutes);
    let min_stay = ((cfg.stay_hours_min * steps_per_hour).round() as usize).max(1);
    let max_stay = ((cfg.stay_hours_max * steps_per_hour).round() as usize).max(min_stay);

    let mut evs = Vec::new();
    for cs in stations {
        for port in 0..cs.n_ports() {
            let mut t = 0;
            while t < len {
                if !rng.random_bool(cfg.spawn_probability) {
                    t += 1;
                    continue;
                }

                let stay = rng.random_range(min_stay..=max_stay);
                let capacity = uniform(rng, cfg.battery_capacity_min, cfg.battery_capacity_max);
                let soc = uniform(rng, cfg.arrival_soc_min, cfg.arrival_soc_max);
                let mut ev = Ev::new(
                    port,
                    cs.id(),
                    capacity,
                    capacity * soc,
                    capacity * cfg.desired_soc,
                    t,
                    t + stay,
                    cfg.max_ac_charge_power,
                    cfg.max_discharge_power,
                );
                if stay > 1 && rng.random_bool(cfg.early_departure_probability) {
                    ev.depart_earlier(rng.random_range(t + 1..t + stay));
                }

                debug!(
                    station = cs.id(),
                    port,
                    arrival = ev.time_of_arrival,
                    departure = ev.time_of_departure,
                    "ev spawned"
                );
                t = ev.time_of_departure + 1;
                evs.push(ev);
            }
        }
    }
    evs
}

fn uniform(rng: &mut StdRng, lo: f64, hi: f64) -> f64 {
    if hi > lo { rng.random_range(lo..=hi) } else { lo }
}
