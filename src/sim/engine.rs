//! Step loop: applies per-port actions and advances the episode.

use tracing::{debug, info, warn};

use crate::config::ScenarioConfig;
use crate::devices::{ChargingStation, Ev, Transformer};
use crate::error::SimError;
use crate::heuristics::DispatchStrategy;

use super::clock::EpisodeClock;
use super::episode::Episode;
use super::types::{Departure, Observation, SimConfig, StepResult, TransformerReading};

/// Simulation engine owning the episode state.
///
/// Each [`step`](Self::step) runs, in order: arrivals, action application,
/// port aggregation, transformer aggregation, overload detection, energy
/// update and departures.
#[derive(Debug)]
pub struct Engine {
    config: SimConfig,
    clock: EpisodeClock,
    stations: Vec<ChargingStation>,
    transformers: Vec<Transformer>,
    evs: Vec<Ev>,
    arrivals: Vec<Vec<usize>>,
    power_setpoints: Vec<f64>,
    charge_prices: Vec<f64>,
    discharge_prices: Vec<f64>,
}

impl Engine {
    /// Creates an engine positioned at step 0.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Trajectory` if the episode does not fit the
    /// configuration: series of the wrong length, dangling station,
    /// transformer or port references, invalid vehicle records, or two
    /// vehicles sharing a port.
    pub fn new(config: SimConfig, episode: Episode) -> Result<Self, SimError> {
        let len = config.simulation_length;
        let Episode {
            stations,
            mut transformers,
            evs,
            power_setpoints,
            charge_prices,
            discharge_prices,
        } = episode;

        if stations.is_empty() {
            return Err(SimError::Trajectory("episode has no charging stations".into()));
        }
        for (name, series) in [
            ("power_setpoints", &power_setpoints),
            ("charge_prices", &charge_prices),
            ("discharge_prices", &discharge_prices),
        ] {
            if series.len() != len {
                return Err(SimError::Trajectory(format!(
                    "{name} has {} steps, expected {len}",
                    series.len()
                )));
            }
        }
        for (j, tr) in transformers.iter().enumerate() {
            if tr.id() != j || tr.simulation_length() != len {
                return Err(SimError::Trajectory(format!(
                    "transformer {j} has id {} and {} steps, expected {len}",
                    tr.id(),
                    tr.simulation_length()
                )));
            }
        }
        for (i, cs) in stations.iter().enumerate() {
            if cs.id() != i || cs.connected_transformer() >= transformers.len() {
                return Err(SimError::Trajectory(format!(
                    "station {i} references transformer {} of {}",
                    cs.connected_transformer(),
                    transformers.len()
                )));
            }
        }

        let mut arrivals = vec![Vec::new(); len];
        let mut occupancy: Vec<Vec<Vec<(usize, usize)>>> = stations
            .iter()
            .map(|cs| vec![Vec::new(); cs.n_ports()])
            .collect();
        for (idx, ev) in evs.iter().enumerate() {
            if !ev.is_valid() {
                return Err(SimError::Trajectory(format!("ev {idx} violates its invariants")));
            }
            let Some(port_stays) = occupancy
                .get_mut(ev.location)
                .and_then(|ports| ports.get_mut(ev.id))
            else {
                return Err(SimError::Trajectory(format!(
                    "ev {idx} references port {} of station {}",
                    ev.id, ev.location
                )));
            };
            if ev.time_of_arrival >= len {
                continue;
            }
            port_stays.push((ev.time_of_arrival, ev.time_of_departure));
            arrivals[ev.time_of_arrival].push(idx);
        }
        for (i, ports) in occupancy.iter_mut().enumerate() {
            for (p, stays) in ports.iter_mut().enumerate() {
                stays.sort_unstable();
                if stays.windows(2).any(|w| w[1].0 < w[0].1) {
                    return Err(SimError::Trajectory(format!(
                        "port {p} of station {i} hosts overlapping stays"
                    )));
                }
            }
        }

        for tr in &mut transformers {
            tr.reset(0);
        }

        Ok(Self {
            clock: EpisodeClock::new(&config),
            config,
            stations,
            transformers,
            evs,
            arrivals,
            power_setpoints,
            charge_prices,
            discharge_prices,
        })
    }

    /// Builds the episode for a scenario and an engine around it.
    pub fn from_scenario(cfg: &ScenarioConfig) -> Result<Self, SimError> {
        let episode = Episode::generate(cfg)?;
        Self::new(cfg.sim_config(), episode)
    }

    /// State visible to a dispatch strategy before the next step.
    pub fn observation(&self) -> Observation<'_> {
        Observation {
            current_step: self.clock.next_step(),
            simulation_length: self.config.simulation_length,
            timescale_minutes: self.config.timescale_minutes,
            power_setpoints: &self.power_setpoints,
            stations: &self.stations,
            evs: &self.evs,
        }
    }

    /// Executes one step with the given station-major actions.
    ///
    /// Missing actions count as zero and out-of-range ones are clamped.
    ///
    /// # Returns
    ///
    /// `None` once the horizon is exhausted.
    pub fn step(&mut self, actions: &[f64]) -> Option<StepResult> {
        let tick = self.clock.tick()?;
        let t = tick.step;
        let dt = self.config.dt_hours;

        for idx in std::mem::take(&mut self.arrivals[t]) {
            let ev = &self.evs[idx];
            if !self.stations[ev.location].connect(ev.id, idx) {
                warn!(step = t, station = ev.location, port = ev.id, "arrival dropped, port busy");
            }
        }

        for tr in &mut self.transformers {
            tr.reset(t);
        }

        let total_ports = self.total_ports();
        if actions.len() != total_ports {
            debug!(step = t, got = actions.len(), expected = total_ports, "action length mismatch");
        }
        let mut clamped = 0;
        let mut offset = 0;
        for cs in &mut self.stations {
            let n = cs.n_ports();
            let lo = offset.min(actions.len());
            let hi = (offset + n).min(actions.len());
            clamped += cs.dispatch(&actions[lo..hi], &self.evs, t, dt);
            offset += n;
        }

        for cs in &self.stations {
            self.transformers[cs.connected_transformer()].step(cs.current_amps(), cs.current_power());
        }

        let transformers: Vec<TransformerReading> = self
            .transformers
            .iter()
            .map(|tr| TransformerReading {
                id: tr.id(),
                power_kw: tr.current_power(),
                amps: tr.current_amps(),
                overload: tr.how_overloaded(),
            })
            .collect();
        for reading in transformers.iter().filter(|r| r.overload > 0.0) {
            debug!(step = t, transformer = reading.id, overload = reading.overload, "transformer overloaded");
        }

        for cs in &self.stations {
            cs.commit_energy(&mut self.evs, dt);
        }

        let mut port_currents = Vec::with_capacity(total_ports);
        let mut port_energies = Vec::with_capacity(total_ports);
        let mut connected_evs = 0;
        let mut energy_charged_kwh = 0.0;
        let mut energy_discharged_kwh = 0.0;
        for cs in &self.stations {
            for p in 0..cs.n_ports() {
                port_currents.push(cs.port_current(p));
                let power = cs.port_power(p);
                if power > 0.0 {
                    energy_charged_kwh += power * dt;
                } else {
                    energy_discharged_kwh += -power * dt;
                }
                match cs.connected_ev(p) {
                    Some(idx) => {
                        connected_evs += 1;
                        port_energies.push(self.evs[idx].current_energy());
                    }
                    None => port_energies.push(0.0),
                }
            }
        }
        let ev_power_kw: f64 = self.stations.iter().map(ChargingStation::current_power).sum();

        let mut departures = Vec::new();
        for cs in &mut self.stations {
            for p in 0..cs.n_ports() {
                let Some(idx) = cs.connected_ev(p) else {
                    continue;
                };
                let ev = &self.evs[idx];
                if ev.time_of_departure <= t + 1 || (tick.is_last && self.config.empty_ports_at_end) {
                    cs.disconnect(p);
                    departures.push(Departure {
                        station: cs.id(),
                        port: p,
                        energy_kwh: ev.current_energy(),
                        desired_kwh: ev.desired_capacity,
                        capacity_kwh: ev.battery_capacity,
                    });
                }
            }
        }

        let setpoint_kw = self.power_setpoints[t];
        let result = StepResult {
            timestep: t,
            time_hr: tick.time_hr,
            setpoint_kw,
            ev_power_kw,
            tracking_error_kw: ev_power_kw - setpoint_kw,
            transformers,
            port_currents,
            port_energies,
            connected_evs,
            departures,
            clamped_actions: clamped,
            energy_charged_kwh,
            energy_discharged_kwh,
            charge_price: self.charge_prices[t],
            discharge_price: self.discharge_prices[t],
        };
        debug!(step = t, ev_kw = ev_power_kw, setpoint_kw, connected = connected_evs, "step");
        Some(result)
    }

    /// Runs the remaining steps with a dispatch strategy.
    pub fn run<S: DispatchStrategy + ?Sized>(&mut self, strategy: &mut S) -> Vec<StepResult> {
        let mut results = Vec::with_capacity(self.clock.remaining());
        while !self.is_done() {
            let actions = strategy.get_action(&self.observation());
            if let Some(result) = self.step(&actions) {
                results.push(result);
            }
        }
        info!(strategy = strategy.name(), steps = results.len(), "episode finished");
        results
    }

    pub fn is_done(&self) -> bool {
        self.clock.is_finished()
    }

    /// Next step to be executed.
    pub fn current_step(&self) -> usize {
        self.clock.next_step()
    }

    pub fn total_ports(&self) -> usize {
        self.stations.iter().map(ChargingStation::n_ports).sum()
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn stations(&self) -> &[ChargingStation] {
        &self.stations
    }

    pub fn transformers(&self) -> &[Transformer] {
        &self.transformers
    }

    pub fn evs(&self) -> &[Ev] {
        &self.evs
    }

    pub fn power_setpoints(&self) -> &[f64] {
        &self.power_setpoints
    }

    pub fn charge_prices(&self) -> &[f64] {
        &self.charge_prices
    }

    pub fn discharge_prices(&self) -> &[f64] {
        &self.discharge_prices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{LimitMode, StationSpec, TransformerSpec};
    use crate::heuristics::ChargeAsFastAsPossible;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn config(len: usize) -> SimConfig {
        let start = NaiveDate::from_ymd_opt(2024, 6, 3)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        SimConfig::new(len, 15, start, 0)
    }

    fn episode(len: usize, evs: Vec<Ev>, max_power: f64) -> Episode {
        let spec = StationSpec {
            n_ports: 2,
            max_charge_current: 32.0,
            min_charge_current: 0.0,
            max_discharge_current: -32.0,
            min_discharge_current: 0.0,
            voltage: 230.0,
            phases: 3,
            charge_efficiency: 1.0,
            discharge_efficiency: 1.0,
        };
        Episode {
            stations: vec![ChargingStation::new(0, 0, spec)],
            transformers: vec![Transformer::new(
                0,
                TransformerSpec {
                    max_current: 1000.0,
                    max_power,
                    mode: LimitMode::Power,
                },
                vec![0],
                len,
            )],
            evs,
            power_setpoints: vec![5.0; len],
            charge_prices: vec![0.2; len],
            discharge_prices: vec![0.3; len],
        }
    }

    #[test]
    fn arrival_step_draws_nothing_and_departure_frees_port() {
        let ev = Ev::new(0, 0, 50.0, 10.0, 50.0, 1, 4, 22.0, 22.0);
        let mut engine = Engine::new(config(6), episode(6, vec![ev], 100.0)).unwrap();

        let r0 = engine.step(&[1.0, 1.0]).unwrap();
        assert_eq!(r0.connected_evs, 0);
        let r1 = engine.step(&[1.0, 1.0]).unwrap();
        assert_eq!(r1.connected_evs, 1);
        assert_eq!(r1.port_currents[0], 0.0);
        assert_eq!(r1.port_energies[0], 10.0);

        let r2 = engine.step(&[1.0, 1.0]).unwrap();
        assert_relative_eq!(r2.port_currents[0], 32.0, epsilon = 1e-9);
        let r3 = engine.step(&[1.0, 1.0]).unwrap();
        assert_eq!(r3.departures.len(), 1);
        assert_eq!(engine.stations()[0].connected_ev(0), None);

        let r4 = engine.step(&[1.0, 1.0]).unwrap();
        assert_eq!(r4.connected_evs, 0);
    }

    #[test]
    fn overload_is_reported_not_fatal() {
        let evs = vec![
            Ev::new(0, 0, 50.0, 10.0, 50.0, 0, 6, 22.0, 22.0),
            Ev::new(1, 0, 50.0, 10.0, 50.0, 0, 6, 22.0, 22.0),
        ];
        let mut engine = Engine::new(config(6), episode(6, evs, 5.0)).unwrap();
        let results = engine.run(&mut ChargeAsFastAsPossible);
        assert_eq!(results.len(), 6);
        assert_eq!(results[0].total_overload(), 0.0);
        assert!(results[1].any_overloaded());
        assert_relative_eq!(
            results[1].total_overload(),
            results[1].transformer_power_kw() - 5.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn empty_ports_at_end_forces_departures() {
        let ev = Ev::new(0, 0, 50.0, 10.0, 50.0, 0, 20, 22.0, 22.0);
        let mut engine = Engine::new(config(4), episode(4, vec![ev.clone()], 100.0)).unwrap();
        let results = engine.run(&mut ChargeAsFastAsPossible);
        assert_eq!(results[3].departures.len(), 1);

        let cfg = config(4).with_empty_ports_at_end(false);
        let mut engine = Engine::new(cfg, episode(4, vec![ev], 100.0)).unwrap();
        let results = engine.run(&mut ChargeAsFastAsPossible);
        assert!(results[3].departures.is_empty());
        assert_eq!(engine.stations()[0].occupied_ports(), 1);
    }

    #[test]
    fn step_after_horizon_returns_none() {
        let mut engine = Engine::new(config(1), episode(1, Vec::new(), 100.0)).unwrap();
        assert!(engine.step(&[]).is_some());
        assert!(engine.is_done());
        assert!(engine.step(&[]).is_none());
    }

    #[test]
    fn overlapping_stays_are_rejected() {
        let evs = vec![
            Ev::new(0, 0, 50.0, 10.0, 50.0, 0, 4, 22.0, 22.0),
            Ev::new(0, 0, 50.0, 10.0, 50.0, 3, 5, 22.0, 22.0),
        ];
        assert!(matches!(
            Engine::new(config(6), episode(6, evs, 100.0)),
            Err(SimError::Trajectory(_))
        ));
    }

    #[test]
    fn short_series_are_rejected() {
        let mut ep = episode(6, Vec::new(), 100.0);
        ep.power_setpoints.pop();
        assert!(Engine::new(config(6), ep).is_err());
    }

    #[test]
    fn discharge_reduces_energy() {
        let ev = Ev::new(0, 0, 50.0, 40.0, 50.0, 0, 4, 22.0, 22.0);
        let mut engine = Engine::new(config(4), episode(4, vec![ev], 100.0)).unwrap();
        engine.step(&[-1.0, 0.0]);
        let r = engine.step(&[-1.0, 0.0]).unwrap();
        assert!(r.ev_power_kw < 0.0);
        assert!(r.energy_discharged_kwh > 0.0);
        assert!(r.port_energies[0] < 40.0);
    }
}
