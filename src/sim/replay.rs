//! Frozen episode trajectories.
//!
//! An [`EpisodeTrajectory`] captures every input of a run: topology, limits,
//! background load, prices, setpoints and the vehicle population, plus the
//! per-port occupancy series the reference model is built from. It is
//! serialized as JSON and can rebuild an identical [`Episode`].

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::devices::{ChargingStation, Ev, LimitMode, StationSpec, Transformer, TransformerSeries};
use crate::error::SimError;

use super::engine::Engine;
use super::episode::Episode;
use super::types::SimConfig;

/// Dense `[port, station, step]` series.
///
/// Stations with fewer ports than `n_ports` leave the extra slots at 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortSeries {
    pub n_ports: usize,
    pub n_stations: usize,
    pub len: usize,
    values: Vec<f64>,
}

impl PortSeries {
    pub fn zeros(n_ports: usize, n_stations: usize, len: usize) -> Self {
        Self {
            n_ports,
            n_stations,
            len,
            values: vec![0.0; n_ports * n_stations * len],
        }
    }

    fn index(&self, port: usize, station: usize, step: usize) -> Option<usize> {
        (port < self.n_ports && station < self.n_stations && step < self.len)
            .then(|| (port * self.n_stations + station) * self.len + step)
    }

    /// Value at `(port, station, step)`, 0 outside the grid.
    pub fn get(&self, port: usize, station: usize, step: usize) -> f64 {
        self.index(port, station, step)
            .and_then(|i| self.values.get(i))
            .copied()
            .unwrap_or(0.0)
    }

    /// Returns `true` when the slot holds a non-zero flag.
    pub fn is_set(&self, port: usize, station: usize, step: usize) -> bool {
        self.get(port, station, step) != 0.0
    }

    /// Writes one slot. Out-of-grid writes are ignored.
    pub fn set(&mut self, port: usize, station: usize, step: usize, value: f64) {
        if let Some(i) = self.index(port, station, step) {
            self.values[i] = value;
        }
    }

    /// Writes `value` over the steps `[from, to)` of one port.
    pub fn fill(&mut self, port: usize, station: usize, from: usize, to: usize, value: f64) {
        for step in from..to.min(self.len) {
            self.set(port, station, step, value);
        }
    }

    fn has_shape(&self, n_ports: usize, n_stations: usize, len: usize) -> bool {
        self.n_ports == n_ports
            && self.n_stations == n_stations
            && self.len == len
            && self.values.len() == n_ports * n_stations * len
    }
}

/// Everything needed to re-simulate an episode or build its reference model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeTrajectory {
    pub simulation_length: usize,
    pub timescale_minutes: u32,
    pub sim_start: NaiveDateTime,
    pub seed: u64,
    pub score_threshold: f64,
    pub empty_ports_at_end: bool,
    pub n_stations: usize,
    pub n_transformers: usize,
    pub max_n_ports: usize,

    pub power_setpoints: Vec<f64>,
    pub charge_prices: Vec<f64>,
    pub discharge_prices: Vec<f64>,

    /// Transformer feeding each station.
    pub cs_transformer: Vec<usize>,
    pub stations: Vec<StationSpec>,
    /// Charge efficiency per `[station][step]`.
    pub cs_ch_efficiency: Vec<Vec<f64>>,
    /// Discharge efficiency per `[station][step]`.
    pub cs_dis_efficiency: Vec<Vec<f64>>,

    pub transformer_mode: Vec<LimitMode>,
    pub transformers: Vec<TransformerSeries>,

    /// Battery capacity while occupied (kWh).
    pub ev_max_energy: PortSeries,
    /// Maximum charging power while occupied (kW).
    pub ev_max_ch_power: PortSeries,
    /// Maximum discharging power while occupied (kW, negative).
    pub ev_max_dis_power: PortSeries,
    /// Occupancy flag.
    pub u: PortSeries,
    /// Stored energy on the arrival step (kWh).
    pub energy_at_arrival: PortSeries,
    /// Marks the first occupied step of each stay.
    pub ev_arrival: PortSeries,
    /// Marks the step after the last occupied step, when inside the horizon.
    pub t_dep: PortSeries,
    /// Desired energy at the departure mark (kWh).
    pub ev_des_energy: PortSeries,

    /// Vehicle records in their arrival state.
    pub evs: Vec<Ev>,
}

impl EpisodeTrajectory {
    /// Captures a freshly generated episode.
    pub fn from_episode(config: &SimConfig, episode: &Episode) -> Self {
        Self::build(
            config,
            &episode.stations,
            &episode.transformers,
            &episode.evs,
            [
                &episode.power_setpoints,
                &episode.charge_prices,
                &episode.discharge_prices,
            ],
        )
    }

    /// Captures the episode an engine runs, at any point of the run.
    ///
    /// Vehicle records are stored in their arrival state, so capturing
    /// before or after stepping yields the same trajectory.
    pub fn capture(engine: &Engine) -> Self {
        Self::build(
            engine.config(),
            engine.stations(),
            engine.transformers(),
            engine.evs(),
            [
                engine.power_setpoints(),
                engine.charge_prices(),
                engine.discharge_prices(),
            ],
        )
    }

    fn build(
        config: &SimConfig,
        stations: &[ChargingStation],
        transformers: &[Transformer],
        evs: &[Ev],
        [power_setpoints, charge_prices, discharge_prices]: [&[f64]; 3],
    ) -> Self {
        let len = config.simulation_length;
        let n_stations = stations.len();
        let max_n_ports = stations.iter().map(ChargingStation::n_ports).max().unwrap_or(0);
        let grid = || PortSeries::zeros(max_n_ports, n_stations, len);

        let mut ev_max_energy = grid();
        let mut ev_max_ch_power = grid();
        let mut ev_max_dis_power = grid();
        let mut u = grid();
        let mut energy_at_arrival = grid();
        let mut ev_arrival = grid();
        let mut t_dep = grid();
        let mut ev_des_energy = grid();

        for ev in evs.iter().filter(|ev| ev.time_of_arrival < len) {
            let (p, i) = (ev.id, ev.location);
            let (arr, dep) = (ev.time_of_arrival, ev.time_of_departure);
            u.fill(p, i, arr, dep, 1.0);
            ev_max_energy.fill(p, i, arr, dep, ev.battery_capacity);
            ev_max_ch_power.fill(p, i, arr, dep, ev.max_ac_charge_power);
            ev_max_dis_power.fill(p, i, arr, dep, -ev.max_discharge_power);
            ev_arrival.set(p, i, arr, 1.0);
            energy_at_arrival.set(p, i, arr, ev.battery_capacity_at_arrival);
            if dep < len {
                t_dep.set(p, i, dep, 1.0);
                ev_des_energy.set(p, i, dep, ev.desired_capacity);
            }
        }

        let evs = evs
            .iter()
            .cloned()
            .map(|mut ev| {
                ev.reset();
                ev
            })
            .collect();

        Self {
            simulation_length: len,
            timescale_minutes: config.timescale_minutes,
            sim_start: config.start,
            seed: config.seed,
            score_threshold: config.score_threshold,
            empty_ports_at_end: config.empty_ports_at_end,
            n_stations,
            n_transformers: transformers.len(),
            max_n_ports,
            power_setpoints: power_setpoints.to_vec(),
            charge_prices: charge_prices.to_vec(),
            discharge_prices: discharge_prices.to_vec(),
            cs_transformer: stations.iter().map(ChargingStation::connected_transformer).collect(),
            stations: stations.iter().map(|cs| cs.spec().clone()).collect(),
            cs_ch_efficiency: stations
                .iter()
                .map(|cs| vec![cs.spec().charge_efficiency; len])
                .collect(),
            cs_dis_efficiency: stations
                .iter()
                .map(|cs| vec![cs.spec().discharge_efficiency; len])
                .collect(),
            transformer_mode: transformers.iter().map(Transformer::mode).collect(),
            transformers: transformers.iter().map(|tr| tr.series().clone()).collect(),
            ev_max_energy,
            ev_max_ch_power,
            ev_max_dis_power,
            u,
            energy_at_arrival,
            ev_arrival,
            t_dep,
            ev_des_energy,
            evs,
        }
    }

    /// Timing configuration the trajectory was recorded with.
    pub fn sim_config(&self) -> SimConfig {
        SimConfig {
            simulation_length: self.simulation_length,
            timescale_minutes: self.timescale_minutes,
            dt_hours: f64::from(self.timescale_minutes) / 60.0,
            start: self.sim_start,
            seed: self.seed,
            score_threshold: self.score_threshold,
            empty_ports_at_end: self.empty_ports_at_end,
        }
    }

    pub fn dt_hours(&self) -> f64 {
        f64::from(self.timescale_minutes) / 60.0
    }

    /// Checks that every series matches the declared dimensions.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Trajectory` describing the first inconsistency.
    pub fn validate(&self) -> Result<(), SimError> {
        let len = self.simulation_length;
        let fail = |msg: String| Err(SimError::Trajectory(msg));

        if len == 0 || self.timescale_minutes == 0 {
            return fail("simulation_length and timescale_minutes must be > 0".into());
        }
        for (name, series) in [
            ("power_setpoints", &self.power_setpoints),
            ("charge_prices", &self.charge_prices),
            ("discharge_prices", &self.discharge_prices),
        ] {
            if series.len() != len {
                return fail(format!("{name} has {} steps, expected {len}", series.len()));
            }
        }

        if self.stations.len() != self.n_stations
            || self.cs_transformer.len() != self.n_stations
            || self.cs_ch_efficiency.len() != self.n_stations
            || self.cs_dis_efficiency.len() != self.n_stations
        {
            return fail(format!("station data does not cover {} stations", self.n_stations));
        }
        if self.stations.is_empty() {
            return fail("trajectory has no charging stations".into());
        }
        if let Some(i) = self.stations.iter().position(|s| !s.is_valid()) {
            return fail(format!("station {i} has invalid limits"));
        }
        if let Some(i) = self.cs_transformer.iter().position(|&j| j >= self.n_transformers) {
            return fail(format!("station {i} references a missing transformer"));
        }
        let widest = self.stations.iter().map(|s| s.n_ports).max().unwrap_or(0);
        if widest != self.max_n_ports {
            return fail(format!("max_n_ports is {}, stations have {widest}", self.max_n_ports));
        }
        if self
            .cs_ch_efficiency
            .iter()
            .chain(&self.cs_dis_efficiency)
            .any(|row| row.len() != len)
        {
            return fail(format!("efficiency series must have {len} steps"));
        }

        if self.transformers.len() != self.n_transformers
            || self.transformer_mode.len() != self.n_transformers
        {
            return fail(format!("transformer data does not cover {} transformers", self.n_transformers));
        }
        if let Some(j) = self
            .transformers
            .iter()
            .position(|s| s.len() != len || !s.is_consistent())
        {
            return fail(format!("transformer {j} series must all have {len} steps"));
        }

        for (name, series) in [
            ("ev_max_energy", &self.ev_max_energy),
            ("ev_max_ch_power", &self.ev_max_ch_power),
            ("ev_max_dis_power", &self.ev_max_dis_power),
            ("u", &self.u),
            ("energy_at_arrival", &self.energy_at_arrival),
            ("ev_arrival", &self.ev_arrival),
            ("t_dep", &self.t_dep),
            ("ev_des_energy", &self.ev_des_energy),
        ] {
            if !series.has_shape(self.max_n_ports, self.n_stations, len) {
                return fail(format!(
                    "{name} must be {} x {} x {len}",
                    self.max_n_ports, self.n_stations
                ));
            }
        }

        if let Some((idx, ev)) = self
            .evs
            .iter()
            .enumerate()
            .find(|(_, ev)| self.stations.get(ev.location).is_none_or(|s| ev.id >= s.n_ports))
        {
            return fail(format!(
                "ev {idx} references port {} of station {}",
                ev.id, ev.location
            ));
        }
        if let Some(idx) = self.evs.iter().position(|ev| !ev.is_valid()) {
            return fail(format!("ev {idx} has invalid capacities, stay or power limits"));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, SimError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses and validates a trajectory.
    pub fn from_json(json: &str) -> Result<Self, SimError> {
        let trajectory: Self = serde_json::from_str(json)?;
        trajectory.validate()?;
        Ok(trajectory)
    }

    /// Writes the trajectory as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Io` or `SimError::Json` if the file cannot be written.
    pub fn write_json(&self, path: &Path) -> Result<(), SimError> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        info!(path = %path.display(), "trajectory written");
        Ok(())
    }

    /// Reads and validates a trajectory file.
    pub fn read_json(path: &Path) -> Result<Self, SimError> {
        let reader = BufReader::new(File::open(path)?);
        let trajectory: Self = serde_json::from_reader(reader)?;
        trajectory.validate()?;
        Ok(trajectory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::TransformerSpec;
    use chrono::NaiveDate;

    fn config(len: usize) -> SimConfig {
        let start = NaiveDate::from_ymd_opt(2024, 6, 3)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        SimConfig::new(len, 15, start, 7)
    }

    fn station_spec(n_ports: usize) -> StationSpec {
        StationSpec {
            n_ports,
            max_charge_current: 32.0,
            min_charge_current: 0.0,
            max_discharge_current: -32.0,
            min_discharge_current: 0.0,
            voltage: 230.0,
            phases: 3,
            charge_efficiency: 0.95,
            discharge_efficiency: 0.9,
        }
    }

    fn episode(len: usize, evs: Vec<Ev>) -> Episode {
        Episode {
            stations: vec![
                ChargingStation::new(0, 0, station_spec(2)),
                ChargingStation::new(1, 0, station_spec(1)),
            ],
            transformers: vec![Transformer::new(
                0,
                TransformerSpec {
                    max_current: 200.0,
                    max_power: 80.0,
                    mode: LimitMode::Current,
                },
                vec![0, 1],
                len,
            )],
            evs,
            power_setpoints: vec![10.0; len],
            charge_prices: vec![0.25; len],
            discharge_prices: vec![0.3; len],
        }
    }

    #[test]
    fn port_series_layout() {
        let mut s = PortSeries::zeros(2, 3, 4);
        s.set(1, 2, 3, 5.0);
        assert_eq!(s.get(1, 2, 3), 5.0);
        assert_eq!(s.get(0, 2, 3), 0.0);
        s.set(2, 0, 0, 1.0);
        assert_eq!(s.get(2, 0, 0), 0.0);
        s.fill(0, 0, 2, 10, 1.0);
        assert!(s.is_set(0, 0, 2) && s.is_set(0, 0, 3));
        assert!(!s.is_set(0, 0, 1));
    }

    #[test]
    fn occupancy_marks_follow_stays() {
        let evs = vec![
            Ev::new(1, 0, 60.0, 20.0, 50.0, 2, 5, 22.0, 11.0),
            Ev::new(0, 1, 40.0, 10.0, 40.0, 6, 12, 11.0, 11.0),
        ];
        let t = EpisodeTrajectory::from_episode(&config(8), &episode(8, evs));

        assert_eq!(t.max_n_ports, 2);
        assert_eq!((t.n_stations, t.n_transformers), (2, 1));
        for step in 0..8 {
            assert_eq!(t.u.is_set(1, 0, step), (2..5).contains(&step));
        }
        assert!(t.ev_arrival.is_set(1, 0, 2));
        assert!(!t.ev_arrival.is_set(1, 0, 3));
        assert!(t.t_dep.is_set(1, 0, 5));
        assert!(!t.t_dep.is_set(1, 0, 4));
        assert_eq!(t.ev_des_energy.get(1, 0, 5), 50.0);
        assert_eq!(t.energy_at_arrival.get(1, 0, 2), 20.0);
        assert_eq!(t.ev_max_dis_power.get(1, 0, 3), -11.0);

        // Departure beyond the horizon is not marked.
        assert!(t.u.is_set(0, 1, 7));
        assert!((0..8).all(|s| !t.t_dep.is_set(0, 1, s)));
        // Station 1 has a single port; the padded slot stays empty.
        assert!((0..8).all(|s| !t.u.is_set(1, 1, s)));
        assert_eq!(t.cs_ch_efficiency[0], vec![0.95; 8]);
    }

    #[test]
    fn json_round_trip_and_rebuild() {
        let evs = vec![Ev::new(0, 0, 50.0, 10.0, 45.0, 1, 6, 22.0, 22.0)];
        let cfg = config(8);
        let t = EpisodeTrajectory::from_episode(&cfg, &episode(8, evs));
        let parsed = EpisodeTrajectory::from_json(&t.to_json().unwrap()).unwrap();
        assert_eq!(parsed, t);
        assert_eq!(parsed.sim_config(), cfg);

        let rebuilt = Episode::from_trajectory(&parsed).unwrap();
        assert_eq!(rebuilt.stations.len(), 2);
        assert_eq!(rebuilt.transformers[0].station_ids(), &[0, 1]);
        assert_eq!(rebuilt.evs, parsed.evs);
    }

    #[test]
    fn capture_stores_arrival_state() {
        let evs = vec![Ev::new(0, 0, 50.0, 10.0, 45.0, 0, 6, 22.0, 22.0)];
        let cfg = config(8);
        let before = EpisodeTrajectory::from_episode(&cfg, &episode(8, evs.clone()));
        let mut engine = Engine::new(cfg, episode(8, evs)).unwrap();
        for _ in 0..3 {
            engine.step(&[1.0, 1.0, 1.0]);
        }
        assert!(engine.evs()[0].current_energy() > 10.0);
        assert_eq!(EpisodeTrajectory::capture(&engine), before);
    }

    #[test]
    fn inconsistent_payload_is_rejected() {
        let t = EpisodeTrajectory::from_episode(&config(8), &episode(8, Vec::new()));

        let mut short = t.clone();
        short.power_setpoints.pop();
        assert!(matches!(short.validate(), Err(SimError::Trajectory(_))));

        let mut dangling = t.clone();
        dangling.cs_transformer[1] = 3;
        assert!(dangling.validate().is_err());

        let mut bad_ev = t;
        bad_ev.evs.push(Ev::new(1, 1, 50.0, 10.0, 45.0, 0, 2, 22.0, 22.0));
        assert!(bad_ev.validate().is_err());
    }
}
