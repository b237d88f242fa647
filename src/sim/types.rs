//! Core simulation types: timing configuration, observations and step records.

use std::fmt;

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::devices::{ChargingStation, Ev};

/// Centralized simulation configuration.
///
/// All components reference this struct for timing parameters instead of
/// recomputing `dt_hours` from the timescale.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use ev_fleet_sim::sim::types::SimConfig;
///
/// let start = NaiveDate::from_ymd_opt(2024, 6, 3)
///     .unwrap()
///     .and_hms_opt(6, 0, 0)
///     .unwrap();
/// let cfg = SimConfig::new(96, 15, start, 42);
/// assert_eq!(cfg.dt_hours, 0.25);
/// assert_eq!(cfg.start_step_of_day(), 24);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Number of steps in the episode.
    pub simulation_length: usize,
    /// Step length in minutes.
    pub timescale_minutes: u32,
    /// Step length in hours, derived as `timescale_minutes / 60`.
    pub dt_hours: f64,
    /// Wall-clock time of step 0.
    pub start: NaiveDateTime,
    /// Master random seed for reproducibility.
    pub seed: u64,
    /// Energy shortfall (kWh) below which a departing driver counts as satisfied.
    pub score_threshold: f64,
    /// Force every parked vehicle to leave on the final tick.
    pub empty_ports_at_end: bool,
}

impl SimConfig {
    /// Creates a new simulation configuration.
    ///
    /// # Arguments
    ///
    /// * `simulation_length` - Number of steps (must be > 0)
    /// * `timescale_minutes` - Step length in minutes (must be > 0)
    /// * `start` - Wall-clock start of the episode
    /// * `seed` - Master random seed
    ///
    /// # Panics
    ///
    /// Panics if `simulation_length` or `timescale_minutes` is zero.
    pub fn new(
        simulation_length: usize,
        timescale_minutes: u32,
        start: NaiveDateTime,
        seed: u64,
    ) -> Self {
        assert!(simulation_length > 0, "simulation_length must be > 0");
        assert!(timescale_minutes > 0, "timescale_minutes must be > 0");
        Self {
            simulation_length,
            timescale_minutes,
            dt_hours: f64::from(timescale_minutes) / 60.0,
            start,
            seed,
            score_threshold: 1.0,
            empty_ports_at_end: true,
        }
    }

    pub fn with_score_threshold(mut self, score_threshold: f64) -> Self {
        self.score_threshold = score_threshold;
        self
    }

    pub fn with_empty_ports_at_end(mut self, empty_ports_at_end: bool) -> Self {
        self.empty_ports_at_end = empty_ports_at_end;
        self
    }

    pub fn total_steps(&self) -> usize {
        self.simulation_length
    }

    /// Minute of the day at which the episode starts.
    pub fn start_minute_of_day(&self) -> u32 {
        self.start.hour() * 60 + self.start.minute()
    }

    /// Start time of day expressed in whole steps.
    pub fn start_step_of_day(&self) -> usize {
        (self.start_minute_of_day() / self.timescale_minutes) as usize
    }

    /// Minute of the day (`0..1440`) at the beginning of `step`.
    pub fn minute_of_day(&self, step: usize) -> f64 {
        let minutes = f64::from(self.start_minute_of_day())
            + step as f64 * f64::from(self.timescale_minutes);
        minutes.rem_euclid(1440.0)
    }

    /// Number of calendar days the horizon touches.
    pub fn days_spanned(&self) -> usize {
        let end_minute = u64::from(self.start_minute_of_day())
            + self.simulation_length as u64 * u64::from(self.timescale_minutes);
        end_minute.div_ceil(1440).max(1) as usize
    }
}

/// Read-only view of the simulation handed to dispatch strategies.
#[derive(Debug, Clone, Copy)]
pub struct Observation<'a> {
    pub current_step: usize,
    pub simulation_length: usize,
    pub timescale_minutes: u32,
    pub power_setpoints: &'a [f64],
    pub stations: &'a [ChargingStation],
    pub evs: &'a [Ev],
}

impl<'a> Observation<'a> {
    /// Total number of ports; the length of every action vector.
    pub fn total_ports(&self) -> usize {
        self.stations.iter().map(ChargingStation::n_ports).sum()
    }

    /// Setpoint for the current step, 0 past the horizon.
    pub fn setpoint_kw(&self) -> f64 {
        self.power_setpoints
            .get(self.current_step)
            .copied()
            .unwrap_or(0.0)
    }

    /// The vehicle plugged into `port` of `station`, if any.
    pub fn ev_at(&self, station: &ChargingStation, port: usize) -> Option<&'a Ev> {
        station.connected_ev(port).and_then(|idx| self.evs.get(idx))
    }

    /// Iterates over every port in station-major order.
    ///
    /// Yields `(global_index, station, port, connected_ev)`.
    pub fn ports(
        self,
    ) -> impl Iterator<Item = (usize, &'a ChargingStation, usize, Option<&'a Ev>)> + 'a {
        let evs = self.evs;
        self.stations
            .iter()
            .flat_map(|cs| (0..cs.n_ports()).map(move |p| (cs, p)))
            .enumerate()
            .map(move |(i, (cs, p))| (i, cs, p, cs.connected_ev(p).and_then(|idx| evs.get(idx))))
    }
}

/// Transformer state at the end of one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformerReading {
    pub id: usize,
    /// Total draw including background load (kW).
    pub power_kw: f64,
    pub amps: f64,
    /// Distance past the violated limit; 0 when within the band.
    pub overload: f64,
}

/// A vehicle leaving at the end of a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Departure {
    pub station: usize,
    pub port: usize,
    pub energy_kwh: f64,
    pub desired_kwh: f64,
    pub capacity_kwh: f64,
}

impl Departure {
    /// Fraction of the desired energy delivered, capped at 1.
    pub fn user_satisfaction(&self) -> f64 {
        if self.desired_kwh <= 0.0 {
            1.0
        } else {
            (self.energy_kwh / self.desired_kwh).min(1.0)
        }
    }
}

/// Complete record of one simulation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Step index.
    pub timestep: usize,
    /// Simulation time in hours since the episode start.
    pub time_hr: f64,
    /// Aggregate power target for this step (kW).
    pub setpoint_kw: f64,
    /// Aggregate vehicle power over all ports (kW, signed).
    pub ev_power_kw: f64,
    /// `ev_power_kw - setpoint_kw`.
    pub tracking_error_kw: f64,
    pub transformers: Vec<TransformerReading>,
    /// Port currents in station-major order (A).
    pub port_currents: Vec<f64>,
    /// Stored energy of the vehicle at each port after this step, 0 when empty (kWh).
    pub port_energies: Vec<f64>,
    /// Vehicles plugged in during this step.
    pub connected_evs: usize,
    pub departures: Vec<Departure>,
    /// Number of port requests clamped to a feasible value.
    pub clamped_actions: usize,
    /// Grid-side energy delivered to vehicles (kWh).
    pub energy_charged_kwh: f64,
    /// Grid-side energy returned by vehicles (kWh).
    pub energy_discharged_kwh: f64,
    pub charge_price: f64,
    pub discharge_price: f64,
}

impl StepResult {
    /// Sum of overload magnitudes over all transformers.
    pub fn total_overload(&self) -> f64 {
        self.transformers.iter().map(|t| t.overload).sum()
    }

    pub fn any_overloaded(&self) -> bool {
        self.transformers.iter().any(|t| t.overload > 0.0)
    }

    /// Total transformer draw (kW).
    pub fn transformer_power_kw(&self) -> f64 {
        self.transformers.iter().map(|t| t.power_kw).sum()
    }
}

impl fmt::Display for StepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t={:>3} ({:>6.2}h) | ev={:>7.2} kW  setpoint={:>7.2} kW  err={:>7.2} kW | \
             transformers={:>7.2} kW overload={:.3} | connected={} departed={} clamped={}",
            self.timestep,
            self.time_hr,
            self.ev_power_kw,
            self.setpoint_kw,
            self.tracking_error_kw,
            self.transformer_power_kw(),
            self.total_overload(),
            self.connected_evs,
            self.departures.len(),
            self.clamped_actions,
        )
    }
}
