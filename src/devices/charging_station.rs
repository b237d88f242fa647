//! Charging stations and their ports.
//!
//! A station owns a fixed number of ports. Each port holds at most one
//! vehicle, referenced by its index into the episode's vehicle list. Station
//! current limits are shared by all ports: when the per-port requests exceed
//! them the requests are scaled down proportionally.

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::ev::Ev;
use super::types::{amps_to_kw, effective_voltage, kw_to_amps};

/// Electrical characteristics shared by every port of a station.
///
/// Discharge currents are negative: `max_discharge_current <= min_discharge_current <= 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationSpec {
    pub n_ports: usize,
    /// Station-wide charging current limit (A).
    pub max_charge_current: f64,
    /// Smallest non-zero charging current a port can deliver (A).
    pub min_charge_current: f64,
    /// Station-wide discharging current limit (A, negative).
    pub max_discharge_current: f64,
    /// Smallest non-zero discharging current magnitude, as a negative value (A).
    pub min_discharge_current: f64,
    pub voltage: f64,
    pub phases: u32,
    pub charge_efficiency: f64,
    pub discharge_efficiency: f64,
}

impl StationSpec {
    /// Returns `true` when the limits are usable for a station.
    pub fn is_valid(&self) -> bool {
        self.n_ports > 0
            && self.max_charge_current > 0.0
            && (0.0..=self.max_charge_current).contains(&self.min_charge_current)
            && self.max_discharge_current <= self.min_discharge_current
            && self.min_discharge_current <= 0.0
            && self.voltage > 0.0
            && self.phases > 0
            && self.charge_efficiency > 0.0
            && self.charge_efficiency <= 1.0
            && self.discharge_efficiency > 0.0
            && self.discharge_efficiency <= 1.0
    }

    /// Current requested by a raw action before vehicle limits apply.
    ///
    /// The action is clamped into `[-1, 1]` (non-finite values become 0).
    /// Positive actions scale the charging limit, negative actions the
    /// discharging limit magnitude.
    pub fn requested_amps(&self, raw: f64) -> f64 {
        let action = if raw.is_finite() { raw.clamp(-1.0, 1.0) } else { 0.0 };
        if action >= 0.0 {
            action * self.max_charge_current
        } else {
            action * self.max_discharge_current.abs()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Port {
    ev: Option<usize>,
    current_amps: f64,
    current_power: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChargingStation {
    id: usize,
    connected_transformer: usize,
    spec: StationSpec,
    ports: Vec<Port>,
    current_amps: f64,
    current_power: f64,
}

impl ChargingStation {
    /// Creates an empty station.
    ///
    /// # Panics
    ///
    /// Panics unless [`StationSpec::is_valid`] holds.
    pub fn new(id: usize, connected_transformer: usize, spec: StationSpec) -> Self {
        assert!(spec.is_valid(), "invalid station spec: {spec:?}");

        Self {
            id,
            connected_transformer,
            ports: vec![Port::default(); spec.n_ports],
            spec,
            current_amps: 0.0,
            current_power: 0.0,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn connected_transformer(&self) -> usize {
        self.connected_transformer
    }

    pub fn spec(&self) -> &StationSpec {
        &self.spec
    }

    pub fn n_ports(&self) -> usize {
        self.ports.len()
    }

    /// Station charging limit converted to kW.
    pub fn max_power_kw(&self) -> f64 {
        amps_to_kw(self.spec.max_charge_current, self.spec.voltage, self.spec.phases)
    }

    /// Station discharging limit magnitude converted to kW.
    pub fn max_discharge_power_kw(&self) -> f64 {
        amps_to_kw(
            self.spec.max_discharge_current.abs(),
            self.spec.voltage,
            self.spec.phases,
        )
    }

    pub fn effective_voltage(&self) -> f64 {
        effective_voltage(self.spec.voltage, self.spec.phases)
    }

    /// Total current over all ports in the last dispatched step (A).
    pub fn current_amps(&self) -> f64 {
        self.current_amps
    }

    /// Total power over all ports in the last dispatched step (kW).
    pub fn current_power(&self) -> f64 {
        self.current_power
    }

    pub fn port_current(&self, port: usize) -> f64 {
        self.ports.get(port).map_or(0.0, |p| p.current_amps)
    }

    pub fn port_power(&self, port: usize) -> f64 {
        self.ports.get(port).map_or(0.0, |p| p.current_power)
    }

    /// Index of the vehicle plugged into `port`, if any.
    pub fn connected_ev(&self, port: usize) -> Option<usize> {
        self.ports.get(port).and_then(|p| p.ev)
    }

    pub fn occupied_ports(&self) -> usize {
        self.ports.iter().filter(|p| p.ev.is_some()).count()
    }

    /// Plugs vehicle `ev_index` into `port`. Returns `false` if the port is
    /// missing or already occupied.
    pub fn connect(&mut self, port: usize, ev_index: usize) -> bool {
        match self.ports.get_mut(port) {
            Some(p) if p.ev.is_none() => {
                p.ev = Some(ev_index);
                true
            }
            _ => false,
        }
    }

    /// Unplugs the vehicle at `port` and returns its index.
    pub fn disconnect(&mut self, port: usize) -> Option<usize> {
        let p = self.ports.get_mut(port)?;
        p.current_amps = 0.0;
        p.current_power = 0.0;
        p.ev.take()
    }

    /// Current a port would draw for a normalized action.
    ///
    /// See [`StationSpec::requested_amps`].
    pub fn requested_amps(&self, action: f64) -> f64 {
        self.spec.requested_amps(action)
    }

    /// Turns per-port actions into feasible port currents and station totals.
    ///
    /// Vehicles in their arrival step draw nothing. Missing actions count as
    /// zero. Vehicle energy is left untouched; see [`Self::commit_energy`].
    ///
    /// # Returns
    ///
    /// The number of ports whose request had to be clamped, each counted once.
    pub fn dispatch(&mut self, actions: &[f64], evs: &[Ev], step: usize, dt_hours: f64) -> usize {
        let spec = &self.spec;
        let mut clamped = vec![false; self.ports.len()];

        for (i, port) in self.ports.iter_mut().enumerate() {
            port.current_amps = 0.0;
            port.current_power = 0.0;

            let Some(ev) = port.ev.and_then(|idx| evs.get(idx)) else {
                continue;
            };
            if ev.time_of_arrival == step {
                continue;
            }

            let raw = actions.get(i).copied().unwrap_or(0.0);
            let requested = spec.requested_amps(raw);
            let in_range = raw.is_finite() && (-1.0..=1.0).contains(&raw);

            let requested_kw = amps_to_kw(requested, spec.voltage, spec.phases);
            let efficiency = if requested_kw >= 0.0 {
                spec.charge_efficiency
            } else {
                spec.discharge_efficiency
            };
            let feasible_kw = ev.feasible_power_kw(requested_kw, efficiency, dt_hours);
            let mut amps = kw_to_amps(feasible_kw, spec.voltage, spec.phases);
            amps = below_minimum_to_zero(amps, spec);

            if !in_range || (amps - requested).abs() > 1e-9 {
                trace!(station = self.id, port = i, raw, amps, "action clamped");
                clamped[i] = true;
            }
            port.current_amps = amps;
        }

        let charging: f64 = self.ports.iter().map(|p| p.current_amps.max(0.0)).sum();
        if charging > spec.max_charge_current {
            let scale = spec.max_charge_current / charging;
            for (i, port) in self.ports.iter_mut().enumerate().filter(|(_, p)| p.current_amps > 0.0) {
                port.current_amps = below_minimum_to_zero(port.current_amps * scale, spec);
                clamped[i] = true;
            }
        }

        let discharging: f64 = self.ports.iter().map(|p| p.current_amps.min(0.0)).sum();
        if discharging < spec.max_discharge_current {
            let scale = spec.max_discharge_current / discharging;
            for (i, port) in self.ports.iter_mut().enumerate().filter(|(_, p)| p.current_amps < 0.0) {
                port.current_amps = below_minimum_to_zero(port.current_amps * scale, spec);
                clamped[i] = true;
            }
        }

        for port in &mut self.ports {
            port.current_power = amps_to_kw(port.current_amps, spec.voltage, spec.phases);
        }
        self.current_amps = self.ports.iter().map(|p| p.current_amps).sum();
        self.current_power = self.ports.iter().map(|p| p.current_power).sum();
        clamped.iter().filter(|&&c| c).count()
    }

    /// Moves the dispatched port powers into the connected vehicles' batteries.
    pub fn commit_energy(&self, evs: &mut [Ev], dt_hours: f64) {
        for port in &self.ports {
            let Some(ev) = port.ev.and_then(|idx| evs.get_mut(idx)) else {
                continue;
            };
            let efficiency = if port.current_power >= 0.0 {
                self.spec.charge_efficiency
            } else {
                self.spec.discharge_efficiency
            };
            ev.commit(port.current_power, efficiency, dt_hours);
        }
    }
}

fn below_minimum_to_zero(amps: f64, spec: &StationSpec) -> f64 {
    if (amps > 0.0 && amps < spec.min_charge_current)
        || (amps < 0.0 && amps > spec.min_discharge_current)
    {
        0.0
    } else {
        amps
    }
}
