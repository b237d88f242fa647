//! Round-robin setpoint tracking.
//!
//! The setpoint is turned into a number of vehicles to charge at the
//! fleet's average per-port power. Vehicles are served from the front of a
//! rotating buffer and move to the back once served, so every parked vehicle
//! gets a turn.

use std::collections::VecDeque;

use tracing::trace;

use crate::devices::ChargingStation;
use crate::devices::types::ceil_tolerant;
use crate::error::ConfigError;
use crate::sim::types::Observation;

use super::{DispatchStrategy, no_stations};

/// Round-robin heuristic state.
///
/// The buffer is a deque of `(port, generation)` entries plus a presence
/// index stamping the live generation of each port. Removing a port only
/// clears its stamp; the stale deque entry is dropped when it reaches the
/// front or during compaction.
#[derive(Debug, Clone)]
pub struct RoundRobin {
    average_power_w: f64,
    queue: VecDeque<(usize, u64)>,
    presence: Vec<Option<u64>>,
    next_generation: u64,
    live: usize,
}

impl RoundRobin {
    /// Creates the heuristic for a fixed set of stations.
    ///
    /// The average power is the mean over stations of
    /// `max_charge_current * voltage * sqrt(phases) / n_ports` (W).
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if `stations` is empty.
    pub fn new(stations: &[ChargingStation]) -> Result<Self, ConfigError> {
        if stations.is_empty() {
            return Err(no_stations());
        }
        let average_power_w = stations
            .iter()
            .map(|cs| cs.spec().max_charge_current * cs.effective_voltage() / cs.n_ports() as f64)
            .sum::<f64>()
            / stations.len() as f64;
        let total_ports = stations.iter().map(ChargingStation::n_ports).sum();

        Ok(Self {
            average_power_w,
            queue: VecDeque::new(),
            presence: vec![None; total_ports],
            next_generation: 0,
            live: 0,
        })
    }

    /// Average per-port charging power (W).
    pub fn average_power_w(&self) -> f64 {
        self.average_power_w
    }

    /// Ports currently in the buffer, front first.
    pub fn buffer(&self) -> Vec<usize> {
        self.queue
            .iter()
            .filter(|&&(port, generation)| self.presence.get(port) == Some(&Some(generation)))
            .map(|&(port, _)| port)
            .collect()
    }

    /// Adds newly eligible ports to the front and retires the rest.
    ///
    /// Eligible means a connected vehicle that is not full. New ports are
    /// pushed to the front in ascending scan order, so the highest new port
    /// ends up first.
    fn refresh(&mut self, observation: &Observation<'_>) {
        let total_ports = observation.total_ports();
        if self.presence.len() < total_ports {
            self.presence.resize(total_ports, None);
        }

        for (i, _, _, ev) in observation.ports() {
            let eligible = ev.is_some_and(|ev| !ev.is_full());
            match (eligible, self.presence[i]) {
                (true, None) => {
                    let generation = self.next_generation;
                    self.next_generation += 1;
                    self.presence[i] = Some(generation);
                    self.queue.push_front((i, generation));
                    self.live += 1;
                }
                (false, Some(_)) => {
                    self.presence[i] = None;
                    self.live -= 1;
                }
                _ => {}
            }
        }

        if self.queue.len() > 2 * self.live + 16 {
            let presence = &self.presence;
            self.queue
                .retain(|&(port, generation)| presence[port] == Some(generation));
        }
    }
}

impl DispatchStrategy for RoundRobin {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn get_action(&mut self, observation: &Observation<'_>) -> Vec<f64> {
        self.refresh(observation);

        let total_ports = observation.total_ports();
        let mut actions = vec![0.0; total_ports];
        let target_w = observation.setpoint_kw() * 1000.0;
        let num_evs = if self.average_power_w > 0.0 {
            target_w / self.average_power_w
        } else {
            0.0
        };
        if num_evs <= 0.0 {
            return actions;
        }

        let wanted = (ceil_tolerant(num_evs) as usize).min(self.live);
        let mut selected = Vec::with_capacity(wanted);
        while selected.len() < wanted {
            let Some((port, generation)) = self.queue.pop_front() else {
                break;
            };
            if self.presence[port] == Some(generation) {
                selected.push((port, generation));
            }
        }

        let share: Vec<f64> = observation
            .stations
            .iter()
            .flat_map(|cs| std::iter::repeat_n(1.0 / cs.n_ports() as f64, cs.n_ports()))
            .collect();
        let last = selected.len().saturating_sub(1);
        for (i, &(port, _)) in selected.iter().enumerate() {
            actions[port] = if i == last {
                num_evs - i as f64
            } else {
                share[port]
            };
        }

        trace!(num_evs, served = selected.len(), buffered = self.live, "round robin");
        self.queue.extend(selected);
        actions
    }
}
