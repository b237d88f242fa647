//! Dispatch heuristics turning an aggregate power target into per-port actions.
//!
//! Every strategy produces one action per port in station-major order. Actions
//! are normalized: `1.0` asks for the station's full charging current, `-1.0`
//! for its full discharging current. The simulator clamps whatever it receives.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::devices::ChargingStation;
use crate::error::ConfigError;
use crate::sim::types::Observation;

pub mod charge_fast;
pub mod charge_late;
pub mod round_robin;

pub use charge_fast::{ChargeAsFastAsPossible, ChargeAsFastAsPossibleToDesiredCapacity};
pub use charge_late::ChargeAsLateAsPossible;
pub use round_robin::RoundRobin;

/// A policy mapping the current simulation state to per-port actions.
pub trait DispatchStrategy {
    /// Short identifier used in logs and reports.
    fn name(&self) -> &'static str;

    /// Returns one action per port, station-major, nominally in `[-1, 1]`.
    fn get_action(&mut self, observation: &Observation<'_>) -> Vec<f64>;
}

/// Names of the built-in heuristics, as used in scenario files and on the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    RoundRobin,
    ChargeAsLateAsPossible,
    #[default]
    ChargeAsFastAsPossible,
    ChargeAsFastAsPossibleToDesiredCapacity,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::RoundRobin,
        StrategyKind::ChargeAsLateAsPossible,
        StrategyKind::ChargeAsFastAsPossible,
        StrategyKind::ChargeAsFastAsPossibleToDesiredCapacity,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StrategyKind::RoundRobin => "round_robin",
            StrategyKind::ChargeAsLateAsPossible => "charge_as_late_as_possible",
            StrategyKind::ChargeAsFastAsPossible => "charge_as_fast_as_possible",
            StrategyKind::ChargeAsFastAsPossibleToDesiredCapacity => {
                "charge_as_fast_as_possible_to_desired_capacity"
            }
        }
    }

    /// Instantiates the heuristic for the given stations.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if `stations` is empty.
    pub fn build(self, stations: &[ChargingStation]) -> Result<Strategy, ConfigError> {
        if stations.is_empty() {
            return Err(no_stations());
        }
        Ok(match self {
            StrategyKind::RoundRobin => Strategy::RoundRobin(RoundRobin::new(stations)?),
            StrategyKind::ChargeAsLateAsPossible => {
                Strategy::ChargeAsLateAsPossible(ChargeAsLateAsPossible)
            }
            StrategyKind::ChargeAsFastAsPossible => {
                Strategy::ChargeAsFastAsPossible(ChargeAsFastAsPossible)
            }
            StrategyKind::ChargeAsFastAsPossibleToDesiredCapacity => {
                Strategy::ChargeAsFastAsPossibleToDesiredCapacity(
                    ChargeAsFastAsPossibleToDesiredCapacity,
                )
            }
        })
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StrategyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|k| k.name()).collect();
                ConfigError::new(
                    "strategy",
                    format!("unknown strategy \"{s}\", available: {}", names.join(", ")),
                )
            })
    }
}

pub(crate) fn no_stations() -> ConfigError {
    ConfigError::new(
        "charging_station.count",
        "dispatch heuristics need at least one charging station",
    )
}

/// A built-in heuristic, dispatched statically.
#[derive(Debug, Clone)]
pub enum Strategy {
    RoundRobin(RoundRobin),
    ChargeAsLateAsPossible(ChargeAsLateAsPossible),
    ChargeAsFastAsPossible(ChargeAsFastAsPossible),
    ChargeAsFastAsPossibleToDesiredCapacity(ChargeAsFastAsPossibleToDesiredCapacity),
}

impl DispatchStrategy for Strategy {
    fn name(&self) -> &'static str {
        match self {
            Strategy::RoundRobin(s) => s.name(),
            Strategy::ChargeAsLateAsPossible(s) => s.name(),
            Strategy::ChargeAsFastAsPossible(s) => s.name(),
            Strategy::ChargeAsFastAsPossibleToDesiredCapacity(s) => s.name(),
        }
    }

    fn get_action(&mut self, observation: &Observation<'_>) -> Vec<f64> {
        match self {
            Strategy::RoundRobin(s) => s.get_action(observation),
            Strategy::ChargeAsLateAsPossible(s) => s.get_action(observation),
            Strategy::ChargeAsFastAsPossible(s) => s.get_action(observation),
            Strategy::ChargeAsFastAsPossibleToDesiredCapacity(s) => s.get_action(observation),
        }
    }
}
