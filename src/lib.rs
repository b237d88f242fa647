//! Discrete-time simulator for EV fleet charging behind shared transformers.
//!
//! Episodes are drawn from a [`config::ScenarioConfig`], stepped by
//! [`sim::engine::Engine`] under a [`heuristics::DispatchStrategy`], scored by
//! [`sim::kpi::KpiReport`] and benchmarked against the reference MIQP in
//! [`model`].

pub mod config;
/// Vehicles, charging stations, transformers and load profiles.
pub mod devices;
pub mod error;
pub mod heuristics;
pub mod io;
pub mod model;
/// Step loop, episodes, replays and statistics.
pub mod sim;
