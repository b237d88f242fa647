//! Physical components of an episode: vehicles, charging stations and transformers.

/// Charging stations and port-level current aggregation.
pub mod charging_station;
/// Electric vehicle energy state.
pub mod ev;
/// Raw background-load and PV profile generators.
pub mod profiles;
/// Transformer limits, background load, PV and overload detection.
pub mod transformer;
pub mod types;

pub use charging_station::{ChargingStation, StationSpec};
pub use ev::Ev;
pub use transformer::{LimitMode, Transformer, TransformerSeries, TransformerSpec};
