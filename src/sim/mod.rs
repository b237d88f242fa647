/// Episode step counter.
pub mod clock;
pub mod engine;
/// Episode construction from a scenario or a replay.
pub mod episode;
/// Demand-response event definitions.
pub mod event;
pub mod kpi;
/// Frozen, serializable episode trajectories.
pub mod replay;
/// Day-ahead setpoint and price curves.
pub mod schedule;
pub mod types;
