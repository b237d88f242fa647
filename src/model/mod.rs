//! Reference MIQP model for benchmarking dispatch strategies.

pub mod miqp;
/// Power-tracking formulation built from a captured episode.
pub mod power_tracker;
pub mod solver;

pub use miqp::{LinearExpr, MiqpModel, Sense, VarId, VarKind};
pub use power_tracker::PowerTrackerModel;
pub use solver::{CandidateSolver, MiqpSolution, MiqpSolver, SolveStatus};
