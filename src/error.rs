//! Error types shared by configuration, simulation and the reference model.

use std::io;

use thiserror::Error;

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"simulation.simulation_length"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Failure reported by an external MIQP solver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolverError {
    #[error("solver proved the reference model infeasible")]
    Infeasible,
    #[error("solver stopped without proving optimality (status: {0})")]
    Suboptimal(String),
    #[error("solution has {actual} values but the model has {expected} variables")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("solver backend failed: {0}")]
    Backend(String),
}

/// Top-level error for episode construction and replay handling.
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid configuration: {}", join_errors(.0))]
    InvalidConfig(Vec<ConfigError>),
    #[error("malformed trajectory: {0}")]
    Trajectory(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Solver(#[from] SolverError),
}

fn join_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
