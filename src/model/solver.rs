//! Solver boundary for [`MiqpModel`]s.

use std::fmt;

use tracing::debug;

use super::miqp::{MiqpModel, VarId};
use crate::error::SolverError;

/// Outcome reported by a solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Optimal,
    /// A feasible assignment without a proof of optimality.
    Suboptimal,
    Infeasible,
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Optimal => "optimal",
            Self::Suboptimal => "suboptimal",
            Self::Infeasible => "infeasible",
        })
    }
}

/// Assignment returned by a solver, indexed by [`VarId`].
#[derive(Debug, Clone, PartialEq)]
pub struct MiqpSolution {
    pub status: SolveStatus,
    pub values: Vec<f64>,
    pub objective: f64,
}

impl MiqpSolution {
    pub fn value(&self, var: VarId) -> f64 {
        self.values.get(var.index()).copied().unwrap_or(0.0)
    }

    /// Accepts only proven optima.
    ///
    /// # Errors
    ///
    /// `SolverError::Infeasible` or `SolverError::Suboptimal` for any other status.
    pub fn require_optimal(self) -> Result<Self, SolverError> {
        match self.status {
            SolveStatus::Optimal => Ok(self),
            SolveStatus::Suboptimal => Err(SolverError::Suboptimal(format!(
                "objective {:.6}",
                self.objective
            ))),
            SolveStatus::Infeasible => Err(SolverError::Infeasible),
        }
    }
}

/// A backend able to solve mixed-integer quadratic programs.
pub trait MiqpSolver {
    fn name(&self) -> &'static str;

    /// Solves `model`.
    ///
    /// # Errors
    ///
    /// Returns `SolverError::Backend` when the backend itself fails.
    fn solve(&mut self, model: &MiqpModel) -> Result<MiqpSolution, SolverError>;
}

/// Checks a fixed candidate assignment instead of searching.
///
/// A feasible candidate is reported as [`SolveStatus::Suboptimal`] with its
/// objective, an infeasible one as [`SolveStatus::Infeasible`]. Used to
/// validate simulated schedules against the reference model and as a warm
/// start for external solvers.
#[derive(Debug, Clone)]
pub struct CandidateSolver {
    values: Vec<f64>,
    tolerance: f64,
}

impl CandidateSolver {
    pub fn new(values: Vec<f64>, tolerance: f64) -> Self {
        Self { values, tolerance }
    }
}

impl MiqpSolver for CandidateSolver {
    fn name(&self) -> &'static str {
        "candidate"
    }

    fn solve(&mut self, model: &MiqpModel) -> Result<MiqpSolution, SolverError> {
        if self.values.len() != model.num_variables() {
            return Err(SolverError::DimensionMismatch {
                expected: model.num_variables(),
                actual: self.values.len(),
            });
        }
        let violations = model.violations(&self.values, self.tolerance);
        for v in violations.iter().take(10) {
            debug!(name = %v.name, amount = v.amount, "candidate violates");
        }
        let status = if violations.is_empty() {
            SolveStatus::Suboptimal
        } else {
            SolveStatus::Infeasible
        };
        Ok(MiqpSolution {
            status,
            objective: model.objective_value(&self.values),
            values: self.values.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::miqp::{LinearExpr, Sense};

    fn model() -> MiqpModel {
        let mut m = MiqpModel::new("t");
        let x = m.add_continuous("x", 0.0, 4.0);
        m.add_constraint("floor", LinearExpr::new().term(x, 1.0), Sense::Ge, 1.0);
        m.add_squared_objective(LinearExpr::new().term(x, 1.0));
        m
    }

    #[test]
    fn feasible_candidate_is_suboptimal() {
        let solution = CandidateSolver::new(vec![2.0], 1e-9).solve(&model()).unwrap();
        assert_eq!(solution.status, SolveStatus::Suboptimal);
        assert_eq!(solution.objective, 4.0);
        assert!(matches!(
            solution.require_optimal(),
            Err(SolverError::Suboptimal(_))
        ));
    }

    #[test]
    fn infeasible_candidate() {
        let solution = CandidateSolver::new(vec![0.5], 1e-9).solve(&model()).unwrap();
        assert_eq!(solution.status, SolveStatus::Infeasible);
        assert_eq!(solution.require_optimal(), Err(SolverError::Infeasible));
    }

    #[test]
    fn wrong_length_is_rejected() {
        let err = CandidateSolver::new(vec![1.0, 2.0], 1e-9).solve(&model());
        assert_eq!(
            err,
            Err(SolverError::DimensionMismatch {
                expected: 1,
                actual: 2
            })
        );
    }

    #[test]
    fn optimal_passes_through() {
        let solution = MiqpSolution {
            status: SolveStatus::Optimal,
            values: vec![1.0],
            objective: 1.0,
        };
        assert_eq!(solution.value(VarId::from_index(0)), 1.0);
        assert!(solution.require_optimal().is_ok());
    }
}
