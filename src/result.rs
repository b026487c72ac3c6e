//! The driver's outcome: status plus the primal/dual point and the
//! scalar diagnostics computed from it.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// Terminal status of an outer iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Optimal,
    Unknown,
}

/// The full solution record returned by `solve_cpl`/`solve_cp`/`solve_gp`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverResult {
    pub status: Status,
    pub x: DVector<f64>,
    pub y: DVector<f64>,
    pub znl: DVector<f64>,
    pub zl: DVector<f64>,
    pub snl: DVector<f64>,
    pub sl: DVector<f64>,
    pub gap: f64,
    pub relative_gap: f64,
    pub primal_objective: f64,
    pub dual_objective: f64,
    pub primal_infeasibility: f64,
    pub dual_infeasibility: f64,
    pub primal_slack: f64,
    pub dual_slack: f64,
    /// Human-readable reason for termination, e.g. "Terminated (singular
    /// KKT matrix)"; empty on an optimal result.
    pub message: String,
}
