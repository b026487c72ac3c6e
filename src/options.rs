//! Solver options: iteration caps, tolerances and diagnostic toggles.

use serde::{Deserialize, Serialize};

/// Tunables for [`crate::cpl::solve_cpl`] and the wrappers built on it.
///
/// `refinement` defaults to `1`, except that when the problem has no
/// second-order or PSD blocks it defaults to `0` -- iterative refinement
/// buys little when the KKT system is already well-conditioned nonlinear/
/// orthant-only. [`SolverOptions::refinement_steps`] resolves that
/// conditional default; leave the field `None` to get it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverOptions {
    pub maxiters: usize,
    pub abstol: f64,
    pub reltol: f64,
    pub feastol: f64,
    pub show_progress: bool,
    pub refinement: Option<usize>,
    pub debug: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            maxiters: 100,
            abstol: 1e-7,
            reltol: 1e-6,
            feastol: 1e-7,
            show_progress: true,
            refinement: None,
            debug: false,
        }
    }
}

impl SolverOptions {
    pub fn with_maxiters(mut self, maxiters: usize) -> Self {
        self.maxiters = maxiters;
        self
    }

    pub fn with_tolerances(mut self, abstol: f64, reltol: f64, feastol: f64) -> Self {
        self.abstol = abstol;
        self.reltol = reltol;
        self.feastol = feastol;
        self
    }

    pub fn with_refinement(mut self, steps: usize) -> Self {
        self.refinement = Some(steps);
        self
    }

    pub fn quiet(mut self) -> Self {
        self.show_progress = false;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// The number of refinement steps to take per KKT solve, resolving
    /// the conditional default (`0` when the cone has no SOC/PSD blocks).
    pub fn refinement_steps(&self, has_soc_or_psd: bool) -> usize {
        self.refinement.unwrap_or(if has_soc_or_psd { 1 } else { 0 })
    }
}
