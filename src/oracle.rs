//! The nonlinear-constraint oracle `F`, called at up to three different
//! points in a single outer iteration (residual phase with gradient
//! only, KKT phase with Hessian, line-search probe with gradient only).
//! Implementations must tolerate being called repeatedly with the same
//! `x` -- the driver does not cache oracle results across phases.

use nalgebra::{DMatrix, DVector};

use crate::error::Result;

/// `f(x) <= 0`, the smooth convex nonlinear constraint block shared by
/// CPL and the CP epigraph wrapper.
///
/// `initial` corresponds to cvxopt's `F()`: it reports `mnl` (the
/// number of nonlinear constraints) and a point `x0` in the extended
/// domain of `f` (not necessarily feasible for `G x <= h` or `A x =
/// b`). `eval` corresponds to `F(x)`: returns `None` when `x` is
/// outside the domain of `f` (the line-search domain probe). `eval_with_hessian`
/// corresponds to `F(x, z)` with the dual nonlinear multiplier `z`:
/// used whenever the driver needs the Hessian of `sum_k z_k f_k`, i.e.
/// for the KKT factorization and whenever iterative refinement or
/// debug residual checks are enabled.
pub trait Oracle {
    fn initial(&self) -> Result<(usize, DVector<f64>)>;
    fn eval(&self, x: &DVector<f64>) -> Option<(DVector<f64>, DMatrix<f64>)>;
    fn eval_with_hessian(&self, x: &DVector<f64>, z: &DVector<f64>) -> Option<(DVector<f64>, DMatrix<f64>, DMatrix<f64>)>;
}

/// `mnl == 0`: the CPL driver degenerates to a pure linear/conic program
/// with no smooth nonlinear block.
pub struct NoNonlinear {
    pub x0: DVector<f64>,
}

impl Oracle for NoNonlinear {
    fn initial(&self) -> Result<(usize, DVector<f64>)> {
        Ok((0, self.x0.clone()))
    }

    fn eval(&self, _x: &DVector<f64>) -> Option<(DVector<f64>, DMatrix<f64>)> {
        let n = self.x0.len();
        Some((DVector::zeros(0), DMatrix::zeros(0, n)))
    }

    fn eval_with_hessian(&self, _x: &DVector<f64>, _z: &DVector<f64>) -> Option<(DVector<f64>, DMatrix<f64>, DMatrix<f64>)> {
        let n = self.x0.len();
        Some((DVector::zeros(0), DMatrix::zeros(0, n), DMatrix::zeros(n, n)))
    }
}
