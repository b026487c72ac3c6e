//! Geometric programming: a log-sum-exp reduction to [`crate::cp::solve_cp`],
//! grounded on `gp()` in the reference Python solver.
//!
//! `minimize log sum exp(F0*x + g0) subject to log sum exp(Fi*x+gi) <= 0
//! (i=1..m), G x <= h, A x = b`, with each monomial-sum block `i` occupying
//! rows `cs[i]..cs[i]+K[i]` of `(F, g)`.

use nalgebra::{DMatrix, DVector};

use crate::cone::Cone;
use crate::cp::{solve_cp, NonlinearProgram};
use crate::error::{Result, SolverError};
use crate::kkt::KktKind;
use crate::options::SolverOptions;
use crate::result::SolverResult;

/// A geometric program in posynomial form: block `i` of `(F, g)` is the
/// set of monomials summed by the `i`-th log-sum-exp term, `K[i]` of them.
struct LogSumExp {
    k: Vec<usize>,
    f: DMatrix<f64>,
    g: DVector<f64>,
    starts: Vec<usize>,
}

impl LogSumExp {
    fn new(k: Vec<usize>, f: DMatrix<f64>, g: DVector<f64>) -> Result<Self> {
        if k.iter().any(|&ki| ki == 0) {
            return Err(SolverError::ArgumentError("every monomial-sum block must have at least one term".into()));
        }
        let l: usize = k.iter().sum();
        if f.nrows() != l {
            return Err(SolverError::DimensionMismatch { what: "F rows", expected: l, got: f.nrows() });
        }
        if g.len() != l {
            return Err(SolverError::DimensionMismatch { what: "g", expected: l, got: g.len() });
        }
        let mut starts = Vec::with_capacity(k.len());
        let mut acc = 0;
        for &ki in &k {
            starts.push(acc);
            acc += ki;
        }
        Ok(LogSumExp { k, f, g, starts })
    }
}

impl NonlinearProgram for LogSumExp {
    fn initial(&self) -> Result<(usize, DVector<f64>)> {
        Ok((self.k.len() - 1, DVector::zeros(self.f.ncols())))
    }

    fn eval(&self, x: &DVector<f64>) -> Option<(DVector<f64>, DMatrix<f64>)> {
        let mnl1 = self.k.len();
        let n = x.len();
        let y_full = &self.f * x + &self.g;
        let mut f = DVector::zeros(mnl1);
        let mut df = DMatrix::zeros(mnl1, n);

        for (i, &start) in self.starts.iter().enumerate() {
            let ki = self.k[i];
            let block = y_full.rows(start, ki);
            let ymax = block.max();
            let shifted = block.map(|v| (v - ymax).exp());
            let ysum: f64 = shifted.sum();
            f[i] = ymax + ysum.ln();
            let weights = shifted / ysum;
            let gradf = self.f.view((start, 0), (ki, n)).transpose() * &weights;
            df.row_mut(i).copy_from(&gradf.transpose());
        }
        Some((f, df))
    }

    fn eval_with_hessian(&self, x: &DVector<f64>, z: &DVector<f64>) -> Option<(DVector<f64>, DMatrix<f64>, DMatrix<f64>)> {
        let mnl1 = self.k.len();
        let n = x.len();
        let y_full = &self.f * x + &self.g;
        let mut f = DVector::zeros(mnl1);
        let mut df = DMatrix::zeros(mnl1, n);
        let mut h = DMatrix::zeros(n, n);

        for (i, &start) in self.starts.iter().enumerate() {
            let ki = self.k[i];
            let block = y_full.rows(start, ki);
            let ymax = block.max();
            let shifted = block.map(|v| (v - ymax).exp());
            let ysum: f64 = shifted.sum();
            f[i] = ymax + ysum.ln();
            let weights = shifted / ysum;
            let fi = self.f.view((start, 0), (ki, n));
            let gradf = fi.transpose() * &weights;
            df.row_mut(i).copy_from(&gradf.transpose());

            // Hi = Fi' * (diag(w) - w*w') * Fi, accumulated as Fsc'*Fsc
            // with Fsc = diag(sqrt(w)) * (Fi - 1*gradf').
            let mut fsc = fi.clone_owned();
            for r in 0..ki {
                let row = fsc.row(r) - gradf.transpose();
                fsc.row_mut(r).copy_from(&row);
                let scale = weights[r].sqrt();
                let scaled = fsc.row(r) * scale;
                fsc.row_mut(r).copy_from(&scaled);
            }
            h += z[i] * (fsc.transpose() * &fsc);
        }
        Some((f, df, h))
    }
}

/// Solves `minimize log sum exp(F0*x+g0) subject to log sum exp(Fi*x+gi)
/// <= 0, G x <= h, A x = b`.
pub fn solve_gp(
    k: Vec<usize>,
    f: DMatrix<f64>,
    g: DVector<f64>,
    gmat: &DMatrix<f64>,
    h: &DVector<f64>,
    a: &DMatrix<f64>,
    b: &DVector<f64>,
    kkt_kind: Option<KktKind>,
    options: &SolverOptions,
) -> Result<SolverResult> {
    let program = LogSumExp::new(k, f, g)?;
    let cone = Cone::new(gmat.nrows(), vec![], vec![])?;
    solve_cp(&program, gmat, h, &cone, a, b, kkt_kind, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `minimize log(exp(x))` i.e. `minimize x`, subject to `x >= 1`:
    /// optimum at `x = 1`.
    #[test]
    fn solves_a_single_monomial_geometric_program() {
        let k = vec![1];
        let f = DMatrix::from_row_slice(1, 1, &[1.0]);
        let g = DVector::from_vec(vec![0.0]);
        let gmat = DMatrix::from_row_slice(1, 1, &[-1.0]);
        let h = DVector::from_vec(vec![-1.0]);
        let a = DMatrix::zeros(0, 1);
        let b = DVector::zeros(0);
        let options = SolverOptions::default().quiet();

        let result = solve_gp(k, f, g, &gmat, &h, &a, &b, None, &options).unwrap();
        assert!((result.x[0] - 1.0).abs() < 1e-3);
    }
}
