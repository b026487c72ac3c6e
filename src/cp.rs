//! `CP`: a convex (possibly nonlinear) objective reduced to [`crate::cpl::solve_cpl`]
//! via the epigraph trick, grounded on the `F_e` closure built inside
//! `cp()` in the reference Python solver.
//!
//! `minimize f0(x) subject to fk(x) <= 0, G x <=_K h, A x = b` becomes
//! `minimize t subject to f0(x) - t <= 0, fk(x) <= 0, G x <=_K h, A x = b`
//! over the extended variable `(x, t)`. Rather than let the generic
//! driver factor the widened `(n+1) x (n+1)` KKT system directly,
//! [`EpigraphKktFactory`] eliminates the epigraph row/column by hand and
//! delegates the remaining `n x n` block to an ordinary (non-epigraph)
//! factory -- the reference solver's `cp()` performs the same
//! elimination (its `xcol`/`Fe` bookkeeping) rather than ever forming the
//! widened system explicitly.

use nalgebra::{DMatrix, DVector};

use crate::cone::Cone;
use crate::error::{Result, SolverError};
use crate::kkt::{make_factory, KktFactory, KktKind, KktSolve};
use crate::options::SolverOptions;
use crate::result::SolverResult;
use crate::scaling::Scaling;
use crate::vecops::{MatOp, VectorOps};

/// `f0(x) <= 0`-style nonlinear program: index `0` of every returned
/// vector/Jacobian row is the objective `f0`, indices `1..=mnl` are the
/// constraints `f1, ..., fmnl`. Mirrors cvxopt's `F` as used by `cp()`
/// (as opposed to [`crate::oracle::Oracle`], which is `cpl()`'s `F` and
/// carries no objective row).
pub trait NonlinearProgram {
    fn initial(&self) -> Result<(usize, DVector<f64>)>;
    /// `f` has `mnl + 1` rows, `Df` is `(mnl + 1) x n`.
    fn eval(&self, x: &DVector<f64>) -> Option<(DVector<f64>, DMatrix<f64>)>;
    /// `z` has `mnl + 1` rows; `H` is the Hessian of `sum_k z[k] * f[k]`.
    fn eval_with_hessian(&self, x: &DVector<f64>, z: &DVector<f64>) -> Option<(DVector<f64>, DMatrix<f64>, DMatrix<f64>)>;
}

struct EpigraphOracle<'a> {
    inner: &'a dyn NonlinearProgram,
    n: usize,
}

impl<'a> crate::oracle::Oracle for EpigraphOracle<'a> {
    fn initial(&self) -> Result<(usize, DVector<f64>)> {
        let (mnl, x0) = self.inner.initial()?;
        let mut xe = DVector::zeros(self.n + 1);
        xe.rows_mut(0, self.n).copy_from(&x0);
        Ok((mnl + 1, xe))
    }

    fn eval(&self, xe: &DVector<f64>) -> Option<(DVector<f64>, DMatrix<f64>)> {
        let x = xe.rows(0, self.n).clone_owned();
        let t = xe[self.n];
        let (f, df) = self.inner.eval(&x)?;
        let mnl1 = f.len();
        let mut fe = f;
        fe[0] -= t;
        let mut dfe = DMatrix::zeros(mnl1, self.n + 1);
        dfe.view_mut((0, 0), (mnl1, self.n)).copy_from(&df);
        dfe[(0, self.n)] = -1.0;
        Some((fe, dfe))
    }

    fn eval_with_hessian(&self, xe: &DVector<f64>, z: &DVector<f64>) -> Option<(DVector<f64>, DMatrix<f64>, DMatrix<f64>)> {
        let x = xe.rows(0, self.n).clone_owned();
        let t = xe[self.n];
        let (f, df, h) = self.inner.eval_with_hessian(&x, z)?;
        let mnl1 = f.len();
        let mut fe = f;
        fe[0] -= t;
        let mut dfe = DMatrix::zeros(mnl1, self.n + 1);
        dfe.view_mut((0, 0), (mnl1, self.n)).copy_from(&df);
        dfe[(0, self.n)] = -1.0;
        let mut he = DMatrix::zeros(self.n + 1, self.n + 1);
        he.view_mut((0, 0), (self.n, self.n)).copy_from(&h);
        Some((fe, dfe, he))
    }
}

fn widen_with_zero_column(m: &DMatrix<f64>) -> DMatrix<f64> {
    let mut out = DMatrix::zeros(m.nrows(), m.ncols() + 1);
    out.view_mut((0, 0), (m.nrows(), m.ncols())).copy_from(m);
    out
}

/// Builds an [`EpigraphKktFactored`] by factoring the inner (non-widened)
/// `n x n` system with an ordinary built-in factory, given the embedded
/// Hessian/Jacobian [`EpigraphOracle`] hands the driver (top-left `n x n`
/// block of `H`, row `0` / rows `1..` split of `Df`).
struct EpigraphKktFactory {
    n: usize,
    mnl_inner: usize,
    cone: Cone,
    kind: KktKind,
    g_inner: DMatrix<f64>,
    a_inner: DMatrix<f64>,
}

impl KktFactory for EpigraphKktFactory {
    fn factor(&self, w: &Scaling, h: Option<&DMatrix<f64>>, df: Option<&DMatrix<f64>>) -> Result<Box<dyn KktSolve>> {
        let n = self.n;
        let he = h.expect("the epigraph oracle always supplies an embedded Hessian");
        let dfe = df.expect("the epigraph oracle always supplies an embedded Jacobian");

        let h_inner = he.view((0, 0), (n, n)).clone_owned();
        let df_inner = if self.mnl_inner > 0 {
            dfe.view((1, 0), (self.mnl_inner, n)).clone_owned()
        } else {
            DMatrix::zeros(0, n)
        };
        let grad_f0 = DVector::from_iterator(n, (0..n).map(|j| dfe[(0, j)]));

        let w_inner = Scaling {
            mnl: self.mnl_inner,
            dnl: w.dnl.rows(1, self.mnl_inner).clone_owned(),
            dnli: w.dnli.rows(1, self.mnl_inner).clone_owned(),
            d: w.d.clone(),
            di: w.di.clone(),
            v: w.v.clone(),
            beta: w.beta.clone(),
            r: w.r.clone(),
            rti: w.rti.clone(),
        };

        let inner_factory = make_factory(self.kind, self.g_inner.clone(), self.a_inner.clone(), self.cone.clone(), self.mnl_inner);
        let inner = inner_factory.factor(&w_inner, Some(&h_inner), Some(&df_inner))?;

        Ok(Box::new(EpigraphKktFactored { n, grad_f0, dnl0_sq: w.dnl[0] * w.dnl[0], inner }))
    }
}

/// The rank-one elimination: the widened system
///
/// ```text
/// [ H    g0   A'  GG'e'  ] [ ux ]   [ bx0 ]
/// [ g0'  d0    0    -e0' ] [ ut ] = [ bx1 ]
/// [ A    0     0     0   ] [ uy ]   [ by  ]
/// [ GGe  -e0   0    -I   ] [ uz ]   [ bz  ]
/// ```
///
/// (`g0 = grad f0`, `d0 = dnl[0]^2`, `e0`/row 0 the epigraph slack) is
/// solved by eliminating `ut` via the second block row, leaving an
/// ordinary `n`-dimensional KKT solve for `(ux, uy, uz[1:])` plus one
/// scalar back-substitution.
struct EpigraphKktFactored {
    n: usize,
    grad_f0: DVector<f64>,
    dnl0_sq: f64,
    inner: Box<dyn KktSolve>,
}

impl KktSolve for EpigraphKktFactored {
    fn solve(&self, bx: &mut DVector<f64>, by: &mut DVector<f64>, bz: &mut DVector<f64>) -> Result<()> {
        let n = self.n;
        let bx0 = bx.rows(0, n).clone_owned();
        let bx1 = bx[n];
        let zlen = bz.len();

        let mut rhs_x = bx0 + bx1 * &self.grad_f0;
        let mut rhs_z = bz.rows(1, zlen - 1).clone_owned();
        self.inner.solve(&mut rhs_x, by, &mut rhs_z)?;

        let ux1 = self.grad_f0.dot(&rhs_x) + self.dnl0_sq * bx1 - bz[0];

        let mut ux_full = DVector::zeros(n + 1);
        ux_full.rows_mut(0, n).copy_from(&rhs_x);
        ux_full[n] = ux1;

        let mut uz_full = DVector::zeros(zlen);
        uz_full[0] = -bx1;
        uz_full.rows_mut(1, zlen - 1).copy_from(&rhs_z);

        *bx = ux_full;
        *bz = uz_full;
        Ok(())
    }
}

/// Solves `minimize f0(x) subject to fk(x) <= 0 (k=1..mnl), G x <=_K h, A x = b`.
///
/// The returned [`SolverResult::znl`] drops the epigraph constraint's
/// own dual variable (row 0, internal to the reduction) and reports only
/// the duals of the caller's `mnl` original nonlinear constraints.
pub fn solve_cp(
    program: &dyn NonlinearProgram,
    g: &DMatrix<f64>,
    h: &DVector<f64>,
    cone: &Cone,
    a: &DMatrix<f64>,
    b: &DVector<f64>,
    kkt_kind: Option<KktKind>,
    options: &SolverOptions,
) -> Result<SolverResult> {
    let (mnl_inner, x0) = program.initial()?;
    let n = x0.len();
    if g.ncols() != n {
        return Err(SolverError::DimensionMismatch { what: "G columns", expected: n, got: g.ncols() });
    }

    let oracle = EpigraphOracle { inner: program, n };
    let mut ce = DVector::zeros(n + 1);
    ce[n] = 1.0;
    let ge = widen_with_zero_column(g);
    let ae = widen_with_zero_column(a);

    let kind = kkt_kind.unwrap_or_else(|| KktKind::default_for(cone));
    let factory = EpigraphKktFactory {
        n,
        mnl_inner,
        cone: cone.clone(),
        kind,
        g_inner: g.clone(),
        a_inner: a.clone(),
    };
    let x_ops = VectorOps::dense();
    let y_ops = VectorOps::dense();

    let mut result = crate::cpl::solve_cpl(
        &ce,
        &oracle,
        &MatOp::Dense(ge),
        h,
        cone,
        &MatOp::Dense(ae),
        b,
        None,
        Some(&factory),
        &x_ops,
        &y_ops,
        options,
    )?;
    result.x = result.x.rows(0, n).clone_owned();
    if result.znl.len() > 0 {
        result.znl = result.znl.rows(1, result.znl.len() - 1).clone_owned();
    }
    if result.snl.len() > 0 {
        result.snl = result.snl.rows(1, result.snl.len() - 1).clone_owned();
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `minimize x^2` subject to `x >= 1` (written `-x <= -1`):
    /// optimum at `x = 1`, objective `1`.
    struct SquareObjective;

    impl NonlinearProgram for SquareObjective {
        fn initial(&self) -> Result<(usize, DVector<f64>)> {
            Ok((0, DVector::from_vec(vec![2.0])))
        }

        fn eval(&self, x: &DVector<f64>) -> Option<(DVector<f64>, DMatrix<f64>)> {
            let xv = x[0];
            let f = DVector::from_vec(vec![xv * xv]);
            let df = DMatrix::from_row_slice(1, 1, &[2.0 * xv]);
            Some((f, df))
        }

        fn eval_with_hessian(&self, x: &DVector<f64>, z: &DVector<f64>) -> Option<(DVector<f64>, DMatrix<f64>, DMatrix<f64>)> {
            let (f, df) = self.eval(x)?;
            let h = DMatrix::from_row_slice(1, 1, &[2.0 * z[0]]);
            Some((f, df, h))
        }
    }

    #[test]
    fn solves_a_scalar_quadratic_epigraph_problem() {
        let program = SquareObjective;
        let g = DMatrix::from_row_slice(1, 1, &[-1.0]);
        let h = DVector::from_vec(vec![-1.0]);
        let cone = Cone::new(1, vec![], vec![]).unwrap();
        let a = DMatrix::zeros(0, 1);
        let b = DVector::zeros(0);
        let options = SolverOptions::default().quiet();

        let result = solve_cp(&program, &g, &h, &cone, &a, &b, None, &options).unwrap();
        assert!((result.x[0] - 1.0).abs() < 1e-3);
        assert!((result.primal_objective - 1.0).abs() < 1e-2);
    }

    /// A mildly harder epigraph case with one extra linear inequality,
    /// exercising the rank-one elimination with `mnl_inner > 0`:
    /// `minimize x^2` subject to `x >= 1`, `x <= 10`.
    struct SquareWithUpperBound;

    impl NonlinearProgram for SquareWithUpperBound {
        fn initial(&self) -> Result<(usize, DVector<f64>)> {
            Ok((1, DVector::from_vec(vec![2.0])))
        }

        fn eval(&self, x: &DVector<f64>) -> Option<(DVector<f64>, DMatrix<f64>)> {
            let xv = x[0];
            let f = DVector::from_vec(vec![xv * xv, xv - 10.0]);
            let df = DMatrix::from_row_slice(2, 1, &[2.0 * xv, 1.0]);
            Some((f, df))
        }

        fn eval_with_hessian(&self, x: &DVector<f64>, z: &DVector<f64>) -> Option<(DVector<f64>, DMatrix<f64>, DMatrix<f64>)> {
            let (f, df) = self.eval(x)?;
            let h = DMatrix::from_row_slice(1, 1, &[2.0 * z[0]]);
            Some((f, df, h))
        }
    }

    #[test]
    fn solves_an_epigraph_problem_with_an_extra_nonlinear_constraint() {
        let program = SquareWithUpperBound;
        let g = DMatrix::from_row_slice(1, 1, &[-1.0]);
        let h = DVector::from_vec(vec![-1.0]);
        let cone = Cone::new(1, vec![], vec![]).unwrap();
        let a = DMatrix::zeros(0, 1);
        let b = DVector::zeros(0);
        let options = SolverOptions::default().quiet();

        let result = solve_cp(&program, &g, &h, &cone, &a, &b, None, &options).unwrap();
        assert!((result.x[0] - 1.0).abs() < 1e-3);
        assert_eq!(result.znl.len(), 1);
    }
}
