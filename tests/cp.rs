//! S4: analytic centering with cone constraints (section 9.1 of the
//! reference solver's own test suite) -- a nonlinear objective reduced
//! through [`coneopt::solve_cp`]'s epigraph wrapper.

use nalgebra::{DMatrix, DVector};

use coneopt::{solve_cp, Cone, NonlinearProgram, SolverOptions, Status};

/// `minimize -sum(log(1 - x_i^2))` over `|x| < 1`, subject to
/// `G x <=_K h` with `dims = {l: 0, q: [4], s: [3]}`.
struct AnalyticCentering;

impl NonlinearProgram for AnalyticCentering {
    fn initial(&self) -> coneopt::Result<(usize, DVector<f64>)> {
        Ok((0, DVector::zeros(3)))
    }

    fn eval(&self, x: &DVector<f64>) -> Option<(DVector<f64>, DMatrix<f64>)> {
        if x.iter().any(|&xi| xi.abs() >= 1.0) {
            return None;
        }
        let u = x.map(|xi| 1.0 - xi * xi);
        let f0 = -u.iter().map(|v| v.ln()).sum::<f64>();
        let df = DMatrix::from_fn(1, 3, |_, j| 2.0 * x[j] / u[j]);
        Some((DVector::from_vec(vec![f0]), df))
    }

    fn eval_with_hessian(&self, x: &DVector<f64>, z: &DVector<f64>) -> Option<(DVector<f64>, DMatrix<f64>, DMatrix<f64>)> {
        let (f, df) = self.eval(x)?;
        let u = x.map(|xi| 1.0 - xi * xi);
        let h = DMatrix::from_fn(3, 3, |i, j| {
            if i == j {
                2.0 * z[0] * (1.0 + u[i] * u[i]) / (u[i] * u[i])
            } else {
                0.0
            }
        });
        Some((f, df, h))
    }
}

#[test]
fn s4_analytic_centering_with_cones() {
    #[rustfmt::skip]
    let g_cols: [[f64; 13]; 3] = [
        [0., -1., 0., 0., -21., -11., 0., -11., 10., 8., 0., 8., 5.],
        [0., 0., -1., 0., 0., 10., 16., 10., -10., -10., 16., -10., 3.],
        [0., 0., 0., -1., -5., 2., -17., 2., -6., 8., -17., -7., 6.],
    ];
    let mut g = DMatrix::zeros(13, 3);
    for (col, vals) in g_cols.iter().enumerate() {
        for (row, &v) in vals.iter().enumerate() {
            g[(row, col)] = v;
        }
    }
    let h = DVector::from_vec(vec![1.0, 0.0, 0.0, 0.0, 20.0, 10.0, 40.0, 10.0, 80.0, 10.0, 40.0, 10.0, 15.0]);
    let cone = Cone::new(0, vec![4], vec![3]).unwrap();
    let a = DMatrix::zeros(0, 3);
    let b = DVector::zeros(0);

    let program = AnalyticCentering;
    let options = SolverOptions::default().quiet().with_maxiters(50);
    let result = solve_cp(&program, &g, &h, &cone, &a, &b, None, &options).unwrap();

    assert_eq!(result.status, Status::Optimal);
    assert!(result.x.iter().all(|&xi| xi.abs() < 1.0), "x = {:?}", result.x);
}
