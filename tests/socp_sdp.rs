//! S3: the mixed second-order/PSD cone LP (section 8.1 of the reference
//! solver's own test suite).

use nalgebra::{DMatrix, DVector};

use coneopt::{solve_cpl, Cone, MatOp, SolverOptions, Status, VectorOps};

/// S3 -- the section 8.1 mixed SOC/PSD LP: `minimize -6x1-4x2-5x3`
/// subject to `G x <=_K h` with `dims = {l: 2, q: [4, 4], s: [3]}`.
/// Expect `status = optimal`, objective `~= -38`.
#[test]
fn s3_mixed_soc_psd_lp() {
    let c = DVector::from_vec(vec![-6.0, -4.0, -5.0]);

    #[rustfmt::skip]
    let g_cols: [[f64; 19]; 3] = [
        [16., 7., 24., -8., 8., -1., 0., -1., 0., 0., 7., -5., 1., -5., 1., -7., 1., -7., -4.],
        [-14., 2., 7., -13., -18., 3., 0., 0., -1., 0., 3., 13., -6., 13., 12., -10., -6., -10., -28.],
        [5., 0., -15., 12., -6., 17., 0., 0., 0., -1., 9., 6., -6., 6., -7., -7., -6., -7., -11.],
    ];
    let mut g = DMatrix::zeros(19, 3);
    for (col, vals) in g_cols.iter().enumerate() {
        for (row, &v) in vals.iter().enumerate() {
            g[(row, col)] = v;
        }
    }
    let h = DVector::from_vec(vec![
        -3.0, 5.0, 12.0, -2.0, -14.0, -13.0, 10.0, 0.0, 0.0, 0.0, 68.0, -30.0, -19.0, -30.0, 99.0, 23.0, -19.0, 23.0,
        10.0,
    ]);
    let cone = Cone::new(2, vec![4, 4], vec![3]).unwrap();
    let a = DMatrix::zeros(0, 3);
    let b = DVector::zeros(0);

    let oracle = coneopt::NoNonlinear { x0: DVector::from_vec(vec![0.0, 0.0, 0.0]) };
    let options = SolverOptions::default().quiet().with_maxiters(50);
    let result = solve_cpl(
        &c,
        &oracle,
        &MatOp::Dense(g),
        &h,
        &cone,
        &MatOp::Dense(a),
        &b,
        None,
        None,
        &VectorOps::dense(),
        &VectorOps::dense(),
        &options,
    )
    .unwrap();

    assert_eq!(result.status, Status::Optimal);
    assert!(
        (result.primal_objective - (-38.0)).abs() < 1e-1,
        "objective = {}",
        result.primal_objective
    );
}
