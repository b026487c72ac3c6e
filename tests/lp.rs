//! S1/S2: small linear programs over the nonnegative orthant, with and
//! without equality constraints (scenarios S1-S2).

use nalgebra::{DMatrix, DVector};

use coneopt::{solve_cpl, Cone, MatOp, NoNonlinear, SolverOptions, Status, VectorOps};

/// S1 -- small LP, section 8 fixture: `minimize -4x1-5x2` subject to
/// `2x1+x2 <= 3`, `x1+2x2 <= 3`, `x1,x2 >= 0`. Optimum at `x = (1, 1)`.
#[test]
fn s1_small_lp() {
    let c = DVector::from_vec(vec![-4.0, -5.0]);
    // Columns: [2,1,-1,0], [1,2,0,-1].
    let g = DMatrix::from_column_slice(4, 2, &[2.0, 1.0, -1.0, 0.0, 1.0, 2.0, 0.0, -1.0]);
    let h = DVector::from_vec(vec![3.0, 3.0, 0.0, 0.0]);
    let cone = Cone::new(4, vec![], vec![]).unwrap();
    let a = DMatrix::zeros(0, 2);
    let b = DVector::zeros(0);

    let oracle = NoNonlinear { x0: DVector::from_vec(vec![0.0, 0.0]) };
    let options = SolverOptions::default().quiet();
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
    assert!((result.x[0] - 1.0).abs() < 1e-4, "x1 = {}", result.x[0]);
    assert!((result.x[1] - 1.0).abs() < 1e-4, "x2 = {}", result.x[1]);
}

/// S2 -- simple LP with an equality constraint: `minimize x2` subject to
/// `x1 = 1`, `-x1+x2+x3 = 0`, `x2 <= x3`. Optimum at `x = (1, 0, -1)`.
#[test]
fn s2_lp_with_equality() {
    let c = DVector::from_vec(vec![0.0, 1.0, 0.0]);
    let a = DMatrix::from_row_slice(2, 3, &[1.0, 0.0, 0.0, -1.0, 1.0, 1.0]);
    let b = DVector::from_vec(vec![1.0, 0.0]);
    let g = DMatrix::from_row_slice(1, 3, &[0.0, -1.0, 1.0]);
    let h = DVector::from_vec(vec![0.0]);
    let cone = Cone::new(1, vec![], vec![]).unwrap();

    let oracle = NoNonlinear { x0: DVector::from_vec(vec![1.0, 0.5, 0.5]) };
    let options = SolverOptions::default().quiet();
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
    assert!((result.x[0] - 1.0).abs() < 1e-4, "x1 = {}", result.x[0]);
    assert!((result.x[1] - 0.0).abs() < 1e-4, "x2 = {}", result.x[1]);
    assert!((result.x[2] + 1.0).abs() < 1e-4, "x3 = {}", result.x[2]);
}
