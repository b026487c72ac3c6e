//! Exercises the operator/custom-KKT-factory/vector-ops hooks directly:
//! the same trivial orthant LP as `s1_small_lp`, but with `G` supplied as
//! a matrix-free [`MatOp::Fn`], a caller-built [`LdlFactory`] standing in
//! for the built-in dispatch, and the default dense [`VectorOps`] wired
//! through explicitly rather than implied by `Cpl::new`.

use std::rc::Rc;

use nalgebra::{DMatrix, DVector};

use coneopt::{Cone, Cpl, LdlFactory, MatOp, MatTrans, NoNonlinear, SolverOptions, Status, VectorOps};

#[test]
fn solves_an_lp_through_the_operator_and_custom_factory_path() {
    let c = DVector::from_vec(vec![1.0, 1.0]);
    let g_dense = DMatrix::from_row_slice(2, 2, &[-1.0, 0.0, 0.0, -1.0]);
    let h = DVector::from_vec(vec![-1.0, -1.0]);
    let cone = Cone::new(2, vec![], vec![]).unwrap();
    let a_dense = DMatrix::zeros(0, 2);
    let b = DVector::zeros(0);

    let g_for_op = g_dense.clone();
    let g_op = MatOp::Fn {
        apply: Rc::new(move |x, y, alpha, beta, trans| match trans {
            MatTrans::N => *y = alpha * (&g_for_op * x) + beta * &*y,
            MatTrans::T => *y = alpha * (g_for_op.transpose() * x) + beta * &*y,
        }),
        nrows: 2,
        ncols: 2,
    };

    let factory = LdlFactory { g: g_dense.clone(), a: a_dense.clone(), cone: cone.clone(), mnl: 0 };
    let oracle = NoNonlinear { x0: DVector::from_vec(vec![2.0, 2.0]) };

    let problem = Cpl::with_operators(c, &oracle, g_op, h, cone, MatOp::Dense(a_dense), b)
        .unwrap()
        .with_kkt_factory(Box::new(factory))
        .with_vector_ops(VectorOps::dense(), VectorOps::dense())
        .with_options(SolverOptions::default().quiet());

    let result = problem.solve().unwrap();
    assert_eq!(result.status, Status::Optimal);
    assert!((result.x[0] - 1.0).abs() < 1e-4, "x1 = {}", result.x[0]);
    assert!((result.x[1] - 1.0).abs() < 1e-4, "x2 = {}", result.x[1]);
}

/// An operator-form `G` with no custom factory must be rejected before
/// the driver runs, rather than panicking inside the built-in dense
/// dispatch when it tries to read a matrix that was never supplied.
#[test]
fn operator_form_g_without_a_custom_factory_is_rejected_up_front() {
    let c = DVector::from_vec(vec![1.0, 1.0]);
    let h = DVector::from_vec(vec![-1.0, -1.0]);
    let cone = Cone::new(2, vec![], vec![]).unwrap();
    let a_dense = DMatrix::zeros(0, 2);
    let b = DVector::zeros(0);
    let oracle = NoNonlinear { x0: DVector::from_vec(vec![2.0, 2.0]) };

    let g_op = MatOp::Fn {
        apply: Rc::new(|x, y, alpha, beta, trans| match trans {
            MatTrans::N => *y = alpha * (-1.0 * x) + beta * &*y,
            MatTrans::T => *y = alpha * (-1.0 * x) + beta * &*y,
        }),
        nrows: 2,
        ncols: 2,
    };

    let problem = Cpl::with_operators(c, &oracle, g_op, h, cone, MatOp::Dense(a_dense), b).unwrap();
    assert!(problem.solve().is_err());
}
