//! Polymorphism over vector representation and over matrix/operator
//! arguments, kept as plain capability records rather than a generic
//! trait hierarchy (see `DESIGN.md`): the driver calls through a
//! `VectorOps` record for `x`/`y` arithmetic and through [`MatOp`] for
//! `G`/`A`, so a caller can plug in a matrix-free operator or override
//! the `x`/`y` arithmetic without the driver special-casing the
//! built-in dense case. [`crate::builder::Cpl::with_operators`] and
//! [`crate::builder::Cpl::with_vector_ops`] are the entry points that
//! reach these from the public API.

use std::rc::Rc;

use nalgebra::DMatrix;
use nalgebra::DVector;

/// `x := alpha*y + x`.
pub type AxpyFn = Rc<dyn Fn(f64, &DVector<f64>, &mut DVector<f64>)>;
/// `x := alpha*x`.
pub type ScalFn = Rc<dyn Fn(f64, &mut DVector<f64>)>;
/// `x'*y`.
pub type DotFn = Rc<dyn Fn(&DVector<f64>, &DVector<f64>) -> f64>;
/// An uninitialized copy with the same length as its argument.
pub type NewCopyFn = Rc<dyn Fn(&DVector<f64>) -> DVector<f64>>;

/// `{newcopy, dot, axpy, scal}` for one of the driver's two caller-owned
/// vector spaces (`x` and `y`). The built-in [`VectorOps::dense`]
/// implementation treats vectors as flat `DVector<f64>`; a caller that
/// wants different arithmetic semantics (e.g. a weighted inner product)
/// supplies its own four closures instead, via
/// [`crate::builder::Cpl::with_vector_ops`], and `solve_cpl` routes
/// every `x`/`y` dot/axpy/scal through them rather than through `+=`/
/// `.dot(...)` directly.
#[derive(Clone)]
pub struct VectorOps {
    pub newcopy: NewCopyFn,
    pub dot: DotFn,
    pub axpy: AxpyFn,
    pub scal: ScalFn,
}

impl VectorOps {
    pub fn dense() -> Self {
        VectorOps {
            newcopy: Rc::new(|v| v.clone()),
            dot: Rc::new(|a, b| a.dot(b)),
            axpy: Rc::new(|alpha, y, x| *x += alpha * y),
            scal: Rc::new(|alpha, x| *x *= alpha),
        }
    }
}

impl std::fmt::Debug for VectorOps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorOps").finish_non_exhaustive()
    }
}

/// Direction of a [`MatOp`] application: `N`ormal or `T`ransposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatTrans {
    N,
    T,
}

/// A matrix, or a linear operator standing in for one, normalized to a
/// single `apply(x, y, alpha, beta, trans)` call shape:
/// `y := alpha*op(A)*x + beta*y`. The built-in KKT factories (`ldl`,
/// `chol`, `chol2`, `qr`) all need a dense matrix to factor, so a
/// problem built with `MatOp::Fn` must be solved with a caller-supplied
/// [`crate::kkt::KktFactory`] (see [`crate::builder::Cpl::with_kkt_factory`]).
#[derive(Clone)]
pub enum MatOp {
    Dense(DMatrix<f64>),
    Fn {
        apply: Rc<dyn Fn(&DVector<f64>, &mut DVector<f64>, f64, f64, MatTrans)>,
        nrows: usize,
        ncols: usize,
    },
}

impl std::fmt::Debug for MatOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatOp::Dense(m) => f.debug_tuple("Dense").field(&(m.nrows(), m.ncols())).finish(),
            MatOp::Fn { nrows, ncols, .. } => f.debug_struct("Fn").field("nrows", nrows).field("ncols", ncols).finish(),
        }
    }
}

impl MatOp {
    pub fn dense(m: DMatrix<f64>) -> Self {
        MatOp::Dense(m)
    }

    pub fn nrows(&self) -> usize {
        match self {
            MatOp::Dense(m) => m.nrows(),
            MatOp::Fn { nrows, .. } => *nrows,
        }
    }

    pub fn ncols(&self) -> usize {
        match self {
            MatOp::Dense(m) => m.ncols(),
            MatOp::Fn { ncols, .. } => *ncols,
        }
    }

    pub fn apply(&self, x: &DVector<f64>, y: &mut DVector<f64>, alpha: f64, beta: f64, trans: MatTrans) {
        match self {
            MatOp::Dense(m) => match trans {
                MatTrans::N => *y = alpha * (m * x) + beta * &*y,
                MatTrans::T => *y = alpha * (m.transpose() * x) + beta * &*y,
            },
            MatOp::Fn { apply, .. } => apply(x, y, alpha, beta, trans),
        }
    }

    pub fn as_dense(&self) -> Option<&DMatrix<f64>> {
        match self {
            MatOp::Dense(m) => Some(m),
            MatOp::Fn { .. } => None,
        }
    }
}

impl From<DMatrix<f64>> for MatOp {
    fn from(m: DMatrix<f64>) -> Self {
        MatOp::Dense(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_vector_ops_match_direct_arithmetic() {
        let ops = VectorOps::dense();
        let x = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let y = DVector::from_vec(vec![4.0, 5.0, 6.0]);
        assert_eq!((ops.dot)(&x, &y), 32.0);

        let mut z = (ops.newcopy)(&x);
        (ops.axpy)(2.0, &y, &mut z);
        assert_eq!(z, DVector::from_vec(vec![9.0, 12.0, 15.0]));

        (ops.scal)(0.5, &mut z);
        assert_eq!(z, DVector::from_vec(vec![4.5, 6.0, 7.5]));
    }

    #[test]
    fn mat_op_dense_matches_explicit_multiply() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let op = MatOp::Dense(m.clone());
        let x = DVector::from_vec(vec![1.0, 1.0]);
        let mut y = DVector::zeros(2);
        op.apply(&x, &mut y, 1.0, 0.0, MatTrans::N);
        assert_eq!(y, m * &x);
    }

    #[test]
    fn mat_op_fn_matches_the_dense_operator_it_wraps() {
        let m = DMatrix::from_row_slice(2, 3, &[1.0, 0.0, -1.0, 2.0, 3.0, 0.5]);
        let dense = MatOp::Dense(m.clone());
        let m_for_closure = m.clone();
        let op = MatOp::Fn {
            apply: Rc::new(move |x, y, alpha, beta, trans| match trans {
                MatTrans::N => *y = alpha * (&m_for_closure * x) + beta * &*y,
                MatTrans::T => *y = alpha * (m_for_closure.transpose() * x) + beta * &*y,
            }),
            nrows: 2,
            ncols: 3,
        };
        assert_eq!(op.nrows(), dense.nrows());
        assert_eq!(op.ncols(), dense.ncols());
        assert!(op.as_dense().is_none());

        let x = DVector::from_vec(vec![1.0, -2.0, 3.0]);
        let mut y_dense = DVector::from_vec(vec![1.0, 1.0]);
        let mut y_op = y_dense.clone();
        dense.apply(&x, &mut y_dense, 2.0, 0.5, MatTrans::N);
        op.apply(&x, &mut y_op, 2.0, 0.5, MatTrans::N);
        assert_eq!(y_dense, y_op);

        let xt = DVector::from_vec(vec![1.0, -1.0]);
        let mut yt_dense = DVector::zeros(3);
        let mut yt_op = DVector::zeros(3);
        dense.apply(&xt, &mut yt_dense, 1.0, 0.0, MatTrans::T);
        op.apply(&xt, &mut yt_op, 1.0, 0.0, MatTrans::T);
        assert_eq!(yt_dense, yt_op);
    }
}
