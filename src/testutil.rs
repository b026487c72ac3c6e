//! A small floating-point comparison helper shared by unit tests and the
//! `tests/` integration suite. Kept in-crate (rather than pulling in
//! `approx`) since the handful of call sites only ever need scalar and
//! `DVector` closeness checks.

use nalgebra::DVector;

/// `true` iff `|a - b| <= tol`.
pub fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() <= tol
}

/// `true` iff every component of `a` and `b` is within `tol`.
pub fn vec_approx_eq(a: &DVector<f64>, b: &DVector<f64>, tol: f64) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(&x, &y)| approx_eq(x, y, tol))
}
