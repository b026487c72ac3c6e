//! A primal-dual interior-point solver for convex optimization over a
//! Cartesian product of cones: the nonnegative orthant, second-order
//! (Lorentz) cones, and positive semidefinite cones.
//!
//! Three entry points, each built on the one before it:
//!
//! - [`cpl::solve_cpl`] -- linear objective `c'x`, nonlinear constraint
//!   block `f(x) <= 0` plus `G x <=_K h`, `A x = b`.
//! - [`cp::solve_cp`] -- nonlinear objective, reduced to `solve_cpl` via
//!   the epigraph trick.
//! - [`gp::solve_gp`] -- geometric programs (log-sum-exp posynomials),
//!   reduced to `solve_cp`.
//!
//! [`oracle::Oracle`] and [`cp::NonlinearProgram`] are the two
//! constraint/objective callback contracts a caller implements; the
//! built-in dense-matrix [`kkt`] factories (`ldl`, `chol`, `chol2`,
//! `qr`) cover the common case, and [`builder::Cpl::with_kkt_factory`]
//! takes a caller's own [`kkt::KktFactory`] instead, e.g. to factor a
//! structured or matrix-free `G`/`A` supplied as a [`vecops::MatOp`].
//! [`builder::Cpl::with_vector_ops`] likewise lets a caller override the
//! `x`/`y` arithmetic `solve_cpl` runs through a [`vecops::VectorOps`]
//! pair.

pub mod builder;
pub mod cone;
pub mod cp;
pub mod cpl;
pub mod error;
pub mod gp;
pub mod kkt;
pub mod oracle;
pub mod options;
pub mod result;
pub mod scaling;
#[doc(hidden)]
pub mod testutil;
pub mod vecops;
pub mod vector;

pub use builder::{Cp, Cpl, Gp};
pub use cone::Cone;
pub use cp::{solve_cp, NonlinearProgram};
pub use cpl::solve_cpl;
pub use error::{Result, SolverError};
pub use gp::solve_gp;
pub use kkt::{Chol2Factory, CholFactory, KktFactory, KktKind, KktSolve, LdlFactory, QrFactory};
pub use oracle::{NoNonlinear, Oracle};
pub use options::SolverOptions;
pub use result::{SolverResult, Status};
pub use vecops::{MatOp, MatTrans, VectorOps};
