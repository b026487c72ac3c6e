//! Problem-building entry points: `Cpl`, `Cp`, `Gp`. Each collects a
//! problem's data with argument-shape validation happening eagerly in
//! `new`, so a malformed problem fails before the driver is ever
//! entered rather than partway through the first iteration.

use nalgebra::{DMatrix, DVector};

use crate::cone::Cone;
use crate::cp::NonlinearProgram;
use crate::error::{Result, SolverError};
use crate::kkt::{KktFactory, KktKind};
use crate::oracle::Oracle;
use crate::options::SolverOptions;
use crate::result::SolverResult;
use crate::vecops::{MatOp, VectorOps};

fn check_shapes(n: usize, g: &MatOp, h: &DVector<f64>, cone: &Cone, a: &MatOp, b: &DVector<f64>) -> Result<()> {
    let cdim = cone.len(0);
    if g.ncols() != n {
        return Err(SolverError::DimensionMismatch { what: "G columns", expected: n, got: g.ncols() });
    }
    if g.nrows() != cdim {
        return Err(SolverError::DimensionMismatch { what: "G rows", expected: cdim, got: g.nrows() });
    }
    if h.len() != cdim {
        return Err(SolverError::DimensionMismatch { what: "h", expected: cdim, got: h.len() });
    }
    if a.ncols() != n {
        return Err(SolverError::DimensionMismatch { what: "A columns", expected: n, got: a.ncols() });
    }
    if b.len() != a.nrows() {
        return Err(SolverError::DimensionMismatch { what: "b", expected: a.nrows(), got: b.len() });
    }
    Ok(())
}

/// `minimize c'x subject to f(x) <= 0, G x <=_K h, A x = b`.
///
/// `G`/`A` default to dense matrices via [`Cpl::new`]; [`Cpl::with_operators`]
/// accepts a [`MatOp`] directly, for a caller whose `G`/`A` is a
/// matrix-free linear operator. A problem built from a non-dense `MatOp`
/// must also be given a custom factory via [`Cpl::with_kkt_factory`],
/// since the built-in factories all need a dense matrix to factor.
pub struct Cpl<'a> {
    c: DVector<f64>,
    oracle: &'a dyn Oracle,
    g: MatOp,
    h: DVector<f64>,
    cone: Cone,
    a: MatOp,
    b: DVector<f64>,
    kkt_kind: Option<KktKind>,
    kkt_factory: Option<Box<dyn KktFactory>>,
    x_ops: VectorOps,
    y_ops: VectorOps,
    options: SolverOptions,
}

impl<'a> Cpl<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        c: DVector<f64>,
        oracle: &'a dyn Oracle,
        g: DMatrix<f64>,
        h: DVector<f64>,
        cone: Cone,
        a: DMatrix<f64>,
        b: DVector<f64>,
    ) -> Result<Self> {
        Self::with_operators(c, oracle, MatOp::Dense(g), h, cone, MatOp::Dense(a), b)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn with_operators(
        c: DVector<f64>,
        oracle: &'a dyn Oracle,
        g: MatOp,
        h: DVector<f64>,
        cone: Cone,
        a: MatOp,
        b: DVector<f64>,
    ) -> Result<Self> {
        check_shapes(c.len(), &g, &h, &cone, &a, &b)?;
        Ok(Cpl {
            c,
            oracle,
            g,
            h,
            cone,
            a,
            b,
            kkt_kind: None,
            kkt_factory: None,
            x_ops: VectorOps::dense(),
            y_ops: VectorOps::dense(),
            options: SolverOptions::default(),
        })
    }

    pub fn with_kkt_kind(mut self, kind: KktKind) -> Self {
        self.kkt_kind = Some(kind);
        self
    }

    /// Supplies a custom KKT factory, bypassing the built-in `ldl`/
    /// `chol`/`chol2`/`qr` dispatch entirely. Required when `G`/`A` was
    /// built with [`Cpl::with_operators`] from a non-dense [`MatOp`].
    pub fn with_kkt_factory(mut self, factory: Box<dyn KktFactory>) -> Self {
        self.kkt_factory = Some(factory);
        self
    }

    /// Overrides the `x`/`y` dot/axpy/scal/newcopy arithmetic the driver
    /// runs against, in place of the default flat-`DVector<f64>` ops.
    pub fn with_vector_ops(mut self, x_ops: VectorOps, y_ops: VectorOps) -> Self {
        self.x_ops = x_ops;
        self.y_ops = y_ops;
        self
    }

    pub fn with_options(mut self, options: SolverOptions) -> Self {
        self.options = options;
        self
    }

    pub fn solve(&self) -> Result<SolverResult> {
        if self.kkt_factory.is_none() && (self.g.as_dense().is_none() || self.a.as_dense().is_none()) {
            return Err(SolverError::ArgumentError(
                "G and A must be dense matrices unless a custom KKT factory is supplied via with_kkt_factory".into(),
            ));
        }
        crate::cpl::solve_cpl(
            &self.c,
            self.oracle,
            &self.g,
            &self.h,
            &self.cone,
            &self.a,
            &self.b,
            self.kkt_kind,
            self.kkt_factory.as_deref(),
            &self.x_ops,
            &self.y_ops,
            &self.options,
        )
    }
}

/// `minimize f0(x) subject to fk(x) <= 0 (k=1..mnl), G x <=_K h, A x = b`.
pub struct Cp<'a> {
    program: &'a dyn NonlinearProgram,
    g: DMatrix<f64>,
    h: DVector<f64>,
    cone: Cone,
    a: DMatrix<f64>,
    b: DVector<f64>,
    kkt_kind: Option<KktKind>,
    options: SolverOptions,
}

impl<'a> Cp<'a> {
    pub fn new(program: &'a dyn NonlinearProgram, g: DMatrix<f64>, h: DVector<f64>, cone: Cone, a: DMatrix<f64>, b: DVector<f64>) -> Result<Self> {
        check_shapes(g.ncols(), &MatOp::Dense(g.clone()), &h, &cone, &MatOp::Dense(a.clone()), &b)?;
        Ok(Cp { program, g, h, cone, a, b, kkt_kind: None, options: SolverOptions::default() })
    }

    pub fn with_kkt_kind(mut self, kind: KktKind) -> Self {
        self.kkt_kind = Some(kind);
        self
    }

    pub fn with_options(mut self, options: SolverOptions) -> Self {
        self.options = options;
        self
    }

    pub fn solve(&self) -> Result<SolverResult> {
        crate::cp::solve_cp(self.program, &self.g, &self.h, &self.cone, &self.a, &self.b, self.kkt_kind, &self.options)
    }
}

/// `minimize log sum exp(F0*x+g0) subject to log sum exp(Fi*x+gi) <= 0,
/// G x <= h, A x = b`.
pub struct Gp {
    k: Vec<usize>,
    f: DMatrix<f64>,
    g: DVector<f64>,
    gmat: DMatrix<f64>,
    h: DVector<f64>,
    a: DMatrix<f64>,
    b: DVector<f64>,
    kkt_kind: Option<KktKind>,
    options: SolverOptions,
}

impl Gp {
    #[allow(clippy::too_many_arguments)]
    pub fn new(k: Vec<usize>, f: DMatrix<f64>, g: DVector<f64>, gmat: DMatrix<f64>, h: DVector<f64>, a: DMatrix<f64>, b: DVector<f64>) -> Result<Self> {
        let cone = Cone::new(gmat.nrows(), vec![], vec![])?;
        check_shapes(f.ncols(), &MatOp::Dense(gmat.clone()), &h, &cone, &MatOp::Dense(a.clone()), &b)?;
        Ok(Gp { k, f, g, gmat, h, a, b, kkt_kind: None, options: SolverOptions::default() })
    }

    pub fn with_kkt_kind(mut self, kind: KktKind) -> Self {
        self.kkt_kind = Some(kind);
        self
    }

    pub fn with_options(mut self, options: SolverOptions) -> Self {
        self.options = options;
        self
    }

    pub fn solve(&self) -> Result<SolverResult> {
        crate::gp::solve_gp(self.k.clone(), self.f.clone(), self.g.clone(), &self.gmat, &self.h, &self.a, &self.b, self.kkt_kind, &self.options)
    }
}
