//! The CPL outer iteration: minimize `c'x` subject to `f(x) <= 0`,
//! `G x <=_K h`, `A x = b`, by Nesterov-Todd primal-dual interior point.
//!
//! Grounded on `cpl()` in the reference Python solver: residual/gap
//! bookkeeping, the affine/corrector (Mehrotra) predictor-corrector
//! direction, and the relaxed line search of Design Note 9 are all
//! direct translations of that function's control flow. `G`/`A` are
//! accepted as [`MatOp`] rather than bare matrices, and all `x`/`y`
//! arithmetic is routed through a caller-suppliable [`VectorOps`] pair,
//! so a caller can escape the built-in dense-vector assumption entirely.

use nalgebra::{DMatrix, DVector};

use crate::cone::Cone;
use crate::error::{Result, SolverError};
use crate::kkt::{make_factory, KktFactory, KktKind, KktSolve};
use crate::oracle::Oracle;
use crate::options::SolverOptions;
use crate::result::{SolverResult, Status};
use crate::scaling::{compute_scaling, scale, scale2, update_scaling, Scaling};
use crate::vecops::{MatOp, MatTrans, VectorOps};
use crate::vector::{max_step, sdot, sinv, sprod, ssqr, symm};

const STEP: f64 = 0.99;
const BETA: f64 = 0.5;
const ALPHA: f64 = 0.01;
const EXPON: i32 = 3;
const MAX_RELAXED_ITERS: i32 = 8;

fn mat_apply(op: &MatOp, x: &DVector<f64>, out_len: usize, trans: MatTrans) -> DVector<f64> {
    let mut out = DVector::zeros(out_len);
    op.apply(x, &mut out, 1.0, 0.0, trans);
    out
}

fn apply_gg(df: &DMatrix<f64>, g: &MatOp, mnl: usize, u: &DVector<f64>) -> DVector<f64> {
    let cdim = g.nrows();
    let mut out = DVector::zeros(mnl + cdim);
    if mnl > 0 {
        out.rows_mut(0, mnl).copy_from(&(df * u));
    }
    out.rows_mut(mnl, cdim).copy_from(&mat_apply(g, u, cdim, MatTrans::N));
    out
}

fn apply_gg_t(df: &DMatrix<f64>, g: &MatOp, mnl: usize, n: usize, v: &DVector<f64>) -> DVector<f64> {
    let cdim = g.nrows();
    let mut out = DVector::zeros(n);
    if mnl > 0 {
        out += df.transpose() * v.rows(0, mnl);
    }
    let vl = v.rows(mnl, cdim).clone_owned();
    out += mat_apply(g, &vl, n, MatTrans::T);
    out
}

/// Solves the scaled 4-block Newton system for `(ux, uy, uz, us)`, where
/// the slack equation has been reduced to `lambda o (uz + us) = bs`. On
/// entry `(x, y, z, s)` hold the right-hand side `(bx, by, bz, bs)`; on
/// exit they hold the solution.
fn f4_no_ir(
    f3: &dyn KktSolve,
    w: &Scaling,
    lambda: &DVector<f64>,
    cone: &Cone,
    mnl: usize,
    x: &mut DVector<f64>,
    y: &mut DVector<f64>,
    z: &mut DVector<f64>,
    s: &mut DVector<f64>,
) -> Result<()> {
    sinv(s, lambda, cone, mnl);
    let mut ws3 = s.clone();
    scale(&mut ws3, w, true, false);
    *z -= &ws3;
    f3.solve(x, y, z)?;
    *s -= &*z;
    Ok(())
}

/// Residual of the unreduced 4x4 Newton system at `(ux, uy, uz, us)`,
/// subtracted into `(vx, vy, vz, vs)` in place (used for iterative
/// refinement and for the optional debug residual check).
#[allow(clippy::too_many_arguments)]
fn newton_residual(
    g: &MatOp,
    a: &MatOp,
    df: &DMatrix<f64>,
    h: Option<&DMatrix<f64>>,
    w: &Scaling,
    lambda: &DVector<f64>,
    cone: &Cone,
    mnl: usize,
    ux: &DVector<f64>,
    uy: &DVector<f64>,
    uz: &DVector<f64>,
    us: &DVector<f64>,
    vx: &mut DVector<f64>,
    vy: &mut DVector<f64>,
    vz: &mut DVector<f64>,
    vs: &mut DVector<f64>,
) {
    if let Some(hm) = h {
        *vx -= hm * ux;
    }
    let n = ux.len();
    *vx -= mat_apply(a, uy, n, MatTrans::T);
    let mut wz3 = uz.clone();
    scale(&mut wz3, w, false, true);
    *vx -= apply_gg_t(df, g, mnl, n, &wz3);

    let p = uy.len();
    *vy -= mat_apply(a, ux, p, MatTrans::N);

    *vz -= apply_gg(df, g, mnl, ux);
    let mut ws3 = us.clone();
    scale(&mut ws3, w, true, false);
    *vz -= &ws3;

    let mut usz = us.clone();
    usz += uz;
    sprod(&mut usz, lambda, cone, mnl, true);
    *vs -= &usz;
}

/// `f4_no_ir` plus `refinement` rounds of iterative refinement, and an
/// optional debug residual report.
#[allow(clippy::too_many_arguments)]
fn f4(
    refinement: usize,
    debug: bool,
    f3: &dyn KktSolve,
    w: &Scaling,
    lambda: &DVector<f64>,
    cone: &Cone,
    mnl: usize,
    g: &MatOp,
    a: &MatOp,
    df: &DMatrix<f64>,
    h: Option<&DMatrix<f64>>,
    x: &mut DVector<f64>,
    y: &mut DVector<f64>,
    z: &mut DVector<f64>,
    s: &mut DVector<f64>,
) -> Result<()> {
    let saved = if refinement > 0 || debug {
        Some((x.clone(), y.clone(), z.clone(), s.clone()))
    } else {
        None
    };

    f4_no_ir(f3, w, lambda, cone, mnl, x, y, z, s)?;

    for _ in 0..refinement {
        let (wx, wy, wz, ws) = saved.as_ref().unwrap();
        let mut rx = wx.clone();
        let mut ry = wy.clone();
        let mut rz = wz.clone();
        let mut rs = ws.clone();
        newton_residual(g, a, df, h, w, lambda, cone, mnl, x, y, z, s, &mut rx, &mut ry, &mut rz, &mut rs);
        f4_no_ir(f3, w, lambda, cone, mnl, &mut rx, &mut ry, &mut rz, &mut rs)?;
        *x += &rx;
        *y += &ry;
        *z += &rz;
        *s += &rs;
    }

    if debug {
        let (wx, wy, wz, ws) = saved.as_ref().unwrap();
        let mut rx = wx.clone();
        let mut ry = wy.clone();
        let mut rz = wz.clone();
        let mut rs = ws.clone();
        newton_residual(g, a, df, h, w, lambda, cone, mnl, x, y, z, s, &mut rx, &mut ry, &mut rz, &mut rs);
        log::debug!(
            "KKT residuals: x={:.3e} y={:.3e} z={:.3e} s={:.3e}",
            rx.norm(),
            ry.norm(),
            rz.norm(),
            rs.norm()
        );
    }
    Ok(())
}

/// Expands a compact "lambda layout" vector (`mnl+l+sum(q)+sum(s)`
/// entries, one eigenvalue per PSD block row) into the full `s`/`z`
/// block layout (PSD blocks stored densely, `m*m` entries each, only
/// the diagonal populated).
fn expand_compact(compact: &DVector<f64>, cone: &Cone, mnl: usize) -> DVector<f64> {
    let nlq = mnl + cone.l + cone.q.iter().sum::<usize>();
    let mut v = DVector::zeros(cone.len(mnl));
    v.rows_mut(0, nlq).copy_from(&compact.rows(0, nlq));
    let mut indv = nlq;
    let mut indl = nlq;
    for &m in &cone.s {
        for i in 0..m {
            v[indv + i * (m + 1)] = compact[indl + i];
        }
        indv += m * m;
        indl += m;
    }
    v
}

fn init_identity_block(v: &mut DVector<f64>, cone: &Cone, mnl: usize) {
    for i in 0..(mnl + cone.l) {
        v[i] = 1.0;
    }
    let mut ind = mnl + cone.l;
    for &m in &cone.q {
        v[ind] = 1.0;
        ind += m;
    }
    for &m in &cone.s {
        for i in 0..m {
            v[ind + i * (m + 1)] = 1.0;
        }
        ind += m * m;
    }
}

#[allow(clippy::too_many_arguments)]
fn finalize(
    status: Status,
    x: DVector<f64>,
    y: DVector<f64>,
    mut s: DVector<f64>,
    mut z: DVector<f64>,
    mnl: usize,
    cone: &Cone,
    gap: f64,
    relgap: Option<f64>,
    pcost: f64,
    dcost: f64,
    pres: f64,
    dres: f64,
    message: &str,
) -> SolverResult {
    symm(&mut s, cone, mnl);
    symm(&mut z, cone, mnl);
    let ts = max_step(&mut s.clone(), cone, mnl, None);
    let tz = max_step(&mut z.clone(), cone, mnl, None);
    let cdim = cone.len(0);
    let snl = s.rows(0, mnl).clone_owned();
    let sl = s.rows(mnl, cdim).clone_owned();
    let znl = z.rows(0, mnl).clone_owned();
    let zl = z.rows(mnl, cdim).clone_owned();
    SolverResult {
        status,
        x,
        y,
        znl,
        zl,
        snl,
        sl,
        gap,
        relative_gap: relgap.unwrap_or(f64::NAN),
        primal_objective: pcost,
        dual_objective: dcost,
        primal_infeasibility: pres,
        dual_infeasibility: dres,
        primal_slack: -ts,
        dual_slack: -tz,
        message: message.to_string(),
    }
}

/// State saved at the start of a relaxed-line-search excursion, so a
/// run of up to `MAX_RELAXED_ITERS` non-monotone steps can be rolled
/// back to its starting point if none of them pays off (Design Note 9,
/// §4.3.1). Also doubles as the checkpoint an arithmetic error in a
/// later KKT factorization rolls back to.
struct SavedState {
    w: Scaling,
    x: DVector<f64>,
    y: DVector<f64>,
    s: DVector<f64>,
    z: DVector<f64>,
    lambda: DVector<f64>,
    dx: DVector<f64>,
    dy: DVector<f64>,
    ds: DVector<f64>,
    dz: DVector<f64>,
    ds2: DVector<f64>,
    dz2: DVector<f64>,
    rx: DVector<f64>,
    ry: DVector<f64>,
    rznl: DVector<f64>,
    rzl: DVector<f64>,
    phi0: f64,
    dphi0: f64,
    gap0: f64,
    step0: f64,
    sigma0: f64,
    eta0: f64,
    dsdz0: f64,
}

/// Solves `minimize c'x subject to f(x) <= 0, G x <=_K h, A x = b`.
///
/// `g`/`a` are [`MatOp`]: a dense matrix, or a caller-supplied linear
/// operator. `kkt_factory`, when supplied, is used in place of the
/// built-in factory selected by `kkt_kind` -- the only way to solve a
/// problem whose `g`/`a` are operator-form rather than dense, since the
/// built-in LDL/CHOL/CHOL2/QR factories all need a dense matrix to
/// factor. `x_ops`/`y_ops` replace the default `DVector<f64>`
/// arithmetic used for every `x`/`y` dot/axpy/scal in the iteration.
#[allow(clippy::too_many_arguments)]
pub fn solve_cpl(
    c: &DVector<f64>,
    oracle: &dyn Oracle,
    g: &MatOp,
    h: &DVector<f64>,
    cone: &Cone,
    a: &MatOp,
    b: &DVector<f64>,
    kkt_kind: Option<KktKind>,
    kkt_factory: Option<&dyn KktFactory>,
    x_ops: &VectorOps,
    y_ops: &VectorOps,
    options: &SolverOptions,
) -> Result<SolverResult> {
    let (mnl, x0) = oracle.initial()?;
    let n = x0.len();
    let p = a.nrows();
    let cdim = cone.len(0);
    let degree = cone.barrier_degree(mnl);

    if c.len() != n {
        return Err(SolverError::DimensionMismatch { what: "c", expected: n, got: c.len() });
    }
    if h.len() != cdim {
        return Err(SolverError::DimensionMismatch { what: "h", expected: cdim, got: h.len() });
    }
    if g.ncols() != n {
        return Err(SolverError::DimensionMismatch { what: "G columns", expected: n, got: g.ncols() });
    }
    if a.ncols() != n {
        return Err(SolverError::DimensionMismatch { what: "A columns", expected: n, got: a.ncols() });
    }
    if b.len() != p {
        return Err(SolverError::DimensionMismatch { what: "b", expected: p, got: b.len() });
    }

    let has_soc_or_psd = !cone.q.is_empty() || !cone.s.is_empty();
    let refinement = options.refinement_steps(has_soc_or_psd);
    let debug = options.debug;

    let owned_factory;
    let factory: &dyn KktFactory = match kkt_factory {
        Some(f) => f,
        None => {
            let kind = kkt_kind.unwrap_or_else(|| KktKind::default_for(cone));
            let g_dense = g
                .as_dense()
                .ok_or_else(|| SolverError::ArgumentError("G must be a dense matrix unless a custom KKT factory is supplied".into()))?
                .clone();
            let a_dense = a
                .as_dense()
                .ok_or_else(|| SolverError::ArgumentError("A must be a dense matrix unless a custom KKT factory is supplied".into()))?
                .clone();
            owned_factory = make_factory(kind, g_dense, a_dense, cone.clone(), mnl);
            owned_factory.as_ref()
        }
    };

    let mut x = x0;
    let mut y = DVector::zeros(p);
    let mut z = DVector::zeros(mnl + cdim);
    let mut s = DVector::zeros(mnl + cdim);
    init_identity_block(&mut z, cone, mnl);
    init_identity_block(&mut s, cone, mnl);

    let mut lambda = DVector::zeros(cone.lambda_len(mnl));
    let mut w = compute_scaling(&s, &z, &mut lambda, cone, mnl);

    let mut theta1 = 1.0;
    let mut theta2 = 1.0;
    let mut theta3 = 1.0;
    let mut resx0 = 1.0;
    let mut resznl0 = 1.0;
    let mut pres0 = 1.0;
    let mut dres0 = 1.0;

    let mut relaxed_iters: i32 = 0;
    let mut saved: Option<SavedState> = None;

    for iters in 0..=options.maxiters {
        let znl_current = z.rows(0, mnl).clone_owned();
        let (f, mut df) = if refinement > 0 || debug {
            let (f, df, _) = oracle
                .eval_with_hessian(&x, &znl_current)
                .ok_or_else(|| SolverError::FeasibilityError("F(x, z) failed at the current iterate".into()))?;
            (f, df)
        } else {
            oracle
                .eval(&x)
                .ok_or_else(|| SolverError::FeasibilityError("F(x) failed at the current iterate".into()))?
        };

        let mut rx = (x_ops.newcopy)(c);
        let aty = mat_apply(a, &y, n, MatTrans::T);
        (x_ops.axpy)(1.0, &aty, &mut rx);
        let ggt = apply_gg_t(&df, g, mnl, n, &z);
        (x_ops.axpy)(1.0, &ggt, &mut rx);
        let resx = (x_ops.dot)(&rx, &rx).sqrt();

        let mut ry = mat_apply(a, &x, p, MatTrans::N);
        (y_ops.axpy)(-1.0, b, &mut ry);
        let resy = (y_ops.dot)(&ry, &ry).sqrt();

        let mut rznl = s.rows(0, mnl).clone_owned();
        rznl += &f;
        let resznl = rznl.norm();

        let mut rzl = s.rows(mnl, cdim).clone_owned();
        rzl -= h;
        rzl += mat_apply(g, &x, cdim, MatTrans::N);
        let reszl = rzl.norm();

        let mut gap = sdot(&s, &z, cone, mnl);

        let pcost = (x_ops.dot)(c, &x);
        let zl_view = z.rows(mnl, cdim).clone_owned();
        let dcost = pcost + (y_ops.dot)(&y, &ry) + z.rows(0, mnl).dot(&rznl) + sdot(&zl_view, &rzl, cone, 0) - gap;
        let relgap = if pcost < 0.0 {
            Some(gap / -pcost)
        } else if dcost > 0.0 {
            Some(gap / dcost)
        } else {
            None
        };

        let mut pres = (resy * resy + resznl * resznl + reszl * reszl).sqrt();
        let mut dres = resx;
        let mut resx = resx;
        let mut resznl = resznl;
        if iters == 0 {
            resx0 = resx.max(1.0);
            resznl0 = resznl.max(1.0);
            pres0 = pres.max(1.0);
            dres0 = dres.max(1.0);
            theta1 = 1.0 / gap;
            theta2 = 1.0 / resx0;
            theta3 = 1.0 / resznl0;
        }
        pres /= pres0;
        dres /= dres0;

        if options.show_progress {
            log::info!(
                "{:3}: pcost={:.6e} dcost={:.6e} gap={:.1e} pres={:.1e} dres={:.1e}",
                iters,
                pcost,
                dcost,
                gap,
                pres,
                dres
            );
        }

        let converged = pres <= options.feastol
            && dres <= options.feastol
            && (gap <= options.abstol || relgap.map_or(false, |r| r <= options.reltol));
        if converged || iters == options.maxiters {
            let status = if converged { Status::Optimal } else { Status::Unknown };
            let message = if converged { "" } else { "Terminated (maximum number of iterations reached)" };
            return Ok(finalize(status, x, y, s, z, mnl, cone, gap, relgap, pcost, dcost, pres, dres, message));
        }

        if iters == 0 {
            w = compute_scaling(&s, &z, &mut lambda, cone, mnl);
        }
        let mut lambdasq: DVector<f64> = DVector::zeros(lambda.len());
        ssqr(&mut lambdasq, &lambda, cone, mnl);

        let (_, _, mut h_mat) = oracle
            .eval_with_hessian(&x, &znl_current)
            .ok_or_else(|| SolverError::FeasibilityError("F(x, z) failed at the current iterate".into()))?;

        let f3: Box<dyn KktSolve> = match factory.factor(&w, Some(&h_mat), Some(&df)) {
            Ok(f3) => f3,
            Err(_) => {
                if iters == 0 {
                    return Err(SolverError::RankDeficient);
                }
                if relaxed_iters > 0 && relaxed_iters < MAX_RELAXED_ITERS {
                    // The arithmetic error may be caused by the relaxed
                    // line search in a previous iteration: roll back to
                    // the last saved checkpoint and require a standard
                    // line search from there.
                    let save = saved.take().expect("a relaxed-iteration series always carries a checkpoint");
                    w = save.w;
                    x = save.x;
                    y = save.y;
                    s = save.s;
                    z = save.z;
                    lambda = save.lambda;
                    rx = save.rx;
                    ry = save.ry;
                    rznl = save.rznl;
                    rzl = save.rzl;
                    resx = rx.norm();
                    resznl = rznl.norm();
                    gap = save.gap0;
                    ssqr(&mut lambdasq, &lambda, cone, mnl);
                    relaxed_iters = -1;

                    let znl_retry = z.rows(0, mnl).clone_owned();
                    let (_, df_retry, h_retry) = oracle
                        .eval_with_hessian(&x, &znl_retry)
                        .ok_or_else(|| SolverError::FeasibilityError("F(x, z) failed while recovering from a singular KKT matrix".into()))?;
                    match factory.factor(&w, Some(&h_retry), Some(&df_retry)) {
                        Ok(f3) => {
                            df = df_retry;
                            h_mat = h_retry;
                            f3
                        }
                        Err(_) => {
                            return Ok(finalize(Status::Unknown, x, y, s, z, mnl, cone, gap, relgap, pcost, dcost, pres, dres, "Terminated (singular KKT matrix)"));
                        }
                    }
                } else {
                    return Ok(finalize(Status::Unknown, x, y, s, z, mnl, cone, gap, relgap, pcost, dcost, pres, dres, "Terminated (singular KKT matrix)"));
                }
            }
        };

        let nqsum: usize = cone.q.iter().sum();
        let nssum: usize = cone.s.iter().sum();
        let nlq = mnl + cone.l + nqsum;

        let mut dx = DVector::zeros(n);
        let mut dy = DVector::zeros(p);
        let mut dz = DVector::zeros(mnl + cdim);
        let mut ds = DVector::zeros(mnl + cdim);
        let mut dz2 = DVector::zeros(mnl + cdim);
        let mut ds2 = DVector::zeros(mnl + cdim);
        let mut dsa = DVector::zeros(mnl + cdim);
        let mut dza = DVector::zeros(mnl + cdim);
        let mut sigs = DVector::zeros(nssum);
        let mut sigz = DVector::zeros(nssum);
        let mut dsdz = 0.0_f64;
        let mut step = 1.0_f64;
        let mut sigma = 0.0_f64;
        let mut eta = 0.0_f64;

        // The affine-scaling direction (phase 0, sigma = eta = 0) gives the
        // Mehrotra cross term and the centering parameter sigma for phase 1,
        // the corrector direction actually stepped to.
        for phase in 0..2 {
            let mu = gap / degree as f64;

            ds = -expand_compact(&lambdasq, cone, mnl);
            dx = (x_ops.newcopy)(&rx);
            (x_ops.scal)(eta - 1.0, &mut dx);
            dy = (y_ops.newcopy)(&ry);
            (y_ops.scal)(eta - 1.0, &mut dy);
            dz.rows_mut(0, mnl).copy_from(&((eta - 1.0) * &rznl));
            dz.rows_mut(mnl, cdim).copy_from(&((eta - 1.0) * &rzl));

            if phase == 1 {
                let mut cross = dsa.clone();
                sprod(&mut cross, &dza, cone, mnl, false);
                ds -= &cross;
                for i in 0..(mnl + cone.l) {
                    ds[i] += sigma * mu;
                }
                let mut ind = mnl + cone.l;
                for &m in &cone.q {
                    ds[ind] += sigma * mu;
                    ind += m;
                }
                for &mdim in &cone.s {
                    for i in 0..mdim {
                        ds[ind + i * (mdim + 1)] += sigma * mu;
                    }
                    ind += mdim * mdim;
                }
            }

            if f4(refinement, debug, f3.as_ref(), &w, &lambda, cone, mnl, g, a, &df, Some(&h_mat), &mut dx, &mut dy, &mut dz, &mut ds).is_err() {
                if iters == 0 {
                    return Err(SolverError::RankDeficient);
                }
                return Ok(finalize(Status::Unknown, x, y, s, z, mnl, cone, gap, relgap, pcost, dcost, pres, dres, "Terminated (singular KKT matrix)"));
            }

            if phase == 0 {
                dsa = ds.clone();
                dza = dz.clone();
            }

            // ds'*dz and the unscaled steps are needed for the line search.
            dsdz = sdot(&ds, &dz, cone, mnl);
            dz2 = dz.clone();
            scale(&mut dz2, &w, false, true);
            ds2 = ds.clone();
            scale(&mut ds2, &w, true, false);

            // Maximum steps to the boundary. ds, dz are overwritten in
            // place: scaled by H(lambda)^{-1/2}, and for the PSD blocks
            // replaced by their eigenvectors (eigenvalues land in
            // sigs/sigz). dz2/ds2 above already hold the unscaled
            // direction the line search steps along; ds/dz become working
            // storage carried to the end-of-iteration scaling update.
            scale2(&lambda, &mut ds, cone, mnl, false);
            let ts = max_step(&mut ds, cone, mnl, Some(&mut sigs));
            scale2(&lambda, &mut dz, cone, mnl, false);
            let tz = max_step(&mut dz, cone, mnl, Some(&mut sigz));
            let t = 0.0_f64.max(ts).max(tz);
            step = if t == 0.0 { 1.0 } else { (STEP / t).min(1.0) };

            // Backtrack until newx is in the domain of f.
            loop {
                let mut newx = (x_ops.newcopy)(&x);
                (x_ops.axpy)(step, &dx, &mut newx);
                if oracle.eval(&newx).is_some() {
                    break;
                }
                step *= BETA;
            }

            let phi_val = theta1 * gap + theta2 * resx + theta3 * resznl;
            let mut phi = phi_val;
            let mut dphi = if phase == 0 {
                -phi_val
            } else {
                -theta1 * (1.0 - sigma) * gap - theta2 * (1.0 - eta) * resx - theta3 * (1.0 - eta) * resznl
            };

            loop {
                let mut newx = (x_ops.newcopy)(&x);
                (x_ops.axpy)(step, &dx, &mut newx);
                let mut newy = (y_ops.newcopy)(&y);
                (y_ops.axpy)(step, &dy, &mut newy);
                let newz = &z + step * &dz2;
                let news = &s + step * &ds2;
                let (newf, newdf) = oracle.eval(&newx).expect("the domain backtrack above guarantees newx is feasible");

                let mut newrx = (x_ops.newcopy)(c);
                let newaty = mat_apply(a, &newy, n, MatTrans::T);
                (x_ops.axpy)(1.0, &newaty, &mut newrx);
                let newggt = apply_gg_t(&newdf, g, mnl, n, &newz);
                (x_ops.axpy)(1.0, &newggt, &mut newrx);
                let newresx = (x_ops.dot)(&newrx, &newrx).sqrt();

                let mut newrznl = news.rows(0, mnl).clone_owned();
                newrznl += &newf;
                let newresznl = newrznl.norm();

                let newgap = (1.0 - (1.0 - sigma) * step) * gap + step * step * dsdz;
                let newphi = theta1 * newgap + theta2 * newresx + theta3 * newresznl;

                if phase == 0 {
                    if newgap <= (1.0 - ALPHA * step) * gap
                        && ((relaxed_iters >= 0 && relaxed_iters < MAX_RELAXED_ITERS) || newphi <= phi + ALPHA * step * dphi)
                    {
                        sigma = (newgap / gap).min((newgap / gap).powi(EXPON));
                        eta = 0.0;
                        break;
                    }
                    step *= BETA;
                    continue;
                }

                if relaxed_iters == -1 {
                    if newphi <= phi + ALPHA * step * dphi {
                        relaxed_iters = 0;
                        break;
                    }
                    step *= BETA;
                } else if relaxed_iters == 0 {
                    if newphi <= phi + ALPHA * step * dphi {
                        relaxed_iters = 0;
                        break;
                    }
                    saved = Some(SavedState {
                        w: w.clone(),
                        x: x.clone(),
                        y: y.clone(),
                        s: s.clone(),
                        z: z.clone(),
                        lambda: lambda.clone(),
                        dx: dx.clone(),
                        dy: dy.clone(),
                        ds: ds.clone(),
                        dz: dz.clone(),
                        ds2: ds2.clone(),
                        dz2: dz2.clone(),
                        rx: rx.clone(),
                        ry: ry.clone(),
                        rznl: rznl.clone(),
                        rzl: rzl.clone(),
                        phi0: phi,
                        dphi0: dphi,
                        gap0: gap,
                        step0: step,
                        sigma0: sigma,
                        eta0: eta,
                        dsdz0: dsdz,
                    });
                    relaxed_iters = 1;
                    break;
                } else if relaxed_iters < MAX_RELAXED_ITERS {
                    let save = saved.as_ref().expect("checkpoint must exist during a relaxed-iteration series");
                    if newphi <= save.phi0 + ALPHA * save.step0 * save.dphi0 {
                        relaxed_iters = 0;
                    } else {
                        relaxed_iters += 1;
                    }
                    break;
                } else {
                    let phi0 = saved.as_ref().unwrap().phi0;
                    if newphi <= phi0 + ALPHA * saved.as_ref().unwrap().step0 * saved.as_ref().unwrap().dphi0 {
                        relaxed_iters = 0;
                        break;
                    } else if newphi >= phi0 {
                        let save = saved.take().unwrap();
                        w = save.w;
                        x = save.x;
                        y = save.y;
                        s = save.s;
                        z = save.z;
                        lambda = save.lambda;
                        dx = save.dx;
                        dy = save.dy;
                        ds = save.ds;
                        dz = save.dz;
                        ds2 = save.ds2;
                        dz2 = save.dz2;
                        rx = save.rx;
                        ry = save.ry;
                        rznl = save.rznl;
                        rzl = save.rzl;
                        phi = save.phi0;
                        dphi = save.dphi0;
                        gap = save.gap0;
                        step = save.step0;
                        sigma = save.sigma0;
                        eta = save.eta0;
                        dsdz = save.dsdz0;
                        relaxed_iters = -1;
                    } else if newphi <= phi + ALPHA * step * dphi {
                        relaxed_iters = -1;
                        break;
                    } else {
                        step *= BETA;
                    }
                }
            }
        }

        // Update x, y with the phase-1 step and direction (possibly a
        // resumed checkpoint's, if the relaxed series above rolled back).
        (x_ops.axpy)(step, &dx, &mut x);
        (y_ops.axpy)(step, &dy, &mut y);

        // ds := e + step*ds, dz := e + step*dz for the nonlinear, 'l' and
        // 'q' blocks (e is each block's own Jordan identity).
        for i in 0..(mnl + cone.l) {
            ds[i] = 1.0 + step * ds[i];
            dz[i] = 1.0 + step * dz[i];
        }
        let mut ind = mnl + cone.l;
        for &m in &cone.q {
            for k in 0..m {
                ds[ind + k] *= step;
                dz[ind + k] *= step;
            }
            ds[ind] += 1.0;
            dz[ind] += 1.0;
            ind += m;
        }

        // H(lambda)^{1/2} applied to the whole vector replaces the
        // nonlinear/l/q blocks with the updated iterate in the new
        // scaling, and the PSD blocks (currently eigenvectors) with
        // diag(lambda)^{1/2} Q diag(lambda)^{1/2}.
        scale2(&lambda, &mut ds, cone, mnl, true);
        scale2(&lambda, &mut dz, cone, mnl, true);

        for i in 0..nssum {
            sigs[i] = (1.0 + step * sigs[i]) / lambda[nlq + i];
            sigz[i] = (1.0 + step * sigz[i]) / lambda[nlq + i];
        }
        let mut ind = nlq;
        let mut ind3 = 0usize;
        for &m in &cone.s {
            for i in 0..m {
                let sa = sigs[ind3 + i].sqrt();
                for r in 0..m {
                    ds[ind + i * m + r] *= sa;
                }
                let sb = sigz[ind3 + i].sqrt();
                for r in 0..m {
                    dz[ind + i * m + r] *= sb;
                }
            }
            ind += m * m;
            ind3 += m;
        }

        update_scaling(&mut w, &mut lambda, &mut ds, &mut dz, cone);

        s = expand_compact(&lambda, cone, mnl);
        scale(&mut s, &w, true, false);
        z = expand_compact(&lambda, cone, mnl);
        scale(&mut z, &w, false, true);
    }

    unreachable!("the loop above always returns at iters == options.maxiters")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::NoNonlinear;

    /// `minimize x1 + x2` subject to `x1 >= 1`, `x2 >= 1` (the
    /// nonnegative orthant written as `-x <= -1`), no equality
    /// constraints: optimum at `(1, 1)`, objective 2.
    #[test]
    fn solves_a_trivial_lp_on_the_nonnegative_orthant() {
        let c = DVector::from_vec(vec![1.0, 1.0]);
        let g = DMatrix::from_row_slice(2, 2, &[-1.0, 0.0, 0.0, -1.0]);
        let h = DVector::from_vec(vec![-1.0, -1.0]);
        let cone = Cone::new(2, vec![], vec![]).unwrap();
        let a = DMatrix::zeros(0, 2);
        let b = DVector::zeros(0);
        let oracle = NoNonlinear { x0: DVector::from_vec(vec![2.0, 2.0]) };
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
        assert!((result.x[0] - 1.0).abs() < 1e-4);
        assert!((result.x[1] - 1.0).abs() < 1e-4);
        assert!((result.primal_objective - 2.0).abs() < 1e-3);
    }
}
