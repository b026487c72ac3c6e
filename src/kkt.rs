//! KKT solver factories for the 3x3 saddle-point system
//!
//! ```text
//! [ H        A'   GG' W^-1 ] [ ux ]   [ bx      ]
//! [ A        0    0        ] [ uy ] = [ by      ]
//! [ W^-T GG  0    -I       ] [ uz ]   [ W^-T bz ]
//! ```
//!
//! with `GG = [Df; G]`. Each factory is handed the current scaling `W`
//! (and, for CPL's nonlinear block, `H` and `Df`) and returns a solver
//! that overwrites `(bx, by, bz)` in place with `(ux, uy, W*uz)`.
//!
//! Cholesky, QR and LU factorizations of the dense reduced systems are
//! delegated to `nalgebra`; what's implemented here is the assembly of
//! the saddle-point system from `G`, `A`, `H`, `Df` and `W`, and the
//! block substitutions that recover `(ux, uy, W*uz)` from a factored
//! reduced system. `nalgebra` has no symmetric-indefinite (Bunch-Kaufman)
//! factorization, so the LDL variant below substitutes a general dense
//! LU solve of the same symmetric matrix; see `DESIGN.md`.

use nalgebra::{Cholesky, DMatrix, DVector, QR};

use crate::cone::Cone;
use crate::error::{Result, SolverError};
use crate::scaling::{scale, Scaling};
use crate::vector::pack;

/// A factored KKT system, ready to solve any number of right-hand sides.
pub trait KktSolve {
    /// Overwrites `(bx, by, bz)` with the solution `(ux, uy, W*uz)`.
    fn solve(&self, bx: &mut DVector<f64>, by: &mut DVector<f64>, bz: &mut DVector<f64>) -> Result<()>;
}

/// Builds a [`KktSolve`] from the current scaling and (for CPL) the
/// nonlinear Hessian/Jacobian blocks.
pub trait KktFactory {
    fn factor(&self, w: &Scaling, h: Option<&DMatrix<f64>>, df: Option<&DMatrix<f64>>) -> Result<Box<dyn KktSolve>>;
}

/// Packs the columns of `[Df; G]` (or `G` alone when `mnl == 0`) as
/// `W^{-T} * GG`, in packed cone-vector storage, one column per output
/// column.
fn scaled_packed_gg(g: &DMatrix<f64>, df: Option<&DMatrix<f64>>, w: &Scaling, cone: &Cone, mnl: usize) -> DMatrix<f64> {
    let n = g.ncols();
    let cdim = cone.len(mnl);
    let pdim = cone.packed_len(mnl);
    let mut out = DMatrix::zeros(pdim, n);
    for k in 0..n {
        let mut col = DVector::zeros(cdim);
        if mnl > 0 {
            let dfk = df.expect("Df required when mnl > 0");
            col.rows_mut(0, mnl).copy_from(&dfk.column(k));
        }
        col.rows_mut(mnl, cdim - mnl).copy_from(&g.column(k));
        scale(&mut col, w, true, true);
        let packed = pack(&col, cone, mnl);
        out.set_column(k, &packed);
    }
    out
}

// ---------------------------------------------------------------------
// LDL: dense symmetric indefinite factorization of the full (n+p+m)
// system.
// ---------------------------------------------------------------------

pub struct LdlFactory {
    pub g: DMatrix<f64>,
    pub a: DMatrix<f64>,
    pub cone: Cone,
    pub mnl: usize,
}

struct LdlFactored {
    n: usize,
    p: usize,
    pdim: usize,
    cone: Cone,
    mnl: usize,
    w: Scaling,
    lu: nalgebra::LU<f64, nalgebra::Dyn, nalgebra::Dyn>,
}

impl KktFactory for LdlFactory {
    fn factor(&self, w: &Scaling, h: Option<&DMatrix<f64>>, df: Option<&DMatrix<f64>>) -> Result<Box<dyn KktSolve>> {
        let (p, n) = (self.a.nrows(), self.a.ncols());
        let pdim = self.cone.packed_len(self.mnl);
        let ld = n + p + pdim;
        let mut k = DMatrix::zeros(ld, ld);

        if let Some(hm) = h {
            k.view_mut((0, 0), (n, n)).copy_from(hm);
        }
        k.view_mut((n, 0), (p, n)).copy_from(&self.a);
        k.view_mut((0, n), (n, p)).copy_from(&self.a.transpose());

        let gs = scaled_packed_gg(&self.g, df, w, &self.cone, self.mnl);
        k.view_mut((n + p, 0), (pdim, n)).copy_from(&gs);
        k.view_mut((0, n + p), (n, pdim)).copy_from(&gs.transpose());
        for i in 0..pdim {
            k[(n + p + i, n + p + i)] = -1.0;
        }

        let lu = k.lu();
        Ok(Box::new(LdlFactored { n, p, pdim, cone: self.cone.clone(), mnl: self.mnl, w: w.clone(), lu }))
    }
}

impl KktSolve for LdlFactored {
    fn solve(&self, bx: &mut DVector<f64>, by: &mut DVector<f64>, bz: &mut DVector<f64>) -> Result<()> {
        let ld = self.n + self.p + self.pdim;
        let mut u = DVector::zeros(ld);
        u.rows_mut(0, self.n).copy_from(bx);
        u.rows_mut(self.n, self.p).copy_from(by);

        scale(bz, &self.w, true, true);
        let zp = pack(bz, &self.cone, self.mnl);
        u.rows_mut(self.n + self.p, self.pdim).copy_from(&zp);

        let sol = self
            .lu
            .solve(&u)
            .ok_or(SolverError::ArithmeticError { stage: "kkt_ldl" })?;

        bx.copy_from(&sol.rows(0, self.n));
        by.copy_from(&sol.rows(self.n, self.p));
        let up = sol.rows(self.n + self.p, self.pdim).clone_owned();
        *bz = crate::vector::unpack(&up, &self.cone, self.mnl);
        Ok(())
    }
}

// ---------------------------------------------------------------------
// CHOL: QR-eliminate the equality constraints, Cholesky-factor the
// reduced (n-p) x (n-p) block.
// ---------------------------------------------------------------------

pub struct CholFactory {
    pub g: DMatrix<f64>,
    pub a: DMatrix<f64>,
    pub cone: Cone,
    pub mnl: usize,
}

struct CholFactored {
    n: usize,
    p: usize,
    cone: Cone,
    mnl: usize,
    w: Scaling,
    qr: QR<f64, nalgebra::Dyn, nalgebra::Dyn>,
    gs: DMatrix<f64>,
    k22: Cholesky<f64, nalgebra::Dyn>,
    k: DMatrix<f64>,
}

impl KktFactory for CholFactory {
    fn factor(&self, w: &Scaling, h: Option<&DMatrix<f64>>, df: Option<&DMatrix<f64>>) -> Result<Box<dyn KktSolve>> {
        let (p, n) = (self.a.nrows(), self.a.ncols());
        let at = self.a.transpose();
        let qr = at.qr();
        let q = qr.q();

        let gs = scaled_packed_gg(&self.g, df, w, &self.cone, self.mnl);

        let mut k = &gs.transpose() * &gs;
        if let Some(hm) = h {
            k += hm;
        }
        k = q.transpose() * &k * &q;

        let k22 = k
            .view((p, p), (n - p, n - p))
            .clone_owned();
        let k22 = Cholesky::new(k22).ok_or(SolverError::ArithmeticError { stage: "kkt_chol" })?;

        Ok(Box::new(CholFactored { n, p, cone: self.cone.clone(), mnl: self.mnl, w: w.clone(), qr, gs, k22, k }))
    }
}

impl KktSolve for CholFactored {
    fn solve(&self, bx: &mut DVector<f64>, by: &mut DVector<f64>, bz: &mut DVector<f64>) -> Result<()> {
        let (n, p) = (self.n, self.p);
        let q = self.qr.q();
        let r = self.qr.r();

        scale(bz, &self.w, true, true);
        let bzp = pack(bz, &self.cone, self.mnl);

        // x := [Q1,Q2]' * (bx + Gs'*bzp)
        let mut x = bx.clone() + self.gs.transpose() * &bzp;
        x = q.transpose() * &x;

        // y := R^{-T} * by, solved via R (upper triangular, p x p)
        let rp = r.view((0, 0), (p, p)).clone_owned();
        let v_by = rp
            .transpose()
            .lu()
            .solve(by)
            .ok_or(SolverError::ArithmeticError { stage: "kkt_chol" })?;

        // x[p:] := K22^{-1} * (x[p:] - K21*v_by)
        let k21 = self.k.view((p, 0), (n - p, p)).clone_owned();
        let mut xp = x.rows(p, n - p).clone_owned() - &k21 * &v_by;
        xp = self.k22.solve(&xp);

        // y := R^{-1} * (x[:p] - K11*v_by - K12*xp)
        let k11 = self.k.view((0, 0), (p, p)).clone_owned();
        let k12 = self.k.view((0, p), (p, n - p)).clone_owned();
        let yrhs = x.rows(0, p).clone_owned() - &k11 * &v_by - &k12 * &xp;
        let y = rp
            .lu()
            .solve(&yrhs)
            .ok_or(SolverError::ArithmeticError { stage: "kkt_chol" })?;

        let mut xfull = DVector::zeros(n);
        xfull.rows_mut(0, p).copy_from(&v_by);
        xfull.rows_mut(p, n - p).copy_from(&xp);
        let ux = q * xfull;

        let bzp2 = &self.gs * &ux - &bzp;
        *bz = crate::vector::unpack(&bzp2, &self.cone, self.mnl);
        *bx = ux;
        *by = y;
        Ok(())
    }
}

// ---------------------------------------------------------------------
// CHOL2: for problems with no SOC/PSD blocks. Normal equations on the
// reduced (n x n) and (p x p) systems, falling back to an A'A-augmented
// S if the first Cholesky is singular.
// ---------------------------------------------------------------------

pub struct Chol2Factory {
    pub g: DMatrix<f64>,
    pub a: DMatrix<f64>,
    pub l: usize,
    pub mnl: usize,
}

struct Chol2Factored {
    n: usize,
    p: usize,
    l: usize,
    mnl: usize,
    w: Scaling,
    gs: DMatrix<f64>,
    s: Cholesky<f64, nalgebra::Dyn>,
    a: DMatrix<f64>,
    singular: bool,
}

impl KktFactory for Chol2Factory {
    fn factor(&self, w: &Scaling, h: Option<&DMatrix<f64>>, df: Option<&DMatrix<f64>>) -> Result<Box<dyn KktSolve>> {
        let (p, n) = (self.a.nrows(), self.a.ncols());
        let mut gs = DMatrix::zeros(self.mnl + self.l, n);
        if self.mnl > 0 {
            let dfk = df.expect("Df required when mnl > 0");
            for i in 0..self.mnl {
                for j in 0..n {
                    gs[(i, j)] = dfk[(i, j)] * w.dnli[i];
                }
            }
        }
        for i in 0..self.l {
            for j in 0..n {
                gs[(self.mnl + i, j)] = self.g[(i, j)] * w.di[i];
            }
        }

        let mut s = gs.transpose() * &gs;
        if let Some(hm) = h {
            s += hm;
        }

        let (s_fact, singular) = match Cholesky::new(s.clone()) {
            Some(f) => (f, false),
            None => {
                let s2 = s + self.a.transpose() * &self.a;
                let f = Cholesky::new(s2).ok_or(SolverError::ArithmeticError { stage: "kkt_chol2" })?;
                (f, true)
            }
        };

        Ok(Box::new(Chol2Factored {
            n,
            p,
            l: self.l,
            mnl: self.mnl,
            w: w.clone(),
            gs,
            s: s_fact,
            a: self.a.clone(),
            singular,
        }))
    }
}

impl KktSolve for Chol2Factored {
    fn solve(&self, bx: &mut DVector<f64>, by: &mut DVector<f64>, bz: &mut DVector<f64>) -> Result<()> {
        // W^{-T}*bz, unpacked cone vector, then its nonlinear/l prefix.
        let mut bzs = bz.clone();
        for i in 0..self.mnl {
            bzs[i] *= self.w.dnli[i];
        }
        for i in 0..self.l {
            bzs[self.mnl + i] *= self.w.di[i];
        }
        let bzs = bzs.rows(0, self.mnl + self.l).clone_owned();

        // rhs := bx + Gs' * bzs
        let mut rhs = bx.clone() + self.gs.transpose() * &bzs;
        if self.singular {
            rhs += self.a.transpose() * by;
        }

        // S*x1 = rhs ; then y solves A*S^{-1}*A' y = A*x1 - by
        let x1 = self.s.solve(&rhs);
        let s_inv_at = {
            let mut cols = DMatrix::zeros(self.n, self.p);
            for j in 0..self.p {
                let col = self.a.row(j).transpose();
                cols.set_column(j, &self.s.solve(&col));
            }
            cols
        };
        let k = &self.a * &s_inv_at;
        let k_chol = Cholesky::new(k).ok_or(SolverError::ArithmeticError { stage: "kkt_chol2" })?;
        let rhs_y = &self.a * &x1 - &*by;
        let y = k_chol.solve(&rhs_y);

        let ux = x1 - &s_inv_at * &y;

        let mut gux = DVector::zeros(self.mnl + self.l);
        gux.rows_mut(0, self.mnl).copy_from(&(self.gs.rows(0, self.mnl) * &ux));
        gux.rows_mut(self.mnl, self.l).copy_from(&(self.gs.rows(self.mnl, self.l) * &ux));
        let wuz = gux - bzs;

        *bx = ux;
        *by = y;
        bz.rows_mut(0, self.mnl + self.l).copy_from(&wuz);
        Ok(())
    }
}

// ---------------------------------------------------------------------
// QR: zero (1,1) block. QR-eliminate A, then QR the packed reduced
// G block.
// ---------------------------------------------------------------------

pub struct QrFactory {
    pub g: DMatrix<f64>,
    pub a: DMatrix<f64>,
    pub cone: Cone,
}

struct QrFactored {
    n: usize,
    p: usize,
    cone: Cone,
    w: Scaling,
    qa: QR<f64, nalgebra::Dyn, nalgebra::Dyn>,
    gs: DMatrix<f64>,
    q3: QR<f64, nalgebra::Dyn, nalgebra::Dyn>,
}

impl KktFactory for QrFactory {
    fn factor(&self, w: &Scaling, _h: Option<&DMatrix<f64>>, _df: Option<&DMatrix<f64>>) -> Result<Box<dyn KktSolve>> {
        let (p, n) = (self.a.nrows(), self.a.ncols());
        let qa = self.a.transpose().qr();
        let q = qa.q();

        let gs_full = scaled_packed_gg(&self.g, None, w, &self.cone, 0);
        let gs_full = gs_full * &q; // [Gs1, Gs2]
        let pdim = gs_full.nrows();
        let gs2 = gs_full.view((0, p), (pdim, n - p)).clone_owned();
        let q3 = gs2.qr();

        Ok(Box::new(QrFactored { n, p, cone: self.cone.clone(), w: w.clone(), qa, gs: gs_full, q3 }))
    }
}

impl KktSolve for QrFactored {
    fn solve(&self, bx: &mut DVector<f64>, by: &mut DVector<f64>, bz: &mut DVector<f64>) -> Result<()> {
        let (n, p) = (self.n, self.p);
        let qa_q = self.qa.q();
        let qa_r = self.qa.r();

        // w := W^{-T}*bz in packed storage.
        scale(bz, &self.w, true, true);
        let w_packed = pack(bz, &self.cone, 0);

        // vv := [Q1'*bx; R3^{-T}*Q2'*bx]
        let mut vv = qa_q.transpose() * &*bx;
        let r3 = self.q3.r();
        let q2tbx_tail = vv.rows(p, n - p).clone_owned();
        let r3t = r3.transpose();
        let tail_solved = r3t
            .lu()
            .solve(&q2tbx_tail)
            .ok_or(SolverError::ArithmeticError { stage: "kkt_qr" })?;
        vv.rows_mut(p, n - p).copy_from(&tail_solved);

        // x[:p] := R1^{-T}*by
        let r1 = qa_r.view((0, 0), (p, p)).clone_owned();
        let x_head = r1
            .transpose()
            .lu()
            .solve(by)
            .ok_or(SolverError::ArithmeticError { stage: "kkt_qr" })?;

        // w := w - Gs1*x[:p]
        let gs1 = self.gs.view((0, 0), (self.gs.nrows(), p)).clone_owned();
        let w_upd = w_packed - &gs1 * &x_head;

        // u := [Q3'*w + vv[p:]; 0]
        let q3q = self.q3.q();
        let mut u = q3q.transpose() * &w_upd;
        let npm = n - p;
        for i in 0..npm.min(u.len()) {
            u[i] += vv[p + i];
        }

        // x[p:] := R3^{-1}*u[:n-p]
        let u_head = u.rows(0, npm).clone_owned();
        let x_tail = r3
            .view((0, 0), (npm, npm))
            .clone_owned()
            .lu()
            .solve(&u_head)
            .ok_or(SolverError::ArithmeticError { stage: "kkt_qr" })?;

        let mut x_full = DVector::zeros(n);
        x_full.rows_mut(0, p).copy_from(&x_head);
        x_full.rows_mut(p, npm).copy_from(&x_tail);
        let ux = qa_q * x_full;

        // u := Q3*u[:n-p] - w
        let mut u_lifted = DVector::zeros(self.gs.nrows());
        u_lifted.rows_mut(0, npm).copy_from(&x_tail);
        let u_final = q3q * u_lifted - &w_upd;

        // y := R1^{-1}*(vv[:p] - Gs1'*u)
        let y_rhs = vv.rows(0, p).clone_owned() - gs1.transpose() * &u_final;
        let y = r1
            .lu()
            .solve(&y_rhs)
            .ok_or(SolverError::ArithmeticError { stage: "kkt_qr" })?;

        *bx = ux;
        *by = y;
        *bz = crate::vector::unpack(&u_final, &self.cone, 0);
        Ok(())
    }
}

/// Which of the four factory variants to use. `Chol` is the default
/// when the cone has second-order or PSD blocks, `Chol2` otherwise,
/// matching cvxopt's own `kktsolver` default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KktKind {
    Ldl,
    Chol,
    Chol2,
    Qr,
}

impl KktKind {
    pub fn default_for(cone: &Cone) -> Self {
        if cone.q.is_empty() && cone.s.is_empty() {
            KktKind::Chol2
        } else {
            KktKind::Chol
        }
    }
}

pub fn make_factory(kind: KktKind, g: DMatrix<f64>, a: DMatrix<f64>, cone: Cone, mnl: usize) -> Box<dyn KktFactory> {
    match kind {
        KktKind::Ldl => Box::new(LdlFactory { g, a, cone, mnl }),
        KktKind::Chol => Box::new(CholFactory { g, a, cone, mnl }),
        KktKind::Chol2 => Box::new(Chol2Factory { g, a, l: cone.l, mnl }),
        KktKind::Qr => Box::new(QrFactory { g, a, cone }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scaling::compute_scaling;

    #[test]
    fn ldl_solves_a_small_known_system() {
        // min x1+x2 s.t. x1,x2 >= 0, x1+x2 = 1 : trivial 1-constraint LP KKT block.
        let cone = Cone::new(2, vec![], vec![]).unwrap();
        let g = DMatrix::from_row_slice(2, 2, &[-1.0, 0.0, 0.0, -1.0]);
        let a = DMatrix::from_row_slice(1, 2, &[1.0, 1.0]);
        let factory = LdlFactory { g, a, cone: cone.clone(), mnl: 0 };

        let s = DVector::from_vec(vec![1.0, 1.0]);
        let z = DVector::from_vec(vec![1.0, 1.0]);
        let mut lambda = DVector::zeros(cone.barrier_degree(0));
        let w = compute_scaling(&s, &z, &mut lambda, &cone, 0);

        let solver = factory.factor(&w, None, None).unwrap();
        let mut bx = DVector::from_vec(vec![1.0, 1.0]);
        let mut by = DVector::from_vec(vec![0.5]);
        let mut bz = DVector::from_vec(vec![0.1, 0.1]);
        assert!(solver.solve(&mut bx, &mut by, &mut bz).is_ok());
        assert_eq!(bx.len(), 2);
        assert_eq!(by.len(), 1);
        assert_eq!(bz.len(), 2);
    }
}
