//! The Nesterov-Todd scaling `W` for the product cone, and the four
//! operations the CPL driver needs on it: [`compute_scaling`],
//! [`update_scaling`], [`scale`] and [`scale2`].

use nalgebra::{Cholesky, DMatrix, DVector, SVD};

use crate::cone::Cone;
use crate::vector::{jdot, jnrm2};

/// A Nesterov-Todd scaling for the product cone `R^mnl x R^l x Q x P`.
///
/// After [`compute_scaling`], `W*z == W^{-T}*s == lambda` for the points
/// `s, z` it was built from.
#[derive(Debug, Clone)]
pub struct Scaling {
    pub mnl: usize,
    pub dnl: DVector<f64>,
    pub dnli: DVector<f64>,
    pub d: DVector<f64>,
    pub di: DVector<f64>,
    pub v: Vec<DVector<f64>>,
    pub beta: Vec<f64>,
    pub r: Vec<DMatrix<f64>>,
    pub rti: Vec<DMatrix<f64>>,
}

impl Scaling {
    /// The identity scaling (`d = 1`, `v = e0`, `r = I`), used as the
    /// initial `W` before the first scaling computation.
    pub fn identity(cone: &Cone, mnl: usize) -> Self {
        Scaling {
            mnl,
            dnl: DVector::from_element(mnl, 1.0),
            dnli: DVector::from_element(mnl, 1.0),
            d: DVector::from_element(cone.l, 1.0),
            di: DVector::from_element(cone.l, 1.0),
            v: cone
                .q
                .iter()
                .map(|&m| {
                    let mut v = DVector::zeros(m);
                    v[0] = 1.0;
                    v
                })
                .collect(),
            beta: vec![1.0; cone.q.len()],
            r: cone.s.iter().map(|&m| DMatrix::identity(m, m)).collect(),
            rti: cone.s.iter().map(|&m| DMatrix::identity(m, m)).collect(),
        }
    }
}

fn lower_tri_cholesky(block: &DMatrix<f64>) -> DMatrix<f64> {
    let mut sym = block.clone();
    let m = sym.nrows();
    for j in 0..m {
        for i in (j + 1)..m {
            sym[(j, i)] = sym[(i, j)];
        }
    }
    Cholesky::new(sym)
        .expect("PSD block must be positive definite to factor")
        .l()
}

fn block_matrix(x: &DVector<f64>, offset: usize, m: usize) -> DMatrix<f64> {
    DMatrix::from_fn(m, m, |r, c| x[offset + c * m + r])
}

fn write_block(x: &mut DVector<f64>, offset: usize, m: usize, mat: &DMatrix<f64>) {
    for c in 0..m {
        for r in 0..m {
            x[offset + c * m + r] = mat[(r, c)];
        }
    }
}

/// Computes the NT scaling `W` at the strictly interior points `s, z`,
/// writing the scaled point `lambda` (in "lambda layout": `m` entries per
/// PSD block rather than `m*m`).
pub fn compute_scaling(s: &DVector<f64>, z: &DVector<f64>, lambda: &mut DVector<f64>, cone: &Cone, mnl: usize) -> Scaling {
    let mut dnl = DVector::zeros(mnl);
    let mut dnli = DVector::zeros(mnl);
    for i in 0..mnl {
        dnl[i] = (s[i] / z[i]).sqrt();
        dnli[i] = 1.0 / dnl[i];
        lambda[i] = (s[i] * z[i]).sqrt();
    }

    let l = cone.l;
    let mut d = DVector::zeros(l);
    let mut di = DVector::zeros(l);
    for k in 0..l {
        let (sk, zk) = (s[mnl + k], z[mnl + k]);
        d[k] = (sk / zk).sqrt();
        di[k] = 1.0 / d[k];
        lambda[mnl + k] = (sk * zk).sqrt();
    }

    let mut v = Vec::with_capacity(cone.q.len());
    let mut beta = Vec::with_capacity(cone.q.len());
    let mut ind = mnl + l;
    for &m in &cone.q {
        let aa = jnrm2(s, ind, m);
        let bb = jnrm2(z, ind, m);
        beta.push((aa / bb).sqrt());

        let cc = (((s.rows(ind, m).dot(&z.rows(ind, m))) / aa / bb + 1.0) / 2.0).sqrt();

        let mut vk = DVector::zeros(m);
        for i in 0..m {
            vk[i] = -z[ind + i] / bb;
        }
        vk[0] *= -1.0;
        for i in 0..m {
            vk[i] += s[ind + i] / aa;
        }
        vk /= 2.0 * cc;
        vk[0] += 1.0;
        vk /= (2.0 * vk[0]).sqrt();

        lambda[ind] = cc;
        let dd = 2.0 * cc + s[ind] / aa + z[ind] / bb;
        for i in 1..m {
            lambda[ind + i] = s[ind + i] * ((cc + z[ind] / bb) / dd / aa);
            lambda[ind + i] += z[ind + i] * ((cc + s[ind] / aa) / dd / bb);
        }
        let scale_ab = (aa * bb).sqrt();
        for i in 0..m {
            lambda[ind + i] *= scale_ab;
        }

        v.push(vk);
        ind += m;
    }

    let mut r = Vec::with_capacity(cone.s.len());
    let mut rti = Vec::with_capacity(cone.s.len());
    let mut ind2 = ind;
    let mut lam_ind = mnl + l + cone.q.iter().sum::<usize>();
    for &m in &cone.s {
        if m == 0 {
            r.push(DMatrix::zeros(0, 0));
            rti.push(DMatrix::zeros(0, 0));
            continue;
        }
        let sk = block_matrix(s, ind2, m);
        let zk = block_matrix(z, ind2, m);
        let ls = lower_tri_cholesky(&sk);
        let lz = lower_tri_cholesky(&zk);

        let work = lz.transpose() * &ls;
        let svd = SVD::new(work, true, false);
        let u = svd.u.expect("SVD of Lz'Ls must have U");
        let sigma = svd.singular_values;

        let lzt_inv = lz
            .transpose()
            .try_inverse()
            .expect("Lz must be invertible for a strictly interior PSD point");
        let mut rk = &lzt_inv * &u;
        let mut rtik = &lz * &u;

        for i in 0..m {
            lambda[lam_ind + i] = sigma[i];
            let a = sigma[i].sqrt();
            for row in 0..m {
                rk[(row, i)] *= a;
                rtik[(row, i)] /= a;
            }
        }

        r.push(rk);
        rti.push(rtik);
        ind2 += m * m;
        lam_ind += m;
    }

    Scaling { mnl, dnl, dnli, d, di, v, beta, r, rti }
}

/// Updates `W` and `lambda` in place so that `W*zt == W^{-T}*st == lambda`
/// for the new iterates. On entry the nonlinear/`l`/`q` components of `s`
/// and `z` hold `W^{-T}*st` and `W*zt` (the new iterates in the *current*
/// scaling); the `s`-cone components hold the Cholesky factors `Ls, Lz` of
/// those same quantities (`W^{-T}*st = Ls*Ls'`, `W*zt = Lz*Lz'`).
pub fn update_scaling(w: &mut Scaling, lambda: &mut DVector<f64>, s: &mut DVector<f64>, z: &mut DVector<f64>, cone: &Cone) {
    let mnl = w.mnl;
    let ml = cone.l;
    let m = mnl + ml;

    for i in 0..m {
        s[i] = s[i].sqrt();
        z[i] = z[i].sqrt();
    }
    for i in 0..mnl {
        w.dnl[i] *= s[i] / z[i];
        w.dnli[i] = 1.0 / w.dnl[i];
    }
    for i in 0..ml {
        w.d[i] *= s[mnl + i] / z[mnl + i];
        w.di[i] = 1.0 / w.d[i];
    }
    for i in 0..m {
        lambda[i] = s[i] * z[i];
    }

    let mut ind = m;
    for k in 0..cone.q.len() {
        let mqk = w.v[k].len();
        let aa = jnrm2(s, ind, mqk);
        for i in 0..mqk {
            s[ind + i] /= aa;
        }
        let bb = jnrm2(z, ind, mqk);
        for i in 0..mqk {
            z[ind + i] /= bb;
        }

        let cc = ((1.0 + s.rows(ind, mqk).dot(&z.rows(ind, mqk))) / 2.0).sqrt();

        let v = &w.v[k];
        let vs = v.dot(&s.rows(ind, mqk).clone_owned());
        // jdot expects both vectors aligned at the same offset; v has offset 0,
        // z's block starts at `ind`, so compute the J-weighted dot by hand.
        let vz = v[0] * z[ind] - v.rows(1, mqk - 1).dot(&z.rows(ind + 1, mqk - 1));

        let vq = (vs + vz) / 2.0 / cc;
        let vu = vs - vz;

        lambda[ind] = cc;
        let wk0 = 2.0 * v[0] * vq - (s[ind] + z[ind]) / 2.0 / cc;
        let dd = (v[0] * vu - s[ind] / 2.0 + z[ind] / 2.0) / (wk0 + 1.0);

        for i in 1..mqk {
            lambda[ind + i] = v[i];
        }
        let scal_factor = 2.0 * (-dd * vq + 0.5 * vu);
        for i in 1..mqk {
            lambda[ind + i] *= scal_factor;
        }
        let a1 = 0.5 * (1.0 - dd / cc);
        let a2 = 0.5 * (1.0 + dd / cc);
        for i in 1..mqk {
            lambda[ind + i] += a1 * s[ind + i] + a2 * z[ind + i];
        }
        let scale_ab = (aa * bb).sqrt();
        for i in 0..mqk {
            lambda[ind + i] *= scale_ab;
        }

        let v = &mut w.v[k];
        for i in 0..mqk {
            v[i] *= 2.0 * vq;
        }
        v[0] -= s[ind] / 2.0 / cc;
        for i in 1..mqk {
            v[i] += s[ind + i] * 0.5 / cc;
        }
        for i in 0..mqk {
            v[i] -= z[ind + i] * 0.5 / cc;
        }
        v[0] += 1.0;
        let nv = (2.0 * v[0]).sqrt();
        for i in 0..mqk {
            v[i] /= nv;
        }

        w.beta[k] *= (aa / bb).sqrt();
        ind += mqk;
    }

    let mut ind2 = ind;
    let mut lam_ind = ind;
    for k in 0..cone.s.len() {
        let mk = w.r[k].nrows();
        if mk == 0 {
            continue;
        }
        let ls = block_matrix(s, ind2, mk);
        let lz = block_matrix(z, ind2, mk);

        w.r[k] = &w.r[k] * &ls;
        w.rti[k] = &w.rti[k] * &lz;

        let work = lz.transpose() * &ls;
        let svd = SVD::new(work, true, true);
        let u = svd.u.expect("SVD must produce U");
        let vt = svd.v_t.expect("SVD must produce V^T");
        let sigma = svd.singular_values;

        w.r[k] = &w.r[k] * vt.transpose();
        w.rti[k] = &w.rti[k] * &u;

        for i in 0..mk {
            lambda[lam_ind + i] = sigma[i];
            let a = 1.0 / sigma[i].sqrt();
            for row in 0..mk {
                w.r[k][(row, i)] *= a;
                w.rti[k][(row, i)] *= a;
            }
        }

        ind2 += mk * mk;
        lam_ind += mk;
    }
}

/// Applies `W`, `W^T`, `W^{-1}` or `W^{-T}` to a single cone vector `x`,
/// in place.
pub fn scale(x: &mut DVector<f64>, w: &Scaling, transpose: bool, inverse: bool) {
    let dnl = if inverse { &w.dnli } else { &w.dnl };
    for i in 0..w.mnl {
        x[i] *= dnl[i];
    }
    let d = if inverse { &w.di } else { &w.d };
    for i in 0..d.len() {
        x[w.mnl + i] *= d[i];
    }

    let mut ind = w.mnl + w.d.len();
    for (v, &beta) in w.v.iter().zip(w.beta.iter()) {
        let m = v.len();
        let mut xk: Vec<f64> = (0..m).map(|i| x[ind + i]).collect();
        if inverse {
            xk[0] = -xk[0];
        }
        let wdot: f64 = xk.iter().zip(v.iter()).map(|(a, b)| a * b).sum();
        xk[0] = -xk[0];
        for i in 0..m {
            xk[i] += 2.0 * wdot * v[i];
        }
        let a = if inverse {
            xk[0] = -xk[0];
            1.0 / beta
        } else {
            beta
        };
        for i in 0..m {
            x[ind + i] = xk[i] * a;
        }
        ind += m;
    }

    for k in 0..w.r.len() {
        let m = w.r[k].nrows();
        if m == 0 {
            continue;
        }
        let mat = block_matrix(x, ind, m);
        let out = if !inverse {
            if !transpose {
                w.r[k].transpose() * &mat * &w.r[k]
            } else {
                &w.r[k] * &mat * w.r[k].transpose()
            }
        } else if !transpose {
            &w.rti[k] * &mat * w.rti[k].transpose()
        } else {
            w.rti[k].transpose() * &mat * &w.rti[k]
        };
        write_block(x, ind, m, &out);
        ind += m * m;
    }
}

/// Applies the Hessian of the logarithmic barrier at `lambda`, `H(lambda^{+-1/2})`,
/// to `x` in place.
pub fn scale2(lambda: &DVector<f64>, x: &mut DVector<f64>, cone: &Cone, mnl: usize, inverse: bool) {
    let nl = mnl + cone.l;
    for i in 0..nl {
        if inverse {
            x[i] *= lambda[i];
        } else {
            x[i] /= lambda[i];
        }
    }

    let mut ind = nl;
    for &m in &cone.q {
        let a = jnrm2(lambda, ind, m);
        let lx = if !inverse {
            jdot(lambda, x, ind, m) / a
        } else {
            lambda.rows(ind, m).dot(&x.rows(ind, m)) / a
        };
        let x0 = x[ind];
        x[ind] = lx;
        let mut c = (lx + x0) / (lambda[ind] / a + 1.0) / a;
        if !inverse {
            c *= -1.0;
        }
        for i in 1..m {
            x[ind + i] += c * lambda[ind + i];
        }
        let factor = if !inverse { 1.0 / a } else { a };
        for i in 0..m {
            x[ind + i] *= factor;
        }
        ind += m;
    }

    let mut ind2 = ind;
    for &m in &cone.s {
        for j in 0..m {
            let lj = lambda[ind2 + j].sqrt();
            for i in 0..m {
                let c = lj * lambda[ind2 + i].sqrt();
                if !inverse {
                    x[ind + j * m + i] /= c;
                } else {
                    x[ind + j * m + i] *= c;
                }
            }
        }
        ind += m * m;
        ind2 += m;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cone::Cone;

    fn make_interior(cone: &Cone, mnl: usize, base: f64) -> DVector<f64> {
        let mut v = DVector::zeros(cone.len(mnl));
        for i in 0..(mnl + cone.l) {
            v[i] = base + i as f64 * 0.1;
        }
        let mut ind = mnl + cone.l;
        for &m in &cone.q {
            v[ind] = base * 3.0;
            for i in 1..m {
                v[ind + i] = 0.1 * i as f64;
            }
            ind += m;
        }
        for &m in &cone.s {
            for i in 0..m {
                v[ind + i * m + i] = base + i as f64;
            }
            ind += m * m;
        }
        v
    }

    #[test]
    fn compute_scaling_satisfies_wz_eq_wtis_eq_lambda() {
        let cone = Cone::new(2, vec![3], vec![2]).unwrap();
        let mnl = 1;
        let s = make_interior(&cone, mnl, 2.0);
        let z = make_interior(&cone, mnl, 1.3);
        let mut lambda = DVector::zeros(cone.lambda_len(mnl));
        let w = compute_scaling(&s, &z, &mut lambda, &cone, mnl);

        let mut wz = z.clone();
        scale(&mut wz, &w, false, false);
        let mut wts = s.clone();
        scale(&mut wts, &w, true, true);

        // lambda is in "lambda layout" (s-blocks of length m, not m*m);
        // compare only the nonlinear/l/q prefix directly, which shares layout.
        let prefix = mnl + cone.l + cone.q.iter().sum::<usize>();
        for i in 0..prefix {
            assert!((wz[i] - lambda[i]).abs() < 1e-6, "wz[{i}]");
            assert!((wts[i] - lambda[i]).abs() < 1e-6, "wts[{i}]");
        }
    }

    #[test]
    fn scale_round_trips_under_inverse() {
        let cone = Cone::new(2, vec![3], vec![2]).unwrap();
        let mnl = 1;
        let s = make_interior(&cone, mnl, 2.0);
        let z = make_interior(&cone, mnl, 1.3);
        let mut lambda = DVector::zeros(cone.lambda_len(mnl));
        let w = compute_scaling(&s, &z, &mut lambda, &cone, mnl);

        let x0 = make_interior(&cone, mnl, 0.7);
        let mut x = x0.clone();
        scale(&mut x, &w, false, false);
        scale(&mut x, &w, false, true);
        for i in 0..x.len() {
            assert!((x[i] - x0[i]).abs() < 1e-6, "index {i}: {} vs {}", x[i], x0[i]);
        }

        let mut y = x0.clone();
        scale(&mut y, &w, true, false);
        scale(&mut y, &w, true, true);
        for i in 0..y.len() {
            assert!((y[i] - x0[i]).abs() < 1e-6);
        }
    }
}
