//! Block-wise algebra on cone vectors: elements of
//! `R^{mnl} x R^l x Q(q0) x ... x P(s0) x ...`.
//!
//! Every function here operates directly on a flat [`nalgebra::DVector<f64>`]
//! using a fixed block layout: `mnl` leading nonlinear-slack coordinates,
//! then the `l` orthant block, then each `q[k]` block contiguously, then
//! each `s[k]` block as a dense `s[k] x s[k]` matrix flattened column-major.

use nalgebra::{DMatrix, DVector, SymmetricEigen};

use crate::cone::Cone;

/// Re-symmetrize every PSD block of `x` by copying its lower triangle onto
/// the upper triangle. Required before a PSD block is fed to an
/// eigensolver or Cholesky factor, since in-place Jordan-algebra updates
/// only keep the lower triangle exact.
pub fn symm(x: &mut DVector<f64>, cone: &Cone, mnl: usize) {
    let mut ind = mnl + cone.lq_len();
    for &m in &cone.s {
        for j in 0..m {
            for i in (j + 1)..m {
                let v = x[ind + j * m + i];
                x[ind + i * m + j] = v;
            }
        }
        ind += m * m;
    }
}

/// Inner product of two cone vectors, weighting PSD off-diagonal entries
/// by a factor of 2 (only the lower triangle is semantically meaningful).
pub fn sdot(x: &DVector<f64>, y: &DVector<f64>, cone: &Cone, mnl: usize) -> f64 {
    let nlq = mnl + cone.lq_len();
    let mut a: f64 = x.rows(0, nlq).dot(&y.rows(0, nlq));
    let mut ind = nlq;
    for &m in &cone.s {
        for j in 0..m {
            a += x[ind + j * m + j] * y[ind + j * m + j];
            for i in (j + 1)..m {
                a += 2.0 * x[ind + j * m + i] * y[ind + j * m + i];
            }
        }
        ind += m * m;
    }
    a
}

/// `sqrt(x[offset]^2 - ||x[offset+1..offset+n]||^2)` computed via the
/// factored form `sqrt(x0-a)*sqrt(x0+a)` to avoid cancellation near the
/// cone boundary.
pub fn jnrm2(x: &DVector<f64>, offset: usize, n: usize) -> f64 {
    let a = x.rows(offset + 1, n - 1).norm();
    let x0 = x[offset];
    ((x0 - a).max(0.0)).sqrt() * (x0 + a).sqrt()
}

/// `x[offset]*y[offset] - x[offset+1..].dot(y[offset+1..])`, the bilinear
/// form associated with `J = diag(1, -I)`.
pub fn jdot(x: &DVector<f64>, y: &DVector<f64>, offset: usize, n: usize) -> f64 {
    x[offset] * y[offset] - x.rows(offset + 1, n - 1).dot(&y.rows(offset + 1, n - 1))
}

/// The Jordan square `y := x o x`, written into "lambda layout" (full-size
/// nonlinear/`l`/`q` blocks, `m` entries per PSD block rather than `m*m`).
/// The nonlinear/orthant prefix and the PSD blocks are componentwise (a
/// diagonal matrix's Jordan square is its diagonal squared), but a
/// second-order-cone block is not: `y0 = x0^2 + ||x1:||^2`, `yi = 2*x0*xi`.
pub fn ssqr(y: &mut DVector<f64>, x: &DVector<f64>, cone: &Cone, mnl: usize) {
    let nl = mnl + cone.l;
    for i in 0..nl {
        y[i] = x[i] * x[i];
    }

    let mut ind = nl;
    for &m in &cone.q {
        let x0 = x[ind];
        let tail_sq = x.rows(ind + 1, m - 1).dot(&x.rows(ind + 1, m - 1));
        y[ind] = x0 * x0 + tail_sq;
        for i in 1..m {
            y[ind + i] = 2.0 * x0 * x[ind + i];
        }
        ind += m;
    }

    for &m in &cone.s {
        for i in 0..m {
            y[ind + i] = x[ind + i] * x[ind + i];
        }
        ind += m;
    }
}

/// The Jordan product `x := y o x`, in place.
///
/// If `diag` is true, the `s` part of `y` is diagonal and supplied in
/// "lambda" layout: only `m` entries per PSD block (the eigenvalues),
/// rather than the full `m*m` matrix. This is the layout the driver uses
/// for `lambda`, so the centering/corrector steps can call `sprod` against
/// `lambda` directly without materializing a dense diagonal matrix.
pub fn sprod(x: &mut DVector<f64>, y: &DVector<f64>, cone: &Cone, mnl: usize, diag: bool) {
    // orthant + nonlinear blocks: xk := yk .* xk
    let nl = mnl + cone.l;
    for i in 0..nl {
        x[i] *= y[i];
    }

    // second-order cone blocks
    let mut ind = nl;
    for &m in &cone.q {
        let dd = x.rows(ind, m).dot(&y.rows(ind, m));
        let y0 = y[ind];
        let x0 = x[ind];
        for i in 1..m {
            x[ind + i] = y0 * x[ind + i] + x0 * y[ind + i];
        }
        x[ind] = dd;
        ind += m;
    }

    // PSD blocks
    if !diag {
        let mut iy = ind;
        for &m in &cone.s {
            if m > 0 {
                let xk = DMatrix::from_fn(m, m, |r, c| x[ind + c * m + r]);
                let yk = DMatrix::from_fn(m, m, |r, c| y[iy + c * m + r]);
                let out = 0.5 * (&yk * &xk + &xk * &yk);
                for c in 0..m {
                    for r in 0..m {
                        x[ind + c * m + r] = out[(r, c)];
                    }
                }
            }
            ind += m * m;
            iy += m * m;
        }
    } else {
        let mut iy = ind;
        for &m in &cone.s {
            for j in 0..m {
                for k in j..m {
                    let u = 0.5 * (y[iy + k] + y[iy + j]);
                    x[ind + j * m + k] *= u;
                    if k != j {
                        x[ind + k * m + j] *= u;
                    }
                }
            }
            ind += m * m;
            iy += m;
        }
    }
}

/// The inverse product `x := y o\ x`, assuming the `s` part of `y` is
/// diagonal and supplied in "lambda" layout (`m` entries per PSD block).
pub fn sinv(x: &mut DVector<f64>, y: &DVector<f64>, cone: &Cone, mnl: usize) {
    // orthant + nonlinear blocks: xk := xk ./ yk
    let nl = mnl + cone.l;
    for i in 0..nl {
        x[i] /= y[i];
    }

    // second-order cone blocks:
    //   yk o\ xk = 1/a^2 * [ l0  -l1' ; -l1  (a*I + l1*l1')/l0 ] * xk
    // where yk = (l0, l1), a = l0^2 - l1'*l1.
    let mut ind = nl;
    for &m in &cone.q {
        let aa = jnrm2(y, ind, m).powi(2);
        let cc = x[ind];
        let dd = x.rows(ind + 1, m - 1).dot(&y.rows(ind + 1, m - 1));
        let y0 = y[ind];
        x[ind] = cc * y0 - dd;
        for i in 1..m {
            x[ind + i] = (aa / y0) * x[ind + i] + (dd / y0 - cc) * y[ind + i];
        }
        for i in 0..m {
            x[ind + i] /= aa;
        }
        ind += m;
    }

    // PSD blocks: yk o\ xk = xk ./ gamma, gamma_ij = 0.5*(yk_i + yk_j)
    let mut iy = ind;
    for &m in &cone.s {
        for j in 0..m {
            for k in j..m {
                let g = 0.5 * (y[iy + k] + y[iy + j]);
                x[ind + j * m + k] /= g;
                if k != j {
                    x[ind + k * m + j] /= g;
                }
            }
        }
        ind += m * m;
        iy += m;
    }
}

/// `min { t : x + t*e >= 0 }`, `e` being the Jordan identity of each
/// block. When `sigma` is given, the PSD blocks' eigenvalues are written
/// into it (ascending) and their eigenvectors overwrite the corresponding
/// block of `x`.
pub fn max_step(x: &mut DVector<f64>, cone: &Cone, mnl: usize, mut sigma: Option<&mut DVector<f64>>) -> f64 {
    let mut t = f64::NEG_INFINITY;
    let mut have = false;

    let ind0 = mnl + cone.l;
    if ind0 > 0 {
        let m = x.rows(0, ind0).min();
        t = t.max(-m);
        have = true;
    }

    let mut ind = ind0;
    for &m in &cone.q {
        if m > 0 {
            let a = x.rows(ind + 1, m - 1).norm();
            t = t.max(a - x[ind]);
            have = true;
        }
        ind += m;
    }

    let mut ind2 = 0usize;
    for &m in &cone.s {
        if m == 0 {
            continue;
        }
        let blk = DMatrix::from_fn(m, m, |r, c| x[ind + c * m + r]);
        let eig = SymmetricEigen::new(blk);
        let mut pairs: Vec<(f64, usize)> = eig.eigenvalues.iter().copied().enumerate().map(|(i, v)| (v, i)).collect();
        pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        t = t.max(-pairs[0].0);
        have = true;
        if let Some(sig) = sigma.as_deref_mut() {
            for (k, &(val, _)) in pairs.iter().enumerate() {
                sig[ind2 + k] = val;
            }
            for (k, &(_, orig)) in pairs.iter().enumerate() {
                for r in 0..m {
                    x[ind + k * m + r] = eig.eigenvectors[(r, orig)];
                }
            }
        }
        ind += m * m;
        ind2 += m;
    }

    if have {
        t
    } else {
        0.0
    }
}

/// Copy `x` (unpacked `s` blocks) into packed storage: off-diagonal
/// entries of each PSD block are scaled by `sqrt(2)` and only the lower
/// triangle is retained, preserving [`sdot`].
pub fn pack(x: &DVector<f64>, cone: &Cone, mnl: usize) -> DVector<f64> {
    let nlq = mnl + cone.lq_len();
    let mut y = DVector::zeros(cone.packed_len(mnl));
    y.rows_mut(0, nlq).copy_from(&x.rows(0, nlq));
    let mut iu = nlq;
    let mut ip = nlq;
    for &m in &cone.s {
        for k in 0..m {
            y[ip] = x[iu + k * (m + 1)];
            for off in 1..(m - k) {
                y[ip + off] = x[iu + k * (m + 1) + off] * std::f64::consts::SQRT_2;
            }
            ip += m - k;
        }
        iu += m * m;
    }
    y
}

/// In-place variant of [`pack`]: packs the `s` blocks of `x` into the
/// leading `cone.packed_len(mnl)` entries of the same buffer. The caller
/// must treat only that prefix as meaningful afterwards.
pub fn pack2(x: &mut DVector<f64>, cone: &Cone, mnl: usize) {
    if cone.s.is_empty() {
        return;
    }
    let nlq = mnl + cone.lq_len();
    let mut iu = nlq;
    let mut ip = nlq;
    for &m in &cone.s {
        for k in 0..m {
            let diag = x[iu + k * (m + 1)];
            let mut tail = Vec::with_capacity(m - k - 1);
            for off in 1..(m - k) {
                tail.push(x[iu + k * (m + 1) + off] * std::f64::consts::SQRT_2);
            }
            x[ip] = diag;
            for (off, v) in tail.into_iter().enumerate() {
                x[ip + 1 + off] = v;
            }
            ip += m - k;
        }
        iu += m * m;
    }
}

/// Inverse of [`pack`]: expand packed storage back to unpacked `s` blocks.
pub fn unpack(xp: &DVector<f64>, cone: &Cone, mnl: usize) -> DVector<f64> {
    let nlq = mnl + cone.lq_len();
    let mut y = DVector::zeros(cone.len(mnl));
    y.rows_mut(0, nlq).copy_from(&xp.rows(0, nlq));
    let mut ip = nlq;
    let mut iu = nlq;
    for &m in &cone.s {
        for k in 0..m {
            y[iu + k * (m + 1)] = xp[ip];
            for off in 1..(m - k) {
                y[iu + k * (m + 1) + off] = xp[ip + off] / std::f64::consts::SQRT_2;
            }
            ip += m - k;
        }
        iu += m * m;
    }
    symm(&mut y, cone, mnl);
    y
}

/// Zero the strict upper triangle of each PSD block (used by transposed
/// [`sgemv`] so off-diagonal entries of a symmetric operator aren't
/// counted twice).
pub fn trisc(x: &mut DVector<f64>, cone: &Cone, mnl: usize) {
    let mut ind = mnl + cone.lq_len();
    for &m in &cone.s {
        for j in 0..m {
            for i in 0..j {
                x[ind + j * m + i] = 0.0;
            }
        }
        for j in 0..m {
            x[ind + j * m + j] *= 0.5;
        }
        ind += m * m;
    }
}

/// Inverse of [`trisc`]: restores the block to a symmetric matrix,
/// doubling the diagonal back and mirroring the lower triangle.
pub fn triusc(x: &mut DVector<f64>, cone: &Cone, mnl: usize) {
    let mut ind = mnl + cone.lq_len();
    for &m in &cone.s {
        for j in 0..m {
            x[ind + j * m + j] *= 2.0;
        }
        symm_block(x, ind, m);
        ind += m * m;
    }
}

fn symm_block(x: &mut DVector<f64>, ind: usize, m: usize) {
    for j in 0..m {
        for i in (j + 1)..m {
            let v = x[ind + j * m + i];
            x[ind + i * m + j] = v;
        }
    }
}

/// Direction of a matrix-vector operator application: `N`ormal or
/// `T`ransposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trans {
    N,
    T,
}

/// `y := alpha*A*x + beta*y` (`trans = N`) or `y := alpha*A'*x + beta*y`
/// (`trans = T`), where `A` maps `R^n` to the cone vector space `S`
/// (the `s` components stored in unpacked storage).
pub fn sgemv(
    a: &DMatrix<f64>,
    x: &DVector<f64>,
    y: &mut DVector<f64>,
    cone: &Cone,
    trans: Trans,
    alpha: f64,
    beta: f64,
) {
    match trans {
        Trans::N => {
            *y = alpha * (a * x) + beta * &*y;
        }
        Trans::T => {
            let mut xs = x.clone();
            if alpha != 0.0 {
                trisc(&mut xs, cone, 0);
            }
            *y = alpha * (a.transpose() * &xs) + beta * &*y;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cone() -> Cone {
        Cone::new(2, vec![3], vec![2]).unwrap()
    }

    fn interior_point(cone: &Cone, mnl: usize) -> DVector<f64> {
        let mut v = DVector::zeros(cone.len(mnl));
        for i in 0..(mnl + cone.l) {
            v[i] = 1.0 + i as f64 * 0.1;
        }
        let mut ind = mnl + cone.l;
        for &m in &cone.q {
            v[ind] = 3.0;
            for i in 1..m {
                v[ind + i] = 0.2 * (i as f64);
            }
            ind += m;
        }
        for &m in &cone.s {
            for i in 0..m {
                v[ind + i * m + i] = 2.0 + i as f64;
            }
            ind += m * m;
        }
        v
    }

    #[test]
    fn sdot_symmetric_bilinear_and_nonneg() {
        let cone = test_cone();
        let x = interior_point(&cone, 1);
        let y = interior_point(&cone, 1);
        assert!((sdot(&x, &y, &cone, 1) - sdot(&y, &x, &cone, 1)).abs() < 1e-12);
        assert!(sdot(&x, &x, &cone, 1) > 0.0);
        let zero = DVector::zeros(cone.len(1));
        assert_eq!(sdot(&zero, &zero, &cone, 1), 0.0);
    }

    #[test]
    fn sprod_sinv_are_mutual_inverses() {
        let cone = test_cone();
        let mnl = 1;
        let x = interior_point(&cone, mnl);
        let y = interior_point(&cone, mnl);
        // lambda-layout representation of y's diagonal s-part
        let mut y_lambda = DVector::zeros(mnl + cone.l + cone.q.iter().sum::<usize>() + cone.s.iter().sum::<usize>());
        let nl = mnl + cone.lq_len();
        y_lambda.rows_mut(0, nl).copy_from(&y.rows(0, nl));
        let mut ind = nl;
        let mut ind2 = nl;
        for &m in &cone.s {
            for i in 0..m {
                y_lambda[ind2 + i] = y[ind + i * m + i];
            }
            ind += m * m;
            ind2 += m;
        }

        let mut z = x.clone();
        sinv(&mut z, &y_lambda, &cone, mnl);
        sprod(&mut z, &y_lambda, &cone, mnl, true);
        for i in 0..x.len() {
            assert!((z[i] - x[i]).abs() < 1e-8, "index {i}: {} vs {}", z[i], x[i]);
        }
    }

    #[test]
    fn pack_unpack_round_trip_and_preserves_sdot() {
        let cone = test_cone();
        let mnl = 2;
        let x = interior_point(&cone, mnl);
        let y = interior_point(&cone, mnl);
        let xp = pack(&x, &cone, mnl);
        let yp = pack(&y, &cone, mnl);
        let back = unpack(&xp, &cone, mnl);
        for i in 0..x.len() {
            assert!((back[i] - x[i]).abs() < 1e-10);
        }
        assert!((sdot(&x, &y, &cone, mnl) - xp.dot(&yp)).abs() < 1e-8);
    }

    #[test]
    fn pack2_matches_pack() {
        let cone = test_cone();
        let mnl = 1;
        let x = interior_point(&cone, mnl);
        let expected = pack(&x, &cone, mnl);
        let mut xin = x.clone();
        pack2(&mut xin, &cone, mnl);
        for i in 0..expected.len() {
            assert!((xin[i] - expected[i]).abs() < 1e-10);
        }
    }

    #[test]
    fn max_step_matches_eigen_threshold() {
        let cone = Cone::new(0, vec![], vec![2]).unwrap();
        let mut x = DVector::from_vec(vec![1.0, 0.5, 0.5, 1.0]);
        let mut sigma = DVector::zeros(2);
        let t = max_step(&mut x, &cone, 0, Some(&mut sigma));
        // eigenvalues of [[1,0.5],[0.5,1]] are 0.5 and 1.5
        assert!((sigma[0] - 0.5).abs() < 1e-8);
        assert!((sigma[1] - 1.5).abs() < 1e-8);
        assert!((t - (-0.5)).abs() < 1e-8);
    }

    #[test]
    fn jnrm2_matches_definition_away_from_boundary() {
        let x = DVector::from_vec(vec![5.0, 3.0, 0.0]);
        let a = jnrm2(&x, 0, 3);
        assert!((a - 4.0).abs() < 1e-10);
    }

    #[test]
    fn ssqr_matches_jordan_square_on_soc_and_componentwise_elsewhere() {
        // lambda layout: mnl=1, l=2, one q block of size 3, one s block of
        // size 2 (eigenvalues only, 2 entries).
        let cone = Cone::new(2, vec![3], vec![2]).unwrap();
        let mnl = 1;
        let x = DVector::from_vec(vec![2.0, 3.0, 4.0, 5.0, 1.0, 2.0, 6.0, 7.0]);
        let mut y = DVector::zeros(x.len());
        ssqr(&mut y, &x, &cone, mnl);

        // nonlinear + orthant: componentwise square.
        assert!((y[0] - 4.0).abs() < 1e-12);
        assert!((y[1] - 9.0).abs() < 1e-12);
        assert!((y[2] - 16.0).abs() < 1e-12);

        // q block (x[3..6] = [5, 1, 2]): Jordan square.
        assert!((y[3] - (25.0 + 1.0 + 4.0)).abs() < 1e-12);
        assert!((y[4] - 2.0 * 5.0 * 1.0).abs() < 1e-12);
        assert!((y[5] - 2.0 * 5.0 * 2.0).abs() < 1e-12);

        // s block (x[6..8] = [6, 7]): componentwise square.
        assert!((y[6] - 36.0).abs() < 1e-12);
        assert!((y[7] - 49.0).abs() < 1e-12);
    }
}
