//! The product-cone descriptor `S = R^l x Q^{q0} x ... x P^{s0} x ...`
//! and the block layout shared by every cone vector in this crate.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SolverError};

/// Dimensions of a product cone: the nonnegative orthant, a list of
/// second-order (Lorentz) cones, and a list of PSD cone orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Cone {
    /// Dimension of the nonnegative orthant block.
    pub l: usize,
    /// Dimension of each second-order cone block, `q[k] >= 1`.
    pub q: Vec<usize>,
    /// Order of each PSD cone block; occupies `s[k]^2` scalars unpacked.
    pub s: Vec<usize>,
}

impl Cone {
    pub fn new(l: usize, q: Vec<usize>, s: Vec<usize>) -> Result<Self> {
        if q.iter().any(|&m| m < 1) {
            return Err(SolverError::ArgumentError(
                "second-order cone dimensions must be >= 1".into(),
            ));
        }
        Ok(Cone { l, q, s })
    }

    /// Total length of the `l` and `q` blocks.
    pub fn lq_len(&self) -> usize {
        self.l + self.q.iter().sum::<usize>()
    }

    /// Total unpacked length of the `s` blocks (each stored `s_k * s_k`).
    pub fn s_len(&self) -> usize {
        self.s.iter().map(|&m| m * m).sum()
    }

    /// Total packed length of the `s` blocks (lower triangle only).
    pub fn packed_s_len(&self) -> usize {
        self.s.iter().map(|&m| m * (m + 1) / 2).sum()
    }

    /// Length of a cone vector in unpacked storage, including `mnl`
    /// leading nonlinear-constraint slack coordinates.
    pub fn len(&self, mnl: usize) -> usize {
        mnl + self.lq_len() + self.s_len()
    }

    /// Length of a cone vector in packed storage, including `mnl`.
    pub fn packed_len(&self, mnl: usize) -> usize {
        mnl + self.lq_len() + self.packed_s_len()
    }

    /// Degree of the barrier / number of Jordan-algebra blocks, used as
    /// the denominator of `mu = gap / degree` in the CPL driver.
    pub fn barrier_degree(&self, mnl: usize) -> usize {
        mnl + self.l + self.q.len() + self.s.iter().sum::<usize>()
    }

    pub fn max_s(&self) -> usize {
        self.s.iter().copied().max().unwrap_or(0)
    }

    /// Length of the "lambda layout": the nonlinear/`l`/`q` blocks kept
    /// at full size, the `s` blocks reduced to their `s_k` eigenvalues.
    /// This is the shape of the scaled point `lambda` and of `sigs`/
    /// `sigz`, as distinct from `len` (full unpacked storage) and
    /// `barrier_degree` (one Jordan block per `q` cone, not `s_k`).
    pub fn lambda_len(&self, mnl: usize) -> usize {
        mnl + self.lq_len() + self.s.iter().sum::<usize>()
    }
}
