//! Dense helpers shared by the Riccati passes.
//!
//! Every Hessian-like block is factorized with a plain Cholesky: the
//! proximal terms are responsible for positive definiteness, so a failed
//! factorization is reported rather than patched up.

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};

use crate::error::{LqrError, LqrResult};

/// Cholesky factor of a symmetric positive-definite block.
pub type SpdFactor = Cholesky<f64, Dyn>;

/// Factorize `m`, tagging a failure with the stage and block name.
pub fn factor_spd(m: DMatrix<f64>, stage: usize, block: &'static str) -> LqrResult<SpdFactor> {
    if m.iter().any(|v| !v.is_finite()) {
        return Err(LqrError::Factorization { stage, block });
    }
    let chol = Cholesky::new(m).ok_or(LqrError::Factorization { stage, block })?;
    // A zero pivot slips through as an infinite or NaN entry of L.
    if chol.l_dirty().diagonal().iter().any(|v| !(v.is_finite() && *v > 0.0)) {
        return Err(LqrError::Factorization { stage, block });
    }
    Ok(chol)
}

/// Replace `m` by `(m + mᵀ) / 2`.
pub fn symmetrize(m: &mut DMatrix<f64>) {
    let n = m.nrows();
    debug_assert_eq!(n, m.ncols());
    for j in 0..n {
        for i in (j + 1)..n {
            let avg = 0.5 * (m[(i, j)] + m[(j, i)]);
            m[(i, j)] = avg;
            m[(j, i)] = avg;
        }
    }
}

/// Add `v` to the diagonal of a square matrix.
pub fn add_diag(m: &mut DMatrix<f64>, v: f64) {
    if v != 0.0 {
        for i in 0..m.nrows().min(m.ncols()) {
            m[(i, i)] += v;
        }
    }
}

#[inline]
pub fn inf_norm(v: &DVector<f64>) -> f64 {
    v.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()))
}

/// Largest asymmetry `|m_ij - m_ji|` of a square matrix.
pub fn asymmetry(m: &DMatrix<f64>) -> f64 {
    let n = m.nrows();
    let mut worst = 0.0_f64;
    for j in 0..n {
        for i in (j + 1)..n {
            worst = worst.max((m[(i, j)] - m[(j, i)]).abs());
        }
    }
    worst
}
