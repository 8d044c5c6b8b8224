//! Proximal parameters and their growth policy.
//!
//! `μ` damps the control blocks (and the terminal state), `μ₂` damps the
//! equality multipliers. A factorization failure is fatal for one backward
//! pass; the policy below lets the caller retry with a larger `μ`.

use crate::error::{LqrError, LqrResult};
use crate::problem::LqrProblem;

/// Smallest μ a bump can produce when starting from zero.
pub const MU_BUMP_FLOOR: f64 = 1e-10;

#[derive(Debug, Clone)]
pub struct ProximalPolicy {
    /// Multiplicative growth of μ per bump.
    pub mu_growth: f64,
    /// μ is never grown beyond this value.
    pub mu_max: f64,
    /// Maximum number of bumps per solve.
    pub max_bumps: usize,
}

impl Default for ProximalPolicy {
    fn default() -> Self {
        Self {
            mu_growth: 10.0,
            mu_max: 1e-2,
            max_bumps: 8,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RegularizationState {
    pub mu: f64,
    pub mu_eq: f64,
    pub bumps: usize,
}

impl ProximalPolicy {
    pub fn init_state(&self, mu: f64, mu_eq: f64) -> RegularizationState {
        RegularizationState {
            mu,
            mu_eq,
            bumps: 0,
        }
    }

    /// Grow μ in place. Returns `false` when the budget or the cap is exhausted.
    pub fn bump(&self, st: &mut RegularizationState) -> bool {
        if st.bumps >= self.max_bumps || st.mu >= self.mu_max {
            return false;
        }
        let next = (st.mu * self.mu_growth).max(MU_BUMP_FLOOR).min(self.mu_max);
        if next <= st.mu {
            return false;
        }
        st.mu = next;
        st.bumps += 1;
        true
    }
}

/// Reject proximal parameters the backward pass cannot use.
pub fn check_regularization(problem: &LqrProblem, mu: f64, mu_eq: f64) -> LqrResult<()> {
    if !mu.is_finite() || mu < 0.0 {
        return Err(LqrError::Regularization(format!(
            "mu must be finite and nonnegative, got {mu}"
        )));
    }
    if !mu_eq.is_finite() || mu_eq < 0.0 {
        return Err(LqrError::Regularization(format!(
            "mu_eq must be finite and nonnegative, got {mu_eq}"
        )));
    }
    if mu_eq == 0.0 && problem.is_constrained() {
        return Err(LqrError::Regularization(
            "mu_eq must be positive when equality rows are present".to_string(),
        ));
    }
    Ok(())
}
