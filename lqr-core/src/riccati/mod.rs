//! Proximal Riccati solver.
//!
//! A [`ProximalRiccatiSolver`] borrows a problem and produces a
//! [`Workspace`] through the backward pass. The workspace can then be
//! rolled out for any number of parameter values.
#![allow(missing_docs)]

pub mod backward;
pub mod diagnostics;
pub mod forward;
pub mod regularization;
pub mod workspace;

use std::time::Instant;

use nalgebra::DVector;
use tracing::{info, warn};

use crate::error::LqrResult;
use crate::problem::{LqrProblem, LqrSolution, RiccatiSettings, SolveInfo};
use crate::trajectory::init_trajectory;

pub use backward::backward_pass;
pub use diagnostics::DiagnosticsConfig;
pub use forward::ForwardInfo;
pub use regularization::{ProximalPolicy, RegularizationState};
pub use workspace::{DualGains, InitialGains, StageGains, ValueFunction, Workspace};

/// Handle binding a problem to a diagnostics configuration.
#[derive(Debug, Clone)]
pub struct ProximalRiccatiSolver<'a> {
    problem: &'a LqrProblem,
    diagnostics: DiagnosticsConfig,
}

impl<'a> ProximalRiccatiSolver<'a> {
    /// Diagnostics are taken from the environment (`LQR_DIAGNOSTICS`).
    pub fn new(problem: &'a LqrProblem) -> Self {
        Self {
            problem,
            diagnostics: DiagnosticsConfig::from_env(),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: DiagnosticsConfig) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn problem(&self) -> &'a LqrProblem {
        self.problem
    }

    /// Backward pass with fixed proximal parameters.
    pub fn backward(&self, mu: f64, mu_eq: f64) -> LqrResult<Workspace<'a>> {
        backward_pass(self.problem, mu, mu_eq, &self.diagnostics)
    }

    /// Backward pass that grows `mu` after a factorization failure, as
    /// allowed by `policy`.
    pub fn backward_with_policy(
        &self,
        mu: f64,
        mu_eq: f64,
        policy: &ProximalPolicy,
    ) -> LqrResult<(Workspace<'a>, RegularizationState)> {
        let mut st = policy.init_state(mu, mu_eq);
        loop {
            match backward_pass(self.problem, st.mu, st.mu_eq, &self.diagnostics) {
                Ok(ws) => return Ok((ws, st)),
                Err(err) if err.is_recoverable() => {
                    let prev = st.mu;
                    if !policy.bump(&mut st) {
                        return Err(err);
                    }
                    warn!(mu = prev, next_mu = st.mu, error = %err, "backward pass failed, growing mu");
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Backward pass followed by a single forward rollout at `theta`.
pub fn solve_riccati(
    problem: &LqrProblem,
    settings: &RiccatiSettings,
    theta: Option<&DVector<f64>>,
) -> LqrResult<LqrSolution> {
    let theta = problem.resolve_theta(theta)?;
    let mut solver = ProximalRiccatiSolver::new(problem);
    if settings.verbose {
        solver = solver.with_diagnostics(DiagnosticsConfig::verbose());
    }

    let start = Instant::now();
    let (ws, st) = solver.backward_with_policy(settings.mu, settings.mu_eq, &settings.policy)?;
    let backward_time_us = start.elapsed().as_micros() as u64;

    let start = Instant::now();
    let mut trajectory = init_trajectory(problem);
    let residuals = ws.forward(&mut trajectory, Some(&theta))?;
    let forward_time_us = start.elapsed().as_micros() as u64;

    let optimal_value = ws.optimal_value(Some(&theta))?;

    info!(
        horizon = problem.horizon(),
        mu = st.mu,
        bumps = st.bumps,
        backward_us = backward_time_us,
        forward_us = forward_time_us,
        "riccati solve"
    );

    Ok(LqrSolution {
        trajectory,
        theta,
        info: SolveInfo {
            mu: st.mu,
            mu_eq: st.mu_eq,
            mu_bumps: st.bumps,
            backward_time_us,
            forward_time_us,
            residuals,
            optimal_value,
        },
    })
}
