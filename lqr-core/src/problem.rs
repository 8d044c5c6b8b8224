//! Problem data structures, validation and solver settings.
//!
//! This module defines the knot-sequence representation of a
//! linear-quadratic problem together with the settings and result types of
//! the top-level [`solve`](crate::solve) entry point.

use std::fmt;

use nalgebra::{DMatrix, DVector};

use crate::error::{LqrError, LqrResult};
use crate::knot::LqrKnot;
use crate::riccati::forward::ForwardInfo;
use crate::riccati::regularization::ProximalPolicy;
use crate::trajectory::Trajectory;

/// Linear-quadratic problem over a horizon of `T` transitions.
///
/// ```text
/// minimize    Σₜ ℓₜ(xₜ, uₜ; θ)
/// subject to  G0 x₀ + G0th θ + g0 = 0
///             Aₜ xₜ + Bₜ uₜ + fₜ + Eₜ xₜ₊₁ = 0,   t = 0..T-1
///             Cₜ xₜ + Dₜ uₜ + Γ_c,ₜ θ + dₜ = 0,   t = 0..T
/// ```
///
/// The knots are stored in order; the last one is terminal and carries no
/// control. With `nc0 = 0` the initial state is free and optimized.
#[derive(Debug, Clone)]
#[allow(non_snake_case)] // G0 and G0th are standard notation
pub struct LqrProblem {
    stages: Vec<LqrKnot>,

    /// Initial-condition Jacobian (nc0 × nx₀).
    pub G0: DMatrix<f64>,

    /// Initial-condition offset (length nc0).
    pub g0: DVector<f64>,

    /// Initial-condition parameter coupling (nc0 × nth).
    pub G0th: DMatrix<f64>,

    nth: usize,
    parameterized: bool,
}

impl LqrProblem {
    /// Build a problem from its knots and the number of initial-condition rows.
    ///
    /// The chain is validated immediately; mismatched dimensions are a
    /// [`LqrError::Dimension`].
    pub fn new(stages: Vec<LqrKnot>, nc0: usize) -> LqrResult<Self> {
        let Some(first) = stages.first() else {
            return Err(LqrError::dim(0, "problem needs at least one knot"));
        };
        let nx0 = first.nx;
        let problem = Self {
            stages,
            G0: DMatrix::zeros(nc0, nx0),
            g0: DVector::zeros(nc0),
            G0th: DMatrix::zeros(nc0, 0),
            nth: 0,
            parameterized: false,
        };
        problem.validate()?;
        Ok(problem)
    }

    /// Number of transitions `T`.
    pub fn horizon(&self) -> usize {
        self.stages.len() - 1
    }

    /// Number of knots, `T + 1`.
    pub fn num_stages(&self) -> usize {
        self.stages.len()
    }

    /// Parameter dimension (0 when unparameterized).
    pub fn nth(&self) -> usize {
        self.nth
    }

    /// Number of initial-condition rows.
    pub fn nc0(&self) -> usize {
        self.g0.len()
    }

    pub fn is_parameterized(&self) -> bool {
        self.parameterized
    }

    /// Whether any equality row (initial or stage) is present.
    pub fn is_constrained(&self) -> bool {
        self.nc0() > 0 || self.stages.iter().any(|k| k.nc > 0)
    }

    pub fn stages(&self) -> &[LqrKnot] {
        &self.stages
    }

    /// Mutable access to the knots. The chain is re-validated on the next solve.
    pub fn stages_mut(&mut self) -> &mut [LqrKnot] {
        &mut self.stages
    }

    pub fn stage(&self, t: usize) -> &LqrKnot {
        &self.stages[t]
    }

    pub fn stage_mut(&mut self, t: usize) -> &mut LqrKnot {
        &mut self.stages[t]
    }

    /// Constrain the initial state to `x0` (`G0 = I`, `g0 = -x0`).
    pub fn fix_initial_state(&mut self, x0: &DVector<f64>) -> LqrResult<()> {
        let nx0 = self.stages[0].nx;
        if x0.len() != nx0 {
            return Err(LqrError::dim(
                0,
                format!("initial state has length {}, expected {}", x0.len(), nx0),
            ));
        }
        self.G0 = DMatrix::identity(nx0, nx0);
        self.g0 = -x0.clone();
        self.G0th = DMatrix::zeros(nx0, self.nth);
        Ok(())
    }

    /// Allocate an `nth`-dimensional parameter on every knot and on the
    /// initial condition. All parameter blocks start at zero.
    ///
    /// May be called at most once per problem.
    pub fn add_parameterization(&mut self, nth: usize) -> LqrResult<()> {
        if self.parameterized {
            return Err(LqrError::Parameterization(format!(
                "problem is already parameterized (nth = {})",
                self.nth
            )));
        }
        if nth == 0 {
            return Err(LqrError::Parameterization(
                "parameter dimension must be positive".to_string(),
            ));
        }
        for knot in &mut self.stages {
            knot.add_parameterization(nth);
        }
        self.G0th = DMatrix::zeros(self.nc0(), nth);
        self.nth = nth;
        self.parameterized = true;
        Ok(())
    }

    /// Validate knot shapes and the dimension chain.
    pub fn validate(&self) -> LqrResult<()> {
        let n = self.stages.len();
        if n == 0 {
            return Err(LqrError::dim(0, "problem needs at least one knot"));
        }

        for (t, knot) in self.stages.iter().enumerate() {
            let terminal = t + 1 == n;
            if knot.nth != self.nth {
                return Err(LqrError::dim(
                    t,
                    format!("knot has nth = {}, problem has nth = {}", knot.nth, self.nth),
                ));
            }
            knot.validate(t, terminal)?;
            if terminal {
                if knot.nu != 0 {
                    return Err(LqrError::dim(
                        t,
                        format!("terminal knot has nu = {}, expected 0", knot.nu),
                    ));
                }
            } else {
                let next = &self.stages[t + 1];
                if knot.nx2 != next.nx {
                    return Err(LqrError::dim(
                        t,
                        format!(
                            "transition lands in dimension {}, next knot has nx = {}",
                            knot.nx2, next.nx
                        ),
                    ));
                }
            }
        }

        let nc0 = self.nc0();
        let nx0 = self.stages[0].nx;
        if self.G0.shape() != (nc0, nx0) {
            return Err(LqrError::dim(
                0,
                format!(
                    "G0 has shape {}×{}, expected {}×{}",
                    self.G0.nrows(),
                    self.G0.ncols(),
                    nc0,
                    nx0
                ),
            ));
        }
        if self.G0th.shape() != (nc0, self.nth) {
            return Err(LqrError::dim(
                0,
                format!(
                    "G0th has shape {}×{}, expected {}×{}",
                    self.G0th.nrows(),
                    self.G0th.ncols(),
                    nc0,
                    self.nth
                ),
            ));
        }
        Ok(())
    }

    /// Resolve an optional parameter value; `None` means θ = 0.
    pub fn resolve_theta(&self, theta: Option<&DVector<f64>>) -> LqrResult<DVector<f64>> {
        match theta {
            None => Ok(DVector::zeros(self.nth)),
            Some(th) if th.len() == self.nth => Ok(th.clone()),
            Some(th) => Err(LqrError::Parameterization(format!(
                "parameter has length {}, expected {}",
                th.len(),
                self.nth
            ))),
        }
    }

    /// Initial-condition residual `G0 x₀ + G0th θ + g0`.
    pub fn initial_constraint_value(&self, x0: &DVector<f64>, theta: &DVector<f64>) -> DVector<f64> {
        let mut c = &self.G0 * x0 + &self.g0;
        if self.nth > 0 {
            c += &self.G0th * theta;
        }
        c
    }

    /// Raw objective `Σₜ ℓₜ(xₜ, uₜ; θ)` of a trajectory.
    pub fn objective(&self, traj: &Trajectory, theta: Option<&DVector<f64>>) -> LqrResult<f64> {
        traj.check_shape(self)?;
        let theta = self.resolve_theta(theta)?;
        Ok(self
            .stages
            .iter()
            .enumerate()
            .map(|(t, knot)| knot.cost(&traj.xs[t], &traj.us[t], &theta))
            .sum())
    }

    /// Objective minimized exactly by the regularized backward pass:
    ///
    /// ```text
    /// Σ ℓₜ + (μ/2) Σ |uₜ|² + (μ/2) |x_T|² + Σ |cₜ|² / (2μ₂) + |c_init|² / (2μ₂)
    /// ```
    ///
    /// where `cₜ` are the stage-constraint residuals and `c_init` the
    /// initial-condition residual.
    pub fn proximal_objective(
        &self,
        traj: &Trajectory,
        theta: Option<&DVector<f64>>,
        mu: f64,
        mu_eq: f64,
    ) -> LqrResult<f64> {
        let mut val = self.objective(traj, theta)?;
        let theta = self.resolve_theta(theta)?;

        let horizon = self.horizon();
        val += 0.5 * mu * traj.xs[horizon].norm_squared();
        val += 0.5 * mu * traj.us[..horizon].iter().map(|u| u.norm_squared()).sum::<f64>();

        if self.is_constrained() {
            if mu_eq <= 0.0 {
                return Err(LqrError::Regularization(format!(
                    "mu_eq must be positive for a constrained problem, got {mu_eq}"
                )));
            }
            let mut viol = self.initial_constraint_value(&traj.xs[0], &theta).norm_squared();
            for (t, knot) in self.stages.iter().enumerate() {
                if knot.nc > 0 {
                    viol += knot
                        .constraint_value(&traj.xs[t], &traj.us[t], &theta)
                        .norm_squared();
                }
            }
            val += 0.5 * viol / mu_eq;
        }
        Ok(val)
    }
}

impl fmt::Display for LqrProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LqrProblem {{ horizon: {}, nth: {}, nc0: {} }}",
            self.horizon(),
            self.nth,
            self.nc0()
        )
    }
}

/// Solver settings for [`solve`](crate::solve).
#[derive(Debug, Clone)]
pub struct RiccatiSettings {
    /// Primal proximal parameter μ (control and terminal-state damping).
    pub mu: f64,

    /// Dual proximal parameter μ₂ (equality-multiplier damping).
    pub mu_eq: f64,

    /// Emit per-stage diagnostics through `tracing`.
    pub verbose: bool,

    /// Growth policy applied when a damped block fails to factorize.
    pub policy: ProximalPolicy,
}

impl Default for RiccatiSettings {
    fn default() -> Self {
        // Environment overrides, e.g. LQR_MU=1e-6 to damp harder.
        let env_f64 = |key: &str, default: f64| {
            std::env::var(key)
                .ok()
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|v| v.is_finite() && *v >= 0.0)
                .unwrap_or(default)
        };

        Self {
            mu: env_f64("LQR_MU", 1e-8),
            mu_eq: env_f64("LQR_MU_EQ", 1e-8),
            verbose: std::env::var("LQR_VERBOSE")
                .map(|v| v != "0" && v.to_lowercase() != "false")
                .unwrap_or(false),
            policy: ProximalPolicy::default(),
        }
    }
}

/// Detailed solve information.
#[derive(Debug, Clone)]
pub struct SolveInfo {
    /// μ actually used (after growth).
    pub mu: f64,

    /// μ₂ used.
    pub mu_eq: f64,

    /// Number of times μ was grown after a factorization failure.
    pub mu_bumps: usize,

    /// Backward pass wall time (microseconds).
    pub backward_time_us: u64,

    /// Forward pass wall time (microseconds).
    pub forward_time_us: u64,

    /// Residuals of the returned trajectory.
    pub residuals: ForwardInfo,

    /// Optimal value of the proximal objective at the returned θ.
    pub optimal_value: f64,
}

/// Result of [`solve`](crate::solve).
#[derive(Debug, Clone)]
pub struct LqrSolution {
    pub trajectory: Trajectory,

    /// Parameter value the trajectory was rolled out with.
    pub theta: DVector<f64>,

    pub info: SolveInfo,
}
