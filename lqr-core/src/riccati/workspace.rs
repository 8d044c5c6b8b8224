//! Output of the backward pass: gains, value functions and parameter
//! sensitivities.

use nalgebra::{DMatrix, DVector};

use crate::error::{LqrError, LqrResult};
use crate::problem::LqrProblem;

/// Quadratic value function of one knot:
///
/// ```text
/// V(x; θ) = ½ xᵀPx + xᵀV_xθ θ + pᵀx + ½ θᵀV_θθ θ + v_θᵀθ + c
/// ```
#[derive(Debug, Clone)]
#[allow(non_snake_case)]
pub struct ValueFunction {
    pub P: DMatrix<f64>,
    pub p: DVector<f64>,
    pub Vxt: DMatrix<f64>,
    pub Vtt: DMatrix<f64>,
    pub vt: DVector<f64>,
    pub c: f64,
}

impl ValueFunction {
    /// `∇ₓV = P x + p + V_xθ θ`.
    pub fn gradient(&self, x: &DVector<f64>, theta: &DVector<f64>) -> DVector<f64> {
        let mut g = &self.P * x + &self.p;
        if !theta.is_empty() {
            g += &self.Vxt * theta;
        }
        g
    }

    pub fn eval(&self, x: &DVector<f64>, theta: &DVector<f64>) -> f64 {
        let mut v = 0.5 * x.dot(&(&self.P * x)) + self.p.dot(x) + self.c;
        if !theta.is_empty() {
            v += x.dot(&(&self.Vxt * theta))
                + 0.5 * theta.dot(&(&self.Vtt * theta))
                + self.vt.dot(theta);
        }
        v
    }
}

/// Affine multiplier law `ν = F x + f + F_θ θ`.
#[derive(Debug, Clone)]
pub struct DualGains {
    pub fb: DMatrix<f64>,
    pub ff: DVector<f64>,
    pub fth: DMatrix<f64>,
}

impl DualGains {
    pub fn eval(&self, x: &DVector<f64>, theta: &DVector<f64>) -> DVector<f64> {
        let mut v = &self.fb * x + &self.ff;
        if !theta.is_empty() {
            v += &self.fth * theta;
        }
        v
    }
}

/// Control law `u = K x + k + L θ` of one knot, plus the multiplier law of
/// its equality rows when it has any.
#[derive(Debug, Clone)]
#[allow(non_snake_case)]
pub struct StageGains {
    pub K: DMatrix<f64>,
    pub k: DVector<f64>,
    pub L: DMatrix<f64>,
    pub dual: Option<DualGains>,
}

impl StageGains {
    pub fn control(&self, x: &DVector<f64>, theta: &DVector<f64>) -> DVector<f64> {
        let mut u = &self.K * x + &self.k;
        if !theta.is_empty() {
            u += &self.L * theta;
        }
        u
    }
}

/// Initial state as an affine function of θ: `x₀ = x_ff + x_fθ θ`.
#[derive(Debug, Clone)]
pub struct InitialGains {
    pub x_ff: DVector<f64>,
    pub x_fth: DMatrix<f64>,
    pub dual: Option<DualGains>,
}

/// Factorized problem, ready for any number of forward passes.
///
/// Borrows the problem it was built from; the data must not change while
/// the workspace is alive.
#[derive(Debug, Clone)]
pub struct Workspace<'a> {
    pub(crate) problem: &'a LqrProblem,
    pub(crate) mu: f64,
    pub(crate) mu_eq: f64,
    pub(crate) values: Vec<ValueFunction>,
    pub(crate) gains: Vec<StageGains>,
    pub(crate) initial: InitialGains,
    pub(crate) th_grad: DVector<f64>,
    pub(crate) th_hess: DMatrix<f64>,
    pub(crate) value_constant: f64,
}

impl<'a> Workspace<'a> {
    pub fn problem(&self) -> &'a LqrProblem {
        self.problem
    }

    pub fn mu(&self) -> f64 {
        self.mu
    }

    pub fn mu_eq(&self) -> f64 {
        self.mu_eq
    }

    /// Value function of knot `t` (including the terminal knot).
    pub fn value(&self, t: usize) -> &ValueFunction {
        &self.values[t]
    }

    /// Gains of knot `t`. The terminal knot has empty control gains.
    pub fn gains(&self, t: usize) -> &StageGains {
        &self.gains[t]
    }

    pub fn initial(&self) -> &InitialGains {
        &self.initial
    }

    /// Gradient of the optimal value `V*(θ)` at θ = 0.
    pub fn th_grad(&self) -> LqrResult<&DVector<f64>> {
        self.require_parameter()?;
        Ok(&self.th_grad)
    }

    /// Hessian of the optimal value `V*(θ)`.
    pub fn th_hess(&self) -> LqrResult<&DMatrix<f64>> {
        self.require_parameter()?;
        Ok(&self.th_hess)
    }

    /// Stationary point `θ* = -H⁻¹g` of `V*(θ)`.
    ///
    /// The Hessian may be indefinite (θ acting as a multiplier), so this
    /// uses an LU solve rather than a Cholesky.
    pub fn optimal_parameter(&self) -> LqrResult<DVector<f64>> {
        self.require_parameter()?;
        let rhs = -self.th_grad.clone();
        self.th_hess
            .clone()
            .lu()
            .solve(&rhs)
            .ok_or(LqrError::Factorization {
                stage: 0,
                block: "parameter",
            })
    }

    /// `V*(θ) = ½ θᵀHθ + gᵀθ + c`, the minimum of the proximal objective.
    pub fn optimal_value(&self, theta: Option<&DVector<f64>>) -> LqrResult<f64> {
        let theta = self.problem.resolve_theta(theta)?;
        let mut val = self.value_constant;
        if !theta.is_empty() {
            val += 0.5 * theta.dot(&(&self.th_hess * &theta)) + self.th_grad.dot(&theta);
        }
        Ok(val)
    }

    /// Optimal initial state for the given θ.
    pub fn initial_state(&self, theta: Option<&DVector<f64>>) -> LqrResult<DVector<f64>> {
        let theta = self.problem.resolve_theta(theta)?;
        let mut x0 = self.initial.x_ff.clone();
        if !theta.is_empty() {
            x0 += &self.initial.x_fth * &theta;
        }
        Ok(x0)
    }

    fn require_parameter(&self) -> LqrResult<()> {
        if self.problem.nth() == 0 {
            return Err(LqrError::Parameterization(
                "problem has no parameter; call add_parameterization first".to_string(),
            ));
        }
        Ok(())
    }
}
