//! Backward Riccati recursion with parameter sensitivities.
//!
//! Each stage eliminates the next state through `x' = Âx + B̂u + f̂`
//! (`Â = -E⁻¹A`, `B̂ = -E⁻¹B`, `f̂ = -E⁻¹f`) and the stage multipliers through
//! their damped optimality condition `ν = (Cx + Du + Γ_c θ + d) / μ₂`. What
//! remains is a dense quadratic in `u` whose Hessian
//!
//! ```text
//! Q_uu = R + B̂ᵀP'B̂ + DᵀD/μ₂ + μI
//! ```
//!
//! is factorized with a Cholesky. The θ blocks ride along and are reduced
//! into the Hessian and gradient of the optimal value `V*(θ)` at the
//! initial stage.

use nalgebra::{DMatrix, DVector};
use tracing::{debug, trace};

use crate::error::{LqrError, LqrResult};
use crate::knot::LqrKnot;
use crate::linalg::dense::{add_diag, factor_spd, symmetrize};
use crate::problem::LqrProblem;

use super::diagnostics::DiagnosticsConfig;
use super::regularization::check_regularization;
use super::workspace::{DualGains, InitialGains, StageGains, ValueFunction, Workspace};

/// Run the full backward pass.
pub fn backward_pass<'a>(
    problem: &'a LqrProblem,
    mu: f64,
    mu_eq: f64,
    diag: &DiagnosticsConfig,
) -> LqrResult<Workspace<'a>> {
    problem.validate()?;
    check_regularization(problem, mu, mu_eq)?;

    let horizon = problem.horizon();
    let nth = problem.nth();
    let inv_mu_eq = if problem.is_constrained() { 1.0 / mu_eq } else { 0.0 };

    // Filled from the terminal knot backwards, reversed at the end.
    let mut values = Vec::with_capacity(horizon + 1);
    let mut gains = Vec::with_capacity(horizon + 1);

    let (value, gain) = terminal_stage(problem.stage(horizon), mu, inv_mu_eq);
    log_stage(diag, horizon, &value, &gain);
    values.push(value);
    gains.push(gain);

    for t in (0..horizon).rev() {
        let (value, gain) = interior_stage(
            t,
            problem.stage(t),
            &values[values.len() - 1],
            mu,
            inv_mu_eq,
            nth,
        )?;
        log_stage(diag, t, &value, &gain);
        values.push(value);
        gains.push(gain);
    }

    values.reverse();
    gains.reverse();

    let init = initial_stage(problem, &values[0], inv_mu_eq)?;

    debug!(
        horizon,
        nth,
        mu,
        mu_eq,
        value = init.constant,
        "backward pass complete"
    );

    Ok(Workspace {
        problem,
        mu,
        mu_eq,
        values,
        gains,
        initial: init.gains,
        th_grad: init.th_grad,
        th_hess: init.th_hess,
        value_constant: init.constant,
    })
}

fn terminal_stage(knot: &LqrKnot, mu: f64, inv_mu_eq: f64) -> (ValueFunction, StageGains) {
    let mut pmat = knot.Q.clone();
    add_diag(&mut pmat, mu);
    let mut pvec = knot.q.clone();
    let mut vxt = knot.Gammax.clone();
    let mut vtt = knot.Gammath.clone();
    let mut vt = knot.gamma.clone();
    let mut c = 0.0;

    let dual = if knot.nc > 0 {
        let ct = knot.C.transpose() * inv_mu_eq;
        pmat += &ct * &knot.C;
        pvec += &ct * &knot.d;
        vxt += &ct * &knot.Gammac;
        vtt += knot.Gammac.transpose() * &knot.Gammac * inv_mu_eq;
        vt += knot.Gammac.transpose() * &knot.d * inv_mu_eq;
        c += 0.5 * inv_mu_eq * knot.d.norm_squared();
        Some(DualGains {
            fb: &knot.C * inv_mu_eq,
            ff: &knot.d * inv_mu_eq,
            fth: &knot.Gammac * inv_mu_eq,
        })
    } else {
        None
    };
    symmetrize(&mut pmat);
    symmetrize(&mut vtt);

    let value = ValueFunction {
        P: pmat,
        p: pvec,
        Vxt: vxt,
        Vtt: vtt,
        vt,
        c,
    };
    let gains = StageGains {
        K: DMatrix::zeros(0, knot.nx),
        k: DVector::zeros(0),
        L: DMatrix::zeros(0, knot.nth),
        dual,
    };
    (value, gains)
}

fn interior_stage(
    t: usize,
    knot: &LqrKnot,
    next: &ValueFunction,
    mu: f64,
    inv_mu_eq: f64,
    nth: usize,
) -> LqrResult<(ValueFunction, StageGains)> {
    let e_lu = knot.E.clone().lu();
    let singular = || LqrError::SingularDynamics { stage: t };
    let a_hat = -e_lu.solve(&knot.A).ok_or_else(singular)?;
    let b_hat = -e_lu.solve(&knot.B).ok_or_else(singular)?;
    let f_hat = -e_lu.solve(&knot.f).ok_or_else(singular)?;

    let pa = &next.P * &a_hat;
    let pb = &next.P * &b_hat;
    let pf = &next.P * &f_hat + &next.p;
    let at = a_hat.transpose();
    let bt = b_hat.transpose();

    let mut qxx = &knot.Q + &at * &pa;
    let mut qxu = &knot.S + &at * &pb;
    let mut quu = &knot.R + &bt * &pb;
    let mut qx = &knot.q + &at * &pf;
    let mut qu = &knot.r + &bt * &pf;
    let mut qxt = &knot.Gammax + &at * &next.Vxt;
    let mut qut = &knot.Gammau + &bt * &next.Vxt;
    let mut qtt = &knot.Gammath + &next.Vtt;
    let mut qt = &knot.gamma + &next.vt + next.Vxt.transpose() * &f_hat;
    let mut c = next.c + 0.5 * f_hat.dot(&(&next.P * &f_hat)) + next.p.dot(&f_hat);

    if knot.nc > 0 {
        let ct = knot.C.transpose() * inv_mu_eq;
        let dt = knot.D.transpose() * inv_mu_eq;
        qxx += &ct * &knot.C;
        qxu += &ct * &knot.D;
        quu += &dt * &knot.D;
        qx += &ct * &knot.d;
        qu += &dt * &knot.d;
        qxt += &ct * &knot.Gammac;
        qut += &dt * &knot.Gammac;
        qtt += knot.Gammac.transpose() * &knot.Gammac * inv_mu_eq;
        qt += knot.Gammac.transpose() * &knot.d * inv_mu_eq;
        c += 0.5 * inv_mu_eq * knot.d.norm_squared();
    }
    add_diag(&mut quu, mu);
    symmetrize(&mut quu);

    let (kfb, kff, kth) = if knot.nu > 0 {
        let chol = factor_spd(quu, t, "control")?;
        (
            -chol.solve(&qxu.transpose()),
            -chol.solve(&qu),
            -chol.solve(&qut),
        )
    } else {
        (
            DMatrix::zeros(0, knot.nx),
            DVector::zeros(0),
            DMatrix::zeros(0, nth),
        )
    };

    let mut pmat = &qxx + &qxu * &kfb;
    symmetrize(&mut pmat);
    let pvec = &qx + &qxu * &kff;
    let vxt = &qxt + &qxu * &kth;
    let qut_t = qut.transpose();
    let mut vtt = &qtt + &qut_t * &kth;
    symmetrize(&mut vtt);
    let vt = &qt + &qut_t * &kff;
    c += 0.5 * qu.dot(&kff);

    let dual = if knot.nc > 0 {
        Some(DualGains {
            fb: (&knot.C + &knot.D * &kfb) * inv_mu_eq,
            ff: (&knot.D * &kff + &knot.d) * inv_mu_eq,
            fth: (&knot.D * &kth + &knot.Gammac) * inv_mu_eq,
        })
    } else {
        None
    };

    let value = ValueFunction {
        P: pmat,
        p: pvec,
        Vxt: vxt,
        Vtt: vtt,
        vt,
        c,
    };
    let gains = StageGains {
        K: kfb,
        k: kff,
        L: kth,
        dual,
    };
    Ok((value, gains))
}

struct InitialStage {
    gains: InitialGains,
    th_grad: DVector<f64>,
    th_hess: DMatrix<f64>,
    constant: f64,
}

/// Minimize the stage-0 value over `x₀` subject to the damped initial
/// condition, leaving a quadratic in θ.
fn initial_stage(
    problem: &LqrProblem,
    v0: &ValueFunction,
    inv_mu_eq: f64,
) -> LqrResult<InitialStage> {
    let mut h = v0.P.clone();
    let mut hx = v0.p.clone();
    let mut hxt = v0.Vxt.clone();
    let mut htt = v0.Vtt.clone();
    let mut ht = v0.vt.clone();
    let mut constant = v0.c;

    let dual = if problem.nc0() > 0 {
        let gt = problem.G0.transpose() * inv_mu_eq;
        h += &gt * &problem.G0;
        hx += &gt * &problem.g0;
        hxt += &gt * &problem.G0th;
        htt += problem.G0th.transpose() * &problem.G0th * inv_mu_eq;
        ht += problem.G0th.transpose() * &problem.g0 * inv_mu_eq;
        constant += 0.5 * inv_mu_eq * problem.g0.norm_squared();
        Some(DualGains {
            fb: &problem.G0 * inv_mu_eq,
            ff: &problem.g0 * inv_mu_eq,
            fth: &problem.G0th * inv_mu_eq,
        })
    } else {
        None
    };
    symmetrize(&mut h);

    let chol = factor_spd(h, 0, "initial state")?;
    let x_ff = -chol.solve(&hx);
    let x_fth = -chol.solve(&hxt);

    let hxt_t = hxt.transpose();
    let th_grad = &ht + &hxt_t * &x_ff;
    let mut th_hess = &htt + &hxt_t * &x_fth;
    symmetrize(&mut th_hess);
    constant += 0.5 * hx.dot(&x_ff);

    Ok(InitialStage {
        gains: InitialGains { x_ff, x_fth, dual },
        th_grad,
        th_hess,
        constant,
    })
}

fn log_stage(diag: &DiagnosticsConfig, t: usize, value: &ValueFunction, gains: &StageGains) {
    if diag.should_log(t) {
        debug!(
            stage = t,
            gain_norm = gains.K.norm(),
            ff_norm = gains.k.norm(),
            value_trace = value.P.trace(),
            "riccati stage"
        );
    } else {
        trace!(stage = t, "riccati stage");
    }
}
