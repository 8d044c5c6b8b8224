//! Synthetic problem generators.
//!
//! All generators draw from a fixed-seed LCG, so a seed pins the problem.

use anyhow::Result;
use lqr_core::{LqrKnot, LqrProblem};
use nalgebra::{DMatrix, DVector};

struct Lcg(u64);

impl Lcg {
    /// Uniform in [0, 1).
    fn next(&mut self) -> f64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1);
        ((self.0 >> 33) as f64) / (u32::MAX as f64 + 1.0)
    }

    /// Uniform in [-1, 1).
    fn sym(&mut self) -> f64 {
        2.0 * self.next() - 1.0
    }

    fn mat(&mut self, rows: usize, cols: usize) -> DMatrix<f64> {
        DMatrix::from_fn(rows, cols, |_, _| self.sym())
    }

    fn vec(&mut self, n: usize) -> DVector<f64> {
        DVector::from_fn(n, |_, _| self.sym())
    }
}

/// Chain of `nx/2` double integrators driven by `nu` random actuators.
fn integrator_knot(rng: &mut Lcg, nx: usize, nu: usize, nc: usize, dt: f64) -> LqrKnot {
    let mut k = LqrKnot::new(nx, nu, nc);
    k.A = DMatrix::identity(nx, nx);
    for i in (0..nx.saturating_sub(1)).step_by(2) {
        k.A[(i, i + 1)] = dt;
    }
    k.B = rng.mat(nx, nu) * dt;
    k.Q = DMatrix::identity(nx, nx);
    k.R = DMatrix::identity(nu, nu) * 0.1;
    k
}

fn terminal_knot(nx: usize, nc: usize) -> LqrKnot {
    let mut k = LqrKnot::new(nx, 0, nc);
    k.Q = DMatrix::identity(nx, nx) * 10.0;
    k
}

/// Track a random reference from a fixed initial state.
pub fn generate_tracking(horizon: usize, nx: usize, nu: usize, seed: u64) -> Result<LqrProblem> {
    let mut rng = Lcg(seed);
    let mut knots = Vec::with_capacity(horizon + 1);
    for _ in 0..horizon {
        let mut k = integrator_knot(&mut rng, nx, nu, 0, 0.05);
        let xref = rng.vec(nx);
        k.q = -(&k.Q * xref);
        knots.push(k);
    }
    knots.push(terminal_knot(nx, 0));

    let mut prob = LqrProblem::new(knots, 0)?;
    prob.fix_initial_state(&rng.vec(nx))?;
    Ok(prob)
}

/// Tracking plus one random equality row on every fourth stage and a
/// terminal state pinned to the origin.
pub fn generate_constrained(
    horizon: usize,
    nx: usize,
    nu: usize,
    seed: u64,
) -> Result<LqrProblem> {
    let mut rng = Lcg(seed);
    let mut knots = Vec::with_capacity(horizon + 1);
    for t in 0..horizon {
        let nc = usize::from(t % 4 == 3 && nu > 0);
        let mut k = integrator_knot(&mut rng, nx, nu, nc, 0.05);
        if nc > 0 {
            k.C = rng.mat(1, nx);
            k.D = rng.mat(1, nu);
            k.d = rng.vec(1);
        }
        let xref = rng.vec(nx);
        k.q = -(&k.Q * xref);
        knots.push(k);
    }
    let mut term = terminal_knot(nx, nx);
    term.C = DMatrix::identity(nx, nx);
    knots.push(term);

    let mut prob = LqrProblem::new(knots, 0)?;
    prob.fix_initial_state(&rng.vec(nx))?;
    Ok(prob)
}

/// Free initial state with the cost term `θᵀ(x₀ - x_T)`; θ ∈ ℝ^nx acts as
/// the multiplier of a periodicity condition.
pub fn generate_periodic(horizon: usize, nx: usize, nu: usize, seed: u64) -> Result<LqrProblem> {
    let mut rng = Lcg(seed);
    let mut knots = Vec::with_capacity(horizon + 1);
    for _ in 0..horizon {
        let mut k = integrator_knot(&mut rng, nx, nu, 0, 0.05);
        k.f = rng.vec(nx) * 0.05;
        k.q = rng.vec(nx);
        knots.push(k);
    }
    knots.push(terminal_knot(nx, 0));

    let mut prob = LqrProblem::new(knots, 0)?;
    prob.add_parameterization(nx)?;
    prob.stage_mut(0).Gammax = DMatrix::identity(nx, nx);
    prob.stage_mut(horizon).Gammax = -DMatrix::identity(nx, nx);
    Ok(prob)
}
