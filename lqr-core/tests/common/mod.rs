//! Shared problem generators for the integration tests.
#![allow(dead_code)]

use lqr_core::{LqrKnot, LqrProblem};
use nalgebra::{DMatrix, DVector};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

pub fn rand_mat(rng: &mut ChaCha8Rng, rows: usize, cols: usize) -> DMatrix<f64> {
    DMatrix::from_fn(rows, cols, |_, _| rng.gen_range(-1.0..1.0))
}

pub fn rand_vec(rng: &mut ChaCha8Rng, n: usize) -> DVector<f64> {
    DVector::from_fn(n, |_, _| rng.gen_range(-1.0..1.0))
}

/// `M Mᵀ + I`, so every eigenvalue is at least one.
pub fn rand_spd(rng: &mut ChaCha8Rng, n: usize) -> DMatrix<f64> {
    let m = rand_mat(rng, n, n);
    &m * m.transpose() + DMatrix::identity(n, n)
}

/// Random problem over knots of dimensions `(nx, nu, nc)`.
///
/// The last entry is the terminal knot and must have `nu = 0`. Stage
/// constraints should satisfy `nc <= nu` to stay feasible. Transitions use a
/// perturbed `E = -I + 0.1 M`, which stays invertible for small `nx`.
pub fn random_problem(
    rng: &mut ChaCha8Rng,
    dims: &[(usize, usize, usize)],
    fix_x0: bool,
) -> LqrProblem {
    let n = dims.len();
    let mut knots = Vec::with_capacity(n);
    for (t, &(nx, nu, nc)) in dims.iter().enumerate() {
        let nx2 = if t + 1 < n { dims[t + 1].0 } else { nx };
        let mut k = LqrKnot::with_next_dim(nx, nu, nc, nx2);
        k.Q = rand_spd(rng, nx);
        k.q = rand_vec(rng, nx);
        k.R = rand_spd(rng, nu);
        k.r = rand_vec(rng, nu);
        k.S = rand_mat(rng, nx, nu) * 0.1;
        if t + 1 < n {
            k.A = rand_mat(rng, nx2, nx);
            k.B = rand_mat(rng, nx2, nu);
            k.E = -DMatrix::identity(nx2, nx2) + rand_mat(rng, nx2, nx2) * 0.1;
            k.f = rand_vec(rng, nx2) * 0.1;
        }
        k.C = rand_mat(rng, nc, nx);
        k.D = rand_mat(rng, nc, nu);
        k.d = rand_vec(rng, nc);
        knots.push(k);
    }
    let mut prob = LqrProblem::new(knots, 0).expect("valid dimensions");
    if fix_x0 {
        let x0 = rand_vec(rng, dims[0].0);
        prob.fix_initial_state(&x0).expect("x0 length");
    }
    prob
}

/// Attach an `nth`-dimensional parameter with random coupling blocks.
pub fn parameterize(rng: &mut ChaCha8Rng, prob: &mut LqrProblem, nth: usize) {
    prob.add_parameterization(nth).expect("first parameterization");
    for knot in prob.stages_mut() {
        knot.Gammax = rand_mat(rng, knot.nx, nth) * 0.5;
        knot.Gammau = rand_mat(rng, knot.nu, nth) * 0.5;
        let g = rand_mat(rng, nth, nth) * 0.1;
        knot.Gammath = &g + g.transpose();
        knot.gamma = rand_vec(rng, nth);
        knot.Gammac = rand_mat(rng, knot.nc, nth);
    }
    prob.G0th = rand_mat(rng, prob.nc0(), nth);
}

/// Scalar chain `x' = x + u + drift` with unit costs.
pub fn scalar_chain(horizon: usize, drift: f64) -> Vec<LqrKnot> {
    let mut knots = Vec::with_capacity(horizon + 1);
    for _ in 0..horizon {
        let mut k = LqrKnot::new(1, 1, 0);
        k.Q[(0, 0)] = 1.0;
        k.R[(0, 0)] = 1.0;
        k.A[(0, 0)] = 1.0;
        k.B[(0, 0)] = 1.0;
        k.f[0] = drift;
        knots.push(k);
    }
    let mut term = LqrKnot::new(1, 0, 0);
    term.Q[(0, 0)] = 1.0;
    knots.push(term);
    knots
}

/// Relative closeness of two vectors.
pub fn rel_err(a: &DVector<f64>, b: &DVector<f64>) -> f64 {
    (a - b).norm() / (1.0 + b.norm())
}
