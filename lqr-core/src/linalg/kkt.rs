//! Monolithic KKT system of a problem, and primal-dual residuals.
//!
//! The dense system is assembled with the same proximal damping as the
//! Riccati recursion, so both produce the same trajectory. It is `O(T³)` and
//! only meant for checking and small problems.
//!
//! Unknowns are ordered stage by stage:
//!
//! ```text
//! [x₀, λ₀, (u₀, ν₀, λ₁, x₁), (u₁, ν₁, λ₂, x₂), ..., ν_T]
//! ```

use nalgebra::{DMatrix, DVector};

use crate::error::{LqrError, LqrResult};
use crate::linalg::dense::inf_norm;
use crate::problem::LqrProblem;
use crate::trajectory::{init_trajectory, Trajectory};

/// Offsets of every block in the stacked unknown vector.
#[derive(Debug, Clone)]
struct KktLayout {
    x: Vec<usize>,
    u: Vec<usize>,
    v: Vec<usize>,
    /// `lam[0]` is the initial multiplier, `lam[t+1]` the co-state of transition `t`.
    lam: Vec<usize>,
    dim: usize,
}

impl KktLayout {
    fn new(problem: &LqrProblem) -> Self {
        let n = problem.num_stages();
        let mut x = vec![0; n];
        let mut u = vec![0; n];
        let mut v = vec![0; n];
        let mut lam = vec![0; n];

        let mut off = 0;
        x[0] = off;
        off += problem.stage(0).nx;
        lam[0] = off;
        off += problem.nc0();
        for t in 0..problem.horizon() {
            let knot = problem.stage(t);
            u[t] = off;
            off += knot.nu;
            v[t] = off;
            off += knot.nc;
            lam[t + 1] = off;
            off += knot.nx2;
            x[t + 1] = off;
            off += problem.stage(t + 1).nx;
        }
        let last = n - 1;
        u[last] = off;
        v[last] = off;
        off += problem.stage(last).nc;

        Self {
            x,
            u,
            v,
            lam,
            dim: off,
        }
    }
}

/// Dense saddle-point system `K z = rhs` of a damped problem.
#[derive(Debug, Clone)]
pub struct KktSystem<'a> {
    problem: &'a LqrProblem,
    layout: KktLayout,
    pub matrix: DMatrix<f64>,
    pub rhs: DVector<f64>,
}

impl<'a> KktSystem<'a> {
    /// Assemble the system for proximal parameters `mu`, `mu_eq` at `theta`.
    pub fn assemble(
        problem: &'a LqrProblem,
        mu: f64,
        mu_eq: f64,
        theta: Option<&DVector<f64>>,
    ) -> LqrResult<Self> {
        problem.validate()?;
        let theta = problem.resolve_theta(theta)?;
        let layout = KktLayout::new(problem);
        let n = problem.num_stages();
        let horizon = problem.horizon();

        let mut k = DMatrix::zeros(layout.dim, layout.dim);
        let mut rhs = DVector::zeros(layout.dim);

        let nc0 = problem.nc0();
        if nc0 > 0 {
            let (l0, x0) = (layout.lam[0], layout.x[0]);
            set_sym(&mut k, l0, x0, &problem.G0);
            set_diag(&mut k, l0, nc0, -mu_eq);
            let g = problem.initial_constraint_value(&DVector::zeros(problem.stage(0).nx), &theta);
            rhs.rows_mut(l0, nc0).copy_from(&(-g));
        }

        for t in 0..n {
            let knot = problem.stage(t);
            let xo = layout.x[t];
            k.view_mut((xo, xo), (knot.nx, knot.nx)).copy_from(&knot.Q);
            let mut rx = knot.q.clone();
            if !theta.is_empty() {
                rx += &knot.Gammax * &theta;
            }
            rhs.rows_mut(xo, knot.nx).copy_from(&(-rx));

            if t == horizon {
                set_diag_add(&mut k, xo, knot.nx, mu);
            } else {
                let uo = layout.u[t];
                k.view_mut((uo, uo), (knot.nu, knot.nu)).copy_from(&knot.R);
                set_diag_add(&mut k, uo, knot.nu, mu);
                set_sym(&mut k, xo, uo, &knot.S);
                let mut ru = knot.r.clone();
                if !theta.is_empty() {
                    ru += &knot.Gammau * &theta;
                }
                rhs.rows_mut(uo, knot.nu).copy_from(&(-ru));

                let lo = layout.lam[t + 1];
                set_sym(&mut k, lo, xo, &knot.A);
                set_sym(&mut k, lo, uo, &knot.B);
                set_sym(&mut k, lo, layout.x[t + 1], &knot.E);
                rhs.rows_mut(lo, knot.nx2).copy_from(&(-knot.f.clone()));
            }

            if knot.nc > 0 {
                let vo = layout.v[t];
                set_sym(&mut k, vo, xo, &knot.C);
                if knot.nu > 0 {
                    set_sym(&mut k, vo, layout.u[t], &knot.D);
                }
                set_diag(&mut k, vo, knot.nc, -mu_eq);
                let mut rv = knot.d.clone();
                if !theta.is_empty() {
                    rv += &knot.Gammac * &theta;
                }
                rhs.rows_mut(vo, knot.nc).copy_from(&(-rv));
            }
        }

        Ok(Self {
            problem,
            layout,
            matrix: k,
            rhs,
        })
    }

    /// Total number of unknowns.
    pub fn dim(&self) -> usize {
        self.layout.dim
    }

    /// Solve with a dense LU and unpack into a trajectory.
    pub fn solve(&self) -> LqrResult<Trajectory> {
        let z = self
            .matrix
            .clone()
            .lu()
            .solve(&self.rhs)
            .ok_or(LqrError::Factorization {
                stage: 0,
                block: "kkt",
            })?;
        Ok(self.unpack(&z))
    }

    fn unpack(&self, z: &DVector<f64>) -> Trajectory {
        let problem = self.problem;
        let layout = &self.layout;
        let mut traj = init_trajectory(problem);
        traj.lams[0] = z.rows(layout.lam[0], problem.nc0()).into_owned();
        for (t, knot) in problem.stages().iter().enumerate() {
            traj.xs[t] = z.rows(layout.x[t], knot.nx).into_owned();
            traj.us[t] = z.rows(layout.u[t], knot.nu).into_owned();
            traj.vs[t] = z.rows(layout.v[t], knot.nc).into_owned();
            if t < problem.horizon() {
                traj.lams[t + 1] = z.rows(layout.lam[t + 1], knot.nx2).into_owned();
            }
        }
        traj
    }
}

/// Write `m` at block `(row, col)` and `mᵀ` at block `(col, row)`.
fn set_sym(k: &mut DMatrix<f64>, row: usize, col: usize, m: &DMatrix<f64>) {
    let (r, c) = m.shape();
    if r == 0 || c == 0 {
        return;
    }
    k.view_mut((row, col), (r, c)).copy_from(m);
    k.view_mut((col, row), (c, r)).copy_from(&m.transpose());
}

fn set_diag(k: &mut DMatrix<f64>, off: usize, n: usize, val: f64) {
    for i in 0..n {
        k[(off + i, off + i)] = val;
    }
}

fn set_diag_add(k: &mut DMatrix<f64>, off: usize, n: usize, val: f64) {
    for i in 0..n {
        k[(off + i, off + i)] += val;
    }
}

/// ∞-norm residuals of the optimality conditions.
///
/// With `mu = mu_eq = 0` these measure the distance to the solution of the
/// original problem; with the proximal parameters used by a solve they
/// vanish (up to round-off) on the trajectory it returns.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct KktResiduals {
    /// `A x + B u + f + E x'`.
    pub dynamics: f64,
    /// `C x + D u + Γ_c θ + d - μ₂ ν`.
    pub constraints: f64,
    /// Gradient of the Lagrangian in the controls and states `x₁..x_T`.
    pub stationarity: f64,
    /// Initial condition and the stationarity of `x₀`.
    pub initial: f64,
}

impl KktResiduals {
    /// Largest of the four residuals.
    pub fn max(&self) -> f64 {
        self.dynamics
            .max(self.constraints)
            .max(self.stationarity)
            .max(self.initial)
    }
}

/// Evaluate the optimality residuals of `traj`.
pub fn kkt_residuals(
    problem: &LqrProblem,
    traj: &Trajectory,
    theta: Option<&DVector<f64>>,
    mu: f64,
    mu_eq: f64,
) -> LqrResult<KktResiduals> {
    traj.check_shape(problem)?;
    let theta = problem.resolve_theta(theta)?;
    let horizon = problem.horizon();
    let mut res = KktResiduals::default();

    let nc0 = problem.nc0();
    if nc0 > 0 {
        let c0 = problem.initial_constraint_value(&traj.xs[0], &theta) - &traj.lams[0] * mu_eq;
        res.initial = inf_norm(&c0);
    }

    for (t, knot) in problem.stages().iter().enumerate() {
        let (x, u, v) = (&traj.xs[t], &traj.us[t], &traj.vs[t]);

        // ∇ₓL
        let mut gx = &knot.Q * x + &knot.q;
        if knot.nu > 0 {
            gx += &knot.S * u;
        }
        if !theta.is_empty() {
            gx += &knot.Gammax * &theta;
        }
        if knot.nc > 0 {
            gx += knot.C.transpose() * v;
        }
        if t < horizon {
            gx += knot.A.transpose() * &traj.lams[t + 1];
        }
        if t > 0 {
            gx += problem.stage(t - 1).E.transpose() * &traj.lams[t];
        } else if nc0 > 0 {
            gx += problem.G0.transpose() * &traj.lams[0];
        }
        if t == horizon {
            gx += x * mu;
        }
        if t == 0 {
            res.initial = res.initial.max(inf_norm(&gx));
        } else {
            res.stationarity = res.stationarity.max(inf_norm(&gx));
        }

        if knot.nc > 0 {
            let cv = knot.constraint_value(x, u, &theta) - v * mu_eq;
            res.constraints = res.constraints.max(inf_norm(&cv));
        }

        if t < horizon {
            let dynres = knot.dynamics_residual(x, u, &traj.xs[t + 1]);
            res.dynamics = res.dynamics.max(inf_norm(&dynres));

            if knot.nu > 0 {
                let mut gu = knot.S.transpose() * x + &knot.R * u + &knot.r + u * mu;
                gu += knot.B.transpose() * &traj.lams[t + 1];
                if !theta.is_empty() {
                    gu += &knot.Gammau * &theta;
                }
                if knot.nc > 0 {
                    gu += knot.D.transpose() * v;
                }
                res.stationarity = res.stationarity.max(inf_norm(&gu));
            }
        }
    }

    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knot::LqrKnot;

    fn small_problem() -> LqrProblem {
        let mut k0 = LqrKnot::new(2, 1, 1);
        k0.Q = DMatrix::identity(2, 2);
        k0.R = DMatrix::identity(1, 1);
        k0.A = DMatrix::from_row_slice(2, 2, &[1.0, 0.1, 0.0, 1.0]);
        k0.B = DMatrix::from_row_slice(2, 1, &[0.0, 0.1]);
        k0.C = DMatrix::from_row_slice(1, 2, &[1.0, 1.0]);
        k0.d[0] = -1.0;
        let mut k1 = LqrKnot::new(2, 0, 0);
        k1.Q = DMatrix::identity(2, 2);
        LqrProblem::new(vec![k0, k1], 0).unwrap()
    }

    #[test]
    fn test_layout_offsets() {
        let mut prob = small_problem();
        prob.fix_initial_state(&DVector::from_vec(vec![1.0, 0.0])).unwrap();
        let layout = KktLayout::new(&prob);
        // x0(2) λ0(2) u0(1) ν0(1) λ1(2) x1(2)
        assert_eq!(layout.x, vec![0, 8]);
        assert_eq!(layout.lam, vec![2, 6]);
        assert_eq!(layout.u[0], 4);
        assert_eq!(layout.v[0], 5);
        assert_eq!(layout.dim, 10);
    }

    #[test]
    fn test_solution_has_small_residuals() {
        let mut prob = small_problem();
        prob.fix_initial_state(&DVector::from_vec(vec![1.0, 0.0])).unwrap();
        let (mu, mu_eq) = (1e-8, 1e-8);
        let kkt = KktSystem::assemble(&prob, mu, mu_eq, None).unwrap();
        assert_eq!(kkt.dim(), 10);
        assert_eq!(kkt.matrix, kkt.matrix.transpose());
        let traj = kkt.solve().unwrap();
        let res = kkt_residuals(&prob, &traj, None, mu, mu_eq).unwrap();
        assert!(res.max() < 1e-8, "{res:?}");
        // the stage constraint is met up to the μ₂ damping
        let c = prob.stage(0).constraint_value(&traj.xs[0], &traj.us[0], &DVector::zeros(0));
        assert!(c.norm() < 1e-6);
    }
}
