//! Proximal Riccati solver for parametric, equality-constrained LQR problems.
//!
//! A problem is a chain of knots, each carrying a quadratic stage cost,
//! linear dynamics `A x + B u + f + E x' = 0` and optional equality
//! constraints `C x + D u + Γ_c θ + d = 0`. Costs and constraints may
//! depend affinely on a parameter θ shared by all knots.
//!
//! The solver runs a backward Riccati recursion in which
//!
//! - the dual proximal parameter `μ₂` eliminates the equality multipliers,
//! - the primal proximal parameter `μ` damps the control blocks,
//!
//! so every stage only needs a dense Cholesky. Alongside the gains it
//! accumulates the Hessian and gradient of the optimal value `V*(θ)`, which
//! is an exact quadratic in θ. A forward rollout then recovers states,
//! controls and multipliers for any θ.
//!
//! # Example
//!
//! ```ignore
//! use lqr_core::{LqrKnot, LqrProblem, ProximalRiccatiSolver, init_trajectory};
//! use nalgebra::{DMatrix, DVector};
//!
//! let mut k0 = LqrKnot::new(2, 1, 0);
//! k0.Q = DMatrix::identity(2, 2);
//! k0.R = DMatrix::identity(1, 1);
//! k0.A = DMatrix::from_row_slice(2, 2, &[1.0, 0.1, 0.0, 1.0]);
//! k0.B = DMatrix::from_row_slice(2, 1, &[0.0, 0.1]);
//! let mut k1 = LqrKnot::new(2, 0, 0);
//! k1.Q = DMatrix::identity(2, 2);
//!
//! let mut prob = LqrProblem::new(vec![k0, k1], 0)?;
//! prob.fix_initial_state(&DVector::from_vec(vec![1.0, 0.0]))?;
//!
//! let ws = ProximalRiccatiSolver::new(&prob).backward(1e-8, 1e-8)?;
//! let mut traj = init_trajectory(&prob);
//! ws.forward(&mut traj, None)?;
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::too_many_arguments)]

pub mod error;
pub mod knot;
pub mod linalg;
pub mod problem;
pub mod riccati;
pub mod trajectory;

pub use error::{LqrError, LqrResult};
pub use knot::LqrKnot;
pub use linalg::kkt::{kkt_residuals, KktResiduals, KktSystem};
pub use problem::{LqrProblem, LqrSolution, RiccatiSettings, SolveInfo};
pub use riccati::{
    DiagnosticsConfig, ForwardInfo, ProximalPolicy, ProximalRiccatiSolver, RegularizationState,
    Workspace,
};
pub use trajectory::{init_trajectory, Trajectory};

use nalgebra::DVector;

/// Main solve entry point.
///
/// Factorizes `problem` (growing μ on failure as `settings.policy` allows)
/// and rolls out the trajectory at `theta`, or θ = 0 when `None`.
pub fn solve(
    problem: &LqrProblem,
    settings: &RiccatiSettings,
    theta: Option<&DVector<f64>>,
) -> LqrResult<LqrSolution> {
    riccati::solve_riccati(problem, settings, theta)
}
