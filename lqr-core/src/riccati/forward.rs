//! Forward rollout of the gains computed by the backward pass.

use nalgebra::DVector;
use tracing::debug;

use crate::error::{LqrError, LqrResult};
use crate::linalg::kkt::{kkt_residuals, KktResiduals};
use crate::trajectory::Trajectory;

use super::workspace::Workspace;

/// Residuals reported by a forward pass, measured against the undamped
/// problem (`μ = μ₂ = 0`).
pub type ForwardInfo = KktResiduals;

impl<'a> Workspace<'a> {
    /// Roll out the optimal trajectory for `theta` (zero when `None`).
    ///
    /// The initial state comes from the initial-stage gains, so `traj.xs[0]`
    /// is overwritten. All buffers must already match the problem's
    /// dimensions (see [`init_trajectory`](crate::trajectory::init_trajectory)).
    pub fn forward(
        &self,
        traj: &mut Trajectory,
        theta: Option<&DVector<f64>>,
    ) -> LqrResult<ForwardInfo> {
        let problem = self.problem;
        traj.check_shape(problem)?;
        let theta = problem.resolve_theta(theta)?;

        traj.xs[0] = self.initial_state(Some(&theta))?;
        traj.lams[0] = match &self.initial.dual {
            Some(dual) => dual.eval(&traj.xs[0], &theta),
            None => DVector::zeros(0),
        };

        self.rollout(traj, &theta)?;
        let info = kkt_residuals(problem, traj, Some(&theta), 0.0, 0.0)?;
        debug!(
            dynamics = info.dynamics,
            constraints = info.constraints,
            stationarity = info.stationarity,
            "forward pass"
        );
        Ok(info)
    }

    /// Roll out from a given initial state instead of the optimized one.
    ///
    /// The initial-condition rows are bypassed: `traj.lams[0]` is zeroed and
    /// the reported `initial` residual measures how far `x0` is from
    /// satisfying the initial optimality conditions.
    pub fn forward_from_state(
        &self,
        x0: &DVector<f64>,
        traj: &mut Trajectory,
        theta: Option<&DVector<f64>>,
    ) -> LqrResult<ForwardInfo> {
        let problem = self.problem;
        traj.check_shape(problem)?;
        if x0.len() != problem.stage(0).nx {
            return Err(LqrError::dim(
                0,
                format!(
                    "initial state has length {}, expected {}",
                    x0.len(),
                    problem.stage(0).nx
                ),
            ));
        }
        let theta = problem.resolve_theta(theta)?;

        traj.xs[0].copy_from(x0);
        traj.lams[0].fill(0.0);
        self.rollout(traj, &theta)?;
        kkt_residuals(problem, traj, Some(&theta), 0.0, 0.0)
    }

    fn rollout(&self, traj: &mut Trajectory, theta: &DVector<f64>) -> LqrResult<()> {
        let problem = self.problem;
        let horizon = problem.horizon();

        for t in 0..horizon {
            let knot = problem.stage(t);
            let gains = &self.gains[t];

            let u = gains.control(&traj.xs[t], theta);
            if let Some(dual) = &gains.dual {
                traj.vs[t] = dual.eval(&traj.xs[t], theta);
            }

            let rhs = -(&knot.A * &traj.xs[t] + &knot.B * &u + &knot.f);
            let xnext = knot
                .E
                .clone()
                .lu()
                .solve(&rhs)
                .ok_or(LqrError::SingularDynamics { stage: t })?;

            // E_tᵀ λ_{t+1} + ∇V_{t+1}(x_{t+1}) = 0
            let grad = self.values[t + 1].gradient(&xnext, theta);
            let lam = knot
                .E
                .transpose()
                .lu()
                .solve(&(-grad))
                .ok_or(LqrError::SingularDynamics { stage: t })?;

            traj.us[t] = u;
            traj.xs[t + 1] = xnext;
            traj.lams[t + 1] = lam;
        }

        if let Some(dual) = &self.gains[horizon].dual {
            traj.vs[horizon] = dual.eval(&traj.xs[horizon], theta);
        }
        Ok(())
    }
}
