//! Primal-dual trajectory buffers.

use nalgebra::DVector;

use crate::error::{LqrError, LqrResult};
use crate::linalg::dense::inf_norm;
use crate::problem::LqrProblem;

/// States, controls and multipliers over the horizon.
///
/// For a problem with `T` transitions:
///
/// - `xs`: T+1 states, `xs[t]` has length `nx_t`
/// - `us`: T+1 controls, `us[t]` has length `nu_t` (empty on the terminal knot)
/// - `vs`: T+1 stage-constraint multipliers, `vs[t]` has length `nc_t`
/// - `lams`: T+1 multipliers; `lams[0]` belongs to the initial condition
///   (length `nc0`) and `lams[t+1]` is the co-state of transition `t`
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    pub xs: Vec<DVector<f64>>,
    pub us: Vec<DVector<f64>>,
    pub vs: Vec<DVector<f64>>,
    pub lams: Vec<DVector<f64>>,
}

/// Zero-filled trajectory matching the stage dimensions of `problem`.
pub fn init_trajectory(problem: &LqrProblem) -> Trajectory {
    let stages = problem.stages();
    let mut lams = Vec::with_capacity(stages.len());
    lams.push(DVector::zeros(problem.nc0()));
    for knot in &stages[..stages.len().saturating_sub(1)] {
        lams.push(DVector::zeros(knot.nx2));
    }
    Trajectory {
        xs: stages.iter().map(|k| DVector::zeros(k.nx)).collect(),
        us: stages.iter().map(|k| DVector::zeros(k.nu)).collect(),
        vs: stages.iter().map(|k| DVector::zeros(k.nc)).collect(),
        lams,
    }
}

impl Trajectory {
    /// Number of knots covered.
    pub fn len(&self) -> usize {
        self.xs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    /// Check every buffer against the problem's stage dimensions.
    pub fn check_shape(&self, problem: &LqrProblem) -> LqrResult<()> {
        let n = problem.num_stages();
        if self.xs.len() != n || self.us.len() != n || self.vs.len() != n || self.lams.len() != n
        {
            return Err(LqrError::dim(
                0,
                format!(
                    "trajectory has {}/{}/{}/{} entries (xs/us/vs/lams), problem has {} knots",
                    self.xs.len(),
                    self.us.len(),
                    self.vs.len(),
                    self.lams.len(),
                    n
                ),
            ));
        }
        if self.lams[0].len() != problem.nc0() {
            return Err(LqrError::dim(0, "initial multiplier length differs from nc0"));
        }
        for (t, knot) in problem.stages().iter().enumerate() {
            if self.xs[t].len() != knot.nx || self.us[t].len() != knot.nu || self.vs[t].len() != knot.nc
            {
                return Err(LqrError::dim(t, "trajectory entry does not match knot dimensions"));
            }
            if t + 1 < n && self.lams[t + 1].len() != knot.nx2 {
                return Err(LqrError::dim(t, "co-state length differs from nx2"));
            }
        }
        Ok(())
    }

    /// Whether the buffers fit `problem`.
    pub fn matches(&self, problem: &LqrProblem) -> bool {
        self.check_shape(problem).is_ok()
    }

    /// Largest ∞-norm distance between the states and controls of two trajectories.
    pub fn primal_distance(&self, other: &Trajectory) -> f64 {
        let dist = |a: &[DVector<f64>], b: &[DVector<f64>]| {
            a.iter()
                .zip(b)
                .map(|(x, y)| inf_norm(&(x - y)))
                .fold(0.0_f64, f64::max)
        };
        dist(&self.xs, &other.xs).max(dist(&self.us, &other.us))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knot::LqrKnot;

    #[test]
    fn test_init_matches_problem() {
        let knots = vec![
            LqrKnot::with_next_dim(2, 1, 1, 3),
            LqrKnot::new(3, 2, 0),
            LqrKnot::new(3, 0, 2),
        ];
        let prob = LqrProblem::new(knots, 1).unwrap();
        let traj = init_trajectory(&prob);
        assert_eq!(traj.len(), 3);
        assert_eq!(traj.xs[0].len(), 2);
        assert_eq!(traj.xs[1].len(), 3);
        assert_eq!(traj.us[2].len(), 0);
        assert_eq!(traj.vs[2].len(), 2);
        assert_eq!(traj.lams[0].len(), 1);
        assert_eq!(traj.lams[1].len(), 3);
        assert!(traj.matches(&prob));
        assert!(traj.xs.iter().all(|x| x.iter().all(|&v| v == 0.0)));
    }

    #[test]
    fn test_mismatched_buffer_rejected() {
        let prob = LqrProblem::new(vec![LqrKnot::new(2, 1, 0), LqrKnot::new(2, 0, 0)], 0).unwrap();
        let mut traj = init_trajectory(&prob);
        traj.us[0] = DVector::zeros(3);
        assert!(matches!(
            traj.check_shape(&prob),
            Err(LqrError::Dimension { stage: 0, .. })
        ));
    }

    #[test]
    fn test_single_knot() {
        let prob = LqrProblem::new(vec![LqrKnot::new(2, 0, 0)], 0).unwrap();
        let traj = init_trajectory(&prob);
        assert_eq!(traj.len(), 1);
        assert_eq!(traj.lams.len(), 1);
        assert_eq!(traj.us[0].len(), 0);
    }
}
