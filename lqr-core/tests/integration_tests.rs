//! End-to-end tests of the backward/forward passes.
//!
//! Riccati trajectories are checked against the classical unconstrained
//! recursion and against the dense KKT system assembled with the same
//! proximal parameters.

mod common;

use approx::assert_relative_eq;
use lqr_core::{
    init_trajectory, kkt_residuals, solve, KktSystem, LqrError, LqrKnot, LqrProblem,
    ProximalPolicy, ProximalRiccatiSolver, RiccatiSettings,
};
use nalgebra::{DMatrix, DVector};

use common::{
    parameterize, rand_mat, rand_spd, rand_vec, random_problem, rel_err, scalar_chain, seeded_rng,
};

fn settings(mu: f64, mu_eq: f64) -> RiccatiSettings {
    RiccatiSettings {
        mu,
        mu_eq,
        verbose: false,
        policy: ProximalPolicy::default(),
    }
}

#[test]
fn test_matches_classical_riccati() {
    // x' = A x + B u, no constraints, no affine terms.
    let mut rng = seeded_rng(7);
    let (nx, nu, horizon) = (3, 2, 8);
    let mut knots = Vec::new();
    for _ in 0..horizon {
        let mut k = LqrKnot::new(nx, nu, 0);
        k.Q = rand_spd(&mut rng, nx);
        k.R = rand_spd(&mut rng, nu);
        k.A = rand_mat(&mut rng, nx, nx);
        k.B = rand_mat(&mut rng, nx, nu);
        knots.push(k);
    }
    let mut term = LqrKnot::new(nx, 0, 0);
    term.Q = rand_spd(&mut rng, nx);
    knots.push(term);
    let prob = LqrProblem::new(knots, 0).unwrap();

    let ws = ProximalRiccatiSolver::new(&prob).backward(0.0, 0.0).unwrap();

    // Textbook recursion.
    let mut p = prob.stage(horizon).Q.clone();
    let mut gains = vec![DMatrix::zeros(nu, nx); horizon];
    assert_relative_eq!(ws.value(horizon).P, p, max_relative = 1e-12);
    for t in (0..horizon).rev() {
        let k = prob.stage(t);
        let m = &k.R + k.B.transpose() * &p * &k.B;
        let rhs = k.B.transpose() * &p * &k.A;
        let gain = -m.lu().solve(&rhs).unwrap();
        p = &k.Q + k.A.transpose() * &p * &k.A + k.A.transpose() * &p * &k.B * &gain;
        p = (&p + p.transpose()) * 0.5;
        assert_relative_eq!(ws.gains(t).K, gain, epsilon = 1e-10, max_relative = 1e-8);
        assert_relative_eq!(ws.value(t).P, p, epsilon = 1e-10, max_relative = 1e-8);
        gains[t] = gain;
    }

    let x0 = rand_vec(&mut rng, nx);
    let mut traj = init_trajectory(&prob);
    let info = ws.forward_from_state(&x0, &mut traj, None).unwrap();
    assert!(info.dynamics < 1e-10, "dynamics residual {}", info.dynamics);

    let mut x = x0.clone();
    for t in 0..horizon {
        let u = &gains[t] * &x;
        assert!(rel_err(&traj.us[t], &u) < 1e-8, "control mismatch at {t}");
        x = &prob.stage(t).A * &x + &prob.stage(t).B * &u;
        assert!(rel_err(&traj.xs[t + 1], &x) < 1e-8, "state mismatch at {}", t + 1);
    }
}

#[test]
fn test_riccati_matches_kkt_oracle() {
    let mut rng = seeded_rng(11);
    let dims = [(3, 2, 1), (2, 2, 1), (4, 2, 0), (4, 1, 1), (4, 0, 0)];
    let prob = random_problem(&mut rng, &dims, true);
    let (mu, mu_eq) = (1e-6, 1e-6);

    let ws = ProximalRiccatiSolver::new(&prob).backward(mu, mu_eq).unwrap();
    let mut traj = init_trajectory(&prob);
    ws.forward(&mut traj, None).unwrap();

    let oracle = KktSystem::assemble(&prob, mu, mu_eq, None).unwrap().solve().unwrap();

    for t in 0..prob.num_stages() {
        assert!(rel_err(&traj.xs[t], &oracle.xs[t]) < 1e-6, "x[{t}]");
        assert!(rel_err(&traj.us[t], &oracle.us[t]) < 1e-6, "u[{t}]");
        assert!(rel_err(&traj.vs[t], &oracle.vs[t]) < 1e-6, "v[{t}]");
        assert!(rel_err(&traj.lams[t], &oracle.lams[t]) < 1e-6, "lam[{t}]");
    }

    let res = kkt_residuals(&prob, &traj, None, mu, mu_eq).unwrap();
    assert!(res.max() < 1e-6, "damped residuals {res:?}");
}

#[test]
fn test_parametric_riccati_matches_kkt_oracle() {
    let mut rng = seeded_rng(12);
    let dims = [(2, 2, 1), (3, 1, 0), (2, 2, 2), (2, 0, 0)];
    let mut prob = random_problem(&mut rng, &dims, true);
    parameterize(&mut rng, &mut prob, 2);
    let theta = rand_vec(&mut rng, 2);
    let (mu, mu_eq) = (1e-6, 1e-6);

    let ws = ProximalRiccatiSolver::new(&prob).backward(mu, mu_eq).unwrap();
    let mut traj = init_trajectory(&prob);
    ws.forward(&mut traj, Some(&theta)).unwrap();

    let oracle = KktSystem::assemble(&prob, mu, mu_eq, Some(&theta))
        .unwrap()
        .solve()
        .unwrap();
    assert!(traj.primal_distance(&oracle) < 1e-6);
    for t in 0..prob.num_stages() {
        assert!(rel_err(&traj.vs[t], &oracle.vs[t]) < 1e-6, "v[{t}]");
        assert!(rel_err(&traj.lams[t], &oracle.lams[t]) < 1e-6, "lam[{t}]");
    }
}

#[test]
fn test_proximal_consistency() {
    let mut rng = seeded_rng(3);
    let dims = [(3, 2, 1), (3, 2, 1), (3, 2, 0), (3, 0, 0)];
    let prob = random_problem(&mut rng, &dims, true);
    let solver = ProximalRiccatiSolver::new(&prob);

    let mut coarse = init_trajectory(&prob);
    solver
        .backward(1e-6, 1e-8)
        .unwrap()
        .forward(&mut coarse, None)
        .unwrap();
    let mut fine = init_trajectory(&prob);
    solver
        .backward(1e-9, 1e-8)
        .unwrap()
        .forward(&mut fine, None)
        .unwrap();

    let dist = coarse.primal_distance(&fine);
    assert!(dist < 1e-5, "solutions differ by {dist}");
}

#[test]
fn test_single_knot() {
    let mut rng = seeded_rng(5);
    let mut knot = LqrKnot::new(2, 0, 0);
    knot.Q = rand_spd(&mut rng, 2);
    knot.q = rand_vec(&mut rng, 2);
    let prob = LqrProblem::new(vec![knot.clone()], 0).unwrap();
    assert_eq!(prob.horizon(), 0);

    let mu = 1e-8;
    let ws = ProximalRiccatiSolver::new(&prob).backward(mu, 0.0).unwrap();
    let mut traj = init_trajectory(&prob);
    let info = ws.forward(&mut traj, None).unwrap();

    let mut h = knot.Q.clone();
    for i in 0..2 {
        h[(i, i)] += mu;
    }
    let expected = -h.lu().solve(&knot.q).unwrap();
    assert!(rel_err(&traj.xs[0], &expected) < 1e-12);
    assert_eq!(info.dynamics, 0.0);

    let value = ws.optimal_value(None).unwrap();
    let objective = prob.proximal_objective(&traj, None, mu, 0.0).unwrap();
    assert_relative_eq!(value, objective, max_relative = 1e-12);
}

#[test]
fn test_single_knot_fixed_state() {
    let mut knot = LqrKnot::new(2, 0, 1);
    knot.Q = DMatrix::identity(2, 2);
    knot.C = DMatrix::from_row_slice(1, 2, &[1.0, -1.0]);
    let mut prob = LqrProblem::new(vec![knot], 0).unwrap();
    let x0 = DVector::from_vec(vec![0.5, 0.5]);
    prob.fix_initial_state(&x0).unwrap();

    let sol = solve(&prob, &settings(1e-8, 1e-8), None).unwrap();
    assert!(rel_err(&sol.trajectory.xs[0], &x0) < 1e-6);
    assert!(sol.info.residuals.constraints < 1e-7);
}

#[test]
fn test_solve_reports_residuals_and_value() {
    let mut rng = seeded_rng(21);
    let dims = [(2, 1, 1), (2, 1, 0), (2, 1, 1), (2, 0, 0)];
    let mut prob = random_problem(&mut rng, &dims, true);
    parameterize(&mut rng, &mut prob, 1);
    let theta = DVector::from_vec(vec![0.3]);
    let (mu, mu_eq) = (1e-8, 1e-8);

    let sol = solve(&prob, &settings(mu, mu_eq), Some(&theta)).unwrap();
    assert_eq!(sol.info.mu_bumps, 0);
    assert_eq!(sol.info.mu, mu);
    assert_eq!(sol.theta, theta);

    let res = sol.info.residuals;
    assert!(res.dynamics < 1e-9, "dynamics {}", res.dynamics);
    assert!(res.constraints < 1e-5, "constraints {}", res.constraints);
    assert!(res.stationarity < 1e-5, "stationarity {}", res.stationarity);

    let objective = prob
        .proximal_objective(&sol.trajectory, Some(&theta), mu, mu_eq)
        .unwrap();
    assert_relative_eq!(sol.info.optimal_value, objective, max_relative = 1e-6);
}

#[test]
fn test_growth_policy_recovers() {
    // Q_uu = R + μ at the first stage since B = 0.
    let mut knots = scalar_chain(1, 0.0);
    knots[0].B[(0, 0)] = 0.0;
    knots[0].R[(0, 0)] = -0.5;
    let prob = LqrProblem::new(knots, 0).unwrap();

    let err = solve(&prob, &settings(1e-8, 1e-8), None).unwrap_err();
    assert_eq!(
        err,
        LqrError::Factorization {
            stage: 0,
            block: "control"
        }
    );

    let mut st = settings(1e-8, 1e-8);
    st.policy = ProximalPolicy {
        mu_growth: 10.0,
        mu_max: 10.0,
        max_bumps: 12,
    };
    let sol = solve(&prob, &st, None).unwrap();
    assert_eq!(sol.info.mu_bumps, 8);
    assert!(sol.info.mu > 0.5);
}

#[test]
fn test_forward_is_reentrant() {
    let mut rng = seeded_rng(8);
    let dims = [(2, 1, 0), (2, 1, 1), (2, 0, 0)];
    let mut prob = random_problem(&mut rng, &dims, false);
    parameterize(&mut rng, &mut prob, 1);
    let ws = ProximalRiccatiSolver::new(&prob).backward(1e-8, 1e-8).unwrap();

    let thetas: Vec<DVector<f64>> = (0..4).map(|i| DVector::from_vec(vec![i as f64])).collect();
    let sequential: Vec<_> = thetas
        .iter()
        .map(|th| {
            let mut traj = init_trajectory(&prob);
            ws.forward(&mut traj, Some(th)).unwrap();
            traj
        })
        .collect();

    let parallel: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = thetas
            .iter()
            .map(|th| {
                let ws = &ws;
                let prob = &prob;
                s.spawn(move || {
                    let mut traj = init_trajectory(prob);
                    ws.forward(&mut traj, Some(th)).unwrap();
                    traj
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (a, b) in sequential.iter().zip(&parallel) {
        assert_eq!(a, b);
    }
}

#[test]
fn test_singular_dynamics_reported() {
    let mut rng = seeded_rng(2);
    let dims = [(2, 1, 0), (2, 1, 0), (2, 0, 0)];
    let mut prob = random_problem(&mut rng, &dims, true);
    prob.stage_mut(1).E = DMatrix::zeros(2, 2);
    let err = ProximalRiccatiSolver::new(&prob)
        .backward(1e-8, 1e-8)
        .unwrap_err();
    assert_eq!(err, LqrError::SingularDynamics { stage: 1 });
}

#[test]
fn test_dimension_errors() {
    let mut rng = seeded_rng(4);
    let dims = [(2, 1, 0), (2, 0, 0)];
    let mut prob = random_problem(&mut rng, &dims, false);

    prob.stage_mut(0).B = DMatrix::zeros(3, 1);
    assert!(matches!(
        ProximalRiccatiSolver::new(&prob).backward(1e-8, 1e-8),
        Err(LqrError::Dimension { stage: 0, .. })
    ));
    prob.stage_mut(0).B = DMatrix::zeros(2, 1);

    let ws = ProximalRiccatiSolver::new(&prob).backward(1e-8, 1e-8).unwrap();
    let mut traj = init_trajectory(&prob);
    traj.xs.pop();
    assert!(matches!(
        ws.forward(&mut traj, None),
        Err(LqrError::Dimension { .. })
    ));

    let mut traj = init_trajectory(&prob);
    assert!(matches!(
        ws.forward_from_state(&DVector::zeros(5), &mut traj, None),
        Err(LqrError::Dimension { stage: 0, .. })
    ));
}

#[test]
fn test_invalid_regularization() {
    let mut rng = seeded_rng(6);
    let dims = [(2, 1, 1), (2, 0, 0)];
    let prob = random_problem(&mut rng, &dims, false);
    let solver = ProximalRiccatiSolver::new(&prob);
    assert!(matches!(
        solver.backward(1e-8, 0.0),
        Err(LqrError::Regularization(_))
    ));
    assert!(matches!(
        solver.backward(f64::INFINITY, 1e-8),
        Err(LqrError::Regularization(_))
    ));
}
