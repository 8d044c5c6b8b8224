//! Benchmarking CLI for the proximal Riccati solver.

mod problems;
mod report;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use lqr_core::linalg::dense::inf_norm;
use lqr_core::{
    init_trajectory, KktSystem, LqrProblem, ProximalPolicy, ProximalRiccatiSolver, Trajectory,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use report::BenchRecord;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ScenarioChoice {
    Tracking,
    Constrained,
    Periodic,
    All,
}

impl ScenarioChoice {
    fn expand(self) -> Vec<ScenarioChoice> {
        match self {
            ScenarioChoice::All => vec![
                ScenarioChoice::Tracking,
                ScenarioChoice::Constrained,
                ScenarioChoice::Periodic,
            ],
            other => vec![other],
        }
    }

    fn name(self) -> &'static str {
        match self {
            ScenarioChoice::Tracking => "tracking",
            ScenarioChoice::Constrained => "constrained",
            ScenarioChoice::Periodic => "periodic",
            ScenarioChoice::All => "all",
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "lqr-bench", about = "Benchmarks for the proximal Riccati LQR solver")]
struct Cli {
    /// Scenario to run.
    #[arg(long, value_enum, default_value = "all")]
    scenario: ScenarioChoice,

    /// Horizons to run, comma separated.
    #[arg(long, value_delimiter = ',', default_values_t = [50usize, 200, 1000])]
    horizon: Vec<usize>,

    /// State dimension (rounded up to an even number).
    #[arg(long, default_value_t = 6)]
    nx: usize,

    /// Control dimension.
    #[arg(long, default_value_t = 3)]
    nu: usize,

    #[arg(long, default_value_t = 12345)]
    seed: u64,

    /// Timed repetitions of the backward/forward pair.
    #[arg(long, default_value_t = 10)]
    repeat: usize,

    #[arg(long, default_value_t = 1e-8)]
    mu: f64,

    #[arg(long, default_value_t = 1e-8)]
    mu_eq: f64,

    /// Cross-check against the dense KKT solve for horizons up to this size.
    #[arg(long, default_value_t = 0)]
    kkt_max_horizon: usize,

    /// Write the records as JSON.
    #[arg(long)]
    json: Option<PathBuf>,
}

fn build(choice: ScenarioChoice, horizon: usize, cli: &Cli) -> Result<LqrProblem> {
    let nx = cli.nx + cli.nx % 2;
    Ok(match choice {
        ScenarioChoice::Tracking => problems::generate_tracking(horizon, nx, cli.nu, cli.seed)?,
        ScenarioChoice::Constrained => {
            problems::generate_constrained(horizon, nx, cli.nu, cli.seed)?
        }
        ScenarioChoice::Periodic => problems::generate_periodic(horizon, nx, cli.nu, cli.seed)?,
        ScenarioChoice::All => bail!("'all' is expanded before building"),
    })
}

fn run_case(choice: ScenarioChoice, prob: &LqrProblem, cli: &Cli) -> Result<BenchRecord> {
    let solver = ProximalRiccatiSolver::new(prob);
    let policy = ProximalPolicy::default();
    let repeat = cli.repeat.max(1);

    let mut backward_us = 0.0;
    let mut forward_us = 0.0;
    let mut traj = init_trajectory(prob);
    let mut last = None;
    for _ in 0..repeat {
        let start = Instant::now();
        let (ws, reg) = solver.backward_with_policy(cli.mu, cli.mu_eq, &policy)?;
        backward_us += start.elapsed().as_secs_f64() * 1e6;

        let theta = if prob.nth() > 0 {
            Some(ws.optimal_parameter()?)
        } else {
            None
        };

        let start = Instant::now();
        let info = ws.forward(&mut traj, theta.as_ref())?;
        forward_us += start.elapsed().as_secs_f64() * 1e6;

        let value = ws.optimal_value(theta.as_ref())?;
        last = Some((info, value, theta, reg));
    }
    let Some((info, optimal_value, theta, reg)) = last else {
        bail!("no repetition ran");
    };

    let horizon = prob.horizon();
    let kkt_gap = if horizon <= cli.kkt_max_horizon {
        let oracle = KktSystem::assemble(prob, reg.mu, reg.mu_eq, theta.as_ref())?.solve()?;
        Some(traj.primal_distance(&oracle))
    } else {
        None
    };
    let periodic_gap = theta.as_ref().map(|_| periodicity_gap(&traj));

    Ok(BenchRecord {
        scenario: choice.name().to_string(),
        horizon,
        nx: prob.stage(0).nx,
        nu: prob.stage(0).nu,
        nth: prob.nth(),
        repeat,
        backward_us: backward_us / repeat as f64,
        forward_us: forward_us / repeat as f64,
        mu: reg.mu,
        mu_bumps: reg.bumps,
        primal_residual: info.dynamics.max(info.constraints),
        stationarity: info.stationarity,
        optimal_value,
        kkt_gap,
        periodic_gap,
    })
}

fn periodicity_gap(traj: &Trajectory) -> f64 {
    let last = traj.len() - 1;
    inf_norm(&(&traj.xs[0] - &traj.xs[last]))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if cli.nu == 0 {
        bail!("--nu must be positive");
    }

    println!("Proximal Riccati Benchmarks");
    println!("===========================\n");

    let mut records = Vec::new();
    for choice in cli.scenario.expand() {
        for &horizon in &cli.horizon {
            let prob = build(choice, horizon, &cli)?;
            info!(scenario = choice.name(), horizon, "running");
            records.push(run_case(choice, &prob, &cli)?);
        }
    }

    report::print_table(&records);

    if let Some(path) = &cli.json {
        report::write_json(path, &records)?;
        println!("\nwrote {}", path.display());
    }
    Ok(())
}
