//! Result records, console table and JSON output.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchRecord {
    pub scenario: String,
    pub horizon: usize,
    pub nx: usize,
    pub nu: usize,
    pub nth: usize,
    pub repeat: usize,
    pub backward_us: f64,
    pub forward_us: f64,
    pub mu: f64,
    pub mu_bumps: usize,
    pub primal_residual: f64,
    pub stationarity: f64,
    pub optimal_value: f64,
    /// Largest primal gap to the dense KKT solution, when computed.
    pub kkt_gap: Option<f64>,
    /// Periodicity gap `|x₀ - x_T|∞` after the θ solve.
    pub periodic_gap: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerfSummary {
    pub total_backward_us: f64,
    pub total_forward_us: f64,
    pub worst_residual: f64,
    pub cases: usize,
}

pub fn perf_summary(records: &[BenchRecord]) -> PerfSummary {
    records.iter().fold(
        PerfSummary {
            total_backward_us: 0.0,
            total_forward_us: 0.0,
            worst_residual: 0.0,
            cases: 0,
        },
        |mut acc, r| {
            acc.total_backward_us += r.backward_us;
            acc.total_forward_us += r.forward_us;
            acc.worst_residual = acc.worst_residual.max(r.primal_residual);
            acc.cases += 1;
            acc
        },
    )
}

fn opt(v: Option<f64>) -> String {
    v.map_or_else(|| "-".to_string(), |x| format!("{x:.2e}"))
}

pub fn print_table(records: &[BenchRecord]) {
    println!(
        "{:<12} {:>6} {:>4} {:>4} {:>4} {:>12} {:>12} {:>10} {:>10} {:>10} {:>10}",
        "scenario", "T", "nx", "nu", "nth", "backward_us", "forward_us", "primal", "kkt_gap",
        "periodic", "bumps"
    );
    println!("{}", "-".repeat(106));
    for r in records {
        println!(
            "{:<12} {:>6} {:>4} {:>4} {:>4} {:>12.1} {:>12.1} {:>10.2e} {:>10} {:>10} {:>10}",
            r.scenario,
            r.horizon,
            r.nx,
            r.nu,
            r.nth,
            r.backward_us,
            r.forward_us,
            r.primal_residual,
            opt(r.kkt_gap),
            opt(r.periodic_gap),
            r.mu_bumps
        );
    }

    let summary = perf_summary(records);
    println!("{}", "-".repeat(106));
    println!(
        "{} cases, backward {:.1} us, forward {:.1} us, worst primal residual {:.2e}",
        summary.cases, summary.total_backward_us, summary.total_forward_us, summary.worst_residual
    );
}

#[derive(Serialize)]
struct JsonReport<'a> {
    summary: PerfSummary,
    records: &'a [BenchRecord],
}

pub fn write_json(path: &Path, records: &[BenchRecord]) -> Result<()> {
    let report = JsonReport {
        summary: perf_summary(records),
        records,
    };
    let contents = serde_json::to_string_pretty(&report)?;
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
