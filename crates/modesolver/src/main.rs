//! modesolver: CLI for solving waveguide modes from a JSON run description

use anyhow::{Context, Result};
use clap::Parser;
use modesolver::{run_config, Boundary, RunConfig, ScalarField, SolverKind};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "modesolver")]
#[command(about = "Finite-difference eigenmode solver for layered dielectric waveguides")]
#[command(version)]
struct Args {
    /// Input JSON run description (defaults to the reference strip)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output JSON report (printed to stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Solver formulation (semi, full)
    #[arg(long)]
    solver: Option<String>,

    /// Semi-vectorial field component (Ex, Ey)
    #[arg(long)]
    field: Option<String>,

    /// Boundary code, North South East West (e.g. 000S)
    #[arg(long)]
    boundary: Option<String>,

    /// Number of modes
    #[arg(long)]
    n_eigs: Option<usize>,

    /// Effective index to search around
    #[arg(long)]
    n_eff_guess: Option<f64>,

    /// Skip field reconstruction and classification
    #[arg(long)]
    no_fields: bool,
}

fn parse_kind(s: &str) -> Result<SolverKind> {
    match s.to_lowercase().as_str() {
        "semi" | "semi-vectorial" | "sv" => Ok(SolverKind::Semi),
        "full" | "full-vectorial" | "fv" => Ok(SolverKind::Full),
        _ => anyhow::bail!("Unknown solver: {}. Use: semi or full", s),
    }
}

fn parse_field(s: &str) -> Result<ScalarField> {
    match s.to_lowercase().as_str() {
        "ex" => Ok(ScalarField::Ex),
        "ey" => Ok(ScalarField::Ey),
        _ => anyhow::bail!("Unknown field component: {}. Use: Ex or Ey", s),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    // Read input
    let mut config: RunConfig = match &args.input {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("Failed to read input file: {:?}", path))?;
            serde_json::from_str(&json)
                .with_context(|| format!("Invalid run description in {:?}", path))?
        }
        None => RunConfig::default(),
    };

    // Apply overrides
    if let Some(s) = &args.solver {
        config.solver.kind = parse_kind(s)?;
    }
    if let Some(s) = &args.field {
        config.solver.field = parse_field(s)?;
    }
    if let Some(s) = &args.boundary {
        config.solver.boundary = s.parse::<Boundary>()?;
    }
    if let Some(n) = args.n_eigs {
        config.solver.n_eigs = n;
    }
    if args.n_eff_guess.is_some() {
        config.solver.n_eff_guess = args.n_eff_guess;
    }
    if args.no_fields {
        config.solver.compute_fields = false;
    }

    let report = run_config(&config).context("Mode solve failed")?;

    for (k, (re, im)) in report.record.n_effs_real.iter().zip(&report.record.n_effs_imag).enumerate() {
        let label = report
            .classification
            .as_ref()
            .and_then(|c| c.labels.get(k))
            .map(|l| format!("{:?} ({:.1}% dominant)", l.polarization, l.dominant))
            .unwrap_or_default();
        tracing::info!("mode {}: neff = {:.6} {:+.3e}j {}", k, re, im, label);
    }

    // Output
    let json = serde_json::to_string_pretty(&report)?;
    write_report(&json, args.output.as_deref(), &mut io::stdout().lock())
}

/// Write the report to `path`, or to `stdout` when no path is given
fn write_report(json: &str, path: Option<&Path>, stdout: &mut impl Write) -> Result<()> {
    match path {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("Failed to write output file: {:?}", path))?;
            eprintln!("Wrote mode report: {:?}", path);
        }
        None => writeln!(stdout, "{}", json).context("Failed to write report to stdout")?,
    }
    Ok(())
}
