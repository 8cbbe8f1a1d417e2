//! modesolver: finite-difference eigenmode solver for dielectric waveguides
//!
//! This crate provides:
//! - Layered cross-section description and permittivity rasterization
//! - Sparse finite-difference operators with symmetry boundary folding
//! - Semi-vectorial (Ex or Ey) and full-vectorial (Hx/Hy) mode solvers
//! - Polarization classification of the resulting modes
//! - A flat record shape for persisting solutions
//!
//! Lengths are in µm. Effective indices follow `β = k0·neff` with
//! `k0 = 2π/λ`.

pub mod classify;
pub mod config;
pub mod eigen;
pub mod error;
pub mod grid;
pub mod linalg;
pub mod material;
pub mod operator;
pub mod record;
pub mod solver;
pub mod sparse;
pub mod structure;
pub mod waveguide;

pub use classify::{Classification, ModeClassifier, ModeLabel, Polarization};
pub use config::{Geometry, RunConfig, SolverSettings};
pub use error::ModeError;
pub use grid::Mesh;
pub use material::{Dispersion, Material};
pub use operator::{Boundary, Edge, ScalarField};
pub use record::ModeRecord;
pub use solver::{
    Component, Field, FullVectorial, Mode, ModeGuess, ModeSolver, SemiVectorial, Solution,
    SolveOptions, SolverKind,
};
pub use structure::{LayeredStructure, PermittivityMap};
pub use waveguide::{RidgeWaveguide, WaveguideArray};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Everything a run produces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub solver: String,
    pub wavelength: f64,
    pub record: ModeRecord,
    /// Present when fields were computed
    pub classification: Option<Classification>,
}

/// Main entry point: parse a JSON run description, solve and classify
pub fn run(json: &str) -> Result<Report> {
    let config: RunConfig = serde_json::from_str(json).context("Invalid run description")?;
    run_config(&config)
}

/// Solve and classify an already parsed run description
pub fn run_config(config: &RunConfig) -> Result<Report> {
    let structure = config.geometry.build().context("Failed to build geometry")?;
    let solver = config.solver.solver();
    let solution = solver
        .solve(&structure, &config.solver.options())
        .with_context(|| format!("{} solve failed", solver.name()))?;

    let classification = if solution.modes.is_empty() {
        None
    } else {
        Some(ModeClassifier.classify(&solution).context("Failed to classify modes")?)
    };
    if let Some(c) = &classification {
        info!(te = c.te_neffs.len(), tm = c.tm_neffs.len(), hybrid = c.hybrid_count(), "classified modes");
    }

    Ok(Report {
        solver: solver.name().to_string(),
        wavelength: structure.wavelength,
        record: ModeRecord::from_solution(&solution),
        classification,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_json_reports_context() {
        let err = run("{ not json").unwrap_err();
        assert_eq!(err.to_string(), "Invalid run description");
    }

    #[test]
    fn test_invalid_geometry_reports_context() {
        let err = run(r#"{"geometry": {"type": "ridge", "wg_width": 5.0}}"#).unwrap_err();
        assert_eq!(err.to_string(), "Failed to build geometry");
        assert!(err.root_cause().to_string().contains("leaves the domain"));
    }
}
