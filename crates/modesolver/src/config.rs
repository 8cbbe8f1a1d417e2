//! Run description read by [`crate::run`] and the `modesolver` binary

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::operator::{Boundary, ScalarField};
use crate::solver::{FullVectorial, ModeSolver, SemiVectorial, SolveOptions, SolverKind};
use crate::structure::LayeredStructure;
use crate::waveguide::{RidgeWaveguide, WaveguideArray};

/// Geometry to build
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Geometry {
    Ridge(RidgeWaveguide),
    Array(WaveguideArray),
}

impl Default for Geometry {
    fn default() -> Self {
        Geometry::Ridge(RidgeWaveguide::default())
    }
}

impl Geometry {
    pub fn build(&self) -> Result<LayeredStructure> {
        match self {
            Geometry::Ridge(r) => r.build(),
            Geometry::Array(a) => a.build(),
        }
    }
}

/// Solver selection and eigensolver controls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    pub kind: SolverKind,
    /// Component solved for by the semi-vectorial formulation
    pub field: ScalarField,
    pub boundary: Boundary,
    pub n_eigs: usize,
    pub tol: f64,
    pub compute_fields: bool,
    /// Effective index to search around; defaults to the peak index
    pub n_eff_guess: Option<f64>,
    pub max_iterations: usize,
}

impl Default for SolverSettings {
    fn default() -> Self {
        let opts = SolveOptions::default();
        Self {
            kind: SolverKind::Full,
            field: ScalarField::Ex,
            boundary: Boundary::default(),
            n_eigs: opts.n_eigs,
            tol: opts.tol,
            compute_fields: opts.compute_fields,
            n_eff_guess: None,
            max_iterations: opts.max_iterations,
        }
    }
}

impl SolverSettings {
    pub fn solver(&self) -> Box<dyn ModeSolver> {
        match self.kind {
            SolverKind::Semi => Box::new(SemiVectorial::new(self.field, self.boundary)),
            SolverKind::Full => Box::new(FullVectorial::new(self.boundary)),
        }
    }

    pub fn options(&self) -> SolveOptions {
        SolveOptions {
            n_eigs: self.n_eigs,
            tol: self.tol,
            compute_fields: self.compute_fields,
            initial_eff_index_guess: self.n_eff_guess,
            initial_mode_guess: None,
            max_iterations: self.max_iterations,
        }
    }
}

/// Complete run: geometry plus solver settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub geometry: Geometry,
    pub solver: SolverSettings,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::Edge;

    #[test]
    fn test_empty_config_is_reference_strip() {
        let cfg: RunConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.solver.kind, SolverKind::Full);
        assert_eq!(cfg.solver.n_eigs, 2);
        let s = cfg.geometry.build().unwrap();
        assert!((s.height() - 1.22).abs() < 1e-12);
        assert_eq!(cfg.solver.solver().name(), "full-vectorial");
    }

    #[test]
    fn test_parse_semi_array() {
        let json = r#"{
            "geometry": {"type": "array", "wg_widths": [0.4, 0.4], "wg_gaps": [0.3]},
            "solver": {"kind": "semi", "field": "Ey", "boundary": "000S", "n_eigs": 3}
        }"#;
        let cfg: RunConfig = serde_json::from_str(json).unwrap();
        assert!(matches!(cfg.geometry, Geometry::Array(_)));
        assert_eq!(cfg.solver.field, ScalarField::Ey);
        assert_eq!(cfg.solver.boundary.west, Edge::Symmetric);
        assert_eq!(cfg.solver.options().n_eigs, 3);
        assert_eq!(cfg.solver.solver().name(), "semi-vectorial");
        assert_eq!(cfg.geometry.build().unwrap().slabs()[1].shapes.len(), 2);
    }

    #[test]
    fn test_bad_boundary_rejected() {
        let json = r#"{"solver": {"boundary": "00X0"}}"#;
        assert!(serde_json::from_str::<RunConfig>(json).is_err());
    }
}
