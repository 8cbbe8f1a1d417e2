//! Eigenmode solvers and the types they share
//!
//! Both formulations rasterize the structure, assemble a sparse operator,
//! and hand it to the shift-invert eigensolver. They differ in the unknowns
//! (one scalar component on cells versus coupled Hx/Hy on nodes) and in
//! the post-processing that produces the reported field components.

pub mod full;
pub mod semi;

use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::fmt;

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::eigen::{EigenOptions, EigenPairs};
use crate::error::{ModeError, Result};
use crate::grid::{GridIndex, Mesh};
use crate::operator::Boundary;
use crate::structure::LayeredStructure;

pub use full::FullVectorial;
pub use semi::SemiVectorial;

/// Complex field sampled on the cell-centre grid, indexed `(i, j)`
pub type Field = DMatrix<Complex64>;

/// Field component
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Component {
    Ex,
    Ey,
    Ez,
    Hx,
    Hy,
    Hz,
}

impl Component {
    pub const ALL: [Component; 6] = [
        Component::Ex,
        Component::Ey,
        Component::Ez,
        Component::Hx,
        Component::Hy,
        Component::Hz,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Component::Ex => "Ex",
            Component::Ey => "Ey",
            Component::Ez => "Ez",
            Component::Hx => "Hx",
            Component::Hy => "Hy",
            Component::Hz => "Hz",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    pub fn is_electric(&self) -> bool {
        matches!(self, Component::Ex | Component::Ey | Component::Ez)
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One guided mode
#[derive(Debug, Clone, PartialEq)]
pub struct Mode {
    /// Position in the solution, 0 = highest `Re(neff)`
    pub number: usize,
    pub neff: Complex64,
    pub fields: BTreeMap<Component, Field>,
}

impl Mode {
    pub fn field(&self, c: Component) -> Option<&Field> {
        self.fields.get(&c)
    }
}

/// Output of a single solve
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    /// Effective indices, strictly descending in real part
    pub neff: Vec<Complex64>,
    /// Empty unless fields were requested
    pub modes: Vec<Mode>,
    /// Grid the mode fields are defined on (cell centres of this mesh)
    pub mesh: Mesh,
    pub wavelength: f64,
}

/// Warm-start field from a previous solve, on the cell grid
#[derive(Debug, Clone, PartialEq)]
pub enum ModeGuess {
    /// Semi-vectorial component
    Scalar(Field),
    /// Full-vectorial transverse magnetic field
    Transverse { hx: Field, hy: Field },
}

impl ModeGuess {
    /// Guess matching `mode`, as the solver of `kind` would consume it
    pub fn from_mode(mode: &Mode, kind: SolverKind) -> Option<Self> {
        match kind {
            SolverKind::Full => Some(ModeGuess::Transverse {
                hx: mode.field(Component::Hx)?.clone(),
                hy: mode.field(Component::Hy)?.clone(),
            }),
            SolverKind::Semi => mode
                .field(Component::Ex)
                .or_else(|| mode.field(Component::Ey))
                .cloned()
                .map(ModeGuess::Scalar),
        }
    }
}

/// Per-solve parameters
#[derive(Debug, Clone)]
pub struct SolveOptions {
    /// Number of modes to find
    pub n_eigs: usize,
    /// Relative Ritz residual bound
    pub tol: f64,
    /// Reconstruct and return mode fields
    pub compute_fields: bool,
    /// Effective index around which to search; defaults to the peak index
    pub initial_eff_index_guess: Option<f64>,
    pub initial_mode_guess: Option<ModeGuess>,
    /// Restart budget of the eigensolver
    pub max_iterations: usize,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            n_eigs: 2,
            tol: 1e-3,
            compute_fields: true,
            initial_eff_index_guess: None,
            initial_mode_guess: None,
            max_iterations: 1000,
        }
    }
}

impl SolveOptions {
    fn validate(&self, unknowns: usize) -> Result<()> {
        if self.n_eigs == 0 || self.n_eigs > unknowns {
            return Err(ModeError::config(format!(
                "n_eigs {} outside [1, {}]",
                self.n_eigs, unknowns
            )));
        }
        if !(self.tol.is_finite() && self.tol > 0.0) {
            return Err(ModeError::config(format!("tolerance {} must be positive", self.tol)));
        }
        if let Some(n) = self.initial_eff_index_guess {
            if !(n.is_finite() && n > 0.0) {
                return Err(ModeError::config(format!("effective index guess {} must be positive", n)));
            }
        }
        Ok(())
    }

    fn eigen_options(&self) -> EigenOptions {
        EigenOptions {
            nev: self.n_eigs,
            tol: self.tol,
            max_restarts: self.max_iterations,
            subspace: None,
        }
    }
}

/// Which formulation to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    /// Scalar Ex or Ey on the cell grid
    Semi,
    /// Coupled Hx/Hy on the node grid
    #[default]
    Full,
}

/// Common interface of both formulations
pub trait ModeSolver {
    fn name(&self) -> &'static str;

    fn solve(&self, structure: &LayeredStructure, opts: &SolveOptions) -> Result<Solution>;
}

/// Free-space wavenumber (rad/µm)
pub fn wavenumber(wavelength: f64) -> f64 {
    2.0 * PI / wavelength
}

/// Shift `σ = (k0·n_guess)²`, with the peak index as the default guess
fn shift(k0: f64, max_permittivity: f64, opts: &SolveOptions) -> f64 {
    let n_guess = opts.initial_eff_index_guess.unwrap_or_else(|| max_permittivity.sqrt());
    (k0 * n_guess).powi(2)
}

/// Flatten a cell-grid field, checking its shape
fn flatten(field: &Field, grid: GridIndex) -> Result<DVector<Complex64>> {
    if field.shape() != (grid.nx, grid.ny) {
        return Err(ModeError::DimensionMismatch {
            expected: (grid.nx, grid.ny),
            found: field.shape(),
        });
    }
    let mut v = DVector::zeros(grid.len());
    for i in 0..grid.nx {
        for j in 0..grid.ny {
            v[grid.idx(i, j)] = field[(i, j)];
        }
    }
    Ok(v)
}

/// Inverse of [`flatten`]
fn unflatten(v: &[Complex64], grid: GridIndex) -> Field {
    DMatrix::from_fn(grid.nx, grid.ny, |i, j| v[grid.idx(i, j)])
}

/// Scale every field so the largest-magnitude sample of the `reference`
/// components becomes `1 + 0j`
fn normalize(fields: &mut BTreeMap<Component, Field>, reference: &[Component]) {
    let mut peak = Complex64::new(0.0, 0.0);
    for c in reference {
        if let Some(f) = fields.get(c) {
            for z in f.iter() {
                if z.norm() > peak.norm() {
                    peak = *z;
                }
            }
        }
    }
    if peak.norm() == 0.0 {
        return;
    }
    let scale = Complex64::new(1.0, 0.0) / peak;
    for f in fields.values_mut() {
        *f *= scale;
    }
}

/// Convert eigenpairs into a sorted [`Solution`], building fields with
/// `fields_of` when requested. Fewer pairs than requested is an error that
/// still carries the partial result.
fn assemble_solution(
    solver: &str,
    pairs: EigenPairs,
    k0: f64,
    mesh: Mesh,
    wavelength: f64,
    opts: &SolveOptions,
    mut fields_of: impl FnMut(&DVector<Complex64>, Complex64) -> BTreeMap<Component, Field>,
) -> Result<Solution> {
    let mut found: Vec<(Complex64, DVector<Complex64>)> = pairs
        .values
        .into_iter()
        .zip(pairs.vectors)
        .map(|(lambda, v)| (lambda.sqrt() / k0, v))
        .collect();
    found.sort_by(|a, b| b.0.re.total_cmp(&a.0.re));

    let modes = if opts.compute_fields {
        found
            .iter()
            .enumerate()
            .map(|(number, (neff, v))| Mode { number, neff: *neff, fields: fields_of(v, *neff) })
            .collect()
    } else {
        Vec::new()
    };
    let solution = Solution {
        neff: found.iter().map(|(n, _)| *n).collect(),
        modes,
        mesh,
        wavelength,
    };

    if solution.neff.len() < opts.n_eigs {
        warn!(
            solver,
            requested = opts.n_eigs,
            converged = solution.neff.len(),
            "eigensolver did not converge for all requested modes"
        );
        return Err(ModeError::NotConverged {
            requested: opts.n_eigs,
            converged: solution.neff.len(),
            partial: Box::new(solution),
        });
    }
    info!(
        solver,
        modes = solution.neff.len(),
        restarts = pairs.restarts,
        neff0 = solution.neff.first().map(|n| n.re),
        "mode solve complete"
    );
    Ok(solution)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_names() {
        for c in Component::ALL {
            assert_eq!(Component::from_name(c.name()), Some(c));
        }
        assert_eq!(Component::from_name("Dx"), None);
        assert!(Component::Ez.is_electric());
        assert!(!Component::Hz.is_electric());
    }

    #[test]
    fn test_normalize_peak_is_one() {
        let mut fields = BTreeMap::new();
        let mut hx = Field::zeros(2, 2);
        hx[(1, 0)] = Complex64::new(0.0, -2.0);
        hx[(0, 1)] = Complex64::new(1.0, 0.0);
        let mut ez = Field::zeros(2, 2);
        ez[(0, 0)] = Complex64::new(5.0, 0.0);
        fields.insert(Component::Hx, hx);
        fields.insert(Component::Ez, ez);
        normalize(&mut fields, &[Component::Hx, Component::Hy]);
        assert_eq!(fields[&Component::Hx][(1, 0)], Complex64::new(1.0, 0.0));
        assert!((fields[&Component::Ez][(0, 0)] - Complex64::new(0.0, 2.5)).norm() < 1e-12);
    }

    #[test]
    fn test_flatten_checks_shape() {
        let grid = GridIndex::new(3, 4);
        let f = Field::from_fn(3, 4, |i, j| Complex64::new(i as f64, j as f64));
        let v = flatten(&f, grid).unwrap();
        assert_eq!(unflatten(v.as_slice(), grid), f);
        match flatten(&Field::zeros(4, 3), grid) {
            Err(ModeError::DimensionMismatch { expected, found }) => {
                assert_eq!(expected, (3, 4));
                assert_eq!(found, (4, 3));
            }
            other => panic!("expected mismatch, got {:?}", other),
        }
    }

    fn pairs(lambdas: &[f64]) -> EigenPairs {
        EigenPairs {
            values: lambdas.iter().map(|&l| Complex64::new(l, 0.0)).collect(),
            vectors: lambdas.iter().map(|_| DVector::from_element(4, Complex64::new(0.5, 0.0))).collect(),
            restarts: 3,
        }
    }

    fn no_fields(_: &DVector<Complex64>, _: Complex64) -> BTreeMap<Component, Field> {
        BTreeMap::new()
    }

    #[test]
    fn test_solution_sorted_by_descending_index() {
        let mesh = Mesh::stacked(0.1, 0.2, 0.1, 3).unwrap();
        let k0 = 2.0;
        let opts = SolveOptions { n_eigs: 2, ..Default::default() };
        let sol = assemble_solution("test", pairs(&[16.0, 36.0]), k0, mesh, 1.55, &opts, no_fields).unwrap();
        assert_eq!(sol.neff, vec![Complex64::new(3.0, 0.0), Complex64::new(2.0, 0.0)]);
        assert_eq!(sol.modes.len(), 2);
        assert_eq!(sol.modes[1].number, 1);
    }

    #[test]
    fn test_partial_convergence_keeps_result() {
        let mesh = Mesh::stacked(0.1, 0.2, 0.1, 3).unwrap();
        let opts = SolveOptions { n_eigs: 3, compute_fields: false, ..Default::default() };
        let err = assemble_solution("test", pairs(&[16.0]), 2.0, mesh, 1.55, &opts, no_fields).unwrap_err();
        assert_eq!(err.converged_count(), Some(1));
        match err {
            ModeError::NotConverged { requested, partial, .. } => {
                assert_eq!(requested, 3);
                assert_eq!(partial.neff, vec![Complex64::new(2.0, 0.0)]);
                assert!(partial.modes.is_empty());
            }
            other => panic!("expected non-convergence, got {:?}", other),
        }
    }

    #[test]
    fn test_options_validation() {
        assert!(SolveOptions::default().validate(10).is_ok());
        assert!(SolveOptions { n_eigs: 0, ..Default::default() }.validate(10).is_err());
        assert!(SolveOptions { n_eigs: 11, ..Default::default() }.validate(10).is_err());
        assert!(SolveOptions { tol: 0.0, ..Default::default() }.validate(10).is_err());
        assert!(SolveOptions { initial_eff_index_guess: Some(-1.0), ..Default::default() }
            .validate(10)
            .is_err());
    }
}
