//! Semi-vectorial solver: one transverse electric component on the cell grid

use std::collections::BTreeMap;

use tracing::debug;

use super::{
    assemble_solution, flatten, normalize, shift, unflatten, wavenumber, Component, ModeGuess,
    ModeSolver, Solution, SolveOptions,
};
use crate::eigen::shift_invert;
use crate::error::{ModeError, Result};
use crate::grid::GridIndex;
use crate::operator::{assemble_semi, Boundary, ScalarField};
use crate::structure::LayeredStructure;

/// Scalar `Ex` or `Ey` formulation with interface-aware differences
/// across the component's normal direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SemiVectorial {
    pub field: ScalarField,
    pub boundary: Boundary,
}

impl SemiVectorial {
    pub fn new(field: ScalarField, boundary: Boundary) -> Self {
        Self { field, boundary }
    }

    fn component(&self) -> Component {
        match self.field {
            ScalarField::Ex => Component::Ex,
            ScalarField::Ey => Component::Ey,
        }
    }
}

impl Default for SemiVectorial {
    fn default() -> Self {
        Self::new(ScalarField::Ex, Boundary::default())
    }
}

impl ModeSolver for SemiVectorial {
    fn name(&self) -> &'static str {
        "semi-vectorial"
    }

    fn solve(&self, structure: &LayeredStructure, opts: &SolveOptions) -> Result<Solution> {
        let map = structure.rasterize()?;
        let (ncx, ncy) = map.cells.shape();
        let grid = GridIndex::new(ncx, ncy);
        opts.validate(grid.len())?;

        let guess = match &opts.initial_mode_guess {
            None => None,
            Some(ModeGuess::Scalar(f)) => Some(flatten(f, grid)?),
            Some(ModeGuess::Transverse { .. }) => {
                return Err(ModeError::config(
                    "semi-vectorial solver takes a scalar mode guess",
                ))
            }
        };

        let k0 = wavenumber(structure.wavelength);
        let a = assemble_semi(&map, k0, self.field, self.boundary);
        let sigma = shift(k0, map.max(), opts);
        debug!(
            field = ?self.field,
            unknowns = grid.len(),
            nnz = a.nnz(),
            sigma,
            "assembled semi-vectorial operator"
        );

        let pairs = shift_invert(&a, sigma, guess.as_ref(), &opts.eigen_options())?;
        let component = self.component();
        assemble_solution(
            self.name(),
            pairs,
            k0,
            map.mesh.clone(),
            structure.wavelength,
            opts,
            |v, _neff| {
                let mut fields = BTreeMap::new();
                fields.insert(component, unflatten(v.as_slice(), grid));
                normalize(&mut fields, &[component]);
                fields
            },
        )
    }
}
