//! Full-vectorial solver: coupled Hx/Hy on the node grid
//!
//! The transverse magnetic field is the primary unknown. Once `β` is known
//! the remaining components follow from Maxwell's equations, in units where
//! H is scaled by the free-space impedance and fields vary as `exp(-jβz)`:
//!
//! ```text
//! Hz = (∂x Hx + ∂y Hy) / (jβ)
//! Ez = (∂x Hy - ∂y Hx) / (j k0 ε)
//! Ex = (∂y Hz + jβ Hy) / (j k0 ε)
//! Ey = (-jβ Hx - ∂x Hz) / (j k0 ε)
//! ```
//!
//! Hz and Ez come out on the cell grid; Ex and Ey on the nodes. Node
//! quantities are averaged onto the cells so every reported component
//! shares the cell-centre grid.

use std::collections::BTreeMap;

use nalgebra::DVector;
use num_complex::Complex64;
use tracing::debug;

use super::{
    assemble_solution, flatten, normalize, shift, unflatten, wavenumber, Component, Field,
    ModeGuess, ModeSolver, Solution, SolveOptions,
};
use crate::eigen::shift_invert;
use crate::error::{ModeError, Result};
use crate::grid::GridIndex;
use crate::operator::{assemble_full, Boundary, Staggered};
use crate::sparse::CsrMatrix;
use crate::structure::{LayeredStructure, PermittivityMap};

/// Vector formulation capturing polarization coupling at index steps
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FullVectorial {
    pub boundary: Boundary,
}

impl FullVectorial {
    pub fn new(boundary: Boundary) -> Self {
        Self { boundary }
    }
}

/// Staggered operators and permittivities needed after the solve
struct Reconstruction {
    cells: GridIndex,
    to_cell: CsrMatrix,
    dx_to_cell: CsrMatrix,
    dy_to_cell: CsrMatrix,
    dx_to_node: CsrMatrix,
    dy_to_node: CsrMatrix,
    eps_cells: Vec<f64>,
    eps_nodes: Vec<f64>,
    k0: f64,
}

impl Reconstruction {
    fn new(map: &PermittivityMap, k0: f64) -> Self {
        let st = Staggered::new(&map.mesh);
        let eps_cells = (0..st.cells.len())
            .map(|k| {
                let (i, j) = st.cells.position(k);
                map.cells[(i, j)]
            })
            .collect();
        let eps_nodes = (0..st.nodes.len())
            .map(|k| {
                let (i, j) = st.nodes.position(k);
                map.nodes[(i, j)]
            })
            .collect();
        Self {
            cells: st.cells,
            to_cell: st.node_to_cell(),
            dx_to_cell: st.node_to_cell_dx(),
            dy_to_cell: st.node_to_cell_dy(),
            dx_to_node: st.cell_to_node_dx(),
            dy_to_node: st.cell_to_node_dy(),
            eps_cells,
            eps_nodes,
            k0,
        }
    }

    /// All six components on the cell grid from the interleaved eigenvector
    fn fields(&self, v: &DVector<Complex64>, neff: Complex64) -> BTreeMap<Component, Field> {
        let j = Complex64::new(0.0, 1.0);
        let beta = neff * self.k0;
        let hx: Vec<Complex64> = v.iter().step_by(2).copied().collect();
        let hy: Vec<Complex64> = v.iter().skip(1).step_by(2).copied().collect();

        let dhx_dx = self.dx_to_cell.matvec_complex(&hx);
        let dhx_dy = self.dy_to_cell.matvec_complex(&hx);
        let dhy_dx = self.dx_to_cell.matvec_complex(&hy);
        let dhy_dy = self.dy_to_cell.matvec_complex(&hy);

        let hz: Vec<Complex64> = dhx_dx.iter().zip(&dhy_dy).map(|(a, b)| (a + b) / (j * beta)).collect();
        let ez: Vec<Complex64> = dhy_dx
            .iter()
            .zip(&dhx_dy)
            .zip(&self.eps_cells)
            .map(|((a, b), eps)| (a - b) / (j * self.k0 * *eps))
            .collect();

        let dhz_dx = self.dx_to_node.matvec_complex(&hz);
        let dhz_dy = self.dy_to_node.matvec_complex(&hz);
        let ex_nodes: Vec<Complex64> = (0..hx.len())
            .map(|k| (dhz_dy[k] + j * beta * hy[k]) / (j * self.k0 * self.eps_nodes[k]))
            .collect();
        let ey_nodes: Vec<Complex64> = (0..hx.len())
            .map(|k| (-j * beta * hx[k] - dhz_dx[k]) / (j * self.k0 * self.eps_nodes[k]))
            .collect();

        let mut fields = BTreeMap::new();
        let cells = self.cells;
        let on_cells = |nodes: &[Complex64]| unflatten(&self.to_cell.matvec_complex(nodes), cells);
        fields.insert(Component::Hx, on_cells(&hx));
        fields.insert(Component::Hy, on_cells(&hy));
        fields.insert(Component::Ex, on_cells(&ex_nodes));
        fields.insert(Component::Ey, on_cells(&ey_nodes));
        fields.insert(Component::Hz, unflatten(&hz, cells));
        fields.insert(Component::Ez, unflatten(&ez, cells));
        normalize(&mut fields, &[Component::Hx, Component::Hy]);
        fields
    }
}

/// Map a cell-grid Hx/Hy guess onto the interleaved node unknowns
fn node_guess(map: &PermittivityMap, hx: &Field, hy: &Field) -> Result<DVector<Complex64>> {
    let st = Staggered::new(&map.mesh);
    let hx = flatten(hx, st.cells)?;
    let hy = flatten(hy, st.cells)?;
    let avg = st.cell_to_node();
    let hx = avg.matvec_complex(hx.as_slice());
    let hy = avg.matvec_complex(hy.as_slice());
    let mut v = DVector::zeros(2 * st.nodes.len());
    for k in 0..st.nodes.len() {
        v[2 * k] = hx[k];
        v[2 * k + 1] = hy[k];
    }
    Ok(v)
}

impl ModeSolver for FullVectorial {
    fn name(&self) -> &'static str {
        "full-vectorial"
    }

    fn solve(&self, structure: &LayeredStructure, opts: &SolveOptions) -> Result<Solution> {
        let map = structure.rasterize()?;
        let unknowns = 2 * map.mesh.nx() * map.mesh.ny();
        opts.validate(unknowns)?;

        let guess = match &opts.initial_mode_guess {
            None => None,
            Some(ModeGuess::Transverse { hx, hy }) => Some(node_guess(&map, hx, hy)?),
            Some(ModeGuess::Scalar(_)) => {
                return Err(ModeError::config(
                    "full-vectorial solver takes a transverse (Hx, Hy) mode guess",
                ))
            }
        };

        let k0 = wavenumber(structure.wavelength);
        let a = assemble_full(&map, k0, self.boundary);
        let sigma = shift(k0, map.max(), opts);
        debug!(unknowns, nnz = a.nnz(), sigma, "assembled full-vectorial operator");

        let pairs = shift_invert(&a, sigma, guess.as_ref(), &opts.eigen_options())?;
        let recon = opts.compute_fields.then(|| Reconstruction::new(&map, k0));
        assemble_solution(
            self.name(),
            pairs,
            k0,
            map.mesh.clone(),
            structure.wavelength,
            opts,
            |v, neff| recon.as_ref().map(|r| r.fields(v, neff)).unwrap_or_default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::SolverKind;

    /// Small high-contrast square core in a uniform cladding: node columns
    /// and rows 11..=18
    fn square_core() -> LayeredStructure {
        let mut s = LayeredStructure::new(1.55, 0.05, 0.05, 1.5).unwrap();
        s.add_slab(0.55, 2.085).unwrap();
        let core = s.add_slab(0.4, 2.085).unwrap();
        s.add_material(core, 0.55, 0.9, 12.085, 90.0).unwrap();
        s.add_slab(0.55, 2.085).unwrap();
        s
    }

    #[test]
    fn test_square_core_degenerate_pair() {
        let opts = SolveOptions { n_eigs: 2, tol: 1e-8, ..Default::default() };
        let sol = FullVectorial::default().solve(&square_core(), &opts).unwrap();
        assert_eq!(sol.neff.len(), 2);
        // A square core supports a quasi-degenerate TE/TM pair
        assert!((sol.neff[0].re - sol.neff[1].re).abs() < 0.02, "{:?}", sol.neff);
        assert!(sol.neff[0].re >= sol.neff[1].re);
        for n in &sol.neff {
            assert!(n.re > 2.085f64.sqrt() && n.re < 12.085f64.sqrt());
        }
    }

    #[test]
    fn test_all_components_on_cell_grid() {
        let opts = SolveOptions { n_eigs: 1, ..Default::default() };
        let s = square_core();
        let sol = FullVectorial::default().solve(&s, &opts).unwrap();
        let shape = s.mesh().unwrap().cell_shape();
        let mode = &sol.modes[0];
        for c in Component::ALL {
            assert_eq!(mode.field(c).map(|f| f.shape()), Some(shape), "{}", c);
        }
        let peak = mode.field(Component::Hx).unwrap().iter().chain(mode.field(Component::Hy).unwrap().iter())
            .map(|z| z.norm())
            .fold(0.0, f64::max);
        assert!((peak - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_longitudinal_fields_are_small() {
        let opts = SolveOptions { n_eigs: 1, ..Default::default() };
        let sol = FullVectorial::default().solve(&square_core(), &opts).unwrap();
        let mode = &sol.modes[0];
        let energy = |c: Component| mode.field(c).unwrap().iter().map(|z| z.norm_sqr()).sum::<f64>();
        let transverse = energy(Component::Ex) + energy(Component::Ey);
        assert!(energy(Component::Ez) < transverse);
        assert!(energy(Component::Hz) < energy(Component::Hx) + energy(Component::Hy));
    }

    #[test]
    fn test_scalar_guess_rejected() {
        let opts = SolveOptions {
            n_eigs: 1,
            initial_mode_guess: Some(ModeGuess::Scalar(Field::zeros(30, 30))),
            ..Default::default()
        };
        assert!(FullVectorial::default().solve(&square_core(), &opts).is_err());
    }

    #[test]
    fn test_warm_start_from_previous_mode() {
        let s = square_core();
        let solver = FullVectorial::default();
        let opts = SolveOptions { n_eigs: 1, tol: 1e-8, ..Default::default() };
        let cold = solver.solve(&s, &opts).unwrap();
        let guess = ModeGuess::from_mode(&cold.modes[0], SolverKind::Full);
        assert!(guess.is_some());
        let warm = solver
            .solve(&s, &SolveOptions { initial_mode_guess: guess, ..opts.clone() })
            .unwrap();
        assert!((warm.neff[0] - cold.neff[0]).norm() < 1e-6);
    }
}
