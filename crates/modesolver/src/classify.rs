//! Polarization labelling from per-component field energy

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{ModeError, Result};
use crate::grid::Mesh;
use crate::solver::{Component, Field, Mode, Solution};

/// Dominant-component label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarization {
    /// Ex dominates
    QuasiTe,
    /// Ey dominates
    QuasiTm,
    /// Ez dominates
    Hybrid,
}

/// Per-mode energy breakdown and label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeLabel {
    pub mode: usize,
    pub neff: Complex64,
    pub polarization: Polarization,
    /// Ex, Ey, Ez shares of the electric energy (%)
    pub e_fractions: [f64; 3],
    /// Hx, Hy, Hz shares of the magnetic energy (%), when H was solved for
    pub h_fractions: Option<[f64; 3]>,
    /// Ex / (Ex + Ey)
    pub te_fraction: f64,
    /// Ey / (Ex + Ey)
    pub tm_fraction: f64,
    /// Share of the winning component (%)
    pub dominant: f64,
    /// (∫|E|²)² / ∫|E|⁴ (µm²)
    pub effective_area: f64,
}

/// Labels for a whole solution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub labels: Vec<ModeLabel>,
    /// Quasi-TE effective indices in solve order
    pub te_neffs: Vec<Complex64>,
    /// Quasi-TM effective indices in solve order
    pub tm_neffs: Vec<Complex64>,
}

impl Classification {
    pub fn hybrid_count(&self) -> usize {
        self.labels.iter().filter(|l| l.polarization == Polarization::Hybrid).count()
    }
}

/// Area-weighted Σ|F|² over the cell grid
fn energy(field: Option<&Field>, mesh: &Mesh) -> f64 {
    let Some(f) = field else { return 0.0 };
    let mut sum = 0.0;
    for i in 0..f.nrows() {
        for j in 0..f.ncols() {
            sum += f[(i, j)].norm_sqr() * mesh.cell_area(i, j);
        }
    }
    sum
}

fn percentages(parts: [f64; 3]) -> Option<[f64; 3]> {
    let total: f64 = parts.iter().sum();
    (total > 0.0).then(|| parts.map(|p| 100.0 * p / total))
}

fn effective_area(mode: &Mode, mesh: &Mesh) -> f64 {
    let (ncx, ncy) = mesh.cell_shape();
    let e = [Component::Ex, Component::Ey, Component::Ez].map(|c| mode.field(c));
    let (mut num, mut den) = (0.0, 0.0);
    for i in 0..ncx {
        for j in 0..ncy {
            let intensity: f64 = e.iter().flatten().map(|f| f[(i, j)].norm_sqr()).sum();
            let area = mesh.cell_area(i, j);
            num += intensity * area;
            den += intensity * intensity * area;
        }
    }
    if den > 0.0 {
        num * num / den
    } else {
        0.0
    }
}

/// Stateless classifier; labelling the same modes twice gives the same result
#[derive(Debug, Clone, Copy, Default)]
pub struct ModeClassifier;

impl ModeClassifier {
    pub fn classify_mode(&self, mode: &Mode, mesh: &Mesh) -> Result<ModeLabel> {
        if let Some(f) = mode.fields.values().next() {
            if f.shape() != mesh.cell_shape() {
                return Err(ModeError::DimensionMismatch { expected: mesh.cell_shape(), found: f.shape() });
            }
        }
        let e = [Component::Ex, Component::Ey, Component::Ez].map(|c| energy(mode.field(c), mesh));
        let h = [Component::Hx, Component::Hy, Component::Hz].map(|c| energy(mode.field(c), mesh));
        let e_fractions =
            percentages(e).ok_or(ModeError::UndefinedPolarization { mode: mode.number })?;
        let has_h = [Component::Hx, Component::Hy, Component::Hz]
            .iter()
            .any(|c| mode.fields.contains_key(c));
        let h_fractions = if has_h { percentages(h) } else { None };

        // Ties resolve toward the earlier component
        let mut best = 0;
        for k in 1..3 {
            if e_fractions[k] > e_fractions[best] {
                best = k;
            }
        }
        let polarization = match best {
            0 => Polarization::QuasiTe,
            1 => Polarization::QuasiTm,
            _ => Polarization::Hybrid,
        };
        let transverse = e[0] + e[1];
        let (te_fraction, tm_fraction) = if transverse > 0.0 {
            (e[0] / transverse, e[1] / transverse)
        } else {
            (0.0, 0.0)
        };

        Ok(ModeLabel {
            mode: mode.number,
            neff: mode.neff,
            polarization,
            e_fractions,
            h_fractions,
            te_fraction,
            tm_fraction,
            dominant: e_fractions[best],
            effective_area: effective_area(mode, mesh),
        })
    }

    pub fn classify(&self, solution: &Solution) -> Result<Classification> {
        let labels = solution
            .modes
            .iter()
            .map(|m| self.classify_mode(m, &solution.mesh))
            .collect::<Result<Vec<_>>>()?;
        let pick = |p: Polarization| {
            labels.iter().filter(|l| l.polarization == p).map(|l| l.neff).collect::<Vec<_>>()
        };
        Ok(Classification {
            te_neffs: pick(Polarization::QuasiTe),
            tm_neffs: pick(Polarization::QuasiTm),
            labels,
        })
    }
}
