//! Persisted solve results
//!
//! Flat JSON-friendly shape handed to an external cache: real and
//! imaginary parts split, each field as nested `[x][y]` arrays keyed by
//! component name.

use std::collections::BTreeMap;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{ModeError, Result};
use crate::grid::Mesh;
use crate::solver::{Component, Field, Mode, Solution};

type FieldTable = BTreeMap<String, Vec<Vec<f64>>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeRecord {
    pub n_effs_real: Vec<f64>,
    pub n_effs_imag: Vec<f64>,
    pub modes_real: Vec<FieldTable>,
    pub modes_imag: Vec<FieldTable>,
    pub n_modes: usize,
}

fn split(field: &Field) -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
    let re = (0..field.nrows())
        .map(|i| (0..field.ncols()).map(|j| field[(i, j)].re).collect())
        .collect();
    let im = (0..field.nrows())
        .map(|i| (0..field.ncols()).map(|j| field[(i, j)].im).collect())
        .collect();
    (re, im)
}

fn join(name: &str, re: &[Vec<f64>], im: &[Vec<f64>], shape: (usize, usize)) -> Result<Field> {
    let found = (re.len(), re.first().map_or(0, Vec::len));
    let consistent = re.len() == im.len()
        && re.iter().zip(im).all(|(r, i)| r.len() == shape.1 && i.len() == shape.1);
    if found != shape || !consistent {
        return Err(ModeError::config(format!(
            "record field {} does not match the {}×{} cell grid",
            name, shape.0, shape.1
        )));
    }
    Ok(Field::from_fn(shape.0, shape.1, |i, j| Complex64::new(re[i][j], im[i][j])))
}

impl ModeRecord {
    pub fn from_solution(solution: &Solution) -> Self {
        let mut modes_real = Vec::with_capacity(solution.modes.len());
        let mut modes_imag = Vec::with_capacity(solution.modes.len());
        for mode in &solution.modes {
            let mut re_table = FieldTable::new();
            let mut im_table = FieldTable::new();
            for (c, f) in &mode.fields {
                let (re, im) = split(f);
                re_table.insert(c.name().to_string(), re);
                im_table.insert(c.name().to_string(), im);
            }
            modes_real.push(re_table);
            modes_imag.push(im_table);
        }
        Self {
            n_effs_real: solution.neff.iter().map(|n| n.re).collect(),
            n_effs_imag: solution.neff.iter().map(|n| n.im).collect(),
            modes_real,
            modes_imag,
            n_modes: solution.neff.len(),
        }
    }

    /// Rebuild a solution on `mesh`
    pub fn to_solution(&self, mesh: Mesh, wavelength: f64) -> Result<Solution> {
        if self.n_effs_real.len() != self.n_modes || self.n_effs_imag.len() != self.n_modes {
            return Err(ModeError::config(format!(
                "record lists {} modes but {} / {} effective index parts",
                self.n_modes,
                self.n_effs_real.len(),
                self.n_effs_imag.len()
            )));
        }
        if self.modes_real.len() != self.modes_imag.len() {
            return Err(ModeError::config("record has unequal real and imaginary mode lists"));
        }
        let neff: Vec<Complex64> = self
            .n_effs_real
            .iter()
            .zip(&self.n_effs_imag)
            .map(|(&re, &im)| Complex64::new(re, im))
            .collect();

        let shape = mesh.cell_shape();
        let mut modes = Vec::with_capacity(self.modes_real.len());
        for (number, (re_table, im_table)) in self.modes_real.iter().zip(&self.modes_imag).enumerate() {
            let mut fields = BTreeMap::new();
            for (name, re) in re_table {
                let c = Component::from_name(name)
                    .ok_or_else(|| ModeError::config(format!("unknown field component {:?}", name)))?;
                let im = im_table
                    .get(name)
                    .ok_or_else(|| ModeError::config(format!("missing imaginary part of {}", name)))?;
                fields.insert(c, join(name, re, im, shape)?);
            }
            let neff = neff.get(number).copied().ok_or_else(|| {
                ModeError::config(format!("mode {} has no effective index", number))
            })?;
            modes.push(Mode { number, neff, fields });
        }
        Ok(Solution { neff, modes, mesh, wavelength })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn solution() -> Solution {
        let mesh = Mesh::stacked(0.1, 0.3, 0.1, 5).unwrap();
        let f = Field::from_fn(3, 4, |i, j| Complex64::new(i as f64, -(j as f64)));
        let mut fields = BTreeMap::new();
        fields.insert(Component::Ex, f.clone());
        fields.insert(Component::Hy, f * Complex64::new(0.5, 0.0));
        Solution {
            neff: vec![Complex64::new(2.4, 1e-5)],
            modes: vec![Mode { number: 0, neff: Complex64::new(2.4, 1e-5), fields }],
            mesh,
            wavelength: 1.55,
        }
    }

    #[test]
    fn test_record_layout() {
        let rec = ModeRecord::from_solution(&solution());
        assert_eq!(rec.n_modes, 1);
        assert_eq!(rec.n_effs_real, vec![2.4]);
        let ex = &rec.modes_real[0]["Ex"];
        assert_eq!(ex.len(), 3);
        assert_eq!(ex[2], vec![2.0, 2.0, 2.0, 2.0]);
        assert_eq!(rec.modes_imag[0]["Ex"][0], vec![0.0, -1.0, -2.0, -3.0]);
    }

    #[test]
    fn test_back_to_solution() {
        let sol = solution();
        let rec = ModeRecord::from_solution(&sol);
        let json = serde_json::to_string(&rec).unwrap();
        let back: ModeRecord = serde_json::from_str(&json).unwrap();
        let rebuilt = back.to_solution(sol.mesh.clone(), sol.wavelength).unwrap();
        assert_eq!(rebuilt, sol);
    }

    #[test]
    fn test_bad_records_rejected() {
        let sol = solution();
        let mut rec = ModeRecord::from_solution(&sol);
        rec.n_modes = 2;
        assert!(rec.to_solution(sol.mesh.clone(), 1.55).is_err());

        let mut rec = ModeRecord::from_solution(&sol);
        let ex = rec.modes_real[0].remove("Ex").unwrap();
        rec.modes_real[0].insert("Dx".to_string(), ex);
        assert!(rec.to_solution(sol.mesh.clone(), 1.55).is_err());

        let rec = ModeRecord::from_solution(&sol);
        let other = Mesh::stacked(0.1, 0.4, 0.1, 5).unwrap();
        assert!(rec.to_solution(other, 1.55).is_err());
    }
}
