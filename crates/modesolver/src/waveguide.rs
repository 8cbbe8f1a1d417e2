//! Ridge waveguide and waveguide-array geometry builders
//!
//! Both builders produce the same stack, bottom-up:
//!
//! ```text
//!   clad n   ─────────────────────────────
//!   ...
//!   clad 0       ┌───────┐
//!   core slab    │  wg   │      (wg_height - slab_height)
//!   film     ────┴───────┴────  (slab_height, omitted when 0)
//!   substrate                   (sub_height)
//! ```
//!
//! The core slab background is the first cladding material, so an unetched
//! region reads as cladding.

use serde::{Deserialize, Serialize};

use crate::error::{ModeError, Result};
use crate::material::Material;
use crate::structure::LayeredStructure;

/// Single ridge or strip waveguide centred in the domain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RidgeWaveguide {
    /// Free-space wavelength (µm)
    pub wavelength: f64,
    pub x_step: f64,
    pub y_step: f64,
    /// Core width at its base (µm)
    pub wg_width: f64,
    /// Total core height including the film (µm)
    pub wg_height: f64,
    /// Unetched film thickness; 0 for a strip waveguide (µm)
    pub slab_height: f64,
    /// Simulation domain width (µm)
    pub sub_width: f64,
    pub sub_height: f64,
    /// Cladding layer thicknesses, bottom-up (µm)
    pub clad_height: Vec<f64>,
    pub n_sub: Material,
    pub n_wg: Material,
    /// One material per cladding layer
    pub n_clads: Vec<Material>,
    /// Sidewall angle in degrees, 90 = vertical
    pub angle: f64,
}

impl Default for RidgeWaveguide {
    fn default() -> Self {
        Self {
            wavelength: 1.55,
            x_step: 0.02,
            y_step: 0.02,
            wg_width: 0.5,
            wg_height: 0.22,
            slab_height: 0.0,
            sub_width: 2.0,
            sub_height: 0.5,
            clad_height: vec![0.5],
            n_sub: Material::silica(),
            n_wg: Material::silicon(),
            n_clads: vec![Material::silica()],
            angle: 90.0,
        }
    }
}

impl RidgeWaveguide {
    pub fn build(&self) -> Result<LayeredStructure> {
        let x0 = 0.5 * (self.sub_width - self.wg_width);
        Stack::from_ridge(self).build(&[(x0, x0 + self.wg_width)])
    }
}

/// Several identical-height cores side by side
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveguideArray {
    pub wavelength: f64,
    pub x_step: f64,
    pub y_step: f64,
    /// Core widths, left to right (µm)
    pub wg_widths: Vec<f64>,
    /// Gaps between neighbouring cores; one fewer than `wg_widths` (µm)
    pub wg_gaps: Vec<f64>,
    pub wg_height: f64,
    pub slab_height: f64,
    pub sub_width: f64,
    pub sub_height: f64,
    pub clad_height: Vec<f64>,
    pub n_sub: Material,
    pub n_wg: Material,
    pub n_clads: Vec<Material>,
    pub angle: f64,
}

impl Default for WaveguideArray {
    fn default() -> Self {
        let ridge = RidgeWaveguide::default();
        Self {
            wavelength: ridge.wavelength,
            x_step: ridge.x_step,
            y_step: ridge.y_step,
            wg_widths: vec![0.5, 0.5],
            wg_gaps: vec![0.2],
            wg_height: ridge.wg_height,
            slab_height: ridge.slab_height,
            sub_width: 3.0,
            sub_height: ridge.sub_height,
            clad_height: ridge.clad_height,
            n_sub: ridge.n_sub,
            n_wg: ridge.n_wg,
            n_clads: ridge.n_clads,
            angle: ridge.angle,
        }
    }
}

impl WaveguideArray {
    pub fn build(&self) -> Result<LayeredStructure> {
        if self.wg_widths.is_empty() {
            return Err(ModeError::config("waveguide array needs at least one core"));
        }
        if self.wg_gaps.len() + 1 != self.wg_widths.len() {
            return Err(ModeError::config(format!(
                "{} cores need {} gaps, got {}",
                self.wg_widths.len(),
                self.wg_widths.len() - 1,
                self.wg_gaps.len()
            )));
        }
        let footprint: f64 = self.wg_widths.iter().sum::<f64>() + self.wg_gaps.iter().sum::<f64>();
        let mut x = 0.5 * (self.sub_width - footprint);
        let mut cores = Vec::with_capacity(self.wg_widths.len());
        for (k, w) in self.wg_widths.iter().enumerate() {
            cores.push((x, x + w));
            x += w + self.wg_gaps.get(k).copied().unwrap_or(0.0);
        }
        Stack {
            wavelength: self.wavelength,
            x_step: self.x_step,
            y_step: self.y_step,
            wg_height: self.wg_height,
            slab_height: self.slab_height,
            sub_width: self.sub_width,
            sub_height: self.sub_height,
            clad_height: &self.clad_height,
            n_sub: &self.n_sub,
            n_wg: &self.n_wg,
            n_clads: &self.n_clads,
            angle: self.angle,
        }
        .build(&cores)
    }
}

struct Stack<'a> {
    wavelength: f64,
    x_step: f64,
    y_step: f64,
    wg_height: f64,
    slab_height: f64,
    sub_width: f64,
    sub_height: f64,
    clad_height: &'a [f64],
    n_sub: &'a Material,
    n_wg: &'a Material,
    n_clads: &'a [Material],
    angle: f64,
}

impl<'a> Stack<'a> {
    fn from_ridge(r: &'a RidgeWaveguide) -> Self {
        Self {
            wavelength: r.wavelength,
            x_step: r.x_step,
            y_step: r.y_step,
            wg_height: r.wg_height,
            slab_height: r.slab_height,
            sub_width: r.sub_width,
            sub_height: r.sub_height,
            clad_height: &r.clad_height,
            n_sub: &r.n_sub,
            n_wg: &r.n_wg,
            n_clads: &r.n_clads,
            angle: r.angle,
        }
    }

    fn build(&self, cores: &[(f64, f64)]) -> Result<LayeredStructure> {
        if self.clad_height.is_empty() || self.clad_height.len() != self.n_clads.len() {
            return Err(ModeError::config(format!(
                "{} cladding thicknesses for {} cladding materials",
                self.clad_height.len(),
                self.n_clads.len()
            )));
        }
        if !(self.slab_height >= 0.0 && self.slab_height < self.wg_height) {
            return Err(ModeError::config(format!(
                "slab height {} must lie in [0, wg_height = {})",
                self.slab_height, self.wg_height
            )));
        }

        let wl = self.wavelength;
        let eps_wg = self.n_wg.permittivity(wl)?;
        let eps_clad0 = self.n_clads[0].permittivity(wl)?;

        let mut s = LayeredStructure::new(wl, self.x_step, self.y_step, self.sub_width)?;
        s.add_slab(self.sub_height, self.n_sub.permittivity(wl)?)?;
        if self.slab_height > 0.0 {
            s.add_slab(self.slab_height, eps_wg)?;
        }
        let core = s.add_slab(self.wg_height - self.slab_height, eps_clad0)?;
        for &(l, r) in cores {
            s.add_material(core, l, r, eps_wg, self.angle)?;
        }
        for (t, m) in self.clad_height.iter().zip(self.n_clads) {
            s.add_slab(*t, m.permittivity(wl)?)?;
        }
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ridge_stack() {
        let s = RidgeWaveguide::default().build().unwrap();
        assert_eq!(s.slabs().len(), 3);
        assert!((s.height() - 1.22).abs() < 1e-12);
        let core = &s.slabs()[1].shapes[0];
        assert!((core.x_left - 0.75).abs() < 1e-12);
        assert!((core.x_right - 1.25).abs() < 1e-12);
        assert!((core.permittivity - 12.085).abs() < 1e-2);
    }

    #[test]
    fn test_partial_etch_adds_film() {
        let wg = RidgeWaveguide { slab_height: 0.09, ..Default::default() };
        let s = wg.build().unwrap();
        assert_eq!(s.slabs().len(), 4);
        assert!((s.slabs()[2].thickness - 0.13).abs() < 1e-12);
        assert_eq!(s.slabs()[1].permittivity, s.slabs()[2].shapes[0].permittivity);
    }

    #[test]
    fn test_multiple_claddings() {
        let wg = RidgeWaveguide {
            clad_height: vec![0.05, 0.05, 0.5],
            n_clads: vec![Material::silica(), Material::nitride(), Material::silica()],
            ..Default::default()
        };
        let s = wg.build().unwrap();
        assert_eq!(s.slabs().len(), 5);
        assert!((s.slabs()[3].permittivity - 3.985).abs() < 1e-2);
        assert_eq!(s.slabs()[3].rows, 3);
        assert_eq!(s.mesh().unwrap().ny(), 67);
    }

    #[test]
    fn test_mismatched_claddings_rejected() {
        let wg = RidgeWaveguide { clad_height: vec![0.5, 0.5], ..Default::default() };
        assert!(wg.build().is_err());
        let wg = RidgeWaveguide { slab_height: 0.22, ..Default::default() };
        assert!(wg.build().is_err());
    }

    #[test]
    fn test_array_cores_centred() {
        let arr = WaveguideArray::default();
        let s = arr.build().unwrap();
        let shapes = &s.slabs()[1].shapes;
        assert_eq!(shapes.len(), 2);
        assert!((shapes[0].x_left - 0.9).abs() < 1e-12);
        assert!((shapes[1].x_left - 1.6).abs() < 1e-12);
        assert!((shapes[1].x_right - 2.1).abs() < 1e-12);
    }

    #[test]
    fn test_array_gap_count_checked() {
        let arr = WaveguideArray { wg_gaps: vec![], ..Default::default() };
        assert!(arr.build().is_err());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let wg: RidgeWaveguide = serde_json::from_str(r#"{"wg_width": 0.4, "n_wg": 3.0}"#).unwrap();
        assert_eq!(wg.wg_width, 0.4);
        assert_eq!(wg.n_wg.index(1.55), 3.0);
        assert_eq!(wg.sub_width, 2.0);
    }
}
