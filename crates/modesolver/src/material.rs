//! Optical materials and their refractive-index models
//!
//! Every material is resolved to a single relative permittivity at the
//! operating wavelength before it reaches the rasterizer. Wavelengths are
//! in µm throughout.

use std::fmt;
use std::sync::Arc;

use serde::{ser, Deserialize, Serialize, Serializer};

use crate::error::{ModeError, Result};

/// A material: either a fixed refractive index or a dispersion model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Material {
    /// Wavelength-independent refractive index
    Constant(f64),
    /// Refractive index evaluated at the operating wavelength
    Dispersive(Dispersion),
}

/// Refractive-index models
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum Dispersion {
    /// n = 1
    Air,
    /// Fused silica, Malitson (1965) three-term Sellmeier
    Silica,
    /// Crystalline silicon at 293 K, Li (1980)
    Silicon,
    /// LPCVD silicon nitride, Luke et al. (2015)
    Nitride,
    /// n² = 1 + Σ Bᵢ λ² / (λ² − Cᵢ²), resonance wavelengths Cᵢ in µm
    Sellmeier { b: Vec<f64>, c: Vec<f64> },
    /// Caller-supplied index function of wavelength. Code-only: it cannot
    /// be read from a run description and fails to serialize.
    #[serde(skip_deserializing, serialize_with = "reject_custom")]
    Custom(Arc<dyn Fn(f64) -> f64 + Send + Sync>),
}

fn reject_custom<S: Serializer>(
    _: &Arc<dyn Fn(f64) -> f64 + Send + Sync>,
    _: S,
) -> std::result::Result<S::Ok, S::Error> {
    Err(ser::Error::custom(
        "a custom dispersion function cannot be serialized; use a sellmeier model or a constant index",
    ))
}

impl fmt::Debug for Dispersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dispersion::Air => write!(f, "Air"),
            Dispersion::Silica => write!(f, "Silica"),
            Dispersion::Silicon => write!(f, "Silicon"),
            Dispersion::Nitride => write!(f, "Nitride"),
            Dispersion::Sellmeier { b, c } => {
                f.debug_struct("Sellmeier").field("b", b).field("c", c).finish()
            }
            Dispersion::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

const SILICA_B: [f64; 3] = [0.696_166_3, 0.407_942_6, 0.897_479_4];
const SILICA_C: [f64; 3] = [0.068_404_3, 0.116_241_4, 9.896_161];
const NITRIDE_B: [f64; 2] = [3.0249, 40314.0];
const NITRIDE_C: [f64; 2] = [0.135_340_6, 1239.842];

fn sellmeier(wl: f64, b: &[f64], c: &[f64]) -> f64 {
    let wl2 = wl * wl;
    let n2 = 1.0
        + b.iter()
            .zip(c)
            .map(|(b, c)| b * wl2 / (wl2 - c * c))
            .sum::<f64>();
    n2.sqrt()
}

impl Dispersion {
    /// Refractive index at `wavelength` (µm)
    pub fn index(&self, wavelength: f64) -> f64 {
        match self {
            Dispersion::Air => 1.0,
            Dispersion::Silica => sellmeier(wavelength, &SILICA_B, &SILICA_C),
            Dispersion::Silicon => {
                let wl2 = wavelength * wavelength;
                let l1 = 1.1071_f64;
                let n2 = 11.6858 + 0.939_816 / wl2 + 0.008_104_61 * l1 * l1 / (wl2 - l1 * l1);
                n2.sqrt()
            }
            Dispersion::Nitride => sellmeier(wavelength, &NITRIDE_B, &NITRIDE_C),
            Dispersion::Sellmeier { b, c } => sellmeier(wavelength, b, c),
            Dispersion::Custom(f) => f(wavelength),
        }
    }
}

impl Material {
    pub fn air() -> Self {
        Material::Dispersive(Dispersion::Air)
    }

    pub fn silica() -> Self {
        Material::Dispersive(Dispersion::Silica)
    }

    pub fn silicon() -> Self {
        Material::Dispersive(Dispersion::Silicon)
    }

    pub fn nitride() -> Self {
        Material::Dispersive(Dispersion::Nitride)
    }

    /// Wrap an arbitrary index function. The result only lives in code:
    /// serializing it, or any run description holding it, is an error.
    pub fn custom(f: impl Fn(f64) -> f64 + Send + Sync + 'static) -> Self {
        Material::Dispersive(Dispersion::Custom(Arc::new(f)))
    }

    /// Refractive index at `wavelength` (µm)
    pub fn index(&self, wavelength: f64) -> f64 {
        match self {
            Material::Constant(n) => *n,
            Material::Dispersive(d) => d.index(wavelength),
        }
    }

    /// Relative permittivity n² at `wavelength` (µm)
    pub fn permittivity(&self, wavelength: f64) -> Result<f64> {
        let n = self.index(wavelength);
        let eps = n * n;
        if !n.is_finite() || n <= 0.0 || !eps.is_finite() {
            return Err(ModeError::config(format!(
                "material {:?} has invalid index {} at λ = {} µm",
                self, n, wavelength
            )));
        }
        Ok(eps)
    }
}

impl From<f64> for Material {
    fn from(n: f64) -> Self {
        Material::Constant(n)
    }
}
