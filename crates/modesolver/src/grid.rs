//! Rectilinear mesh and unknown ordering
//!
//! Nodes sit at the `x`/`y` coordinates; cells span adjacent nodes and
//! their centres form the half-step-offset grid on which permittivity and
//! reported fields live.

use serde::{Deserialize, Serialize};

use crate::error::{ModeError, Result};

/// Relative tolerance for "extent is a whole number of steps"
const STEP_TOLERANCE: f64 = 1e-6;

/// Strictly increasing node coordinates along both axes (µm)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl Mesh {
    /// Build from arbitrary node coordinates
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Result<Self> {
        for (name, axis) in [("x", &x), ("y", &y)] {
            if axis.len() < 3 {
                return Err(ModeError::config(format!(
                    "{} axis needs at least 3 nodes, got {}",
                    name,
                    axis.len()
                )));
            }
            if axis.iter().any(|v| !v.is_finite()) {
                return Err(ModeError::config(format!("{} axis has non-finite coordinates", name)));
            }
            if axis.windows(2).any(|w| w[1] <= w[0]) {
                return Err(ModeError::config(format!("{} axis is not strictly increasing", name)));
            }
        }
        Ok(Self { x, y })
    }

    /// Mesh over `[0, width]` across with `rows` node rows stacked upward
    /// from 0
    pub fn stacked(x_step: f64, width: f64, y_step: f64, rows: usize) -> Result<Self> {
        let nx = step_count("width", width, x_step)?;
        let x = (0..=nx).map(|i| i as f64 * x_step).collect();
        let y = (0..rows).map(|j| j as f64 * y_step).collect();
        Self::new(x, y)
    }

    pub fn nx(&self) -> usize {
        self.x.len()
    }

    pub fn ny(&self) -> usize {
        self.y.len()
    }

    /// Cell counts along x and y
    pub fn cell_shape(&self) -> (usize, usize) {
        (self.nx() - 1, self.ny() - 1)
    }

    pub fn dx(&self) -> Vec<f64> {
        self.x.windows(2).map(|w| w[1] - w[0]).collect()
    }

    pub fn dy(&self) -> Vec<f64> {
        self.y.windows(2).map(|w| w[1] - w[0]).collect()
    }

    pub fn x_centres(&self) -> Vec<f64> {
        self.x.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
    }

    pub fn y_centres(&self) -> Vec<f64> {
        self.y.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
    }

    /// Cell areas, indexed `[i][j]` like the cell grid
    pub fn cell_area(&self, i: usize, j: usize) -> f64 {
        (self.x[i + 1] - self.x[i]) * (self.y[j + 1] - self.y[j])
    }

    pub fn width(&self) -> f64 {
        self.x[self.nx() - 1] - self.x[0]
    }

    pub fn height(&self) -> f64 {
        self.y[self.ny() - 1] - self.y[0]
    }
}

fn step_count(name: &str, extent: f64, step: f64) -> Result<usize> {
    if !(extent.is_finite() && extent > 0.0 && step.is_finite() && step > 0.0) {
        return Err(ModeError::config(format!(
            "{} {} and step {} must be finite and positive",
            name, extent, step
        )));
    }
    let ratio = extent / step;
    let n = ratio.round();
    if (ratio - n).abs() > STEP_TOLERANCE * ratio.max(1.0) {
        return Err(ModeError::config(format!(
            "{} {} is not a whole number of {} µm steps",
            name, extent, step
        )));
    }
    Ok(n as usize)
}

/// Maps 2-D grid positions to a flat unknown index.
///
/// The shorter axis varies fastest, which keeps the half-bandwidth of the
/// assembled operators equal to the shorter dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridIndex {
    pub nx: usize,
    pub ny: usize,
    x_fastest: bool,
}

impl GridIndex {
    pub fn new(nx: usize, ny: usize) -> Self {
        Self { nx, ny, x_fastest: nx <= ny }
    }

    pub fn len(&self) -> usize {
        self.nx * self.ny
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn idx(&self, i: usize, j: usize) -> usize {
        if self.x_fastest {
            j * self.nx + i
        } else {
            i * self.ny + j
        }
    }

    /// Inverse of [`GridIndex::idx`]
    #[inline]
    pub fn position(&self, k: usize) -> (usize, usize) {
        if self.x_fastest {
            (k % self.nx, k / self.nx)
        } else {
            (k / self.ny, k % self.ny)
        }
    }
}
