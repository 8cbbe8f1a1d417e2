//! Layered cross-sections and their permittivity rasterization
//!
//! A structure is a stack of horizontal slabs. Each slab has a background
//! permittivity and an ordered list of trapezoids.
//!
//! Rasterization point-samples the stack on the node grid and averages
//! the four corners of each cell onto the cell grid. A slab owns whole
//! node rows starting at its base; a thickness that is not a whole number
//! of `y_step` is rounded up to the next step, and the row at its top
//! belongs to the slab above. The node grid spans `[0, width]` across
//! and stops one step below the top of the stack. A shape claims node
//! columns from `round(left / x_step)` through `round(right / x_step)`,
//! rounding halves up.
//!
//! Sidewall convention: a shape's `x_left`/`x_right` describe its base
//! edge. At height `h` above the base each side moves inward by
//! `h / tan(angle)`, so angles below 90° narrow the shape upward and angles
//! above 90° widen it.

use std::ops::Range;

use nalgebra::DMatrix;
use tracing::debug;

use crate::error::{ModeError, Result};
use crate::grid::Mesh;

/// Coordinates closer than this (µm) are treated as coincident
const GEOM_EPS: f64 = 1e-9;

/// Relative tolerance for "thickness is a whole number of steps"
const STEP_TOLERANCE: f64 = 1e-9;

/// Trapezoidal inclusion within a slab
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    /// Left edge at the slab base (µm)
    pub x_left: f64,
    /// Right edge at the slab base (µm)
    pub x_right: f64,
    /// Relative permittivity
    pub permittivity: f64,
    /// Sidewall angle in degrees, 90 = vertical
    pub angle: f64,
}

impl Shape {
    /// Horizontal extent at height `h` above the slab base. The interval is
    /// empty (left > right) once a narrowing shape has collapsed.
    pub fn bounds_at(&self, h: f64) -> (f64, f64) {
        let inset = h / self.angle.to_radians().tan();
        // tan(90°) is huge but finite; snap the vertical case exactly
        let inset = if (self.angle - 90.0).abs() < 1e-12 { 0.0 } else { inset };
        (self.x_left + inset, self.x_right - inset)
    }
}

/// Horizontal band of the stack
#[derive(Debug, Clone, PartialEq)]
pub struct Slab {
    pub thickness: f64,
    /// Node rows owned by the slab
    pub rows: usize,
    /// Background permittivity
    pub permittivity: f64,
    /// Inclusions in insertion order; later entries win on overlap
    pub shapes: Vec<Shape>,
}

/// Node rows for a slab of `thickness`: whole steps, a partial step
/// counting as one more
fn row_count(thickness: f64, step: f64) -> usize {
    let ratio = thickness / step;
    let whole = ratio.round();
    if (ratio - whole).abs() <= STEP_TOLERANCE * ratio.max(1.0) {
        whole as usize
    } else {
        ratio.ceil() as usize
    }
}

/// Permittivity sampled on both staggered grids
#[derive(Debug, Clone, PartialEq)]
pub struct PermittivityMap {
    pub mesh: Mesh,
    /// `(nx-1) × (ny-1)` values at cell centres
    pub cells: DMatrix<f64>,
    /// `nx × ny` point samples at the nodes
    pub nodes: DMatrix<f64>,
}

impl PermittivityMap {
    pub fn max(&self) -> f64 {
        self.cells.iter().chain(self.nodes.iter()).cloned().fold(f64::MIN, f64::max)
    }
}

/// Stack of slabs plus the sampling parameters
#[derive(Debug, Clone, PartialEq)]
pub struct LayeredStructure {
    /// Operating wavelength (µm)
    pub wavelength: f64,
    pub x_step: f64,
    pub y_step: f64,
    pub width: f64,
    slabs: Vec<Slab>,
}

fn check_permittivity(eps: f64) -> Result<()> {
    if eps.is_finite() && eps > 0.0 {
        Ok(())
    } else {
        Err(ModeError::config(format!("permittivity {} must be finite and positive", eps)))
    }
}

impl LayeredStructure {
    pub fn new(wavelength: f64, x_step: f64, y_step: f64, width: f64) -> Result<Self> {
        for (name, v) in [
            ("wavelength", wavelength),
            ("x_step", x_step),
            ("y_step", y_step),
            ("width", width),
        ] {
            if !(v.is_finite() && v > 0.0) {
                return Err(ModeError::config(format!("{} {} must be finite and positive", name, v)));
            }
        }
        Ok(Self { wavelength, x_step, y_step, width, slabs: Vec::new() })
    }

    /// Append a band on top of the stack, returning its index
    pub fn add_slab(&mut self, thickness: f64, permittivity: f64) -> Result<usize> {
        if !(thickness.is_finite() && thickness > 0.0) {
            return Err(ModeError::config(format!("slab thickness {} must be positive", thickness)));
        }
        check_permittivity(permittivity)?;
        let rows = row_count(thickness, self.y_step);
        self.slabs.push(Slab { thickness, rows, permittivity, shapes: Vec::new() });
        Ok(self.slabs.len() - 1)
    }

    /// Insert a trapezoid into slab `slab_index`
    pub fn add_material(
        &mut self,
        slab_index: usize,
        x_left: f64,
        x_right: f64,
        permittivity: f64,
        angle: f64,
    ) -> Result<()> {
        check_permittivity(permittivity)?;
        if !(x_left.is_finite() && x_right.is_finite()) || x_right <= x_left {
            return Err(ModeError::config(format!(
                "shape extent [{}, {}] is empty",
                x_left, x_right
            )));
        }
        if !(angle > 0.0 && angle < 180.0) {
            return Err(ModeError::config(format!("sidewall angle {}° outside (0, 180)", angle)));
        }
        let width = self.width;
        let slab = self.slabs.get_mut(slab_index).ok_or_else(|| {
            ModeError::config(format!("no slab with index {}", slab_index))
        })?;
        let shape = Shape { x_left, x_right, permittivity, angle };
        let (lt, rt) = shape.bounds_at(slab.thickness);
        let lo = x_left.min(lt);
        let hi = x_right.max(rt);
        if lo < -GEOM_EPS || hi > width + GEOM_EPS {
            return Err(ModeError::config(format!(
                "shape spans [{:.4}, {:.4}] which leaves the domain [0, {}]",
                lo, hi, width
            )));
        }
        slab.shapes.push(shape);
        Ok(())
    }

    pub fn slabs(&self) -> &[Slab] {
        &self.slabs
    }

    /// Nominal stack height (µm), before thicknesses snap to the grid
    pub fn height(&self) -> f64 {
        self.slabs.iter().map(|s| s.thickness).sum()
    }

    pub fn mesh(&self) -> Result<Mesh> {
        if self.slabs.is_empty() {
            return Err(ModeError::config("structure has no slabs"));
        }
        let rows = self.slabs.iter().map(|s| s.rows).sum();
        Mesh::stacked(self.x_step, self.width, self.y_step, rows)
    }

    /// Node columns covered by `[left, right]`
    fn columns(&self, left: f64, right: f64, nx: usize) -> Range<usize> {
        let lo = (left / self.x_step + 0.5).floor().max(0.0) as usize;
        let hi = (right / self.x_step + 1.5).floor().max(0.0) as usize;
        lo.min(nx)..hi.min(nx)
    }

    /// Sample the stack on the node grid and average onto the cell grid
    pub fn rasterize(&self) -> Result<PermittivityMap> {
        let mesh = self.mesh()?;
        let (nx, ny) = (mesh.nx(), mesh.ny());

        let mut nodes = DMatrix::zeros(nx, ny);
        let mut j = 0;
        for slab in &self.slabs {
            for r in 0..slab.rows {
                let h = r as f64 * self.y_step;
                nodes.column_mut(j).fill(slab.permittivity);
                for shape in &slab.shapes {
                    let (l, r) = shape.bounds_at(h);
                    if r < l {
                        continue;
                    }
                    for i in self.columns(l, r, nx) {
                        nodes[(i, j)] = shape.permittivity;
                    }
                }
                j += 1;
            }
        }

        let cells = DMatrix::from_fn(nx - 1, ny - 1, |i, j| {
            0.25 * (nodes[(i, j)] + nodes[(i + 1, j)] + nodes[(i, j + 1)] + nodes[(i + 1, j + 1)])
        });

        debug!(
            nx,
            ny,
            slabs = self.slabs.len(),
            "rasterized layered structure"
        );
        Ok(PermittivityMap { mesh, cells, nodes })
    }
}
