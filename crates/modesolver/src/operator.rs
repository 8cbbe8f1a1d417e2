//! Finite-difference operator assembly
//!
//! Builds the sparse system matrices for both solver formulations and the
//! staggered node/cell operators used to reconstruct the remaining field
//! components. Everything is accumulated as triplets and compressed to CSR
//! directly; no dense `N × N` matrix is ever formed.
//!
//! Boundaries never allocate ghost points. A stencil leg that leaves the
//! grid is folded back onto an interior unknown with the sign given by the
//! boundary code. On the cell grid the ghost folds onto the boundary cell
//! itself. On the node grid, where the boundary node lies on the edge, it
//! folds onto the mirror node one step inside.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ModeError, Result};
use crate::grid::{GridIndex, Mesh};
use crate::sparse::{CsrMatrix, TripletBuilder};
use crate::structure::PermittivityMap;

/// Condition on one side of the computational window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// Field vanishes outside the window (`0`)
    Zero,
    /// Odd continuation of the transverse H field (`A`)
    Antisymmetric,
    /// Even continuation of the transverse H field (`S`)
    Symmetric,
}

impl Edge {
    /// Multiplier applied to a folded ghost coefficient
    pub fn sign(self) -> f64 {
        match self {
            Edge::Zero => 0.0,
            Edge::Antisymmetric => -1.0,
            Edge::Symmetric => 1.0,
        }
    }

    fn from_char(c: char) -> Result<Self> {
        match c {
            '0' => Ok(Edge::Zero),
            'A' => Ok(Edge::Antisymmetric),
            'S' => Ok(Edge::Symmetric),
            other => Err(ModeError::config(format!(
                "boundary character {:?} is not one of '0', 'A', 'S'",
                other
            ))),
        }
    }

    fn as_char(self) -> char {
        match self {
            Edge::Zero => '0',
            Edge::Antisymmetric => 'A',
            Edge::Symmetric => 'S',
        }
    }
}

/// Four-sided boundary code, written North, South, East, West (e.g. `"00S0"`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Boundary {
    pub north: Edge,
    pub south: Edge,
    pub east: Edge,
    pub west: Edge,
}

impl Default for Boundary {
    fn default() -> Self {
        Self { north: Edge::Zero, south: Edge::Zero, east: Edge::Zero, west: Edge::Zero }
    }
}

impl FromStr for Boundary {
    type Err = ModeError;

    fn from_str(s: &str) -> Result<Self> {
        let chars: Vec<char> = s.chars().collect();
        if chars.len() != 4 {
            return Err(ModeError::config(format!(
                "boundary code {:?} must have exactly 4 characters (N, S, E, W)",
                s
            )));
        }
        Ok(Self {
            north: Edge::from_char(chars[0])?,
            south: Edge::from_char(chars[1])?,
            east: Edge::from_char(chars[2])?,
            west: Edge::from_char(chars[3])?,
        })
    }
}

impl TryFrom<String> for Boundary {
    type Error = ModeError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Boundary> for String {
    fn from(b: Boundary) -> Self {
        b.to_string()
    }
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for e in [self.north, self.south, self.east, self.west] {
            write!(f, "{}", e.as_char())?;
        }
        Ok(())
    }
}

/// Where an out-of-grid stencil leg lands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fold {
    /// Cell grid: the ghost mirrors the boundary cell
    OntoSelf,
    /// Node grid: the ghost mirrors the node one step inside
    OntoMirror,
}

/// Nine-point stencil, indexed by offsets `di, dj ∈ {-1, 0, 1}`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stencil {
    coeffs: [[f64; 3]; 3],
}

impl Stencil {
    #[inline]
    pub fn set(&mut self, di: isize, dj: isize, value: f64) {
        self.coeffs[(di + 1) as usize][(dj + 1) as usize] = value;
    }

    #[inline]
    pub fn get(&self, di: isize, dj: isize) -> f64 {
        self.coeffs[(di + 1) as usize][(dj + 1) as usize]
    }

    /// Five-point stencil from centre, north, south, east and west weights
    pub fn cross(p: f64, n: f64, s: f64, e: f64, w: f64) -> Self {
        let mut st = Self::default();
        st.set(0, 0, p);
        st.set(0, 1, n);
        st.set(0, -1, s);
        st.set(1, 0, e);
        st.set(-1, 0, w);
        st
    }
}

/// Scatters stencils into a triplet builder with boundary folding
#[derive(Debug, Clone, Copy)]
pub struct Assembler {
    pub grid: GridIndex,
    pub boundary: Boundary,
    pub fold: Fold,
}

impl Assembler {
    /// Grid position and sign for the leg `(di, dj)` from `(i, j)`, or
    /// `None` when a zero boundary drops it. `parity` flips the sign of
    /// every crossed edge, as needed for Hy under an `S`/`A` code.
    pub fn target(&self, i: usize, j: usize, di: isize, dj: isize, parity: f64) -> Option<(usize, usize, f64)> {
        let mut sign = 1.0;
        let ti = self.leg(i, di, self.grid.nx, self.boundary.west, self.boundary.east, parity, &mut sign)?;
        let tj = self.leg(j, dj, self.grid.ny, self.boundary.south, self.boundary.north, parity, &mut sign)?;
        Some((ti, tj, sign))
    }

    #[allow(clippy::too_many_arguments)]
    fn leg(&self, i: usize, d: isize, n: usize, low: Edge, high: Edge, parity: f64, sign: &mut f64) -> Option<usize> {
        let t = i as isize + d;
        let edge = if t < 0 {
            low
        } else if t >= n as isize {
            high
        } else {
            return Some(t as usize);
        };
        let s = edge.sign() * parity;
        if s == 0.0 {
            return None;
        }
        *sign *= s;
        Some(match self.fold {
            Fold::OntoSelf => i,
            Fold::OntoMirror => (i as isize - d) as usize,
        })
    }

    /// Add `stencil` centred on `(i, j)` to `row`; `col` maps a grid index
    /// to a matrix column
    #[allow(clippy::too_many_arguments)]
    pub fn push(
        &self,
        builder: &mut TripletBuilder,
        row: usize,
        i: usize,
        j: usize,
        stencil: &Stencil,
        parity: f64,
        col: impl Fn(usize) -> usize,
    ) {
        for di in -1..=1 {
            for dj in -1..=1 {
                let v = stencil.get(di, dj);
                if v == 0.0 {
                    continue;
                }
                if let Some((ti, tj, sign)) = self.target(i, j, di, dj, parity) {
                    builder.push(row, col(self.grid.idx(ti, tj)), sign * v);
                }
            }
        }
    }
}

/// Non-uniform central second-derivative weights `[minus, centre, plus]`
pub fn second_derivative(hm: f64, hp: f64) -> [f64; 3] {
    [
        2.0 / (hm * (hm + hp)),
        -2.0 / (hm * hp),
        2.0 / (hp * (hm + hp)),
    ]
}

/// Second-derivative weights `(towards minus, towards plus)` across two
/// material interfaces, enforcing continuity of the normal D component.
///
/// `p` is the cell width, `hm`/`hp` the centre distances, `em`/`e0`/`ep`
/// the permittivities of the minus, own and plus cells.
pub fn interface_second_derivative(p: f64, hm: f64, hp: f64, em: f64, e0: f64, ep: f64) -> (f64, f64) {
    let tm = p * (e0 - em) + 2.0 * hm * em;
    let tp = p * (e0 - ep) + 2.0 * hp * ep;
    let denom = tp * (p * p * (e0 - em) + 4.0 * hm * hm * em) + tm * (p * p * (e0 - ep) + 4.0 * hp * hp * ep);
    (8.0 * tp * em / denom, 8.0 * tm * ep / denom)
}

/// Transverse field polarization of the semi-vectorial problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarField {
    Ex,
    Ey,
}

/// Cell-centre distances padded by replicating the end steps:
/// `(minus, plus, own width)` per cell along one axis
fn cell_spacings(d: &[f64]) -> Vec<(f64, f64, f64)> {
    let n = d.len();
    (0..n)
        .map(|k| {
            let prev = if k == 0 { d[0] } else { d[k - 1] };
            let next = if k + 1 == n { d[n - 1] } else { d[k + 1] };
            (0.5 * (prev + d[k]), 0.5 * (next + d[k]), d[k])
        })
        .collect()
}

/// Node spacings padded by replicating the end steps: `(minus, plus)`
fn node_spacings(x: &[f64]) -> Vec<(f64, f64)> {
    let n = x.len();
    (0..n)
        .map(|k| {
            let m = if k == 0 { x[1] - x[0] } else { x[k] - x[k - 1] };
            let p = if k + 1 == n { x[n - 1] - x[n - 2] } else { x[k + 1] - x[k] };
            (m, p)
        })
        .collect()
}

/// Semi-vectorial operator on the cell grid for `field`, with
/// `A·E = β²·E`
pub fn assemble_semi(map: &PermittivityMap, k0: f64, field: ScalarField, boundary: Boundary) -> CsrMatrix {
    let (nx, ny) = map.cells.shape();
    let grid = GridIndex::new(nx, ny);
    let asm = Assembler { grid, boundary, fold: Fold::OntoSelf };
    let xs = cell_spacings(&map.mesh.dx());
    let ys = cell_spacings(&map.mesh.dy());
    let eps = |i: isize, j: isize| {
        let i = i.clamp(0, nx as isize - 1) as usize;
        let j = j.clamp(0, ny as isize - 1) as usize;
        map.cells[(i, j)]
    };
    let k2 = k0 * k0;

    let mut b = TripletBuilder::new(grid.len(), grid.len());
    for i in 0..nx {
        for j in 0..ny {
            let (w, e, p) = xs[i];
            let (s, n, q) = ys[j];
            let (ii, jj) = (i as isize, j as isize);
            let ep = eps(ii, jj);
            let ee = eps(ii + 1, jj);
            let ew = eps(ii - 1, jj);
            let en = eps(ii, jj + 1);
            let es = eps(ii, jj - 1);

            let stencil = match field {
                ScalarField::Ex => {
                    let an = 2.0 / (n * (n + s));
                    let as_ = 2.0 / (s * (n + s));
                    let (aw, ae) = interface_second_derivative(p, w, e, ew, ep, ee);
                    let ap = ep * k2 - an - as_ - ae * ep / ee - aw * ep / ew;
                    Stencil::cross(ap, an, as_, ae, aw)
                }
                ScalarField::Ey => {
                    let (as_, an) = interface_second_derivative(q, s, n, es, ep, en);
                    let ae = 2.0 / (e * (e + w));
                    let aw = 2.0 / (w * (e + w));
                    let ap = ep * k2 - an * ep / en - as_ * ep / es - ae - aw;
                    Stencil::cross(ap, an, as_, ae, aw)
                }
            };
            let row = grid.idx(i, j);
            asm.push(&mut b, row, i, j, &stencil, 1.0, |k| k);
        }
    }
    b.build()
}

/// Coupled `(Hx, Hy)` operator on the node grid, unknowns interleaved as
/// `2·g + c`. Hx carries the boundary sign; Hy carries its opposite.
pub fn assemble_full(map: &PermittivityMap, k0: f64, boundary: Boundary) -> CsrMatrix {
    let mesh = &map.mesh;
    let (nx, ny) = (mesh.nx(), mesh.ny());
    let (ncx, ncy) = map.cells.shape();
    let grid = GridIndex::new(nx, ny);
    let asm = Assembler { grid, boundary, fold: Fold::OntoMirror };
    let xs = node_spacings(&mesh.x);
    let ys = node_spacings(&mesh.y);
    let cell = |i: isize, j: isize| {
        let i = i.clamp(0, ncx as isize - 1) as usize;
        let j = j.clamp(0, ncy as isize - 1) as usize;
        map.cells[(i, j)]
    };
    let k2 = k0 * k0;

    let mut b = TripletBuilder::new(2 * grid.len(), 2 * grid.len());
    for i in 0..nx {
        for j in 0..ny {
            let (w, e) = xs[i];
            let (s, n) = ys[j];
            let (ii, jj) = (i as isize, j as isize);
            // Quadrants around the node: 1 = NW, 2 = SW, 3 = SE, 4 = NE
            let e1 = cell(ii - 1, jj);
            let e2 = cell(ii - 1, jj - 1);
            let e3 = cell(ii, jj - 1);
            let e4 = cell(ii, jj);

            let ns21 = n * e2 + s * e1;
            let ns34 = n * e3 + s * e4;
            let ew14 = e * e1 + w * e4;
            let ew23 = e * e2 + w * e3;
            let cross = e2 * e4 - e1 * e3;

            let axxn = (2.0 * e * e3 / ns34 + 2.0 * w * e2 / ns21) / (n * (e + w));
            let axxs = (2.0 * e * e4 / ns34 + 2.0 * w * e1 / ns21) / (s * (e + w));
            let second_x = second_derivative(w, e);
            let (axxw, axxe) = (second_x[0], second_x[2]);
            let axxp = -axxn - axxs - axxe - axxw
                + k2 * (n + s) * (e4 * e3 * e / ns34 + e1 * e2 * w / ns21) / (e + w);

            let ayye = (2.0 * n * e1 / ew14 + 2.0 * s * e2 / ew23) / (e * (n + s));
            let ayyw = (2.0 * n * e4 / ew14 + 2.0 * s * e3 / ew23) / (w * (n + s));
            let second_y = second_derivative(s, n);
            let (ayys, ayyn) = (second_y[0], second_y[2]);
            let ayyp = -ayyn - ayys - ayye - ayyw
                + k2 * (e + w) * (e1 * e4 * n / ew14 + e2 * e3 * s / ew23) / (n + s);

            let axyn = (e3 / ns34 - e2 / ns21 + s * cross / (ns21 * ns34)) / (e + w);
            let axys = (e2 / ns21 - e3 / ns34 + n * cross / (ns21 * ns34)) / (e + w);
            let axye = (e4 - e3) / (ns34 * (e + w)) - 2.0 * (e2 - e1) * w * w / (ns21 * e * (e + w).powi(2));
            let axyw = (e2 - e1) / (ns21 * (e + w)) - 2.0 * (e4 - e3) * e * e / (ns34 * w * (e + w).powi(2));
            let axyp = -(axyn + axys + axye + axyw);

            let ayxe = (e1 / ew14 - e2 / ew23 + w * cross / (ew23 * ew14)) / (n + s);
            let ayxw = (e3 / ew23 - e4 / ew14 + e * cross / (ew23 * ew14)) / (n + s);
            let ayxn = (e4 - e1) / (ew14 * (n + s)) - 2.0 * (e2 - e3) * s * s / (ew23 * n * (n + s).powi(2));
            let ayxs = (e2 - e3) / (ew23 * (n + s)) - 2.0 * (e4 - e1) * n * n / (ew14 * s * (n + s).powi(2));
            let ayxp = -(ayxn + ayxs + ayxe + ayxw);

            let xx = Stencil::cross(axxp, axxn, axxs, axxe, axxw);
            let yy = Stencil::cross(ayyp, ayyn, ayys, ayye, ayyw);
            let xy = Stencil::cross(axyp, axyn, axys, axye, axyw);
            let yx = Stencil::cross(ayxp, ayxn, ayxs, ayxe, ayxw);

            let r = 2 * grid.idx(i, j);
            asm.push(&mut b, r, i, j, &xx, 1.0, |k| 2 * k);
            asm.push(&mut b, r, i, j, &xy, -1.0, |k| 2 * k + 1);
            asm.push(&mut b, r + 1, i, j, &yx, 1.0, |k| 2 * k);
            asm.push(&mut b, r + 1, i, j, &yy, -1.0, |k| 2 * k + 1);
        }
    }
    b.build()
}

/// Operators between the node grid and the cell-centre grid
#[derive(Debug, Clone)]
pub struct Staggered<'a> {
    mesh: &'a Mesh,
    pub nodes: GridIndex,
    pub cells: GridIndex,
}

impl<'a> Staggered<'a> {
    pub fn new(mesh: &'a Mesh) -> Self {
        let (ncx, ncy) = mesh.cell_shape();
        Self {
            mesh,
            nodes: GridIndex::new(mesh.nx(), mesh.ny()),
            cells: GridIndex::new(ncx, ncy),
        }
    }

    /// Cell value as the mean of its four corner nodes
    pub fn node_to_cell(&self) -> CsrMatrix {
        let mut b = TripletBuilder::new(self.cells.len(), self.nodes.len());
        for i in 0..self.cells.nx {
            for j in 0..self.cells.ny {
                let r = self.cells.idx(i, j);
                for (a, c) in [(i, j), (i + 1, j), (i, j + 1), (i + 1, j + 1)] {
                    b.push(r, self.nodes.idx(a, c), 0.25);
                }
            }
        }
        b.build()
    }

    /// Node value as the mean of the (one, two or four) adjacent cells
    pub fn cell_to_node(&self) -> CsrMatrix {
        let mut b = TripletBuilder::new(self.nodes.len(), self.cells.len());
        for i in 0..self.nodes.nx {
            let cols = adjacent(i, self.cells.nx);
            for j in 0..self.nodes.ny {
                let rows = adjacent(j, self.cells.ny);
                let r = self.nodes.idx(i, j);
                let w = 1.0 / (cols.len() * rows.len()) as f64;
                for &a in &cols {
                    for &c in &rows {
                        b.push(r, self.cells.idx(a, c), w);
                    }
                }
            }
        }
        b.build()
    }

    /// ∂/∂x from nodes to cells
    pub fn node_to_cell_dx(&self) -> CsrMatrix {
        let dx = self.mesh.dx();
        let mut b = TripletBuilder::new(self.cells.len(), self.nodes.len());
        for i in 0..self.cells.nx {
            let w = 0.5 / dx[i];
            for j in 0..self.cells.ny {
                let r = self.cells.idx(i, j);
                b.push(r, self.nodes.idx(i + 1, j), w);
                b.push(r, self.nodes.idx(i + 1, j + 1), w);
                b.push(r, self.nodes.idx(i, j), -w);
                b.push(r, self.nodes.idx(i, j + 1), -w);
            }
        }
        b.build()
    }

    /// ∂/∂y from nodes to cells
    pub fn node_to_cell_dy(&self) -> CsrMatrix {
        let dy = self.mesh.dy();
        let mut b = TripletBuilder::new(self.cells.len(), self.nodes.len());
        for j in 0..self.cells.ny {
            let w = 0.5 / dy[j];
            for i in 0..self.cells.nx {
                let r = self.cells.idx(i, j);
                b.push(r, self.nodes.idx(i, j + 1), w);
                b.push(r, self.nodes.idx(i + 1, j + 1), w);
                b.push(r, self.nodes.idx(i, j), -w);
                b.push(r, self.nodes.idx(i + 1, j), -w);
            }
        }
        b.build()
    }

    /// ∂/∂x from cells to nodes. On the outer node columns the missing cell
    /// column is replaced by its neighbour, giving a zero normal derivative.
    pub fn cell_to_node_dx(&self) -> CsrMatrix {
        let dx = self.mesh.dx();
        let mut b = TripletBuilder::new(self.nodes.len(), self.cells.len());
        for i in 0..self.nodes.nx {
            if i == 0 || i == self.cells.nx {
                continue;
            }
            let h = 0.5 * (dx[i - 1] + dx[i]);
            for j in 0..self.nodes.ny {
                let rows = adjacent(j, self.cells.ny);
                let w = 1.0 / (rows.len() as f64 * h);
                let r = self.nodes.idx(i, j);
                for &c in &rows {
                    b.push(r, self.cells.idx(i, c), w);
                    b.push(r, self.cells.idx(i - 1, c), -w);
                }
            }
        }
        b.build()
    }

    /// ∂/∂y from cells to nodes, zero on the outer node rows
    pub fn cell_to_node_dy(&self) -> CsrMatrix {
        let dy = self.mesh.dy();
        let mut b = TripletBuilder::new(self.nodes.len(), self.cells.len());
        for j in 0..self.nodes.ny {
            if j == 0 || j == self.cells.ny {
                continue;
            }
            let h = 0.5 * (dy[j - 1] + dy[j]);
            for i in 0..self.nodes.nx {
                let cols = adjacent(i, self.cells.nx);
                let w = 1.0 / (cols.len() as f64 * h);
                let r = self.nodes.idx(i, j);
                for &a in &cols {
                    b.push(r, self.cells.idx(a, j), w);
                    b.push(r, self.cells.idx(a, j - 1), -w);
                }
            }
        }
        b.build()
    }
}

/// Cells touching node `k` along one axis with `n` cells
fn adjacent(k: usize, n: usize) -> Vec<usize> {
    if k == 0 {
        vec![0]
    } else if k == n {
        vec![n - 1]
    } else {
        vec![k - 1, k]
    }
}
