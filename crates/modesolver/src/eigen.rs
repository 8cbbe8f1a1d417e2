//! Shift-invert Krylov–Schur eigensolver
//!
//! Finds the eigenvalues of a sparse real operator `A` nearest a real
//! shift `σ` by running Arnoldi on `(A - σI)⁻¹` with thick restarts.
//!
//! Each cycle expands the Krylov decomposition `OP·V = V·H + v·bᵀ` to `m`
//! vectors with two-pass classical Gram–Schmidt, takes the complex Schur
//! form of the projected matrix, and tests the wanted Ritz pairs (largest
//! `|θ|`, i.e. eigenvalues `λ = σ + 1/θ` closest to the shift) against
//! `|β·yₘ| ≤ tol·|θ|`. Unconverged cycles keep an orthonormal basis of the
//! best Ritz vectors and continue from the old residual vector.

use nalgebra::linalg::Schur;
use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use tracing::{debug, trace};

use crate::error::Result;
use crate::linalg::ShiftedLu;
use crate::sparse::CsrMatrix;

/// Relative perturbation mixed into a warm-start vector
const WARM_START_PERTURBATION: f64 = 1e-3;

/// Iteration controls for [`shift_invert`]
#[derive(Debug, Clone)]
pub struct EigenOptions {
    /// Number of eigenpairs wanted
    pub nev: usize,
    /// Relative Ritz residual bound
    pub tol: f64,
    /// Restart budget
    pub max_restarts: usize,
    /// Krylov subspace size; `None` picks `max(2·nev + 1, 20)`
    pub subspace: Option<usize>,
}

impl Default for EigenOptions {
    fn default() -> Self {
        Self { nev: 1, tol: 1e-8, max_restarts: 1000, subspace: None }
    }
}

/// Converged eigenpairs, nearest to the shift first
#[derive(Debug, Clone)]
pub struct EigenPairs {
    pub values: Vec<Complex64>,
    /// Unit-norm eigenvectors, one per value
    pub vectors: Vec<DVector<Complex64>>,
    /// Restart cycles used
    pub restarts: usize,
}

/// Deterministic, non-degenerate start vector
pub fn golden_ratio_vector(n: usize) -> DVector<Complex64> {
    DVector::from_fn(n, |i, _| {
        Complex64::new(((i as f64 + 1.0) * 0.618033988749895).fract() - 0.5, 0.0)
    })
}

/// Starting vector: the warm-start guess plus a small deterministic
/// perturbation, or the golden-ratio vector when there is no usable guess
fn start_vector(n: usize, guess: Option<&DVector<Complex64>>) -> DVector<Complex64> {
    let g = golden_ratio_vector(n);
    let g = &g / Complex64::from(g.norm());
    match guess {
        Some(v) if v.len() == n && v.norm() > 0.0 && v.iter().all(|z| z.is_finite()) => {
            let v = v / Complex64::from(v.norm());
            v + g * Complex64::from(WARM_START_PERTURBATION)
        }
        _ => g,
    }
}

/// Eigenvector of the upper-triangular `t` for its `k`-th diagonal entry
fn triangular_eigenvector(t: &DMatrix<Complex64>, k: usize) -> DVector<Complex64> {
    let n = t.nrows();
    let lambda = t[(k, k)];
    let guard = f64::EPSILON * t.norm().max(f64::MIN_POSITIVE);
    let mut x = DVector::zeros(n);
    x[k] = Complex64::new(1.0, 0.0);
    for r in (0..k).rev() {
        let mut acc = Complex64::new(0.0, 0.0);
        for c in r + 1..=k {
            acc += t[(r, c)] * x[c];
        }
        let mut d = t[(r, r)] - lambda;
        if d.norm() < guard {
            d = Complex64::new(guard, 0.0);
        }
        x[r] = -acc / d;
    }
    x
}

/// Ritz pairs of the projected matrix, ordered by decreasing `|θ|`
fn ritz_pairs(h: &DMatrix<Complex64>) -> Option<Vec<(Complex64, DVector<Complex64>)>> {
    let n = h.nrows();
    let schur = Schur::try_new(h.clone(), f64::EPSILON, 100 * n.max(10))?;
    let (q, t) = schur.unpack();
    let mut pairs: Vec<(Complex64, DVector<Complex64>)> = (0..n)
        .map(|k| {
            let y = &q * triangular_eigenvector(&t, k);
            let norm = y.norm();
            (t[(k, k)], y / Complex64::from(norm))
        })
        .collect();
    pairs.sort_by(|a, b| b.0.norm().total_cmp(&a.0.norm()));
    Some(pairs)
}

/// Eigenpairs of `a` nearest `sigma`. Returns however many of the `nev`
/// wanted pairs converged within the restart budget; the caller decides
/// whether a short result is an error.
pub fn shift_invert(
    a: &CsrMatrix,
    sigma: f64,
    guess: Option<&DVector<Complex64>>,
    opts: &EigenOptions,
) -> Result<EigenPairs> {
    let n = a.nrows;
    let lu = ShiftedLu::factor(a, sigma)?;
    let nev = opts.nev.min(n);
    let m = opts.subspace.unwrap_or((2 * nev + 1).max(20)).max(nev + 1).min(n);

    let op = |v: &DVector<Complex64>| -> Result<DVector<Complex64>> {
        let mut w = v.clone();
        lu.solve_in_place(w.as_mut_slice())?;
        Ok(w)
    };

    let mut basis: Vec<DVector<Complex64>> = Vec::with_capacity(m + 1);
    basis.push(start_vector(n, guess));
    let mut h = DMatrix::<Complex64>::zeros(m + 1, m);
    let mut k = 0;

    for restart in 0..opts.max_restarts.max(1) {
        // Expand the decomposition from k to m columns
        let mut width = m;
        let mut beta = 0.0;
        for j in k..m {
            let mut w = op(&basis[j])?;
            for _pass in 0..2 {
                for (i, v) in basis.iter().enumerate().take(j + 1) {
                    let c = v.dotc(&w);
                    w.axpy(-c, v, Complex64::new(1.0, 0.0));
                    h[(i, j)] += c;
                }
            }
            beta = w.norm();
            h[(j + 1, j)] = Complex64::from(beta);
            if beta <= 64.0 * f64::EPSILON * h.column(j).norm() {
                // Invariant subspace: every Ritz pair below is exact
                width = j + 1;
                beta = 0.0;
                break;
            }
            w /= Complex64::from(beta);
            if basis.len() > j + 1 {
                basis[j + 1] = w;
            } else {
                basis.push(w);
            }
        }

        let hm = h.view((0, 0), (width, width)).into_owned();
        let Some(pairs) = ritz_pairs(&hm) else {
            debug!(restart, "Schur iteration did not converge");
            break;
        };

        let wanted = nev.min(width);
        let residuals: Vec<f64> = pairs.iter().map(|(_, y)| beta * y[width - 1].norm()).collect();
        let converged = pairs
            .iter()
            .zip(&residuals)
            .take(wanted)
            .take_while(|((theta, _), r)| **r <= opts.tol * theta.norm())
            .count();
        trace!(restart, width, converged, "Krylov-Schur cycle");

        let lift = |y: &DVector<Complex64>| -> DVector<Complex64> {
            let mut x = DVector::zeros(n);
            for (c, v) in basis.iter().enumerate().take(width) {
                x.axpy(y[c], v, Complex64::new(1.0, 0.0));
            }
            let norm = x.norm();
            x / Complex64::from(norm)
        };

        if converged == wanted || beta == 0.0 || restart + 1 == opts.max_restarts.max(1) {
            let found: Vec<(Complex64, DVector<Complex64>)> = pairs
                .iter()
                .take(converged)
                .map(|(theta, y)| (sigma + Complex64::new(1.0, 0.0) / theta, lift(y)))
                .collect();
            debug!(
                restarts = restart,
                converged,
                wanted,
                sigma,
                "shift-invert iteration finished"
            );
            return Ok(EigenPairs {
                values: found.iter().map(|(v, _)| *v).collect(),
                vectors: found.into_iter().map(|(_, x)| x).collect(),
                restarts: restart,
            });
        }

        // Thick restart on an orthonormal basis of the best Ritz vectors
        let keep = (nev + (width - nev) / 2).min(width - 1).max(1);
        let mut y_sel = DMatrix::<Complex64>::zeros(width, keep);
        for (c, (_, y)) in pairs.iter().take(keep).enumerate() {
            y_sel.set_column(c, y);
        }
        let z = y_sel.qr().q();
        let t = z.adjoint() * &hm * &z;
        let b = z.row(width - 1) * Complex64::from(beta);

        let residual_vector = basis[width].clone();
        let mut kept = Vec::with_capacity(m + 1);
        for c in 0..keep {
            let mut x = DVector::zeros(n);
            for (r, v) in basis.iter().enumerate().take(width) {
                x.axpy(z[(r, c)], v, Complex64::new(1.0, 0.0));
            }
            kept.push(x);
        }
        kept.push(residual_vector);
        basis = kept;

        h.fill(Complex64::new(0.0, 0.0));
        h.view_mut((0, 0), (keep, keep)).copy_from(&t);
        for c in 0..keep {
            h[(keep, c)] = b[c];
        }
        k = keep;
    }

    Ok(EigenPairs { values: Vec::new(), vectors: Vec::new(), restarts: opts.max_restarts })
}
