//! Sparse LU factorization of the shifted operator `A - σI`
//!
//! The operators are real, so one real factorization serves the complex
//! Krylov vectors: the real and imaginary parts are solved together as
//! two right-hand sides.

use faer::linalg::solvers::SpSolver;
use faer::sparse::linalg::solvers::Lu;
use faer::sparse::SparseColMat;
use faer::Mat;
use num_complex::Complex64;
use tracing::debug;

use crate::error::{ModeError, Result};
use crate::sparse::CsrMatrix;

/// LU factors of `A - σI`
pub struct ShiftedLu {
    lu: Lu<usize, f64>,
    n: usize,
    shift: f64,
}

impl ShiftedLu {
    /// Factor `a - shift·I`
    pub fn factor(a: &CsrMatrix, shift: f64) -> Result<Self> {
        if a.nrows != a.ncols {
            return Err(ModeError::config(format!(
                "operator is {}×{}, not square",
                a.nrows, a.ncols
            )));
        }
        let n = a.nrows;

        let mut triplets = Vec::with_capacity(a.nnz() + n);
        let mut has_diagonal = vec![false; n];
        for (i, j, v) in a.triplets() {
            if i == j {
                has_diagonal[i] = true;
                triplets.push((i, j, v - shift));
            } else {
                triplets.push((i, j, v));
            }
        }
        for (i, _) in has_diagonal.iter().enumerate().filter(|(_, d)| !**d) {
            triplets.push((i, i, -shift));
        }

        let shifted = SparseColMat::<usize, f64>::try_new_from_triplets(n, n, &triplets)
            .map_err(|e| ModeError::config(format!("cannot assemble shifted operator: {:?}", e)))?;
        let lu = shifted.sp_lu().map_err(|_| ModeError::SingularShift { shift })?;
        debug!(n, nnz = triplets.len(), shift, "factored shifted operator");

        let lu = Self { lu, n, shift };
        // A zero pivot only surfaces as a non-finite solve
        lu.solve(&vec![Complex64::new(1.0, 0.0); n])?;
        Ok(lu)
    }

    /// Solve `(A - σI)·x = b` in place
    pub fn solve_in_place(&self, b: &mut [Complex64]) -> Result<()> {
        let mut rhs = Mat::<f64>::from_fn(self.n, 2, |i, j| if j == 0 { b[i].re } else { b[i].im });
        self.lu.solve_in_place(rhs.as_mut());
        for (i, z) in b.iter_mut().enumerate() {
            *z = Complex64::new(rhs.read(i, 0), rhs.read(i, 1));
            if !z.is_finite() {
                return Err(ModeError::SingularShift { shift: self.shift });
            }
        }
        Ok(())
    }

    pub fn solve(&self, b: &[Complex64]) -> Result<Vec<Complex64>> {
        let mut x = b.to_vec();
        self.solve_in_place(&mut x)?;
        Ok(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::TripletBuilder;

    fn tridiag(n: usize) -> CsrMatrix {
        let mut b = TripletBuilder::new(n, n);
        for i in 0..n {
            b.push(i, i, 2.0 + i as f64 * 0.1);
            if i > 0 {
                b.push(i, i - 1, -1.0);
            }
            if i + 1 < n {
                b.push(i, i + 1, -1.5);
            }
        }
        b.build()
    }

    fn residual(a: &CsrMatrix, shift: f64, x: &[Complex64], b: &[Complex64]) -> f64 {
        let ax = a.matvec_complex(x);
        ax.iter()
            .zip(x)
            .zip(b)
            .map(|((ax, x), b)| (*ax - *x * shift - *b).norm())
            .fold(0.0, f64::max)
    }

    #[test]
    fn test_solve_tridiagonal() {
        let a = tridiag(20);
        let lu = ShiftedLu::factor(&a, 0.3).unwrap();
        let b: Vec<Complex64> = (0..20).map(|i| Complex64::new(i as f64, 1.0)).collect();
        let x = lu.solve(&b).unwrap();
        assert!(residual(&a, 0.3, &x, &b) < 1e-10);
    }

    #[test]
    fn test_pivoting_required() {
        // Zero leading diagonal forces a row interchange
        let mut t = TripletBuilder::new(4, 4);
        t.push(0, 1, 1.0);
        t.push(1, 0, 2.0);
        t.push(1, 1, 1.0);
        t.push(1, 2, 3.0);
        t.push(2, 1, 1.0);
        t.push(2, 3, 1.0);
        t.push(3, 2, 4.0);
        t.push(3, 3, 1.0);
        let a = t.build();
        let lu = ShiftedLu::factor(&a, 0.0).unwrap();
        let b = vec![Complex64::new(1.0, 0.0), Complex64::new(0.0, 2.0), Complex64::new(-1.0, 0.0), Complex64::new(3.0, 1.0)];
        let x = lu.solve(&b).unwrap();
        assert!(residual(&a, 0.0, &x, &b) < 1e-12);
    }

    #[test]
    fn test_shift_on_missing_diagonal() {
        let mut t = TripletBuilder::new(2, 2);
        t.push(0, 1, 1.0);
        t.push(1, 0, 1.0);
        let a = t.build();
        let lu = ShiftedLu::factor(&a, 2.0).unwrap();
        let b = vec![Complex64::new(1.0, 0.0), Complex64::new(0.0, 0.0)];
        let x = lu.solve(&b).unwrap();
        assert!(residual(&a, 2.0, &x, &b) < 1e-12);
    }

    #[test]
    fn test_singular_shift_reported() {
        let mut t = TripletBuilder::new(3, 3);
        for i in 0..3 {
            t.push(i, i, (i + 1) as f64);
        }
        let a = t.build();
        match ShiftedLu::factor(&a, 2.0) {
            Err(ModeError::SingularShift { shift }) => assert_eq!(shift, 2.0),
            Err(other) => panic!("expected singular shift, got {}", other),
            Ok(_) => panic!("expected singular shift, got a factorization"),
        }
    }

    #[test]
    fn test_non_square_rejected() {
        let a = TripletBuilder::new(2, 3).build();
        assert!(matches!(ShiftedLu::factor(&a, 0.0), Err(ModeError::Configuration(_))));
    }
}
