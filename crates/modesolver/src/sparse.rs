//! Compressed sparse row storage for the finite-difference operators
//!
//! Operators are accumulated row by row as `(col, value)` pairs and
//! compressed once. Duplicate entries are summed, which is how boundary
//! folding merges ghost coefficients into interior ones.

use num_complex::Complex64;

/// Sparse matrix in Compressed Sparse Row format
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    pub nrows: usize,
    pub ncols: usize,
    pub row_ptr: Vec<usize>,
    pub col_indices: Vec<usize>,
    pub values: Vec<f64>,
}

impl CsrMatrix {
    /// Number of stored entries
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Stored entries of row `i` as `(col, value)`
    pub fn row(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.row_ptr[i]..self.row_ptr[i + 1];
        self.col_indices[range.clone()]
            .iter()
            .copied()
            .zip(self.values[range].iter().copied())
    }

    /// Entry `(i, j)`, zero when not stored
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.row(i).find(|&(c, _)| c == j).map_or(0.0, |(_, v)| v)
    }

    pub fn matvec(&self, x: &[f64]) -> Vec<f64> {
        (0..self.nrows)
            .map(|i| self.row(i).map(|(c, v)| v * x[c]).sum())
            .collect()
    }

    pub fn matvec_complex(&self, x: &[Complex64]) -> Vec<Complex64> {
        (0..self.nrows)
            .map(|i| self.row(i).map(|(c, v)| x[c] * v).sum())
            .collect()
    }

    /// Stored entries as `(row, col, value)` in row order
    pub fn triplets(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        (0..self.nrows).flat_map(move |i| self.row(i).map(move |(c, v)| (i, c, v)))
    }

    /// Row sums, used to check consistency of interpolation operators
    pub fn row_sums(&self) -> Vec<f64> {
        (0..self.nrows).map(|i| self.row(i).map(|(_, v)| v).sum()).collect()
    }
}

/// Row-wise accumulator that compresses into a [`CsrMatrix`]
#[derive(Debug, Clone)]
pub struct TripletBuilder {
    ncols: usize,
    rows: Vec<Vec<(usize, f64)>>,
}

impl TripletBuilder {
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self { ncols, rows: vec![Vec::new(); nrows] }
    }

    /// Add `value` at `(row, col)`; repeated positions are summed
    #[inline]
    pub fn push(&mut self, row: usize, col: usize, value: f64) {
        debug_assert!(col < self.ncols);
        if value != 0.0 {
            self.rows[row].push((col, value));
        }
    }

    pub fn build(self) -> CsrMatrix {
        let nrows = self.rows.len();
        let mut row_ptr = Vec::with_capacity(nrows + 1);
        let mut col_indices = Vec::new();
        let mut values = Vec::new();
        row_ptr.push(0);

        for mut row in self.rows {
            row.sort_by_key(|&(col, _)| col);
            // Merge duplicates
            let mut merged: Vec<(usize, f64)> = Vec::with_capacity(row.len());
            for (col, val) in row {
                if let Some(last) = merged.last_mut() {
                    if last.0 == col {
                        last.1 += val;
                        continue;
                    }
                }
                merged.push((col, val));
            }
            for (col, val) in merged {
                col_indices.push(col);
                values.push(val);
            }
            row_ptr.push(col_indices.len());
        }

        CsrMatrix { nrows, ncols: self.ncols, row_ptr, col_indices, values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_merges_duplicates() {
        let mut b = TripletBuilder::new(3, 3);
        b.push(0, 0, 1.0);
        b.push(0, 0, 2.0);
        b.push(0, 2, -1.0);
        b.push(2, 1, 4.0);
        b.push(1, 1, 0.0);
        let m = b.build();
        assert_eq!(m.nnz(), 3);
        assert_eq!(m.get(0, 0), 3.0);
        assert_eq!(m.get(1, 1), 0.0);
        assert_eq!(m.row_ptr, vec![0, 2, 2, 3]);
        let t: Vec<_> = m.triplets().collect();
        assert_eq!(t, vec![(0, 0, 3.0), (0, 2, -1.0), (2, 1, 4.0)]);
    }

    #[test]
    fn test_matvec() {
        let mut b = TripletBuilder::new(2, 3);
        b.push(0, 0, 1.0);
        b.push(0, 2, 2.0);
        b.push(1, 1, -1.0);
        let m = b.build();
        assert_eq!(m.matvec(&[1.0, 2.0, 3.0]), vec![7.0, -2.0]);
        let y = m.matvec_complex(&[Complex64::new(0.0, 1.0); 3]);
        assert_eq!(y[0], Complex64::new(0.0, 3.0));
        assert_eq!(m.row_sums(), vec![3.0, -1.0]);
    }
}
