//! The operation set every design-matrix representation provides to the
//! fitting loop.
//!
//! Implementors supply the unchecked kernels (`*_subset`, `*_full`); the
//! provided methods validate arguments once and route "no filtering" calls to
//! the unfiltered products.

use std::borrow::Cow;

use ndarray::{Array1, Array2, ArrayView1};

use crate::error::{Axis, MatrixError, Result};

pub trait MatrixBase {
    /// `(n_rows, n_cols)` of the logical matrix.
    fn shape(&self) -> (usize, usize);

    fn nrows(&self) -> usize {
        self.shape().0
    }

    fn ncols(&self) -> usize {
        self.shape().1
    }

    /// X[rows, cols].T @ diag(d[rows]) @ X[rows, cols] on validated input.
    fn sandwich_subset(&self, d: ArrayView1<'_, f64>, rows: &[usize], cols: &[usize])
        -> Array2<f64>;

    /// X[rows, cols] @ v on validated input, `v` positional over `cols`.
    fn matvec_subset(&self, v: ArrayView1<'_, f64>, rows: &[usize], cols: &[usize])
        -> Array1<f64>;

    /// X[rows, cols].T @ v on validated input, `v` positional over `rows`.
    fn rmatvec_subset(&self, v: ArrayView1<'_, f64>, rows: &[usize], cols: &[usize])
        -> Array1<f64>;

    /// X @ v on validated input.
    fn matvec_full(&self, v: ArrayView1<'_, f64>) -> Array1<f64>;

    /// X.T @ v on validated input.
    fn rmatvec_full(&self, v: ArrayView1<'_, f64>) -> Array1<f64>;

    /// Column `i` as a single-column matrix of the same representation.
    fn getcol(&self, i: usize) -> Result<Self>
    where
        Self: Sized;

    /// Dense materialization of the logical matrix.
    fn toarray(&self) -> Array2<f64>;

    /// Weighted Gram matrix of the selected rows and columns.
    ///
    /// `d` has one entry per row of the full matrix; only `rows` are read.
    /// The result is symmetric with shape `(cols.len(), cols.len())`.
    fn sandwich(
        &self,
        d: ArrayView1<'_, f64>,
        rows: &[usize],
        cols: &[usize],
    ) -> Result<Array2<f64>> {
        let (n_rows, n_cols) = self.shape();
        check_len("weight vector d", n_rows, d.len())?;
        check_subset(Axis::Rows, rows, n_rows)?;
        check_subset(Axis::Cols, cols, n_cols)?;
        Ok(self.sandwich_subset(d, rows, cols))
    }

    fn matvec(&self, v: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
        check_len("vector v", self.ncols(), v.len())?;
        Ok(self.matvec_full(v))
    }

    fn rmatvec(&self, v: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
        check_len("vector v", self.nrows(), v.len())?;
        Ok(self.rmatvec_full(v))
    }

    /// X[rows, cols] @ v, returning one entry per element of `rows`.
    fn limited_matvec(
        &self,
        v: ArrayView1<'_, f64>,
        rows: &[usize],
        cols: &[usize],
    ) -> Result<Array1<f64>> {
        let (n_rows, n_cols) = self.shape();
        check_len("vector v", cols.len(), v.len())?;
        // The subset kernels pay for index lookups even when nothing is
        // filtered out. An unfiltered subset is valid, so it skips the checks.
        if is_unfiltered(rows, n_rows) && is_unfiltered(cols, n_cols) {
            log::trace!("limited_matvec: unfiltered fast path");
            return Ok(self.matvec_full(v));
        }
        check_subset(Axis::Rows, rows, n_rows)?;
        check_subset(Axis::Cols, cols, n_cols)?;
        Ok(self.matvec_subset(v, rows, cols))
    }

    /// X[rows, cols].T @ v, returning one entry per element of `cols`.
    fn limited_rmatvec(
        &self,
        v: ArrayView1<'_, f64>,
        rows: &[usize],
        cols: &[usize],
    ) -> Result<Array1<f64>> {
        let (n_rows, n_cols) = self.shape();
        check_len("vector v", rows.len(), v.len())?;
        if is_unfiltered(rows, n_rows) && is_unfiltered(cols, n_cols) {
            log::trace!("limited_rmatvec: unfiltered fast path");
            return Ok(self.rmatvec_full(v));
        }
        check_subset(Axis::Rows, rows, n_rows)?;
        check_subset(Axis::Cols, cols, n_cols)?;
        Ok(self.rmatvec_subset(v, rows, cols))
    }
}

/// `0..n` as an index subset.
pub fn full_subset(n: usize) -> Vec<usize> {
    (0..n).collect()
}

/// Borrow a vector as a slice, copying only when the view is strided.
pub(crate) fn contiguous<'a>(v: &'a ArrayView1<'_, f64>) -> Cow<'a, [f64]> {
    match v.as_slice() {
        Some(slice) => Cow::Borrowed(slice),
        None => Cow::Owned(v.to_vec()),
    }
}

pub(crate) fn check_len(what: &'static str, expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(MatrixError::Shape {
            what,
            expected,
            got,
        });
    }
    Ok(())
}

pub(crate) fn check_index(axis: Axis, index: usize, bound: usize) -> Result<()> {
    if index >= bound {
        return Err(MatrixError::IndexOutOfBounds { axis, index, bound });
    }
    Ok(())
}

/// Every index in range and none repeated.
pub(crate) fn check_subset(axis: Axis, subset: &[usize], bound: usize) -> Result<()> {
    let mut seen = vec![false; bound];
    for &index in subset {
        check_index(axis, index, bound)?;
        if seen[index] {
            return Err(MatrixError::DuplicateIndex { axis, index });
        }
        seen[index] = true;
    }
    Ok(())
}

/// The subset is exactly `0..bound` in order: it selects nothing out and
/// permutes nothing. Such a subset needs no further validation.
pub(crate) fn is_unfiltered(subset: &[usize], bound: usize) -> bool {
    subset.len() == bound && subset.iter().enumerate().all(|(pos, &index)| pos == index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subset_checks() {
        assert!(check_subset(Axis::Rows, &[2, 0, 1], 3).is_ok());
        assert_eq!(
            check_subset(Axis::Cols, &[0, 3], 3),
            Err(MatrixError::IndexOutOfBounds {
                axis: Axis::Cols,
                index: 3,
                bound: 3
            })
        );
        assert_eq!(
            check_subset(Axis::Rows, &[1, 1], 3),
            Err(MatrixError::DuplicateIndex {
                axis: Axis::Rows,
                index: 1
            })
        );
    }

    #[test]
    fn unfiltered_requires_full_ordered_cover() {
        assert!(is_unfiltered(&[0, 1, 2], 3));
        assert!(is_unfiltered(&[], 0));
        assert!(!is_unfiltered(&[0, 2, 1], 3));
        assert!(!is_unfiltered(&[0, 1], 3));
        // Ascending and of full length, but shifted out of range
        assert!(!is_unfiltered(&[1, 2, 3], 3));
    }
}
