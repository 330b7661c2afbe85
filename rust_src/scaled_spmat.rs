//! Column-shifted sparse matrix: `mat + ones(n_rows) ⊗ shift`.
//!
//! Represents a centered (and possibly scaled) sparse design matrix without
//! densifying it. All products decompose into the sparse product of the
//! underlying CSC matrix plus closed-form rank-1 corrections from the shift.

use std::borrow::Cow;
use std::sync::OnceLock;

use ndarray::{Array1, Array2, ArrayView1};
use sprs::CsMat;

use crate::config::KernelConfig;
use crate::error::{Axis, MatrixError, Result};
use crate::matrix_base::{check_index, check_len, contiguous, MatrixBase};
use crate::sparse::{self, CompressedParts};
use crate::standardize::{guarded_scale_factors, normalized_weights, ColumnProfile, StandardizeParams};

/// Apply `f(column, value)` to every stored value of a CSC matrix in place.
pub(crate) fn map_csc_columns<F>(mat: &mut CsMat<f64>, f: F)
where
    F: Fn(usize, f64) -> f64,
{
    let indptr = mat.proper_indptr().into_owned();
    let data = mat.data_mut();
    for (j, bounds) in indptr.windows(2).enumerate() {
        for value in &mut data[bounds[0]..bounds[1]] {
            *value = f(j, *value);
        }
    }
}

/// `x^p` for any unsigned exponent.
fn powu(x: f64, exponent: u32) -> f64 {
    match i32::try_from(exponent) {
        Ok(p) => x.powi(p),
        Err(_) => x.powf(f64::from(exponent)),
    }
}

fn storage(mat: &CsMat<f64>) -> (Cow<'_, [usize]>, &[usize], &[f64]) {
    (mat.proper_indptr(), mat.indices(), mat.data())
}

#[derive(Debug, Clone)]
pub struct ColScaledSpMat {
    mat: CsMat<f64>,
    shift: Array1<f64>,
    config: KernelConfig,
    // Row-major copy of `mat` for the sandwich and row-restricted kernels.
    // Reset by every in-place mutation of `mat`.
    csr_cache: OnceLock<CsMat<f64>>,
}

impl ColScaledSpMat {
    /// Wrap a CSC matrix and a per-column shift. Neither is copied.
    pub fn new(mat: CsMat<f64>, shift: Array1<f64>) -> Result<Self> {
        if !mat.is_csc() {
            return Err(MatrixError::Layout {
                expected: "CSC",
                got: "CSR",
            });
        }
        check_len("shift", mat.cols(), shift.len())?;
        Ok(Self {
            mat,
            shift,
            config: KernelConfig::default(),
            csr_cache: OnceLock::new(),
        })
    }

    /// Build from raw CSC arrays as handed over by other sparse libraries.
    ///
    /// Row indices within a column may come in any order and are sorted
    /// here; a row repeated within one column is rejected.
    pub fn from_csc_parts(
        shape: (usize, usize),
        indptr: Vec<usize>,
        mut indices: Vec<usize>,
        mut data: Vec<f64>,
        shift: Array1<f64>,
    ) -> Result<Self> {
        let (n_rows, n_cols) = shape;
        check_len("indptr", n_cols + 1, indptr.len())?;
        check_len("data", indices.len(), data.len())?;
        if indptr[0] != 0 || indptr[n_cols] != indices.len() {
            return Err(MatrixError::Structure(format!(
                "indptr must run from 0 to {}, got {}..{}",
                indices.len(),
                indptr[0],
                indptr[n_cols]
            )));
        }
        if let Some(j) = indptr.windows(2).position(|w| w[0] > w[1]) {
            return Err(MatrixError::Structure(format!(
                "indptr decreases at column {j}"
            )));
        }

        for bounds in indptr.windows(2) {
            let start = bounds[0];
            let mut entries: Vec<(usize, f64)> = indices[start..bounds[1]]
                .iter()
                .copied()
                .zip(data[start..bounds[1]].iter().copied())
                .collect();
            entries.sort_unstable_by_key(|&(row, _)| row);
            for (k, &(row, value)) in entries.iter().enumerate() {
                check_index(Axis::Rows, row, n_rows)?;
                if k > 0 && entries[k - 1].0 == row {
                    return Err(MatrixError::DuplicateIndex {
                        axis: Axis::Rows,
                        index: row,
                    });
                }
                indices[start + k] = row;
                data[start + k] = value;
            }
        }

        Self::new(CsMat::new_csc(shape, indptr, indices, data), shift)
    }

    /// Wrap a CSC matrix with an all-zero shift.
    pub fn zero_shift(mat: CsMat<f64>) -> Result<Self> {
        let n_cols = mat.cols();
        Self::new(mat, Array1::zeros(n_cols))
    }

    pub fn with_config(mut self, config: KernelConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// The underlying sparse matrix, without the shift.
    pub fn mat(&self) -> &CsMat<f64> {
        &self.mat
    }

    pub fn shift(&self) -> ArrayView1<'_, f64> {
        self.shift.view()
    }

    pub fn into_parts(self) -> (CsMat<f64>, Array1<f64>) {
        (self.mat, self.shift)
    }

    fn csr(&self) -> &CsMat<f64> {
        self.csr_cache.get_or_init(|| {
            log::debug!(
                "building CSR view of {}x{} sparse matrix ({} non-zeros)",
                self.mat.rows(),
                self.mat.cols(),
                self.mat.nnz()
            );
            self.mat.to_other_storage()
        })
    }

    fn invalidate_cache(&mut self) {
        self.csr_cache = OnceLock::new();
    }

    /// Multiply column `j` of the logical matrix by `v[j]`: both the stored
    /// non-zeros and the shift are scaled.
    pub fn scale_columns(&mut self, v: ArrayView1<'_, f64>) -> Result<()> {
        check_len("column scale vector", self.mat.cols(), v.len())?;
        self.scale_columns_unchecked(v);
        Ok(())
    }

    fn scale_columns_unchecked(&mut self, v: ArrayView1<'_, f64>) {
        map_csc_columns(&mut self.mat, |j, value| value * v[j]);
        self.shift *= &v;
        self.invalidate_cache();
    }

    /// Elementwise power of the logical matrix, as a new shifted matrix with
    /// the same sparsity pattern.
    ///
    /// A stored value `u` in column `j` becomes `(u + s)^p - s^p` and the
    /// shift becomes `s^p`, where `s = shift[j]`; positions outside the
    /// pattern equal `s^p` as required. The exponent is unsigned because a
    /// negative power of an implicit zero is infinite and cannot be shifted
    /// back out of the stored values.
    pub fn power(&self, exponent: u32) -> ColScaledSpMat {
        let shift = &self.shift;
        let mut mat = self.mat.clone();
        if exponent == 2 {
            // (u + s)^2 - s^2 without the cancellation
            map_csc_columns(&mut mat, |j, u| u * (u + 2.0 * shift[j]));
        } else {
            map_csc_columns(&mut mat, |j, u| {
                powu(u + shift[j], exponent) - powu(shift[j], exponent)
            });
        }
        ColScaledSpMat {
            mat,
            shift: shift.mapv(|s| powu(s, exponent)),
            config: self.config,
            csr_cache: OnceLock::new(),
        }
    }

    /// Constancy and magnitude of each logical column.
    fn column_profiles(&self) -> Vec<ColumnProfile> {
        let n_rows = self.mat.rows();
        let (indptr, _, data) = storage(&self.mat);
        indptr
            .windows(2)
            .zip(self.shift.iter())
            .map(|(bounds, &s)| {
                let stored = data[bounds[0]..bounds[1]].iter().map(move |&u| u + s);
                let implicit = (bounds[1] - bounds[0] < n_rows).then_some(s);
                ColumnProfile::from_values(implicit.into_iter().chain(stored))
            })
            .collect()
    }

    /// Center, and optionally scale, the logical matrix in place.
    ///
    /// The means are those of the current logical matrix, so standardizing
    /// an already shifted matrix composes correctly. Standard deviations come
    /// from the weighted column means of `power(2)` of the centered matrix.
    pub fn standardize(
        &mut self,
        weights: Option<ArrayView1<'_, f64>>,
        scale_predictors: bool,
    ) -> Result<StandardizeParams> {
        let w = normalized_weights(weights, self.mat.rows())?;
        let means = self.rmatvec_full(w.view());
        let profiles = scale_predictors.then(|| self.column_profiles());

        self.shift -= &means;

        let stds = if let Some(profiles) = profiles {
            let second_moments = self.power(2).rmatvec_full(w.view());
            // Clamp round-off below zero before the square root
            let mut stds = second_moments.mapv(|m| m.max(0.0).sqrt());
            let factors = guarded_scale_factors(&mut stds, &profiles);
            self.scale_columns_unchecked(factors.view());
            stds
        } else {
            Array1::ones(self.mat.cols())
        };

        Ok(StandardizeParams {
            means,
            stds,
            scale_predictors,
        })
    }

    /// Undo `standardize`: scale columns back by `stds` (only if scaling had
    /// been applied), then add the means back onto the shift.
    pub fn unstandardize(
        &mut self,
        means: ArrayView1<'_, f64>,
        stds: ArrayView1<'_, f64>,
        scale_predictors: bool,
    ) -> Result<()> {
        let n_cols = self.mat.cols();
        check_len("means", n_cols, means.len())?;
        check_len("stds", n_cols, stds.len())?;
        if scale_predictors {
            self.scale_columns_unchecked(stds);
        }
        self.shift += &means;
        Ok(())
    }
}

impl MatrixBase for ColScaledSpMat {
    fn shape(&self) -> (usize, usize) {
        (self.mat.rows(), self.mat.cols())
    }

    /// Underlying sandwich plus the shift terms. With `t = U.T @ d` over the
    /// selected block, `s = shift[cols]` and `D = sum(d[rows])`:
    /// `X.T D X = U.T D U + t s' + s t' + D s s'`.
    fn sandwich_subset(&self, d: ArrayView1<'_, f64>, rows: &[usize], cols: &[usize]) -> Array2<f64> {
        let d = contiguous(&d);
        let (indptr, indices, data) = storage(&self.mat);
        let csc = CompressedParts::new(&indptr, indices, data);
        let csr_mat = self.csr();
        let (csr_indptr, csr_indices, csr_data) = storage(csr_mat);
        let csr = CompressedParts::new(&csr_indptr, csr_indices, csr_data);

        let base = sparse::sparse_sandwich(csc, csr, &d, rows, cols, &self.config);

        let d_rows: Array1<f64> = rows.iter().map(|&r| d[r]).collect();
        let t = sparse::csc_rmatvec(csc, d_rows.view(), rows, cols, self.mat.rows(), &self.config);
        let s: Array1<f64> = cols.iter().map(|&c| self.shift[c]).collect();
        let total = d_rows.sum();

        let t_col = t.view().insert_axis(ndarray::Axis(1));
        let s_col = s.view().insert_axis(ndarray::Axis(1));
        let s_row = s.view().insert_axis(ndarray::Axis(0));
        let ts = &t_col * &s_row;
        let cross = &ts + &ts.t();
        let shift_outer = (&s_col * &s_row) * total;

        base + cross + shift_outer
    }

    fn matvec_subset(&self, v: ArrayView1<'_, f64>, rows: &[usize], cols: &[usize]) -> Array1<f64> {
        let csr_mat = self.csr();
        let (indptr, indices, data) = storage(csr_mat);
        let csr = CompressedParts::new(&indptr, indices, data);
        let offset: f64 = cols.iter().zip(v.iter()).map(|(&c, &vj)| self.shift[c] * vj).sum();
        sparse::csr_matvec(csr, v, rows, cols, self.mat.cols(), &self.config) + offset
    }

    fn rmatvec_subset(&self, v: ArrayView1<'_, f64>, rows: &[usize], cols: &[usize]) -> Array1<f64> {
        let (indptr, indices, data) = storage(&self.mat);
        let csc = CompressedParts::new(&indptr, indices, data);
        let v_total = v.sum();
        let mut out = sparse::csc_rmatvec(csc, v, rows, cols, self.mat.rows(), &self.config);
        for (o, &c) in out.iter_mut().zip(cols) {
            *o += v_total * self.shift[c];
        }
        out
    }

    fn matvec_full(&self, v: ArrayView1<'_, f64>) -> Array1<f64> {
        let csr_mat = self.csr();
        let (indptr, indices, data) = storage(csr_mat);
        let csr = CompressedParts::new(&indptr, indices, data);
        let offset = self.shift.dot(&v);
        sparse::csr_matvec_unrestricted(csr, v, &self.config) + offset
    }

    fn rmatvec_full(&self, v: ArrayView1<'_, f64>) -> Array1<f64> {
        let (indptr, indices, data) = storage(&self.mat);
        let csc = CompressedParts::new(&indptr, indices, data);
        let out = sparse::csc_rmatvec_unrestricted(csc, v, &self.config);
        out + &(&self.shift * v.sum())
    }

    fn getcol(&self, i: usize) -> Result<Self> {
        check_index(Axis::Cols, i, self.mat.cols())?;
        let (indptr, indices, data) = storage(&self.mat);
        let range = indptr[i]..indptr[i + 1];
        let column = CsMat::new_csc(
            (self.mat.rows(), 1),
            vec![0, range.len()],
            indices[range.clone()].to_vec(),
            data[range].to_vec(),
        );
        Ok(ColScaledSpMat {
            mat: column,
            shift: Array1::from_elem(1, self.shift[i]),
            config: self.config,
            csr_cache: OnceLock::new(),
        })
    }

    fn toarray(&self) -> Array2<f64> {
        let mut out = Array2::<f64>::zeros((self.mat.rows(), self.mat.cols()));
        let (indptr, indices, data) = storage(&self.mat);
        for (j, bounds) in indptr.windows(2).enumerate() {
            for idx in bounds[0]..bounds[1] {
                out[[indices[idx], j]] = data[idx];
            }
        }
        out += &self.shift;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    use crate::dense_matrix::DenseGlmMatrix;
    use crate::matrix_base::full_subset;

    // [[1, 0, 2],
    //  [0, 3, 0],
    //  [4, 0, 5],
    //  [0, 6, 7]]
    fn sample() -> ColScaledSpMat {
        let mat = CsMat::new_csc(
            (4, 3),
            vec![0, 2, 4, 7],
            vec![0, 2, 1, 3, 0, 2, 3],
            vec![1.0, 4.0, 3.0, 6.0, 2.0, 5.0, 7.0],
        );
        ColScaledSpMat::new(mat, array![-1.5, 0.5, 2.0]).unwrap()
    }

    fn logical() -> Array2<f64> {
        array![
            [1.0, 0.0, 2.0],
            [0.0, 3.0, 0.0],
            [4.0, 0.0, 5.0],
            [0.0, 6.0, 7.0],
        ] + &array![-1.5, 0.5, 2.0]
    }

    #[test]
    fn rejects_csr_and_bad_shift() {
        let csr = CsMat::new((2, 2), vec![0, 1, 2], vec![0, 1], vec![1.0, 1.0]);
        assert!(matches!(
            ColScaledSpMat::new(csr, array![0.0, 0.0]),
            Err(MatrixError::Layout { .. })
        ));
        let csc = CsMat::new_csc((2, 2), vec![0, 1, 2], vec![0, 1], vec![1.0, 1.0]);
        assert!(matches!(
            ColScaledSpMat::new(csc, array![0.0]),
            Err(MatrixError::Shape { expected: 2, got: 1, .. })
        ));
    }

    #[test]
    fn from_csc_parts_sorts_rows_within_columns() {
        let x = ColScaledSpMat::from_csc_parts(
            (4, 3),
            vec![0, 2, 4, 7],
            vec![2, 0, 3, 1, 3, 0, 2],
            vec![4.0, 1.0, 6.0, 3.0, 7.0, 2.0, 5.0],
            array![-1.5, 0.5, 2.0],
        )
        .unwrap();
        assert_eq!(x.toarray(), logical());
    }

    #[test]
    fn from_csc_parts_rejects_malformed_input() {
        let shift = || array![0.0, 0.0];
        assert!(matches!(
            ColScaledSpMat::from_csc_parts((2, 2), vec![0, 2, 1], vec![0, 1], vec![1.0, 1.0], shift()),
            Err(MatrixError::Structure(_))
        ));
        assert!(matches!(
            ColScaledSpMat::from_csc_parts((2, 2), vec![0, 2, 2], vec![1, 1], vec![1.0, 1.0], shift()),
            Err(MatrixError::DuplicateIndex { index: 1, .. })
        ));
        assert!(matches!(
            ColScaledSpMat::from_csc_parts((2, 2), vec![0, 1, 2], vec![0, 5], vec![1.0, 1.0], shift()),
            Err(MatrixError::IndexOutOfBounds { index: 5, .. })
        ));
        assert!(matches!(
            ColScaledSpMat::from_csc_parts((2, 2), vec![0, 1], vec![0], vec![1.0], shift()),
            Err(MatrixError::Shape { what: "indptr", .. })
        ));
    }

    #[test]
    fn toarray_adds_shift() {
        assert_eq!(sample().toarray(), logical());
    }

    #[test]
    fn sandwich_matches_dense() {
        let x = sample();
        let dense = DenseGlmMatrix::new(logical());
        let d = array![0.5, 1.0, 2.0, 0.25];
        let rows = [3, 0, 2];
        let cols = [1, 2];
        let got = x.sandwich(d.view(), &rows, &cols).unwrap();
        let expected = dense.sandwich(d.view(), &rows, &cols).unwrap();
        assert_abs_diff_eq!(got, expected, epsilon = 1e-12);
        assert_eq!(got, got.t());
    }

    #[test]
    fn restricted_products_match_dense() {
        let x = sample();
        let dense = DenseGlmMatrix::new(logical());
        let rows = [1, 3];
        let cols = [2, 0];
        let v = array![1.0, -2.0];
        assert_abs_diff_eq!(
            x.limited_matvec(v.view(), &rows, &cols).unwrap(),
            dense.limited_matvec(v.view(), &rows, &cols).unwrap(),
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(
            x.limited_rmatvec(v.view(), &rows, &cols).unwrap(),
            dense.limited_rmatvec(v.view(), &rows, &cols).unwrap(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn unfiltered_limited_products_are_the_full_products() {
        let x = sample();
        let rows = full_subset(4);
        let cols = full_subset(3);
        let v = array![0.3, -1.0, 2.0];
        assert_eq!(
            x.limited_matvec(v.view(), &rows, &cols).unwrap(),
            x.matvec(v.view()).unwrap()
        );
        let w = array![1.0, 2.0, 3.0, 4.0];
        assert_eq!(
            x.limited_rmatvec(w.view(), &rows, &cols).unwrap(),
            x.rmatvec(w.view()).unwrap()
        );
    }

    #[test]
    fn power_two_is_elementwise_square() {
        let squared = sample().power(2);
        assert_abs_diff_eq!(squared.toarray(), logical().mapv(|x| x * x), epsilon = 1e-12);
        let cubed = sample().power(3);
        assert_abs_diff_eq!(cubed.toarray(), logical().mapv(|x| x.powi(3)), epsilon = 1e-12);
    }

    #[test]
    fn power_keeps_implicit_zeros_without_shift() {
        // [[2], [0]]
        let x = ColScaledSpMat::zero_shift(CsMat::new_csc((2, 1), vec![0, 1], vec![0], vec![2.0])).unwrap();
        assert_eq!(x.power(3).toarray(), array![[8.0], [0.0]]);
        assert_eq!(x.power(3).mat().nnz(), 1);
        assert_eq!(x.power(0).toarray(), array![[1.0], [1.0]]);
    }

    #[test]
    fn power_zero_is_all_ones_with_shift() {
        assert_eq!(sample().power(0).toarray(), Array2::<f64>::ones((4, 3)));
    }

    #[test]
    fn inexact_constant_columns_are_scaled_by_zero() {
        // Column 0 stores 0.1 in every row, column 1 is an implicit-zero
        // column shifted to 0.1, column 2 varies.
        for n in [5, 10, 1000] {
            let indptr = vec![0, n, n, n + 2];
            let mut indices: Vec<usize> = (0..n).collect();
            indices.extend([0, n - 1]);
            let mut data = vec![0.1; n];
            data.extend([1.0, 3.0]);
            let mut x = ColScaledSpMat::new(
                CsMat::new_csc((n, 3), indptr, indices, data),
                array![0.0, 0.1, 0.0],
            )
            .unwrap();
            let mut dense = DenseGlmMatrix::new(x.toarray());

            let params = x.standardize(None, true).unwrap();
            assert_eq!(params.stds[0], 0.0);
            assert_eq!(params.stds[1], 0.0);
            assert!(params.stds[2] > 0.0);
            let standardized = x.toarray();
            assert!(standardized.column(0).iter().all(|&v| v == 0.0));
            assert!(standardized.column(1).iter().all(|&v| v == 0.0));

            let dense_params = dense.standardize(None, true).unwrap();
            assert_eq!(dense_params.stds.slice(ndarray::s![..2]), params.stds.slice(ndarray::s![..2]));
            assert_abs_diff_eq!(dense.toarray(), standardized, epsilon = 1e-12);
        }
    }

    #[test]
    fn scale_columns_scales_data_and_shift() {
        let mut x = sample();
        // Populate the cache so scaling has to reset it
        let _ = x.matvec(array![1.0, 1.0, 1.0].view()).unwrap();
        x.scale_columns(array![2.0, 0.5, -1.0].view()).unwrap();
        let expected = logical() * &array![2.0, 0.5, -1.0];
        assert_abs_diff_eq!(x.toarray(), expected, epsilon = 1e-12);
        assert_abs_diff_eq!(
            x.matvec(array![1.0, 1.0, 1.0].view()).unwrap(),
            expected.sum_axis(ndarray::Axis(1)),
            epsilon = 1e-12
        );
    }

    #[test]
    fn getcol_keeps_shift() {
        let col = sample().getcol(2).unwrap();
        assert_eq!(col.shape(), (4, 1));
        assert_eq!(col.toarray(), array![[4.0], [2.0], [7.0], [9.0]]);
        assert!(matches!(
            sample().getcol(3),
            Err(MatrixError::IndexOutOfBounds { index: 3, .. })
        ));
    }

    #[test]
    fn standardize_round_trip() {
        let mut x = sample();
        let w = array![1.0, 2.0, 3.0, 4.0];
        let params = x.standardize(Some(w.view()), true).unwrap();
        let standardized = x.toarray();
        let wn = &w / w.sum();
        assert_abs_diff_eq!(standardized.t().dot(&wn), Array1::zeros(3), epsilon = 1e-12);
        assert_abs_diff_eq!(
            standardized.mapv(|v| v * v).t().dot(&wn),
            Array1::ones(3),
            epsilon = 1e-12
        );
        x.unstandardize(params.means.view(), params.stds.view(), true).unwrap();
        assert_abs_diff_eq!(x.toarray(), logical(), epsilon = 1e-12);
    }

    #[test]
    fn failed_standardize_leaves_matrix_untouched() {
        let mut x = sample();
        let bad = array![1.0, -1.0, 1.0, 1.0];
        assert!(x.standardize(Some(bad.view()), true).is_err());
        assert_eq!(x.toarray(), logical());
    }
}
