//! Centering and scaling of design matrices, and the inverse transform.
//!
//! Standardization runs once before the optimizer loop; unstandardization
//! maps the matrix back afterwards. Both representations share the weight
//! handling and the zero-std guard defined here.

use ndarray::{Array1, ArrayView1};
use sprs::CsMat;

use crate::error::{MatrixError, Result};
use crate::matrix_base::check_len;
use crate::scaled_spmat::{map_csc_columns, ColScaledSpMat};

/// Transform parameters produced by `standardize`, consumed by `unstandardize`.
///
/// `stds` is all ones when `scale_predictors` is false.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardizeParams {
    pub means: Array1<f64>,
    pub stds: Array1<f64>,
    pub scale_predictors: bool,
}

/// Weights rescaled to sum to one.
///
/// `None` gives uniform weights `1 / n_rows`. Explicit weights must have one
/// finite, non-negative entry per row and a positive sum.
pub fn normalized_weights(weights: Option<ArrayView1<'_, f64>>, n_rows: usize) -> Result<Array1<f64>> {
    let Some(weights) = weights else {
        if n_rows == 0 {
            return Err(MatrixError::InvalidWeights(
                "cannot average over a matrix with no rows".to_string(),
            ));
        }
        return Ok(Array1::from_elem(n_rows, 1.0 / n_rows as f64));
    };

    check_len("weights", n_rows, weights.len())?;
    if let Some((i, &w)) = weights
        .iter()
        .enumerate()
        .find(|(_, w)| !w.is_finite() || **w < 0.0)
    {
        return Err(MatrixError::InvalidWeights(format!(
            "weight {i} is {w}, weights must be finite and non-negative"
        )));
    }
    let total = weights.sum();
    if total <= 0.0 {
        return Err(MatrixError::InvalidWeights(
            "weights sum to zero".to_string(),
        ));
    }
    Ok(weights.mapv(|w| w / total))
}

/// Elementwise `1 / std`, with zero wherever `std` is zero or the reciprocal
/// is not finite. Constant columns are thereby zeroed out instead of turning
/// into NaN.
pub fn one_over_var_inf_to_zero(stds: ArrayView1<'_, f64>) -> Array1<f64> {
    stds.mapv(|s| {
        let inv = 1.0 / s;
        if s == 0.0 || !inv.is_finite() {
            0.0
        } else {
            inv
        }
    })
}

/// A standard deviation at or below this many ulps of the column's largest
/// absolute value is round-off in the mean, not spread.
const NEGLIGIBLE_STD_ULPS: f64 = 4.0;

/// Shape of one logical column, taken before it is centered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ColumnProfile {
    pub constant: bool,
    pub max_abs: f64,
}

impl ColumnProfile {
    pub(crate) fn from_values(values: impl IntoIterator<Item = f64>) -> Self {
        let mut values = values.into_iter();
        let Some(first) = values.next() else {
            return Self {
                constant: true,
                max_abs: 0.0,
            };
        };
        values.fold(
            Self {
                constant: true,
                max_abs: first.abs(),
            },
            |acc, v| Self {
                constant: acc.constant && v == first,
                max_abs: acc.max_abs.max(v.abs()),
            },
        )
    }

    fn is_degenerate(&self, std: f64) -> bool {
        self.constant || std <= NEGLIGIBLE_STD_ULPS * f64::EPSILON * self.max_abs
    }
}

/// Set the standard deviation of constant and round-off-only columns to
/// exactly zero and return the scale factors `1 / std` (zero for those
/// columns).
pub(crate) fn guarded_scale_factors(stds: &mut Array1<f64>, profiles: &[ColumnProfile]) -> Array1<f64> {
    let mut degenerate = 0;
    for (std, profile) in stds.iter_mut().zip(profiles) {
        if profile.is_degenerate(*std) {
            *std = 0.0;
        }
        if *std == 0.0 || !(1.0 / *std).is_finite() {
            degenerate += 1;
        }
    }
    if degenerate > 0 {
        log::debug!("{degenerate} column(s) with zero standard deviation scaled by zero");
    }
    one_over_var_inf_to_zero(stds.view())
}

/// Multiply the stored values of each column `j` of a CSC matrix by `v[j]`,
/// in place. The sparsity pattern is left untouched.
pub fn scale_csc_columns(mat: &mut CsMat<f64>, v: ArrayView1<'_, f64>) -> Result<()> {
    if !mat.is_csc() {
        return Err(MatrixError::Layout {
            expected: "CSC",
            got: "CSR",
        });
    }
    check_len("column scale vector", mat.cols(), v.len())?;
    map_csc_columns(mat, |j, value| value * v[j]);
    Ok(())
}

/// Center the columns of a sparse matrix without touching its storage.
///
/// Returns the shifted view `mat - means` and the (weighted) column means.
///
/// ```
/// # use glm_matrix::{zero_center, MatrixBase};
/// # use ndarray::array;
/// # use sprs::CsMat;
/// let eye = CsMat::new_csc((2, 2), vec![0, 1, 2], vec![0, 1], vec![1.0, 1.0]);
/// let weights = array![3.0, 1.0];
/// let (centered, means) = zero_center(eye, Some(weights.view())).unwrap();
/// assert_eq!(means, array![0.75, 0.25]);
/// assert_eq!(centered.toarray(), array![[0.25, -0.25], [-0.75, 0.75]]);
/// ```
pub fn zero_center(
    mat: CsMat<f64>,
    weights: Option<ArrayView1<'_, f64>>,
) -> Result<(ColScaledSpMat, Array1<f64>)> {
    let mut centered = ColScaledSpMat::zero_shift(mat)?;
    let params = centered.standardize(weights, false)?;
    Ok((centered, params.means))
}

/// Center and scale the columns of a sparse matrix to weighted mean zero and
/// weighted standard deviation one.
///
/// The stored non-zeros are scaled in place; the matrix is never densified.
/// Columns with zero standard deviation are scaled by zero.
pub fn standardize(
    mat: CsMat<f64>,
    weights: Option<ArrayView1<'_, f64>>,
) -> Result<(ColScaledSpMat, Array1<f64>, Array1<f64>)> {
    let mut standardized = ColScaledSpMat::zero_shift(mat)?;
    let StandardizeParams { means, stds, .. } = standardized.standardize(weights, true)?;
    Ok((standardized, means, stds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rstest::rstest;

    use crate::matrix_base::MatrixBase;

    fn eye2() -> CsMat<f64> {
        CsMat::new_csc((2, 2), vec![0, 1, 2], vec![0, 1], vec![1.0, 1.0])
    }

    #[test]
    fn zero_center_unweighted() {
        let (centered, means) = zero_center(eye2(), None).unwrap();
        assert_abs_diff_eq!(means, array![0.5, 0.5], epsilon = 1e-15);
        assert_abs_diff_eq!(
            centered.toarray(),
            array![[0.5, -0.5], [-0.5, 0.5]],
            epsilon = 1e-15
        );
    }

    #[test]
    fn zero_center_weighted() {
        let w = array![3.0, 1.0];
        let (centered, means) = zero_center(eye2(), Some(w.view())).unwrap();
        assert_abs_diff_eq!(means, array![0.75, 0.25], epsilon = 1e-15);
        assert_abs_diff_eq!(
            centered.toarray(),
            array![[0.25, -0.25], [-0.75, 0.75]],
            epsilon = 1e-15
        );
    }

    #[test]
    fn standardize_unweighted() {
        let (standardized, means, stds) = standardize(eye2(), None).unwrap();
        assert_abs_diff_eq!(means, array![0.5, 0.5], epsilon = 1e-15);
        assert_abs_diff_eq!(stds, array![0.5, 0.5], epsilon = 1e-15);
        assert_abs_diff_eq!(
            standardized.toarray(),
            array![[1.0, -1.0], [-1.0, 1.0]],
            epsilon = 1e-12
        );
    }

    #[test]
    fn standardize_weighted() {
        let w = array![9.0, 1.0];
        let (standardized, means, stds) = standardize(eye2(), Some(w.view())).unwrap();
        assert_abs_diff_eq!(means, array![0.9, 0.1], epsilon = 1e-12);
        assert_abs_diff_eq!(stds, array![0.3, 0.3], epsilon = 1e-12);
        assert_abs_diff_eq!(
            standardized.toarray(),
            array![[1.0 / 3.0, -1.0 / 3.0], [-3.0, 3.0]],
            epsilon = 1e-12
        );
    }

    #[test]
    fn standardize_guards_constant_columns() {
        // Column 1 is constant 2.0 and fully stored.
        let mat = CsMat::new_csc(
            (4, 2),
            vec![0, 2, 6],
            vec![0, 3, 0, 1, 2, 3],
            vec![1.0, 1.0, 2.0, 2.0, 2.0, 2.0],
        );
        let (standardized, means, stds) = standardize(mat, None).unwrap();
        assert_eq!(means[1], 2.0);
        assert_eq!(stds[1], 0.0);
        let dense = standardized.toarray();
        assert!(dense.iter().all(|x| x.is_finite()));
        assert!(dense.column(1).iter().all(|&x| x == 0.0));
        assert_eq!(standardized.shift()[1], 0.0);
    }

    #[test]
    fn scale_csc_columns_keeps_pattern() {
        let mut mat = CsMat::new_csc(
            (3, 2),
            vec![0, 2, 3],
            vec![0, 2, 1],
            vec![1.0, 3.0, 4.0],
        );
        let indices_before = mat.indices().to_vec();
        scale_csc_columns(&mut mat, array![2.0, 0.5].view()).unwrap();
        assert_eq!(mat.data(), &[2.0, 6.0, 2.0]);
        assert_eq!(mat.indices(), indices_before.as_slice());
    }

    #[test]
    fn scale_csc_columns_rejects_csr() {
        let mut mat = CsMat::new((2, 2), vec![0, 1, 2], vec![0, 1], vec![1.0, 1.0]);
        let err = scale_csc_columns(&mut mat, array![1.0, 1.0].view()).unwrap_err();
        assert!(matches!(err, MatrixError::Layout { .. }));
    }

    #[test]
    fn scale_csc_columns_checks_length() {
        let mut mat = eye2();
        let err = scale_csc_columns(&mut mat, array![1.0].view()).unwrap_err();
        assert!(matches!(err, MatrixError::Shape { expected: 2, got: 1, .. }));
    }

    #[test]
    fn column_profile_detects_constants() {
        let constant = ColumnProfile::from_values([0.1, 0.1, 0.1]);
        assert!(constant.constant);
        assert_eq!(constant.max_abs, 0.1);

        let varying = ColumnProfile::from_values([-3.0, 1.0, 2.0]);
        assert!(!varying.constant);
        assert_eq!(varying.max_abs, 3.0);

        assert!(ColumnProfile::from_values(std::iter::empty()).constant);
    }

    #[test]
    fn guard_zeroes_round_off_but_keeps_real_spread() {
        let profiles = [
            ColumnProfile::from_values([0.1; 5]),
            // Near-constant: spread far below the magnitude's precision
            ColumnProfile { constant: false, max_abs: 1e8 },
            // Large offset but a genuine unit spread
            ColumnProfile::from_values([1e8, 1e8 + 1.0]),
        ];
        let mut stds = array![1.4e-17, 1e-9, 0.5];
        let factors = guarded_scale_factors(&mut stds, &profiles);
        assert_eq!(stds, array![0.0, 0.0, 0.5]);
        assert_eq!(factors, array![0.0, 0.0, 2.0]);
    }

    #[rstest]
    #[case(array![0.0, 2.0, 0.5], array![0.0, 0.5, 2.0])]
    #[case(array![f64::NAN, f64::INFINITY, 1e-320], array![0.0, 0.0, 0.0])]
    fn reciprocal_maps_degenerate_to_zero(#[case] stds: Array1<f64>, #[case] expected: Array1<f64>) {
        assert_eq!(one_over_var_inf_to_zero(stds.view()), expected);
    }

    #[rstest]
    #[case(array![1.0, -1.0])]
    #[case(array![1.0, f64::NAN])]
    #[case(array![0.0, 0.0])]
    fn invalid_weights_are_rejected(#[case] w: Array1<f64>) {
        assert!(matches!(
            normalized_weights(Some(w.view()), 2),
            Err(MatrixError::InvalidWeights(_))
        ));
    }

    #[test]
    fn weights_are_normalized() {
        let w = array![3.0, 1.0];
        assert_eq!(normalized_weights(Some(w.view()), 2).unwrap(), array![0.75, 0.25]);
        assert_eq!(normalized_weights(None, 4).unwrap(), array![0.25, 0.25, 0.25, 0.25]);
        assert!(matches!(
            normalized_weights(Some(w.view()), 3),
            Err(MatrixError::Shape { .. })
        ));
    }
}
