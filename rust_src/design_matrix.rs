use ndarray::{Array1, Array2, ArrayView1};
use sprs::CsMat;

use crate::config::KernelConfig;
use crate::dense_matrix::DenseGlmMatrix;
use crate::error::{MatrixError, Result};
use crate::matrix_base::MatrixBase;
use crate::scaled_spmat::ColScaledSpMat;
use crate::standardize::StandardizeParams;

/// Design matrix in whichever storage the caller supplied.
///
/// Lets a fitting loop hold dense and shifted-sparse inputs behind one type;
/// every operation dispatches to the wrapped representation.
#[derive(Debug, Clone)]
pub enum DesignMatrix {
    Dense(DenseGlmMatrix),
    ShiftedSparse(ColScaledSpMat),
}

impl DesignMatrix {
    pub fn config(&self) -> &KernelConfig {
        match self {
            Self::Dense(x) => x.config(),
            Self::ShiftedSparse(x) => x.config(),
        }
    }

    pub fn with_config(self, config: KernelConfig) -> Result<Self> {
        Ok(match self {
            Self::Dense(x) => Self::Dense(x.with_config(config)?),
            Self::ShiftedSparse(x) => Self::ShiftedSparse(x.with_config(config)?),
        })
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self, Self::ShiftedSparse(_))
    }

    /// Center, and optionally scale, the columns in place.
    pub fn standardize(
        &mut self,
        weights: Option<ArrayView1<'_, f64>>,
        scale_predictors: bool,
    ) -> Result<StandardizeParams> {
        match self {
            Self::Dense(x) => x.standardize(weights, scale_predictors),
            Self::ShiftedSparse(x) => x.standardize(weights, scale_predictors),
        }
    }

    pub fn unstandardize(&mut self, params: &StandardizeParams) -> Result<()> {
        let StandardizeParams {
            means,
            stds,
            scale_predictors,
        } = params;
        match self {
            Self::Dense(x) => x.unstandardize(means.view(), stds.view(), *scale_predictors),
            Self::ShiftedSparse(x) => x.unstandardize(means.view(), stds.view(), *scale_predictors),
        }
    }
}

impl MatrixBase for DesignMatrix {
    fn shape(&self) -> (usize, usize) {
        match self {
            Self::Dense(x) => x.shape(),
            Self::ShiftedSparse(x) => x.shape(),
        }
    }

    fn sandwich_subset(&self, d: ArrayView1<'_, f64>, rows: &[usize], cols: &[usize]) -> Array2<f64> {
        match self {
            Self::Dense(x) => x.sandwich_subset(d, rows, cols),
            Self::ShiftedSparse(x) => x.sandwich_subset(d, rows, cols),
        }
    }

    fn matvec_subset(&self, v: ArrayView1<'_, f64>, rows: &[usize], cols: &[usize]) -> Array1<f64> {
        match self {
            Self::Dense(x) => x.matvec_subset(v, rows, cols),
            Self::ShiftedSparse(x) => x.matvec_subset(v, rows, cols),
        }
    }

    fn rmatvec_subset(&self, v: ArrayView1<'_, f64>, rows: &[usize], cols: &[usize]) -> Array1<f64> {
        match self {
            Self::Dense(x) => x.rmatvec_subset(v, rows, cols),
            Self::ShiftedSparse(x) => x.rmatvec_subset(v, rows, cols),
        }
    }

    fn matvec_full(&self, v: ArrayView1<'_, f64>) -> Array1<f64> {
        match self {
            Self::Dense(x) => x.matvec_full(v),
            Self::ShiftedSparse(x) => x.matvec_full(v),
        }
    }

    fn rmatvec_full(&self, v: ArrayView1<'_, f64>) -> Array1<f64> {
        match self {
            Self::Dense(x) => x.rmatvec_full(v),
            Self::ShiftedSparse(x) => x.rmatvec_full(v),
        }
    }

    fn getcol(&self, i: usize) -> Result<Self> {
        Ok(match self {
            Self::Dense(x) => Self::Dense(x.getcol(i)?),
            Self::ShiftedSparse(x) => Self::ShiftedSparse(x.getcol(i)?),
        })
    }

    fn toarray(&self) -> Array2<f64> {
        match self {
            Self::Dense(x) => x.toarray(),
            Self::ShiftedSparse(x) => x.toarray(),
        }
    }
}

impl From<DenseGlmMatrix> for DesignMatrix {
    fn from(value: DenseGlmMatrix) -> Self {
        Self::Dense(value)
    }
}

impl From<Array2<f64>> for DesignMatrix {
    fn from(value: Array2<f64>) -> Self {
        Self::Dense(DenseGlmMatrix::new(value))
    }
}

impl From<ColScaledSpMat> for DesignMatrix {
    fn from(value: ColScaledSpMat) -> Self {
        Self::ShiftedSparse(value)
    }
}

/// A plain CSC matrix becomes a shifted-sparse matrix with zero shift.
impl TryFrom<CsMat<f64>> for DesignMatrix {
    type Error = MatrixError;

    fn try_from(value: CsMat<f64>) -> Result<Self> {
        Ok(Self::ShiftedSparse(ColScaledSpMat::zero_shift(value)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn dense() -> Array2<f64> {
        array![[1.0, 0.0], [0.0, 2.0], [3.0, 0.0]]
    }

    fn sparse() -> CsMat<f64> {
        CsMat::new_csc((3, 2), vec![0, 2, 3], vec![0, 2, 1], vec![1.0, 3.0, 2.0])
    }

    #[test]
    fn representations_agree() {
        let a = DesignMatrix::from(dense());
        let b = DesignMatrix::try_from(sparse()).unwrap();
        assert!(!a.is_sparse());
        assert!(b.is_sparse());
        assert_eq!(a.toarray(), b.toarray());

        let d = array![1.0, 0.5, 2.0];
        let rows = [0, 2];
        let cols = [1, 0];
        assert_abs_diff_eq!(
            a.sandwich(d.view(), &rows, &cols).unwrap(),
            b.sandwich(d.view(), &rows, &cols).unwrap(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn standardize_round_trip_through_enum() {
        for mut x in [DesignMatrix::from(dense()), DesignMatrix::try_from(sparse()).unwrap()] {
            let params = x.standardize(None, true).unwrap();
            x.unstandardize(&params).unwrap();
            assert_abs_diff_eq!(x.toarray(), dense(), epsilon = 1e-12);
        }
    }

    #[test]
    fn csr_input_is_rejected() {
        let csr = CsMat::new((2, 2), vec![0, 1, 2], vec![0, 1], vec![1.0, 1.0]);
        assert!(matches!(
            DesignMatrix::try_from(csr),
            Err(MatrixError::Layout { .. })
        ));
    }

    #[test]
    fn with_config_rejects_invalid() {
        let x = DesignMatrix::from(dense());
        assert!(x.with_config(KernelConfig::default().with_block_size(0)).is_err());
    }
}
