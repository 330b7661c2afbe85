//! Dense design matrix: an owned `Array2<f64>` with the sandwich and
//! restricted product contract on top.

use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};

use crate::config::KernelConfig;
use crate::dense;
use crate::error::{Axis, MatrixError, Result};
use crate::matrix_base::{check_index, check_len, contiguous, MatrixBase};
use crate::standardize::{guarded_scale_factors, normalized_weights, ColumnProfile, StandardizeParams};

/// Element types a dense design matrix may be built from.
///
/// Only floating-point types are accepted; the others exist so that a
/// caller holding integer or boolean data gets an `UnsupportedDtype` error
/// instead of a silent conversion.
pub trait DataElement: Copy {
    const DTYPE: &'static str;
    const IS_FLOAT: bool;

    fn to_f64(self) -> f64;
}

macro_rules! impl_data_element {
    ($($ty:ty => $is_float:expr),* $(,)?) => {
        $(
            impl DataElement for $ty {
                const DTYPE: &'static str = stringify!($ty);
                const IS_FLOAT: bool = $is_float;

                #[inline]
                fn to_f64(self) -> f64 {
                    self as f64
                }
            }
        )*
    };
}

impl_data_element!(
    f64 => true,
    f32 => true,
    i8 => false,
    i16 => false,
    i32 => false,
    i64 => false,
    u8 => false,
    u16 => false,
    u32 => false,
    u64 => false,
);

impl DataElement for bool {
    const DTYPE: &'static str = "bool";
    const IS_FLOAT: bool = false;

    fn to_f64(self) -> f64 {
        if self {
            1.0
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DenseGlmMatrix {
    data: Array2<f64>,
    config: KernelConfig,
}

impl DenseGlmMatrix {
    /// Wrap an `f64` array without copying. Either memory order is accepted.
    pub fn new(data: Array2<f64>) -> Self {
        Self {
            data,
            config: KernelConfig::default(),
        }
    }

    /// Build from any element type, upcasting `f32` and rejecting
    /// non-floating types.
    pub fn try_new<A: DataElement>(data: Array2<A>) -> Result<Self> {
        if !A::IS_FLOAT {
            return Err(MatrixError::UnsupportedDtype { dtype: A::DTYPE });
        }
        Ok(Self::new(data.mapv(A::to_f64)))
    }

    pub fn with_config(mut self, config: KernelConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn as_array(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn into_inner(self) -> Array2<f64> {
        self.data
    }

    /// Center, and optionally scale, the columns in place.
    ///
    /// Means and standard deviations are both computed before the first
    /// write, so an error leaves the matrix as it was. Standard deviations
    /// are taken around the means without squaring a copy of the matrix.
    pub fn standardize(
        &mut self,
        weights: Option<ArrayView1<'_, f64>>,
        scale_predictors: bool,
    ) -> Result<StandardizeParams> {
        let w = normalized_weights(weights, self.data.nrows())?;
        let means = self.data.t().dot(&w);
        let (stds, factors) = if scale_predictors {
            let profiles: Vec<ColumnProfile> = self
                .data
                .columns()
                .into_iter()
                .map(|column| ColumnProfile::from_values(column.iter().copied()))
                .collect();
            let mut stds =
                dense::transpose_square_dot_weights(self.data.view(), w.view(), means.view(), &self.config)
                    .mapv(f64::sqrt);
            let factors = guarded_scale_factors(&mut stds, &profiles);
            (stds, Some(factors))
        } else {
            (Array1::ones(self.data.ncols()), None)
        };

        self.data -= &means;
        if let Some(factors) = factors {
            self.data *= &factors;
        }

        Ok(StandardizeParams {
            means,
            stds,
            scale_predictors,
        })
    }

    /// Undo `standardize`: multiply by `stds` (only if scaling had been
    /// applied), then add `means`.
    pub fn unstandardize(
        &mut self,
        means: ArrayView1<'_, f64>,
        stds: ArrayView1<'_, f64>,
        scale_predictors: bool,
    ) -> Result<()> {
        let n_cols = self.data.ncols();
        check_len("means", n_cols, means.len())?;
        check_len("stds", n_cols, stds.len())?;
        if scale_predictors {
            self.data *= &stds;
        }
        self.data += &means;
        Ok(())
    }
}

impl From<Array2<f64>> for DenseGlmMatrix {
    fn from(data: Array2<f64>) -> Self {
        Self::new(data)
    }
}

impl MatrixBase for DenseGlmMatrix {
    fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    fn sandwich_subset(&self, d: ArrayView1<'_, f64>, rows: &[usize], cols: &[usize]) -> Array2<f64> {
        let d = contiguous(&d);
        dense::dense_sandwich(self.data.view(), &d, rows, cols, &self.config)
    }

    fn matvec_subset(&self, v: ArrayView1<'_, f64>, rows: &[usize], cols: &[usize]) -> Array1<f64> {
        dense::dense_matvec(self.data.view(), v, rows, cols, &self.config)
    }

    fn rmatvec_subset(&self, v: ArrayView1<'_, f64>, rows: &[usize], cols: &[usize]) -> Array1<f64> {
        dense::dense_rmatvec(self.data.view(), v, rows, cols, &self.config)
    }

    fn matvec_full(&self, v: ArrayView1<'_, f64>) -> Array1<f64> {
        self.data.dot(&v)
    }

    fn rmatvec_full(&self, v: ArrayView1<'_, f64>) -> Array1<f64> {
        self.data.t().dot(&v)
    }

    fn getcol(&self, i: usize) -> Result<Self> {
        check_index(Axis::Cols, i, self.data.ncols())?;
        Ok(Self {
            data: self.data.slice(s![.., i..i + 1]).to_owned(),
            config: self.config,
        })
    }

    fn toarray(&self) -> Array2<f64> {
        self.data.clone()
    }
}
