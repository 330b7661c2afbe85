//! Python bindings for the glm_matrix design-matrix layer.
//!
//! Exposes the dense and shifted-sparse representations as Python classes
//! with the sandwich / restricted product contract, plus the sparse
//! standardization helpers. Arrays cross the boundary as numpy arrays;
//! index subsets may be any integer numpy array or list.

use ndarray::Array1;
use numpy::{IntoPyArray, PyArray1, PyArray2, PyReadonlyArray1, PyReadonlyArray2};
use pyo3::exceptions::{PyNotImplementedError, PyTypeError, PyValueError};
use pyo3::prelude::*;

use glm_matrix::{full_subset, ColScaledSpMat, DenseGlmMatrix, MatrixBase, MatrixError, StandardizeParams};

/// Python module `glm_matrix_ext`.
#[pymodule]
fn glm_matrix_ext(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyDenseMatrix>()?;
    m.add_class::<PyColScaledSpMat>()?;
    m.add_function(wrap_pyfunction!(zero_center, m)?)?;
    m.add_function(wrap_pyfunction!(standardize, m)?)?;
    m.add_function(wrap_pyfunction!(one_over_var_inf_to_zero, m)?)?;
    Ok(())
}

// =============================================================================
// Conversions
// =============================================================================

fn to_py_err(err: MatrixError) -> PyErr {
    let msg = err.to_string();
    match err {
        MatrixError::UnsupportedDtype { .. } => PyNotImplementedError::new_err(msg),
        MatrixError::Layout { .. } => PyTypeError::new_err(msg),
        _ => PyValueError::new_err(msg),
    }
}

fn to_usize(values: impl IntoIterator<Item = i64>, what: &str) -> PyResult<Vec<usize>> {
    values
        .into_iter()
        .map(|i| {
            usize::try_from(i).map_err(|_| PyValueError::new_err(format!("negative {what} index {i}")))
        })
        .collect()
}

/// Integer indices from an int32 / int64 numpy array or a Python sequence.
fn index_vec(obj: &Bound<'_, PyAny>, what: &str) -> PyResult<Vec<usize>> {
    if let Ok(arr) = obj.extract::<PyReadonlyArray1<'_, i32>>() {
        return to_usize(arr.as_array().iter().map(|&i| i64::from(i)), what);
    }
    if let Ok(arr) = obj.extract::<PyReadonlyArray1<'_, i64>>() {
        return to_usize(arr.as_array().iter().copied(), what);
    }
    let values: Vec<i64> = obj.extract()?;
    to_usize(values, what)
}

/// `None` selects the whole axis.
fn subset(obj: Option<&Bound<'_, PyAny>>, n: usize, what: &str) -> PyResult<Vec<usize>> {
    match obj {
        Some(obj) if !obj.is_none() => index_vec(obj, what),
        _ => Ok(full_subset(n)),
    }
}

fn dense_from_any(data: &Bound<'_, PyAny>) -> PyResult<DenseGlmMatrix> {
    if let Ok(arr) = data.extract::<PyReadonlyArray2<'_, f64>>() {
        return Ok(DenseGlmMatrix::new(arr.as_array().to_owned()));
    }
    macro_rules! try_dtypes {
        ($($ty:ty),*) => {
            $(
                if let Ok(arr) = data.extract::<PyReadonlyArray2<'_, $ty>>() {
                    return DenseGlmMatrix::try_new(arr.as_array().to_owned()).map_err(to_py_err);
                }
            )*
        };
    }
    try_dtypes!(f32, i64, i32, i16, i8, u64, u32, u16, u8, bool);
    Err(PyTypeError::new_err(
        "DenseGLMDataMatrix expects a two-dimensional numpy array",
    ))
}

fn csc_from_arrays(
    data: PyReadonlyArray1<'_, f64>,
    indices: &Bound<'_, PyAny>,
    indptr: &Bound<'_, PyAny>,
    shape: (usize, usize),
    shift: Option<PyReadonlyArray1<'_, f64>>,
) -> PyResult<ColScaledSpMat> {
    let shift = match shift {
        Some(shift) => shift.as_array().to_owned(),
        None => Array1::zeros(shape.1),
    };
    ColScaledSpMat::from_csc_parts(
        shape,
        index_vec(indptr, "indptr")?,
        index_vec(indices, "row")?,
        data.as_array().to_vec(),
        shift,
    )
    .map_err(to_py_err)
}

// =============================================================================
// Shared method bodies
// =============================================================================

fn sandwich_impl<'py, M: MatrixBase>(
    py: Python<'py>,
    x: &M,
    d: PyReadonlyArray1<'py, f64>,
    rows: Option<&Bound<'py, PyAny>>,
    cols: Option<&Bound<'py, PyAny>>,
) -> PyResult<Bound<'py, PyArray2<f64>>> {
    let rows = subset(rows, x.nrows(), "row")?;
    let cols = subset(cols, x.ncols(), "column")?;
    let out = x.sandwich(d.as_array(), &rows, &cols).map_err(to_py_err)?;
    Ok(out.into_pyarray_bound(py))
}

fn limited_matvec_impl<'py, M: MatrixBase>(
    py: Python<'py>,
    x: &M,
    v: PyReadonlyArray1<'py, f64>,
    rows: Option<&Bound<'py, PyAny>>,
    cols: Option<&Bound<'py, PyAny>>,
) -> PyResult<Bound<'py, PyArray1<f64>>> {
    let rows = subset(rows, x.nrows(), "row")?;
    let cols = subset(cols, x.ncols(), "column")?;
    let out = x.limited_matvec(v.as_array(), &rows, &cols).map_err(to_py_err)?;
    Ok(out.into_pyarray_bound(py))
}

fn limited_rmatvec_impl<'py, M: MatrixBase>(
    py: Python<'py>,
    x: &M,
    v: PyReadonlyArray1<'py, f64>,
    rows: Option<&Bound<'py, PyAny>>,
    cols: Option<&Bound<'py, PyAny>>,
) -> PyResult<Bound<'py, PyArray1<f64>>> {
    let rows = subset(rows, x.nrows(), "row")?;
    let cols = subset(cols, x.ncols(), "column")?;
    let out = x.limited_rmatvec(v.as_array(), &rows, &cols).map_err(to_py_err)?;
    Ok(out.into_pyarray_bound(py))
}

type ParamArrays<'py> = (Bound<'py, PyArray1<f64>>, Bound<'py, PyArray1<f64>>);

fn params_to_py(py: Python<'_>, params: StandardizeParams) -> ParamArrays<'_> {
    (params.means.into_pyarray_bound(py), params.stds.into_pyarray_bound(py))
}

// =============================================================================
// DenseGLMDataMatrix
// =============================================================================

/// Dense float design matrix. Non-float input raises `NotImplementedError`.
#[pyclass(name = "DenseGLMDataMatrix", module = "glm_matrix_ext")]
#[derive(Clone)]
struct PyDenseMatrix {
    inner: DenseGlmMatrix,
}

#[pymethods]
impl PyDenseMatrix {
    #[new]
    fn new(data: &Bound<'_, PyAny>) -> PyResult<Self> {
        Ok(Self {
            inner: dense_from_any(data)?,
        })
    }

    #[getter]
    fn shape(&self) -> (usize, usize) {
        self.inner.shape()
    }

    /// X[rows, cols].T @ diag(d[rows]) @ X[rows, cols]
    #[pyo3(signature = (d, rows=None, cols=None))]
    fn sandwich<'py>(
        &self,
        py: Python<'py>,
        d: PyReadonlyArray1<'py, f64>,
        rows: Option<&Bound<'py, PyAny>>,
        cols: Option<&Bound<'py, PyAny>>,
    ) -> PyResult<Bound<'py, PyArray2<f64>>> {
        sandwich_impl(py, &self.inner, d, rows, cols)
    }

    #[pyo3(signature = (v, rows=None, cols=None))]
    fn limited_matvec<'py>(
        &self,
        py: Python<'py>,
        v: PyReadonlyArray1<'py, f64>,
        rows: Option<&Bound<'py, PyAny>>,
        cols: Option<&Bound<'py, PyAny>>,
    ) -> PyResult<Bound<'py, PyArray1<f64>>> {
        limited_matvec_impl(py, &self.inner, v, rows, cols)
    }

    #[pyo3(signature = (v, rows=None, cols=None))]
    fn limited_rmatvec<'py>(
        &self,
        py: Python<'py>,
        v: PyReadonlyArray1<'py, f64>,
        rows: Option<&Bound<'py, PyAny>>,
        cols: Option<&Bound<'py, PyAny>>,
    ) -> PyResult<Bound<'py, PyArray1<f64>>> {
        limited_rmatvec_impl(py, &self.inner, v, rows, cols)
    }

    fn getcol(&self, i: usize) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.getcol(i).map_err(to_py_err)?,
        })
    }

    fn toarray<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray2<f64>> {
        self.inner.toarray().into_pyarray_bound(py)
    }

    /// Center (and optionally scale) in place; returns `(means, stds)`.
    #[pyo3(signature = (weights=None, scale_predictors=false))]
    fn standardize<'py>(
        &mut self,
        py: Python<'py>,
        weights: Option<PyReadonlyArray1<'py, f64>>,
        scale_predictors: bool,
    ) -> PyResult<ParamArrays<'py>> {
        let params = self
            .inner
            .standardize(weights.as_ref().map(|w| w.as_array()), scale_predictors)
            .map_err(to_py_err)?;
        Ok(params_to_py(py, params))
    }

    fn unstandardize(
        &mut self,
        means: PyReadonlyArray1<'_, f64>,
        stds: PyReadonlyArray1<'_, f64>,
        scale_predictors: bool,
    ) -> PyResult<()> {
        self.inner
            .unstandardize(means.as_array(), stds.as_array(), scale_predictors)
            .map_err(to_py_err)
    }

    fn __repr__(&self) -> String {
        let (n_rows, n_cols) = self.inner.shape();
        format!("DenseGLMDataMatrix(shape=({n_rows}, {n_cols}))")
    }
}

// =============================================================================
// ColScaledSpMat
// =============================================================================

/// CSC matrix plus a per-column shift, built from scipy-style CSC arrays.
#[pyclass(name = "ColScaledSpMat", module = "glm_matrix_ext")]
#[derive(Clone)]
struct PyColScaledSpMat {
    inner: ColScaledSpMat,
}

#[pymethods]
impl PyColScaledSpMat {
    #[new]
    #[pyo3(signature = (data, indices, indptr, shape, shift=None))]
    fn new(
        data: PyReadonlyArray1<'_, f64>,
        indices: &Bound<'_, PyAny>,
        indptr: &Bound<'_, PyAny>,
        shape: (usize, usize),
        shift: Option<PyReadonlyArray1<'_, f64>>,
    ) -> PyResult<Self> {
        Ok(Self {
            inner: csc_from_arrays(data, indices, indptr, shape, shift)?,
        })
    }

    #[getter]
    fn shape(&self) -> (usize, usize) {
        self.inner.shape()
    }

    #[getter]
    fn shift<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<f64>> {
        self.inner.shift().to_owned().into_pyarray_bound(py)
    }

    #[getter]
    fn nnz(&self) -> usize {
        self.inner.mat().nnz()
    }

    #[pyo3(signature = (d, rows=None, cols=None))]
    fn sandwich<'py>(
        &self,
        py: Python<'py>,
        d: PyReadonlyArray1<'py, f64>,
        rows: Option<&Bound<'py, PyAny>>,
        cols: Option<&Bound<'py, PyAny>>,
    ) -> PyResult<Bound<'py, PyArray2<f64>>> {
        sandwich_impl(py, &self.inner, d, rows, cols)
    }

    #[pyo3(signature = (v, rows=None, cols=None))]
    fn limited_matvec<'py>(
        &self,
        py: Python<'py>,
        v: PyReadonlyArray1<'py, f64>,
        rows: Option<&Bound<'py, PyAny>>,
        cols: Option<&Bound<'py, PyAny>>,
    ) -> PyResult<Bound<'py, PyArray1<f64>>> {
        limited_matvec_impl(py, &self.inner, v, rows, cols)
    }

    #[pyo3(signature = (v, rows=None, cols=None))]
    fn limited_rmatvec<'py>(
        &self,
        py: Python<'py>,
        v: PyReadonlyArray1<'py, f64>,
        rows: Option<&Bound<'py, PyAny>>,
        cols: Option<&Bound<'py, PyAny>>,
    ) -> PyResult<Bound<'py, PyArray1<f64>>> {
        limited_rmatvec_impl(py, &self.inner, v, rows, cols)
    }

    fn getcol(&self, i: usize) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.getcol(i).map_err(to_py_err)?,
        })
    }

    fn toarray<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray2<f64>> {
        self.inner.toarray().into_pyarray_bound(py)
    }

    /// Elementwise power, keeping the sparsity pattern. Negative exponents
    /// raise `OverflowError`.
    fn power(&self, exponent: u32) -> Self {
        Self {
            inner: self.inner.power(exponent),
        }
    }

    fn scale_columns(&mut self, v: PyReadonlyArray1<'_, f64>) -> PyResult<()> {
        self.inner.scale_columns(v.as_array()).map_err(to_py_err)
    }

    #[pyo3(signature = (weights=None, scale_predictors=false))]
    fn standardize<'py>(
        &mut self,
        py: Python<'py>,
        weights: Option<PyReadonlyArray1<'py, f64>>,
        scale_predictors: bool,
    ) -> PyResult<ParamArrays<'py>> {
        let params = self
            .inner
            .standardize(weights.as_ref().map(|w| w.as_array()), scale_predictors)
            .map_err(to_py_err)?;
        Ok(params_to_py(py, params))
    }

    fn unstandardize(
        &mut self,
        means: PyReadonlyArray1<'_, f64>,
        stds: PyReadonlyArray1<'_, f64>,
        scale_predictors: bool,
    ) -> PyResult<()> {
        self.inner
            .unstandardize(means.as_array(), stds.as_array(), scale_predictors)
            .map_err(to_py_err)
    }

    fn __repr__(&self) -> String {
        let (n_rows, n_cols) = self.inner.shape();
        format!(
            "ColScaledSpMat(shape=({n_rows}, {n_cols}), nnz={})",
            self.inner.mat().nnz()
        )
    }
}

// =============================================================================
// Module functions
// =============================================================================

/// Center a CSC matrix; returns `(ColScaledSpMat, means)`.
#[pyfunction]
#[pyo3(signature = (data, indices, indptr, shape, weights=None))]
fn zero_center<'py>(
    py: Python<'py>,
    data: PyReadonlyArray1<'py, f64>,
    indices: &Bound<'py, PyAny>,
    indptr: &Bound<'py, PyAny>,
    shape: (usize, usize),
    weights: Option<PyReadonlyArray1<'py, f64>>,
) -> PyResult<(PyColScaledSpMat, Bound<'py, PyArray1<f64>>)> {
    let mut inner = csc_from_arrays(data, indices, indptr, shape, None)?;
    let params = inner
        .standardize(weights.as_ref().map(|w| w.as_array()), false)
        .map_err(to_py_err)?;
    Ok((PyColScaledSpMat { inner }, params.means.into_pyarray_bound(py)))
}

/// Center and scale a CSC matrix; returns `(ColScaledSpMat, means, stds)`.
#[pyfunction]
#[pyo3(signature = (data, indices, indptr, shape, weights=None))]
fn standardize<'py>(
    py: Python<'py>,
    data: PyReadonlyArray1<'py, f64>,
    indices: &Bound<'py, PyAny>,
    indptr: &Bound<'py, PyAny>,
    shape: (usize, usize),
    weights: Option<PyReadonlyArray1<'py, f64>>,
) -> PyResult<(
    PyColScaledSpMat,
    Bound<'py, PyArray1<f64>>,
    Bound<'py, PyArray1<f64>>,
)> {
    let mut inner = csc_from_arrays(data, indices, indptr, shape, None)?;
    let (means, stds) = params_to_py(
        py,
        inner
            .standardize(weights.as_ref().map(|w| w.as_array()), true)
            .map_err(to_py_err)?,
    );
    Ok((PyColScaledSpMat { inner }, means, stds))
}

/// `1 / std` with zero where the reciprocal is not finite.
#[pyfunction]
fn one_over_var_inf_to_zero<'py>(
    py: Python<'py>,
    stds: PyReadonlyArray1<'py, f64>,
) -> Bound<'py, PyArray1<f64>> {
    glm_matrix::one_over_var_inf_to_zero(stds.as_array()).into_pyarray_bound(py)
}
