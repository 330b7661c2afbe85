//! Sparse kernels over raw compressed storage (CSC / CSR).
//!
//! For CSC storage:
//! - `data[indptr[j]..indptr[j+1]]` contains the non-zero values in column j
//! - `indices[indptr[j]..indptr[j+1]]` contains the row indices for those values
//!
//! CSR storage is the same layout with rows and columns swapped, which is also
//! the CSC storage of the transpose. Indices within each compressed slice are
//! assumed sorted.

use ndarray::{Array1, Array2, ArrayView1};

use crate::config::KernelConfig;

/// Borrowed compressed storage of one sparse matrix.
#[derive(Debug, Clone, Copy)]
pub struct CompressedParts<'a> {
    pub indptr: &'a [usize],
    pub indices: &'a [usize],
    pub data: &'a [f64],
}

impl<'a> CompressedParts<'a> {
    pub fn new(indptr: &'a [usize], indices: &'a [usize], data: &'a [f64]) -> Self {
        Self {
            indptr,
            indices,
            data,
        }
    }

    /// Number of compressed slices (columns for CSC, rows for CSR).
    pub fn outer_dim(&self) -> usize {
        self.indptr.len().saturating_sub(1)
    }

    #[inline]
    fn outer(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + 'a {
        let indices: &'a [usize] = self.indices;
        let data: &'a [f64] = self.data;
        let range = self.indptr[i]..self.indptr[i + 1];
        indices[range.clone()]
            .iter()
            .copied()
            .zip(data[range].iter().copied())
    }
}

/// Map from absolute index to position in `subset`.
fn position_map(subset: &[usize], bound: usize) -> Vec<Option<usize>> {
    let mut map = vec![None; bound];
    for (pos, &idx) in subset.iter().enumerate() {
        map[idx] = Some(pos);
    }
    map
}

// =============================================================================
// sparse_sandwich
// =============================================================================

/// Sparse sandwich product: A[rows, cols].T @ diag(d[rows]) @ A[rows, cols]
///
/// `a` is A in CSC storage and `at` is A in CSR storage (the CSC storage of
/// A.T). `d` is indexed by absolute row. Each selected column j only
/// accumulates against columns i <= j, and the lower half is filled by
/// symmetry, so the column subset does not need to be sorted.
pub fn sparse_sandwich(
    a: CompressedParts<'_>,
    at: CompressedParts<'_>,
    d: &[f64],
    rows: &[usize],
    cols: &[usize],
    cfg: &KernelConfig,
) -> Array2<f64> {
    let m = cols.len();
    let n_rows = at.outer_dim();
    let n_cols = a.outer_dim();

    let mut row_included = vec![false; n_rows];
    for &row in rows {
        row_included[row] = true;
    }
    let col_map = position_map(cols, n_cols);

    let partial = cfg.map_range(m, |cj| {
        let j = cols[cj];
        let mut local = vec![0.0; m];

        for (k, a_kj) in a.outer(j) {
            if !row_included[k] {
                continue;
            }
            let a_val = a_kj * d[k];

            for (i, at_ki) in at.outer(k) {
                if i > j {
                    break;
                }
                if let Some(ci) = col_map[i] {
                    local[ci] += at_ki * a_val;
                }
            }
        }
        local
    });

    let mut out = Array2::<f64>::zeros((m, m));
    for (cj, local) in partial.iter().enumerate() {
        let j = cols[cj];
        for (ci, &value) in local.iter().enumerate() {
            if cols[ci] <= j {
                out[[cj, ci]] = value;
                out[[ci, cj]] = value;
            }
        }
    }
    out
}

// =============================================================================
// CSR matvec operations
// =============================================================================

/// CSR matrix-vector product over the whole matrix: X @ v
pub fn csr_matvec_unrestricted(
    csr: CompressedParts<'_>,
    v: ArrayView1<'_, f64>,
    cfg: &KernelConfig,
) -> Array1<f64> {
    let out = cfg.map_range(csr.outer_dim(), |i| {
        csr.outer(i).map(|(j, value)| value * v[j]).sum::<f64>()
    });
    Array1::from_vec(out)
}

/// CSR matrix-vector product restricted to rows/cols: X[rows, cols] @ v
///
/// `v` is indexed by position in `cols`. Output has length `rows.len()`.
pub fn csr_matvec(
    csr: CompressedParts<'_>,
    v: ArrayView1<'_, f64>,
    rows: &[usize],
    cols: &[usize],
    n_cols: usize,
    cfg: &KernelConfig,
) -> Array1<f64> {
    let col_map = position_map(cols, n_cols);

    let out = cfg.map_range(rows.len(), |ci| {
        csr.outer(rows[ci])
            .filter_map(|(j, value)| col_map[j].map(|pos| value * v[pos]))
            .sum::<f64>()
    });
    Array1::from_vec(out)
}

// =============================================================================
// CSC rmatvec operations
// =============================================================================

/// CSC transpose matrix-vector product over the whole matrix: X.T @ v
pub fn csc_rmatvec_unrestricted(
    csc: CompressedParts<'_>,
    v: ArrayView1<'_, f64>,
    cfg: &KernelConfig,
) -> Array1<f64> {
    let out = cfg.map_range(csc.outer_dim(), |j| {
        csc.outer(j).map(|(i, value)| value * v[i]).sum::<f64>()
    });
    Array1::from_vec(out)
}

/// CSC transpose matrix-vector product restricted to rows/cols: X[rows, cols].T @ v
///
/// `v` is indexed by position in `rows`. Output has length `cols.len()`.
pub fn csc_rmatvec(
    csc: CompressedParts<'_>,
    v: ArrayView1<'_, f64>,
    rows: &[usize],
    cols: &[usize],
    n_rows: usize,
    cfg: &KernelConfig,
) -> Array1<f64> {
    let row_map = position_map(rows, n_rows);

    let out = cfg.map_range(cols.len(), |cj| {
        csc.outer(cols[cj])
            .filter_map(|(i, value)| row_map[i].map(|pos| value * v[pos]))
            .sum::<f64>()
    });
    Array1::from_vec(out)
}
