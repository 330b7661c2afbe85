//! Dense kernels: restricted sandwich and matrix-vector products over an
//! `ndarray` view of either memory order.
//!
//! Callers validate subsets and vector lengths; these routines index without
//! further checks.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;
use wide::f64x4;

use crate::config::KernelConfig;

/// SIMD dot product with a scalar tail.
#[inline]
fn simd_dot(a: &[f64], b: &[f64]) -> f64 {
    let split = a.len() / 4 * 4;
    let mut acc = f64x4::splat(0.0);
    for (ca, cb) in a[..split].chunks_exact(4).zip(b[..split].chunks_exact(4)) {
        let xa = f64x4::new([ca[0], ca[1], ca[2], ca[3]]);
        let xb = f64x4::new([cb[0], cb[1], cb[2], cb[3]]);
        acc = acc + xa * xb;
    }
    let lanes = acc.to_array();
    let mut sum = lanes[0] + lanes[1] + lanes[2] + lanes[3];
    for (x, y) in a[split..].iter().zip(&b[split..]) {
        sum += x * y;
    }
    sum
}

/// Dense sandwich product: X[rows, cols].T @ diag(d[rows]) @ X[rows, cols]
///
/// `d` is indexed by absolute row. Rows are processed in blocks of
/// `cfg.block_size`: each block gathers the selected columns into two
/// column-major buffers (`left` carries the weights, `right` the raw values)
/// and accumulates the upper triangle from their dot products. The lower
/// triangle is mirrored at the end, so the result is exactly symmetric.
pub fn dense_sandwich(
    x: ArrayView2<'_, f64>,
    d: &[f64],
    rows: &[usize],
    cols: &[usize],
    cfg: &KernelConfig,
) -> Array2<f64> {
    let out_m = cols.len();
    let mut out = Array2::<f64>::zeros((out_m, out_m));

    if rows.is_empty() || out_m == 0 {
        return out;
    }

    for row_block in rows.chunks(cfg.block_size.max(1)) {
        let k = row_block.len();

        // Column-major: selected column c lives at [c * k, (c + 1) * k)
        let mut left = vec![0.0; out_m * k];
        let mut right = vec![0.0; out_m * k];

        let gather = |(c, (l, r)): (usize, (&mut [f64], &mut [f64]))| {
            let col = cols[c];
            for (offset, &row) in row_block.iter().enumerate() {
                let value = x[[row, col]];
                r[offset] = value;
                l[offset] = value * d[row];
            }
        };
        if cfg.parallel {
            left.par_chunks_mut(k)
                .zip(right.par_chunks_mut(k))
                .enumerate()
                .for_each(gather);
        } else {
            left.chunks_mut(k)
                .zip(right.chunks_mut(k))
                .enumerate()
                .for_each(gather);
        }

        let upper = cfg.map_range(out_m, |i| {
            let li = &left[i * k..(i + 1) * k];
            (i..out_m)
                .map(|j| simd_dot(li, &right[j * k..(j + 1) * k]))
                .collect::<Vec<f64>>()
        });

        for (i, values) in upper.into_iter().enumerate() {
            for (offset, value) in values.into_iter().enumerate() {
                out[[i, i + offset]] += value;
            }
        }
    }

    // Mirror upper triangle to lower triangle
    for i in 0..out_m {
        for j in (i + 1)..out_m {
            out[[j, i]] = out[[i, j]];
        }
    }

    out
}

/// Dense matrix-vector product: X[rows, cols] @ v
///
/// `v` is indexed by position in `cols`. Returns a vector of length `rows.len()`.
pub fn dense_matvec(
    x: ArrayView2<'_, f64>,
    v: ArrayView1<'_, f64>,
    rows: &[usize],
    cols: &[usize],
    cfg: &KernelConfig,
) -> Array1<f64> {
    if cols.is_empty() {
        return Array1::zeros(rows.len());
    }

    let out = cfg.map_range(rows.len(), |i| {
        let row = rows[i];
        cols.iter()
            .zip(v.iter())
            .map(|(&col, &vj)| x[[row, col]] * vj)
            .sum::<f64>()
    });
    Array1::from_vec(out)
}

/// Dense transpose matrix-vector product: X[rows, cols].T @ v
///
/// `v` is indexed by position in `rows`. Returns a vector of length `cols.len()`.
pub fn dense_rmatvec(
    x: ArrayView2<'_, f64>,
    v: ArrayView1<'_, f64>,
    rows: &[usize],
    cols: &[usize],
    cfg: &KernelConfig,
) -> Array1<f64> {
    if rows.is_empty() {
        return Array1::zeros(cols.len());
    }

    let out = cfg.map_range(cols.len(), |j| {
        let col = cols[j];
        rows.iter()
            .zip(v.iter())
            .map(|(&row, &vi)| x[[row, col]] * vi)
            .sum::<f64>()
    });
    Array1::from_vec(out)
}

/// Weighted squared deviations per column: sum_i weights[i] * (X[i, j] - shift[j])^2
///
/// Lets the standardization step compute column variances of the centered
/// matrix without materializing it.
pub fn transpose_square_dot_weights(
    x: ArrayView2<'_, f64>,
    weights: ArrayView1<'_, f64>,
    shift: ArrayView1<'_, f64>,
    cfg: &KernelConfig,
) -> Array1<f64> {
    let out = cfg.map_range(x.ncols(), |j| {
        let column = x.column(j);
        let center = shift[j];
        column
            .iter()
            .zip(weights.iter())
            .map(|(&value, &w)| {
                let diff = value - center;
                w * diff * diff
            })
            .sum::<f64>()
    });
    Array1::from_vec(out)
}
