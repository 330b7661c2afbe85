//! # glm_matrix - Design-Matrix Layer for GLM Fitting
//!
//! This crate provides the matrix operations an IRLS / Newton-type GLM solver
//! needs at every step, over several storage formats with identical
//! semantics.
//!
//! ## Architecture
//!
//! - [`dense`] and [`sparse`]: raw kernels over a dense buffer or compressed
//!   sparse storage, restricted to row and column subsets
//! - [`matrix_base`]: the [`MatrixBase`] contract (sandwich, restricted
//!   matvec / rmatvec, `getcol`, `toarray`)
//! - [`dense_matrix`]: [`DenseGlmMatrix`], an owned float array
//! - [`scaled_spmat`]: [`ColScaledSpMat`], a CSC matrix plus a per-column shift
//! - [`standardize`]: centering / scaling and the inverse transform
//! - [`design_matrix`]: [`DesignMatrix`], dispatch over both representations
//!
//! ## Key Operations
//!
//! - **Sandwich products**: `X.T @ diag(d) @ X` over a row and column subset
//! - **Matrix-vector products**: `X @ v` (matvec) and `X.T @ v` (rmatvec),
//!   with an unfiltered fast path when the subsets cover the whole matrix
//! - **Standardization**: in-place centering and scaling, returning the
//!   parameters needed to undo it
//!
//! ## Performance Features
//!
//! - **Parallelization**: Rayon fan-out over disjoint output slots
//!   (see [`KernelConfig`])
//! - **SIMD**: `wide::f64x4` dot products in the dense sandwich
//! - **No densification**: shifted-sparse products add closed-form rank-1
//!   corrections to the sparse kernels

pub mod config;
pub mod dense;
pub mod dense_matrix;
pub mod design_matrix;
pub mod error;
pub mod matrix_base;
pub mod scaled_spmat;
pub mod sparse;
pub mod standardize;

pub use config::KernelConfig;
pub use dense_matrix::{DataElement, DenseGlmMatrix};
pub use design_matrix::DesignMatrix;
pub use error::{Axis, MatrixError, Result};
pub use matrix_base::{full_subset, MatrixBase};
pub use scaled_spmat::ColScaledSpMat;
pub use standardize::{
    normalized_weights, one_over_var_inf_to_zero, scale_csc_columns, standardize, zero_center,
    StandardizeParams,
};
