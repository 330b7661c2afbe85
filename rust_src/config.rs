//! Tuning knobs shared by the dense and sparse kernels.

use rayon::prelude::*;

use crate::error::{MatrixError, Result};

/// Row block used by the dense sandwich when no config is given.
pub const DEFAULT_BLOCK_SIZE: usize = 512;

/// Kernel execution settings carried by every matrix representation.
///
/// `block_size` is the number of rows the dense sandwich gathers per pass;
/// `parallel` switches the kernels between rayon fan-out and a plain
/// sequential loop. Results are identical in both modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    pub block_size: usize,
    pub parallel: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            parallel: true,
        }
    }
}

impl KernelConfig {
    /// Single-threaded settings, mostly useful in tests and nested parallel code.
    pub fn sequential() -> Self {
        Self {
            parallel: false,
            ..Self::default()
        }
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(MatrixError::InvalidConfig(
                "block_size must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Evaluate `f` on `0..n` and collect in index order, fanning out over
    /// rayon when parallel execution is enabled.
    pub(crate) fn map_range<T, F>(&self, n: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        if self.parallel {
            (0..n).into_par_iter().map(f).collect()
        } else {
            (0..n).map(f).collect()
        }
    }
}
