//! Dense matrix helpers shared across the workspace: k-means over
//! matrix rows/columns, delimited text IO, and small row utilities.

/// K-means clustering of matrix rows or columns
pub mod clustering;

/// Buffered (optionally gzipped) line readers and writers
pub mod common_io;

/// Delimited text IO for `DMatrix<f64>` with missing values
pub mod dmatrix_io;

/// Row-wise helpers for `DMatrix<f64>`
pub mod dmatrix_util;

/// Traits implemented by matrix types
pub mod traits;

/// Membership and label helpers
pub mod utils;
