//! K-means clustering traits for matrices
//!
//! Rows or columns are clustered with the `clustering` crate. An attempt
//! fails when the input is not finite or a cluster ends up empty; failed
//! attempts are repeated a bounded number of times before the failure is
//! handed back to the caller.

use nalgebra::DMatrix;
use thiserror::Error;

/// Arguments for k-means clustering
#[derive(Debug, Clone)]
pub struct KmeansArgs {
    /// Number of clusters
    pub num_clusters: usize,
    /// Maximum number of iterations per attempt
    pub max_iter: usize,
    /// Maximum number of attempts before giving up
    pub max_retries: usize,
}

impl Default for KmeansArgs {
    fn default() -> Self {
        Self {
            num_clusters: 1,
            max_iter: 100,
            max_retries: 10,
        }
    }
}

impl KmeansArgs {
    /// Create args with specified number of clusters
    pub fn with_clusters(num_clusters: usize) -> Self {
        Self {
            num_clusters,
            ..Default::default()
        }
    }
}

/// Why k-means could not produce a clustering
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KmeansFailure {
    #[error("k-means input contains non-finite values")]
    NonFinite,
    #[error("k-means kept producing an empty cluster ({attempts} attempts)")]
    EmptyCluster { attempts: usize },
}

/// Trait for k-means clustering on matrices
pub trait Kmeans {
    /// Cluster columns and return membership vector
    ///
    /// # Arguments
    /// * `args` - Clustering parameters
    ///
    /// # Returns
    /// Vector of cluster assignments, one per column
    fn kmeans_columns(&self, args: &KmeansArgs) -> Result<Vec<usize>, KmeansFailure>;

    /// Cluster rows and return membership vector
    ///
    /// # Arguments
    /// * `args` - Clustering parameters
    ///
    /// # Returns
    /// Vector of cluster assignments, one per row
    fn kmeans_rows(&self, args: &KmeansArgs) -> Result<Vec<usize>, KmeansFailure>;
}

impl Kmeans for DMatrix<f64> {
    fn kmeans_columns(&self, args: &KmeansArgs) -> Result<Vec<usize>, KmeansFailure> {
        let data: Vec<Vec<f64>> = self
            .column_iter()
            .map(|x| x.iter().cloned().collect())
            .collect();
        kmeans_points(&data, args)
    }

    fn kmeans_rows(&self, args: &KmeansArgs) -> Result<Vec<usize>, KmeansFailure> {
        let data: Vec<Vec<f64>> = self
            .row_iter()
            .map(|x| x.iter().cloned().collect())
            .collect();
        kmeans_points(&data, args)
    }
}

/// K-means over a list of points of equal dimension.
///
/// `num_clusters` larger than the number of points is clamped down.
pub fn kmeans_points(points: &[Vec<f64>], args: &KmeansArgs) -> Result<Vec<usize>, KmeansFailure> {
    let n = points.len();
    if args.num_clusters <= 1 || n == 0 {
        return Ok(vec![0; n]);
    }

    if points.iter().flatten().any(|x| !x.is_finite()) {
        return Err(KmeansFailure::NonFinite);
    }

    let k = args.num_clusters.min(n);
    let attempts = args.max_retries.max(1);

    // fewer distinct points than clusters can never fill every cluster
    if num_distinct(points) < k {
        return Err(KmeansFailure::EmptyCluster { attempts: 0 });
    }

    for _ in 0..attempts {
        let clust = clustering::kmeans(k, points, args.max_iter.max(1));
        if all_clusters_used(&clust.membership, k) {
            return Ok(clust.membership);
        }
    }

    Err(KmeansFailure::EmptyCluster { attempts })
}

fn num_distinct(points: &[Vec<f64>]) -> usize {
    let mut seen: Vec<&Vec<f64>> = Vec::with_capacity(points.len());
    for p in points.iter() {
        if !seen.iter().any(|q| *q == p) {
            seen.push(p);
        }
    }
    seen.len()
}

fn all_clusters_used(membership: &[usize], k: usize) -> bool {
    let mut counts = vec![0usize; k];
    for &c in membership.iter() {
        if c >= k {
            return false;
        }
        counts[c] += 1;
    }
    counts.iter().all(|&c| c > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kmeans_columns_single_cluster() {
        let mat = DMatrix::from_row_slice(2, 4, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);

        let membership = mat.kmeans_columns(&KmeansArgs::with_clusters(1)).unwrap();

        assert_eq!(membership.len(), 4);
        assert!(membership.iter().all(|&x| x == 0));
    }

    #[test]
    fn test_kmeans_columns_two_clusters() {
        let mat = DMatrix::from_row_slice(
            2,
            6,
            &[
                0.0, 0.1, 0.2, 10.0, 10.1, 10.2, // row 0
                0.0, 0.1, 0.0, 10.0, 10.1, 10.2, // row 1
            ],
        );

        let membership = mat.kmeans_columns(&KmeansArgs::with_clusters(2)).unwrap();

        assert_eq!(membership.len(), 6);
        assert_eq!(membership[0], membership[1]);
        assert_eq!(membership[1], membership[2]);
        assert_eq!(membership[3], membership[4]);
        assert_eq!(membership[4], membership[5]);
        assert_ne!(membership[0], membership[3]);
    }

    #[test]
    fn test_kmeans_rows() {
        let mat = DMatrix::from_row_slice(
            4,
            2,
            &[
                0.0, 0.0, // row 0 - cluster A
                0.1, 0.1, // row 1 - cluster A
                10.0, 10.0, // row 2 - cluster B
                10.1, 10.1, // row 3 - cluster B
            ],
        );

        let membership = mat.kmeans_rows(&KmeansArgs::with_clusters(2)).unwrap();

        assert_eq!(membership.len(), 4);
        assert_eq!(membership[0], membership[1]);
        assert_eq!(membership[2], membership[3]);
        assert_ne!(membership[0], membership[2]);
    }

    #[test]
    fn test_kmeans_empty_matrix() {
        let mat: DMatrix<f64> = DMatrix::zeros(0, 0);

        let col_membership = mat.kmeans_columns(&KmeansArgs::with_clusters(2)).unwrap();
        let row_membership = mat.kmeans_rows(&KmeansArgs::with_clusters(2)).unwrap();

        assert!(col_membership.is_empty());
        assert!(row_membership.is_empty());
    }

    #[test]
    fn test_kmeans_non_finite_fails_fast() {
        let mat = DMatrix::from_row_slice(3, 1, &[0.0, f64::NAN, 1.0]);
        let res = mat.kmeans_rows(&KmeansArgs::with_clusters(2));
        assert_eq!(res, Err(KmeansFailure::NonFinite));
    }

    #[test]
    fn test_kmeans_too_few_distinct_points_fails() {
        // three identical rows cannot form two non-empty clusters
        let mat = DMatrix::from_element(3, 2, 1.0);
        let args = KmeansArgs {
            num_clusters: 2,
            max_retries: 4,
            ..Default::default()
        };
        let res = mat.kmeans_rows(&args);
        assert!(matches!(res, Err(KmeansFailure::EmptyCluster { .. })));
    }

    #[test]
    fn test_kmeans_uses_every_cluster() {
        let mat = DMatrix::from_fn(30, 2, |i, j| ((i / 10) * 20 + (i * 7 + j * 3) % 5) as f64);
        let membership = mat.kmeans_rows(&KmeansArgs::with_clusters(3)).unwrap();
        assert!(all_clusters_used(&membership, 3));
        for block in membership.chunks(10) {
            assert!(block.iter().all(|&c| c == block[0]));
        }
    }

    #[test]
    fn test_all_clusters_used() {
        assert!(all_clusters_used(&[0, 1, 1, 2], 3));
        assert!(!all_clusters_used(&[0, 0, 2], 3));
        assert_eq!(num_distinct(&[vec![1.0], vec![1.0], vec![2.0]]), 2);
    }
}
