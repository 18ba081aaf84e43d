//! Block-level sufficient statistics of one network under soft memberships.
//!
//! ```text
//! edges = τ_rowᵀ · X · τ_col      (expected edge mass per block pair)
//! pairs = τ_rowᵀ · M · τ_col      (expected observed dyads per block pair)
//! ```
//!
//! For unipartite networks `τ_col = τ_row`, and the diagonal as well as
//! missing entries are already zero in both `X` and `M`. Undirected
//! networks count every dyad twice in both matrices; the likelihood
//! compensates through `Network::pair_weight`.

use crate::network::Network;
use crate::numeric::quad_form;
use nalgebra::DMatrix;

/// Sufficient statistics for one network
#[derive(Debug, Clone)]
pub struct BlockStats {
    /// Q1×Q2 expected edge mass
    pub edges: DMatrix<f64>,
    /// Q1×Q2 expected number of observed dyads
    pub pairs: DMatrix<f64>,
}

impl BlockStats {
    /// * `net` - the network
    /// * `tau_row` - row memberships (n1×Q1)
    /// * `tau_col` - column memberships (n2×Q2); pass `tau_row` again for
    ///   unipartite networks
    pub fn from_network(net: &Network, tau_row: &DMatrix<f64>, tau_col: &DMatrix<f64>) -> Self {
        BlockStats {
            edges: quad_form(tau_row, net.data(), tau_col),
            pairs: quad_form(tau_row, net.mask(), tau_col),
        }
    }

    /// Total expected number of observed dyads
    pub fn total_pairs(&self) -> f64 {
        self.pairs.sum()
    }

    /// Edge mass of each block pair relative to all observed dyads of the
    /// network: `edges / Σ pairs`. Unlike `edges / pairs` this stays
    /// defined for block pairs the network barely populates.
    pub fn connectivity_profile(&self) -> DMatrix<f64> {
        let total = self.total_pairs();
        if total > 0.0 {
            &self.edges / total
        } else {
            DMatrix::zeros(self.edges.nrows(), self.edges.ncols())
        }
    }
}

/// Sufficient statistics for every network of a collection
pub fn collect_stats(
    networks: &[std::sync::Arc<Network>],
    tau_row: &[DMatrix<f64>],
    tau_col: &[DMatrix<f64>],
) -> Vec<BlockStats> {
    networks
        .iter()
        .enumerate()
        .map(|(m, net)| {
            let tc = if net.is_bipartite() {
                &tau_col[m]
            } else {
                &tau_row[m]
            };
            BlockStats::from_network(net, &tau_row[m], tc)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Emission;
    use crate::numeric::one_hot;
    use approx::assert_abs_diff_eq;

    fn two_triangles() -> Network {
        // nodes {0,1,2} and {3,4,5} fully connected inside, one bridge 2-3
        let mut adj = DMatrix::zeros(6, 6);
        for &(i, j) in &[(0, 1), (0, 2), (1, 2), (3, 4), (3, 5), (4, 5), (2, 3)] {
            adj[(i, j)] = 1.0;
            adj[(j, i)] = 1.0;
        }
        Network::unipartite("tri", adj, Emission::Bernoulli).unwrap()
    }

    #[test]
    fn test_hard_assignment_counts() {
        let net = two_triangles();
        let tau = one_hot(&[0, 0, 0, 1, 1, 1], 2);
        let stats = BlockStats::from_network(&net, &tau, &tau);

        // ordered pairs: 3 undirected edges inside each block -> 6
        assert_abs_diff_eq!(stats.edges[(0, 0)], 6.0, epsilon = 1e-6);
        assert_abs_diff_eq!(stats.edges[(1, 1)], 6.0, epsilon = 1e-6);
        assert_abs_diff_eq!(stats.edges[(0, 1)], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(stats.edges[(1, 0)], 1.0, epsilon = 1e-6);

        // 3*2 ordered pairs inside each block, 3*3 across
        assert_abs_diff_eq!(stats.pairs[(0, 0)], 6.0, epsilon = 1e-6);
        assert_abs_diff_eq!(stats.pairs[(0, 1)], 9.0, epsilon = 1e-6);
        assert_abs_diff_eq!(stats.total_pairs(), 30.0, epsilon = 1e-6);
    }

    #[test]
    fn test_connectivity_profile_sums_to_density() {
        let net = two_triangles();
        let tau = one_hot(&[0, 0, 0, 1, 1, 1], 2);
        let stats = BlockStats::from_network(&net, &tau, &tau);
        let profile = stats.connectivity_profile();
        assert_abs_diff_eq!(profile.sum(), net.density(), epsilon = 1e-6);
    }

    #[test]
    fn test_bipartite_stats_shape() {
        let inc = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 0.0, 0.0, 1.0]);
        let net = Network::bipartite("b", inc, Emission::Bernoulli).unwrap();
        let tr = one_hot(&[0, 0, 1], 2);
        let tc = one_hot(&[0, 1], 2);
        let stats = BlockStats::from_network(&net, &tr, &tc);
        assert_eq!(stats.edges.shape(), (2, 2));
        assert_abs_diff_eq!(stats.edges[(0, 0)], 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(stats.edges[(1, 1)], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(stats.pairs[(0, 0)], 2.0, epsilon = 1e-6);
    }
}
