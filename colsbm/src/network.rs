//! Networks as validated, immutable dense matrices.
//!
//! Missing entries (NaN) and, for square adjacency matrices, the
//! diagonal are kept out of every statistic through an observation mask.

use crate::error::{Error, Result};
use crate::numeric::ln_factorial;
use nalgebra::DMatrix;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Emission distribution of edge values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emission {
    /// Entries in {0, 1}
    Bernoulli,
    /// Non-negative integer counts
    Poisson,
}

impl FromStr for Emission {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "bernoulli" => Ok(Emission::Bernoulli),
            "poisson" => Ok(Emission::Poisson),
            _ => Err(Error::InvalidOption(format!(
                "unknown emission `{}`: expected bernoulli or poisson",
                s
            ))),
        }
    }
}

impl fmt::Display for Emission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Emission::Bernoulli => write!(f, "bernoulli"),
            Emission::Poisson => write!(f, "poisson"),
        }
    }
}

/// Shape of a network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkKind {
    /// Square adjacency matrix; undirected when symmetric
    Unipartite {
        /// Whether the adjacency matrix is asymmetric
        directed: bool,
    },
    /// Rectangular incidence matrix (rows and columns are distinct node sets)
    Bipartite,
}

/// Node set of a network: rows (all nodes of a unipartite network) or
/// columns of a bipartite incidence matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Row,
    Col,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Row => write!(f, "row"),
            Axis::Col => write!(f, "col"),
        }
    }
}

/// One network of a collection
#[derive(Debug, Clone)]
pub struct Network {
    id: Box<str>,
    kind: NetworkKind,
    emission: Emission,
    /// Edge values with missing and excluded dyads set to zero
    data: DMatrix<f64>,
    /// 1.0 for observed dyads, 0.0 otherwise
    mask: DMatrix<f64>,
    num_dyads: f64,
    ln_factorial_sum: f64,
}

impl Network {
    /// Square adjacency matrix. The diagonal is ignored.
    pub fn unipartite(
        id: impl Into<Box<str>>,
        adjacency: DMatrix<f64>,
        emission: Emission,
    ) -> Result<Self> {
        let id = id.into();
        if adjacency.nrows() != adjacency.ncols() {
            return Err(invalid(
                &id,
                format!(
                    "adjacency matrix must be square, got {}x{}",
                    adjacency.nrows(),
                    adjacency.ncols()
                ),
            ));
        }
        if adjacency.nrows() < 2 {
            return Err(invalid(&id, "needs at least two nodes".to_string()));
        }

        let n = adjacency.nrows();
        let mut mask = adjacency.map(|x| if x.is_nan() { 0.0 } else { 1.0 });
        mask.fill_diagonal(0.0);
        validate_values(&id, &adjacency, &mask, emission)?;

        // only dyads observed in both directions tell the orientation
        let mut directed = false;
        'outer: for i in 0..n {
            for j in (i + 1)..n {
                let (a, b) = (adjacency[(i, j)], adjacency[(j, i)]);
                if !a.is_nan() && !b.is_nan() && a != b {
                    directed = true;
                    break 'outer;
                }
            }
        }

        // an undirected dyad missing on either side is missing
        if !directed {
            mask = mask.zip_map(&mask.transpose(), |a, b| a.min(b));
        }

        let data = adjacency.zip_map(&mask, |x, m| if m > 0.0 { x } else { 0.0 });

        let mut num_dyads = 0.0;
        let mut ln_factorial_sum = 0.0;
        for i in 0..n {
            for j in 0..n {
                if mask[(i, j)] > 0.0 && (directed || j > i) {
                    num_dyads += 1.0;
                    if emission == Emission::Poisson {
                        ln_factorial_sum += ln_factorial(data[(i, j)]);
                    }
                }
            }
        }

        Ok(Network {
            id,
            kind: NetworkKind::Unipartite { directed },
            emission,
            data,
            mask,
            num_dyads,
            ln_factorial_sum,
        })
    }

    /// Rectangular incidence matrix (rows x columns)
    pub fn bipartite(
        id: impl Into<Box<str>>,
        incidence: DMatrix<f64>,
        emission: Emission,
    ) -> Result<Self> {
        let id = id.into();
        if incidence.nrows() < 1 || incidence.ncols() < 1 {
            return Err(invalid(&id, "incidence matrix is empty".to_string()));
        }

        let mask = incidence.map(|x| if x.is_nan() { 0.0 } else { 1.0 });
        validate_values(&id, &incidence, &mask, emission)?;
        let data = incidence.zip_map(&mask, |x, m| if m > 0.0 { x } else { 0.0 });

        let num_dyads = mask.sum();
        let ln_factorial_sum = match emission {
            Emission::Poisson => data.iter().map(|&x| ln_factorial(x)).sum(),
            Emission::Bernoulli => 0.0,
        };

        Ok(Network {
            id,
            kind: NetworkKind::Bipartite,
            emission,
            data,
            mask,
            num_dyads,
            ln_factorial_sum,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> NetworkKind {
        self.kind
    }

    pub fn emission(&self) -> Emission {
        self.emission
    }

    pub fn is_bipartite(&self) -> bool {
        self.kind == NetworkKind::Bipartite
    }

    pub fn is_directed(&self) -> bool {
        matches!(self.kind, NetworkKind::Unipartite { directed: true })
    }

    /// Number of row nodes (all nodes for a unipartite network)
    pub fn nrows(&self) -> usize {
        self.data.nrows()
    }

    /// Number of column nodes (all nodes for a unipartite network)
    pub fn ncols(&self) -> usize {
        self.data.ncols()
    }

    /// Edge values with missing dyads zeroed
    pub fn data(&self) -> &DMatrix<f64> {
        &self.data
    }

    /// Observation mask
    pub fn mask(&self) -> &DMatrix<f64> {
        &self.mask
    }

    /// Observed dyads, each undirected pair counted once
    pub fn num_dyads(&self) -> f64 {
        self.num_dyads
    }

    /// `Σ ln(x!)` over observed dyads (zero for Bernoulli)
    pub fn ln_factorial_sum(&self) -> f64 {
        self.ln_factorial_sum
    }

    /// Weight of an ordered-pair sum in the likelihood: 1/2 when both
    /// `(i,j)` and `(j,i)` describe the same undirected dyad.
    pub fn pair_weight(&self) -> f64 {
        match self.kind {
            NetworkKind::Unipartite { directed: false } => 0.5,
            _ => 1.0,
        }
    }

    /// Row degrees; out- plus in-degree for directed networks
    pub fn row_degree(&self) -> Vec<f64> {
        let out: Vec<f64> = self.data.row_iter().map(|r| r.sum()).collect();
        if self.is_directed() {
            out.iter()
                .zip(self.data.column_iter())
                .map(|(o, c)| o + c.sum())
                .collect()
        } else {
            out
        }
    }

    /// Degrees of the nodes on `axis`
    pub fn degree(&self, axis: Axis) -> Vec<f64> {
        match axis {
            Axis::Row => self.row_degree(),
            Axis::Col => self.col_degree(),
        }
    }

    /// Column degrees; same as `row_degree` for unipartite networks
    pub fn col_degree(&self) -> Vec<f64> {
        if self.is_bipartite() {
            self.data.column_iter().map(|c| c.sum()).collect()
        } else {
            self.row_degree()
        }
    }

    /// Mean edge value over observed dyads
    pub fn density(&self) -> f64 {
        let m = self.mask.sum();
        if m > 0.0 {
            self.data.sum() / m
        } else {
            0.0
        }
    }
}

fn invalid(id: &str, msg: String) -> Error {
    Error::InvalidNetwork {
        net_id: id.to_string(),
        msg,
    }
}

fn validate_values(
    id: &str,
    mat: &DMatrix<f64>,
    mask: &DMatrix<f64>,
    emission: Emission,
) -> Result<()> {
    for ((i, j), (&x, &m)) in mat
        .iter()
        .zip(mask.iter())
        .enumerate()
        .map(|(k, v)| ((k % mat.nrows(), k / mat.nrows()), v))
    {
        if m == 0.0 {
            continue;
        }
        let ok = match emission {
            Emission::Bernoulli => x == 0.0 || x == 1.0,
            Emission::Poisson => x.is_finite() && x >= 0.0 && x.fract() == 0.0,
        };
        if !ok {
            return Err(invalid(
                id,
                format!(
                    "entry ({}, {}) = {} is outside the {} domain",
                    i, j, x, emission
                ),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undirected_detection_and_dyads() {
        let adj = DMatrix::from_row_slice(3, 3, &[0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0]);
        let net = Network::unipartite("a", adj, Emission::Bernoulli).unwrap();
        assert!(!net.is_directed());
        assert_eq!(net.num_dyads(), 3.0);
        assert_eq!(net.pair_weight(), 0.5);
        assert_eq!(net.row_degree(), vec![1.0, 2.0, 1.0]);
    }

    #[test]
    fn test_directed_detection() {
        let adj = DMatrix::from_row_slice(3, 3, &[0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0]);
        let net = Network::unipartite("a", adj, Emission::Bernoulli).unwrap();
        assert!(net.is_directed());
        assert_eq!(net.num_dyads(), 6.0);
        assert_eq!(net.row_degree(), vec![1.0, 2.0, 1.0]);
    }

    #[test]
    fn test_one_sided_missing_dyad_stays_undirected() {
        // two triangles; the (0,1) edge is only recorded as (1,0)
        let mut adj = DMatrix::from_fn(6, 6, |i, j| {
            if i != j && i / 3 == j / 3 {
                1.0
            } else {
                0.0
            }
        });
        adj[(0, 1)] = f64::NAN;
        let net = Network::unipartite("a", adj, Emission::Bernoulli).unwrap();
        assert!(!net.is_directed());
        assert_eq!(net.num_dyads(), 14.0);
        assert_eq!(net.mask()[(1, 0)], 0.0);
        assert_eq!(net.data()[(1, 0)], 0.0);
        assert_eq!(net.mask(), &net.mask().transpose());
    }

    #[test]
    fn test_diagonal_is_ignored() {
        // self-loop value 7 is outside the bernoulli domain but never observed
        let adj = DMatrix::from_row_slice(2, 2, &[7.0, 1.0, 1.0, 0.0]);
        let net = Network::unipartite("a", adj, Emission::Bernoulli).unwrap();
        assert_eq!(net.data()[(0, 0)], 0.0);
        assert_eq!(net.mask()[(0, 0)], 0.0);
    }

    #[test]
    fn test_missing_entries_are_masked() {
        let inc = DMatrix::from_row_slice(2, 2, &[f64::NAN, 1.0, 0.0, 1.0]);
        let net = Network::bipartite("b", inc, Emission::Bernoulli).unwrap();
        assert_eq!(net.num_dyads(), 3.0);
        assert_eq!(net.data()[(0, 0)], 0.0);
        assert_eq!(net.col_degree(), vec![0.0, 2.0]);
    }

    #[test]
    fn test_domain_validation() {
        let inc = DMatrix::from_row_slice(1, 2, &[2.0, 0.0]);
        assert!(matches!(
            Network::bipartite("b", inc.clone(), Emission::Bernoulli),
            Err(Error::InvalidNetwork { .. })
        ));
        assert!(Network::bipartite("b", inc, Emission::Poisson).is_ok());

        let frac = DMatrix::from_row_slice(1, 2, &[0.5, 0.0]);
        assert!(Network::bipartite("b", frac, Emission::Poisson).is_err());

        let neg = DMatrix::from_row_slice(1, 2, &[-1.0, 0.0]);
        assert!(Network::bipartite("b", neg, Emission::Poisson).is_err());
    }

    #[test]
    fn test_non_square_unipartite_is_rejected() {
        let adj = DMatrix::zeros(2, 3);
        assert!(Network::unipartite("a", adj, Emission::Bernoulli).is_err());
    }

    #[test]
    fn test_poisson_ln_factorial_sum() {
        let inc = DMatrix::from_row_slice(1, 3, &[3.0, 0.0, 2.0]);
        let net = Network::bipartite("b", inc, Emission::Poisson).unwrap();
        assert!((net.ln_factorial_sum() - (6f64.ln() + 2f64.ln())).abs() < 1e-10);
    }

    #[test]
    fn test_emission_parse() {
        assert_eq!("Poisson".parse::<Emission>().unwrap(), Emission::Poisson);
        assert!("gaussian".parse::<Emission>().is_err());
    }
}
