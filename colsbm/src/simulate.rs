//! Sampling networks from block models.

use crate::error::{Error, Result};
use crate::network::{Emission, Network};
use nalgebra::DMatrix;
use rand::Rng;
use rand_distr::weighted::WeightedIndex;
use rand_distr::{Distribution, Poisson};

/// A sampled network with the labels that generated it
#[derive(Debug, Clone)]
pub struct SimulatedNetwork {
    pub network: Network,
    pub row_labels: Vec<usize>,
    /// Column labels of a bipartite network
    pub col_labels: Option<Vec<usize>>,
}

fn sample_value<R: Rng>(rate: f64, emission: Emission, rng: &mut R) -> f64 {
    match emission {
        Emission::Bernoulli => {
            if rng.random_bool(rate.clamp(0.0, 1.0)) {
                1.0
            } else {
                0.0
            }
        }
        Emission::Poisson => match Poisson::new(rate) {
            Ok(pois) => pois.sample(rng),
            Err(_) => 0.0,
        },
    }
}

/// Block labels drawn from `mixture`
pub fn sample_labels<R: Rng>(n: usize, mixture: &[f64], rng: &mut R) -> Result<Vec<usize>> {
    let dist = WeightedIndex::new(mixture)
        .map_err(|e| Error::InvalidOption(format!("mixture {:?}: {}", mixture, e)))?;
    Ok((0..n).map(|_| dist.sample(rng)).collect())
}

/// G(n, p) without self-loops
pub fn erdos_renyi<R: Rng>(id: &str, n: usize, p: f64, rng: &mut R) -> Result<Network> {
    let mut adj = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in (i + 1)..n {
            if rng.random_bool(p.clamp(0.0, 1.0)) {
                adj[(i, j)] = 1.0;
                adj[(j, i)] = 1.0;
            }
        }
    }
    Network::unipartite(id, adj, Emission::Bernoulli)
}

fn check_shapes(
    alpha: &DMatrix<f64>,
    pi: &[f64],
    rho: &[f64],
    delta: &[f64],
    m: usize,
) -> Result<()> {
    if alpha.nrows() != pi.len() || alpha.ncols() != rho.len() {
        return Err(Error::InvalidOption(format!(
            "connectivity is {}x{} but mixtures have {} and {} blocks",
            alpha.nrows(),
            alpha.ncols(),
            pi.len(),
            rho.len()
        )));
    }
    if delta.len() != m {
        return Err(Error::InvalidOption(format!(
            "{} density multipliers for {} networks",
            delta.len(),
            m
        )));
    }
    Ok(())
}

/// One network per entry of `sizes`, with connectivity `delta[m] * alpha`.
/// Undirected unless `directed`.
pub fn generate_unipartite_collection<R: Rng>(
    sizes: &[usize],
    pi: &[f64],
    alpha: &DMatrix<f64>,
    delta: &[f64],
    emission: Emission,
    directed: bool,
    rng: &mut R,
) -> Result<Vec<SimulatedNetwork>> {
    check_shapes(alpha, pi, pi, delta, sizes.len())?;

    sizes
        .iter()
        .zip(delta.iter())
        .enumerate()
        .map(|(m, (&n, &d))| {
            let labels = sample_labels(n, pi, rng)?;
            let mut adj = DMatrix::zeros(n, n);
            for i in 0..n {
                let start = if directed { 0 } else { i + 1 };
                for j in start..n {
                    if i == j {
                        continue;
                    }
                    let x = sample_value(d * alpha[(labels[i], labels[j])], emission, rng);
                    adj[(i, j)] = x;
                    if !directed {
                        adj[(j, i)] = x;
                    }
                }
            }
            Ok(SimulatedNetwork {
                network: Network::unipartite(format!("net{}", m), adj, emission)?,
                row_labels: labels,
                col_labels: None,
            })
        })
        .collect()
}

/// One `n1 x n2` incidence matrix per entry of `dims`, with connectivity
/// `delta[m] * alpha`
pub fn generate_bipartite_collection<R: Rng>(
    dims: &[(usize, usize)],
    pi: &[f64],
    rho: &[f64],
    alpha: &DMatrix<f64>,
    delta: &[f64],
    emission: Emission,
    rng: &mut R,
) -> Result<Vec<SimulatedNetwork>> {
    check_shapes(alpha, pi, rho, delta, dims.len())?;

    dims.iter()
        .zip(delta.iter())
        .enumerate()
        .map(|(m, (&(n1, n2), &d))| {
            let rows = sample_labels(n1, pi, rng)?;
            let cols = sample_labels(n2, rho, rng)?;
            let inc = DMatrix::from_fn(n1, n2, |i, j| {
                sample_value(d * alpha[(rows[i], cols[j])], emission, rng)
            });
            Ok(SimulatedNetwork {
                network: Network::bipartite(format!("net{}", m), inc, emission)?,
                row_labels: rows,
                col_labels: Some(cols),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn test_erdos_renyi_density() {
        let mut rng = SmallRng::seed_from_u64(1);
        let net = erdos_renyi("g", 60, 0.3, &mut rng).unwrap();
        assert!(!net.is_directed());
        assert!((net.density() - 0.3).abs() < 0.05);
    }

    #[test]
    fn test_bipartite_collection_shapes() {
        let mut rng = SmallRng::seed_from_u64(2);
        let alpha = DMatrix::from_row_slice(2, 3, &[0.9, 0.1, 0.5, 0.2, 0.8, 0.3]);
        let sims = generate_bipartite_collection(
            &[(10, 7), (12, 5)],
            &[0.5, 0.5],
            &[0.2, 0.3, 0.5],
            &alpha,
            &[1.0, 1.0],
            Emission::Bernoulli,
            &mut rng,
        )
        .unwrap();
        assert_eq!(sims.len(), 2);
        assert_eq!(sims[1].network.nrows(), 12);
        assert_eq!(sims[1].network.ncols(), 5);
        assert!(sims[0].row_labels.iter().all(|&l| l < 2));
        assert!(sims[0].col_labels.as_ref().unwrap().iter().all(|&l| l < 3));
    }

    #[test]
    fn test_poisson_counts_are_valid() {
        let mut rng = SmallRng::seed_from_u64(3);
        let alpha = DMatrix::from_row_slice(2, 2, &[4.0, 0.5, 0.5, 2.0]);
        let sims = generate_unipartite_collection(
            &[20],
            &[0.5, 0.5],
            &alpha,
            &[1.0],
            Emission::Poisson,
            true,
            &mut rng,
        )
        .unwrap();
        let net = &sims[0].network;
        assert_eq!(net.emission(), Emission::Poisson);
        assert!(net.data().iter().all(|&x| x >= 0.0 && x.fract() == 0.0));
        assert!(net.ln_factorial_sum() > 0.0);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let mut rng = SmallRng::seed_from_u64(4);
        let alpha = DMatrix::from_element(2, 2, 0.5);
        let res = generate_unipartite_collection(
            &[5, 5],
            &[1.0],
            &alpha,
            &[1.0, 1.0],
            Emission::Bernoulli,
            false,
            &mut rng,
        );
        assert!(matches!(res, Err(Error::InvalidOption(_))));
        assert!(sample_labels(3, &[0.0, 0.0], &mut rng).is_err());
    }
}
