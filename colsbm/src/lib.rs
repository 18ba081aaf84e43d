//! Stochastic block models fitted jointly over a collection of networks.
//!
//! All networks of a collection share one block connectivity (optionally
//! scaled per network) while keeping their own node memberships. For a
//! grid of block counts `(Q1, Q2)` the model is fitted by variational EM
//! from several starting points; the grid is explored with a moving
//! window and the cell with the largest BICL is selected. A partitioner
//! groups networks whose structures differ into separate collections.
//!
//! # Model
//!
//! Bernoulli or Poisson edges, `x_ij ~ F(δ_m α[z_i, z_j])`, with block
//! labels drawn from mixture proportions shared across the collection or
//! free per network (see `ModelVariant`).

/// Error type
pub mod error;

/// Epsilon-guarded logs, softmax, and one-hot helpers
pub mod numeric;

/// Validated unipartite and bipartite networks
pub mod network;

/// Shared/free parameter flags and parameter counts
pub mod variant;

/// Expected edge mass and dyad counts per block pair
pub mod sufficient_stats;

/// Variational EM at a fixed number of blocks
pub mod vem;

/// Spectral, hierarchical, random, split, and merge starting points
pub mod init;

/// Order-preserving parallel map
pub mod backend;

/// Grid of fitted models for one set of networks
pub mod collection;

/// Moving-window exploration of the grid
pub mod explore;

/// Grouping networks into homogeneous sub-collections
pub mod partition;

/// Sampling collections from block models
pub mod simulate;


pub use backend::{Backend, Sequential, TaskMap};
pub use collection::{
    BiclSource, CollectionEstimator, EstimateOptions, ModelCollection, NodeGroups,
    SingleNetworkEstimator,
};
pub use error::{Error, Result};
pub use network::{Emission, Network};
pub use partition::{partition_networks, Partition, PartitionOptions};
pub use variant::ModelVariant;
pub use vem::{FittedModel, VemOptions};
