//! Local search over groupings of the networks of a collection.
//!
//! Rounds alternate:
//! - **split**: every group with at least `min_split_size` networks is
//!   cut in two by 2-means on the networks' block connectivity under
//!   the group's best fit; each split that strictly raises the total
//!   BICL is kept
//! - **merge**: the union of every pair of groups is fitted and the pair
//!   with the largest gain is merged if the total BICL does not drop
//!   (fewer groups win ties)
//!
//! until neither round changes the grouping or `max_iter` rounds ran.
//! Every grouping is fitted at most once; fits of one round run as a
//! single wave on the backend.

use crate::backend::{Sequential, TaskMap};
use crate::collection::{
    fitted_node_groups, BiclSource, EstimateOptions, ModelCollection, NodeGroup, NodeGroups,
};
use crate::error::{Error, Result};
use crate::network::Network;
use crate::variant::ModelVariant;
use log::{debug, info};
use matrix_util::clustering::{kmeans_points, KmeansArgs};
use matrix_util::utils::partition_by_membership;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Options of `partition_networks`
#[derive(Debug, Clone)]
pub struct PartitionOptions {
    /// Maximum number of split+merge rounds. Default: 10
    pub max_iter: usize,
    /// Smallest group considered for a split. Default: 4
    pub min_split_size: usize,
    /// Options of every collection fit
    pub estimate: EstimateOptions,
}

impl Default for PartitionOptions {
    fn default() -> Self {
        PartitionOptions {
            max_iter: 10,
            min_split_size: 4,
            estimate: EstimateOptions::default(),
        }
    }
}

/// Networks fitted together
#[derive(Debug, Clone)]
pub struct Group {
    /// Indices into the partitioned networks, ascending
    pub members: Vec<usize>,
    pub collection: ModelCollection,
}

/// Disjoint groups covering the networks
#[derive(Debug, Clone)]
pub struct Partition {
    groups: Vec<Group>,
    num_networks: usize,
}

impl Partition {
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    /// Group index of every network
    pub fn memberships(&self) -> Vec<usize> {
        let mut out = vec![0; self.num_networks];
        for (g, group) in self.groups.iter().enumerate() {
            for &m in group.members.iter() {
                out[m] = g;
            }
        }
        out
    }

    pub fn summary(&self) -> String {
        self.to_string()
    }

    pub fn print_metrics(&self) {
        println!("{}", self);
    }
}

impl BiclSource for Partition {
    fn bicl(&self) -> Result<f64> {
        if self.groups.is_empty() {
            return Err(Error::Unsupported {
                operation: "compute BICL",
                found: "an empty partition".into(),
                expected: "a partition with at least one fitted group",
            });
        }
        self.groups.iter().map(|g| g.collection.bicl()).sum()
    }
}

impl NodeGroups for Partition {
    fn node_groups(&self) -> Result<Vec<NodeGroup>> {
        let mut out = vec![];
        for (g, group) in self.groups.iter().enumerate() {
            let best = group.collection.best_fit().ok_or(Error::Unsupported {
                operation: "extract node groups",
                found: format!("group {} with no fitted cell", g),
                expected: "a partition of estimated collections",
            })?;
            out.extend(fitted_node_groups(best, group.collection.networks(), g));
        }
        Ok(out)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} group(s) over {} network(s)", self.groups.len(), self.num_networks)?;
        for (g, group) in self.groups.iter().enumerate() {
            let ids: Vec<&str> = group.collection.networks().iter().map(|n| n.id()).collect();
            match group.collection.best_fit() {
                Some(m) => writeln!(
                    f,
                    "group {}: Q = {:?}, BICL = {:.4}, networks [{}]",
                    g,
                    m.q,
                    m.bicl(),
                    ids.join(", ")
                )?,
                None => writeln!(f, "group {}: not fitted, networks [{}]", g, ids.join(", "))?,
            }
        }
        if let Ok(total) = self.bicl() {
            writeln!(f, "total BICL = {:.4}", total)?;
        }
        Ok(())
    }
}

/// Fits of every grouping tried so far, keyed by sorted member indices
struct FitCache<'a> {
    networks: &'a [Arc<Network>],
    variant: ModelVariant,
    options: &'a EstimateOptions,
    fits: BTreeMap<Vec<usize>, ModelCollection>,
}

impl<'a> FitCache<'a> {
    fn subset(&self, members: &[usize]) -> Vec<Arc<Network>> {
        members.iter().map(|&m| self.networks[m].clone()).collect()
    }

    /// Fit every grouping not seen yet, in one wave. A lone fit gets the
    /// whole backend; several fits share it and run sequentially inside.
    fn ensure<B: TaskMap>(&mut self, keys: &[Vec<usize>], backend: &B) -> Result<()> {
        let mut missing: Vec<Vec<usize>> = keys
            .iter()
            .filter(|k| !self.fits.contains_key(*k))
            .cloned()
            .collect();
        missing.sort();
        missing.dedup();

        if missing.is_empty() {
            return Ok(());
        }
        debug!("fitting {} new grouping(s)", missing.len());

        let (variant, options) = (self.variant, self.options);
        let fitted: Vec<Result<ModelCollection>> = if missing.len() == 1 {
            vec![ModelCollection::estimate(
                self.subset(&missing[0]),
                variant,
                options,
                backend,
            )]
        } else {
            let tasks: Vec<Vec<Arc<Network>>> = missing.iter().map(|k| self.subset(k)).collect();
            backend.map(tasks, |nets| {
                ModelCollection::estimate(nets, variant, options, &Sequential)
            })
        };

        for (key, fit) in missing.into_iter().zip(fitted) {
            self.fits.insert(key, fit?);
        }
        Ok(())
    }

    fn bicl(&self, key: &[usize]) -> Result<f64> {
        self.fits
            .get(key)
            .ok_or_else(|| Error::InvalidOption(format!("grouping {:?} was never fitted", key)))?
            .bicl()
    }

    fn get(&self, key: &[usize]) -> Option<&ModelCollection> {
        self.fits.get(key)
    }
}

fn validate_partition(groups: &[Vec<usize>], num_networks: usize) -> Result<Vec<Vec<usize>>> {
    let mut seen = vec![false; num_networks];
    let mut out = Vec::with_capacity(groups.len());
    for g in groups {
        if g.is_empty() {
            return Err(Error::InvalidOption("empty group in initial partition".into()));
        }
        let mut g = g.clone();
        g.sort_unstable();
        for &m in g.iter() {
            if m >= num_networks {
                return Err(Error::InvalidOption(format!(
                    "network index {} out of range ({} networks)",
                    m, num_networks
                )));
            }
            if seen[m] {
                return Err(Error::InvalidOption(format!(
                    "network {} appears in more than one group",
                    m
                )));
            }
            seen[m] = true;
        }
        out.push(g);
    }
    if let Some(m) = seen.iter().position(|&s| !s) {
        return Err(Error::InvalidOption(format!(
            "network {} is not in any group",
            m
        )));
    }
    Ok(out)
}

/// Two-way split of a fitted group by 2-means on each network's block
/// connectivity `edges / Σ pairs` under the group's best fit. The
/// profile is not divided by `δ_m`, so networks that differ only in
/// density stay separable under a free-density variant.
fn propose_split(
    members: &[usize],
    fit: &ModelCollection,
    kmeans: &KmeansArgs,
) -> Option<(Vec<usize>, Vec<usize>)> {
    let best = fit.best_fit()?;
    let profiles: Vec<Vec<f64>> = fit
        .networks()
        .iter()
        .enumerate()
        .map(|(l, net)| {
            best.block_stats(l, net)
                .connectivity_profile()
                .iter()
                .cloned()
                .collect()
        })
        .collect();

    let args = KmeansArgs {
        num_clusters: 2,
        ..kmeans.clone()
    };
    let labels = kmeans_points(&profiles, &args).ok()?;

    let mut sides = partition_by_membership(&labels)
        .into_values()
        .map(|idx| idx.into_iter().map(|l| members[l]).collect::<Vec<usize>>());
    let a = sides.next()?;
    let b = sides.next()?;
    Some((a, b))
}

fn union(a: &[usize], b: &[usize]) -> Vec<usize> {
    let mut u: Vec<usize> = a.iter().chain(b.iter()).cloned().collect();
    u.sort_unstable();
    u
}

/// Partition `networks` into groups that share a block structure.
///
/// * `initial` - starting grouping; all networks in one group if `None`
pub fn partition_networks<B: TaskMap>(
    networks: Vec<Arc<Network>>,
    variant: ModelVariant,
    options: &PartitionOptions,
    initial: Option<Vec<Vec<usize>>>,
    backend: &B,
) -> Result<Partition> {
    options.estimate.validate()?;
    let num_networks = networks.len();
    if num_networks == 0 {
        return Err(Error::InvalidOption("nothing to partition".into()));
    }

    let mut groups = match initial {
        Some(g) => validate_partition(&g, num_networks)?,
        None => vec![(0..num_networks).collect()],
    };

    let mut cache = FitCache {
        networks: &networks,
        variant,
        options: &options.estimate,
        fits: BTreeMap::new(),
    };
    cache.ensure(&groups, backend)?;

    for iter in 0..options.max_iter {
        let mut changed = false;

        // split round
        let proposals: Vec<(usize, Vec<usize>, Vec<usize>)> = groups
            .iter()
            .enumerate()
            .filter(|(_, g)| g.len() >= options.min_split_size)
            .filter_map(|(i, g)| {
                let fit = cache.get(g)?;
                propose_split(g, fit, &options.estimate.kmeans).map(|(a, b)| (i, a, b))
            })
            .collect();

        let children: Vec<Vec<usize>> = proposals
            .iter()
            .flat_map(|(_, a, b)| [a.clone(), b.clone()])
            .collect();
        cache.ensure(&children, backend)?;

        let mut accepted: Vec<(usize, Vec<usize>, Vec<usize>)> = vec![];
        for (i, a, b) in proposals {
            let gain = cache.bicl(&a)? + cache.bicl(&b)? - cache.bicl(&groups[i])?;
            debug!("split {:?} -> {:?} + {:?}: gain {:.4}", groups[i], a, b, gain);
            if gain > 0.0 {
                accepted.push((i, a, b));
            }
        }
        if !accepted.is_empty() {
            changed = true;
            let split_idx: Vec<usize> = accepted.iter().map(|(i, _, _)| *i).collect();
            let mut next: Vec<Vec<usize>> = groups
                .iter()
                .enumerate()
                .filter(|(i, _)| !split_idx.contains(i))
                .map(|(_, g)| g.clone())
                .collect();
            for (_, a, b) in accepted {
                info!("iteration {}: split into {:?} and {:?}", iter, a, b);
                next.push(a);
                next.push(b);
            }
            next.sort();
            groups = next;
        }

        // merge round
        let mut pairs: Vec<(usize, usize, Vec<usize>)> = vec![];
        for i in 0..groups.len() {
            for j in (i + 1)..groups.len() {
                pairs.push((i, j, union(&groups[i], &groups[j])));
            }
        }
        let unions: Vec<Vec<usize>> = pairs.iter().map(|(_, _, u)| u.clone()).collect();
        cache.ensure(&unions, backend)?;

        let mut best_merge: Option<(usize, usize, f64)> = None;
        for (i, j, u) in pairs.iter() {
            let gain = cache.bicl(u)? - cache.bicl(&groups[*i])? - cache.bicl(&groups[*j])?;
            debug!("merge {:?} + {:?}: gain {:.4}", groups[*i], groups[*j], gain);
            if gain >= 0.0 && best_merge.is_none_or(|(_, _, g)| gain > g) {
                best_merge = Some((*i, *j, gain));
            }
        }
        if let Some((i, j, _)) = best_merge {
            changed = true;
            let merged = union(&groups[i], &groups[j]);
            info!("iteration {}: merged {:?} and {:?}", iter, groups[i], groups[j]);
            let mut next: Vec<Vec<usize>> = groups
                .iter()
                .enumerate()
                .filter(|&(k, _)| k != i && k != j)
                .map(|(_, g)| g.clone())
                .collect();
            next.push(merged);
            next.sort();
            groups = next;
        }

        if !changed {
            debug!("partition stable after {} iteration(s)", iter + 1);
            break;
        }
    }

    let mut fits = cache.fits;
    let groups = groups
        .into_iter()
        .map(|members| {
            let collection = fits.remove(&members).ok_or_else(|| {
                Error::InvalidOption(format!("grouping {:?} was never fitted", members))
            })?;
            Ok(Group {
                members,
                collection,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let partition = Partition {
        groups,
        num_networks,
    };
    info!(
        "{} group(s), total BICL {:.4}",
        partition.num_groups(),
        partition.bicl()?
    );
    Ok(partition)
}
