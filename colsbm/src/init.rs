//! Starting memberships for VEM runs.
//!
//! Per-network clusterings (spectral or Ward) are made comparable across
//! the collection by ordering blocks by mean node degree. Neighbouring
//! grid cells also seed each other: a fitted `Q - 1` model proposes
//! splits of its blocks and a fitted `Q + 1` model proposes merges.

use crate::network::{Axis, Network};
use crate::numeric::{clamp_rows_inplace, one_hot, param_distance};
use crate::vem::{Assignment, FittedModel, InitKind};
use log::warn;
use matrix_util::clustering::{Kmeans, KmeansArgs};
use matrix_util::traits::RowOps;
use matrix_util::utils::compact_labels;
use nalgebra::DMatrix;
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;

/// Spectral clustering of a symmetric non-negative similarity matrix.
///
/// `D^-1/2 S D^-1/2` over the connected nodes, the `k` eigenvectors with
/// the largest |λ|, row-normalized, then k-means. Nodes without any
/// similarity join the cluster with the lowest mean degree.
///
/// Returns a single cluster when `k <= 1`, `k >= n`, fewer than three
/// nodes are connected, or k-means fails within its retry budget.
pub fn spectral_labels(similarity: &DMatrix<f64>, k: usize, kmeans: &KmeansArgs) -> Vec<usize> {
    let n = similarity.nrows();
    if k <= 1 || k >= n {
        return vec![0; n];
    }

    let degree: Vec<f64> = similarity.row_iter().map(|r| r.sum()).collect();
    let connected: Vec<usize> = (0..n).filter(|&i| degree[i] > 0.0).collect();
    let nc = connected.len();
    if nc < 3 {
        return vec![0; n];
    }

    let mut k = k;
    if k >= nc {
        warn!(
            "spectral: {} clusters requested but only {} connected nodes; using {}",
            k,
            nc,
            nc - 1
        );
        k = nc - 1;
    }
    if k <= 1 {
        return vec![0; n];
    }

    let normalized = DMatrix::from_fn(nc, nc, |a, b| {
        let (i, j) = (connected[a], connected[b]);
        similarity[(i, j)] / (degree[i] * degree[j]).sqrt()
    });

    let eig = normalized.symmetric_eigen();
    let mut order: Vec<usize> = (0..nc).collect();
    order.sort_by(|&a, &b| {
        eig.eigenvalues[b]
            .abs()
            .total_cmp(&eig.eigenvalues[a].abs())
    });

    let mut embedding = DMatrix::from_fn(nc, k, |i, j| eig.eigenvectors[(i, order[j])]);
    embedding.normalize_rows_inplace();

    let args = KmeansArgs {
        num_clusters: k,
        ..kmeans.clone()
    };
    let sub_labels = match embedding.kmeans_rows(&args) {
        Ok(labels) => labels,
        Err(e) => {
            warn!("spectral: {}; falling back to a single cluster", e);
            return vec![0; n];
        }
    };

    // isolated nodes go where the degree is lowest
    let mut sum = vec![0.0; k];
    let mut cnt = vec![0.0; k];
    for (&i, &l) in connected.iter().zip(sub_labels.iter()) {
        sum[l] += degree[i];
        cnt[l] += 1.0;
    }
    let sparse_block = (0..k)
        .filter(|&b| cnt[b] > 0.0)
        .min_by(|&a, &b| (sum[a] / cnt[a]).total_cmp(&(sum[b] / cnt[b])))
        .unwrap_or(0);

    let mut labels = vec![sparse_block; n];
    for (&i, &l) in connected.iter().zip(sub_labels.iter()) {
        labels[i] = l;
    }
    labels
}

/// Manhattan distances between rows over co-observed features, rescaled
/// to the full feature count. `None` if any pair shares no observed
/// feature or a distance is not finite.
fn manhattan_distances(features: &DMatrix<f64>, mask: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let (n, f) = features.shape();
    let mut dist = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in (i + 1)..n {
            let mut s = 0.0;
            let mut c = 0.0;
            for k in 0..f {
                if mask[(i, k)] > 0.0 && mask[(j, k)] > 0.0 {
                    s += (features[(i, k)] - features[(j, k)]).abs();
                    c += 1.0;
                }
            }
            if c == 0.0 {
                return None;
            }
            let d = s * f as f64 / c;
            if !d.is_finite() {
                return None;
            }
            dist[(i, j)] = d;
            dist[(j, i)] = d;
        }
    }
    Some(dist)
}

/// Ward agglomeration down to `k` clusters (Lance-Williams updates on
/// squared distances)
fn ward_labels(dist: &DMatrix<f64>, k: usize) -> Vec<usize> {
    let n = dist.nrows();
    let mut d2 = dist.map(|x| x * x);
    let mut size = vec![1.0; n];
    let mut active = vec![true; n];
    let mut owner: Vec<usize> = (0..n).collect();
    let mut num_active = n;

    while num_active > k {
        let mut best: Option<(usize, usize, f64)> = None;
        for i in (0..n).filter(|&i| active[i]) {
            for j in ((i + 1)..n).filter(|&j| active[j]) {
                if best.is_none_or(|(_, _, d)| d2[(i, j)] < d) {
                    best = Some((i, j, d2[(i, j)]));
                }
            }
        }
        let Some((a, b, dab)) = best else {
            break;
        };

        for c in (0..n).filter(|&c| active[c] && c != a && c != b) {
            let (na, nb, nc) = (size[a], size[b], size[c]);
            let v = ((na + nc) * d2[(c, a)] + (nb + nc) * d2[(c, b)] - nc * dab) / (na + nb + nc);
            d2[(a, c)] = v;
            d2[(c, a)] = v;
        }

        size[a] += size[b];
        active[b] = false;
        num_active -= 1;
        for o in owner.iter_mut() {
            if *o == b {
                *o = a;
            }
        }
    }

    compact_labels(&owner).0
}

/// Ward clustering of the rows of `features` with Manhattan distance.
/// Entries with `mask == 0` are ignored. Falls back to a single cluster
/// when a distance cannot be computed.
pub fn hierarchical_labels(features: &DMatrix<f64>, mask: &DMatrix<f64>, k: usize) -> Vec<usize> {
    let n = features.nrows();
    if k <= 1 || k >= n {
        return vec![0; n];
    }
    match manhattan_distances(features, mask) {
        Some(dist) => ward_labels(&dist, k),
        None => {
            warn!("hierarchical: undefined distance between nodes; using a single cluster");
            vec![0; n]
        }
    }
}

/// Relabel so that block 0 has the lowest mean degree. Empty blocks go
/// last.
pub fn align_by_degree(labels: &[usize], degree: &[f64], k: usize) -> Vec<usize> {
    if k == 0 {
        return labels.to_vec();
    }
    let mut sum = vec![0.0; k];
    let mut cnt = vec![0.0; k];
    for (&l, &d) in labels.iter().zip(degree.iter()) {
        let l = l.min(k - 1);
        sum[l] += d;
        cnt[l] += 1.0;
    }
    let mean: Vec<f64> = (0..k)
        .map(|b| {
            if cnt[b] > 0.0 {
                sum[b] / cnt[b]
            } else {
                f64::INFINITY
            }
        })
        .collect();

    let mut order: Vec<usize> = (0..k).collect();
    order.sort_by(|&a, &b| mean[a].total_cmp(&mean[b]));
    let mut rank = vec![0; k];
    for (r, &b) in order.iter().enumerate() {
        rank[b] = r;
    }
    labels.iter().map(|&l| rank[l.min(k - 1)]).collect()
}

fn row_features(net: &Network) -> (DMatrix<f64>, DMatrix<f64>) {
    let (x, m) = (net.data(), net.mask());
    if !net.is_directed() {
        return (x.clone(), m.clone());
    }
    // out- and in-neighbourhoods side by side
    match (
        x.concatenate_horizontal(&x.transpose()),
        m.concatenate_horizontal(&m.transpose()),
    ) {
        (Ok(xf), Ok(mf)) => (xf, mf),
        _ => (x.clone(), m.clone()),
    }
}

fn gram_without_diagonal(a: &DMatrix<f64>) -> DMatrix<f64> {
    let mut g = a * a.transpose();
    g.fill_diagonal(0.0);
    g
}

/// Hard labels of one network on each axis, aligned by degree
pub fn network_labels(
    net: &Network,
    q: (usize, usize),
    kind: InitKind,
    kmeans: &KmeansArgs,
) -> (Vec<usize>, Option<Vec<usize>>) {
    let x = net.data();
    let hierarchical = kind == InitKind::Hierarchical;

    if net.is_bipartite() {
        let xt = x.transpose();
        let (rows, cols) = if hierarchical {
            (
                hierarchical_labels(x, net.mask(), q.0),
                hierarchical_labels(&xt, &net.mask().transpose(), q.1),
            )
        } else {
            (
                spectral_labels(&gram_without_diagonal(x), q.0, kmeans),
                spectral_labels(&gram_without_diagonal(&xt), q.1, kmeans),
            )
        };
        (
            align_by_degree(&rows, &net.row_degree(), q.0),
            Some(align_by_degree(&cols, &net.col_degree(), q.1)),
        )
    } else {
        let rows = if hierarchical {
            let (features, mask) = row_features(net);
            hierarchical_labels(&features, &mask, q.0)
        } else {
            spectral_labels(&(x + x.transpose()), q.0, kmeans)
        };
        (align_by_degree(&rows, &net.row_degree(), q.0), None)
    }
}

/// Everything in one block
pub fn trivial_assignment(networks: &[Arc<Network>]) -> Assignment {
    let rows = networks.iter().map(|n| one_hot(&vec![0; n.nrows()], 1)).collect();
    let cols = networks
        .iter()
        .filter(|n| n.is_bipartite())
        .map(|n| one_hot(&vec![0; n.ncols()], 1))
        .collect();
    Assignment {
        rows,
        cols,
        kind: InitKind::Trivial,
    }
}

fn from_labels(
    labels: Vec<(Vec<usize>, Option<Vec<usize>>)>,
    q: (usize, usize),
    kind: InitKind,
) -> Assignment {
    let mut rows = Vec::with_capacity(labels.len());
    let mut cols = Vec::with_capacity(labels.len());
    for (r, c) in labels {
        rows.push(one_hot(&r, q.0));
        if let Some(c) = c {
            cols.push(one_hot(&c, q.1));
        }
    }
    Assignment { rows, cols, kind }
}

/// Independent spectral or hierarchical clustering of every network.
/// A single-block request returns the trivial assignment.
pub fn collection_assignment(
    networks: &[Arc<Network>],
    q: (usize, usize),
    kind: InitKind,
    kmeans: &KmeansArgs,
) -> Assignment {
    if q == (1, 1) {
        return trivial_assignment(networks);
    }
    let labels = networks
        .iter()
        .map(|net| network_labels(net, q, kind, kmeans))
        .collect();
    from_labels(labels, q, kind)
}

/// Balanced random labels, shuffled
pub fn random_assignment<R: Rng>(
    networks: &[Arc<Network>],
    q: (usize, usize),
    rng: &mut R,
) -> Assignment {
    if q == (1, 1) {
        return trivial_assignment(networks);
    }
    let mut balanced = |n: usize, k: usize| -> Vec<usize> {
        let mut l: Vec<usize> = (0..n).map(|i| i % k).collect();
        l.shuffle(rng);
        l
    };
    let labels = networks
        .iter()
        .map(|net| {
            let rows = balanced(net.nrows(), q.0);
            let cols = net.is_bipartite().then(|| balanced(net.ncols(), q.1));
            (rows, cols)
        })
        .collect();
    from_labels(labels, q, InitKind::Random)
}

fn axis_taus(model: &FittedModel, axis: Axis) -> &[DMatrix<f64>] {
    match axis {
        Axis::Row => &model.tau_row,
        Axis::Col => &model.tau_col,
    }
}

fn replace_axis(
    model: &FittedModel,
    axis: Axis,
    taus: Vec<DMatrix<f64>>,
    kind: InitKind,
) -> Assignment {
    let (rows, cols) = match axis {
        Axis::Row => (taus, model.tau_col.clone()),
        Axis::Col => (model.tau_row.clone(), taus),
    };
    Assignment { rows, cols, kind }
}

/// Move the nodes of block `b` above its median degree into a new last
/// block; alternate nodes if every degree is tied.
fn split_block(tau: &DMatrix<f64>, labels: &[usize], degree: &[f64], b: usize) -> DMatrix<f64> {
    let q = tau.ncols();
    let mut out = tau.clone().insert_column(q, 0.0);

    let members: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] == b).collect();
    if !members.is_empty() {
        let mut degs: Vec<f64> = members.iter().map(|&i| degree[i]).collect();
        degs.sort_by(f64::total_cmp);
        let median = degs[(degs.len() - 1) / 2];

        let mut moved: Vec<usize> = members
            .iter()
            .cloned()
            .filter(|&i| degree[i] > median)
            .collect();
        if moved.is_empty() || moved.len() == members.len() {
            moved = members.iter().cloned().skip(1).step_by(2).collect();
        }

        for i in moved {
            out[(i, q)] = out[(i, b)];
            out[(i, b)] = 0.0;
        }
    }

    clamp_rows_inplace(&mut out);
    out
}

/// Seeds with one more block on `axis`: the largest blocks of `model`,
/// at most `max_seeds` of them, each split in two.
pub fn split_assignments(
    model: &FittedModel,
    networks: &[Arc<Network>],
    axis: Axis,
    max_seeds: usize,
) -> Vec<Assignment> {
    let taus = axis_taus(model, axis);
    let Some(q) = taus.first().map(|t| t.ncols()) else {
        return vec![];
    };

    let labels: Vec<Vec<usize>> = taus.iter().map(|t| t.row_argmax()).collect();
    let mut sizes = vec![0usize; q];
    for &b in labels.iter().flatten() {
        sizes[b] += 1;
    }

    let mut blocks: Vec<usize> = (0..q).filter(|&b| sizes[b] >= 2).collect();
    blocks.sort_by(|&a, &b| sizes[b].cmp(&sizes[a]));
    blocks.truncate(max_seeds);

    blocks
        .into_iter()
        .map(|b| {
            let split = taus
                .iter()
                .zip(labels.iter())
                .zip(networks.iter())
                .map(|((tau, lab), net)| split_block(tau, lab, &net.degree(axis), b))
                .collect();
            replace_axis(model, axis, split, InitKind::Split)
        })
        .collect()
}

fn merge_blocks(tau: &DMatrix<f64>, a: usize, b: usize) -> DMatrix<f64> {
    let col_b = tau.column(b).clone_owned();
    let mut out = tau.clone();
    {
        let mut col_a = out.column_mut(a);
        col_a += &col_b;
    }
    let mut out = out.remove_column(b);
    clamp_rows_inplace(&mut out);
    out
}

/// Seeds with one block less on `axis`: the `max_seeds` pairs of blocks
/// whose connectivity profiles are closest, each merged.
pub fn merge_assignments(model: &FittedModel, axis: Axis, max_seeds: usize) -> Vec<Assignment> {
    let taus = axis_taus(model, axis);
    let q = taus.first().map(|t| t.ncols()).unwrap_or(0);
    if q < 2 {
        return vec![];
    }

    let alpha = &model.params.alpha;
    let profile = |b: usize| -> Vec<f64> {
        match axis {
            Axis::Row => alpha.row(b).iter().cloned().collect(),
            Axis::Col => alpha.column(b).iter().cloned().collect(),
        }
    };

    let mut pairs: Vec<(usize, usize, f64)> = Vec::with_capacity(q * (q - 1) / 2);
    for a in 0..q {
        for b in (a + 1)..q {
            pairs.push((a, b, param_distance(&profile(a), &profile(b))));
        }
    }
    pairs.sort_by(|x, y| x.2.total_cmp(&y.2));
    pairs.truncate(max_seeds);

    pairs
        .into_iter()
        .map(|(a, b, _)| {
            let merged = taus.iter().map(|t| merge_blocks(t, a, b)).collect();
            replace_axis(model, axis, merged, InitKind::Merge)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Emission;
    use crate::variant::ModelVariant;
    use crate::vem::{VemFitter, VemOptions};
    use approx::assert_abs_diff_eq;

    /// cliques of the given sizes joined by a single edge between
    /// consecutive cliques
    fn cliques(sizes: &[usize], bridge: bool) -> DMatrix<f64> {
        let n: usize = sizes.iter().sum();
        let mut block = Vec::with_capacity(n);
        for (b, &s) in sizes.iter().enumerate() {
            block.extend(std::iter::repeat_n(b, s));
        }
        let mut adj = DMatrix::from_fn(n, n, |i, j| {
            if i != j && block[i] == block[j] {
                1.0
            } else {
                0.0
            }
        });
        if bridge {
            let mut start = 0;
            for w in sizes.windows(2) {
                let (i, j) = (start + w[0] - 1, start + w[0]);
                adj[(i, j)] = 1.0;
                adj[(j, i)] = 1.0;
                start += w[0];
            }
        }
        adj
    }

    fn same_partition(a: &[usize], b: &[usize]) -> bool {
        a.len() == b.len()
            && (0..a.len()).all(|i| (0..a.len()).all(|j| (a[i] == a[j]) == (b[i] == b[j])))
    }

    #[test]
    fn test_spectral_two_cliques() {
        let adj = cliques(&[5, 7], true);
        let labels = spectral_labels(&adj, 2, &KmeansArgs::default());
        let truth: Vec<usize> = (0..12).map(|i| usize::from(i >= 5)).collect();
        assert!(same_partition(&labels, &truth), "{:?}", labels);
    }

    #[test]
    fn test_spectral_degenerate_requests() {
        let adj = cliques(&[3, 3], false);
        let args = KmeansArgs::default();
        assert_eq!(spectral_labels(&adj, 1, &args), vec![0; 6]);
        assert_eq!(spectral_labels(&adj, 6, &args), vec![0; 6]);

        // only two connected nodes
        let mut pair = DMatrix::zeros(5, 5);
        pair[(0, 1)] = 1.0;
        pair[(1, 0)] = 1.0;
        assert_eq!(spectral_labels(&pair, 2, &args), vec![0; 5]);
    }

    #[test]
    fn test_isolated_node_joins_sparsest_block() {
        let mut adj = cliques(&[4, 6], false);
        adj = adj.insert_row(10, 0.0).insert_column(10, 0.0);
        let net = Network::unipartite("iso", adj, Emission::Bernoulli).unwrap();
        let (labels, cols) =
            network_labels(&net, (2, 2), InitKind::Spectral, &KmeansArgs::default());
        assert!(cols.is_none());
        // after alignment the 4-clique (degree 3) is block 0
        assert!(labels[..4].iter().all(|&l| l == 0));
        assert!(labels[4..10].iter().all(|&l| l == 1));
        assert_eq!(labels[10], 0);
    }

    #[test]
    fn test_hierarchical_two_cliques() {
        let net = Network::unipartite("h", cliques(&[4, 5], true), Emission::Bernoulli).unwrap();
        let (labels, _) =
            network_labels(&net, (2, 2), InitKind::Hierarchical, &KmeansArgs::default());
        let truth: Vec<usize> = (0..9).map(|i| usize::from(i >= 4)).collect();
        assert_eq!(labels, truth);
    }

    #[test]
    fn test_hierarchical_undefined_distance_falls_back() {
        let features = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let mask = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        assert_eq!(hierarchical_labels(&features, &mask, 2), vec![0, 0, 0]);
    }

    #[test]
    fn test_align_by_degree() {
        let aligned = align_by_degree(&[0, 0, 1, 1, 2], &[5.0, 5.0, 1.0, 1.0, 3.0], 4);
        assert_eq!(aligned, vec![2, 2, 0, 0, 1]);
    }

    #[test]
    fn test_single_block_is_trivial() {
        let net = Arc::new(
            Network::bipartite("b", DMatrix::from_element(3, 4, 1.0), Emission::Bernoulli).unwrap(),
        );
        let a = collection_assignment(&[net], (1, 1), InitKind::Spectral, &KmeansArgs::default());
        assert_eq!(a.kind, InitKind::Trivial);
        assert_eq!(a.shape(), (1, 1));
        assert_eq!(a.cols[0].nrows(), 4);
    }

    #[test]
    fn test_random_assignment_is_balanced() {
        use rand::rngs::SmallRng;
        use rand::SeedableRng;
        let net = Arc::new(
            Network::unipartite("r", cliques(&[3, 3, 3], false), Emission::Bernoulli).unwrap(),
        );
        let mut rng = SmallRng::seed_from_u64(7);
        let a = random_assignment(&[net], (3, 3), &mut rng);
        let labels = a.rows[0].row_argmax();
        for b in 0..3 {
            assert_eq!(labels.iter().filter(|&&l| l == b).count(), 3);
        }
    }

    fn fitted(q: usize) -> (Vec<Arc<Network>>, FittedModel) {
        let nets = vec![Arc::new(
            Network::unipartite("s", cliques(&[4, 4, 4], true), Emission::Bernoulli).unwrap(),
        )];
        let opts = VemOptions::default();
        let fitter = VemFitter::new(&nets, ModelVariant::IID, &opts);
        let init = collection_assignment(&nets, (q, q), InitKind::Spectral, &KmeansArgs::default());
        let model = fitter.fit(init);
        (nets, model)
    }

    #[test]
    fn test_split_seeds_add_one_block() {
        let (nets, model) = fitted(2);
        let seeds = split_assignments(&model, &nets, Axis::Row, 3);
        assert!(!seeds.is_empty() && seeds.len() <= 2);
        for s in &seeds {
            assert_eq!(s.kind, InitKind::Split);
            assert_eq!(s.shape(), (3, 3));
            for row in s.rows[0].row_iter() {
                assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-9);
            }
            let labels = s.rows[0].row_argmax();
            assert!(labels.contains(&2));
        }
        // no column axis on a unipartite model
        assert!(split_assignments(&model, &nets, Axis::Col, 3).is_empty());
    }

    #[test]
    fn test_merge_seeds_drop_one_block() {
        let (_, model) = fitted(3);
        let seeds = merge_assignments(&model, Axis::Row, 2);
        assert_eq!(seeds.len(), 2);
        for s in &seeds {
            assert_eq!(s.kind, InitKind::Merge);
            assert_eq!(s.shape(), (2, 2));
            for row in s.rows[0].row_iter() {
                assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-9);
            }
        }
    }
}
