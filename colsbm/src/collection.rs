//! Grid of fitted models for one fixed set of networks.
//!
//! Cells are keyed by `(Q1, Q2)` (`(Q, Q)` for unipartite collections)
//! in a sparse ordered map. Each cell keeps the best run by BICL and a
//! bounded list of discarded runs. The best cell of the grid is cached
//! and recomputed by `store_criteria_and_best_fit`.

use crate::backend::{Sequential, TaskMap};
use crate::error::{Error, Result};
use crate::explore::explore;
use crate::init::{
    collection_assignment, merge_assignments, random_assignment, split_assignments,
    trivial_assignment,
};
use crate::network::{Axis, Emission, Network};
use crate::variant::ModelVariant;
use crate::vem::{Assignment, FittedModel, InitKind, VemFitter, VemOptions};
use log::{debug, info};
use matrix_util::clustering::KmeansArgs;
use nalgebra::DMatrix;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Grid coordinate `(Q1, Q2)`
pub type Coord = (usize, usize);

/// Options of `ModelCollection::estimate`
#[derive(Debug, Clone)]
pub struct EstimateOptions {
    /// Smallest block counts explored. Default: (1, 1)
    pub q_min: Coord,
    /// Largest block counts explored. Default: (8, 8)
    pub q_max: Coord,
    /// Multi-starts per new cell: spectral, hierarchical, and
    /// `nb_run - 1` random starts. Default: 1
    pub nb_run: usize,
    /// Half-width of the moving window. Default: 1
    pub depth: usize,
    /// Maximum number of exploration passes. Default: 10
    pub max_pass: usize,
    /// Stop after this many passes without a better best cell. Default: 2
    pub max_steps_without_improvement: usize,
    /// Discarded runs kept per cell. Default: 5
    pub max_discarded: usize,
    /// Split/merge seeds drawn from one neighbour. Default: 3
    pub max_neighbor_seeds: usize,
    /// Seed of the random starts. Default: 42
    pub seed: u64,
    /// First window centre; `q_min` when unset
    pub start: Option<Coord>,
    pub kmeans: KmeansArgs,
    pub vem: VemOptions,
}

impl Default for EstimateOptions {
    fn default() -> Self {
        EstimateOptions {
            q_min: (1, 1),
            q_max: (8, 8),
            nb_run: 1,
            depth: 1,
            max_pass: 10,
            max_steps_without_improvement: 2,
            max_discarded: 5,
            max_neighbor_seeds: 3,
            seed: 42,
            start: None,
            kmeans: KmeansArgs::default(),
            vem: VemOptions::default(),
        }
    }
}

impl EstimateOptions {
    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(Error::InvalidOption(msg));

        if self.nb_run < 1 {
            return bad("nb_run must be at least 1".into());
        }
        if self.q_min.0 < 1 || self.q_min.1 < 1 {
            return bad(format!("q_min {:?} must be at least (1, 1)", self.q_min));
        }
        if self.q_min.0 > self.q_max.0 || self.q_min.1 > self.q_max.1 {
            return bad(format!(
                "q_min {:?} exceeds q_max {:?}",
                self.q_min, self.q_max
            ));
        }
        if let Some(s) = self.start {
            if s.0 < self.q_min.0 || s.1 < self.q_min.1 || s.0 > self.q_max.0 || s.1 > self.q_max.1
            {
                return bad(format!(
                    "start {:?} outside [{:?}, {:?}]",
                    s, self.q_min, self.q_max
                ));
            }
        }
        if self.depth < 1 {
            return bad("depth must be at least 1".into());
        }
        if self.max_pass < 1 {
            return bad("max_pass must be at least 1".into());
        }
        if self.vem.max_steps < 1 {
            return bad("VEM max_steps must be at least 1".into());
        }
        if !(self.vem.tolerance > 0.0) {
            return bad(format!("tolerance {} must be positive", self.vem.tolerance));
        }
        if !(self.vem.penalty_factor >= 0.0) {
            return bad(format!(
                "penalty factor {} must be non-negative",
                self.vem.penalty_factor
            ));
        }
        if self.kmeans.max_retries < 1 {
            return bad("k-means needs at least one attempt".into());
        }
        Ok(())
    }
}

/// Lifecycle of a grid cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CellStatus {
    Unexplored,
    /// Runs scheduled in the current wave
    Fitting,
    Fitted,
    /// A later wave replaced the first retained run
    Superseded,
}

/// Runs retained for one coordinate
#[derive(Debug, Clone)]
pub struct Cell {
    pub best: Option<FittedModel>,
    pub discarded: Vec<FittedModel>,
    /// Bumped every time `best` changes
    pub generation: usize,
    pub status: CellStatus,
}

impl Cell {
    fn new() -> Self {
        Cell {
            best: None,
            discarded: vec![],
            generation: 0,
            status: CellStatus::Unexplored,
        }
    }
}

/// Criteria of one fitted cell
#[derive(Debug, Clone, Serialize)]
pub struct CellCriteria {
    pub q1: usize,
    pub q2: usize,
    pub loglik: f64,
    pub entropy: f64,
    pub vbound: f64,
    pub icl: f64,
    pub penalty: f64,
    pub bicl: f64,
    pub converged: bool,
    pub init: InitKind,
    pub status: CellStatus,
}

/// Hard labels of one network under the best fit
#[derive(Debug, Clone, Serialize)]
pub struct NetworkMembership {
    pub network: String,
    pub rows: Vec<usize>,
    pub cols: Option<Vec<usize>>,
}

/// One node of one network and its block
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeGroup {
    /// Group of networks the node's network belongs to (0 outside a
    /// partition)
    pub group: usize,
    pub network: String,
    pub axis: Axis,
    pub node: usize,
    pub block: usize,
    /// Membership probability of `block`
    pub probability: f64,
}

/// Objects carrying an overall BICL
pub trait BiclSource {
    fn bicl(&self) -> Result<f64>;
}

/// Objects that can list every node with its block
pub trait NodeGroups {
    fn node_groups(&self) -> Result<Vec<NodeGroup>>;
}

impl BiclSource for FittedModel {
    fn bicl(&self) -> Result<f64> {
        Ok(self.criteria.bicl)
    }
}

/// Node table of one fitted model
pub fn fitted_node_groups(
    model: &FittedModel,
    networks: &[Arc<Network>],
    group: usize,
) -> Vec<NodeGroup> {
    let mut out = vec![];
    for (m, net) in networks.iter().enumerate() {
        let mut push_axis = |axis: Axis, tau: &DMatrix<f64>| {
            for (node, row) in tau.row_iter().enumerate() {
                let (block, probability) = row
                    .iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |acc, (k, &p)| {
                        if p > acc.1 {
                            (k, p)
                        } else {
                            acc
                        }
                    });
                out.push(NodeGroup {
                    group,
                    network: net.id().to_string(),
                    axis,
                    node,
                    block,
                    probability,
                });
            }
        };
        push_axis(Axis::Row, &model.tau_row[m]);
        if model.is_bipartite() {
            push_axis(Axis::Col, &model.tau_col[m]);
        }
    }
    out
}

/// Outcome of comparing the joint fit against independent fits
#[derive(Debug, Clone, Serialize)]
pub struct JointVerdict {
    pub joint_bicl: f64,
    /// Sum of the best BICL of every network fitted on its own
    pub separated_bicl: f64,
    pub joint_preferred: bool,
}

impl JointVerdict {
    pub fn message(&self) -> &'static str {
        if self.joint_preferred {
            "Joint modelisation preferred"
        } else {
            "Separated modelisation preferred"
        }
    }
}

/// Fits a single network on its own
pub trait SingleNetworkEstimator: Sync {
    /// Best BICL reachable for `network`
    fn estimate(
        &self,
        network: &Arc<Network>,
        variant: ModelVariant,
        options: &EstimateOptions,
    ) -> Result<f64>;
}

/// Fits a one-network collection with the same machinery
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectionEstimator;

impl SingleNetworkEstimator for CollectionEstimator {
    fn estimate(
        &self,
        network: &Arc<Network>,
        variant: ModelVariant,
        options: &EstimateOptions,
    ) -> Result<f64> {
        let single =
            ModelCollection::estimate(vec![network.clone()], variant, options, &Sequential)?;
        single.bicl()
    }
}

/// Fitted grid for one set of networks under one variant
#[derive(Debug, Clone)]
pub struct ModelCollection {
    networks: Vec<Arc<Network>>,
    variant: ModelVariant,
    options: EstimateOptions,
    cells: BTreeMap<Coord, Cell>,
    best: Option<Coord>,
    /// `(neighbour, target) -> generation` of the neighbour's best fit
    /// when it last seeded `target`
    seeded_from: BTreeMap<(Coord, Coord), usize>,
    verdict: Option<JointVerdict>,
}

impl ModelCollection {
    /// Empty grid over `networks`. Every network must share the emission
    /// and be of the same kind (all unipartite or all bipartite).
    pub fn new(
        networks: Vec<Arc<Network>>,
        variant: ModelVariant,
        options: EstimateOptions,
    ) -> Result<Self> {
        options.validate()?;

        let Some(first) = networks.first() else {
            return Err(Error::InvalidOption(
                "a collection needs at least one network".into(),
            ));
        };
        let (emission, bipartite) = (first.emission(), first.is_bipartite());

        for net in networks.iter() {
            if net.emission() != emission {
                return Err(Error::InvalidNetwork {
                    net_id: net.id().to_string(),
                    msg: format!(
                        "emission {} differs from the collection's {}",
                        net.emission(),
                        emission
                    ),
                });
            }
            if net.is_bipartite() != bipartite {
                return Err(Error::InvalidNetwork {
                    net_id: net.id().to_string(),
                    msg: "cannot mix unipartite and bipartite networks".into(),
                });
            }
        }

        if !bipartite && variant.free_mixture_col {
            return Err(Error::InvalidOption(format!(
                "variant `{}` needs bipartite networks",
                variant
            )));
        }

        Ok(ModelCollection {
            networks,
            variant,
            options,
            cells: BTreeMap::new(),
            best: None,
            seeded_from: BTreeMap::new(),
            verdict: None,
        })
    }

    /// Build the grid and explore it with a moving window
    pub fn estimate<B: TaskMap>(
        networks: Vec<Arc<Network>>,
        variant: ModelVariant,
        options: &EstimateOptions,
        backend: &B,
    ) -> Result<Self> {
        let collection = Self::new(networks, variant, options.clone())?;
        info!(
            "estimating {} {} network(s), variant {}, Q in [{:?}, {:?}]",
            collection.num_networks(),
            if collection.is_bipartite() { "bipartite" } else { "unipartite" },
            variant,
            collection.q_min(),
            collection.q_max(),
        );
        let start = collection.options.start.unwrap_or(collection.q_min());
        Ok(explore(
            collection,
            start,
            options.depth,
            options.max_pass,
            options.max_steps_without_improvement,
            backend,
        ))
    }

    /// A copy explored further under `options` (wider bounds, more
    /// passes), starting from the current best cell. `self` is left as is.
    pub fn adjust<B: TaskMap>(&self, options: &EstimateOptions, backend: &B) -> Result<Self> {
        options.validate()?;
        let mut adjusted = self.clone();
        adjusted.options = options.clone();
        let start = options
            .start
            .or(self.best)
            .unwrap_or(adjusted.q_min());
        let start = adjusted.clamp(start);
        Ok(explore(
            adjusted,
            start,
            options.depth,
            options.max_pass,
            options.max_steps_without_improvement,
            backend,
        ))
    }

    pub fn networks(&self) -> &[Arc<Network>] {
        &self.networks
    }

    pub fn num_networks(&self) -> usize {
        self.networks.len()
    }

    pub fn variant(&self) -> ModelVariant {
        self.variant
    }

    pub fn options(&self) -> &EstimateOptions {
        &self.options
    }

    pub fn is_bipartite(&self) -> bool {
        self.networks[0].is_bipartite()
    }

    pub fn emission(&self) -> Emission {
        self.networks[0].emission()
    }

    fn fold(&self, q: Coord) -> Coord {
        if self.is_bipartite() {
            q
        } else {
            (q.0, q.0)
        }
    }

    pub fn q_min(&self) -> Coord {
        self.fold(self.options.q_min)
    }

    pub fn q_max(&self) -> Coord {
        self.fold(self.options.q_max)
    }

    /// Nearest coordinate inside the bounds
    pub fn clamp(&self, q: Coord) -> Coord {
        let (lo, hi) = (self.q_min(), self.q_max());
        self.fold((q.0.clamp(lo.0, hi.0), q.1.clamp(lo.1, hi.1)))
    }

    pub fn in_bounds(&self, q: Coord) -> bool {
        let (lo, hi) = (self.q_min(), self.q_max());
        q == self.fold(q) && q.0 >= lo.0 && q.0 <= hi.0 && q.1 >= lo.1 && q.1 <= hi.1
    }

    /// Coordinates within Chebyshev distance `depth` of `center`, inside
    /// the bounds
    pub fn window(&self, center: Coord, depth: usize) -> Vec<Coord> {
        let (lo, hi) = (self.q_min(), self.q_max());
        let span = |c: usize, lo: usize, hi: usize| {
            c.saturating_sub(depth).max(lo)..=(c + depth).min(hi)
        };
        if self.is_bipartite() {
            span(center.0, lo.0, hi.0)
                .flat_map(|q1| span(center.1, lo.1, hi.1).map(move |q2| (q1, q2)))
                .collect()
        } else {
            span(center.0, lo.0, hi.0).map(|q| (q, q)).collect()
        }
    }

    pub fn cell(&self, q: Coord) -> Option<&Cell> {
        self.cells.get(&q)
    }

    pub fn status(&self, q: Coord) -> CellStatus {
        self.cells
            .get(&q)
            .map(|c| c.status)
            .unwrap_or(CellStatus::Unexplored)
    }

    /// Coordinates with a fitted model, in grid order
    pub fn explored(&self) -> Vec<Coord> {
        self.cells
            .iter()
            .filter(|(_, c)| c.best.is_some())
            .map(|(&q, _)| q)
            .collect()
    }

    pub fn mark_fitting(&mut self, q: Coord) {
        let cell = self.cells.entry(q).or_insert_with(Cell::new);
        if cell.status == CellStatus::Unexplored {
            cell.status = CellStatus::Fitting;
        }
    }

    pub fn fitter(&self) -> VemFitter<'_> {
        VemFitter::new(&self.networks, self.variant, &self.options.vem)
    }

    /// Starting points of a cell fitted for the first time
    pub fn fresh_starts(&self, q: Coord) -> Vec<Assignment> {
        if q == (1, 1) {
            return vec![trivial_assignment(&self.networks)];
        }
        let kmeans = &self.options.kmeans;
        let mut starts = vec![
            collection_assignment(&self.networks, q, InitKind::Spectral, kmeans),
            collection_assignment(&self.networks, q, InitKind::Hierarchical, kmeans),
        ];
        let cell_seed = self
            .options
            .seed
            .wrapping_add((q.0 as u64) << 32)
            .wrapping_add(q.1 as u64);
        for run in 1..self.options.nb_run {
            let mut rng = SmallRng::seed_from_u64(cell_seed.wrapping_add(run as u64));
            starts.push(random_assignment(&self.networks, q, &mut rng));
        }
        starts
    }

    fn neighbour_model(&self, q: Coord) -> Option<(&FittedModel, usize)> {
        self.cells
            .get(&q)
            .and_then(|c| c.best.as_ref().map(|b| (b, c.generation)))
    }

    /// Split seeds from the fitted cells one block below `q` and merge
    /// seeds from the cells one block above. A neighbour seeds `q` again
    /// only after its best fit changed.
    pub fn seeds_for(&mut self, q: Coord) -> Vec<Assignment> {
        let max_seeds = self.options.max_neighbor_seeds;
        let mut neighbours: Vec<(Coord, Axis, bool)> = vec![];

        if self.is_bipartite() {
            if q.0 > 1 {
                neighbours.push(((q.0 - 1, q.1), Axis::Row, true));
            }
            if q.1 > 1 {
                neighbours.push(((q.0, q.1 - 1), Axis::Col, true));
            }
            neighbours.push(((q.0 + 1, q.1), Axis::Row, false));
            neighbours.push(((q.0, q.1 + 1), Axis::Col, false));
        } else {
            if q.0 > 1 {
                neighbours.push(((q.0 - 1, q.0 - 1), Axis::Row, true));
            }
            neighbours.push(((q.0 + 1, q.0 + 1), Axis::Row, false));
        }

        let mut seeds = vec![];
        let mut used = vec![];
        for (nq, axis, split) in neighbours {
            let Some((model, generation)) = self.neighbour_model(nq) else {
                continue;
            };
            if self.seeded_from.get(&(nq, q)) == Some(&generation) {
                continue;
            }
            let proposed = if split {
                split_assignments(model, &self.networks, axis, max_seeds)
            } else {
                merge_assignments(model, axis, max_seeds)
            };
            debug!("{} seed(s) for {:?} from {:?}", proposed.len(), q, nq);
            seeds.extend(proposed);
            used.push((nq, generation));
        }

        for (nq, generation) in used {
            self.seeded_from.insert((nq, q), generation);
        }
        seeds
    }

    /// Keep `model` as the cell's best if its BICL is strictly higher,
    /// otherwise add it to the discarded runs.
    pub fn offer(&mut self, q: Coord, model: FittedModel) {
        let max_discarded = self.options.max_discarded;
        let cell = self.cells.entry(q).or_insert_with(Cell::new);

        let better = cell
            .best
            .as_ref()
            .is_none_or(|b| model.bicl() > b.bicl());

        if better {
            debug!(
                "cell {:?}: BICL {:.4} from {:?} start",
                q,
                model.bicl(),
                model.init
            );
            if let Some(old) = cell.best.replace(model) {
                cell.discarded.push(old);
            }
            cell.generation += 1;
            cell.status = match cell.status {
                CellStatus::Unexplored | CellStatus::Fitting => CellStatus::Fitted,
                _ => CellStatus::Superseded,
            };
        } else {
            cell.discarded.push(model);
        }

        // best first
        cell.discarded
            .sort_by(|a, b| b.bicl().total_cmp(&a.bicl()));
        cell.discarded.truncate(max_discarded);
    }

    /// Recompute the best coordinate (argmax BICL over fitted cells,
    /// smallest coordinate on ties)
    pub fn store_criteria_and_best_fit(&mut self) -> Option<Coord> {
        let mut best: Option<(Coord, f64)> = None;
        for (&q, cell) in self.cells.iter() {
            if let Some(m) = cell.best.as_ref() {
                if best.is_none_or(|(_, b)| m.bicl() > b) {
                    best = Some((q, m.bicl()));
                }
            }
        }
        self.best = best.map(|(q, _)| q);
        self.best
    }

    pub fn best_coord(&self) -> Option<Coord> {
        self.best
    }

    pub fn best_fit(&self) -> Option<&FittedModel> {
        self.best
            .and_then(|q| self.cells.get(&q))
            .and_then(|c| c.best.as_ref())
    }

    /// Keep at most `max_keep` discarded runs per cell
    pub fn truncate_discarded_model_list(&mut self, max_keep: usize) {
        for cell in self.cells.values_mut() {
            cell.discarded.truncate(max_keep);
        }
    }

    /// Criteria of every fitted cell in grid order
    pub fn criteria(&self) -> Vec<CellCriteria> {
        self.cells
            .iter()
            .filter_map(|(&(q1, q2), cell)| {
                cell.best.as_ref().map(|m| CellCriteria {
                    q1,
                    q2,
                    loglik: m.criteria.loglik,
                    entropy: m.criteria.entropy,
                    vbound: m.criteria.vbound,
                    icl: m.criteria.icl,
                    penalty: m.criteria.penalty,
                    bicl: m.criteria.bicl,
                    converged: m.converged,
                    init: m.init,
                    status: cell.status,
                })
            })
            .collect()
    }

    fn require_best(&self, operation: &'static str) -> Result<&FittedModel> {
        self.best_fit().ok_or(Error::Unsupported {
            operation,
            found: "a model collection with no fitted cell".into(),
            expected: "an estimated model collection",
        })
    }

    /// Hard labels of every network under the best fit
    pub fn memberships(&self) -> Result<Vec<NetworkMembership>> {
        let best = self.require_best("extract memberships")?;
        Ok(self
            .networks
            .iter()
            .enumerate()
            .map(|(m, net)| {
                let (rows, cols) = best.hard_labels(m);
                NetworkMembership {
                    network: net.id().to_string(),
                    rows,
                    cols,
                }
            })
            .collect())
    }

    /// Expected value of every dyad of network `m` under the best fit
    pub fn predicted(&self, m: usize) -> Result<DMatrix<f64>> {
        let best = self.require_best("predict dyads")?;
        let net = self.networks.get(m).ok_or_else(|| {
            Error::InvalidOption(format!(
                "network index {} out of range (collection of {})",
                m,
                self.networks.len()
            ))
        })?;
        Ok(best.predicted(m, net))
    }

    /// Compare the best joint BICL with the sum of per-network BICL.
    /// Only meaningful for bipartite collections.
    pub fn choose_joint_or_separated<E, B>(
        &mut self,
        estimator: &E,
        backend: &B,
    ) -> Result<JointVerdict>
    where
        E: SingleNetworkEstimator,
        B: TaskMap,
    {
        if !self.is_bipartite() {
            return Err(Error::Unsupported {
                operation: "choose joint or separated modelisation",
                found: "a unipartite collection".into(),
                expected: "a bipartite collection",
            });
        }
        let joint_bicl = self.require_best("choose joint or separated modelisation")?.bicl();

        let (variant, options) = (self.variant, &self.options);
        let separated = backend.map(self.networks.clone(), |net| {
            estimator.estimate(&net, variant, options)
        });
        let separated_bicl = separated.into_iter().sum::<Result<f64>>()?;

        let verdict = JointVerdict {
            joint_bicl,
            separated_bicl,
            joint_preferred: joint_bicl >= separated_bicl,
        };
        info!(
            "{} (joint BICL {:.4}, separated BICL {:.4})",
            verdict.message(),
            joint_bicl,
            separated_bicl
        );
        self.verdict = Some(verdict.clone());
        Ok(verdict)
    }

    pub fn verdict(&self) -> Option<&JointVerdict> {
        self.verdict.as_ref()
    }

    /// Criteria table, chosen Q and the joint/separated verdict
    pub fn summary(&self) -> String {
        self.to_string()
    }

    pub fn print_metrics(&self) {
        println!("{}", self);
    }
}

impl BiclSource for ModelCollection {
    fn bicl(&self) -> Result<f64> {
        Ok(self.require_best("compute BICL")?.bicl())
    }
}

impl NodeGroups for ModelCollection {
    fn node_groups(&self) -> Result<Vec<NodeGroup>> {
        let best = self.require_best("extract node groups")?;
        Ok(fitted_node_groups(best, &self.networks, 0))
    }
}

impl fmt::Display for ModelCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bipartite = self.is_bipartite();
        writeln!(
            f,
            "{} {} network(s), {} emission, variant {}",
            self.num_networks(),
            if bipartite { "bipartite" } else { "unipartite" },
            self.emission(),
            self.variant
        )?;

        if bipartite {
            write!(f, "{:>4} {:>4}", "Q1", "Q2")?;
        } else {
            write!(f, "{:>4}", "Q")?;
        }
        writeln!(
            f,
            " {:>14} {:>14} {:>14} {:>5}",
            "vbound", "ICL", "BICL", "conv"
        )?;

        for c in self.criteria() {
            let mark = if Some((c.q1, c.q2)) == self.best { "*" } else { "" };
            if bipartite {
                write!(f, "{:>4} {:>4}", c.q1, c.q2)?;
            } else {
                write!(f, "{:>4}", c.q1)?;
            }
            writeln!(
                f,
                " {:>14.4} {:>14.4} {:>14.4} {:>5} {}",
                c.vbound, c.icl, c.bicl, c.converged, mark
            )?;
        }

        match self.best_fit() {
            Some(m) if bipartite => writeln!(
                f,
                "best: Q1 = {}, Q2 = {}, BICL = {:.4}",
                m.q.0,
                m.q.1,
                m.bicl()
            )?,
            Some(m) => writeln!(f, "best: Q = {}, BICL = {:.4}", m.q.0, m.bicl())?,
            None => writeln!(f, "nothing fitted")?,
        }

        if let Some(v) = self.verdict.as_ref() {
            writeln!(
                f,
                "{} (joint BICL {:.4}, separated BICL {:.4})",
                v.message(),
                v.joint_bicl,
                v.separated_bicl
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::one_hot;
    use crate::vem::Criteria;

    fn small_net(id: &str) -> Arc<Network> {
        let adj = DMatrix::from_fn(6, 6, |i, j| {
            if i != j && (i < 3) == (j < 3) {
                1.0
            } else {
                0.0
            }
        });
        Arc::new(Network::unipartite(id, adj, Emission::Bernoulli).unwrap())
    }

    fn dummy_model(q: Coord, bicl: f64) -> FittedModel {
        let tau = one_hot(&[0, 0, 0, 0, 0, 0], q.0);
        FittedModel {
            q,
            params: crate::vem::BlockParams {
                alpha: DMatrix::from_element(q.0, q.1, 0.5),
                delta: vec![1.0],
                pi: vec![nalgebra::DVector::from_element(q.0, 1.0 / q.0 as f64)],
                rho: vec![],
            },
            tau_row: vec![tau],
            tau_col: vec![],
            criteria: Criteria {
                loglik: bicl,
                entropy: 0.0,
                vbound: bicl,
                icl: bicl,
                penalty: 0.0,
                bicl,
            },
            converged: true,
            num_steps: 1,
            init: InitKind::Random,
        }
    }

    #[test]
    fn test_options_validation() {
        let ok = EstimateOptions::default();
        assert!(ok.validate().is_ok());

        let cases = [
            EstimateOptions { nb_run: 0, ..Default::default() },
            EstimateOptions { q_min: (3, 3), q_max: (2, 8), ..Default::default() },
            EstimateOptions { q_min: (0, 1), ..Default::default() },
            EstimateOptions { depth: 0, ..Default::default() },
            EstimateOptions { start: Some((9, 1)), ..Default::default() },
        ];
        for opts in cases {
            assert!(matches!(opts.validate(), Err(Error::InvalidOption(_))));
        }
    }

    #[test]
    fn test_mixed_collection_rejected() {
        let bip = Arc::new(
            Network::bipartite("b", DMatrix::from_element(3, 2, 1.0), Emission::Bernoulli).unwrap(),
        );
        let res = ModelCollection::new(
            vec![small_net("a"), bip],
            ModelVariant::IID,
            EstimateOptions::default(),
        );
        assert!(matches!(res, Err(Error::InvalidNetwork { .. })));

        let rho: ModelVariant = "rho".parse().unwrap();
        let res = ModelCollection::new(vec![small_net("a")], rho, EstimateOptions::default());
        assert!(matches!(res, Err(Error::InvalidOption(_))));
    }

    #[test]
    fn test_offer_keeps_best_and_bounds_discarded() {
        let opts = EstimateOptions {
            max_discarded: 2,
            ..Default::default()
        };
        let mut coll = ModelCollection::new(vec![small_net("a")], ModelVariant::IID, opts).unwrap();
        let q = (2, 2);
        assert_eq!(coll.status(q), CellStatus::Unexplored);
        coll.mark_fitting(q);
        assert_eq!(coll.status(q), CellStatus::Fitting);

        coll.offer(q, dummy_model(q, -10.0));
        assert_eq!(coll.status(q), CellStatus::Fitted);
        coll.offer(q, dummy_model(q, -12.0));
        coll.offer(q, dummy_model(q, -11.0));
        coll.offer(q, dummy_model(q, -13.0));
        let cell = coll.cell(q).unwrap();
        assert_eq!(cell.best.as_ref().unwrap().bicl(), -10.0);
        assert_eq!(cell.discarded.len(), 2);
        assert_eq!(cell.discarded[0].bicl(), -11.0);
        assert_eq!(cell.generation, 1);

        // equal BICL does not replace
        coll.offer(q, dummy_model(q, -10.0));
        assert_eq!(coll.cell(q).unwrap().generation, 1);

        coll.offer(q, dummy_model(q, -5.0));
        let cell = coll.cell(q).unwrap();
        assert_eq!(cell.status, CellStatus::Superseded);
        assert_eq!(cell.generation, 2);

        coll.truncate_discarded_model_list(1);
        assert_eq!(coll.cell(q).unwrap().discarded.len(), 1);
    }

    #[test]
    fn test_best_fit_is_argmax() {
        let opts = EstimateOptions::default();
        let mut coll = ModelCollection::new(vec![small_net("a")], ModelVariant::IID, opts).unwrap();
        assert!(coll.best_fit().is_none());
        assert!(matches!(coll.bicl(), Err(Error::Unsupported { .. })));
        assert!(coll.node_groups().is_err());

        coll.offer((1, 1), dummy_model((1, 1), -30.0));
        coll.offer((2, 2), dummy_model((2, 2), -20.0));
        coll.offer((3, 3), dummy_model((3, 3), -25.0));
        assert_eq!(coll.store_criteria_and_best_fit(), Some((2, 2)));
        assert_eq!(coll.bicl().unwrap(), -20.0);
        assert_eq!(coll.explored(), vec![(1, 1), (2, 2), (3, 3)]);
        assert_eq!(coll.criteria().len(), 3);
        assert!(coll.summary().contains("best: Q = 2"));
    }

    #[test]
    fn test_unipartite_window_stays_on_diagonal() {
        let opts = EstimateOptions {
            q_max: (4, 4),
            ..Default::default()
        };
        let coll = ModelCollection::new(vec![small_net("a")], ModelVariant::IID, opts).unwrap();
        assert_eq!(coll.window((1, 1), 1), vec![(1, 1), (2, 2)]);
        assert_eq!(coll.window((4, 4), 2), vec![(2, 2), (3, 3), (4, 4)]);
        assert_eq!(coll.clamp((7, 2)), (4, 4));
    }

    #[test]
    fn test_bipartite_window_is_a_box() {
        let bip = Arc::new(
            Network::bipartite("b", DMatrix::from_element(3, 2, 1.0), Emission::Bernoulli).unwrap(),
        );
        let opts = EstimateOptions {
            q_max: (3, 3),
            ..Default::default()
        };
        let coll = ModelCollection::new(vec![bip], ModelVariant::IID, opts).unwrap();
        let w = coll.window((2, 1), 1);
        assert_eq!(w, vec![(1, 1), (1, 2), (2, 1), (2, 2), (3, 1), (3, 2)]);
    }

    #[test]
    fn test_neighbour_seeds_once_per_generation() {
        let opts = EstimateOptions::default();
        let mut coll = ModelCollection::new(vec![small_net("a")], ModelVariant::IID, opts).unwrap();
        let fitter = coll.fitter();
        let init = collection_assignment(
            coll.networks(),
            (2, 2),
            InitKind::Spectral,
            &KmeansArgs::default(),
        );
        let model = fitter.fit(init);
        coll.offer((2, 2), model);

        let seeds = coll.seeds_for((3, 3));
        assert!(!seeds.is_empty());
        assert!(seeds.iter().all(|s| s.shape() == (3, 3)));
        assert!(coll.seeds_for((3, 3)).is_empty());

        let merged = coll.seeds_for((1, 1));
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].shape(), (1, 1));
    }

    #[test]
    fn test_joint_or_separated_rejects_unipartite() {
        let opts = EstimateOptions::default();
        let mut coll = ModelCollection::new(vec![small_net("a")], ModelVariant::IID, opts).unwrap();
        let res = coll.choose_joint_or_separated(&CollectionEstimator, &Sequential);
        assert!(matches!(res, Err(Error::Unsupported { .. })));
    }
}
