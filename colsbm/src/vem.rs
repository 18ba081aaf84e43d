//! Variational EM for a collection SBM at a fixed number of blocks.
//!
//! Alternates:
//! - **E-step**: fixed-point updates of the soft memberships τ, row and
//!   column blocks in turn for bipartite networks
//! - **M-step**: closed-form mixture proportions; connectivity either
//!   pooled over the collection or, with a free density, fitted jointly
//!   with the per-network multipliers δ by coordinate-wise root finding
//!
//! until the parameter vector moves less than `tolerance`, or
//! `max_steps` is reached (the last iterate is kept and flagged).

use crate::network::{Emission, Network};
use crate::numeric::*;
use crate::sufficient_stats::{collect_stats, BlockStats};
use crate::variant::ModelVariant;
use log::{trace, warn};
use matrix_util::traits::RowOps;
use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use std::sync::Arc;

/// Options for the VEM fitter.
#[derive(Debug, Clone)]
pub struct VemOptions {
    /// Stop once successive parameter vectors are closer than this. Default: 1e-6
    pub tolerance: f64,
    /// Maximum number of E/M rounds. Default: 100
    pub max_steps: usize,
    /// Fixed-point sweeps per E-step. Default: 3
    pub fixed_point_steps: usize,
    /// Alternations between α and δ in a free-density M-step. Default: 10
    pub density_steps: usize,
    /// Multiplier of the BIC-type penalty. Default: 0.5
    pub penalty_factor: f64,
}

impl Default for VemOptions {
    fn default() -> Self {
        VemOptions {
            tolerance: 1e-6,
            max_steps: 100,
            fixed_point_steps: 3,
            density_steps: 10,
            penalty_factor: 0.5,
        }
    }
}

/// Where the starting memberships of a run came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InitKind {
    /// Single block, nothing to estimate
    Trivial,
    /// Spectral clustering of each network
    Spectral,
    /// Ward clustering of each network
    Hierarchical,
    /// Uniformly random labels
    Random,
    /// A block of the neighbouring smaller model split in two
    Split,
    /// Two blocks of the neighbouring larger model merged
    Merge,
}

/// Starting memberships for one VEM run
#[derive(Debug, Clone)]
pub struct Assignment {
    /// One n1×Q1 matrix per network
    pub rows: Vec<DMatrix<f64>>,
    /// One n2×Q2 matrix per network; empty for unipartite collections
    pub cols: Vec<DMatrix<f64>>,
    pub kind: InitKind,
}

impl Assignment {
    /// `(Q1, Q2)` of this assignment; `Q2 = Q1` for unipartite collections
    pub fn shape(&self) -> (usize, usize) {
        let q1 = self.rows.first().map(|t| t.ncols()).unwrap_or(0);
        let q2 = self.cols.first().map(|t| t.ncols()).unwrap_or(q1);
        (q1, q2)
    }
}

/// Mixture and connectivity parameters
#[derive(Debug, Clone, PartialEq)]
pub struct BlockParams {
    /// Shared Q1×Q2 connectivity
    pub alpha: DMatrix<f64>,
    /// Per-network density multipliers (all 1 unless the density is free)
    pub delta: Vec<f64>,
    /// Row mixture proportions: one per network if free, else one shared
    pub pi: Vec<DVector<f64>>,
    /// Column mixture proportions (bipartite only), same sharing rule
    pub rho: Vec<DVector<f64>>,
}

impl BlockParams {
    /// Row mixture of network `m`
    pub fn pi_of(&self, m: usize) -> &DVector<f64> {
        &self.pi[m.min(self.pi.len() - 1)]
    }

    /// Column mixture of network `m`
    pub fn rho_of(&self, m: usize) -> Option<&DVector<f64>> {
        if self.rho.is_empty() {
            None
        } else {
            Some(&self.rho[m.min(self.rho.len() - 1)])
        }
    }

    /// Connectivity of network `m`, `δ_m α`, inside the emission domain
    pub fn connectivity(&self, m: usize, emission: Emission) -> DMatrix<f64> {
        let d = self.delta[m];
        match emission {
            Emission::Bernoulli => self.alpha.map(|a| clamp_prob(d * a)),
            Emission::Poisson => self.alpha.map(|a| clamp_rate(d * a)),
        }
    }

    /// Flattened `(α, δ, π, ρ)` used to measure convergence
    pub fn to_vec(&self) -> Vec<f64> {
        let mut out: Vec<f64> = self.alpha.iter().cloned().collect();
        out.extend(self.delta.iter());
        for p in self.pi.iter().chain(self.rho.iter()) {
            out.extend(p.iter());
        }
        out
    }
}

/// Selection criteria of a fitted model
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Criteria {
    /// Expected complete-data log-likelihood under τ
    pub loglik: f64,
    /// `-Σ τ ln τ` over all networks and axes
    pub entropy: f64,
    /// Variational lower bound, `loglik + entropy`
    pub vbound: f64,
    /// `loglik + entropy`
    pub icl: f64,
    /// Penalty subtracted from the ICL
    pub penalty: f64,
    /// `icl - penalty`
    pub bicl: f64,
}

/// One fitted grid cell
#[derive(Debug, Clone)]
pub struct FittedModel {
    /// `(Q1, Q2)`; `Q2 = Q1` for unipartite collections
    pub q: (usize, usize),
    pub params: BlockParams,
    /// Row memberships per network
    pub tau_row: Vec<DMatrix<f64>>,
    /// Column memberships per network (bipartite only)
    pub tau_col: Vec<DMatrix<f64>>,
    pub criteria: Criteria,
    /// Whether the tolerance was met before `max_steps`
    pub converged: bool,
    pub num_steps: usize,
    pub init: InitKind,
}

impl FittedModel {
    pub fn bicl(&self) -> f64 {
        self.criteria.bicl
    }

    pub fn is_bipartite(&self) -> bool {
        !self.tau_col.is_empty()
    }

    /// Column memberships of network `m` (row memberships if unipartite)
    pub fn tau_col_of(&self, m: usize) -> &DMatrix<f64> {
        if self.is_bipartite() {
            &self.tau_col[m]
        } else {
            &self.tau_row[m]
        }
    }

    /// Hard row labels and, for bipartite models, hard column labels
    pub fn hard_labels(&self, m: usize) -> (Vec<usize>, Option<Vec<usize>>) {
        let rows = self.tau_row[m].row_argmax();
        let cols = if self.is_bipartite() {
            Some(self.tau_col[m].row_argmax())
        } else {
            None
        };
        (rows, cols)
    }

    /// Expected value of every dyad of network `m`: `τ_row · α^m · τ_colᵀ`.
    /// The diagonal of a unipartite network is zero.
    pub fn predicted(&self, m: usize, net: &Network) -> DMatrix<f64> {
        let p = self.params.connectivity(m, net.emission());
        let mut out = &self.tau_row[m] * p * self.tau_col_of(m).transpose();
        if !net.is_bipartite() {
            out.fill_diagonal(0.0);
        }
        out
    }

    /// Sufficient statistics of network `m` under this model
    pub fn block_stats(&self, m: usize, net: &Network) -> BlockStats {
        BlockStats::from_network(net, &self.tau_row[m], self.tau_col_of(m))
    }
}

/// VEM fitter over a fixed collection of networks
pub struct VemFitter<'a> {
    networks: &'a [Arc<Network>],
    variant: ModelVariant,
    options: &'a VemOptions,
}

impl<'a> VemFitter<'a> {
    /// All networks must share the emission and the uni/bipartite kind;
    /// `ModelCollection::new` checks this before building a fitter.
    pub fn new(
        networks: &'a [Arc<Network>],
        variant: ModelVariant,
        options: &'a VemOptions,
    ) -> Self {
        VemFitter {
            networks,
            variant,
            options,
        }
    }

    pub fn is_bipartite(&self) -> bool {
        self.networks.first().is_some_and(|n| n.is_bipartite())
    }

    fn emission(&self) -> Emission {
        self.networks
            .first()
            .map(|n| n.emission())
            .unwrap_or(Emission::Bernoulli)
    }

    /// Unipartite collection in which every network is undirected
    pub fn is_symmetric(&self) -> bool {
        self.networks
            .iter()
            .all(|n| !n.is_bipartite() && !n.is_directed())
    }

    /// Run VEM from `init` for at most `options.max_steps` rounds.
    ///
    /// A single-block request skips the E-step entirely.
    pub fn fit(&self, init: Assignment) -> FittedModel {
        let q = init.shape();
        let kind = init.kind;
        let (tau_row, tau_col) = (init.rows, init.cols);
        let params = self.m_step(&tau_row, &tau_col, None);

        if q == (1, 1) {
            return self.finish(q, params, tau_row, tau_col, true, 0, kind);
        }

        self.iterate(q, params, tau_row, tau_col, self.options.max_steps, kind, true)
    }

    /// Continue VEM from an already fitted model for at most `max_steps`
    /// rounds. Zero steps returns the same parameters and memberships.
    pub fn refine(&self, model: FittedModel, max_steps: usize) -> FittedModel {
        let FittedModel {
            q,
            params,
            tau_row,
            tau_col,
            init,
            ..
        } = model;
        self.iterate(q, params, tau_row, tau_col, max_steps, init, false)
    }

    #[allow(clippy::too_many_arguments)]
    fn iterate(
        &self,
        q: (usize, usize),
        mut params: BlockParams,
        mut tau_row: Vec<DMatrix<f64>>,
        mut tau_col: Vec<DMatrix<f64>>,
        max_steps: usize,
        kind: InitKind,
        fresh_start: bool,
    ) -> FittedModel {
        let mut converged = max_steps == 0;
        let mut num_steps = 0;

        for step in 0..max_steps {
            // isolated nodes keep their initializer block in the first sweep
            let freeze_isolated = fresh_start && step == 0;
            self.e_step(&params, &mut tau_row, &mut tau_col, freeze_isolated);
            let next = self.m_step(&tau_row, &tau_col, Some(&params));
            let dist = param_distance(&params.to_vec(), &next.to_vec());
            params = next;
            num_steps = step + 1;

            trace!("VEM q={:?} step {}: |Δθ|={:.3e}", q, num_steps, dist);

            if dist < self.options.tolerance {
                converged = true;
                break;
            }
        }

        if !converged {
            warn!(
                "VEM q={:?} ({:?} start) stopped at max_steps={} before reaching tolerance {:e}",
                q, kind, max_steps, self.options.tolerance
            );
        }

        self.finish(q, params, tau_row, tau_col, converged, num_steps, kind)
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        q: (usize, usize),
        params: BlockParams,
        tau_row: Vec<DMatrix<f64>>,
        tau_col: Vec<DMatrix<f64>>,
        converged: bool,
        num_steps: usize,
        init: InitKind,
    ) -> FittedModel {
        let criteria = self.criteria(q, &params, &tau_row, &tau_col);
        FittedModel {
            q,
            params,
            tau_row,
            tau_col,
            criteria,
            converged,
            num_steps,
            init,
        }
    }

    /// Block log-weights of every node given its neighbours' memberships
    ///
    /// * `x` - edge values, nodes of the updated axis on the rows
    /// * `mask` - observation mask in the same orientation
    /// * `tau_other` - memberships of the opposite endpoints
    /// * `lg`, `l0` - per-block-pair coefficients oriented as
    ///   (updated axis blocks)×(other axis blocks)
    fn neighbour_weights(
        x: &DMatrix<f64>,
        mask: &DMatrix<f64>,
        tau_other: &DMatrix<f64>,
        lg: &DMatrix<f64>,
        l0: &DMatrix<f64>,
    ) -> DMatrix<f64> {
        x * tau_other * lg.transpose() + mask * tau_other * l0.transpose()
    }

    fn add_log_mixture(weights: &mut DMatrix<f64>, mixture: &DVector<f64>) {
        let ln_mix = mixture.map(safe_ln);
        for mut row in weights.row_iter_mut() {
            for (x, l) in row.iter_mut().zip(ln_mix.iter()) {
                *x += l;
            }
        }
    }

    fn keep_isolated_rows(new: &mut DMatrix<f64>, old: &DMatrix<f64>, degree: &[f64]) {
        for (i, &d) in degree.iter().enumerate() {
            if d <= 0.0 {
                new.set_row(i, &old.row(i));
            }
        }
    }

    /// E-step: `x ln p + (1 - x) ln(1 - p)` (Bernoulli) or `x ln λ - λ`
    /// (Poisson) is linear in `x`, so each update is
    /// `X τ lgᵀ + M τ l0ᵀ + ln π` followed by a row softmax.
    fn e_step(
        &self,
        params: &BlockParams,
        tau_row: &mut [DMatrix<f64>],
        tau_col: &mut [DMatrix<f64>],
        freeze_isolated: bool,
    ) {
        let emission = self.emission();
        let symmetric = self.is_symmetric();

        for (m, net) in self.networks.iter().enumerate() {
            let p = params.connectivity(m, emission);
            let (lg, l0) = match emission {
                Emission::Bernoulli => (p.map(logit), p.map(|x| (1.0 - x).ln())),
                Emission::Poisson => (p.map(|x| x.ln()), p.map(|x| -x)),
            };

            let x = net.data();
            let mask = net.mask();

            for _ in 0..self.options.fixed_point_steps.max(1) {
                if net.is_bipartite() {
                    let mut w_row = Self::neighbour_weights(x, mask, &tau_col[m], &lg, &l0);
                    Self::add_log_mixture(&mut w_row, params.pi_of(m));
                    softmax_rows_inplace(&mut w_row);
                    if freeze_isolated {
                        Self::keep_isolated_rows(&mut w_row, &tau_row[m], &net.row_degree());
                    }
                    tau_row[m] = w_row;

                    let lg_t = lg.transpose();
                    let l0_t = l0.transpose();
                    let mut w_col = Self::neighbour_weights(
                        &x.transpose(),
                        &mask.transpose(),
                        &tau_row[m],
                        &lg_t,
                        &l0_t,
                    );
                    if let Some(rho) = params.rho_of(m) {
                        Self::add_log_mixture(&mut w_col, rho);
                    }
                    softmax_rows_inplace(&mut w_col);
                    if freeze_isolated {
                        Self::keep_isolated_rows(&mut w_col, &tau_col[m], &net.col_degree());
                    }
                    tau_col[m] = w_col;
                } else {
                    let tau = &tau_row[m];
                    let mut w = Self::neighbour_weights(x, mask, tau, &lg, &l0);
                    if net.is_directed() {
                        // incoming edges: blocks of the source on the left
                        let lg_t = lg.transpose();
                        let l0_t = l0.transpose();
                        w += Self::neighbour_weights(
                            &x.transpose(),
                            &mask.transpose(),
                            tau,
                            &lg_t,
                            &l0_t,
                        );
                    } else if !symmetric {
                        // α is asymmetric when directed networks share it;
                        // an undirected dyad averages both orientations
                        let lg_t = lg.transpose();
                        let l0_t = l0.transpose();
                        w += Self::neighbour_weights(x, mask, tau, &lg_t, &l0_t);
                        w *= 0.5;
                    }
                    Self::add_log_mixture(&mut w, params.pi_of(m));
                    softmax_rows_inplace(&mut w);
                    if freeze_isolated {
                        Self::keep_isolated_rows(&mut w, &tau_row[m], &net.row_degree());
                    }
                    tau_row[m] = w;
                }
            }
        }
    }

    fn mixture(taus: &[DMatrix<f64>], free: bool) -> Vec<DVector<f64>> {
        let column_sums = |t: &DMatrix<f64>| -> DVector<f64> {
            DVector::from_iterator(t.ncols(), t.column_iter().map(|c| c.sum()))
        };

        if free {
            taus.iter()
                .map(|t| column_sums(t) / (t.nrows().max(1) as f64))
                .collect()
        } else {
            let k = taus.first().map(|t| t.ncols()).unwrap_or(0);
            let mut total = DVector::zeros(k);
            let mut n = 0.0;
            for t in taus {
                total += column_sums(t);
                n += t.nrows() as f64;
            }
            vec![total / n.max(1.0)]
        }
    }

    /// M-step. `prev` warm-starts the density multipliers.
    fn m_step(
        &self,
        tau_row: &[DMatrix<f64>],
        tau_col: &[DMatrix<f64>],
        prev: Option<&BlockParams>,
    ) -> BlockParams {
        let stats = collect_stats(self.networks, tau_row, tau_col);
        let pi = Self::mixture(tau_row, self.variant.free_mixture_row);
        let rho = if self.is_bipartite() {
            Self::mixture(tau_col, self.variant.free_mixture_col)
        } else {
            vec![]
        };

        let (alpha, delta) = if self.variant.free_density {
            self.density_scaled_connectivity(&stats, prev)
        } else {
            (
                self.pooled_connectivity(&stats),
                vec![1.0; self.networks.len()],
            )
        };

        BlockParams {
            alpha,
            delta,
            pi,
            rho,
        }
    }

    fn clamp_to_domain(&self, a: f64) -> f64 {
        match self.emission() {
            Emission::Bernoulli => clamp_prob(a),
            Emission::Poisson => clamp_rate(a),
        }
    }

    fn overall_density(&self) -> f64 {
        let (edges, dyads) = self.networks.iter().fold((0.0, 0.0), |(e, d), n| {
            (e + n.data().sum(), d + n.mask().sum())
        });
        if dyads > 0.0 {
            edges / dyads
        } else {
            0.0
        }
    }

    /// `α = Σ_m edges^m / Σ_m pairs^m`; block pairs nobody populates fall
    /// back to the overall density.
    fn pooled_connectivity(&self, stats: &[BlockStats]) -> DMatrix<f64> {
        let (q1, q2) = stats[0].edges.shape();
        let fallback = self.overall_density();
        DMatrix::from_fn(q1, q2, |q, r| {
            let (s, n) = stats
                .iter()
                .fold((0.0, 0.0), |(s, n), st| (s + st.edges[(q, r)], n + st.pairs[(q, r)]));
            let a = if n > TAU_EPS { s / n } else { fallback };
            self.clamp_to_domain(a)
        })
    }

    /// Joint fit of the shared `α` and the multipliers `δ` (δ of the first
    /// network fixed to 1) by alternating closed-form (Poisson) or
    /// bisection (Bernoulli) coordinate updates.
    fn density_scaled_connectivity(
        &self,
        stats: &[BlockStats],
        prev: Option<&BlockParams>,
    ) -> (DMatrix<f64>, Vec<f64>) {
        let num_networks = stats.len();
        let emission = self.emission();

        let mut delta: Vec<f64> = match prev {
            Some(p) if p.delta.len() == num_networks => p.delta.clone(),
            _ => {
                let d0 = self.networks[0].density().max(PROB_EPS);
                self.networks
                    .iter()
                    .map(|n| (n.density() / d0).max(PROB_EPS))
                    .collect()
            }
        };
        delta[0] = 1.0;

        let fallback = self.overall_density();
        let mut alpha = self.update_alpha(stats, &delta, emission, fallback);
        for _ in 0..self.options.density_steps {
            for m in 1..num_networks {
                delta[m] = Self::update_delta(&stats[m], &alpha, emission);
            }
            alpha = self.update_alpha(stats, &delta, emission, fallback);
        }

        (alpha, delta)
    }

    fn update_alpha(
        &self,
        stats: &[BlockStats],
        delta: &[f64],
        emission: Emission,
        fallback: f64,
    ) -> DMatrix<f64> {
        let (q1, q2) = stats[0].edges.shape();
        DMatrix::from_fn(q1, q2, |q, r| {
            let terms: Vec<(f64, f64, f64)> = stats
                .iter()
                .zip(delta.iter())
                .map(|(st, &d)| (st.edges[(q, r)], st.pairs[(q, r)], d))
                .filter(|&(_, n, _)| n > TAU_EPS)
                .collect();

            if terms.is_empty() {
                return self.clamp_to_domain(fallback);
            }

            let a = match emission {
                Emission::Poisson => {
                    let s: f64 = terms.iter().map(|t| t.0).sum();
                    let n: f64 = terms.iter().map(|t| t.1 * t.2).sum();
                    s / n
                }
                Emission::Bernoulli => bernoulli_scaled_root(&terms),
            };
            self.clamp_to_domain(a)
        })
    }

    fn update_delta(stats: &BlockStats, alpha: &DMatrix<f64>, emission: Emission) -> f64 {
        let terms: Vec<(f64, f64, f64)> = stats
            .edges
            .iter()
            .zip(stats.pairs.iter())
            .zip(alpha.iter())
            .map(|((&s, &n), &a)| (s, n, a))
            .filter(|&(_, n, _)| n > TAU_EPS)
            .collect();

        if terms.is_empty() {
            return 1.0;
        }

        let d = match emission {
            Emission::Poisson => {
                let s: f64 = terms.iter().map(|t| t.0).sum();
                let n: f64 = terms.iter().map(|t| t.1 * t.2).sum();
                s / n
            }
            Emission::Bernoulli => bernoulli_scaled_root(&terms),
        };
        d.max(PROB_EPS)
    }

    /// Free parameter counts `(connectivity, row mixture, column mixture)`
    pub fn num_params(&self, q: (usize, usize)) -> (usize, usize, usize) {
        let m = self.networks.len();
        let conn = self
            .variant
            .num_connectivity_params(q, m, self.is_symmetric());
        let row = self.variant.num_row_mixture_params(q.0, m);
        let col = if self.is_bipartite() {
            self.variant.num_col_mixture_params(q.1, m)
        } else {
            0
        };
        (conn, row, col)
    }

    /// `penalty_factor · (K_conn ln(dyads) + K_row ln(rows) + K_col ln(cols))`
    pub fn penalty(&self, q: (usize, usize)) -> f64 {
        let (k_conn, k_row, k_col) = self.num_params(q);
        let dyads: f64 = self.networks.iter().map(|n| n.num_dyads()).sum();
        let rows: f64 = self.networks.iter().map(|n| n.nrows() as f64).sum();
        let cols: f64 = self.networks.iter().map(|n| n.ncols() as f64).sum();

        let mut pen = k_conn as f64 * dyads.max(1.0).ln() + k_row as f64 * rows.max(1.0).ln();
        if self.is_bipartite() {
            pen += k_col as f64 * cols.max(1.0).ln();
        }
        self.options.penalty_factor * pen
    }

    /// Log-likelihood, entropy, and the criteria derived from them
    pub fn criteria(
        &self,
        q: (usize, usize),
        params: &BlockParams,
        tau_row: &[DMatrix<f64>],
        tau_col: &[DMatrix<f64>],
    ) -> Criteria {
        let emission = self.emission();
        let stats = collect_stats(self.networks, tau_row, tau_col);

        let mut loglik = 0.0;
        let mut ent = 0.0;

        for (m, (net, st)) in self.networks.iter().zip(stats.iter()).enumerate() {
            let p = params.connectivity(m, emission);
            let conn: f64 = st
                .edges
                .iter()
                .zip(st.pairs.iter())
                .zip(p.iter())
                .map(|((&s, &n), &a)| match emission {
                    Emission::Bernoulli => s * a.ln() + (n - s) * (1.0 - a).ln(),
                    Emission::Poisson => s * a.ln() - n * a,
                })
                .sum();
            loglik += net.pair_weight() * conn - net.ln_factorial_sum();

            loglik += mixture_loglik(&tau_row[m], params.pi_of(m));
            ent += entropy(&tau_row[m]);

            if let Some(rho) = params.rho_of(m) {
                loglik += mixture_loglik(&tau_col[m], rho);
                ent += entropy(&tau_col[m]);
            }
        }

        let vbound = loglik + ent;
        let icl = loglik + ent;
        let penalty = self.penalty(q);

        Criteria {
            loglik,
            entropy: ent,
            vbound,
            icl,
            penalty,
            bicl: icl - penalty,
        }
    }
}

/// `Σ_i Σ_q τ_iq ln π_q`
fn mixture_loglik(tau: &DMatrix<f64>, mixture: &DVector<f64>) -> f64 {
    tau.column_iter()
        .zip(mixture.iter())
        .map(|(c, &p)| c.sum() * safe_ln(p))
        .sum()
}

/// Maximizer over `x` of `Σ_k s_k ln(c_k x) + (n_k - s_k) ln(1 - c_k x)`.
///
/// The derivative `Σ_k s_k / x - (n_k - s_k) c_k / (1 - c_k x)` is
/// decreasing on `(0, 1 / max c)`.
fn bernoulli_scaled_root(terms: &[(f64, f64, f64)]) -> f64 {
    let c_max = terms.iter().map(|t| t.2).fold(PROB_EPS, f64::max);
    let hi = (1.0 - PROB_EPS) / c_max;
    let lo = PROB_EPS;
    let grad = |x: f64| -> f64 {
        terms
            .iter()
            .map(|&(s, n, c)| s / x - (n - s).max(0.0) * c / (1.0 - c * x))
            .sum()
    };
    bisect_decreasing(grad, lo, hi, 80)
}
