use crate::common::*;

use clap::Args;
use colsbm::simulate::{generate_bipartite_collection, generate_unipartite_collection};
use colsbm::Emission;
use log::info;
use matrix_util::common_io::{mkdir, write_lines};
use matrix_util::traits::IoOps;
use nalgebra::DMatrix;
use rand::rngs::SmallRng;
use rand::SeedableRng;

#[derive(Args, Debug, Clone)]
pub struct SimArgs {
    /// Output prefix (writes {out}.net{m}.tsv and {out}.labels.tsv)
    #[arg(short, long, required = true)]
    pub out: Box<str>,

    /// Number of networks
    #[arg(long, default_value_t = 3)]
    pub num_networks: usize,

    /// Nodes per network (rows of a bipartite network)
    #[arg(long, default_value_t = 50)]
    pub rows: usize,

    /// Columns per bipartite network
    #[arg(long, default_value_t = 40)]
    pub cols: usize,

    /// Sample bipartite incidence matrices
    #[arg(long, default_value_t = false)]
    pub bipartite: bool,

    /// Sample asymmetric adjacency matrices
    #[arg(long, default_value_t = false)]
    pub directed: bool,

    /// Number of blocks, `Q` or `Q1,Q2`
    #[arg(long, default_value = "3", value_parser = parse_coord)]
    pub blocks: (usize, usize),

    /// Connectivity matrix (Q1 x Q2 TSV); overrides --within/--between
    #[arg(long)]
    pub alpha: Option<Box<str>>,

    /// Within-block connectivity of the default assortative matrix
    #[arg(long, default_value_t = 0.5)]
    pub within: f64,

    /// Between-block connectivity of the default assortative matrix
    #[arg(long, default_value_t = 0.05)]
    pub between: f64,

    /// Comma-separated density multipliers, one per network (default: 1)
    #[arg(long)]
    pub delta: Option<Box<str>>,

    /// Edge distribution: bernoulli or poisson
    #[arg(long, default_value = "bernoulli")]
    pub emission: Emission,

    /// Random seed
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

pub fn run_sim(args: &SimArgs) -> anyhow::Result<()> {
    let (q1, q2) = if args.bipartite {
        args.blocks
    } else {
        (args.blocks.0, args.blocks.0)
    };

    let alpha = match args.alpha.as_deref() {
        Some(file) => DMatrix::<f64>::from_tsv(file, None)?,
        None => DMatrix::from_fn(q1, q2, |k, l| {
            if k == l {
                args.within
            } else {
                args.between
            }
        }),
    };

    let delta = match args.delta.as_deref() {
        Some(s) => parse_floats(s)?,
        None => vec![1.0; args.num_networks],
    };

    let pi = vec![1.0 / alpha.nrows() as f64; alpha.nrows()];
    let rho = vec![1.0 / alpha.ncols() as f64; alpha.ncols()];

    let mut rng = SmallRng::seed_from_u64(args.seed);
    let sims = if args.bipartite {
        let dims = vec![(args.rows, args.cols); args.num_networks];
        generate_bipartite_collection(&dims, &pi, &rho, &alpha, &delta, args.emission, &mut rng)?
    } else {
        let sizes = vec![args.rows; args.num_networks];
        generate_unipartite_collection(
            &sizes,
            &pi,
            &alpha,
            &delta,
            args.emission,
            args.directed,
            &mut rng,
        )?
    };

    mkdir(&args.out)?;
    let mut labels = vec!["network\taxis\tnode\tblock".to_string()];
    for (m, sim) in sims.iter().enumerate() {
        let file = format!("{}.net{}.tsv", args.out, m);
        sim.network.data().to_tsv(&file)?;
        info!("wrote {}", file);

        let id = sim.network.id();
        labels.extend(
            sim.row_labels
                .iter()
                .enumerate()
                .map(|(i, k)| format!("{}\trow\t{}\t{}", id, i, k)),
        );
        if let Some(cols) = sim.col_labels.as_ref() {
            labels.extend(
                cols.iter()
                    .enumerate()
                    .map(|(j, l)| format!("{}\tcol\t{}\t{}", id, j, l)),
            );
        }
    }

    let label_file = format!("{}.labels.tsv", args.out);
    write_lines(&labels, &label_file)?;
    info!("wrote {}", label_file);
    Ok(())
}
