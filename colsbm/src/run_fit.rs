use crate::common::*;

use clap::Args;
use colsbm::collection::CollectionEstimator;
use colsbm::*;
use log::info;
use matrix_util::clustering::KmeansArgs;
use serde_json::json;

#[derive(Args, Debug, Clone)]
pub struct FitArgs {
    /// Network matrices (tab-separated, optionally gzipped; NA = missing)
    #[arg(required = true)]
    pub data_files: Vec<Box<str>>,

    /// Output prefix (writes {out}.criteria.json and {out}.membership.tsv)
    #[arg(short, long, required = true)]
    pub out: Box<str>,

    /// Treat matrices as incidence matrices of bipartite networks
    #[arg(long, default_value_t = false)]
    pub bipartite: bool,

    /// Edge distribution: bernoulli or poisson
    #[arg(long, default_value = "bernoulli")]
    pub emission: Emission,

    /// Model variant: iid, pi, rho, pirho, delta, deltapi
    #[arg(long, default_value = "iid")]
    pub model: ModelVariant,

    /// Smallest number of blocks, `Q` or `Q1,Q2`
    #[arg(long, default_value = "1", value_parser = parse_coord)]
    pub q_min: (usize, usize),

    /// Largest number of blocks, `Q` or `Q1,Q2`
    #[arg(long, default_value = "8", value_parser = parse_coord)]
    pub q_max: (usize, usize),

    /// Starting cell of the moving window (default: q_min)
    #[arg(long, value_parser = parse_coord)]
    pub start: Option<(usize, usize)>,

    /// Random starts per unexplored cell
    #[arg(long, default_value_t = 1)]
    pub nb_run: usize,

    /// Half-width of the moving window
    #[arg(long, default_value_t = 1)]
    pub depth: usize,

    /// Maximum number of exploration passes
    #[arg(long, default_value_t = 10)]
    pub max_pass: usize,

    /// Passes without BICL improvement before stopping
    #[arg(long, default_value_t = 2)]
    pub patience: usize,

    /// VEM relative tolerance
    #[arg(long, default_value_t = 1e-6)]
    pub tolerance: f64,

    /// Maximum VEM steps per fit
    #[arg(long, default_value_t = 100)]
    pub max_steps: usize,

    /// Weight of the BIC-like penalty
    #[arg(long, default_value_t = 0.5)]
    pub penalty_factor: f64,

    /// Iterations per k-means attempt
    #[arg(long, default_value_t = 100)]
    pub kmeans_iter: usize,

    /// k-means attempts before falling back to a single block
    #[arg(long, default_value_t = 10)]
    pub kmeans_retries: usize,

    /// Split networks into groups with distinct structures
    #[arg(long, default_value_t = false)]
    pub partition: bool,

    /// Partition rounds
    #[arg(long, default_value_t = 10)]
    pub partition_iter: usize,

    /// Compare the joint fit with one fit per network (bipartite only)
    #[arg(long, default_value_t = false)]
    pub compare_separated: bool,

    /// Number of worker threads (default: all cores; 1 = sequential)
    #[arg(long)]
    pub cores: Option<usize>,

    /// Random seed
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

impl FitArgs {
    fn estimate_options(&self) -> EstimateOptions {
        EstimateOptions {
            q_min: self.q_min,
            q_max: self.q_max,
            nb_run: self.nb_run,
            depth: self.depth,
            max_pass: self.max_pass,
            max_steps_without_improvement: self.patience,
            seed: self.seed,
            start: self.start,
            kmeans: KmeansArgs {
                max_iter: self.kmeans_iter,
                max_retries: self.kmeans_retries,
                ..KmeansArgs::default()
            },
            vem: VemOptions {
                tolerance: self.tolerance,
                max_steps: self.max_steps,
                penalty_factor: self.penalty_factor,
                ..VemOptions::default()
            },
            ..EstimateOptions::default()
        }
    }
}

fn collection_json(collection: &ModelCollection) -> anyhow::Result<serde_json::Value> {
    let ids: Vec<&str> = collection.networks().iter().map(|n| n.id()).collect();
    Ok(json!({
        "networks": ids,
        "best": collection.best_coord(),
        "bicl": collection.bicl()?,
        "verdict": collection.verdict(),
        "cells": collection.criteria(),
    }))
}

pub fn run_fit(args: &FitArgs) -> anyhow::Result<()> {
    let options = args.estimate_options();
    options.validate()?;

    let backend = match args.cores {
        Some(n) => Backend::with_cores(n)?,
        None => Backend::all_cores()?,
    };

    let networks = read_networks(&args.data_files, args.bipartite, args.emission)?;
    info!(
        "{} network(s), variant {}, {} worker(s)",
        networks.len(),
        args.model,
        backend.num_workers()
    );

    let criteria_file = format!("{}.criteria.json", args.out);
    let membership_file = format!("{}.membership.tsv", args.out);

    let (summary, node_groups) = if args.partition {
        let popt = PartitionOptions {
            max_iter: args.partition_iter,
            estimate: options,
            ..PartitionOptions::default()
        };
        let partition = partition_networks(networks, args.model, &popt, None, &backend)?;

        let groups = partition
            .groups()
            .iter()
            .map(|g| {
                let mut value = collection_json(&g.collection)?;
                value["members"] = json!(g.members);
                Ok(value)
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        write_json(
            &json!({
                "variant": args.model.to_string(),
                "emission": args.emission.to_string(),
                "bicl": partition.bicl()?,
                "groups": groups,
            }),
            &criteria_file,
        )?;
        (partition.summary(), partition.node_groups()?)
    } else {
        let mut collection =
            ModelCollection::estimate(networks, args.model, &options, &backend)?;

        if args.compare_separated {
            let verdict = collection.choose_joint_or_separated(&CollectionEstimator, &backend)?;
            info!("{}", verdict.message());
        }

        let mut value = collection_json(&collection)?;
        value["variant"] = json!(args.model.to_string());
        value["emission"] = json!(args.emission.to_string());
        write_json(&value, &criteria_file)?;
        (collection.summary(), collection.node_groups()?)
    };

    write_node_groups(&node_groups, &membership_file)?;
    println!("{}", summary);
    info!("done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use colsbm::simulate::generate_unipartite_collection;
    use matrix_util::traits::IoOps;
    use nalgebra::DMatrix;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        fit: FitArgs,
    }

    #[test]
    fn test_fit_writes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let mut rng = SmallRng::seed_from_u64(11);
        let alpha = DMatrix::from_row_slice(2, 2, &[0.9, 0.05, 0.05, 0.8]);
        let sims = generate_unipartite_collection(
            &[20, 24],
            &[0.5, 0.5],
            &alpha,
            &[1.0, 1.0],
            Emission::Bernoulli,
            false,
            &mut rng,
        )
        .unwrap();

        let mut argv = vec!["test".to_string()];
        for (m, sim) in sims.iter().enumerate() {
            let file = dir.path().join(format!("g{}.tsv", m));
            let file = file.to_str().unwrap().to_string();
            sim.network.data().to_tsv(&file).unwrap();
            argv.push(file);
        }
        let out = dir.path().join("fit").to_str().unwrap().to_string();
        argv.extend(
            ["--out", &out, "--q-max", "3", "--cores", "1"]
                .iter()
                .map(|s| s.to_string()),
        );

        let cli = TestCli::try_parse_from(argv).unwrap();
        run_fit(&cli.fit).unwrap();

        let criteria = std::fs::read_to_string(format!("{}.criteria.json", out)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&criteria).unwrap();
        assert_eq!(json["best"], json!([2, 2]));
        assert_eq!(json["networks"], json!(["g0", "g1"]));

        let table = std::fs::read_to_string(format!("{}.membership.tsv", out)).unwrap();
        // header plus one line per node
        assert_eq!(table.lines().count(), 1 + 20 + 24);
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        let cli = TestCli::try_parse_from([
            "test", "x.tsv", "--out", "o", "--q-min", "4", "--q-max", "2",
        ])
        .unwrap();
        assert!(run_fit(&cli.fit).is_err());
    }
}
