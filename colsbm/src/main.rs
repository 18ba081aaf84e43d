mod common;
mod run_fit;
mod run_sim;

use run_fit::*;
use run_sim::*;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "colsbm")]
#[command(about = "Joint stochastic block models over collections of networks")]
struct Cli {
    /// Verbosity: -v info, -vv debug, -vvv trace
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit a collection (or a partition of it) from TSV matrices
    Fit(FitArgs),
    /// Sample a collection from a block model and write TSV matrices
    Simulate(SimArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if std::env::var_os("RUST_LOG").is_none() {
        let level = match cli.verbose {
            0 => "error",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        std::env::set_var("RUST_LOG", level);
    }
    env_logger::init();

    match &cli.commands {
        Commands::Fit(args) => run_fit(args)?,
        Commands::Simulate(args) => run_sim(args)?,
    }

    Ok(())
}
