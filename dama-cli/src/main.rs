//! DAMA CLI - Command-line interface
//!
//! Commands:
//! - analyze: search one position and report move statistics
//! - match: play an engine-vs-engine series between two presets
//! - bench: fixed-node throughput over a small position suite

mod analyze;
mod bench;
mod match_cmd;

use anyhow::bail;
use clap::{Parser, Subcommand};
use dama_mcts::MctsConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dama")]
#[command(about = "Italian draughts MCTS engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search a single position and print the move statistics
    Analyze {
        /// Position in PDN-ish form, e.g. W:W21,22,K5:B10,K13 (default:
        /// the starting position)
        #[arg(long)]
        fen: Option<String>,
        #[arg(long, default_value = "vanilla")]
        preset: String,
        /// Wall-clock budget in seconds (<= 0 disables it)
        #[arg(long, default_value = "1.0")]
        time: f64,
        /// Node budget (0 = unlimited)
        #[arg(long, default_value = "0")]
        nodes: u32,
        #[arg(long, default_value = "0")]
        threads: usize,
        #[arg(long)]
        seed: Option<u64>,
        /// Policy-value network weights (JSON)
        #[arg(long)]
        net: Option<PathBuf>,
        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Play an engine-vs-engine series
    Match {
        #[arg(long, default_value = "vanilla")]
        white: String,
        #[arg(long, default_value = "pure-vanilla")]
        black: String,
        #[arg(long, default_value = "10")]
        games: usize,
        /// Seconds per move
        #[arg(long, default_value = "0.2")]
        time: f64,
        #[arg(long, default_value = "200")]
        max_plies: u32,
        /// Run the games across a rayon pool
        #[arg(long)]
        parallel: bool,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Throughput benchmark
    Bench {
        #[arg(long, default_value = "20000")]
        nodes: u32,
        #[arg(long, default_value = "0")]
        threads: usize,
    },
}

fn preset_config(name: &str) -> anyhow::Result<MctsConfig> {
    Ok(match name {
        "pure-vanilla" => MctsConfig::pure_vanilla(),
        "vanilla" => MctsConfig::vanilla(),
        "grandmaster" => MctsConfig::grandmaster(),
        "alpha-zero" => MctsConfig::alpha_zero(),
        other => bail!(
            "unknown preset '{other}' (expected pure-vanilla, vanilla, grandmaster or alpha-zero)"
        ),
    })
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Analyze {
            fen,
            preset,
            time,
            nodes,
            threads,
            seed,
            net,
            json,
        } => analyze::run(analyze::AnalyzeArgs {
            fen,
            preset,
            time,
            nodes,
            threads,
            seed,
            net,
            json,
        }),
        Commands::Match {
            white,
            black,
            games,
            time,
            max_plies,
            parallel,
            seed,
        } => match_cmd::run(match_cmd::MatchArgs {
            white,
            black,
            games,
            time,
            max_plies,
            parallel,
            seed,
        }),
        Commands::Bench { nodes, threads } => bench::run(nodes, threads),
    }
}
