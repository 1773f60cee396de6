//! Single-position analysis report.

use crate::preset_config;
use anyhow::Context;
use dama_core::Position;
use dama_mcts::{get_policy, root_create, search, tree_depth, Arena, TranspositionTable};
use dama_nn::DenseNet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// 256 MB of tree is plenty for interactive analysis.
const ARENA_BYTES: usize = 256 << 20;

pub struct AnalyzeArgs {
    pub fen: Option<String>,
    pub preset: String,
    pub time: f64,
    pub nodes: u32,
    pub threads: usize,
    pub seed: Option<u64>,
    pub net: Option<PathBuf>,
    pub json: bool,
}

pub fn run(args: AnalyzeArgs) -> anyhow::Result<()> {
    let position = match &args.fen {
        Some(fen) => Position::from_fen(fen).context("bad --fen")?,
        None => Position::initial(),
    };

    let mut config = preset_config(&args.preset)?;
    config.num_threads = args.threads;
    config.max_nodes = args.nodes;
    config.seed = args.seed;
    config.verbose = true;
    if let Some(path) = &args.net {
        let net = DenseNet::load(path).context("cannot load --net weights")?;
        config.evaluator = Some(Arc::new(net));
    }

    let arena = Arena::new(ARENA_BYTES);
    let tt = config.use_tt.then(|| TranspositionTable::new(20));
    let root = root_create(&position, &arena, &config)?;

    let started = Instant::now();
    let outcome = search(root, &arena, args.time, &config, tt.as_ref());
    let elapsed = started.elapsed();

    if args.json {
        let children: Vec<_> = root
            .children()
            .map(|child| {
                serde_json::json!({
                    "move": child.move_from_parent().to_string(),
                    "visits": child.visits(),
                    "mean": child.mean_score(),
                    "prior": child.prior(),
                    "status": format!("{:?}", child.status()),
                })
            })
            .collect();
        let report = serde_json::json!({
            "position": position.to_fen(),
            "best_move": outcome.best_move.to_string(),
            "visits": root.visits(),
            "iterations": outcome.stats.iterations,
            "rollouts": outcome.stats.rollouts,
            "tree_depth": tree_depth(root),
            "elapsed_ms": elapsed.as_millis() as u64,
            "arena_used": arena.used(),
            "children": children,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{position}");
    println!(
        "best {}   visits {}   depth {}   {:.0} iter/s",
        outcome.best_move,
        root.visits(),
        tree_depth(root),
        outcome.stats.iterations as f64 / elapsed.as_secs_f64().max(1e-9),
    );

    let mut children: Vec<_> = root.children().collect();
    children.sort_by_key(|c| std::cmp::Reverse(c.visits()));
    let policy = get_policy(root, 1.0, &position);
    for child in children.iter().take(10) {
        let index = dama_core::move_to_action_index(child.move_from_parent(), position.side_to_move());
        let pi = index.map_or(0.0, |i| policy[i]);
        println!(
            "  {:>12}  visits {:>7}  mean {:.3}  prior {:.3}  pi {:.3}  {:?}",
            child.move_from_parent().to_string(),
            child.visits(),
            child.mean_score(),
            child.prior(),
            pi,
            child.status(),
        );
    }
    if outcome.stats.arena_full {
        println!("  (search stopped early: arena exhausted)");
    }
    Ok(())
}
