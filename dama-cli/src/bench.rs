//! Fixed-node throughput benchmark.

use dama_core::Position;
use dama_mcts::{root_create, search, Arena, MctsConfig};
use std::time::Instant;

const ARENA_BYTES: usize = 256 << 20;

/// Position suite: opening, a tactical middlegame, a lady endgame.
const SUITE: [(&str, Option<&str>); 3] = [
    ("opening", None),
    ("middlegame", Some("W:W9,10,11,14,18,22:B13,17,25,26,27,30")),
    ("endgame", Some("B:WK5,K14:B31,K27")),
];

pub fn run(nodes: u32, threads: usize) -> anyhow::Result<()> {
    let mut config = MctsConfig::vanilla();
    config.max_nodes = nodes;
    config.num_threads = threads;
    config.use_fast_rollout = true;
    config.seed = Some(0xDA17A);

    let mut total_iterations = 0u64;
    let mut total_secs = 0f64;
    for (name, fen) in SUITE {
        let position = match fen {
            Some(fen) => Position::from_fen(fen)?,
            None => Position::initial(),
        };
        let arena = Arena::new(ARENA_BYTES);
        let root = root_create(&position, &arena, &config)?;
        let started = Instant::now();
        let outcome = search(root, &arena, 0.0, &config, None);
        let secs = started.elapsed().as_secs_f64();
        println!(
            "{name:>12}: {:>8} iters in {:.2}s ({:>9.0} iters/s)  best {}",
            outcome.stats.iterations,
            secs,
            outcome.stats.iterations as f64 / secs.max(1e-9),
            outcome.best_move,
        );
        total_iterations += outcome.stats.iterations;
        total_secs += secs;
    }
    println!(
        "{:>12}: {:>8} iters in {:.2}s ({:>9.0} iters/s)",
        "total",
        total_iterations,
        total_secs,
        total_iterations as f64 / total_secs.max(1e-9),
    );
    Ok(())
}
