//! Engine-vs-engine series between two presets.

use crate::preset_config;
use dama_core::{Color, Position};
use dama_mcts::{root_create, search, Arena, MctsConfig};
use rayon::prelude::*;
use tracing::info;

const ARENA_BYTES: usize = 64 << 20;

pub struct MatchArgs {
    pub white: String,
    pub black: String,
    pub games: usize,
    pub time: f64,
    pub max_plies: u32,
    pub parallel: bool,
    pub seed: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Outcome {
    WhiteWins,
    BlackWins,
    Draw,
}

pub fn run(args: MatchArgs) -> anyhow::Result<()> {
    let white_config = preset_config(&args.white)?;
    let black_config = preset_config(&args.black)?;
    let base_seed = args.seed.unwrap_or_else(rand::random);

    let play = |game: usize| -> Outcome {
        // Alternate colors so neither preset owns the first move.
        let (w, b) = if game % 2 == 0 {
            (&white_config, &black_config)
        } else {
            (&black_config, &white_config)
        };
        let outcome = play_game(
            w,
            b,
            args.time,
            args.max_plies,
            base_seed.wrapping_add(game as u64),
        );
        info!(game, ?outcome, "finished");
        if game % 2 == 0 {
            outcome
        } else {
            match outcome {
                Outcome::WhiteWins => Outcome::BlackWins,
                Outcome::BlackWins => Outcome::WhiteWins,
                Outcome::Draw => Outcome::Draw,
            }
        }
    };

    let outcomes: Vec<Outcome> = if args.parallel {
        (0..args.games).into_par_iter().map(play).collect()
    } else {
        (0..args.games).map(play).collect()
    };

    let wins = outcomes.iter().filter(|&&o| o == Outcome::WhiteWins).count();
    let losses = outcomes.iter().filter(|&&o| o == Outcome::BlackWins).count();
    let draws = outcomes.len() - wins - losses;
    println!(
        "{} vs {}: +{wins} ={draws} -{losses} ({} games)",
        args.white,
        args.black,
        outcomes.len()
    );
    Ok(())
}

/// Play one game; the result is from the true White's point of view.
fn play_game(
    white: &MctsConfig,
    black: &MctsConfig,
    time_per_move: f64,
    max_plies: u32,
    seed: u64,
) -> Outcome {
    let mut position = Position::initial();
    for ply in 0..max_plies {
        if position.is_quiet_draw() {
            return Outcome::Draw;
        }
        if position.legal_moves().is_empty() {
            return loser_is(position.side_to_move());
        }

        let config = match position.side_to_move() {
            Color::White => white,
            Color::Black => black,
        };
        let config = config.clone().with_seed(seed.wrapping_add(u64::from(ply)));

        let arena = Arena::new(ARENA_BYTES);
        let root = match root_create(&position, &arena, &config) {
            Ok(root) => root,
            Err(_) => return Outcome::Draw,
        };
        let outcome = search(root, &arena, time_per_move, &config, None);
        if outcome.best_move.is_null() {
            return loser_is(position.side_to_move());
        }
        position.apply_move(&outcome.best_move);
    }
    Outcome::Draw
}

fn loser_is(side: Color) -> Outcome {
    match side {
        Color::White => Outcome::BlackWins,
        Color::Black => Outcome::WhiteWins,
    }
}
