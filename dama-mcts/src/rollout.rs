//! Rollout simulation: bounded epsilon-greedy playouts.
//!
//! Used only when no evaluator is configured. Returns a reward in [0, 1]
//! from the perspective of the player who just moved into the start
//! position (the leaf's perspective in the search).

use crate::config::{MctsConfig, RolloutWeights};
use crate::{LOSS_SCORE, WIN_SCORE};
use dama_core::board::{BASE_MASK, PROMOTION_MASK};
use dama_core::{advancement, bit, Move, MoveList, Position, CENTER_MASK, EDGE_MASK};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Hard cap on playout length, whatever the configuration says.
pub const MAX_ROLLOUT_DEPTH: u32 = 200;

/// Penalty for a quiet move the opponent can answer with a capture.
const WEIGHT_DANGER: f32 = 500.0;

/// Danger lookahead only fires once the board thins out.
const ENDGAME_PIECES: u32 = 12;

/// Fast-rollout material check cadence and margin.
const FAST_CHECK_INTERVAL: u32 = 5;
const FAST_EXIT_MARGIN: i32 = 3;
const FAST_WIN_SCORE: f64 = 0.85;
const FAST_LOSS_SCORE: f64 = 0.15;

/// Play out from `start` and return the reward for the player who just
/// moved there.
pub(crate) fn simulate(start: &Position, config: &MctsConfig, rng: &mut ChaCha8Rng) -> f64 {
    let perspective = start.side_to_move().opponent();
    let mut pos = *start;
    let max_depth = if config.use_fast_rollout {
        config.fast_rollout_depth.min(MAX_ROLLOUT_DEPTH)
    } else {
        MAX_ROLLOUT_DEPTH
    };

    let mut depth: u32 = 0;
    loop {
        // Being stuck outranks the quiet-ply clock: a side with no moves
        // has lost even if the draw threshold is reached the same ply.
        let moves = pos.legal_moves();
        if moves.is_empty() {
            let mut reward = if pos.side_to_move() == perspective {
                LOSS_SCORE
            } else {
                WIN_SCORE
            };
            if config.use_decaying_reward {
                reward *= config.decay_factor.powi(depth as i32);
            }
            return reward;
        }
        if pos.is_quiet_draw() {
            return config.draw_score;
        }

        if config.use_fast_rollout && depth > 0 && depth % FAST_CHECK_INTERVAL == 0 {
            let diff = pos.material_diff(perspective);
            if diff.abs() >= FAST_EXIT_MARGIN {
                return if diff > 0 { FAST_WIN_SCORE } else { FAST_LOSS_SCORE };
            }
        }

        if depth >= max_depth {
            if config.use_fast_rollout {
                let diff = pos.material_diff(perspective) as f64;
                return (0.5 + 0.05 * diff).clamp(0.1, 0.9);
            }
            return config.draw_score;
        }

        let mv = if rng.gen::<f64>() < config.rollout_epsilon {
            moves[rng.gen_range(0..moves.len())]
        } else {
            greedy_move(&pos, &moves, config)
        };
        pos.apply_move(&mv);
        depth += 1;
    }
}

/// The heuristically best move: captures dominate, then the static move
/// score, then the danger penalty for walking into a reply capture.
fn greedy_move(pos: &Position, moves: &MoveList, config: &MctsConfig) -> Move {
    let check_danger = config.use_lookahead && pos.piece_count() < ENDGAME_PIECES;
    let mut best = moves[0];
    let mut best_score = f32::NEG_INFINITY;
    for mv in moves {
        let mut score =
            1000.0 * mv.captured().len() as f32 + move_heuristic(pos, mv, &config.weights);
        if check_danger && !mv.is_capture() {
            let mut next = *pos;
            next.apply_move(mv);
            if reply_has_capture(&next) {
                score -= WEIGHT_DANGER;
            }
        }
        if score > best_score {
            best_score = score;
            best = *mv;
        }
    }
    best
}

/// Captures are mandatory, so the reply list is all captures or none.
fn reply_has_capture(pos: &Position) -> bool {
    pos.legal_moves()
        .as_slice()
        .first()
        .map_or(false, |m| m.is_capture())
}

/// Static score of a move, before it is played. Shared between rollouts
/// and the per-node heuristic used by progressive bias.
pub(crate) fn move_heuristic(pos: &Position, mv: &Move, weights: &RolloutWeights) -> f32 {
    let us = pos.side_to_move();
    let from = mv.from_square();
    let to = mv.to_square();

    let mut score = weights.w_capture * mv.captured().len() as f32;
    if !mv.is_lady_move && PROMOTION_MASK[us.index()] & bit(to) != 0 {
        score += weights.w_promotion;
    }
    score += weights.w_advance * (advancement(us, to) as f32 - advancement(us, from) as f32);
    if !mv.is_lady_move && EDGE_MASK & bit(to) != 0 {
        score += weights.w_edge;
    }
    if CENTER_MASK & bit(to) != 0 {
        score += weights.w_center;
    }
    if BASE_MASK[us.index()] & bit(from) != 0 {
        score -= weights.w_base;
    }
    if mv.is_lady_move {
        score += weights.w_lady_activity;
    }
    score
}
