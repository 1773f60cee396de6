//! Expansion: grow the tree at a selected leaf.
//!
//! Two strategies, keyed on whether an evaluator feeds priors:
//! - vanilla: pop one untried move (LIFO) and append a single child;
//! - full: create a child per legal move and publish them in one shot,
//!   priors from the evaluator's policy filtered over the legal moves.
//!
//! Either way a transposition hit warm-starts the fresh child's
//! statistics, then the table is repointed at the new node (sharing the
//! entry would give it two parents).

use crate::arena::Arena;
use crate::config::MctsConfig;
use crate::node::{Node, PolicyVec};
use crate::rollout::move_heuristic;
use crate::search::SearchStats;
use crate::tt::TranspositionTable;
use crate::SearchError;
use dama_core::{move_to_action_index, Move, Position, POLICY_SIZE};
use dama_nn::EvalOutput;

/// Policy mass below this falls back to uniform priors.
const POLICY_SUM_FLOOR: f32 = 1e-6;

/// Pop one untried move and append the resulting child. `Ok(None)` means
/// another worker emptied the list first. `policy`, when present, is the
/// parent's cached dense policy (already filtered and normalized).
pub(crate) fn expand_vanilla<'a>(
    leaf: &'a Node,
    arena: &'a Arena,
    config: &MctsConfig,
    tt: Option<&TranspositionTable>,
    policy: Option<&PolicyVec>,
    stats: &mut SearchStats,
) -> Result<Option<&'a Node>, SearchError> {
    let mv = {
        let mut guarded = leaf.guarded();
        match guarded.untried.pop() {
            Some(mv) => {
                let remaining = guarded.untried.len();
                leaf.publish_untried_count(remaining);
                mv
            }
            None => return Ok(None),
        }
    };

    let side = leaf.position().side_to_move();
    let prior = policy
        .and_then(|p| move_to_action_index(&mv, side).map(|i| p[i]))
        .unwrap_or(1.0);
    let child = create_child(leaf, arena, config, tt, &mv, prior, stats)?;

    let _guard = leaf.guarded();
    // A racing full expansion may have covered this move already; a node
    // must never hold the same child twice.
    if let Some(existing) = leaf.find_child_by_move(&mv) {
        return Ok(Some(existing));
    }
    leaf.append_child(child);
    Ok(Some(child))
}

/// One-shot full expansion with evaluator priors. A no-op when another
/// worker already expanded the leaf. Children are created without the
/// leaf lock (TT warm-starts take other nodes' locks, and holding two
/// node locks at once invites an ordering deadlock); the slot writes,
/// the untried clear and the count publication happen under it, count
/// last behind a release fence.
pub(crate) fn expand_full(
    leaf: &Node,
    arena: &Arena,
    config: &MctsConfig,
    tt: Option<&TranspositionTable>,
    output: &EvalOutput,
    stats: &mut SearchStats,
) -> Result<(), SearchError> {
    let legal = {
        let guarded = leaf.guarded();
        if leaf.num_children() > 0 || leaf.is_terminal() {
            return Ok(());
        }
        guarded.untried
    };

    let priors = filtered_priors(leaf.position(), legal.as_slice(), &output.policy);
    let mut children = Vec::with_capacity(legal.len());
    for (mv, prior) in legal.as_slice().iter().zip(priors) {
        children.push(create_child(leaf, arena, config, tt, mv, prior, stats)?);
    }

    let mut guarded = leaf.guarded();
    if leaf.num_children() > 0 {
        // Lost the race; the duplicates stay unreferenced in the arena.
        return Ok(());
    }
    for (index, child) in children.iter().enumerate() {
        leaf.set_child_slot(index, child);
    }
    guarded.untried.clear();
    leaf.publish_untried_count(0);
    leaf.publish_children(children.len());
    Ok(())
}

/// Normalize the evaluator's dense policy over `leaf`'s legal moves,
/// scatter it back to action indices, and stash it (with the value) in
/// the arena for later single-child expansions. Returns the cached pair.
pub(crate) fn cache_policy(
    leaf: &Node,
    arena: &Arena,
    output: &EvalOutput,
) -> Result<(PolicyVec, f32), SearchError> {
    let mut guarded = leaf.guarded();
    if let Some(ptr) = guarded.cached_policy {
        return Ok((unsafe { *ptr }, guarded.cached_value));
    }

    let legal = guarded.untried;
    let side = leaf.position().side_to_move();
    let priors = filtered_priors(leaf.position(), legal.as_slice(), &output.policy);
    let mut dense = [0.0f32; POLICY_SIZE];
    for (mv, prior) in legal.as_slice().iter().zip(priors) {
        if let Some(index) = move_to_action_index(mv, side) {
            dense[index] += prior;
        }
    }

    let stored = arena.alloc(dense)?;
    guarded.cached_policy = Some(stored as *const PolicyVec);
    guarded.cached_value = output.value;
    Ok((dense, output.value))
}

fn create_child<'a>(
    parent: &Node,
    arena: &'a Arena,
    config: &MctsConfig,
    tt: Option<&TranspositionTable>,
    mv: &Move,
    prior: f32,
    stats: &mut SearchStats,
) -> Result<&'a Node, SearchError> {
    let mut heuristic = move_heuristic(parent.position(), mv, &config.weights);
    let mut position = *parent.position();
    position.apply_move(mv);
    if position.is_square_threatened(mv.to_square()) {
        heuristic -= config.weights.w_threat;
    }

    let node = arena.alloc(Node::new_child(position, *mv, parent, prior, heuristic))?;
    if config.use_tt {
        if let Some(tt) = tt {
            if let Some(entry) = tt.lookup(position.hash(), &position) {
                node.warm_start_from(entry);
                stats.tt_hits += 1;
            }
            tt.insert(node);
        }
    }
    Ok(node)
}

/// Policy mass restricted to the legal moves, normalized; uniform when
/// the evaluator put (numerically) nothing on any of them.
fn filtered_priors(position: &Position, moves: &[Move], policy: &PolicyVec) -> Vec<f32> {
    let side = position.side_to_move();
    let mut priors: Vec<f32> = moves
        .iter()
        .map(|mv| {
            move_to_action_index(mv, side)
                .map(|i| policy[i].max(0.0))
                .unwrap_or(0.0)
        })
        .collect();
    let sum: f32 = priors.iter().sum();
    if sum < POLICY_SUM_FLOOR {
        let uniform = 1.0 / moves.len().max(1) as f32;
        priors.iter_mut().for_each(|p| *p = uniform);
    } else {
        priors.iter_mut().for_each(|p| *p /= sum);
    }
    priors
}
