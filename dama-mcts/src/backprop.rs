//! Backpropagation: leaf-to-root statistics updates and the solver.
//!
//! Each level reverts one virtual loss, records the visit, folds the
//! result into the locked accumulators and flips the perspective. Solver
//! status only moves when the step below it is proven (or we start at the
//! leaf), so proofs percolate upward exactly as far as they hold.

use crate::node::{Node, SolverStatus};

/// Propagate `result` (from the leaf's perspective) up to the root.
pub(crate) fn backpropagate(leaf: &Node, mut result: f64, use_solver: bool) {
    let mut current = Some(leaf);
    let mut from_child: Option<&Node> = None;
    while let Some(node) = current {
        node.revert_virtual_loss();
        node.record_visit();
        {
            let mut guarded = node.guarded();
            guarded.score += result;
            guarded.sum_sq_score += result * result;
        }
        if use_solver && from_child.map_or(true, Node::is_proven) {
            update_solver_status(node);
        }
        result = 1.0 - result;
        from_child = Some(node);
        current = node.parent();
    }
}

/// Abort an in-flight iteration: give back the virtual losses taken
/// during descent without recording a visit anywhere.
pub(crate) fn unwind_virtual_loss(leaf: &Node) {
    let mut current = Some(leaf);
    while let Some(node) = current {
        node.revert_virtual_loss();
        current = node.parent();
    }
}

/// Minimax over proven children:
/// - any child lost for the opponent proves this node won;
/// - a fully expanded node with every child won for the opponent is lost.
///
/// Draws never propagate upward; they only arise at terminal leaves.
pub(crate) fn update_solver_status(node: &Node) {
    if node.is_proven() {
        return;
    }
    let mut any_child = false;
    let mut all_proven_win = true;
    for child in node.children() {
        any_child = true;
        match child.status() {
            SolverStatus::ProvenLoss => {
                node.try_prove(SolverStatus::ProvenWin);
                return;
            }
            SolverStatus::ProvenWin => {}
            SolverStatus::ProvenDraw | SolverStatus::Unknown => all_proven_win = false,
        }
    }
    if any_child && all_proven_win && !node.has_untried_moves() {
        node.try_prove(SolverStatus::ProvenLoss);
    }
}
