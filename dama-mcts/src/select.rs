//! Selection: descend from the root to a leaf worth expanding.
//!
//! One scoring function composes UCB1, UCB1-Tuned and PUCT with first-play
//! urgency, progressive bias and the solver overrides, switched on
//! configuration flags. Every descent step bumps the chosen child's
//! virtual loss so concurrent workers fan out over different lines.

use crate::config::MctsConfig;
use crate::node::{Node, SolverStatus};

/// Score margin that makes proven children dominate every sampled score:
/// proven losses (for the opponent) are forced, proven wins shunned.
const PROVEN_SCORE: f64 = 1e5;

/// Walk down while the current node is non-terminal, fully expanded and
/// has at least one child. Returns the leaf and the descent depth.
pub(crate) fn select_leaf<'a>(root: &'a Node, config: &MctsConfig) -> (&'a Node, u32) {
    let mut node = root;
    let mut depth = 0;
    loop {
        if node.is_terminal() || node.has_untried_moves() {
            return (node, depth);
        }
        let num_children = node.num_children();
        if num_children == 0 {
            // Racing another worker's expansion; treat as a leaf.
            return (node, depth);
        }

        // A proven win means some child is a proven loss for the opponent:
        // take it outright.
        if config.use_solver && node.status() == SolverStatus::ProvenWin {
            if let Some(child) = node
                .children()
                .find(|c| c.status() == SolverStatus::ProvenLoss)
            {
                child.add_virtual_loss();
                node = child;
                depth += 1;
                continue;
            }
        }

        let parent_visits = node.visits().max(1);
        let ln_parent = f64::from(parent_visits).ln();
        let mut best: Option<&Node> = None;
        let mut best_score = f64::NEG_INFINITY;
        for child in node.children() {
            let score = child_score(child, config, parent_visits, ln_parent);
            // Strict comparison keeps ties stable on the first-seen child.
            if score > best_score {
                best_score = score;
                best = Some(child);
            }
        }

        match best {
            Some(child) => {
                child.add_virtual_loss();
                node = child;
                depth += 1;
            }
            None => return (node, depth),
        }
    }
}

/// Selection score of `child` from the parent's point of view.
pub(crate) fn child_score(
    child: &Node,
    config: &MctsConfig,
    parent_visits: u32,
    ln_parent: f64,
) -> f64 {
    if config.use_solver {
        match child.status() {
            // The opponent wins there: avoid.
            SolverStatus::ProvenWin => return -PROVEN_SCORE,
            // The opponent loses there: prefer, tie-break on score mass.
            SolverStatus::ProvenLoss => {
                return PROVEN_SCORE + child.score_snapshot().0;
            }
            _ => {}
        }
    }

    let visits = f64::from(child.visits());
    let virtual_loss = f64::from(child.virtual_loss().max(0));

    if config.use_puct {
        return puct_score(child, config, parent_visits, visits, virtual_loss);
    }

    // UCB family. In-flight traversals count as losses so parallel
    // workers spread out.
    let effective = visits + virtual_loss;
    if effective < 1.0 {
        let urgency = if config.use_fpu {
            config.fpu_value
        } else {
            f64::INFINITY
        };
        return urgency + progressive_bias(child, config, visits);
    }

    let (score_sum, sum_sq) = child.score_snapshot();
    let mean = (score_sum - virtual_loss) / effective;
    let explore = if config.use_ucb1_tuned {
        // Variance-adjusted exploration, capped at 1/4 (Bernoulli bound).
        let variance = if visits >= 1.0 {
            (sum_sq / visits - (score_sum / visits).powi(2)).max(0.0)
        } else {
            0.0
        };
        let v = variance + (2.0 * ln_parent / effective).sqrt();
        ((ln_parent / effective) * v.min(0.25)).sqrt()
    } else {
        config.ucb1_c * (ln_parent / effective).sqrt()
    };

    mean + explore + progressive_bias(child, config, visits)
}

fn puct_score(
    child: &Node,
    config: &MctsConfig,
    parent_visits: u32,
    visits: f64,
    virtual_loss: f64,
) -> f64 {
    let (score_sum, _) = child.score_snapshot();
    let effective = visits + virtual_loss;
    let q = if effective < 1.0 {
        score_sum
    } else {
        (score_sum - virtual_loss) / effective
    };
    // Absent an evaluator, priors were created as 1.0 and PUCT degrades
    // toward a visit-count exploration term.
    let u = config.puct_c * f64::from(child.prior()) * f64::from(parent_visits).sqrt()
        / (1.0 + effective);
    q + u + progressive_bias(child, config, visits)
}

fn progressive_bias(child: &Node, config: &MctsConfig, visits: f64) -> f64 {
    if !config.use_progressive_bias {
        return 0.0;
    }
    config.bias_constant * f64::from(child.heuristic_score()) / (visits + 1.0)
}
