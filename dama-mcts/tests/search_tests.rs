//! End-to-end search scenarios on constructed positions.

use dama_core::{Color, Position};
use dama_mcts::{
    get_policy, root_create, search, Arena, MctsConfig, Node, SolverStatus, TranspositionTable,
};
use dama_nn::{EvalOutput, EvalQuery, Evaluator};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn arena() -> Arena {
    Arena::new(64 << 20)
}

/// Walk the finished tree checking the quiesced-search invariants:
/// no outstanding virtual loss, child visits bounded by the parent's,
/// proven statuses consistent with the minimax relation.
fn check_tree_invariants(node: &Node) {
    assert_eq!(node.virtual_loss(), 0, "virtual loss must drain to zero");
    let child_sum: u64 = node.children().map(|c| u64::from(c.visits())).sum();
    assert!(
        u64::from(node.visits()) >= child_sum,
        "parent visits {} < children sum {}",
        node.visits(),
        child_sum
    );
    let (score, sum_sq) = node.score_snapshot();
    let visits = f64::from(node.visits());
    if visits >= 1.0 && score >= 0.0 {
        assert!(sum_sq + 1e-6 >= score * score / visits, "Cauchy-Schwarz violated");
    }
    match node.status() {
        SolverStatus::ProvenWin if !node.is_terminal() => {
            assert!(
                node.children().any(|c| c.status() == SolverStatus::ProvenLoss),
                "a proven win needs a losing child"
            );
        }
        SolverStatus::ProvenLoss if !node.is_terminal() => {
            assert!(!node.has_untried_moves());
            assert!(node.children().all(|c| c.status() == SolverStatus::ProvenWin));
        }
        _ => {}
    }
    for child in node.children() {
        check_tree_invariants(child);
    }
}

#[test]
fn test_single_forced_win() {
    // White's one legal move is the mandatory jump that removes Black's
    // last piece.
    let pos = Position::from_setup(&[13], &[], &[17], &[], Color::White);
    for config in [
        MctsConfig::pure_vanilla(),
        MctsConfig::vanilla(),
        MctsConfig::alpha_zero(),
    ] {
        let arena = arena();
        let config = config.with_max_nodes(50).with_seed(7);
        let root = root_create(&pos, &arena, &config).unwrap();
        let outcome = search(root, &arena, 0.1, &config, None);

        assert!(root.visits() >= 1);
        assert_eq!(outcome.best_move.from_square(), 13);
        assert_eq!(outcome.best_move.to_square(), 20);
        assert_eq!(outcome.best_move.captured(), &[17]);

        if config.use_solver {
            let child = root.child(0);
            assert_eq!(child.status(), SolverStatus::ProvenLoss);
            assert_eq!(root.status(), SolverStatus::ProvenWin);
        }
        check_tree_invariants(root);
    }
}

#[test]
fn test_forced_loss_propagation() {
    // Whatever White plays from 9, Black's mandatory reply captures the
    // lone white man: a two-ply mate against the mover.
    let pos = Position::from_setup(&[9], &[], &[16, 17], &[], Color::White);
    let arena = arena();
    let config = MctsConfig::pure_vanilla()
        .with_solver(true)
        .with_max_nodes(2000)
        .with_seed(3);
    let root = root_create(&pos, &arena, &config).unwrap();
    let outcome = search(root, &arena, 0.0, &config, None);

    assert!(!outcome.best_move.is_null());
    assert_eq!(root.status(), SolverStatus::ProvenLoss);
    assert_eq!(root.num_children(), 2);
    for child in root.children() {
        assert_eq!(child.status(), SolverStatus::ProvenWin);
    }
    check_tree_invariants(root);
}

/// Every node whose hash repeats an ancestor's must be a terminal draw.
fn assert_repetitions_are_draws(node: &Node, ancestors: &mut Vec<u64>, found: &mut u32) {
    if ancestors.contains(&node.position().hash()) {
        assert!(node.is_terminal());
        assert_eq!(node.status(), SolverStatus::ProvenDraw);
        assert!(node.heuristic_score() < -10_000.0);
        *found += 1;
        return; // terminal: no children below
    }
    ancestors.push(node.position().hash());
    for child in node.children() {
        assert_repetitions_are_draws(child, ancestors, found);
    }
    ancestors.pop();
}

#[test]
fn test_repetition_draw_detection() {
    // Two lone ladies can only shuffle; four-ply cycles are everywhere.
    let pos = Position::from_setup(&[], &[0], &[], &[31], Color::White);
    let arena = arena();
    let mut config = MctsConfig::pure_vanilla()
        .with_solver(true)
        .with_max_nodes(1500)
        .with_seed(11);
    config.use_fast_rollout = true;
    let root = root_create(&pos, &arena, &config).unwrap();
    search(root, &arena, 0.0, &config, None);

    let mut found = 0;
    assert_repetitions_are_draws(root, &mut Vec::new(), &mut found);
    assert!(found > 0, "search this deep must hit a repetition");
    check_tree_invariants(root);
}

#[test]
fn test_temperature_behavior() {
    let arena = arena();
    let mut config = MctsConfig::pure_vanilla().with_max_nodes(2000).with_seed(5);
    config.use_fast_rollout = true;
    let pos = Position::initial();
    let root = root_create(&pos, &arena, &config).unwrap();
    search(root, &arena, 0.0, &config, None);

    // τ = 1: entropy strictly positive (more than one move sampled).
    let policy = get_policy(root, 1.0, &pos);
    let entropy: f32 = policy
        .iter()
        .filter(|&&p| p > 0.0)
        .map(|&p| -p * p.ln())
        .sum();
    assert!(entropy > 0.0);

    // τ -> 0: one-hot on the most-visited child.
    let sharp = get_policy(root, 1e-4, &pos);
    assert_eq!(sharp.iter().filter(|&&p| p == 1.0).count(), 1);
    assert_eq!(sharp.iter().filter(|&&p| p > 0.0).count(), 1);

    // Repeated extraction on a quiescent tree is bit-identical.
    assert_eq!(policy, get_policy(root, 1.0, &pos));
}

#[test]
fn test_determinism_single_threaded() {
    let pos = Position::initial();
    let run = || {
        let arena = arena();
        let mut config = MctsConfig::pure_vanilla().with_max_nodes(1000).with_seed(42);
        config.use_fast_rollout = true;
        let root = root_create(&pos, &arena, &config).unwrap();
        let outcome = search(root, &arena, 0.0, &config, None);
        let visits: Vec<(String, u32)> = root
            .children()
            .map(|c| (c.move_from_parent().to_string(), c.visits()))
            .collect();
        (outcome.best_move, visits)
    };
    let (best_a, visits_a) = run();
    let (best_b, visits_b) = run();
    assert_eq!(best_a, best_b);
    assert_eq!(visits_a, visits_b);
}

struct RecordingEvaluator {
    batch_sizes: Mutex<Vec<usize>>,
}

impl RecordingEvaluator {
    fn new() -> Self {
        Self {
            batch_sizes: Mutex::new(Vec::new()),
        }
    }
}

impl Evaluator for RecordingEvaluator {
    fn evaluate(&self, _query: &EvalQuery) -> EvalOutput {
        EvalOutput::neutral()
    }

    fn evaluate_batch(&self, queries: &[EvalQuery]) -> Vec<EvalOutput> {
        self.batch_sizes.lock().unwrap().push(queries.len());
        queries.iter().map(|_| EvalOutput::neutral()).collect()
    }
}

#[test]
fn test_inference_batching_liveness() {
    let evaluator = Arc::new(RecordingEvaluator::new());
    let config = MctsConfig::alpha_zero()
        .with_evaluator(evaluator.clone())
        .with_threads(8)
        .with_max_nodes(5000);
    let arena = arena();
    let pos = Position::initial();
    let root = root_create(&pos, &arena, &config).unwrap();
    let outcome = search(root, &arena, 30.0, &config, None);

    let sizes = evaluator.batch_sizes.lock().unwrap();
    assert!(!sizes.is_empty());
    let mean = sizes.iter().sum::<usize>() as f64 / sizes.len() as f64;
    assert!(mean >= 2.0, "mean batch size {mean} too small");
    assert!(
        outcome.stats.max_inference_wait < Duration::from_millis(10),
        "a worker waited {:?} on one inference",
        outcome.stats.max_inference_wait
    );
    assert!(!outcome.best_move.is_null());
    check_tree_invariants(root);
}

#[test]
fn test_node_budget_bounds_search() {
    let arena = arena();
    let mut config = MctsConfig::pure_vanilla().with_max_nodes(200).with_seed(1);
    config.use_fast_rollout = true;
    let pos = Position::initial();
    let root = root_create(&pos, &arena, &config).unwrap();
    let outcome = search(root, &arena, 0.0, &config, None);
    // Sequential mode checks the budget before every iteration; early
    // exit may stop sooner once a move is mathematically decided.
    assert!(root.visits() <= 200);
    assert!(root.visits() >= 40);
    assert!(!outcome.best_move.is_null());
}

#[test]
fn test_time_budget_bounds_search() {
    let arena = arena();
    let mut config = MctsConfig::pure_vanilla().with_seed(2);
    config.use_fast_rollout = true;
    let pos = Position::initial();
    let root = root_create(&pos, &arena, &config).unwrap();
    let started = std::time::Instant::now();
    let outcome = search(root, &arena, 0.2, &config, None);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!outcome.best_move.is_null());
    assert!(root.visits() > 0);
}

#[test]
fn test_no_legal_moves_returns_null_move() {
    // White's lone man on 0 is boxed in: the step square and the jump
    // landing square are both occupied.
    let pos = Position::from_setup(&[0], &[], &[4, 9], &[], Color::White);
    let arena = arena();
    let config = MctsConfig::pure_vanilla().with_max_nodes(100);
    let root = root_create(&pos, &arena, &config).unwrap();
    assert!(root.is_terminal());
    let outcome = search(root, &arena, 0.1, &config, None);
    assert!(outcome.best_move.is_null());
    assert!(outcome.new_root.is_none());
}

#[test]
fn test_parallel_workers_leave_consistent_tree() {
    let arena = arena();
    let mut config = MctsConfig::vanilla()
        .with_threads(4)
        .with_max_nodes(3000)
        .with_seed(9);
    config.use_fast_rollout = true;
    let pos = Position::initial();
    let root = root_create(&pos, &arena, &config).unwrap();
    let outcome = search(root, &arena, 10.0, &config, None);

    assert!(!outcome.best_move.is_null());
    check_tree_invariants(root);

    // find_child_by_move round-trips every child.
    for i in 0..root.num_children() {
        let child = root.child(i);
        let found = root.find_child_by_move(child.move_from_parent()).unwrap();
        assert!(std::ptr::eq(found, child));
    }
}

#[test]
fn test_tree_reuse_hands_back_best_child() {
    let arena = arena();
    let mut config = MctsConfig::vanilla().with_max_nodes(300).with_seed(4);
    config.use_fast_rollout = true;
    let pos = Position::initial();
    let root = root_create(&pos, &arena, &config).unwrap();
    let outcome = search(root, &arena, 0.0, &config, None);

    let new_root = outcome.new_root.expect("tree reuse is on");
    assert!(new_root.move_from_parent().same_path(&outcome.best_move));
    assert!(new_root.visits() > 0);
}

#[test]
fn test_tt_warm_start_across_searches() {
    let arena = arena();
    let tt = TranspositionTable::new(14);
    let mut config = MctsConfig::pure_vanilla()
        .with_tt(true)
        .with_max_nodes(400)
        .with_seed(6);
    config.use_fast_rollout = true;
    let pos = Position::initial();

    let root_a = root_create(&pos, &arena, &config).unwrap();
    search(root_a, &arena, 0.0, &config, Some(&tt));

    // A second search over the same ground warm-starts from the table:
    // its very first expansions are hits.
    let root_b = root_create(&pos, &arena, &config).unwrap();
    let second = search(root_b, &arena, 0.0, &config, Some(&tt));
    assert!(second.stats.tt_hits > 0);
    assert!(tt.hits() > 0);
}

#[test]
fn test_grandmaster_preset_with_evaluator() {
    let evaluator = Arc::new(dama_nn::UniformEvaluator);
    let config = MctsConfig::grandmaster()
        .with_evaluator(evaluator)
        .with_max_nodes(500)
        .with_seed(13);
    let arena = arena();
    let tt = TranspositionTable::new(12);
    let pos = Position::initial();
    let root = root_create(&pos, &arena, &config).unwrap();
    let outcome = search(root, &arena, 5.0, &config, Some(&tt));
    assert!(!outcome.best_move.is_null());
    assert!(root.visits() > 0);
    // No tree-invariant sweep here: warm-started children legitimately
    // carry more visits than their fresh parent has accumulated.
}
