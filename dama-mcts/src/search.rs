//! Search orchestration: worker pool, inference batching, termination.
//!
//! The caller's thread is the master. Workers run the four-phase loop
//! (select, evaluate, expand, backpropagate) against the shared tree;
//! with an evaluator configured they park their leaf in the inference
//! queue and the master drains it in batches, one forward pass per batch.
//! Without one, the master only watches the clock and the node budget.
//! Shutdown is cooperative: workers observe the stop flag or an aborted
//! inference request, unwind their virtual losses and exit.

use crate::arena::Arena;
use crate::backprop::{backpropagate, unwind_virtual_loss};
use crate::config::MctsConfig;
use crate::expand::{cache_policy, expand_full, expand_vanilla};
use crate::node::{Node, SolverStatus};
use crate::rollout::simulate;
use crate::select::select_leaf;
use crate::tt::TranspositionTable;
use crate::{LOSS_SCORE, WIN_SCORE};
use dama_core::Move;
use dama_nn::{EvalOutput, EvalQuery, Evaluator};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Inference requests per forward pass.
pub const BATCH_SIZE: usize = 16;

/// Early exit only arms past this many root visits, re-checked every 10.
const EARLY_EXIT_MIN_VISITS: u32 = 40;
const EARLY_EXIT_STRIDE: u32 = 10;

/// Counters accumulated per worker and merged at join time.
#[derive(Clone, Debug, Default)]
pub struct SearchStats {
    pub iterations: u64,
    pub rollouts: u64,
    pub tt_hits: u64,
    pub batches: u64,
    pub batched_requests: u64,
    pub max_depth: u32,
    pub arena_full: bool,
    pub max_inference_wait: Duration,
}

impl SearchStats {
    pub fn merge(&mut self, other: &SearchStats) {
        self.iterations += other.iterations;
        self.rollouts += other.rollouts;
        self.tt_hits += other.tt_hits;
        self.batches += other.batches;
        self.batched_requests += other.batched_requests;
        self.max_depth = self.max_depth.max(other.max_depth);
        self.arena_full |= other.arena_full;
        self.max_inference_wait = self.max_inference_wait.max(other.max_inference_wait);
    }

    /// Mean inference batch size over the whole search.
    pub fn mean_batch_size(&self) -> f64 {
        if self.batches == 0 {
            return 0.0;
        }
        self.batched_requests as f64 / self.batches as f64
    }
}

/// Result of [`search`].
pub struct SearchOutcome<'a> {
    /// Robust-child best move; null when the root had no legal moves.
    pub best_move: Move,
    /// The chosen child, when tree reuse is on: hand it back as the next
    /// root after the opponent's reply.
    pub new_root: Option<&'a Node>,
    pub stats: SearchStats,
}

/// Run the search until the wall clock (`time_limit` seconds, ignored when
/// <= 0), the node budget (`config.max_nodes`, ignored when 0) or the
/// early-exit rule ends it. Returns the most-visited root child's move.
pub fn search<'a>(
    root: &'a Node,
    arena: &'a Arena,
    time_limit: f64,
    config: &MctsConfig,
    tt: Option<&TranspositionTable>,
) -> SearchOutcome<'a> {
    let start = Instant::now();
    let mut stats = SearchStats::default();

    if root.is_terminal() {
        debug!("root is terminal ({:?}), nothing to search", root.status());
        return SearchOutcome {
            best_move: Move::null(),
            new_root: None,
            stats,
        };
    }

    let ctx = SearchContext {
        root,
        arena,
        config,
        tt,
        queue: InferenceQueue::new(),
        stop: AtomicBool::new(false),
    };

    if config.num_threads == 0 {
        run_sequential(&ctx, start, time_limit, &mut stats);
    } else {
        run_parallel(&ctx, start, time_limit, &mut stats);
    }

    let best = robust_child(root);
    let best_move = best.map_or_else(Move::null, |c| *c.move_from_parent());
    if config.verbose {
        info!(
            visits = root.visits(),
            iterations = stats.iterations,
            elapsed_ms = start.elapsed().as_millis() as u64,
            best = %best_move,
            status = ?root.status(),
            "search finished"
        );
    }
    SearchOutcome {
        best_move,
        new_root: if config.use_tree_reuse { best } else { None },
        stats,
    }
}

struct SearchContext<'a> {
    root: &'a Node,
    arena: &'a Arena,
    config: &'a MctsConfig,
    tt: Option<&'a TranspositionTable>,
    queue: InferenceQueue,
    stop: AtomicBool,
}

fn run_sequential(ctx: &SearchContext, start: Instant, time_limit: f64, stats: &mut SearchStats) {
    let seed = ctx.config.seed.unwrap_or_else(rand::random);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut last_early_check = 0u32;
    while !ctx.stop.load(Ordering::Relaxed)
        && !should_stop(ctx, start, time_limit, &mut last_early_check)
    {
        run_iteration(ctx, &mut rng, stats, true);
    }
}

fn run_parallel(ctx: &SearchContext, start: Instant, time_limit: f64, stats: &mut SearchStats) {
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..ctx.config.num_threads)
            .map(|worker_id| scope.spawn(move || worker_loop(ctx, worker_id)))
            .collect();
        debug!(workers = handles.len(), "worker pool started");

        let mut last_early_check = 0u32;
        loop {
            if ctx.stop.load(Ordering::Relaxed)
                || should_stop(ctx, start, time_limit, &mut last_early_check)
            {
                break;
            }
            match &ctx.config.evaluator {
                Some(evaluator) => serve_batch(ctx, evaluator.as_ref(), stats),
                None => std::thread::sleep(Duration::from_millis(1)),
            }
        }

        ctx.stop.store(true, Ordering::Relaxed);
        ctx.queue.shutdown();
        for handle in handles {
            stats.merge(&handle.join().expect("search worker panicked"));
        }
    });
}

fn worker_loop(ctx: &SearchContext, worker_id: usize) -> SearchStats {
    let seed = ctx
        .config
        .seed
        .map(|s| s.wrapping_add(worker_id as u64 + 1))
        .unwrap_or_else(rand::random);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut stats = SearchStats::default();
    while !ctx.stop.load(Ordering::Relaxed) {
        run_iteration(ctx, &mut rng, &mut stats, false);
    }
    stats
}

/// One select / evaluate / expand / backpropagate cycle. `direct` skips
/// the queue and calls the evaluator inline (sequential mode).
fn run_iteration(ctx: &SearchContext, rng: &mut ChaCha8Rng, stats: &mut SearchStats, direct: bool) {
    ctx.root.add_virtual_loss();
    let (leaf, depth) = select_leaf(ctx.root, ctx.config);
    stats.max_depth = stats.max_depth.max(depth);

    if leaf.is_terminal() {
        stats.iterations += 1;
        backpropagate(leaf, terminal_result(leaf, ctx.config), ctx.config.use_solver);
        return;
    }

    if ctx.config.evaluator.is_some() {
        evaluated_iteration(ctx, leaf, stats, direct);
    } else {
        rollout_iteration(ctx, leaf, rng, stats);
    }
}

fn evaluated_iteration(ctx: &SearchContext, leaf: &Node, stats: &mut SearchStats, direct: bool) {
    let config = ctx.config;
    if leaf.visits() >= config.expansion_threshold && leaf.num_children() == 0 {
        let output = match infer(ctx, leaf, direct, stats) {
            Some(output) => output,
            None => return unwind_virtual_loss(leaf), // shutdown mid-wait
        };
        if let Err(err) = expand_full(leaf, ctx.arena, config, ctx.tt, &output, stats) {
            on_arena_full(ctx, stats, &err);
            return unwind_virtual_loss(leaf);
        }
        stats.iterations += 1;
        let value = f64::from(output.value + 1.0) / 2.0;
        backpropagate(leaf, 1.0 - value, config.use_solver);
    } else {
        // Below the expansion threshold: one child at a time, priors from
        // the policy cached at this node.
        let cached = leaf.cached_policy_value();
        let (policy, raw_value) = match cached {
            Some(pair) => pair,
            None => {
                let output = match infer(ctx, leaf, direct, stats) {
                    Some(output) => output,
                    None => return unwind_virtual_loss(leaf),
                };
                match cache_policy(leaf, ctx.arena, &output) {
                    Ok(pair) => pair,
                    Err(err) => {
                        on_arena_full(ctx, stats, &err);
                        return unwind_virtual_loss(leaf);
                    }
                }
            }
        };
        if let Err(err) = expand_vanilla(leaf, ctx.arena, config, ctx.tt, Some(&policy), stats) {
            on_arena_full(ctx, stats, &err);
            return unwind_virtual_loss(leaf);
        }
        stats.iterations += 1;
        let value = f64::from(raw_value + 1.0) / 2.0;
        backpropagate(leaf, 1.0 - value, config.use_solver);
    }
}

fn rollout_iteration(ctx: &SearchContext, leaf: &Node, rng: &mut ChaCha8Rng, stats: &mut SearchStats) {
    match expand_vanilla(leaf, ctx.arena, ctx.config, ctx.tt, None, stats) {
        Ok(Some(child)) => {
            child.add_virtual_loss();
            stats.iterations += 1;
            let reward = if child.is_terminal() {
                terminal_result(child, ctx.config)
            } else {
                stats.rollouts += 1;
                simulate(child.position(), ctx.config, rng)
            };
            backpropagate(child, reward, ctx.config.use_solver);
        }
        Ok(None) => {
            // Another worker emptied the untried list between selection
            // and expansion; retreat without recording anything.
            unwind_virtual_loss(leaf);
        }
        Err(err) => {
            on_arena_full(ctx, stats, &err);
            unwind_virtual_loss(leaf);
        }
    }
}

fn infer(ctx: &SearchContext, leaf: &Node, direct: bool, stats: &mut SearchStats) -> Option<EvalOutput> {
    let query = build_query(leaf);
    if direct {
        let evaluator = ctx.config.evaluator.as_ref().expect("checked by caller");
        return Some(evaluator.evaluate(&query));
    }
    let started = Instant::now();
    let output = ctx.queue.request(query);
    stats.max_inference_wait = stats.max_inference_wait.max(started.elapsed());
    output
}

/// Snapshot the leaf state plus up to two plies of history.
fn build_query(leaf: &Node) -> EvalQuery {
    let parent = leaf.parent();
    let grandparent = parent.and_then(Node::parent);
    EvalQuery::with_history(
        *leaf.position(),
        [
            parent.map(|n| *n.position()),
            grandparent.map(|n| *n.position()),
        ],
    )
}

/// Reward of a terminal leaf from its own perspective: the player who
/// just moved won if the side to move is lost.
fn terminal_result(leaf: &Node, config: &MctsConfig) -> f64 {
    match leaf.status() {
        SolverStatus::ProvenLoss => WIN_SCORE,
        SolverStatus::ProvenWin => LOSS_SCORE,
        SolverStatus::ProvenDraw | SolverStatus::Unknown => config.draw_score,
    }
}

fn on_arena_full(ctx: &SearchContext, stats: &mut SearchStats, err: &crate::SearchError) {
    if !stats.arena_full {
        warn!(%err, "stopping search early");
    }
    stats.arena_full = true;
    ctx.stop.store(true, Ordering::Relaxed);
}

fn should_stop(
    ctx: &SearchContext,
    start: Instant,
    time_limit: f64,
    last_early_check: &mut u32,
) -> bool {
    if time_limit > 0.0 && start.elapsed().as_secs_f64() >= time_limit {
        return true;
    }
    let max_nodes = ctx.config.max_nodes;
    if max_nodes == 0 {
        return false;
    }
    let visits = ctx.root.visits();
    if visits >= max_nodes {
        return true;
    }
    // Early exit: once the leader's margin exceeds the visits that remain
    // in the budget, no challenger can catch up.
    if visits >= EARLY_EXIT_MIN_VISITS && visits >= *last_early_check + EARLY_EXIT_STRIDE {
        *last_early_check = visits;
        let mut best = 0u32;
        let mut second = 0u32;
        for child in ctx.root.children() {
            let v = child.visits();
            if v > best {
                second = best;
                best = v;
            } else if v > second {
                second = v;
            }
        }
        if best - second > max_nodes - visits {
            debug!(best, second, visits, max_nodes, "early exit: decided");
            return true;
        }
    }
    false
}

/// Most-visited root child, ties to the first seen.
fn robust_child(root: &Node) -> Option<&Node> {
    let mut best: Option<(&Node, u32)> = None;
    for child in root.children() {
        let visits = child.visits();
        if best.map_or(true, |(_, most)| visits > most) {
            best = Some((child, visits));
        }
    }
    best.map(|(child, _)| child)
}

// ---------------------------------------------------------------------------
// Inference queue
// ---------------------------------------------------------------------------

/// Worker-to-master handoff for batched evaluation. Workers push an
/// [`InferenceRequest`] and block on its condvar; the master drains the
/// pending vector on `batch_ready` (or a 1 ms tick), runs one batched
/// forward pass and signals every waiter.
struct InferenceQueue {
    state: Mutex<QueueState>,
    batch_ready: Condvar,
}

struct QueueState {
    pending: Vec<Arc<InferenceRequest>>,
    shutdown: bool,
}

struct InferenceRequest {
    query: EvalQuery,
    reply: Mutex<ReplyState>,
    ready: Condvar,
}

enum ReplyState {
    Waiting,
    Ready(EvalOutput),
    Aborted,
}

impl InferenceQueue {
    fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: Vec::with_capacity(BATCH_SIZE),
                shutdown: false,
            }),
            batch_ready: Condvar::new(),
        }
    }

    /// Enqueue and wait. `None` means the queue shut down before a reply.
    fn request(&self, query: EvalQuery) -> Option<EvalOutput> {
        let request = Arc::new(InferenceRequest {
            query,
            reply: Mutex::new(ReplyState::Waiting),
            ready: Condvar::new(),
        });
        loop {
            {
                let mut state = self.state.lock().unwrap();
                if state.shutdown {
                    return None;
                }
                if state.pending.len() >= BATCH_SIZE {
                    // Full batch waiting: poke the master, stand aside.
                    self.batch_ready.notify_one();
                    drop(state);
                    std::thread::yield_now();
                    continue;
                }
                state.pending.push(Arc::clone(&request));
                if state.pending.len() >= BATCH_SIZE {
                    self.batch_ready.notify_one();
                }
            }
            let mut reply = request.reply.lock().unwrap();
            loop {
                match std::mem::replace(&mut *reply, ReplyState::Waiting) {
                    ReplyState::Ready(output) => return Some(output),
                    ReplyState::Aborted => return None,
                    ReplyState::Waiting => reply = request.ready.wait(reply).unwrap(),
                }
            }
        }
    }

    /// Master side: wait briefly for work, then drain whatever is queued.
    fn wait_batch(&self, timeout: Duration) -> Vec<Arc<InferenceRequest>> {
        let mut state = self.state.lock().unwrap();
        if state.pending.is_empty() && !state.shutdown {
            let (guard, _) = self.batch_ready.wait_timeout(state, timeout).unwrap();
            state = guard;
        }
        std::mem::take(&mut state.pending)
    }

    /// Wake every pending and future requester with an abort.
    fn shutdown(&self) {
        let pending = {
            let mut state = self.state.lock().unwrap();
            state.shutdown = true;
            std::mem::take(&mut state.pending)
        };
        self.batch_ready.notify_all();
        for request in pending {
            request.abort();
        }
    }
}

impl InferenceRequest {
    fn fulfill(&self, output: EvalOutput) {
        *self.reply.lock().unwrap() = ReplyState::Ready(output);
        self.ready.notify_one();
    }

    fn abort(&self) {
        *self.reply.lock().unwrap() = ReplyState::Aborted;
        self.ready.notify_one();
    }
}

fn serve_batch(ctx: &SearchContext, evaluator: &dyn Evaluator, stats: &mut SearchStats) {
    let requests = ctx.queue.wait_batch(Duration::from_millis(1));
    if requests.is_empty() {
        return;
    }
    let queries: Vec<EvalQuery> = requests.iter().map(|r| r.query.clone()).collect();
    let outputs = evaluator.evaluate_batch(&queries);
    stats.batches += 1;
    stats.batched_requests += requests.len() as u64;
    for (index, request) in requests.iter().enumerate() {
        match outputs.get(index) {
            Some(output) => request.fulfill(*output),
            // A misbehaving evaluator must not strand a worker.
            None => request.abort(),
        }
    }
}
