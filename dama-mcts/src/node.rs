//! Tree nodes: atomic statistics, per-node locks, arena-backed links.
//!
//! Nodes are owned exclusively by the [`Arena`]; parent and child links
//! are raw pointers into that non-moving buffer, valid for the arena's
//! lifetime. The hot counters (`visits`, `virtual_loss`) are relaxed
//! atomics; `score`, `sum_sq_score`, the untried-move list and the cached
//! policy live behind the per-node mutex. The child array is append-only
//! with an atomically published length: slot writes happen-before the
//! release store of `num_children`, which readers load with acquire.

use crate::arena::Arena;
use crate::config::MctsConfig;
use crate::SearchError;
use dama_core::{generate_moves, Color, Move, MoveList, Position, MAX_MOVES, POLICY_SIZE};
use std::ptr;
use std::sync::atomic::{AtomicI32, AtomicPtr, AtomicU32, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Heuristic penalty stamped on repetition nodes so selection shuns them.
const LOOP_PENALTY: f32 = -50_000.0;

/// Game-theoretic value of a node, from the perspective of the side to
/// move there. Transitions are monotone: once proven, never unproven.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SolverStatus {
    Unknown = 0,
    ProvenWin = 1,
    ProvenLoss = 2,
    ProvenDraw = 3,
}

impl SolverStatus {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => SolverStatus::ProvenWin,
            2 => SolverStatus::ProvenLoss,
            3 => SolverStatus::ProvenDraw,
            _ => SolverStatus::Unknown,
        }
    }
}

pub(crate) type PolicyVec = [f32; POLICY_SIZE];

/// State behind the per-node mutex.
pub(crate) struct Guarded {
    pub(crate) score: f64,
    pub(crate) sum_sq_score: f64,
    pub(crate) untried: MoveList,
    /// Dense policy over this node's moves, arena-allocated on demand
    /// (single-child expansion with PUCT reads priors from here).
    pub(crate) cached_policy: Option<*const PolicyVec>,
    /// Evaluator value cached alongside the policy.
    pub(crate) cached_value: f32,
}

pub struct Node {
    position: Position,
    move_from_parent: Move,
    player_who_just_moved: Color,
    parent: *const Node,
    prior: f32,
    heuristic_score: f32,
    is_terminal: bool,

    visits: AtomicU32,
    virtual_loss: AtomicI32,
    status: AtomicU8,
    untried_count: AtomicUsize,
    num_children: AtomicUsize,
    children: [AtomicPtr<Node>; MAX_MOVES],
    guarded: Mutex<Guarded>,
}

// Links are raw pointers into the arena, which outlives every worker.
unsafe impl Send for Node {}
unsafe impl Sync for Node {}

impl Node {
    fn build(
        position: Position,
        move_from_parent: Move,
        parent: Option<&Node>,
        prior: f32,
        mut heuristic_score: f32,
    ) -> Self {
        let player_who_just_moved = position.side_to_move().opponent();
        let mut untried = MoveList::new();
        let mut status = SolverStatus::Unknown;
        let mut is_terminal = false;
        let mut seed_score = 0.0f64;

        // A stuck side has lost before any draw rule gets a say, so the
        // no-moves check runs ahead of both draw cases.
        generate_moves(&position, &mut untried);
        if untried.is_empty() {
            is_terminal = true;
            status = SolverStatus::ProvenLoss;
        } else if ancestor_repeats(parent, position.hash()) {
            // Repetition: cutting the line here keeps endless shuffles from
            // polluting the statistics above.
            is_terminal = true;
            status = SolverStatus::ProvenDraw;
            heuristic_score += LOOP_PENALTY;
            seed_score = -1.0;
            untried.clear();
        } else if position.is_quiet_draw() {
            is_terminal = true;
            status = SolverStatus::ProvenDraw;
            untried.clear();
        }

        Self {
            position,
            move_from_parent,
            player_who_just_moved,
            parent: parent.map_or(ptr::null(), |p| p as *const Node),
            prior,
            heuristic_score,
            is_terminal,
            visits: AtomicU32::new(0),
            virtual_loss: AtomicI32::new(0),
            status: AtomicU8::new(status as u8),
            untried_count: AtomicUsize::new(untried.len()),
            num_children: AtomicUsize::new(0),
            children: std::array::from_fn(|_| AtomicPtr::new(ptr::null_mut())),
            guarded: Mutex::new(Guarded {
                score: seed_score,
                sum_sq_score: 0.0,
                untried,
                cached_policy: None,
                cached_value: 0.0,
            }),
        }
    }

    pub(crate) fn new_root(position: Position) -> Self {
        Self::build(position, Move::null(), None, 0.0, 0.0)
    }

    pub(crate) fn new_child(
        position: Position,
        move_from_parent: Move,
        parent: &Node,
        prior: f32,
        heuristic_score: f32,
    ) -> Self {
        Self::build(position, move_from_parent, Some(parent), prior, heuristic_score)
    }

    // --- immutable state ---

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn move_from_parent(&self) -> &Move {
        &self.move_from_parent
    }

    pub fn player_who_just_moved(&self) -> Color {
        self.player_who_just_moved
    }

    pub fn parent(&self) -> Option<&Node> {
        unsafe { self.parent.as_ref() }
    }

    pub fn prior(&self) -> f32 {
        self.prior
    }

    pub fn heuristic_score(&self) -> f32 {
        self.heuristic_score
    }

    pub fn is_terminal(&self) -> bool {
        self.is_terminal
    }

    // --- atomics ---

    pub fn visits(&self) -> u32 {
        self.visits.load(Ordering::Relaxed)
    }

    pub fn virtual_loss(&self) -> i32 {
        self.virtual_loss.load(Ordering::Relaxed)
    }

    pub(crate) fn add_virtual_loss(&self) {
        self.virtual_loss.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn revert_virtual_loss(&self) {
        self.virtual_loss.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn record_visit(&self) {
        self.visits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn status(&self) -> SolverStatus {
        SolverStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn is_proven(&self) -> bool {
        self.status() != SolverStatus::Unknown
    }

    /// Monotone transition out of `Unknown`; proven states never change.
    pub(crate) fn try_prove(&self, status: SolverStatus) -> bool {
        self.status
            .compare_exchange(
                SolverStatus::Unknown as u8,
                status as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn untried_count(&self) -> usize {
        self.untried_count.load(Ordering::Acquire)
    }

    pub fn has_untried_moves(&self) -> bool {
        self.untried_count() > 0
    }

    // --- children ---

    pub fn num_children(&self) -> usize {
        self.num_children.load(Ordering::Acquire)
    }

    pub fn child(&self, index: usize) -> &Node {
        debug_assert!(index < self.num_children());
        let ptr = self.children[index].load(Ordering::Acquire);
        debug_assert!(!ptr.is_null());
        unsafe { &*ptr }
    }

    pub fn children(&self) -> impl Iterator<Item = &Node> + '_ {
        (0..self.num_children()).map(move |i| self.child(i))
    }

    /// Append a child and publish the new length. Callers hold this
    /// node's guarded lock, which serializes appends; readers only see a
    /// slot after the release store of the length.
    pub(crate) fn append_child(&self, child: &Node) {
        let n = self.num_children.load(Ordering::Relaxed);
        debug_assert!(n < MAX_MOVES);
        self.children[n].store(child as *const Node as *mut Node, Ordering::Release);
        self.num_children.store(n + 1, Ordering::Release);
    }

    /// Write a child slot without publishing it (full expansion fills all
    /// slots first, then publishes the count once).
    pub(crate) fn set_child_slot(&self, index: usize, child: &Node) {
        debug_assert!(index < MAX_MOVES);
        self.children[index].store(child as *const Node as *mut Node, Ordering::Relaxed);
    }

    /// Publish the child count after a full expansion: the fence orders
    /// every slot write before the count becomes visible.
    pub(crate) fn publish_children(&self, count: usize) {
        std::sync::atomic::fence(Ordering::Release);
        self.num_children.store(count, Ordering::Release);
    }

    /// Linear scan by move path.
    pub fn find_child_by_move(&self, mv: &Move) -> Option<&Node> {
        self.children().find(|c| c.move_from_parent.same_path(mv))
    }

    // --- guarded state ---

    pub(crate) fn guarded(&self) -> MutexGuard<'_, Guarded> {
        self.guarded.lock().unwrap()
    }

    /// Synchronize the lock-free mirror after mutating the untried list.
    pub(crate) fn publish_untried_count(&self, count: usize) {
        self.untried_count.store(count, Ordering::Release);
    }

    /// Copy of the cached policy and value, if an evaluator filled them.
    pub(crate) fn cached_policy_value(&self) -> Option<(PolicyVec, f32)> {
        let guarded = self.guarded();
        guarded
            .cached_policy
            .map(|ptr| (unsafe { *ptr }, guarded.cached_value))
    }

    /// Score sum and sum of squares, read under the node lock.
    pub fn score_snapshot(&self) -> (f64, f64) {
        let guarded = self.guarded();
        (guarded.score, guarded.sum_sq_score)
    }

    /// Mean reward from this node's perspective.
    pub fn mean_score(&self) -> f64 {
        let visits = self.visits();
        if visits == 0 {
            return 0.0;
        }
        self.score_snapshot().0 / f64::from(visits)
    }

    /// Adopt the statistics of a transposition-table entry for the same
    /// position. Runs before the node is published, so plain stores are
    /// race-free.
    pub(crate) fn warm_start_from(&self, entry: &Node) {
        let (score, sum_sq) = entry.score_snapshot();
        self.visits.store(entry.visits(), Ordering::Relaxed);
        if entry.is_proven() && !self.is_proven() {
            self.status.store(entry.status() as u8, Ordering::Relaxed);
        }
        let mut guarded = self.guarded();
        guarded.score = score;
        guarded.sum_sq_score = sum_sq;
    }
}

fn ancestor_repeats(parent: Option<&Node>, hash: u64) -> bool {
    let mut node = parent;
    while let Some(n) = node {
        if n.position.hash() == hash {
            return true;
        }
        node = n.parent();
    }
    false
}

/// Build a search root. The position may already be terminal (no legal
/// moves or a dead quiet-ply clock); `search` then returns the null move.
pub fn root_create<'a>(
    position: &Position,
    arena: &'a Arena,
    _config: &MctsConfig,
) -> Result<&'a Node, SearchError> {
    arena.alloc(Node::new_root(*position))
}

/// Maximum depth below `node`: 0 at leaves.
pub fn tree_depth(node: &Node) -> u32 {
    node.children().map(|c| 1 + tree_depth(c)).max().unwrap_or(0)
}
