//! Search configuration and named presets.

use dama_nn::Evaluator;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Weights for the rollout move heuristic and the static move score kept
/// on each node.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RolloutWeights {
    /// Bonus per captured piece.
    pub w_capture: f32,
    /// Bonus when the move promotes.
    pub w_promotion: f32,
    /// Bonus per row advanced toward the promotion rank.
    pub w_advance: f32,
    /// Bonus for landing on a central square.
    pub w_center: f32,
    /// Bonus for a pawn reaching an edge square (uncapturable there).
    pub w_edge: f32,
    /// Penalty for vacating the back rank.
    pub w_base: f32,
    /// Penalty when the destination is attacked in the resulting position.
    pub w_threat: f32,
    /// Bonus for lady moves (keeps ladies active).
    pub w_lady_activity: f32,
}

impl Default for RolloutWeights {
    fn default() -> Self {
        Self {
            w_capture: 100.0,
            w_promotion: 60.0,
            w_advance: 5.0,
            w_center: 3.0,
            w_edge: 2.0,
            w_base: 10.0,
            w_threat: 40.0,
            w_lady_activity: 4.0,
        }
    }
}

/// Full search configuration. Every option is independently settable; the
/// preset constructors bundle the combinations used in play.
#[derive(Clone)]
pub struct MctsConfig {
    // Selection
    pub ucb1_c: f64,
    pub puct_c: f64,
    pub use_ucb1_tuned: bool,
    pub use_puct: bool,
    pub use_fpu: bool,
    pub fpu_value: f64,
    pub use_progressive_bias: bool,
    pub bias_constant: f64,

    // Solver
    pub use_solver: bool,

    // Rollout
    pub rollout_epsilon: f64,
    pub use_lookahead: bool,
    pub use_decaying_reward: bool,
    pub decay_factor: f64,
    pub use_fast_rollout: bool,
    pub fast_rollout_depth: u32,
    pub weights: RolloutWeights,

    // Resources
    /// Stop once the root has this many visits (0 = unlimited).
    pub max_nodes: u32,
    /// Worker threads (0 = run sequentially on the calling thread).
    pub num_threads: usize,
    pub draw_score: f64,
    /// With an evaluator, a leaf is fully expanded only once it has this
    /// many visits; below it, children are popped one at a time against
    /// the parent's cached policy.
    pub expansion_threshold: u32,
    pub use_tree_reuse: bool,
    pub use_tt: bool,

    /// Optional policy-value evaluator (enables PUCT priors and batched
    /// inference; disables rollouts).
    pub evaluator: Option<Arc<dyn Evaluator>>,

    // Diagnostics
    pub verbose: bool,
    /// Master RNG seed (None = nondeterministic). With `num_threads = 0`
    /// a fixed seed makes the whole search reproducible.
    pub seed: Option<u64>,
}

impl Default for MctsConfig {
    fn default() -> Self {
        Self {
            ucb1_c: std::f64::consts::SQRT_2,
            puct_c: 1.5,
            use_ucb1_tuned: false,
            use_puct: false,
            use_fpu: false,
            fpu_value: 0.5,
            use_progressive_bias: false,
            bias_constant: 0.5,
            use_solver: false,
            rollout_epsilon: 0.1,
            use_lookahead: false,
            use_decaying_reward: false,
            decay_factor: 0.99,
            use_fast_rollout: false,
            fast_rollout_depth: 50,
            weights: RolloutWeights::default(),
            max_nodes: 0,
            num_threads: 0,
            draw_score: 0.5,
            expansion_threshold: 0,
            use_tree_reuse: false,
            use_tt: false,
            evaluator: None,
            verbose: false,
            seed: None,
        }
    }
}

impl MctsConfig {
    /// Plain UCB1 search, every feature off.
    pub fn pure_vanilla() -> Self {
        Self::default()
    }

    /// The baseline playing configuration: danger lookahead in rollouts
    /// and tree reuse between turns.
    pub fn vanilla() -> Self {
        Self {
            use_lookahead: true,
            use_tree_reuse: true,
            ..Self::default()
        }
    }

    /// The strongest hand-tuned configuration: PUCT with progressive bias
    /// and the solver, epsilon tuned for evaluator-guided play.
    pub fn grandmaster() -> Self {
        Self {
            use_puct: true,
            use_progressive_bias: true,
            use_solver: true,
            use_lookahead: true,
            use_tree_reuse: true,
            use_tt: true,
            rollout_epsilon: 0.05,
            weights: RolloutWeights {
                w_capture: 120.0,
                w_promotion: 80.0,
                w_threat: 60.0,
                ..RolloutWeights::default()
            },
            ..Self::default()
        }
    }

    /// PUCT plus the solver, nothing else: the evaluator does the work.
    pub fn alpha_zero() -> Self {
        Self {
            use_puct: true,
            use_solver: true,
            ..Self::default()
        }
    }

    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn with_max_nodes(mut self, max_nodes: u32) -> Self {
        self.max_nodes = max_nodes;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn with_solver(mut self, on: bool) -> Self {
        self.use_solver = on;
        self
    }

    pub fn with_tt(mut self, on: bool) -> Self {
        self.use_tt = on;
        self
    }

    pub fn with_tree_reuse(mut self, on: bool) -> Self {
        self.use_tree_reuse = on;
        self
    }
}

impl std::fmt::Debug for MctsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MctsConfig")
            .field("ucb1_c", &self.ucb1_c)
            .field("puct_c", &self.puct_c)
            .field("use_ucb1_tuned", &self.use_ucb1_tuned)
            .field("use_puct", &self.use_puct)
            .field("use_fpu", &self.use_fpu)
            .field("use_progressive_bias", &self.use_progressive_bias)
            .field("use_solver", &self.use_solver)
            .field("rollout_epsilon", &self.rollout_epsilon)
            .field("use_lookahead", &self.use_lookahead)
            .field("use_fast_rollout", &self.use_fast_rollout)
            .field("max_nodes", &self.max_nodes)
            .field("num_threads", &self.num_threads)
            .field("expansion_threshold", &self.expansion_threshold)
            .field("use_tree_reuse", &self.use_tree_reuse)
            .field("use_tt", &self.use_tt)
            .field("evaluator", &self.evaluator.is_some())
            .field("seed", &self.seed)
            .finish_non_exhaustive()
    }
}
