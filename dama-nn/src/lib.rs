//! DAMA NN - Pluggable policy-value evaluation
//!
//! The search core talks to evaluators through the [`Evaluator`] trait:
//! one forward pass for a single position, one for a whole inference
//! batch. Implementations in this crate:
//! - [`DenseNet`]: a small dense policy-value network with JSON weights
//! - [`UniformEvaluator`]: uniform policy, neutral value (tests, ablations)

mod net;

pub use net::{DenseNet, NetError};

use dama_core::{Position, POLICY_SIZE};

/// One evaluation request: the position to score plus up to two plies of
/// history (most recent first).
#[derive(Clone, Debug)]
pub struct EvalQuery {
    pub position: Position,
    pub history: [Option<Position>; 2],
}

impl EvalQuery {
    pub fn new(position: Position) -> Self {
        Self {
            position,
            history: [None, None],
        }
    }

    pub fn with_history(position: Position, history: [Option<Position>; 2]) -> Self {
        Self { position, history }
    }
}

/// Evaluator output: a dense move-prior vector and a scalar value in
/// [-1, 1] from the perspective of the side to move.
#[derive(Clone, Copy, Debug)]
pub struct EvalOutput {
    pub policy: [f32; POLICY_SIZE],
    pub value: f32,
}

impl EvalOutput {
    /// Uniform priors, neutral value.
    pub fn neutral() -> Self {
        Self {
            policy: [1.0 / POLICY_SIZE as f32; POLICY_SIZE],
            value: 0.0,
        }
    }
}

/// A policy-value evaluator. The search core holds this as a type-erased
/// `Arc<dyn Evaluator>` and never looks inside.
pub trait Evaluator: Send + Sync {
    /// Forward pass for a single position.
    fn evaluate(&self, query: &EvalQuery) -> EvalOutput;

    /// Forward pass for a batch. The default maps [`Evaluator::evaluate`];
    /// implementations with real batching override this.
    fn evaluate_batch(&self, queries: &[EvalQuery]) -> Vec<EvalOutput> {
        queries.iter().map(|q| self.evaluate(q)).collect()
    }
}

/// Uniform policy, neutral value. Makes PUCT degrade to pure exploration.
#[derive(Clone, Copy, Debug, Default)]
pub struct UniformEvaluator;

impl Evaluator for UniformEvaluator {
    fn evaluate(&self, _query: &EvalQuery) -> EvalOutput {
        EvalOutput::neutral()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neutral_output_sums_to_one() {
        let out = EvalOutput::neutral();
        let sum: f32 = out.policy.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
        assert_eq!(out.value, 0.0);
    }

    #[test]
    fn test_uniform_evaluator_batch() {
        let eval = UniformEvaluator;
        let queries = vec![
            EvalQuery::new(Position::initial()),
            EvalQuery::new(Position::initial()),
        ];
        let outputs = eval.evaluate_batch(&queries);
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].value, 0.0);
    }
}
