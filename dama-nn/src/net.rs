//! A small dense policy-value network.
//!
//! Three stacked frames (current position plus two plies of history), each
//! four 32-square planes from the mover's point of view, plus the quiet-ply
//! clock and a capture-pending flag. One hidden ReLU layer feeds a softmax
//! policy head and a tanh value head. Weights are plain JSON so nets from
//! the training side load without any framework dependency.

use crate::{EvalOutput, EvalQuery, Evaluator};
use dama_core::{Color, Position, POLICY_SIZE};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Planes per frame: own pawns, own ladies, enemy pawns, enemy ladies.
const PLANES_PER_FRAME: usize = 4;
const FRAMES: usize = 3;
const SCALAR_INPUTS: usize = 2;

/// Flattened input width.
pub const INPUT_SIZE: usize = FRAMES * PLANES_PER_FRAME * 32 + SCALAR_INPUTS;

/// Serialized network parameters. Matrices are row-major
/// `[out_size][in_size]`.
#[derive(Clone, Serialize, Deserialize)]
struct NetWeights {
    hidden_size: usize,
    hidden_w: Vec<f32>,
    hidden_b: Vec<f32>,
    policy_w: Vec<f32>,
    policy_b: Vec<f32>,
    value_w: Vec<f32>,
    value_b: f32,
}

/// Errors from weight loading.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("cannot read weight file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse weight file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("weight shapes do not match the architecture")]
    Shape,
}

/// Dense two-layer policy-value net.
pub struct DenseNet {
    weights: NetWeights,
}

impl DenseNet {
    /// Load weights from a JSON file.
    pub fn load(path: &Path) -> Result<Self, NetError> {
        let content = std::fs::read_to_string(path)?;
        let weights: NetWeights = serde_json::from_str(&content)?;
        Self::from_weights(weights)
    }

    /// Save weights to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), NetError> {
        let content = serde_json::to_string(&self.weights)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Small random net, for self-play bootstrapping and tests.
    pub fn random_init(hidden_size: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let scale = (2.0 / INPUT_SIZE as f32).sqrt();
        let mut sample = |n: usize| -> Vec<f32> {
            (0..n).map(|_| rng.gen_range(-scale..scale)).collect()
        };
        let weights = NetWeights {
            hidden_size,
            hidden_w: sample(hidden_size * INPUT_SIZE),
            hidden_b: vec![0.0; hidden_size],
            policy_w: sample(POLICY_SIZE * hidden_size),
            policy_b: vec![0.0; POLICY_SIZE],
            value_w: sample(hidden_size),
            value_b: 0.0,
        };
        Self::from_weights(weights).expect("generated shapes are consistent")
    }

    fn from_weights(weights: NetWeights) -> Result<Self, NetError> {
        let h = weights.hidden_size;
        if weights.hidden_w.len() != h * INPUT_SIZE
            || weights.hidden_b.len() != h
            || weights.policy_w.len() != POLICY_SIZE * h
            || weights.policy_b.len() != POLICY_SIZE
            || weights.value_w.len() != h
        {
            return Err(NetError::Shape);
        }
        Ok(Self { weights })
    }

    fn forward(&self, input: &[f32; INPUT_SIZE]) -> EvalOutput {
        let w = &self.weights;
        let h = w.hidden_size;

        let mut hidden = vec![0.0f32; h];
        for (i, out) in hidden.iter_mut().enumerate() {
            let row = &w.hidden_w[i * INPUT_SIZE..(i + 1) * INPUT_SIZE];
            let mut acc = w.hidden_b[i];
            for (x, wx) in input.iter().zip(row) {
                acc += x * wx;
            }
            *out = acc.max(0.0);
        }

        let mut policy = [0.0f32; POLICY_SIZE];
        for (i, out) in policy.iter_mut().enumerate() {
            let row = &w.policy_w[i * h..(i + 1) * h];
            let mut acc = w.policy_b[i];
            for (x, wx) in hidden.iter().zip(row) {
                acc += x * wx;
            }
            *out = acc;
        }
        softmax(&mut policy);

        let mut value = w.value_b;
        for (x, wx) in hidden.iter().zip(&w.value_w) {
            value += x * wx;
        }

        EvalOutput {
            policy,
            value: value.tanh(),
        }
    }
}

impl Evaluator for DenseNet {
    fn evaluate(&self, query: &EvalQuery) -> EvalOutput {
        let input = encode(query);
        self.forward(&input)
    }
}

fn softmax(values: &mut [f32]) {
    let max = values.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    if sum > 0.0 {
        for v in values.iter_mut() {
            *v /= sum;
        }
    }
}

/// Board planes from the mover's point of view: the board is mirrored for
/// Black so the net never sees color, only "us" and "them".
fn encode(query: &EvalQuery) -> [f32; INPUT_SIZE] {
    let mut input = [0.0f32; INPUT_SIZE];
    let us = query.position.side_to_move();

    let mut offset = 0;
    let frames = [
        Some(&query.position),
        query.history[0].as_ref(),
        query.history[1].as_ref(),
    ];
    for frame in frames {
        if let Some(pos) = frame {
            encode_frame(pos, us, &mut input[offset..offset + PLANES_PER_FRAME * 32]);
        }
        offset += PLANES_PER_FRAME * 32;
    }

    input[offset] = query.position.quiet_plies() as f32 / dama_core::DRAW_PLIES as f32;
    input[offset + 1] = if query.position.legal_moves().as_slice().iter().any(|m| m.is_capture()) {
        1.0
    } else {
        0.0
    };
    input
}

fn encode_frame(pos: &Position, us: Color, out: &mut [f32]) {
    let planes = [
        pos.pawns(us),
        pos.ladies(us),
        pos.pawns(us.opponent()),
        pos.ladies(us.opponent()),
    ];
    for (p, mut bb) in planes.into_iter().enumerate() {
        while bb != 0 {
            let sq = bb.trailing_zeros() as u8;
            bb &= bb - 1;
            let pov = match us {
                Color::White => sq,
                Color::Black => 31 - sq,
            };
            out[p * 32 + pov as usize] = 1.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_net_output_in_range() {
        let net = DenseNet::random_init(32, 7);
        let out = net.evaluate(&EvalQuery::new(Position::initial()));
        assert!(out.value >= -1.0 && out.value <= 1.0);
        let sum: f32 = out.policy.iter().sum();
        assert!((sum - 1.0).abs() < 1e-3);
        assert!(out.policy.iter().all(|&p| p >= 0.0));
    }

    #[test]
    fn test_forward_is_deterministic() {
        let net = DenseNet::random_init(16, 3);
        let q = EvalQuery::new(Position::initial());
        let a = net.evaluate(&q);
        let b = net.evaluate(&q);
        assert_eq!(a.value, b.value);
        assert_eq!(a.policy, b.policy);
    }

    #[test]
    fn test_encoding_is_side_symmetric() {
        // The mirrored position evaluated from the other side must encode
        // to the same input planes.
        let white = Position::from_setup(&[9], &[13], &[20], &[27], Color::White);
        let black = Position::from_setup(&[31 - 20], &[31 - 27], &[31 - 9], &[31 - 13], Color::Black);
        let a = encode(&EvalQuery::new(white));
        let b = encode(&EvalQuery::new(black));
        assert_eq!(a, b);
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = std::env::temp_dir().join("dama_nn_test_weights.json");
        let net = DenseNet::random_init(8, 11);
        net.save(&dir).unwrap();
        let loaded = DenseNet::load(&dir).unwrap();
        let q = EvalQuery::new(Position::initial());
        assert_eq!(net.evaluate(&q).value, loaded.evaluate(&q).value);
        std::fs::remove_file(&dir).ok();
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let mut net = DenseNet::random_init(8, 1).weights;
        net.hidden_b.pop();
        assert!(DenseNet::from_weights(net).is_err());
    }
}
