//! Zobrist hashing for positions.
//!
//! Keys are generated once from a fixed seed so that hashes are stable
//! across processes (transposition tables and tests rely on this).

use crate::board::NUM_SQUARES;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::OnceLock;

const ZOBRIST_SEED: u64 = 0x44414d_41;

/// Key tables: `pieces[color][kind][square]` plus one side-to-move key.
/// Kind 0 = pawn, kind 1 = lady.
pub struct ZobristKeys {
    pub pieces: [[[u64; NUM_SQUARES]; 2]; 2],
    pub side: u64,
}

static KEYS: OnceLock<ZobristKeys> = OnceLock::new();

/// The process-wide key tables.
pub fn keys() -> &'static ZobristKeys {
    KEYS.get_or_init(|| {
        let mut rng = ChaCha8Rng::seed_from_u64(ZOBRIST_SEED);
        let mut pieces = [[[0u64; NUM_SQUARES]; 2]; 2];
        for color in &mut pieces {
            for kind in color.iter_mut() {
                for key in kind.iter_mut() {
                    *key = rng.gen();
                }
            }
        }
        ZobristKeys {
            pieces,
            side: rng.gen(),
        }
    })
}
