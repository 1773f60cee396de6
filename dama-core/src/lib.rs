//! DAMA Core - Italian draughts rules engine
//!
//! This crate provides the game logic the search engine builds on:
//! - Board geometry (32 dark squares, diagonal neighbor tables)
//! - Positions as bitboards with incremental Zobrist hashing
//! - Legal move generation with the Italian capture-precedence ladder
//! - The quiet-ply draw clock and promotion rules
//! - Action indexing for the 128-way policy head

pub mod board;
pub mod movegen;
pub mod moves;
pub mod position;
pub mod zobrist;

// Re-exports
pub use board::{advancement, bit, row_of, Color, CENTER_MASK, EDGE_MASK};
pub use movegen::{generate_moves, is_square_threatened};
pub use moves::{move_to_action_index, Move, MoveList, MAX_MOVES, MAX_PATH, POLICY_SIZE};
pub use position::{ParseError, Position, DRAW_PLIES};
