//! Position state: bitboards, side to move, Zobrist hash, quiet-ply clock.

use crate::board::{bit, Color, NUM_SQUARES, PROMOTION_MASK};
use crate::movegen;
use crate::moves::{Move, MoveList};
use crate::zobrist;
use serde::{Deserialize, Serialize};

/// Plies without a capture or a pawn move before the game is drawn
/// (the Italian 40-move rule, counted per half-move).
pub const DRAW_PLIES: u8 = 80;

/// A board position. Clone to mutate; `apply_move` keeps the hash
/// incremental.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Position {
    pawns: [u32; 2],
    ladies: [u32; 2],
    side_to_move: Color,
    hash: u64,
    quiet_plies: u8,
}

/// Equality is component-wise over the board state and the quiet-ply
/// clock; the hash is derived and deliberately not compared (transposition
/// lookups use this to reject hash collisions).
impl PartialEq for Position {
    fn eq(&self, other: &Self) -> bool {
        self.pawns == other.pawns
            && self.ladies == other.ladies
            && self.side_to_move == other.side_to_move
            && self.quiet_plies == other.quiet_plies
    }
}

impl Eq for Position {}

impl Position {
    /// Standard starting position: twelve men per side on the first three
    /// rows.
    pub fn initial() -> Self {
        Self::from_setup(
            &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
            &[],
            &[20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31],
            &[],
            Color::White,
        )
    }

    /// Build a position from explicit piece placements (tests, FEN).
    pub fn from_setup(
        white_pawns: &[u8],
        white_ladies: &[u8],
        black_pawns: &[u8],
        black_ladies: &[u8],
        side_to_move: Color,
    ) -> Self {
        let mut pos = Self {
            pawns: [0; 2],
            ladies: [0; 2],
            side_to_move,
            hash: 0,
            quiet_plies: 0,
        };
        for &sq in white_pawns {
            pos.pawns[Color::White.index()] |= bit(sq);
        }
        for &sq in white_ladies {
            pos.ladies[Color::White.index()] |= bit(sq);
        }
        for &sq in black_pawns {
            pos.pawns[Color::Black.index()] |= bit(sq);
        }
        for &sq in black_ladies {
            pos.ladies[Color::Black.index()] |= bit(sq);
        }
        pos.hash = pos.compute_hash();
        pos
    }

    pub fn side_to_move(&self) -> Color {
        self.side_to_move
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn quiet_plies(&self) -> u8 {
        self.quiet_plies
    }

    pub fn pawns(&self, color: Color) -> u32 {
        self.pawns[color.index()]
    }

    pub fn ladies(&self, color: Color) -> u32 {
        self.ladies[color.index()]
    }

    /// All pieces of one color.
    pub fn pieces(&self, color: Color) -> u32 {
        self.pawns[color.index()] | self.ladies[color.index()]
    }

    pub fn occupied(&self) -> u32 {
        self.pieces(Color::White) | self.pieces(Color::Black)
    }

    pub fn piece_count(&self) -> u32 {
        self.occupied().count_ones()
    }

    /// Material balance for `color`: pawns count 1, ladies 3.
    pub fn material_diff(&self, color: Color) -> i32 {
        let us = self.pawns(color).count_ones() as i32
            + 3 * self.ladies(color).count_ones() as i32;
        let them = self.pawns(color.opponent()).count_ones() as i32
            + 3 * self.ladies(color.opponent()).count_ones() as i32;
        us - them
    }

    /// The quiet-ply clock has run out: drawn position.
    pub fn is_quiet_draw(&self) -> bool {
        self.quiet_plies >= DRAW_PLIES
    }

    /// Legal moves of the side to move.
    pub fn legal_moves(&self) -> MoveList {
        let mut list = MoveList::new();
        movegen::generate_moves(self, &mut list);
        list
    }

    /// True if the side to move can capture the piece on `square`.
    pub fn is_square_threatened(&self, square: u8) -> bool {
        movegen::is_square_threatened(self, square)
    }

    /// Apply a legal move in place, updating the hash incrementally.
    pub fn apply_move(&mut self, mv: &Move) {
        debug_assert!(!mv.is_null());
        let keys = zobrist::keys();
        let us = self.side_to_move;
        let them = us.opponent();
        let from = mv.from_square();
        let to = mv.to_square();
        let was_lady = self.ladies[us.index()] & bit(from) != 0;

        // Lift the mover off its origin.
        let from_kind = was_lady as usize;
        if was_lady {
            self.ladies[us.index()] &= !bit(from);
        } else {
            self.pawns[us.index()] &= !bit(from);
        }
        self.hash ^= keys.pieces[us.index()][from_kind][from as usize];

        // Remove every captured piece.
        for &c in mv.captured() {
            let victim_lady = self.ladies[them.index()] & bit(c) != 0;
            if victim_lady {
                self.ladies[them.index()] &= !bit(c);
            } else {
                self.pawns[them.index()] &= !bit(c);
            }
            self.hash ^= keys.pieces[them.index()][victim_lady as usize][c as usize];
        }

        // Drop the mover on its destination, promoting if due.
        let promotes = !was_lady && PROMOTION_MASK[us.index()] & bit(to) != 0;
        let to_kind = (was_lady || promotes) as usize;
        if was_lady || promotes {
            self.ladies[us.index()] |= bit(to);
        } else {
            self.pawns[us.index()] |= bit(to);
        }
        self.hash ^= keys.pieces[us.index()][to_kind][to as usize];

        // The clock counts lady moves without capture; captures and pawn
        // moves reset it.
        if mv.is_capture() || !was_lady {
            self.quiet_plies = 0;
        } else {
            self.quiet_plies = self.quiet_plies.saturating_add(1);
        }

        self.side_to_move = them;
        self.hash ^= keys.side;
    }

    /// Full-table hash recomputation. `apply_move` keeps the incremental
    /// hash equal to this.
    pub fn compute_hash(&self) -> u64 {
        let keys = zobrist::keys();
        let mut hash = 0u64;
        for color in [Color::White, Color::Black] {
            for (kind, mut bb) in [
                (0usize, self.pawns[color.index()]),
                (1usize, self.ladies[color.index()]),
            ] {
                while bb != 0 {
                    let sq = bb.trailing_zeros() as usize;
                    bb &= bb - 1;
                    hash ^= keys.pieces[color.index()][kind][sq];
                }
            }
        }
        if self.side_to_move == Color::Black {
            hash ^= keys.side;
        }
        hash
    }

    /// Parse a PDN-style position string, e.g. `W:W4,K5:B12,K13` with
    /// 1-based square numbers and `K` marking ladies.
    pub fn from_fen(fen: &str) -> Result<Self, ParseError> {
        let mut parts = fen.split(':');
        let side = match parts.next() {
            Some("W") => Color::White,
            Some("B") => Color::Black,
            _ => return Err(ParseError::SideToMove),
        };
        let mut white_pawns = Vec::new();
        let mut white_ladies = Vec::new();
        let mut black_pawns = Vec::new();
        let mut black_ladies = Vec::new();
        for part in parts {
            let (color, rest) = if let Some(rest) = part.strip_prefix('W') {
                (Color::White, rest)
            } else if let Some(rest) = part.strip_prefix('B') {
                (Color::Black, rest)
            } else {
                return Err(ParseError::PieceList(part.to_string()));
            };
            for item in rest.split(',').filter(|s| !s.is_empty()) {
                let (is_lady, digits) = match item.strip_prefix('K') {
                    Some(d) => (true, d),
                    None => (false, item),
                };
                let number: u8 = digits
                    .parse()
                    .map_err(|_| ParseError::Square(item.to_string()))?;
                if !(1..=NUM_SQUARES as u8).contains(&number) {
                    return Err(ParseError::Square(item.to_string()));
                }
                let sq = number - 1;
                match (color, is_lady) {
                    (Color::White, false) => white_pawns.push(sq),
                    (Color::White, true) => white_ladies.push(sq),
                    (Color::Black, false) => black_pawns.push(sq),
                    (Color::Black, true) => black_ladies.push(sq),
                }
            }
        }
        Ok(Self::from_setup(
            &white_pawns,
            &white_ladies,
            &black_pawns,
            &black_ladies,
            side,
        ))
    }

    /// Inverse of [`Position::from_fen`].
    pub fn to_fen(&self) -> String {
        fn side_list(pawns: u32, ladies: u32) -> String {
            let mut items = Vec::new();
            for sq in 0..NUM_SQUARES as u8 {
                if pawns & bit(sq) != 0 {
                    items.push(format!("{}", sq + 1));
                } else if ladies & bit(sq) != 0 {
                    items.push(format!("K{}", sq + 1));
                }
            }
            items.join(",")
        }
        format!(
            "{}:W{}:B{}",
            match self.side_to_move {
                Color::White => "W",
                Color::Black => "B",
            },
            side_list(self.pawns(Color::White), self.ladies(Color::White)),
            side_list(self.pawns(Color::Black), self.ladies(Color::Black)),
        )
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for row in (0..8u8).rev() {
            write!(f, "{} ", row + 1)?;
            for file in 0..8u8 {
                let dark = (row + file) % 2 == 0;
                if !dark {
                    write!(f, "  ")?;
                    continue;
                }
                let sq = row * 4 + file / 2;
                let glyph = if self.pawns(Color::White) & bit(sq) != 0 {
                    'w'
                } else if self.ladies(Color::White) & bit(sq) != 0 {
                    'W'
                } else if self.pawns(Color::Black) & bit(sq) != 0 {
                    'b'
                } else if self.ladies(Color::Black) & bit(sq) != 0 {
                    'B'
                } else {
                    '.'
                };
                write!(f, "{} ", glyph)?;
            }
            writeln!(f)?;
        }
        writeln!(f, "  a b c d e f g h   {} to move", self.side_to_move)
    }
}

/// Errors from [`Position::from_fen`].
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("position string must start with W: or B:")]
    SideToMove,
    #[error("bad piece list segment: {0}")]
    PieceList(String),
    #[error("bad square: {0}")]
    Square(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_position() {
        let pos = Position::initial();
        assert_eq!(pos.piece_count(), 24);
        assert_eq!(pos.pawns(Color::White).count_ones(), 12);
        assert_eq!(pos.ladies(Color::White), 0);
        assert_eq!(pos.side_to_move(), Color::White);
        assert_eq!(pos.material_diff(Color::White), 0);
    }

    #[test]
    fn test_incremental_hash_matches_recompute() {
        let mut pos = Position::initial();
        for _ in 0..20 {
            let moves = pos.legal_moves();
            if moves.is_empty() {
                break;
            }
            pos.apply_move(&moves[0]);
            assert_eq!(pos.hash(), pos.compute_hash());
        }
    }

    #[test]
    fn test_apply_capture_removes_victim() {
        let mut pos = Position::from_setup(&[13], &[], &[17], &[], Color::White);
        let moves = pos.legal_moves();
        assert_eq!(moves.len(), 1);
        pos.apply_move(&moves[0]);
        assert_eq!(pos.pieces(Color::Black), 0);
        assert_eq!(pos.quiet_plies(), 0);
        assert_eq!(pos.side_to_move(), Color::Black);
    }

    #[test]
    fn test_promotion() {
        let mut pos = Position::from_setup(&[25], &[], &[0], &[], Color::White);
        let mv = Move::step(25, 28, false);
        pos.apply_move(&mv);
        assert_ne!(pos.ladies(Color::White) & bit(28), 0);
        assert_eq!(pos.pawns(Color::White), 0);
    }

    #[test]
    fn test_quiet_clock_counts_lady_moves_only() {
        let mut pos = Position::from_setup(&[0], &[13], &[], &[31], Color::White);
        pos.apply_move(&Move::step(13, 17, true));
        assert_eq!(pos.quiet_plies(), 1);
        pos.apply_move(&Move::step(31, 27, true));
        assert_eq!(pos.quiet_plies(), 2);
        // A pawn move resets the clock.
        pos.apply_move(&Move::step(0, 4, false));
        assert_eq!(pos.quiet_plies(), 0);
    }

    #[test]
    fn test_equality_ignores_hash_field() {
        let a = Position::from_setup(&[5], &[], &[20], &[], Color::White);
        let mut b = a;
        assert_eq!(a, b);
        b.hash ^= 0xdead_beef;
        assert_eq!(a, b);
    }

    #[test]
    fn test_fen_round_trip() {
        let pos = Position::from_setup(&[3, 4], &[10], &[20], &[31], Color::Black);
        let fen = pos.to_fen();
        let back = Position::from_fen(&fen).unwrap();
        assert_eq!(pos, back);
        assert_eq!(pos.hash(), back.hash());
    }

    #[test]
    fn test_fen_rejects_garbage() {
        assert!(Position::from_fen("X:W1:B2").is_err());
        assert!(Position::from_fen("W:W99:B2").is_err());
    }

    #[test]
    fn test_side_to_move_flips_hash() {
        let a = Position::from_setup(&[5], &[], &[20], &[], Color::White);
        let b = Position::from_setup(&[5], &[], &[20], &[], Color::Black);
        assert_ne!(a.hash(), b.hash());
    }
}
