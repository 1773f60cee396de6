//! Legal move generation under Italian draughts rules.
//!
//! Captures are mandatory. When several capture sequences exist the mover
//! must pick by the Italian precedence ladder:
//! 1. capture the most pieces;
//! 2. capture with a lady rather than a man;
//! 3. capture the most ladies;
//! 4. meet the first lady as early as possible in the sequence.
//!
//! Men jump forward only and may never capture ladies. Ladies step and jump
//! in all four diagonal directions (no flying). Captured pieces stay on the
//! board until the move completes, blocking later jumps, and no piece can
//! be jumped twice. A man that reaches the promotion rank stops there.

use crate::board::{
    bit, Color, FORWARD_DIRS, JUMPS, NEIGHBORS, NO_SQUARE, NUM_DIRECTIONS, PROMOTION_MASK,
};
use crate::moves::{Move, MoveList, MAX_PATH};
use crate::position::Position;

/// Ordering metadata for one capture sequence.
#[derive(Clone, Copy, Debug)]
struct CaptureMeta {
    count: u8,
    lady_mover: bool,
    ladies_captured: u8,
    first_lady_at: u8,
}

/// Fill `out` with every legal move in `pos`, captures filtered by the
/// precedence ladder. Empty output means the side to move has lost (or the
/// caller should check the quiet-ply draw rule first).
pub fn generate_moves(pos: &Position, out: &mut MoveList) {
    out.clear();
    let mut captures = Vec::new();
    generate_captures(pos, &mut captures);
    if !captures.is_empty() {
        apply_precedence(&mut captures);
        for (mv, _) in &captures {
            out.push(*mv);
        }
        return;
    }
    generate_quiet(pos, out);
}

/// True if the side to move in `pos` has at least one capture that takes
/// the piece standing on `square`.
pub fn is_square_threatened(pos: &Position, square: u8) -> bool {
    let mut captures = Vec::new();
    generate_captures(pos, &mut captures);
    captures
        .iter()
        .any(|(mv, _)| mv.captured().contains(&square))
}

fn generate_captures(pos: &Position, out: &mut Vec<(Move, CaptureMeta)>) {
    let us = pos.side_to_move();
    let mut ctx = CaptureContext {
        pos,
        us,
        them: us.opponent(),
        out,
    };

    let mut pawns = pos.pawns(us);
    while pawns != 0 {
        let sq = pawns.trailing_zeros() as u8;
        pawns &= pawns - 1;
        ctx.search_from(sq, false);
    }
    let mut ladies = pos.ladies(us);
    while ladies != 0 {
        let sq = ladies.trailing_zeros() as u8;
        ladies &= ladies - 1;
        ctx.search_from(sq, true);
    }
}

struct CaptureContext<'a> {
    pos: &'a Position,
    us: Color,
    them: Color,
    out: &'a mut Vec<(Move, CaptureMeta)>,
}

impl CaptureContext<'_> {
    fn search_from(&mut self, origin: u8, is_lady: bool) {
        let mut path = [0u8; MAX_PATH];
        let mut caps = [0u8; MAX_PATH];
        path[0] = origin;
        // The mover's own square empties as soon as it moves.
        let occupied = self.pos.occupied() & !bit(origin);
        self.extend(origin, is_lady, occupied, 0, &mut path, 1, &mut caps, 0);
    }

    #[allow(clippy::too_many_arguments)]
    fn extend(
        &mut self,
        sq: u8,
        is_lady: bool,
        occupied: u32,
        captured: u32,
        path: &mut [u8; MAX_PATH],
        path_len: usize,
        caps: &mut [u8; MAX_PATH],
        caps_len: usize,
    ) {
        let mut extended = false;
        if path_len < MAX_PATH {
            for dir in 0..NUM_DIRECTIONS {
                if !is_lady && !FORWARD_DIRS[self.us.index()].contains(&dir) {
                    continue;
                }
                let over = NEIGHBORS[sq as usize][dir];
                let land = JUMPS[sq as usize][dir];
                if over == NO_SQUARE || land == NO_SQUARE {
                    continue;
                }
                let (over, land) = (over as u8, land as u8);
                let victim_is_enemy = self.pos.pieces(self.them) & bit(over) != 0;
                let victim_is_lady = self.pos.ladies(self.them) & bit(over) != 0;
                if !victim_is_enemy || captured & bit(over) != 0 {
                    continue;
                }
                // Men never capture ladies.
                if !is_lady && victim_is_lady {
                    continue;
                }
                if occupied & bit(land) != 0 {
                    continue;
                }

                path[path_len] = land;
                caps[caps_len] = over;
                extended = true;

                let promotes =
                    !is_lady && PROMOTION_MASK[self.us.index()] & bit(land) != 0;
                if promotes {
                    // Promotion ends the move; the new lady cannot continue.
                    self.record(path, path_len + 1, caps, caps_len + 1, is_lady);
                } else {
                    self.extend(
                        land,
                        is_lady,
                        occupied,
                        captured | bit(over),
                        path,
                        path_len + 1,
                        caps,
                        caps_len + 1,
                    );
                }
            }
        }
        if !extended && caps_len > 0 {
            self.record(path, path_len, caps, caps_len, is_lady);
        }
    }

    fn record(
        &mut self,
        path: &[u8; MAX_PATH],
        path_len: usize,
        caps: &[u8; MAX_PATH],
        caps_len: usize,
        is_lady: bool,
    ) {
        let mut mv = Move::null();
        mv.path[..path_len].copy_from_slice(&path[..path_len]);
        mv.path_len = path_len as u8;
        mv.captures[..caps_len].copy_from_slice(&caps[..caps_len]);
        mv.captures_len = caps_len as u8;
        mv.is_lady_move = is_lady;

        let enemy_ladies = self.pos.ladies(self.them);
        let mut ladies_captured = 0u8;
        let mut first_lady_at = u8::MAX;
        for (i, &c) in mv.captured().iter().enumerate() {
            if enemy_ladies & bit(c) != 0 {
                ladies_captured += 1;
                if first_lady_at == u8::MAX {
                    first_lady_at = i as u8;
                }
            }
        }
        let meta = CaptureMeta {
            count: caps_len as u8,
            lady_mover: is_lady,
            ladies_captured,
            first_lady_at,
        };
        self.out.push((mv, meta));
    }
}

/// The four-step Italian filter. Order within the survivors is preserved.
fn apply_precedence(captures: &mut Vec<(Move, CaptureMeta)>) {
    let max_count = captures.iter().map(|(_, m)| m.count).max().unwrap();
    captures.retain(|(_, m)| m.count == max_count);

    if captures.iter().any(|(_, m)| m.lady_mover) {
        captures.retain(|(_, m)| m.lady_mover);
    }

    let max_ladies = captures.iter().map(|(_, m)| m.ladies_captured).max().unwrap();
    captures.retain(|(_, m)| m.ladies_captured == max_ladies);

    let earliest = captures.iter().map(|(_, m)| m.first_lady_at).min().unwrap();
    captures.retain(|(_, m)| m.first_lady_at == earliest);
}

fn generate_quiet(pos: &Position, out: &mut MoveList) {
    let us = pos.side_to_move();
    let occupied = pos.occupied();

    let mut pawns = pos.pawns(us);
    while pawns != 0 {
        let sq = pawns.trailing_zeros() as u8;
        pawns &= pawns - 1;
        for &dir in &FORWARD_DIRS[us.index()] {
            let to = NEIGHBORS[sq as usize][dir];
            if to != NO_SQUARE && occupied & bit(to as u8) == 0 {
                out.push(Move::step(sq, to as u8, false));
            }
        }
    }

    let mut ladies = pos.ladies(us);
    while ladies != 0 {
        let sq = ladies.trailing_zeros() as u8;
        ladies &= ladies - 1;
        for dir in 0..NUM_DIRECTIONS {
            let to = NEIGHBORS[sq as usize][dir];
            if to != NO_SQUARE && occupied & bit(to as u8) == 0 {
                out.push(Move::step(sq, to as u8, true));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::Position;

    fn moves_of(pos: &Position) -> MoveList {
        let mut list = MoveList::new();
        generate_moves(pos, &mut list);
        list
    }

    #[test]
    fn test_initial_position_has_seven_moves() {
        let pos = Position::initial();
        let list = moves_of(&pos);
        // 12 men on rows 0..3; row-2 men have 7 forward steps free.
        assert_eq!(list.len(), 7);
        assert!(list.as_slice().iter().all(|m| !m.is_capture()));
    }

    #[test]
    fn test_capture_is_mandatory() {
        // White man on 13, black man on 17: the jump over 17 is the only
        // move even though White has another man with quiet steps.
        let pos = Position::from_setup(&[13, 0], &[], &[17], &[], Color::White);
        let list = moves_of(&pos);
        assert_eq!(list.len(), 1);
        let mv = list[0];
        assert!(mv.is_capture());
        assert_eq!(mv.from_square(), 13);
        assert_eq!(mv.to_square(), 20);
        assert_eq!(mv.captured(), &[17]);
    }

    #[test]
    fn test_multi_jump_preferred_over_single() {
        // Victims on 13 and 21 line up a double jump 9x18x25; the single
        // jump prefix must not be offered.
        let pos = Position::from_setup(&[9], &[], &[13, 21], &[], Color::White);
        let list = moves_of(&pos);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].captured().len(), 2);
        assert_eq!(list[0].to_square(), 25);
    }

    #[test]
    fn test_man_cannot_capture_lady() {
        // The only enemy contact is a lady: the man must step, not jump.
        let pos = Position::from_setup(&[13], &[], &[], &[17], Color::White);
        let list = moves_of(&pos);
        assert!(list.as_slice().iter().all(|m| !m.is_capture()));
    }

    #[test]
    fn test_lady_mover_preferred() {
        // Both a white man (13 over 17) and a white lady (5 over 9) can
        // take exactly one piece; the lady's capture wins the ladder.
        let pos = Position::from_setup(&[13], &[5], &[17, 9], &[], Color::White);
        let list = moves_of(&pos);
        assert_eq!(list.len(), 1);
        assert!(list[0].is_lady_move);
        assert_eq!(list[0].from_square(), 5);
    }

    #[test]
    fn test_promotion_ends_capture_sequence() {
        // 20x29 promotes; without the promotion stop the fresh lady could
        // continue over 26, making a double. Exactly one capture allowed.
        let pos = Position::from_setup(&[20], &[], &[25, 26], &[], Color::White);
        let list = moves_of(&pos);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].to_square(), 29);
        assert_eq!(list[0].captured(), &[25]);
    }

    #[test]
    fn test_black_pawns_move_down() {
        let pos = Position::from_setup(&[], &[], &[22], &[], Color::Black);
        let list = moves_of(&pos);
        assert_eq!(list.len(), 2);
        for mv in &list {
            assert!(crate::board::row_of(mv.to_square()) < crate::board::row_of(22));
        }
    }

    #[test]
    fn test_threat_detection() {
        // Black to move can jump the white man on 17.
        let pos = Position::from_setup(&[17], &[], &[21], &[], Color::Black);
        assert!(is_square_threatened(&pos, 17));
        assert!(!is_square_threatened(&pos, 0));
    }
}
