//! Reach model used by evaluation and interior search nodes.
//!
//! Each piece kind has a set of directions and a base range. A piece sitting on a
//! stack reaches one extra step per tier beneath it. Only the top piece of a stack
//! moves or attacks, and slides stop at the first occupied cell. Drops and full
//! rules legality are the caller's concern; the root of a search always works from
//! the legal moves it was handed.

use std::cmp::Reverse;

use crate::actions::Move;
use crate::board::{BoardState, Square, BOARD_SIZE};
use crate::enums::{MoveKind, PieceKind, Player};

type Dir = (i8, i8);

const ALL8: &[Dir] = &[
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];
const ORTHO: &[Dir] = &[(1, 0), (-1, 0), (0, 1), (0, -1)];
const DIAG: &[Dir] = &[(1, 1), (1, -1), (-1, 1), (-1, -1)];
const FORWARD: &[Dir] = &[(1, 0)];
const FORWARD_FAN: &[Dir] = &[(1, 0), (1, 1), (1, -1)];

/// Directions (with `dr` relative to the owner's forward) and base range
fn reach(kind: PieceKind) -> (&'static [Dir], usize) {
    match kind {
        PieceKind::Marshal => (ALL8, 1),
        PieceKind::General => (ALL8, 2),
        PieceKind::Lieutenant => (ORTHO, 3),
        PieceKind::Major => (DIAG, 3),
        PieceKind::Rider => (FORWARD_FAN, 2),
        PieceKind::Lancer => (FORWARD, 3),
        PieceKind::Archer => (DIAG, 2),
        PieceKind::Spy => (ALL8, 1),
        PieceKind::Fortress => (ORTHO, 1),
        PieceKind::Pawn => (FORWARD, 1),
    }
}

/// Squares the top piece at `from` can reach, including the first blocker on each line
pub fn targets(board: &BoardState, from: Square) -> Vec<Square> {
    let stack = board.stack(from);
    let Some(piece) = stack.top() else {
        return Vec::new();
    };
    let (dirs, base) = reach(piece.kind);
    let range = (base + stack.height() - 1).min(BOARD_SIZE - 1);
    let forward = piece.owner.forward();

    let mut out = Vec::new();
    for &(dr, dc) in dirs {
        let mut cursor = from;
        for _ in 0..range {
            match cursor.offset(dr * forward, dc) {
                Some(next) => {
                    out.push(next);
                    if !board.stack(next).is_empty() {
                        break;
                    }
                    cursor = next;
                }
                None => break,
            }
        }
    }
    out
}

/// Whether any top piece owned by `by` reaches `square` in one ply
pub fn is_attacked(board: &BoardState, square: Square, by: Player) -> bool {
    board
        .placements()
        .filter(|p| p.is_top && p.piece.owner == by && p.square != square)
        .any(|p| targets(board, p.square).contains(&square))
}

/// Moves available to the side to move under the reach model, best-first
pub fn pseudo_moves(board: &BoardState) -> Vec<Move> {
    let me = board.current_player;
    let mut moves = Vec::new();
    for placement in board.placements().filter(|p| p.is_top && p.piece.owner == me) {
        let from = placement.square;
        let piece = placement.piece;
        for to in targets(board, from) {
            let target = board.stack(to);
            match target.top() {
                None => moves.push(Move::normal(from, to, piece)),
                Some(top) if top.owner != me => moves.push(Move::capture(from, to, piece, top)),
                Some(top) if top.kind != PieceKind::Marshal && !target.is_full() => {
                    moves.push(Move::stack(from, to, piece))
                }
                Some(_) => {}
            }
        }
    }
    order_moves(&mut moves);
    moves
}

/// Ordering key: captures by MVV/LVA, then stacks, then the rest
pub fn order_key(mv: &Move) -> i32 {
    match mv.kind {
        MoveKind::Capture => 10_000 + mv.captured_value() * 16 - mv.piece.value() / 8,
        MoveKind::Stack => 1,
        MoveKind::Normal | MoveKind::Drop => 0,
    }
}

/// Stable sort so ties keep their incoming order
pub fn order_moves(moves: &mut [Move]) {
    moves.sort_by_key(|mv| Reverse(order_key(mv)));
}
