use crate::board::{BoardState, Square};
use crate::enums::{PieceKind, PIECE_KINDS};
use crate::movegen::is_attacked;

/// Per-kind piece balance plus center control, tall stacks and marshal exposure
pub const FEATURE_DIM: usize = PIECE_KINDS.len() + 4;

const CENTER_FEATURE: usize = PIECE_KINDS.len();
const STACK_FEATURE: usize = CENTER_FEATURE + 1;
const OWN_EXPOSED: usize = STACK_FEATURE + 1;
const ENEMY_EXPOSED: usize = OWN_EXPOSED + 1;

fn in_center(square: Square) -> bool {
    (3..=5).contains(&square.row) && (3..=5).contains(&square.col)
}

/// Encode the board from the point of view of the side to move.
/// Counts are own minus opponent; exposure flags are 0 or 1.
pub fn encode_features(board: &BoardState) -> Vec<f32> {
    let me = board.current_player;
    let mut features = vec![0f32; FEATURE_DIM];

    for placement in board.placements() {
        let sign = if placement.piece.owner == me { 1.0 } else { -1.0 };
        features[placement.piece.kind.rank()] += sign;
        if placement.is_top {
            if in_center(placement.square) {
                features[CENTER_FEATURE] += sign;
            }
            if placement.tier > 0 {
                features[STACK_FEATURE] += sign;
            }
        }
    }

    for (slot, owner) in [(OWN_EXPOSED, me), (ENEMY_EXPOSED, me.opponent())] {
        let exposed = board
            .marshal(owner)
            .filter(|m| m.is_top)
            .map(|m| is_attacked(board, m.square, owner.opponent()))
            .unwrap_or(false);
        if exposed {
            features[slot] = 1.0;
        }
    }
    features
}

/// Default linear weights: material in units of 100 plus small positional terms
pub fn default_weights() -> Vec<f32> {
    let mut weights: Vec<f32> = PIECE_KINDS
        .iter()
        .map(|kind| match kind {
            PieceKind::Marshal => 4.0,
            other => other.value() as f32 / 100.0,
        })
        .collect();
    weights.extend([0.05, 0.03, -1.0, 0.8]);
    weights
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Piece;
    use crate::enums::Player;

    #[test]
    fn test_opening_features_are_balanced() {
        let board = BoardState::standard_opening();
        let features = encode_features(&board);
        assert_eq!(features.len(), FEATURE_DIM);
        assert!(features.iter().all(|f| *f == 0.0));
    }

    #[test]
    fn test_features_follow_side_to_move() {
        let mut board = BoardState::empty(Player::One);
        board
            .place(Square::new(4, 4).unwrap(), Piece::new(PieceKind::General, Player::One))
            .unwrap();
        let mine = encode_features(&board);
        board.current_player = Player::Two;
        let theirs = encode_features(&board);
        assert_eq!(mine[PieceKind::General.rank()], 1.0);
        assert_eq!(theirs[PieceKind::General.rank()], -1.0);
        assert_eq!(mine[CENTER_FEATURE], 1.0);
        assert_eq!(default_weights().len(), FEATURE_DIM);
    }
}
