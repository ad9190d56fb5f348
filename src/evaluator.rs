use serde::{Deserialize, Serialize};

use crate::board::BoardState;
use crate::enums::{Phase, PieceKind, Player, PLAYERS};
use crate::movegen::is_attacked;

/// Score assigned to a position where one side has lost its marshal
pub const WIN: f64 = 100_000.0;

/// Scores at or beyond this are treated as decided
pub const DECISIVE: f64 = WIN - 1_000.0;

/// Integer weights so symmetric positions score identically in f64
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalWeights {
    pub center_opening: i32,
    pub center_midgame: i32,
    pub center_endgame: i32,
    pub edge_penalty: i32,
    pub stacking_bonus: i32,
    pub king_exposure: i32,
}

impl Default for EvalWeights {
    fn default() -> Self {
        Self {
            center_opening: 3,
            center_midgame: 2,
            center_endgame: 1,
            edge_penalty: 4,
            stacking_bonus: 6,
            king_exposure: 300,
        }
    }
}

impl EvalWeights {
    fn center(&self, phase: Phase) -> i32 {
        match phase {
            Phase::Opening => self.center_opening,
            Phase::Midgame => self.center_midgame,
            Phase::Endgame => self.center_endgame,
        }
    }
}

/// Score split into its terms, from one player's point of view
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Evaluation {
    pub material: f64,
    pub positional: f64,
    pub king_safety: f64,
}

impl Evaluation {
    pub fn total(&self) -> f64 {
        self.material + self.positional + self.king_safety
    }

    fn scaled(self, sign: f64) -> Self {
        Evaluation {
            material: self.material * sign,
            positional: self.positional * sign,
            king_safety: self.king_safety * sign,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BoardEvaluator {
    pub weights: EvalWeights,
}

impl BoardEvaluator {
    pub fn new(weights: EvalWeights) -> Self {
        Self { weights }
    }

    pub fn evaluate(&self, board: &BoardState, player: Player) -> f64 {
        self.breakdown(board, player).total()
    }

    pub fn breakdown(&self, board: &BoardState, player: Player) -> Evaluation {
        self.absolute(board).scaled(player.sign())
    }

    /// Marshal exposure term for `player`: negative when its own marshal hangs
    pub fn king_safety(&self, board: &BoardState, player: Player) -> f64 {
        self.king_safety_absolute(board) as f64 * player.sign()
    }

    /// Terms from player one's point of view
    fn absolute(&self, board: &BoardState) -> Evaluation {
        let center = self.weights.center(board.phase);
        let mut material = 0i64;
        let mut positional = 0i64;

        for placement in board.placements() {
            let sign = owner_sign(placement.piece.owner);
            material += sign * placement.piece.value() as i64;

            if placement.is_top {
                let file_distance = (placement.square.col as i32 - 4).abs();
                positional += sign * ((4 - file_distance) * center) as i64;
                if placement.square.is_edge() && placement.piece.kind != PieceKind::Marshal {
                    positional -= sign * self.weights.edge_penalty as i64;
                }
            } else if let Some(top) = board.top(placement.square) {
                if top.owner == placement.piece.owner {
                    positional += sign * self.weights.stacking_bonus as i64;
                }
            }
        }

        let mut material = material as f64;
        for player in PLAYERS {
            if board.marshal(player).is_none() {
                material -= owner_sign(player) as f64 * WIN;
            }
        }

        Evaluation {
            material,
            positional: positional as f64,
            king_safety: self.king_safety_absolute(board) as f64,
        }
    }

    fn king_safety_absolute(&self, board: &BoardState) -> i64 {
        let mut total = 0i64;
        for player in PLAYERS {
            let exposed = board
                .marshal(player)
                .filter(|m| m.is_top)
                .map(|m| is_attacked(board, m.square, player.opponent()))
                .unwrap_or(false);
            if exposed {
                total -= owner_sign(player) * self.weights.king_exposure as i64;
            }
        }
        total
    }
}

fn owner_sign(player: Player) -> i64 {
    match player {
        Player::One => 1,
        Player::Two => -1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{Piece, Square};
    use crate::movegen::pseudo_moves;

    fn sq(row: u8, col: u8) -> Square {
        Square::new(row, col).unwrap()
    }

    fn lopsided_board() -> BoardState {
        let mut board = BoardState::empty(Player::One);
        let place = |b: &mut BoardState, r, c, kind, owner| {
            b.place(sq(r, c), Piece::new(kind, owner)).unwrap();
        };
        place(&mut board, 0, 2, PieceKind::Marshal, Player::One);
        place(&mut board, 1, 1, PieceKind::Fortress, Player::One);
        place(&mut board, 1, 1, PieceKind::General, Player::One);
        place(&mut board, 3, 7, PieceKind::Rider, Player::One);
        place(&mut board, 8, 5, PieceKind::Marshal, Player::Two);
        place(&mut board, 2, 3, PieceKind::Archer, Player::Two);
        place(&mut board, 6, 8, PieceKind::Pawn, Player::Two);
        board
    }

    #[test]
    fn test_mirror_symmetry_on_many_positions() {
        let evaluator = BoardEvaluator::default();
        let mut board = lopsided_board();
        for _ in 0..12 {
            let a = evaluator.evaluate(&board, Player::One);
            assert_eq!(a, -evaluator.evaluate(&board.mirrored(), Player::Two));
            assert_eq!(a, -evaluator.evaluate(&board, Player::Two));
            assert_eq!(a, evaluator.evaluate(&board.color_flipped(), Player::Two));
            match pseudo_moves(&board).last() {
                Some(mv) => board = board.apply(mv),
                None => break,
            }
        }
    }

    #[test]
    fn test_opening_is_balanced() {
        let evaluator = BoardEvaluator::default();
        let board = BoardState::standard_opening();
        assert_eq!(evaluator.evaluate(&board, Player::One), 0.0);
    }

    #[test]
    fn test_exposed_marshal_is_penalised() {
        let evaluator = BoardEvaluator::default();
        let board = lopsided_board();
        let before = evaluator.king_safety(&board, Player::One);

        let mut exposed = board;
        exposed
            .place(sq(1, 3), Piece::new(PieceKind::Spy, Player::Two))
            .unwrap();
        let after = evaluator.king_safety(&exposed, Player::One);
        assert_eq!(before, 0.0);
        assert_eq!(after, -300.0);
    }

    #[test]
    fn test_missing_marshal_is_decisive() {
        let evaluator = BoardEvaluator::default();
        let mut board = BoardState::empty(Player::One);
        board
            .place(sq(0, 4), Piece::new(PieceKind::Marshal, Player::One))
            .unwrap();
        assert!(evaluator.evaluate(&board, Player::One) >= DECISIVE);
        assert!(evaluator.evaluate(&board, Player::Two) <= -DECISIVE);
    }

    #[test]
    fn test_friendly_stack_bonus() {
        let evaluator = BoardEvaluator::default();
        let mut flat = BoardState::empty(Player::One);
        flat.place(sq(4, 4), Piece::new(PieceKind::Pawn, Player::One))
            .unwrap();
        flat.place(sq(4, 3), Piece::new(PieceKind::Spy, Player::One))
            .unwrap();
        let mut stacked = BoardState::empty(Player::One);
        stacked
            .place(sq(4, 4), Piece::new(PieceKind::Pawn, Player::One))
            .unwrap();
        stacked
            .place(sq(4, 4), Piece::new(PieceKind::Spy, Player::One))
            .unwrap();
        let flat_eval = evaluator.breakdown(&flat, Player::One);
        let stacked_eval = evaluator.breakdown(&stacked, Player::One);
        assert_eq!(flat_eval.material, stacked_eval.material);
        // center 12 + 9 against center 12 + buried friendly 6
        assert_eq!(flat_eval.positional, 12.0 + 9.0);
        assert_eq!(stacked_eval.positional, 12.0 + 6.0);
    }
}
