use serde::{Deserialize, Serialize};

use crate::actions::Move;
use crate::board::BoardState;
use crate::config::AIConfig;
use crate::enums::{Personality, Player};
use crate::evaluator::{BoardEvaluator, Evaluation};

const CAPTURE_BONUS: f64 = 30.0;
const CAPTURE_VALUE_SHARE: f64 = 0.2;
const APPROACH_BONUS: f64 = 8.0;
const DEFENSE_SHARE: f64 = 0.25;
const EXCHANGE_BONUS: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Traits {
    pub aggression: f64,
    pub risk_tolerance: f64,
    pub patience: f64,
    pub adaptability: f64,
}

/// Per-personality defaults for (aggression, risk tolerance)
pub fn default_traits(personality: Personality) -> (f64, f64) {
    match personality {
        Personality::Aggressive => (0.85, 0.8),
        Personality::Defensive => (0.2, 0.2),
        Personality::Balanced => (0.5, 0.5),
        Personality::Tactical => (0.6, 0.4),
    }
}

/// Shapes move selection; never removes candidates
#[derive(Debug, Clone, PartialEq)]
pub struct PersonalityModel {
    personality: Personality,
    aggression: f64,
    risk_tolerance: f64,
}

impl PersonalityModel {
    pub fn new(personality: Personality, aggression: f64, risk_tolerance: f64) -> Self {
        Self {
            personality,
            aggression: aggression.clamp(0.0, 1.0),
            risk_tolerance: risk_tolerance.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &AIConfig) -> Self {
        Self::new(config.personality, config.aggression, config.risk_tolerance)
    }

    pub fn traits(&self) -> Traits {
        let adaptability = match self.personality {
            Personality::Aggressive => 0.3,
            Personality::Defensive => 0.4,
            Personality::Balanced => 0.6,
            Personality::Tactical => 0.8,
        };
        Traits {
            aggression: self.aggression,
            risk_tolerance: self.risk_tolerance,
            patience: 1.0 - self.aggression,
            adaptability,
        }
    }

    /// Weight of the (attacking, defensive) styles
    fn style(&self) -> (f64, f64) {
        match self.personality {
            Personality::Aggressive => (1.0, 0.0),
            Personality::Defensive => (0.0, 1.0),
            Personality::Balanced => (0.5, 0.5),
            Personality::Tactical => (0.7, 0.3),
        }
    }

    /// Adds each move's personality bonus to its base score
    pub fn bias_moves(
        &self,
        evaluator: &BoardEvaluator,
        board: &BoardState,
        moves: &[Move],
        base_scores: &[f64],
    ) -> Vec<f64> {
        debug_assert_eq!(moves.len(), base_scores.len());
        base_scores
            .iter()
            .zip(moves)
            .map(|(base, mv)| base + self.move_bonus(evaluator, board, mv))
            .collect()
    }

    pub fn move_bonus(&self, evaluator: &BoardEvaluator, board: &BoardState, mv: &Move) -> f64 {
        let me = board.current_player;
        let (attack, defense) = self.style();
        let mut bonus = 0.0;

        if attack > 0.0 {
            let mut attacking = 0.0;
            if mv.is_capture {
                attacking += CAPTURE_BONUS + CAPTURE_VALUE_SHARE * mv.captured_value() as f64;
            }
            if let (Some(from), Some(target)) = (mv.from, board.marshal(me.opponent())) {
                let gained = from.distance(target.square) as f64 - mv.to.distance(target.square) as f64;
                attacking += APPROACH_BONUS * gained;
            }
            bonus += attack * self.aggression * attacking;
        }

        if defense > 0.0 {
            let next = board.apply(mv);
            let delta = evaluator.king_safety(&next, me) - evaluator.king_safety(board, me);
            bonus += defense * (1.0 - self.risk_tolerance) * DEFENSE_SHARE * delta;
        }

        if self.personality == Personality::Tactical
            && mv.is_capture
            && mv.captured_value() >= mv.piece.value()
        {
            bonus += EXCHANGE_BONUS;
        }
        bonus
    }

    /// Adjustment applied to leaf evaluations, same point of view as `breakdown`
    pub fn leaf_bias(&self, breakdown: &Evaluation) -> f64 {
        let (attack, defense) = self.style();
        attack * self.aggression * 0.1 * breakdown.material
            + defense * (1.0 - self.risk_tolerance) * 0.5 * breakdown.king_safety
    }

    /// Static score of `board` for `root` with this personality's leaf bias
    pub fn biased_eval(&self, evaluator: &BoardEvaluator, board: &BoardState, root: Player) -> f64 {
        let breakdown = evaluator.breakdown(board, root);
        breakdown.total() + self.leaf_bias(&breakdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{Piece, Square};
    use crate::enums::PieceKind;

    fn sq(row: u8, col: u8) -> Square {
        Square::new(row, col).unwrap()
    }

    fn model(personality: Personality) -> PersonalityModel {
        let (aggression, risk) = default_traits(personality);
        PersonalityModel::new(personality, aggression, risk)
    }

    /// Player one's general can take a pawn or retreat beside its marshal
    fn board_and_moves() -> (BoardState, Vec<Move>) {
        let mut board = BoardState::empty(Player::One);
        let general = Piece::new(PieceKind::General, Player::One);
        let pawn = Piece::new(PieceKind::Pawn, Player::Two);
        board
            .place(sq(0, 4), Piece::new(PieceKind::Marshal, Player::One))
            .unwrap();
        board
            .place(sq(8, 4), Piece::new(PieceKind::Marshal, Player::Two))
            .unwrap();
        board.place(sq(4, 4), general).unwrap();
        board.place(sq(5, 4), pawn).unwrap();
        board
            .place(sq(1, 5), Piece::new(PieceKind::Spy, Player::Two))
            .unwrap();
        let moves = vec![
            Move::capture(sq(4, 4), sq(5, 4), general, pawn),
            Move::normal(sq(4, 4), sq(2, 4), general),
        ];
        (board, moves)
    }

    #[test]
    fn test_traits_patience_complements_aggression() {
        for personality in crate::enums::PERSONALITIES {
            let traits = model(personality).traits();
            assert!((traits.patience + traits.aggression - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_bias_keeps_length() {
        let evaluator = BoardEvaluator::default();
        let (board, moves) = board_and_moves();
        let scores = model(Personality::Balanced).bias_moves(&evaluator, &board, &moves, &[0.0, 0.0]);
        assert_eq!(scores.len(), moves.len());
    }

    #[test]
    fn test_aggressive_prefers_capture_more_than_defensive() {
        let evaluator = BoardEvaluator::default();
        let (board, moves) = board_and_moves();
        let aggressive = model(Personality::Aggressive).bias_moves(&evaluator, &board, &moves, &[0.0, 0.0]);
        let defensive = model(Personality::Defensive).bias_moves(&evaluator, &board, &moves, &[0.0, 0.0]);
        assert!(aggressive[0] > aggressive[1]);
        assert!(aggressive[0] - aggressive[1] > defensive[0] - defensive[1]);
    }

    #[test]
    fn test_defensive_rewards_covering_marshal() {
        let evaluator = BoardEvaluator::default();
        let mut board = BoardState::empty(Player::One);
        board
            .place(sq(0, 4), Piece::new(PieceKind::Marshal, Player::One))
            .unwrap();
        board
            .place(sq(8, 4), Piece::new(PieceKind::Marshal, Player::Two))
            .unwrap();
        let spy = Piece::new(PieceKind::Spy, Player::Two);
        board.place(sq(1, 5), spy).unwrap();
        let general = Piece::new(PieceKind::General, Player::One);
        board.place(sq(2, 5), general).unwrap();

        let take_spy = Move::capture(sq(2, 5), sq(1, 5), general, spy);
        let wander = Move::normal(sq(2, 5), sq(2, 7), general);
        let defensive = model(Personality::Defensive);
        assert!(
            defensive.move_bonus(&evaluator, &board, &take_spy)
                > defensive.move_bonus(&evaluator, &board, &wander)
        );
    }

    #[test]
    fn test_tactical_rewards_favourable_exchange() {
        let evaluator = BoardEvaluator::default();
        let (board, _) = board_and_moves();
        let spy = Piece::new(PieceKind::Spy, Player::One);
        let general = Piece::new(PieceKind::General, Player::Two);
        let mut board = board;
        board.place(sq(6, 6), spy).unwrap();
        board.place(sq(7, 6), general).unwrap();
        let trade = Move::capture(sq(6, 6), sq(7, 6), spy, general);
        let tactical = model(Personality::Tactical).move_bonus(&evaluator, &board, &trade);
        let balanced = model(Personality::Balanced).move_bonus(&evaluator, &board, &trade);
        assert!(tactical > balanced);
    }
}
