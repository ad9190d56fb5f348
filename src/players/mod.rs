// Players module - the three search strategies an agent can run
//
// Each tier has one player implementation behind the BotPlayer trait; the closed
// SearchStrategy enum picks the right one from an agent's configuration.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::actions::Move;
use crate::board::BoardState;
use crate::config::AIConfig;
use crate::deadline::SearchBudget;
use crate::enums::Difficulty;
use crate::evaluator::BoardEvaluator;
use crate::personality::PersonalityModel;

pub mod hybrid;
pub mod minimax;
pub mod nn;
pub mod random;

pub use self::hybrid::HybridPlayer;
pub use self::minimax::AlphaBetaPlayer;
pub use self::nn::LearnedEvaluator;
pub use self::random::RandomPlayer;

/// How a search ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchOutcome {
    Completed,
    /// Stopped by the hard deadline or cancellation; the move is the best found so far
    DeadlineAborted,
}

/// Lifecycle of one agent's search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchState {
    Idle,
    Searching,
    Completed,
    Aborted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub mv: Option<Move>,
    pub outcome: SearchOutcome,
    pub depth_reached: u32,
    pub nodes: u64,
    pub score: Option<f64>,
}

impl Decision {
    /// Nothing to choose from
    pub fn none() -> Self {
        Decision {
            mv: None,
            outcome: SearchOutcome::Completed,
            depth_reached: 0,
            nodes: 0,
            score: None,
        }
    }

    pub fn immediate(mv: Move) -> Self {
        Decision {
            mv: Some(mv),
            ..Decision::none()
        }
    }
}

pub trait BotPlayer: Send {
    /// Pick one of `legal` for the side to move on `board`.
    /// Must return `None` only when `legal` is empty.
    fn decide(&mut self, board: &BoardState, legal: &[Move], budget: &SearchBudget) -> Decision;
}

/// Shared read-only scoring components handed to every agent
#[derive(Clone)]
pub struct Evaluators {
    pub board: Arc<BoardEvaluator>,
    pub learned: Arc<dyn LearnedEvaluator>,
    pub learned_weight: f64,
}

pub enum SearchStrategy {
    Randomized(RandomPlayer),
    Minimax(AlphaBetaPlayer),
    Hybrid(HybridPlayer),
}

impl SearchStrategy {
    /// Easy maps to randomized, medium to alpha-beta, hard to hybrid
    pub fn for_config(config: &AIConfig, evaluators: &Evaluators, seed: Option<u64>) -> Self {
        let personality = PersonalityModel::from_config(config);
        match config.difficulty {
            Difficulty::Easy => {
                SearchStrategy::Randomized(RandomPlayer::new(config.capture_bias_rate, seed))
            }
            Difficulty::Medium => SearchStrategy::Minimax(AlphaBetaPlayer::new(
                Arc::clone(&evaluators.board),
                personality,
                config.search_depth,
            )),
            Difficulty::Hard => SearchStrategy::Hybrid(HybridPlayer::new(
                Arc::clone(&evaluators.board),
                personality,
                config.search_depth,
                Arc::clone(&evaluators.learned),
                evaluators.learned_weight,
            )),
        }
    }

    pub fn select_move(&mut self, board: &BoardState, legal: &[Move], budget: &SearchBudget) -> Decision {
        match self {
            SearchStrategy::Randomized(player) => player.decide(board, legal, budget),
            SearchStrategy::Minimax(player) => player.decide(board, legal, budget),
            SearchStrategy::Hybrid(player) => player.decide(board, legal, budget),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SearchStrategy::Randomized(_) => "randomized",
            SearchStrategy::Minimax(_) => "minimax",
            SearchStrategy::Hybrid(_) => "hybrid",
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::enums::Personality;
    use crate::movegen::pseudo_moves;
    use crate::players::nn::NoopEvaluator;

    fn evaluators() -> Evaluators {
        Evaluators {
            board: Arc::new(BoardEvaluator::default()),
            learned: Arc::new(NoopEvaluator),
            learned_weight: 0.6,
        }
    }

    #[test]
    fn test_tier_maps_to_strategy() {
        let names: Vec<_> = crate::enums::DIFFICULTIES
            .iter()
            .map(|d| {
                let config = AIConfig::new(*d, Personality::Balanced);
                SearchStrategy::for_config(&config, &evaluators(), Some(1)).name()
            })
            .collect();
        assert_eq!(names, vec!["randomized", "minimax", "hybrid"]);
    }

    #[test]
    fn test_every_strategy_returns_a_legal_move() {
        let board = skirmish();
        let legal = pseudo_moves(&board);
        for difficulty in crate::enums::DIFFICULTIES {
            let config = AIConfig::new(difficulty, Personality::Tactical);
            let mut strategy = SearchStrategy::for_config(&config, &evaluators(), Some(3));
            let budget = SearchBudget::new(config.soft_deadline(), config.hard_deadline());
            let decision = strategy.select_move(&board, &legal, &budget);
            assert!(legal.contains(&decision.mv.unwrap()));
        }
    }

    #[test]
    fn test_empty_legal_list_yields_none() {
        let board = skirmish();
        for difficulty in crate::enums::DIFFICULTIES {
            let config = AIConfig::new(difficulty, Personality::Defensive);
            let mut strategy = SearchStrategy::for_config(&config, &evaluators(), None);
            let decision = strategy.select_move(&board, &[], &SearchBudget::unbounded());
            assert_eq!(decision.mv, None);
        }
    }
}
