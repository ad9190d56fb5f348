use std::cmp::Ordering;
use std::sync::Arc;

use rayon::prelude::*;

use crate::actions::Move;
use crate::board::BoardState;
use crate::deadline::SearchBudget;
use crate::evaluator::BoardEvaluator;
use crate::movegen::order_key;
use crate::personality::PersonalityModel;

use super::minimax::{LearnedBlend, SearchCore};
use super::nn::LearnedEvaluator;
use super::{BotPlayer, Decision};

/// Hard tier: alpha-beta whose leaves blend static and learned evaluation
pub struct HybridPlayer {
    core: SearchCore,
    learned: Arc<dyn LearnedEvaluator>,
}

impl HybridPlayer {
    pub fn new(
        evaluator: Arc<BoardEvaluator>,
        personality: PersonalityModel,
        depth: u32,
        learned: Arc<dyn LearnedEvaluator>,
        learned_weight: f64,
    ) -> Self {
        HybridPlayer {
            core: SearchCore {
                evaluator,
                personality,
                max_depth: depth,
                learned: Some(LearnedBlend {
                    evaluator: Arc::clone(&learned),
                    weight: learned_weight.clamp(0.0, 1.0),
                }),
            },
            learned,
        }
    }

    /// Captures by MVV/LVA first, everything else by the learned value of the
    /// resulting position. Predictions run in parallel and stop once the soft
    /// instant passes; moves left unscored keep their static order.
    fn order_root(&self, board: &BoardState, legal: &[Move], budget: &SearchBudget) -> Vec<Move> {
        let predictions: Vec<f64> = legal
            .par_iter()
            .map(|mv| {
                if budget.soft_expired() {
                    0.0
                } else {
                    -self.learned.predict(&board.apply(mv))
                }
            })
            .collect();

        let mut scored: Vec<(i32, f64, Move)> = legal
            .iter()
            .zip(predictions)
            .map(|(mv, p)| (order_key(mv), p, *mv))
            .collect();
        scored.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal))
        });
        scored.into_iter().map(|(_, _, mv)| mv).collect()
    }
}

impl BotPlayer for HybridPlayer {
    fn decide(&mut self, board: &BoardState, legal: &[Move], budget: &SearchBudget) -> Decision {
        if legal.len() <= 1 {
            return legal.first().map_or_else(Decision::none, |mv| Decision::immediate(*mv));
        }
        let ordered = self.order_root(board, legal, budget);
        self.core.iterative_deepening(board, &ordered, budget)
    }
}
