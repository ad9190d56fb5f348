use super::types::LearnedEvaluator;
use crate::board::BoardState;

/// An evaluator with no opinion: every position is worth zero.
/// Lets the hybrid tier fall back to pure static evaluation.
pub struct NoopEvaluator;

impl LearnedEvaluator for NoopEvaluator {
    fn predict(&self, _board: &BoardState) -> f64 {
        0.0
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
