use crate::board::BoardState;

/// Trait describing a model that scores a position
pub trait LearnedEvaluator: Send + Sync {
    /// Value in [-1, 1] for the side to move
    fn predict(&self, board: &BoardState) -> f64;

    fn name(&self) -> &'static str {
        "learned"
    }
}
