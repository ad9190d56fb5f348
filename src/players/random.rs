use rand::prelude::*;
use rand_xorshift::XorShiftRng;

use crate::actions::Move;
use crate::board::BoardState;
use crate::deadline::SearchBudget;

use super::{BotPlayer, Decision};

/// Easy tier: no search, just a capture-biased draw
pub struct RandomPlayer {
    capture_bias_rate: f64,
    rng: XorShiftRng,
}

impl RandomPlayer {
    pub fn new(capture_bias_rate: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => XorShiftRng::seed_from_u64(seed),
            None => XorShiftRng::from_entropy(),
        };
        RandomPlayer {
            capture_bias_rate: capture_bias_rate.clamp(0.0, 1.0),
            rng,
        }
    }

    /// With probability `capture_bias_rate` take a capture when one exists,
    /// otherwise take a non-capture; fall back to whichever group is non-empty
    pub fn pick(&mut self, legal: &[Move]) -> Option<Move> {
        let (captures, quiet): (Vec<&Move>, Vec<&Move>) = legal.iter().partition(|m| m.is_capture);
        let prefer_capture = !captures.is_empty() && self.rng.gen_bool(self.capture_bias_rate);
        let pool = if prefer_capture || quiet.is_empty() {
            &captures
        } else {
            &quiet
        };
        pool.choose(&mut self.rng).map(|m| **m)
    }
}

impl BotPlayer for RandomPlayer {
    fn decide(&mut self, _board: &BoardState, legal: &[Move], _budget: &SearchBudget) -> Decision {
        match self.pick(legal) {
            Some(mv) => Decision::immediate(mv),
            None => Decision::none(),
        }
    }
}
