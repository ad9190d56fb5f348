use std::sync::Arc;
use std::time::{Duration, Instant};

use log::trace;

use crate::actions::Move;
use crate::board::BoardState;
use crate::deadline::{Aborted, SearchBudget};
use crate::enums::Player;
use crate::evaluator::{BoardEvaluator, DECISIVE, WIN};
use crate::movegen::{order_moves, pseudo_moves};
use crate::personality::PersonalityModel;

use super::nn::LearnedEvaluator;
use super::{BotPlayer, Decision, SearchOutcome};

/// Nodes between deadline checks
const NODE_BATCH: u64 = 64;

/// A learned prediction of 1.0 is worth this much static score
pub(crate) const LEARNED_SCALE: f64 = 400.0;

/// Bounds on the effective branching factor used to project the next depth's cost
const MIN_GROWTH: f64 = 3.0;
const MAX_GROWTH: f64 = 16.0;
const PROJECTION_SLACK: f64 = 1.5;

/// Learned leaf blend used by the hybrid tier
#[derive(Clone)]
pub(crate) struct LearnedBlend {
    pub evaluator: Arc<dyn LearnedEvaluator>,
    pub weight: f64,
}

/// Iterative-deepening negamax shared by the medium and hard tiers
#[derive(Clone)]
pub(crate) struct SearchCore {
    pub evaluator: Arc<BoardEvaluator>,
    pub personality: PersonalityModel,
    pub max_depth: u32,
    pub learned: Option<LearnedBlend>,
}

struct Context<'a> {
    budget: &'a SearchBudget,
    root: Player,
    nodes: u64,
    /// Set once a depth has completed: from then on the soft instant ends the search
    stop_at_soft: bool,
}

impl Context<'_> {
    fn expired(&self) -> bool {
        if self.stop_at_soft {
            self.budget.soft_expired()
        } else {
            self.budget.should_abort()
        }
    }

    fn tick(&mut self) -> Result<(), Aborted> {
        self.nodes += 1;
        if self.nodes % NODE_BATCH == 1 && self.expired() {
            return Err(Aborted);
        }
        Ok(())
    }
}

/// Result of one root iteration
struct RootResult {
    best: usize,
    score: f64,
}

/// Best root move found before an iteration was cut short
struct PartialRoot {
    best: Option<usize>,
}

impl SearchCore {
    /// Leaf score for the side to move, built from the root player's biased view
    fn leaf(&self, board: &BoardState, root: Player) -> f64 {
        let mut value = self.personality.biased_eval(&self.evaluator, board, root);
        if let Some(blend) = &self.learned {
            let predicted = blend.evaluator.predict(board);
            let for_root = if board.current_player == root {
                predicted
            } else {
                -predicted
            };
            value = (1.0 - blend.weight) * value + blend.weight * LEARNED_SCALE * for_root;
        }
        if board.current_player == root {
            value
        } else {
            -value
        }
    }

    fn negamax(
        &self,
        board: &BoardState,
        depth: u32,
        mut alpha: f64,
        beta: f64,
        ply: u32,
        ctx: &mut Context,
    ) -> Result<f64, Aborted> {
        ctx.tick()?;

        // side to move has lost its marshal
        if board.marshal(board.current_player).is_none() {
            return Ok(-(WIN - ply as f64));
        }
        if depth == 0 {
            return Ok(self.leaf(board, ctx.root));
        }

        let moves = pseudo_moves(board);
        if moves.is_empty() {
            return Ok(self.leaf(board, ctx.root));
        }

        let mut best = f64::NEG_INFINITY;
        for mv in &moves {
            let child = board.apply(mv);
            let value = -self.negamax(&child, depth - 1, -beta, -alpha, ply + 1, ctx)?;
            if value > best {
                best = value;
            }
            if value > alpha {
                alpha = value;
            }
            if alpha >= beta {
                break; // beta cut-off
            }
        }
        Ok(best)
    }

    /// One full-width root iteration; each root move carries its personality bonus
    fn search_root(
        &self,
        board: &BoardState,
        moves: &[Move],
        bonus: &[f64],
        order: &[usize],
        depth: u32,
        ctx: &mut Context,
    ) -> Result<RootResult, PartialRoot> {
        let mut alpha = f64::NEG_INFINITY;
        let beta = f64::INFINITY;
        let mut best: Option<(usize, f64)> = None;

        for &i in order {
            if ctx.expired() {
                return Err(PartialRoot { best: best.map(|(i, _)| i) });
            }
            let child = board.apply(&moves[i]);
            let b = bonus[i];
            let value = match self.negamax(&child, depth - 1, -(beta - b), -(alpha - b), 1, ctx) {
                Ok(child_score) => b - child_score,
                Err(Aborted) => return Err(PartialRoot { best: best.map(|(i, _)| i) }),
            };
            if best.map_or(true, |(_, s)| value > s) {
                best = Some((i, value));
            }
            if value > alpha {
                alpha = value;
            }
        }

        match best {
            Some((best, score)) => Ok(RootResult { best, score }),
            None => Err(PartialRoot { best: None }),
        }
    }

    /// Deepen from 1 to `max_depth` while time allows.
    /// Depth 1 may run to the hard instant; deeper iterations are abandoned at the soft one.
    /// `moves` must be in the order the first iteration should try them.
    pub fn iterative_deepening(&self, board: &BoardState, moves: &[Move], budget: &SearchBudget) -> Decision {
        let Some(&first) = moves.first() else {
            return Decision::none();
        };
        if moves.len() == 1 {
            return Decision::immediate(first);
        }

        let zeros = vec![0.0; moves.len()];
        let bonus = self
            .personality
            .bias_moves(&self.evaluator, board, moves, &zeros);

        let mut ctx = Context {
            budget,
            root: board.current_player,
            nodes: 0,
            stop_at_soft: false,
        };
        let mut order: Vec<usize> = (0..moves.len()).collect();
        let mut decision = Decision {
            mv: Some(first),
            outcome: SearchOutcome::Completed,
            depth_reached: 0,
            nodes: 0,
            score: None,
        };
        let mut last_cost: Option<(Duration, u64)> = None;
        let mut growth = MIN_GROWTH;

        for depth in 1..=self.max_depth.max(1) {
            if let Some((cost, _)) = last_cost {
                let projected = cost.mul_f64(growth * PROJECTION_SLACK);
                if budget.soft_expired() || !budget.fits_before_soft(projected) {
                    trace!("Stopping before depth {}: projected {:?}", depth, projected);
                    break;
                }
            }

            let started = Instant::now();
            let nodes_before = ctx.nodes;
            ctx.stop_at_soft = decision.depth_reached >= 1;
            match self.search_root(board, moves, &bonus, &order, depth, &mut ctx) {
                Ok(result) => {
                    let nodes = ctx.nodes - nodes_before;
                    if let Some((_, previous_nodes)) = last_cost {
                        growth = (nodes as f64 / previous_nodes.max(1) as f64).clamp(MIN_GROWTH, MAX_GROWTH);
                    }
                    last_cost = Some((started.elapsed(), nodes));

                    decision.mv = Some(moves[result.best]);
                    decision.score = Some(result.score);
                    decision.depth_reached = depth;
                    trace!(
                        "Depth {} done in {:?}: score {:.1}, {} nodes",
                        depth,
                        started.elapsed(),
                        result.score,
                        nodes
                    );

                    // principal move first on the next iteration
                    order.retain(|&i| i != result.best);
                    order.insert(0, result.best);

                    if result.score.abs() >= DECISIVE {
                        break;
                    }
                }
                Err(partial) => {
                    decision.outcome = SearchOutcome::DeadlineAborted;
                    if decision.depth_reached == 0 {
                        if let Some(best) = partial.best {
                            decision.mv = Some(moves[best]);
                        }
                    }
                    trace!("Depth {} abandoned after {:?}", depth, budget.elapsed());
                    break;
                }
            }
        }

        decision.nodes = ctx.nodes;
        decision
    }
}

/// Alpha-Beta Minimax Player
/// Medium tier: static evaluation plus personality bias at the leaves
pub struct AlphaBetaPlayer {
    core: SearchCore,
}

impl AlphaBetaPlayer {
    pub fn new(evaluator: Arc<BoardEvaluator>, personality: PersonalityModel, depth: u32) -> Self {
        AlphaBetaPlayer {
            core: SearchCore {
                evaluator,
                personality,
                max_depth: depth,
                learned: None,
            },
        }
    }
}

impl BotPlayer for AlphaBetaPlayer {
    fn decide(&mut self, board: &BoardState, legal: &[Move], budget: &SearchBudget) -> Decision {
        let mut ordered = legal.to_vec();
        order_moves(&mut ordered);
        self.core.iterative_deepening(board, &ordered, budget)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Piece;
    use crate::enums::{Personality, PieceKind};
    use crate::movegen::pseudo_moves;
    use crate::personality::default_traits;
    use crate::players::test_support::{skirmish, sq};

    fn player(personality: Personality, depth: u32) -> AlphaBetaPlayer {
        let (aggression, risk) = default_traits(personality);
        AlphaBetaPlayer::new(
            Arc::new(BoardEvaluator::default()),
            PersonalityModel::new(personality, aggression, risk),
            depth,
        )
    }

    #[test]
    fn test_takes_the_enemy_marshal() {
        let mut board = skirmish();
        let marshal = Piece::new(PieceKind::Marshal, Player::Two);
        board.cells[8][4] = Default::default();
        board.place(sq(5, 3), marshal).unwrap();
        let legal = pseudo_moves(&board);

        let decision = player(Personality::Defensive, 3).decide(&board, &legal, &SearchBudget::unbounded());
        assert_eq!(decision.mv.unwrap().captured, Some(marshal));
        assert_eq!(decision.outcome, SearchOutcome::Completed);
    }

    #[test]
    fn test_deepens_to_max_depth_without_deadline() {
        let board = skirmish();
        let legal = pseudo_moves(&board);
        let decision = player(Personality::Balanced, 3).decide(&board, &legal, &SearchBudget::unbounded());
        assert_eq!(decision.depth_reached, 3);
        assert!(decision.nodes > legal.len() as u64);
    }

    #[test]
    fn test_cancelled_search_still_returns_legal_move() {
        let board = BoardState::standard_opening();
        let legal = pseudo_moves(&board);
        let budget = SearchBudget::unbounded();
        budget.cancel();

        let decision = player(Personality::Aggressive, 4).decide(&board, &legal, &budget);
        assert_eq!(decision.outcome, SearchOutcome::DeadlineAborted);
        assert_eq!(decision.depth_reached, 0);
        assert!(legal.contains(&decision.mv.unwrap()));
    }

    #[test]
    fn test_hard_deadline_respected() {
        let board = BoardState::standard_opening();
        let legal = pseudo_moves(&board);
        let budget = SearchBudget::new(Duration::from_millis(20), Duration::from_millis(30));
        let started = Instant::now();
        let decision = player(Personality::Tactical, 12).decide(&board, &legal, &budget);
        assert!(started.elapsed() < Duration::from_millis(60));
        assert!(legal.contains(&decision.mv.unwrap()));
    }

    #[test]
    fn test_soft_deadline_ends_deeper_iterations() {
        let mut board = BoardState::standard_opening();
        for _ in 0..6 {
            let legal = pseudo_moves(&board);
            let budget = SearchBudget::new(Duration::from_millis(25), Duration::from_millis(80));
            let decision = player(Personality::Balanced, 12).decide(&board, &legal, &budget);
            let elapsed = budget.elapsed();
            assert!(elapsed < Duration::from_millis(40), "took {elapsed:?}");
            assert!(decision.depth_reached >= 1);
            board = board.apply(&decision.mv.unwrap());
        }
    }

    #[test]
    fn test_fixed_position_is_deterministic() {
        let board = skirmish();
        let legal = pseudo_moves(&board);
        let a = player(Personality::Balanced, 3).decide(&board, &legal, &SearchBudget::unbounded());
        let b = player(Personality::Balanced, 3).decide(&board, &legal, &SearchBudget::unbounded());
        assert_eq!(a.mv, b.mv);
        assert_eq!(a.score, b.score);
    }

    #[test]
    fn test_single_legal_move_returned_immediately() {
        let board = skirmish();
        let legal = vec![pseudo_moves(&board)[0]];
        let decision = player(Personality::Balanced, 3).decide(&board, &legal, &SearchBudget::unbounded());
        assert_eq!(decision.mv, Some(legal[0]));
        assert_eq!(decision.nodes, 0);
    }
}
