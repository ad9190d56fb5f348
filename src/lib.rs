// Marshal Engine Library - Core Module Organization
//
// Tiered, personality-driven move selection for a 9x9 stacking board game,
// served to matches through a pooled agent manager under a hard latency ceiling.

// Board model and move types
pub mod actions;
pub mod board;
pub mod enums;
pub mod errors;
pub mod movegen;

// Scoring and decision making
pub mod evaluator;
pub mod personality;
pub mod players;

// Agents and their runtime
pub mod agent;
pub mod config;
pub mod deadline;
pub mod fraud;
pub mod manager;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export common types for convenient access
pub use crate::actions::Move;
pub use crate::agent::{AgentId, PerformanceSummary};
pub use crate::board::{BoardState, Piece, Square};
pub use crate::config::{AIConfig, EngineConfig};
pub use crate::enums::{Difficulty, MoveKind, Personality, Phase, PieceKind, Player};
pub use crate::errors::{EngineError, EngineResult, MatchId, ValidationError};
pub use crate::evaluator::BoardEvaluator;
pub use crate::fraud::{FraudAlert, FraudDetector};
pub use crate::manager::{
    AgentManager, DecisionSource, MatchResult, MatchStatus, MatchSummary, MoveEngine,
    MoveResponse, SeatConfig,
};
pub use crate::personality::PersonalityModel;
pub use crate::players::SearchStrategy;
