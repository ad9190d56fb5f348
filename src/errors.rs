use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::enums::{Difficulty, Personality, Player};

/// Match identifiers handed out by the manager
pub type MatchId = String;

/// Top-level error type for the decision engine
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Resource exhausted: no free agent for {difficulty}/{personality}")]
    ResourceExhausted {
        difficulty: Difficulty,
        personality: Personality,
    },

    #[error("Match not found: {match_id}")]
    MatchNotFound { match_id: MatchId },

    #[error("Match {match_id} is not accepting requests: {details}")]
    MatchNotActive { match_id: MatchId, details: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Agent manager has been shut down")]
    ShutDown,
}

/// Malformed board or move input, rejected before any search begins
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("Square out of bounds: ({row}, {col})")]
    OutOfBounds { row: u8, col: u8 },

    #[error("Stack holds {height} pieces (max 3)")]
    StackOverflow { height: usize },

    #[error("Player {player} has {count} marshals on the board")]
    DuplicateMarshal { player: Player, count: usize },

    #[error("Invalid player id: {0}")]
    InvalidPlayer(u8),

    #[error("Move {index}: {details}")]
    InvalidMove { index: usize, details: String },

    #[error("Seat for player {player} is held by an external player")]
    ExternalSeat { player: Player },
}

/// Result type aliases for convenience
pub type EngineResult<T> = Result<T, EngineError>;
pub type ValidationResult<T> = Result<T, ValidationError>;

impl EngineError {
    pub fn exhausted(difficulty: Difficulty, personality: Personality) -> Self {
        Self::ResourceExhausted {
            difficulty,
            personality,
        }
    }

    pub fn match_not_found(match_id: impl Into<MatchId>) -> Self {
        Self::MatchNotFound {
            match_id: match_id.into(),
        }
    }

    pub fn not_active(match_id: impl Into<MatchId>, details: impl Into<String>) -> Self {
        Self::MatchNotActive {
            match_id: match_id.into(),
            details: details.into(),
        }
    }

    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, Self::ResourceExhausted { .. })
    }
}

impl ValidationError {
    pub fn invalid_move(index: usize, details: impl Into<String>) -> Self {
        Self::InvalidMove {
            index,
            details: details.into(),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Configuration(err.to_string())
    }
}
