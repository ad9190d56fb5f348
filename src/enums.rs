use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Player {
    One = 1,
    Two = 2,
}

pub const PLAYERS: [Player; 2] = [Player::One, Player::Two];

impl Player {
    pub fn opponent(self) -> Player {
        match self {
            Player::One => Player::Two,
            Player::Two => Player::One,
        }
    }

    /// Row direction this player's pieces advance in
    pub fn forward(self) -> i8 {
        match self {
            Player::One => 1,
            Player::Two => -1,
        }
    }

    /// Seat index (0 or 1) inside a match
    pub fn seat(self) -> usize {
        self as usize - 1
    }

    /// +1 for player one, -1 for player two
    pub fn sign(self) -> f64 {
        match self {
            Player::One => 1.0,
            Player::Two => -1.0,
        }
    }
}

impl TryFrom<u8> for Player {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Player::One),
            2 => Ok(Player::Two),
            other => Err(ValidationError::InvalidPlayer(other)),
        }
    }
}

impl From<Player> for u8 {
    fn from(player: Player) -> Self {
        player as u8
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

/// Piece kinds, strongest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PieceKind {
    Marshal,
    General,
    Lieutenant,
    Major,
    Rider,
    Lancer,
    Archer,
    Spy,
    Fortress,
    Pawn,
}

pub const PIECE_KINDS: [PieceKind; 10] = [
    PieceKind::Marshal,
    PieceKind::General,
    PieceKind::Lieutenant,
    PieceKind::Major,
    PieceKind::Rider,
    PieceKind::Lancer,
    PieceKind::Archer,
    PieceKind::Spy,
    PieceKind::Fortress,
    PieceKind::Pawn,
];

impl PieceKind {
    /// Fixed material value
    pub fn value(self) -> i32 {
        match self {
            PieceKind::Marshal => 200,
            PieceKind::General => 90,
            PieceKind::Lieutenant => 70,
            PieceKind::Major => 55,
            PieceKind::Rider => 45,
            PieceKind::Lancer => 40,
            PieceKind::Archer => 35,
            PieceKind::Spy => 30,
            PieceKind::Fortress => 25,
            PieceKind::Pawn => 10,
        }
    }

    /// Rank used for ordering; marshal is 0
    pub fn rank(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Opening,
    Midgame,
    Endgame,
}

impl Phase {
    pub const OPENING_MOVES: u32 = 16;
    pub const ENDGAME_MATERIAL: i32 = 150;

    pub fn infer(move_number: u32, non_marshal_material: i32) -> Phase {
        if move_number < Self::OPENING_MOVES {
            Phase::Opening
        } else if non_marshal_material <= Self::ENDGAME_MATERIAL {
            Phase::Endgame
        } else {
            Phase::Midgame
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveKind {
    /// Move to an empty cell
    Normal,
    /// Move on top of a friendly stack
    Stack,
    Capture,
    /// Placement from reserve; has no source square
    Drop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

pub const DIFFICULTIES: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Personality {
    Aggressive,
    Defensive,
    Balanced,
    Tactical,
}

pub const PERSONALITIES: [Personality; 4] = [
    Personality::Aggressive,
    Personality::Defensive,
    Personality::Balanced,
    Personality::Tactical,
];

impl fmt::Display for Personality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Personality::Aggressive => "aggressive",
            Personality::Defensive => "defensive",
            Personality::Balanced => "balanced",
            Personality::Tactical => "tactical",
        };
        f.write_str(s)
    }
}

impl FromStr for Difficulty {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DIFFICULTIES
            .into_iter()
            .find(|d| d.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| EngineError::Configuration(format!("unknown difficulty: {s}")))
    }
}

impl FromStr for Personality {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PERSONALITIES
            .into_iter()
            .find(|p| p.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| EngineError::Configuration(format!("unknown personality: {s}")))
    }
}
