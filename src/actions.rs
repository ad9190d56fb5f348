use std::fmt;

use serde::{Deserialize, Serialize};

use crate::board::{BoardState, Piece, Square};
use crate::enums::{MoveKind, PieceKind};
use crate::errors::{ValidationError, ValidationResult};

/// A candidate move as supplied by the rules layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Move {
    pub from: Option<Square>,
    pub to: Square,
    pub piece: Piece,
    pub is_capture: bool,
    pub captured: Option<Piece>,
    #[serde(rename = "moveType")]
    pub kind: MoveKind,
}

impl Move {
    pub fn normal(from: Square, to: Square, piece: Piece) -> Self {
        Move {
            from: Some(from),
            to,
            piece,
            is_capture: false,
            captured: None,
            kind: MoveKind::Normal,
        }
    }

    pub fn stack(from: Square, to: Square, piece: Piece) -> Self {
        Move {
            kind: MoveKind::Stack,
            ..Move::normal(from, to, piece)
        }
    }

    pub fn capture(from: Square, to: Square, piece: Piece, captured: Piece) -> Self {
        Move {
            from: Some(from),
            to,
            piece,
            is_capture: true,
            captured: Some(captured),
            kind: MoveKind::Capture,
        }
    }

    pub fn drop(to: Square, piece: Piece) -> Self {
        Move {
            from: None,
            to,
            piece,
            is_capture: false,
            captured: None,
            kind: MoveKind::Drop,
        }
    }

    pub fn captured_value(&self) -> i32 {
        self.captured.map(|p| p.value()).unwrap_or(0)
    }

    /// Check this move against the board it is offered for
    pub fn validate(&self, board: &BoardState, index: usize) -> ValidationResult<()> {
        let bad = |details: &str| Err(ValidationError::invalid_move(index, details));
        let me = board.current_player;

        if self.piece.owner != me {
            return bad("moving piece does not belong to the side to move");
        }
        if self.is_capture != self.captured.is_some() {
            return bad("isCapture disagrees with captured piece");
        }
        if self.is_capture != (self.kind == MoveKind::Capture) {
            return bad("moveType disagrees with isCapture");
        }
        if (self.kind == MoveKind::Drop) != self.from.is_none() {
            return bad("only drops may omit the source square");
        }
        if let Some(from) = self.from {
            if from == self.to {
                return bad("source and destination are the same square");
            }
            if board.top(from) != Some(self.piece) {
                return bad("moving piece is not on top of the source stack");
            }
        }

        let target = board.stack(self.to);
        match self.kind {
            MoveKind::Capture => {
                let captured = self.captured;
                if target.top() != captured {
                    return bad("captured piece is not on top of the target stack");
                }
                if matches!(captured, Some(p) if p.owner == me) {
                    return bad("cannot capture an own piece");
                }
            }
            MoveKind::Normal => {
                if !target.is_empty() {
                    return bad("normal move into an occupied cell");
                }
            }
            MoveKind::Stack => match target.top() {
                Some(top) if top.owner == me && top.kind != PieceKind::Marshal => {
                    if target.is_full() {
                        return bad("target stack is full");
                    }
                }
                _ => return bad("stack move must land on a friendly non-marshal piece"),
            },
            MoveKind::Drop => {
                if target.is_full() {
                    return bad("target stack is full");
                }
                if self.piece.kind == PieceKind::Marshal && board.marshal(me).is_some() {
                    return bad("player already has a marshal on the board");
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.from {
            Some(from) => write!(f, "{:?} {} -> {}", self.piece.kind, from, self.to)?,
            None => write!(f, "{:?} drop {}", self.piece.kind, self.to)?,
        }
        if let Some(captured) = self.captured {
            write!(f, " x{:?}", captured.kind)?;
        }
        Ok(())
    }
}

/// Validate a board together with its legal move list
pub fn validate_request(board: &BoardState, moves: &[Move]) -> ValidationResult<()> {
    board.validate()?;
    for (index, mv) in moves.iter().enumerate() {
        mv.validate(board, index)?;
    }
    Ok(())
}
