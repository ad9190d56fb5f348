use std::fmt;

use serde::{Deserialize, Serialize};

use crate::actions::Move;
use crate::enums::{Phase, PieceKind, Player, PLAYERS};
use crate::errors::{ValidationError, ValidationResult};

pub const BOARD_SIZE: usize = 9;
pub const MAX_STACK: usize = 3;

/// A cell coordinate; row 0 is player one's home rank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawSquare")]
pub struct Square {
    pub row: u8,
    pub col: u8,
}

#[derive(Deserialize)]
struct RawSquare {
    row: u8,
    col: u8,
}

impl TryFrom<RawSquare> for Square {
    type Error = ValidationError;

    fn try_from(raw: RawSquare) -> Result<Self, Self::Error> {
        Square::new(raw.row, raw.col)
    }
}

impl Square {
    pub fn new(row: u8, col: u8) -> ValidationResult<Self> {
        if (row as usize) < BOARD_SIZE && (col as usize) < BOARD_SIZE {
            Ok(Square { row, col })
        } else {
            Err(ValidationError::OutOfBounds { row, col })
        }
    }

    /// Step by a signed offset, staying on the board
    pub fn offset(self, dr: i8, dc: i8) -> Option<Square> {
        let row = self.row as i8 + dr;
        let col = self.col as i8 + dc;
        if (0..BOARD_SIZE as i8).contains(&row) && (0..BOARD_SIZE as i8).contains(&col) {
            Some(Square {
                row: row as u8,
                col: col as u8,
            })
        } else {
            None
        }
    }

    pub fn distance(self, other: Square) -> u8 {
        self.row.abs_diff(other.row).max(self.col.abs_diff(other.col))
    }

    pub fn is_edge(self) -> bool {
        let last = (BOARD_SIZE - 1) as u8;
        self.row == 0 || self.col == 0 || self.row == last || self.col == last
    }

    pub fn mirrored(self) -> Square {
        Square {
            row: self.row,
            col: (BOARD_SIZE - 1) as u8 - self.col,
        }
    }

    pub fn flipped(self) -> Square {
        Square {
            row: (BOARD_SIZE - 1) as u8 - self.row,
            col: self.col,
        }
    }

    pub fn all() -> impl Iterator<Item = Square> {
        (0..BOARD_SIZE as u8).flat_map(|row| (0..BOARD_SIZE as u8).map(move |col| Square { row, col }))
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Piece {
    pub kind: PieceKind,
    pub owner: Player,
}

impl Piece {
    pub fn new(kind: PieceKind, owner: Player) -> Self {
        Piece { kind, owner }
    }

    pub fn value(&self) -> i32 {
        self.kind.value()
    }
}

/// Ordered pieces of one cell, bottom first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<Piece>", into = "Vec<Piece>")]
pub struct Stack {
    pieces: [Option<Piece>; MAX_STACK],
    len: u8,
}

impl Stack {
    pub fn height(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.height() == MAX_STACK
    }

    pub fn top(&self) -> Option<Piece> {
        if self.len == 0 {
            None
        } else {
            self.pieces[self.height() - 1]
        }
    }

    pub fn push(&mut self, piece: Piece) -> ValidationResult<()> {
        if self.is_full() {
            return Err(ValidationError::StackOverflow {
                height: MAX_STACK + 1,
            });
        }
        self.pieces[self.height()] = Some(piece);
        self.len += 1;
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Piece> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        self.pieces[self.height()].take()
    }

    /// Pieces bottom to top with their tier (0 = bottom)
    pub fn iter(&self) -> impl Iterator<Item = (usize, Piece)> + '_ {
        self.pieces[..self.height()]
            .iter()
            .enumerate()
            .filter_map(|(tier, p)| p.map(|p| (tier, p)))
    }
}

impl TryFrom<Vec<Piece>> for Stack {
    type Error = ValidationError;

    fn try_from(pieces: Vec<Piece>) -> Result<Self, Self::Error> {
        if pieces.len() > MAX_STACK {
            return Err(ValidationError::StackOverflow {
                height: pieces.len(),
            });
        }
        let mut stack = Stack::default();
        for piece in pieces {
            stack.push(piece)?;
        }
        Ok(stack)
    }
}

impl From<Stack> for Vec<Piece> {
    fn from(stack: Stack) -> Self {
        stack.iter().map(|(_, p)| p).collect()
    }
}

/// A piece together with where it sits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub piece: Piece,
    pub square: Square,
    pub tier: usize,
    pub is_top: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardState {
    /// `cells[row][col]`
    pub cells: [[Stack; BOARD_SIZE]; BOARD_SIZE],
    pub current_player: Player,
    pub move_number: u32,
    pub phase: Phase,
}

impl BoardState {
    pub fn empty(current_player: Player) -> Self {
        BoardState {
            cells: [[Stack::default(); BOARD_SIZE]; BOARD_SIZE],
            current_player,
            move_number: 0,
            phase: Phase::Opening,
        }
    }

    /// Symmetric starting layout: player one on rows 0-2, player two on rows 6-8
    pub fn standard_opening() -> Self {
        use PieceKind::*;
        const BACK: [PieceKind; BOARD_SIZE] = [
            Lancer, Rider, Archer, General, Marshal, Lieutenant, Archer, Rider, Lancer,
        ];
        const MIDDLE: [Option<PieceKind>; BOARD_SIZE] = [
            None,
            Some(Spy),
            None,
            Some(Fortress),
            Some(Major),
            Some(Fortress),
            None,
            Some(Spy),
            None,
        ];

        let mut board = BoardState::empty(Player::One);
        for col in 0..BOARD_SIZE {
            board.cells[0][col] = stack_of(Piece::new(BACK[col], Player::One));
            if let Some(kind) = MIDDLE[col] {
                board.cells[1][col] = stack_of(Piece::new(kind, Player::One));
            }
            if col % 2 == 0 {
                board.cells[2][col] = stack_of(Piece::new(Pawn, Player::One));
            }
        }
        let mirror = board.color_flipped();
        for row in BOARD_SIZE - 3..BOARD_SIZE {
            board.cells[row] = mirror.cells[row];
        }
        board
    }

    pub fn stack(&self, square: Square) -> &Stack {
        &self.cells[square.row as usize][square.col as usize]
    }

    pub fn stack_mut(&mut self, square: Square) -> &mut Stack {
        &mut self.cells[square.row as usize][square.col as usize]
    }

    pub fn top(&self, square: Square) -> Option<Piece> {
        self.stack(square).top()
    }

    pub fn height(&self, square: Square) -> usize {
        self.stack(square).height()
    }

    /// Push a piece on top of a cell
    pub fn place(&mut self, square: Square, piece: Piece) -> ValidationResult<()> {
        self.stack_mut(square).push(piece)
    }

    pub fn placements(&self) -> impl Iterator<Item = Placement> + '_ {
        Square::all().flat_map(move |square| {
            let stack = self.stack(square);
            let height = stack.height();
            stack.iter().map(move |(tier, piece)| Placement {
                piece,
                square,
                tier,
                is_top: tier + 1 == height,
            })
        })
    }

    pub fn marshal(&self, player: Player) -> Option<Placement> {
        self.placements()
            .find(|p| p.piece.owner == player && p.piece.kind == PieceKind::Marshal)
    }

    pub fn non_marshal_material(&self) -> i32 {
        self.placements()
            .filter(|p| p.piece.kind != PieceKind::Marshal)
            .map(|p| p.piece.value())
            .sum()
    }

    pub fn validate(&self) -> ValidationResult<()> {
        for player in PLAYERS {
            let count = self
                .placements()
                .filter(|p| p.piece.owner == player && p.piece.kind == PieceKind::Marshal)
                .count();
            if count > 1 {
                return Err(ValidationError::DuplicateMarshal { player, count });
            }
        }
        Ok(())
    }

    /// Successor state after a move the caller has already validated
    pub fn apply(&self, mv: &Move) -> BoardState {
        let mut next = *self;
        if let Some(from) = mv.from {
            next.stack_mut(from).pop();
        }
        if mv.is_capture {
            next.stack_mut(mv.to).pop();
        }
        let pushed = next.stack_mut(mv.to).push(mv.piece);
        debug_assert!(pushed.is_ok(), "apply on a full stack: {:?}", mv);
        next.current_player = self.current_player.opponent();
        next.move_number = self.move_number + 1;
        next.phase = Phase::infer(next.move_number, next.non_marshal_material());
        next
    }

    /// Reflect files (left-right); owners and side to move unchanged
    pub fn mirrored(&self) -> BoardState {
        let mut out = *self;
        for square in Square::all() {
            *out.stack_mut(square.mirrored()) = *self.stack(square);
        }
        out
    }

    /// Swap colours and reflect ranks so each side keeps its own home row
    pub fn color_flipped(&self) -> BoardState {
        let mut out = *self;
        for square in Square::all() {
            let mut flipped = Stack::default();
            for (_, piece) in self.stack(square).iter() {
                let _ = flipped.push(Piece::new(piece.kind, piece.owner.opponent()));
            }
            *out.stack_mut(square.flipped()) = flipped;
        }
        out.current_player = self.current_player.opponent();
        out
    }
}

fn stack_of(piece: Piece) -> Stack {
    let mut stack = Stack::default();
    let _ = stack.push(piece);
    stack
}
