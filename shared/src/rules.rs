//! Awale rule engine.
//!
//! Every function here is pure: it takes a board (and scores) by value or
//! reference and returns the updated values. Game records own their board and
//! pass it in explicitly, so no two games can ever observe each other's state.

use std::fmt;
use std::ops::Range;
use thiserror::Error;

/// Number of pits on the board, six per side.
pub const PITS: usize = 12;
/// Pits owned by each side.
pub const PITS_PER_SIDE: usize = 6;
/// Seeds placed in every pit at the start of a game.
pub const SEEDS_PER_PIT: u8 = 4;
/// Seeds in play for the whole game; board plus both scores always sum to this.
pub const TOTAL_SEEDS: u32 = (PITS as u32) * (SEEDS_PER_PIT as u32);
/// Score at which a player wins immediately.
pub const WIN_SCORE: u8 = 25;

pub type Board = [u8; PITS];
pub type Scores = [u8; 2];

/// Seat of a player in a game. `First` owns pits 0-5 and moves first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    First,
    Second,
}

impl Role {
    pub fn index(self) -> usize {
        match self {
            Role::First => 0,
            Role::Second => 1,
        }
    }

    pub fn from_index(index: usize) -> Option<Role> {
        match index {
            0 => Some(Role::First),
            1 => Some(Role::Second),
            _ => None,
        }
    }

    pub fn opponent(self) -> Role {
        match self {
            Role::First => Role::Second,
            Role::Second => Role::First,
        }
    }

    /// Pit indices this role is allowed to sow from.
    pub fn pits(self) -> Range<usize> {
        let start = self.index() * PITS_PER_SIDE;
        start..start + PITS_PER_SIDE
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// Whether play continues normally or the players agreed to a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    Continue,
    Draw,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoveError {
    #[error("pit {pit} is not on your side")]
    WrongSide { pit: usize },
    #[error("pit {pit} is empty")]
    EmptyPit { pit: usize },
}

pub fn initial_board() -> Board {
    [SEEDS_PER_PIT; PITS]
}

/// Sows the seeds of `pit` counter-clockwise and returns the new board together
/// with the index of the last pit that received a seed.
///
/// The origin pit is skipped when a move carries twelve or more seeds.
pub fn apply_move(board: &Board, player: Role, pit: usize) -> Result<(Board, usize), MoveError> {
    if !player.pits().contains(&pit) {
        return Err(MoveError::WrongSide { pit });
    }
    if board[pit] == 0 {
        return Err(MoveError::EmptyPit { pit });
    }

    let mut next = *board;
    let mut seeds = next[pit];
    next[pit] = 0;
    let mut index = pit;

    while seeds > 0 {
        index = (index + 1) % PITS;
        if index != pit {
            next[index] += 1;
            seeds -= 1;
        }
    }

    Ok((next, index))
}

/// Captures the last-sown pit when it holds two or three seeds, then keeps
/// walking backwards while the previous pits also hold two or three.
pub fn collect_captures(board: &Board, _player: Role, last_index: usize) -> (Board, u8) {
    let mut next = *board;
    let mut gained = 0u8;
    let mut index = last_index;

    while matches!(next[index], 2 | 3) {
        gained += next[index];
        next[index] = 0;
        index = (index + PITS - 1) % PITS;
    }

    (next, gained)
}

fn side_is_empty(board: &Board, role: Role) -> bool {
    board[role.pits()].iter().all(|&seeds| seeds == 0)
}

pub fn is_game_over(board: &Board, scores: &Scores, continuation: Continuation) -> bool {
    continuation == Continuation::Draw
        || side_is_empty(board, Role::First)
        || side_is_empty(board, Role::Second)
        || scores.iter().any(|&score| score >= WIN_SCORE)
}

/// Moves every seed left on a side into that side's score. Agreed draws leave
/// the board untouched.
pub fn sweep_remaining(board: &Board, scores: &Scores, continuation: Continuation) -> (Board, Scores) {
    if continuation == Continuation::Draw {
        return (*board, *scores);
    }

    let mut next_board = *board;
    let mut next_scores = *scores;
    for role in [Role::First, Role::Second] {
        for pit in role.pits() {
            next_scores[role.index()] += next_board[pit];
            next_board[pit] = 0;
        }
    }

    (next_board, next_scores)
}

/// Sum of seeds on the board and in both scores.
pub fn seed_total(board: &Board, scores: &Scores) -> u32 {
    board.iter().map(|&s| s as u32).sum::<u32>() + scores.iter().map(|&s| s as u32).sum::<u32>()
}
