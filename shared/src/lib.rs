//! Types shared by the Awale server and its clients: the rule engine and the
//! line protocol.

pub mod protocol;
pub mod rules;

pub use protocol::{Command, EndReason, ParseError, Reply};
pub use rules::{
    apply_move, collect_captures, initial_board, is_game_over, sweep_remaining, Board,
    Continuation, MoveError, Role, Scores, PITS, TOTAL_SEEDS, WIN_SCORE,
};

/// Longest accepted username, exclusive.
pub const MAX_USERNAME_LEN: usize = 30;
/// Shortest accepted username.
pub const MIN_USERNAME_LEN: usize = 2;

/// Checks length and charset (`[A-Za-z0-9_-]`) of a username.
pub fn is_valid_username(name: &str) -> bool {
    name.len() >= MIN_USERNAME_LEN
        && name.len() < MAX_USERNAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
