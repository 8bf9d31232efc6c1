//! Game table: every running match and its own board, scores and turn.

use crate::client_manager::ClientId;
use chrono::{DateTime, Local};
use log::info;
use shared::{
    apply_move, collect_captures, initial_board, is_game_over, sweep_remaining, Board,
    Continuation, MoveError, Reply, Role, Scores,
};

pub type GameId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveRecord {
    pub role: Role,
    pub pit: usize,
    pub captured: u8,
}

/// Where a game is in its life. A freed slot is the third, inactive, state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GamePhase {
    Active,
    /// Play is over and the participants are being asked whether to save it.
    Ending {
        result: String,
        expected_votes: usize,
        received_votes: usize,
        save_requested: bool,
    },
}

/// Result of one accepted move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOutcome {
    pub captured: u8,
    pub finished: bool,
}

#[derive(Debug, Clone)]
pub struct Game {
    pub id: GameId,
    /// Player sessions, indexed by role.
    pub players: [ClientId; 2],
    /// Player usernames, kept for saving after a participant has left.
    pub names: [String; 2],
    pub board: Board,
    pub scores: Scores,
    pub turn: Role,
    pub private: bool,
    pub spectators: Vec<ClientId>,
    pub moves: Vec<MoveRecord>,
    move_log_limit: usize,
    pub created_at: DateTime<Local>,
    /// Role that proposed a draw still awaiting an answer.
    pub draw_offer: Option<Role>,
    pub phase: GamePhase,
}

impl Game {
    pub fn new(
        id: GameId,
        players: [ClientId; 2],
        names: [String; 2],
        private: bool,
        move_log_limit: usize,
    ) -> Self {
        Self {
            id,
            players,
            names,
            board: initial_board(),
            scores: [0, 0],
            turn: Role::First,
            private,
            spectators: Vec::new(),
            moves: Vec::new(),
            move_log_limit,
            created_at: Local::now(),
            draw_offer: None,
            phase: GamePhase::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.phase == GamePhase::Active
    }

    pub fn player(&self, role: Role) -> ClientId {
        self.players[role.index()]
    }

    pub fn name(&self, role: Role) -> &str {
        &self.names[role.index()]
    }

    pub fn role_of(&self, client_id: ClientId) -> Option<Role> {
        if self.players[0] == client_id {
            Some(Role::First)
        } else if self.players[1] == client_id {
            Some(Role::Second)
        } else {
            None
        }
    }

    /// Plays `pit` for `role`, captures, and checks for the end of the game.
    /// The turn only passes when the game goes on; a finished game has its
    /// remaining seeds swept into each side's score.
    pub fn play(&mut self, role: Role, pit: usize) -> Result<MoveOutcome, MoveError> {
        let (sown, last) = apply_move(&self.board, role, pit)?;
        let (board, captured) = collect_captures(&sown, role, last);
        self.board = board;
        self.scores[role.index()] += captured;

        if self.moves.len() < self.move_log_limit {
            self.moves.push(MoveRecord {
                role,
                pit,
                captured,
            });
        }

        let finished = is_game_over(&self.board, &self.scores, Continuation::Continue);
        if finished {
            let (board, scores) =
                sweep_remaining(&self.board, &self.scores, Continuation::Continue);
            self.board = board;
            self.scores = scores;
        } else {
            self.turn = role.opponent();
        }

        Ok(MoveOutcome { captured, finished })
    }

    /// Role ahead on score, None when level.
    pub fn leader(&self) -> Option<Role> {
        match self.scores[0].cmp(&self.scores[1]) {
            std::cmp::Ordering::Greater => Some(Role::First),
            std::cmp::Ordering::Less => Some(Role::Second),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn state_reply(&self) -> Reply {
        Reply::State {
            board: self.board,
            scores: self.scores,
            turn: self.turn,
        }
    }

    /// Players followed by spectators.
    pub fn audience(&self) -> Vec<ClientId> {
        self.players
            .iter()
            .chain(self.spectators.iter())
            .copied()
            .collect()
    }

    pub fn remove_spectator(&mut self, client_id: ClientId) -> bool {
        let before = self.spectators.len();
        self.spectators.retain(|&id| id != client_id);
        self.spectators.len() != before
    }

    /// Entry for the GAMESLIST line.
    pub fn summary(&self) -> String {
        let mut entry = format!("{}:{}-{}", self.id, self.names[0], self.names[1]);
        if self.private {
            entry.push_str(":private");
        }
        entry
    }
}

/// Fixed number of game slots; a game keeps its slot index as its id.
pub struct GameTable {
    slots: Vec<Option<Game>>,
}

impl GameTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
        }
    }

    /// Starts a game in the first free slot. Returns None when every slot is
    /// taken.
    pub fn create(
        &mut self,
        players: [ClientId; 2],
        names: [String; 2],
        private: bool,
        move_log_limit: usize,
    ) -> Option<GameId> {
        let id = self.slots.iter().position(Option::is_none)?;
        info!(
            "Game {} started: {} vs {}{}",
            id,
            names[0],
            names[1],
            if private { " (private)" } else { "" }
        );
        self.slots[id] = Some(Game::new(id, players, names, private, move_log_limit));
        Some(id)
    }

    pub fn get(&self, id: GameId) -> Option<&Game> {
        self.slots.get(id).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: GameId) -> Option<&mut Game> {
        self.slots.get_mut(id).and_then(Option::as_mut)
    }

    /// Frees the slot.
    pub fn remove(&mut self, id: GameId) -> Option<Game> {
        self.slots.get_mut(id).and_then(Option::take)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Game> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
