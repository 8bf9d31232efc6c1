//! Game end and persistence
//!
//! A game that stops being playable moves to [`GamePhase::Ending`]. Players
//! still connected are asked whether to save it and the slot is only freed
//! once every one of them has answered or left. Auto-save skips the vote.
//! Saved games can later be listed with HISTORY and streamed with REPLAY.

use crate::client_manager::{ClientId, ClientStatus};
use crate::dispatcher::ServerState;
use crate::game::{GameId, GamePhase};
use log::{error, info, warn};
use shared::protocol::REPLAY_SENTINEL;
use shared::{EndReason, Reply, Role};

/// What stopped a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOutcome {
    /// The rules ended it; the leader on score wins.
    Finished,
    AgreedDraw,
    /// A player quit or disconnected.
    Forfeit { loser: Role },
}

impl ServerState {
    pub(crate) fn finish_game(&mut self, game_id: GameId, outcome: GameOutcome) {
        let Some(game) = self.games.get_mut(game_id).filter(|game| game.is_active()) else {
            warn!(
                "Internal consistency: game {} is not running and cannot end",
                game_id
            );
            return;
        };
        game.draw_offer = None;

        let [first, second] = game.scores;
        let (reason, result) = match outcome {
            GameOutcome::Finished => match game.leader() {
                Some(role) => (
                    EndReason::Winner(role),
                    format!("{} wins {}-{}", game.name(role), first, second),
                ),
                None => (EndReason::Draw, format!("draw {}-{}", first, second)),
            },
            GameOutcome::AgreedDraw => (
                EndReason::Draw,
                format!("draw by agreement {}-{}", first, second),
            ),
            GameOutcome::Forfeit { loser } => (
                EndReason::Forfeit {
                    winner: loser.opponent(),
                },
                format!(
                    "{} forfeits, {} wins",
                    game.name(loser),
                    game.name(loser.opponent())
                ),
            ),
        };

        let players = game.players;
        let names = game.names.clone();
        let audience = game.audience();
        let state = game.state_reply();

        if let EndReason::Winner(role) = reason {
            self.apply_rating(&names[role.index()], &names[role.opponent().index()]);
        }
        self.broadcast(&audience, &state);
        self.broadcast(&audience, &Reply::End(reason));
        info!("Game {} ended: {}", game_id, result);

        let mut reachable = Vec::new();
        for player in players {
            if let Some(client) = self.clients.get_mut(player) {
                client.game = None;
                client.opponent = None;
                client.status = ClientStatus::Waiting;
                reachable.push(player);
            }
        }

        let auto_save = names
            .iter()
            .any(|name| self.clients.profile(name).map_or(false, |p| p.auto_save));
        if auto_save {
            self.close_game(game_id, &result, true);
            return;
        }
        if reachable.is_empty() {
            self.close_game(game_id, &result, false);
            return;
        }

        for &player in &reachable {
            if let Some(client) = self.clients.get_mut(player) {
                client.status = ClientStatus::AwaitingSaveDecision;
                client.save_vote = Some(game_id);
                client.send(&Reply::AskSave);
            }
        }
        if let Some(game) = self.games.get_mut(game_id) {
            game.phase = GamePhase::Ending {
                result,
                expected_votes: reachable.len(),
                received_votes: 0,
                save_requested: false,
            };
        }
    }

    /// Answer to ASKSAVE from a connected player.
    pub(crate) fn record_save_vote(&mut self, client_id: ClientId, yes: bool) {
        let Some(client) = self.clients.get_mut(client_id) else {
            return;
        };
        client.status = ClientStatus::Waiting;
        let Some(game_id) = client.save_vote.take() else {
            warn!(
                "Internal consistency: client {} voted without a game to save",
                client_id
            );
            return;
        };
        client.profile.last_save_decision = Some(yes);
        client.send(&Reply::msg(if yes {
            "Save requested"
        } else {
            "Save declined"
        }));

        self.count_save_vote(game_id, yes);
    }

    /// Counts one vote, including the implicit no of a player who left, and
    /// closes the game once everyone asked has answered.
    pub(crate) fn count_save_vote(&mut self, game_id: GameId, yes: bool) {
        let Some(game) = self.games.get_mut(game_id) else {
            warn!("Internal consistency: save vote for missing game {}", game_id);
            return;
        };
        let GamePhase::Ending {
            result,
            expected_votes,
            received_votes,
            save_requested,
        } = &mut game.phase
        else {
            warn!("Internal consistency: save vote for running game {}", game_id);
            return;
        };

        *received_votes += 1;
        *save_requested |= yes;
        if *received_votes < *expected_votes {
            return;
        }

        let result = result.clone();
        let save = *save_requested;
        self.close_game(game_id, &result, save);
    }

    /// Persists if asked, tells everyone involved, releases spectators and
    /// frees the slot.
    fn close_game(&mut self, game_id: GameId, result: &str, save: bool) {
        let Some(game) = self.games.remove(game_id) else {
            return;
        };

        let notice = if save {
            match self.store.save(&game, result) {
                Ok(path) => format!(
                    "Game saved as {}",
                    path.file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_default()
                ),
                Err(err) => {
                    error!("Could not save game {}: {}", game_id, err);
                    "Game could not be saved".to_string()
                }
            }
        } else {
            "Game not saved".to_string()
        };
        self.broadcast(&game.audience(), &Reply::Msg(notice));
        self.free_spectators(game_id, &game.spectators);
        info!("Game {} closed", game_id);
    }

    /// Sends the spectators of a game nobody can resume back to the lobby
    /// without waiting for the save vote.
    pub(crate) fn release_spectators(&mut self, game_id: GameId) {
        let Some(game) = self.games.get_mut(game_id) else {
            return;
        };
        let spectators = std::mem::take(&mut game.spectators);
        self.broadcast(&spectators, &Reply::msg("Stopped watching: the game is over"));
        self.free_spectators(game_id, &spectators);
    }

    fn free_spectators(&mut self, game_id: GameId, spectators: &[ClientId]) {
        for &spectator in spectators {
            if let Some(client) = self.clients.get_mut(spectator) {
                if client.watching == Some(game_id) {
                    client.watching = None;
                    client.status = ClientStatus::Waiting;
                }
            }
        }
    }

    pub(crate) fn send_history(&self, client_id: ClientId) {
        let Some(name) = self.username(client_id) else {
            return;
        };
        match self.store.history(&name) {
            Ok(games) => {
                let entries = games
                    .iter()
                    .enumerate()
                    .map(|(index, game)| format!("{}:{}", index + 1, game.label()))
                    .collect();
                self.clients.send(client_id, &Reply::HistoryList(entries));
            }
            Err(err) => {
                error!("Could not list saved games for {}: {}", name, err);
                self.send_msg(client_id, "Could not read saved games");
            }
        }
    }

    /// Streams the `number`-th entry of the caller's HISTORY, closed by the
    /// replay sentinel.
    pub(crate) fn replay(&self, client_id: ClientId, number: usize) {
        let Some(name) = self.username(client_id) else {
            return;
        };
        let lines = self.store.history(&name).and_then(|games| {
            match number.checked_sub(1).and_then(|index| games.get(index)) {
                Some(saved) => self.store.read_lines(saved).map(Some),
                None => Ok(None),
            }
        });

        match lines {
            Ok(Some(lines)) => {
                for line in lines {
                    self.clients.send(client_id, &Reply::Raw(line));
                }
                self.clients
                    .send(client_id, &Reply::Raw(REPLAY_SENTINEL.to_string()));
            }
            Ok(None) => self.send_msg(client_id, format!("No saved game {}", number)),
            Err(err) => {
                error!("Could not replay game {} for {}: {}", number, name, err);
                self.send_msg(client_id, "Could not read saved games");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::client_manager::{ClientStatus, DEFAULT_RATING};
    use crate::testing::Harness;
    use shared::rules::seed_total;
    use shared::{Role, TOTAL_SEEDS};

    /// Sets up a position where the first player captures to reach 27 with
    /// `MOVE 5`, then plays it.
    fn win_by_capture(h: &mut Harness, game_id: usize) {
        let first = h.player(game_id, Role::First);
        {
            let game = h.state.games.get_mut(game_id).unwrap();
            game.board = [2, 0, 0, 0, 0, 1, 1, 9, 0, 0, 0, 0];
            game.scores = [23, 12];
        }
        h.send(first, "MOVE 5");
    }

    fn rating(h: &Harness, name: &str) -> u32 {
        h.state.clients.profile(name).unwrap().rating
    }

    #[test]
    fn test_win_ends_game_and_both_no_saves_nothing() {
        let mut h = Harness::new();
        let alice = h.register("alice");
        let bob = h.register("bob");
        let game_id = h.start_game(alice, bob);
        let first = h.player(game_id, Role::First);
        let second = h.player(game_id, Role::Second);

        win_by_capture(&mut h, game_id);
        let expected = vec![
            "STATE 0 0 0 0 0 0 0 0 0 0 0 0 27 21 0".to_string(),
            "END winner 0".to_string(),
            "ASKSAVE".to_string(),
        ];
        assert_eq!(h.drain(first), expected);
        assert_eq!(h.drain(second), expected);
        let game = h.state.games.get(game_id).unwrap();
        assert!(!game.is_active());
        assert_eq!(seed_total(&game.board, &game.scores), TOTAL_SEEDS);
        assert_eq!(h.status(first), Some(ClientStatus::AwaitingSaveDecision));

        h.send(first, "NO");
        assert_eq!(h.drain(first), vec!["MSG Save declined"]);
        assert_eq!(h.status(first), Some(ClientStatus::Waiting));
        assert!(h.state.games.get(game_id).is_some());

        h.send(second, "NO");
        assert_eq!(h.drain(second), vec!["MSG Save declined", "MSG Game not saved"]);
        assert_eq!(h.status(second), Some(ClientStatus::Waiting));
        assert!(h.state.games.get(game_id).is_none());
        assert_eq!(h.saved_files(), 0);
    }

    #[test]
    fn test_any_yes_saves_and_history_lists_it() {
        let mut h = Harness::new();
        let alice = h.register("alice");
        let bob = h.register("bob");
        let game_id = h.start_game(alice, bob);

        h.send(alice, "QUIT");
        h.send(alice, "YES");
        h.send(bob, "maybe");
        assert_eq!(h.saved_files(), 1);
        let bob_lines = h.drain(bob);
        assert_eq!(bob_lines[bob_lines.len() - 2], "MSG Save declined");
        assert!(bob_lines.last().unwrap().starts_with("MSG Game saved as "));

        h.send(bob, "HISTORY");
        let history = h.drain(bob);
        assert_eq!(history.len(), 1);
        assert!(history[0].starts_with("HISTORYLIST 1:"));
        assert!(history[0].ends_with(&format!("_g{}", game_id)));

        h.send(bob, "REPLAY 1");
        let replay = h.drain(bob);
        assert!(replay[0].starts_with("Date: "));
        assert!(replay.contains(&"Result: alice forfeits, bob wins".to_string()));
        assert_eq!(replay.last().unwrap(), "----");

        h.send(bob, "REPLAY 2");
        h.send(bob, "REPLAY 0");
        assert_eq!(h.drain(bob), vec!["MSG No saved game 2", "MSG No saved game 0"]);
    }

    #[test]
    fn test_auto_save_skips_prompt() {
        let mut h = Harness::new();
        let alice = h.register("alice");
        let bob = h.register("bob");
        h.send(bob, "SAVE");
        let game_id = h.start_game(alice, bob);

        win_by_capture(&mut h, game_id);
        let lines = h.drain(alice);
        assert!(!lines.contains(&"ASKSAVE".to_string()));
        assert!(lines.last().unwrap().starts_with("MSG Game saved as "));
        assert_eq!(h.status(alice), Some(ClientStatus::Waiting));
        assert_eq!(h.status(bob), Some(ClientStatus::Waiting));
        assert!(h.state.games.get(game_id).is_none());
        assert_eq!(h.saved_files(), 1);
    }

    #[test]
    fn test_quit_forfeits_without_rating_change() {
        let mut h = Harness::new();
        let alice = h.register("alice");
        let bob = h.register("bob");
        let game_id = h.start_game(alice, bob);
        let bob_role = h.state.games.get(game_id).unwrap().role_of(bob).unwrap();

        h.send(alice, "QUIT");
        let lines = h.drain(bob);
        assert_eq!(lines[1], format!("END forfeit {}", bob_role));
        assert_eq!(rating(&h, "alice"), DEFAULT_RATING);
        assert_eq!(rating(&h, "bob"), DEFAULT_RATING);
    }

    #[test]
    fn test_decisive_win_moves_ratings() {
        let mut h = Harness::new();
        let alice = h.register("alice");
        let bob = h.register("bob");
        let game_id = h.start_game(alice, bob);
        let winner = h.state.games.get(game_id).unwrap().name(Role::First).to_string();
        let loser = h.state.games.get(game_id).unwrap().name(Role::Second).to_string();

        win_by_capture(&mut h, game_id);
        assert_eq!(rating(&h, &winner), DEFAULT_RATING + 1);
        assert_eq!(rating(&h, &loser), DEFAULT_RATING - 1);
    }

    #[test]
    fn test_friends_play_unrated_and_rating_floors_at_zero() {
        let mut h = Harness::new();
        let alice = h.register("alice");
        let bob = h.register("bob");
        h.send(alice, "ADDFRIEND bob");
        h.send(bob, "ACCEPTFRIEND alice");
        let game_id = h.start_game(alice, bob);
        win_by_capture(&mut h, game_id);
        assert_eq!(rating(&h, "alice"), DEFAULT_RATING);
        assert_eq!(rating(&h, "bob"), DEFAULT_RATING);

        h.state.apply_rating("carl", "nobody");
        h.state.clients.profile_mut("bob").unwrap().rating = 0;
        h.state.clients.profile_mut("bob").unwrap().friends.clear();
        h.state.apply_rating("alice", "bob");
        assert_eq!(rating(&h, "bob"), 0);
        assert_eq!(rating(&h, "alice"), DEFAULT_RATING + 1);
    }

    #[test]
    fn test_disconnect_in_game_forfeits_to_opponent() {
        let mut h = Harness::new();
        let alice = h.register("alice");
        let bob = h.register("bob");
        let carol = h.register("carol");
        let game_id = h.start_game(alice, bob);
        h.send(carol, &format!("WATCH {}", game_id));
        h.drain_all();
        let bob_role = h.state.games.get(game_id).unwrap().role_of(bob).unwrap();

        h.disconnect(alice);
        let lines = h.drain(bob);
        assert_eq!(lines[1], format!("END forfeit {}", bob_role));
        assert_eq!(lines[2], "ASKSAVE");
        let watched = h.drain(carol);
        assert_eq!(watched[1], format!("END forfeit {}", bob_role));
        assert_eq!(watched[2], "MSG Stopped watching: the game is over");
        assert_eq!(h.status(carol), Some(ClientStatus::Waiting));
        assert!(h.state.clients.get(carol).unwrap().watching.is_none());
        assert!(h.state.games.get(game_id).unwrap().spectators.is_empty());

        // Carol is back in the lobby while bob still decides.
        h.send(carol, "GAMES");
        assert_eq!(h.drain(carol), vec!["GAMESLIST"]);

        h.send(bob, "NO");
        assert_eq!(h.drain(bob), vec!["MSG Save declined", "MSG Game not saved"]);
        assert!(h.drain(carol).is_empty());
        assert!(h.state.games.get(game_id).is_none());
    }

    #[test]
    fn test_disconnect_while_voting_counts_as_no() {
        let mut h = Harness::new();
        let alice = h.register("alice");
        let bob = h.register("bob");
        let game_id = h.start_game(alice, bob);

        h.send(alice, "QUIT");
        h.send(alice, "YES");
        h.disconnect(bob);

        assert!(h.state.games.get(game_id).is_none());
        assert_eq!(h.saved_files(), 1);
        assert_eq!(
            h.state.clients.profile("bob").unwrap().last_save_decision,
            Some(false)
        );
    }

    #[test]
    fn test_disconnect_with_draw_pending_forfeits() {
        let mut h = Harness::new();
        let alice = h.register("alice");
        let bob = h.register("bob");
        let game_id = h.start_game(alice, bob);
        let first = h.player(game_id, Role::First);
        let second = h.player(game_id, Role::Second);

        h.send(first, "DRAW");
        h.drain_all();
        h.disconnect(second);

        let lines = h.drain(first);
        assert_eq!(lines[1], "END forfeit 0");
        assert_eq!(h.status(first), Some(ClientStatus::AwaitingSaveDecision));
    }

    #[test]
    fn test_nobody_left_closes_immediately() {
        let mut h = Harness::new();
        let alice = h.register("alice");
        let bob = h.register("bob");
        let carol = h.register("carol");
        let game_id = h.start_game(alice, bob);
        h.send(carol, &format!("WATCH {}", game_id));
        h.drain_all();

        // Both players are gone before the game notices.
        h.state.clients.remove_client(bob);
        h.disconnect(alice);

        assert!(h.state.games.get(game_id).is_none());
        assert_eq!(h.drain(carol).last().unwrap(), "MSG Game not saved");
        assert_eq!(h.status(carol), Some(ClientStatus::Waiting));
    }

    #[test]
    fn test_history_is_empty_without_saves() {
        let mut h = Harness::new();
        let alice = h.register("alice");
        h.send(alice, "HISTORY");
        assert_eq!(h.drain(alice), vec!["HISTORYLIST"]);
    }
}
