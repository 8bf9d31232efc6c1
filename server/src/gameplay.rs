//! In-game handlers (moves, draw proposals) and spectating.

use crate::client_manager::{ClientId, ClientStatus};
use crate::dispatcher::ServerState;
use crate::ending::GameOutcome;
use crate::game::GameId;
use log::{debug, warn};
use shared::{Reply, Role};

impl ServerState {
    pub(crate) fn play_move(&mut self, client_id: ClientId, game_id: GameId, role: Role, pit: usize) {
        let Some(game) = self.games.get_mut(game_id) else {
            return;
        };
        if game.draw_offer.is_some() {
            self.send_msg(client_id, "Draw proposal pending");
            return;
        }
        if game.turn != role {
            self.send_msg(client_id, "Not your turn");
            return;
        }

        match game.play(role, pit) {
            Err(err) => {
                let state = game.state_reply();
                self.send_msg(client_id, format!("Invalid move: {}", err));
                self.clients.send(client_id, &state);
            }
            Ok(outcome) if outcome.finished => self.finish_game(game_id, GameOutcome::Finished),
            Ok(outcome) => {
                debug!(
                    "Game {}: {} played pit {}, captured {}",
                    game_id,
                    game.name(role),
                    pit,
                    outcome.captured
                );
                let audience = game.audience();
                let state = game.state_reply();
                self.broadcast(&audience, &state);
            }
        }
    }

    /// Asks the opponent to agree to a draw. Their answer comes back through
    /// [`ServerState::answer_draw`].
    pub(crate) fn propose_draw(&mut self, client_id: ClientId, game_id: GameId, role: Role) {
        let Some(opponent) = self.clients.get(client_id).and_then(|c| c.opponent) else {
            warn!(
                "Internal consistency: client {} proposed a draw without an opponent",
                client_id
            );
            return;
        };
        let Some(game) = self.games.get_mut(game_id) else {
            return;
        };
        if game.draw_offer.is_some() {
            self.send_msg(client_id, "Draw proposal pending");
            return;
        }
        if game.turn != role {
            self.send_msg(client_id, "Not your turn");
            return;
        }

        game.draw_offer = Some(role);
        self.clients
            .set_status(opponent, ClientStatus::AwaitingDrawDecision);
        self.clients.send(opponent, &Reply::AskDraw);
        self.send_msg(client_id, "Draw proposed, waiting for your opponent");
    }

    pub(crate) fn answer_draw(&mut self, client_id: ClientId, accepted: bool) {
        self.clients.set_status(client_id, ClientStatus::InGame);

        let Some((game_id, role)) = self.seat_of(client_id) else {
            warn!(
                "Internal consistency: client {} answered a draw outside a game",
                client_id
            );
            return;
        };
        let Some(game) = self.games.get_mut(game_id) else {
            return;
        };
        if game.draw_offer.take() != Some(role.opponent()) {
            warn!(
                "Internal consistency: game {} has no draw offer for client {}",
                game_id, client_id
            );
            return;
        }

        if accepted {
            self.finish_game(game_id, GameOutcome::AgreedDraw);
            return;
        }

        let players = game.players;
        let audience = game.audience();
        let state = game.state_reply();
        self.broadcast(&players, &Reply::msg("Draw refused, play continues"));
        self.broadcast(&audience, &state);
    }

    pub(crate) fn send_board(&self, client_id: ClientId) {
        let game = self
            .clients
            .get(client_id)
            .and_then(|c| c.game.or(c.watching))
            .and_then(|id| self.games.get(id));
        match game {
            Some(game) => self.clients.send(client_id, &game.state_reply()),
            None => self.send_msg(client_id, "You are not in a game"),
        }
    }

    pub(crate) fn list_games(&self, client_id: ClientId) {
        let games = self
            .games
            .iter()
            .filter(|game| game.is_active())
            .map(|game| game.summary())
            .collect();
        self.clients.send(client_id, &Reply::GamesList(games));
    }

    /// Private games only admit users listed as a friend by either player.
    pub(crate) fn watch(&mut self, client_id: ClientId, game_id: GameId) {
        let Some(watcher) = self.username(client_id) else {
            return;
        };
        let Some(game) = self.games.get(game_id).filter(|game| game.is_active()) else {
            self.send_msg(client_id, format!("No game {}", game_id));
            return;
        };

        if game.private {
            let admitted = game.names.iter().any(|player| {
                self.clients
                    .profile(player)
                    .map_or(false, |p| p.friends.contains(&watcher))
            });
            if !admitted {
                self.send_msg(client_id, format!("Game {} is private", game_id));
                return;
            }
        }
        if game.spectators.len() >= self.config.max_spectators {
            self.send_msg(client_id, format!("Too many spectators in game {}", game_id));
            return;
        }

        let header = format!("Watching game {}: {} vs {}", game_id, game.names[0], game.names[1]);
        let state = game.state_reply();
        if let Some(game) = self.games.get_mut(game_id) {
            game.spectators.push(client_id);
        }
        if let Some(client) = self.clients.get_mut(client_id) {
            client.status = ClientStatus::Spectating;
            client.watching = Some(game_id);
        }
        self.send_msg(client_id, header);
        self.clients.send(client_id, &state);
    }

    pub(crate) fn stop_watching(&mut self, client_id: ClientId) {
        let Some(client) = self.clients.get_mut(client_id) else {
            return;
        };
        let watching = client.watching.take();
        client.status = ClientStatus::Waiting;
        client.send(&Reply::msg("Stopped watching"));

        if let Some(game) = watching.and_then(|id| self.games.get_mut(id)) {
            game.remove_spectator(client_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::client_manager::ClientStatus;
    use crate::testing::Harness;
    use shared::rules::seed_total;
    use shared::{Role, TOTAL_SEEDS};

    #[test]
    fn test_opening_move_is_broadcast() {
        let mut h = Harness::new();
        let alice = h.register("alice");
        let bob = h.register("bob");
        let game_id = h.start_game(alice, bob);
        let first = h.player(game_id, Role::First);
        let second = h.player(game_id, Role::Second);

        h.send(first, "MOVE 1");
        let expected = "STATE 4 0 5 5 5 5 4 4 4 4 4 4 0 0 1";
        assert_eq!(h.drain(first), vec![expected]);
        assert_eq!(h.drain(second), vec![expected]);

        let game = h.state.games.get(game_id).unwrap();
        assert_eq!(game.turn, Role::Second);
        assert_eq!(seed_total(&game.board, &game.scores), TOTAL_SEEDS);
    }

    #[test]
    fn test_invalid_move_only_reaches_mover() {
        let mut h = Harness::new();
        let alice = h.register("alice");
        let bob = h.register("bob");
        let game_id = h.start_game(alice, bob);
        let first = h.player(game_id, Role::First);
        let second = h.player(game_id, Role::Second);

        h.send(first, "MOVE 7");
        let lines = h.drain(first);
        assert!(lines[0].starts_with("MSG Invalid move"));
        assert_eq!(lines[1], "STATE 4 4 4 4 4 4 4 4 4 4 4 4 0 0 0");
        assert!(h.drain(second).is_empty());

        h.state.games.get_mut(game_id).unwrap().board[2] = 0;
        h.state.games.get_mut(game_id).unwrap().scores[1] = 4;
        h.send(first, "MOVE 2");
        assert!(h.drain(first)[0].starts_with("MSG Invalid move"));
        assert!(h.drain(second).is_empty());
        assert_eq!(h.state.games.get(game_id).unwrap().turn, Role::First);
    }

    #[test]
    fn test_out_of_turn_move_is_refused() {
        let mut h = Harness::new();
        let alice = h.register("alice");
        let bob = h.register("bob");
        let game_id = h.start_game(alice, bob);
        let second = h.player(game_id, Role::Second);

        h.send(second, "MOVE 7");
        h.send(second, "DRAW");
        assert_eq!(h.drain(second), vec!["MSG Not your turn", "MSG Not your turn"]);
        assert!(h.state.games.get(game_id).unwrap().moves.is_empty());
    }

    #[test]
    fn test_draw_refused_restores_play() {
        let mut h = Harness::new();
        let alice = h.register("alice");
        let bob = h.register("bob");
        let game_id = h.start_game(alice, bob);
        let first = h.player(game_id, Role::First);
        let second = h.player(game_id, Role::Second);

        h.send(first, "DRAW");
        assert_eq!(h.drain(second), vec!["ASKDRAW"]);
        assert_eq!(h.status(second), Some(ClientStatus::AwaitingDrawDecision));

        h.send(first, "MOVE 1");
        assert_eq!(
            h.drain(first),
            vec!["MSG Draw proposed, waiting for your opponent", "MSG Draw proposal pending"]
        );

        h.send(second, "NO");
        let initial = "STATE 4 4 4 4 4 4 4 4 4 4 4 4 0 0 0";
        assert_eq!(h.drain(first), vec!["MSG Draw refused, play continues", initial]);
        assert_eq!(h.drain(second), vec!["MSG Draw refused, play continues", initial]);
        assert_eq!(h.status(second), Some(ClientStatus::InGame));

        h.send(first, "MOVE 1");
        assert_eq!(h.state.games.get(game_id).unwrap().turn, Role::Second);
    }

    #[test]
    fn test_draw_accepted_ends_without_sweep() {
        let mut h = Harness::new();
        let alice = h.register("alice");
        let bob = h.register("bob");
        let game_id = h.start_game(alice, bob);
        let first = h.player(game_id, Role::First);
        let second = h.player(game_id, Role::Second);

        h.send(first, "DRAW");
        h.send(second, "YES");

        let lines = h.drain(first);
        assert!(lines.contains(&"STATE 4 4 4 4 4 4 4 4 4 4 4 4 0 0 0".to_string()));
        assert!(lines.contains(&"END draw".to_string()));
        assert!(lines.contains(&"ASKSAVE".to_string()));
        let game = h.state.games.get(game_id).unwrap();
        assert!(!game.is_active());
        assert_eq!(game.board, [4; 12]);
    }

    #[test]
    fn test_pending_draw_has_no_timeout() {
        let mut h = Harness::new();
        let alice = h.register("alice");
        let bob = h.register("bob");
        let carol = h.register("carol");
        let game_id = h.start_game(alice, bob);
        let first = h.player(game_id, Role::First);
        let second = h.player(game_id, Role::Second);

        h.send(first, "DRAW");
        for _ in 0..50 {
            h.send(carol, "LIST");
        }
        assert_eq!(h.status(second), Some(ClientStatus::AwaitingDrawDecision));
        assert_eq!(
            h.state.games.get(game_id).unwrap().draw_offer,
            Some(Role::First)
        );
    }

    #[test]
    fn test_board_and_games_list() {
        let mut h = Harness::new();
        let alice = h.register("alice");
        let bob = h.register("bob");
        let carol = h.register("carol");
        let game_id = h.start_game(alice, bob);

        h.send(carol, "BOARD");
        assert_eq!(h.drain(carol), vec!["MSG You are not in a game"]);

        h.send(alice, "BOARD");
        assert_eq!(h.drain(alice), vec!["STATE 4 4 4 4 4 4 4 4 4 4 4 4 0 0 0"]);

        h.send(carol, "GAMES");
        let summary = h.state.games.get(game_id).unwrap().summary();
        assert_eq!(h.drain(carol), vec![format!("GAMESLIST {}", summary)]);
    }

    #[test]
    fn test_spectator_receives_moves_and_stops() {
        let mut h = Harness::new();
        let alice = h.register("alice");
        let bob = h.register("bob");
        let carol = h.register("carol");
        let game_id = h.start_game(alice, bob);
        let first = h.player(game_id, Role::First);

        h.send(carol, &format!("WATCH {}", game_id));
        let lines = h.drain(carol);
        assert!(lines[0].starts_with(&format!("MSG Watching game {}", game_id)));
        assert_eq!(h.status(carol), Some(ClientStatus::Spectating));

        h.send(first, "MOVE 1");
        assert_eq!(h.drain(carol), vec!["STATE 4 0 5 5 5 5 4 4 4 4 4 4 0 0 1"]);

        h.send(carol, "LIST");
        assert_eq!(
            h.drain(carol),
            vec!["MSG Only STOPWATCH and CHAT are available while watching"]
        );

        h.send(carol, "STOPWATCH");
        assert_eq!(h.drain(carol), vec!["MSG Stopped watching"]);
        assert_eq!(h.status(carol), Some(ClientStatus::Waiting));
        assert!(h.state.games.get(game_id).unwrap().spectators.is_empty());
    }

    #[test]
    fn test_private_game_admits_friends_only() {
        let mut h = Harness::new();
        let alice = h.register("alice");
        let bob = h.register("bob");
        let carol = h.register("carol");
        h.send(alice, "PRIVATE");
        let game_id = h.start_game(alice, bob);

        h.send(carol, &format!("WATCH {}", game_id));
        assert_eq!(h.drain(carol), vec![format!("MSG Game {} is private", game_id)]);
        assert_eq!(h.status(carol), Some(ClientStatus::Waiting));

        h.send(carol, "ADDFRIEND bob");
        h.send(bob, "ACCEPTFRIEND carol");
        h.drain_all();

        h.send(carol, &format!("WATCH {}", game_id));
        assert_eq!(h.status(carol), Some(ClientStatus::Spectating));
        assert_eq!(h.state.games.get(game_id).unwrap().spectators, vec![carol]);
    }

    #[test]
    fn test_watch_limits() {
        let mut h = Harness::with_config(|config| config.max_spectators = 1);
        let alice = h.register("alice");
        let bob = h.register("bob");
        let carol = h.register("carol");
        let dave = h.register("dave");
        let game_id = h.start_game(alice, bob);

        h.send(carol, "WATCH 9");
        assert_eq!(h.drain(carol), vec!["MSG No game 9"]);

        h.send(carol, &format!("WATCH {}", game_id));
        h.send(dave, &format!("WATCH {}", game_id));
        assert_eq!(
            h.drain(dave),
            vec![format!("MSG Too many spectators in game {}", game_id)]
        );
        assert_eq!(h.status(dave), Some(ClientStatus::Waiting));
    }
}
