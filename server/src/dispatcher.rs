//! Line dispatcher
//!
//! [`ServerState`] owns every session and every game. The network layer feeds
//! it connect, line and disconnect events one at a time, and each handler
//! mutates state and queues reply lines before returning. Routing looks at the
//! sender's status first: registering, bio-editing, save/draw-deciding and
//! spectating sessions each have a dedicated handler that consumes the line.
//! Only lobby and in-game sessions reach the general command table.

use crate::client_manager::{ClientId, ClientManager, ClientStatus, RegisterError};
use crate::config::ServerConfig;
use crate::ending::GameOutcome;
use crate::game::{GameId, GameTable};
use crate::storage::GameStore;
use log::{debug, warn};
use shared::{Command, ParseError, Reply, Role};
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

pub struct ServerState {
    pub(crate) config: ServerConfig,
    pub(crate) clients: ClientManager,
    pub(crate) games: GameTable,
    pub(crate) store: GameStore,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Self {
        let clients = ClientManager::new(config.max_clients);
        let games = GameTable::new(config.max_games());
        let store = GameStore::new(config.save_dir.clone());

        Self {
            config,
            clients,
            games,
            store,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn clients(&self) -> &ClientManager {
        &self.clients
    }

    pub fn games(&self) -> &GameTable {
        &self.games
    }

    /// False once every session slot is taken; the listener is not polled
    /// until one frees up.
    pub fn has_capacity(&self) -> bool {
        !self.clients.is_full()
    }

    /// Registers a new connection and prompts it for a username.
    pub fn handle_connect(
        &mut self,
        addr: SocketAddr,
        sender: mpsc::UnboundedSender<String>,
    ) -> Option<ClientId> {
        let client_id = self.clients.add_client(addr, sender)?;
        self.clients.send(client_id, &Reply::Register);
        Some(client_id)
    }

    pub fn attach_reader(&mut self, client_id: ClientId, reader: AbortHandle) {
        self.clients.attach_reader(client_id, reader);
    }

    /// Routes one input line from `client_id`.
    pub fn handle_line(&mut self, client_id: ClientId, line: &str) {
        let Some(status) = self.clients.status(client_id) else {
            debug!("Line from unknown client {} ignored", client_id);
            return;
        };
        debug!(
            "Client {} [{}] sent {:?}",
            client_id,
            status.label(),
            line
        );

        match status {
            ClientStatus::Connected => self.handle_registration(client_id, line),
            ClientStatus::EditingBio => self.handle_bio_line(client_id, line),
            ClientStatus::AwaitingSaveDecision => {
                if let Some(yes) = yes_or_no(line) {
                    self.record_save_vote(client_id, yes);
                }
            }
            ClientStatus::AwaitingDrawDecision => {
                if let Some(accepted) = yes_or_no(line) {
                    self.answer_draw(client_id, accepted);
                }
            }
            ClientStatus::Spectating => self.handle_spectator_line(client_id, line),
            ClientStatus::Waiting | ClientStatus::InGame => {
                self.handle_command(client_id, status, line)
            }
        }
    }

    /// Cleans up after a connection that hit end-of-stream or a socket error.
    pub fn handle_disconnect(&mut self, client_id: ClientId) {
        let Some(client) = self.clients.remove_client(client_id) else {
            debug!("Disconnect of unknown client {} ignored", client_id);
            return;
        };

        match client.status {
            ClientStatus::InGame | ClientStatus::AwaitingDrawDecision => {
                let seat = client.game.and_then(|game_id| {
                    let role = self.games.get(game_id)?.role_of(client_id)?;
                    Some((game_id, role))
                });
                match seat {
                    Some((game_id, role)) => {
                        self.finish_game(game_id, GameOutcome::Forfeit { loser: role });
                        self.release_spectators(game_id);
                    }
                    None => warn!(
                        "Internal consistency: client {} left a game that does not exist",
                        client_id
                    ),
                }
            }
            ClientStatus::AwaitingSaveDecision => {
                if let Some(profile) = self.clients.profile_mut(client.name()) {
                    profile.last_save_decision = Some(false);
                }
                match client.save_vote {
                    Some(game_id) => self.count_save_vote(game_id, false),
                    None => warn!(
                        "Internal consistency: client {} awaited a save decision without a game",
                        client_id
                    ),
                }
            }
            ClientStatus::Spectating => {
                if let Some(game) = client.watching.and_then(|id| self.games.get_mut(id)) {
                    game.remove_spectator(client_id);
                }
            }
            ClientStatus::Connected | ClientStatus::Waiting | ClientStatus::EditingBio => {}
        }
    }

    pub(crate) fn broadcast(&self, client_ids: &[ClientId], reply: &Reply) {
        for &client_id in client_ids {
            self.clients.send(client_id, reply);
        }
    }

    pub(crate) fn send_msg(&self, client_id: ClientId, text: impl Into<String>) {
        self.clients.send(client_id, &Reply::Msg(text.into()));
    }

    pub(crate) fn username(&self, client_id: ClientId) -> Option<String> {
        self.clients
            .get(client_id)
            .and_then(|client| client.username.clone())
    }

    fn handle_registration(&mut self, client_id: ClientId, line: &str) {
        match Command::parse(line) {
            Ok(Command::Username(name)) => self.register(client_id, &name),
            Err(ParseError::Usage(_)) if line.trim_start().starts_with("USERNAME") => {
                self.reject_registration(client_id, RegisterError::InvalidName)
            }
            _ => self.clients.send(client_id, &Reply::Register),
        }
    }

    fn register(&mut self, client_id: ClientId, name: &str) {
        match self.clients.register(client_id, name) {
            Ok(false) => self.send_msg(client_id, format!("Welcome {}", name)),
            Ok(true) => {
                self.send_msg(client_id, format!("Welcome back {}", name));
                let pending = self
                    .clients
                    .get(client_id)
                    .map_or(0, |c| c.profile.friend_requests.len());
                if pending > 0 {
                    self.send_msg(
                        client_id,
                        format!("You have {} pending friend request(s)", pending),
                    );
                }
            }
            Err(RegisterError::UnknownClient) => {
                warn!("Registration for unknown client {} ignored", client_id)
            }
            Err(err) => self.reject_registration(client_id, err),
        }
    }

    fn reject_registration(&mut self, client_id: ClientId, err: RegisterError) {
        let text = match err {
            RegisterError::InvalidName => {
                "Invalid username: 2 to 29 characters among letters, digits, _ and -"
            }
            _ => "Username already in use",
        };
        self.send_msg(client_id, text);
        warn!("Client {} rejected at registration: {}", client_id, err);
        self.clients.remove_client(client_id);
    }

    fn handle_spectator_line(&mut self, client_id: ClientId, line: &str) {
        match Command::parse(line) {
            Ok(Command::StopWatch) => self.stop_watching(client_id),
            Ok(Command::Chat { to, text }) => self.chat(client_id, to.as_deref(), &text),
            Err(ParseError::Empty) => {}
            _ => self.send_msg(
                client_id,
                "Only STOPWATCH and CHAT are available while watching",
            ),
        }
    }

    fn handle_command(&mut self, client_id: ClientId, status: ClientStatus, line: &str) {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(err @ ParseError::Usage(_)) => {
                self.send_msg(client_id, err.to_string());
                return;
            }
            Err(err) => {
                debug!("Client {}: {}; dropped", client_id, err);
                return;
            }
        };
        let in_game = status == ClientStatus::InGame;

        match command {
            Command::List => self.list_users(client_id),
            Command::Games => self.list_games(client_id),
            Command::Board => self.send_board(client_id),
            Command::Whois(name) => self.whois(client_id, &name),
            Command::AddFriend(name) => self.add_friend(client_id, &name),
            Command::AcceptFriend(name) => self.accept_friend(client_id, &name),
            Command::RemoveFriend(name) => self.remove_friend(client_id, &name),
            Command::ListFriends => self.list_friends(client_id),
            Command::ListFriendRequests => self.list_friend_requests(client_id),
            Command::Private => self.toggle_private(client_id),
            Command::Save => self.toggle_auto_save(client_id),
            Command::History => self.send_history(client_id),
            Command::Replay(number) => self.replay(client_id, number),
            Command::Chat { to, text } => self.chat(client_id, to.as_deref(), &text),
            Command::Bio
            | Command::Watch(_)
            | Command::Challenge(_)
            | Command::Accept(_)
            | Command::Refuse(_)
                if in_game =>
            {
                self.send_msg(client_id, "Not available during a game")
            }
            Command::Bio => self.start_bio(client_id),
            Command::Watch(game_id) => self.watch(client_id, game_id),
            Command::Challenge(name) => self.challenge(client_id, &name),
            Command::Accept(name) => self.accept_challenge(client_id, &name),
            Command::Refuse(name) => self.refuse_challenge(client_id, &name),
            command @ (Command::Quit | Command::Move(_) | Command::Draw) if in_game => {
                self.handle_game_command(client_id, command)
            }
            other => debug!(
                "Client {} [{}] sent {:?} outside its state; dropped",
                client_id,
                status.label(),
                other
            ),
        }
    }

    fn handle_game_command(&mut self, client_id: ClientId, command: Command) {
        let Some((game_id, role)) = self.seat_of(client_id) else {
            warn!(
                "Internal consistency: client {} is in game without an active game; line skipped",
                client_id
            );
            return;
        };

        match command {
            Command::Quit => self.finish_game(game_id, GameOutcome::Forfeit { loser: role }),
            Command::Move(pit) => self.play_move(client_id, game_id, role, pit),
            Command::Draw => self.propose_draw(client_id, game_id, role),
            _ => {}
        }
    }

    /// Active game and role of a seated player.
    pub(crate) fn seat_of(&self, client_id: ClientId) -> Option<(GameId, Role)> {
        let game_id = self.clients.get(client_id)?.game?;
        let game = self.games.get(game_id).filter(|game| game.is_active())?;
        Some((game_id, game.role_of(client_id)?))
    }
}

/// Reads a decision line. Anything other than YES counts as a refusal; blank
/// lines are ignored.
fn yes_or_no(line: &str) -> Option<bool> {
    match Command::parse(line) {
        Ok(Command::Yes) => Some(true),
        Err(ParseError::Empty) => None,
        _ => Some(false),
    }
}
