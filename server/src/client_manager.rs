//! Connection registry for the Awale server
//!
//! This module tracks every connected session, including:
//! - Connection lifecycle (accept, registration, disconnect)
//! - The finite state each session is in, which decides what it may send
//! - Username lookup and capacity enforcement
//! - Profiles of users who left, so a later connection with the same name
//!   picks up where they stopped
//!
//! Outbound lines are pushed onto a per-client channel drained by that
//! client's writer task, so sending never blocks the dispatcher.

use crate::game::GameId;
use log::{debug, info};
use shared::{is_valid_username, Reply};
use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

pub type ClientId = u32;

/// Rating given to a username the first time it registers.
pub const DEFAULT_RATING: u32 = 100;

/// State a session is in. Exactly one holds at any time and it alone decides
/// which commands the session may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientStatus {
    /// Connected but not yet registered under a username.
    Connected,
    /// In the lobby.
    Waiting,
    InGame,
    Spectating,
    /// Writing a new biography line by line.
    EditingBio,
    /// Asked whether the game that just ended should be saved.
    AwaitingSaveDecision,
    /// Asked to accept or refuse the opponent's draw proposal.
    AwaitingDrawDecision,
}

impl ClientStatus {
    /// Short name used in log lines
    pub fn label(self) -> &'static str {
        match self {
            ClientStatus::Connected => "connected",
            ClientStatus::Waiting => "waiting",
            ClientStatus::InGame => "ingame",
            ClientStatus::Spectating => "spectating",
            ClientStatus::EditingBio => "editingbio",
            ClientStatus::AwaitingSaveDecision => "awaitingsave",
            ClientStatus::AwaitingDrawDecision => "awaitingdraw",
        }
    }

    /// Statuses in which the session is seated in a running game.
    pub fn is_playing(self) -> bool {
        matches!(
            self,
            ClientStatus::InGame | ClientStatus::AwaitingDrawDecision
        )
    }
}

/// Per-user state that survives disconnects.
#[derive(Debug, Clone)]
pub struct Profile {
    pub rating: u32,
    pub bio: Vec<String>,
    /// Usernames this user counts as friends.
    pub friends: BTreeSet<String>,
    /// Usernames waiting for this user to accept them, oldest first.
    pub friend_requests: Vec<String>,
    /// Games involving this user are hidden from non-friends.
    pub private: bool,
    /// Finished games are saved without asking.
    pub auto_save: bool,
    pub last_save_decision: Option<bool>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            rating: DEFAULT_RATING,
            bio: Vec::new(),
            friends: BTreeSet::new(),
            friend_requests: Vec::new(),
            private: false,
            auto_save: false,
            last_save_decision: None,
        }
    }
}

/// One connected session
#[derive(Debug)]
pub struct Client {
    /// Server-assigned identifier, never reused while the server runs
    pub id: ClientId,
    pub addr: SocketAddr,
    /// Empty until registration succeeds
    pub username: Option<String>,
    pub status: ClientStatus,
    pub profile: Profile,
    pub opponent: Option<ClientId>,
    /// Most recent pending challenger; a newer challenge replaces it
    pub challenged_by: Option<ClientId>,
    /// Game this session plays in
    pub game: Option<GameId>,
    /// Game this session watches
    pub watching: Option<GameId>,
    /// Ended game this session has been asked to vote on
    pub save_vote: Option<GameId>,
    /// Bio lines collected while in `EditingBio`
    pub bio_draft: Vec<String>,
    sender: mpsc::UnboundedSender<String>,
    reader: Option<AbortHandle>,
}

impl Client {
    /// Creates an unregistered session writing to `sender`.
    pub fn new(id: ClientId, addr: SocketAddr, sender: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id,
            addr,
            username: None,
            status: ClientStatus::Connected,
            profile: Profile::default(),
            opponent: None,
            challenged_by: None,
            game: None,
            watching: None,
            save_vote: None,
            bio_draft: Vec::new(),
            sender,
            reader: None,
        }
    }

    /// Username, or an empty string before registration.
    pub fn name(&self) -> &str {
        self.username.as_deref().unwrap_or("")
    }

    /// Queues one line for the writer task.
    ///
    /// A closed queue means the writer already hit a socket error; the reader
    /// side reports the disconnect, so the failure is only logged here.
    pub fn send(&self, reply: &Reply) {
        if self.sender.send(reply.to_string()).is_err() {
            debug!("Dropping line for client {}: writer closed", self.id);
        }
    }

    fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegisterError {
    #[error("invalid username")]
    InvalidName,
    #[error("username already in use")]
    NameTaken,
    #[error("unknown client")]
    UnknownClient,
}

/// All live sessions plus the profiles of users who disconnected.
pub struct ClientManager {
    clients: HashMap<ClientId, Client>,
    by_name: HashMap<String, ClientId>,
    offline_profiles: HashMap<String, Profile>,
    next_client_id: ClientId,
    max_clients: usize,
}

impl ClientManager {
    /// Creates an empty registry holding at most `max_clients` sessions.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            by_name: HashMap::new(),
            offline_profiles: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Returns None when the server is at capacity.
    pub fn add_client(
        &mut self,
        addr: SocketAddr,
        sender: mpsc::UnboundedSender<String>,
    ) -> Option<ClientId> {
        if self.is_full() {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients
            .insert(client_id, Client::new(client_id, addr, sender));
        Some(client_id)
    }

    /// Links a session to its reader task. A session already gone stops the
    /// task at once.
    pub fn attach_reader(&mut self, client_id: ClientId, reader: AbortHandle) {
        match self.clients.get_mut(&client_id) {
            Some(client) => client.reader = Some(reader),
            None => reader.abort(),
        }
    }

    /// Removes a session, stops its reader and drops its outbound queue so the
    /// writer flushes and closes the socket. A registered user's profile is
    /// kept for a later reconnection.
    pub fn remove_client(&mut self, client_id: ClientId) -> Option<Client> {
        let mut client = self.clients.remove(&client_id)?;
        client.close();

        if let Some(name) = &client.username {
            self.by_name.remove(name);
            self.offline_profiles
                .insert(name.clone(), client.profile.clone());
        }
        for other in self.clients.values_mut() {
            if other.challenged_by == Some(client_id) {
                other.challenged_by = None;
            }
        }

        info!("Client {} ({}) disconnected", client_id, client.name());
        Some(client)
    }

    /// Claims `name` for a connected session. Returns true when an earlier
    /// profile under that name was restored.
    pub fn register(&mut self, client_id: ClientId, name: &str) -> Result<bool, RegisterError> {
        if !is_valid_username(name) {
            return Err(RegisterError::InvalidName);
        }
        if self.by_name.contains_key(name) {
            return Err(RegisterError::NameTaken);
        }
        let client = self
            .clients
            .get_mut(&client_id)
            .ok_or(RegisterError::UnknownClient)?;

        let restored = match self.offline_profiles.remove(name) {
            Some(profile) => {
                client.profile = profile;
                true
            }
            None => false,
        };
        client.username = Some(name.to_string());
        client.status = ClientStatus::Waiting;
        self.by_name.insert(name.to_string(), client_id);

        info!(
            "Client {} registered as {}{}",
            client_id,
            name,
            if restored { " (reconnected)" } else { "" }
        );
        Ok(restored)
    }

    /// Get a session by ID
    pub fn get(&self, client_id: ClientId) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    /// Get a mutable session by ID
    pub fn get_mut(&mut self, client_id: ClientId) -> Option<&mut Client> {
        self.clients.get_mut(&client_id)
    }

    /// Session currently registered as `name`
    pub fn find_by_name(&self, name: &str) -> Option<ClientId> {
        self.by_name.get(name).copied()
    }

    /// Profile of a user whether online or not.
    pub fn profile(&self, name: &str) -> Option<&Profile> {
        match self.by_name.get(name) {
            Some(id) => self.clients.get(id).map(|c| &c.profile),
            None => self.offline_profiles.get(name),
        }
    }

    /// Mutable profile of a user whether online or not.
    pub fn profile_mut(&mut self, name: &str) -> Option<&mut Profile> {
        match self.by_name.get(name) {
            Some(id) => self.clients.get_mut(id).map(|c| &mut c.profile),
            None => self.offline_profiles.get_mut(name),
        }
    }

    /// Moves a session to `status`; unknown sessions are ignored.
    pub fn set_status(&mut self, client_id: ClientId, status: ClientStatus) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.status = status;
        }
    }

    /// Current status, or None once the session is gone
    pub fn status(&self, client_id: ClientId) -> Option<ClientStatus> {
        self.clients.get(&client_id).map(|c| c.status)
    }

    /// Queues a reply for one session if it is still connected.
    pub fn send(&self, client_id: ClientId, reply: &Reply) {
        if let Some(client) = self.clients.get(&client_id) {
            client.send(reply);
        }
    }

    /// Usernames of registered sessions, sorted.
    pub fn usernames(&self) -> Vec<String> {
        let mut names: Vec<String> = self.by_name.keys().cloned().collect();
        names.sort();
        names
    }

    /// Ids of registered sessions.
    pub fn registered_ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self.by_name.values().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Check if every session slot is taken
    pub fn is_full(&self) -> bool {
        self.clients.len() >= self.max_clients
    }

    /// Number of connected sessions, registered or not
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Check if no session is connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
