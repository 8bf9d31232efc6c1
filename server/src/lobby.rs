//! Lobby handlers: challenges, friends, profiles, ratings and chat.

use crate::client_manager::{ClientId, ClientStatus};
use crate::dispatcher::ServerState;
use log::{debug, info};
use shared::protocol::{BIO_END, BIO_SENTINEL};
use shared::{Reply, Role};

impl ServerState {
    pub(crate) fn list_users(&self, client_id: ClientId) {
        self.clients
            .send(client_id, &Reply::UserList(self.clients.usernames()));
    }

    /// Global chat reaches every other registered session; `@user` chat only
    /// that user.
    pub(crate) fn chat(&self, client_id: ClientId, to: Option<&str>, text: &str) {
        let Some(from) = self.username(client_id) else {
            return;
        };

        match to {
            Some(target) => match self.clients.find_by_name(target) {
                Some(target_id) => self.clients.send(
                    target_id,
                    &Reply::Chat {
                        from,
                        private: true,
                        text: text.to_string(),
                    },
                ),
                None => self.send_msg(client_id, format!("User {} not found", target)),
            },
            None => {
                let reply = Reply::Chat {
                    from,
                    private: false,
                    text: text.to_string(),
                };
                for other in self.clients.registered_ids() {
                    if other != client_id {
                        self.clients.send(other, &reply);
                    }
                }
            }
        }
    }

    pub(crate) fn challenge(&mut self, client_id: ClientId, target: &str) {
        let Some(caller) = self.username(client_id) else {
            return;
        };
        let Some(target_id) = self.clients.find_by_name(target) else {
            self.send_msg(client_id, format!("User {} not found", target));
            return;
        };
        if target_id == client_id {
            self.send_msg(client_id, "You cannot challenge yourself");
            return;
        }
        if self
            .clients
            .status(target_id)
            .map_or(false, ClientStatus::is_playing)
        {
            self.send_msg(client_id, format!("{} is busy in a game", target));
            return;
        }

        if let Some(client) = self.clients.get_mut(target_id) {
            client.challenged_by = Some(client_id);
        }
        self.clients
            .send(target_id, &Reply::ChallengedBy(caller.clone()));
        self.send_msg(client_id, format!("Challenge sent to {}", target));
        debug!("{} challenged {}", caller, target);
    }

    /// Checks that `challenger` is the caller's pending challenger and returns
    /// its session.
    fn pending_challenger(&self, client_id: ClientId, challenger: &str) -> Option<ClientId> {
        let challenger_id = self.clients.find_by_name(challenger)?;
        let pending = self.clients.get(client_id)?.challenged_by?;
        (pending == challenger_id).then_some(challenger_id)
    }

    pub(crate) fn accept_challenge(&mut self, client_id: ClientId, challenger: &str) {
        let Some(challenger_id) = self.pending_challenger(client_id, challenger) else {
            self.send_msg(client_id, format!("No pending challenge from {}", challenger));
            return;
        };
        if self.clients.status(challenger_id) != Some(ClientStatus::Waiting) {
            self.send_msg(client_id, format!("{} is not available", challenger));
            return;
        }

        let (Some(caller), Some(challenger_name)) =
            (self.username(client_id), self.username(challenger_id))
        else {
            return;
        };

        // Coin flip for who moves first.
        let (players, names) = if rand::random::<bool>() {
            ([challenger_id, client_id], [challenger_name, caller])
        } else {
            ([client_id, challenger_id], [caller, challenger_name])
        };
        let private = names
            .iter()
            .any(|name| self.clients.profile(name).map_or(false, |p| p.private));

        let Some(game_id) =
            self.games
                .create(players, names.clone(), private, self.config.move_log_limit)
        else {
            self.send_msg(client_id, "Server full: no free game slot");
            return;
        };

        for role in [Role::First, Role::Second] {
            let player = players[role.index()];
            let opponent = players[role.opponent().index()];
            if let Some(client) = self.clients.get_mut(player) {
                client.status = ClientStatus::InGame;
                client.opponent = Some(opponent);
                client.game = Some(game_id);
                if client.challenged_by == Some(opponent) {
                    client.challenged_by = None;
                }
            }

            let pits = role.pits();
            self.clients.send(player, &Reply::Role(role));
            self.send_msg(
                player,
                format!(
                    "You are P{} (pits {}..{}) against {}",
                    role.index() + 1,
                    pits.start,
                    pits.end - 1,
                    names[role.opponent().index()]
                ),
            );
        }

        if let Some(game) = self.games.get(game_id) {
            let state = game.state_reply();
            self.broadcast(&players, &state);
        }
    }

    pub(crate) fn refuse_challenge(&mut self, client_id: ClientId, challenger: &str) {
        let Some(challenger_id) = self.pending_challenger(client_id, challenger) else {
            self.send_msg(client_id, format!("No pending challenge from {}", challenger));
            return;
        };
        let caller = self.username(client_id).unwrap_or_default();

        if let Some(client) = self.clients.get_mut(client_id) {
            client.challenged_by = None;
        }
        self.send_msg(challenger_id, format!("{} refused your challenge", caller));
        self.send_msg(client_id, format!("Challenge from {} refused", challenger));
    }

    pub(crate) fn start_bio(&mut self, client_id: ClientId) {
        let max_lines = self.config.bio_max_lines;
        let Some(client) = self.clients.get_mut(client_id) else {
            return;
        };
        client.bio_draft.clear();
        client.status = ClientStatus::EditingBio;
        client.send(&Reply::Msg(format!(
            "Enter up to {} bio lines, finish with {}",
            max_lines, BIO_END
        )));
    }

    /// One line of the bio dialogue. `END` or reaching the line limit commits
    /// the draft.
    pub(crate) fn handle_bio_line(&mut self, client_id: ClientId, line: &str) {
        let max_lines = self.config.bio_max_lines;
        let line_len = self.config.bio_line_len;
        let Some(client) = self.clients.get_mut(client_id) else {
            return;
        };

        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim() != BIO_END {
            let mut kept = line.to_string();
            if kept.len() > line_len {
                let mut cut = line_len;
                while !kept.is_char_boundary(cut) {
                    cut -= 1;
                }
                kept.truncate(cut);
            }
            client.bio_draft.push(kept);
            if client.bio_draft.len() < max_lines {
                return;
            }
        }

        client.profile.bio = std::mem::take(&mut client.bio_draft);
        client.status = ClientStatus::Waiting;
        let count = client.profile.bio.len();
        client.send(&Reply::Msg(format!("Bio saved ({} lines)", count)));
    }

    pub(crate) fn whois(&self, client_id: ClientId, name: &str) {
        let Some(profile) = self.clients.profile(name) else {
            self.send_msg(client_id, format!("User {} not found", name));
            return;
        };

        self.clients.send(
            client_id,
            &Reply::Bio {
                user: name.to_string(),
                rating: profile.rating,
            },
        );
        for line in &profile.bio {
            self.clients.send(client_id, &Reply::Raw(line.clone()));
        }
        self.clients
            .send(client_id, &Reply::Raw(BIO_SENTINEL.to_string()));
    }

    pub(crate) fn add_friend(&mut self, client_id: ClientId, target: &str) {
        let Some(caller) = self.username(client_id) else {
            return;
        };
        if caller == target {
            self.send_msg(client_id, "You cannot befriend yourself");
            return;
        }
        let max_requests = self.config.max_friend_requests;
        let Some(target_id) = self.clients.find_by_name(target) else {
            self.send_msg(client_id, format!("User {} not found", target));
            return;
        };
        if self
            .clients
            .get(client_id)
            .map_or(false, |c| c.profile.friends.contains(target))
        {
            self.send_msg(client_id, format!("{} is already your friend", target));
            return;
        }

        let Some(profile) = self.clients.get_mut(target_id).map(|c| &mut c.profile) else {
            return;
        };
        if profile.friend_requests.contains(&caller) {
            self.send_msg(client_id, format!("Request to {} already pending", target));
            return;
        }
        if profile.friend_requests.len() >= max_requests {
            self.send_msg(client_id, format!("{} has too many pending requests", target));
            return;
        }
        profile.friend_requests.push(caller.clone());

        self.send_msg(
            target_id,
            format!("{} wants to be your friend (ACCEPTFRIEND {})", caller, caller),
        );
        self.send_msg(client_id, format!("Friend request sent to {}", target));
    }

    /// Makes the friendship mutual. Nothing changes unless every list that
    /// would grow has room.
    pub(crate) fn accept_friend(&mut self, client_id: ClientId, requester: &str) {
        let Some(caller) = self.username(client_id) else {
            return;
        };
        let max_friends = self.config.max_friends;

        let pending = self
            .clients
            .get(client_id)
            .map_or(false, |c| c.profile.friend_requests.iter().any(|r| r == requester));
        if !pending {
            self.send_msg(client_id, format!("No friend request from {}", requester));
            return;
        }

        let no_room = |owner: &str, friend: &str| {
            self.clients.profile(owner).map_or(false, |p| {
                !p.friends.contains(friend) && p.friends.len() >= max_friends
            })
        };
        if no_room(&caller, requester) || no_room(requester, &caller) {
            self.send_msg(client_id, "Friend list full");
            return;
        }

        if let Some(profile) = self.clients.profile_mut(&caller) {
            profile.friend_requests.retain(|r| r != requester);
            profile.friends.insert(requester.to_string());
        }
        if let Some(profile) = self.clients.profile_mut(requester) {
            profile.friends.insert(caller.clone());
        }

        self.send_msg(client_id, format!("You are now friends with {}", requester));
        if let Some(requester_id) = self.clients.find_by_name(requester) {
            self.send_msg(
                requester_id,
                format!("{} accepted your friend request", caller),
            );
        }
        info!("{} and {} are now friends", caller, requester);
    }

    /// Drops `name` from the caller's list only.
    pub(crate) fn remove_friend(&mut self, client_id: ClientId, name: &str) {
        let Some(client) = self.clients.get_mut(client_id) else {
            return;
        };
        if client.profile.friends.remove(name) {
            client.send(&Reply::Msg(format!("{} removed from your friends", name)));
        } else {
            client.send(&Reply::Msg(format!("{} is not your friend", name)));
        }
    }

    pub(crate) fn list_friends(&self, client_id: ClientId) {
        if let Some(client) = self.clients.get(client_id) {
            let friends = client.profile.friends.iter().cloned().collect();
            client.send(&Reply::FriendList(friends));
        }
    }

    pub(crate) fn list_friend_requests(&self, client_id: ClientId) {
        if let Some(client) = self.clients.get(client_id) {
            client.send(&Reply::FriendRequests(
                client.profile.friend_requests.clone(),
            ));
        }
    }

    pub(crate) fn toggle_private(&mut self, client_id: ClientId) {
        if let Some(client) = self.clients.get_mut(client_id) {
            client.profile.private = !client.profile.private;
            let mode = if client.profile.private { "on" } else { "off" };
            client.send(&Reply::Msg(format!("Private mode {}", mode)));
        }
    }

    pub(crate) fn toggle_auto_save(&mut self, client_id: ClientId) {
        if let Some(client) = self.clients.get_mut(client_id) {
            client.profile.auto_save = !client.profile.auto_save;
            let mode = if client.profile.auto_save { "on" } else { "off" };
            client.send(&Reply::Msg(format!("Auto-save {}", mode)));
        }
    }

    /// True when each user lists the other as a friend.
    pub(crate) fn are_friends(&self, a: &str, b: &str) -> bool {
        let lists = |from: &str, to: &str| {
            self.clients
                .profile(from)
                .map_or(false, |p| p.friends.contains(to))
        };
        lists(a, b) && lists(b, a)
    }

    /// +1 to the winner, -1 to the loser floored at 0; friends play unrated.
    pub(crate) fn apply_rating(&mut self, winner: &str, loser: &str) {
        if self.are_friends(winner, loser) {
            debug!("{} beat {}: friendly game, ratings unchanged", winner, loser);
            return;
        }
        if let Some(profile) = self.clients.profile_mut(winner) {
            profile.rating += 1;
        }
        if let Some(profile) = self.clients.profile_mut(loser) {
            profile.rating = profile.rating.saturating_sub(1);
        }
        info!("Rating updated: {} +1, {} -1", winner, loser);
    }
}
