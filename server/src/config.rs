//! Server limits and listening address.

use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 4321;
pub const DEFAULT_MAX_CLIENTS: usize = 30;
pub const DEFAULT_SAVE_DIR: &str = "saved_games";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Connected sessions allowed at once. Games are capped at half of this.
    pub max_clients: usize,
    pub max_spectators: usize,
    pub max_friends: usize,
    pub max_friend_requests: usize,
    pub bio_max_lines: usize,
    pub bio_line_len: usize,
    /// Moves beyond this count are played but not recorded for saving.
    pub move_log_limit: usize,
    /// Longest line read from a socket in one go, in bytes.
    pub max_line_len: usize,
    pub save_dir: PathBuf,
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn max_games(&self) -> usize {
        self.max_clients / 2
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            max_clients: DEFAULT_MAX_CLIENTS,
            max_spectators: 20,
            max_friends: 20,
            max_friend_requests: 20,
            bio_max_lines: 10,
            bio_line_len: 128,
            move_log_limit: 200,
            max_line_len: 256,
            save_dir: PathBuf::from(DEFAULT_SAVE_DIR),
        }
    }
}
