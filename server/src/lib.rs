//! # Awale Game Server Library
//!
//! This library provides the server for the multiplayer Awale board game. It
//! owns every connection and every running game, applies the rules, and keeps
//! players, spectators and saved games in step over a line-based text
//! protocol.
//!
//! ## Core Responsibilities
//!
//! ### Session Management
//! Handles the complete lifecycle of a connection including:
//! - Username registration and reconnection to an earlier profile
//! - The state each session is in, which alone decides what it may send
//! - Disconnection cleanup, including forfeits of running games
//!
//! ### Matchmaking and Social Features
//! Challenges, friend lists, private mode, biographies, chat and ratings.
//!
//! ### Game Coordination
//! Each game keeps its own board, scores and turn. Moves are checked by the
//! rule engine in the `shared` crate and the resulting state is broadcast to
//! both players and every spectator. Draw proposals and end-of-game save
//! prompts are answered through normal dispatch, so a slow player never holds
//! up anyone else.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Event Loop
//! All state lives in one [`dispatcher::ServerState`] owned by the main loop
//! in [`network::Server`]. Per-connection reader tasks forward complete lines
//! over a channel and per-connection writer tasks drain outbound queues, all on
//! a current-thread runtime, so handlers never need locks.
//!
//! ## Module Organization
//!
//! - `config`: limits and listening address
//! - `client_manager`: session registry and offline profiles
//! - `game`: game table and per-game state
//! - `dispatcher`: routing of each line by session state
//! - `lobby`: challenges, friends, profiles, chat and ratings
//! - `gameplay`: moves, draw proposals and spectating
//! - `ending`: game end, save votes, history and replay
//! - `storage`: saved-game files
//! - `network`: TCP listener and connection tasks
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(ServerConfig::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod config;
pub mod dispatcher;
pub mod ending;
pub mod game;
pub mod gameplay;
pub mod lobby;
pub mod network;
pub mod storage;
