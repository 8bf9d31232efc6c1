//! Flat text files for saved games.
//!
//! One file per game, named after the save time and both players:
//!
//! ```text
//! Date: 2025-10-21 14:03:11
//! Player 0: alice
//! Player 1: bob
//! Result: alice wins
//! Final score: 27 - 21
//! Moves:
//! 1. alice pit 1 captured 0
//! ```

use crate::game::Game;
use log::info;
use std::fs;
use std::io::Error as IoError;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to create directory {0}: {1}")]
    DirectoryCreate(PathBuf, IoError),

    #[error("Failed to read directory {0}: {1}")]
    DirectoryRead(PathBuf, IoError),

    #[error("Failed to read file {0}: {1}")]
    FileRead(PathBuf, IoError),

    #[error("Failed to write file {0}: {1}")]
    FileWrite(PathBuf, IoError),
}

/// A saved game found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedGame {
    pub path: PathBuf,
    pub players: [String; 2],
}

impl SavedGame {
    pub fn label(&self) -> String {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

pub struct GameStore {
    dir: PathBuf,
}

impl GameStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Writes `game` with its result line and returns the new file's path.
    pub fn save(&self, game: &Game, result: &str) -> Result<PathBuf, StorageError> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| StorageError::DirectoryCreate(self.dir.clone(), e))?;

        let file_name = format!(
            "{}_{}_vs_{}_g{}.txt",
            game.created_at.format("%Y%m%d-%H%M%S"),
            game.names[0],
            game.names[1],
            game.id
        );
        let path = self.dir.join(file_name);

        let mut contents = String::new();
        contents.push_str(&format!(
            "Date: {}\n",
            game.created_at.format("%Y-%m-%d %H:%M:%S")
        ));
        contents.push_str(&format!("Player 0: {}\n", game.names[0]));
        contents.push_str(&format!("Player 1: {}\n", game.names[1]));
        contents.push_str(&format!("Result: {}\n", result));
        contents.push_str(&format!(
            "Final score: {} - {}\n",
            game.scores[0], game.scores[1]
        ));
        contents.push_str("Moves:\n");
        for (number, record) in game.moves.iter().enumerate() {
            contents.push_str(&format!(
                "{}. {} pit {} captured {}\n",
                number + 1,
                game.name(record.role),
                record.pit,
                record.captured
            ));
        }

        fs::write(&path, contents).map_err(|e| StorageError::FileWrite(path.clone(), e))?;
        info!("Saved game {} to {}", game.id, path.display());
        Ok(path)
    }

    /// Saved games `username` played in, oldest first. A missing directory
    /// simply means nothing was saved yet.
    pub fn history(&self, username: &str) -> Result<Vec<SavedGame>, StorageError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let entries =
            fs::read_dir(&self.dir).map_err(|e| StorageError::DirectoryRead(self.dir.clone(), e))?;

        let mut games = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::DirectoryRead(self.dir.clone(), e))?;
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "txt") {
                continue;
            }
            if let Some(players) = read_players(&path)? {
                if players.iter().any(|p| p == username) {
                    games.push(SavedGame { path, players });
                }
            }
        }

        games.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(games)
    }

    pub fn read_lines(&self, saved: &SavedGame) -> Result<Vec<String>, StorageError> {
        let contents = fs::read_to_string(&saved.path)
            .map_err(|e| StorageError::FileRead(saved.path.clone(), e))?;
        Ok(contents.lines().map(str::to_string).collect())
    }
}

fn read_players(path: &Path) -> Result<Option<[String; 2]>, StorageError> {
    let contents =
        fs::read_to_string(path).map_err(|e| StorageError::FileRead(path.to_path_buf(), e))?;

    let mut first = None;
    let mut second = None;
    for line in contents.lines() {
        if let Some(name) = line.strip_prefix("Player 0: ") {
            first = Some(name.to_string());
        } else if let Some(name) = line.strip_prefix("Player 1: ") {
            second = Some(name.to_string());
        }
    }

    Ok(first.zip(second).map(|(a, b)| [a, b]))
}
