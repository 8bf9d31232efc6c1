//! Line-oriented text protocol spoken between clients and the server.
//!
//! Every message is one newline-terminated ASCII line. Clients send
//! [`Command`]s; the server answers with [`Reply`] lines.

use crate::rules::{Board, Role, Scores};
use std::fmt;
use thiserror::Error;

/// Closes a multi-line `WHOIS` answer.
pub const BIO_SENTINEL: &str = "====";
/// Closes a multi-line `REPLAY` answer.
pub const REPLAY_SENTINEL: &str = "----";
/// Line that finishes the bio-editing dialogue.
pub const BIO_END: &str = "END";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Username(String),
    List,
    Games,
    Board,
    Bio,
    Whois(String),
    AddFriend(String),
    AcceptFriend(String),
    RemoveFriend(String),
    ListFriends,
    ListFriendRequests,
    Private,
    Save,
    History,
    Replay(usize),
    Watch(usize),
    StopWatch,
    Chat { to: Option<String>, text: String },
    Challenge(String),
    Accept(String),
    Refuse(String),
    Quit,
    Move(usize),
    Draw,
    Yes,
    No,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty line")]
    Empty,
    #[error("unknown command {0}")]
    Unknown(String),
    #[error("Usage: {0}")]
    Usage(&'static str),
}

fn single_name(rest: &str, usage: &'static str) -> Result<String, ParseError> {
    let mut parts = rest.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(name), None) => Ok(name.to_string()),
        _ => Err(ParseError::Usage(usage)),
    }
}

fn single_number(rest: &str, usage: &'static str) -> Result<usize, ParseError> {
    rest.trim().parse().map_err(|_| ParseError::Usage(usage))
}

fn no_args(rest: &str, command: Command, usage: &'static str) -> Result<Command, ParseError> {
    if rest.trim().is_empty() {
        Ok(command)
    } else {
        Err(ParseError::Usage(usage))
    }
}

impl Command {
    /// Parses one client line. Keywords are case-sensitive, as sent by the
    /// reference clients.
    pub fn parse(line: &str) -> Result<Command, ParseError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            return Err(ParseError::Empty);
        }

        let (keyword, rest) = match trimmed.split_once(' ') {
            Some((keyword, rest)) => (keyword, rest),
            None => (trimmed, ""),
        };

        match keyword {
            "USERNAME" => single_name(rest, "USERNAME <name>").map(Command::Username),
            "LIST" => no_args(rest, Command::List, "LIST"),
            "GAMES" => no_args(rest, Command::Games, "GAMES"),
            "BOARD" => no_args(rest, Command::Board, "BOARD"),
            "BIO" => no_args(rest, Command::Bio, "BIO"),
            "WHOIS" => single_name(rest, "WHOIS <user>").map(Command::Whois),
            "ADDFRIEND" => single_name(rest, "ADDFRIEND <user>").map(Command::AddFriend),
            "ACCEPTFRIEND" => single_name(rest, "ACCEPTFRIEND <user>").map(Command::AcceptFriend),
            "REMOVEFRIEND" => single_name(rest, "REMOVEFRIEND <user>").map(Command::RemoveFriend),
            "LISTFRIENDS" => no_args(rest, Command::ListFriends, "LISTFRIENDS"),
            "LISTFRIENDREQUESTS" => {
                no_args(rest, Command::ListFriendRequests, "LISTFRIENDREQUESTS")
            }
            "PRIVATE" => no_args(rest, Command::Private, "PRIVATE"),
            "SAVE" => no_args(rest, Command::Save, "SAVE"),
            "HISTORY" => no_args(rest, Command::History, "HISTORY"),
            "REPLAY" => single_number(rest, "REPLAY <n>").map(Command::Replay),
            "WATCH" => single_number(rest, "WATCH <game id>").map(Command::Watch),
            "STOPWATCH" => no_args(rest, Command::StopWatch, "STOPWATCH"),
            "CHAT" => parse_chat(rest),
            "CHALLENGE" => single_name(rest, "CHALLENGE <user>").map(Command::Challenge),
            "ACCEPT" => single_name(rest, "ACCEPT <user>").map(Command::Accept),
            "REFUSE" => single_name(rest, "REFUSE <user>").map(Command::Refuse),
            "QUIT" => no_args(rest, Command::Quit, "QUIT"),
            "MOVE" => single_number(rest, "MOVE <pit>").map(Command::Move),
            "DRAW" => no_args(rest, Command::Draw, "DRAW"),
            "YES" => no_args(rest, Command::Yes, "YES"),
            "NO" => no_args(rest, Command::No, "NO"),
            other => Err(ParseError::Unknown(other.to_string())),
        }
    }
}

fn parse_chat(rest: &str) -> Result<Command, ParseError> {
    const USAGE: &str = "CHAT <text> | CHAT @<user> <text>";
    let rest = rest.trim();

    if let Some(addressed) = rest.strip_prefix('@') {
        let (to, text) = addressed.split_once(' ').ok_or(ParseError::Usage(USAGE))?;
        let text = text.trim();
        if to.is_empty() || text.is_empty() {
            return Err(ParseError::Usage(USAGE));
        }
        return Ok(Command::Chat {
            to: Some(to.to_string()),
            text: text.to_string(),
        });
    }

    if rest.is_empty() {
        return Err(ParseError::Usage(USAGE));
    }
    Ok(Command::Chat {
        to: None,
        text: rest.to_string(),
    })
}

/// How a finished game ended, as announced on the `END` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    Draw,
    Winner(Role),
    Forfeit { winner: Role },
}

/// One line sent by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Register,
    Role(Role),
    State {
        board: Board,
        scores: Scores,
        turn: Role,
    },
    Msg(String),
    Chat {
        from: String,
        private: bool,
        text: String,
    },
    AskDraw,
    AskSave,
    End(EndReason),
    UserList(Vec<String>),
    GamesList(Vec<String>),
    FriendList(Vec<String>),
    FriendRequests(Vec<String>),
    HistoryList(Vec<String>),
    ChallengedBy(String),
    Bio { user: String, rating: u32 },
    Raw(String),
}

impl Reply {
    pub fn msg(text: impl Into<String>) -> Reply {
        Reply::Msg(text.into())
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, verb: &str, items: &[String]) -> fmt::Result {
    write!(f, "{}", verb)?;
    for item in items {
        write!(f, " {}", item)?;
    }
    Ok(())
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Register => write!(f, "REGISTER"),
            Reply::Role(role) => write!(f, "ROLE {}", role),
            Reply::State {
                board,
                scores,
                turn,
            } => {
                write!(f, "STATE")?;
                for seeds in board {
                    write!(f, " {}", seeds)?;
                }
                write!(f, " {} {} {}", scores[0], scores[1], turn)
            }
            Reply::Msg(text) => write!(f, "MSG {}", text),
            Reply::Chat {
                from,
                private: true,
                text,
            } => write!(f, "CHAT @{} {}", from, text),
            Reply::Chat { from, text, .. } => write!(f, "CHAT {} {}", from, text),
            Reply::AskDraw => write!(f, "ASKDRAW"),
            Reply::AskSave => write!(f, "ASKSAVE"),
            Reply::End(EndReason::Draw) => write!(f, "END draw"),
            Reply::End(EndReason::Winner(role)) => write!(f, "END winner {}", role),
            Reply::End(EndReason::Forfeit { winner }) => write!(f, "END forfeit {}", winner),
            Reply::UserList(users) => write_list(f, "USERLIST", users),
            Reply::GamesList(games) => write_list(f, "GAMESLIST", games),
            Reply::FriendList(friends) => write_list(f, "FRIENDS", friends),
            Reply::FriendRequests(requests) => write_list(f, "FRIENDREQUESTS", requests),
            Reply::HistoryList(entries) => write_list(f, "HISTORYLIST", entries),
            Reply::ChallengedBy(user) => write!(f, "CHALLENGED_BY {}", user),
            Reply::Bio { user, rating } => write!(f, "BIO {} {}", user, rating),
            Reply::Raw(line) => write!(f, "{}", line),
        }
    }
}
