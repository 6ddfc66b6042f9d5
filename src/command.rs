//! Wire command parsing
//!
//! Parses each inbound text line into a closed set of commands before
//! dispatch. Lines starting with `#` are commands (keyword matched
//! case-insensitively); everything else is chat.
//!
//! Split semantics: the keyword and the first argument are separated on runs
//! of whitespace; a trailing message argument keeps its internal spacing.

use crate::error::UsageError;

/// A parsed client line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `#setMyName <name>` — bind or rebind the display name
    SetName(String),
    /// `#sendPrivate <name> <message...>` — message a single named session
    Private { to: String, text: String },
    /// `#join <room>` — enter a room, creating it if absent
    Join(String),
    /// `#leave <room>` — exit a room
    Leave(String),
    /// `#groups` — list the session's current rooms
    Groups,
    /// Any line without the command prefix — broadcast to the sender's rooms
    Chat(String),
    /// A command keyword the server does not recognize
    Unknown(String),
}

impl Command {
    /// Parse one trimmed, non-empty line.
    ///
    /// Returns `Err(UsageError)` when a recognized command is missing
    /// required arguments; the error's display text is the feedback line.
    pub fn parse(line: &str) -> Result<Self, UsageError> {
        let line = line.trim();
        if !line.starts_with('#') {
            return Ok(Command::Chat(line.to_string()));
        }

        let (keyword, rest) = split_keyword(line);
        match keyword.to_ascii_lowercase().as_str() {
            "#setmyname" => first_token(rest)
                .map(|name| Command::SetName(name.to_string()))
                .ok_or(UsageError("#setMyName <name>")),
            "#sendprivate" => {
                let (to, text) = split_keyword(rest);
                if to.is_empty() || text.is_empty() {
                    return Err(UsageError("#sendPrivate <name> <message>"));
                }
                Ok(Command::Private {
                    to: to.to_string(),
                    text: text.to_string(),
                })
            }
            "#join" => first_token(rest)
                .map(|room| Command::Join(room.to_string()))
                .ok_or(UsageError("#join <room>")),
            "#leave" => first_token(rest)
                .map(|room| Command::Leave(room.to_string()))
                .ok_or(UsageError("#leave <room>")),
            "#groups" => Ok(Command::Groups),
            _ => Ok(Command::Unknown(keyword.to_string())),
        }
    }
}

/// Split off the leading token; the remainder is left-trimmed so a trailing
/// message argument starts at its first real character.
fn split_keyword(line: &str) -> (&str, &str) {
    match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim_start()),
        None => (line, ""),
    }
}

fn first_token(rest: &str) -> Option<&str> {
    rest.split_whitespace().next()
}
