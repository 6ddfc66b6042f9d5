//! Error types for the chat relay
//!
//! Defines transport-level errors, registry rejections, and command usage
//! errors. Uses thiserror for ergonomic error definitions.
//!
//! Registry and usage errors double as user feedback: their `Display` output
//! is exactly the line sent back to the offending session.

use thiserror::Error;

/// Connection-scoped fatal errors
///
/// Terminates a single pipeline; the accept loop logs these and keeps
/// serving other connections.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (socket setup or teardown)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rejections produced by registry operations
///
/// Recovered locally: the pipeline reports the display string to the
/// originating session and mutates nothing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Candidate name is empty, all-whitespace, or contains whitespace
    #[error("name must not be empty or contain spaces")]
    InvalidName,

    /// Candidate name is bound to a different live session
    #[error("name '{0}' is already taken")]
    NameTaken(String),

    /// The operation requires the session to have a name
    #[error("set your name first")]
    NameRequired,

    /// Room name is empty or all-whitespace
    #[error("room name must not be empty")]
    InvalidRoom,

    /// No live session owns the target name
    #[error("no user named '{0}'")]
    UnknownUser(String),
}

/// Malformed command arity
///
/// Carries the usage string for the command the client got wrong.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Usage: {0}")]
pub struct UsageError(pub &'static str);
