//! Multi-Room TCP Chat Relay Library
//!
//! A line-oriented chat relay built on tokio: clients connect over TCP,
//! pick a display name, broadcast to the rooms they joined, and exchange
//! private messages.
//!
//! # Features
//! - Display-name binding with uniqueness enforcement
//! - Named rooms, created lazily and removed when empty
//! - Room broadcasts with overlap dedup and private messages
//! - Bounded per-session outbound queues (slow consumers lose messages
//!   instead of stalling senders)
//! - Clean per-connection shutdown via a finished flag and queue sentinel
//!
//! # Architecture
//! Two cooperating subsystems:
//! - `Registry` is the process-wide directory of sessions, names, and
//!   rooms; one coarse lock makes every operation atomic with respect to
//!   every other.
//! - Each connection runs a pipeline of two tasks: inbound
//!   (read/parse/dispatch into the registry) and outbound (drain the
//!   session's queue to the socket), synchronized by a startup rendezvous.
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use chat_relay::{handle_connection, Registry};
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = Arc::new(Registry::new());
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         tokio::spawn(handle_connection(stream, Arc::clone(&registry)));
//!     }
//! }
//! ```

pub mod command;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod room;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use command::Command;
pub use error::{AppError, RegistryError, UsageError};
pub use pipeline::handle_connection;
pub use registry::{JoinOutcome, Registry};
pub use room::Room;
pub use session::{Outbound, Session};
pub use types::{ClientId, MAX_LINE_LENGTH, OUTBOUND_QUEUE_CAPACITY, PUBLIC_ROOM};
