//! Session struct definition
//!
//! Represents one connected client as tracked by the registry: its identity,
//! display name, room memberships, and the producer side of its outbound
//! queue.

use tokio::sync::mpsc;

use crate::types::ClientId;

/// An entry in a session's outbound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A text line to write to the client
    Line(String),
    /// Wake-up sentinel enqueued during shutdown; never written to the socket
    Shutdown,
}

/// Connected session state
///
/// Owned by the registry and mutated only under the registry lock. The
/// outbound sender is the one piece handed out to other sessions' registry
/// calls: enqueueing is non-blocking and bounded.
#[derive(Debug)]
pub struct Session {
    /// Connection-derived identity (peer address)
    id: ClientId,
    /// Display name (None until the first successful naming)
    name: Option<String>,
    /// Rooms this session belongs to, in join order
    rooms: Vec<String>,
    /// Producer side of the session's bounded outbound queue
    outbound: mpsc::Sender<Outbound>,
}

impl Session {
    /// Create a new unnamed session with the given outbound sender
    pub fn new(id: ClientId, outbound: mpsc::Sender<Outbound>) -> Self {
        Self {
            id,
            name: None,
            rooms: Vec::new(),
            outbound,
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Check whether this session has completed naming
    pub fn has_name(&self) -> bool {
        self.name.is_some()
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = Some(name);
    }

    /// Release the current name, returning it for unbinding
    pub(crate) fn take_name(&mut self) -> Option<String> {
        self.name.take()
    }

    /// Rooms this session belongs to, in join order
    pub fn rooms(&self) -> &[String] {
        &self.rooms
    }

    pub fn is_member(&self, room: &str) -> bool {
        self.rooms.iter().any(|r| r == room)
    }

    /// Record membership in a room (no-op if already recorded)
    pub(crate) fn joined(&mut self, room: String) {
        if !self.is_member(&room) {
            self.rooms.push(room);
        }
    }

    /// Drop membership in a room; returns whether the session was a member
    pub(crate) fn left(&mut self, room: &str) -> bool {
        let before = self.rooms.len();
        self.rooms.retain(|r| r != room);
        self.rooms.len() != before
    }

    /// Attempt to enqueue a line onto this session's outbound queue.
    ///
    /// Non-blocking: returns false when the queue is full (or its consumer
    /// is already gone), in which case the line is dropped.
    pub fn enqueue(&self, line: String) -> bool {
        self.outbound.try_send(Outbound::Line(line)).is_ok()
    }
}
