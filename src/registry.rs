//! Session registry
//!
//! The process-wide directory of live sessions, name bindings, and room
//! membership. All maps live behind one mutex, so every operation is
//! linearizable with respect to every other; critical sections are bounded
//! and CPU-only (delivery uses non-blocking enqueue), so the lock is never
//! held across I/O.
//!
//! Invariants maintained after every operation:
//! - a bound name maps to exactly one live session;
//! - `session ∈ room.members ⇔ room ∈ session.rooms`;
//! - every tracked room has at least one member;
//! - unnamed sessions are invisible to name lookup and receive no traffic.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::RegistryError;
use crate::room::Room;
use crate::session::{Outbound, Session};
use crate::types::{ClientId, PUBLIC_ROOM};

/// Result of a successful `join_room`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The session was added to the room
    Joined,
    /// The session was already a member; nothing changed
    AlreadyMember,
}

/// Shared directory of sessions, names, and rooms
///
/// Cheap to share: connection pipelines hold it behind an `Arc` and call in
/// concurrently from their inbound tasks.
#[derive(Debug, Default)]
pub struct Registry {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    /// All live sessions: ClientId -> Session
    sessions: HashMap<ClientId, Session>,
    /// Name binding: display name -> ClientId
    names: HashMap<String, ClientId>,
    /// All tracked rooms: room name -> Room
    rooms: HashMap<String, Room>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // No registry operation can panic while holding the lock
        self.inner.lock().expect("registry mutex poisoned")
    }

    /// Add a session in unnamed state and auto-join it to `"public"`.
    ///
    /// Always succeeds; the session stays invisible to other users until it
    /// acquires a name.
    pub fn register(&self, id: ClientId, outbound: mpsc::Sender<Outbound>) {
        let mut inner = self.lock();
        inner.sessions.insert(id, Session::new(id, outbound));
        inner.join(id, PUBLIC_ROOM);

        info!("Client {} registered", id);
        debug!(
            "Total sessions: {}, total rooms: {}",
            inner.sessions.len(),
            inner.rooms.len()
        );
    }

    /// Bind a display name to the session, releasing its previous binding.
    ///
    /// The candidate is outer-trimmed. Room membership is not affected by a
    /// rename, and re-claiming one's own current name succeeds.
    pub fn set_name(&self, id: ClientId, candidate: &str) -> Result<(), RegistryError> {
        let candidate = candidate.trim();
        if candidate.is_empty() || candidate.contains(char::is_whitespace) {
            return Err(RegistryError::InvalidName);
        }

        let mut inner = self.lock();
        if let Some(owner) = inner.names.get(candidate) {
            if *owner != id {
                return Err(RegistryError::NameTaken(candidate.to_string()));
            }
        }

        let Some(session) = inner.sessions.get_mut(&id) else {
            // Connection already torn down; nothing to bind
            return Ok(());
        };
        let previous = session.take_name();
        session.set_name(candidate.to_string());

        if let Some(previous) = previous {
            inner.names.remove(&previous);
        }
        inner.names.insert(candidate.to_string(), id);

        info!("Client {} is now named '{}'", id, candidate);
        Ok(())
    }

    /// Add the session to a room, creating the room if absent.
    ///
    /// Requires the session to be named. Re-joining is reported as
    /// `AlreadyMember` rather than an error.
    pub fn join_room(&self, id: ClientId, room: &str) -> Result<JoinOutcome, RegistryError> {
        let room = room.trim();
        if room.is_empty() {
            return Err(RegistryError::InvalidRoom);
        }

        let mut inner = self.lock();
        let Some(session) = inner.sessions.get(&id) else {
            return Err(RegistryError::NameRequired);
        };
        if !session.has_name() {
            return Err(RegistryError::NameRequired);
        }
        if session.is_member(room) {
            return Ok(JoinOutcome::AlreadyMember);
        }

        inner.join(id, room);
        info!("Client {} joined room '{}'", id, room);
        Ok(JoinOutcome::Joined)
    }

    /// Remove the session from a room; a no-op if it is not a member.
    ///
    /// Deletes the room when its membership drops to zero.
    pub fn leave_room(&self, id: ClientId, room: &str) {
        let room = room.trim();
        let mut inner = self.lock();
        if inner.leave(id, room) {
            info!("Client {} left room '{}'", id, room);
        }
    }

    /// Broadcast a chat line to every member of the sender's rooms.
    ///
    /// The line is formatted as `[<sender>] >> <text>` and delivered at most
    /// once per recipient even when room memberships overlap. The sender
    /// never receives its own broadcast, unnamed senders have no audience,
    /// and unnamed recipients are skipped. A full recipient queue drops the
    /// line for that recipient only.
    pub fn broadcast(&self, sender: ClientId, text: &str) {
        let inner = self.lock();
        let Some(session) = inner.sessions.get(&sender) else {
            return;
        };
        let Some(name) = session.name() else {
            return;
        };
        let line = format!("[{}] >> {}", name, text);

        let mut recipients: HashSet<ClientId> = HashSet::new();
        for room in session.rooms() {
            if let Some(room) = inner.rooms.get(room) {
                recipients.extend(room.members());
            }
        }
        recipients.remove(&sender);

        for id in recipients {
            let Some(target) = inner.sessions.get(&id) else {
                continue;
            };
            // A session mid-registration cannot receive broadcasts
            if !target.has_name() {
                continue;
            }
            if !target.enqueue(line.clone()) {
                warn!("Client {} outbound queue is full, dropping broadcast", id);
            }
        }
    }

    /// Deliver a private line to the session owning `target`.
    ///
    /// Fails when the sender is unnamed or no live session owns the target
    /// name. A full target queue is a per-delivery drop, not a failure.
    pub fn send_private(
        &self,
        sender: ClientId,
        target: &str,
        text: &str,
    ) -> Result<(), RegistryError> {
        let inner = self.lock();
        let Some(name) = inner.sessions.get(&sender).and_then(Session::name) else {
            return Err(RegistryError::NameRequired);
        };
        let Some(target_id) = inner.names.get(target) else {
            return Err(RegistryError::UnknownUser(target.to_string()));
        };
        let Some(session) = inner.sessions.get(target_id) else {
            return Err(RegistryError::UnknownUser(target.to_string()));
        };

        let line = format!("[PRIVATE from {}] >> {}", name, text);
        if !session.enqueue(line) {
            warn!(
                "Client {} outbound queue is full, dropping private message",
                target_id
            );
        }
        Ok(())
    }

    /// Snapshot of the session's room memberships, in join order.
    pub fn rooms_of(&self, id: ClientId) -> Vec<String> {
        self.lock()
            .sessions
            .get(&id)
            .map(|s| s.rooms().to_vec())
            .unwrap_or_default()
    }

    /// Remove the session entirely: leave every room (deleting emptied
    /// rooms) and release its name binding. Idempotent.
    pub fn deregister(&self, id: ClientId) {
        let mut inner = self.lock();
        let Some(session) = inner.sessions.get(&id) else {
            return;
        };
        let rooms = session.rooms().to_vec();
        for room in &rooms {
            inner.leave(id, room);
        }
        if let Some(session) = inner.sessions.remove(&id) {
            if let Some(name) = session.name() {
                inner.names.remove(name);
            }
        }

        info!("Client {} deregistered", id);
        debug!(
            "Total sessions: {}, total rooms: {}",
            inner.sessions.len(),
            inner.rooms.len()
        );
    }
}

impl Inner {
    /// Add both sides of the membership relation, creating the room lazily.
    ///
    /// Used by `register` for the automatic `"public"` join (which bypasses
    /// the naming requirement) and by `join_room`.
    fn join(&mut self, id: ClientId, room: &str) {
        self.rooms
            .entry(room.to_string())
            .or_insert_with(|| Room::new(room))
            .insert(id);
        if let Some(session) = self.sessions.get_mut(&id) {
            session.joined(room.to_string());
        }
    }

    /// Remove both sides of the membership relation.
    ///
    /// Returns whether the session was a member. Deletes the room the
    /// instant it becomes empty.
    fn leave(&mut self, id: ClientId, room: &str) -> bool {
        let Some(session) = self.sessions.get_mut(&id) else {
            return false;
        };
        if !session.left(room) {
            return false;
        }
        if let Some(members) = self.rooms.get_mut(room) {
            members.remove(id);
            if members.is_empty() {
                self.rooms.remove(room);
                debug!("Room '{}' deleted (empty)", room);
            }
        }
        true
    }
}

#[cfg(test)]
impl Registry {
    fn has_room(&self, room: &str) -> bool {
        self.lock().rooms.contains_key(room)
    }

    fn name_owner(&self, name: &str) -> Option<ClientId> {
        self.lock().names.get(name).copied()
    }

    fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Full scan of the registry invariants; panics on any violation.
    fn assert_invariants(&self) {
        let inner = self.lock();
        for (name, room) in &inner.rooms {
            assert!(!room.is_empty(), "tracked room '{}' is empty", name);
            for member in room.members() {
                let session = inner
                    .sessions
                    .get(&member)
                    .unwrap_or_else(|| panic!("room '{}' holds dead session {}", name, member));
                assert!(
                    session.is_member(name),
                    "room '{}' lists {} but the session does not list the room",
                    name,
                    member
                );
            }
        }
        for (id, session) in &inner.sessions {
            for room in session.rooms() {
                let room = inner
                    .rooms
                    .get(room)
                    .unwrap_or_else(|| panic!("session {} lists untracked room '{}'", id, room));
                assert!(room.contains(*id));
            }
            if let Some(name) = session.name() {
                assert_eq!(inner.names.get(name), Some(id));
            }
        }
        for (name, id) in &inner.names {
            let session = inner.sessions.get(id).expect("name bound to dead session");
            assert_eq!(session.name(), Some(name.as_str()));
        }
    }
}
