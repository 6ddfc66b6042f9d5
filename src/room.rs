//! Room struct definition
//!
//! Represents a named group of sessions. Rooms are created lazily on first
//! join and removed by the registry the moment they become empty, so a
//! tracked room always has at least one member.

use std::collections::HashSet;

use crate::types::ClientId;

/// A named set of sessions that receive each other's broadcasts
#[derive(Debug)]
pub struct Room {
    /// Room name (case-sensitive, free-form)
    name: String,
    /// Current members, kept symmetric with each session's room list
    members: HashSet<ClientId>,
}

impl Room {
    /// Create an empty room with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: HashSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a member; returns false if it was already present
    pub fn insert(&mut self, id: ClientId) -> bool {
        self.members.insert(id)
    }

    /// Remove a member; returns whether it was present
    pub fn remove(&mut self, id: ClientId) -> bool {
        self.members.remove(&id)
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.members.contains(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Iterate over the current members
    pub fn members(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.members.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn cid(port: u16) -> ClientId {
        ClientId::new(SocketAddr::from(([127, 0, 0, 1], port)))
    }

    #[test]
    fn test_room_creation() {
        let room = Room::new("secret");

        assert_eq!(room.name(), "secret");
        assert!(room.is_empty());
        assert_eq!(room.len(), 0);
    }

    #[test]
    fn test_room_membership() {
        let mut room = Room::new("secret");
        let a = cid(4000);
        let b = cid(4001);

        assert!(room.insert(a));
        assert!(!room.insert(a));
        assert!(room.insert(b));

        assert_eq!(room.len(), 2);
        assert!(room.contains(a));
        assert!(room.contains(b));
        assert!(!room.contains(cid(4002)));
    }

    #[test]
    fn test_room_remove() {
        let mut room = Room::new("secret");
        let a = cid(4000);
        room.insert(a);

        assert!(room.remove(a));
        assert!(!room.remove(a));
        assert!(room.is_empty());
    }
}
