//! Room struct definition
//!
//! Represents the member set of one folder. Only the registry holds rooms.

use std::collections::HashMap;

use crate::member::Member;
use crate::message::UserSummary;
use crate::types::{ConnectionId, RoomId, UserId};

/// Presence room
///
/// Members are keyed by connection, so the same user joining twice from two
/// tabs counts as two members.
#[derive(Debug)]
pub struct Room {
    /// Folder identifier
    pub id: RoomId,
    members: HashMap<ConnectionId, Member>,
}

impl Room {
    /// Create an empty room
    pub fn new(id: RoomId) -> Self {
        Self {
            id,
            members: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Add a member, replacing any previous entry for the same connection
    pub fn add(&mut self, member: Member) {
        self.members.insert(member.connection_id, member);
    }

    /// Remove a member
    ///
    /// Returns the removed member, or None if it was not in the room.
    pub fn remove(&mut self, connection_id: ConnectionId) -> Option<Member> {
        self.members.remove(&connection_id)
    }

    /// Current membership as snapshot entries (arbitrary order)
    pub fn users(&self) -> Vec<UserSummary> {
        self.members.values().map(Member::summary).collect()
    }

    /// Members that should receive a broadcast excluding `exclude`
    pub fn recipients<'a>(&'a self, exclude: &'a UserId) -> impl Iterator<Item = &'a Member> + 'a {
        self.members.values().filter(move |m| &m.user_id != exclude)
    }
}
