//! Room registry
//!
//! Owns every room and its member set. All membership mutation and
//! broadcast fan-out goes through here, under a single lock, so every member
//! of a room observes joins, leaves and relayed frames in the same order.
//!
//! A room exists exactly while it has members: it is created by the first
//! `join` and removed by the `leave` that empties it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::AppError;
use crate::member::Member;
use crate::message::{Envelope, PresenceData, UserSummary};
use crate::room::Room;
use crate::types::{RoomId, UserId};

/// Result of [`RoomRegistry::leave`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// The member was not registered (already left)
    NotMember,
    /// The member was the last one; the room is gone
    RoomClosed,
    /// The member left; this many members remain
    Remaining(usize),
}

/// In-memory mapping of room identifier to member set
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: Mutex<HashMap<RoomId, Room>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `member` into its room, creating the room if absent
    ///
    /// Under the same lock, the other members are sent a `joined` notice and
    /// the new member is queued its `room_state` snapshot, so the snapshot is
    /// always the first frame it receives. Returns how many members were
    /// notified.
    pub async fn join(&self, member: Member) -> Result<usize, AppError> {
        let joined = member.presence(PresenceData::Joined).to_frame()?;

        let mut rooms = self.rooms.lock().await;
        let room = rooms.entry(member.room_id.clone()).or_insert_with(|| {
            debug!("Room {} created", member.room_id);
            Room::new(member.room_id.clone())
        });
        room.add(member.clone());

        let notified = fan_out(room, &joined, &member.user_id);
        let users = room.users();
        member.send(member.presence(PresenceData::RoomState { users }).to_frame()?)?;

        debug!("Total rooms: {}", rooms.len());
        Ok(notified)
    }

    /// Remove `member` from its room, deleting the room once empty
    ///
    /// Safe to call repeatedly; later calls report [`Departure::NotMember`].
    pub async fn leave(&self, member: &Member) -> Departure {
        let mut rooms = self.rooms.lock().await;
        let Some(room) = rooms.get_mut(&member.room_id) else {
            return Departure::NotMember;
        };

        if room.remove(member.connection_id).is_none() {
            return Departure::NotMember;
        }

        if room.is_empty() {
            rooms.remove(&member.room_id);
            debug!("Room {} deleted (empty)", member.room_id);
            Departure::RoomClosed
        } else {
            Departure::Remaining(room.len())
        }
    }

    /// Deliver `envelope` to every open member of `room_id` except `exclude`
    ///
    /// Returns how many members the frame was queued to. A member whose send
    /// fails is skipped and stays registered until its own connection leaves.
    pub async fn broadcast(
        &self,
        room_id: &RoomId,
        envelope: &Envelope,
        exclude: &UserId,
    ) -> Result<usize, AppError> {
        let frame = envelope.to_frame()?;
        Ok(self.broadcast_frame(room_id, frame, exclude).await)
    }

    /// Like [`broadcast`](Self::broadcast), for an already serialized frame
    pub async fn broadcast_frame(&self, room_id: &RoomId, frame: Arc<str>, exclude: &UserId) -> usize {
        let rooms = self.rooms.lock().await;
        rooms
            .get(room_id)
            .map_or(0, |room| fan_out(room, &frame, exclude))
    }

    /// Current membership of `room_id` (empty if the room does not exist)
    pub async fn snapshot(&self, room_id: &RoomId) -> Vec<UserSummary> {
        let rooms = self.rooms.lock().await;
        rooms.get(room_id).map(Room::users).unwrap_or_default()
    }

    /// Number of live rooms
    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }

    /// Number of members in `room_id`
    pub async fn member_count(&self, room_id: &RoomId) -> usize {
        let rooms = self.rooms.lock().await;
        rooms.get(room_id).map_or(0, Room::len)
    }

    pub async fn contains_room(&self, room_id: &RoomId) -> bool {
        self.rooms.lock().await.contains_key(room_id)
    }
}

/// Queue `frame` to every open member of `room` except `exclude`
fn fan_out(room: &Room, frame: &Arc<str>, exclude: &UserId) -> usize {
    let mut delivered = 0;
    for member in room.recipients(exclude) {
        if !member.is_open() {
            debug!("Skipping closed member {} in room {}", member.user_id, room.id);
            continue;
        }
        match member.send(frame.clone()) {
            Ok(()) => delivered += 1,
            Err(e) => debug!("Send to {} in room {} failed: {}", member.user_id, room.id, e),
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::{json, Value};
    use tokio::sync::mpsc;

    use crate::types::ConnectionId;

    type Frames = mpsc::UnboundedReceiver<Arc<str>>;

    fn member(room: &str, user: &str) -> (Member, Frames) {
        let (tx, rx) = mpsc::unbounded_channel();
        let member = Member::new(
            ConnectionId::new(),
            UserId::from(user),
            format!("name-{}", user),
            RoomId::from(room),
            tx,
        );
        (member, rx)
    }

    fn chat() -> Envelope {
        match json!({ "type": "chat", "data": { "text": "hi" } }) {
            Value::Object(object) => Envelope::Application(object),
            _ => unreachable!(),
        }
    }

    fn next_json(rx: &mut Frames) -> Value {
        serde_json::from_str(&rx.try_recv().unwrap()).unwrap()
    }

    /// Discard everything queued so far
    fn drain(rx: &mut Frames) {
        while rx.try_recv().is_ok() {}
    }

    fn sorted_ids(users: Vec<UserSummary>) -> Vec<String> {
        let mut ids: Vec<String> = users.into_iter().map(|u| u.user_id.0).collect();
        ids.sort();
        ids
    }

    fn sorted_state_ids(state: &Value) -> Vec<String> {
        let mut ids: Vec<String> = state["data"]["users"]
            .as_array()
            .unwrap()
            .iter()
            .map(|u| u["userId"].as_str().unwrap().to_string())
            .collect();
        ids.sort();
        ids
    }

    #[tokio::test]
    async fn test_join_creates_room_lazily() {
        let registry = RoomRegistry::new();
        let room = RoomId::from("r1");
        assert!(!registry.contains_room(&room).await);

        let (a, _rx) = member("r1", "a");
        assert_eq!(registry.join(a).await.unwrap(), 0);

        assert!(registry.contains_room(&room).await);
        assert_eq!(registry.member_count(&room).await, 1);
        assert_eq!(registry.room_count().await, 1);
    }

    #[tokio::test]
    async fn test_join_notifies_others_and_sends_room_state() {
        let registry = RoomRegistry::new();
        let (a, mut ra) = member("r1", "a");
        let (b, mut rb) = member("r1", "b");

        registry.join(a).await.unwrap();
        let state = next_json(&mut ra);
        assert_eq!(state["data"]["action"], "room_state");
        assert_eq!(sorted_state_ids(&state), vec!["a"]);

        assert_eq!(registry.join(b).await.unwrap(), 1);
        let joined = next_json(&mut ra);
        assert_eq!(joined["data"]["action"], "joined");
        assert_eq!(joined["userId"], "b");

        // The joiner gets only its snapshot, never its own join notice
        let state = next_json(&mut rb);
        assert_eq!(state["data"]["action"], "room_state");
        assert_eq!(sorted_state_ids(&state), vec!["a", "b"]);
        assert!(rb.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_room_state_precedes_concurrent_traffic() {
        let registry = Arc::new(RoomRegistry::new());
        let (a, _ra) = member("r1", "a");
        registry.join(a.clone()).await.unwrap();

        let frame = chat().to_frame().unwrap();
        let sender = {
            let registry = registry.clone();
            let a = a.clone();
            tokio::spawn(async move {
                for _ in 0..2000 {
                    registry.broadcast_frame(&a.room_id, frame.clone(), &a.user_id).await;
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut receivers = Vec::new();
        for i in 0..20 {
            let (m, rx) = member("r1", &format!("u{}", i));
            registry.join(m).await.unwrap();
            receivers.push(rx);
            tokio::task::yield_now().await;
        }
        sender.await.unwrap();

        for mut rx in receivers {
            assert_eq!(next_json(&mut rx)["data"]["action"], "room_state");
        }
    }

    #[tokio::test]
    async fn test_snapshot_tracks_joins_and_leaves() {
        let registry = RoomRegistry::new();
        let room = RoomId::from("r1");
        let (a, _ra) = member("r1", "a");
        let (b, _rb) = member("r1", "b");
        let (c, _rc) = member("r1", "c");

        registry.join(a.clone()).await.unwrap();
        registry.join(b.clone()).await.unwrap();
        registry.join(c.clone()).await.unwrap();
        assert_eq!(sorted_ids(registry.snapshot(&room).await), vec!["a", "b", "c"]);

        registry.leave(&b).await;
        assert_eq!(sorted_ids(registry.snapshot(&room).await), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_snapshot_of_unknown_room_is_empty() {
        let registry = RoomRegistry::new();
        assert!(registry.snapshot(&RoomId::from("nowhere")).await.is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_excludes_sender() {
        let registry = RoomRegistry::new();
        let (a, mut ra) = member("r1", "a");
        let (b, mut rb) = member("r1", "b");
        let (c, mut rc) = member("r1", "c");
        registry.join(a).await.unwrap();
        registry.join(b.clone()).await.unwrap();
        registry.join(c).await.unwrap();
        drain(&mut ra);
        drain(&mut rb);
        drain(&mut rc);

        let delivered = registry
            .broadcast(&RoomId::from("r1"), &chat(), &b.user_id)
            .await
            .unwrap();
        assert_eq!(delivered, 2);

        let expected = chat().to_frame().unwrap();
        assert_eq!(ra.try_recv().unwrap(), expected);
        assert_eq!(rc.try_recv().unwrap(), expected);
        assert!(rb.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_frame_is_sent_verbatim() {
        let registry = RoomRegistry::new();
        let (a, mut ra) = member("r1", "a");
        let (b, _rb) = member("r1", "b");
        registry.join(a).await.unwrap();
        registry.join(b.clone()).await.unwrap();
        drain(&mut ra);

        let raw: Arc<str> = Arc::from(r#"{"type":"chat", "z":1, "a":2}"#);
        registry.broadcast_frame(&b.room_id, raw.clone(), &b.user_id).await;
        assert_eq!(ra.try_recv().unwrap(), raw);
    }

    #[tokio::test]
    async fn test_broadcast_does_not_leak_across_rooms() {
        let registry = RoomRegistry::new();
        let (a, mut ra) = member("r1", "a");
        let (b, _rb) = member("r2", "b");
        registry.join(a).await.unwrap();
        registry.join(b.clone()).await.unwrap();
        drain(&mut ra);

        registry
            .broadcast(&RoomId::from("r2"), &chat(), &b.user_id)
            .await
            .unwrap();
        assert!(ra.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_skips_closed_members() {
        let registry = RoomRegistry::new();
        let room = RoomId::from("r1");
        let (a, mut ra) = member("r1", "a");
        let (b, rb) = member("r1", "b");
        registry.join(a).await.unwrap();
        registry.join(b).await.unwrap();
        drop(rb);
        drain(&mut ra);

        let delivered = registry
            .broadcast(&room, &chat(), &UserId::from("nobody"))
            .await
            .unwrap();
        assert_eq!(delivered, 1);
        assert!(ra.try_recv().is_ok());

        // Closed members are not evicted by broadcast
        assert_eq!(registry.member_count(&room).await, 2);
    }

    #[tokio::test]
    async fn test_broadcast_to_missing_room_is_noop() {
        let registry = RoomRegistry::new();
        let delivered = registry
            .broadcast(&RoomId::from("ghost"), &chat(), &UserId::from("a"))
            .await
            .unwrap();
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_last_leave_prunes_room() {
        let registry = RoomRegistry::new();
        let room = RoomId::from("r1");
        let (a, _ra) = member("r1", "a");
        let (b, _rb) = member("r1", "b");
        registry.join(a.clone()).await.unwrap();
        registry.join(b.clone()).await.unwrap();

        assert_eq!(registry.leave(&a).await, Departure::Remaining(1));
        assert_eq!(registry.leave(&b).await, Departure::RoomClosed);
        assert!(!registry.contains_room(&room).await);
        assert_eq!(registry.room_count().await, 0);
        assert!(registry.snapshot(&room).await.is_empty());

        // Recreated fresh, without the old members
        let (c, mut rc) = member("r1", "c");
        registry.join(c).await.unwrap();
        assert_eq!(sorted_ids(registry.snapshot(&room).await), vec!["c"]);
        assert_eq!(sorted_state_ids(&next_json(&mut rc)), vec!["c"]);
    }

    #[tokio::test]
    async fn test_leave_is_idempotent() {
        let registry = RoomRegistry::new();
        let (a, _ra) = member("r1", "a");
        let (b, _rb) = member("r1", "b");
        registry.join(a.clone()).await.unwrap();
        registry.join(b.clone()).await.unwrap();

        assert_eq!(registry.leave(&b).await, Departure::Remaining(1));
        assert_eq!(registry.leave(&b).await, Departure::NotMember);
        assert_eq!(registry.member_count(&RoomId::from("r1")).await, 1);

        registry.leave(&a).await;
        assert_eq!(registry.leave(&a).await, Departure::NotMember);
    }

    #[tokio::test]
    async fn test_concurrent_joins() {
        let registry = Arc::new(RoomRegistry::new());
        let mut handles = Vec::new();
        let mut receivers = Vec::new();

        for i in 0..32 {
            let (m, rx) = member("busy", &format!("u{}", i));
            receivers.push(rx);
            let registry = registry.clone();
            handles.push(tokio::spawn(async move { registry.join(m).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(registry.member_count(&RoomId::from("busy")).await, 32);
        for mut rx in receivers {
            assert_eq!(next_json(&mut rx)["data"]["action"], "room_state");
        }
    }
}
