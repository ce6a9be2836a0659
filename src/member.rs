//! Member struct definition
//!
//! Represents one connected participant: identity plus the outbound
//! channel drained by the connection's write task.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::SendError;
use crate::message::{Envelope, Presence, PresenceData, UserSummary};
use crate::types::{ConnectionId, RoomId, UserId};

/// Outbound frame channel of a member
pub type FrameSender = mpsc::UnboundedSender<Arc<str>>;

/// Connected member information
#[derive(Debug, Clone)]
pub struct Member {
    /// Identity of the underlying connection
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub user_name: String,
    /// Room this member belongs to, fixed for its lifetime
    pub room_id: RoomId,
    /// Relay → client frame channel
    sender: FrameSender,
}

impl Member {
    pub fn new(
        connection_id: ConnectionId,
        user_id: UserId,
        user_name: String,
        room_id: RoomId,
        sender: FrameSender,
    ) -> Self {
        Self {
            connection_id,
            user_id,
            user_name,
            room_id,
            sender,
        }
    }

    /// Whether the connection still accepts frames
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Queue a frame for this member
    ///
    /// Never waits: frames queue up behind a slow connection.
    pub fn send(&self, frame: Arc<str>) -> Result<(), SendError> {
        self.sender
            .send(frame)
            .map_err(|_| SendError::ChannelClosed)
    }

    /// Snapshot entry for `room_state`
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            user_id: self.user_id.clone(),
            user_name: self.user_name.clone(),
        }
    }

    /// Presence envelope about this member
    pub fn presence(&self, data: PresenceData) -> Envelope {
        Presence::new(
            self.room_id.clone(),
            self.user_id.clone(),
            self.user_name.clone(),
            data,
        )
        .into()
    }
}
