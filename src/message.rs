//! Message envelope definitions
//!
//! JSON envelopes exchanged over text frames. Presence envelopes are
//! modelled with Serde's tagged enums. Frames from clients are parsed only
//! to be validated and classified; the original text is what gets relayed.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AppError;
use crate::types::{RoomId, UserId};

/// Discriminator value of control-plane envelopes
pub const PRESENCE_TYPE: &str = "presence";

/// Marker serialized as `"type": "presence"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceType {
    #[default]
    Presence,
}

/// One entry of a `room_state` snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub user_id: UserId,
    pub user_name: String,
}

/// Payload of a presence envelope, tagged by `action`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PresenceData {
    /// The envelope's user joined the room
    Joined,
    /// The envelope's user left the room
    Left,
    /// Full membership of the room, sent to a new joiner
    RoomState { users: Vec<UserSummary> },
}

/// Presence envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    #[serde(rename = "type")]
    kind: PresenceType,
    pub folder_id: RoomId,
    pub user_id: UserId,
    pub user_name: String,
    pub data: PresenceData,
}

impl Presence {
    pub fn new(folder_id: RoomId, user_id: UserId, user_name: String, data: PresenceData) -> Self {
        Self {
            kind: PresenceType::Presence,
            folder_id,
            user_id,
            user_name,
            data,
        }
    }
}

/// Unit of exchange between relay and clients
///
/// Serializes untagged: presence envelopes carry their own `type` field.
/// Frames received from clients are relayed through [`Inbound`], never
/// re-serialized from this view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Envelope {
    /// Presence notification (joined / left / room_state)
    Presence(Presence),
    /// Application-defined envelope, forwarded opaquely
    Application(Map<String, Value>),
}

impl Envelope {
    /// Parse a text frame into its structured view
    ///
    /// The payload must be a JSON object. Objects typed `presence` that
    /// match the presence shape become [`Envelope::Presence`]; anything else
    /// is kept as an object.
    pub fn parse(text: &str) -> Result<Self, AppError> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(object) = value else {
            return Err(AppError::InvalidEnvelope(format!(
                "expected a JSON object, got {}",
                json_kind(&value)
            )));
        };

        if object.get("type").and_then(Value::as_str) == Some(PRESENCE_TYPE) {
            if let Ok(presence) = serde_json::from_value(Value::Object(object.clone())) {
                return Ok(Envelope::Presence(presence));
            }
        }

        Ok(Envelope::Application(object))
    }

    /// Discriminator used for logging
    pub fn kind(&self) -> &str {
        match self {
            Envelope::Presence(_) => PRESENCE_TYPE,
            Envelope::Application(object) => object
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("unknown"),
        }
    }

    /// Serialize once into a frame shareable between recipients
    pub fn to_frame(&self) -> Result<Arc<str>, AppError> {
        Ok(Arc::from(serde_json::to_string(self)?))
    }
}

/// Text frame received from a client
///
/// Holds the parsed envelope for inspection and the original text, which is
/// what gets relayed: unknown fields and key order survive untouched.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub envelope: Envelope,
    frame: Arc<str>,
}

impl Inbound {
    pub fn parse(text: &str) -> Result<Self, AppError> {
        Ok(Self {
            envelope: Envelope::parse(text)?,
            frame: Arc::from(text),
        })
    }

    pub fn kind(&self) -> &str {
        self.envelope.kind()
    }

    /// The frame exactly as the client sent it
    pub fn frame(&self) -> Arc<str> {
        self.frame.clone()
    }
}

impl From<Presence> for Envelope {
    fn from(presence: Presence) -> Self {
        Envelope::Presence(presence)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
