//! Join parameters
//!
//! Extracted from the query string of the WebSocket upgrade request:
//! `?folderId=...&userId=...&userName=...`.

use url::form_urlencoded;

use crate::error::AppError;
use crate::types::{RoomId, UserId};

/// Close reason sent when a join is rejected
pub const MISSING_PARAMETERS_REASON: &str = "Missing required parameters";

/// Validated join parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinParams {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub user_name: String,
}

impl JoinParams {
    /// Parse from a raw query string (without the leading `?`)
    ///
    /// All three parameters must be present and non-empty. The first
    /// occurrence of a repeated key wins; values are not otherwise checked.
    pub fn from_query(query: Option<&str>) -> Result<Self, AppError> {
        let query = query.unwrap_or_default();

        let mut folder_id = None;
        let mut user_id = None;
        let mut user_name = None;
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            let slot = match key.as_ref() {
                "folderId" => &mut folder_id,
                "userId" => &mut user_id,
                "userName" => &mut user_name,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }

        match (non_empty(folder_id), non_empty(user_id), non_empty(user_name)) {
            (Some(folder_id), Some(user_id), Some(user_name)) => Ok(Self {
                room_id: RoomId(folder_id),
                user_id: UserId(user_id),
                user_name,
            }),
            _ => Err(AppError::MissingParameters),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
