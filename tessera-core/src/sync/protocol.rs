//! Wire Protocol
//!
//! Request and response bodies for the operations the HTTP collaborator
//! exposes, and the codecs used to encode them.
//!
//! An update travels as a three-element array `[key, index, html]`, where
//! `index` is an integer for a child position or a string for an attribute
//! name. Invalidation is signalled with a distinct `Reload` variant; how it
//! maps onto the transport (the reference client expects an
//! `X-Redirect-URL` header) is up to the collaborator.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::error::Result;
use crate::reactive::{Index, Key};

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// Replacement content for one address.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "(Key, Index, String)")]
pub struct Update {
    pub key: Key,
    pub index: Index,
    pub html: String,
}

impl Update {
    pub fn new(key: Key, index: Index, html: impl Into<String>) -> Self {
        Self {
            key,
            index,
            html: html.into(),
        }
    }
}

impl From<(Key, Index, String)> for Update {
    fn from((key, index, html): (Key, Index, String)) -> Self {
        Self { key, index, html }
    }
}

impl Serialize for Update {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        (&self.key, &self.index, &self.html).serialize(serializer)
    }
}

/// Input of the sync/poll operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollRequest {
    /// The client's cursor.
    pub state: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
}

/// Successful sync body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncBody {
    /// The cursor the client should send next.
    pub state: u64,
    pub updates: Vec<Update>,
    /// Server time in epoch milliseconds.
    pub time: u64,
}

impl SyncBody {
    pub fn new(state: u64, updates: Vec<Update>) -> Self {
        Self {
            state,
            updates,
            time: now_millis(),
        }
    }
}

/// Outcome of a sync request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SyncResponse {
    Updates(SyncBody),
    /// The client must discard its page and fetch `location` again.
    Reload { location: String },
}

impl SyncResponse {
    pub fn is_reload(&self) -> bool {
        matches!(self, SyncResponse::Reload { .. })
    }

    pub fn body(&self) -> Option<&SyncBody> {
        match self {
            SyncResponse::Updates(body) => Some(body),
            SyncResponse::Reload { .. } => None,
        }
    }
}

/// Input of the mutate operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutateRequest {
    pub id: String,
    #[serde(default)]
    pub event: Value,
}

/// Outcome of a mutate request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MutateResponse {
    Ack { time: u64 },
    Reload { location: String },
}

/// Input of the diagnostic log operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRequest {
    pub log: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogAck {
    pub status: String,
}

impl LogAck {
    pub fn success() -> Self {
        Self {
            status: String::from("success"),
        }
    }
}

/// Body encodings offered to the collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Json,
    MessagePack,
}

impl Encoding {
    pub fn content_type(&self) -> &'static str {
        match self {
            Encoding::Json => "application/json",
            Encoding::MessagePack => "application/msgpack",
        }
    }
}

/// Encode a body with the given encoding.
pub fn encode<T: Serialize>(value: &T, encoding: Encoding) -> Result<Vec<u8>> {
    match encoding {
        Encoding::Json => Ok(serde_json::to_vec(value)?),
        Encoding::MessagePack => Ok(rmp_serde::to_vec_named(value)?),
    }
}
