//! Wire messages for the save/push protocol.
//!
//! The protocol is JSON end-to-end. Responses are shape-discriminated the
//! way the backend emits them: an ack carries `status` + `hash`, a conflict
//! carries the authoritative `value` + `hash`, and a rejection carries a
//! `reason`. There is no envelope tag to dispatch on.

use notesync_core::NotebookState;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hash-and-value payload of a save request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveData {
    /// Hash of the version the client believes the server currently holds.
    /// `None` on the first save of a fresh document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_saved_hash: Option<String>,
    /// The full notebook value to store
    pub value: NotebookState,
}

/// A request to persist a notebook version, tagged `type: "save"` on the
/// wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename = "save")]
pub struct SaveRequest {
    /// Document id
    pub id: String,
    /// Client-generated id correlating the one-shot reply to this attempt
    pub attempt_id: Uuid,
    /// Bearer token, when the backend requires one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    /// Optimistic-concurrency payload
    pub data: SaveData,
}

impl SaveRequest {
    /// Create a save request with a fresh attempt id.
    #[must_use]
    pub fn new(
        doc_id: impl Into<String>,
        value: NotebookState,
        last_saved_hash: Option<String>,
    ) -> Self {
        Self {
            id: doc_id.into(),
            attempt_id: Uuid::new_v4(),
            auth_token: None,
            data: SaveData {
                last_saved_hash,
                value,
            },
        }
    }

    /// Attach a bearer token.
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Serialize to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>, MessageError> {
        serde_json::to_vec(self).map_err(|e| MessageError::Serialize(e.to_string()))
    }

    /// Deserialize from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns error if deserialization fails.
    pub fn from_json(bytes: &[u8]) -> Result<Self, MessageError> {
        serde_json::from_slice(bytes).map_err(|e| MessageError::Deserialize(e.to_string()))
    }
}

/// Status discriminant carried by successful save acks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveStatus {
    /// The save was applied against the submitted hash
    Success,
}

/// Reply to a save attempt, shape-discriminated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SaveResponse {
    /// The save was applied; `hash` names the stored version.
    Ack {
        /// Always `success`
        status: SaveStatus,
        /// Hash of the version the server now holds
        hash: String,
    },
    /// The submitted hash was stale; the authoritative value comes back
    /// and the client is expected to merge and resubmit.
    Conflict {
        /// The server's current value
        value: NotebookState,
        /// Hash of that value
        hash: String,
    },
    /// The save was rejected outright.
    Rejected {
        /// Failure reason
        reason: String,
    },
}

impl SaveResponse {
    /// Build a success ack.
    #[must_use]
    pub fn ack(hash: impl Into<String>) -> Self {
        Self::Ack {
            status: SaveStatus::Success,
            hash: hash.into(),
        }
    }

    /// Build a stale-hash conflict reply.
    #[must_use]
    pub fn conflict(value: NotebookState, hash: impl Into<String>) -> Self {
        Self::Conflict {
            value,
            hash: hash.into(),
        }
    }

    /// Build a rejection reply.
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// Serialize to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>, MessageError> {
        serde_json::to_vec(self).map_err(|e| MessageError::Serialize(e.to_string()))
    }

    /// Deserialize from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns error if deserialization fails.
    pub fn from_json(bytes: &[u8]) -> Result<Self, MessageError> {
        serde_json::from_slice(bytes).map_err(|e| MessageError::Deserialize(e.to_string()))
    }
}

/// Unsolicited notification that another party saved the document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushUpdate {
    /// The value the server now holds
    pub value: NotebookState,
    /// Hash of that value
    pub hash: String,
}

impl PushUpdate {
    /// Serialize to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>, MessageError> {
        serde_json::to_vec(self).map_err(|e| MessageError::Serialize(e.to_string()))
    }

    /// Deserialize from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns error if deserialization fails.
    pub fn from_json(bytes: &[u8]) -> Result<Self, MessageError> {
        serde_json::from_slice(bytes).map_err(|e| MessageError::Deserialize(e.to_string()))
    }
}

/// Body of the HTTP load endpoint.
///
/// Both fields are absent when no document exists yet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadResponse {
    /// The stored notebook, if one exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<NotebookState>,
    /// Hash of the stored version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl LoadResponse {
    /// Whether the response carries a stored document.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.result.is_none()
    }
}

/// Errors for message serialization/deserialization.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MessageError {
    /// Serialization failed
    #[error("serialization failed: {0}")]
    Serialize(String),
    /// Deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialize(String),
}
