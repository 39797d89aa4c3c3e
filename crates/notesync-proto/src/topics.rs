//! Channel topic scheme for the save/push protocol.
//!
//! Topic structure: `notesync/v1/{tenant}/{doc_key}/{event}`
//!
//! This allows:
//! - Tenant isolation
//! - Topic sharding by a short document key
//! - One-shot reply topics scoped to a single save attempt, emulating an
//!   RPC call over the pub/sub channel

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Protocol version for the topic scheme.
pub const PROTOCOL_VERSION: &str = "v1";

/// Topic scheme configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicScheme {
    /// Tenant identifier
    pub tenant: String,
    /// Topic prefix (default: "notesync")
    pub prefix: String,
}

impl Default for TopicScheme {
    fn default() -> Self {
        Self {
            tenant: "default".to_string(),
            prefix: "notesync".to_string(),
        }
    }
}

impl TopicScheme {
    /// Create a new topic scheme with the given tenant.
    #[must_use]
    pub fn new(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            prefix: "notesync".to_string(),
        }
    }

    /// Build the base topic path.
    fn base(&self, doc_key: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.prefix, PROTOCOL_VERSION, self.tenant, doc_key
        )
    }

    /// Topic for save requests.
    #[must_use]
    pub fn save(&self, doc_key: &str) -> String {
        format!("{}/save", self.base(doc_key))
    }

    /// One-shot reply topic scoped to a single save attempt.
    #[must_use]
    pub fn save_reply(&self, doc_key: &str, attempt_id: Uuid) -> String {
        format!("{}/save-reply/{attempt_id}", self.base(doc_key))
    }

    /// Topic for unsolicited value-changed notifications.
    #[must_use]
    pub fn update(&self, doc_key: &str) -> String {
        format!("{}/update", self.base(doc_key))
    }

    /// Wildcard subscription for all events of a document.
    #[must_use]
    pub fn doc_wildcard(&self, doc_key: &str) -> String {
        format!("{}/#", self.base(doc_key))
    }

    /// Wildcard subscription for all events in the tenant.
    #[must_use]
    pub fn tenant_wildcard(&self) -> String {
        format!("{}/{}/{}/#", self.prefix, PROTOCOL_VERSION, self.tenant)
    }

    /// Parse a topic to extract components.
    ///
    /// Returns `(doc_key, event)` if the topic belongs to this scheme.
    #[must_use]
    pub fn parse(&self, topic: &str) -> Option<(String, ChannelEvent)> {
        let expected_prefix = format!("{}/{}/{}/", self.prefix, PROTOCOL_VERSION, self.tenant);
        let remainder = topic.strip_prefix(&expected_prefix)?;
        let parts: Vec<&str> = remainder.split('/').collect();

        if parts.len() < 2 {
            return None;
        }

        let doc_key = parts[0].to_string();
        let event = match &parts[1..] {
            ["save"] => ChannelEvent::Save,
            ["update"] => ChannelEvent::Update,
            ["save-reply", attempt] => {
                ChannelEvent::SaveReply(Uuid::parse_str(attempt).ok()?)
            }
            _ => return None,
        };

        Some((doc_key, event))
    }
}

/// Compute the short sharding key for a document id.
#[must_use]
pub fn doc_key(doc_id: &str) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    doc_id.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Events in the protocol, recovered from a topic path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A save request
    Save,
    /// Reply to a specific save attempt
    SaveReply(Uuid),
    /// Unsolicited value-changed notification
    Update,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_generation() {
        let scheme = TopicScheme::new("team-a");
        let key = "abc123def456";

        assert_eq!(scheme.save(key), "notesync/v1/team-a/abc123def456/save");
        assert_eq!(scheme.update(key), "notesync/v1/team-a/abc123def456/update");

        let attempt = Uuid::parse_str("00000000-0000-0000-0000-000000000001").unwrap();
        assert_eq!(
            scheme.save_reply(key, attempt),
            format!("notesync/v1/team-a/abc123def456/save-reply/{attempt}")
        );
    }

    #[test]
    fn topic_parsing() {
        let scheme = TopicScheme::new("team-a");

        let (key, event) = scheme.parse("notesync/v1/team-a/abc123/update").unwrap();
        assert_eq!(key, "abc123");
        assert_eq!(event, ChannelEvent::Update);

        let (key, event) = scheme.parse("notesync/v1/team-a/abc123/save").unwrap();
        assert_eq!(key, "abc123");
        assert_eq!(event, ChannelEvent::Save);
    }

    #[test]
    fn topic_parsing_save_reply() {
        let scheme = TopicScheme::new("team-b");
        let attempt = Uuid::new_v4();

        let topic = scheme.save_reply("xyz789", attempt);
        let (key, event) = scheme.parse(&topic).unwrap();

        assert_eq!(key, "xyz789");
        assert_eq!(event, ChannelEvent::SaveReply(attempt));
    }

    #[test]
    fn foreign_topics_rejected() {
        let scheme = TopicScheme::new("team-a");
        assert!(scheme.parse("notesync/v1/team-b/abc/update").is_none());
        assert!(scheme.parse("notesync/v1/team-a/abc").is_none());
        assert!(scheme.parse("notesync/v1/team-a/abc/save-reply/not-a-uuid").is_none());
    }

    #[test]
    fn wildcard_topics() {
        let scheme = TopicScheme::new("tenant1");

        assert_eq!(scheme.doc_wildcard("doc1"), "notesync/v1/tenant1/doc1/#");
        assert_eq!(scheme.tenant_wildcard(), "notesync/v1/tenant1/#");
    }

    #[test]
    fn doc_key_is_stable_and_short() {
        let a = doc_key("notebook-42");
        let b = doc_key("notebook-42");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert_ne!(a, doc_key("notebook-43"));
    }
}
