//! Block model and per-type behaviors.
//!
//! A block is the atomic unit of notebook content. The variant set is
//! closed: every behavior that differs by block type is dispatched through
//! an exhaustive `match` on [`BlockData`], never through trait objects.
//!
//! # Per-type behaviors
//!
//! | Behavior | Note | Asset | Ai |
//! |----------|------|-------|----|
//! | `same_content` | html | asset row + backlinks | answer + prompt + sources |
//! | `linked_blocks` | none | summary, key points | cited sources |
//! | `clear_backlink` | no-op | clear matching ids | drop from sources |
//! | `matches_query` | stripped html | display fields | answer + prompt |
//! | `reply_snippet` | stripped html | display name | answer |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum length of a reply snippet, in characters.
const REPLY_SNIPPET_CHARS: usize = 120;

/// Opaque unique identifier of a block.
///
/// Assigned at creation (by whichever side creates the block), stable
/// across edits, never reused. The engine makes no assumption about the
/// format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(String);

impl BlockId {
    /// Create a block id from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// View the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlockId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for BlockId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The type discriminant of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// Rich text authored by a user
    Note,
    /// Reference to an external document or resource
    Asset,
    /// Generated answer citing source blocks
    Ai,
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockKind::Note => write!(f, "note"),
            BlockKind::Asset => write!(f, "asset"),
            BlockKind::Ai => write!(f, "ai"),
        }
    }
}

/// Payload of a user-authored note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteData {
    /// Rich text content as an html fragment
    pub html: String,
}

/// Payload of an asset reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetData {
    /// Opaque row describing the external resource (owned by the backend)
    pub asset_row: serde_json::Value,
    /// Back-reference to the generated summary block, if one exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_block_id: Option<BlockId>,
    /// Back-reference to the generated key-points block, if one exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_points_block_id: Option<BlockId>,
}

/// Payload of a generated answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiData {
    /// The generated answer text
    pub ai: String,
    /// The prompt the answer was generated from
    pub user: String,
    /// Ids of the blocks the answer cites
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub block_sources: Vec<BlockId>,
}

/// Variant-specific payload of a block.
///
/// Serialized as the `type` discriminant plus a `data` object, matching
/// the wire shape of a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum BlockData {
    /// User-authored rich text
    Note(NoteData),
    /// External resource reference
    Asset(AssetData),
    /// Generated answer
    Ai(AiData),
}

impl BlockData {
    /// The type discriminant of this payload.
    #[must_use]
    pub fn kind(&self) -> BlockKind {
        match self {
            BlockData::Note(_) => BlockKind::Note,
            BlockData::Asset(_) => BlockKind::Asset,
            BlockData::Ai(_) => BlockKind::Ai,
        }
    }

    /// Type-specific content equality, used by the diff engine.
    ///
    /// Payloads of different kinds never compare equal.
    #[must_use]
    pub fn same_content(&self, other: &BlockData) -> bool {
        match (self, other) {
            (BlockData::Note(a), BlockData::Note(b)) => a.html == b.html,
            (BlockData::Asset(a), BlockData::Asset(b)) => {
                a.asset_row == b.asset_row
                    && a.summary_block_id == b.summary_block_id
                    && a.key_points_block_id == b.key_points_block_id
            }
            (BlockData::Ai(a), BlockData::Ai(b)) => {
                a.ai == b.ai && a.user == b.user && a.block_sources == b.block_sources
            }
            _ => false,
        }
    }

    /// Ids of blocks that must be notified when this block is deleted.
    ///
    /// Links are mutual: an asset points at its derived summary/key-points
    /// blocks, and those blocks cite the asset back through their sources.
    #[must_use]
    pub fn linked_blocks(&self) -> Vec<BlockId> {
        match self {
            BlockData::Note(_) => Vec::new(),
            BlockData::Asset(data) => data
                .summary_block_id
                .iter()
                .chain(data.key_points_block_id.iter())
                .cloned()
                .collect(),
            BlockData::Ai(data) => data.block_sources.clone(),
        }
    }

    /// Drop any reference this payload holds to a removed block.
    pub fn clear_backlink(&mut self, removed: &BlockId) {
        match self {
            BlockData::Note(_) => {}
            BlockData::Asset(data) => {
                if data.summary_block_id.as_ref() == Some(removed) {
                    data.summary_block_id = None;
                }
                if data.key_points_block_id.as_ref() == Some(removed) {
                    data.key_points_block_id = None;
                }
            }
            BlockData::Ai(data) => {
                data.block_sources.retain(|id| id != removed);
            }
        }
    }

    /// Case-insensitive text search over the searchable fields of this kind.
    #[must_use]
    pub fn matches_query(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        if query.is_empty() {
            return false;
        }
        match self {
            BlockData::Note(data) => strip_tags(&data.html).to_lowercase().contains(&query),
            BlockData::Asset(data) => asset_display_name(&data.asset_row)
                .is_some_and(|name| name.to_lowercase().contains(&query)),
            BlockData::Ai(data) => {
                data.ai.to_lowercase().contains(&query) || data.user.to_lowercase().contains(&query)
            }
        }
    }

    /// Short plain-text excerpt shown when another block replies to this one.
    #[must_use]
    pub fn reply_snippet(&self) -> String {
        let text = match self {
            BlockData::Note(data) => strip_tags(&data.html),
            BlockData::Asset(data) => {
                asset_display_name(&data.asset_row).unwrap_or_default().to_string()
            }
            BlockData::Ai(data) => data.ai.clone(),
        };
        truncate_chars(text.trim(), REPLY_SNIPPET_CHARS)
    }
}

/// A unit of notebook content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Unique, stable identifier
    pub id: BlockId,
    /// Creation time (UTC), immutable
    pub timestamp: DateTime<Utc>,
    /// Display name of the author
    pub author: String,
    /// Weak reference to the block this one replies to; display threading
    /// only, never ownership. Left dangling if the target is removed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<BlockId>,
    /// Variant-specific payload
    #[serde(flatten)]
    pub data: BlockData,
}

impl Block {
    /// Create a block with the current time as its creation timestamp.
    #[must_use]
    pub fn new(id: impl Into<BlockId>, author: impl Into<String>, data: BlockData) -> Self {
        Self {
            id: id.into(),
            timestamp: Utc::now(),
            author: author.into(),
            reply_to: None,
            data,
        }
    }

    /// Create a note block.
    #[must_use]
    pub fn note(id: impl Into<BlockId>, author: impl Into<String>, html: impl Into<String>) -> Self {
        Self::new(id, author, BlockData::Note(NoteData { html: html.into() }))
    }

    /// Create an asset block with no derived back-references yet.
    #[must_use]
    pub fn asset(
        id: impl Into<BlockId>,
        author: impl Into<String>,
        asset_row: serde_json::Value,
    ) -> Self {
        Self::new(
            id,
            author,
            BlockData::Asset(AssetData {
                asset_row,
                summary_block_id: None,
                key_points_block_id: None,
            }),
        )
    }

    /// Create a generated-answer block.
    #[must_use]
    pub fn ai(
        id: impl Into<BlockId>,
        author: impl Into<String>,
        ai: impl Into<String>,
        user: impl Into<String>,
        block_sources: Vec<BlockId>,
    ) -> Self {
        Self::new(
            id,
            author,
            BlockData::Ai(AiData {
                ai: ai.into(),
                user: user.into(),
                block_sources,
            }),
        )
    }

    /// Set the reply-to reference.
    #[must_use]
    pub fn replying_to(mut self, target: impl Into<BlockId>) -> Self {
        self.reply_to = Some(target.into());
        self
    }
}

/// Pull the display name out of an opaque asset row.
fn asset_display_name(asset_row: &serde_json::Value) -> Option<&str> {
    asset_row
        .get("name")
        .or_else(|| asset_row.get("title"))
        .and_then(serde_json::Value::as_str)
}

/// Strip html tags and decode the handful of entities that matter for
/// search and snippets. Not a sanitizer; rendering is out of scope.
#[must_use]
pub fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

/// Truncate on a char boundary, appending an ellipsis when shortened.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn same_content_per_kind() {
        let a = Block::note("n1", "alice", "<p>hello</p>");
        let b = Block::note("n1", "bob", "<p>hello</p>");
        // Only the payload matters, not author or timestamp
        assert!(a.data.same_content(&b.data));

        let c = Block::note("n1", "alice", "<p>changed</p>");
        assert!(!a.data.same_content(&c.data));
    }

    #[test]
    fn same_content_cross_kind_is_false() {
        let note = Block::note("x", "alice", "report");
        let asset = Block::asset("x", "alice", json!({"name": "report"}));
        assert!(!note.data.same_content(&asset.data));
    }

    #[test]
    fn asset_content_includes_backlinks() {
        let row = json!({"name": "roadmap.pdf"});
        let mut a = AssetData {
            asset_row: row.clone(),
            summary_block_id: None,
            key_points_block_id: None,
        };
        let b = a.clone();
        assert!(BlockData::Asset(a.clone()).same_content(&BlockData::Asset(b.clone())));

        a.summary_block_id = Some(BlockId::from("s1"));
        assert!(!BlockData::Asset(a).same_content(&BlockData::Asset(b)));
    }

    #[test]
    fn clear_backlink_asset() {
        let mut data = BlockData::Asset(AssetData {
            asset_row: json!({"name": "roadmap.pdf"}),
            summary_block_id: Some(BlockId::from("s1")),
            key_points_block_id: Some(BlockId::from("k1")),
        });

        data.clear_backlink(&BlockId::from("s1"));
        let BlockData::Asset(inner) = &data else {
            panic!("kind changed");
        };
        assert!(inner.summary_block_id.is_none());
        assert_eq!(inner.key_points_block_id, Some(BlockId::from("k1")));
    }

    #[test]
    fn clear_backlink_ai_sources() {
        let mut data = BlockData::Ai(AiData {
            ai: "summary".to_string(),
            user: "summarize".to_string(),
            block_sources: vec![BlockId::from("a1"), BlockId::from("a2")],
        });

        data.clear_backlink(&BlockId::from("a1"));
        let BlockData::Ai(inner) = &data else {
            panic!("kind changed");
        };
        assert_eq!(inner.block_sources, vec![BlockId::from("a2")]);
    }

    #[test]
    fn linked_blocks_by_kind() {
        let note = Block::note("n1", "alice", "hi");
        assert!(note.data.linked_blocks().is_empty());

        let asset = BlockData::Asset(AssetData {
            asset_row: json!({}),
            summary_block_id: Some(BlockId::from("s1")),
            key_points_block_id: None,
        });
        assert_eq!(asset.linked_blocks(), vec![BlockId::from("s1")]);

        let ai = Block::ai("x", "assistant", "answer", "question", vec![BlockId::from("a1")]);
        assert_eq!(ai.data.linked_blocks(), vec![BlockId::from("a1")]);
    }

    #[test]
    fn search_strips_markup() {
        let note = Block::note("n1", "alice", "<p>The <b>quarterly</b> report</p>");
        assert!(note.data.matches_query("quarterly report"));
        assert!(!note.data.matches_query("<b>"));
        assert!(!note.data.matches_query(""));
    }

    #[test]
    fn search_asset_display_fields() {
        let asset = Block::asset("a1", "alice", json!({"title": "Q3 Roadmap"}));
        assert!(asset.data.matches_query("roadmap"));
        assert!(!asset.data.matches_query("quarterly"));
    }

    #[test]
    fn reply_snippet_truncates_on_char_boundary() {
        let long = "é".repeat(300);
        let note = Block::note("n1", "alice", format!("<p>{long}</p>"));
        let snippet = note.data.reply_snippet();
        assert!(snippet.chars().count() <= REPLY_SNIPPET_CHARS + 1);
        assert!(snippet.ends_with('…'));
    }

    #[test]
    fn block_wire_shape() {
        let block = Block::note("n1", "alice", "<p>hi</p>").replying_to("n0");
        let value = serde_json::to_value(&block).unwrap();

        assert_eq!(value["id"], "n1");
        assert_eq!(value["type"], "note");
        assert_eq!(value["data"]["html"], "<p>hi</p>");
        assert_eq!(value["replyTo"], "n0");

        let decoded: Block = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, block);
    }
}
