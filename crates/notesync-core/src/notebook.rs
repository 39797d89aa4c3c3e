//! Versioned notebook document.
//!
//! A [`NotebookState`] is an ordered list of blocks plus two derived
//! artifacts (key points, outline). Block order is the canonical document
//! order and reordering is a first-class operation. The derived artifacts
//! are opaque snapshots: they are compared and replaced as whole values,
//! never diffed internally.

use crate::block::{Block, BlockData, BlockId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One bullet of the key-points artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bullet {
    /// Bullet text
    pub text: String,
    /// Ids of the blocks this bullet cites
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<BlockId>,
}

/// Derived key-points artifact, regenerated by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPoints {
    /// The bullets, in display order
    pub bullets: Vec<Bullet>,
    /// When the artifact was generated
    pub timestamp: DateTime<Utc>,
    /// Block count at generation time, for staleness display
    pub num_blocks: usize,
}

/// One section of the outline artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineSection {
    /// Section heading
    pub heading: String,
    /// First block of the section
    pub top: BlockId,
}

/// Derived outline artifact, regenerated by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outline {
    /// The sections, in document order
    #[serde(rename = "outline")]
    pub sections: Vec<OutlineSection>,
    /// When the artifact was generated
    pub timestamp: DateTime<Utc>,
    /// Block count at generation time, for staleness display
    pub num_blocks: usize,
}

/// The root versioned document: ordered blocks plus derived artifacts.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotebookState {
    /// Ordered block list; order is the canonical document order
    #[serde(default)]
    pub blocks: Vec<Block>,
    /// Derived key points, if generated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_points: Option<KeyPoints>,
    /// Derived outline, if generated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outline: Option<Outline>,
}

impl NotebookState {
    /// Create an empty notebook.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the notebook has no blocks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Look up a block by id.
    #[must_use]
    pub fn block(&self, id: &BlockId) -> Option<&Block> {
        self.blocks.iter().find(|b| &b.id == id)
    }

    /// Position of a block in document order.
    #[must_use]
    pub fn index_of(&self, id: &BlockId) -> Option<usize> {
        self.blocks.iter().position(|b| &b.id == id)
    }

    /// Whether a block with this id exists.
    #[must_use]
    pub fn contains(&self, id: &BlockId) -> bool {
        self.index_of(id).is_some()
    }

    /// Append a block at the end.
    ///
    /// Returns `false` (and leaves the state unchanged) if a block with the
    /// same id already exists.
    pub fn append_block(&mut self, block: Block) -> bool {
        let index = self.blocks.len();
        self.insert_block(index, block)
    }

    /// Insert a block at the given position, clamped to the block count.
    ///
    /// Returns `false` (and leaves the state unchanged) if a block with the
    /// same id already exists.
    pub fn insert_block(&mut self, index: usize, block: Block) -> bool {
        if self.contains(&block.id) {
            tracing::debug!(block_id = %block.id, "Rejected insert of duplicate block id");
            return false;
        }
        let index = index.min(self.blocks.len());
        self.blocks.insert(index, block);
        true
    }

    /// Replace the payload of an existing block.
    ///
    /// Returns `false` if no block with this id exists.
    pub fn edit_block(&mut self, id: &BlockId, data: BlockData) -> bool {
        match self.blocks.iter_mut().find(|b| &b.id == id) {
            Some(block) => {
                block.data = data;
                true
            }
            None => false,
        }
    }

    /// Remove a block and notify its linked blocks to clear their
    /// back-references.
    ///
    /// Returns the removed block, or `None` if no block with this id
    /// exists. `reply_to` references to the removed block are deliberately
    /// left dangling: they are display-only and never ownership.
    pub fn remove_block(&mut self, id: &BlockId) -> Option<Block> {
        let index = self.index_of(id)?;
        let removed = self.blocks.remove(index);

        let linked = removed.data.linked_blocks();
        for target in &linked {
            if let Some(block) = self.blocks.iter_mut().find(|b| &b.id == target) {
                block.data.clear_backlink(id);
            }
        }
        tracing::debug!(
            block_id = %id,
            index,
            notified = linked.len(),
            "Removed block"
        );
        Some(removed)
    }

    /// Move a block to a new position, clamped to the block count.
    ///
    /// Returns `false` if no block with this id exists.
    pub fn move_block(&mut self, id: &BlockId, new_index: usize) -> bool {
        let Some(old_index) = self.index_of(id) else {
            return false;
        };
        let block = self.blocks.remove(old_index);
        let new_index = new_index.min(self.blocks.len());
        self.blocks.insert(new_index, block);
        true
    }

    /// Replace the key-points artifact.
    pub fn set_key_points(&mut self, key_points: Option<KeyPoints>) {
        self.key_points = key_points;
    }

    /// Replace the outline artifact.
    pub fn set_outline(&mut self, outline: Option<Outline>) {
        self.outline = outline;
    }

    /// Blocks whose searchable content matches the query, in document order.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<&Block> {
        self.blocks
            .iter()
            .filter(|b| b.data.matches_query(query))
            .collect()
    }

    /// Whether every block id is unique.
    ///
    /// The mutating operations maintain this invariant; callers check it
    /// directly before merging a whole state received from outside.
    #[must_use]
    pub fn ids_unique(&self) -> bool {
        let mut seen = HashSet::with_capacity(self.blocks.len());
        self.blocks.iter().all(|b| seen.insert(&b.id))
    }
}
