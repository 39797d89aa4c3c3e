//! Identity-keyed diff engine.
//!
//! Computes the atomic changes between two versions of a notebook. Blocks
//! correspond by id, not by content or position, so the comparison is a
//! two-pass O(n) walk over id maps rather than a sequence alignment. The
//! derived artifacts are compared as whole values.

use crate::block::{Block, BlockData, BlockId};
use crate::notebook::{KeyPoints, NotebookState, Outline};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An atomic difference between two notebook versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Diff {
    /// A block exists in both versions at different positions.
    #[serde(rename_all = "camelCase")]
    Reorder {
        /// The moved block
        block_id: BlockId,
        /// Position in the old version
        old_index: usize,
        /// Position in the new version
        new_index: usize,
    },
    /// A block exists in both versions with different content.
    #[serde(rename_all = "camelCase")]
    Edit {
        /// The edited block
        block_id: BlockId,
        /// Payload in the old version
        old_data: BlockData,
        /// Payload in the new version
        new_data: BlockData,
    },
    /// A block exists only in the new version.
    #[serde(rename_all = "camelCase")]
    Insert {
        /// The inserted block's id
        block_id: BlockId,
        /// Position in the new version
        index: usize,
        /// The inserted block
        block: Block,
    },
    /// A block exists only in the old version.
    #[serde(rename_all = "camelCase")]
    Delete {
        /// The removed block's id
        block_id: BlockId,
    },
    /// The key-points artifact differs by whole-value inequality.
    #[serde(rename_all = "camelCase")]
    KeyPoints {
        /// Old artifact value
        old: Option<KeyPoints>,
        /// New artifact value
        new: Option<KeyPoints>,
    },
    /// The outline artifact differs by whole-value inequality.
    #[serde(rename_all = "camelCase")]
    Outline {
        /// Old artifact value
        old: Option<Outline>,
        /// New artifact value
        new: Option<Outline>,
    },
}

impl Diff {
    /// The block this diff targets, if it targets one.
    #[must_use]
    pub fn block_id(&self) -> Option<&BlockId> {
        match self {
            Diff::Reorder { block_id, .. }
            | Diff::Edit { block_id, .. }
            | Diff::Insert { block_id, .. }
            | Diff::Delete { block_id } => Some(block_id),
            Diff::KeyPoints { .. } | Diff::Outline { .. } => None,
        }
    }
}

/// Compute the atomic changes that turn `old` into `new`.
///
/// Block diffs are emitted in `new`'s document order (reorders and edits
/// for surviving blocks, inserts for new ones), then deletions in `old`'s
/// order, then the two derived-artifact comparisons. `compute_diffs(x, x)`
/// is empty for any valid state.
#[must_use]
pub fn compute_diffs(old: &NotebookState, new: &NotebookState) -> Vec<Diff> {
    let mut diffs = Vec::new();

    let old_index: HashMap<&BlockId, usize> = old
        .blocks
        .iter()
        .enumerate()
        .map(|(i, b)| (&b.id, i))
        .collect();
    let new_index: HashMap<&BlockId, usize> = new
        .blocks
        .iter()
        .enumerate()
        .map(|(i, b)| (&b.id, i))
        .collect();

    for (index, block) in new.blocks.iter().enumerate() {
        match old_index.get(&block.id) {
            Some(&old_idx) => {
                if old_idx != index {
                    diffs.push(Diff::Reorder {
                        block_id: block.id.clone(),
                        old_index: old_idx,
                        new_index: index,
                    });
                }
                let old_block = &old.blocks[old_idx];
                if !old_block.data.same_content(&block.data) {
                    diffs.push(Diff::Edit {
                        block_id: block.id.clone(),
                        old_data: old_block.data.clone(),
                        new_data: block.data.clone(),
                    });
                }
            }
            None => {
                diffs.push(Diff::Insert {
                    block_id: block.id.clone(),
                    index,
                    block: block.clone(),
                });
            }
        }
    }

    for block in &old.blocks {
        if !new_index.contains_key(&block.id) {
            diffs.push(Diff::Delete {
                block_id: block.id.clone(),
            });
        }
    }

    if old.key_points != new.key_points {
        diffs.push(Diff::KeyPoints {
            old: old.key_points.clone(),
            new: new.key_points.clone(),
        });
    }
    if old.outline != new.outline {
        diffs.push(Diff::Outline {
            old: old.outline.clone(),
            new: new.outline.clone(),
        });
    }

    tracing::trace!(
        old_blocks = old.blocks.len(),
        new_blocks = new.blocks.len(),
        diffs = diffs.len(),
        "Computed diffs"
    );
    diffs
}
