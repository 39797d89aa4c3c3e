//! Three-way merge with server-authoritative conflict resolution.
//!
//! Reconciles a local in-flight edit with a newer server-confirmed version.
//! The server wins on any conflict; non-conflicting local changes survive.
//!
//! # Conflict rules
//!
//! | Local change | Dropped when the server... |
//! |--------------|----------------------------|
//! | Reorder | reordered anything (all-or-nothing) |
//! | Edit of X | deleted X |
//! | Delete of X | edited X |
//! | Insert at i | also inserted at i (block appended at end instead) |
//! | Key points / outline | changed that same field |
//!
//! This scheme is order-dependent and server-authoritative, deliberately
//! not a CRDT. Convergence rests on one rule the caller must honor: after
//! every merge, advance the merge base to the server version that was just
//! received. Re-diffing against a stale base never settles.

use crate::diff::{compute_diffs, Diff};
use crate::notebook::NotebookState;
use std::collections::HashSet;

/// Result of a three-way merge.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// The reconciled state, to be adopted as the new in-memory version.
    pub state: NotebookState,
    /// Whether the merge grew the block count relative to the local
    /// version. Consumers may treat this as "new content arrived" (e.g.
    /// auto-scroll); it is an output signal, not part of the algorithm.
    pub new_content: bool,
}

/// Merge a local version with an authoritative server version, relative to
/// their last known common ancestor.
///
/// Pure: no I/O, never fails on valid input. The caller must adopt
/// `server` as the new merge base afterwards.
#[must_use]
pub fn merge(
    last_common: &NotebookState,
    server: &NotebookState,
    local: &NotebookState,
) -> MergeOutcome {
    let server_diffs = compute_diffs(last_common, server);
    let local_diffs = compute_diffs(last_common, local);

    let server_reordered = server_diffs
        .iter()
        .any(|d| matches!(d, Diff::Reorder { .. }));
    let server_deleted: HashSet<_> = server_diffs
        .iter()
        .filter_map(|d| match d {
            Diff::Delete { block_id } => Some(block_id),
            _ => None,
        })
        .collect();
    let server_edited: HashSet<_> = server_diffs
        .iter()
        .filter_map(|d| match d {
            Diff::Edit { block_id, .. } => Some(block_id),
            _ => None,
        })
        .collect();
    let server_inserted_at: HashSet<usize> = server_diffs
        .iter()
        .filter_map(|d| match d {
            Diff::Insert { index, .. } => Some(*index),
            _ => None,
        })
        .collect();
    let server_changed_key_points = server_diffs
        .iter()
        .any(|d| matches!(d, Diff::KeyPoints { .. }));
    let server_changed_outline = server_diffs
        .iter()
        .any(|d| matches!(d, Diff::Outline { .. }));

    // The server version is the base; surviving local changes are layered
    // on top in a fixed order: reorders, edits, deletes, inserts, derived
    // artifacts.
    let mut merged = server.clone();
    let mut dropped = 0_usize;

    for diff in &local_diffs {
        if let Diff::Reorder {
            block_id,
            new_index,
            ..
        } = diff
        {
            // All-or-nothing: any server reorder suppresses every local
            // one, even when they target different blocks.
            if server_reordered {
                dropped += 1;
            } else {
                merged.move_block(block_id, *new_index);
            }
        }
    }

    for diff in &local_diffs {
        if let Diff::Edit {
            block_id, new_data, ..
        } = diff
        {
            if server_deleted.contains(block_id) {
                dropped += 1;
            } else {
                merged.edit_block(block_id, new_data.clone());
            }
        }
    }

    for diff in &local_diffs {
        if let Diff::Delete { block_id } = diff {
            if server_edited.contains(block_id) {
                dropped += 1;
            } else {
                merged.remove_block(block_id);
            }
        }
    }

    for diff in &local_diffs {
        if let Diff::Insert { index, block, .. } = diff {
            if merged.contains(&block.id) {
                // Both sides inserted the identical block; nothing to do.
                continue;
            }
            if server_inserted_at.contains(index) {
                merged.append_block(block.clone());
            } else {
                merged.insert_block(*index, block.clone());
            }
        }
    }

    for diff in &local_diffs {
        match diff {
            Diff::KeyPoints { new, .. } => {
                if server_changed_key_points {
                    dropped += 1;
                } else {
                    merged.set_key_points(new.clone());
                }
            }
            Diff::Outline { new, .. } => {
                if server_changed_outline {
                    dropped += 1;
                } else {
                    merged.set_outline(new.clone());
                }
            }
            _ => {}
        }
    }

    let new_content = merged.blocks.len() > local.blocks.len();
    tracing::debug!(
        server_diffs = server_diffs.len(),
        local_diffs = local_diffs.len(),
        dropped,
        merged_blocks = merged.blocks.len(),
        new_content,
        "Merged local changes onto server version"
    );

    MergeOutcome {
        state: merged,
        new_content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Block, BlockData, BlockId};
    use crate::notebook::{Bullet, KeyPoints};
    use chrono::Utc;

    fn notebook(ids: &[&str]) -> NotebookState {
        let mut nb = NotebookState::new();
        for id in ids {
            nb.append_block(Block::note(*id, "alice", format!("<p>{id}</p>")));
        }
        nb
    }

    fn edit(nb: &mut NotebookState, id: &str, html: &str) {
        assert!(nb.edit_block(
            &BlockId::from(id),
            Block::note(id, "editor", html).data
        ));
    }

    fn ids(nb: &NotebookState) -> Vec<&str> {
        nb.blocks.iter().map(|b| b.id.as_str()).collect()
    }

    #[test]
    fn concrete_scenario_edit_plus_server_insert() {
        // base [A, B]; server appends C; local edits A
        let base = notebook(&["a", "b"]);

        let mut server = base.clone();
        server.append_block(Block::note("c", "carol", "<p>c</p>"));

        let mut local = base.clone();
        edit(&mut local, "a", "<p>a edited</p>");

        let outcome = merge(&base, &server, &local);
        assert_eq!(ids(&outcome.state), vec!["a", "b", "c"]);

        let BlockData::Note(note) = &outcome.state.block(&BlockId::from("a")).unwrap().data
        else {
            panic!("wrong kind");
        };
        assert_eq!(note.html, "<p>a edited</p>");
        assert!(outcome.new_content);
    }

    #[test]
    fn server_delete_beats_local_edit() {
        let base = notebook(&["x", "y"]);

        let mut server = base.clone();
        server.remove_block(&BlockId::from("x"));

        let mut local = base.clone();
        edit(&mut local, "x", "<p>doomed edit</p>");

        let outcome = merge(&base, &server, &local);
        assert!(!outcome.state.contains(&BlockId::from("x")));
        assert_eq!(ids(&outcome.state), vec!["y"]);
    }

    #[test]
    fn server_edit_beats_local_delete() {
        let base = notebook(&["x", "y"]);

        let mut server = base.clone();
        edit(&mut server, "x", "<p>server won</p>");

        let mut local = base.clone();
        local.remove_block(&BlockId::from("x"));

        let outcome = merge(&base, &server, &local);
        let block = outcome.state.block(&BlockId::from("x")).expect("x survives");
        let BlockData::Note(note) = &block.data else {
            panic!("wrong kind");
        };
        assert_eq!(note.html, "<p>server won</p>");
    }

    #[test]
    fn non_conflicting_edits_both_preserved() {
        let base = notebook(&["x", "y"]);

        let mut server = base.clone();
        edit(&mut server, "x", "<p>server x</p>");

        let mut local = base.clone();
        edit(&mut local, "y", "<p>local y</p>");

        let outcome = merge(&base, &server, &local);

        let get_html = |id: &str| {
            let BlockData::Note(note) = &outcome.state.block(&BlockId::from(id)).unwrap().data
            else {
                panic!("wrong kind");
            };
            note.html.clone()
        };
        assert_eq!(get_html("x"), "<p>server x</p>");
        assert_eq!(get_html("y"), "<p>local y</p>");
    }

    #[test]
    fn reorder_all_or_nothing() {
        let base = notebook(&["a", "b", "c", "d"]);

        // Server swaps a/b; local moves d to the front. Different blocks,
        // but the local reorder is still dropped.
        let mut server = base.clone();
        server.move_block(&BlockId::from("b"), 0);

        let mut local = base.clone();
        local.move_block(&BlockId::from("d"), 0);

        let outcome = merge(&base, &server, &local);
        assert_eq!(ids(&outcome.state), vec!["b", "a", "c", "d"]);
    }

    #[test]
    fn local_reorders_apply_when_server_kept_order() {
        let base = notebook(&["a", "b", "c"]);

        let mut server = base.clone();
        edit(&mut server, "a", "<p>touched</p>");

        let mut local = base.clone();
        local.move_block(&BlockId::from("c"), 0);

        let outcome = merge(&base, &server, &local);
        assert_eq!(ids(&outcome.state), vec!["c", "a", "b"]);
    }

    #[test]
    fn insert_index_collision_appends_local() {
        let base = notebook(&["a", "b"]);

        let mut server = base.clone();
        server.insert_block(1, Block::note("s", "carol", "<p>server</p>"));

        let mut local = base.clone();
        local.insert_block(1, Block::note("l", "alice", "<p>local</p>"));

        let outcome = merge(&base, &server, &local);
        // Local block lands at the end, not on top of the server's insert
        assert_eq!(ids(&outcome.state), vec!["a", "s", "b", "l"]);
    }

    #[test]
    fn insert_without_collision_keeps_index() {
        let base = notebook(&["a", "b"]);

        let mut server = base.clone();
        edit(&mut server, "b", "<p>touched</p>");

        let mut local = base.clone();
        local.insert_block(1, Block::note("l", "alice", "<p>local</p>"));

        let outcome = merge(&base, &server, &local);
        assert_eq!(ids(&outcome.state), vec!["a", "l", "b"]);
    }

    #[test]
    fn derived_artifact_server_wins_whole_field() {
        let key_points = |text: &str| {
            Some(KeyPoints {
                bullets: vec![Bullet {
                    text: text.to_string(),
                    citations: vec![],
                }],
                timestamp: Utc::now(),
                num_blocks: 1,
            })
        };

        let base = notebook(&["a"]);

        let mut server = base.clone();
        server.set_key_points(key_points("server"));

        let mut local = base.clone();
        local.set_key_points(key_points("local"));

        let outcome = merge(&base, &server, &local);
        assert_eq!(
            outcome.state.key_points.as_ref().unwrap().bullets[0].text,
            "server"
        );
    }

    #[test]
    fn derived_artifact_local_survives_when_server_silent() {
        let base = notebook(&["a"]);
        let server = base.clone();

        let mut local = base.clone();
        local.set_key_points(Some(KeyPoints {
            bullets: vec![],
            timestamp: Utc::now(),
            num_blocks: 1,
        }));

        let outcome = merge(&base, &server, &local);
        assert!(outcome.state.key_points.is_some());
    }

    #[test]
    fn merge_with_no_changes_is_identity() {
        let base = notebook(&["a", "b"]);
        let outcome = merge(&base, &base.clone(), &base.clone());
        assert_eq!(outcome.state, base);
        assert!(!outcome.new_content);
    }

    #[test]
    fn repeated_merges_converge_with_advancing_base() {
        // Interleaved local edits and server pushes; the base advances to
        // the server version after every merge. Once edits stop, one more
        // exchange settles local == server.
        let mut base = notebook(&["a", "b"]);
        let mut local = base.clone();

        // Round 1: local edits a; server (unaware) appends c
        edit(&mut local, "a", "<p>local 1</p>");
        let mut server = base.clone();
        server.append_block(Block::note("c", "carol", "<p>c</p>"));

        let outcome = merge(&base, &server, &local);
        base = server.clone();
        local = outcome.state;

        // Round 2: the server accepts local's resubmission verbatim
        server = local.clone();
        let outcome = merge(&base, &server, &local);
        base = server.clone();
        local = outcome.state;

        assert_eq!(local, server);
        // One more merge with no edits on either side changes nothing
        let outcome = merge(&base, &server, &local);
        assert_eq!(outcome.state, server);
    }
}
