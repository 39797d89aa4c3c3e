//! # notesync-core
//!
//! Document model, diff engine, and merge resolver for notesync.
//!
//! This crate provides:
//! - The versioned notebook model (ordered typed blocks plus derived
//!   key-points and outline artifacts)
//! - Per-type block behaviors dispatched over a closed variant set
//! - An identity-keyed O(n) diff engine
//! - A three-way merge resolver with server-authoritative conflict rules
//!
//! Everything here is pure: transport, persistence, and the save loop live
//! in the surrounding crates.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod block;
pub mod diff;
pub mod merge;
pub mod notebook;

pub use block::{AiData, AssetData, Block, BlockData, BlockId, BlockKind, NoteData};
pub use diff::{compute_diffs, Diff};
pub use merge::{merge, MergeOutcome};
pub use notebook::{Bullet, KeyPoints, NotebookState, Outline, OutlineSection};
