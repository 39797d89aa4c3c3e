//! Per-document synchronization session.
//!
//! [`DocumentSession`] is the pure state machine behind the save loop:
//! it owns the in-memory notebook, the merge base, the remembered server
//! hash, and the `Idle → Saving → {Saved, Conflict, Error}` save status.
//! All I/O (debounce timing, channel traffic, persistence) lives in the
//! runtime; every transition here is a plain method call, which is what
//! makes the conflict rules testable without a broker.
//!
//! Two rules carry the convergence guarantee:
//! - the merge base advances to the server version after every merge, and
//! - the remembered hash is only updated on a successful ack or as part of
//!   a merge, never speculatively.

use notesync_core::{merge, Block, BlockData, BlockId, KeyPoints, NotebookState, Outline};
use notesync_proto::{SaveRequest, SaveResponse};
use uuid::Uuid;

/// Save status of a session, as surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
    /// Nothing saved yet and nothing in flight
    Idle,
    /// A save attempt is in flight
    Saving,
    /// The last attempt was acknowledged
    Saved,
    /// The last attempt hit a stale hash and was merged
    Conflict,
    /// The last attempt failed (transport error, timeout, or rejection)
    Error,
}

/// A local mutation submitted by the embedding application.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub enum EditOp {
    /// Append a block at the end
    Append(Block),
    /// Insert a block at a position
    Insert {
        /// Target position, clamped to the block count
        index: usize,
        /// The block to insert
        block: Block,
    },
    /// Replace a block's payload
    Edit {
        /// Target block
        id: BlockId,
        /// Replacement payload
        data: BlockData,
    },
    /// Remove a block (with backlink cleanup)
    Delete(BlockId),
    /// Move a block to a new position
    Move {
        /// Target block
        id: BlockId,
        /// New position, clamped to the block count
        index: usize,
    },
    /// Replace the key-points artifact
    SetKeyPoints(Option<KeyPoints>),
    /// Replace the outline artifact
    SetOutline(Option<Outline>),
}

/// What a merge (conflict reply or push) did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeReport {
    /// The merged state has more blocks than the local version had; the
    /// consumer may auto-scroll
    pub new_content: bool,
    /// Local changes survived the merge and need resubmission on the next
    /// debounce tick
    pub dirty: bool,
}

/// A save attempt that has been handed to the transport.
#[derive(Debug, Clone)]
struct InflightSave {
    attempt_id: Uuid,
    /// The exact value submitted; becomes the merge base on ack.
    snapshot: NotebookState,
}

/// The save-loop state machine for one document.
#[derive(Debug)]
pub struct DocumentSession {
    doc_id: String,
    state: NotebookState,
    last_common: NotebookState,
    last_saved_hash: Option<String>,
    save_state: SaveState,
    dirty: bool,
    can_edit: bool,
    loaded: bool,
    auth_token: Option<String>,
    inflight: Option<InflightSave>,
}

impl DocumentSession {
    /// Create a session for a document that has not been loaded yet.
    #[must_use]
    pub fn new(doc_id: impl Into<String>, can_edit: bool) -> Self {
        Self {
            doc_id: doc_id.into(),
            state: NotebookState::new(),
            last_common: NotebookState::new(),
            last_saved_hash: None,
            save_state: SaveState::Idle,
            dirty: false,
            can_edit,
            loaded: false,
            auth_token: None,
            inflight: None,
        }
    }

    /// Attach the bearer token submitted with every save.
    pub fn set_auth_token(&mut self, token: Option<String>) {
        self.auth_token = token;
    }

    /// Install the initially loaded value and open the save gate.
    pub fn mark_loaded(&mut self, state: NotebookState, hash: Option<String>) {
        self.last_common = state.clone();
        self.state = state;
        self.last_saved_hash = hash;
        self.loaded = true;
        tracing::info!(
            doc_id = %self.doc_id,
            blocks = self.state.len(),
            hash = ?self.last_saved_hash,
            "Document loaded"
        );
    }

    /// The document id.
    #[must_use]
    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    /// The current in-memory value.
    #[must_use]
    #[allow(dead_code)]
    pub fn state(&self) -> &NotebookState {
        &self.state
    }

    /// The last server-confirmed value (the merge base).
    #[must_use]
    pub fn last_common(&self) -> &NotebookState {
        &self.last_common
    }

    /// The remembered server hash, if any version was confirmed yet.
    #[must_use]
    pub fn last_saved_hash(&self) -> Option<&str> {
        self.last_saved_hash.as_deref()
    }

    /// Current save status.
    #[must_use]
    pub fn save_state(&self) -> SaveState {
        self.save_state
    }

    /// Whether unsaved local changes exist.
    #[must_use]
    #[allow(dead_code)]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether the initial value has been installed.
    #[must_use]
    #[allow(dead_code)]
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Apply a local mutation.
    ///
    /// Returns `false` (and does not touch the state) when editing is not
    /// permitted or the targeted block does not exist. A successful edit
    /// marks the session dirty; the runtime arms the debounce from that.
    pub fn apply_edit(&mut self, op: EditOp) -> bool {
        if !self.can_edit {
            tracing::debug!(doc_id = %self.doc_id, "Rejected edit without permission");
            return false;
        }
        let applied = match op {
            EditOp::Append(block) => self.state.append_block(block),
            EditOp::Insert { index, block } => self.state.insert_block(index, block),
            EditOp::Edit { id, data } => self.state.edit_block(&id, data),
            EditOp::Delete(id) => self.state.remove_block(&id).is_some(),
            EditOp::Move { id, index } => self.state.move_block(&id, index),
            EditOp::SetKeyPoints(key_points) => {
                self.state.set_key_points(key_points);
                true
            }
            EditOp::SetOutline(outline) => {
                self.state.set_outline(outline);
                true
            }
        };
        if applied {
            self.dirty = true;
        }
        applied
    }

    /// Whether a save attempt may start right now.
    #[must_use]
    pub fn can_save(&self) -> bool {
        self.dirty && self.can_edit && self.loaded && self.inflight.is_none()
    }

    /// Snapshot the current value into a save request and enter `Saving`.
    ///
    /// Returns `None` when the gates (dirty, permission, loaded, no save
    /// in flight) are not all open. Edits made while the attempt is in
    /// flight re-mark the session dirty and are captured by the next
    /// cycle, never by the in-flight one.
    pub fn begin_save(&mut self) -> Option<SaveRequest> {
        if !self.can_save() {
            return None;
        }

        let mut request = SaveRequest::new(
            self.doc_id.clone(),
            self.state.clone(),
            self.last_saved_hash.clone(),
        );
        if let Some(token) = &self.auth_token {
            request = request.with_auth_token(token.clone());
        }

        self.inflight = Some(InflightSave {
            attempt_id: request.attempt_id,
            snapshot: request.data.value.clone(),
        });
        self.dirty = false;
        self.save_state = SaveState::Saving;

        tracing::debug!(
            doc_id = %self.doc_id,
            attempt_id = %request.attempt_id,
            blocks = request.data.value.len(),
            "Save attempt started"
        );
        Some(request)
    }

    /// Fold the transport's reply into the session.
    ///
    /// Returns a [`MergeReport`] when the reply was a conflict and a merge
    /// ran.
    pub fn complete_save(&mut self, response: SaveResponse) -> Option<MergeReport> {
        let Some(inflight) = self.inflight.take() else {
            tracing::warn!(doc_id = %self.doc_id, "Save reply without an in-flight attempt");
            return None;
        };

        match response {
            SaveResponse::Ack { hash, .. } => {
                self.last_common = inflight.snapshot;
                self.last_saved_hash = Some(hash);
                self.save_state = SaveState::Saved;
                tracing::debug!(
                    doc_id = %self.doc_id,
                    attempt_id = %inflight.attempt_id,
                    "Save acknowledged"
                );
                None
            }
            SaveResponse::Conflict { value, hash } => {
                if !value.ids_unique() {
                    // Never merge a malformed server value; fail the
                    // attempt and leave the state untouched.
                    tracing::warn!(
                        doc_id = %self.doc_id,
                        attempt_id = %inflight.attempt_id,
                        "Conflict reply carries duplicate block ids; dropping it"
                    );
                    self.save_state = SaveState::Error;
                    self.dirty = true;
                    return None;
                }
                let report = self.merge_server_value(value, hash);
                self.save_state = SaveState::Conflict;
                tracing::info!(
                    doc_id = %self.doc_id,
                    attempt_id = %inflight.attempt_id,
                    resubmit = report.dirty,
                    "Save conflicted; merged server version"
                );
                Some(report)
            }
            SaveResponse::Rejected { reason } => {
                self.save_state = SaveState::Error;
                self.dirty = true;
                tracing::warn!(
                    doc_id = %self.doc_id,
                    attempt_id = %inflight.attempt_id,
                    reason,
                    "Save rejected"
                );
                None
            }
        }
    }

    /// Record a transport failure (network error or timeout) for the
    /// in-flight attempt. The in-memory value is untouched; the next
    /// debounce cycle retries.
    pub fn fail_save(&mut self, reason: &str) {
        if self.inflight.take().is_none() {
            return;
        }
        self.save_state = SaveState::Error;
        self.dirty = true;
        tracing::warn!(doc_id = %self.doc_id, reason, "Save failed");
    }

    /// Fold an unsolicited update (another party saved) into the session.
    ///
    /// A push whose hash matches the remembered one is a duplicate
    /// notification and is skipped. A push to a session that was never
    /// loaded acts as the load.
    pub fn apply_push(&mut self, value: NotebookState, hash: String) -> Option<MergeReport> {
        if self.last_saved_hash.as_deref() == Some(hash.as_str()) {
            tracing::debug!(doc_id = %self.doc_id, hash, "Skipping duplicate push");
            return None;
        }
        if !value.ids_unique() {
            tracing::warn!(
                doc_id = %self.doc_id,
                "Push carries duplicate block ids; dropping it"
            );
            return None;
        }

        let report = self.merge_server_value(value, hash);
        self.loaded = true;
        Some(report)
    }

    /// Shared merge path for conflict replies and pushes: merge, advance
    /// the base to the server version, record its hash.
    fn merge_server_value(&mut self, server: NotebookState, hash: String) -> MergeReport {
        let outcome = merge(&self.last_common, &server, &self.state);
        self.state = outcome.state;
        self.last_common = server;
        self.last_saved_hash = Some(hash);

        // Surviving local changes show up as a difference against the new
        // base and get resubmitted by the next debounce tick.
        let dirty = self.state != self.last_common;
        if dirty {
            self.dirty = true;
        }
        MergeReport {
            new_content: outcome.new_content,
            dirty,
        }
    }
}
