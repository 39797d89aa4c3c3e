//! Agent runtime orchestration.
//!
//! Wires one [`DocumentSession`] per configured document to the shared
//! channel, the save queue, and the snapshot store, and drives each
//! session from a single `select!` loop: edit commands, push updates, the
//! at-most-one in-flight save future, and the debounce deadline.

use crate::config::AgentConfig;
use crate::persistence::SnapshotStore;
use crate::queue::SaveQueue;
use crate::session::{DocumentSession, EditOp, SaveState};
use anyhow::{Context, Result};
use notesync_channel::{ChannelConfig, ChannelError, DocUpdate, SyncChannel};
use notesync_client::{BackendClient, BackendClientConfig, LoadedNotebook};
use notesync_core::NotebookState;
use notesync_proto::{doc_key, SaveResponse};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use uuid::Uuid;

type SharedStore = Arc<Mutex<SnapshotStore>>;
type SaveFuture = Pin<Box<dyn Future<Output = Result<SaveResponse, ChannelError>> + Send>>;

/// Handle through which an embedding application submits local edits to a
/// running session.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct SessionHandle {
    doc_id: String,
    commands: mpsc::Sender<EditOp>,
}

#[allow(dead_code)]
impl SessionHandle {
    /// The document this handle edits.
    #[must_use]
    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    /// Submit a local edit.
    ///
    /// Returns `false` if the session has shut down.
    pub async fn submit(&self, op: EditOp) -> bool {
        self.commands.send(op).await.is_ok()
    }
}

/// The main agent runtime.
pub struct Agent {
    config: AgentConfig,
    store: Option<SharedStore>,
}

impl Agent {
    /// Create a new agent.
    ///
    /// # Errors
    ///
    /// Returns error if initialization fails.
    pub fn new(config: AgentConfig) -> Result<Self> {
        let store = if config.persistence.store_type == "sqlite" {
            let store = SnapshotStore::open(&config.persistence.db_path)
                .context("Failed to open SQLite database")?;
            Some(Arc::new(Mutex::new(store)))
        } else {
            None
        };

        Ok(Self { config, store })
    }

    /// Run the agent until shutdown.
    ///
    /// # Errors
    ///
    /// Returns error if a component fails to start.
    #[allow(clippy::too_many_lines)]
    pub async fn run(self) -> Result<()> {
        tracing::info!("Starting agent runtime");

        let client_id = self.config.client_id.unwrap_or_else(Uuid::new_v4);

        let backend = BackendClient::new(BackendClientConfig {
            base_url: self.config.backend.base_url.clone(),
            timeout: Duration::from_secs(30),
            bearer_token: self.config.backend.auth_token.clone(),
            ca_cert_path: self.config.backend.ca_cert_path.clone(),
        })
        .context("Failed to create backend client")?;

        let (channel, mut update_rx) = SyncChannel::connect(&ChannelConfig {
            broker_url: self.config.channel.broker_url.clone(),
            client_id: format!("notesync-{client_id}"),
            tenant: self.config.channel.tenant.clone(),
            keep_alive: Duration::from_secs(30),
            save_timeout: self.config.sync.save_timeout,
        })
        .context("Failed to connect sync channel")?;

        self.compact_journal().await;

        let queue = Arc::new(SaveQueue::new());
        let mut update_routes: HashMap<String, mpsc::Sender<DocUpdate>> = HashMap::new();
        let mut handles = Vec::new();
        let mut tasks = Vec::new();

        for doc in &self.config.documents {
            let mut session = DocumentSession::new(&doc.doc_id, doc.can_edit);
            session.set_auth_token(self.config.backend.auth_token.clone());

            match backend.load_notebook(&doc.doc_id).await {
                Ok(Some(LoadedNotebook { state, hash })) => {
                    session.mark_loaded(state, Some(hash));
                }
                Ok(None) => session.mark_loaded(NotebookState::new(), None),
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        doc_id = %doc.doc_id,
                        "Load failed; falling back to cached snapshot"
                    );
                    self.load_from_cache(&mut session, &doc.doc_id).await;
                }
            }

            channel
                .subscribe(&doc.doc_id)
                .await
                .with_context(|| format!("Failed to subscribe to {}", doc.doc_id))?;

            let (command_tx, command_rx) = mpsc::channel(64);
            let (doc_update_tx, doc_update_rx) = mpsc::channel(16);
            update_routes.insert(doc_key(&doc.doc_id), doc_update_tx);
            handles.push(SessionHandle {
                doc_id: doc.doc_id.clone(),
                commands: command_tx,
            });

            tasks.push(tokio::spawn(drive_session(
                session,
                channel.clone(),
                Arc::clone(&queue),
                self.store.clone(),
                self.config.sync.debounce,
                command_rx,
                doc_update_rx,
            )));
        }

        tracing::info!(documents = tasks.len(), "Agent running, press Ctrl+C to stop");

        loop {
            tokio::select! {
                update = update_rx.recv() => {
                    match update {
                        Some(update) => {
                            if let Some(route) = update_routes.get(&update.doc_key) {
                                if route.send(update).await.is_err() {
                                    tracing::warn!("Session task gone; dropping update");
                                }
                            } else {
                                tracing::debug!(
                                    doc_key = %update.doc_key,
                                    "Update for document we do not track"
                                );
                            }
                        }
                        None => {
                            tracing::error!("Channel event pump stopped");
                            break;
                        }
                    }
                }

                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutdown signal received");
                    break;
                }
            }
        }

        // Closing the command and update channels lets each session loop
        // drain and exit.
        drop(handles);
        drop(update_routes);
        for task in tasks {
            let _ = task.await;
        }

        tracing::info!("Agent stopped");
        Ok(())
    }

    /// Drop save-journal entries older than the configured age.
    async fn compact_journal(&self) {
        let Some(store) = &self.store else { return };

        let max_age = self.config.persistence.journal_max_age.as_secs();
        let cutoff = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|now| now.as_secs().saturating_sub(max_age))
            .unwrap_or(0);

        match store.lock().await.compact_journal_before(cutoff) {
            Ok(0) => {}
            Ok(deleted) => tracing::debug!(deleted, "Compacted save journal"),
            Err(err) => tracing::warn!(error = %err, "Journal compaction failed"),
        }
    }

    /// Seed a session from the local snapshot cache when the backend is
    /// unreachable. A session left unloaded comes up on the first push.
    async fn load_from_cache(&self, session: &mut DocumentSession, doc_id: &str) {
        let Some(store) = &self.store else {
            tracing::warn!(doc_id, "No snapshot cache; waiting for a push");
            return;
        };
        match store.lock().await.load_snapshot(doc_id) {
            Ok(Some((state, hash))) => session.mark_loaded(state, Some(hash)),
            Ok(None) => tracing::warn!(doc_id, "No cached snapshot; waiting for a push"),
            Err(err) => tracing::warn!(error = %err, doc_id, "Snapshot read failed"),
        }
    }
}

/// Drive one session: edits, pushes, the in-flight save, and the debounce.
async fn drive_session(
    mut session: DocumentSession,
    channel: SyncChannel,
    queue: Arc<SaveQueue>,
    store: Option<SharedStore>,
    debounce: Duration,
    mut commands: mpsc::Receiver<EditOp>,
    mut updates: mpsc::Receiver<DocUpdate>,
) {
    let mut next_save_at: Option<Instant> = None;
    let mut inflight: Option<SaveFuture> = None;
    let mut inflight_attempt: Option<Uuid> = None;

    loop {
        tokio::select! {
            command = commands.recv() => {
                match command {
                    Some(op) => {
                        if session.apply_edit(op) {
                            // Trailing-edge debounce: every edit pushes the
                            // deadline out again.
                            next_save_at = Some(Instant::now() + debounce);
                        }
                    }
                    None => break,
                }
            }

            update = updates.recv() => {
                let Some(DocUpdate { update, .. }) = update else { break };
                if let Some(report) = session.apply_push(update.value, update.hash) {
                    if report.new_content {
                        tracing::info!(
                            doc_id = %session.doc_id(),
                            "New content arrived from another collaborator"
                        );
                    }
                    persist_confirmed(store.as_ref(), &session).await;
                    if report.dirty {
                        next_save_at = Some(Instant::now() + debounce);
                    }
                }
            }

            result = poll_inflight(&mut inflight), if inflight.is_some() => {
                inflight = None;
                let attempt = inflight_attempt.take();
                match result {
                    Ok(response) => {
                        let report = session.complete_save(response);
                        record_outcome(store.as_ref(), &session, attempt).await;
                        if matches!(
                            session.save_state(),
                            SaveState::Saved | SaveState::Conflict
                        ) {
                            persist_confirmed(store.as_ref(), &session).await;
                        }
                        if report.is_some_and(|r| r.dirty) {
                            // Conflict left surviving local changes; the
                            // merged value goes out on the next tick.
                            next_save_at = Some(Instant::now() + debounce);
                        }
                    }
                    Err(err) => {
                        session.fail_save(&err.to_string());
                        record_outcome(store.as_ref(), &session, attempt).await;
                        next_save_at = Some(Instant::now() + debounce);
                    }
                }
            }

            () = sleep_until_deadline(next_save_at), if next_save_at.is_some() && inflight.is_none() => {
                next_save_at = None;
                if let Some(request) = session.begin_save() {
                    let attempt = request.attempt_id;
                    inflight_attempt = Some(attempt);
                    let channel = channel.clone();
                    let queue = Arc::clone(&queue);
                    inflight = Some(Box::pin(async move {
                        queue.acquire(attempt).await;
                        let result = channel.save(&request).await;
                        queue.release(attempt).await;
                        result
                    }));
                }
            }
        }
    }

    tracing::debug!(doc_id = %session.doc_id(), "Session stopped");
}

/// Await the in-flight save, or park forever when none is running (the
/// arm is disabled then anyway).
async fn poll_inflight(inflight: &mut Option<SaveFuture>) -> Result<SaveResponse, ChannelError> {
    match inflight {
        Some(save) => save.as_mut().await,
        None => std::future::pending().await,
    }
}

/// Sleep until the debounce deadline, or park forever when none is armed.
async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Persist the server-confirmed value and hash.
async fn persist_confirmed(store: Option<&SharedStore>, session: &DocumentSession) {
    let Some(store) = store else { return };
    let Some(hash) = session.last_saved_hash() else { return };

    if let Err(err) =
        store
            .lock()
            .await
            .save_snapshot(session.doc_id(), session.last_common(), hash)
    {
        tracing::warn!(error = %err, doc_id = %session.doc_id(), "Failed to persist snapshot");
    }
}

/// Journal the outcome of a completed save attempt.
async fn record_outcome(
    store: Option<&SharedStore>,
    session: &DocumentSession,
    attempt: Option<Uuid>,
) {
    let (Some(store), Some(attempt)) = (store, attempt) else {
        return;
    };
    let outcome = match session.save_state() {
        SaveState::Saved => "saved",
        SaveState::Conflict => "conflict",
        SaveState::Error => "error",
        SaveState::Idle | SaveState::Saving => return,
    };

    if let Err(err) = store.lock().await.record_attempt(
        session.doc_id(),
        attempt,
        outcome,
        session.last_saved_hash(),
    ) {
        tracing::warn!(error = %err, doc_id = %session.doc_id(), "Failed to record save attempt");
    }
}
