//! `SQLite` local snapshot cache.
//!
//! Caches the last server-confirmed value and hash per document (so a
//! session can come up when the backend is unreachable) and keeps a
//! journal of save attempts for diagnostics. Notebook values are stored
//! as CBOR blobs.

use notesync_core::NotebookState;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use uuid::Uuid;

/// `SQLite`-backed snapshot cache.
pub struct SnapshotStore {
    conn: Connection,
}

#[allow(dead_code)]
impl SnapshotStore {
    /// Open or create a `SQLite` database.
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened or initialized.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be created.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            r"
            -- Last server-confirmed value per document
            CREATE TABLE IF NOT EXISTS notebook_snapshots (
                doc_id TEXT PRIMARY KEY,
                state_bytes BLOB NOT NULL,
                hash TEXT NOT NULL,
                saved_at INTEGER NOT NULL
            );

            -- Save-attempt journal
            CREATE TABLE IF NOT EXISTS save_journal (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                doc_id TEXT NOT NULL,
                attempt_id TEXT NOT NULL,
                outcome TEXT NOT NULL,
                hash TEXT,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_save_journal_doc_id ON save_journal(doc_id);
            ",
        )?;

        Ok(())
    }

    /// Upsert the confirmed snapshot for a document.
    ///
    /// # Errors
    ///
    /// Returns error if encoding or the insert fails.
    pub fn save_snapshot(
        &self,
        doc_id: &str,
        state: &NotebookState,
        hash: &str,
    ) -> Result<(), StoreError> {
        let mut state_bytes = Vec::new();
        ciborium::into_writer(state, &mut state_bytes)
            .map_err(|e| StoreError::Encode(e.to_string()))?;

        self.conn.execute(
            r"
            INSERT OR REPLACE INTO notebook_snapshots (doc_id, state_bytes, hash, saved_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
            (doc_id, state_bytes, hash, to_i64(now_secs())?),
        )?;

        Ok(())
    }

    /// Load the confirmed snapshot for a document, if one was cached.
    ///
    /// # Errors
    ///
    /// Returns error if the query or decoding fails.
    pub fn load_snapshot(&self, doc_id: &str) -> Result<Option<(NotebookState, String)>, StoreError> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT state_bytes, hash FROM notebook_snapshots
            WHERE doc_id = ?1
            ",
        )?;

        let row: Option<(Vec<u8>, String)> = stmt
            .query_row([doc_id], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;

        let Some((state_bytes, hash)) = row else {
            return Ok(None);
        };

        let state = ciborium::from_reader(state_bytes.as_slice())
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        Ok(Some((state, hash)))
    }

    /// Append a save attempt to the journal.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    pub fn record_attempt(
        &self,
        doc_id: &str,
        attempt_id: Uuid,
        outcome: &str,
        hash: Option<&str>,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            r"
            INSERT INTO save_journal (doc_id, attempt_id, outcome, hash, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
            (
                doc_id,
                attempt_id.to_string(),
                outcome,
                hash,
                to_i64(now_secs())?,
            ),
        )?;

        Ok(())
    }

    /// Most recent journal entries for a document, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub fn recent_attempts(
        &self,
        doc_id: &str,
        limit: u32,
    ) -> Result<Vec<(String, String)>, StoreError> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT attempt_id, outcome FROM save_journal
            WHERE doc_id = ?1
            ORDER BY id DESC
            LIMIT ?2
            ",
        )?;

        let rows = stmt
            .query_map((doc_id, i64::from(limit)), |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
    }

    /// Delete journal entries older than the given UNIX timestamp
    /// (compaction).
    ///
    /// # Errors
    ///
    /// Returns error if the delete fails.
    pub fn compact_journal_before(&self, before_secs: u64) -> Result<usize, StoreError> {
        let deleted = self.conn.execute(
            r"
            DELETE FROM save_journal
            WHERE created_at < ?1
            ",
            [to_i64(before_secs)?],
        )?;

        Ok(deleted)
    }
}

/// Errors from the snapshot store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying database error
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Snapshot encoding failed
    #[error("snapshot encode error: {0}")]
    Encode(String),
    /// Snapshot decoding failed
    #[error("snapshot decode error: {0}")]
    Decode(String),
}

/// Current wall clock time in seconds since UNIX epoch.
fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time before UNIX epoch")
        .as_secs()
}

fn to_i64(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value)
        .map_err(|e| StoreError::Sqlite(rusqlite::Error::ToSqlConversionFailure(Box::new(e))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_core::Block;

    fn sample_state() -> NotebookState {
        let mut nb = NotebookState::new();
        nb.append_block(Block::note("n1", "alice", "<p>cached</p>"));
        nb
    }

    #[test]
    fn snapshot_roundtrip() {
        let store = SnapshotStore::in_memory().unwrap();
        let state = sample_state();

        store.save_snapshot("doc-1", &state, "h1").unwrap();
        let (loaded, hash) = store.load_snapshot("doc-1").unwrap().unwrap();

        assert_eq!(loaded, state);
        assert_eq!(hash, "h1");

        assert!(store.load_snapshot("doc-2").unwrap().is_none());
    }

    #[test]
    fn snapshot_upsert_replaces() {
        let store = SnapshotStore::in_memory().unwrap();
        let state = sample_state();

        store.save_snapshot("doc-1", &state, "h1").unwrap();

        let mut newer = state.clone();
        newer.append_block(Block::note("n2", "bob", "<p>later</p>"));
        store.save_snapshot("doc-1", &newer, "h2").unwrap();

        let (loaded, hash) = store.load_snapshot("doc-1").unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(hash, "h2");
    }

    #[test]
    fn journal_records_and_compacts() {
        let store = SnapshotStore::in_memory().unwrap();

        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        store.record_attempt("doc-1", first, "saved", Some("h1")).unwrap();
        store.record_attempt("doc-1", second, "conflict", Some("h2")).unwrap();
        store
            .record_attempt("doc-2", Uuid::new_v4(), "error", None)
            .unwrap();

        let attempts = store.recent_attempts("doc-1", 10).unwrap();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].0, second.to_string(), "newest first");
        assert_eq!(attempts[0].1, "conflict");

        // Everything written above is younger than this cutoff
        let deleted = store.compact_journal_before(1).unwrap();
        assert_eq!(deleted, 0);

        let deleted = store.compact_journal_before(u64::MAX).unwrap();
        assert_eq!(deleted, 3);
    }

    #[test]
    fn file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notesync.db");

        {
            let store = SnapshotStore::open(&path).unwrap();
            store.save_snapshot("doc-1", &sample_state(), "h1").unwrap();
        }

        let store = SnapshotStore::open(&path).unwrap();
        let (loaded, hash) = store.load_snapshot("doc-1").unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(hash, "h1");
    }
}
