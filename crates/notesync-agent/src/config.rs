//! Agent configuration.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Stable client identifier; generated per process when absent
    pub client_id: Option<Uuid>,

    /// Backend (load endpoint) configuration
    pub backend: BackendConfig,

    /// Channel configuration
    pub channel: ChannelSettings,

    /// Save-loop tunables
    pub sync: SyncSettings,

    /// Persistence configuration
    pub persistence: PersistenceConfig,

    /// Documents to synchronize
    pub documents: Vec<DocumentConfig>,
}

/// Backend HTTP configuration.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Backend base URL
    pub base_url: String,

    /// Bearer token for load and save authentication
    pub auth_token: Option<String>,

    /// Custom CA certificate path for self-signed HTTPS backends
    pub ca_cert_path: Option<PathBuf>,
}

/// Channel configuration.
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    /// MQTT broker URL for the save/push channel
    pub broker_url: String,

    /// Tenant identifier
    pub tenant: String,
}

/// Save-loop tunables.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Quiet period between the last local edit and the save attempt
    pub debounce: Duration,

    /// Hard upper bound on a save attempt
    pub save_timeout: Duration,
}

/// Persistence configuration.
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// Persistence type: "sqlite" or "memory"
    pub store_type: String,

    /// Database path (for `SQLite`)
    pub db_path: PathBuf,

    /// Age after which save-journal entries are compacted away
    pub journal_max_age: Duration,
}

/// One document to synchronize.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentConfig {
    /// Document identifier
    pub doc_id: String,

    /// Whether this client may edit (and therefore save) the document
    #[serde(default = "default_can_edit")]
    pub can_edit: bool,
}

fn default_can_edit() -> bool {
    true
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            backend: BackendConfig {
                base_url: "http://localhost:8080".to_string(),
                auth_token: None,
                ca_cert_path: None,
            },
            channel: ChannelSettings {
                broker_url: "tcp://localhost:1883".to_string(),
                tenant: "default".to_string(),
            },
            sync: SyncSettings {
                debounce: Duration::from_millis(250),
                save_timeout: Duration::from_secs(10),
            },
            persistence: PersistenceConfig {
                store_type: "sqlite".to_string(),
                db_path: PathBuf::from("./notesync.db"),
                journal_max_age: Duration::from_secs(7 * 24 * 3600),
            },
            documents: Vec::new(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `NOTESYNC_CLIENT_ID`: Client UUID
    /// - `NOTESYNC_BACKEND_URL`: Backend base URL
    /// - `NOTESYNC_AUTH_TOKEN`: Bearer token
    /// - `NOTESYNC_CA_CERT`: CA certificate path
    /// - `NOTESYNC_MQTT_BROKER`: MQTT broker URL
    /// - `NOTESYNC_TENANT`: Tenant identifier
    /// - `NOTESYNC_STORE`: "sqlite" or "memory"
    /// - `NOTESYNC_DB_PATH`: `SQLite` database path
    /// - `NOTESYNC_DEBOUNCE_MS`: Save debounce in milliseconds
    /// - `NOTESYNC_SAVE_TIMEOUT_SECS`: Save timeout in seconds
    /// - `NOTESYNC_DOCUMENTS`: JSON array of `{doc_id, can_edit}`
    ///
    /// # Errors
    ///
    /// Returns error if a variable cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(id) = std::env::var("NOTESYNC_CLIENT_ID") {
            config.client_id = Some(Uuid::parse_str(&id).context("Invalid NOTESYNC_CLIENT_ID")?);
        }

        if let Ok(url) = std::env::var("NOTESYNC_BACKEND_URL") {
            config.backend.base_url = url;
        }

        if let Ok(token) = std::env::var("NOTESYNC_AUTH_TOKEN") {
            config.backend.auth_token = Some(token);
        }

        if let Ok(ca_cert) = std::env::var("NOTESYNC_CA_CERT") {
            config.backend.ca_cert_path = Some(PathBuf::from(ca_cert));
        }

        if let Ok(broker) = std::env::var("NOTESYNC_MQTT_BROKER") {
            config.channel.broker_url = broker;
        }

        if let Ok(tenant) = std::env::var("NOTESYNC_TENANT") {
            config.channel.tenant = tenant;
        }

        if let Ok(store_type) = std::env::var("NOTESYNC_STORE") {
            config.persistence.store_type = store_type;
        }

        if let Ok(db_path) = std::env::var("NOTESYNC_DB_PATH") {
            config.persistence.db_path = PathBuf::from(db_path);
        }

        if let Ok(debounce_ms) = std::env::var("NOTESYNC_DEBOUNCE_MS") {
            let millis: u64 = debounce_ms.parse().context("Invalid NOTESYNC_DEBOUNCE_MS")?;
            config.sync.debounce = Duration::from_millis(millis);
        }

        if let Ok(timeout_secs) = std::env::var("NOTESYNC_SAVE_TIMEOUT_SECS") {
            let secs: u64 = timeout_secs
                .parse()
                .context("Invalid NOTESYNC_SAVE_TIMEOUT_SECS")?;
            config.sync.save_timeout = Duration::from_secs(secs);
        }

        // Parse documents from JSON env var
        if let Ok(docs_json) = std::env::var("NOTESYNC_DOCUMENTS") {
            config.documents =
                serde_json::from_str(&docs_json).context("Invalid NOTESYNC_DOCUMENTS JSON")?;
        }

        Ok(config)
    }
}
