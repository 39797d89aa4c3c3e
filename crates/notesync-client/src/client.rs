//! HTTP client for the notebook backend.
//!
//! Provides the load half of the protocol: saves travel over the
//! bidirectional channel, but the initial document fetch is a plain
//! authenticated GET.

use crate::encoding::encode_doc_id;
use notesync_core::NotebookState;
use notesync_proto::LoadResponse;
use reqwest::Client;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Backend HTTP client configuration.
#[derive(Debug, Clone)]
pub struct BackendClientConfig {
    /// Base URL of the backend (e.g., <http://localhost:8080>)
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Optional bearer token for authentication
    pub bearer_token: Option<String>,
    /// Custom CA certificate path for self-signed server certs (PEM format)
    pub ca_cert_path: Option<PathBuf>,
}

impl Default for BackendClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout: Duration::from_secs(30),
            bearer_token: None,
            ca_cert_path: None,
        }
    }
}

/// A notebook as stored by the backend, with its version hash.
#[derive(Debug, Clone)]
pub struct LoadedNotebook {
    /// The stored value
    pub state: NotebookState,
    /// Opaque version hash to submit with the next save
    pub hash: String,
}

/// HTTP client for backend load operations.
pub struct BackendClient {
    client: Client,
    config: BackendClientConfig,
}

impl BackendClient {
    /// Create a new backend client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created, or if a TLS
    /// certificate file cannot be read or parsed.
    pub fn new(config: BackendClientConfig) -> Result<Self, ClientError> {
        let mut builder = Client::builder().timeout(config.timeout);

        if config.base_url.starts_with("https://") {
            builder = builder.use_rustls_tls();

            // Load custom CA certificate if provided (for self-signed certs)
            if let Some(ca_path) = &config.ca_cert_path {
                let ca_cert = fs::read(ca_path).map_err(|e| {
                    ClientError::Init(format!(
                        "failed to read CA certificate {}: {e}",
                        ca_path.display()
                    ))
                })?;
                let cert = reqwest::Certificate::from_pem(&ca_cert).map_err(|e| {
                    ClientError::Init(format!("failed to parse CA certificate: {e}"))
                })?;
                builder = builder.add_root_certificate(cert);
                tracing::debug!(ca_path = %ca_path.display(), "Loaded custom CA certificate");
            }
        }

        let client = builder
            .build()
            .map_err(|e| ClientError::Init(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Build the authorization header if configured.
    fn auth_header(&self) -> Option<String> {
        self.config
            .bearer_token
            .as_ref()
            .map(|t| format!("Bearer {t}"))
    }

    /// Fetch a notebook by document id.
    ///
    /// Returns `None` when the document does not exist yet (404, or a body
    /// with no stored value).
    ///
    /// # Errors
    ///
    /// Returns error on network or API errors, or when the body carries a
    /// value without its version hash.
    pub async fn load_notebook(&self, doc_id: &str) -> Result<Option<LoadedNotebook>, ClientError> {
        let encoded_id = encode_doc_id(doc_id);
        let url = format!("{}/notebooks/{}", self.config.base_url, encoded_id);

        tracing::debug!(doc_id, url, "GET notebook");

        let mut request = self.client.get(&url);
        if let Some(auth) = self.auth_header() {
            request = request.header("Authorization", auth);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Request(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ClientError::ApiError {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: LoadResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))?;

        match (body.result, body.hash) {
            (Some(state), Some(hash)) => Ok(Some(LoadedNotebook { state, hash })),
            (None, _) => Ok(None),
            (Some(_), None) => Err(ClientError::Parse(
                "load response carries a value without its hash".to_string(),
            )),
        }
    }
}

/// Errors that can occur with the backend client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// Client initialization failed
    #[error("client init error: {0}")]
    Init(String),
    /// HTTP request failed
    #[error("request error: {0}")]
    Request(String),
    /// API returned an error status
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from API
        message: String,
    },
    /// Response parsing failed
    #[error("parse error: {0}")]
    Parse(String),
}
