//! # notesync agent
//!
//! Synchronization agent for collaborative notebooks.
//!
//! ## Architecture
//!
//! Per configured document the agent runs one session, driven by four
//! event sources in a single loop:
//! 1. **Edits**: local mutations submitted through a session handle
//! 2. **Pushes**: unsolicited server updates, merged immediately
//! 3. **Save replies**: ack / conflict / rejection for the in-flight save
//! 4. **Debounce**: the quiet-period timer that turns dirty state into the
//!    next save attempt
//!
//! Saves are strictly serialized through an ordered attempt queue, and the
//! last server-confirmed value is cached in `SQLite` so a session can come
//! up offline.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod config;
mod persistence;
mod queue;
mod runtime;
mod session;

pub use config::AgentConfig;
pub use runtime::Agent;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting notesync agent"
    );

    // Load configuration
    let config = AgentConfig::from_env()?;

    if config.documents.is_empty() {
        tracing::warn!("No documents configured; set NOTESYNC_DOCUMENTS");
    }

    let agent = Agent::new(config)?;

    // Run agent
    agent.run().await?;

    Ok(())
}
