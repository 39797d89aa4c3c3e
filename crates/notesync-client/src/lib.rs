//! # notesync-client
//!
//! HTTP backend client for notesync.
//!
//! Owns the load half of the external interface: the initial fetch of a
//! notebook (value + version hash) over an authenticated GET. Saves and
//! push notifications travel over the bidirectional channel instead
//! (`notesync-channel`).
//!
//! Document ids are opaque and are base64url-encoded (no padding) when
//! placed in URL paths.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod encoding;

pub use client::{BackendClient, BackendClientConfig, ClientError, LoadedNotebook};
pub use encoding::{decode_doc_id, encode_doc_id};
