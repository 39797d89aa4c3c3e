//! # notesync-proto
//!
//! Wire message definitions and channel topic scheme for notesync.
//!
//! ## Messages
//!
//! - `SaveRequest` / `SaveResponse`: optimistic-concurrency save RPC
//! - `PushUpdate`: unsolicited value-changed notification
//! - `LoadResponse`: HTTP load endpoint body
//!
//! ## Topics
//!
//! Topic scheme: `notesync/v1/{tenant}/{doc_key}/{event}`, with one-shot
//! `save-reply/{attempt_id}` topics correlating each save to its reply.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod messages;
pub mod topics;

pub use messages::{
    LoadResponse, MessageError, PushUpdate, SaveData, SaveRequest, SaveResponse, SaveStatus,
};
pub use topics::{doc_key, ChannelEvent, TopicScheme};
