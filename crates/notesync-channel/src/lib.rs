//! # notesync-channel
//!
//! The persistent bidirectional channel between a notesync client and the
//! backend, carried over MQTT.
//!
//! Two flows share the connection:
//! - save requests with one-shot, attempt-scoped reply topics (an RPC call
//!   emulated over pub/sub, bounded by a hard timeout)
//! - unsolicited push notifications when another party saves
//!
//! Topic layout comes from `notesync-proto`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;

pub use channel::{ChannelConfig, ChannelError, DocUpdate, SyncChannel};
