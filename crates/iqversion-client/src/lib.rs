//! iqversion client library entry.
//!
//! This crate wires the in-memory connection, stanza dispatch, the
//! per-connection `VersionManager` and its registry into a runtime that an
//! XMPP client embeds to answer and issue `jabber:iq:version` queries.

pub mod clock;
pub mod config;
pub mod dispatch;
pub mod obs;
pub mod transport;
pub mod version;

pub use transport::{Connection, ConnectionId, WeakConnection};
pub use version::{VersionManager, VersionRegistry, VersionSettings};
