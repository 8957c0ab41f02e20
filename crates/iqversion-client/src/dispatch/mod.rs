//! Dispatch module exports.
//!
//! Listeners subscribe to a connection with a `StanzaFilter`; the connection
//! invokes every listener whose filter matches an inbound stanza.

pub mod filter;

pub use filter::{StanzaFilter, StanzaListener};
