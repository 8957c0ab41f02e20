//! iqversion core: transport-agnostic `jabber:iq:version` primitives.
//!
//! This crate defines the wire-level contracts (payload codec, IQ envelope,
//! inbound stanza union) and the error surface shared by the client runtime.
//! It carries no runtime or transport dependencies.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here. Malformed or
//! hostile input always surfaces as `VersionError`, never as a crash.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{ErrorCondition, Result, VersionError};
