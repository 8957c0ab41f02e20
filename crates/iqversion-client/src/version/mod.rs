//! `jabber:iq:version` runtime.
//!
//! One `VersionManager` per connection, handed out by `VersionRegistry`,
//! with a `FloodGuard` gating automatic replies.

pub mod flood;
pub mod manager;
pub mod registry;

pub use flood::{FloodDecision, FloodGuard};
pub use manager::{VersionManager, VersionSettings};
pub use registry::VersionRegistry;
