//! Protocol modules for `jabber:iq:version`.
//!
//! - `version`: the three-field payload and its `<query/>` codec.
//! - `iq`: the request/result envelope and full `<iq/>` stanza codec.
//! - `stanza`: tagged-union view of an inbound stanza for dispatch.
//! - `jid`: addressing.
//!
//! All parsers are panic-free: malformed input is reported as
//! `VersionError` and never indexes raw buffers.

pub mod iq;
pub mod jid;
pub mod stanza;
pub mod version;

pub use iq::{IqType, VersionIq};
pub use jid::Jid;
pub use stanza::Stanza;
pub use version::SoftwareVersion;
