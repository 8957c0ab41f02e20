//! In-memory connection the version runtime is attached to.
//!
//! A real client feeds raw inbound stanzas into `Connection::deliver` and
//! drains outbound frames from the receiver returned by `Connection::new`.

pub mod connection;
pub mod features;

pub use connection::{CloseHook, Connection, ConnectionId, WeakConnection};
pub use features::FeatureSet;
