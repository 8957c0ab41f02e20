//! Top-level facade crate for iqversion.
//!
//! Re-exports the protocol core and the client runtime so users can depend
//! on a single crate.

pub mod core {
    pub use iqversion_core::*;
}

pub mod client {
    pub use iqversion_client::*;
}
