//! The current `buildcoord` version, exposed as a crate so both the server binary and its
//! integration tests can report it without depending on the binary crate itself.

/// The version of `buildcoord` being built.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
