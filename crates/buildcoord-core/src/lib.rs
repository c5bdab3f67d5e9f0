//! Core subsystems of the build coordinator: the content-addressed artifact cache, the
//! in-memory session table, and the base-image ingestion pipeline.
//!
//! This crate owns the server's invariants — worker-slot accounting, at-most-one cached copy
//! per digest, session isolation in the filesystem, and integrity of all bytes that cross the
//! wire — independent of whatever RPC transport carries requests in from clients.

pub mod base;
pub mod cache;
pub mod digest;
pub mod packages;
pub mod session;
pub mod workdir;

pub use base::{BaseError, BaseIngester};
pub use cache::{Cache, CacheError};
pub use digest::{Cpv, Digest, InvalidChecksum, InvalidCpv, PackageDescriptor};
pub use packages::{check_package, deploy_package, parse_digest, DeployError, PackageOutcome};
pub use session::{is_canonical_sid, Session, SessionTable};
pub use workdir::Workdir;
