//! RPC surface glue (§4.G): translates `buildcoord-proto`'s generated request/reply types into
//! calls on the `buildcoord-core` session table, cache, and base ingester.

pub mod cli;
pub mod errors;
pub mod service;
