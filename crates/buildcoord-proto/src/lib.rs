//! Generated message and service types for the build coordinator's gRPC surface.
//!
//! The actual types are emitted by `tonic-build` from `proto/buildcoord.proto` at build time;
//! this module only wires the generated code into the crate and re-exports it at the crate
//! root so downstream crates don't need to know the `tonic::include_proto!` package name.

tonic::include_proto!("buildcoord");
