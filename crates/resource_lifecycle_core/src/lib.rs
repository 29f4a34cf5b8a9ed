//! Shared custom resource lifecycle primitives.
//!
//! This crate owns the request/response contract exchanged with the
//! orchestrator and the content hashing that derives physical identities.
//! It intentionally excludes AWS SDK and Lambda runtime concerns.

pub mod contract;
pub mod hashing;
