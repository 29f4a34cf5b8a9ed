//! AWS-oriented adapters and handlers for custom resource lifecycle requests.
//!
//! This crate owns runtime integration details (the lifecycle engine, the
//! callback notifier, ledger and command adapters) and re-exports the
//! contract and hashing primitives under a single `runtime` boundary.

pub mod adapters;
pub mod command_runner;
pub mod config;
pub mod handlers;
pub mod ledger;
pub mod providers;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_support;

pub mod runtime {
    pub use resource_lifecycle_core::{contract, hashing};
}
