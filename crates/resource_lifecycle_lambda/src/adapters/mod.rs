use std::future::Future;

pub mod callback;
pub mod command;
pub mod ledger_store;

/// Drives an SDK future to completion from synchronous adapter code.
///
/// Requires a multi-threaded tokio runtime.
pub(crate) fn block_on<F: Future>(future: F) -> F::Output {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
