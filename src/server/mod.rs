//! The server shell around the per-connection engine: readiness
//! multiplexing, the accept/event loop, and the worker pool that executes
//! connection turns.

pub mod listener;
pub mod poller;
pub mod workers;
