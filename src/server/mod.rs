//! Socket plumbing: the acceptor, the worker pool and the readiness
//! multiplexer each worker waits on.

pub mod listener;
pub mod poller;
pub mod worker;
