use std::io;

use thiserror::Error;

/// Errors that stop the whole server.
///
/// Failures on a single connection never surface here; they are logged and
/// the connection is dropped.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("could not resolve {addr}: {source}")]
    Resolve { addr: String, source: io::Error },
    #[error("could not bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),
    #[error("readiness poller failed: {0}")]
    Poller(#[source] io::Error),
    #[error("worker {0} is no longer running")]
    WorkerGone(usize),
}
