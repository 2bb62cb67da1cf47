//! Lantern - a small multi-threaded HTTP/1.1 server engine.
//!
//! An acceptor thread hands connections round-robin to a fixed pool of
//! workers; each worker multiplexes its sockets over a readiness poller and
//! drives a resumable parser for each one. Applications plug in through a
//! single [`Handler`] callback: request in, response out.

pub mod config;
pub mod error;
pub mod http;
pub mod server;

pub use error::ServerError;
pub use http::handler::Handler;
pub use http::request::{Method, Request};
pub use http::response::{Body, Response, StatusCode};
pub use server::listener::{Server, serve};
