//! HTTP protocol implementation.
//!
//! This module implements the HTTP/1.1 half of the engine: everything that
//! turns bytes on a connection into a [`request::Request`] and a
//! [`response::Response`] back into bytes.
//!
//! # Architecture
//!
//! - **`headers`**: Ordered, case-insensitive header list
//! - **`request`**: Request methods and the parsed request
//! - **`response`**: Status codes, body kinds and the response handlers fill in
//! - **`parser`**: The resumable request parser
//! - **`writer`**: Serializes a response and writes it, resuming on would-block
//! - **`handler`**: The application callback contract
//! - **`connection`**: The per-socket state machine driving all of the above
//!
//! # Example
//!
//! ```no_run
//! use lantern::config::Config;
//! use lantern::http::request::{Method, Request};
//! use lantern::http::response::Response;
//!
//! fn hello(req: &Request, res: &mut Response) -> i32 {
//!     if req.method != Method::GET {
//!         return 405;
//!     }
//!     res.set_body_static(b"hello world");
//!     res.header("content-type", "text/plain");
//!     200
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     let cfg = Config::load()?;
//!     Err(lantern::serve(&cfg, hello).into())
//! }
//! ```

pub mod connection;
pub mod handler;
pub mod headers;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
