use std::any::Any;
use std::io::{self, Read, Write};
use std::mem;
use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;

use crate::http::handler::Handler;
use crate::http::parser::{ParseError, ParseState, Progress};
use crate::http::request::Request;
use crate::http::response::{Response, StatusCode};
use crate::http::writer::{ResponseWriter, WriteError, WriteProgress};

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("peer disconnected in the middle of a request")]
    UnexpectedEof,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Write(#[from] WriteError),
}

/// What the connection needs before it can make progress again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Socket drained; wait for read readiness.
    Read,
    /// A response is only partly written; wait for write readiness.
    Write,
    /// The connection is finished and should be dropped.
    Close,
}

/// One client connection: the socket, the request being parsed and the
/// response being written.
///
/// A connection belongs to exactly one worker. [`Connection::drive`] is
/// called on every readiness event and runs the
/// read → parse → handle → write cycle until the socket would block.
///
/// ```text
///   Reading ──request complete──▶ Handling ──▶ Writing ──flushed──▶ Reading
///      │                                          │
///      └──protocol error──▶ Writing (400, close) ─┴──▶ Closed
/// ```
#[derive(Debug)]
pub struct Connection<S> {
    stream: S,
    request: Request,
    state: ParseState,
    outgoing: Option<ResponseWriter>,
    closing: bool,
    served: u64,
}

impl<S: Read + Write> Connection<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            request: Request::default(),
            state: ParseState::new(),
            outgoing: None,
            closing: false,
            served: 0,
        }
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Number of requests answered so far.
    pub fn served(&self) -> u64 {
        self.served
    }

    pub fn is_writing(&self) -> bool {
        self.outgoing.is_some()
    }

    /// Makes as much progress as the socket allows.
    ///
    /// Pending output is flushed before anything else is parsed, so
    /// pipelined requests are answered strictly in order. Returns once the
    /// socket would block or the connection is done.
    pub fn drive(&mut self, handler: &dyn Handler) -> Result<Flow, ConnectionError> {
        loop {
            if let Some(out) = self.outgoing.as_mut() {
                match out.write_to(&mut self.stream)? {
                    WriteProgress::Blocked => return Ok(Flow::Write),
                    WriteProgress::Done => self.outgoing = None,
                }
            }
            if self.closing {
                return Ok(Flow::Close);
            }

            match self.state.advance(&mut self.request) {
                Ok(Progress::Complete) => self.respond(handler)?,
                Ok(Progress::NeedData) => match self.state.fill_from(&mut self.stream) {
                    Ok(0) if self.state.is_idle() => return Ok(Flow::Close),
                    Ok(0) => return Err(ConnectionError::UnexpectedEof),
                    Ok(_) => {}
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Flow::Read),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => return Err(e.into()),
                },
                Err(e) => self.reject(e)?,
            }
        }
    }

    fn respond(&mut self, handler: &dyn Handler) -> Result<(), ConnectionError> {
        let request = mem::take(&mut self.request);
        let uri = String::from_utf8_lossy(&request.uri);
        let mut response = Response::new();

        let called = panic::catch_unwind(AssertUnwindSafe(|| {
            handler.handle(&request, &mut response)
        }));
        let ret = match called {
            Ok(ret) => {
                if ret < 0 {
                    tracing::warn!(method = %request.method, uri = %uri, ret, "handler failed");
                }
                ret
            }
            Err(payload) => {
                tracing::warn!(
                    method = %request.method,
                    uri = %uri,
                    panic = panic_message(payload.as_ref()),
                    "handler panicked"
                );
                // Whatever the handler left behind may be half-built.
                response = Response::new();
                -1
            }
        };
        response.status = StatusCode::from_handler(ret);

        tracing::debug!(
            method = %request.method,
            uri = %uri,
            status = response.status.as_u16(),
            "handled request"
        );

        drop(uri);
        drop(request);
        self.state.reset();
        self.served += 1;
        self.outgoing = Some(ResponseWriter::new(response)?);
        Ok(())
    }

    /// Answers a malformed request and marks the connection for closing.
    fn reject(&mut self, err: ParseError) -> Result<(), ConnectionError> {
        tracing::warn!(error = %err, "rejecting malformed request");
        self.request = Request::default();
        self.closing = true;
        self.outgoing = Some(ResponseWriter::closing(Response::with_status(err.status()))?);
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "non-string panic payload"
    }
}
