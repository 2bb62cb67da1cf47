use std::fmt::{self, Write as _};
use std::io::{self, Read, Write};
use std::time::SystemTime;

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::http::response::{Body, Response};

const HTTP_VERSION: &str = "HTTP/1.1";
const SERVER_NAME: &str = concat!("lantern/", env!("CARGO_PKG_VERSION"));

/// File bodies are staged through a buffer of this size.
pub const FILE_CHUNK: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("status {0} has no reason phrase")]
    UnknownStatus(u16),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteProgress {
    /// Head and body have been handed to the socket.
    Done,
    /// The socket would block; call again once it is writable.
    Blocked,
}

fn serialize_head(resp: &Response, keep_alive: bool) -> Result<Bytes, WriteError> {
    let status = resp.status.as_u16();
    let reason = resp
        .status
        .reason_phrase()
        .ok_or(WriteError::UnknownStatus(status))?;

    let mut buf = BytesMut::with_capacity(256);
    write_fixed_head(&mut buf, status, reason, resp.body.len(), keep_alive)
        .map_err(|_| io::Error::other("could not format response head"))?;

    // User headers
    for h in resp.headers.iter() {
        buf.put_slice(h.key.as_bytes());
        buf.put_slice(b": ");
        buf.put_slice(&h.value);
        buf.put_slice(b"\r\n");
    }

    // Header/body separator
    buf.put_slice(b"\r\n");

    Ok(buf.freeze())
}

/// Status line and the synthesized headers, formatted in place.
fn write_fixed_head(
    buf: &mut BytesMut,
    status: u16,
    reason: &str,
    content_length: u64,
    keep_alive: bool,
) -> fmt::Result {
    let date = httpdate::HttpDate::from(SystemTime::now());
    let connection = if keep_alive { "keep-alive" } else { "close" };

    write!(buf, "{HTTP_VERSION} {status} {reason}\r\n")?;
    write!(buf, "date: {date}\r\n")?;
    write!(buf, "server: {SERVER_NAME}\r\n")?;
    write!(buf, "connection: {connection}\r\n")?;
    write!(buf, "content-length: {content_length}\r\n")
}

/// Writes `buf[*offset..]`, advancing `offset`. Returns `false` when the
/// writer would block.
fn write_from<W: Write>(w: &mut W, buf: &[u8], offset: &mut usize) -> io::Result<bool> {
    while *offset < buf.len() {
        match w.write(&buf[*offset..]) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => *offset += n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

/// A response in flight.
///
/// Holds the serialized head and the body until every byte has been
/// written. Writing can stop at any point on would-block and resume later
/// from the same offset. Dropping the writer releases the body, which
/// closes a file body whether or not it was fully sent.
#[derive(Debug)]
pub struct ResponseWriter {
    head: Bytes,
    head_sent: usize,
    body: Body,
    body_sent: u64,
    chunk: Vec<u8>,
    chunk_sent: usize,
    keep_alive: bool,
}

impl ResponseWriter {
    /// Prepares a response that keeps the connection open.
    pub fn new(response: Response) -> Result<Self, WriteError> {
        Self::build(response, true)
    }

    /// Prepares a response announcing that the connection will close.
    pub fn closing(response: Response) -> Result<Self, WriteError> {
        Self::build(response, false)
    }

    fn build(response: Response, keep_alive: bool) -> Result<Self, WriteError> {
        let head = serialize_head(&response, keep_alive)?;
        Ok(Self {
            head,
            head_sent: 0,
            body: response.body,
            body_sent: 0,
            chunk: Vec::new(),
            chunk_sent: 0,
            keep_alive,
        })
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Total bytes this response puts on the wire.
    pub fn total_len(&self) -> u64 {
        self.head.len() as u64 + self.body.len()
    }

    /// Pushes as much of the response as the writer accepts.
    pub fn write_to<W: Write>(&mut self, w: &mut W) -> Result<WriteProgress, WriteError> {
        if !write_from(w, &self.head, &mut self.head_sent)? {
            return Ok(WriteProgress::Blocked);
        }

        let done = match &mut self.body {
            Body::Empty => true,
            Body::Owned(buf) => write_buffer(w, buf, &mut self.body_sent)?,
            Body::Static(buf) => write_buffer(w, *buf, &mut self.body_sent)?,
            Body::File { file, len } => stream_file(
                w,
                file,
                *len,
                &mut self.chunk,
                &mut self.chunk_sent,
                &mut self.body_sent,
            )?,
        };

        tracing::trace!(
            head = self.head_sent,
            body = self.body_sent,
            done,
            "wrote response bytes"
        );

        Ok(if done {
            WriteProgress::Done
        } else {
            WriteProgress::Blocked
        })
    }
}

fn write_buffer<W: Write>(w: &mut W, buf: &[u8], sent: &mut u64) -> io::Result<bool> {
    let mut offset = *sent as usize;
    let done = write_from(w, buf, &mut offset)?;
    *sent = offset as u64;
    Ok(done)
}

/// Streams `len` bytes of `file` through `chunk`, one bounded read at a time.
fn stream_file<W: Write>(
    w: &mut W,
    file: &mut std::fs::File,
    len: u64,
    chunk: &mut Vec<u8>,
    chunk_sent: &mut usize,
    sent: &mut u64,
) -> io::Result<bool> {
    loop {
        if *chunk_sent == chunk.len() {
            if *sent == len {
                return Ok(true);
            }
            let want = (len - *sent).min(FILE_CHUNK as u64) as usize;
            chunk.resize(want, 0);
            let n = loop {
                match file.read(chunk) {
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    other => break other?,
                }
            };
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "file body ended before its declared length",
                ));
            }
            chunk.truncate(n);
            *chunk_sent = 0;
        }

        let before = *chunk_sent;
        let flushed = write_from(w, chunk, chunk_sent)?;
        *sent += (*chunk_sent - before) as u64;
        if !flushed {
            return Ok(false);
        }
    }
}
