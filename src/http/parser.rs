//! Incremental HTTP/1.1 request parser.
//!
//! A [`ParseState`] owns a fixed-size byte buffer and a cursor into it. The
//! caller appends bytes as they arrive (see [`ParseState::fill_from`]) and
//! calls [`ParseState::advance`] until it returns [`Progress::Complete`].
//! Every call resumes exactly where the previous one stopped: consumed bytes
//! are never looked at again, and the request line and headers parsed so far
//! stay in the [`Request`] being built.
//!
//! ```text
//!   Init ──request line──▶ Headers ──empty line──▶ Body ──len bytes──▶ Complete
//! ```

use std::io::{self, Read};
use std::ops::Range;

use bytes::Bytes;
use memchr::{memchr, memmem};
use thiserror::Error;

use crate::http::request::{Method, Request};
use crate::http::response::StatusCode;

/// Capacity of the per-connection read buffer. A request line or header line
/// must fit in it.
pub const BUF_CAPACITY: usize = 4096;

/// A message carrying this many headers is rejected.
pub const MAX_HEADERS: usize = 64;

/// Largest accepted `content-length`.
pub const MAX_BODY_LEN: usize = 2 * 1024 * 1024;

const HTTP_VERSION: &[u8] = b"HTTP/1.1";

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid request method")]
    InvalidMethod,
    #[error("malformed request target")]
    InvalidUri,
    #[error("missing or unsupported http version")]
    InvalidVersion,
    #[error("malformed header line")]
    InvalidHeader,
    #[error("more than {} headers", MAX_HEADERS - 1)]
    TooManyHeaders,
    #[error("invalid content-length")]
    InvalidContentLength,
    #[error("declared body exceeds {} bytes", MAX_BODY_LEN)]
    BodyTooLarge,
    #[error("line does not fit in the {} byte parse buffer", BUF_CAPACITY)]
    LineTooLong,
    #[error("could not allocate request body")]
    OutOfMemory,
}

impl ParseError {
    /// Status used when answering a request that failed to parse.
    pub fn status(&self) -> StatusCode {
        match self {
            ParseError::OutOfMemory => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStep {
    Init,
    Headers,
    Body,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The request is fully parsed.
    Complete,
    /// The buffered bytes end mid-message; append more and call again.
    NeedData,
}

/// Resumable parser state for one connection.
pub struct ParseState {
    step: ParseStep,
    headers: usize,
    body_len: usize,
    buf: Box<[u8]>,
    /// End of valid data in `buf`.
    filled: usize,
    /// Read position; everything before it has been consumed.
    pos: usize,
    /// Bytes in `pos..scanned` are known not to contain a line terminator.
    scanned: usize,
}

impl Default for ParseState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ParseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParseState")
            .field("step", &self.step)
            .field("headers", &self.headers)
            .field("body_len", &self.body_len)
            .field("filled", &self.filled)
            .field("pos", &self.pos)
            .finish()
    }
}

impl ParseState {
    pub fn new() -> Self {
        Self {
            step: ParseStep::Init,
            headers: 0,
            body_len: 0,
            buf: vec![0; BUF_CAPACITY].into_boxed_slice(),
            filled: 0,
            pos: 0,
            scanned: 0,
        }
    }

    pub fn step(&self) -> ParseStep {
        self.step
    }

    pub fn header_count(&self) -> usize {
        self.headers
    }

    /// Bytes received but not yet consumed.
    pub fn buffered(&self) -> &[u8] {
        &self.buf[self.pos..self.filled]
    }

    /// True when no part of a message has been seen since the last reset.
    pub fn is_idle(&self) -> bool {
        self.step == ParseStep::Init && self.pos == self.filled
    }

    /// Prepares for the next message on the same connection.
    ///
    /// Bytes already buffered belong to the next pipelined message and are
    /// kept.
    pub fn reset(&mut self) {
        self.step = ParseStep::Init;
        self.headers = 0;
        self.body_len = 0;
    }

    /// Moves unconsumed bytes to the front of the buffer.
    pub fn compact(&mut self) {
        if self.pos == 0 {
            return;
        }
        self.buf.copy_within(self.pos..self.filled, 0);
        self.filled -= self.pos;
        self.scanned -= self.pos;
        self.pos = 0;
    }

    /// Compacts and then performs a single read into the free tail of the
    /// buffer. Errors, including would-block, are returned untouched.
    pub fn fill_from<R: Read>(&mut self, src: &mut R) -> io::Result<usize> {
        self.compact();
        if self.filled == self.buf.len() {
            return Err(io::Error::other("parse buffer is full"));
        }
        let n = src.read(&mut self.buf[self.filled..])?;
        self.filled += n;
        tracing::trace!(read = n, buffered = self.filled, "filled parse buffer");
        Ok(n)
    }

    /// Copies as much of `data` as fits, returning the number of bytes taken.
    pub fn feed(&mut self, data: &[u8]) -> usize {
        self.compact();
        let n = data.len().min(self.buf.len() - self.filled);
        self.buf[self.filled..self.filled + n].copy_from_slice(&data[..n]);
        self.filled += n;
        n
    }

    /// Runs the state machine over the buffered bytes.
    ///
    /// On error the connection's byte stream can no longer be trusted and the
    /// request must be discarded.
    pub fn advance(&mut self, req: &mut Request) -> Result<Progress, ParseError> {
        loop {
            match self.step {
                ParseStep::Init => {
                    let Some(line) = self.next_line()? else {
                        return Ok(Progress::NeedData);
                    };
                    parse_request_line(&self.buf[line], req)?;
                    self.step = ParseStep::Headers;
                }
                ParseStep::Headers => {
                    let Some(line) = self.next_line()? else {
                        return Ok(Progress::NeedData);
                    };
                    if line.is_empty() {
                        self.body_len = content_length(req)?;
                        if self.body_len > 0 {
                            let mut body = Vec::new();
                            body.try_reserve_exact(self.body_len)
                                .map_err(|_| ParseError::OutOfMemory)?;
                            req.body = Some(body);
                        }
                        self.step = ParseStep::Body;
                        continue;
                    }
                    self.headers += 1;
                    if self.headers >= MAX_HEADERS {
                        return Err(ParseError::TooManyHeaders);
                    }
                    let (key, value) = parse_header_line(&self.buf[line])?;
                    req.headers.append(key, value);
                }
                ParseStep::Body => {
                    if let Some(body) = req.body.as_mut() {
                        let take = (self.body_len - body.len()).min(self.filled - self.pos);
                        body.extend_from_slice(&self.buf[self.pos..self.pos + take]);
                        self.pos += take;
                        self.scanned = self.scanned.max(self.pos);
                        if body.len() < self.body_len {
                            return Ok(Progress::NeedData);
                        }
                    }
                    self.step = ParseStep::Complete;
                }
                ParseStep::Complete => return Ok(Progress::Complete),
            }
        }
    }

    /// Finds the next CRLF-terminated line and consumes it, returning the
    /// line's range without the terminator.
    fn next_line(&mut self) -> Result<Option<Range<usize>>, ParseError> {
        let start = self.scanned.max(self.pos);
        if let Some(i) = memmem::find(&self.buf[start..self.filled], b"\r\n") {
            let end = start + i;
            let line = self.pos..end;
            self.pos = end + 2;
            self.scanned = self.pos;
            return Ok(Some(line));
        }
        if self.filled - self.pos >= self.buf.len() {
            return Err(ParseError::LineTooLong);
        }
        // A trailing '\r' may be completed by the next read.
        self.scanned = self.filled.saturating_sub(1).max(self.pos);
        Ok(None)
    }
}

fn parse_request_line(line: &[u8], req: &mut Request) -> Result<(), ParseError> {
    let sp = memchr(b' ', line).ok_or(ParseError::InvalidMethod)?;
    req.method = Method::from_bytes(&line[..sp]).ok_or(ParseError::InvalidMethod)?;

    let rest = &line[sp + 1..];
    let sp = memchr(b' ', rest).ok_or(ParseError::InvalidVersion)?;
    let (target, version) = (&rest[..sp], &rest[sp + 1..]);
    if version != HTTP_VERSION {
        return Err(ParseError::InvalidVersion);
    }
    if target.is_empty() {
        return Err(ParseError::InvalidUri);
    }

    let (path, query) = match memchr(b'?', target) {
        Some(q) => (&target[..q], Some(&target[q + 1..])),
        None => (target, None),
    };
    req.uri = Bytes::from(decode_uri(path)?);
    req.query = query
        .map(|q| std::str::from_utf8(q).map(str::to_owned))
        .transpose()
        .map_err(|_| ParseError::InvalidUri)?;
    Ok(())
}

/// Splits a header line into its name and its value. The name must be a
/// token; the value is kept as raw bytes.
fn parse_header_line(line: &[u8]) -> Result<(String, Bytes), ParseError> {
    let colon = memchr(b':', line).ok_or(ParseError::InvalidHeader)?;
    let key = &line[..colon];
    if key.is_empty() || !key.iter().all(u8::is_ascii_graphic) {
        return Err(ParseError::InvalidHeader);
    }
    let key = key.iter().map(|&b| char::from(b)).collect();
    let value = trim_ows(&line[colon + 1..]);
    Ok((key, Bytes::copy_from_slice(value)))
}

fn trim_ows(mut value: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', rest @ ..] = value {
        value = rest;
    }
    while let [rest @ .., b' ' | b'\t'] = value {
        value = rest;
    }
    value
}

fn content_length(req: &Request) -> Result<usize, ParseError> {
    let Some(value) = req.header_bytes("content-length") else {
        return Ok(0);
    };
    if value.is_empty() || !value.iter().all(u8::is_ascii_digit) {
        return Err(ParseError::InvalidContentLength);
    }
    let len = value.iter().try_fold(0usize, |acc, &d| {
        acc.checked_mul(10)?.checked_add(usize::from(d - b'0'))
    });
    // Only digits remain, so `None` means overflow.
    match len {
        Some(len) if len <= MAX_BODY_LEN => Ok(len),
        _ => Err(ParseError::BodyTooLarge),
    }
}

/// Decodes `%XX` escapes and `+` in a request path.
///
/// A `%` followed by fewer than two bytes, or by a non-hex digit, is an
/// error.
///
/// # Example
///
/// ```
/// # use lantern::http::parser::decode_uri;
/// assert_eq!(decode_uri(b"/a%20b+c").unwrap(), b"/a b c");
/// assert!(decode_uri(b"/bad%2").is_err());
/// ```
pub fn decode_uri(input: &[u8]) -> Result<Vec<u8>, ParseError> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        match input[i] {
            b'+' => out.push(b' '),
            b'%' => {
                let (Some(&hi), Some(&lo)) = (input.get(i + 1), input.get(i + 2)) else {
                    return Err(ParseError::InvalidUri);
                };
                let (Some(hi), Some(lo)) = (hex_value(hi), hex_value(lo)) else {
                    return Err(ParseError::InvalidUri);
                };
                out.push((hi << 4) | lo);
                i += 2;
            }
            b => out.push(b),
        }
        i += 1;
    }
    Ok(out)
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
