use std::borrow::Cow;
use std::fmt;
use std::fs::File;

use bytes::Bytes;

use crate::http::headers::HeaderList;

/// An HTTP status code.
///
/// Any `u16` can be stored, but only codes with a registered reason phrase
/// can be written to the wire; see [`StatusCode::reason_phrase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(u16);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(200);
    pub const NO_CONTENT: StatusCode = StatusCode(204);
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    pub const METHOD_NOT_ALLOWED: StatusCode = StatusCode(405);
    pub const INTERNAL_SERVER_ERROR: StatusCode = StatusCode(500);

    pub const fn new(code: u16) -> Self {
        StatusCode(code)
    }

    /// Maps a handler's return value to a status.
    ///
    /// Negative values signal a handler failure and become 500. Values that
    /// do not fit in a `u16` are kept as 0, which has no reason phrase and
    /// is refused by the writer.
    pub fn from_handler(ret: i32) -> Self {
        if ret < 0 {
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
        StatusCode(u16::try_from(ret).unwrap_or(0))
    }

    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use lantern::http::response::StatusCode;
    /// assert_eq!(StatusCode::OK.as_u16(), 200);
    /// assert_eq!(StatusCode::NOT_FOUND.as_u16(), 404);
    /// ```
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Returns the IANA reason phrase, or `None` for unregistered codes.
    ///
    /// # Example
    ///
    /// ```
    /// # use lantern::http::response::StatusCode;
    /// assert_eq!(StatusCode::OK.reason_phrase(), Some("OK"));
    /// assert_eq!(StatusCode::new(299).reason_phrase(), None);
    /// ```
    pub fn reason_phrase(&self) -> Option<&'static str> {
        let phrase = match self.0 {
            100 => "Continue",
            101 => "Switching Protocols",
            102 => "Processing",
            103 => "Early Hints",
            200 => "OK",
            201 => "Created",
            202 => "Accepted",
            203 => "Non-Authoritative Information",
            204 => "No Content",
            205 => "Reset Content",
            206 => "Partial Content",
            207 => "Multi-Status",
            208 => "Already Reported",
            226 => "IM Used",
            300 => "Multiple Choices",
            301 => "Moved Permanently",
            302 => "Found",
            303 => "See Other",
            304 => "Not Modified",
            305 => "Use Proxy",
            307 => "Temporary Redirect",
            308 => "Permanent Redirect",
            400 => "Bad Request",
            401 => "Unauthorized",
            402 => "Payment Required",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            406 => "Not Acceptable",
            407 => "Proxy Authentication Required",
            408 => "Request Timeout",
            409 => "Conflict",
            410 => "Gone",
            411 => "Length Required",
            412 => "Precondition Failed",
            413 => "Content Too Large",
            414 => "URI Too Long",
            415 => "Unsupported Media Type",
            416 => "Range Not Satisfiable",
            417 => "Expectation Failed",
            421 => "Misdirected Request",
            422 => "Unprocessable Content",
            423 => "Locked",
            424 => "Failed Dependency",
            425 => "Too Early",
            426 => "Upgrade Required",
            428 => "Precondition Required",
            429 => "Too Many Requests",
            431 => "Request Header Fields Too Large",
            451 => "Unavailable For Legal Reasons",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            504 => "Gateway Timeout",
            505 => "HTTP Version Not Supported",
            506 => "Variant Also Negotiates",
            507 => "Insufficient Storage",
            508 => "Loop Detected",
            510 => "Not Extended",
            511 => "Network Authentication Required",
            _ => return None,
        };
        Some(phrase)
    }
}

impl From<u16> for StatusCode {
    fn from(code: u16) -> Self {
        StatusCode(code)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The body of a response.
///
/// Dropping a body releases whatever it holds: owned buffers are freed,
/// static buffers are left alone and files are closed.
#[derive(Debug, Default)]
pub enum Body {
    #[default]
    Empty,
    Owned(Vec<u8>),
    Static(&'static [u8]),
    /// An open file streamed to the peer, `len` bytes from its current
    /// position.
    File { file: File, len: u64 },
}

impl Body {
    /// Exact number of bytes that will follow the head on the wire.
    pub fn len(&self) -> u64 {
        match self {
            Body::Empty => 0,
            Body::Owned(buf) => buf.len() as u64,
            Body::Static(buf) => buf.len() as u64,
            Body::File { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<u8>> for Body {
    fn from(buf: Vec<u8>) -> Self {
        Body::Owned(buf)
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Owned(s.into_bytes())
    }
}

impl From<&'static [u8]> for Body {
    fn from(buf: &'static [u8]) -> Self {
        Body::Static(buf)
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Body::Static(s.as_bytes())
    }
}

/// An HTTP response under construction.
///
/// A handler receives an empty response, adds headers and at most one body,
/// and reports the status through its return value.
#[derive(Debug)]
pub struct Response {
    /// The HTTP status code
    pub status: StatusCode,
    /// User headers, written after the synthesized ones
    pub headers: HeaderList,
    /// Response body
    pub body: Body,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderList::new(),
            body: Body::Empty,
        }
    }

    /// Creates an empty response carrying only a status, as used for
    /// protocol errors answered before any handler runs.
    pub fn with_status(status: StatusCode) -> Self {
        Self {
            status,
            ..Self::new()
        }
    }

    /// Adds a header. Keys are typically string literals; values may be
    /// `&'static str`, `String`, `Vec<u8>` or `Bytes`.
    ///
    /// # Example
    ///
    /// ```
    /// # use lantern::http::response::Response;
    /// let mut res = Response::new();
    /// res.header("content-type", "text/plain")
    ///     .header("cache-control", "no-cache");
    /// assert_eq!(res.headers.get("Content-Type"), Some("text/plain"));
    /// ```
    pub fn header(
        &mut self,
        key: impl Into<Cow<'static, str>>,
        value: impl Into<Bytes>,
    ) -> &mut Self {
        self.headers.append(key, value);
        self
    }

    /// Sets an owned body, freed once it has been sent.
    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) -> &mut Self {
        self.body = Body::Owned(body.into());
        self
    }

    /// Sets a body borrowed for the life of the program.
    pub fn set_body_static(&mut self, body: &'static [u8]) -> &mut Self {
        self.body = Body::Static(body);
        self
    }

    /// Streams `len` bytes of `file` as the body. The file is closed after
    /// the response is written, whether or not the write succeeded.
    pub fn set_body_file(&mut self, file: File, len: u64) -> &mut Self {
        self.body = Body::File { file, len };
        self
    }
}
