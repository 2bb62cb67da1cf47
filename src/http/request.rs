use std::fmt;

use bytes::Bytes;

use crate::http::headers::HeaderList;

/// HTTP request methods.
///
/// The set is closed: any other token on the request line is rejected by the
/// parser and never reaches a handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Method {
    /// CONNECT - Establish a tunnel
    CONNECT,
    /// DELETE - Delete a resource
    DELETE,
    /// GET - Retrieve a resource
    #[default]
    GET,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// OPTIONS - Describe communication options
    OPTIONS,
    /// PATCH - Partial modification of a resource
    PATCH,
    /// POST - Create or submit data
    POST,
    /// PUT - Replace a resource
    PUT,
    /// TRACE - Loop-back test
    TRACE,
}

impl Method {
    /// Every supported method, in declaration order.
    pub const ALL: [Method; 9] = [
        Method::CONNECT,
        Method::DELETE,
        Method::GET,
        Method::HEAD,
        Method::OPTIONS,
        Method::PATCH,
        Method::POST,
        Method::PUT,
        Method::TRACE,
    ];

    /// Parses an HTTP method token.
    ///
    /// Matching is case-sensitive, as the request line grammar requires.
    ///
    /// # Example
    ///
    /// ```
    /// # use lantern::http::request::Method;
    /// assert_eq!(Method::from_bytes(b"GET"), Some(Method::GET));
    /// assert_eq!(Method::from_bytes(b"get"), None);
    /// ```
    pub fn from_bytes(token: &[u8]) -> Option<Self> {
        match token {
            b"CONNECT" => Some(Method::CONNECT),
            b"DELETE" => Some(Method::DELETE),
            b"GET" => Some(Method::GET),
            b"HEAD" => Some(Method::HEAD),
            b"OPTIONS" => Some(Method::OPTIONS),
            b"PATCH" => Some(Method::PATCH),
            b"POST" => Some(Method::POST),
            b"PUT" => Some(Method::PUT),
            b"TRACE" => Some(Method::TRACE),
            _ => None,
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::from_bytes(s.as_bytes())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::CONNECT => "CONNECT",
            Method::DELETE => "DELETE",
            Method::GET => "GET",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::TRACE => "TRACE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed HTTP request.
///
/// Built up incrementally by the parser while bytes arrive on a connection,
/// handed to the handler by shared reference once complete, and dropped
/// after the response has been queued.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    /// The HTTP method (GET, POST, etc.)
    pub method: Method,
    /// Percent- and `+`-decoded request path (e.g. "/index.html"). Escapes
    /// may decode to any byte, so this is not necessarily UTF-8.
    pub uri: Bytes,
    /// Raw query string without the leading `?`, not decoded
    pub query: Option<String>,
    /// Request headers, newest first
    pub headers: HeaderList,
    /// Request body, present only when a non-zero `content-length` was sent
    pub body: Option<Vec<u8>>,
}

/// Builder for constructing Request objects, mostly useful for exercising
/// handlers without a socket.
#[derive(Debug, Default)]
pub struct RequestBuilder {
    method: Option<Method>,
    uri: Option<String>,
    query: Option<String>,
    headers: HeaderList,
    body: Option<Vec<u8>>,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let value: String = value.into();
        self.headers.append(key.into(), value);
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn build(self) -> Result<Request, &'static str> {
        Ok(Request {
            method: self.method.ok_or("method missing")?,
            uri: Bytes::from(self.uri.ok_or("uri missing")?),
            query: self.query,
            headers: self.headers,
            body: self.body,
        })
    }
}

impl Request {
    /// Retrieves a header value by name, case-insensitively.
    ///
    /// When the header was sent more than once the last occurrence wins.
    /// A value that is not valid UTF-8 is only reachable through
    /// [`Request::header_bytes`].
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)
    }

    pub fn header_bytes(&self, key: &str) -> Option<&[u8]> {
        self.headers.get_bytes(key)
    }

    /// The decoded path as text, or `None` when it is not valid UTF-8.
    pub fn uri_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.uri).ok()
    }

    /// The body bytes, or an empty slice when no body was sent.
    pub fn body(&self) -> &[u8] {
        self.body.as_deref().unwrap_or_default()
    }

    pub fn body_len(&self) -> usize {
        self.body.as_ref().map_or(0, Vec::len)
    }
}
