use std::borrow::Cow;

use bytes::Bytes;

/// A single header line.
///
/// Keys parsed off the wire are owned; keys set by a handler are usually
/// `&'static str` literals and stay borrowed. Values are raw bytes: HTTP
/// allows any octet other than CR and LF in them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub key: Cow<'static, str>,
    pub value: Bytes,
}

impl Header {
    /// The value as text, or `None` when it is not valid UTF-8.
    pub fn value_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }
}

/// Ordered list of headers attached to a request or a response.
///
/// Duplicate keys are kept. Iteration and lookup walk the list from the most
/// recently added header to the oldest, so `get` returns the latest value
/// for a key. Keys are compared ASCII case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList {
    // Stored in arrival order, read back to front.
    entries: Vec<Header>,
}

impl HeaderList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header without touching existing entries with the same key.
    pub fn append(&mut self, key: impl Into<Cow<'static, str>>, value: impl Into<Bytes>) {
        self.entries.push(Header {
            key: key.into(),
            value: value.into(),
        });
    }

    fn find(&self, key: &str) -> Option<&Header> {
        self.iter().find(|h| h.key.eq_ignore_ascii_case(key))
    }

    /// Returns the value of the most recently added header named `key`, if
    /// that value is valid UTF-8. Use [`HeaderList::get_bytes`] for the raw
    /// value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.find(key).and_then(Header::value_str)
    }

    /// Returns the raw value of the most recently added header named `key`.
    pub fn get_bytes(&self, key: &str) -> Option<&[u8]> {
        self.find(key).map(|h| &h.value[..])
    }

    /// Returns every raw value stored under `key`, newest first.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a [u8]> + 'a {
        self.iter()
            .filter(move |h| h.key.eq_ignore_ascii_case(key))
            .map(|h| &h.value[..])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.find(key).is_some()
    }

    /// Removes every header named `key`, returning how many were dropped.
    pub fn remove(&mut self, key: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|h| !h.key.eq_ignore_ascii_case(key));
        before - self.entries.len()
    }

    /// Iterates newest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Header> {
        self.entries.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
