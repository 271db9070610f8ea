use crate::version::Version;

/// A single HTTP header
///
/// Name comparison is case-insensitive everywhere in this crate; the
/// original spelling is preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Header name as it appeared on the wire
    pub name: String,
    /// Header value with optional whitespace trimmed
    pub value: String,
}

impl Header {
    /// Build a header from name and value
    pub fn new(name: &str, value: &str) -> Header {
        Header {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    /// Case-insensitive name check
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// A fully materialized request as handed to the handler
///
/// Immutable once constructed; the parser copies everything out of its
/// buffers before yielding it.
#[derive(Debug)]
pub struct Request {
    method: String,
    uri: String,
    version: Version,
    headers: Vec<Header>,
    body: Vec<u8>,
    keep_alive: bool,
}

impl Request {
    pub(crate) fn new(
        method: String,
        uri: String,
        version: Version,
        headers: Vec<Header>,
        body: Vec<u8>,
        keep_alive: bool,
    ) -> Request {
        Request {
            method,
            uri,
            version,
            headers,
            body,
            keep_alive,
        }
    }

    /// Returns method of a request
    pub fn method(&self) -> &str {
        &self.method
    }
    /// Returns the request target, verbatim as received
    pub fn uri(&self) -> &str {
        &self.uri
    }
    /// Returns HTTP version used in request
    pub fn version(&self) -> Version {
        self.version
    }
    /// Returns request headers in wire order, trailers appended
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }
    /// Returns request body
    pub fn body(&self) -> &[u8] {
        &self.body
    }
    /// Whether the connection stays open after the response
    ///
    /// HTTP/1.1 unless `Connection: close`; HTTP/1.0 only with
    /// `Connection: keep-alive`.
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// First header value with the given name, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.is(name))
            .map(|h| h.value.as_str())
    }

    /// Whether any header with `name` carries `token` in its
    /// comma-separated value list, case-insensitive
    pub fn has_header_value(&self, name: &str, token: &str) -> bool {
        self.headers.iter().filter(|h| h.is(name)).any(|h| {
            h.value
                .split(',')
                .any(|t| t.trim().eq_ignore_ascii_case(token))
        })
    }
}
