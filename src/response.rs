use crate::request::Header;

/// A fully materialized response produced by the handler
///
/// The serializer never mutates it; framing headers it needs to add are
/// written straight to the wire.
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    reason: String,
    headers: Vec<Header>,
    body: Vec<u8>,
}

impl Response {
    /// Build a response from all of its parts
    ///
    /// # Panics
    ///
    /// Debug builds panic on a status outside 100..=599.
    pub fn new(status: u16, reason: &str, headers: Vec<Header>, body: Vec<u8>) -> Response {
        debug_assert!((100..=599).contains(&status), "status {} out of range", status);
        Response {
            status,
            reason: reason.to_string(),
            headers,
            body,
        }
    }

    /// Status-and-reason response with no headers and an empty body
    pub fn empty(status: u16, reason: &str) -> Response {
        Response::new(status, reason, Vec::new(), Vec::new())
    }

    /// Append a header
    pub fn header(mut self, name: &str, value: &str) -> Response {
        self.headers.push(Header::new(name, value));
        self
    }

    /// Replace the body
    pub fn body(mut self, body: Vec<u8>) -> Response {
        self.body = body;
        self
    }

    /// Status code
    pub fn status(&self) -> u16 {
        self.status
    }
    /// Reason phrase
    pub fn reason(&self) -> &str {
        &self.reason
    }
    /// Headers in the order they will be written
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }
    /// Body bytes
    pub fn body_bytes(&self) -> &[u8] {
        &self.body
    }
}
