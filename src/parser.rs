//! Incremental HTTP/1.x request parser
//!
//! A resumable state machine over the connection's read buffer. It can be
//! fed any prefix of the byte stream any number of times; it only yields
//! fully materialized requests, and it releases each request's bytes from
//! the buffer at the moment it yields.

use std::mem;

use httparse;

use crate::error::Error;
use crate::request::{Header, Request};
use crate::tokenizer::{ByteTokenizer, Scan};
use crate::version::Version;

/// A hard limit on the number of headers, trailers included
const MAX_HEADERS: usize = 128;

const CRLF: &[u8] = b"\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    RequestLine,
    Headers,
    FixedBody(usize),
    ChunkSize,
    ChunkData(usize),
    Trailers,
}

/// Parser state plus the partially accumulated request
///
/// One instance lives per connection and is reused across pipelined
/// requests.
pub struct RequestParser {
    state: State,
    method: String,
    uri: String,
    version: Version,
    headers: Vec<Header>,
    body: Vec<u8>,
    content_length: Option<u64>,
    chunked: bool,
    close_requested: bool,
    keep_alive_requested: bool,
    expect_continue: bool,
}

impl RequestParser {
    /// Fresh parser positioned at a request line
    pub fn new() -> RequestParser {
        RequestParser {
            state: State::RequestLine,
            method: String::new(),
            uri: String::new(),
            version: Version::Http11,
            headers: Vec::new(),
            body: Vec::new(),
            content_length: None,
            chunked: false,
            close_requested: false,
            keep_alive_requested: false,
            expect_continue: false,
        }
    }

    /// Advance over whatever is buffered
    ///
    /// `Ok(Some(..))` yields one complete request and resets the parser for
    /// the next pipelined one; `Ok(None)` means more bytes are needed. Any
    /// error is fatal to the connection.
    pub fn parse(&mut self, tok: &mut ByteTokenizer) -> Result<Option<Request>, Error> {
        loop {
            match self.state {
                State::RequestLine => match tok.consume_until(CRLF) {
                    Scan::Complete(line) => {
                        self.parse_request_line(line)?;
                        self.state = State::Headers;
                    }
                    Scan::Partial => return Ok(None),
                    Scan::Overflow => return Err(Error::RequestTooLong),
                },
                State::Headers => match tok.consume_until(CRLF) {
                    Scan::Complete(line) if line.is_empty() => {
                        self.state = self.body_state()?;
                        if self.state == State::RequestLine {
                            // no body to read
                            return Ok(Some(self.finish(tok)));
                        }
                    }
                    Scan::Complete(line) => {
                        if self.headers.len() >= MAX_HEADERS {
                            return Err(Error::TooManyHeaders);
                        }
                        let header = parse_header_line(line)?;
                        self.scan_header(&header)?;
                        self.headers.push(header);
                    }
                    Scan::Partial => return Ok(None),
                    Scan::Overflow => return Err(Error::RequestTooLong),
                },
                State::FixedBody(n) => match tok.consume(n) {
                    Some(data) => {
                        self.body.extend_from_slice(data);
                        return Ok(Some(self.finish(tok)));
                    }
                    None => return Ok(None),
                },
                State::ChunkSize => match httparse::parse_chunk_size(tok.window()) {
                    Ok(httparse::Status::Complete((consumed, size))) => {
                        tok.consume(consumed);
                        if size == 0 {
                            self.state = State::Trailers;
                        } else {
                            let size =
                                usize::try_from(size).map_err(|_| Error::BadChunkSize)?;
                            self.state = State::ChunkData(size);
                        }
                    }
                    Ok(httparse::Status::Partial) => {
                        if tok.at_capacity() {
                            return Err(Error::RequestTooLong);
                        }
                        return Ok(None);
                    }
                    Err(_) => return Err(Error::BadChunkSize),
                },
                State::ChunkData(n) => {
                    let need = n.checked_add(2).ok_or(Error::RequestTooLong)?;
                    match tok.consume(need) {
                        Some(data) => {
                            if &data[n..] != CRLF {
                                return Err(Error::MissingChunkBoundary);
                            }
                            self.body.extend_from_slice(&data[..n]);
                            self.state = State::ChunkSize;
                        }
                        None => return Ok(None),
                    }
                }
                State::Trailers => match tok.consume_until(CRLF) {
                    Scan::Complete(line) if line.is_empty() => {
                        return Ok(Some(self.finish(tok)));
                    }
                    Scan::Complete(line) => {
                        if self.headers.len() >= MAX_HEADERS {
                            return Err(Error::TooManyHeaders);
                        }
                        let header = parse_header_line(line)?;
                        self.headers.push(header);
                    }
                    Scan::Partial => return Ok(None),
                    Scan::Overflow => return Err(Error::RequestTooLong),
                },
            }
        }
    }

    /// Take the latched `Expect: 100-continue` flag
    ///
    /// Set when a request head carrying the expectation completes; the
    /// connection drains it once and writes the interim response.
    pub fn take_expect_continue(&mut self) -> bool {
        mem::replace(&mut self.expect_continue, false)
    }

    fn parse_request_line(&mut self, line: &[u8]) -> Result<(), Error> {
        if line.iter().any(|&b| b < 0x20 || b == 0x7f) {
            return Err(Error::BadRequestLine);
        }
        let mut tokens = line.split(|&b| b == b' ');
        let method = tokens.next().unwrap_or(b"");
        let uri = tokens.next().unwrap_or(b"");
        let version = tokens.next().unwrap_or(b"");
        // a fourth token also catches doubled spaces (empty middle token)
        if tokens.next().is_some() || method.is_empty() || uri.is_empty() {
            return Err(Error::BadRequestLine);
        }
        self.version = Version::from_token(version).ok_or(Error::BadVersion)?;
        self.method =
            String::from_utf8(method.to_vec()).map_err(|_| Error::BadRequestLine)?;
        self.uri = String::from_utf8(uri.to_vec()).map_err(|_| Error::BadRequestLine)?;
        Ok(())
    }

    /// Implements the body length decision for requests:
    /// a valid `Transfer-Encoding` header with `chunked` as the last
    /// encoding wins, else a `Content-Length` header gives a fixed size,
    /// else there is no body. Carrying both framings at once is rejected
    /// outright.
    fn body_state(&self) -> Result<State, Error> {
        if self.chunked {
            if self.content_length.is_some() {
                return Err(Error::DuplicateFraming);
            }
            return Ok(State::ChunkSize);
        }
        match self.content_length {
            Some(0) | None => Ok(State::RequestLine),
            Some(n) => {
                let n = usize::try_from(n).map_err(|_| Error::BadContentLength)?;
                Ok(State::FixedBody(n))
            }
        }
    }

    fn scan_header(&mut self, header: &Header) -> Result<(), Error> {
        if header.is("Content-Length") {
            if self.content_length.is_some() {
                return Err(Error::DuplicateContentLength);
            }
            if header.value.is_empty() || !header.value.bytes().all(|b| b.is_ascii_digit()) {
                return Err(Error::BadContentLength);
            }
            let len = header
                .value
                .parse::<u64>()
                .map_err(|_| Error::BadContentLength)?;
            self.content_length = Some(len);
        } else if header.is("Transfer-Encoding") {
            if let Some(enc) = header.value.split(',').last() {
                if enc.trim().eq_ignore_ascii_case("chunked") {
                    self.chunked = true;
                }
            }
        } else if header.is("Connection") {
            for token in header.value.split(',') {
                let token = token.trim();
                if token.eq_ignore_ascii_case("close") {
                    self.close_requested = true;
                } else if token.eq_ignore_ascii_case("keep-alive") {
                    self.keep_alive_requested = true;
                }
            }
        } else if header.is("Expect") {
            if header.value.eq_ignore_ascii_case("100-continue") {
                self.expect_continue = true;
            }
        }
        Ok(())
    }

    /// Hand out the finished request and reset for the next one
    ///
    /// The compact releases the request's bytes from the read buffer at the
    /// same moment the request becomes visible.
    fn finish(&mut self, tok: &mut ByteTokenizer) -> Request {
        let keep_alive = match self.version {
            Version::Http11 => !self.close_requested,
            Version::Http10 => self.keep_alive_requested && !self.close_requested,
        };
        tok.compact();
        let request = Request::new(
            mem::take(&mut self.method),
            mem::take(&mut self.uri),
            self.version,
            mem::take(&mut self.headers),
            mem::take(&mut self.body),
            keep_alive,
        );
        self.state = State::RequestLine;
        self.content_length = None;
        self.chunked = false;
        self.close_requested = false;
        self.keep_alive_requested = false;
        request
    }
}

impl Default for RequestParser {
    fn default() -> RequestParser {
        RequestParser::new()
    }
}

fn parse_header_line(line: &[u8]) -> Result<Header, Error> {
    let colon = line
        .iter()
        .position(|&b| b == b':')
        .ok_or(Error::BadHeader)?;
    let name = &line[..colon];
    if name.is_empty() || name.iter().any(|&b| b <= 0x20 || b == 0x7f) {
        return Err(Error::BadHeader);
    }
    let value = trim_ows(&line[colon + 1..]);
    if value
        .iter()
        .any(|&b| (b < 0x20 && b != b'\t') || b == 0x7f)
    {
        return Err(Error::BadHeader);
    }
    let name = String::from_utf8(name.to_vec()).map_err(|_| Error::BadHeader)?;
    let value = String::from_utf8(value.to_vec()).map_err(|_| Error::BadHeader)?;
    Ok(Header { name, value })
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

#[cfg(test)]
mod test {
    use super::RequestParser;
    use crate::error::Error;
    use crate::tokenizer::ByteTokenizer;
    use crate::version::Version;

    #[test]
    fn bare_get() {
        let mut tok = ByteTokenizer::new(1024);
        let mut parser = RequestParser::new();
        tok.append(b"GET /index HTTP/1.1\r\nHost: a\r\n\r\n").unwrap();
        let req = parser.parse(&mut tok).unwrap().unwrap();
        assert_eq!(req.method(), "GET");
        assert_eq!(req.uri(), "/index");
        assert_eq!(req.version(), Version::Http11);
        assert_eq!(req.header("host"), Some("a"));
        assert!(req.body().is_empty());
        assert!(req.keep_alive());
        assert!(tok.is_empty());
    }

    #[test]
    fn fixed_body() {
        let mut tok = ByteTokenizer::new(1024);
        let mut parser = RequestParser::new();
        tok.append(b"POST /u HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello")
            .unwrap();
        let req = parser.parse(&mut tok).unwrap().unwrap();
        assert_eq!(req.body(), b"hello");
    }

    #[test]
    fn split_at_every_boundary_yields_same_request() {
        let raw = b"PUT /x HTTP/1.1\r\nContent-Length: 3\r\nA: b\r\n\r\nxyz";
        for cut in 0..raw.len() {
            let mut tok = ByteTokenizer::new(1024);
            let mut parser = RequestParser::new();
            tok.append(&raw[..cut]).unwrap();
            assert!(parser.parse(&mut tok).unwrap().is_none());
            tok.append(&raw[cut..]).unwrap();
            let req = parser.parse(&mut tok).unwrap().unwrap();
            assert_eq!(req.method(), "PUT");
            assert_eq!(req.body(), b"xyz");
            assert_eq!(req.header("a"), Some("b"));
        }
    }

    #[test]
    fn chunked_body() {
        let mut tok = ByteTokenizer::new(1024);
        let mut parser = RequestParser::new();
        tok.append(
            b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n\
              5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n",
        )
        .unwrap();
        let req = parser.parse(&mut tok).unwrap().unwrap();
        assert_eq!(req.body(), b"hello world");
        assert!(tok.is_empty());
    }

    #[test]
    fn chunked_trailers_append_to_headers() {
        let mut tok = ByteTokenizer::new(1024);
        let mut parser = RequestParser::new();
        tok.append(
            b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n\
              3\r\nabc\r\n0\r\nX-Sum: 1\r\n\r\n",
        )
        .unwrap();
        let req = parser.parse(&mut tok).unwrap().unwrap();
        assert_eq!(req.body(), b"abc");
        assert_eq!(req.header("x-sum"), Some("1"));
    }

    #[test]
    fn keep_alive_rules() {
        let cases: [(&[u8], bool); 4] = [
            (b"GET / HTTP/1.1\r\n\r\n", true),
            (b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n", false),
            (b"GET / HTTP/1.0\r\n\r\n", false),
            (b"GET / HTTP/1.0\r\nConnection: keep-alive\r\n\r\n", true),
        ];
        for (raw, expected) in cases {
            let mut tok = ByteTokenizer::new(1024);
            let mut parser = RequestParser::new();
            tok.append(raw).unwrap();
            let req = parser.parse(&mut tok).unwrap().unwrap();
            assert_eq!(req.keep_alive(), expected, "case {:?}", raw);
        }
    }

    #[test]
    fn expect_continue_latched_at_head() {
        let mut tok = ByteTokenizer::new(1024);
        let mut parser = RequestParser::new();
        tok.append(b"POST / HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 2\r\n\r\n")
            .unwrap();
        assert!(parser.parse(&mut tok).unwrap().is_none());
        assert!(parser.take_expect_continue());
        assert!(!parser.take_expect_continue());
        tok.append(b"ok").unwrap();
        let req = parser.parse(&mut tok).unwrap().unwrap();
        assert_eq!(req.body(), b"ok");
    }

    #[test]
    fn rejects_malformed_request_lines() {
        let bad: [&[u8]; 5] = [
            b"GET /\r\n\r\n",
            b"GET  / HTTP/1.1\r\n\r\n",
            b"GET / HTTP/1.1 extra\r\n\r\n",
            b"GET / HTTP/2.0\r\n\r\n",
            b" / HTTP/1.1\r\n\r\n",
        ];
        for raw in bad {
            let mut tok = ByteTokenizer::new(1024);
            let mut parser = RequestParser::new();
            tok.append(raw).unwrap();
            assert!(parser.parse(&mut tok).is_err(), "accepted {:?}", raw);
        }
    }

    #[test]
    fn rejects_conflicting_framing() {
        let mut tok = ByteTokenizer::new(1024);
        let mut parser = RequestParser::new();
        tok.append(
            b"POST / HTTP/1.1\r\nContent-Length: 3\r\n\
              Transfer-Encoding: chunked\r\n\r\n",
        )
        .unwrap();
        assert!(matches!(
            parser.parse(&mut tok),
            Err(Error::DuplicateFraming)
        ));
    }

    #[test]
    fn rejects_duplicate_content_length() {
        let mut tok = ByteTokenizer::new(1024);
        let mut parser = RequestParser::new();
        tok.append(b"POST / HTTP/1.1\r\nContent-Length: 3\r\nContent-Length: 3\r\n\r\n")
            .unwrap();
        assert!(matches!(
            parser.parse(&mut tok),
            Err(Error::DuplicateContentLength)
        ));
    }

    #[test]
    fn rejects_missing_chunk_boundary() {
        let mut tok = ByteTokenizer::new(1024);
        let mut parser = RequestParser::new();
        tok.append(
            b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabcXX",
        )
        .unwrap();
        assert!(matches!(
            parser.parse(&mut tok),
            Err(Error::MissingChunkBoundary)
        ));
    }

    #[test]
    fn pipelined_stream_yields_requests_in_order() {
        let mut tok = ByteTokenizer::new(1024);
        let mut parser = RequestParser::new();
        tok.append(
            b"GET /1 HTTP/1.1\r\n\r\nGET /2 HTTP/1.1\r\n\r\nGET /3 HTTP/1.1\r\n\r\n",
        )
        .unwrap();
        let mut uris = Vec::new();
        while let Some(req) = parser.parse(&mut tok).unwrap() {
            uris.push(req.uri().to_string());
        }
        assert_eq!(uris, ["/1", "/2", "/3"]);
        assert!(tok.is_empty());
    }
}
