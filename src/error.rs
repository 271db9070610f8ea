use std::io;

use quick_error::quick_error;

quick_error! {
    /// Fatal connection error
    ///
    /// Any of these closes the connection it occurred on. None of them is
    /// allowed to take down the event loop that owns the connection.
    #[derive(Debug)]
    pub enum Error {
        /// Socket IO error
        Io(err: io::Error) {
            display("I/O error: {}", err)
            from()
        }
        /// Malformed request line (token count, empty token, control chars)
        BadRequestLine {
            display("malformed request line")
        }
        /// Version is not HTTP/1.0 or HTTP/1.1
        BadVersion {
            display("unsupported HTTP version")
        }
        /// Malformed header line
        BadHeader {
            display("malformed header line")
        }
        /// Header count exceeds the cap
        TooManyHeaders {
            display("too many headers")
        }
        /// Content-Length header is invalid (non-integer, or > 64bit)
        BadContentLength {
            display("invalid content-length header")
        }
        /// Duplicate Content-Length header, prohibited due to security
        DuplicateContentLength {
            display("duplicate content-length header")
        }
        /// Both Content-Length and chunked transfer encoding present
        DuplicateFraming {
            display("content-length and chunked framing are mutually exclusive")
        }
        /// Chunk size line is not valid hex
        BadChunkSize {
            display("invalid chunk size")
        }
        /// Chunk data is not followed by CRLF
        MissingChunkBoundary {
            display("missing CRLF after chunk data")
        }
        /// Request bytes exceed the configured maximum
        RequestTooLong {
            display("request exceeds configured size limit")
        }
        /// Peer closed the connection mid-request
        ConnectionReset {
            display("connection reset")
        }
    }
}
