//! On-wire rendering of responses into a connection write buffer

use std::io::Write;

use netbuf::Buf;

use crate::response::Response;

/// Serialize one response as a contiguous byte run
///
/// The status line is always `HTTP/1.1`; close semantics are carried by the
/// `Connection` header, not the version. Exactly two headers may be added
/// when absent: `Content-Length` (unless the response asked for chunked
/// framing) and `Connection: close` when `close` is set. Everything the
/// caller supplied is written verbatim, in order.
pub(crate) fn serialize(response: &Response, close: bool, buf: &mut Buf) {
    write!(buf, "HTTP/1.1 {} {}\r\n", response.status(), response.reason()).unwrap();
    let mut has_length = false;
    let mut has_connection = false;
    let mut chunked = false;
    for header in response.headers() {
        if header.is("Content-Length") {
            has_length = true;
        } else if header.is("Connection") {
            has_connection = true;
        } else if header.is("Transfer-Encoding") {
            chunked = header
                .value
                .split(',')
                .last()
                .map_or(false, |t| t.trim().eq_ignore_ascii_case("chunked"));
        }
        write!(buf, "{}: {}\r\n", header.name, header.value).unwrap();
    }
    if !has_length && !chunked {
        write!(buf, "Content-Length: {}\r\n", response.body_bytes().len()).unwrap();
    }
    if close && !has_connection {
        buf.extend(b"Connection: close\r\n");
    }
    buf.extend(b"\r\n");
    let body = response.body_bytes();
    if chunked {
        if !body.is_empty() {
            write!(buf, "{:x}\r\n", body.len()).unwrap();
            buf.extend(body);
            buf.extend(b"\r\n");
        }
        buf.extend(b"0\r\n\r\n");
    } else {
        buf.extend(body);
    }
}

/// The interim response for `Expect: 100-continue`
pub(crate) fn write_continue(buf: &mut Buf) {
    buf.extend(b"HTTP/1.1 100 Continue\r\n\r\n");
}

#[cfg(test)]
mod test {
    use netbuf::Buf;

    use super::{serialize, write_continue};
    use crate::request::Header;
    use crate::response::Response;

    fn render(response: &Response, close: bool) -> Vec<u8> {
        let mut buf = Buf::new();
        serialize(response, close, &mut buf);
        buf[..].to_vec()
    }

    #[test]
    fn adds_content_length() {
        let response = Response::new(
            200,
            "OK",
            vec![Header::new("Content-Type", "text/plain")],
            b"hi".to_vec(),
        );
        assert_eq!(
            render(&response, false),
            &b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\
               Content-Length: 2\r\n\r\nhi"[..]
        );
    }

    #[test]
    fn adds_connection_close() {
        let response = Response::empty(204, "No Content");
        assert_eq!(
            render(&response, true),
            &b"HTTP/1.1 204 No Content\r\nContent-Length: 0\r\n\
               Connection: close\r\n\r\n"[..]
        );
    }

    #[test]
    fn respects_explicit_content_length() {
        let response = Response::new(
            200,
            "OK",
            vec![Header::new("Content-Length", "2")],
            b"hi".to_vec(),
        );
        assert_eq!(
            render(&response, false),
            &b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi"[..]
        );
    }

    #[test]
    fn chunked_framing_on_request() {
        let response = Response::new(
            200,
            "OK",
            vec![Header::new("Transfer-Encoding", "chunked")],
            b"hello world".to_vec(),
        );
        assert_eq!(
            render(&response, false),
            &b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
               b\r\nhello world\r\n0\r\n\r\n"[..]
        );
    }

    #[test]
    fn chunked_with_empty_body_is_bare_terminator() {
        let response = Response::new(
            200,
            "OK",
            vec![Header::new("Transfer-Encoding", "chunked")],
            Vec::new(),
        );
        assert_eq!(
            render(&response, false),
            &b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n0\r\n\r\n"[..]
        );
    }

    #[test]
    fn continue_line() {
        let mut buf = Buf::new();
        write_continue(&mut buf);
        assert_eq!(&buf[..], b"HTTP/1.1 100 Continue\r\n\r\n");
    }
}
