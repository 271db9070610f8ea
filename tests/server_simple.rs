//! End-to-end exchanges against a running server over real sockets.

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use evhttp::{
    Config, Handler, Header, NopLogger, Request, Response, ResponseCallback, Server,
};

fn start<H: Handler + 'static>(config: &mut Config, handler: H) -> Server {
    let mut server =
        Server::with_logger(config.host("127.0.0.1").port(0).done(), handler, NopLogger);
    server.start().expect("bind failed");
    server
}

fn connect(server: &Server) -> TcpStream {
    let stream = TcpStream::connect(server.local_addr().unwrap()).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();
    stream
}

fn read_exact_len(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0; len];
    stream.read_exact(&mut buf).unwrap();
    buf
}

fn text_handler(_request: Request, callback: ResponseCallback) {
    callback.respond(Response::new(
        200,
        "OK",
        vec![Header::new("Content-Type", "text/plain")],
        b"hi".to_vec(),
    ));
}

fn echo_handler(request: Request, callback: ResponseCallback) {
    callback.respond(Response::new(
        200,
        "OK",
        Vec::new(),
        request.body().to_vec(),
    ));
}

#[test]
fn minimal_get_and_keep_alive() {
    let mut server = start(&mut Config::new(), text_handler);
    let mut stream = connect(&server);
    let expected = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\
        Content-Length: 2\r\n\r\nhi";

    stream.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
    assert_eq!(read_exact_len(&mut stream, expected.len()), expected);

    // the connection must survive for a second exchange
    stream.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
    assert_eq!(read_exact_len(&mut stream, expected.len()), expected);

    server.stop();
}

#[test]
fn http_10_closes_by_default() {
    let mut server = start(&mut Config::new(), text_handler);
    let mut stream = connect(&server);
    stream.write_all(b"GET / HTTP/1.0\r\nHost: x\r\n\r\n").unwrap();
    let mut got = Vec::new();
    stream.read_to_end(&mut got).unwrap();
    assert_eq!(
        got,
        &b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\
           Content-Length: 2\r\nConnection: close\r\n\r\nhi"[..]
    );
    server.stop();
}

#[test]
fn chunked_request_body_is_reassembled() {
    let mut server = start(&mut Config::new(), echo_handler);
    let mut stream = connect(&server);
    stream
        .write_all(
            b"POST / HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n\
              5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n",
        )
        .unwrap();
    let expected = b"HTTP/1.1 200 OK\r\nContent-Length: 11\r\n\r\nhello world";
    assert_eq!(read_exact_len(&mut stream, expected.len()), expected);
    server.stop();
}

#[test]
fn pipelined_responses_keep_wire_order() {
    // handler holds all three callbacks, then completes them 3, 1, 2
    let pending: Arc<Mutex<Vec<(String, ResponseCallback)>>> =
        Arc::new(Mutex::new(Vec::new()));
    let handler = {
        let pending = pending.clone();
        move |request: Request, callback: ResponseCallback| {
            let mut slots = pending.lock().unwrap();
            slots.push((request.uri().to_string(), callback));
            if slots.len() == 3 {
                let mut slots: Vec<_> = slots.drain(..).collect();
                thread::spawn(move || {
                    for uri in ["/3", "/1", "/2"] {
                        let i = slots.iter().position(|(u, _)| u == uri).unwrap();
                        let (uri, callback) = slots.remove(i);
                        callback.respond(Response::new(
                            200,
                            "OK",
                            Vec::new(),
                            uri.into_bytes(),
                        ));
                    }
                });
            }
        }
    };
    let mut server = start(Config::new().concurrency(1), handler);
    let mut stream = connect(&server);
    stream
        .write_all(
            b"GET /1 HTTP/1.1\r\nHost: x\r\n\r\n\
              GET /2 HTTP/1.1\r\nHost: x\r\n\r\n\
              GET /3 HTTP/1.1\r\nHost: x\r\n\r\n",
        )
        .unwrap();
    let one = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\n/1";
    let mut expected = Vec::new();
    for body in ["/1", "/2", "/3"] {
        expected.extend_from_slice(
            format!("HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\n{}", body).as_bytes(),
        );
    }
    assert_eq!(read_exact_len(&mut stream, 3 * one.len()), expected);
    server.stop();
}

#[test]
fn oversized_request_closes_without_output() {
    let mut server = start(Config::new().max_request_size(64), text_handler);
    let mut stream = connect(&server);
    stream.write_all(&[b'a'; 200]).unwrap();
    let mut got = Vec::new();
    match stream.read_to_end(&mut got) {
        Ok(_) => {}
        // the reset from the abandoned socket is just as good as EOF
        Err(e) if e.kind() == ErrorKind::ConnectionReset => {}
        Err(e) => panic!("unexpected read error: {}", e),
    }
    assert!(got.is_empty(), "bytes emitted for an oversized request");
    server.stop();
}

#[test]
fn idle_connection_times_out() {
    let mut server = start(
        Config::new()
            .request_timeout(Duration::from_millis(300))
            .resolution(Duration::from_millis(50)),
        text_handler,
    );
    let mut stream = connect(&server);
    let started = Instant::now();
    let mut got = Vec::new();
    stream.read_to_end(&mut got).unwrap();
    let elapsed = started.elapsed();
    assert!(got.is_empty());
    assert!(elapsed >= Duration::from_millis(200), "closed too early");
    assert!(elapsed < Duration::from_secs(5), "timeout never fired");
    server.stop();
}

#[test]
fn expect_continue_gets_interim_response() {
    let mut server = start(&mut Config::new(), echo_handler);
    let mut stream = connect(&server);
    stream
        .write_all(
            b"POST / HTTP/1.1\r\nHost: x\r\nExpect: 100-continue\r\n\
              Content-Length: 2\r\n\r\n",
        )
        .unwrap();
    let interim = b"HTTP/1.1 100 Continue\r\n\r\n";
    assert_eq!(read_exact_len(&mut stream, interim.len()), interim);

    stream.write_all(b"ok").unwrap();
    let expected = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok";
    assert_eq!(read_exact_len(&mut stream, expected.len()), expected);
    server.stop();
}

#[test]
fn connection_close_header_is_honored() {
    let mut server = start(&mut Config::new(), text_handler);
    let mut stream = connect(&server);
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
        .unwrap();
    let mut got = Vec::new();
    stream.read_to_end(&mut got).unwrap();
    assert_eq!(
        got,
        &b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\
           Content-Length: 2\r\nConnection: close\r\n\r\nhi"[..]
    );
    server.stop();
}

#[test]
fn sharded_loops_serve_consecutive_connections() {
    let mut server = start(Config::new().concurrency(3), text_handler);
    let expected = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\
        Content-Length: 2\r\n\r\nhi";
    for _ in 0..6 {
        let mut stream = connect(&server);
        stream.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
        assert_eq!(read_exact_len(&mut stream, expected.len()), expected);
    }
    server.stop();
}

#[test]
fn synchronous_and_deferred_handlers_look_identical() {
    let handler = |request: Request, callback: ResponseCallback| {
        if request.uri() == "/later" {
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                callback.respond(Response::new(200, "OK", Vec::new(), b"later".to_vec()));
            });
        } else {
            callback.respond(Response::new(200, "OK", Vec::new(), b"now".to_vec()));
        }
    };
    let mut server = start(&mut Config::new(), handler);

    let mut stream = connect(&server);
    stream.write_all(b"GET /now HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
    let expected = b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nnow";
    assert_eq!(read_exact_len(&mut stream, expected.len()), expected);

    stream.write_all(b"GET /later HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
    let expected = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nlater";
    assert_eq!(read_exact_len(&mut stream, expected.len()), expected);
    server.stop();
}
