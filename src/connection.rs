//! Per-socket state machine: read buffer -> parser -> handler -> pipeline
//! FIFO -> write buffer -> socket

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::SyncSender;
use std::sync::Arc;
use std::time::Instant;

use mio::net::TcpStream;
use mio::{Interest, Registry, Token, Waker};
use netbuf::Buf;

use crate::config::Config;
use crate::error::Error;
use crate::event_loop::Msg;
use crate::handler::{Handler, ResponseCallback};
use crate::logger::Logger;
use crate::parser::RequestParser;
use crate::response::Response;
use crate::scheduler::{Scheduler, TaskHandle};
use crate::serializer;
use crate::tokenizer::ByteTokenizer;

/// Requests in flight on one connection before reading is paused
pub(crate) const PIPELINE_LIMIT: usize = 256;

/// The slice of event loop state a connection operates against
pub(crate) struct Ctx<'a> {
    pub registry: &'a Registry,
    pub scheduler: &'a mut Scheduler<usize>,
    pub config: &'a Config,
    pub handler: &'a Arc<dyn Handler>,
    pub logger: &'a dyn Logger,
    pub queue: &'a SyncSender<Msg>,
    pub waker: &'a Arc<Waker>,
    pub scratch: &'a mut [u8],
}

/// One pipelined request awaiting or holding its response
struct Slot {
    seq: u64,
    close: bool,
    response: Option<Response>,
}

/// State for a single accepted socket, owned by one event loop
pub(crate) struct Connection {
    id: usize,
    stream: TcpStream,
    peer: SocketAddr,
    tok: ByteTokenizer,
    parser: RequestParser,
    pipeline: VecDeque<Slot>,
    out: Buf,
    next_seq: u64,
    half_closed: bool,
    eof: bool,
    paused: bool,
    wants_write: bool,
    done: bool,
    timeout: Option<TaskHandle>,
}

impl Connection {
    pub fn new(id: usize, stream: TcpStream, peer: SocketAddr, config: &Config) -> Connection {
        Connection {
            id,
            stream,
            peer,
            tok: ByteTokenizer::new(config.max_request_size),
            parser: RequestParser::new(),
            pipeline: VecDeque::new(),
            out: Buf::new(),
            next_seq: 0,
            half_closed: false,
            eof: false,
            paused: false,
            wants_write: false,
            done: false,
            timeout: None,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Whether the connection finished cleanly and should be dropped
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Register with the selector and arm the first idle timeout
    pub fn register(&mut self, ctx: &mut Ctx) -> Result<(), Error> {
        if ctx.config.tcp_nodelay {
            let _ = self.stream.set_nodelay(true);
        }
        ctx.registry
            .register(&mut self.stream, Token(self.id), Interest::READABLE)?;
        self.reschedule_timeout(ctx);
        Ok(())
    }

    /// Pull bytes off the socket and drive the parser
    pub fn on_readable(&mut self, ctx: &mut Ctx) -> Result<(), Error> {
        while !self.paused && !self.done && !self.eof && !self.half_closed {
            match self.stream.read(&mut *ctx.scratch) {
                Ok(0) => self.eof = true,
                Ok(n) => {
                    self.tok.append(&ctx.scratch[..n])?;
                    self.drive(ctx)?;
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if self.eof && self.pipeline.is_empty() && self.out.is_empty() {
            // nothing in flight; a partial request in the buffer is abandoned
            self.done = true;
        }
        Ok(())
    }

    /// Drain the write buffer into the socket
    pub fn on_writable(&mut self, ctx: &mut Ctx) -> Result<(), Error> {
        self.flush(ctx)
    }

    /// Fill the pipeline slot `seq` and emit every response whose turn has
    /// come
    ///
    /// Responses become wire bytes strictly in arrival order: only the head
    /// of the FIFO may be serialized, however early a later slot completed.
    pub fn complete(&mut self, ctx: &mut Ctx, seq: u64, response: Response) -> Result<(), Error> {
        match self.pipeline.iter_mut().find(|slot| slot.seq == seq) {
            Some(slot) if slot.response.is_none() => slot.response = Some(response),
            _ => {
                if ctx.logger.enabled() {
                    ctx.logger.log(
                        "stale_response",
                        &[("connection", &self.id), ("seq", &seq)],
                    );
                }
                return Ok(());
            }
        }
        loop {
            let head_ready = matches!(self.pipeline.front(),
                Some(head) if head.response.is_some());
            if !head_ready {
                break;
            }
            let slot = match self.pipeline.pop_front() {
                Some(slot) => slot,
                None => break,
            };
            let response = match slot.response {
                Some(response) => response,
                None => break,
            };
            serializer::serialize(&response, slot.close, &mut self.out);
            if ctx.logger.enabled() {
                ctx.logger.log(
                    "response",
                    &[
                        ("connection", &self.id),
                        ("seq", &slot.seq),
                        ("status", &response.status()),
                    ],
                );
            }
            if slot.close {
                // later pipelined responses can never be delivered
                self.half_closed = true;
                self.pipeline.clear();
                break;
            }
        }
        if self.paused && self.pipeline.len() < PIPELINE_LIMIT && !self.half_closed {
            self.paused = false;
            // bytes buffered while paused produce no new readiness event,
            // so re-drive the parser and then poll the socket again
            self.drive(ctx)?;
            self.on_readable(ctx)?;
        }
        self.flush(ctx)
    }

    /// Best-effort flush during server shutdown; errors are moot
    pub fn flush_on_shutdown(&mut self) {
        if !self.out.is_empty() {
            let _ = self.stream.write(&self.out[..]);
        }
    }

    /// Drop selector registration and the pending timeout
    pub fn teardown(&mut self, ctx: &mut Ctx) {
        if let Some(handle) = self.timeout.take() {
            ctx.scheduler.cancel(&handle);
        }
        let _ = ctx.registry.deregister(&mut self.stream);
    }

    fn drive(&mut self, ctx: &mut Ctx) -> Result<(), Error> {
        while !self.paused && !self.half_closed {
            let parsed = self.parser.parse(&mut self.tok)?;
            if self.parser.take_expect_continue() {
                serializer::write_continue(&mut self.out);
            }
            let request = match parsed {
                Some(request) => request,
                None => break,
            };
            self.reschedule_timeout(ctx);
            if ctx.logger.enabled() {
                ctx.logger.log(
                    "request",
                    &[
                        ("connection", &self.id),
                        ("method", &request.method()),
                        ("uri", &request.uri()),
                    ],
                );
            }
            let seq = self.next_seq;
            self.next_seq += 1;
            self.pipeline.push_back(Slot {
                seq,
                close: !request.keep_alive(),
                response: None,
            });
            if self.pipeline.len() >= PIPELINE_LIMIT {
                self.paused = true;
            }
            let callback = ResponseCallback {
                conn: self.id,
                seq,
                queue: ctx.queue.clone(),
                waker: ctx.waker.clone(),
            };
            let handler = ctx.handler.clone();
            let outcome =
                catch_unwind(AssertUnwindSafe(move || handler.handle(request, callback)));
            if outcome.is_err() && ctx.logger.enabled() {
                // slot stays empty; the idle timeout reaps the connection
                ctx.logger.log(
                    "handler_error",
                    &[("connection", &self.id), ("seq", &seq)],
                );
            }
        }
        self.flush(ctx)
    }

    fn flush(&mut self, ctx: &mut Ctx) -> Result<(), Error> {
        let had_output = !self.out.is_empty();
        while !self.out.is_empty() {
            match self.stream.write(&self.out[..]) {
                Ok(0) => return Err(Error::ConnectionReset),
                Ok(n) => self.out.consume(n),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if !self.out.is_empty() {
            return self.set_write_interest(ctx, true);
        }
        if self.half_closed {
            let _ = self.stream.shutdown(Shutdown::Write);
            self.done = true;
        } else if self.eof && self.pipeline.is_empty() {
            self.done = true;
        } else {
            self.set_write_interest(ctx, false)?;
            if had_output {
                self.reschedule_timeout(ctx);
            }
        }
        Ok(())
    }

    fn set_write_interest(&mut self, ctx: &mut Ctx, on: bool) -> Result<(), Error> {
        if self.wants_write == on {
            return Ok(());
        }
        let interest = if on {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        };
        ctx.registry
            .reregister(&mut self.stream, Token(self.id), interest)?;
        self.wants_write = on;
        Ok(())
    }

    /// The single idle timeout, re-anchored at accept, parser completion
    /// and write drain
    fn reschedule_timeout(&mut self, ctx: &mut Ctx) {
        if let Some(handle) = self.timeout.take() {
            ctx.scheduler.cancel(&handle);
        }
        let deadline = Instant::now() + ctx.config.request_timeout;
        self.timeout = Some(ctx.scheduler.schedule(deadline, self.id));
    }
}
