//! Single-threaded reactor: selector, scheduler, cross-thread queue

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::time::Instant;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};

use crate::config::Config;
use crate::connection::{Connection, Ctx};
use crate::error::Error;
use crate::handler::Handler;
use crate::logger::Logger;
use crate::response::Response;

/// Selector wakeup, shared by the cross-thread queue
const WAKER: Token = Token(0);
/// The listening socket, present on loop 0 only
const LISTENER: Token = Token(1);
/// Connection ids count up from here and are never reused
const FIRST_CONNECTION: usize = 2;

/// Cross-thread queue depth per loop; producers block when it fills
const QUEUE_LENGTH: usize = 64 * 1024;

/// Messages other threads post to an event loop
pub(crate) enum Msg {
    /// An accepted socket handed over by the listening loop
    Register(TcpStream),
    /// A handler completed pipeline slot `seq` on connection `conn`
    Complete {
        conn: usize,
        seq: u64,
        response: Response,
    },
}

/// Cross-thread face of one event loop
#[derive(Clone)]
pub(crate) struct LoopHandle {
    pub tx: SyncSender<Msg>,
    pub waker: Arc<Waker>,
}

/// One reactor thread's entire world
///
/// Everything here is owned by the thread running `run`; the only
/// cross-thread inputs are the queue and the shutdown flag.
pub(crate) struct EventLoop {
    id: usize,
    poll: Poll,
    events: Events,
    rx: Receiver<Msg>,
    queue: SyncSender<Msg>,
    waker: Arc<Waker>,
    handles: Vec<LoopHandle>,
    next_peer: usize,
    listener: Option<TcpListener>,
    connections: HashMap<usize, Connection>,
    scheduler: crate::scheduler::Scheduler<usize>,
    next_id: usize,
    scratch: Vec<u8>,
    ready: Vec<(Token, bool, bool)>,
    config: Arc<Config>,
    handler: Arc<dyn Handler>,
    logger: Arc<dyn Logger>,
    shutdown: Arc<AtomicBool>,
}

impl EventLoop {
    pub fn new(
        id: usize,
        config: Arc<Config>,
        handler: Arc<dyn Handler>,
        logger: Arc<dyn Logger>,
        shutdown: Arc<AtomicBool>,
        mut listener: Option<TcpListener>,
    ) -> io::Result<(EventLoop, LoopHandle)> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);
        if let Some(ref mut listener) = listener {
            poll.registry()
                .register(listener, LISTENER, Interest::READABLE)?;
        }
        let (tx, rx) = sync_channel(QUEUE_LENGTH);
        let handle = LoopHandle {
            tx: tx.clone(),
            waker: waker.clone(),
        };
        let scratch = vec![0; config.read_buffer_size];
        Ok((
            EventLoop {
                id,
                poll,
                events: Events::with_capacity(1024),
                rx,
                queue: tx,
                waker,
                handles: Vec::new(),
                next_peer: 0,
                listener,
                connections: HashMap::new(),
                scheduler: crate::scheduler::Scheduler::new(),
                next_id: FIRST_CONNECTION,
                scratch,
                ready: Vec::new(),
                config,
                handler,
                logger,
                shutdown,
            },
            handle,
        ))
    }

    /// Install the handles of every loop, self included, for round-robin
    /// accept distribution
    pub fn set_handles(&mut self, handles: Vec<LoopHandle>) {
        self.handles = handles;
    }

    /// The reactor loop; returns on shutdown or selector failure
    pub fn run(&mut self) {
        while !self.shutdown.load(Ordering::SeqCst) {
            let now = Instant::now();
            let timeout = match self.scheduler.next_deadline() {
                Some(deadline) => deadline
                    .saturating_duration_since(now)
                    .min(self.config.resolution),
                None => self.config.resolution,
            };
            if let Err(e) = self.poll.poll(&mut self.events, Some(timeout)) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                log::error!("event loop {}: selector failure: {}", self.id, e);
                break;
            }

            self.ready.clear();
            for event in self.events.iter() {
                self.ready.push((
                    event.token(),
                    event.is_readable() || event.is_read_closed(),
                    event.is_writable(),
                ));
            }
            for i in 0..self.ready.len() {
                let (token, readable, writable) = self.ready[i];
                match token {
                    WAKER => {}
                    LISTENER => self.accept_ready(),
                    Token(id) => self.connection_ready(id, readable, writable),
                }
            }

            while let Ok(msg) = self.rx.try_recv() {
                self.handle_msg(msg);
            }

            let now = Instant::now();
            let mut expired = Vec::new();
            self.scheduler.run_due(now, |id| expired.push(id));
            for id in expired {
                self.close_connection(id, "timeout", None);
            }

            // one idle timeout per live connection, no more, no less
            debug_assert_eq!(self.scheduler.pending(), self.connections.len());
        }
        self.shutdown_connections();
    }

    fn accept_ready(&mut self) {
        loop {
            let accepted = match self.listener.as_ref() {
                Some(listener) => listener.accept(),
                None => return,
            };
            match accepted {
                Ok((stream, _)) => {
                    let target = self.next_peer;
                    self.next_peer = (self.next_peer + 1) % self.handles.len();
                    if target == self.id {
                        self.register_connection(stream);
                    } else {
                        let handle = &self.handles[target];
                        if handle.tx.send(Msg::Register(stream)).is_ok() {
                            let _ = handle.waker.wake();
                        }
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::warn!("event loop {}: accept failed: {}", self.id, e);
                    break;
                }
            }
        }
    }

    fn register_connection(&mut self, stream: TcpStream) {
        let peer = match stream.peer_addr() {
            Ok(peer) => peer,
            // peer vanished between accept and here
            Err(_) => return,
        };
        let id = self.next_id;
        self.next_id += 1;
        let mut conn = Connection::new(id, stream, peer, &self.config);
        let registered = {
            let mut ctx = Ctx {
                registry: self.poll.registry(),
                scheduler: &mut self.scheduler,
                config: &self.config,
                handler: &self.handler,
                logger: &*self.logger,
                queue: &self.queue,
                waker: &self.waker,
                scratch: &mut self.scratch,
            };
            conn.register(&mut ctx)
        };
        if registered.is_err() {
            return;
        }
        if self.logger.enabled() {
            self.logger.log(
                "accepted",
                &[
                    ("connection", &id),
                    ("peer", &peer),
                    ("loop", &self.id),
                ],
            );
        }
        self.connections.insert(id, conn);
    }

    fn connection_ready(&mut self, id: usize, readable: bool, writable: bool) {
        let mut outcome = Ok(());
        let done;
        match self.connections.get_mut(&id) {
            Some(conn) => {
                let mut ctx = Ctx {
                    registry: self.poll.registry(),
                    scheduler: &mut self.scheduler,
                    config: &self.config,
                    handler: &self.handler,
                    logger: &*self.logger,
                    queue: &self.queue,
                    waker: &self.waker,
                    scratch: &mut self.scratch,
                };
                if writable {
                    outcome = conn.on_writable(&mut ctx);
                }
                if outcome.is_ok() && readable {
                    outcome = conn.on_readable(&mut ctx);
                }
                done = conn.is_done();
            }
            // already closed earlier in this batch
            None => return,
        }
        match outcome {
            Ok(()) if done => self.close_connection(id, "closed", None),
            Ok(()) => {}
            Err(e) => self.close_connection(id, close_event(&e), Some(&e)),
        }
    }

    fn handle_msg(&mut self, msg: Msg) {
        match msg {
            Msg::Register(stream) => self.register_connection(stream),
            Msg::Complete {
                conn,
                seq,
                response,
            } => {
                let mut outcome = Ok(());
                let done;
                match self.connections.get_mut(&conn) {
                    Some(connection) => {
                        let mut ctx = Ctx {
                            registry: self.poll.registry(),
                            scheduler: &mut self.scheduler,
                            config: &self.config,
                            handler: &self.handler,
                            logger: &*self.logger,
                            queue: &self.queue,
                            waker: &self.waker,
                            scratch: &mut self.scratch,
                        };
                        outcome = connection.complete(&mut ctx, seq, response);
                        done = connection.is_done();
                    }
                    None => {
                        // completion raced connection close; drop it
                        if self.logger.enabled() {
                            self.logger.log(
                                "stale_response",
                                &[("connection", &conn), ("seq", &seq)],
                            );
                        }
                        return;
                    }
                }
                match outcome {
                    Ok(()) if done => self.close_connection(conn, "closed", None),
                    Ok(()) => {}
                    Err(e) => self.close_connection(conn, close_event(&e), Some(&e)),
                }
            }
        }
    }

    fn close_connection(&mut self, id: usize, event: &str, error: Option<&Error>) {
        let mut conn = match self.connections.remove(&id) {
            Some(conn) => conn,
            None => return,
        };
        {
            let mut ctx = Ctx {
                registry: self.poll.registry(),
                scheduler: &mut self.scheduler,
                config: &self.config,
                handler: &self.handler,
                logger: &*self.logger,
                queue: &self.queue,
                waker: &self.waker,
                scratch: &mut self.scratch,
            };
            conn.teardown(&mut ctx);
        }
        if self.logger.enabled() {
            if event != "closed" {
                match error {
                    Some(error) => self.logger.log(
                        event,
                        &[("connection", &id), ("error", &error)],
                    ),
                    None => self.logger.log(event, &[("connection", &id)]),
                }
            }
            self.logger
                .log("closed", &[("connection", &id), ("peer", &conn.peer())]);
        }
    }

    /// Orderly shutdown: flush what is already serialized, then close
    fn shutdown_connections(&mut self) {
        for (_, conn) in self.connections.iter_mut() {
            conn.flush_on_shutdown();
        }
        self.connections.clear();
        self.listener = None;
    }
}

fn close_event(error: &Error) -> &'static str {
    match error {
        Error::Io(_) | Error::ConnectionReset => "io_error",
        Error::RequestTooLong => "overflow",
        _ => "parse_error",
    }
}
