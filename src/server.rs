//! Supervisor: binds the listener, spawns the event loop threads

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use mio::net::TcpListener;
use socket2::{Domain, Protocol, Socket, Type};

use crate::config::Config;
use crate::event_loop::{EventLoop, LoopHandle};
use crate::handler::Handler;
use crate::logger::{DebugLogger, Logger};

/// The server object: a listening socket plus its event loop threads
///
/// The listener is bound once at `start`. Loop 0 owns it and assigns
/// accepted sockets round-robin across all loops, so placement is
/// deterministic given the configuration. Each connection then lives and
/// dies on its assigned loop thread.
///
/// ```no_run
/// use evhttp::{Config, Response, Server};
///
/// let config = Config::new().port(8080).done();
/// let mut server = Server::new(
///     config,
///     |request: evhttp::Request, callback: evhttp::ResponseCallback| {
///         let _ = request;
///         callback.respond(Response::new(200, "OK", Vec::new(), b"hello".to_vec()));
///     },
/// );
/// server.start().expect("bind failed");
/// server.join();
/// ```
pub struct Server {
    config: Arc<Config>,
    handler: Arc<dyn Handler>,
    logger: Arc<dyn Logger>,
    shutdown: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
    handles: Vec<LoopHandle>,
    local_addr: Option<SocketAddr>,
}

impl Server {
    /// Server with the default debug logger
    pub fn new<H: Handler + 'static>(config: Arc<Config>, handler: H) -> Server {
        Server::with_logger(config, handler, DebugLogger)
    }

    /// Server with an application-provided event sink
    pub fn with_logger<H, L>(config: Arc<Config>, handler: H, logger: L) -> Server
    where
        H: Handler + 'static,
        L: Logger + 'static,
    {
        Server {
            config,
            handler: Arc::new(handler),
            logger: Arc::new(logger),
            shutdown: Arc::new(AtomicBool::new(false)),
            threads: Vec::new(),
            handles: Vec::new(),
            local_addr: None,
        }
    }

    /// The address the listener actually bound, once started
    ///
    /// Useful with port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Bind the listener and launch the event loop threads
    pub fn start(&mut self) -> io::Result<()> {
        if !self.threads.is_empty() {
            return Ok(());
        }
        let listener = bind_listener(&self.config)?;
        self.local_addr = Some(listener.local_addr()?);

        let count = self.config.concurrency.max(1);
        let mut listener = Some(listener);
        let mut loops = Vec::with_capacity(count);
        let mut handles = Vec::with_capacity(count);
        for id in 0..count {
            let (event_loop, handle) = EventLoop::new(
                id,
                self.config.clone(),
                self.handler.clone(),
                self.logger.clone(),
                self.shutdown.clone(),
                if id == 0 { listener.take() } else { None },
            )?;
            loops.push(event_loop);
            handles.push(handle);
        }
        for event_loop in &mut loops {
            event_loop.set_handles(handles.clone());
        }
        self.handles = handles;
        for (id, mut event_loop) in loops.into_iter().enumerate() {
            let thread = thread::Builder::new()
                .name(format!("evhttp-{}", id))
                .spawn(move || event_loop.run())?;
            self.threads.push(thread);
        }
        Ok(())
    }

    /// Wait for the event loop threads to finish
    pub fn join(&mut self) {
        for thread in self.threads.drain(..) {
            if thread.join().is_err() {
                log::error!("event loop thread panicked");
            }
        }
    }

    /// Signal shutdown, wake every selector and wait for the threads
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for handle in &self.handles {
            let _ = handle.waker.wake();
        }
        self.join();
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

fn bind_listener(config: &Config) -> io::Result<TcpListener> {
    let addr = resolve_addr(config)?;
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(config.reuse_addr)?;
    #[cfg(unix)]
    {
        if config.reuse_port {
            socket.set_reuse_port(true)?;
        }
    }
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(config.accept_length as i32)?;
    Ok(TcpListener::from_std(socket.into()))
}

fn resolve_addr(config: &Config) -> io::Result<SocketAddr> {
    if config.host.is_empty() {
        return Ok(SocketAddr::from(([0, 0, 0, 0], config.port)));
    }
    (config.host.as_str(), config.port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| {
            io::Error::new(io::ErrorKind::AddrNotAvailable, "host did not resolve")
        })
}
