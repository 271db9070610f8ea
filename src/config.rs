use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Fine-grained configuration of the HTTP server
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) reuse_addr: bool,
    pub(crate) reuse_port: bool,
    pub(crate) accept_length: u32,
    pub(crate) concurrency: usize,
    pub(crate) max_request_size: usize,
    pub(crate) read_buffer_size: usize,
    pub(crate) resolution: Duration,
    pub(crate) request_timeout: Duration,
    pub(crate) tcp_nodelay: bool,
}

impl Config {
    /// Create a config with defaults
    pub fn new() -> Config {
        Config {
            host: String::new(),
            port: 8080,
            reuse_addr: true,
            reuse_port: false,
            accept_length: 1024,
            concurrency: thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            max_request_size: 1 << 20,
            read_buffer_size: 64 << 10,
            resolution: Duration::from_millis(100),
            request_timeout: Duration::from_secs(60),
            tcp_nodelay: true,
        }
    }
    /// Address to bind to; an empty string binds the wildcard address
    pub fn host(&mut self, value: &str) -> &mut Self {
        self.host = value.to_string();
        self
    }
    /// TCP port to listen on
    pub fn port(&mut self, value: u16) -> &mut Self {
        self.port = value;
        self
    }
    /// Set SO_REUSEADDR on the listening socket
    pub fn reuse_addr(&mut self, value: bool) -> &mut Self {
        self.reuse_addr = value;
        self
    }
    /// Set SO_REUSEPORT on the listening socket (unix only)
    pub fn reuse_port(&mut self, value: bool) -> &mut Self {
        self.reuse_port = value;
        self
    }
    /// Listen backlog passed to the kernel
    pub fn accept_length(&mut self, value: u32) -> &mut Self {
        self.accept_length = value;
        self
    }
    /// Number of event loop threads; clamped to at least one
    pub fn concurrency(&mut self, value: usize) -> &mut Self {
        self.concurrency = value.max(1);
        self
    }
    /// Hard cap on bytes buffered for a single request (head and body)
    pub fn max_request_size(&mut self, value: usize) -> &mut Self {
        self.max_request_size = value;
        self
    }
    /// Maximum bytes consumed from a socket per read syscall
    pub fn read_buffer_size(&mut self, value: usize) -> &mut Self {
        self.read_buffer_size = value.max(1);
        self
    }
    /// Upper bound on how long the selector sleeps per loop iteration
    pub fn resolution(&mut self, value: Duration) -> &mut Self {
        self.resolution = value;
        self
    }
    /// Idle time after which a connection with no parser progress is closed
    pub fn request_timeout(&mut self, value: Duration) -> &mut Self {
        self.request_timeout = value;
        self
    }
    /// Set TCP_NODELAY on accepted sockets
    pub fn tcp_nodelay(&mut self, value: bool) -> &mut Self {
        self.tcp_nodelay = value;
        self
    }
    /// Create a Arc'd config clone to pass to the constructor
    ///
    /// This is just a convenience method.
    pub fn done(&mut self) -> Arc<Config> {
        Arc::new(self.clone())
    }
}

impl Default for Config {
    fn default() -> Config {
        Config::new()
    }
}
