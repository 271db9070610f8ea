//! Minimal event-driven HTTP/1.x server
//!
//! A compact core built around non-blocking readiness: each of N event loop
//! threads multiplexes its share of the connections, parses materialized
//! requests, and hands them to the application [`Handler`]. The handler
//! completes each request through a [`ResponseCallback`], synchronously or
//! from any other thread, and responses go out in request order even when
//! pipelined requests finish out of order.
//!
//! Requests and responses are held fully in memory, which keeps buffers
//! bounded: a request larger than [`Config::max_request_size`] is a fatal
//! connection error. There is no streaming, TLS (terminate it upstream) or
//! HTTP/2.
#![warn(missing_docs)]

mod config;
mod connection;
mod error;
mod event_loop;
mod handler;
mod logger;
mod request;
mod response;
mod scheduler;
mod serializer;
mod server;
mod version;

pub mod parser;
pub mod tokenizer;

pub use config::Config;
pub use error::Error;
pub use handler::{Handler, ResponseCallback};
pub use logger::{DebugLogger, Logger, NopLogger};
pub use parser::RequestParser;
pub use request::{Header, Request};
pub use response::Response;
pub use server::Server;
pub use tokenizer::ByteTokenizer;
pub use version::Version;
