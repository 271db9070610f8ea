//! Application boundary: request in, response out via callback

use std::sync::mpsc::SyncSender;
use std::sync::Arc;

use mio::Waker;

use crate::event_loop::Msg;
use crate::request::Request;
use crate::response::Response;

/// Application request handler
///
/// `handle` runs on the event loop thread and must not block it. The
/// response may be produced right there by invoking the callback before
/// returning, or later from any other thread; the server treats both the
/// same way. One callback invocation completes one request; a handler that
/// never invokes it leaves the connection to its idle timeout.
pub trait Handler: Send + Sync {
    /// Process one request
    fn handle(&self, request: Request, callback: ResponseCallback);
}

impl<F> Handler for F
where
    F: Fn(Request, ResponseCallback) + Send + Sync,
{
    fn handle(&self, request: Request, callback: ResponseCallback) {
        (self)(request, callback)
    }
}

/// Completion capability for a single request
///
/// Consumed by `respond`, so a request cannot be completed twice. It can be
/// moved freely across threads; responding posts the result onto the owning
/// event loop's queue and wakes its selector. Responses for connections
/// that have since closed are quietly discarded by the loop.
pub struct ResponseCallback {
    pub(crate) conn: usize,
    pub(crate) seq: u64,
    pub(crate) queue: SyncSender<Msg>,
    pub(crate) waker: Arc<Waker>,
}

impl ResponseCallback {
    /// Complete the request with `response`
    pub fn respond(self, response: Response) {
        let sent = self.queue.send(Msg::Complete {
            conn: self.conn,
            seq: self.seq,
            response,
        });
        if sent.is_ok() {
            let _ = self.waker.wake();
        }
    }
}
