//! Caller-side handle for one in-flight call.

use std::fmt;
use std::sync::{Arc, OnceLock};

use bytes::Bytes;

use crate::reply::Reply;

/// Handle returned by [`Connection::call`](crate::client::Connection::call).
///
/// The handle starts unresolved and becomes ready exactly once, either
/// when a reply with its sync id arrives or when the connection closes
/// and cancels it. Cloning is cheap and every clone observes the same
/// resolution. Two handles compare equal when they refer to the same
/// call.
#[derive(Clone)]
pub struct Request {
    inner: Arc<Inner>,
}

struct Inner {
    id: u64,
    peer: Arc<str>,
    reply: OnceLock<Reply>,
}

impl Request {
    pub(crate) fn new(id: u64, peer: Arc<str>) -> Self {
        Request {
            inner: Arc::new(Inner { id, peer, reply: OnceLock::new() }),
        }
    }

    /// Sync id the connection assigned to this call.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Whether a reply has been recorded.
    pub fn is_ready(&self) -> bool {
        self.inner.reply.get().is_some()
    }

    /// Error message of a fault reply. `None` while unresolved or when
    /// the call succeeded.
    pub fn error(&self) -> Option<Bytes> {
        self.inner.reply.get().and_then(Reply::error)
    }

    /// Result payload of a successful reply. `None` while unresolved or
    /// when the call faulted.
    pub fn result(&self) -> Option<Bytes> {
        self.inner.reply.get().and_then(Reply::result)
    }

    /// The recorded reply, once there is one.
    pub fn reply(&self) -> Option<&Reply> {
        self.inner.reply.get()
    }

    /// Records the reply. The first writer wins; later attempts are
    /// dropped so a cancellation racing a real reply cannot overwrite it.
    pub(crate) fn publish(&self, reply: Reply) {
        let _ = self.inner.reply.set(reply);
    }
}

impl PartialEq for Request {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Request {}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.inner.id)
            .field("peer", &self.inner.peer)
            .field("ready", &self.is_ready())
            .finish()
    }
}
