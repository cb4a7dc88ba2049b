//! Terminal outcome of a call.

use bytes::Bytes;

use crate::wire::ReplyFrame;

/// Code carried by the synthetic reply published when a connection closes
/// with calls still in flight. No server ever sends it.
pub const CANCEL_CODE: i32 = -1;

/// Error text carried by the synthetic cancellation reply.
pub const CANCEL_MESSAGE: &str = "Request canceled due to connection close";

/// The decoded outcome of one call.
///
/// A reply is either a success with a result payload or a fault with an
/// error message, never both. `code` zero means success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    code: i32,
    error: Option<Bytes>,
    result: Option<Bytes>,
}

impl Reply {
    /// A successful reply carrying `result`.
    pub fn ok(result: Bytes) -> Self {
        Reply { code: 0, error: None, result: Some(result) }
    }

    /// A fault with a nonzero `code` and an error message.
    pub fn fault(code: i32, message: Bytes) -> Self {
        debug_assert!(code != 0, "fault replies need a nonzero code");
        Reply { code, error: Some(message), result: None }
    }

    /// The synthetic reply a closing connection publishes to every call
    /// still pending.
    pub fn canceled() -> Self {
        Reply::fault(CANCEL_CODE, Bytes::from_static(CANCEL_MESSAGE.as_bytes()))
    }

    pub(crate) fn from_frame(frame: ReplyFrame) -> Self {
        if frame.code == 0 {
            Reply::ok(frame.body)
        } else {
            Reply::fault(frame.code, frame.body)
        }
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn is_ok(&self) -> bool {
        self.code == 0
    }

    /// Error message, present exactly when the reply is a fault.
    pub fn error(&self) -> Option<Bytes> {
        self.error.clone()
    }

    /// Result payload, present exactly when the reply is a success.
    pub fn result(&self) -> Option<Bytes> {
        self.result.clone()
    }
}
