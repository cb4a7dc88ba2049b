//! Errors surfaced to callers of a connection.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::stream::StreamError;

/// Everything a connection operation can fail with.
///
/// Transport faults map here one-to-one from [`StreamError`]; the
/// remaining variants are raised by the connection itself. Only
/// [`Error::System`] closes the connection as a side effect; every other
/// variant leaves it usable.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// An allocation was refused while preparing or reading a frame.
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// The endpoint host did not resolve to any address.
    #[error("cannot resolve {0}")]
    Resolve(String),

    /// Establishing the connection outran its deadline.
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    /// The server rejected the offered credentials.
    #[error("login failed: {0}")]
    Login(String),

    /// The operating system reported an I/O failure, or the stream ended
    /// beneath the connection. Pending calls are canceled when this is
    /// raised.
    #[error("system error: {0}")]
    System(#[source] io::Error),

    /// The encoded request exceeds the outbound frame cap.
    #[error("request of {len} bytes exceeds the {limit} byte send limit")]
    TooLargeRequest { len: usize, limit: usize },

    /// A reply arrived whose sync id matches no pending call.
    #[error("reply sync id {id} matches no pending request")]
    Sync { id: u64 },

    /// A caller-supplied value was rejected before any I/O happened.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A transport fault with no more specific classification.
    #[error("{0}")]
    Unknown(String),
}

impl From<StreamError> for Error {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::OutOfMemory(msg) => Error::OutOfMemory(msg),
            StreamError::Resolve(host) => Error::Resolve(host),
            StreamError::Timeout(after) => Error::Timeout(after),
            StreamError::Login(msg) => Error::Login(msg),
            StreamError::System(io) => Error::System(io),
            StreamError::TooLarge { len, limit } => Error::TooLargeRequest { len, limit },
            StreamError::Frame(msg) => Error::Unknown(format!("malformed frame: {msg}")),
            StreamError::Fail(msg) => Error::Unknown(msg),
        }
    }
}
