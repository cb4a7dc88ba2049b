//! The transport seam between a connection and the bytes underneath it.
//!
//! A [`Connection`](crate::client::Connection) multiplexes calls over any
//! type implementing [`CallStream`]. The crate ships a TCP implementation
//! in [`crate::tcp`]; tests substitute scripted streams through the same
//! trait.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::client::ClientConfig;
use crate::wire::ReplyFrame;

/// Faults reported by the transport layer.
///
/// Each variant carries a stable numeric code so callers can record and
/// compare the most recent fault without matching on the enum. System
/// faults additionally expose the OS errno when one exists.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StreamError {
    /// Unclassified transport failure.
    #[error("{0}")]
    Fail(String),

    /// An allocation the transport needed was refused.
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// Inbound bytes do not parse as a frame, or a frame exceeds the
    /// inbound cap.
    #[error("malformed frame: {0}")]
    Frame(String),

    /// An outbound frame exceeds the outbound cap.
    #[error("frame of {len} bytes exceeds the {limit} byte send limit")]
    TooLarge { len: usize, limit: usize },

    /// The endpoint host did not resolve to any address.
    #[error("cannot resolve {0}")]
    Resolve(String),

    /// Establishing the connection outran its deadline.
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    /// The server rejected the offered credentials.
    #[error("login failed: {0}")]
    Login(String),

    /// The operating system reported an I/O failure.
    #[error("system error: {0}")]
    System(#[source] io::Error),
}

impl StreamError {
    pub const CODE_FAIL: u32 = 1;
    pub const CODE_MEMORY: u32 = 2;
    pub const CODE_FRAME: u32 = 3;
    pub const CODE_BIG: u32 = 4;
    pub const CODE_RESOLVE: u32 = 5;
    pub const CODE_TIMEOUT: u32 = 6;
    pub const CODE_LOGIN: u32 = 7;
    pub const CODE_SYSTEM: u32 = 8;

    /// Stable numeric code for this fault.
    pub fn code(&self) -> u32 {
        match self {
            StreamError::Fail(_) => Self::CODE_FAIL,
            StreamError::OutOfMemory(_) => Self::CODE_MEMORY,
            StreamError::Frame(_) => Self::CODE_FRAME,
            StreamError::TooLarge { .. } => Self::CODE_BIG,
            StreamError::Resolve(_) => Self::CODE_RESOLVE,
            StreamError::Timeout(_) => Self::CODE_TIMEOUT,
            StreamError::Login(_) => Self::CODE_LOGIN,
            StreamError::System(_) => Self::CODE_SYSTEM,
        }
    }

    /// OS errno behind a system fault, zero for everything else.
    pub fn errno(&self) -> i32 {
        match self {
            StreamError::System(err) => err.raw_os_error().unwrap_or(0),
            _ => 0,
        }
    }

    /// True when the fault means the stream can no longer be trusted to
    /// carry further frames.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StreamError::System(_))
    }
}

/// An ordered, bidirectional byte stream that carries call frames out and
/// reply frames back.
///
/// Implementations own their buffering. `write` queues an encoded frame,
/// `flush` forces everything queued onto the wire; one flush per call
/// keeps a burst of writes from syscall-storming the socket. `read_reply`
/// returns `Ok(None)` when the peer has nothing to deliver right now or
/// has closed cleanly; after a clean close `is_connected` reports false.
///
/// Callers must serialize access. A connection guarantees this by keeping
/// its stream behind one lock, which also means implementations never see
/// concurrent reads.
#[allow(async_fn_in_trait)]
pub trait CallStream: Send {
    /// Establishes the stream and performs the handshake.
    async fn connect(config: &ClientConfig) -> Result<Self, StreamError>
    where
        Self: Sized;

    /// Closes the stream. Idempotent; never fails.
    async fn close(&mut self);

    /// Queues one encoded frame for transmission.
    async fn write(&mut self, frame: &[u8]) -> Result<(), StreamError>;

    /// Pushes all queued frames onto the wire.
    async fn flush(&mut self) -> Result<(), StreamError>;

    /// Reads the next reply frame, if any.
    async fn read_reply(&mut self) -> Result<Option<ReplyFrame>, StreamError>;

    /// Whether the transport still considers itself open.
    fn is_connected(&self) -> bool;
}
