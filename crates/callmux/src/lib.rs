//! Multiplexed RPC calls over a single ordered byte stream.
//!
//! A [`Connection`] issues many calls concurrently without waiting for
//! replies between them. Every call is stamped with a unique sync id and
//! returns a [`Request`] handle right away; replies come back in
//! whatever order the server finishes and are routed to their handle by
//! id. When the connection closes, every call still in flight resolves
//! with a fixed cancellation error instead of hanging its waiter.
//!
//! The transport is pluggable through the [`CallStream`] trait; TCP with
//! an optional credential handshake ships in [`tcp`].
//!
//! [`CallStream`]: stream::CallStream

pub mod client;
pub mod error;
mod pending;
pub mod reply;
pub mod request;
pub mod stream;
pub mod tcp;
pub mod wire;

pub use client::{ClientConfig, Connection};
pub use error::Error;
pub use reply::Reply;
pub use request::Request;
