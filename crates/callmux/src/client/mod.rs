//! Client-side connection and its configuration.
//!
//! ```no_run
//! use callmux::client::{ClientConfig, Connection};
//!
//! # async fn run() -> Result<(), callmux::Error> {
//! let conn = Connection::connect(ClientConfig::new("tcp://127.0.0.1:3311")).await?;
//! let fetch = conn.call("fetch", b"key-1").await?;
//! let stats = conn.call("stats", b"").await?;
//! while !(fetch.is_ready() && stats.is_ready()) {
//!     conn.read_one().await?;
//! }
//! conn.disconnect().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;

pub use config::ClientConfig;
pub use connection::Connection;
