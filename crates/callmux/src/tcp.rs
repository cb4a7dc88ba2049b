//! TCP implementation of [`CallStream`].
//!
//! Establishing the stream resolves the endpoint host, connects, and runs
//! the handshake: the server speaks first with a greeting frame, then the
//! client presents credentials when the endpoint carries any. The whole
//! sequence runs under the configured connect deadline.

use std::io;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{self, TcpStream};
use tokio::time;
use tracing::debug;

use crate::client::config::{ClientConfig, Endpoint};
use crate::stream::{CallStream, StreamError};
use crate::wire::{self, ReplyFrame};

/// Initial capacity of the read and write buffers. They grow on demand
/// up to the configured frame caps.
const INITIAL_BUF: usize = 16 * 1024;

/// A call stream over a TCP socket.
///
/// Writes accumulate in a local buffer until `flush`, so a call frame
/// leaves in one syscall. Reads accumulate until a whole frame is
/// buffered, which makes an interrupted read harmless: the partial bytes
/// stay put and the next read resumes where the stream left off.
#[derive(Debug)]
pub struct TcpCallStream {
    socket: TcpStream,
    read_buf: BytesMut,
    write_buf: Vec<u8>,
    recv_limit: usize,
    connected: bool,
}

impl TcpCallStream {
    async fn establish(endpoint: &Endpoint) -> Result<Self, StreamError> {
        let addrs = net::lookup_host((endpoint.host.as_str(), endpoint.port))
            .await
            .map_err(|err| StreamError::Resolve(format!("{}: {err}", endpoint.host)))?;

        let mut socket = None;
        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(s) => {
                    socket = Some(s);
                    break;
                }
                Err(err) => last_err = Some(err),
            }
        }
        let socket = match socket {
            Some(socket) => socket,
            None => {
                return Err(match last_err {
                    Some(err) => StreamError::System(err),
                    None => StreamError::Resolve(format!("no addresses for {}", endpoint.host)),
                });
            }
        };
        let _ = socket.set_nodelay(true);

        let mut stream = TcpCallStream {
            socket,
            read_buf: BytesMut::with_capacity(INITIAL_BUF),
            write_buf: Vec::with_capacity(INITIAL_BUF),
            recv_limit: endpoint.recv_limit,
            connected: true,
        };
        stream.handshake(endpoint).await?;
        Ok(stream)
    }

    async fn handshake(&mut self, endpoint: &Endpoint) -> Result<(), StreamError> {
        let greeting = wire::decode_reply(self.required_frame("greeting").await?)?;
        if greeting.sync != wire::HANDSHAKE_SYNC {
            return Err(StreamError::Frame(format!(
                "greeting arrived on sync id {}",
                greeting.sync
            )));
        }
        if greeting.code != 0 {
            return Err(StreamError::Fail(format!(
                "server refused the connection: {}",
                String::from_utf8_lossy(&greeting.body)
            )));
        }
        debug!(banner = %String::from_utf8_lossy(&greeting.body), "greeting received");

        if let Some(user) = &endpoint.username {
            let record = wire::encode_auth_record(user, &endpoint.password)?;
            let frame =
                wire::encode_call(wire::AUTH_FUNCTION, wire::HANDSHAKE_SYNC, &record, endpoint.send_limit)?;
            self.write(&frame).await?;
            self.flush().await?;

            let verdict = wire::decode_reply(self.required_frame("login verdict").await?)?;
            if verdict.sync != wire::HANDSHAKE_SYNC {
                return Err(StreamError::Frame(format!(
                    "login verdict arrived on sync id {}",
                    verdict.sync
                )));
            }
            if verdict.code != 0 {
                return Err(StreamError::Login(
                    String::from_utf8_lossy(&verdict.body).into_owned(),
                ));
            }
            debug!(user, "login accepted");
        }
        Ok(())
    }

    /// Reads one frame during the handshake, where a close is a failure
    /// rather than a clean end.
    async fn required_frame(&mut self, what: &str) -> Result<Bytes, StreamError> {
        match self.next_frame().await? {
            Some(body) => Ok(body),
            None => Err(StreamError::System(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("stream closed during {what}"),
            ))),
        }
    }

    /// Reads until a whole frame body is buffered. `Ok(None)` means the
    /// peer closed cleanly at a frame boundary.
    async fn next_frame(&mut self) -> Result<Option<Bytes>, StreamError> {
        loop {
            if let Some(body) = self.take_frame()? {
                return Ok(Some(body));
            }
            let partial = !self.read_buf.is_empty();
            if self.fill().await? == 0 {
                if partial {
                    return Err(StreamError::System(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "stream closed mid-frame",
                    )));
                }
                return Ok(None);
            }
        }
    }

    /// Splits one complete frame body out of the read buffer, if the
    /// buffer holds one.
    fn take_frame(&mut self) -> Result<Option<Bytes>, StreamError> {
        if self.read_buf.len() < 4 {
            return Ok(None);
        }
        let body_len = (&self.read_buf[..4]).get_u32() as usize;
        // A hostile length prefix must not wrap the cap on 32 bit targets.
        if body_len > self.recv_limit.saturating_sub(4) {
            return Err(StreamError::Frame(format!(
                "reply body of {body_len} bytes exceeds the {} byte recv limit",
                self.recv_limit
            )));
        }
        if self.read_buf.len() < 4 + body_len {
            self.read_buf.reserve(4 + body_len - self.read_buf.len());
            return Ok(None);
        }
        self.read_buf.advance(4);
        Ok(Some(self.read_buf.split_to(body_len).freeze()))
    }

    async fn fill(&mut self) -> Result<usize, StreamError> {
        match self.socket.read_buf(&mut self.read_buf).await {
            Ok(0) => {
                self.connected = false;
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(err) => {
                self.connected = false;
                Err(StreamError::System(err))
            }
        }
    }

    fn not_open() -> StreamError {
        StreamError::System(io::Error::new(io::ErrorKind::NotConnected, "stream is closed"))
    }
}

impl CallStream for TcpCallStream {
    async fn connect(config: &ClientConfig) -> Result<Self, StreamError> {
        let endpoint = config.endpoint().map_err(|err| StreamError::Fail(err.to_string()))?;
        match endpoint.connect_timeout {
            Some(deadline) => time::timeout(deadline, Self::establish(&endpoint))
                .await
                .map_err(|_| StreamError::Timeout(deadline))?,
            None => Self::establish(&endpoint).await,
        }
    }

    async fn close(&mut self) {
        self.connected = false;
        let _ = self.socket.shutdown().await;
    }

    async fn write(&mut self, frame: &[u8]) -> Result<(), StreamError> {
        if !self.connected {
            return Err(Self::not_open());
        }
        self.write_buf.try_reserve(frame.len()).map_err(|_| {
            StreamError::OutOfMemory(format!("cannot buffer a {} byte frame", frame.len()))
        })?;
        self.write_buf.extend_from_slice(frame);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), StreamError> {
        if !self.connected {
            return Err(Self::not_open());
        }
        if self.write_buf.is_empty() {
            return Ok(());
        }
        if let Err(err) = self.socket.write_all(&self.write_buf).await {
            self.connected = false;
            return Err(StreamError::System(err));
        }
        self.write_buf.clear();
        if let Err(err) = self.socket.flush().await {
            self.connected = false;
            return Err(StreamError::System(err));
        }
        Ok(())
    }

    async fn read_reply(&mut self) -> Result<Option<ReplyFrame>, StreamError> {
        if !self.connected {
            return Err(Self::not_open());
        }
        match self.next_frame().await? {
            Some(body) => Ok(Some(wire::decode_reply(body)?)),
            None => Ok(None),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
