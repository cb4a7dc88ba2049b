//! A small call server for exercising the client end to end.
//!
//! Functions are registered by name and run as spawned tasks, so replies
//! go back in completion order rather than call order. That is the whole
//! point: a client multiplexing calls over one stream sees answers land
//! out of order and has to route them by sync id.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use callmux::wire;
use dashmap::DashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Boxed call handler: opaque argument bytes in, result payload or error
/// text out.
pub type Handler = Arc<
    dyn Fn(Bytes) -> Pin<Box<dyn Future<Output = Result<Bytes, String>> + Send>> + Send + Sync,
>;

/// Reply code for a fault raised by a registered function.
pub const CODE_FUNCTION_FAILED: i32 = 1;

/// Reply code for calls the server itself refuses.
pub const CODE_REFUSED: i32 = 2;

pub struct CallServer {
    functions: DashMap<String, Handler, ahash::RandomState>,
    credentials: Option<(String, String)>,
    banner: String,
}

impl CallServer {
    pub fn new(banner: impl Into<String>) -> Self {
        CallServer {
            functions: DashMap::default(),
            credentials: None,
            banner: banner.into(),
        }
    }

    /// Requires clients to present these credentials before calling.
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((user.into(), password.into()));
        self
    }

    /// Registers `function` under `name`, replacing any previous one.
    pub fn register<F, Fut>(&self, name: impl Into<String>, function: F)
    where
        F: Fn(Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Bytes, String>> + Send + 'static,
    {
        let function = Arc::new(function);
        let handler: Handler = Arc::new(move |args| {
            let function = Arc::clone(&function);
            Box::pin(async move { function(args).await })
        });
        self.functions.insert(name.into(), handler);
    }

    /// Accepts clients forever, serving each on its own task.
    pub async fn run(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        info!(addr = %listener.local_addr()?, "listening");
        loop {
            let (socket, peer) = listener.accept().await.context("accept failed")?;
            debug!(%peer, "client connected");
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(err) = server.serve(socket).await {
                    debug!(%peer, error = %err, "client session ended");
                }
            });
        }
    }

    async fn serve(self: Arc<Self>, socket: TcpStream) -> Result<()> {
        let (mut reader, writer) = socket.into_split();
        let writer = Arc::new(Mutex::new(writer));

        send_reply(&writer, wire::HANDSHAKE_SYNC, 0, self.banner.as_bytes()).await?;

        let mut authed = self.credentials.is_none();
        loop {
            let len = match reader.read_u32().await {
                Ok(len) => len as usize,
                // Client went away; nothing left to serve.
                Err(_) => return Ok(()),
            };
            if len > wire::DEFAULT_RECV_LIMIT {
                warn!(len, "dropping client after oversized frame");
                return Ok(());
            }
            let mut body = vec![0u8; len];
            reader.read_exact(&mut body).await?;
            let call = match wire::decode_call(Bytes::from(body)) {
                Ok(call) => call,
                Err(err) => {
                    warn!(error = %err, "dropping client after undecodable frame");
                    return Ok(());
                }
            };

            if call.sync == wire::HANDSHAKE_SYNC {
                authed = self.check_login(&writer, call).await?;
                if !authed {
                    return Ok(());
                }
                continue;
            }
            if !authed {
                send_reply(&writer, call.sync, CODE_REFUSED, b"not authenticated").await?;
                continue;
            }

            match self.functions.get(call.function.as_str()) {
                Some(entry) => {
                    let handler = Arc::clone(entry.value());
                    drop(entry);
                    let writer = Arc::clone(&writer);
                    debug!(function = %call.function, sync = call.sync, "dispatching");
                    tokio::spawn(async move {
                        let outcome = match handler(call.args).await {
                            Ok(result) => send_reply(&writer, call.sync, 0, &result).await,
                            Err(message) => {
                                send_reply(&writer, call.sync, CODE_FUNCTION_FAILED, message.as_bytes())
                                    .await
                            }
                        };
                        if let Err(err) = outcome {
                            debug!(error = %err, "reply write failed");
                        }
                    });
                }
                None => {
                    debug!(function = %call.function, "unknown function");
                    send_reply(
                        &writer,
                        call.sync,
                        CODE_REFUSED,
                        format!("unknown function '{}'", call.function).as_bytes(),
                    )
                    .await?;
                }
            }
        }
    }

    async fn check_login(
        &self,
        writer: &Arc<Mutex<OwnedWriteHalf>>,
        call: wire::CallFrame,
    ) -> Result<bool> {
        if call.function != wire::AUTH_FUNCTION {
            send_reply(writer, wire::HANDSHAKE_SYNC, CODE_REFUSED, b"expected a login").await?;
            return Ok(false);
        }
        let Some((user, password)) = &self.credentials else {
            // No credentials configured; accept whatever is offered.
            send_reply(writer, wire::HANDSHAKE_SYNC, 0, b"").await?;
            return Ok(true);
        };
        match wire::decode_auth_record(call.args) {
            Ok((offered_user, offered_password))
                if offered_user == *user && offered_password == *password =>
            {
                info!(user = %offered_user, "login accepted");
                send_reply(writer, wire::HANDSHAKE_SYNC, 0, b"").await?;
                Ok(true)
            }
            Ok((offered_user, _)) => {
                warn!(user = %offered_user, "login rejected");
                send_reply(writer, wire::HANDSHAKE_SYNC, CODE_FUNCTION_FAILED, b"invalid credentials")
                    .await?;
                Ok(false)
            }
            Err(err) => {
                send_reply(
                    writer,
                    wire::HANDSHAKE_SYNC,
                    CODE_FUNCTION_FAILED,
                    format!("bad credential record: {err}").as_bytes(),
                )
                .await?;
                Ok(false)
            }
        }
    }
}

async fn send_reply(
    writer: &Arc<Mutex<OwnedWriteHalf>>,
    sync: u64,
    code: i32,
    body: &[u8],
) -> Result<()> {
    let frame = wire::encode_reply(sync, code, body);
    let mut writer = writer.lock().await;
    writer.write_all(&frame).await?;
    Ok(())
}
