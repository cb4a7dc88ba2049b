//! A connection that multiplexes concurrent calls over one stream.
//!
//! Callers issue calls from any task and get back a [`Request`] handle
//! immediately; replies are pumped by whoever invokes [`read_one`], and
//! each reply resolves the handle whose sync id it carries, in whatever
//! order the server answers. Closing the connection cancels everything
//! still in flight, so no handle is ever left unresolved behind a dead
//! stream.
//!
//! All shared state lives behind one internal lock: the stream, the
//! pending table, and the id counter move together, which is what makes
//! "register after write" safe against a reply racing back. A disconnect
//! flips a watch flag before taking that lock, so a reader parked in
//! [`read_one`] wakes up and lets go instead of pinning the lock forever.
//!
//! [`read_one`]: Connection::read_one

use std::fmt;
use std::io;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use super::config::ClientConfig;
use crate::error::Error;
use crate::pending::PendingTable;
use crate::reply::Reply;
use crate::request::Request;
use crate::stream::{CallStream, StreamError};
use crate::tcp::TcpCallStream;
use crate::wire;

/// Snapshot of the most recent transport fault.
#[derive(Debug, Clone, Default)]
struct LastError {
    code: u32,
    errno: i32,
    text: String,
}

/// Everything that must move together: the stream, the calls waiting on
/// it, and the id counter that names them.
struct Io<S> {
    stream: Option<S>,
    pending: PendingTable,
    next_id: u64,
}

/// A client connection multiplexing calls over a single [`CallStream`].
///
/// Cheap to share behind an [`Arc`]; every method takes `&self`. One
/// operation runs at a time, so concurrent callers queue on the internal
/// lock rather than interleaving bytes on the wire.
pub struct Connection<S: CallStream = TcpCallStream> {
    io: Mutex<Io<S>>,
    connected_tx: watch::Sender<bool>,
    connected_rx: watch::Receiver<bool>,
    last_error: StdMutex<LastError>,
    peer: Arc<str>,
    send_limit: usize,
}

fn not_connected() -> Error {
    Error::System(io::Error::new(io::ErrorKind::NotConnected, "connection is closed"))
}

impl Connection {
    /// Connects to the endpoint described by `config` over TCP.
    ///
    /// The configuration is validated before any I/O, so a malformed url
    /// fails with [`Error::InvalidArgument`] without touching the
    /// network.
    pub async fn connect(config: ClientConfig) -> Result<Self, Error> {
        Self::connect_with(config).await
    }
}

impl<S: CallStream> Connection<S> {
    /// Connects over a caller-chosen stream implementation.
    pub async fn connect_with(config: ClientConfig) -> Result<Self, Error> {
        let endpoint = config.endpoint()?;
        let stream = S::connect(&config).await?;
        info!(url = %config.url, "connected");
        Ok(Self::assemble(stream, Arc::from(config.url.as_str()), endpoint.send_limit))
    }

    /// Wraps a stream that is already established and handshaken.
    pub fn from_stream(stream: S) -> Self {
        Self::assemble(stream, Arc::from("custom"), wire::DEFAULT_SEND_LIMIT)
    }

    fn assemble(stream: S, peer: Arc<str>, send_limit: usize) -> Self {
        let (connected_tx, connected_rx) = watch::channel(true);
        Connection {
            io: Mutex::new(Io {
                stream: Some(stream),
                pending: PendingTable::new(),
                next_id: 1,
            }),
            connected_tx,
            connected_rx,
            last_error: StdMutex::new(LastError::default()),
            peer,
            send_limit,
        }
    }

    /// Issues a call and returns its handle without waiting for the
    /// reply.
    ///
    /// The frame is written and flushed before the handle is registered;
    /// both happen under the same lock that serializes reads, so a reply
    /// cannot be routed before its call is in the table. The handle
    /// resolves once a matching reply is read or the connection closes.
    pub async fn call(&self, function: &str, args: &[u8]) -> Result<Request, Error> {
        if function.is_empty() {
            return Err(Error::InvalidArgument("function name must not be empty".into()));
        }
        if function.len() > wire::MAX_NAME_LEN {
            return Err(Error::InvalidArgument(format!(
                "function name of {} bytes exceeds {} bytes",
                function.len(),
                wire::MAX_NAME_LEN
            )));
        }

        let mut guard = self.io.lock().await;
        let io = &mut *guard;
        let Some(stream) = io.stream.as_mut() else {
            return Err(not_connected());
        };

        let id = io.next_id;
        io.next_id = io.next_id.wrapping_add(1);
        if io.next_id == wire::HANDSHAKE_SYNC {
            io.next_id = 1;
        }

        let frame = match wire::encode_call(function, id, args, self.send_limit) {
            Ok(frame) => frame,
            Err(err) => {
                self.record(&err);
                return Err(err.into());
            }
        };

        let mut outcome = stream.write(&frame).await;
        if outcome.is_ok() {
            outcome = stream.flush().await;
        }
        if let Err(err) = outcome {
            self.record(&err);
            if err.is_fatal() {
                warn!(id, error = %err, "write failed, closing");
                self.close_and_drain(io).await;
            }
            return Err(err.into());
        }

        let request = Request::new(id, Arc::clone(&self.peer));
        io.pending.insert(id, request.clone());
        debug!(id, function, args_len = args.len(), "call issued");
        Ok(request)
    }

    /// Reads at most one reply and resolves the call it answers.
    ///
    /// Returns the resolved handle, or `None` when the stream had
    /// nothing to deliver. A reply whose sync id matches no pending call
    /// is reported as [`Error::Sync`] and changes nothing else. Blocks
    /// while the stream blocks, but a concurrent [`disconnect`] breaks
    /// the wait.
    ///
    /// [`disconnect`]: Connection::disconnect
    pub async fn read_one(&self) -> Result<Option<Request>, Error> {
        let mut guard = self.io.lock().await;
        let io = &mut *guard;
        let Some(stream) = io.stream.as_mut() else {
            return Err(not_connected());
        };

        let mut connected = self.connected_rx.clone();
        let outcome = tokio::select! {
            outcome = stream.read_reply() => outcome,
            _ = connected.wait_for(|still| !*still) => return Err(not_connected()),
        };

        match outcome {
            Ok(Some(frame)) => {
                let id = frame.sync;
                match io.pending.remove_and_get(id) {
                    Some(request) => {
                        let code = frame.code;
                        request.publish(Reply::from_frame(frame));
                        debug!(id, code, "reply routed");
                        Ok(Some(request))
                    }
                    None => {
                        warn!(id, "reply matches no pending call");
                        Err(Error::Sync { id })
                    }
                }
            }
            Ok(None) => {
                if io.stream.as_ref().is_some_and(|stream| stream.is_connected()) {
                    // Transport had nothing to deliver; still open.
                    return Ok(None);
                }
                if io.pending.is_empty() {
                    self.close_and_drain(io).await;
                    return Ok(None);
                }
                let err = StreamError::System(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("stream closed with {} calls pending", io.pending.len()),
                ));
                self.record(&err);
                self.close_and_drain(io).await;
                Err(err.into())
            }
            Err(err) => {
                self.record(&err);
                if err.is_fatal() {
                    warn!(error = %err, "read failed, closing");
                    self.close_and_drain(io).await;
                }
                Err(err.into())
            }
        }
    }

    /// Closes the connection and cancels every pending call.
    ///
    /// Each unresolved handle is published the fixed cancellation reply,
    /// so waiters observe a terminal state instead of hanging. Safe to
    /// call at any time, from any task, repeatedly.
    pub async fn disconnect(&self) {
        // Flip the flag first so a parked reader releases the lock.
        self.connected_tx.send_replace(false);
        let mut guard = self.io.lock().await;
        self.close_and_drain(&mut guard).await;
        info!(peer = %self.peer, "disconnected");
    }

    /// Whether the connection considers itself open. Purely
    /// observational; never performs I/O.
    pub fn is_connected(&self) -> bool {
        *self.connected_rx.borrow()
    }

    /// Numeric code of the most recent transport fault, zero if none.
    pub fn last_error_code(&self) -> u32 {
        self.snapshot().code
    }

    /// OS errno of the most recent transport fault, zero if none.
    pub fn last_errno(&self) -> i32 {
        self.snapshot().errno
    }

    /// Text of the most recent transport fault, empty if none.
    pub fn last_error_text(&self) -> String {
        self.snapshot().text
    }

    async fn close_and_drain(&self, io: &mut Io<S>) {
        self.connected_tx.send_replace(false);
        if let Some(mut stream) = io.stream.take() {
            stream.close().await;
        }
        if !io.pending.is_empty() {
            debug!(canceled = io.pending.len(), "canceling pending calls");
        }
        io.pending.drain_all(|request| request.publish(Reply::canceled()));
    }

    fn record(&self, err: &StreamError) {
        let mut last = self.last_error.lock().unwrap_or_else(PoisonError::into_inner);
        last.code = err.code();
        last.errno = err.errno();
        last.text = err.to_string();
    }

    fn snapshot(&self) -> LastError {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<S: CallStream> fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl<S: CallStream> Drop for Connection<S> {
    fn drop(&mut self) {
        // The stream closes when its half drops; handles must not be
        // left unresolved.
        self.io
            .get_mut()
            .pending
            .drain_all(|request| request.publish(Reply::canceled()));
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;
    use crate::reply::{CANCEL_CODE, CANCEL_MESSAGE};
    use crate::wire::ReplyFrame;

    enum ReadStep {
        Reply(ReplyFrame),
        /// Transport-level "nothing to deliver", stream still open.
        NoData,
        /// Peer closed cleanly at a frame boundary.
        Eof,
        Fault(StreamError),
        /// Parks the reader until it is interrupted.
        Block,
    }

    fn reply(sync: u64, code: i32, body: &'static [u8]) -> ReadStep {
        ReadStep::Reply(ReplyFrame { sync, code, body: Bytes::from_static(body) })
    }

    struct MockStream {
        script: VecDeque<ReadStep>,
        written: Arc<StdMutex<Vec<Vec<u8>>>>,
        flushes: Arc<StdMutex<usize>>,
        fail_write: Arc<StdMutex<Option<StreamError>>>,
        connected: bool,
    }

    impl MockStream {
        fn new(script: impl IntoIterator<Item = ReadStep>) -> Self {
            MockStream {
                script: script.into_iter().collect(),
                written: Arc::default(),
                flushes: Arc::default(),
                fail_write: Arc::default(),
                connected: true,
            }
        }

        fn written(&self) -> Arc<StdMutex<Vec<Vec<u8>>>> {
            Arc::clone(&self.written)
        }

        fn flushes(&self) -> Arc<StdMutex<usize>> {
            Arc::clone(&self.flushes)
        }

        fn fail_write(&self) -> Arc<StdMutex<Option<StreamError>>> {
            Arc::clone(&self.fail_write)
        }
    }

    impl CallStream for MockStream {
        async fn connect(_config: &ClientConfig) -> Result<Self, StreamError> {
            Ok(MockStream::new([]))
        }

        async fn close(&mut self) {
            self.connected = false;
        }

        async fn write(&mut self, frame: &[u8]) -> Result<(), StreamError> {
            if let Some(err) = self.fail_write.lock().unwrap().take() {
                if err.is_fatal() {
                    self.connected = false;
                }
                return Err(err);
            }
            self.written.lock().unwrap().push(frame.to_vec());
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), StreamError> {
            *self.flushes.lock().unwrap() += 1;
            Ok(())
        }

        async fn read_reply(&mut self) -> Result<Option<ReplyFrame>, StreamError> {
            match self.script.pop_front() {
                Some(ReadStep::Reply(frame)) => Ok(Some(frame)),
                Some(ReadStep::NoData) => Ok(None),
                Some(ReadStep::Eof) => {
                    self.connected = false;
                    Ok(None)
                }
                Some(ReadStep::Fault(err)) => {
                    if err.is_fatal() {
                        self.connected = false;
                    }
                    Err(err)
                }
                Some(ReadStep::Block) | None => std::future::pending().await,
            }
        }

        fn is_connected(&self) -> bool {
            self.connected
        }
    }

    fn canceled_text() -> Option<Bytes> {
        Some(Bytes::from_static(CANCEL_MESSAGE.as_bytes()))
    }

    #[tokio::test]
    async fn calls_get_unique_increasing_ids() {
        let conn = Connection::from_stream(MockStream::new([]));
        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(conn.call("echo", b"x").await.unwrap().id());
        }
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn issued_frames_carry_name_id_and_payload() {
        let mock = MockStream::new([]);
        let written = mock.written();
        let flushes = mock.flushes();
        let conn = Connection::from_stream(mock);

        let request = conn.call("sum", b"\x01\x02").await.unwrap();

        let frames = written.lock().unwrap();
        assert_eq!(frames.len(), 1);
        let call = wire::decode_call(Bytes::copy_from_slice(&frames[0][4..])).unwrap();
        assert_eq!(call.function, "sum");
        assert_eq!(call.sync, request.id());
        assert_eq!(&call.args[..], b"\x01\x02");
        assert_eq!(*flushes.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn bad_function_names_are_rejected_before_io() {
        let mock = MockStream::new([]);
        let written = mock.written();
        let conn = Connection::from_stream(mock);

        let err = conn.call("", b"").await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let huge = "f".repeat(wire::MAX_NAME_LEN + 1);
        let err = conn.call(&huge, b"").await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        assert!(written.lock().unwrap().is_empty());
        // Rejected calls burn no ids.
        assert_eq!(conn.call("ok", b"").await.unwrap().id(), 1);
    }

    #[tokio::test]
    async fn replies_resolve_their_own_call_in_any_order() {
        let conn = Connection::from_stream(MockStream::new([
            reply(2, 0, b"second"),
            reply(1, 0, b"first"),
        ]));
        let first = conn.call("a", b"").await.unwrap();
        let second = conn.call("b", b"").await.unwrap();

        let routed = conn.read_one().await.unwrap().unwrap();
        assert_eq!(routed, second);
        assert!(second.is_ready());
        assert!(!first.is_ready());
        assert_eq!(second.result(), Some(Bytes::from_static(b"second")));

        let routed = conn.read_one().await.unwrap().unwrap();
        assert_eq!(routed, first);
        assert_eq!(first.result(), Some(Bytes::from_static(b"first")));
        assert_eq!(first.error(), None);
    }

    #[tokio::test]
    async fn fault_replies_resolve_with_the_error() {
        let conn = Connection::from_stream(MockStream::new([reply(1, 7, b"no such function")]));
        let request = conn.call("nope", b"").await.unwrap();

        conn.read_one().await.unwrap();
        assert!(request.is_ready());
        assert_eq!(request.error(), Some(Bytes::from_static(b"no such function")));
        assert_eq!(request.result(), None);
        assert_eq!(request.reply().unwrap().code(), 7);
    }

    #[tokio::test]
    async fn unknown_sync_id_leaves_pending_calls_untouched() {
        let conn = Connection::from_stream(MockStream::new([
            reply(99, 0, b""),
            reply(1, 0, b"late"),
        ]));
        let request = conn.call("a", b"").await.unwrap();

        let err = conn.read_one().await.unwrap_err();
        assert!(matches!(err, Error::Sync { id: 99 }));
        assert!(conn.is_connected());
        assert!(!request.is_ready());

        // The pending call still resolves afterwards.
        conn.read_one().await.unwrap();
        assert_eq!(request.result(), Some(Bytes::from_static(b"late")));
    }

    #[tokio::test]
    async fn no_data_passes_through_as_none() {
        let conn = Connection::from_stream(MockStream::new([ReadStep::NoData]));
        let request = conn.call("a", b"").await.unwrap();

        assert!(conn.read_one().await.unwrap().is_none());
        assert!(conn.is_connected());
        assert!(!request.is_ready());
    }

    #[tokio::test]
    async fn disconnect_cancels_all_pending_calls() {
        let conn = Connection::from_stream(MockStream::new([]));
        let a = conn.call("a", b"").await.unwrap();
        let b = conn.call("b", b"").await.unwrap();

        conn.disconnect().await;
        assert!(!conn.is_connected());
        for request in [&a, &b] {
            assert!(request.is_ready());
            assert_eq!(request.error(), canceled_text());
            assert_eq!(request.result(), None);
            assert_eq!(request.reply().unwrap().code(), CANCEL_CODE);
        }

        // Everything after the close fails fast.
        assert!(matches!(conn.call("c", b"").await, Err(Error::System(_))));
        assert!(matches!(conn.read_one().await, Err(Error::System(_))));

        // And a second disconnect is a no-op.
        conn.disconnect().await;
        assert_eq!(a.error(), canceled_text());
    }

    #[tokio::test]
    async fn disconnect_interrupts_a_parked_reader() {
        let conn = Arc::new(Connection::from_stream(MockStream::new([ReadStep::Block])));
        let request = conn.call("slow", b"").await.unwrap();

        let reader = tokio::spawn({
            let conn = Arc::clone(&conn);
            async move { conn.read_one().await }
        });
        tokio::task::yield_now().await;

        conn.disconnect().await;
        let outcome = reader.await.unwrap();
        assert!(outcome.is_err());
        assert!(request.is_ready());
        assert_eq!(request.error(), canceled_text());
    }

    #[tokio::test]
    async fn fatal_read_fault_closes_and_cancels() {
        let conn = Connection::from_stream(MockStream::new([ReadStep::Fault(
            StreamError::System(io::Error::from_raw_os_error(104)),
        )]));
        let request = conn.call("a", b"").await.unwrap();

        let err = conn.read_one().await.unwrap_err();
        assert!(matches!(err, Error::System(_)));
        assert!(!conn.is_connected());
        assert!(request.is_ready());
        assert_eq!(request.error(), canceled_text());

        assert_eq!(conn.last_error_code(), StreamError::CODE_SYSTEM);
        assert_eq!(conn.last_errno(), 104);
        assert!(!conn.last_error_text().is_empty());
    }

    #[tokio::test]
    async fn nonfatal_faults_leave_the_connection_open() {
        let conn = Connection::from_stream(MockStream::new([
            ReadStep::Fault(StreamError::Frame("garbage header".into())),
            reply(1, 0, b"ok"),
        ]));
        let request = conn.call("a", b"").await.unwrap();

        let err = conn.read_one().await.unwrap_err();
        assert!(matches!(err, Error::Unknown(_)));
        assert!(conn.is_connected());
        assert!(!request.is_ready());
        assert_eq!(conn.last_error_code(), StreamError::CODE_FRAME);

        conn.read_one().await.unwrap();
        assert_eq!(request.result(), Some(Bytes::from_static(b"ok")));
    }

    #[tokio::test]
    async fn fatal_write_fault_closes_and_cancels() {
        let mock = MockStream::new([]);
        let fail_write = mock.fail_write();
        let conn = Connection::from_stream(mock);

        let earlier = conn.call("a", b"").await.unwrap();
        *fail_write.lock().unwrap() =
            Some(StreamError::System(io::Error::from_raw_os_error(32)));

        let err = conn.call("b", b"").await.unwrap_err();
        assert!(matches!(err, Error::System(_)));
        assert!(!conn.is_connected());
        assert_eq!(conn.last_errno(), 32);

        // The call that was already in flight is canceled with the rest.
        assert!(earlier.is_ready());
        assert_eq!(earlier.error(), canceled_text());
    }

    #[tokio::test]
    async fn eof_with_calls_pending_cancels_them() {
        let conn = Connection::from_stream(MockStream::new([ReadStep::Eof]));
        let request = conn.call("a", b"").await.unwrap();

        let err = conn.read_one().await.unwrap_err();
        assert!(matches!(err, Error::System(_)));
        assert!(!conn.is_connected());
        assert!(request.is_ready());
        assert_eq!(request.error(), canceled_text());
    }

    #[tokio::test]
    async fn eof_when_idle_is_a_clean_end() {
        let conn = Connection::from_stream(MockStream::new([ReadStep::Eof]));
        assert!(conn.read_one().await.unwrap().is_none());
        assert!(!conn.is_connected());
        assert!(conn.read_one().await.is_err());
    }

    #[tokio::test]
    async fn oversized_request_leaves_the_connection_usable() {
        let config = ClientConfig::new("tcp://127.0.0.1:1").with_send_buf_size(64);
        let conn = Connection::<MockStream>::connect_with(config).await.unwrap();

        let err = conn.call("echo", &[0u8; 256]).await.unwrap_err();
        assert!(matches!(err, Error::TooLargeRequest { .. }));
        assert!(conn.is_connected());
        assert_eq!(conn.last_error_code(), StreamError::CODE_BIG);
        assert_eq!(conn.last_errno(), 0);

        // The failed call burned its id but nothing else.
        let request = conn.call("echo", b"small").await.unwrap();
        assert_eq!(request.id(), 2);
    }

    #[tokio::test]
    async fn dropping_the_connection_cancels_pending_calls() {
        let conn = Connection::from_stream(MockStream::new([]));
        let request = conn.call("a", b"").await.unwrap();

        drop(conn);
        assert!(request.is_ready());
        assert_eq!(request.error(), canceled_text());
    }

    #[tokio::test]
    async fn connect_rejects_a_bad_url_before_io() {
        let err = Connection::connect(ClientConfig::new("")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn debug_output_shows_peer_and_liveness() {
        // The stream type itself carries no Debug impl; the rendering
        // must not depend on it.
        let conn = Connection::from_stream(MockStream::new([]));
        let rendered = format!("{conn:?}");
        assert!(rendered.contains("custom"));
        assert!(rendered.contains("connected: true"));

        conn.disconnect().await;
        assert!(format!("{conn:?}").contains("connected: false"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn a_reply_racing_disconnect_resolves_exactly_once() {
        for _ in 0..50 {
            let conn = Arc::new(Connection::from_stream(MockStream::new([reply(
                1,
                0,
                b"real",
            )])));
            let request = conn.call("work", b"").await.unwrap();

            let reader = tokio::spawn({
                let conn = Arc::clone(&conn);
                async move {
                    let _ = conn.read_one().await;
                }
            });
            conn.disconnect().await;
            reader.await.unwrap();

            // Whichever side won, the handle holds exactly one terminal
            // reply: the real result or the fixed cancellation.
            assert!(request.is_ready());
            match request.reply().unwrap().code() {
                0 => {
                    assert_eq!(request.result(), Some(Bytes::from_static(b"real")));
                    assert_eq!(request.error(), None);
                }
                code => {
                    assert_eq!(code, CANCEL_CODE);
                    assert_eq!(request.error(), canceled_text());
                    assert_eq!(request.result(), None);
                }
            }
        }
    }

    #[tokio::test]
    async fn ping_round_trip_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("tcp://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket
                .write_all(&wire::encode_reply(wire::HANDSHAKE_SYNC, 0, b"demo"))
                .await
                .unwrap();
            let len = socket.read_u32().await.unwrap() as usize;
            let mut body = vec![0u8; len];
            socket.read_exact(&mut body).await.unwrap();
            let call = wire::decode_call(Bytes::from(body)).unwrap();
            socket
                .write_all(&wire::encode_reply(call.sync, 0, b""))
                .await
                .unwrap();
            let _ = socket.read_u8().await;
        });

        let conn = Connection::connect(
            ClientConfig::new(url).with_connect_timeout(Duration::from_secs(5)),
        )
        .await
        .unwrap();
        assert!(conn.is_connected());

        let request = conn.call("ping", b"").await.unwrap();
        let routed = conn.read_one().await.unwrap().unwrap();
        assert_eq!(routed, request);
        assert_eq!(request.result(), Some(Bytes::new()));
        assert_eq!(request.error(), None);

        conn.disconnect().await;
        assert!(!conn.is_connected());
    }
}
