//! Stdio transport: line-delimited JSON-RPC over a subordinate process.
//!
//! One reader task owns the inbound half and dispatches whichever frame
//! arrives next; callers of [`Transport::request`] park on a `oneshot`
//! registered in the pending table under their correlation id.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use toolwire_core::config::ServerConfig;
use toolwire_core::protocol::{methods, Frame, FrameKind, RequestId, RpcError};
use toolwire_core::utils::{expand_home, truncate_string};

use crate::error::TransportError;

/// Callback for backend notifications; receives the `params` payload.
pub type NotificationHandler = Arc<dyn Fn(Option<Value>) + Send + Sync>;

type Reply = Result<Value, RpcError>;
type PendingMap = Arc<Mutex<HashMap<RequestId, oneshot::Sender<Reply>>>>;
type HandlerMap = Arc<std::sync::RwLock<HashMap<String, NotificationHandler>>>;
type SharedWriter = Arc<Mutex<Option<Box<dyn AsyncWrite + Send + Unpin>>>>;

/// Grace period used when a transport is built over plain streams.
const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

// ─────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────

/// A framed, correlated message channel to one tool backend.
pub struct Transport {
    /// Name used in logs.
    name: String,
    /// Outbound half; `None` once closed.
    writer: SharedWriter,
    /// Correlation id → waiting caller.
    pending: PendingMap,
    /// Notification method → handler.
    handlers: HandlerMap,
    next_id: AtomicU64,
    /// Set when the connection is unusable (EOF, write failure, close).
    closed: Arc<AtomicBool>,
    /// Set once `close()` has run.
    shut_down: AtomicBool,
    timeout: Duration,
    shutdown_grace: Duration,
    reader: std::sync::Mutex<Option<JoinHandle<()>>>,
    child: Mutex<Option<Child>>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Transport {
    /// Launch the backend described by `config` and wire its stdio.
    ///
    /// stderr is inherited so backend diagnostics reach the user's terminal
    /// without touching the frame channel.
    pub fn spawn(config: &ServerConfig) -> Result<Self, TransportError> {
        let launch_error = |source: std::io::Error| TransportError::ProcessLaunch {
            command: config.command.clone(),
            source,
        };

        let mut command = Command::new(&config.command);
        command
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(ref cwd) = config.cwd {
            command.current_dir(expand_home(cwd));
        }

        let mut child = command.spawn().map_err(launch_error)?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| launch_error(std::io::Error::other("stdin not captured")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| launch_error(std::io::Error::other("stdout not captured")))?;

        info!(
            server = %config.name,
            command = %config.command,
            args = ?config.args,
            pid = child.id(),
            "tool backend started"
        );

        Ok(Self::build(
            config.name.clone(),
            stdout,
            stdin,
            config.request_timeout(),
            config.shutdown_grace(),
            Some(child),
        ))
    }

    /// Run the protocol over an existing stream pair (in-process backends).
    pub fn from_streams<R, W>(reader: R, writer: W, timeout: Duration) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::build(
            "in-process".to_string(),
            reader,
            writer,
            timeout,
            DEFAULT_SHUTDOWN_GRACE,
            None,
        )
    }

    fn build<R, W>(
        name: String,
        reader: R,
        writer: W,
        timeout: Duration,
        shutdown_grace: Duration,
        child: Option<Child>,
    ) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let writer: SharedWriter = Arc::new(Mutex::new(Some(Box::new(writer))));
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let handlers: HandlerMap = Arc::new(std::sync::RwLock::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let inbound = Inbound {
            name: name.clone(),
            writer: writer.clone(),
            pending: pending.clone(),
            handlers: handlers.clone(),
            closed: closed.clone(),
        };
        let reader_task = tokio::spawn(inbound.run(reader));

        Transport {
            name,
            writer,
            pending,
            handlers,
            next_id: AtomicU64::new(1),
            closed,
            shut_down: AtomicBool::new(false),
            timeout,
            shutdown_grace,
            reader: std::sync::Mutex::new(Some(reader_task)),
            child: Mutex::new(child),
        }
    }

    /// Write one frame as a single line.
    pub async fn send(&self, frame: &Frame) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let result = write_frame(&self.writer, frame).await;
        if matches!(result, Err(TransportError::Closed)) {
            self.closed.store(true, Ordering::SeqCst);
        }
        result
    }

    /// Send a notification; no reply is expected.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), TransportError> {
        debug!(server = %self.name, method = method, "sending notification");
        self.send(&Frame::notification(method, params)).await
    }

    /// Send a request and wait for the response with the same id.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        // The reader flags `closed` before draining the table, so an entry
        // inserted after the drain is caught here.
        if self.is_closed() {
            self.pending.lock().await.remove(&id);
            return Err(TransportError::Closed);
        }

        debug!(server = %self.name, id = %id, method = method, "sending request");
        if let Err(e) = self.send(&Frame::request(id.clone(), method, params)).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(rpc))) => {
                debug!(server = %self.name, id = %id, error = %rpc, "request failed remotely");
                Err(TransportError::Remote(rpc))
            }
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                warn!(
                    server = %self.name,
                    id = %id,
                    method = method,
                    timeout = ?self.timeout,
                    "request timed out"
                );
                Err(TransportError::Timeout {
                    method: method.to_string(),
                    after: self.timeout,
                })
            }
        }
    }

    /// Register a handler for a notification method (replaces any previous one).
    pub fn on_notification<F>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(Option<Value>) + Send + Sync + 'static,
    {
        if let Ok(mut handlers) = self.handlers.write() {
            handlers.insert(method.into(), Arc::new(handler));
        }
    }

    /// Close both streams, stop the backend and fail outstanding requests.
    /// Safe to call more than once.
    pub async fn close(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.closed.store(true, Ordering::SeqCst);

        // Dropping stdin is the graceful stop signal for a stdio server.
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }

        if let Some(mut child) = self.child.lock().await.take() {
            match tokio::time::timeout(self.shutdown_grace, child.wait()).await {
                Ok(Ok(status)) => {
                    info!(server = %self.name, status = %status, "tool backend exited");
                }
                Ok(Err(e)) => {
                    warn!(server = %self.name, error = %e, "failed to wait for tool backend");
                }
                Err(_) => {
                    warn!(server = %self.name, "tool backend did not exit in time, killing");
                    if let Err(e) = child.kill().await {
                        warn!(server = %self.name, error = %e, "failed to kill tool backend");
                    }
                }
            }
        }

        if let Some(handle) = self.reader.lock().ok().and_then(|mut r| r.take()) {
            handle.abort();
        }

        fail_all(&self.pending).await;
        debug!(server = %self.name, "transport closed");
    }

    /// Whether the connection can no longer carry requests.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of requests still waiting for a reply.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Name used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        if let Some(handle) = self.reader.lock().ok().and_then(|mut r| r.take()) {
            handle.abort();
        }
    }
}

// ─────────────────────────────────────────────
// Inbound reader
// ─────────────────────────────────────────────

/// State shared with the reader task.
struct Inbound {
    name: String,
    writer: SharedWriter,
    pending: PendingMap,
    handlers: HandlerMap,
    closed: Arc<AtomicBool>,
}

impl Inbound {
    async fn run<R>(self, reader: R)
    where
        R: AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => {
                    debug!(server = %self.name, "backend closed its output stream");
                    break;
                }
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    if line.trim().is_empty() {
                        continue;
                    }
                    self.dispatch(&line).await;
                }
                Err(e) => {
                    warn!(server = %self.name, error = %e, "failed to read from backend");
                    break;
                }
            }
        }

        self.closed.store(true, Ordering::SeqCst);
        fail_all(&self.pending).await;
    }

    async fn dispatch(&self, line: &str) {
        let frame = match Frame::decode(line) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(
                    server = %self.name,
                    error = %e,
                    line = %truncate_string(line.trim(), 200),
                    "dropping malformed frame"
                );
                return;
            }
        };

        match frame.kind() {
            Some(FrameKind::Response) => self.resolve(frame).await,
            Some(FrameKind::Notification) => self.notify(frame),
            Some(FrameKind::Request) => self.answer(frame).await,
            None => warn!(server = %self.name, "dropping frame of unknown kind"),
        }
    }

    async fn resolve(&self, frame: Frame) {
        let Some(id) = frame.id else {
            if let Some(err) = frame.error {
                warn!(server = %self.name, error = %err, "backend reported an uncorrelated error");
            }
            return;
        };

        let waiter = self.pending.lock().await.remove(&id);
        let Some(tx) = waiter else {
            warn!(server = %self.name, id = %id, "response for unknown or already answered request");
            return;
        };

        let reply = match frame.error {
            Some(err) => Err(err),
            None => Ok(frame.result.unwrap_or(Value::Null)),
        };
        if tx.send(reply).is_err() {
            debug!(server = %self.name, id = %id, "caller stopped waiting before the reply arrived");
        }
    }

    fn notify(&self, frame: Frame) {
        let method = frame.method.unwrap_or_default();
        let handler = self
            .handlers
            .read()
            .ok()
            .and_then(|handlers| handlers.get(&method).cloned());

        match handler {
            Some(handler) => handler(frame.params),
            None => debug!(server = %self.name, method = %method, "no handler for notification"),
        }
    }

    /// Backends may ping us; anything else is unsupported.
    async fn answer(&self, frame: Frame) {
        let method = frame.method.unwrap_or_default();
        let Some(id) = frame.id else { return };

        let reply = if method == methods::PING {
            Frame::response(id, json!({}))
        } else {
            debug!(server = %self.name, method = %method, "rejecting backend request");
            Frame::error_response(Some(id), RpcError::method_not_found(&method))
        };

        if let Err(e) = write_frame(&self.writer, &reply).await {
            warn!(server = %self.name, error = %e, "failed to answer backend request");
        }
    }
}

// ─────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────

/// Encode `frame` and write it plus `\n` under the writer lock.
async fn write_frame(writer: &SharedWriter, frame: &Frame) -> Result<(), TransportError> {
    let mut line = frame.encode()?;
    line.push('\n');

    let mut guard = writer.lock().await;
    let Some(w) = guard.as_mut() else {
        return Err(TransportError::Closed);
    };

    let written = async {
        w.write_all(line.as_bytes()).await?;
        w.flush().await
    }
    .await;

    written.map_err(|e| match e.kind() {
        std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::ConnectionReset => {
            TransportError::Closed
        }
        _ => TransportError::Io(e),
    })
}

/// Drop every waiter; their receivers observe `Closed`.
async fn fail_all(pending: &PendingMap) {
    let mut pending = pending.lock().await;
    if !pending.is_empty() {
        warn!(count = pending.len(), "failing requests left without a reply");
    }
    pending.clear();
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fake_backend, response_line};
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_request_resolves_matching_response() {
        let (transport, received) = fake_backend(Duration::from_secs(5), |frame| {
            vec![response_line(frame, json!({ "echo": frame.method }))]
        });

        let result = transport.request("tools/list", None).await.unwrap();
        assert_eq!(result["echo"], "tools/list");
        assert_eq!(received.lock().unwrap().len(), 1);
        assert_eq!(transport.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_out_of_order_replies_are_correlated() {
        // Hold the first request back and answer both when the second arrives.
        let mut held: Option<Frame> = None;
        let (transport, _) = fake_backend(Duration::from_secs(5), move |frame| {
            match held.take() {
                None => {
                    held = Some(frame.clone());
                    vec![]
                }
                Some(first) => vec![
                    response_line(frame, json!({ "method": frame.method })),
                    response_line(&first, json!({ "method": first.method })),
                ],
            }
        });

        let (a, b) = tokio::join!(
            transport.request("first", None),
            transport.request("second", None)
        );
        assert_eq!(a.unwrap()["method"], "first");
        assert_eq!(b.unwrap()["method"], "second");
    }

    #[tokio::test]
    async fn test_duplicate_response_is_ignored() {
        let (transport, _) = fake_backend(Duration::from_secs(5), |frame| {
            let line = response_line(frame, json!({ "n": frame.id }));
            vec![line.clone(), line]
        });

        let first = transport.request("a", None).await.unwrap();
        let second = transport.request("b", None).await.unwrap();
        assert_eq!(first["n"], 1);
        assert_eq!(second["n"], 2);
        assert_eq!(transport.pending_count().await, 0);
        assert!(!transport.is_closed());
    }

    #[tokio::test]
    async fn test_malformed_frame_is_skipped() {
        let (transport, _) = fake_backend(Duration::from_secs(5), |frame| {
            vec![
                "Starting server...".to_string(),
                r#"{"jsonrpc":"2.0","id":99}"#.to_string(),
                response_line(frame, json!("ok")),
            ]
        });

        let result = transport.request("ping", None).await.unwrap();
        assert_eq!(result, json!("ok"));
    }

    #[tokio::test]
    async fn test_null_result_resolves_request() {
        let (transport, _) = fake_backend(Duration::from_millis(300), |frame| {
            let id = frame.id.clone().unwrap_or(0.into());
            vec![format!(r#"{{"jsonrpc":"2.0","id":{id},"result":null}}"#)]
        });

        let result = transport.request("custom/method", None).await.unwrap();
        assert_eq!(result, Value::Null);
        assert_eq!(transport.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_timeout_removes_pending_entry() {
        let (transport, received) = fake_backend(Duration::from_millis(50), |_| vec![]);

        let err = transport.request("tools/call", None).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout { ref method, .. } if method == "tools/call"));
        assert_eq!(transport.pending_count().await, 0);
        assert_eq!(received.lock().unwrap().len(), 1);

        // The transport stays usable after a timeout.
        assert!(!transport.is_closed());
    }

    #[tokio::test]
    async fn test_remote_error_is_surfaced() {
        let (transport, _) = fake_backend(Duration::from_secs(5), |frame| {
            let reply = Frame::error_response(
                frame.id.clone(),
                RpcError::method_not_found(frame.method.as_deref().unwrap_or("")),
            );
            vec![reply.encode().unwrap()]
        });

        let err = transport.request("resources/list", None).await.unwrap_err();
        match err {
            TransportError::Remote(rpc) => assert_eq!(rpc.code, -32601),
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_backend_exit_fails_pending_requests() {
        let (client_side, server_side) = tokio::io::duplex(4096);
        let (client_read, client_write) = tokio::io::split(client_side);
        let transport = Transport::from_streams(client_read, client_write, Duration::from_secs(5));

        // Read the request, then hang up without answering.
        tokio::spawn(async move {
            let (server_read, _server_write) = tokio::io::split(server_side);
            let mut lines = BufReader::new(server_read).lines();
            let _ = lines.next_line().await;
        });

        let err = transport.request("tools/list", None).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
        assert!(transport.is_closed());
        assert_eq!(transport.pending_count().await, 0);

        // Later requests fail fast.
        assert!(matches!(
            transport.request("ping", None).await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_notification_dispatch() {
        let hits = Arc::new(AtomicUsize::new(0));
        let (transport, _) = fake_backend(Duration::from_secs(5), |frame| {
            vec![
                Frame::notification("notifications/message", Some(json!({ "level": "info" })))
                    .encode()
                    .unwrap(),
                Frame::notification("notifications/unhandled", None)
                    .encode()
                    .unwrap(),
                response_line(frame, json!({})),
            ]
        });

        let counter = hits.clone();
        transport.on_notification("notifications/message", move |params| {
            assert_eq!(params.unwrap()["level"], "info");
            counter.fetch_add(1, Ordering::SeqCst);
        });

        transport.request("ping", None).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_backend_ping_is_answered() {
        let (transport, received) = fake_backend(Duration::from_secs(5), |frame| {
            if frame.method.as_deref() == Some("trigger") {
                vec![
                    Frame::request(RequestId::String("srv-1".into()), "ping", None)
                        .encode()
                        .unwrap(),
                    response_line(frame, json!({})),
                ]
            } else {
                vec![]
            }
        });

        transport.request("trigger", None).await.unwrap();

        // Give the client's reply time to reach the backend.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let frames = received.lock().unwrap();
        let pong = frames
            .iter()
            .find(|f| f.id == Some(RequestId::String("srv-1".into())))
            .expect("ping reply");
        assert_eq!(pong.kind(), Some(FrameKind::Response));
        assert_eq!(pong.result, Some(json!({})));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_stops_sending() {
        let (transport, received) =
            fake_backend(Duration::from_secs(5), |frame| vec![response_line(frame, json!({}))]);

        transport.request("ping", None).await.unwrap();
        transport.close().await;
        transport.close().await;

        assert!(transport.is_closed());
        assert!(matches!(
            transport.request("ping", None).await,
            Err(TransportError::Closed)
        ));
        assert!(matches!(
            transport.notify("notifications/initialized", None).await,
            Err(TransportError::Closed)
        ));
        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_spawn_missing_executable() {
        let config = ServerConfig {
            command: "/definitely/not/a/toolwire/backend".into(),
            ..Default::default()
        };
        let err = Transport::spawn(&config).unwrap_err();
        assert!(matches!(err, TransportError::ProcessLaunch { .. }));
        assert!(err.to_string().contains("/definitely/not/a/toolwire/backend"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawned_process_exit_closes_transport() {
        let config = ServerConfig {
            name: "exits".into(),
            command: "sh".into(),
            args: vec!["-c".into(), "read line; exit 0".into()],
            request_timeout_secs: 5,
            ..Default::default()
        };
        let transport = Transport::spawn(&config).unwrap();

        let err = transport.request("tools/list", None).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
        transport.close().await;
    }
}
