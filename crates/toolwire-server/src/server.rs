//! Stdio JSON-RPC server: reads one frame per line, answers on the writer.
//!
//! `initialize`, `tools/list` and `ping` are answered inline. Each
//! `tools/call` runs in its own task, so a slow tool never holds up the
//! frames behind it; replies share one writer behind a mutex and may go
//! out of order.

use std::sync::Arc;

use anyhow::Context;
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use toolwire_core::protocol::{codes, methods, FrameError, PROTOCOL_VERSION};
use toolwire_core::{Frame, FrameKind, RequestId, RpcError};

use crate::tools::ToolRegistry;

type SharedWriter<W> = Arc<Mutex<W>>;

// ─────────────────────────────────────────────
// ToolServer
// ─────────────────────────────────────────────

/// Serves a [`ToolRegistry`] over a line-delimited byte stream.
pub struct ToolServer {
    name: String,
    version: String,
    registry: Arc<ToolRegistry>,
}

impl ToolServer {
    pub fn new(name: impl Into<String>, registry: ToolRegistry) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            registry: Arc::new(registry),
        }
    }

    /// Serve until the reader hits EOF, then wait for in-flight calls.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> anyhow::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let writer: SharedWriter<W> = Arc::new(Mutex::new(writer));
        let mut lines = BufReader::new(reader).split(b'\n');
        let mut calls: JoinSet<()> = JoinSet::new();

        info!(server = %self.name, tools = self.registry.len(), "serving on stdio");

        loop {
            tokio::select! {
                line = lines.next_segment() => {
                    match line.context("failed to read from client")? {
                        Some(bytes) => {
                            let line = decode_line(&bytes);
                            self.handle_line(&line, &writer, &mut calls).await?
                        }
                        None => break,
                    }
                }
                Some(joined) = calls.join_next(), if !calls.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "tool call task failed");
                    }
                }
            }
        }

        debug!(in_flight = calls.len(), "client closed input");
        while let Some(joined) = calls.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "tool call task failed");
            }
        }
        info!("client disconnected");
        Ok(())
    }

    async fn handle_line<W>(
        &self,
        line: &str,
        writer: &SharedWriter<W>,
        calls: &mut JoinSet<()>,
    ) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        if line.trim().is_empty() {
            return Ok(());
        }

        let frame = match Frame::decode(line) {
            Ok(frame) => frame,
            Err(FrameError::Json(e)) => {
                warn!(error = %e, "unparsable frame");
                let reply = json!({
                    "jsonrpc": "2.0",
                    "id": null,
                    "error": RpcError::new(codes::PARSE_ERROR, format!("Parse error: {e}")),
                });
                return write_line(writer, &reply.to_string()).await;
            }
            Err(FrameError::Shape) => {
                warn!("frame is neither request, response nor notification");
                let reply = Frame::error_response(
                    None,
                    RpcError::new(codes::INVALID_REQUEST, "Invalid Request"),
                );
                return write_frame(writer, &reply).await;
            }
        };

        match (frame.kind(), frame.id, frame.method) {
            (Some(FrameKind::Request), Some(id), Some(method)) => {
                self.handle_request(id, &method, frame.params, writer, calls)
                    .await
            }
            (Some(FrameKind::Notification), _, Some(method)) => {
                if method == methods::INITIALIZED {
                    debug!("client initialized");
                } else {
                    debug!(method = %method, "ignoring notification");
                }
                Ok(())
            }
            _ => {
                debug!("ignoring response frame");
                Ok(())
            }
        }
    }

    async fn handle_request<W>(
        &self,
        id: RequestId,
        method: &str,
        params: Option<Value>,
        writer: &SharedWriter<W>,
        calls: &mut JoinSet<()>,
    ) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        debug!(id = %id, method = method, "request");

        let reply = match method {
            methods::INITIALIZE => Frame::response(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": { "tools": {} },
                    "serverInfo": { "name": self.name, "version": self.version },
                }),
            ),
            methods::TOOLS_LIST => Frame::response(id, json!({ "tools": self.registry.list() })),
            methods::PING => Frame::response(id, json!({})),
            methods::TOOLS_CALL => {
                let registry = Arc::clone(&self.registry);
                let writer = Arc::clone(writer);
                calls.spawn(async move {
                    let reply = match call_tool(&registry, params).await {
                        Ok(result) => Frame::response(id, result),
                        Err(err) => Frame::error_response(Some(id), err),
                    };
                    if let Err(e) = write_frame(&writer, &reply).await {
                        warn!(error = %e, "failed to write tool result");
                    }
                });
                return Ok(());
            }
            other => {
                warn!(method = other, "unknown method");
                Frame::error_response(Some(id), RpcError::method_not_found(other))
            }
        };

        write_frame(writer, &reply).await
    }
}

/// Invalid UTF-8 is replaced rather than ending the session; the frame then
/// fails to parse and gets a parse-error reply.
fn decode_line(bytes: &[u8]) -> std::borrow::Cow<'_, str> {
    let line = String::from_utf8_lossy(bytes);
    if matches!(line, std::borrow::Cow::Owned(_)) {
        warn!(len = bytes.len(), "frame is not valid UTF-8");
    }
    line
}

/// Run one `tools/call`, producing the JSON result object.
async fn call_tool(registry: &ToolRegistry, params: Option<Value>) -> Result<Value, RpcError> {
    let params = params.unwrap_or(Value::Null);
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::invalid_params("Missing tool name"))?;

    let arguments = match params.get("arguments") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(args)) => args.clone(),
        Some(_) => return Err(RpcError::invalid_params("Tool arguments must be an object")),
    };

    let result = registry.call(name, arguments).await?;
    serde_json::to_value(result).map_err(|e| RpcError::new(codes::INTERNAL_ERROR, e.to_string()))
}

async fn write_frame<W>(writer: &SharedWriter<W>, frame: &Frame) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let line = frame.encode().context("failed to encode frame")?;
    write_line(writer, &line).await
}

async fn write_line<W>(writer: &SharedWriter<W>, line: &str) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut w = writer.lock().await;
    w.write_all(line.as_bytes())
        .await
        .context("failed to write frame")?;
    w.write_all(b"\n").await.context("failed to write frame")?;
    w.flush().await.context("failed to flush frame")?;
    Ok(())
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
