//! In-process fake backend for unit tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use toolwire_core::protocol::Frame;

use crate::transport::Transport;

/// Frames the fake backend has received, in arrival order.
pub(crate) type Received = Arc<Mutex<Vec<Frame>>>;

/// Connect a transport to a scripted backend over an in-memory pipe.
///
/// `handler` sees every frame the client writes and returns the raw lines
/// to send back (which may be malformed on purpose).
pub(crate) fn fake_backend<F>(timeout: Duration, mut handler: F) -> (Transport, Received)
where
    F: FnMut(&Frame) -> Vec<String> + Send + 'static,
{
    let (client_side, server_side) = tokio::io::duplex(64 * 1024);
    let (client_read, client_write) = tokio::io::split(client_side);
    let transport = Transport::from_streams(client_read, client_write, timeout);

    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let log = received.clone();

    tokio::spawn(async move {
        let (server_read, mut server_write) = tokio::io::split(server_side);
        let mut lines = BufReader::new(server_read).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            let Ok(frame) = Frame::decode(&line) else {
                continue;
            };
            let replies = handler(&frame);
            log.lock().unwrap().push(frame);

            for reply in replies {
                if server_write.write_all(reply.as_bytes()).await.is_err()
                    || server_write.write_all(b"\n").await.is_err()
                {
                    return;
                }
            }
            if server_write.flush().await.is_err() {
                return;
            }
        }
    });

    (transport, received)
}

/// Encoded success response to `request`.
pub(crate) fn response_line(request: &Frame, result: Value) -> String {
    let id = request.id.clone().unwrap_or(0.into());
    Frame::response(id, result).encode().unwrap()
}
