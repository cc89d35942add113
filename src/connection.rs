//! Connection multiplexer: one DevTools WebSocket shared by many callers.
//!
//! Every endpoint (the browser itself, and each page) gets exactly one
//! [`Connection`]. Callers issue concurrent [`Connection::rpc`] calls; a
//! dedicated sender task owns the socket's write half and a dedicated
//! receiver task owns the read half, so neither side ever needs a lock.
//! Responses are correlated back to callers by message id, never by arrival
//! order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::RenderError;
use crate::protocol::{CdpMessage, FrameEnvelope, ResponseFrame};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Waiters keyed by message id. The raw frame text is handed over so payload
/// decoding happens on the calling task, not the receiver.
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<String>>>>;

/// Observable lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Workers running, socket open.
    Connected,
    /// The transport died; awaiting `dispose`.
    Faulted,
    /// `dispose` has run.
    Closed,
}

/// A multiplexed RPC channel over one DevTools WebSocket.
pub struct Connection {
    url: String,
    outbound: mpsc::UnboundedSender<CdpMessage>,
    pending: PendingMap,
    last_id: AtomicU64,
    response_timeout: Duration,
    disposed: AtomicBool,
    shutdown: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Connection {
    /// Perform the WebSocket handshake and spawn the sender/receiver workers.
    pub async fn connect(url: &str, response_timeout: Duration) -> Result<Self, RenderError> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| RenderError::Transport(format!("connect {url}: {e}")))?;
        debug!(url, "DevTools WebSocket connected");

        let (ws_tx, ws_rx) = ws.split();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let shutdown = CancellationToken::new();

        let sender = tokio::spawn(sender_loop(ws_tx, out_rx, shutdown.clone()));
        let receiver = tokio::spawn(receiver_loop(ws_rx, pending.clone(), shutdown.clone()));

        Ok(Self {
            url: url.to_string(),
            outbound: out_tx,
            pending,
            last_id: AtomicU64::new(0),
            response_timeout,
            disposed: AtomicBool::new(false),
            shutdown,
            workers: Mutex::new(vec![sender, receiver]),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    pub fn state(&self) -> ConnectionState {
        if self.disposed.load(Ordering::Acquire) {
            ConnectionState::Closed
        } else if self.shutdown.is_cancelled() {
            ConnectionState::Faulted
        } else {
            ConnectionState::Connected
        }
    }

    /// Issue a command and await its correlated response, bounded by the
    /// connection's default response timeout.
    pub async fn rpc(
        &self,
        method: &str,
        params: Value,
        ctx: &CancellationToken,
    ) -> Result<Value, RenderError> {
        self.rpc_with_timeout(method, params, self.response_timeout, ctx)
            .await
    }

    /// [`Connection::rpc`] with an explicit linked deadline for this call.
    ///
    /// A timeout here is local to the call: the pending entry is removed and
    /// a late response is discarded silently by the receiver. The connection
    /// itself stays usable.
    pub async fn rpc_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
        ctx: &CancellationToken,
    ) -> Result<Value, RenderError> {
        if self.state() != ConnectionState::Connected {
            return Err(RenderError::Transport(format!("{method}: connection closed")));
        }

        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        self.pending_lock().insert(id, tx);

        let msg = CdpMessage {
            id,
            method: method.to_string(),
            params,
        };
        if self.outbound.send(msg).is_err() {
            self.pending_lock().remove(&id);
            return Err(RenderError::Transport(format!("{method}: connection closed")));
        }

        // The caller is the single remover for its own id on the timeout and
        // cancellation paths; the receiver removes it on delivery.
        let raw = tokio::select! {
            _ = ctx.cancelled() => {
                self.pending_lock().remove(&id);
                return Err(RenderError::Cancelled);
            }
            _ = tokio::time::sleep(timeout) => {
                self.pending_lock().remove(&id);
                return Err(RenderError::RpcTimeout {
                    method: method.to_string(),
                    timeout,
                });
            }
            reply = rx => reply.map_err(|_| {
                RenderError::Transport(format!("{method}: connection closed before response"))
            })?,
        };

        let frame: ResponseFrame = serde_json::from_str(&raw)?;
        if let Some(err) = frame.error {
            return Err(RenderError::Protocol {
                method: method.to_string(),
                message: err.message,
            });
        }
        Ok(frame.result.unwrap_or(Value::Null))
    }

    /// Enqueue a command without registering a waiter. The eventual response
    /// is dropped by the receiver; transport failures are not reported.
    pub fn fire_and_forget(&self, method: &str, params: Value) {
        if self.state() != ConnectionState::Connected {
            debug!(method, "fire-and-forget dropped on closed connection");
            return;
        }
        let msg = CdpMessage {
            id: self.next_id(),
            method: method.to_string(),
            params,
        };
        if self.outbound.send(msg).is_err() {
            debug!(method, "fire-and-forget dropped on closed connection");
        }
    }

    /// Tear down the workers, close the socket, and fail every outstanding
    /// call. Idempotent and safe to call from any task.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdown.cancel();
        let workers: Vec<JoinHandle<()>> = self.take_workers();
        for worker in workers {
            let _ = worker.await;
        }
        // Dropping the senders fails every outstanding call exactly once.
        self.pending_lock().clear();
        debug!(url = %self.url, "connection disposed");
    }

    fn next_id(&self) -> u64 {
        self.last_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn pending_lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<String>>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn take_workers(&self) -> Vec<JoinHandle<()>> {
        let mut guard = self
            .workers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.drain(..).collect()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown.cancel();
        for worker in self.take_workers() {
            worker.abort();
        }
    }
}

/// Single-writer sender: serializes queued messages and performs one socket
/// send at a time, preserving enqueue order on the wire.
async fn sender_loop(
    mut ws_tx: SplitSink<WsStream, Message>,
    mut out_rx: mpsc::UnboundedReceiver<CdpMessage>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            msg = out_rx.recv() => {
                let Some(msg) = msg else { break };
                let text = match serde_json::to_string(&msg) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(method = %msg.method, error = %e, "failed to encode frame");
                        continue;
                    }
                };
                if let Err(e) = ws_tx.send(Message::text(text)).await {
                    debug!(error = %e, "WebSocket send failed");
                    shutdown.cancel();
                    break;
                }
            }
        }
    }
    let _ = ws_tx.close().await;
}

/// Single-reader receiver: parses each frame just enough to extract the id
/// and hands the raw text to the registered waiter. Frames without an id
/// (events) and responses whose waiter already left are dropped.
async fn receiver_loop(mut ws_rx: SplitStream<WsStream>, pending: PendingMap, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let Ok(envelope) = serde_json::from_str::<FrameEnvelope>(&text) else {
                            continue;
                        };
                        let Some(id) = envelope.id else { continue };
                        let waiter = pending
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner())
                            .remove(&id);
                        if let Some(tx) = waiter {
                            let _ = tx.send(text);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        shutdown.cancel();
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "WebSocket receive failed");
                        shutdown.cancel();
                        break;
                    }
                }
            }
        }
    }
    // Transport gone: waiters see their sender dropped, exactly once each.
    pending
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clear();
}
