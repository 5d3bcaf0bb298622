// Keyhost Engine — Peer Channel
//
// Bidirectional message channel over any AsyncRead/AsyncWrite pair (stdin/
// stdout for the browser extension, in-memory duplex streams in tests).
//
//   • One reader task (`run`) decodes frames and dispatches them.
//   • Writes go through a single async mutex so frames never interleave.
//   • `rpc_request` parks a oneshot sender under a fresh correlation id and
//     waits for the matching `rpc_response`. The slot is released on every
//     exit path (response, timeout, cancellation, write failure).

use super::framing::{encode_frame, FrameDecoder};
use super::types::{Message, RpcErrorBody, RpcOptions};
use crate::atoms::constants::{MSG_ERROR, MSG_PING, MSG_PONG, MSG_RPC_REQUEST, MSG_RPC_RESPONSE, READ_CHUNK_LEN};
use crate::atoms::error::{EngineError, EngineResult};
use crate::engine::context::RequestContext;
use futures::future::BoxFuture;
use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;

pub type MessageHandler = Arc<dyn Fn(Message) -> BoxFuture<'static, ()> + Send + Sync>;
pub type RpcMethod = Arc<dyn Fn(Value) -> BoxFuture<'static, EngineResult<Value>> + Send + Sync>;

type Waiter = oneshot::Sender<Result<Value, RpcErrorBody>>;

pub struct PeerChannel {
    writer: tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    handlers: RwLock<HashMap<String, MessageHandler>>,
    methods: RwLock<HashMap<String, RpcMethod>>,
    pending: Mutex<HashMap<String, Waiter>>,
    closed: AtomicBool,
}

/// Removes an in-flight request's slot when the waiting call goes away.
struct PendingSlot<'a> {
    pending: &'a Mutex<HashMap<String, Waiter>>,
    id: &'a str,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(self.id);
    }
}

impl PeerChannel {
    pub fn new<W>(writer: W) -> Arc<Self>
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Arc::new(PeerChannel {
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            handlers: RwLock::new(HashMap::new()),
            methods: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    // ── Registration ───────────────────────────────────────────────────────

    /// Handle every inbound message of type `kind`. Replaces an earlier handler.
    pub fn register_handler<F, Fut>(&self, kind: &str, handler: F)
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let boxed: MessageHandler = Arc::new(move |msg| Box::pin(handler(msg)));
        self.handlers.write().insert(kind.to_string(), boxed);
    }

    /// Expose `name` to the peer's `rpc_request` calls.
    pub fn register_rpc_method<F, Fut>(&self, name: &str, method: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = EngineResult<Value>> + Send + 'static,
    {
        let boxed: RpcMethod = Arc::new(move |params| Box::pin(method(params)));
        self.methods.write().insert(name.to_string(), boxed);
        debug!("[peer] RPC method '{}' registered", name);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Requests still waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    // ── Outbound ───────────────────────────────────────────────────────────

    pub async fn send_message(&self, msg: &Message) -> EngineResult<()> {
        let body = serde_json::to_vec(msg)?;
        let frame = encode_frame(&body)?;
        let mut writer = self.writer.lock().await;
        writer
            .write_all(&frame)
            .await
            .map_err(|e| EngineError::WriteError(e.to_string()))?;
        writer.flush().await.map_err(|e| EngineError::WriteError(e.to_string()))
    }

    /// Fire-and-forget event to the peer.
    pub async fn send_event(&self, payload: Value) -> EngineResult<()> {
        self.send_message(&Message::event(payload)).await
    }

    /// Call `method` on the peer and wait for its answer.
    pub async fn rpc_request(
        &self,
        ctx: &RequestContext,
        method: &str,
        params: Value,
        opts: RpcOptions,
    ) -> EngineResult<Value> {
        if self.is_closed() {
            return Err(EngineError::ChannelClosed);
        }
        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id.clone(), tx);
        let _slot = PendingSlot { pending: &self.pending, id: &id };

        // The reader may have shut down between the check and the insert.
        if self.is_closed() {
            return Err(EngineError::ChannelClosed);
        }

        self.send_message(&Message::rpc_request(&id, method, params)).await?;

        let timeout_ms = opts.timeout.as_millis() as u64;
        ctx.run(async {
            match tokio::time::timeout(opts.timeout, rx).await {
                Err(_) => {
                    warn!("[peer] RPC '{}' timed out after {}ms (id={})", method, timeout_ms, id);
                    Err(EngineError::Timeout(timeout_ms))
                }
                Ok(Err(_)) => Err(EngineError::ChannelClosed),
                Ok(Ok(Ok(value))) => Ok(value),
                Ok(Ok(Err(body))) => Err(EngineError::Remote { code: body.code, message: body.message }),
            }
        })
        .await
    }

    // ── Inbound ────────────────────────────────────────────────────────────

    /// Read frames until EOF or a fatal framing error. Every request still
    /// waiting afterwards fails with `ChannelClosed`.
    pub async fn run<R>(self: &Arc<Self>, mut reader: R) -> EngineResult<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut decoder = FrameDecoder::new();
        let mut chunk = vec![0u8; READ_CHUNK_LEN];

        let outcome = 'read: loop {
            let n = match reader.read(&mut chunk).await {
                Ok(0) => {
                    info!("[peer] Input stream closed");
                    break Ok(());
                }
                Ok(n) => n,
                Err(e) => {
                    error!("[peer] Read error: {}", e);
                    break Err(EngineError::Io(e));
                }
            };
            decoder.push(&chunk[..n]);

            loop {
                match decoder.next_frame() {
                    Ok(Some(payload)) => self.handle_frame(&payload).await,
                    Ok(None) => break,
                    Err(e) => {
                        error!("[peer] Fatal framing error, closing channel: {}", e);
                        break 'read Err(e);
                    }
                }
            }
        };

        self.close();
        outcome
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let waiters: Vec<Waiter> = self.pending.lock().drain().map(|(_, tx)| tx).collect();
        if !waiters.is_empty() {
            warn!("[peer] Failing {} in-flight request(s): channel closed", waiters.len());
        }
        // Dropping the senders wakes each waiter with a receive error.
        drop(waiters);
    }

    async fn handle_frame(self: &Arc<Self>, payload: &[u8]) {
        match serde_json::from_slice::<Message>(payload) {
            Ok(msg) => self.dispatch(msg).await,
            Err(e) => warn!("[peer] Skipping malformed frame ({} bytes): {}", payload.len(), e),
        }
    }

    async fn dispatch(self: &Arc<Self>, msg: Message) {
        let kind = msg.kind.clone();
        match kind.as_str() {
            MSG_RPC_RESPONSE => self.resolve(msg),
            MSG_RPC_REQUEST => self.serve_request(msg),
            MSG_PING => self.spawn_reply(Message::pong(msg.id)),
            kind => {
                let handler = self.handlers.read().get(kind).cloned();
                match handler {
                    Some(handler) => {
                        tokio::spawn(handler(msg));
                    }
                    // Never answer an error or pong with an error: two hosts
                    // would bounce them forever.
                    None if kind == MSG_ERROR || kind == MSG_PONG => {
                        debug!("[peer] Unhandled '{}' message: {:?}", kind, msg.error);
                    }
                    None => {
                        warn!("[peer] Unknown message type '{}'", kind);
                        let reply = Message::error(msg.id, -32600, format!("unknown message type '{}'", kind));
                        self.spawn_reply(reply);
                    }
                }
            }
        }
    }

    fn resolve(&self, msg: Message) {
        let Some(id) = msg.id else {
            warn!("[peer] rpc_response without id ignored");
            return;
        };
        let Some(tx) = self.pending.lock().remove(&id) else {
            debug!("[peer] Late or unknown response id={}, dropping", id);
            return;
        };
        let outcome = match msg.error {
            Some(err) => Err(err),
            None => Ok(msg.result.unwrap_or(Value::Null)),
        };
        let _ = tx.send(outcome);
    }

    fn serve_request(self: &Arc<Self>, msg: Message) {
        let channel = Arc::clone(self);
        tokio::spawn(async move {
            let Some(id) = msg.id else {
                warn!("[peer] rpc_request without id ignored");
                return;
            };
            let method_name = msg.method.unwrap_or_default();
            let method = channel.methods.read().get(&method_name).cloned();
            let reply = match method {
                None => {
                    warn!("[peer] Method not found: '{}'", method_name);
                    Message::rpc_error(&id, RpcErrorBody::from(&EngineError::MethodNotFound(method_name)))
                }
                Some(method) => match method(msg.params.unwrap_or(Value::Null)).await {
                    Ok(result) => Message::rpc_result(&id, result),
                    Err(e) => {
                        warn!("[peer] Method '{}' failed: {}", method_name, e);
                        Message::rpc_error(&id, RpcErrorBody::from(&e))
                    }
                },
            };
            channel.reply(reply).await;
        });
    }

    async fn reply(&self, msg: Message) {
        if let Err(e) = self.send_message(&msg).await {
            warn!("[peer] Failed to send '{}' reply: {}", msg.kind, e);
        }
    }

    /// The reader must never wait on the writer; a peer that stops reading
    /// would otherwise stall response correlation.
    fn spawn_reply(self: &Arc<Self>, msg: Message) {
        let channel = Arc::clone(self);
        tokio::spawn(async move { channel.reply(msg).await });
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::constants::MAX_FRAME_LEN;
    use serde_json::json;
    use std::time::Duration;
    use tokio::io::{duplex, split, DuplexStream, ReadHalf, WriteHalf};

    fn connected_pair() -> (Arc<PeerChannel>, Arc<PeerChannel>) {
        let (a, b) = duplex(64 * 1024);
        let (a_r, a_w) = split(a);
        let (b_r, b_w) = split(b);
        let left = PeerChannel::new(a_w);
        let right = PeerChannel::new(b_w);
        let l = Arc::clone(&left);
        tokio::spawn(async move { l.run(a_r).await });
        let r = Arc::clone(&right);
        tokio::spawn(async move { r.run(b_r).await });
        (left, right)
    }

    /// A channel whose other end is driven by hand.
    fn channel_with_raw_peer() -> (Arc<PeerChannel>, ReadHalf<DuplexStream>, WriteHalf<DuplexStream>) {
        let (a, b) = duplex(64 * 1024);
        let (a_r, a_w) = split(a);
        let (b_r, b_w) = split(b);
        let channel = PeerChannel::new(a_w);
        let c = Arc::clone(&channel);
        tokio::spawn(async move { c.run(a_r).await });
        (channel, b_r, b_w)
    }

    async fn read_message(r: &mut ReadHalf<DuplexStream>) -> Message {
        let mut header = [0u8; 4];
        r.read_exact(&mut header).await.unwrap();
        let mut body = vec![0u8; u32::from_le_bytes(header) as usize];
        r.read_exact(&mut body).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    async fn write_raw(w: &mut WriteHalf<DuplexStream>, payload: &[u8]) {
        w.write_all(&encode_frame(payload).unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn test_rpc_add_correlates() {
        let (left, right) = connected_pair();
        right.register_rpc_method("add", |params: Value| async move {
            let nums = params.as_array().cloned().unwrap_or_default();
            Ok(json!(nums.iter().filter_map(Value::as_i64).sum::<i64>()))
        });

        let out = left
            .rpc_request(&RequestContext::new(), "add", json!([2, 3]), RpcOptions::default())
            .await
            .unwrap();
        assert_eq!(out, json!(5));
        assert_eq!(left.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_requests_get_their_own_answers() {
        let (left, right) = connected_pair();
        right.register_rpc_method("echo_after", |params: Value| async move {
            let ms = params["ms"].as_u64().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(params["v"].clone())
        });

        let ctx = RequestContext::new();
        let slow = left.rpc_request(&ctx, "echo_after", json!({"ms": 60, "v": "slow"}), RpcOptions::default());
        let fast = left.rpc_request(&ctx, "echo_after", json!({"ms": 5, "v": "fast"}), RpcOptions::default());
        let (slow, fast) = tokio::join!(slow, fast);
        assert_eq!(slow.unwrap(), json!("slow"));
        assert_eq!(fast.unwrap(), json!("fast"));
    }

    #[tokio::test]
    async fn test_rpc_timeout_releases_slot() {
        let (left, right) = connected_pair();
        right.register_rpc_method("hang", |_params: Value| async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(Value::Null)
        });

        let started = std::time::Instant::now();
        let err = left
            .rpc_request(
                &RequestContext::new(),
                "hang",
                Value::Null,
                RpcOptions::with_timeout(Duration::from_millis(50)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Timeout(50)));
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(left.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_method_not_found() {
        let (left, _right) = connected_pair();
        let err = left
            .rpc_request(&RequestContext::new(), "missing", Value::Null, RpcOptions::default())
            .await
            .unwrap_err();
        match err {
            EngineError::Remote { code, message } => {
                assert_eq!(code, -32601);
                assert!(message.contains("missing"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_method_error_is_carried_back() {
        let (left, right) = connected_pair();
        right.register_rpc_method("deny", |_params: Value| async move {
            Err::<Value, _>(EngineError::Unauthorized("wallet locked".into()))
        });
        let err = left
            .rpc_request(&RequestContext::new(), "deny", Value::Null, RpcOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Remote { code: -32001, .. }));
    }

    #[tokio::test]
    async fn test_cancellation_releases_slot() {
        let (left, right) = connected_pair();
        right.register_rpc_method("hang", |_params: Value| async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(Value::Null)
        });

        let ctx = RequestContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });
        let err = left.rpc_request(&ctx, "hang", Value::Null, RpcOptions::default()).await.unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
        assert_eq!(left.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_send_message_writes_prefix_and_payload_only() {
        let (channel, mut r, _w) = channel_with_raw_peer();
        let first = Message::event(json!({ "kind": "notification", "title": "t", "body": "b" }));
        let second = Message::ping();
        channel.send_message(&first).await.unwrap();
        channel.send_message(&second).await.unwrap();

        let body = serde_json::to_vec(&first).unwrap();
        let mut raw = vec![0u8; 4 + body.len()];
        r.read_exact(&mut raw).await.unwrap();
        assert_eq!(&raw[..4], &(body.len() as u32).to_le_bytes());
        assert_eq!(&raw[4..], body.as_slice());

        // The next byte starts the second frame: nothing was written in between.
        let next = serde_json::to_vec(&second).unwrap();
        let mut header = [0u8; 4];
        r.read_exact(&mut header).await.unwrap();
        assert_eq!(u32::from_le_bytes(header) as usize, next.len());
    }

    #[tokio::test]
    async fn test_unread_pongs_do_not_stall_responses() {
        // Tiny buffers: the pongs below fill the outbound pipe and nobody drains it.
        let (a, b) = duplex(256);
        let (a_r, a_w) = split(a);
        let (mut b_r, mut b_w) = split(b);
        let channel = PeerChannel::new(a_w);
        let c = Arc::clone(&channel);
        tokio::spawn(async move { c.run(a_r).await });

        let caller = Arc::clone(&channel);
        let call = tokio::spawn(async move {
            caller
                .rpc_request(&RequestContext::new(), "slow", json!({}), RpcOptions::with_timeout(Duration::from_secs(2)))
                .await
        });
        let request = read_message(&mut b_r).await;
        let id = request.id.unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(3), async {
            for _ in 0..200 {
                let ping = serde_json::to_vec(&Message::ping()).unwrap();
                write_raw(&mut b_w, &ping).await;
            }
            let response = serde_json::to_vec(&Message::rpc_result(&id, json!("done"))).unwrap();
            write_raw(&mut b_w, &response).await;
            call.await.unwrap()
        })
        .await
        .expect("reader stalled behind unread pongs");
        assert_eq!(outcome.unwrap(), json!("done"));
    }

    #[tokio::test]
    async fn test_unknown_type_answered_with_error() {
        let (_channel, mut r, mut w) = channel_with_raw_peer();
        write_raw(&mut w, br#"{"type":"teleport","id":"x1"}"#).await;
        let reply = read_message(&mut r).await;
        assert_eq!(reply.kind, "error");
        assert_eq!(reply.id.as_deref(), Some("x1"));
        assert!(reply.error.unwrap().message.contains("teleport"));
    }

    #[tokio::test]
    async fn test_malformed_frame_is_skipped() {
        let (_channel, mut r, mut w) = channel_with_raw_peer();
        write_raw(&mut w, b"{ not json").await;
        write_raw(&mut w, br#"{"type":"ping","id":"p1"}"#).await;
        let reply = read_message(&mut r).await;
        assert_eq!(reply.kind, "pong");
        assert_eq!(reply.id.as_deref(), Some("p1"));
    }

    #[tokio::test]
    async fn test_custom_handler_receives_messages() {
        let (channel, _r, mut w) = channel_with_raw_peer();
        let (tx, rx) = oneshot::channel::<Value>();
        let tx = Arc::new(Mutex::new(Some(tx)));
        channel.register_handler("event", move |msg: Message| {
            let tx = Arc::clone(&tx);
            async move {
                if let Some(tx) = tx.lock().take() {
                    let _ = tx.send(msg.payload.unwrap_or(Value::Null));
                }
            }
        });
        write_raw(&mut w, br#"{"type":"event","payload":{"kind":"unlocked"}}"#).await;
        let payload = tokio::time::timeout(Duration::from_secs(2), rx).await.unwrap().unwrap();
        assert_eq!(payload["kind"], "unlocked");
    }

    #[tokio::test]
    async fn test_eof_fails_waiters_with_channel_closed() {
        let (channel, mut r, w) = channel_with_raw_peer();
        let caller = Arc::clone(&channel);
        let call = tokio::spawn(async move {
            caller
                .rpc_request(&RequestContext::new(), "anything", Value::Null, RpcOptions::default())
                .await
        });
        // Make sure the request is on the wire before hanging up.
        let sent = read_message(&mut r).await;
        assert_eq!(sent.kind, "rpc_request");
        drop(w);
        drop(r);

        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, EngineError::ChannelClosed));
        assert!(channel.is_closed());
    }

    #[tokio::test]
    async fn test_oversized_frame_is_fatal() {
        let (a, b) = duplex(1024);
        let (a_r, a_w) = split(a);
        let (_b_r, mut b_w) = split(b);
        let channel = PeerChannel::new(a_w);
        b_w.write_all(&((MAX_FRAME_LEN as u32) + 1).to_le_bytes()).await.unwrap();
        assert!(channel.run(a_r).await.is_err());
        assert!(channel.is_closed());
    }
}
