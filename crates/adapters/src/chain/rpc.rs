// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ethereum JSON-RPC over WebSocket.
//!
//! One connection carries requests and subscriptions. A reader task routes
//! responses to waiting callers by request id and notifications to head
//! streams by subscription id. When the socket drops, pending requests fail
//! with [`ChainError::Closed`] and head streams end; the next call reconnects.

use super::codec::{parse_head, parse_log, parse_quantity, parse_receipt, rpc_error};
use super::{ChainClient, ChainError, Log, LogFilter, Receipt};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use orc_core::{BlockHash, Head, TxHash};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const HEAD_BUFFER: usize = 64;

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, ChainError>>>>>;
type Subscriptions = Arc<Mutex<HashMap<String, mpsc::Sender<Head>>>>;

struct Connection {
    outgoing: mpsc::Sender<Message>,
    pending: Pending,
    subscriptions: Subscriptions,
    /// Head senders keyed by the `eth_subscribe` request id, installed by the
    /// reader before the response is delivered so no notification is missed.
    subscribing: Arc<Mutex<HashMap<u64, mpsc::Sender<Head>>>>,
    alive: Arc<AtomicBool>,
}

struct Inner {
    url: String,
    next_id: AtomicU64,
    conn: tokio::sync::Mutex<Option<Arc<Connection>>>,
}

#[derive(Clone)]
pub struct WsRpcClient {
    inner: Arc<Inner>,
}

impl WsRpcClient {
    /// Create a client. The socket is opened on first use.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                url: url.into(),
                next_id: AtomicU64::new(1),
                conn: tokio::sync::Mutex::new(None),
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    async fn connection(&self) -> Result<Arc<Connection>, ChainError> {
        let mut slot = self.inner.conn.lock().await;
        if let Some(conn) = slot.as_ref().filter(|c| c.alive.load(Ordering::SeqCst)) {
            return Ok(Arc::clone(conn));
        }

        let (ws, _) = tokio_tungstenite::connect_async(self.inner.url.as_str())
            .await
            .map_err(|e| ChainError::Unreachable(e.to_string()))?;
        tracing::info!(url = %self.inner.url, "chain rpc connected");
        let (mut write, mut read) = ws.split();

        let (outgoing, mut outgoing_rx) = mpsc::channel::<Message>(64);
        let conn = Arc::new(Connection {
            outgoing,
            pending: Arc::default(),
            subscriptions: Arc::default(),
            subscribing: Arc::default(),
            alive: Arc::new(AtomicBool::new(true)),
        });

        tokio::spawn(async move {
            while let Some(msg) = outgoing_rx.recv().await {
                if let Err(e) = write.send(msg).await {
                    tracing::warn!(error = %e, "chain rpc write failed");
                    break;
                }
            }
        });

        let reader = Arc::clone(&conn);
        let url = self.inner.url.clone();
        tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => route(&reader, text.as_str()),
                    Ok(Message::Close(frame)) => {
                        tracing::info!(?frame, "chain rpc close frame");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "chain rpc read failed");
                        break;
                    }
                }
            }
            tracing::warn!(%url, "chain rpc disconnected");
            reader.alive.store(false, Ordering::SeqCst);
            for (_, waiter) in reader.pending.lock().drain() {
                let _ = waiter.send(Err(ChainError::Closed));
            }
            reader.subscriptions.lock().clear();
            reader.subscribing.lock().clear();
        });

        *slot = Some(Arc::clone(&conn));
        Ok(conn)
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        self.request_with(method, params, None).await
    }

    async fn request_with(
        &self,
        method: &str,
        params: Value,
        heads: Option<mpsc::Sender<Head>>,
    ) -> Result<Value, ChainError> {
        let conn = self.connection().await?;
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        conn.pending.lock().insert(id, tx);
        if let Some(heads) = heads {
            conn.subscribing.lock().insert(id, heads);
        }

        let body = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        if conn.outgoing.send(Message::Text(body.to_string().into())).await.is_err() {
            conn.pending.lock().remove(&id);
            conn.subscribing.lock().remove(&id);
            return Err(ChainError::Closed);
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ChainError::Closed),
            Err(_) => {
                conn.pending.lock().remove(&id);
                conn.subscribing.lock().remove(&id);
                Err(ChainError::Unreachable(format!("{method} timed out")))
            }
        }
    }
}

/// Dispatch one inbound frame
fn route(conn: &Connection, text: &str) {
    let Ok(msg) = serde_json::from_str::<Value>(text) else {
        tracing::warn!(len = text.len(), "chain rpc: unparseable frame");
        return;
    };

    if let Some(id) = msg.get("id").and_then(Value::as_u64) {
        let Some(waiter) = conn.pending.lock().remove(&id) else { return };
        let result = match msg.get("error") {
            Some(err) if !err.is_null() => Err(rpc_error(err)),
            _ => Ok(msg.get("result").cloned().unwrap_or(Value::Null)),
        };
        if let Some(heads) = conn.subscribing.lock().remove(&id) {
            if let Ok(Value::String(sub)) = &result {
                conn.subscriptions.lock().insert(sub.clone(), heads);
            }
        }
        let _ = waiter.send(result);
        return;
    }

    if msg.get("method").and_then(Value::as_str) == Some("eth_subscription") {
        let params = &msg["params"];
        let Some(sub) = params.get("subscription").and_then(Value::as_str) else { return };
        let Some(sender) = conn.subscriptions.lock().get(sub).cloned() else { return };
        match parse_head(&params["result"]) {
            Ok(head) => {
                if sender.try_send(head).is_err() {
                    tracing::warn!(subscription = sub, "head stream full or closed, dropping head");
                }
            }
            Err(e) => tracing::warn!(error = %e, "chain rpc: bad head notification"),
        }
    }
}

#[async_trait]
impl ChainClient for WsRpcClient {
    async fn subscribe_heads(&self) -> Result<mpsc::Receiver<Head>, ChainError> {
        let (tx, rx) = mpsc::channel(HEAD_BUFFER);
        let result = self.request_with("eth_subscribe", json!(["newHeads"]), Some(tx)).await?;
        if !result.is_string() {
            return Err(ChainError::Decode(format!("subscription id: {result}")));
        }
        Ok(rx)
    }

    async fn head_by_hash(&self, hash: &BlockHash) -> Result<Option<Head>, ChainError> {
        let result = self.request("eth_getBlockByHash", json!([hash.as_str(), false])).await?;
        if result.is_null() {
            return Ok(None);
        }
        parse_head(&result).map(Some)
    }

    async fn latest_head(&self) -> Result<Head, ChainError> {
        let result = self.request("eth_getBlockByNumber", json!(["latest", false])).await?;
        parse_head(&result)
    }

    async fn send_transaction(&self, raw: &[u8]) -> Result<TxHash, ChainError> {
        let payload = format!("0x{}", hex::encode(raw));
        let result = self.request("eth_sendRawTransaction", json!([payload])).await?;
        result
            .as_str()
            .map(TxHash::new)
            .ok_or_else(|| ChainError::Decode(format!("transaction hash: {result}")))
    }

    async fn receipt(&self, hash: &TxHash) -> Result<Option<Receipt>, ChainError> {
        let result = self.request("eth_getTransactionReceipt", json!([hash.as_str()])).await?;
        if result.is_null() {
            return Ok(None);
        }
        parse_receipt(&result).map(Some)
    }

    async fn nonce_at(&self, address: &str) -> Result<u64, ChainError> {
        let result = self.request("eth_getTransactionCount", json!([address, "latest"])).await?;
        parse_quantity(&result)
    }

    async fn logs(&self, filter: &LogFilter) -> Result<Vec<Log>, ChainError> {
        let topics: Vec<Value> = filter
            .topics
            .iter()
            .map(|t| if t.is_empty() { Value::Null } else { Value::String(t.clone()) })
            .collect();
        let params = json!([{
            "address": filter.address,
            "topics": topics,
            "fromBlock": format!("0x{:x}", filter.from_block),
            "toBlock": format!("0x{:x}", filter.to_block),
        }]);
        let result = self.request("eth_getLogs", params).await?;
        let entries =
            result.as_array().ok_or_else(|| ChainError::Decode(format!("logs: expected array, got {result}")))?;
        // Removed logs belong to a discarded branch
        entries
            .iter()
            .filter(|entry| entry.get("removed").and_then(Value::as_bool) != Some(true))
            .map(parse_log)
            .collect()
    }
}

#[cfg(test)]
#[path = "rpc_tests.rs"]
mod tests;
