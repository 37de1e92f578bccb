//! Supabase Realtime client (Phoenix channels over WebSocket).
//!
//! One socket per subscription. The socket joins a single
//! `postgres_changes` channel filtered to the user's rows, heartbeats on the
//! `phoenix` topic, and leaves the channel on close.

use crate::{ChangeKind, ChangeNotification, ChangeSubscription, StoreError, StoreResult};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shelf_auth::UserId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use url::Url;

const PROTOCOL_VERSION: &str = "1.0.0";
const TABLE: &str = "bookmarks";

#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    pub heartbeat_interval: Duration,
    /// How long to wait for the server to accept the join.
    pub join_timeout: Duration,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(25),
            join_timeout: Duration::from_secs(10),
        }
    }
}

/// A Phoenix V1 frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

impl PhoenixMessage {
    fn new(topic: &str, event: &str, payload: Value, reference: u64) -> Self {
        Self {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
            reference: Some(reference.to_string()),
        }
    }

    fn join(topic: &str, user_id: &UserId, access_token: &str, reference: u64) -> Self {
        Self::new(
            topic,
            "phx_join",
            json!({
                "config": {
                    "broadcast": { "self": false },
                    "presence": { "key": "" },
                    "postgres_changes": [{
                        "event": "*",
                        "schema": "public",
                        "table": TABLE,
                        "filter": format!("user_id=eq.{}", user_id),
                    }],
                },
                "access_token": access_token,
            }),
            reference,
        )
    }

    fn heartbeat(reference: u64) -> Self {
        Self::new("phoenix", "heartbeat", json!({}), reference)
    }

    fn leave(topic: &str, reference: u64) -> Self {
        Self::new(topic, "phx_leave", json!({}), reference)
    }

    fn to_frame(&self) -> StoreResult<Message> {
        Ok(Message::Text(serde_json::to_string(self)?.into()))
    }

    fn reply_status(&self) -> Option<&str> {
        self.payload.get("status").and_then(Value::as_str)
    }
}

/// What an inbound frame means for the subscriber.
#[derive(Debug, PartialEq)]
enum Inbound {
    Change(ChangeNotification),
    /// The server ended the channel
    Closed(String),
    Ignore,
}

fn classify(msg: &PhoenixMessage, topic: &str) -> Inbound {
    if msg.topic != topic {
        return Inbound::Ignore;
    }
    match msg.event.as_str() {
        "postgres_changes" => msg
            .payload
            .pointer("/data/type")
            .and_then(Value::as_str)
            .and_then(ChangeKind::parse)
            .map(|kind| Inbound::Change(ChangeNotification { kind }))
            .unwrap_or(Inbound::Ignore),
        "phx_close" => Inbound::Closed("channel closed by server".to_string()),
        "phx_error" => Inbound::Closed("channel error".to_string()),
        "phx_reply" if msg.reply_status() == Some("error") => {
            Inbound::Closed(format!("server replied with error: {}", msg.payload))
        }
        _ => Inbound::Ignore,
    }
}

#[derive(Debug, Clone)]
pub struct RealtimeClient {
    endpoint: Url,
    config: RealtimeConfig,
}

impl RealtimeClient {
    pub fn new(supabase_url: &str, anon_key: &str) -> StoreResult<Self> {
        Self::with_config(supabase_url, anon_key, RealtimeConfig::default())
    }

    pub fn with_config(
        supabase_url: &str,
        anon_key: &str,
        config: RealtimeConfig,
    ) -> StoreResult<Self> {
        Ok(Self {
            endpoint: websocket_url(supabase_url, anon_key)?,
            config,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Open a socket, join the user's channel and wait for the join to be
    /// accepted.
    pub async fn subscribe(
        &self,
        user_id: &UserId,
        access_token: &str,
    ) -> StoreResult<ChangeSubscription> {
        let topic = format!("realtime:{}:{}:{}", TABLE, user_id, uuid::Uuid::new_v4());
        info!(topic = %topic, "Connecting to realtime");

        let (ws_stream, _) = connect_async(self.endpoint.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();

        // Message refs are shared by the join, heartbeats and the leave.
        let refs = Arc::new(AtomicU64::new(1));
        let join_ref = refs.fetch_add(1, Ordering::Relaxed);
        write
            .send(PhoenixMessage::join(&topic, user_id, access_token, join_ref).to_frame()?)
            .await?;
        let join_ref = join_ref.to_string();
        debug!("Sent phx_join");

        let accepted = tokio::time::timeout(self.config.join_timeout, async {
            while let Some(frame) = read.next().await {
                let text = match frame? {
                    Message::Text(text) => text,
                    Message::Close(_) => break,
                    _ => continue,
                };
                let Ok(msg) = serde_json::from_str::<PhoenixMessage>(&text) else {
                    continue;
                };
                if msg.topic == topic
                    && msg.event == "phx_reply"
                    && msg.reference.as_deref() == Some(join_ref.as_str())
                {
                    return match msg.reply_status() {
                        Some("ok") => Ok(()),
                        _ => Err(StoreError::Realtime(format!("join rejected: {}", msg.payload))),
                    };
                }
            }
            Err::<(), StoreError>(StoreError::Realtime(
                "socket closed before join reply".to_string(),
            ))
        })
        .await
        .map_err(|_| StoreError::Realtime("timed out waiting for join reply".to_string()))?;
        accepted?;
        info!(topic = %topic, "Joined realtime channel");

        let (out_tx, mut out_rx) = mpsc::channel::<Message>(32);
        let (events_tx, events_rx) = mpsc::channel::<ChangeNotification>(32);
        let (close_tx, mut close_rx) = oneshot::channel::<()>();

        let sender_handle = tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                if write.send(msg).await.is_err() {
                    break;
                }
            }
            let _ = write.close().await;
        });

        let heartbeat_sender = out_tx.clone();
        let heartbeat_every = self.config.heartbeat_interval;
        let heartbeat_refs = refs.clone();
        let heartbeat_handle = tokio::spawn(async move {
            let mut ticker = interval(heartbeat_every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let reference = heartbeat_refs.fetch_add(1, Ordering::Relaxed);
                let Ok(frame) = PhoenixMessage::heartbeat(reference).to_frame() else {
                    break;
                };
                if heartbeat_sender.send(frame).await.is_err() {
                    break;
                }
            }
        });

        let driver = tokio::spawn(async move {
            let reason = loop {
                tokio::select! {
                    _ = &mut close_rx => {
                        let reference = refs.fetch_add(1, Ordering::Relaxed);
                        if let Ok(frame) = PhoenixMessage::leave(&topic, reference).to_frame() {
                            let _ = out_tx.send(frame).await;
                        }
                        break "closed by subscriber".to_string();
                    }
                    frame = read.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            let msg = match serde_json::from_str::<PhoenixMessage>(&text) {
                                Ok(msg) => msg,
                                Err(e) => {
                                    warn!(error = %e, "Failed to parse realtime frame");
                                    continue;
                                }
                            };
                            match classify(&msg, &topic) {
                                Inbound::Change(notification) => {
                                    debug!(kind = ?notification.kind, "Bookmark change");
                                    if events_tx.send(notification).await.is_err() {
                                        break "subscriber dropped".to_string();
                                    }
                                }
                                Inbound::Closed(reason) => break reason,
                                Inbound::Ignore => {}
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = out_tx.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => break "socket closed".to_string(),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!(error = %e, "Realtime socket error");
                            break e.to_string();
                        }
                    }
                }
            };

            heartbeat_handle.abort();
            drop(out_tx);
            if tokio::time::timeout(Duration::from_secs(1), sender_handle)
                .await
                .is_err()
            {
                debug!("Realtime writer did not finish flushing");
            }
            info!(reason = %reason, "Realtime channel ended");
        });

        Ok(ChangeSubscription::new(events_rx, close_tx, driver))
    }
}

/// `wss://{host}/realtime/v1/websocket?apikey=..&vsn=1.0.0` from the project URL.
pub fn websocket_url(supabase_url: &str, anon_key: &str) -> StoreResult<Url> {
    let mut url = Url::parse(supabase_url.trim_end_matches('/'))?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(StoreError::Realtime(format!("unsupported scheme `{}`", other)));
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| StoreError::Realtime("cannot set websocket scheme".to_string()))?;
    url.set_path("/realtime/v1/websocket");
    url.query_pairs_mut()
        .clear()
        .append_pair("apikey", anon_key)
        .append_pair("vsn", PROTOCOL_VERSION);
    Ok(url)
}
