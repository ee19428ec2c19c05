//! # WebSocket Transport
//!
//! Concrete client-side implementation of the transport seam over a
//! WebSocket connection. One open channel = one socket running in a spawned
//! task; the task translates server frames into sink callbacks and tears
//! itself down when the handle is closed.

use std::sync::Mutex;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::observability::Logger;

use super::errors::RealtimeResult;
use super::event::RowChange;
use super::topic::{TopicFilter, WireFilter};
use super::transport::{ChannelHandle, ChannelSink, ChannelStatus, RealtimeTransport};

/// WebSocket transport configuration
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Realtime endpoint
    pub url: String,

    /// How often the client sends a heartbeat frame
    pub heartbeat_interval: Duration,

    /// How long the join may stay unconfirmed before the channel is
    /// reported as timed out
    pub join_timeout: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:4000/realtime".to_string(),
            heartbeat_interval: Duration::from_secs(30),
            join_timeout: Duration::from_secs(10),
        }
    }
}

/// Frame from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a channel with an ordered list of filters
    Join {
        channel: String,
        filters: Vec<WireFilter>,
    },

    /// Leave a channel
    Leave { channel: String },

    /// Heartbeat/ping
    Heartbeat {
        #[serde(default)]
        ref_id: Option<String>,
    },
}

/// Frame from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// All filters for the channel are active
    Joined { channel: String },

    /// A row change matching one of the filters
    Event { channel: String, change: RowChange },

    /// Heartbeat response
    Heartbeat {
        ref_id: Option<String>,
        server_time: i64,
    },

    /// Channel-level failure
    Error { message: String, code: String },

    /// Informational message, ignored by the client
    System { message: String },
}

/// WebSocket-backed transport
pub struct WebSocketTransport {
    config: WebSocketConfig,
}

impl WebSocketTransport {
    /// Create a transport for the given endpoint configuration
    pub fn new(config: WebSocketConfig) -> Self {
        Self { config }
    }
}

impl RealtimeTransport for WebSocketTransport {
    fn open_channel(
        &self,
        name: &str,
        filters: &[TopicFilter],
        sink: ChannelSink,
    ) -> RealtimeResult<Box<dyn ChannelHandle>> {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let config = self.config.clone();
        let name = name.to_string();
        let wire_filters: Vec<WireFilter> = filters.iter().map(TopicFilter::to_wire).collect();

        tokio::spawn(run_channel(config, name, wire_filters, sink, shutdown_rx));

        Ok(Box::new(WebSocketChannel {
            shutdown: Mutex::new(Some(shutdown_tx)),
        }))
    }
}

/// Handle to one socket task
struct WebSocketChannel {
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl ChannelHandle for WebSocketChannel {
    fn close(&self) {
        if let Ok(mut guard) = self.shutdown.lock() {
            if let Some(tx) = guard.take() {
                let _ = tx.send(());
            }
        }
    }
}

/// Drive one channel: connect, join, then pump frames until shutdown
async fn run_channel(
    config: WebSocketConfig,
    channel: String,
    filters: Vec<WireFilter>,
    sink: ChannelSink,
    mut shutdown: oneshot::Receiver<()>,
) {
    let connected = tokio::time::timeout(config.join_timeout, connect_async(config.url.as_str())).await;
    let ws = match connected {
        Ok(Ok((ws, _response))) => ws,
        Ok(Err(err)) => {
            (sink.on_status)(ChannelStatus::ChannelError(Some(err.to_string())));
            return;
        }
        Err(_) => {
            (sink.on_status)(ChannelStatus::TimedOut);
            return;
        }
    };

    let (mut tx, mut rx) = ws.split();

    let join = ClientMessage::Join {
        channel: channel.clone(),
        filters,
    };
    if send_frame(&mut tx, &join).await.is_err() {
        (sink.on_status)(ChannelStatus::ChannelError(Some(
            "join send failed".to_string(),
        )));
        return;
    }

    let mut heartbeat = tokio::time::interval(config.heartbeat_interval);
    heartbeat.tick().await; // immediate first tick

    let join_deadline = tokio::time::sleep(config.join_timeout);
    tokio::pin!(join_deadline);
    let mut subscribed = false;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                let leave = ClientMessage::Leave { channel: channel.clone() };
                let _ = send_frame(&mut tx, &leave).await;
                let _ = tx.send(Message::Close(None)).await;
                return;
            }

            _ = &mut join_deadline, if !subscribed => {
                (sink.on_status)(ChannelStatus::TimedOut);
                return;
            }

            frame = rx.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(ServerMessage::Joined { .. }) => {
                                subscribed = true;
                                (sink.on_status)(ChannelStatus::Subscribed);
                            }
                            Ok(ServerMessage::Event { change, .. }) => {
                                (sink.on_event)(change);
                            }
                            Ok(ServerMessage::Heartbeat { .. })
                            | Ok(ServerMessage::System { .. }) => {}
                            Ok(ServerMessage::Error { message, code }) => {
                                Logger::warn(
                                    "REALTIME_SERVER_ERROR",
                                    &[("channel", &channel), ("code", &code)],
                                );
                                (sink.on_status)(ChannelStatus::ChannelError(Some(message)));
                                return;
                            }
                            Err(err) => {
                                // Unknown frame: drop it, the channel survives
                                Logger::warn(
                                    "REALTIME_FRAME_DROPPED",
                                    &[("channel", &channel), ("reason", &err.to_string())],
                                );
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if tx.send(Message::Pong(payload)).await.is_err() {
                            (sink.on_status)(ChannelStatus::ChannelError(Some(
                                "pong send failed".to_string(),
                            )));
                            return;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        (sink.on_status)(ChannelStatus::Closed);
                        return;
                    }
                    Some(Err(err)) => {
                        (sink.on_status)(ChannelStatus::ChannelError(Some(err.to_string())));
                        return;
                    }
                    _ => {}
                }
            }

            _ = heartbeat.tick() => {
                let frame = ClientMessage::Heartbeat { ref_id: None };
                if send_frame(&mut tx, &frame).await.is_err() {
                    (sink.on_status)(ChannelStatus::ChannelError(Some(
                        "heartbeat send failed".to_string(),
                    )));
                    return;
                }
            }
        }
    }
}

async fn send_frame<S>(tx: &mut S, frame: &ClientMessage) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    let json = serde_json::to_string(frame).map_err(|_| ())?;
    tx.send(Message::Text(json)).await.map_err(|_| ())
}
