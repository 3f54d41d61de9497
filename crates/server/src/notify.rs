//! Server-initiated messages to the MCP client.
//!
//! Host events, reload requests and background sync reports are collected
//! on one channel and sent to the peer as logging notifications, each
//! payload tagged by `type`.

use async_trait::async_trait;
use offgrid_client::{HostEvent, Reloader};
use rmcp::model::{LoggingLevel, LoggingMessageNotificationParam};
use rmcp::service::{Peer, RoleServer};
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Logger name on every notification.
pub const LOGGER: &str = "offgrid";

/// Asks the host to reload by sending a `RELOAD` notification.
#[derive(Debug, Clone)]
pub struct ChannelReloader {
    out: mpsc::Sender<Value>,
}

impl ChannelReloader {
    pub fn new(out: mpsc::Sender<Value>) -> Self {
        Self { out }
    }
}

#[async_trait]
impl Reloader for ChannelReloader {
    async fn reload(&self) {
        if self.out.send(json!({ "type": "RELOAD" })).await.is_err() {
            tracing::warn!("reload requested but notification channel is closed");
        }
    }
}

/// Copy lifecycle events onto the notification channel.
pub fn forward_host_events(mut events: broadcast::Receiver<HostEvent>, out: mpsc::Sender<Value>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let payload = match serde_json::to_value(&event) {
                        Ok(v) => v,
                        Err(e) => {
                            tracing::warn!(error = %e, "host event not serializable");
                            continue;
                        }
                    };
                    if out.send(payload).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => tracing::warn!(skipped = n, "host events dropped"),
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn notification(data: Value) -> LoggingMessageNotificationParam {
    let level = match data.get("type").and_then(Value::as_str) {
        Some("SW_RESOURCE_ERROR" | "REGISTRATION_ERROR") => LoggingLevel::Error,
        Some("RELOAD" | "UPDATE_AVAILABLE") => LoggingLevel::Notice,
        _ => LoggingLevel::Info,
    };
    LoggingMessageNotificationParam { level, logger: Some(LOGGER.into()), data }
}

/// Send everything from `rx` to the client until the channel or the peer closes.
pub async fn notify_peer(mut rx: mpsc::Receiver<Value>, peer: Peer<RoleServer>) {
    while let Some(data) = rx.recv().await {
        if let Err(e) = peer.notify_logging_message(notification(data)).await {
            tracing::warn!(error = %e, "client notification failed, stopping");
            break;
        }
    }
}
