//! Real-time delivery
//!
//! WebSocket connection lifecycle and the fire-and-forget dispatcher.
//! Delivery is best-effort: durability comes from the conversation store,
//! never from a push succeeding.

use crate::models::{RealtimeEvent, UserId};
use crate::presence::{Channel, PresenceRegistry};
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Pushes events to online recipients. No retry, no queue.
#[derive(Clone)]
pub struct Dispatcher {
    presence: Arc<PresenceRegistry>,
}

impl Dispatcher {
    pub fn new(presence: Arc<PresenceRegistry>) -> Self {
        Self { presence }
    }

    /// Push `event` to the recipient if they are online; silently drop it
    /// otherwise. Recipients that were offline pull the state on their
    /// next list call.
    pub fn notify(&self, recipient: &UserId, event: RealtimeEvent) {
        match self.presence.lookup(recipient) {
            Some(channel) => {
                if !channel.push(event) {
                    debug!("[Realtime] Dropped event for {}: channel closed", recipient);
                }
            }
            None => {
                debug!("[Realtime] {} offline, event dropped", recipient);
            }
        }
    }
}

/// Drive one WebSocket connection: register presence, forward queued
/// events to the socket, and unregister when the connection ends for any
/// reason. An abrupt drop takes the same path as a clean close.
pub async fn run_connection(socket: WebSocket, presence: Arc<PresenceRegistry>, user_id: UserId) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<RealtimeEvent>();
    let channel = Channel::new(tx);
    let channel_id = channel.id().to_string();

    presence.register(user_id.clone(), channel);
    info!("[Realtime] Connection {} opened for {}", channel_id, user_id);

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else {
                    // Our channel was superseded by a newer registration.
                    break;
                };
                let payload = match serde_json::to_string(&event) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("[Realtime] Failed to encode event: {}", e);
                        continue;
                    }
                };
                if sink.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            msg = stream.next() => {
                match msg {
                    // Inbound traffic is ignored; clients talk over HTTP.
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    presence.unregister(&user_id, &channel_id);
    info!("[Realtime] Connection {} closed for {}", channel_id, user_id);
}
