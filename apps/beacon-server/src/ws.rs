//! # Event WebSocket
//!
//! `GET /events` upgrades to a WebSocket that streams every queue event as
//! one JSON text frame, in publish order.
//!
//! ```text
//! client ──► GET /events (Upgrade)
//!              │  subscribe to the broadcaster before upgrading
//!              ▼
//!        ┌───────────────┐  Text({"type":"customer_called",...})
//!        │ session loop  │ ────────────────────────────────────► client
//!        │               │ ◄── Close / disconnect ends the loop
//!        └───────────────┘
//! ```
//!
//! The socket is push-only; text sent by the client is ignored.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use beacon_dispatch::EventSubscription;

use crate::AppState;

pub async fn events(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let subscription = state.engine.broadcaster().subscribe();
    ws.on_upgrade(move |socket| session(socket, subscription))
}

async fn session(socket: WebSocket, mut events: EventSubscription) {
    let (mut sender, mut receiver) = socket.split();
    info!("Event subscriber connected");

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    debug!("Broadcaster closed, ending event session");
                    break;
                };
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(?e, event = event.kind(), "Failed to serialize event");
                        continue;
                    }
                };
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }

            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(?e, "Event socket error");
                        break;
                    }
                }
            }
        }
    }

    info!("Event subscriber disconnected");
}
