//! # Webhook Event Sink
//!
//! Forwards every queue event to an external HTTP endpoint (display-board
//! relay, realtime push server) as a JSON `POST`.
//!
//! ## Delivery
//! ```text
//! EventSubscription ──► recv() ──► POST {url} (JSON body = event)
//!                                     │
//!                                     ├── 2xx            → next event
//!                                     ├── 5xx / 429 / IO → retry with backoff
//!                                     │                    (200ms, 400ms, ... ≤ 5s)
//!                                     │                    until max_elapsed
//!                                     └── other 4xx      → drop, log
//! ```
//!
//! Events go out one at a time, in publish order. Delivery is best effort:
//! receivers de-duplicate by `(type, ticket_number, timestamp)`.

use backoff::ExponentialBackoff;
use reqwest::StatusCode;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use beacon_core::QueueEvent;

use crate::broadcast::EventSubscription;
use crate::error::{DispatchError, DispatchResult};

const INITIAL_BACKOFF: Duration = Duration::from_millis(200);
const MAX_BACKOFF: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Forwarder
// =============================================================================

/// Posts events from one subscription to a webhook URL.
pub struct WebhookForwarder {
    sink: WebhookSink,
    events: EventSubscription,
    shutdown_rx: mpsc::Receiver<()>,
}

/// HTTP side of the forwarder.
struct WebhookSink {
    client: reqwest::Client,
    url: String,
    max_elapsed: Duration,
}

/// Handle for stopping a running forwarder.
#[derive(Debug, Clone)]
pub struct WebhookHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl WebhookHandle {
    /// Stops the forwarder. Events not yet delivered are dropped.
    pub async fn shutdown(&self) {
        if self.shutdown_tx.send(()).await.is_err() {
            debug!("Webhook forwarder already stopped");
        }
    }
}

impl WebhookForwarder {
    /// Creates a forwarder for `url`, consuming events from `events`.
    pub fn new(
        url: impl Into<String>,
        max_elapsed: Duration,
        events: EventSubscription,
    ) -> DispatchResult<(Self, WebhookHandle)> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DispatchError::InvalidConfig(format!("webhook client: {e}")))?;
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let forwarder = WebhookForwarder {
            sink: WebhookSink {
                client,
                url: url.into(),
                max_elapsed,
            },
            events,
            shutdown_rx,
        };

        Ok((forwarder, WebhookHandle { shutdown_tx }))
    }

    /// Delivers events until shut down or the broadcaster goes away.
    ///
    /// This should be spawned as a background task. Shutdown also cuts short
    /// a delivery that is still retrying.
    pub async fn run(mut self) {
        info!(url = %self.sink.url, "Webhook forwarder starting");

        loop {
            tokio::select! {
                event = self.events.recv() => {
                    let Some(event) = event else {
                        debug!("Event stream closed");
                        break;
                    };
                    tokio::select! {
                        _ = self.sink.forward(&event) => {}
                        _ = self.shutdown_rx.recv() => {
                            info!(
                                event = event.kind(),
                                ticket = %event.ticket().ticket_number,
                                "Webhook forwarder shutting down mid-delivery"
                            );
                            break;
                        }
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Webhook forwarder shutting down");
                    break;
                }
            }
        }

        info!("Webhook forwarder stopped");
    }
}

impl WebhookSink {
    async fn forward(&self, event: &QueueEvent) {
        match self.deliver(event).await {
            Ok(()) => {
                debug!(event = event.kind(), ticket = %event.ticket().ticket_number, "Event delivered");
            }
            Err(e) => {
                error!(
                    event = event.kind(),
                    ticket = %event.ticket().ticket_number,
                    error = %e,
                    "Dropping event after failed delivery"
                );
            }
        }
    }

    async fn deliver(&self, event: &QueueEvent) -> Result<(), reqwest::Error> {
        let policy = ExponentialBackoff {
            initial_interval: INITIAL_BACKOFF,
            max_interval: MAX_BACKOFF,
            multiplier: 2.0,
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        };

        backoff::future::retry(policy, move || async move {
            let response = self
                .client
                .post(&self.url)
                .json(event)
                .send()
                .await
                .map_err(|e| {
                    warn!(error = %e, "Webhook request failed, retrying");
                    backoff::Error::transient(e)
                })?;

            match response.error_for_status() {
                Ok(_) => Ok(()),
                Err(e) if e.status().is_some_and(is_retryable) => {
                    warn!(status = ?e.status(), "Webhook endpoint unavailable, retrying");
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        })
        .await
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::EventBroadcaster;
    use axum::extract::State;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::post;
    use axum::{Json, Router};
    use beacon_core::{Ticket, TicketClass, TicketStatus};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Sink {
        received: Arc<Mutex<Vec<serde_json::Value>>>,
        calls: Arc<AtomicUsize>,
        fail_first: usize,
        status: Option<AxumStatus>,
    }

    async fn receive(State(sink): State<Sink>, Json(body): Json<serde_json::Value>) -> AxumStatus {
        let call = sink.calls.fetch_add(1, Ordering::SeqCst);
        if call < sink.fail_first {
            return sink.status.unwrap_or(AxumStatus::SERVICE_UNAVAILABLE);
        }
        sink.received.lock().unwrap().push(body);
        AxumStatus::NO_CONTENT
    }

    async fn start_sink(sink: Sink) -> String {
        let app = Router::new().route("/hook", post(receive)).with_state(sink);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        format!("http://{addr}/hook")
    }

    fn ticket(number: &str) -> Ticket {
        Ticket {
            id: format!("id-{number}"),
            number: number.to_string(),
            class: TicketClass::WalkIn,
            category: "Battery".to_string(),
            status: TicketStatus::Waiting,
            counter_id: None,
            created_at: Utc::now(),
            called_at: None,
            completed_at: None,
            service_duration: None,
        }
    }

    async fn wait_for(sink: &Sink, count: usize) {
        for _ in 0..200 {
            if sink.received.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("webhook did not receive {count} events");
    }

    #[tokio::test]
    async fn test_events_delivered_in_order_after_retry() {
        let sink = Sink {
            fail_first: 1,
            ..Default::default()
        };
        let url = start_sink(sink.clone()).await;

        let broadcaster = EventBroadcaster::new(16);
        let (forwarder, handle) =
            WebhookForwarder::new(url, Duration::from_secs(5), broadcaster.subscribe()).unwrap();
        let task = tokio::spawn(forwarder.run());

        broadcaster.publish(QueueEvent::queue_added(&ticket("W001")));
        broadcaster.publish(QueueEvent::queue_added(&ticket("W002")));
        wait_for(&sink, 2).await;

        let received = sink.received.lock().unwrap().clone();
        assert_eq!(received[0]["type"], "queue_added");
        assert_eq!(received[0]["ticket_number"], "W001");
        assert_eq!(received[1]["ticket_number"], "W002");
        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);

        handle.shutdown().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_client_error_drops_event_and_moves_on() {
        let sink = Sink {
            fail_first: 1,
            status: Some(AxumStatus::BAD_REQUEST),
            ..Default::default()
        };
        let url = start_sink(sink.clone()).await;

        let broadcaster = EventBroadcaster::new(16);
        let (forwarder, handle) =
            WebhookForwarder::new(url, Duration::from_secs(5), broadcaster.subscribe()).unwrap();
        let task = tokio::spawn(forwarder.run());

        broadcaster.publish(QueueEvent::queue_added(&ticket("W001")));
        broadcaster.publish(QueueEvent::queue_added(&ticket("W002")));
        wait_for(&sink, 1).await;

        let received = sink.received.lock().unwrap().clone();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0]["ticket_number"], "W002");

        handle.shutdown().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_forwarder_stops_when_broadcaster_dropped() {
        let broadcaster = EventBroadcaster::new(4);
        let (forwarder, _handle) = WebhookForwarder::new(
            "http://127.0.0.1:9/unused",
            Duration::from_millis(100),
            broadcaster.subscribe(),
        )
        .unwrap();
        let task = tokio::spawn(forwarder.run());
        drop(broadcaster);

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_retrying_delivery() {
        let sink = Sink {
            fail_first: usize::MAX,
            ..Default::default()
        };
        let url = start_sink(sink.clone()).await;

        let broadcaster = EventBroadcaster::new(4);
        let (forwarder, handle) =
            WebhookForwarder::new(url, Duration::from_secs(60), broadcaster.subscribe()).unwrap();
        let task = tokio::spawn(forwarder.run());

        broadcaster.publish(QueueEvent::queue_added(&ticket("W001")));
        for _ in 0..200 {
            if sink.calls.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(sink.calls.load(Ordering::SeqCst) > 0);

        handle.shutdown().await;
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(sink.received.lock().unwrap().is_empty());
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable(StatusCode::BAD_GATEWAY));
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_retryable(StatusCode::NOT_FOUND));
    }
}
