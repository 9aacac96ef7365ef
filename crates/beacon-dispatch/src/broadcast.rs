//! # Event Broadcaster
//!
//! Fans queue events out to every live subscriber (WebSocket sessions, the
//! webhook forwarder).
//!
//! ## Delivery Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Event Broadcaster                                 │
//! │                                                                         │
//! │  DispatchEngine ──┐                                                    │
//! │                   ├──► publish() ──► broadcast::channel(capacity)      │
//! │  Reconciler ──────┘    never blocks,        │                          │
//! │                        never fails          ├──► EventSubscription     │
//! │                                             ├──► EventSubscription     │
//! │                                             └──► WebhookForwarder      │
//! │                                                                         │
//! │  ORDERING: each subscriber sees events in publish order.               │
//! │  LAG: a subscriber that falls `capacity` events behind loses the       │
//! │       oldest ones; the loss is logged and the stream continues.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use futures_util::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use beacon_core::QueueEvent;

/// Default channel capacity.
pub const DEFAULT_CAPACITY: usize = 1024;

// =============================================================================
// Broadcaster
// =============================================================================

/// Cheap to clone; clones publish into the same channel.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<QueueEvent>,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBroadcaster {
    /// Creates a broadcaster buffering up to `capacity` events per
    /// subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        EventBroadcaster { tx }
    }

    /// Enqueues an event for all current subscribers.
    pub fn publish(&self, event: QueueEvent) {
        let kind = event.kind();
        let number = event.ticket().ticket_number.clone();

        match self.tx.send(event) {
            Ok(receivers) => {
                debug!(event = kind, ticket = %number, receivers, "Event published");
            }
            Err(_) => {
                debug!(event = kind, ticket = %number, "No subscribers for event");
            }
        }
    }

    /// Starts receiving events published from now on.
    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// One subscriber's ordered view of the event stream.
#[derive(Debug)]
pub struct EventSubscription {
    rx: broadcast::Receiver<QueueEvent>,
}

impl EventSubscription {
    /// Next event, or `None` once every broadcaster clone is gone.
    pub async fn recv(&mut self) -> Option<QueueEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Event subscriber lagged, events dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Converts into a `Stream`, logging and skipping over lag.
    pub fn into_stream(self) -> impl Stream<Item = QueueEvent> + Send + Unpin {
        BroadcastStream::new(self.rx).filter_map(|item| {
            std::future::ready(match item {
                Ok(event) => Some(event),
                Err(BroadcastStreamRecvError::Lagged(missed)) => {
                    warn!(missed, "Event stream lagged, events dropped");
                    None
                }
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::{Ticket, TicketClass, TicketStatus};
    use chrono::Utc;

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

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let broadcaster = EventBroadcaster::new(8);
        broadcaster.publish(QueueEvent::queue_added(&ticket("W001")));
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribers_see_publish_order() {
        let broadcaster = EventBroadcaster::new(8);
        let mut first = broadcaster.subscribe();
        let mut second = broadcaster.subscribe();

        for number in ["W001", "W002", "W003"] {
            broadcaster.publish(QueueEvent::queue_added(&ticket(number)));
        }

        for sub in [&mut first, &mut second] {
            let mut seen = Vec::new();
            for _ in 0..3 {
                seen.push(sub.recv().await.unwrap().ticket().ticket_number.clone());
            }
            assert_eq!(seen, vec!["W001", "W002", "W003"]);
        }
    }

    #[tokio::test]
    async fn test_lagging_subscriber_continues() {
        let broadcaster = EventBroadcaster::new(2);
        let mut sub = broadcaster.subscribe();

        for number in ["W001", "W002", "W003", "W004"] {
            broadcaster.publish(QueueEvent::queue_added(&ticket(number)));
        }

        // The two oldest were overwritten.
        assert_eq!(sub.recv().await.unwrap().ticket().ticket_number, "W003");
        assert_eq!(sub.recv().await.unwrap().ticket().ticket_number, "W004");
    }

    #[tokio::test]
    async fn test_recv_ends_when_broadcaster_dropped() {
        let broadcaster = EventBroadcaster::new(4);
        let mut sub = broadcaster.subscribe();
        broadcaster.publish(QueueEvent::queue_added(&ticket("W001")));
        drop(broadcaster);

        assert!(sub.recv().await.is_some());
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_stream_yields_events() {
        let broadcaster = EventBroadcaster::new(4);
        let mut stream = broadcaster.subscribe().into_stream();
        broadcaster.publish(QueueEvent::queue_added(&ticket("A001")));

        let event = stream.next().await.unwrap();
        assert_eq!(event.kind(), "queue_added");
    }
}
