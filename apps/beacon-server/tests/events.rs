//! `/events` WebSocket tests against a served router.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use beacon_core::TicketClass;
use beacon_db::{Database, DbConfig};
use beacon_dispatch::{DispatchEngine, EventBroadcaster};
use beacon_server::{router, AppState};

async fn serve() -> (String, Arc<DispatchEngine>) {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let engine = Arc::new(DispatchEngine::new(db, EventBroadcaster::new(64)));
    let app = router(AppState::new(engine.clone()));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    (format!("ws://{addr}/events"), engine)
}

async fn next_json<S>(socket: &mut S) -> Value
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("no frame within 5s")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn intake_is_pushed_as_text_frame() {
    let (url, engine) = serve().await;
    let (mut socket, _) = connect_async(url.as_str()).await.unwrap();

    engine.intake(TicketClass::WalkIn, "Battery", None).await.unwrap();

    let event = next_json(&mut socket).await;
    assert_eq!(event["type"], "queue_added");
    assert_eq!(event["ticket_number"], "W001");
    assert_eq!(event["class"], "walk-in");
}

#[tokio::test]
async fn events_arrive_in_publish_order() {
    let (url, engine) = serve().await;
    let counter = engine.database().counters().register("Counter 1", 1).await.unwrap();
    let (mut socket, _) = connect_async(url.as_str()).await.unwrap();

    engine.intake(TicketClass::WalkIn, "Battery", None).await.unwrap();
    engine.call_next(&counter.id, TicketClass::WalkIn).await.unwrap();

    assert_eq!(next_json(&mut socket).await["type"], "queue_added");
    let called = next_json(&mut socket).await;
    assert_eq!(called["type"], "customer_called");
    assert_eq!(called["ticket_number"], "W001");
}
