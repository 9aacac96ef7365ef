//! # beacon-server
//!
//! HTTP and WebSocket surface of the queue.
//!
//! ## Routes
//! ```text
//! POST /tickets                    intake {class, category, number?} → 201
//! GET  /tickets?status=&class=     FIFO listing (status defaults to waiting)
//! GET  /tickets/next-number?class= number the next intake would get
//! GET  /tickets/{id}               one ticket
//! POST /tickets/{id}/complete      {duration}
//! POST /tickets/{id}/cancel
//! POST /dispatch/call-next         {counterId, class}
//! GET  /counters                   active counters + current ticket
//! GET  /counters/{id}
//! GET  /counters/{id}/current      serving ticket or null
//! GET  /events                     WebSocket event stream
//! GET  /health
//! ```

pub mod error;
pub mod routes;
pub mod ws;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use beacon_dispatch::DispatchEngine;

pub use error::ApiError;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DispatchEngine>,
}

impl AppState {
    pub fn new(engine: Arc<DispatchEngine>) -> Self {
        AppState { engine }
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/tickets", post(routes::create_ticket).get(routes::list_tickets))
        .route("/tickets/next-number", get(routes::next_number))
        .route("/tickets/{id}", get(routes::get_ticket))
        .route("/tickets/{id}/complete", post(routes::complete_ticket))
        .route("/tickets/{id}/cancel", post(routes::cancel_ticket))
        .route("/dispatch/call-next", post(routes::call_next))
        .route("/counters", get(routes::list_counters))
        .route("/counters/{id}", get(routes::get_counter))
        .route("/counters/{id}/current", get(routes::current_ticket))
        .route("/events", get(ws::events))
        .route("/health", get(routes::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
