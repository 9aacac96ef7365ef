//! # HTTP Handlers
//!
//! JSON request/response mapping around [`DispatchEngine`] calls. Request
//! bodies use camelCase; tickets and counters serialize as the core types
//! do. Body and query extractors are taken as `Result` so that malformed
//! input answers with the usual `{code, message}` shape.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

use beacon_core::{Counter, Ticket, TicketClass, TicketStatus};
use beacon_dispatch::{CallNextOutcome, CounterView};

use crate::error::ApiError;
use crate::AppState;

type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// Request / Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeRequest {
    pub class: String,
    pub category: String,
    /// Manual display number (walk-in only).
    #[serde(default)]
    pub number: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub class: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClassQuery {
    pub class: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextNumberResponse {
    pub class: TicketClass,
    pub number: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallNextRequest {
    pub counter_id: String,
    pub class: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallNextResponse {
    /// `called` or `no_customers_waiting`.
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket: Option<Ticket>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counter: Option<Counter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_prior: Option<Ticket>,
}

impl From<CallNextOutcome> for CallNextResponse {
    fn from(outcome: CallNextOutcome) -> Self {
        match outcome {
            CallNextOutcome::Called {
                ticket,
                counter,
                completed_prior,
            } => CallNextResponse {
                outcome: "called",
                ticket: Some(ticket),
                counter: Some(counter),
                completed_prior,
            },
            CallNextOutcome::NoCustomersWaiting { completed_prior } => CallNextResponse {
                outcome: "no_customers_waiting",
                ticket: None,
                counter: None,
                completed_prior,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    /// Service time in seconds.
    pub duration: i64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: bool,
    pub subscribers: usize,
}

// =============================================================================
// Tickets
// =============================================================================

pub async fn create_ticket(
    State(state): State<AppState>,
    payload: Result<Json<IntakeRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Ticket>)> {
    let Json(req) = payload?;
    let class = TicketClass::from_str(&req.class)?;
    let ticket = state
        .engine
        .intake(class, &req.category, req.number.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

pub async fn list_tickets(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Ticket>>> {
    let Query(query) = query?;
    let status = match query.status.as_deref() {
        Some(s) => TicketStatus::from_str(s)?,
        None => TicketStatus::Waiting,
    };
    let class = query.class.as_deref().map(TicketClass::from_str).transpose()?;

    let tickets = state.engine.list(status, class).await?;
    debug!(status = %status, count = tickets.len(), "Listed tickets");
    Ok(Json(tickets))
}

pub async fn next_number(
    State(state): State<AppState>,
    query: Result<Query<ClassQuery>, QueryRejection>,
) -> ApiResult<Json<NextNumberResponse>> {
    let Query(query) = query?;
    let class = TicketClass::from_str(&query.class)?;
    let number = state.engine.preview_number(class).await?;
    Ok(Json(NextNumberResponse { class, number }))
}

pub async fn get_ticket(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Ticket>> {
    Ok(Json(state.engine.ticket(&id).await?))
}

pub async fn complete_ticket(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<CompleteRequest>, JsonRejection>,
) -> ApiResult<Json<Ticket>> {
    let Json(req) = payload?;
    Ok(Json(state.engine.complete(&id, req.duration).await?))
}

pub async fn cancel_ticket(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Ticket>> {
    Ok(Json(state.engine.cancel(&id).await?))
}

// =============================================================================
// Dispatch
// =============================================================================

pub async fn call_next(
    State(state): State<AppState>,
    payload: Result<Json<CallNextRequest>, JsonRejection>,
) -> ApiResult<Json<CallNextResponse>> {
    let Json(req) = payload?;
    let class = TicketClass::from_str(&req.class)?;
    let outcome = state.engine.call_next(&req.counter_id, class).await?;
    Ok(Json(outcome.into()))
}

// =============================================================================
// Counters
// =============================================================================

pub async fn list_counters(State(state): State<AppState>) -> ApiResult<Json<Vec<CounterView>>> {
    Ok(Json(state.engine.counters().await?))
}

pub async fn get_counter(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<CounterView>> {
    Ok(Json(state.engine.counter(&id).await?))
}

pub async fn current_ticket(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Option<Ticket>>> {
    Ok(Json(state.engine.current_for_counter(&id).await?))
}

// =============================================================================
// Health
// =============================================================================

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let database = state.engine.database().health_check().await;
    let body = HealthResponse {
        status: if database { "ok" } else { "degraded" },
        database,
        subscribers: state.engine.broadcaster().subscriber_count(),
    };
    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}
