//! Message ingestion and status-query routes.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{MessageRecord, SendRequest};
use courier_router::RouteReceipt;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/messages", post(send_message).get(list_messages))
        .route("/api/messages/{id}", get(get_message))
}

/// POST /api/messages — Validate, dedup and enqueue a notification request.
/// Returns 202: the message is tracked asynchronously via the status store.
async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SendRequest>,
) -> Result<(StatusCode, Json<RouteReceipt>), AppError> {
    let trace_id = extract_trace_id(&headers);
    let receipt = state.router.route(&request, trace_id).await?;
    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

/// GET /api/messages/:id — Current lifecycle record of a message.
async fn get_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageRecord>, AppError> {
    let record: Option<MessageRecord> =
        sqlx::query_as("SELECT * FROM messages WHERE message_id = $1")
            .bind(id)
            .fetch_optional(&state.pool)
            .await?;

    record
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Message {id} not found")))
}

#[derive(Debug, Deserialize)]
struct TraceQuery {
    trace_id: Uuid,
}

/// GET /api/messages?trace_id=... — All message records sharing a trace.
async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<TraceQuery>,
) -> Result<Json<Vec<MessageRecord>>, AppError> {
    let records: Vec<MessageRecord> =
        sqlx::query_as("SELECT * FROM messages WHERE trace_id = $1 ORDER BY created_at")
            .bind(query.trace_id)
            .fetch_all(&state.pool)
            .await?;

    Ok(Json(records))
}

/// Trace id supplied by the caller, if present and well-formed.
fn extract_trace_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get("x-trace-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())
}
