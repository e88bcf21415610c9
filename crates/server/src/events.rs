//! Fire-and-forget ingestion endpoint for event-source adapters.
//!
//! The capture side must return immediately: the event is validated only
//! as far as its kind, then handed to the bounded ingestion queue.

use api_types::{ApiResponse, analysis::AnalysisQuery};
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use engine::RawEvent;

use crate::{ServerError, analysis::parse_event_kind, server::ServerState};

pub async fn enqueue(
    State(state): State<ServerState>,
    Query(query): Query<AnalysisQuery>,
    body: String,
) -> Result<impl IntoResponse, ServerError> {
    let kind = parse_event_kind(&query.event_type)?;
    let event = RawEvent::new(kind, query.app, body, Utc::now());

    // A full queue drops the event; that is degradation, not a client error.
    state.ingest.submit(event);
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::<()>::accepted("queued")),
    ))
}
