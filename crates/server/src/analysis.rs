//! Synchronous classification entry point.
//!
//! Unlike `/events`, the caller waits for the classify + merge result and
//! gets the resulting bill back; UI retest actions use this.

use api_types::{ApiResponse, analysis::AnalysisQuery, bill::BillView};
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use engine::{ClassifyOptions, EventKind, RawEvent};

use crate::{ServerError, bills, server::ServerState};

/// Event kind from the query string; `app` is accepted as an alias for
/// `app_data`.
pub(crate) fn parse_event_kind(value: &str) -> Result<EventKind, ServerError> {
    if value == "app" {
        return Ok(EventKind::AppData);
    }
    EventKind::try_from(value).map_err(ServerError::from)
}

pub async fn analyze(
    State(state): State<ServerState>,
    Query(query): Query<AnalysisQuery>,
    body: String,
) -> Result<impl IntoResponse, ServerError> {
    let kind = parse_event_kind(&query.event_type)?;
    let event = RawEvent::new(kind, query.app, body, Utc::now());
    let options = ClassifyOptions { force_ai: query.ai };

    let ingested = state.engine.classify_event(&event, options).await?;
    if !ingested.matched {
        let msg = ingested
            .reason
            .unwrap_or_else(|| "no matching rule".to_string());
        let envelope = ApiResponse::<BillView>::error(404, msg);
        return Ok((StatusCode::NOT_FOUND, Json(envelope)));
    }

    let envelope = ApiResponse::ok(bills::view(ingested.record));
    Ok((StatusCode::OK, Json(envelope)))
}
