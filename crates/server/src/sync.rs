//! Manual sync trigger.

use api_types::{
    ApiResponse,
    sync::{SyncQueued, SyncRequest},
};
use axum::{Json, extract::State};

use crate::{ServerError, server::ServerState};

/// Queues a sync run on the bill processor. `queued = false` means a run
/// is already pending; it will pick up the same records.
pub async fn trigger(
    State(state): State<ServerState>,
    payload: Option<Json<SyncRequest>>,
) -> Result<Json<ApiResponse<SyncQueued>>, ServerError> {
    let force = payload.map(|Json(req)| req.force).unwrap_or(false);
    let queued = state.sync.trigger(force);
    Ok(Json(ApiResponse::ok(SyncQueued { queued })))
}
