//! Durable key/value settings endpoints.
//!
//! The companion app mirrors its feature toggles through here; the
//! ruleset version and reimbursement hash are maintained by the engine
//! itself but readable for diagnostics.

use api_types::{
    ApiResponse,
    settings::{SettingPut, SettingView},
};
use axum::{
    Json,
    extract::{Path, State},
};

use crate::{ServerError, server::ServerState};

pub async fn get(
    State(state): State<ServerState>,
    Path(key): Path<String>,
) -> Result<Json<ApiResponse<SettingView>>, ServerError> {
    let value = state.engine.setting(&key).await?;
    Ok(Json(ApiResponse::ok(SettingView { key, value })))
}

pub async fn put(
    State(state): State<ServerState>,
    Json(payload): Json<SettingPut>,
) -> Result<Json<ApiResponse<SettingView>>, ServerError> {
    state
        .engine
        .set_setting(&payload.key, &payload.value)
        .await?;
    Ok(Json(ApiResponse::ok(SettingView {
        key: payload.key,
        value: Some(payload.value),
    })))
}
