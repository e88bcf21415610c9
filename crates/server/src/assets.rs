//! Cached asset-account catalog endpoints.
//!
//! The ledger side pushes its account list wholesale; the engine only
//! reads the cache for listings and rule authoring.

use api_types::ApiResponse;
use axum::{Json, extract::State};
use engine::Asset;

use crate::{ServerError, server::ServerState};

pub async fn list(
    State(state): State<ServerState>,
) -> Result<Json<ApiResponse<Vec<Asset>>>, ServerError> {
    let catalog = state.engine.assets().await?;
    Ok(Json(ApiResponse::ok(catalog)))
}

pub async fn replace(
    State(state): State<ServerState>,
    Json(catalog): Json<Vec<Asset>>,
) -> Result<Json<ApiResponse<usize>>, ServerError> {
    let stored = state.engine.replace_assets(catalog).await?;
    Ok(Json(ApiResponse::ok(stored)))
}
