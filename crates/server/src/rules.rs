//! Rule management: list, atomic replace (with version bump) and retest.

use api_types::{
    ApiResponse,
    rules::{RetestResult, RulesReplaced},
};
use axum::{Json, extract::State};
use engine::RuleSpec;

use crate::{ServerError, server::ServerState};

pub async fn list(
    State(state): State<ServerState>,
) -> Result<Json<ApiResponse<Vec<RuleSpec>>>, ServerError> {
    let specs = state.engine.rules_list().await?;
    Ok(Json(ApiResponse::ok(specs)))
}

pub async fn replace(
    State(state): State<ServerState>,
    Json(specs): Json<Vec<RuleSpec>>,
) -> Result<Json<ApiResponse<RulesReplaced>>, ServerError> {
    let rules = specs.len();
    let version = state.engine.replace_rules(specs).await?;
    Ok(Json(ApiResponse::ok(RulesReplaced { version, rules })))
}

pub async fn retest(
    State(state): State<ServerState>,
) -> Result<Json<ApiResponse<RetestResult>>, ServerError> {
    let report = state.engine.retest_unmatched().await?;
    Ok(Json(ApiResponse::ok(RetestResult {
        retested: report.retested,
        matched: report.matched,
    })))
}
