//! Bill listing, editing and lifecycle endpoints.

use api_types::{
    ApiResponse,
    bill::{BillListQuery, BillStateChange, BillUpdate, BillView, Deleted, FailView},
};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use engine::{BillKind, BillPatch, BillRecord, BillState, MoneyCents};

use crate::{ServerError, server::ServerState};

/// Flattens a record into its API view, lifting group members and failure
/// context out of extend data.
pub(crate) fn view(record: BillRecord) -> BillView {
    let extend = record.extend();
    BillView {
        id: record.id,
        group_id: record.group_id,
        kind: record.kind.as_str().to_string(),
        money_cents: record.money.cents(),
        money: record.money.to_string(),
        currency: record.currency,
        occurred_at: record.occurred_at,
        account_from: record.account_from,
        account_to: record.account_to,
        category: record.category,
        remark: record.remark,
        tag: record.tag,
        source_app: record.source_app,
        rule_name: record.rule_name,
        matched: record.matched,
        rule_version: record.rule_version,
        state: record.state.as_str().to_string(),
        members: extend.group,
        fail: extend.fail.map(|fail| FailView {
            reason: fail.reason,
            message: fail.message,
        }),
        created_at: record.created_at,
    }
}

fn views(records: Vec<BillRecord>) -> Vec<BillView> {
    records.into_iter().map(view).collect()
}

pub async fn list(
    State(state): State<ServerState>,
    Query(query): Query<BillListQuery>,
) -> Result<Json<ApiResponse<Vec<BillView>>>, ServerError> {
    let limit = query.limit.unwrap_or(50).min(500);
    let offset = query.offset.unwrap_or(0);
    let records = state.engine.bills_page(limit, offset).await?;
    Ok(Json(ApiResponse::ok(views(records))))
}

pub async fn pending_edit(
    State(state): State<ServerState>,
) -> Result<Json<ApiResponse<Vec<BillView>>>, ServerError> {
    let records = state.engine.pending_edit().await?;
    Ok(Json(ApiResponse::ok(views(records))))
}

pub async fn pending_sync(
    State(state): State<ServerState>,
) -> Result<Json<ApiResponse<Vec<BillView>>>, ServerError> {
    let records = state.engine.pending_sync().await?;
    Ok(Json(ApiResponse::ok(views(records))))
}

pub async fn get(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<BillView>>, ServerError> {
    let record = state.engine.bill(id).await?;
    Ok(Json(ApiResponse::ok(view(record))))
}

pub async fn group(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<BillView>>>, ServerError> {
    let records = state.engine.group_members(id).await?;
    Ok(Json(ApiResponse::ok(views(records))))
}

pub async fn update(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Json(payload): Json<BillUpdate>,
) -> Result<Json<ApiResponse<BillView>>, ServerError> {
    let kind = payload
        .kind
        .as_deref()
        .map(BillKind::try_from)
        .transpose()?;
    let patch = BillPatch {
        kind,
        money: payload.money_cents.map(MoneyCents::new),
        currency: payload.currency,
        occurred_at: payload.occurred_at,
        account_from: payload.account_from,
        account_to: payload.account_to,
        category: payload.category,
        remark: payload.remark,
        tag: payload.tag,
    };

    let record = state.engine.update_bill(id, patch).await?;
    Ok(Json(ApiResponse::ok(view(record))))
}

pub async fn change_state(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Json(payload): Json<BillStateChange>,
) -> Result<Json<ApiResponse<BillView>>, ServerError> {
    let to = BillState::try_from(payload.state.as_str())?;
    let record = state.engine.update_state(id, to).await?;
    Ok(Json(ApiResponse::ok(view(record))))
}

pub async fn delete(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Deleted>>, ServerError> {
    let deleted = state.engine.delete_bill(id).await?;
    Ok(Json(ApiResponse::ok(Deleted { deleted })))
}
