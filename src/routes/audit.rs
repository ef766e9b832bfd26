//! Audit Routes
//!
//! Every request goes through the configured audit engine; update and delete
//! are exposed so that refused mutations surface as 409 rather than 405.

use crate::audit::{AuditFilter, AuditPatch, AuditRecord, NewAuditRecord};
use crate::error::GovernanceResult;
use crate::models::SuccessResponse;
use crate::state::SharedState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

pub async fn append_record(
    State(state): State<SharedState>,
    Json(req): Json<NewAuditRecord>,
) -> GovernanceResult<(StatusCode, Json<SuccessResponse<AuditRecord>>)> {
    let record = state.audit.append(req).await?;
    Ok((
        StatusCode::CREATED,
        Json(SuccessResponse::with_data("Audit record appended", record)),
    ))
}

pub async fn list_records(
    State(state): State<SharedState>,
    Query(filter): Query<AuditFilter>,
) -> GovernanceResult<Json<SuccessResponse<Vec<AuditRecord>>>> {
    let records = state.audit.list(&filter).await?;
    Ok(Json(SuccessResponse::with_data(
        format!("{} audit record(s)", records.len()),
        records,
    )))
}

pub async fn get_record(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> GovernanceResult<Json<SuccessResponse<AuditRecord>>> {
    let record = state.audit.get(id).await?;
    Ok(Json(SuccessResponse::with_data("Audit record", record)))
}

pub async fn update_record(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<AuditPatch>,
) -> GovernanceResult<Json<SuccessResponse<AuditRecord>>> {
    let record = state.audit.update(id, patch).await?;
    Ok(Json(SuccessResponse::with_data("Audit record updated", record)))
}

pub async fn delete_record(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> GovernanceResult<StatusCode> {
    state.audit.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
