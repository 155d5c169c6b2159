//! Archive lifecycle endpoints
//!
//! Every response carries `invalidate`: the cache keys a client should drop
//! before re-fetching.

use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};

use super::parse_table;
use crate::dto::{ArchiveRequest, ArchiveResponse, BulkArchiveRequest, audit_context};
use crate::error::ApiResult;
use crate::state::AppState;

/// Archive one record
pub async fn archive_record(
    State(state): State<AppState>,
    Path((table, id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Option<Json<ArchiveRequest>>,
) -> ApiResult<Json<ArchiveResponse>> {
    let table = parse_table(&table)?;
    let details = body.and_then(|Json(req)| req.details);
    let ctx = audit_context(&headers, details);
    let outcome = state
        .blocking(move |state| state.archive().archive(table, &id, &ctx))
        .await?;
    Ok(Json(outcome.into()))
}

/// Restore one archived record
pub async fn unarchive_record(
    State(state): State<AppState>,
    Path((table, id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Option<Json<ArchiveRequest>>,
) -> ApiResult<Json<ArchiveResponse>> {
    let table = parse_table(&table)?;
    let details = body.and_then(|Json(req)| req.details);
    let ctx = audit_context(&headers, details);
    let outcome = state
        .blocking(move |state| state.archive().unarchive(table, &id, &ctx))
        .await?;
    Ok(Json(outcome.into()))
}

/// Archive up to 100 records at once
pub async fn bulk_archive(
    State(state): State<AppState>,
    Path(table): Path<String>,
    headers: HeaderMap,
    Json(req): Json<BulkArchiveRequest>,
) -> ApiResult<Json<ArchiveResponse>> {
    let table = parse_table(&table)?;
    let BulkArchiveRequest { ids, details } = req;
    let ctx = audit_context(&headers, details);
    let outcome = state
        .blocking(move |state| state.archive().bulk_archive(table, &ids, &ctx))
        .await?;
    Ok(Json(outcome.into()))
}
