//! Audit trail read endpoint

use axum::{
    Json,
    extract::{Query, State},
};
use fibertrack_core::audit::{AuditFilter, AuditLogEntry};

use crate::dto::AuditLogQuery;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const DEFAULT_LIMIT: u32 = 100;

/// Audit entries, newest first
pub async fn list_audit_logs(
    State(state): State<AppState>,
    Query(query): Query<AuditLogQuery>,
) -> ApiResult<Json<Vec<AuditLogEntry>>> {
    let bad_request = |e: anyhow::Error| ApiError::BadRequest(e.to_string());
    let filter = AuditFilter {
        resource_type: query
            .resource_type
            .as_deref()
            .map(str::parse)
            .transpose()
            .map_err(bad_request)?,
        resource_id: query.resource_id,
        action: query
            .action
            .as_deref()
            .map(str::parse)
            .transpose()
            .map_err(bad_request)?,
        limit: Some(query.limit.unwrap_or(DEFAULT_LIMIT)),
    };

    let entries = state
        .blocking(move |state| {
            state
                .db
                .with_conn(|conn| fibertrack_core::audit::list_audit_logs(conn, &filter))
                .map_err(Into::into)
        })
        .await?;
    Ok(Json(entries))
}
