//! API route handlers

pub mod archive;
pub mod audit;
pub mod health;
pub mod hierarchy;
pub mod records;
pub mod steps;

use axum::{
    Router,
    routing::{get, post, put},
};
use fibertrack_core::SoftDeleteTable;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/health", get(health::health_check))
        // Project hierarchy
        .route(
            "/api/hierarchy/:project_id",
            get(hierarchy::get_hierarchy).put(hierarchy::update_project),
        )
        // Steps
        .route(
            "/api/steps",
            get(steps::list_steps)
                .post(steps::create_step)
                .put(steps::update_step)
                .delete(steps::delete_step),
        )
        .route("/api/steps/reorder", put(steps::reorder_steps))
        // Archive lifecycle
        .route("/api/archive/:table", post(archive::bulk_archive))
        .route("/api/archive/:table/:id", post(archive::archive_record))
        .route("/api/unarchive/:table/:id", post(archive::unarchive_record))
        // Read-only views
        .route("/api/records/:table", get(records::list_records))
        .route("/api/audit-logs", get(audit::list_audit_logs))
        .with_state(state)
}

/// Parse a `:table` path segment.
pub(crate) fn parse_table(raw: &str) -> ApiResult<SoftDeleteTable> {
    raw.parse()
        .map_err(|e: anyhow::Error| ApiError::BadRequest(e.to_string()))
}
