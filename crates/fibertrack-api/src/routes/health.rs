//! Health check endpoint

use axum::{Json, extract::State};
use fibertrack_core::db::migrations::current_schema_version;

use crate::dto::HealthResponse;
use crate::error::ApiResult;
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let schema_version = state
        .blocking(|state| {
            state
                .db
                .with_conn(current_schema_version)
                .map_err(Into::into)
        })
        .await?;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        schema_version,
    }))
}
