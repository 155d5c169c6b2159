//! Project hierarchy endpoints

use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};
use fibertrack_core::ProjectHierarchy;
use fibertrack_core::model::project::{Project, ProjectPatch};

use crate::dto::audit_context;
use crate::error::ApiResult;
use crate::state::AppState;

/// Project with its phases, steps, and tasks
pub async fn get_hierarchy(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<ProjectHierarchy>> {
    let tree = state
        .blocking(move |state| state.hierarchy().get(&project_id))
        .await?;
    Ok(Json(tree))
}

/// Update top-level project fields
pub async fn update_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
    Json(patch): Json<ProjectPatch>,
) -> ApiResult<Json<Project>> {
    let ctx = audit_context(&headers, None);
    let project = state
        .blocking(move |state| state.projects().update(&project_id, &patch, &ctx))
        .await?;
    Ok(Json(project))
}
