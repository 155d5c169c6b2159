//! Step endpoints

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
};
use fibertrack_core::model::step::{NewStep, ReorderSteps, Step};

use crate::dto::{ArchiveResponse, StepIdQuery, StepsQuery, UpdateStepRequest, audit_context};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

fn required(value: Option<String>, name: &str) -> ApiResult<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("{name} is required")))
}

/// Active steps of a phase
pub async fn list_steps(
    State(state): State<AppState>,
    Query(query): Query<StepsQuery>,
) -> ApiResult<Json<Vec<Step>>> {
    let phase_id = required(query.phase_id, "phase_id")?;
    let steps = state
        .blocking(move |state| state.steps().list(&phase_id))
        .await?;
    Ok(Json(steps))
}

/// Create a step
pub async fn create_step(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(new): Json<NewStep>,
) -> ApiResult<(StatusCode, Json<Step>)> {
    let ctx = audit_context(&headers, None);
    let step = state
        .blocking(move |state| state.steps().create(&new, &ctx))
        .await?;
    Ok((StatusCode::CREATED, Json(step)))
}

/// Update a step; the body carries its id
pub async fn update_step(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UpdateStepRequest>,
) -> ApiResult<Json<Step>> {
    let UpdateStepRequest { id, patch } = req;
    let id = required(Some(id), "id")?;
    let ctx = audit_context(&headers, None);
    let step = state
        .blocking(move |state| state.steps().update(&id, &patch, &ctx))
        .await?;
    Ok(Json(step))
}

/// Soft-delete a step with no open tasks
pub async fn delete_step(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<StepIdQuery>,
) -> ApiResult<Json<ArchiveResponse>> {
    let id = required(query.id, "id")?;
    let ctx = audit_context(&headers, None);
    let outcome = state
        .blocking(move |state| state.steps().delete(&id, &ctx))
        .await?;
    Ok(Json(outcome.into()))
}

/// Reassign step order within a phase
pub async fn reorder_steps(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ReorderSteps>,
) -> ApiResult<Json<Vec<Step>>> {
    let ctx = audit_context(&headers, None);
    let steps = state
        .blocking(move |state| state.steps().reorder(&req, &ctx))
        .await?;
    Ok(Json(steps))
}
