//! Read-only listing of soft-deletable tables

use axum::{
    Json,
    extract::{Path, Query, State},
};
use fibertrack_core::db::query::{
    ArchivedFilter, Record, SelectQuery, SortDirection, fetch_records,
};

use super::parse_table;
use crate::dto::RecordsQuery;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Default page size for record listings.
const DEFAULT_LIMIT: u32 = 100;

/// List rows of a table, filtered by archive state (default: active only)
pub async fn list_records(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(query): Query<RecordsQuery>,
) -> ApiResult<Json<Vec<Record>>> {
    let table = parse_table(&table)?;
    let filter = match query.archived.as_deref() {
        Some(raw) => raw
            .parse::<ArchivedFilter>()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?,
        None => ArchivedFilter::default(),
    };

    let select = SelectQuery::from_table(table)
        .archived(filter)
        .order_by("created_at", SortDirection::Desc)
        .order_by("id", SortDirection::Asc)
        .limit(query.limit.unwrap_or(DEFAULT_LIMIT));

    let records = state
        .blocking(move |state| {
            state
                .db
                .with_conn(|conn| fetch_records(conn, &select))
                .map_err(Into::into)
        })
        .await?;
    Ok(Json(records))
}
