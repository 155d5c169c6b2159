//! Soft delete for every [`SoftDeleteTable`].
//!
//! Archiving stamps `archived_at` with the current time and unarchiving
//! clears it; rows are never physically removed. Each successful call writes
//! one audit entry (`delete` for archive, `update` for unarchive) through the
//! configured [`AuditLogger`] and reports the cache keys that went stale.

use anyhow::Context;
use rusqlite::{Connection, params_from_iter, types::Value as SqlValue};
use serde::Serialize;
use serde_json::{Value, json};

use crate::audit::{AuditContext, AuditLogger, PendingAudit, object};
use crate::db::query::{Record, SelectQuery, fetch_records, include_archived};
use crate::db::{Database, now_timestamp};
use crate::error::{BULK_ARCHIVE_LIMIT, ServiceError};
use crate::model::table::{AuditAction, SoftDeleteTable};

/// Resource id recorded on the audit entry of a bulk archive.
pub const BULK_RESOURCE_ID: &str = "bulk";

/// Result of an archive or unarchive call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchiveOutcome {
    /// Rows as they read after the change.
    pub rows: Vec<Record>,
    pub audit_logged: bool,
    /// Cache keys to drop: `<table>` and `<table>:<id>` per changed row.
    pub invalidate: Vec<String>,
}

impl ArchiveOutcome {
    fn new(table: SoftDeleteTable, rows: Vec<Record>, audit_logged: bool) -> Self {
        let mut invalidate = Vec::with_capacity(rows.len() + 1);
        if !rows.is_empty() {
            invalidate.push(table.as_str().to_string());
            invalidate.extend(rows.iter().map(|row| format!("{table}:{}", row.id)));
        }
        Self {
            rows,
            audit_logged,
            invalidate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Archive,
    Unarchive,
}

impl Transition {
    const fn action(self) -> AuditAction {
        match self {
            Self::Archive => AuditAction::Delete,
            Self::Unarchive => AuditAction::Update,
        }
    }

    const fn verb(self) -> &'static str {
        match self {
            Self::Archive => "archived",
            Self::Unarchive => "unarchived",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ArchiveService<'db> {
    db: &'db Database,
    audit: AuditLogger,
}

impl<'db> ArchiveService<'db> {
    #[must_use]
    pub const fn new(db: &'db Database, audit: AuditLogger) -> Self {
        Self { db, audit }
    }

    /// Archive one row.
    ///
    /// # Errors
    ///
    /// [`ServiceError::NotFound`] when no row has `id`, [`ServiceError::Storage`]
    /// on database failure (or a strict-mode audit failure).
    pub fn archive(
        &self,
        table: SoftDeleteTable,
        id: &str,
        ctx: &AuditContext,
    ) -> Result<ArchiveOutcome, ServiceError> {
        self.archive_guarded(table, id, ctx, |_| Ok(()))
    }

    /// Archive one row after `guard` approves it, inside the same transaction.
    ///
    /// # Errors
    ///
    /// Whatever `guard` returns, plus the errors of [`Self::archive`].
    pub fn archive_guarded(
        &self,
        table: SoftDeleteTable,
        id: &str,
        ctx: &AuditContext,
        guard: impl FnOnce(&Connection) -> Result<(), ServiceError>,
    ) -> Result<ArchiveOutcome, ServiceError> {
        self.transition_one(table, id, Transition::Archive, ctx, guard)
    }

    /// Clear `archived_at` on one row.
    ///
    /// # Errors
    ///
    /// Same as [`Self::archive`].
    pub fn unarchive(
        &self,
        table: SoftDeleteTable,
        id: &str,
        ctx: &AuditContext,
    ) -> Result<ArchiveOutcome, ServiceError> {
        self.transition_one(table, id, Transition::Unarchive, ctx, |_| Ok(()))
    }

    /// Archive up to [`BULK_ARCHIVE_LIMIT`] rows with one audit entry.
    ///
    /// Ids that match nothing are ignored; the entry's `count` says how many
    /// rows changed and `requested` how many ids were sent. No entry is
    /// written when nothing matched.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Validation`] for an empty list and
    /// [`ServiceError::BulkLimit`] above the cap, both before any write;
    /// [`ServiceError::Storage`] on database failure.
    pub fn bulk_archive(
        &self,
        table: SoftDeleteTable,
        ids: &[String],
        ctx: &AuditContext,
    ) -> Result<ArchiveOutcome, ServiceError> {
        if ids.is_empty() {
            return Err(ServiceError::validation("No ids provided for bulk archive"));
        }
        if ids.len() > BULK_ARCHIVE_LIMIT {
            return Err(ServiceError::BulkLimit {
                requested: ids.len(),
                limit: BULK_ARCHIVE_LIMIT,
            });
        }

        let mut unique: Vec<String> = Vec::with_capacity(ids.len());
        for id in ids {
            if !unique.contains(id) {
                unique.push(id.clone());
            }
        }

        let (rows, audit_logged) = self.db.with_conn_mut(|conn| {
            self.audit.mutate(conn, ctx.actor.as_deref(), |tx| {
                let rows = set_archived_at(tx, table, &unique, Some(&now_timestamp()))?;
                if rows.is_empty() {
                    return Ok((rows, None));
                }
                let archived_ids: Vec<Value> =
                    rows.iter().map(|row| Value::from(row.id.clone())).collect();
                let pending = PendingAudit {
                    action: AuditAction::Delete,
                    resource_type: table.resource_type(),
                    resource_id: BULK_RESOURCE_ID.to_string(),
                    details: ctx.details_with(object(json!({
                        "table": table.as_str(),
                        "count": rows.len(),
                        "requested": ids.len(),
                        "ids": archived_ids,
                    }))),
                };
                Ok((rows, Some(pending)))
            })
        })?;

        tracing::info!(
            %table,
            requested = ids.len(),
            archived = rows.len(),
            audit_logged,
            "bulk archive complete"
        );
        Ok(ArchiveOutcome::new(table, rows, audit_logged))
    }

    fn transition_one(
        &self,
        table: SoftDeleteTable,
        id: &str,
        transition: Transition,
        ctx: &AuditContext,
        guard: impl FnOnce(&Connection) -> Result<(), ServiceError>,
    ) -> Result<ArchiveOutcome, ServiceError> {
        if id.trim().is_empty() {
            return Err(ServiceError::validation("id is required"));
        }

        let stamp = match transition {
            Transition::Archive => Some(now_timestamp()),
            Transition::Unarchive => None,
        };
        let ids = [id.to_string()];

        let (rows, audit_logged) = self.db.with_conn_mut(|conn| {
            self.audit.mutate(conn, ctx.actor.as_deref(), |tx| {
                guard(tx)?;
                let rows = set_archived_at(tx, table, &ids, stamp.as_deref())?;
                if rows.is_empty() {
                    return Err(ServiceError::not_found(table.record_noun(), id));
                }
                let pending = PendingAudit {
                    action: transition.action(),
                    resource_type: table.resource_type(),
                    resource_id: id.to_string(),
                    details: ctx.details_with(object(json!({
                        "table": table.as_str(),
                        "archived_at": stamp,
                    }))),
                };
                Ok((rows, Some(pending)))
            })
        })?;

        tracing::info!(%table, id, audit_logged, "record {}", transition.verb());
        Ok(ArchiveOutcome::new(table, rows, audit_logged))
    }
}

/// Set `archived_at` (and `updated_at`) on every row in `ids`, returning the
/// changed rows.
fn set_archived_at(
    conn: &Connection,
    table: SoftDeleteTable,
    ids: &[String],
    stamp: Option<&str>,
) -> anyhow::Result<Vec<Record>> {
    let placeholders: Vec<String> = (0..ids.len()).map(|i| format!("?{}", i + 3)).collect();
    let sql = format!(
        "UPDATE \"{table}\" SET archived_at = ?1, updated_at = ?2 WHERE id IN ({})",
        placeholders.join(", ")
    );

    let mut values: Vec<SqlValue> = Vec::with_capacity(ids.len() + 2);
    values.push(stamp.map_or(SqlValue::Null, |s| SqlValue::Text(s.to_string())));
    values.push(SqlValue::Text(now_timestamp()));
    values.extend(ids.iter().cloned().map(SqlValue::Text));

    let changed = conn
        .execute(&sql, params_from_iter(values.iter()))
        .with_context(|| format!("update archived_at on {table}"))?;
    if changed == 0 {
        return Ok(Vec::new());
    }

    let query = include_archived(SelectQuery::from_table(table)).filter_in("id", ids.to_vec());
    fetch_records(conn, &query)
}
