//! Append-only audit trail.
//!
//! Entries are inserted and read, never updated or deleted; the schema backs
//! this with triggers on `audit_logs`. Whether a failed insert fails the
//! caller is decided by [`AuditPolicy`]:
//!
//! - [`AuditPolicy::BestEffort`]: the failure is logged with `tracing::warn!`
//!   and the primary mutation stands.
//! - [`AuditPolicy::Strict`]: the failure is returned; callers run the
//!   mutation and the insert in one transaction so both roll back together.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params, params_from_iter, types::Value as SqlValue};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt::Write as _;

use crate::db::{format_timestamp, timestamp_column};
use crate::error::ServiceError;
use crate::model::table::{AuditAction, AuditResourceType};

/// One row of `audit_logs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditLogEntry {
    pub id: String,
    pub action: AuditAction,
    pub resource_type: AuditResourceType,
    pub resource_id: String,
    pub details: Value,
    pub actor: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let action: String = row.get("action")?;
        let resource_type: String = row.get("resource_type")?;
        let details: String = row.get("details")?;
        Ok(Self {
            id: row.get("id")?,
            action: parse_column(row, "action", &action)?,
            resource_type: parse_column(row, "resource_type", &resource_type)?,
            resource_id: row.get("resource_id")?,
            details: serde_json::from_str(&details).unwrap_or(Value::String(details)),
            actor: row.get("actor")?,
            created_at: timestamp_column(row, "created_at")?,
        })
    }
}

fn parse_column<T>(row: &rusqlite::Row<'_>, column: &str, raw: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = anyhow::Error>,
{
    raw.parse().map_err(|error: anyhow::Error| {
        let index = row.as_ref().column_index(column).unwrap_or_default();
        rusqlite::Error::FromSqlConversionFailure(
            index,
            rusqlite::types::Type::Text,
            error.into(),
        )
    })
}

/// Who performed a mutation and any caller-supplied detail to record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditContext {
    pub actor: Option<String>,
    pub details: Map<String, Value>,
}

impl AuditContext {
    #[must_use]
    pub fn with_actor(actor: impl Into<String>) -> Self {
        Self {
            actor: Some(actor.into()),
            details: Map::new(),
        }
    }

    /// Caller details merged under `extra`; keys in `extra` win.
    #[must_use]
    pub fn details_with(&self, extra: Map<String, Value>) -> Map<String, Value> {
        let mut merged = self.details.clone();
        merged.extend(extra);
        merged
    }
}

/// Append one entry.
///
/// # Errors
///
/// Returns an error if the insert fails (for example, the table is missing).
pub fn create_audit_log(
    conn: &Connection,
    action: AuditAction,
    resource_type: AuditResourceType,
    resource_id: &str,
    details: &Map<String, Value>,
    actor: Option<&str>,
) -> Result<AuditLogEntry> {
    let entry = AuditLogEntry {
        id: uuid::Uuid::new_v4().to_string(),
        action,
        resource_type,
        resource_id: resource_id.to_string(),
        details: Value::Object(details.clone()),
        actor: actor.map(str::to_string),
        created_at: Utc::now(),
    };

    let details_json = serde_json::to_string(&entry.details).context("serialize audit details")?;
    conn.execute(
        "INSERT INTO audit_logs (id, action, resource_type, resource_id, details, actor, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entry.id,
            action.as_str(),
            resource_type.as_str(),
            entry.resource_id,
            details_json,
            entry.actor,
            format_timestamp(entry.created_at),
        ],
    )
    .with_context(|| format!("insert audit log for {resource_type} '{resource_id}'"))?;

    Ok(entry)
}

/// Filter for [`list_audit_logs`]. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub resource_type: Option<AuditResourceType>,
    pub resource_id: Option<String>,
    pub action: Option<AuditAction>,
    pub limit: Option<u32>,
}

/// Read entries newest first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_audit_logs(conn: &Connection, filter: &AuditFilter) -> Result<Vec<AuditLogEntry>> {
    let mut conditions: Vec<String> = Vec::new();
    let mut values: Vec<SqlValue> = Vec::new();

    if let Some(resource_type) = filter.resource_type {
        values.push(SqlValue::Text(resource_type.as_str().to_string()));
        conditions.push(format!("resource_type = ?{}", values.len()));
    }
    if let Some(ref resource_id) = filter.resource_id {
        values.push(SqlValue::Text(resource_id.clone()));
        conditions.push(format!("resource_id = ?{}", values.len()));
    }
    if let Some(action) = filter.action {
        values.push(SqlValue::Text(action.as_str().to_string()));
        conditions.push(format!("action = ?{}", values.len()));
    }

    let mut sql = String::from(
        "SELECT id, action, resource_type, resource_id, details, actor, created_at FROM audit_logs",
    );
    if !conditions.is_empty() {
        let _ = write!(sql, " WHERE {}", conditions.join(" AND "));
    }
    sql.push_str(" ORDER BY created_at DESC, rowid DESC");
    if let Some(limit) = filter.limit {
        let _ = write!(sql, " LIMIT {limit}");
    }

    let mut stmt = conn.prepare(&sql).context("prepare list_audit_logs")?;
    let rows = stmt
        .query_map(params_from_iter(values.iter()), AuditLogEntry::from_row)
        .context("execute list_audit_logs")?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(row.context("read audit log row")?);
    }
    Ok(entries)
}

/// How audit write failures affect the calling operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuditPolicy {
    #[default]
    BestEffort,
    Strict,
}

impl AuditPolicy {
    #[must_use]
    pub const fn from_strict(strict: bool) -> Self {
        if strict { Self::Strict } else { Self::BestEffort }
    }
}

/// Writes audit entries under a fixed [`AuditPolicy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditLogger {
    policy: AuditPolicy,
}

impl AuditLogger {
    #[must_use]
    pub const fn new(policy: AuditPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub const fn policy(&self) -> AuditPolicy {
        self.policy
    }

    /// Append an entry, applying the policy to failures.
    ///
    /// Returns `Ok(None)` when a best-effort write failed.
    ///
    /// # Errors
    ///
    /// Under [`AuditPolicy::Strict`], returns [`ServiceError::Storage`] when
    /// the insert fails.
    pub fn record(
        &self,
        conn: &Connection,
        action: AuditAction,
        resource_type: AuditResourceType,
        resource_id: &str,
        details: &Map<String, Value>,
        actor: Option<&str>,
    ) -> Result<Option<AuditLogEntry>, ServiceError> {
        match create_audit_log(conn, action, resource_type, resource_id, details, actor) {
            Ok(entry) => {
                tracing::debug!(
                    audit_id = %entry.id,
                    %action,
                    %resource_type,
                    resource_id,
                    "audit entry written"
                );
                Ok(Some(entry))
            }
            Err(error) => match self.policy {
                AuditPolicy::BestEffort => {
                    tracing::warn!(
                        %action,
                        %resource_type,
                        resource_id,
                        error = %format!("{error:#}"),
                        "audit log write failed; continuing"
                    );
                    Ok(None)
                }
                AuditPolicy::Strict => Err(ServiceError::Storage(error)),
            },
        }
    }

    /// Run `mutation` in a transaction and write the entry it asks for.
    ///
    /// Under [`AuditPolicy::Strict`] the entry is inserted before commit, so
    /// a failed insert rolls the mutation back. Under
    /// [`AuditPolicy::BestEffort`] the mutation commits first. Returns the
    /// mutation's value and whether an entry was written.
    ///
    /// # Errors
    ///
    /// Propagates mutation errors (rolling back), commit failures, and
    /// strict-mode audit failures.
    pub fn mutate<T>(
        &self,
        conn: &mut Connection,
        actor: Option<&str>,
        mutation: impl FnOnce(&Connection) -> Result<(T, Option<PendingAudit>), ServiceError>,
    ) -> Result<(T, bool), ServiceError> {
        let tx = conn.transaction().context("begin transaction")?;
        let (value, pending) = mutation(&tx)?;

        let Some(pending) = pending else {
            tx.commit().context("commit transaction")?;
            return Ok((value, false));
        };

        let logged = match self.policy {
            AuditPolicy::Strict => {
                let entry = self.record(
                    &tx,
                    pending.action,
                    pending.resource_type,
                    &pending.resource_id,
                    &pending.details,
                    actor,
                )?;
                tx.commit().context("commit transaction")?;
                entry.is_some()
            }
            AuditPolicy::BestEffort => {
                tx.commit().context("commit transaction")?;
                self.record(
                    conn,
                    pending.action,
                    pending.resource_type,
                    &pending.resource_id,
                    &pending.details,
                    actor,
                )?
                .is_some()
            }
        };
        Ok((value, logged))
    }
}

/// An audit entry to write once its mutation has succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAudit {
    pub action: AuditAction,
    pub resource_type: AuditResourceType,
    pub resource_id: String,
    pub details: Map<String, Value>,
}

/// The map inside a JSON object; anything else yields an empty map.
pub(crate) fn object(value: Value) -> Map<String, Value> {
    if let Value::Object(map) = value {
        map
    } else {
        Map::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use serde_json::json;

    #[test]
    fn create_and_list_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            create_audit_log(
                conn,
                AuditAction::Delete,
                AuditResourceType::Project,
                "p-1",
                &object(json!({"table": "projects"})),
                Some("ana"),
            )?;
            create_audit_log(
                conn,
                AuditAction::Update,
                AuditResourceType::Step,
                "st-1",
                &Map::new(),
                None,
            )?;

            let all = list_audit_logs(conn, &AuditFilter::default())?;
            assert_eq!(all.len(), 2);
            assert_eq!(all[0].resource_id, "st-1", "newest first");

            let projects = list_audit_logs(
                conn,
                &AuditFilter {
                    resource_type: Some(AuditResourceType::Project),
                    ..AuditFilter::default()
                },
            )?;
            assert_eq!(projects.len(), 1);
            assert_eq!(projects[0].action, AuditAction::Delete);
            assert_eq!(projects[0].actor.as_deref(), Some("ana"));
            assert_eq!(projects[0].details["table"], "projects");
            anyhow::Ok(())
        })
        .unwrap();
    }

    #[test]
    fn list_filters_by_action_and_limit() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            for i in 0..5 {
                let action = if i % 2 == 0 {
                    AuditAction::Delete
                } else {
                    AuditAction::Update
                };
                create_audit_log(
                    conn,
                    action,
                    AuditResourceType::Task,
                    &format!("t-{i}"),
                    &Map::new(),
                    None,
                )?;
            }
            let deletes = list_audit_logs(
                conn,
                &AuditFilter {
                    action: Some(AuditAction::Delete),
                    limit: Some(2),
                    ..AuditFilter::default()
                },
            )?;
            assert_eq!(deletes.len(), 2);
            assert!(deletes.iter().all(|e| e.action == AuditAction::Delete));
            anyhow::Ok(())
        })
        .unwrap();
    }

    #[test]
    fn best_effort_swallows_failures() {
        let db = Database::open_in_memory().unwrap();
        let logger = AuditLogger::new(AuditPolicy::BestEffort);
        db.with_conn(|conn| {
            conn.execute_batch("DROP TABLE audit_logs")?;
            let written = logger
                .record(
                    conn,
                    AuditAction::Delete,
                    AuditResourceType::System,
                    "maintenance",
                    &Map::new(),
                    None,
                )
                .expect("best effort never fails");
            assert!(written.is_none());
            anyhow::Ok(())
        })
        .unwrap();
    }

    #[test]
    fn strict_surfaces_failures() {
        let db = Database::open_in_memory().unwrap();
        let logger = AuditLogger::new(AuditPolicy::Strict);
        db.with_conn(|conn| {
            conn.execute_batch("DROP TABLE audit_logs")?;
            let result = logger.record(
                conn,
                AuditAction::Delete,
                AuditResourceType::System,
                "maintenance",
                &Map::new(),
                None,
            );
            assert!(matches!(result, Err(ServiceError::Storage(_))));
            anyhow::Ok(())
        })
        .unwrap();
    }

    fn insert_staff(conn: &Connection) -> Result<(String, Option<PendingAudit>), ServiceError> {
        conn.execute("INSERT INTO staff (id, name) VALUES ('s-9', 'Dee')", [])?;
        Ok((
            "s-9".to_string(),
            Some(PendingAudit {
                action: AuditAction::Create,
                resource_type: AuditResourceType::User,
                resource_id: "s-9".into(),
                details: Map::new(),
            }),
        ))
    }

    fn staff_count(db: &Database) -> i64 {
        db.with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM staff", [], |row| row.get(0)))
            .unwrap()
    }

    #[test]
    fn mutate_writes_entry_after_commit() {
        let db = Database::open_in_memory().unwrap();
        let logger = AuditLogger::default();
        let (id, logged) = db
            .with_conn_mut(|conn| logger.mutate(conn, Some("ana"), insert_staff))
            .unwrap();
        assert_eq!(id, "s-9");
        assert!(logged);
        let entries = db
            .with_conn(|conn| list_audit_logs(conn, &AuditFilter::default()))
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].resource_type, AuditResourceType::User);
    }

    #[test]
    fn strict_mutate_rolls_back_on_audit_failure() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| conn.execute_batch("DROP TABLE audit_logs"))
            .unwrap();

        let strict = AuditLogger::new(AuditPolicy::Strict);
        let result = db.with_conn_mut(|conn| strict.mutate(conn, None, insert_staff));
        assert!(matches!(result, Err(ServiceError::Storage(_))));
        assert_eq!(staff_count(&db), 0);

        let lenient = AuditLogger::new(AuditPolicy::BestEffort);
        let (_, logged) = db
            .with_conn_mut(|conn| lenient.mutate(conn, None, insert_staff))
            .unwrap();
        assert!(!logged);
        assert_eq!(staff_count(&db), 1);
    }

    #[test]
    fn mutate_error_rolls_back() {
        let db = Database::open_in_memory().unwrap();
        let logger = AuditLogger::default();
        let result: Result<((), bool), ServiceError> = db.with_conn_mut(|conn| {
            logger.mutate(conn, None, |tx| {
                insert_staff(tx)?;
                Err(ServiceError::validation("nope"))
            })
        });
        assert!(matches!(result, Err(ServiceError::Validation(_))));
        assert_eq!(staff_count(&db), 0);
    }

    #[test]
    fn context_details_merge_with_extra_winning() {
        let mut ctx = AuditContext::with_actor("ben");
        ctx.details.insert("reason".into(), json!("duplicate"));
        ctx.details.insert("count".into(), json!(99));
        let merged = ctx.details_with(object(json!({"count": 1})));
        assert_eq!(merged["reason"], "duplicate");
        assert_eq!(merged["count"], 1);
    }

    #[test]
    fn object_keeps_maps_and_drops_other_values() {
        let map = object(json!({"reason": "duplicate"}));
        assert_eq!(map.get("reason"), Some(&json!("duplicate")));
        assert!(object(json!(["reason"])).is_empty());
        assert!(object(Value::Null).is_empty());
    }
}
