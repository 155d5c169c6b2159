//! Reads and top-level field updates for projects.

use anyhow::Context;
use rusqlite::{Connection, params_from_iter, types::Value as SqlValue};
use serde_json::{Map, Value};

use crate::audit::{AuditContext, AuditLogger, PendingAudit};
use crate::db::query::{fetch_typed, select_from};
use crate::db::{Database, now_timestamp};
use crate::error::ServiceError;
use crate::model::project::{PROJECT_COLUMNS, Project, ProjectPatch};
use crate::model::table::{AuditAction, AuditResourceType, SoftDeleteTable};

/// Load an active project by id.
///
/// # Errors
///
/// [`ServiceError::NotFound`] when the project is missing or archived,
/// [`ServiceError::Storage`] when the query fails.
pub fn get_project(conn: &Connection, id: &str) -> Result<Project, ServiceError> {
    let query = select_from(SoftDeleteTable::Projects, PROJECT_COLUMNS, false)
        .filter_eq("id", id.to_string());
    fetch_typed(conn, &query, Project::from_row)?
        .into_iter()
        .next()
        .ok_or_else(|| ServiceError::not_found("project", id))
}

#[derive(Debug, Clone, Copy)]
pub struct ProjectService<'db> {
    db: &'db Database,
    audit: AuditLogger,
}

impl<'db> ProjectService<'db> {
    #[must_use]
    pub const fn new(db: &'db Database, audit: AuditLogger) -> Self {
        Self { db, audit }
    }

    /// # Errors
    ///
    /// See [`get_project`].
    pub fn get(&self, id: &str) -> Result<Project, ServiceError> {
        self.db.with_conn(|conn| get_project(conn, id))
    }

    /// Apply `patch` to an active project and return the updated row.
    ///
    /// Absent fields are left alone; an empty date clears the column.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Validation`] for a bad patch, [`ServiceError::NotFound`]
    /// when no active project has `id`, [`ServiceError::Storage`] otherwise.
    pub fn update(
        &self,
        id: &str,
        patch: &ProjectPatch,
        ctx: &AuditContext,
    ) -> Result<Project, ServiceError> {
        patch.validate()?;

        let mut assignments: Vec<(&str, SqlValue)> = Vec::new();
        if let Some(name) = &patch.name {
            assignments.push(("name", SqlValue::Text(name.trim().to_string())));
        }
        if let Some(description) = &patch.description {
            assignments.push(("description", SqlValue::Text(description.clone())));
        }
        if let Some(status) = &patch.status {
            assignments.push(("status", SqlValue::Text(status.clone())));
        }
        if let Some(start) = &patch.start_date {
            assignments.push(("start_date", optional_text(start)));
        }
        if let Some(end) = &patch.end_date {
            assignments.push(("end_date", optional_text(end)));
        }
        let fields: Vec<Value> = assignments
            .iter()
            .map(|(column, _)| Value::from(*column))
            .collect();

        let (project, _) = self.db.with_conn_mut(|conn| {
            self.audit.mutate(conn, ctx.actor.as_deref(), |tx| {
                let mut sets: Vec<String> = Vec::with_capacity(assignments.len() + 1);
                let mut values: Vec<SqlValue> = Vec::with_capacity(assignments.len() + 2);
                for (column, value) in &assignments {
                    values.push(value.clone());
                    sets.push(format!("{column} = ?{}", values.len()));
                }
                values.push(SqlValue::Text(now_timestamp()));
                sets.push(format!("updated_at = ?{}", values.len()));
                values.push(SqlValue::Text(id.to_string()));

                let sql = format!(
                    "UPDATE projects SET {} WHERE id = ?{} AND archived_at IS NULL",
                    sets.join(", "),
                    values.len()
                );
                let changed = tx
                    .execute(&sql, params_from_iter(values.iter()))
                    .with_context(|| format!("update project '{id}'"))?;
                if changed == 0 {
                    return Err(ServiceError::not_found("project", id));
                }

                let project = get_project(tx, id)?;
                let mut details = Map::new();
                details.insert("fields".into(), Value::Array(fields.clone()));
                let pending = PendingAudit {
                    action: AuditAction::Update,
                    resource_type: AuditResourceType::Project,
                    resource_id: id.to_string(),
                    details: ctx.details_with(details),
                };
                Ok((project, Some(pending)))
            })
        })?;

        tracing::info!(project_id = id, fields = fields.len(), "project updated");
        Ok(project)
    }
}

fn optional_text(raw: &str) -> SqlValue {
    if raw.trim().is_empty() {
        SqlValue::Null
    } else {
        SqlValue::Text(raw.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditFilter, list_audit_logs};

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute_batch(
                "INSERT INTO projects (id, name, status, start_date)
                 VALUES ('p-1', 'Harbor loop', 'planning', '2025-01-10');
                 INSERT INTO projects (id, name, archived_at)
                 VALUES ('p-old', 'Retired', '2024-01-01T00:00:00Z');",
            )
        })
        .unwrap();
        db
    }

    #[test]
    fn update_changes_only_given_fields() {
        let db = seeded();
        let service = ProjectService::new(&db, AuditLogger::default());
        let before = service.get("p-1").unwrap();

        let patch = ProjectPatch {
            status: Some("active".into()),
            end_date: Some("2025-03-01".into()),
            ..ProjectPatch::default()
        };
        let updated = service
            .update("p-1", &patch, &AuditContext::with_actor("ana"))
            .unwrap();

        assert_eq!(updated.name, "Harbor loop");
        assert_eq!(updated.status, "active");
        assert_eq!(updated.start_date.as_deref(), Some("2025-01-10"));
        assert_eq!(updated.end_date.as_deref(), Some("2025-03-01"));
        assert!(updated.updated_at >= before.updated_at);

        let entries = db
            .with_conn(|conn| list_audit_logs(conn, &AuditFilter::default()))
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, AuditAction::Update);
        assert_eq!(entries[0].details["fields"][0], "status");
    }

    #[test]
    fn update_missing_or_archived_is_not_found() {
        let db = seeded();
        let service = ProjectService::new(&db, AuditLogger::default());
        let patch = ProjectPatch {
            name: Some("Renamed".into()),
            ..ProjectPatch::default()
        };
        for id in ["ghost", "p-old"] {
            let err = service
                .update(id, &patch, &AuditContext::default())
                .unwrap_err();
            assert!(matches!(err, ServiceError::NotFound { .. }), "{id}");
        }
    }

    #[test]
    fn empty_name_is_rejected_before_storage() {
        let db = seeded();
        let service = ProjectService::new(&db, AuditLogger::default());
        let patch = ProjectPatch {
            name: Some(String::new()),
            ..ProjectPatch::default()
        };
        let err = service
            .update("p-1", &patch, &AuditContext::default())
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(service.get("p-1").unwrap().name, "Harbor loop");
    }

    #[test]
    fn empty_date_clears_column() {
        let db = seeded();
        let service = ProjectService::new(&db, AuditLogger::default());
        let patch = ProjectPatch {
            start_date: Some(String::new()),
            ..ProjectPatch::default()
        };
        let updated = service
            .update("p-1", &patch, &AuditContext::default())
            .unwrap();
        assert!(updated.start_date.is_none());
    }
}
