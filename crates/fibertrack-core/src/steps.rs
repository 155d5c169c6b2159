//! Step management within a phase.
//!
//! Steps are ordered by `order_index`. Deleting a step archives it, and is
//! refused while the step still has open work: any non-archived task whose
//! status is not `cancelled`.

use anyhow::Context;
use rusqlite::{Connection, params, params_from_iter, types::Value as SqlValue};
use serde_json::{Value, json};
use std::collections::HashSet;

use crate::archive::{ArchiveOutcome, ArchiveService};
use crate::audit::{AuditContext, AuditLogger, PendingAudit, object};
use crate::db::query::{SortDirection, count_rows, fetch_typed, select_from};
use crate::db::{Database, now_timestamp, require_table};
use crate::error::ServiceError;
use crate::model::step::{
    NewStep, ReorderSteps, STEP_COLUMNS, Step, StepPatch, TASK_STATUS_CANCELLED,
};
use crate::model::table::{AuditAction, AuditResourceType, SoftDeleteTable};

#[derive(Debug, Clone, Copy)]
pub struct StepsService<'db> {
    db: &'db Database,
    audit: AuditLogger,
}

impl<'db> StepsService<'db> {
    #[must_use]
    pub const fn new(db: &'db Database, audit: AuditLogger) -> Self {
        Self { db, audit }
    }

    /// Active, non-archived steps of `phase_id` in display order.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Configuration`] when the steps table is missing,
    /// [`ServiceError::Storage`] when the query fails.
    pub fn list(&self, phase_id: &str) -> Result<Vec<Step>, ServiceError> {
        self.db.with_conn(|conn| {
            require_table(conn, SoftDeleteTable::Steps.as_str())?;
            list_active_steps(conn, phase_id).map_err(ServiceError::from)
        })
    }

    /// Create a step, appending it after the last one unless an index is
    /// given.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Validation`] for bad input or an unknown or archived
    /// phase.
    pub fn create(&self, new: &NewStep, ctx: &AuditContext) -> Result<Step, ServiceError> {
        new.validate()?;

        let (step, _) = self.db.with_conn_mut(|conn| {
            require_table(conn, SoftDeleteTable::Steps.as_str())?;
            self.audit.mutate(conn, ctx.actor.as_deref(), |tx| {
                ensure_phase(tx, &new.phase_id)?;

                let order_index = match new.order_index {
                    Some(index) => index,
                    None => next_order_index(tx, &new.phase_id)?,
                };
                let id = uuid::Uuid::new_v4().to_string();
                tx.execute(
                    "INSERT INTO steps (id, phase_id, name, description, order_index) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        id,
                        new.phase_id,
                        new.name.trim(),
                        new.description,
                        order_index
                    ],
                )
                .context("insert step")?;

                let step = get_step(tx, &id)?;
                let pending = PendingAudit {
                    action: AuditAction::Create,
                    resource_type: AuditResourceType::Step,
                    resource_id: id,
                    details: ctx.details_with(object(json!({
                        "phase_id": step.phase_id,
                        "name": step.name,
                        "order_index": step.order_index,
                    }))),
                };
                Ok((step, Some(pending)))
            })
        })?;

        tracing::info!(step_id = %step.id, phase_id = %step.phase_id, "step created");
        Ok(step)
    }

    /// # Errors
    ///
    /// [`ServiceError::Validation`] for a bad patch, [`ServiceError::NotFound`]
    /// when no active step has `id`.
    pub fn update(
        &self,
        id: &str,
        patch: &StepPatch,
        ctx: &AuditContext,
    ) -> Result<Step, ServiceError> {
        patch.validate()?;

        let mut assignments: Vec<(&str, SqlValue)> = Vec::new();
        if let Some(name) = &patch.name {
            assignments.push(("name", SqlValue::Text(name.trim().to_string())));
        }
        if let Some(description) = &patch.description {
            assignments.push(("description", SqlValue::Text(description.clone())));
        }
        if let Some(order_index) = patch.order_index {
            assignments.push(("order_index", SqlValue::Integer(order_index)));
        }
        if let Some(is_active) = patch.is_active {
            assignments.push(("is_active", SqlValue::Integer(i64::from(is_active))));
        }

        let (step, _) = self.db.with_conn_mut(|conn| {
            require_table(conn, SoftDeleteTable::Steps.as_str())?;
            self.audit.mutate(conn, ctx.actor.as_deref(), |tx| {
                let mut sets: Vec<String> = Vec::new();
                let mut values: Vec<SqlValue> = Vec::new();
                for (column, value) in &assignments {
                    values.push(value.clone());
                    sets.push(format!("{column} = ?{}", values.len()));
                }
                values.push(SqlValue::Text(now_timestamp()));
                sets.push(format!("updated_at = ?{}", values.len()));
                values.push(SqlValue::Text(id.to_string()));

                let sql = format!(
                    "UPDATE steps SET {} WHERE id = ?{} AND archived_at IS NULL",
                    sets.join(", "),
                    values.len()
                );
                let changed = tx
                    .execute(&sql, params_from_iter(values.iter()))
                    .with_context(|| format!("update step '{id}'"))?;
                if changed == 0 {
                    return Err(ServiceError::not_found("step", id));
                }

                let step = get_step(tx, id)?;
                let fields: Vec<Value> = assignments
                    .iter()
                    .map(|(column, _)| Value::from(*column))
                    .collect();
                let pending = PendingAudit {
                    action: AuditAction::Update,
                    resource_type: AuditResourceType::Step,
                    resource_id: id.to_string(),
                    details: ctx.details_with(object(json!({ "fields": fields }))),
                };
                Ok((step, Some(pending)))
            })
        })?;

        tracing::info!(step_id = id, "step updated");
        Ok(step)
    }

    /// Archive a step that has no open tasks.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Conflict`] when open tasks remain,
    /// [`ServiceError::NotFound`] when the step does not exist.
    pub fn delete(&self, id: &str, ctx: &AuditContext) -> Result<ArchiveOutcome, ServiceError> {
        self.db
            .with_conn(|conn| require_table(conn, SoftDeleteTable::Steps.as_str()))?;

        let archive = ArchiveService::new(self.db, self.audit);
        archive.archive_guarded(SoftDeleteTable::Steps, id, ctx, |conn| {
            let open_tasks = count_open_tasks(conn, id)?;
            if open_tasks > 0 {
                tracing::info!(step_id = id, open_tasks, "step delete refused");
                return Err(ServiceError::Conflict(format!(
                    "Cannot delete step with {open_tasks} active task(s). \
                     Archive or cancel them first."
                )));
            }
            Ok(())
        })
    }

    /// Assign new `order_index` values to steps of one phase, atomically.
    ///
    /// Returns the phase's steps in their new order.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Validation`] for a malformed request or a step that is
    /// not an active member of the phase; nothing is written in that case.
    pub fn reorder(
        &self,
        request: &ReorderSteps,
        ctx: &AuditContext,
    ) -> Result<Vec<Step>, ServiceError> {
        request.validate()?;

        let (steps, _) = self.db.with_conn_mut(|conn| {
            require_table(conn, SoftDeleteTable::Steps.as_str())?;
            self.audit.mutate(conn, ctx.actor.as_deref(), |tx| {
                let members: HashSet<String> = list_active_steps(tx, &request.phase_id)?
                    .into_iter()
                    .map(|step| step.id)
                    .collect();
                if let Some(stray) = request
                    .step_orders
                    .iter()
                    .find(|order| !members.contains(&order.id))
                {
                    return Err(ServiceError::validation(format!(
                        "step '{}' does not belong to phase '{}'",
                        stray.id, request.phase_id
                    )));
                }

                let now = now_timestamp();
                let mut stmt = tx
                    .prepare(
                        "UPDATE steps SET order_index = ?1, updated_at = ?2 \
                         WHERE id = ?3 AND phase_id = ?4",
                    )
                    .context("prepare step reorder")?;
                for order in &request.step_orders {
                    stmt.execute(params![order.order_index, now, order.id, request.phase_id])
                        .with_context(|| format!("reorder step '{}'", order.id))?;
                }
                drop(stmt);

                let steps = list_active_steps(tx, &request.phase_id)?;
                let pending = PendingAudit {
                    action: AuditAction::Update,
                    resource_type: AuditResourceType::Phase,
                    resource_id: request.phase_id.clone(),
                    details: ctx.details_with(object(json!({
                        "step_orders": request.step_orders,
                    }))),
                };
                Ok((steps, Some(pending)))
            })
        })?;

        tracing::info!(
            phase_id = %request.phase_id,
            steps = request.step_orders.len(),
            "steps reordered"
        );
        Ok(steps)
    }
}

pub(crate) fn list_active_steps(conn: &Connection, phase_id: &str) -> anyhow::Result<Vec<Step>> {
    let query = select_from(SoftDeleteTable::Steps, STEP_COLUMNS, false)
        .filter_eq("phase_id", phase_id.to_string())
        .filter_eq("is_active", 1_i64)
        .order_by("order_index", SortDirection::Asc)
        .order_by("created_at", SortDirection::Asc);
    fetch_typed(conn, &query, Step::from_row)
}

fn get_step(conn: &Connection, id: &str) -> Result<Step, ServiceError> {
    let query = select_from(SoftDeleteTable::Steps, STEP_COLUMNS, true).filter_eq("id", id.to_string());
    fetch_typed(conn, &query, Step::from_row)?
        .into_iter()
        .next()
        .ok_or_else(|| ServiceError::not_found("step", id))
}

fn ensure_phase(conn: &Connection, phase_id: &str) -> Result<(), ServiceError> {
    let query = select_from(SoftDeleteTable::Phases, &["id"], false)
        .filter_eq("id", phase_id.to_string());
    if count_rows(conn, &query)? == 0 {
        return Err(ServiceError::validation(format!(
            "Phase '{phase_id}' does not exist"
        )));
    }
    Ok(())
}

fn next_order_index(conn: &Connection, phase_id: &str) -> anyhow::Result<i64> {
    conn.query_row(
        "SELECT COALESCE(MAX(order_index), 0) + 1 FROM steps \
         WHERE phase_id = ?1 AND archived_at IS NULL",
        [phase_id],
        |row| row.get(0),
    )
    .context("compute next step order_index")
}

fn count_open_tasks(conn: &Connection, step_id: &str) -> anyhow::Result<u64> {
    let query = select_from(SoftDeleteTable::Tasks, &["status"], false)
        .filter_eq("step_id", step_id.to_string())
        .filter_not_eq("status", TASK_STATUS_CANCELLED.to_string());
    count_rows(conn, &query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::step::StepOrder;

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute_batch(
                "INSERT INTO phases (id, name, order_no) VALUES ('ph-1', 'Survey', 1);
                 INSERT INTO phases (id, name, archived_at)
                 VALUES ('ph-old', 'Legacy', '2024-01-01T00:00:00Z');
                 INSERT INTO steps (id, phase_id, name, order_index) VALUES ('a', 'ph-1', 'Walkout', 1);
                 INSERT INTO steps (id, phase_id, name, order_index) VALUES ('b', 'ph-1', 'Permits', 2);
                 INSERT INTO steps (id, phase_id, name, order_index, is_active)
                 VALUES ('c', 'ph-1', 'Dormant', 3, 0);",
            )
        })
        .unwrap();
        db
    }

    fn service(db: &Database) -> StepsService<'_> {
        StepsService::new(db, AuditLogger::default())
    }

    fn ids(steps: &[Step]) -> Vec<&str> {
        steps.iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn list_returns_active_steps_in_order() {
        let db = seeded();
        let steps = service(&db).list("ph-1").unwrap();
        assert_eq!(ids(&steps), ["a", "b"]);
    }

    #[test]
    fn create_appends_after_last_step() {
        let db = seeded();
        let new = NewStep {
            phase_id: "ph-1".into(),
            name: " Splicing ".into(),
            description: Some("Fusion splice".into()),
            order_index: None,
        };
        let step = service(&db)
            .create(&new, &AuditContext::default())
            .unwrap();
        assert_eq!(step.name, "Splicing");
        assert_eq!(step.order_index, 4);
        assert!(step.is_active);
    }

    #[test]
    fn create_rejects_unknown_or_archived_phase() {
        let db = seeded();
        for phase in ["ph-missing", "ph-old"] {
            let new = NewStep {
                phase_id: phase.into(),
                name: "Anything".into(),
                description: None,
                order_index: None,
            };
            let err = service(&db)
                .create(&new, &AuditContext::default())
                .unwrap_err();
            assert!(matches!(err, ServiceError::Validation(_)), "{phase}");
        }
    }

    #[test]
    fn update_patches_fields() {
        let db = seeded();
        let patch = StepPatch {
            name: Some("Walkout and photos".into()),
            is_active: Some(false),
            ..StepPatch::default()
        };
        let step = service(&db)
            .update("a", &patch, &AuditContext::default())
            .unwrap();
        assert_eq!(step.name, "Walkout and photos");
        assert!(!step.is_active);
        assert_eq!(ids(&service(&db).list("ph-1").unwrap()), ["b"]);
    }

    #[test]
    fn update_missing_step_is_not_found() {
        let db = seeded();
        let err = service(&db)
            .update("zzz", &StepPatch::default(), &AuditContext::default())
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }

    #[test]
    fn delete_with_open_task_conflicts() {
        let db = seeded();
        db.with_conn(|conn| {
            conn.execute_batch(
                "INSERT INTO tasks (id, step_id, name, status) VALUES ('t1', 'a', 'Photos', 'in_progress');
                 INSERT INTO tasks (id, step_id, name, status) VALUES ('t2', 'a', 'Notes', 'cancelled');",
            )
        })
        .unwrap();

        let err = service(&db)
            .delete("a", &AuditContext::default())
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        assert!(err.to_string().contains("1 active task"));
        assert_eq!(ids(&service(&db).list("ph-1").unwrap()), ["a", "b"]);
    }

    #[test]
    fn delete_ignores_cancelled_and_archived_tasks() {
        let db = seeded();
        db.with_conn(|conn| {
            conn.execute_batch(
                "INSERT INTO tasks (id, step_id, name, status) VALUES ('t1', 'b', 'Call city', 'cancelled');
                 INSERT INTO tasks (id, step_id, name, status, archived_at)
                 VALUES ('t2', 'b', 'Old', 'pending', '2024-05-01T00:00:00Z');",
            )
        })
        .unwrap();

        let outcome = service(&db).delete("b", &AuditContext::default()).unwrap();
        assert_eq!(outcome.rows.len(), 1);
        assert!(outcome.rows[0].is_archived());
        assert_eq!(ids(&service(&db).list("ph-1").unwrap()), ["a"]);
    }

    #[test]
    fn delete_missing_step_is_not_found() {
        let db = seeded();
        let err = service(&db)
            .delete("ghost", &AuditContext::default())
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }

    #[test]
    fn reorder_swaps_positions() {
        let db = seeded();
        let request = ReorderSteps {
            phase_id: "ph-1".into(),
            step_orders: vec![
                StepOrder {
                    id: "a".into(),
                    order_index: 2,
                },
                StepOrder {
                    id: "b".into(),
                    order_index: 1,
                },
            ],
        };
        let steps = service(&db)
            .reorder(&request, &AuditContext::default())
            .unwrap();
        assert_eq!(ids(&steps), ["b", "a"]);
        assert_eq!(ids(&service(&db).list("ph-1").unwrap()), ["b", "a"]);
    }

    #[test]
    fn reorder_rejects_foreign_step_without_writing() {
        let db = seeded();
        db.with_conn(|conn| {
            conn.execute_batch(
                "INSERT INTO phases (id, name) VALUES ('ph-2', 'Build');
                 INSERT INTO steps (id, phase_id, name, order_index) VALUES ('x', 'ph-2', 'Trench', 1);",
            )
        })
        .unwrap();

        let request = ReorderSteps {
            phase_id: "ph-1".into(),
            step_orders: vec![
                StepOrder {
                    id: "a".into(),
                    order_index: 9,
                },
                StepOrder {
                    id: "x".into(),
                    order_index: 0,
                },
            ],
        };
        let err = service(&db)
            .reorder(&request, &AuditContext::default())
            .unwrap_err();
        assert!(err.to_string().contains("does not belong"));
        assert_eq!(ids(&service(&db).list("ph-1").unwrap()), ["a", "b"]);
    }

    #[test]
    fn missing_steps_table_requires_setup() {
        let db = seeded();
        db.with_conn(|conn| conn.execute_batch("DROP TABLE tasks; DROP TABLE steps;"))
            .unwrap();
        let err = service(&db).list("ph-1").unwrap_err();
        assert!(err.is_setup_required());
    }
}
