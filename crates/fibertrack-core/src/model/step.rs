//! Steps and the tasks hanging off them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::db::{optional_timestamp_column, timestamp_column};
use crate::error::ServiceError;

pub const STEP_COLUMNS: &[&str] = &[
    "id",
    "phase_id",
    "name",
    "description",
    "order_index",
    "is_active",
    "created_at",
    "updated_at",
    "archived_at",
];

pub const TASK_COLUMNS: &[&str] = &[
    "id",
    "step_id",
    "name",
    "description",
    "status",
    "order_index",
    "created_at",
    "updated_at",
    "archived_at",
];

/// Task status that does not block deleting its step.
pub const TASK_STATUS_CANCELLED: &str = "cancelled";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    pub id: String,
    pub phase_id: String,
    pub name: String,
    pub description: Option<String>,
    pub order_index: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

impl Step {
    pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            phase_id: row.get("phase_id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            order_index: row.get("order_index")?,
            is_active: row.get::<_, i64>("is_active")? != 0,
            created_at: timestamp_column(row, "created_at")?,
            updated_at: timestamp_column(row, "updated_at")?,
            archived_at: optional_timestamp_column(row, "archived_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    pub id: String,
    pub step_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub order_index: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            step_id: row.get("step_id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            status: row.get("status")?,
            order_index: row.get("order_index")?,
            created_at: timestamp_column(row, "created_at")?,
            updated_at: timestamp_column(row, "updated_at")?,
        })
    }
}

/// Input for creating a step.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewStep {
    pub phase_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Appended after the last step when absent.
    #[serde(default)]
    pub order_index: Option<i64>,
}

impl NewStep {
    /// # Errors
    ///
    /// Returns [`ServiceError::Validation`] when `phase_id` or `name` is blank
    /// or `order_index` is negative.
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.phase_id.trim().is_empty() {
            return Err(ServiceError::validation("phase_id is required"));
        }
        if self.name.trim().is_empty() {
            return Err(ServiceError::validation("Step name is required"));
        }
        if self.order_index.is_some_and(|index| index < 0) {
            return Err(ServiceError::validation("order_index cannot be negative"));
        }
        Ok(())
    }
}

/// Partial step update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StepPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub order_index: Option<i64>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl StepPatch {
    /// # Errors
    ///
    /// Returns [`ServiceError::Validation`] for a blank name or a negative
    /// `order_index`.
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
            return Err(ServiceError::validation("Step name cannot be empty"));
        }
        if self.order_index.is_some_and(|index| index < 0) {
            return Err(ServiceError::validation("order_index cannot be negative"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOrder {
    pub id: String,
    pub order_index: i64,
}

/// Bulk `order_index` assignment for the steps of one phase.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReorderSteps {
    pub phase_id: String,
    pub step_orders: Vec<StepOrder>,
}

impl ReorderSteps {
    /// # Errors
    ///
    /// Returns [`ServiceError::Validation`] for a blank phase, an empty list,
    /// a duplicated step id, or a negative index.
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.phase_id.trim().is_empty() {
            return Err(ServiceError::validation("phase_id is required"));
        }
        if self.step_orders.is_empty() {
            return Err(ServiceError::validation("step_orders cannot be empty"));
        }
        let mut seen = HashSet::new();
        for order in &self.step_orders {
            if !seen.insert(order.id.as_str()) {
                return Err(ServiceError::validation(format!(
                    "step '{}' appears more than once",
                    order.id
                )));
            }
            if order.order_index < 0 {
                return Err(ServiceError::validation("order_index cannot be negative"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_step_requires_name_and_phase() {
        let mut step = NewStep {
            phase_id: "ph-1".into(),
            name: "Trenching".into(),
            description: None,
            order_index: None,
        };
        assert!(step.validate().is_ok());

        step.name = " ".into();
        assert!(step.validate().is_err());

        step.name = "Trenching".into();
        step.phase_id = String::new();
        assert!(step.validate().is_err());
    }

    #[test]
    fn reorder_rejects_duplicates_and_empty() {
        let empty = ReorderSteps {
            phase_id: "ph-1".into(),
            step_orders: vec![],
        };
        assert!(empty.validate().is_err());

        let dup = ReorderSteps {
            phase_id: "ph-1".into(),
            step_orders: vec![
                StepOrder {
                    id: "a".into(),
                    order_index: 1,
                },
                StepOrder {
                    id: "a".into(),
                    order_index: 2,
                },
            ],
        };
        let err = dup.validate().unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn reorder_deserializes_wire_shape() {
        let body = r#"{"phase_id":"ph-1","step_orders":[{"id":"a","order_index":2},{"id":"b","order_index":1}]}"#;
        let req: ReorderSteps = serde_json::from_str(body).unwrap();
        assert_eq!(req.step_orders.len(), 2);
        assert_eq!(req.step_orders[1].id, "b");
        assert!(req.validate().is_ok());
    }

    #[test]
    fn step_patch_rejects_negative_index() {
        let patch = StepPatch {
            order_index: Some(-1),
            ..StepPatch::default()
        };
        assert!(patch.validate().is_err());
    }
}
