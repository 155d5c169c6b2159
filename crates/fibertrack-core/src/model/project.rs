use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{optional_timestamp_column, timestamp_column};
use crate::error::ServiceError;

/// Columns selected for a [`Project`].
pub const PROJECT_COLUMNS: &[&str] = &[
    "id",
    "name",
    "description",
    "status",
    "customer_id",
    "start_date",
    "end_date",
    "created_at",
    "updated_at",
    "archived_at",
];

/// Allowed values of `projects.status`.
pub const PROJECT_STATUSES: &[&str] = &["planning", "active", "on_hold", "completed", "cancelled"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub customer_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

impl Project {
    pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            status: row.get("status")?,
            customer_id: row.get("customer_id")?,
            start_date: row.get("start_date")?,
            end_date: row.get("end_date")?,
            created_at: timestamp_column(row, "created_at")?,
            updated_at: timestamp_column(row, "updated_at")?,
            archived_at: optional_timestamp_column(row, "archived_at")?,
        })
    }
}

/// Top-level project fields accepted by an update. `None` leaves a field
/// unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProjectPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

impl ProjectPatch {
    /// Check field shapes before touching storage.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Validation`] for an empty name, an unknown
    /// status, a malformed date, or an end date before the start date.
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
            return Err(ServiceError::validation("Project name cannot be empty"));
        }

        if let Some(status) = self
            .status
            .as_deref()
            .filter(|status| !PROJECT_STATUSES.contains(status))
        {
            return Err(ServiceError::validation(format!(
                "Invalid project status '{status}': expected one of {}",
                PROJECT_STATUSES.join(", ")
            )));
        }

        let start = parse_date("start_date", self.start_date.as_deref())?;
        let end = parse_date("end_date", self.end_date.as_deref())?;
        if matches!((start, end), (Some(start), Some(end)) if end < start) {
            return Err(ServiceError::validation(
                "end_date cannot be earlier than start_date",
            ));
        }
        Ok(())
    }
}

fn parse_date(field: &str, raw: Option<&str>) -> Result<Option<NaiveDate>, ServiceError> {
    raw.filter(|value| !value.is_empty())
        .map(|value| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
                ServiceError::validation(format!("{field} must be a YYYY-MM-DD date, got '{value}'"))
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::ProjectPatch;

    #[test]
    fn empty_patch_is_valid() {
        assert!(ProjectPatch::default().validate().is_ok());
    }

    #[test]
    fn blank_name_is_rejected() {
        let patch = ProjectPatch {
            name: Some("   ".into()),
            ..ProjectPatch::default()
        };
        assert!(patch.validate().is_err());
    }

    #[test]
    fn unknown_status_is_rejected() {
        let patch = ProjectPatch {
            status: Some("paused".into()),
            ..ProjectPatch::default()
        };
        let err = patch.validate().unwrap_err();
        assert!(err.to_string().contains("on_hold"));
    }

    #[test]
    fn dates_must_parse_and_be_ordered() {
        let bad_format = ProjectPatch {
            start_date: Some("03/01/2025".into()),
            ..ProjectPatch::default()
        };
        assert!(bad_format.validate().is_err());

        let reversed = ProjectPatch {
            start_date: Some("2025-06-01".into()),
            end_date: Some("2025-05-01".into()),
            ..ProjectPatch::default()
        };
        assert!(reversed.validate().is_err());

        let ok = ProjectPatch {
            start_date: Some("2025-05-01".into()),
            end_date: Some("2025-06-01".into()),
            ..ProjectPatch::default()
        };
        assert!(ok.validate().is_ok());
    }
}
