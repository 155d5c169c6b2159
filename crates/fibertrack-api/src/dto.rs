//! Request and response bodies

use axum::http::HeaderMap;
use fibertrack_core::archive::ArchiveOutcome;
use fibertrack_core::audit::AuditContext;
use fibertrack_core::db::query::Record;
use fibertrack_core::model::step::StepPatch;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Header naming who performed a mutation.
pub const ACTOR_HEADER: &str = "x-actor";

/// Build the audit context for a request from its headers and optional body
/// details.
#[must_use]
pub fn audit_context(headers: &HeaderMap, details: Option<Map<String, Value>>) -> AuditContext {
    let actor = headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);
    AuditContext {
        actor,
        details: details.unwrap_or_default(),
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub schema_version: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct ArchiveRequest {
    #[serde(default)]
    pub details: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
pub struct BulkArchiveRequest {
    pub ids: Vec<String>,
    #[serde(default)]
    pub details: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize)]
pub struct ArchiveResponse {
    pub success: bool,
    pub data: Vec<Record>,
    pub audit_logged: bool,
    pub invalidate: Vec<String>,
}

impl From<ArchiveOutcome> for ArchiveResponse {
    fn from(outcome: ArchiveOutcome) -> Self {
        Self {
            success: true,
            data: outcome.rows,
            audit_logged: outcome.audit_logged,
            invalidate: outcome.invalidate,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StepsQuery {
    #[serde(default)]
    pub phase_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StepIdQuery {
    #[serde(default)]
    pub id: Option<String>,
}

/// `PUT /api/steps` body: the step id plus the fields to change.
#[derive(Debug, Deserialize)]
pub struct UpdateStepRequest {
    pub id: String,
    #[serde(flatten)]
    pub patch: StepPatch,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecordsQuery {
    #[serde(default)]
    pub archived: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditLogQuery {
    #[serde(default)]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn actor_header_is_trimmed_and_optional() {
        let mut headers = HeaderMap::new();
        assert!(audit_context(&headers, None).actor.is_none());

        headers.insert(ACTOR_HEADER, HeaderValue::from_static("  ana  "));
        assert_eq!(audit_context(&headers, None).actor.as_deref(), Some("ana"));

        headers.insert(ACTOR_HEADER, HeaderValue::from_static(""));
        assert!(audit_context(&headers, None).actor.is_none());
    }

    #[test]
    fn update_step_request_flattens_patch() {
        let req: UpdateStepRequest =
            serde_json::from_str(r#"{"id":"s-1","name":"Splice","is_active":false}"#).unwrap();
        assert_eq!(req.id, "s-1");
        assert_eq!(req.patch.name.as_deref(), Some("Splice"));
        assert_eq!(req.patch.is_active, Some(false));
        assert!(req.patch.order_index.is_none());
    }
}
