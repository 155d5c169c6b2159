use std::fmt;

/// Hard cap on ids accepted by a single bulk archive call.
pub const BULK_ARCHIVE_LIMIT: usize = 100;

/// Machine-readable error codes surfaced to API clients and CLI output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ValidationFailed,
    BulkLimitExceeded,
    RecordNotFound,
    ActiveChildren,
    StorageFailure,
    SetupRequired,
    ConfigParseError,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ValidationFailed => "E1001",
            Self::BulkLimitExceeded => "E1002",
            Self::RecordNotFound => "E2001",
            Self::ActiveChildren => "E2002",
            Self::StorageFailure => "E5001",
            Self::SetupRequired => "E6001",
            Self::ConfigParseError => "E6002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ValidationFailed => "Invalid input",
            Self::BulkLimitExceeded => "Bulk operation too large",
            Self::RecordNotFound => "Record not found",
            Self::ActiveChildren => "Record still has active children",
            Self::StorageFailure => "Database operation failed",
            Self::SetupRequired => "Database setup required",
            Self::ConfigParseError => "Config file parse error",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ValidationFailed | Self::RecordNotFound => None,
            Self::BulkLimitExceeded => Some("Split the request into batches of at most 100 ids."),
            Self::ActiveChildren => {
                Some("Archive or cancel the remaining tasks before deleting the step.")
            }
            Self::StorageFailure => Some("Retry once. If persistent, check the database file."),
            Self::SetupRequired => Some("Run `ft init` to create the missing tables."),
            Self::ConfigParseError => Some("Fix syntax in fibertrack.toml and retry."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Error returned by every service-level operation.
///
/// Low-level query helpers return `anyhow::Result`; their failures arrive
/// here as [`ServiceError::Storage`].
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("Bulk archive is limited to {limit} records at a time (got {requested})")]
    BulkLimit { requested: usize, limit: usize },

    #[error("{resource} '{id}' not found")]
    NotFound { resource: &'static str, id: String },

    #[error("{0}")]
    Conflict(String),

    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),

    #[error("{message}")]
    Configuration {
        message: String,
        details: Option<String>,
    },
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource,
            id: id.into(),
        }
    }

    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::ValidationFailed,
            Self::BulkLimit { .. } => ErrorCode::BulkLimitExceeded,
            Self::NotFound { .. } => ErrorCode::RecordNotFound,
            Self::Conflict(_) => ErrorCode::ActiveChildren,
            Self::Storage(_) => ErrorCode::StorageFailure,
            Self::Configuration { .. } => ErrorCode::SetupRequired,
        }
    }

    /// True when the failure means the schema is missing rather than broken.
    #[must_use]
    pub const fn is_setup_required(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}

impl From<anyhow::Error> for ServiceError {
    fn from(error: anyhow::Error) -> Self {
        Self::Storage(error)
    }
}

impl From<rusqlite::Error> for ServiceError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Storage(anyhow::Error::new(error))
    }
}

#[cfg(test)]
mod tests {
    use super::{BULK_ARCHIVE_LIMIT, ErrorCode, ServiceError};
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::ValidationFailed,
            ErrorCode::BulkLimitExceeded,
            ErrorCode::RecordNotFound,
            ErrorCode::ActiveChildren,
            ErrorCode::StorageFailure,
            ErrorCode::SetupRequired,
            ErrorCode::ConfigParseError,
            ErrorCode::InternalUnexpected,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::BulkLimitExceeded.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn bulk_limit_message_names_the_cap() {
        let err = ServiceError::BulkLimit {
            requested: 101,
            limit: BULK_ARCHIVE_LIMIT,
        };
        assert!(err.to_string().contains("limited to 100 records at a time"));
        assert_eq!(err.code(), ErrorCode::BulkLimitExceeded);
    }

    #[test]
    fn storage_errors_keep_context_chain() {
        let inner = anyhow::anyhow!("disk I/O error").context("archive projects row");
        let err = ServiceError::from(inner);
        let rendered = err.to_string();
        assert!(rendered.contains("archive projects row"));
        assert!(rendered.contains("disk I/O error"));
    }
}
