//! Application state for the API server

use fibertrack_core::config::{FibertrackConfig, ServerConfig};
use fibertrack_core::{
    ArchiveService, AuditLogger, Database, HierarchyAggregator, ProjectService, ServiceError,
    StepsService,
};
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};

/// API server state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub audit: AuditLogger,
    /// Worker bound for hierarchy fan-out.
    pub max_fan_out: usize,
    /// API version
    pub version: String,
}

impl AppState {
    #[must_use]
    pub fn new(db: Arc<Database>, config: &FibertrackConfig) -> Self {
        Self {
            db,
            audit: AuditLogger::new(config.audit.policy()),
            max_fan_out: config.hierarchy.max_fan_out,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    #[must_use]
    pub fn archive(&self) -> ArchiveService<'_> {
        ArchiveService::new(&self.db, self.audit)
    }

    #[must_use]
    pub fn steps(&self) -> StepsService<'_> {
        StepsService::new(&self.db, self.audit)
    }

    #[must_use]
    pub fn projects(&self) -> ProjectService<'_> {
        ProjectService::new(&self.db, self.audit)
    }

    #[must_use]
    pub fn hierarchy(&self) -> HierarchyAggregator<'_> {
        HierarchyAggregator::new(&self.db, self.max_fan_out)
    }

    /// Run store work on the blocking pool.
    ///
    /// # Errors
    ///
    /// The service error from `f`, or [`ApiError::Internal`] if the task
    /// panicked.
    pub async fn blocking<T, F>(&self, f: F) -> ApiResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Self) -> Result<T, ServiceError> + Send + 'static,
    {
        let state = self.clone();
        tokio::task::spawn_blocking(move || f(&state))
            .await
            .map_err(|e| ApiError::Internal(format!("blocking task failed: {e}")))?
            .map_err(ApiError::from)
    }
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for ApiConfig {
    fn from(server: &ServerConfig) -> Self {
        Self {
            host: server.host.clone(),
            port: server.port,
            enable_cors: server.enable_cors,
        }
    }
}
