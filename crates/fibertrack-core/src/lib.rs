//! fibertrack-core library.
//!
//! Storage and domain services for fiber-deployment project tracking:
//! the soft-delete lifecycle ([`archive`]), the append-only audit trail
//! ([`audit`]), archived-row query helpers ([`db::query`]), and the
//! project hierarchy read model ([`hierarchy`]).

pub mod archive;
pub mod audit;
pub mod config;
pub mod db;
pub mod error;
pub mod hierarchy;
pub mod model;
pub mod projects;
pub mod steps;

/// # Conventions
///
/// - **Errors**: Query helpers return `anyhow::Result` with context; services
///   return [`error::ServiceError`].
/// - **Logging**: Use `tracing` macros (`info!` per mutation, `debug!` per
///   read, `warn!` for swallowed failures).
pub use archive::{ArchiveOutcome, ArchiveService};
pub use audit::{AuditContext, AuditLogger, AuditPolicy};
pub use config::FibertrackConfig;
pub use db::Database;
pub use error::{ErrorCode, ServiceError};
pub use hierarchy::{HierarchyAggregator, ProjectHierarchy};
pub use model::table::{AuditAction, AuditResourceType, SoftDeleteTable};
pub use projects::ProjectService;
pub use steps::StepsService;
