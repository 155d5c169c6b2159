//! fibertrack HTTP API
//!
//! ## Endpoints
//!
//! ### Health
//! - GET /health - Liveness and schema version
//!
//! ### Project hierarchy
//! - GET /api/hierarchy/:project_id - Project with phases, steps, and tasks
//! - PUT /api/hierarchy/:project_id - Update top-level project fields
//!
//! ### Steps
//! - GET /api/steps?phase_id= - Active steps of a phase
//! - POST /api/steps - Create step
//! - PUT /api/steps - Update step (body carries `id`)
//! - DELETE /api/steps?id= - Soft-delete step (409 while tasks are open)
//! - PUT /api/steps/reorder - Reassign `order_index` within a phase
//!
//! ### Archive lifecycle
//! - POST /api/archive/:table/:id - Archive record
//! - POST /api/unarchive/:table/:id - Restore record
//! - POST /api/archive/:table - Bulk archive (at most 100 ids)
//!
//! ### Read-only views
//! - GET /api/records/:table?archived=exclude|only|include - List rows
//! - GET /api/audit-logs - Audit entries, newest first
//!
//! Mutations record the `x-actor` request header on their audit entry.

pub mod dto;
pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::create_router;
pub use server::{create_server, run_server, start_background_server};
pub use state::{ApiConfig, AppState};
