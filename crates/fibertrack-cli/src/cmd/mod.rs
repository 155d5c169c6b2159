pub mod archive;
pub mod audit;
pub mod hierarchy;
pub mod init;
pub mod serve;

use anyhow::{Context as _, Result};
use fibertrack_core::audit::AuditContext;
use fibertrack_core::{Database, FibertrackConfig};
use serde_json::{Map, Value};

use crate::output::OutputMode;

/// Resolved settings shared by every command handler.
#[derive(Debug)]
pub struct CmdContext {
    pub config: FibertrackConfig,
    pub output: OutputMode,
    pub actor: Option<String>,
}

impl CmdContext {
    /// Open (and migrate) the configured database.
    pub fn open_db(&self) -> Result<Database> {
        let path = &self.config.database.path;
        Database::open(path).with_context(|| format!("open {}", path.display()))
    }

    /// Audit context for a mutation, with an optional `reason` detail.
    pub fn audit_context(&self, reason: Option<&str>) -> AuditContext {
        let mut details = Map::new();
        if let Some(reason) = reason.map(str::trim).filter(|r| !r.is_empty()) {
            details.insert("reason".to_string(), Value::String(reason.to_string()));
        }
        AuditContext {
            actor: self.actor.clone(),
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(actor: Option<&str>) -> CmdContext {
        CmdContext {
            config: FibertrackConfig::default(),
            output: OutputMode::Json,
            actor: actor.map(str::to_string),
        }
    }

    #[test]
    fn reason_becomes_a_detail() {
        let ctx = context(Some("ana")).audit_context(Some("duplicate"));
        assert_eq!(ctx.actor.as_deref(), Some("ana"));
        assert_eq!(ctx.details["reason"], "duplicate");
    }

    #[test]
    fn blank_reason_is_dropped() {
        let ctx = context(None).audit_context(Some("   "));
        assert!(ctx.details.is_empty());
        assert!(ctx.actor.is_none());
    }
}
