use anyhow::{Context as _, Result};
use clap::Args;
use fibertrack_core::audit::{AuditFilter, list_audit_logs};
use fibertrack_core::{AuditAction, AuditResourceType};

use super::CmdContext;
use crate::output::{pretty_kv, pretty_rule, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct AuditArgs {
    /// Only entries for this resource type (e.g. `project`, `step`).
    #[arg(long)]
    pub resource_type: Option<String>,

    /// Only entries for this resource id.
    #[arg(long)]
    pub resource_id: Option<String>,

    /// Only entries with this action (`create`, `update`, `delete`).
    #[arg(long)]
    pub action: Option<String>,

    /// Maximum number of entries to show.
    #[arg(long, default_value_t = 50)]
    pub limit: u32,
}

impl AuditArgs {
    fn filter(&self) -> Result<AuditFilter> {
        Ok(AuditFilter {
            resource_type: self
                .resource_type
                .as_deref()
                .map(str::parse::<AuditResourceType>)
                .transpose()?,
            resource_id: self.resource_id.clone(),
            action: self
                .action
                .as_deref()
                .map(str::parse::<AuditAction>)
                .transpose()?,
            limit: Some(self.limit),
        })
    }
}

/// Execute `ft audit`: list audit entries, newest first.
///
/// # Errors
///
/// Returns an error for an unknown resource type or action, or if the
/// audit log cannot be read.
pub fn run_audit(args: &AuditArgs, ctx: &CmdContext) -> Result<()> {
    let filter = args.filter()?;
    let db = ctx.open_db()?;
    let entries = db
        .with_conn(|conn| list_audit_logs(conn, &filter))
        .context("read audit log")?;

    render_mode(
        ctx.output,
        &entries,
        |entries, w| {
            for entry in entries {
                writeln!(
                    w,
                    "{}\t{}\t{}\t{}\t{}",
                    entry.created_at.to_rfc3339(),
                    entry.action,
                    entry.resource_type,
                    entry.resource_id,
                    entry.actor.as_deref().unwrap_or("-"),
                )?;
            }
            Ok(())
        },
        |entries, w| {
            pretty_section(w, &format!("Audit log ({} entries)", entries.len()))?;
            for entry in entries {
                pretty_kv(w, "When", entry.created_at.to_rfc3339())?;
                pretty_kv(
                    w,
                    "What",
                    format!(
                        "{} {} {}",
                        entry.action, entry.resource_type, entry.resource_id
                    ),
                )?;
                pretty_kv(w, "Actor", entry.actor.as_deref().unwrap_or("-"))?;
                pretty_rule(w)?;
            }
            Ok(())
        },
    )
}
