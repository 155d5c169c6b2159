//! `ft archive`, `ft unarchive`, and `ft bulk-archive`.
//!
//! All three go through the archive service, so every change lands in the
//! audit trail exactly as it would through the HTTP API.

use anyhow::Result;
use clap::Args;
use fibertrack_core::{ArchiveOutcome, ArchiveService, AuditLogger, Database, SoftDeleteTable};

use super::CmdContext;
use crate::output::{pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct RecordArgs {
    /// Soft-deletable table (e.g. `projects`, `steps`, `stock_items`).
    pub table: String,

    /// Record id.
    pub id: String,

    /// Reason stored in the audit entry details.
    #[arg(long)]
    pub reason: Option<String>,
}

#[derive(Args, Debug)]
pub struct BulkArchiveArgs {
    /// Soft-deletable table.
    pub table: String,

    /// Record ids (at most 100).
    #[arg(required = true, num_args = 1..)]
    pub ids: Vec<String>,

    /// Reason stored in the audit entry details.
    #[arg(long)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Verb {
    Archived,
    Unarchived,
}

fn service<'db>(db: &'db Database, ctx: &CmdContext) -> ArchiveService<'db> {
    ArchiveService::new(db, AuditLogger::new(ctx.config.audit.policy()))
}

/// Execute `ft archive <table> <id>`.
///
/// # Errors
///
/// Returns an error for an unknown table, a missing record, or a storage
/// failure.
pub fn run_archive(args: &RecordArgs, ctx: &CmdContext) -> Result<()> {
    let table: SoftDeleteTable = args.table.parse()?;
    let db = ctx.open_db()?;
    let outcome = service(&db, ctx).archive(
        table,
        &args.id,
        &ctx.audit_context(args.reason.as_deref()),
    )?;
    render_outcome(ctx, table, Verb::Archived, &outcome)
}

/// Execute `ft unarchive <table> <id>`.
///
/// # Errors
///
/// Same as [`run_archive`].
pub fn run_unarchive(args: &RecordArgs, ctx: &CmdContext) -> Result<()> {
    let table: SoftDeleteTable = args.table.parse()?;
    let db = ctx.open_db()?;
    let outcome = service(&db, ctx).unarchive(
        table,
        &args.id,
        &ctx.audit_context(args.reason.as_deref()),
    )?;
    render_outcome(ctx, table, Verb::Unarchived, &outcome)
}

/// Execute `ft bulk-archive <table> <ids>...`.
///
/// # Errors
///
/// Returns an error for an unknown table, more than 100 ids, or a storage
/// failure. Nothing is written when the id list is rejected.
pub fn run_bulk_archive(args: &BulkArchiveArgs, ctx: &CmdContext) -> Result<()> {
    let table: SoftDeleteTable = args.table.parse()?;
    let db = ctx.open_db()?;
    let outcome = service(&db, ctx).bulk_archive(
        table,
        &args.ids,
        &ctx.audit_context(args.reason.as_deref()),
    )?;
    render_outcome(ctx, table, Verb::Archived, &outcome)
}

fn render_outcome(
    ctx: &CmdContext,
    table: SoftDeleteTable,
    verb: Verb,
    outcome: &ArchiveOutcome,
) -> Result<()> {
    render_mode(
        ctx.output,
        outcome,
        |outcome, w| {
            for row in &outcome.rows {
                let stamp = row
                    .archived_at
                    .map_or_else(|| "-".to_string(), |ts| ts.to_rfc3339());
                writeln!(w, "{table}\t{}\t{stamp}", row.id)?;
            }
            Ok(())
        },
        |outcome, w| {
            let heading = match verb {
                Verb::Archived => "Archived",
                Verb::Unarchived => "Unarchived",
            };
            pretty_section(
                w,
                &format!("{heading} {} {}(s)", outcome.rows.len(), table.record_noun()),
            )?;
            for row in &outcome.rows {
                pretty_kv(w, "id", &row.id)?;
            }
            if !outcome.audit_logged {
                writeln!(w, "warning: audit entry was not recorded")?;
            }
            Ok(())
        },
    )
}
