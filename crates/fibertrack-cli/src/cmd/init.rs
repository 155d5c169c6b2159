use anyhow::{Context as _, Result};
use clap::Args;
use fibertrack_core::config::PROJECT_CONFIG_FILE;
use fibertrack_core::db::migrations;
use serde::Serialize;
use std::path::Path;

use super::CmdContext;
use crate::output::{pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing `fibertrack.toml`.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
struct InitOutput {
    database: String,
    schema_version: u32,
    /// Config file written by this run, if any.
    config_file: Option<String>,
}

/// Execute `ft init`: create or migrate the database and write a
/// `fibertrack.toml` holding the resolved settings.
///
/// An existing config file is left alone unless `--force` is given, so
/// re-running `init` only brings the schema up to date.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or migrated, or the
/// config file cannot be written.
pub fn run_init(args: &InitArgs, ctx: &CmdContext, project_root: &Path) -> Result<()> {
    let db = ctx.open_db()?;
    let schema_version = db
        .with_conn(migrations::current_schema_version)
        .context("read schema version")?;

    let config_path = project_root.join(PROJECT_CONFIG_FILE);
    let config_file = if config_path.exists() && !args.force {
        None
    } else {
        let rendered = toml::to_string_pretty(&ctx.config).context("render config")?;
        std::fs::write(&config_path, rendered)
            .with_context(|| format!("write {}", config_path.display()))?;
        Some(config_path.display().to_string())
    };

    tracing::info!(
        database = %ctx.config.database.path.display(),
        schema_version,
        "database initialized"
    );

    let output = InitOutput {
        database: ctx.config.database.path.display().to_string(),
        schema_version,
        config_file,
    };

    render_mode(
        ctx.output,
        &output,
        |out, w| {
            writeln!(w, "database\t{}", out.database)?;
            writeln!(w, "schema_version\t{}", out.schema_version)?;
            if let Some(ref file) = out.config_file {
                writeln!(w, "config\t{file}")?;
            }
            Ok(())
        },
        |out, w| {
            pretty_section(w, "Initialized fibertrack")?;
            pretty_kv(w, "Database", &out.database)?;
            pretty_kv(w, "Schema", out.schema_version.to_string())?;
            pretty_kv(
                w,
                "Config",
                out.config_file.as_deref().unwrap_or("(kept existing)"),
            )
        },
    )
}
