#![forbid(unsafe_code)]

mod cmd;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cmd::CmdContext;
use fibertrack_core::config;
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use std::env;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "ft: fiber deployment project tracking",
    long_about = None
)]
struct Cli {
    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Database file. Overrides `[database] path` and `FIBERTRACK_DB`.
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Actor recorded on audit entries.
    #[arg(long, global = true)]
    actor: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Setup",
        about = "Create or migrate the database",
        long_about = "Create the database (or bring its schema up to date) and write fibertrack.toml.",
        after_help = "EXAMPLES:\n    # Initialize in the current directory\n    ft init\n\n    # Use a specific database file\n    ft --db /srv/fibertrack/data.sqlite3 init"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Run the HTTP API",
        long_about = "Serve the hierarchy, steps, archive, and audit endpoints until Ctrl-C.",
        after_help = "EXAMPLES:\n    # Serve on the configured address\n    ft serve\n\n    # Listen on all interfaces\n    ft serve --host 0.0.0.0 --port 8080"
    )]
    Serve(cmd::serve::ServeArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Archive a record",
        long_about = "Soft-delete one record by setting its archived_at timestamp.",
        after_help = "EXAMPLES:\n    # Archive a project\n    ft archive projects p-42 --reason duplicate\n\n    # Emit machine-readable output\n    ft archive steps s-7 --json"
    )]
    Archive(cmd::archive::RecordArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Restore an archived record",
        long_about = "Clear archived_at on one record so it shows up in active listings again.",
        after_help = "EXAMPLES:\n    # Restore a project\n    ft unarchive projects p-42"
    )]
    Unarchive(cmd::archive::RecordArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Archive up to 100 records at once",
        long_about = "Archive several records of one table with a single audit entry.",
        after_help = "EXAMPLES:\n    # Archive three stock items\n    ft bulk-archive stock_items si-1 si-2 si-3"
    )]
    BulkArchive(cmd::archive::BulkArchiveArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show a project's phases, steps, and tasks",
        long_about = "Show the full project tree: ordered phases, their active steps, and each step's tasks.",
        after_help = "EXAMPLES:\n    # Show a project tree\n    ft hierarchy p-42\n\n    # Emit machine-readable output\n    ft hierarchy p-42 --json"
    )]
    Hierarchy(cmd::hierarchy::HierarchyArgs),

    #[command(
        next_help_heading = "Read",
        about = "List audit log entries",
        long_about = "List audit log entries, newest first, with optional filters.",
        after_help = "EXAMPLES:\n    # Everything that happened to one project\n    ft audit --resource-type project --resource-id p-42\n\n    # Recent deletions\n    ft audit --action delete --limit 20"
    )]
    Audit(cmd::audit::AuditArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("FIBERTRACK_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "fibertrack=debug,info"
        } else {
            "fibertrack=info,warn"
        })
    });

    let format = env::var("FIBERTRACK_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    // Logs go to stderr so stdout stays parseable.
    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn build_context(cli: &Cli, project_root: &std::path::Path) -> Result<CmdContext> {
    let mut config = config::load_config(project_root)?;
    if let Some(ref db) = cli.db {
        config.database.path.clone_from(db);
    }
    let output = resolve_output_mode(cli.json, config.output.as_deref());
    Ok(CmdContext {
        config,
        output,
        actor: cli
            .actor
            .as_deref()
            .map(str::trim)
            .filter(|actor| !actor.is_empty())
            .map(str::to_string),
    })
}

fn run(cli: &Cli, ctx: &CmdContext, project_root: &std::path::Path) -> Result<()> {
    match cli.command {
        Commands::Init(ref args) => cmd::init::run_init(args, ctx, project_root),
        Commands::Serve(ref args) => cmd::serve::run_serve(args, ctx),
        Commands::Archive(ref args) => cmd::archive::run_archive(args, ctx),
        Commands::Unarchive(ref args) => cmd::archive::run_unarchive(args, ctx),
        Commands::BulkArchive(ref args) => cmd::archive::run_bulk_archive(args, ctx),
        Commands::Hierarchy(ref args) => cmd::hierarchy::run_hierarchy(args, ctx),
        Commands::Audit(ref args) => cmd::audit::run_audit(args, ctx),
    }
}

fn fail(output: OutputMode, error: &anyhow::Error) -> ! {
    if render_error(output, &CliError::from(error)).is_err() {
        eprintln!("error: {error:#}");
    }
    std::process::exit(1)
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let project_root = env::current_dir()?;

    let ctx = match build_context(&cli, &project_root) {
        Ok(ctx) => ctx,
        Err(error) => fail(resolve_output_mode(cli.json, None), &error),
    };
    debug!(
        database = %ctx.config.database.path.display(),
        output = ?ctx.output,
        "resolved configuration"
    );

    if let Err(error) = run(&cli, &ctx, &project_root) {
        fail(ctx.output, &error);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_parses_before_subcommand() {
        let cli = Cli::parse_from(["ft", "--json", "audit"]);
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Audit(_)));
    }

    #[test]
    fn json_flag_parses_after_subcommand() {
        let cli = Cli::parse_from(["ft", "hierarchy", "p-1", "--json"]);
        assert!(cli.json);
    }

    #[test]
    fn db_and_actor_are_global() {
        let cli = Cli::parse_from([
            "ft", "archive", "projects", "p-1", "--db", "x.sqlite3", "--actor", "ana",
        ]);
        assert_eq!(cli.db, Some(PathBuf::from("x.sqlite3")));
        assert_eq!(cli.actor.as_deref(), Some("ana"));
    }

    #[test]
    fn bulk_archive_collects_ids() {
        let cli = Cli::parse_from(["ft", "bulk-archive", "steps", "a", "b", "c"]);
        match cli.command {
            Commands::BulkArchive(args) => {
                assert_eq!(args.table, "steps");
                assert_eq!(args.ids, ["a", "b", "c"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn bulk_archive_requires_ids() {
        assert!(Cli::try_parse_from(["ft", "bulk-archive", "steps"]).is_err());
    }

    #[test]
    fn archive_reason_is_optional() {
        let cli = Cli::parse_from(["ft", "archive", "steps", "s-1", "--reason", "merged"]);
        match cli.command {
            Commands::Archive(args) => assert_eq!(args.reason.as_deref(), Some("merged")),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn all_subcommands_listed() {
        let subcommands = [
            vec!["ft", "init"],
            vec!["ft", "serve", "--port", "8080"],
            vec!["ft", "archive", "projects", "p-1"],
            vec!["ft", "unarchive", "projects", "p-1"],
            vec!["ft", "bulk-archive", "projects", "p-1", "p-2"],
            vec!["ft", "hierarchy", "p-1"],
            vec!["ft", "audit", "--action", "delete", "--limit", "5"],
        ];
        for args in &subcommands {
            let result = Cli::try_parse_from(args.iter());
            assert!(
                result.is_ok(),
                "Failed to parse: {:?}: {:?}",
                args,
                result.err()
            );
        }
    }
}
