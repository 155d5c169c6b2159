use anyhow::Result;
use clap::Args;
use fibertrack_core::HierarchyAggregator;

use super::CmdContext;
use crate::output::{pretty_kv, pretty_rule, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct HierarchyArgs {
    /// Project id.
    pub project_id: String,
}

/// Execute `ft hierarchy <project_id>`: print the project tree.
///
/// # Errors
///
/// Returns an error if the project does not exist, the steps table is
/// missing, or the database cannot be read.
pub fn run_hierarchy(args: &HierarchyArgs, ctx: &CmdContext) -> Result<()> {
    let db = ctx.open_db()?;
    let tree = HierarchyAggregator::new(&db, ctx.config.hierarchy.max_fan_out)
        .get(&args.project_id)?;

    render_mode(
        ctx.output,
        &tree,
        |tree, w| {
            writeln!(w, "project\t{}\t{}", tree.project.id, tree.project.name)?;
            for phase in &tree.phases {
                writeln!(w, "phase\t{}\t{}", phase.id, phase.name)?;
                for step in &phase.steps {
                    writeln!(w, "step\t{}\t{}", step.id, step.name)?;
                    for task in &step.tasks {
                        writeln!(w, "task\t{}\t{}\t{}", task.id, task.name, task.status)?;
                    }
                }
            }
            Ok(())
        },
        |tree, w| {
            pretty_section(w, &tree.project.name)?;
            pretty_kv(w, "Id", &tree.project.id)?;
            pretty_kv(w, "Status", &tree.project.status)?;
            pretty_kv(w, "Phases", tree.phases.len().to_string())?;
            for phase in &tree.phases {
                writeln!(w)?;
                let marker = if phase.is_standard { " (standard)" } else { "" };
                writeln!(w, "{}. {}{marker}", phase.order_index, phase.name)?;
                for step in &phase.steps {
                    writeln!(w, "   {}. {}", step.order_index, step.name)?;
                    for task in &step.tasks {
                        writeln!(w, "      - {} [{}]", task.name, task.status)?;
                    }
                }
            }
            pretty_rule(w)
        },
    )
}
