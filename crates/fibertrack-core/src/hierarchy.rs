//! Project → phase → step → task tree assembly.
//!
//! The tree is rebuilt on every read. Steps for all phases are fetched,
//! then tasks for all steps; each stage is joined before the next starts
//! and results keep their input order, so the output is the same as a
//! sequential walk.
//!
//! Every stage reads one snapshot. The project and its phases are read in
//! a transaction on the shared connection. On a file-backed store with a
//! fan-out width above one, the step and task stages run on read-only
//! connections whose snapshots are pinned before that lock is released, so
//! writes made through the same [`Database`] cannot land between stages.
//! Writers in other processes can still commit between the first read and
//! the pinning of the readers. In-memory stores, and any store where the
//! readers cannot be opened, fall back to a sequential walk inside the
//! first transaction.
//!
//! Failures below the project level are logged and produce an empty branch
//! rather than failing the whole read.

use anyhow::Context;
use rusqlite::Connection;
use serde::Serialize;
use std::thread;

use crate::db::query::{SortDirection, fetch_typed, select_from};
use crate::db::{Database, open_reader, pin_snapshot, require_table};
use crate::error::ServiceError;
use crate::model::project::Project;
use crate::model::step::{Step, TASK_COLUMNS, Task};
use crate::model::table::SoftDeleteTable;
use crate::projects::get_project;
use crate::steps::list_active_steps;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectHierarchy {
    pub project: Project,
    pub phases: Vec<PhaseNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseNode {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub order_index: i64,
    pub is_standard: bool,
    pub project_phase_id: String,
    pub steps: Vec<StepNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepNode {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub order_index: i64,
    pub phase_id: String,
    pub tasks: Vec<Task>,
}

impl StepNode {
    fn new(step: Step, tasks: Vec<Task>) -> Self {
        Self {
            id: step.id,
            name: step.name,
            description: step.description,
            order_index: step.order_index,
            phase_id: step.phase_id,
            tasks,
        }
    }
}

/// A project-phase link joined with its phase definition.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PhaseLink {
    project_phase_id: String,
    link_order: Option<i64>,
    phase_id: Option<String>,
    name: Option<String>,
    description: Option<String>,
    order_no: Option<i64>,
    is_standard: bool,
    phase_archived: bool,
}

impl PhaseLink {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            project_phase_id: row.get("project_phase_id")?,
            link_order: row.get("link_order")?,
            phase_id: row.get("phase_id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            order_no: row.get("order_no")?,
            is_standard: row.get::<_, Option<i64>>("is_standard")?.unwrap_or(0) != 0,
            phase_archived: row.get::<_, Option<String>>("phase_archived_at")?.is_some(),
        })
    }

    /// The phase this link resolves to, if it is present and active.
    fn resolve(self) -> Option<PhaseNode> {
        if self.phase_archived {
            return None;
        }
        let id = self.phase_id?;
        let name = self.name?;
        Some(PhaseNode {
            id,
            name,
            description: self.description,
            order_index: self.link_order.or(self.order_no).unwrap_or(0),
            is_standard: self.is_standard,
            project_phase_id: self.project_phase_id,
            steps: Vec::new(),
        })
    }
}

/// Steps per phase and tasks per step, both in walk order.
type Branches = (Vec<Vec<Step>>, Vec<Vec<Task>>);

#[derive(Debug, Clone, Copy)]
pub struct HierarchyAggregator<'db> {
    db: &'db Database,
    max_fan_out: usize,
}

impl<'db> HierarchyAggregator<'db> {
    #[must_use]
    pub const fn new(db: &'db Database, max_fan_out: usize) -> Self {
        Self { db, max_fan_out }
    }

    /// Assemble the tree for `project_id`.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Configuration`] when the steps table is missing,
    /// [`ServiceError::NotFound`] when the project is missing or archived,
    /// [`ServiceError::Storage`] when the project query fails.
    pub fn get(&self, project_id: &str) -> Result<ProjectHierarchy, ServiceError> {
        let (project, mut phases, mut readers, branches) =
            self.db.with_conn(|conn| -> Result<_, ServiceError> {
                require_table(conn, SoftDeleteTable::Steps.as_str())?;
                let tx = conn
                    .unchecked_transaction()
                    .context("begin hierarchy read")?;

                let project = get_project(&tx, project_id)?;
                let phases = fetch_phase_links(&tx, project_id).unwrap_or_else(|error| {
                    tracing::warn!(
                        project_id,
                        error = %format!("{error:#}"),
                        "failed to load project phases"
                    );
                    Vec::new()
                });

                let readers = if phases.is_empty() {
                    Vec::new()
                } else {
                    self.open_readers()
                };
                let branches = readers
                    .is_empty()
                    .then(|| load_sequential(&tx, &phases));

                tx.commit().context("end hierarchy read")?;
                Ok((project, phases, readers, branches))
            })?;

        let (phase_steps, step_tasks) =
            branches.unwrap_or_else(|| load_parallel(&mut readers, &phases));

        let mut tasks = step_tasks.into_iter();
        for (phase, steps) in phases.iter_mut().zip(phase_steps) {
            phase.steps = steps
                .into_iter()
                .map(|step| StepNode::new(step, tasks.next().unwrap_or_default()))
                .collect();
        }
        phases.sort_by_key(|phase| phase.order_index);

        tracing::debug!(
            project_id,
            phases = phases.len(),
            steps = phases.iter().map(|p| p.steps.len()).sum::<usize>(),
            readers = readers.len(),
            "hierarchy assembled"
        );
        Ok(ProjectHierarchy { project, phases })
    }

    /// Read-only connections with pinned snapshots, one per worker.
    ///
    /// Empty when the walk should stay sequential: width 1, an in-memory
    /// store, or a reader that failed to open.
    fn open_readers(&self) -> Vec<Connection> {
        if self.max_fan_out <= 1 {
            return Vec::new();
        }
        let Some(path) = self.db.path() else {
            return Vec::new();
        };

        (0..self.max_fan_out)
            .map(|_| {
                let reader = open_reader(path)?;
                pin_snapshot(&reader)?;
                Ok(reader)
            })
            .collect::<anyhow::Result<Vec<_>>>()
            .unwrap_or_else(|error| {
                tracing::warn!(
                    error = %format!("{error:#}"),
                    "failed to open hierarchy readers, reading sequentially"
                );
                Vec::new()
            })
    }
}

fn load_sequential(conn: &Connection, phases: &[PhaseNode]) -> Branches {
    let phase_steps: Vec<Vec<Step>> = phases
        .iter()
        .map(|phase| steps_or_empty(conn, &phase.id))
        .collect();
    let step_tasks = phase_steps
        .iter()
        .flatten()
        .map(|step| tasks_or_empty(conn, &step.id))
        .collect();
    (phase_steps, step_tasks)
}

fn load_parallel(readers: &mut [Connection], phases: &[PhaseNode]) -> Branches {
    let phase_steps = fan_out(readers, phases, |conn, phase| {
        steps_or_empty(conn, &phase.id)
    });
    let all_steps: Vec<&Step> = phase_steps.iter().flatten().collect();
    let step_tasks = fan_out(readers, &all_steps, |conn, step| {
        tasks_or_empty(conn, &step.id)
    });
    (phase_steps, step_tasks)
}

fn steps_or_empty(conn: &Connection, phase_id: &str) -> Vec<Step> {
    list_active_steps(conn, phase_id).unwrap_or_else(|error| {
        tracing::warn!(
            phase_id,
            error = %format!("{error:#}"),
            "failed to load steps"
        );
        Vec::new()
    })
}

fn tasks_or_empty(conn: &Connection, step_id: &str) -> Vec<Task> {
    list_tasks(conn, step_id).unwrap_or_else(|error| {
        tracing::warn!(
            step_id,
            error = %format!("{error:#}"),
            "failed to load tasks"
        );
        Vec::new()
    })
}

fn fetch_phase_links(conn: &Connection, project_id: &str) -> anyhow::Result<Vec<PhaseNode>> {
    let mut stmt = conn
        .prepare(
            "SELECT pp.id AS project_phase_id, pp.order_index AS link_order,
                    ph.id AS phase_id, ph.name, ph.description, ph.order_no,
                    ph.is_standard, ph.archived_at AS phase_archived_at
             FROM project_phases pp
             LEFT JOIN phases ph ON ph.id = pp.phase_id
             WHERE pp.project_id = ?1 AND pp.archived_at IS NULL
             ORDER BY pp.order_index, pp.created_at",
        )
        .context("prepare project phase query")?;
    let rows = stmt
        .query_map([project_id], PhaseLink::from_row)
        .context("execute project phase query")?;

    let mut phases = Vec::new();
    for row in rows {
        let link = row.context("read project phase row")?;
        let link_id = link.project_phase_id.clone();
        let Some(phase) = link.resolve() else {
            tracing::debug!(
                project_phase_id = %link_id,
                "skipping link without an active phase"
            );
            continue;
        };
        phases.push(phase);
    }
    Ok(phases)
}

fn list_tasks(conn: &Connection, step_id: &str) -> anyhow::Result<Vec<Task>> {
    let query = select_from(SoftDeleteTable::Tasks, TASK_COLUMNS, false)
        .filter_eq("step_id", step_id.to_string())
        .order_by("order_index", SortDirection::Asc)
        .order_by("created_at", SortDirection::Asc);
    fetch_typed(conn, &query, Task::from_row)
}

/// Map `f` over `items`, one scoped thread per worker, keeping input order.
///
/// Items are split into contiguous chunks and chunk `i` runs on
/// `workers[i]`, so each worker is used by one thread at a time. With one
/// worker (or one item) everything runs on the calling thread; with no
/// workers nothing runs.
fn fan_out<W, T, R, F>(workers: &mut [W], items: &[T], f: F) -> Vec<R>
where
    W: Send,
    T: Sync,
    R: Send,
    F: Fn(&mut W, &T) -> R + Sync,
{
    let width = workers.len().min(items.len());
    if width <= 1 {
        let Some(worker) = workers.first_mut() else {
            return Vec::new();
        };
        return items.iter().map(|item| f(worker, item)).collect();
    }

    let chunk_size = items.len().div_ceil(width);
    thread::scope(|scope| {
        let f = &f;
        let handles: Vec<_> = workers
            .iter_mut()
            .zip(items.chunks(chunk_size))
            .map(|(worker, chunk)| {
                scope.spawn(move || chunk.iter().map(|item| f(worker, item)).collect::<Vec<_>>())
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
            })
            .collect()
    })
}
