//! Soft-deletable tables and the audit vocabulary attached to them.
//!
//! Every [`SoftDeleteTable`] maps to exactly one [`AuditResourceType`]. The
//! mapping is an exhaustive `match`, so adding a table without choosing its
//! resource type fails to compile.

use anyhow::{Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tables whose rows carry a nullable `archived_at` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoftDeleteTable {
    Projects,
    Customers,
    Phases,
    ProjectPhases,
    ProjectTasks,
    Tasks,
    Steps,
    Locations,
    Staff,
    StockItems,
}

impl SoftDeleteTable {
    pub const ALL: [Self; 10] = [
        Self::Projects,
        Self::Customers,
        Self::Phases,
        Self::ProjectPhases,
        Self::ProjectTasks,
        Self::Tasks,
        Self::Steps,
        Self::Locations,
        Self::Staff,
        Self::StockItems,
    ];

    /// SQL table name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Projects => "projects",
            Self::Customers => "customers",
            Self::Phases => "phases",
            Self::ProjectPhases => "project_phases",
            Self::ProjectTasks => "project_tasks",
            Self::Tasks => "tasks",
            Self::Steps => "steps",
            Self::Locations => "locations",
            Self::Staff => "staff",
            Self::StockItems => "stock_items",
        }
    }

    #[must_use]
    pub const fn resource_type(self) -> AuditResourceType {
        match self {
            Self::Projects => AuditResourceType::Project,
            Self::Customers => AuditResourceType::Customer,
            Self::Phases => AuditResourceType::Phase,
            Self::ProjectPhases => AuditResourceType::ProjectPhase,
            Self::ProjectTasks => AuditResourceType::ProjectTask,
            Self::Tasks => AuditResourceType::Task,
            Self::Steps => AuditResourceType::Step,
            Self::Locations => AuditResourceType::Location,
            Self::Staff => AuditResourceType::User,
            Self::StockItems => AuditResourceType::StockItem,
        }
    }

    /// Singular noun used in error messages.
    #[must_use]
    pub const fn record_noun(self) -> &'static str {
        match self {
            Self::Projects => "project",
            Self::Customers => "customer",
            Self::Phases => "phase",
            Self::ProjectPhases => "project phase",
            Self::ProjectTasks => "project task",
            Self::Tasks => "task",
            Self::Steps => "step",
            Self::Locations => "location",
            Self::Staff => "staff member",
            Self::StockItems => "stock item",
        }
    }
}

impl fmt::Display for SoftDeleteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SoftDeleteTable {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|table| table.as_str() == normalized)
            .ok_or_else(|| anyhow!("unknown table '{s}': not a soft-deletable table"))
    }
}

/// Resource categories recorded on audit entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditResourceType {
    Project,
    Customer,
    Phase,
    ProjectPhase,
    ProjectTask,
    Task,
    Step,
    Location,
    User,
    StockItem,
    System,
}

impl AuditResourceType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Customer => "customer",
            Self::Phase => "phase",
            Self::ProjectPhase => "project_phase",
            Self::ProjectTask => "project_task",
            Self::Task => "task",
            Self::Step => "step",
            Self::Location => "location",
            Self::User => "user",
            Self::StockItem => "stock_item",
            Self::System => "system",
        }
    }
}

impl fmt::Display for AuditResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditResourceType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "project" => Ok(Self::Project),
            "customer" => Ok(Self::Customer),
            "phase" => Ok(Self::Phase),
            "project_phase" => Ok(Self::ProjectPhase),
            "project_task" => Ok(Self::ProjectTask),
            "task" => Ok(Self::Task),
            "step" => Ok(Self::Step),
            "location" => Ok(Self::Location),
            "user" | "staff" => Ok(Self::User),
            "stock_item" => Ok(Self::StockItem),
            "system" => Ok(Self::System),
            other => bail!("unknown audit resource type '{other}'"),
        }
    }
}

/// Kind of mutation an audit entry describes.
///
/// Archive is recorded as `Delete` and unarchive as `Update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl AuditAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => bail!("unknown audit action '{other}': expected create, update, or delete"),
        }
    }
}
