//! Query helpers for soft-deletable tables.
//!
//! [`SelectQuery`] is a pure builder: it renders SQL text plus bound
//! parameters and performs no I/O. The archived-row filters
//! ([`without_archived`], [`only_archived`], [`include_archived`]) are plain
//! transformations of a base query; any error surfaces later, from
//! [`fetch_records`] or [`fetch_typed`].
//!
//! Identifiers are always double-quoted, so caller-supplied column names
//! cannot break out of the identifier position.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, params_from_iter};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt::Write as _;

use crate::db::parse_timestamp;
use crate::model::table::SoftDeleteTable;

// ---------------------------------------------------------------------------
// Builder types
// ---------------------------------------------------------------------------

/// Which rows a query returns with respect to `archived_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchivedFilter {
    /// Only active rows (`archived_at IS NULL`).
    #[default]
    Exclude,
    /// Only archived rows (`archived_at IS NOT NULL`).
    Only,
    /// No filter.
    Include,
}

impl std::str::FromStr for ArchivedFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exclude" | "active" | "false" => Ok(Self::Exclude),
            "only" | "archived" => Ok(Self::Only),
            "include" | "all" | "true" => Ok(Self::Include),
            other => anyhow::bail!(
                "unknown archived filter '{other}': expected exclude, only, or include"
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Eq(String, SqlValue),
    NotEq(String, SqlValue),
    In(String, Vec<SqlValue>),
}

/// A `SELECT` against one soft-deletable table.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    table: SoftDeleteTable,
    columns: Vec<String>,
    archived: ArchivedFilter,
    conditions: Vec<Condition>,
    order_by: Vec<(String, SortDirection)>,
    limit: Option<u32>,
    offset: Option<u32>,
}

impl SelectQuery {
    /// Base query: every column, every row, archived or not.
    #[must_use]
    pub const fn from_table(table: SoftDeleteTable) -> Self {
        Self {
            table,
            columns: Vec::new(),
            archived: ArchivedFilter::Include,
            conditions: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    #[must_use]
    pub const fn table(&self) -> SoftDeleteTable {
        self.table
    }

    #[must_use]
    pub const fn archived_filter(&self) -> ArchivedFilter {
        self.archived
    }

    /// Restrict the projection. `id` and `archived_at` are always kept so the
    /// result can be turned into a [`Record`].
    #[must_use]
    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns
            .iter()
            .filter(|c| **c != "*")
            .map(|c| (*c).to_string())
            .collect();
        if !self.columns.is_empty() {
            if !self.columns.iter().any(|c| c == "id") {
                self.columns.insert(0, "id".to_string());
            }
            if !self.columns.iter().any(|c| c == "archived_at") {
                self.columns.push("archived_at".to_string());
            }
        }
        self
    }

    /// Replace the archived-row filter.
    #[must_use]
    pub const fn archived(mut self, filter: ArchivedFilter) -> Self {
        self.archived = filter;
        self
    }

    #[must_use]
    pub fn filter_eq(mut self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.conditions
            .push(Condition::Eq(column.to_string(), value.into()));
        self
    }

    #[must_use]
    pub fn filter_not_eq(mut self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.conditions
            .push(Condition::NotEq(column.to_string(), value.into()));
        self
    }

    /// `column IN (...)`. An empty list matches nothing.
    #[must_use]
    pub fn filter_in<V: Into<SqlValue>>(
        mut self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.conditions.push(Condition::In(
            column.to_string(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    #[must_use]
    pub fn order_by(mut self, column: &str, direction: SortDirection) -> Self {
        self.order_by.push((column.to_string(), direction));
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub const fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Render SQL text with numbered placeholders and the matching values.
    #[must_use]
    pub fn to_sql(&self) -> (String, Vec<SqlValue>) {
        let projection = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<SqlValue> = Vec::new();

        match self.archived {
            ArchivedFilter::Exclude => clauses.push("\"archived_at\" IS NULL".to_string()),
            ArchivedFilter::Only => clauses.push("\"archived_at\" IS NOT NULL".to_string()),
            ArchivedFilter::Include => {}
        }

        for condition in &self.conditions {
            match condition {
                Condition::Eq(column, value) => {
                    values.push(value.clone());
                    clauses.push(format!("{} = ?{}", quote_ident(column), values.len()));
                }
                Condition::NotEq(column, value) => {
                    values.push(value.clone());
                    clauses.push(format!("{} <> ?{}", quote_ident(column), values.len()));
                }
                Condition::In(_, list) if list.is_empty() => clauses.push("0".to_string()),
                Condition::In(column, list) => {
                    let mut placeholders = String::new();
                    for value in list {
                        values.push(value.clone());
                        if !placeholders.is_empty() {
                            placeholders.push_str(", ");
                        }
                        let _ = write!(placeholders, "?{}", values.len());
                    }
                    clauses.push(format!("{} IN ({placeholders})", quote_ident(column)));
                }
            }
        }

        let mut sql = format!(
            "SELECT {projection} FROM {}",
            quote_ident(self.table.as_str())
        );
        if !clauses.is_empty() {
            let _ = write!(sql, " WHERE {}", clauses.join(" AND "));
        }
        if !self.order_by.is_empty() {
            let order = self
                .order_by
                .iter()
                .map(|(column, direction)| {
                    let dir = match direction {
                        SortDirection::Asc => "ASC",
                        SortDirection::Desc => "DESC",
                    };
                    format!("{} {dir}", quote_ident(column))
                })
                .collect::<Vec<_>>()
                .join(", ");
            let _ = write!(sql, " ORDER BY {order}");
        }
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => {
                let _ = write!(sql, " LIMIT {limit} OFFSET {offset}");
            }
            (Some(limit), None) => {
                let _ = write!(sql, " LIMIT {limit}");
            }
            (None, Some(offset)) => {
                let _ = write!(sql, " LIMIT -1 OFFSET {offset}");
            }
            (None, None) => {}
        }

        (sql, values)
    }
}

/// Keep only active rows.
#[must_use]
pub const fn without_archived(query: SelectQuery) -> SelectQuery {
    query.archived(ArchivedFilter::Exclude)
}

/// Keep only archived rows.
#[must_use]
pub const fn only_archived(query: SelectQuery) -> SelectQuery {
    query.archived(ArchivedFilter::Only)
}

/// Identity: archived and active rows alike.
#[must_use]
pub const fn include_archived(query: SelectQuery) -> SelectQuery {
    query
}

/// Base projection over `table`, excluding archived rows unless asked.
#[must_use]
pub fn select_from(table: SoftDeleteTable, columns: &[&str], include: bool) -> SelectQuery {
    let base = SelectQuery::from_table(table).columns(columns);
    if include {
        include_archived(base)
    } else {
        without_archived(base)
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// A row from any soft-deletable table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub id: String,
    pub archived_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    #[must_use]
    pub const fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }
}

/// Execute `query` and return generic records.
///
/// # Errors
///
/// Returns an error if the query fails or a row has no usable `id` or a
/// malformed `archived_at`.
pub fn fetch_records(conn: &Connection, query: &SelectQuery) -> Result<Vec<Record>> {
    let (sql, values) = query.to_sql();
    let mut stmt = conn
        .prepare(&sql)
        .with_context(|| format!("prepare record query: {sql}"))?;
    let names: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();

    let mut rows = stmt
        .query(params_from_iter(values.iter()))
        .with_context(|| format!("execute record query on {}", query.table()))?;

    let mut records = Vec::new();
    while let Some(row) = rows.next().context("read record row")? {
        let mut id = None;
        let mut archived_at = None;
        let mut fields = Map::new();
        for (index, name) in names.iter().enumerate() {
            let value = sql_to_json(row.get_ref(index)?);
            match name.as_str() {
                "id" => id = Some(value),
                "archived_at" => {
                    archived_at = match value {
                        Value::String(raw) => Some(parse_timestamp(&raw)?),
                        _ => None,
                    };
                }
                _ => {
                    fields.insert(name.clone(), value);
                }
            }
        }
        let id = match id {
            Some(Value::String(id)) => id,
            Some(Value::Number(n)) => n.to_string(),
            _ => anyhow::bail!("row from {} has no id column", query.table()),
        };
        records.push(Record {
            id,
            archived_at,
            fields,
        });
    }
    Ok(records)
}

/// Execute `query` and map each row with `map`.
///
/// # Errors
///
/// Returns an error if the query or any row mapping fails.
pub fn fetch_typed<T>(
    conn: &Connection,
    query: &SelectQuery,
    map: impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>> {
    let (sql, values) = query.to_sql();
    let mut stmt = conn
        .prepare(&sql)
        .with_context(|| format!("prepare query: {sql}"))?;
    let rows = stmt
        .query_map(params_from_iter(values.iter()), map)
        .with_context(|| format!("execute query on {}", query.table()))?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.with_context(|| format!("read {} row", query.table()))?);
    }
    Ok(out)
}

/// Count the rows `query` would return.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn count_rows(conn: &Connection, query: &SelectQuery) -> Result<u64> {
    let (sql, values) = query.to_sql();
    let count_sql = format!("SELECT COUNT(*) FROM ({sql})");
    let count: i64 = conn
        .query_row(&count_sql, params_from_iter(values.iter()), |row| row.get(0))
        .with_context(|| format!("count rows in {}", query.table()))?;
    Ok(u64::try_from(count).unwrap_or(0))
}

fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
