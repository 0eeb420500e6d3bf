//! Backend-neutral query description.
//!
//! The ledger only ever asks for a handful of shapes (recent projects by
//! prefix, recent tasks of a project, entries since a time). They are
//! expressed here once and each store either evaluates them directly
//! ([`Predicate::matches`], [`Query::compare`]) or compiles them to SQL.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::{TimeEntry, BREAK_PROJECT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Project,
    Task,
    Entry,
}

/// Queryable attributes. Not every field exists on every kind; a missing
/// field never matches a predicate and sorts as absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// Own name of a project or task
    Name,
    /// Owning project name (a project's own name for projects)
    Project,
    /// Task name of an entry
    Task,
    Notes,
    LastUsed,
    From,
    To,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    All,
    Eq(Field, String),
    BeginsWith(Field, String),
    AtLeast(Field, DateTime<Utc>),
    /// Excludes the reserved break project
    NotBuiltin,
    And(Vec<Predicate>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: Field,
    pub ascending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub kind: EntityKind,
    pub predicate: Predicate,
    pub sort: Vec<SortKey>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRow {
    pub name: String,
    pub last_used: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRow {
    pub name: String,
    pub project: String,
    pub last_used: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Row {
    Project(ProjectRow),
    Task(TaskRow),
    Entry(TimeEntry),
}

impl Query {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            predicate: Predicate::All,
            sort: Vec::new(),
            limit: None,
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = match self.predicate {
            Predicate::All => predicate,
            Predicate::And(mut all) => {
                all.push(predicate);
                Predicate::And(all)
            }
            existing => Predicate::And(vec![existing, predicate]),
        };
        self
    }

    pub fn ascending(mut self, field: Field) -> Self {
        self.sort.push(SortKey { field, ascending: true });
        self
    }

    pub fn descending(mut self, field: Field) -> Self {
        self.sort.push(SortKey { field, ascending: false });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Order two rows by this query's sort keys.
    pub fn compare(&self, a: &Row, b: &Row) -> Ordering {
        for key in &self.sort {
            let ord = match (a.time(key.field), b.time(key.field)) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => a.text(key.field).cmp(&b.text(key.field)),
            };
            let ord = if key.ascending { ord } else { ord.reverse() };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Evaluate in memory: filter, sort, then truncate.
    pub fn apply(&self, rows: impl IntoIterator<Item = Row>) -> Vec<Row> {
        let mut rows: Vec<Row> = rows
            .into_iter()
            .filter(|row| row.kind() == self.kind && self.predicate.matches(row))
            .collect();
        rows.sort_by(|a, b| self.compare(a, b));
        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }
        rows
    }
}

impl Predicate {
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Predicate::All => true,
            Predicate::Eq(field, value) => row.text(*field) == Some(value.as_str()),
            Predicate::BeginsWith(field, prefix) => row
                .text(*field)
                .is_some_and(|text| text.starts_with(prefix.as_str())),
            Predicate::AtLeast(field, min) => row.time(*field).is_some_and(|t| t >= *min),
            Predicate::NotBuiltin => row.text(Field::Project) != Some(BREAK_PROJECT),
            Predicate::And(all) => all.iter().all(|p| p.matches(row)),
        }
    }
}

impl Row {
    pub fn kind(&self) -> EntityKind {
        match self {
            Row::Project(_) => EntityKind::Project,
            Row::Task(_) => EntityKind::Task,
            Row::Entry(_) => EntityKind::Entry,
        }
    }

    pub fn text(&self, field: Field) -> Option<&str> {
        match (self, field) {
            (Row::Project(p), Field::Name | Field::Project) => Some(&p.name),
            (Row::Task(t), Field::Name) => Some(&t.name),
            (Row::Task(t), Field::Project) => Some(&t.project),
            (Row::Entry(e), Field::Project) => Some(&e.project),
            (Row::Entry(e), Field::Task) => Some(&e.task),
            (Row::Entry(e), Field::Notes) => e.notes.as_deref(),
            _ => None,
        }
    }

    pub fn time(&self, field: Field) -> Option<DateTime<Utc>> {
        match (self, field) {
            (Row::Project(p), Field::LastUsed) => Some(p.last_used),
            (Row::Task(t), Field::LastUsed) => Some(t.last_used),
            (Row::Entry(e), Field::From) => Some(e.from),
            (Row::Entry(e), Field::To) => Some(e.to),
            _ => None,
        }
    }

    /// Name of a project or task row.
    pub fn into_name(self) -> Option<String> {
        match self {
            Row::Project(p) => Some(p.name),
            Row::Task(t) => Some(t.name),
            Row::Entry(_) => None,
        }
    }

    pub fn into_entry(self) -> Option<TimeEntry> {
        match self {
            Row::Entry(e) => Some(e),
            _ => None,
        }
    }
}
