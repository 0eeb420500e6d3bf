//! Report aggregation over recorded entries.
//!
//! [`group`] nests entries by project then task without merging anything;
//! [`Report::build`] turns that into a display view ordered by time spent.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use serde::{Serialize, Serializer};

use crate::ledger::TimeEntry;
use crate::timeutil::{format_clock, format_duration, resolve_local};

/// Entries of one project, keyed by task.
pub type TaskGroups = BTreeMap<String, Vec<TimeEntry>>;

/// All entries keyed by project then task.
pub type ProjectGroups = BTreeMap<String, TaskGroups>;

/// Label used for break time in rendered reports.
pub const BREAK_LABEL: &str = "(break)";

/// Nest entries by project and task.
///
/// Every entry lands exactly once under its own keys. Each innermost list is
/// sorted by the entry ordering (project, task, notes, from, to).
pub fn group(entries: impl IntoIterator<Item = TimeEntry>) -> ProjectGroups {
    let mut groups = ProjectGroups::new();
    for entry in entries {
        groups
            .entry(entry.project.clone())
            .or_default()
            .entry(entry.task.clone())
            .or_default()
            .push(entry);
    }
    for tasks in groups.values_mut() {
        for list in tasks.values_mut() {
            list.sort();
        }
    }
    groups
}

pub fn total_duration(entries: &[TimeEntry]) -> Duration {
    entries
        .iter()
        .fold(Duration::zero(), |acc, entry| acc + entry.duration())
}

/// Total over every task of one project.
pub fn tasks_total(tasks: &TaskGroups) -> Duration {
    tasks
        .values()
        .fold(Duration::zero(), |acc, list| acc + total_duration(list))
}

/// Total over every project.
pub fn projects_total(projects: &ProjectGroups) -> Duration {
    projects
        .values()
        .fold(Duration::zero(), |acc, tasks| acc + tasks_total(tasks))
}

/// Where the daily report starts by default: this morning at `day_start`
/// local time, or yesterday's if that is still ahead of `now`.
pub fn default_report_start<Tz: TimeZone>(
    now: DateTime<Utc>,
    zone: Tz,
    day_start: NaiveTime,
) -> DateTime<Utc> {
    let today = now.with_timezone(&zone).date_naive();
    let this_morning =
        resolve_local(&zone, today.and_time(day_start)).unwrap_or(now - Duration::days(1));
    if this_morning > now {
        let yesterday = today - Duration::days(1);
        resolve_local(&zone, yesterday.and_time(day_start))
            .unwrap_or(this_morning - Duration::days(1))
    } else {
        this_morning
    }
}

fn as_seconds<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_i64(duration.num_seconds())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSummary {
    pub name: String,
    #[serde(rename = "total_seconds", serialize_with = "as_seconds")]
    pub total: Duration,
    pub entries: Vec<TimeEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectSummary {
    pub name: String,
    pub is_break: bool,
    #[serde(rename = "total_seconds", serialize_with = "as_seconds")]
    pub total: Duration,
    pub tasks: Vec<TaskSummary>,
}

/// Display view of a set of entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    #[serde(rename = "total_seconds", serialize_with = "as_seconds")]
    pub total: Duration,
    pub projects: Vec<ProjectSummary>,
}

impl Report {
    /// Projects and their tasks are ordered by total time, longest first,
    /// ties broken by name.
    pub fn build(entries: impl IntoIterator<Item = TimeEntry>) -> Self {
        let grouped = group(entries);
        let total = projects_total(&grouped);

        let mut projects: Vec<ProjectSummary> = grouped
            .into_iter()
            .map(|(name, tasks)| {
                let mut tasks: Vec<TaskSummary> = tasks
                    .into_iter()
                    .map(|(name, entries)| TaskSummary {
                        name,
                        total: total_duration(&entries),
                        entries,
                    })
                    .collect();
                tasks.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.name.cmp(&b.name)));

                let total = tasks.iter().fold(Duration::zero(), |acc, t| acc + t.total);
                let is_break = tasks
                    .first()
                    .and_then(|t| t.entries.first())
                    .is_some_and(TimeEntry::is_break);
                ProjectSummary {
                    name,
                    is_break,
                    total,
                    tasks,
                }
            })
            .collect();
        projects.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.name.cmp(&b.name)));

        Self { total, projects }
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    /// Plain-text rendering with local clock times.
    pub fn render_text<Tz: TimeZone>(&self, zone: Tz) -> String {
        if self.is_empty() {
            return "No entries.\n".to_string();
        }

        let mut out = String::new();
        let _ = writeln!(out, "Total: {}", format_duration(self.total));
        for project in &self.projects {
            let name = if project.is_break {
                BREAK_LABEL
            } else {
                project.name.as_str()
            };
            let _ = writeln!(out, "\n{name}  {}", format_duration(project.total));
            for task in &project.tasks {
                let _ = writeln!(out, "  {}  {}", task.name, format_duration(task.total));
                for entry in &task.entries {
                    let _ = writeln!(
                        out,
                        "    {} - {}: {}",
                        format_clock(entry.from, zone.clone()),
                        format_clock(entry.to, zone.clone()),
                        entry.notes.as_deref().unwrap_or("(no notes entered)")
                    );
                }
            }
        }
        out
    }
}
