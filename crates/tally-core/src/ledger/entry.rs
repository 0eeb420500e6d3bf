use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Reserved project for break entries. Never listed as a user project, and
/// the leading NUL keeps it out of reach of anything typed into a prompt.
pub const BREAK_PROJECT: &str = "\u{0}__break";

/// Task name used for every break entry.
pub const BREAK_TASK: &str = "break";

/// One recorded check-in: what the user did between `from` and `to`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeEntry {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub project: String,
    pub task: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl TimeEntry {
    /// Build an entry, rejecting inverted time ranges.
    pub fn new(
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        project: impl Into<String>,
        task: impl Into<String>,
        notes: Option<String>,
    ) -> Result<Self, ValidationError> {
        if to < from {
            return Err(ValidationError::InvalidTimeRange { start: from, end: to });
        }
        Ok(Self {
            from,
            to,
            project: project.into(),
            task: task.into(),
            notes,
        })
    }

    pub fn duration(&self) -> Duration {
        self.to - self.from
    }

    pub fn is_break(&self) -> bool {
        self.project == BREAK_PROJECT
    }

    fn sort_key(&self) -> (&str, &str, Option<&str>, DateTime<Utc>, DateTime<Utc>) {
        (
            &self.project,
            &self.task,
            self.notes.as_deref(),
            self.from,
            self.to,
        )
    }
}

/// Lexicographic over (project, task, notes, from, to); absent notes sort
/// before present ones.
impl Ord for TimeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for TimeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Trimmed, validated check-in text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CheckInText {
    pub project: String,
    pub task: String,
    pub notes: Option<String>,
}

impl CheckInText {
    /// Validate user-supplied text. Empty notes become `None`.
    pub fn parse(project: &str, task: &str, notes: &str) -> Result<Self, ValidationError> {
        let project = project.trim();
        let task = task.trim();
        let notes = notes.trim();

        if project.is_empty() {
            return Err(ValidationError::Empty { field: "project" });
        }
        if project == BREAK_PROJECT {
            return Err(ValidationError::Reserved {
                field: "project",
                value: project.to_string(),
            });
        }
        if task.is_empty() {
            return Err(ValidationError::Empty { field: "task" });
        }

        Ok(Self {
            project: project.to_string(),
            task: task.to_string(),
            notes: (!notes.is_empty()).then(|| notes.to_string()),
        })
    }

    pub fn break_entry() -> Self {
        Self {
            project: BREAK_PROJECT.to_string(),
            task: BREAK_TASK.to_string(),
            notes: None,
        }
    }
}
