//! Session ledger: the check-in cursor and recorded time entries.
//!
//! Every check-in closes the span that started at the previous one. The
//! cursor moves synchronously when an entry is accepted; the write itself
//! runs in the background and its outcome is posted back to the control
//! thread.

mod entry;

pub use entry::{TimeEntry, BREAK_PROJECT, BREAK_TASK};

pub(crate) use entry::CheckInText;

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::clock::Scheduler;
use crate::error::ValidationError;
use crate::storage::{EntityKind, Field, Persistence, Predicate, ProjectRow, Query, Row, TaskRow};

/// Default number of names returned by the project and task listings.
pub const DEFAULT_LIST_LIMIT: usize = 10;

/// Result of a background write, handed to the completion callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved(TimeEntry),
    /// The cursor already moved; the entry is lost.
    Failed { entry: TimeEntry, error: String },
}

impl SaveOutcome {
    pub fn entry(&self) -> &TimeEntry {
        match self {
            SaveOutcome::Saved(entry) | SaveOutcome::Failed { entry, .. } => entry,
        }
    }

    pub fn is_saved(&self) -> bool {
        matches!(self, SaveOutcome::Saved(_))
    }
}

pub struct SessionLedger {
    scheduler: Arc<dyn Scheduler>,
    store: Arc<dyn Persistence>,
    cursor: Mutex<DateTime<Utc>>,
}

impl SessionLedger {
    /// New ledger whose session starts now.
    pub fn new(scheduler: Arc<dyn Scheduler>, store: Arc<dyn Persistence>) -> Self {
        let now = scheduler.now();
        Self::with_cursor(scheduler, store, now)
    }

    /// New ledger resuming a session that started at `cursor`.
    pub fn with_cursor(
        scheduler: Arc<dyn Scheduler>,
        store: Arc<dyn Persistence>,
        cursor: DateTime<Utc>,
    ) -> Self {
        Self {
            scheduler,
            store,
            cursor: Mutex::new(cursor),
        }
    }

    /// Record what the user did since the last check-in.
    ///
    /// Inputs are trimmed; an empty project or task is rejected before the
    /// cursor moves. `on_complete` runs on the control thread once the write
    /// has been attempted, whether or not it succeeded.
    ///
    /// # Errors
    /// Returns a [`ValidationError`] for empty or reserved input.
    pub fn add_entry<F>(
        &self,
        project: &str,
        task: &str,
        notes: &str,
        on_complete: F,
    ) -> Result<TimeEntry, ValidationError>
    where
        F: FnOnce(SaveOutcome) + Send + 'static,
    {
        let text = CheckInText::parse(project, task, notes)?;
        Ok(self.record(text, Box::new(on_complete)))
    }

    /// Record the span since the last check-in as a break.
    pub fn add_break_entry<F>(&self, on_complete: F) -> TimeEntry
    where
        F: FnOnce(SaveOutcome) + Send + 'static,
    {
        self.record(CheckInText::break_entry(), Box::new(on_complete))
    }

    /// Start a new session without recording the time since the last one.
    pub fn skip_session(&self) {
        let now = self.scheduler.now();
        let mut cursor = self.lock_cursor();
        if now > *cursor {
            *cursor = now;
        }
        tracing::info!(cursor = %*cursor, "session skipped");
    }

    pub fn last_check_in(&self) -> DateTime<Utc> {
        *self.lock_cursor()
    }

    /// Entries starting at or after `since`, ordered by start then end.
    pub fn list_entries(&self, since: DateTime<Utc>) -> Vec<TimeEntry> {
        let query = Query::new(EntityKind::Entry)
            .filter(Predicate::AtLeast(Field::From, since))
            .ascending(Field::From)
            .ascending(Field::To);
        self.read(&query)
            .into_iter()
            .filter_map(Row::into_entry)
            .collect()
    }

    /// Most recently used project names, optionally narrowed to a
    /// case-sensitive prefix. An empty prefix matches everything.
    pub fn list_projects(&self, prefix: Option<&str>, limit: usize) -> Vec<String> {
        let mut query = Query::new(EntityKind::Project).filter(Predicate::NotBuiltin);
        if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
            query = query.filter(Predicate::BeginsWith(Field::Name, prefix.to_string()));
        }
        self.read_names(query, limit)
    }

    /// Most recently used task names of `project`.
    pub fn list_tasks(&self, project: &str, prefix: Option<&str>, limit: usize) -> Vec<String> {
        let mut query = Query::new(EntityKind::Task)
            .filter(Predicate::Eq(Field::Project, project.to_string()));
        if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
            query = query.filter(Predicate::BeginsWith(Field::Name, prefix.to_string()));
        }
        self.read_names(query, limit)
    }

    // ── Internals ──

    fn record(&self, text: CheckInText, on_complete: Box<dyn FnOnce(SaveOutcome) + Send>) -> TimeEntry {
        let now = self.scheduler.now();
        let entry = {
            let mut cursor = self.lock_cursor();
            let from = *cursor;
            let to = now.max(from);
            *cursor = to;
            TimeEntry {
                from,
                to,
                project: text.project,
                task: text.task,
                notes: text.notes,
            }
        };
        tracing::info!(
            project = %entry.project.escape_debug(),
            task = %entry.task,
            from = %entry.from,
            to = %entry.to,
            "entry recorded"
        );

        let task_row = TaskRow {
            name: entry.task.clone(),
            project: entry.project.clone(),
            last_used: entry.to,
        };
        let project_row = ProjectRow {
            name: entry.project.clone(),
            last_used: entry.to,
        };
        let store = Arc::clone(&self.store);
        let scheduler = Arc::clone(&self.scheduler);
        let pending = entry.clone();
        self.scheduler.background(Box::new(move || {
            let outcome = match store.save(&pending, &task_row, &project_row) {
                Ok(()) => SaveOutcome::Saved(pending),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to save entry");
                    SaveOutcome::Failed {
                        entry: pending,
                        error: e.to_string(),
                    }
                }
            };
            scheduler.post(Box::new(move || on_complete(outcome)));
        }));

        entry
    }

    fn read_names(&self, query: Query, limit: usize) -> Vec<String> {
        let query = query
            .descending(Field::LastUsed)
            .ascending(Field::Name)
            .limit(limit);
        self.read(&query)
            .into_iter()
            .filter_map(Row::into_name)
            .collect()
    }

    fn read(&self, query: &Query) -> Vec<Row> {
        self.store.query(query).unwrap_or_else(|e| {
            tracing::warn!(error = %e, kind = ?query.kind, "query failed");
            Vec::new()
        })
    }

    fn lock_cursor(&self) -> MutexGuard<'_, DateTime<Utc>> {
        self.cursor.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
