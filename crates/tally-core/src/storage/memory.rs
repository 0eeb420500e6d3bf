//! In-memory store.
//!
//! Satisfies the same contract as [`super::SqliteStore`]; failures can be
//! switched on to exercise the ledger's fail-soft paths.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::query::{ProjectRow, Query, Row, TaskRow};
use super::Persistence;
use crate::error::DatabaseError;
use crate::ledger::TimeEntry;

#[derive(Default)]
struct Tables {
    projects: BTreeMap<String, ProjectRow>,
    tasks: BTreeMap<(String, String), TaskRow>,
    entries: Vec<TimeEntry>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Every entry saved so far, in save order.
    pub fn entries(&self) -> Vec<TimeEntry> {
        self.lock().entries.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Persistence for MemoryStore {
    fn save(
        &self,
        entry: &TimeEntry,
        task: &TaskRow,
        project: &ProjectRow,
    ) -> Result<(), DatabaseError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DatabaseError::WriteFailed("injected write failure".into()));
        }
        let mut tables = self.lock();

        let stored = tables
            .projects
            .entry(project.name.clone())
            .or_insert_with(|| project.clone());
        stored.last_used = stored.last_used.max(project.last_used);

        let stored = tables
            .tasks
            .entry((task.project.clone(), task.name.clone()))
            .or_insert_with(|| task.clone());
        stored.last_used = stored.last_used.max(task.last_used);

        tables.entries.push(entry.clone());
        Ok(())
    }

    fn query(&self, query: &Query) -> Result<Vec<Row>, DatabaseError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(DatabaseError::QueryFailed("injected read failure".into()));
        }
        let tables = self.lock();
        let rows = tables
            .projects
            .values()
            .cloned()
            .map(Row::Project)
            .chain(tables.tasks.values().cloned().map(Row::Task))
            .chain(tables.entries.iter().cloned().map(Row::Entry));
        Ok(query.apply(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::query::EntityKind;
    use chrono::{TimeZone, Utc};

    #[test]
    fn poisoned_tables_are_still_usable() {
        let store = MemoryStore::new();
        let at = Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap();
        let entry = TimeEntry::new(at, at, "p", "t", None).unwrap();
        let task = TaskRow {
            name: "t".into(),
            project: "p".into(),
            last_used: at,
        };
        let project = ProjectRow {
            name: "p".into(),
            last_used: at,
        };

        let panicked = std::thread::scope(|s| {
            s.spawn(|| {
                let _tables = store.lock();
                panic!("callback failed mid-write");
            })
            .join()
        });
        assert!(panicked.is_err());
        assert!(store.tables.is_poisoned());

        store.save(&entry, &task, &project).unwrap();
        assert_eq!(store.entries(), vec![entry]);
        assert_eq!(
            store.query(&Query::new(EntityKind::Project)).unwrap(),
            vec![Row::Project(project)]
        );
    }
}
