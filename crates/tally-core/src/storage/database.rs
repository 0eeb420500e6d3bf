//! SQLite-backed persistence.
//!
//! Provides durable storage for:
//! - Check-in entries, with their projects and tasks
//! - A key-value store for application state (the session cursor)

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use super::data_dir;
use super::migrations;
use super::query::{EntityKind, Field, Predicate, ProjectRow, Query, Row, TaskRow};
use super::Persistence;
use crate::error::{CoreError, DatabaseError};
use crate::ledger::{TimeEntry, BREAK_PROJECT};

const CURSOR_KEY: &str = "last_check_in";

/// SQLite database for check-in storage.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open the database at `<data_dir>/tally.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the data directory or database cannot be opened,
    /// or if migration fails.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join("tally.db");
        Ok(Self::open_at(&path)?)
    }

    pub fn open_at(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, DatabaseError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, DatabaseError> {
        migrations::migrate(&conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let conn = self.conn();
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.conn().execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Session cursor saved by a previous process, if any.
    pub fn load_cursor(&self) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        self.kv_get(CURSOR_KEY)?
            .map(|raw| decode_time("kv.value", &raw))
            .transpose()
    }

    pub fn store_cursor(&self, cursor: DateTime<Utc>) -> Result<(), DatabaseError> {
        self.kv_set(CURSOR_KEY, &encode_time(cursor))
    }
}

impl Persistence for SqliteStore {
    fn save(
        &self,
        entry: &TimeEntry,
        task: &TaskRow,
        project: &ProjectRow,
    ) -> Result<(), DatabaseError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO projects (name, last_used) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET last_used = max(last_used, excluded.last_used)",
            params![project.name, encode_time(project.last_used)],
        )?;
        tx.execute(
            "INSERT INTO tasks (project, name, last_used) VALUES (?1, ?2, ?3)
             ON CONFLICT(project, name) DO UPDATE SET last_used = max(last_used, excluded.last_used)",
            params![task.project, task.name, encode_time(task.last_used)],
        )?;
        tx.execute(
            "INSERT INTO entries (project, task, notes, started_at, ended_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.project,
                entry.task,
                entry.notes,
                encode_time(entry.from),
                encode_time(entry.to),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn query(&self, query: &Query) -> Result<Vec<Row>, DatabaseError> {
        let (sql, args) = compile(query);
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let raw = stmt.query_map(params_from_iter(args.iter()), |row| {
            Ok(match query.kind {
                EntityKind::Project => RawRow::Project {
                    name: row.get(0)?,
                    last_used: row.get(1)?,
                },
                EntityKind::Task => RawRow::Task {
                    project: row.get(0)?,
                    name: row.get(1)?,
                    last_used: row.get(2)?,
                },
                EntityKind::Entry => RawRow::Entry {
                    project: row.get(0)?,
                    task: row.get(1)?,
                    notes: row.get(2)?,
                    from: row.get(3)?,
                    to: row.get(4)?,
                },
            })
        })?;

        let mut rows = Vec::new();
        for row in raw {
            rows.push(row?.decode()?);
        }
        Ok(rows)
    }
}

/// Row as stored, before timestamp decoding.
enum RawRow {
    Project {
        name: String,
        last_used: String,
    },
    Task {
        project: String,
        name: String,
        last_used: String,
    },
    Entry {
        project: String,
        task: String,
        notes: Option<String>,
        from: String,
        to: String,
    },
}

impl RawRow {
    fn decode(self) -> Result<Row, DatabaseError> {
        Ok(match self {
            RawRow::Project { name, last_used } => Row::Project(ProjectRow {
                name,
                last_used: decode_time("projects.last_used", &last_used)?,
            }),
            RawRow::Task {
                project,
                name,
                last_used,
            } => Row::Task(TaskRow {
                name,
                project,
                last_used: decode_time("tasks.last_used", &last_used)?,
            }),
            RawRow::Entry {
                project,
                task,
                notes,
                from,
                to,
            } => Row::Entry(TimeEntry {
                from: decode_time("entries.started_at", &from)?,
                to: decode_time("entries.ended_at", &to)?,
                project,
                task,
                notes,
            }),
        })
    }
}

fn table(kind: EntityKind) -> (&'static str, &'static str) {
    match kind {
        EntityKind::Project => ("projects", "name, last_used"),
        EntityKind::Task => ("tasks", "project, name, last_used"),
        EntityKind::Entry => ("entries", "project, task, notes, started_at, ended_at"),
    }
}

fn column(kind: EntityKind, field: Field) -> Option<&'static str> {
    match (kind, field) {
        (EntityKind::Project, Field::Name | Field::Project) => Some("name"),
        (EntityKind::Project, Field::LastUsed) => Some("last_used"),
        (EntityKind::Task, Field::Name) => Some("name"),
        (EntityKind::Task, Field::Project) => Some("project"),
        (EntityKind::Task, Field::LastUsed) => Some("last_used"),
        (EntityKind::Entry, Field::Project) => Some("project"),
        (EntityKind::Entry, Field::Task) => Some("task"),
        (EntityKind::Entry, Field::Notes) => Some("notes"),
        (EntityKind::Entry, Field::From) => Some("started_at"),
        (EntityKind::Entry, Field::To) => Some("ended_at"),
        _ => None,
    }
}

/// Translate a [`Query`] into SQL plus positional arguments.
fn compile(query: &Query) -> (String, Vec<String>) {
    let (table, columns) = table(query.kind);
    let mut args = Vec::new();
    let clause = predicate_sql(query.kind, &query.predicate, &mut args);
    let mut sql = format!("SELECT {columns} FROM {table} WHERE {clause}");

    let order: Vec<String> = query
        .sort
        .iter()
        .filter_map(|key| {
            column(query.kind, key.field)
                .map(|col| format!("{col} {}", if key.ascending { "ASC" } else { "DESC" }))
        })
        .collect();
    if !order.is_empty() {
        sql.push_str(" ORDER BY ");
        sql.push_str(&order.join(", "));
    }
    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    (sql, args)
}

fn predicate_sql(kind: EntityKind, predicate: &Predicate, args: &mut Vec<String>) -> String {
    match predicate {
        Predicate::All => "1".to_string(),
        Predicate::Eq(field, value) => match column(kind, *field) {
            Some(col) => {
                args.push(value.clone());
                format!("{col} = ?{}", args.len())
            }
            None => "0".to_string(),
        },
        // substr keeps the comparison case-sensitive, unlike LIKE
        Predicate::BeginsWith(field, prefix) => match column(kind, *field) {
            Some(col) => {
                args.push(prefix.clone());
                let n = args.len();
                format!("substr({col}, 1, length(?{n})) = ?{n}")
            }
            None => "0".to_string(),
        },
        Predicate::AtLeast(field, min) => match column(kind, *field) {
            Some(col) => {
                args.push(encode_time(*min));
                format!("{col} >= ?{}", args.len())
            }
            None => "0".to_string(),
        },
        Predicate::NotBuiltin => match column(kind, Field::Project) {
            Some(col) => {
                args.push(BREAK_PROJECT.to_string());
                format!("{col} != ?{}", args.len())
            }
            None => "1".to_string(),
        },
        Predicate::And(all) if all.is_empty() => "1".to_string(),
        Predicate::And(all) => {
            let parts: Vec<String> = all
                .iter()
                .map(|p| format!("({})", predicate_sql(kind, p, args)))
                .collect();
            parts.join(" AND ")
        }
    }
}

fn encode_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_time(column: &str, raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| DatabaseError::Corrupt {
            column: column.to_string(),
            value: raw.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, h, m, 0).unwrap()
    }

    fn save(store: &SqliteStore, project: &str, task: &str, from: DateTime<Utc>, to: DateTime<Utc>) {
        let entry = TimeEntry::new(from, to, project, task, None).unwrap();
        store
            .save(
                &entry,
                &TaskRow {
                    name: task.into(),
                    project: project.into(),
                    last_used: to,
                },
                &ProjectRow {
                    name: project.into(),
                    last_used: to,
                },
            )
            .unwrap();
    }

    #[test]
    fn compile_builds_numbered_placeholders() {
        let q = Query::new(EntityKind::Task)
            .filter(Predicate::Eq(Field::Project, "p".into()))
            .filter(Predicate::BeginsWith(Field::Name, "t".into()))
            .descending(Field::LastUsed)
            .ascending(Field::Name)
            .limit(10);
        let (sql, args) = compile(&q);
        assert_eq!(
            sql,
            "SELECT project, name, last_used FROM tasks WHERE (project = ?1) AND \
             (substr(name, 1, length(?2)) = ?2) ORDER BY last_used DESC, name ASC LIMIT 10"
        );
        assert_eq!(args, vec!["p".to_string(), "t".to_string()]);
    }

    #[test]
    fn last_used_only_moves_forward() {
        let store = SqliteStore::open_memory().unwrap();
        save(&store, "p", "t", at(10, 0), at(11, 0));
        save(&store, "p", "t", at(9, 0), at(9, 30));

        let rows = store.query(&Query::new(EntityKind::Project)).unwrap();
        assert_eq!(
            rows,
            vec![Row::Project(ProjectRow {
                name: "p".into(),
                last_used: at(11, 0)
            })]
        );
    }

    #[test]
    fn store_keeps_working_after_a_panic_while_locked() {
        let store = SqliteStore::open_memory().unwrap();
        save(&store, "p", "t", at(9, 0), at(9, 30));

        let panicked = std::thread::scope(|s| {
            s.spawn(|| {
                let _conn = store.conn();
                panic!("callback failed mid-write");
            })
            .join()
        });
        assert!(panicked.is_err());
        assert!(store.conn.is_poisoned());

        save(&store, "p", "t", at(9, 30), at(10, 0));
        store.store_cursor(at(10, 0)).unwrap();
        assert_eq!(store.load_cursor().unwrap(), Some(at(10, 0)));
        assert_eq!(store.query(&Query::new(EntityKind::Entry)).unwrap().len(), 2);
    }

    #[test]
    fn begins_with_is_case_sensitive() {
        let store = SqliteStore::open_memory().unwrap();
        save(&store, "Pro", "t", at(9, 0), at(9, 10));
        save(&store, "pro", "t", at(9, 10), at(9, 20));

        let q = Query::new(EntityKind::Project).filter(Predicate::BeginsWith(Field::Name, "P".into()));
        let names: Vec<String> = store
            .query(&q)
            .unwrap()
            .into_iter()
            .filter_map(Row::into_name)
            .collect();
        assert_eq!(names, vec!["Pro"]);
    }

    #[test]
    fn entries_round_trip_with_sub_second_precision() {
        let store = SqliteStore::open_memory().unwrap();
        let from = at(9, 0) + Duration::nanoseconds(123_456_789);
        save(&store, "p", "t", from, at(9, 5));

        let q = Query::new(EntityKind::Entry).filter(Predicate::AtLeast(Field::From, from));
        let entries: Vec<TimeEntry> = store
            .query(&q)
            .unwrap()
            .into_iter()
            .filter_map(Row::into_entry)
            .collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].from, from);
    }

    #[test]
    fn cursor_round_trips_through_kv() {
        let store = SqliteStore::open_memory().unwrap();
        assert_eq!(store.load_cursor().unwrap(), None);
        store.store_cursor(at(12, 34)).unwrap();
        assert_eq!(store.load_cursor().unwrap(), Some(at(12, 34)));
    }
}
