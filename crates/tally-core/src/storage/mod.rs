mod config;
pub mod database;
mod memory;
pub mod migrations;
pub mod query;

pub use config::{Config, DailySummaryConfig, ReminderConfig, ReportConfig, SnoozeConfig};
pub use database::SqliteStore;
pub use memory::MemoryStore;
pub use query::{EntityKind, Field, Predicate, ProjectRow, Query, Row, SortKey, TaskRow};

use std::path::PathBuf;

use crate::error::{ConfigError, DatabaseError};
use crate::ledger::TimeEntry;

/// What the ledger needs from durable storage.
///
/// Implementations are called from the background side of the scheduler for
/// writes and from the control thread for reads, so they must be `Sync`.
pub trait Persistence: Send + Sync {
    /// Store `entry` and upsert its task and project, moving `last_used`
    /// forward only.
    fn save(
        &self,
        entry: &TimeEntry,
        task: &TaskRow,
        project: &ProjectRow,
    ) -> Result<(), DatabaseError>;

    fn query(&self, query: &Query) -> Result<Vec<Row>, DatabaseError>;
}

/// Returns the data directory, creating it if needed.
///
/// `TALLY_DATA_DIR` wins outright; otherwise `~/.config/tally[-dev]/`
/// depending on `TALLY_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("TALLY_DATA_DIR") {
        Some(explicit) => PathBuf::from(explicit),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("TALLY_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("tally-dev")
            } else {
                base_dir.join("tally")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
