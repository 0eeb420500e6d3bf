pub mod checkin;
pub mod config;
pub mod projects;
pub mod report;
pub mod status;
pub mod watch;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tally_core::{Clock, Config, ManualScheduler, PromptContent, PromptView, SqliteStore, Tracker};

/// One-shot commands never show a prompt.
struct Headless;

impl PromptView for Headless {
    fn show_prompt(&self, _content: PromptContent) {}
    fn hide_prompt(&self) {}
    fn focus(&self) {}
    fn show_new_session_prompt(&self) {}
}

/// A tracker resumed from the stored cursor for the length of one command.
///
/// Runs on a manual clock pinned to the moment the command started, so
/// background writes complete when [`Session::finish`] drains the queue.
pub struct Session {
    pub tracker: Tracker,
    scheduler: Arc<ManualScheduler>,
    store: Arc<SqliteStore>,
}

impl Session {
    pub fn open() -> Result<Self, Box<dyn std::error::Error>> {
        let config = Config::load()?;
        let store = Arc::new(SqliteStore::open()?);
        let now = Utc::now();
        let cursor = store.load_cursor()?.unwrap_or(now);
        let scheduler = Arc::new(ManualScheduler::new(now));
        let tracker = Tracker::resume(
            config,
            scheduler.clone(),
            store.clone(),
            Arc::new(Headless),
            cursor,
        )?;
        Ok(Self {
            tracker,
            scheduler,
            store,
        })
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.scheduler.now()
    }

    pub fn config(&self) -> &Config {
        self.tracker.config()
    }

    /// Complete pending writes and persist the cursor.
    pub fn finish(self) -> Result<(), Box<dyn std::error::Error>> {
        self.scheduler.run_pending();
        self.store.store_cursor(self.tracker.last_check_in())?;
        Ok(())
    }
}
