//! The application context.
//!
//! A [`Tracker`] owns the ledger, the reminder driver and the controller and
//! wires them together. Front ends construct one and pass it around; nothing
//! in the crate is reachable through a global.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, NaiveTime, Utc};

use crate::clock::Scheduler;
use crate::controller::{Policy, ReminderController, SessionChoice};
use crate::error::{ConfigError, TransitionError, ValidationError};
use crate::ledger::{SaveOutcome, SessionLedger, TimeEntry, DEFAULT_LIST_LIMIT};
use crate::reminder::{CloseOutcome, OpenReason, PromptContent, PromptView, ReminderState, Reminders};
use crate::report::{default_report_start, Report};
use crate::storage::{Config, Persistence};
use crate::timeutil::{snooze_options, SnoozeOptions};

pub type DeactivationHook = Box<dyn FnOnce() + Send>;

/// One-shot callbacks run when the app loses focus.
#[derive(Default)]
pub struct DeactivationHooks {
    hooks: Mutex<Vec<DeactivationHook>>,
}

impl DeactivationHooks {
    pub fn push<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.lock().push(Box::new(hook));
    }

    /// Swap the list for an empty one and return what was registered.
    pub fn take_all(&self) -> Vec<DeactivationHook> {
        std::mem::take(&mut *self.lock())
    }

    /// Run every registered hook once. Hooks registered while these run are
    /// kept for the next deactivation.
    pub fn run_all(&self) {
        for hook in self.take_all() {
            hook();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Vec<DeactivationHook>> {
        self.hooks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct Tracker {
    config: Config,
    report_day_start: NaiveTime,
    scheduler: Arc<dyn Scheduler>,
    ledger: Arc<SessionLedger>,
    reminders: Arc<Reminders>,
    controller: Arc<ReminderController>,
    deactivation: DeactivationHooks,
}

impl Tracker {
    /// Build a tracker whose session starts now.
    ///
    /// # Errors
    /// Returns an error if the configuration does not validate.
    pub fn new(
        config: Config,
        scheduler: Arc<dyn Scheduler>,
        store: Arc<dyn Persistence>,
        view: Arc<dyn PromptView>,
    ) -> Result<Self, ConfigError> {
        let ledger = Arc::new(SessionLedger::new(scheduler.clone(), store));
        Self::with_ledger(config, scheduler, ledger, view, None)
    }

    /// Build a tracker continuing a session that started at `cursor`.
    ///
    /// # Errors
    /// Returns an error if the configuration does not validate.
    pub fn resume(
        config: Config,
        scheduler: Arc<dyn Scheduler>,
        store: Arc<dyn Persistence>,
        view: Arc<dyn PromptView>,
        cursor: DateTime<Utc>,
    ) -> Result<Self, ConfigError> {
        let ledger = Arc::new(SessionLedger::with_cursor(scheduler.clone(), store, cursor));
        Self::with_ledger(config, scheduler, ledger, view, None)
    }

    /// Like [`Tracker::new`] with a fixed jitter seed.
    ///
    /// # Errors
    /// Returns an error if the configuration does not validate.
    pub fn with_seed(
        config: Config,
        scheduler: Arc<dyn Scheduler>,
        store: Arc<dyn Persistence>,
        view: Arc<dyn PromptView>,
        seed: u64,
    ) -> Result<Self, ConfigError> {
        let ledger = Arc::new(SessionLedger::new(scheduler.clone(), store));
        Self::with_ledger(config, scheduler, ledger, view, Some(seed))
    }

    fn with_ledger(
        config: Config,
        scheduler: Arc<dyn Scheduler>,
        ledger: Arc<SessionLedger>,
        view: Arc<dyn PromptView>,
        seed: Option<u64>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let policy = Policy::from_config(&config)?;
        let report_day_start = config.report.day_start_time()?;

        let reminders = Reminders::new(scheduler.clone(), view.clone());
        let controller = match seed {
            Some(seed) => ReminderController::with_seed(
                policy,
                scheduler.clone(),
                ledger.clone(),
                reminders.clone(),
                view,
                seed,
            ),
            None => ReminderController::new(
                policy,
                scheduler.clone(),
                ledger.clone(),
                reminders.clone(),
                view,
            ),
        };

        Ok(Self {
            config,
            report_day_start,
            scheduler,
            ledger,
            reminders,
            controller,
            deactivation: DeactivationHooks::default(),
        })
    }

    /// Arm the reminder policies.
    pub fn start(&self) {
        tracing::info!(cursor = %self.ledger.last_check_in(), "tracker started");
        self.controller.start();
    }

    pub fn stop(&self) {
        self.controller.stop();
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current time on the tracker's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.scheduler.now()
    }

    pub fn ledger(&self) -> &Arc<SessionLedger> {
        &self.ledger
    }

    pub fn reminders(&self) -> &Arc<Reminders> {
        &self.reminders
    }

    pub fn controller(&self) -> &Arc<ReminderController> {
        &self.controller
    }

    // ── Check-ins ──

    /// Record a check-in. Once the write has been attempted, the periodic
    /// prompt restarts, the prompt closes and `on_complete` runs.
    ///
    /// # Errors
    /// Returns a [`ValidationError`] for empty or reserved input; nothing
    /// changes in that case.
    pub fn check_in<F>(
        &self,
        project: &str,
        task: &str,
        notes: &str,
        on_complete: F,
    ) -> Result<TimeEntry, ValidationError>
    where
        F: FnOnce(&SaveOutcome) + Send + 'static,
    {
        let after = self.after_save(on_complete);
        self.ledger.add_entry(project, task, notes, after)
    }

    /// Record the time since the last check-in as a break.
    pub fn take_break<F>(&self, on_complete: F) -> TimeEntry
    where
        F: FnOnce(&SaveOutcome) + Send + 'static,
    {
        let after = self.after_save(on_complete);
        self.ledger.add_break_entry(after)
    }

    /// Drop the time since the last check-in and close the prompt.
    pub fn skip_session(&self) {
        self.ledger.skip_session();
        self.close_if_open();
    }

    pub fn last_check_in(&self) -> DateTime<Utc> {
        self.ledger.last_check_in()
    }

    fn after_save<F>(&self, on_complete: F) -> impl FnOnce(SaveOutcome) + Send + 'static
    where
        F: FnOnce(&SaveOutcome) + Send + 'static,
    {
        let controller = Arc::downgrade(&self.controller);
        let reminders = Arc::downgrade(&self.reminders);
        move |outcome: SaveOutcome| {
            if let Some(controller) = controller.upgrade() {
                controller.reset_check_in_timer();
            }
            if let Some(reminders) = reminders.upgrade() {
                if matches!(reminders.state(), ReminderState::Open { .. }) {
                    let _ = reminders.request_close();
                }
            }
            on_complete(&outcome);
        }
    }

    fn close_if_open(&self) {
        if matches!(self.reminders.state(), ReminderState::Open { .. }) {
            let _ = self.reminders.request_close();
        }
    }

    // ── Prompt ──

    pub fn state(&self) -> ReminderState {
        self.reminders.state()
    }

    pub fn open(&self, content: PromptContent, reason: OpenReason) {
        self.reminders.open(content, reason);
    }

    /// # Errors
    /// Returns a [`TransitionError`] unless the prompt is open.
    pub fn request_close(&self) -> Result<CloseOutcome, TransitionError> {
        self.reminders.request_close()
    }

    /// Install the hook that runs while the prompt is closing.
    pub fn on_will_close<F>(&self, hook: F)
    where
        F: FnMut(&Reminders) + Send + 'static,
    {
        self.reminders.set_on_will_close(hook);
    }

    /// # Errors
    /// Returns a [`TransitionError`] unless the prompt is open.
    pub fn snooze(&self, until: DateTime<Utc>) -> Result<(), TransitionError> {
        self.reminders.snooze(until)
    }

    /// # Errors
    /// Returns a [`TransitionError`] unless currently snoozed.
    pub fn unsnooze(&self) -> Result<(), TransitionError> {
        self.reminders.unsnooze()
    }

    pub fn snoozed_until(&self) -> Option<DateTime<Utc>> {
        self.reminders.snoozed_until()
    }

    /// Snooze choices as of now.
    ///
    /// # Errors
    /// Returns an error if the snooze day start does not parse.
    pub fn snooze_options(&self) -> Result<SnoozeOptions, ConfigError> {
        snooze_options(
            self.scheduler.now(),
            self.controller.policy().zone,
            &self.config.snooze,
        )
    }

    // ── Activation ──

    pub fn on_activated(&self) {
        self.controller.on_activated();
    }

    /// Run and clear every deactivation hook.
    pub fn on_deactivated(&self) {
        self.deactivation.run_all();
    }

    pub fn on_deactivation<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.deactivation.push(hook);
    }

    pub fn resolve_new_session(&self, choice: SessionChoice) {
        self.controller.resolve_new_session(choice);
    }

    // ── Queries ──

    pub fn report(&self, since: DateTime<Utc>) -> Report {
        Report::build(self.ledger.list_entries(since))
    }

    /// Start of today's report: this morning at the configured day start.
    pub fn default_report_start(&self) -> DateTime<Utc> {
        default_report_start(
            self.scheduler.now(),
            self.controller.policy().zone,
            self.report_day_start,
        )
    }

    pub fn list_projects(&self, prefix: Option<&str>) -> Vec<String> {
        self.ledger.list_projects(prefix, DEFAULT_LIST_LIMIT)
    }

    pub fn list_tasks(&self, project: &str, prefix: Option<&str>) -> Vec<String> {
        self.ledger.list_tasks(project, prefix, DEFAULT_LIST_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn hooks_run_once_and_list_is_emptied() {
        let hooks = DeactivationHooks::default();
        let runs = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let runs = runs.clone();
            hooks.push(move || {
                runs.fetch_add(1, Ordering::SeqCst);
            });
        }

        hooks.run_all();
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert!(hooks.is_empty());

        hooks.run_all();
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn hook_registered_during_drain_waits_for_next_round() {
        let hooks = Arc::new(DeactivationHooks::default());
        let inner = hooks.clone();
        hooks.push(move || inner.push(|| {}));

        hooks.run_all();
        assert_eq!(hooks.len(), 1);
    }
}
