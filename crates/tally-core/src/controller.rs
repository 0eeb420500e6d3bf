//! Reminder policies: the periodic check-in prompt, the stale-session
//! question and the end-of-day summary.
//!
//! Each policy is a one-shot timer that re-arms itself when it fires.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::{DateTime, Duration, NaiveTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::clock::{Scheduler, TaskHandle};
use crate::error::ConfigError;
use crate::ledger::SessionLedger;
use crate::reminder::{OpenReason, PromptContent, PromptView, Reminders};
use crate::storage::Config;
use crate::timeutil::{next_occurrence, LocalZone};

pub const CHECK_IN_LABEL: &str = "check-in prompt";
pub const STALE_CHECK_LABEL: &str = "new session prompt";
pub const SUMMARY_LABEL: &str = "daily summary";

/// Answer to the new-session question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionChoice {
    /// Drop the time since the last check-in and start over.
    StartNew,
    /// Keep the current session; the next check-in covers the whole gap.
    Continue,
}

/// Timing knobs, resolved once from [`Config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub interval: Duration,
    pub jitter: Duration,
    pub stale_after: Duration,
    pub summary_time: NaiveTime,
    pub summary_lead: Duration,
    pub summary_tolerance: Duration,
    pub zone: LocalZone,
}

impl Policy {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let summary = &config.daily_summary;
        Ok(Self {
            interval: Duration::minutes(i64::from(config.reminders.interval_minutes)),
            jitter: Duration::minutes(i64::from(config.reminders.jitter_minutes)),
            stale_after: Duration::hours(i64::from(config.reminders.stale_session_hours)),
            summary_time: summary.wall_time()?,
            summary_lead: Duration::seconds(i64::from(summary.lead_seconds)),
            summary_tolerance: Duration::seconds(i64::from(summary.tolerance_seconds())),
            zone: config.local_zone(),
        })
    }
}

#[derive(Debug, Default)]
struct Timers {
    periodic: Option<(TaskHandle, DateTime<Utc>)>,
    stale_check: Option<TaskHandle>,
    summary: Option<(TaskHandle, DateTime<Utc>)>,
}

pub struct ReminderController {
    scheduler: Arc<dyn Scheduler>,
    ledger: Arc<SessionLedger>,
    reminders: Arc<Reminders>,
    view: Arc<dyn PromptView>,
    policy: Policy,
    rng: Mutex<StdRng>,
    timers: Mutex<Timers>,
    me: Weak<ReminderController>,
}

impl ReminderController {
    pub fn new(
        policy: Policy,
        scheduler: Arc<dyn Scheduler>,
        ledger: Arc<SessionLedger>,
        reminders: Arc<Reminders>,
        view: Arc<dyn PromptView>,
    ) -> Arc<Self> {
        Self::with_rng(policy, scheduler, ledger, reminders, view, StdRng::from_entropy())
    }

    /// Deterministic jitter for tests and simulations.
    pub fn with_seed(
        policy: Policy,
        scheduler: Arc<dyn Scheduler>,
        ledger: Arc<SessionLedger>,
        reminders: Arc<Reminders>,
        view: Arc<dyn PromptView>,
        seed: u64,
    ) -> Arc<Self> {
        Self::with_rng(policy, scheduler, ledger, reminders, view, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        policy: Policy,
        scheduler: Arc<dyn Scheduler>,
        ledger: Arc<SessionLedger>,
        reminders: Arc<Reminders>,
        view: Arc<dyn PromptView>,
        rng: StdRng,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            scheduler,
            ledger,
            reminders,
            view,
            policy,
            rng: Mutex::new(rng),
            timers: Mutex::new(Timers::default()),
            me: me.clone(),
        })
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Arm the periodic prompt and the daily summary.
    pub fn start(&self) {
        self.schedule_periodic();
        self.schedule_daily_summary();
    }

    /// Stop every pending policy timer.
    pub fn stop(&self) {
        let timers = std::mem::take(&mut *self.lock_timers());
        let handles = [
            timers.periodic.map(|(h, _)| h),
            timers.stale_check,
            timers.summary.map(|(h, _)| h),
        ];
        for handle in handles.into_iter().flatten() {
            self.scheduler.cancel(handle);
        }
    }

    pub fn next_check_in_at(&self) -> Option<DateTime<Utc>> {
        self.lock_timers().periodic.map(|(_, at)| at)
    }

    pub fn next_summary_at(&self) -> Option<DateTime<Utc>> {
        self.lock_timers().summary.map(|(_, at)| at)
    }

    // ── Periodic prompt ──

    /// Arm the next check-in prompt `interval ± jitter` from now, replacing
    /// any pending one.
    pub fn schedule_periodic(&self) {
        let jitter_secs = self.policy.jitter.num_seconds().abs();
        let offset = self.lock_rng().gen_range(-jitter_secs..=jitter_secs);
        let delay = self.policy.interval + Duration::seconds(offset);
        let due = self.scheduler.now() + delay;
        tracing::info!(%due, delay_secs = delay.num_seconds(), "scheduling check-in prompt");

        let me = self.me.clone();
        let handle = self.scheduler.after(
            delay,
            CHECK_IN_LABEL,
            Box::new(move || {
                if let Some(controller) = me.upgrade() {
                    controller.on_periodic_fired();
                }
            }),
        );
        let previous = self.lock_timers().periodic.replace((handle, due));
        if let Some((previous, _)) = previous {
            self.scheduler.cancel(previous);
        }
    }

    /// Restart the periodic countdown, typically right after a check-in.
    pub fn reset_check_in_timer(&self) {
        self.schedule_periodic();
    }

    fn on_periodic_fired(&self) {
        self.lock_timers().periodic = None;
        self.reminders.open(PromptContent::CheckIn, OpenReason::Scheduled);
        self.schedule_periodic();
    }

    // ── Stale session ──

    /// The prompt window became active.
    ///
    /// After a long absence the user is asked whether to start a new
    /// session; otherwise that question is armed for when the session does
    /// go stale.
    pub fn on_activated(&self) {
        let now = self.scheduler.now();
        let last = self.ledger.last_check_in();
        if now - last > self.policy.stale_after {
            tracing::info!(%last, "session is stale; asking about a new session");
            self.view.show_new_session_prompt();
        } else {
            self.schedule_stale_check(last + self.policy.stale_after);
        }
    }

    fn schedule_stale_check(&self, when: DateTime<Utc>) {
        let me = self.me.clone();
        let handle = self.scheduler.at(
            when,
            STALE_CHECK_LABEL,
            Box::new(move || {
                if let Some(controller) = me.upgrade() {
                    controller.on_stale_check_fired();
                }
            }),
        );
        let previous = self.lock_timers().stale_check.replace(handle);
        if let Some(previous) = previous {
            self.scheduler.cancel(previous);
        }
    }

    fn on_stale_check_fired(&self) {
        self.lock_timers().stale_check = None;
        let due = self.ledger.last_check_in() + self.policy.stale_after;
        if self.scheduler.now() >= due {
            tracing::info!("session went stale; asking about a new session");
            self.view.show_new_session_prompt();
        } else {
            // A check-in moved the cursor since this was armed.
            self.schedule_stale_check(due);
        }
    }

    pub fn resolve_new_session(&self, choice: SessionChoice) {
        tracing::info!(?choice, "new session question answered");
        match choice {
            SessionChoice::StartNew => {
                self.ledger.skip_session();
                self.reset_check_in_timer();
                // Already closed is fine here.
                let _ = self.reminders.request_close();
            }
            SessionChoice::Continue => self.view.focus(),
        }
    }

    // ── Daily summary ──

    /// Arm the summary for just before the next occurrence of the
    /// configured wall-clock time.
    pub fn schedule_daily_summary(&self) {
        let Policy {
            summary_time,
            summary_lead,
            summary_tolerance,
            zone,
            ..
        } = self.policy;
        let now = self.scheduler.now();
        // The zone is consulted at each occurrence, so re-arming after a
        // daylight-saving change keeps the same wall-clock time.
        let due = next_occurrence(now + summary_lead, zone, summary_time, false) - summary_lead;
        tracing::info!(%due, tolerance_secs = summary_tolerance.num_seconds(), "scheduling daily summary");

        let me = self.me.clone();
        let handle = self.scheduler.at_with_tolerance(
            due,
            summary_tolerance,
            SUMMARY_LABEL,
            Box::new(move || {
                if let Some(controller) = me.upgrade() {
                    controller.on_summary_fired();
                }
            }),
        );
        let previous = self.lock_timers().summary.replace((handle, due));
        if let Some((previous, _)) = previous {
            self.scheduler.cancel(previous);
        }
    }

    fn on_summary_fired(&self) {
        self.lock_timers().summary = None;
        self.reminders.open(PromptContent::DailySummary, OpenReason::Scheduled);
        self.schedule_daily_summary();
    }

    fn lock_timers(&self) -> MutexGuard<'_, Timers> {
        self.timers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualScheduler};
    use crate::reminder::ReminderState;
    use crate::storage::MemoryStore;
    use chrono::TimeZone;

    struct NullView;

    impl PromptView for NullView {
        fn show_prompt(&self, _content: PromptContent) {}
        fn hide_prompt(&self) {}
        fn focus(&self) {}
        fn show_new_session_prompt(&self) {}
    }

    fn setup(start: DateTime<Utc>) -> (Arc<ManualScheduler>, Arc<ReminderController>, Arc<Reminders>) {
        let sched = Arc::new(ManualScheduler::new(start));
        let view: Arc<dyn PromptView> = Arc::new(NullView);
        let ledger = Arc::new(SessionLedger::new(sched.clone(), Arc::new(MemoryStore::new())));
        let reminders = Reminders::new(sched.clone(), view.clone());
        let mut config = Config::default();
        config.utc_offset_minutes = Some(0);
        let policy = Policy::from_config(&config).unwrap();
        let controller =
            ReminderController::with_seed(policy, sched.clone(), ledger, reminders.clone(), view, 7);
        (sched, controller, reminders)
    }

    #[test]
    fn periodic_fire_opens_and_rearms() {
        let (sched, controller, reminders) = setup(Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap());
        controller.schedule_periodic();
        let first = controller.next_check_in_at().unwrap();

        sched.advance_to(first);
        assert!(matches!(
            reminders.state(),
            ReminderState::Open { content: PromptContent::CheckIn, reason: OpenReason::Scheduled }
        ));
        let next = controller.next_check_in_at().unwrap();
        assert!(next > first);
        assert_eq!(sched.pending_labelled(CHECK_IN_LABEL).len(), 1);
    }

    #[test]
    fn reset_replaces_pending_prompt() {
        let (sched, controller, _reminders) = setup(Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap());
        controller.schedule_periodic();
        sched.advance_by(Duration::minutes(5));
        controller.reset_check_in_timer();
        let pending = sched.pending_labelled(CHECK_IN_LABEL);
        assert_eq!(pending.len(), 1);
        assert!(pending[0].due >= sched.now() + Duration::minutes(8));
    }

    #[test]
    fn summary_is_armed_before_the_wall_clock_time_with_tolerance() {
        let (sched, controller, _reminders) = setup(Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap());
        controller.schedule_daily_summary();
        let pending = sched.pending_labelled(SUMMARY_LABEL);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].due, Utc.with_ymd_and_hms(2024, 5, 6, 18, 29, 30).unwrap());
        assert_eq!(pending[0].tolerance, Some(Duration::seconds(60)));
    }

    #[test]
    fn stop_cancels_everything() {
        let (sched, controller, _reminders) = setup(Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap());
        controller.start();
        controller.on_activated();
        assert_eq!(sched.pending().len(), 3);
        controller.stop();
        assert!(sched.pending().is_empty());
        assert_eq!(controller.next_summary_at(), None);
    }
}
