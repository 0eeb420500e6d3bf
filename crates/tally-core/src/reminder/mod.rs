//! Reminder prompt: when to show, coalesce, snooze and re-show it.
//!
//! [`Reminders`] owns the pure state machine behind a mutex and applies the
//! effects it returns (UI calls, timers) after the lock is released, so a UI
//! callback may call straight back into it.

mod machine;

pub use machine::CloseOutcome;

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::Scheduler;
use crate::error::TransitionError;
use machine::{Effect, ReminderMachine};

/// What the prompt window is showing.
///
/// Ordered by precedence: when several opens are waiting, the greater one
/// is shown first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptContent {
    CheckIn,
    DailySummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenReason {
    /// The user asked for it; the prompt also takes focus.
    Manual,
    /// A timer fired.
    Scheduled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReminderState {
    Idle,
    Open {
        content: PromptContent,
        reason: OpenReason,
    },
    Snoozed {
        until: DateTime<Utc>,
    },
}

/// The UI side of the prompt.
pub trait PromptView: Send + Sync {
    fn show_prompt(&self, content: PromptContent);
    fn hide_prompt(&self);
    fn focus(&self);
    /// Ask whether to start a new session after a long absence; the answer
    /// goes to [`crate::ReminderController::resolve_new_session`].
    fn show_new_session_prompt(&self);
}

/// Runs while a close is in progress; an `open` from here vetoes the close.
pub type WillCloseHook = Box<dyn FnMut(&Reminders) + Send>;

pub struct Reminders {
    machine: Mutex<ReminderMachine>,
    scheduler: Arc<dyn Scheduler>,
    view: Arc<dyn PromptView>,
    will_close: Mutex<Option<WillCloseHook>>,
    me: Weak<Reminders>,
}

impl Reminders {
    pub fn new(scheduler: Arc<dyn Scheduler>, view: Arc<dyn PromptView>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            machine: Mutex::new(ReminderMachine::default()),
            scheduler,
            view,
            will_close: Mutex::new(None),
            me: me.clone(),
        })
    }

    pub fn set_on_will_close<F>(&self, hook: F)
    where
        F: FnMut(&Reminders) + Send + 'static,
    {
        *lock(&self.will_close) = Some(Box::new(hook));
    }

    pub fn state(&self) -> ReminderState {
        lock(&self.machine).state()
    }

    pub fn snoozed_until(&self) -> Option<DateTime<Utc>> {
        lock(&self.machine).snoozed_until()
    }

    pub fn open(&self, content: PromptContent, reason: OpenReason) {
        let effects = lock(&self.machine).open(content, reason);
        self.apply(effects);
    }

    /// Close the prompt unless the close hook re-opens it.
    ///
    /// # Errors
    /// Returns a [`TransitionError`] unless the prompt is open.
    pub fn request_close(&self) -> Result<CloseOutcome, TransitionError> {
        let closing = lock(&self.machine).begin_close().inspect_err(|e| {
            tracing::warn!(error = %e, "close rejected");
        })?;

        // The hook is taken out so it can re-enter this driver.
        let hook = lock(&self.will_close).take();
        if let Some(mut hook) = hook {
            hook(self);
            let mut slot = lock(&self.will_close);
            if slot.is_none() {
                *slot = Some(hook);
            }
        }

        let (outcome, effects) = lock(&self.machine).finish_close();
        tracing::info!(content = ?closing, ?outcome, "prompt close requested");
        self.apply(effects);
        Ok(outcome)
    }

    /// Hide the prompt until `until`, then return to idle.
    ///
    /// # Errors
    /// Returns a [`TransitionError`] unless the prompt is open.
    pub fn snooze(&self, until: DateTime<Utc>) -> Result<(), TransitionError> {
        let effects = lock(&self.machine).snooze(until).inspect_err(|e| {
            tracing::warn!(error = %e, "snooze rejected");
        })?;
        tracing::info!(%until, "snoozed");
        self.apply(effects);
        Ok(())
    }

    /// End the snooze early.
    ///
    /// # Errors
    /// Returns a [`TransitionError`] unless currently snoozed.
    pub fn unsnooze(&self) -> Result<(), TransitionError> {
        let effects = lock(&self.machine).unsnooze().inspect_err(|e| {
            tracing::warn!(error = %e, "unsnooze rejected");
        })?;
        tracing::info!("unsnoozed");
        self.apply(effects);
        Ok(())
    }

    fn expire(&self, snooze_id: u64) {
        let effects = lock(&self.machine).expire(snooze_id);
        self.apply(effects);
    }

    fn apply(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Show(content) => self.view.show_prompt(content),
                Effect::Hide => self.view.hide_prompt(),
                Effect::Focus => self.view.focus(),
                Effect::Cancel(handle) => self.scheduler.cancel(handle),
                Effect::ArmUnsnooze { snooze_id, until } => {
                    let me = self.me.clone();
                    let handle = self.scheduler.at(
                        until,
                        "unsnooze",
                        Box::new(move || {
                            if let Some(reminders) = me.upgrade() {
                                reminders.expire(snooze_id);
                            }
                        }),
                    );
                    let stale = lock(&self.machine).attach_timer(snooze_id, handle);
                    if let Some(stale) = stale {
                        self.scheduler.cancel(stale);
                    }
                }
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualScheduler};
    use chrono::{Duration, TimeZone};

    #[derive(Default)]
    struct RecordingView {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingView {
        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.calls.lock().unwrap())
        }
    }

    impl PromptView for RecordingView {
        fn show_prompt(&self, content: PromptContent) {
            self.calls.lock().unwrap().push(format!("show {content:?}"));
        }
        fn hide_prompt(&self) {
            self.calls.lock().unwrap().push("hide".into());
        }
        fn focus(&self) {
            self.calls.lock().unwrap().push("focus".into());
        }
        fn show_new_session_prompt(&self) {
            self.calls.lock().unwrap().push("new session".into());
        }
    }

    fn setup() -> (Arc<ManualScheduler>, Arc<RecordingView>, Arc<Reminders>) {
        let sched = Arc::new(ManualScheduler::new(
            Utc.with_ymd_and_hms(2024, 5, 6, 13, 0, 0).unwrap(),
        ));
        let view = Arc::new(RecordingView::default());
        let reminders = Reminders::new(sched.clone(), view.clone());
        (sched, view, reminders)
    }

    #[test]
    fn snooze_expiry_returns_to_idle_without_showing() {
        let (sched, view, reminders) = setup();
        reminders.open(PromptContent::CheckIn, OpenReason::Manual);
        let until = sched.now() + Duration::hours(1);
        reminders.snooze(until).unwrap();
        assert_eq!(sched.pending_labelled("unsnooze").len(), 1);
        view.take();

        sched.advance_to(until);
        assert_eq!(reminders.state(), ReminderState::Idle);
        assert!(view.take().is_empty());
    }

    #[test]
    fn unsnooze_cancels_the_expiry_timer() {
        let (sched, _view, reminders) = setup();
        reminders.open(PromptContent::CheckIn, OpenReason::Manual);
        reminders.snooze(sched.now() + Duration::hours(1)).unwrap();
        reminders.unsnooze().unwrap();
        assert!(sched.pending_labelled("unsnooze").is_empty());
    }

    #[test]
    fn hook_can_reenter_and_veto() {
        let (_sched, view, reminders) = setup();
        reminders.open(PromptContent::CheckIn, OpenReason::Scheduled);
        reminders.set_on_will_close(|r| r.open(PromptContent::CheckIn, OpenReason::Scheduled));
        view.take();

        assert_eq!(reminders.request_close(), Ok(CloseOutcome::Vetoed));
        assert!(view.take().is_empty());
        assert!(matches!(reminders.state(), ReminderState::Open { .. }));
    }

    #[test]
    fn hook_survives_and_runs_on_every_close() {
        let (_sched, _view, reminders) = setup();
        let runs = Arc::new(Mutex::new(0));
        let counter = runs.clone();
        reminders.set_on_will_close(move |_| *counter.lock().unwrap() += 1);

        for _ in 0..2 {
            reminders.open(PromptContent::CheckIn, OpenReason::Manual);
            assert_eq!(reminders.request_close(), Ok(CloseOutcome::Closed));
        }
        assert_eq!(*runs.lock().unwrap(), 2);
    }

    #[test]
    fn close_while_idle_is_an_error() {
        let (_sched, _view, reminders) = setup();
        assert_eq!(
            reminders.request_close(),
            Err(TransitionError::NotOpen(ReminderState::Idle))
        );
    }
}
