//! Time source and one-shot task scheduling.
//!
//! Every scheduled job runs on a single logical control thread. Jobs may
//! schedule further jobs; recurring behavior is built from one-shot jobs that
//! re-arm themselves, never from a fixed repeating timer.
//!
//! Two implementations ship with the crate:
//!
//! - [`ManualScheduler`]: a deterministic fake driven by the caller
//!   (`advance_to`, `advance_by`, `run_pending`). Used by tests and
//!   simulations.
//! - [`TokioScheduler`] + [`ControlLoop`]: timers are tokio tasks that hand the
//!   job to an mpsc channel, and the control loop drains that channel
//!   serially.

mod manual;
mod tokio_rt;

pub use manual::{ManualScheduler, PendingTask};
pub use tokio_rt::{ControlLoop, TokioScheduler};

use chrono::{DateTime, Duration, Utc};

/// A unit of work handed to the scheduler.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Identifies a scheduled job for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(pub(crate) u64);

impl TaskHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Source of "now".
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Delayed execution on the control thread.
///
/// `label` is only used for logging and introspection.
pub trait Scheduler: Clock {
    /// Run `job` once after `delay`. Negative delays run as soon as possible.
    fn after(&self, delay: Duration, label: &str, job: Job) -> TaskHandle;

    /// Run `job` once at `when`. A time in the past runs as soon as possible.
    fn at(&self, when: DateTime<Utc>, label: &str, job: Job) -> TaskHandle;

    /// Like [`Scheduler::at`], allowing the job to fire up to `tolerance`
    /// late so it can be coalesced with other timers.
    fn at_with_tolerance(
        &self,
        when: DateTime<Utc>,
        _tolerance: Duration,
        label: &str,
        job: Job,
    ) -> TaskHandle {
        self.at(when, label, job)
    }

    /// Best-effort cancellation. A job that has already been dispatched
    /// still runs to completion.
    fn cancel(&self, handle: TaskHandle);

    /// Run `work` off the control thread.
    fn background(&self, work: Job);

    /// Marshal `job` onto the control thread as soon as possible.
    fn post(&self, job: Job) {
        self.after(Duration::zero(), "post", job);
    }
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
