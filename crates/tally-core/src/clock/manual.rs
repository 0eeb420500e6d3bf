//! Deterministic scheduler for tests and simulations.
//!
//! Time only moves when the caller says so. Due jobs run in due order on the
//! calling thread, with `now()` set to each job's due time while it runs, so a
//! job that re-arms itself sees the instant it fired at.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use super::{Clock, Job, Scheduler, TaskHandle};

/// Snapshot of a job waiting in a [`ManualScheduler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTask {
    pub handle: TaskHandle,
    pub label: String,
    pub due: DateTime<Utc>,
    pub tolerance: Option<Duration>,
}

struct Queued {
    label: String,
    tolerance: Option<Duration>,
    job: Job,
}

struct Inner {
    now: DateTime<Utc>,
    next_id: u64,
    /// Keyed by (due, id) so equal due times keep insertion order.
    queue: BTreeMap<(DateTime<Utc>, u64), Queued>,
}

pub struct ManualScheduler {
    inner: Mutex<Inner>,
}

impl ManualScheduler {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                now: start,
                next_id: 1,
                queue: BTreeMap::new(),
            }),
        }
    }

    /// Move time forward to `target`, running every job due on the way.
    ///
    /// Jobs scheduled by running jobs are picked up if they are due before
    /// `target`. Time never moves backwards.
    pub fn advance_to(&self, target: DateTime<Utc>) {
        loop {
            let next = {
                let mut inner = self.lock();
                let due_key = inner
                    .queue
                    .keys()
                    .next()
                    .copied()
                    .filter(|(due, _)| *due <= target);
                due_key.and_then(|key| {
                    let queued = inner.queue.remove(&key)?;
                    if key.0 > inner.now {
                        inner.now = key.0;
                    }
                    Some(queued)
                })
            };
            match next {
                Some(queued) => {
                    tracing::trace!(label = %queued.label, "running scheduled job");
                    (queued.job)();
                }
                None => break,
            }
        }
        let mut inner = self.lock();
        if target > inner.now {
            inner.now = target;
        }
    }

    pub fn advance_by(&self, delta: Duration) {
        let target = self.now() + delta;
        self.advance_to(target);
    }

    /// Run everything already due without moving time.
    pub fn run_pending(&self) {
        self.advance_to(self.now());
    }

    /// Jump the clock without running anything, as a suspended machine would.
    pub fn set_now(&self, now: DateTime<Utc>) {
        self.lock().now = now;
    }

    pub fn pending(&self) -> Vec<PendingTask> {
        self.lock()
            .queue
            .iter()
            .map(|((due, id), queued)| PendingTask {
                handle: TaskHandle(*id),
                label: queued.label.clone(),
                due: *due,
                tolerance: queued.tolerance,
            })
            .collect()
    }

    pub fn pending_labelled(&self, label: &str) -> Vec<PendingTask> {
        self.pending()
            .into_iter()
            .filter(|task| task.label == label)
            .collect()
    }

    fn enqueue(
        &self,
        when: DateTime<Utc>,
        tolerance: Option<Duration>,
        label: &str,
        job: Job,
    ) -> TaskHandle {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        let due = when.max(inner.now);
        inner.queue.insert(
            (due, id),
            Queued {
                label: label.to_string(),
                tolerance,
                job,
            },
        );
        TaskHandle(id)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A job that panicked under test must not wedge every later assertion.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Clock for ManualScheduler {
    fn now(&self) -> DateTime<Utc> {
        self.lock().now
    }
}

impl Scheduler for ManualScheduler {
    fn after(&self, delay: Duration, label: &str, job: Job) -> TaskHandle {
        let when = self.now() + delay;
        self.enqueue(when, None, label, job)
    }

    fn at(&self, when: DateTime<Utc>, label: &str, job: Job) -> TaskHandle {
        self.enqueue(when, None, label, job)
    }

    fn at_with_tolerance(
        &self,
        when: DateTime<Utc>,
        tolerance: Duration,
        label: &str,
        job: Job,
    ) -> TaskHandle {
        self.enqueue(when, Some(tolerance), label, job)
    }

    fn cancel(&self, handle: TaskHandle) {
        self.lock().queue.retain(|(_, id), _| *id != handle.0);
    }

    /// Runs inline: the write is finished before this returns, and only its
    /// posted completion waits for the next `run_pending`.
    fn background(&self, work: Job) {
        work();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
    }

    #[test]
    fn jobs_run_in_due_order_with_now_at_due_time() {
        let sched = Arc::new(ManualScheduler::new(t0()));
        let seen = Arc::new(Mutex::new(Vec::new()));

        for minutes in [30, 10, 20] {
            let seen = seen.clone();
            let clock = sched.clone();
            sched.after(
                Duration::minutes(minutes),
                "job",
                Box::new(move || seen.lock().unwrap().push((minutes, clock.now()))),
            );
        }
        sched.advance_by(Duration::hours(1));

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                (10, t0() + Duration::minutes(10)),
                (20, t0() + Duration::minutes(20)),
                (30, t0() + Duration::minutes(30)),
            ]
        );
        assert_eq!(sched.now(), t0() + Duration::hours(1));
    }

    #[test]
    fn cancelled_job_never_runs() {
        let sched = ManualScheduler::new(t0());
        let ran = Arc::new(Mutex::new(false));
        let flag = ran.clone();
        let handle = sched.after(
            Duration::minutes(5),
            "job",
            Box::new(move || *flag.lock().unwrap() = true),
        );
        sched.cancel(handle);
        sched.advance_by(Duration::minutes(10));
        assert!(!*ran.lock().unwrap());
        assert!(sched.pending().is_empty());
    }

    #[test]
    fn past_due_time_runs_on_next_pending_pass() {
        let sched = ManualScheduler::new(t0());
        let ran = Arc::new(Mutex::new(false));
        let flag = ran.clone();
        sched.at(
            t0() - Duration::hours(1),
            "late",
            Box::new(move || *flag.lock().unwrap() = true),
        );
        assert_eq!(sched.pending()[0].due, t0());
        sched.run_pending();
        assert!(*ran.lock().unwrap());
    }

    #[test]
    fn self_rescheduling_job_is_picked_up_within_the_same_advance() {
        fn arm(sched: Arc<ManualScheduler>, count: Arc<Mutex<u32>>) {
            let again = sched.clone();
            sched.after(
                Duration::minutes(10),
                "tick",
                Box::new(move || {
                    *count.lock().unwrap() += 1;
                    arm(again, count);
                }),
            );
        }

        let sched = Arc::new(ManualScheduler::new(t0()));
        let count = Arc::new(Mutex::new(0));
        arm(sched.clone(), count.clone());
        sched.advance_by(Duration::minutes(35));
        assert_eq!(*count.lock().unwrap(), 3);
        assert_eq!(sched.pending_labelled("tick").len(), 1);
    }
}
