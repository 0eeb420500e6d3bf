//! Tokio-backed scheduler.
//!
//! Timers are tokio tasks that sleep and then hand their job to an unbounded
//! channel. [`ControlLoop::run`] drains that channel one job at a time, which
//! makes it the control thread: no two jobs ever overlap.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use super::{Clock, Job, Scheduler, SystemClock, TaskHandle};

type Timers = Arc<Mutex<HashMap<u64, AbortHandle>>>;

#[derive(Clone)]
pub struct TokioScheduler {
    runtime: Handle,
    control: mpsc::UnboundedSender<Job>,
    timers: Timers,
    next_id: Arc<AtomicU64>,
    clock: SystemClock,
}

/// The serial end of a [`TokioScheduler`].
pub struct ControlLoop {
    jobs: mpsc::UnboundedReceiver<Job>,
}

impl TokioScheduler {
    /// Create a scheduler bound to `runtime` and the loop that must be driven
    /// for any of its jobs to run.
    pub fn new(runtime: Handle) -> (Self, ControlLoop) {
        let (control, jobs) = mpsc::unbounded_channel();
        let scheduler = Self {
            runtime,
            control,
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            clock: SystemClock,
        };
        (scheduler, ControlLoop { jobs })
    }

    /// Number of timers that have not fired or been cancelled yet.
    pub fn armed(&self) -> usize {
        self.timers.lock().map(|t| t.len()).unwrap_or(0)
    }

    fn spawn_timer(&self, delay: Duration, label: &str, job: Job) -> TaskHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let sleep_for = delay.to_std().unwrap_or(std::time::Duration::ZERO);
        let control = self.control.clone();
        let timers = self.timers.clone();
        let label = label.to_string();

        tracing::debug!(%label, id, delay_secs = sleep_for.as_secs(), "arming timer");

        // Held across spawn so the timer cannot deregister before it is registered.
        let mut registry = match self.timers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(sleep_for).await;
            if let Ok(mut timers) = timers.lock() {
                timers.remove(&id);
            }
            if control.send(job).is_err() {
                tracing::warn!(%label, "control loop gone, dropping job");
            }
        });
        registry.insert(id, task.abort_handle());
        TaskHandle(id)
    }
}

impl Clock for TokioScheduler {
    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

impl Scheduler for TokioScheduler {
    fn after(&self, delay: Duration, label: &str, job: Job) -> TaskHandle {
        self.spawn_timer(delay, label, job)
    }

    fn at(&self, when: DateTime<Utc>, label: &str, job: Job) -> TaskHandle {
        self.spawn_timer(when - self.now(), label, job)
    }

    fn cancel(&self, handle: TaskHandle) {
        let timer = self.timers.lock().ok().and_then(|mut t| t.remove(&handle.0));
        if let Some(timer) = timer {
            timer.abort();
        }
    }

    fn background(&self, work: Job) {
        self.runtime.spawn_blocking(work);
    }

    fn post(&self, job: Job) {
        if self.control.send(job).is_err() {
            tracing::warn!("control loop gone, dropping posted job");
        }
    }
}

impl ControlLoop {
    /// Run jobs until every scheduler handle is dropped.
    pub async fn run(mut self) {
        while let Some(job) = self.jobs.recv().await {
            job();
        }
    }

    /// Run jobs until `shutdown` resolves.
    pub async fn run_until<F: Future<Output = ()>>(mut self, shutdown: F) {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                job = self.jobs.recv() => match job {
                    Some(job) => job(),
                    None => break,
                },
            }
        }
    }
}
