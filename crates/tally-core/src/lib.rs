//! # Tally Core Library
//!
//! This library provides the engine behind tally, a check-in tracker that
//! periodically asks what you are working on and reports where the time went.
//! Front ends (the `tally` CLI, or any GUI) supply a [`PromptView`] and drive
//! everything through a [`Tracker`].
//!
//! ## Architecture
//!
//! - **Clock**: a [`Scheduler`] abstraction over one-shot timers, with a
//!   deterministic [`ManualScheduler`] and a tokio-backed [`TokioScheduler`]
//! - **Ledger**: the check-in cursor and time entries ([`SessionLedger`])
//! - **Reminders**: a state machine deciding when the prompt is shown,
//!   coalesced, snoozed and closed ([`Reminders`])
//! - **Controller**: periodic, stale-session and end-of-day policies
//!   ([`ReminderController`])
//! - **Storage**: SQLite persistence and TOML configuration
//!
//! ## Key Components
//!
//! - [`Tracker`]: Application context wiring everything together
//! - [`SqliteStore`]: Durable entry storage
//! - [`Config`]: Application configuration management
//! - [`Report`]: Per-project and per-task time rollups

pub mod app;
pub mod clock;
pub mod controller;
pub mod error;
pub mod ledger;
pub mod reminder;
pub mod report;
pub mod storage;
pub mod timeutil;

pub use app::{DeactivationHooks, Tracker};
pub use clock::{Clock, ControlLoop, ManualScheduler, Scheduler, SystemClock, TaskHandle, TokioScheduler};
pub use controller::{Policy, ReminderController, SessionChoice};
pub use error::{ConfigError, CoreError, DatabaseError, TransitionError, ValidationError};
pub use ledger::{SaveOutcome, SessionLedger, TimeEntry, BREAK_PROJECT, BREAK_TASK, DEFAULT_LIST_LIMIT};
pub use reminder::{CloseOutcome, OpenReason, PromptContent, PromptView, ReminderState, Reminders};
pub use report::{group, total_duration, Report};
pub use storage::{Config, MemoryStore, Persistence, SqliteStore};
pub use timeutil::{LocalZone, SnoozeOptions};
