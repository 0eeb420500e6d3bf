//! Shared fixtures for tally-core integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use tally_core::{Config, ManualScheduler, MemoryStore, PromptContent, PromptView, Tracker};

/// A UI double that records every call as a short string.
#[derive(Default)]
pub struct RecordingView {
    calls: Mutex<Vec<String>>,
}

impl RecordingView {
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }

    fn push(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

impl PromptView for RecordingView {
    fn show_prompt(&self, content: PromptContent) {
        self.push(format!("show {content:?}"));
    }

    fn hide_prompt(&self) {
        self.push("hide");
    }

    fn focus(&self) {
        self.push("focus");
    }

    fn show_new_session_prompt(&self) {
        self.push("new session");
    }
}

/// 2024-05-06 (a Monday) at `h:m` UTC.
pub fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 6, h, m, 0).unwrap()
}

pub fn utc_config() -> Config {
    let mut config = Config::default();
    config.utc_offset_minutes = Some(0);
    config
}

pub struct Harness {
    pub scheduler: Arc<ManualScheduler>,
    pub store: Arc<MemoryStore>,
    pub view: Arc<RecordingView>,
    pub tracker: Tracker,
}

/// A tracker on a manual clock starting at `start`, not yet started.
pub fn harness(start: DateTime<Utc>) -> Harness {
    let scheduler = Arc::new(ManualScheduler::new(start));
    let store = Arc::new(MemoryStore::new());
    let view = Arc::new(RecordingView::default());
    let tracker = Tracker::with_seed(
        utc_config(),
        scheduler.clone(),
        store.clone(),
        view.clone(),
        42,
    )
    .unwrap();
    Harness {
        scheduler,
        store,
        view,
        tracker,
    }
}
