//! Interactive reminder loop.
//!
//! Timers and typed commands both run on the tokio control loop, so the
//! tracker only ever sees one caller at a time.

use std::io::{BufRead, Write};
use std::sync::Arc;

use tally_core::timeutil::{format_clock, format_duration};
use tally_core::{
    Clock, CloseOutcome, Config, OpenReason, PromptContent, PromptView, SaveOutcome, Scheduler,
    SessionChoice, SqliteStore, TokioScheduler, Tracker,
};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

use super::checkin::describe;

const CHECK_IN_HELP: &str = "checkin <project> <task> [notes] | break | skip | snooze [n|next]";

struct TerminalView;

impl PromptView for TerminalView {
    fn show_prompt(&self, content: PromptContent) {
        match content {
            PromptContent::CheckIn => {
                println!("\nWhat are you working on?\n  {CHECK_IN_HELP}");
            }
            PromptContent::DailySummary => {
                println!("\nThat's the day. `report` shows where the time went, `close` dismisses.");
            }
        }
    }

    fn hide_prompt(&self) {
        println!("(prompt closed)");
    }

    fn focus(&self) {
        print!("\x07");
        let _ = std::io::stdout().flush();
    }

    fn show_new_session_prompt(&self) {
        println!("\nIt's been a while since your last check-in.\n  new | continue");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SnoozeChoice {
    Default,
    /// 1-based index into the later options.
    Extra(usize),
    NextSession,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    CheckIn {
        project: String,
        task: String,
        notes: String,
    },
    Break,
    Skip,
    Snooze(SnoozeChoice),
    Unsnooze,
    Open,
    Close,
    Report,
    Status,
    New,
    Continue,
    Quit,
}

/// Parse one typed line; blank lines yield `None`.
fn parse_input(line: &str) -> Result<Option<Input>, String> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(None);
    };

    let input = match command {
        "checkin" | "c" => {
            let (Some(project), Some(task)) = (words.next(), words.next()) else {
                return Err("usage: checkin <project> <task> [notes]".to_string());
            };
            Input::CheckIn {
                project: project.to_string(),
                task: task.to_string(),
                notes: words.collect::<Vec<_>>().join(" "),
            }
        }
        "break" => Input::Break,
        "skip" => Input::Skip,
        "snooze" => Input::Snooze(match words.next() {
            None => SnoozeChoice::Default,
            Some("next") => SnoozeChoice::NextSession,
            Some(n) => match n.parse::<usize>() {
                Ok(0) => SnoozeChoice::Default,
                Ok(n) => SnoozeChoice::Extra(n),
                Err(_) => return Err(format!("unknown snooze choice: {n}")),
            },
        }),
        "unsnooze" => Input::Unsnooze,
        "open" => Input::Open,
        "close" => Input::Close,
        "report" => Input::Report,
        "status" => Input::Status,
        "new" => Input::New,
        "continue" => Input::Continue,
        "quit" | "exit" => Input::Quit,
        other => return Err(format!("unknown command: {other}")),
    };
    Ok(Some(input))
}

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(watch());
    // Give in-flight writes a moment, but never wait on a stuck blocking task.
    runtime.shutdown_timeout(std::time::Duration::from_secs(1));
    result
}

/// Read stdin on a plain thread and forward each line.
///
/// A blocking read owned by the runtime would keep it from shutting down
/// until the next line arrives.
fn spawn_stdin_reader() -> std::io::Result<mpsc::UnboundedReceiver<String>> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "reading stdin failed");
                        break;
                    }
                }
            }
        })?;
    Ok(rx)
}

async fn watch() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let store = Arc::new(SqliteStore::open()?);
    let (scheduler, control) = TokioScheduler::new(Handle::current());
    let scheduler = Arc::new(scheduler);
    let cursor = store.load_cursor()?.unwrap_or_else(|| scheduler.now());
    store.store_cursor(cursor)?;

    let tracker = Arc::new(Tracker::resume(
        config,
        scheduler.clone(),
        store.clone(),
        Arc::new(TerminalView),
        cursor,
    )?);

    let hook_tracker = Arc::downgrade(&tracker);
    let hook_store = store.clone();
    tracker.on_deactivation(move || {
        if let Some(tracker) = hook_tracker.upgrade() {
            persist_cursor(&hook_store, tracker.last_check_in());
        }
    });

    let starting = tracker.clone();
    scheduler.post(Box::new(move || {
        starting.start();
        starting.on_activated();
    }));
    println!("watching; last check-in {} ago. `quit` to stop.", format_duration(scheduler.now() - cursor));

    let lines = spawn_stdin_reader()?;
    let (quit_tx, quit_rx) = oneshot::channel();
    tokio::spawn(read_input(
        lines,
        tracker.clone(),
        scheduler.clone(),
        store.clone(),
        quit_tx,
    ));

    control
        .run_until(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = quit_rx => {}
            }
        })
        .await;

    tracker.stop();
    tracker.on_deactivated();
    Ok(())
}

async fn read_input(
    mut lines: mpsc::UnboundedReceiver<String>,
    tracker: Arc<Tracker>,
    scheduler: Arc<TokioScheduler>,
    store: Arc<SqliteStore>,
    quit: oneshot::Sender<()>,
) {
    while let Some(line) = lines.recv().await {
        match parse_input(&line) {
            Ok(None) => {}
            Ok(Some(Input::Quit)) => break,
            Ok(Some(input)) => {
                let tracker = tracker.clone();
                let store = store.clone();
                scheduler.post(Box::new(move || handle(&tracker, store, input)));
            }
            Err(message) => println!("{message}"),
        }
    }
    let _ = quit.send(());
}

fn handle(tracker: &Tracker, store: Arc<SqliteStore>, input: Input) {
    let zone = tracker.config().local_zone();
    match input {
        Input::CheckIn {
            project,
            task,
            notes,
        } => {
            let result = tracker.check_in(&project, &task, &notes, move |outcome| {
                announce(&store, outcome);
            });
            if let Err(e) = result {
                println!("{e}");
            }
        }
        Input::Break => {
            tracker.take_break(move |outcome| announce(&store, outcome));
        }
        Input::Skip => {
            tracker.skip_session();
            persist_cursor(&store, tracker.last_check_in());
            println!("skipped; new session from {}", format_clock(tracker.last_check_in(), zone));
        }
        Input::Snooze(choice) => {
            let options = match tracker.snooze_options() {
                Ok(options) => options,
                Err(e) => {
                    println!("{e}");
                    return;
                }
            };
            let until = match choice {
                SnoozeChoice::Default => Some(options.default),
                SnoozeChoice::Extra(n) => options.extra.get(n - 1).copied(),
                SnoozeChoice::NextSession => Some(options.next_session),
            };
            let Some(until) = until else {
                println!("only {} later snooze options", options.extra.len());
                return;
            };
            match tracker.snooze(until) {
                Ok(()) => println!("snoozed until {}", format_clock(until, zone)),
                Err(e) => println!("{e}"),
            }
        }
        Input::Unsnooze => {
            if let Err(e) = tracker.unsnooze() {
                println!("{e}");
            }
        }
        Input::Open => tracker.open(PromptContent::CheckIn, OpenReason::Manual),
        Input::Close => match tracker.request_close() {
            Ok(CloseOutcome::Closed) => {}
            Ok(CloseOutcome::Vetoed) => println!("the prompt stayed open"),
            Err(e) => println!("{e}"),
        },
        Input::Report => {
            let report = tracker.report(tracker.default_report_start());
            print!("{}", report.render_text(zone));
        }
        Input::Status => {
            let cursor = tracker.last_check_in();
            println!(
                "last check-in {} ({} ago), prompt {:?}",
                format_clock(cursor, zone),
                format_duration(tracker.now() - cursor),
                tracker.state()
            );
        }
        Input::New => {
            tracker.resolve_new_session(SessionChoice::StartNew);
            persist_cursor(&store, tracker.last_check_in());
        }
        Input::Continue => tracker.resolve_new_session(SessionChoice::Continue),
        Input::Quit => {}
    }
}

fn announce(store: &SqliteStore, outcome: &SaveOutcome) {
    match outcome {
        SaveOutcome::Saved(entry) => println!("recorded {}", describe(entry)),
        SaveOutcome::Failed { error, .. } => println!("entry not saved: {error}"),
    }
    persist_cursor(store, outcome.entry().to);
}

fn persist_cursor(store: &SqliteStore, cursor: chrono::DateTime<chrono::Utc>) {
    if let Err(e) = store.store_cursor(cursor) {
        tracing::warn!(error = %e, "failed to persist the session cursor");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_in_keeps_notes_with_spaces() {
        assert_eq!(
            parse_input("checkin tally cli wire up watch").unwrap(),
            Some(Input::CheckIn {
                project: "tally".to_string(),
                task: "cli".to_string(),
                notes: "wire up watch".to_string(),
            })
        );
    }

    #[test]
    fn check_in_needs_project_and_task() {
        assert!(parse_input("checkin tally").is_err());
    }

    #[test]
    fn blank_lines_are_ignored() {
        assert_eq!(parse_input("   ").unwrap(), None);
    }

    #[test]
    fn snooze_choices() {
        assert_eq!(parse_input("snooze").unwrap(), Some(Input::Snooze(SnoozeChoice::Default)));
        assert_eq!(parse_input("snooze 0").unwrap(), Some(Input::Snooze(SnoozeChoice::Default)));
        assert_eq!(parse_input("snooze 2").unwrap(), Some(Input::Snooze(SnoozeChoice::Extra(2))));
        assert_eq!(
            parse_input("snooze next").unwrap(),
            Some(Input::Snooze(SnoozeChoice::NextSession))
        );
        assert!(parse_input("snooze later").is_err());
    }

    #[test]
    fn unknown_commands_are_rejected() {
        assert_eq!(parse_input("lunch").unwrap_err(), "unknown command: lunch");
    }
}
