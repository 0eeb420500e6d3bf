use std::sync::mpsc;

use clap::Args;
use tally_core::timeutil::format_duration;
use tally_core::{SaveOutcome, TimeEntry};

use super::Session;

#[derive(Args)]
pub struct CheckinArgs {
    /// Project you worked on
    pub project: String,
    /// Task within the project
    pub task: String,
    /// Optional notes
    #[arg(default_value = "")]
    pub notes: String,
}

pub fn run(args: CheckinArgs) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open()?;
    let (tx, rx) = mpsc::channel();
    session
        .tracker
        .check_in(&args.project, &args.task, &args.notes, move |outcome| {
            let _ = tx.send(outcome.clone());
        })?;
    session.finish()?;
    report_outcome(rx.try_recv().ok())
}

pub fn take_break() -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open()?;
    let (tx, rx) = mpsc::channel();
    session.tracker.take_break(move |outcome| {
        let _ = tx.send(outcome.clone());
    });
    session.finish()?;
    report_outcome(rx.try_recv().ok())
}

pub fn skip() -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open()?;
    let dropped = session.now() - session.tracker.last_check_in();
    session.tracker.skip_session();
    session.finish()?;
    println!("skipped {}", format_duration(dropped));
    Ok(())
}

fn report_outcome(outcome: Option<SaveOutcome>) -> Result<(), Box<dyn std::error::Error>> {
    match outcome {
        Some(SaveOutcome::Saved(entry)) => {
            println!("{}", describe(&entry));
            Ok(())
        }
        Some(SaveOutcome::Failed { error, .. }) => Err(format!("entry not saved: {error}").into()),
        None => Err("entry write did not complete".into()),
    }
}

pub(crate) fn describe(entry: &TimeEntry) -> String {
    let span = format_duration(entry.duration());
    if entry.is_break() {
        format!("break ({span})")
    } else {
        format!("{} / {} ({span})", entry.project, entry.task)
    }
}
