use serde::Serialize;
use tally_core::timeutil::{format_clock, format_duration};
use tally_core::SnoozeOptions;

use super::Session;

#[derive(Serialize)]
struct Status {
    last_check_in: chrono::DateTime<chrono::Utc>,
    elapsed_seconds: i64,
    snooze: SnoozeOptions,
}

pub fn run(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open()?;
    let zone = session.config().local_zone();
    let cursor = session.tracker.last_check_in();
    let elapsed = session.now() - cursor;
    let snooze = session.tracker.snooze_options()?;

    if json {
        let status = Status {
            last_check_in: cursor,
            elapsed_seconds: elapsed.num_seconds(),
            snooze,
        };
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!(
            "last check-in: {} ({} ago)",
            format_clock(cursor, zone),
            format_duration(elapsed)
        );
        let mut choices = vec![format_clock(snooze.default, zone)];
        choices.extend(snooze.extra.iter().map(|t| format_clock(*t, zone)));
        println!("snooze until: {}", choices.join(", "));
        println!("next session: {}", format_clock(snooze.next_session, zone));
    }
    session.finish()
}
