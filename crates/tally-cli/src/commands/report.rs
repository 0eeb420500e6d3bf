use chrono::{DateTime, Utc};
use clap::Args;

use super::Session;

#[derive(Args)]
pub struct ReportArgs {
    /// Start of the report (RFC 3339); defaults to this morning's day start
    #[arg(long, value_parser = parse_since)]
    pub since: Option<DateTime<Utc>>,
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

fn parse_since(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {e}"))
}

pub fn run(args: ReportArgs) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open()?;
    let since = args
        .since
        .unwrap_or_else(|| session.tracker.default_report_start());
    let report = session.tracker.report(since);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render_text(session.config().local_zone()));
    }
    session.finish()
}
