use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "tally", version, about = "Check in on what you're doing, report where the time went")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record what you did since the last check-in
    Checkin(commands::checkin::CheckinArgs),
    /// Record the time since the last check-in as a break
    Break,
    /// Forget the time since the last check-in
    Skip,
    /// Recently used projects
    Projects {
        /// Only projects starting with this (case-sensitive)
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Recently used tasks of a project
    Tasks {
        project: String,
        /// Only tasks starting with this (case-sensitive)
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Time per project and task
    Report(commands::report::ReportArgs),
    /// Current session and snooze choices
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Run the reminder loop in this terminal
    Watch,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("TALLY_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Checkin(args) => commands::checkin::run(args),
        Commands::Break => commands::checkin::take_break(),
        Commands::Skip => commands::checkin::skip(),
        Commands::Projects { prefix } => commands::projects::list_projects(prefix.as_deref()),
        Commands::Tasks { project, prefix } => {
            commands::projects::list_tasks(&project, prefix.as_deref())
        }
        Commands::Report(args) => commands::report::run(args),
        Commands::Status { json } => commands::status::run(json),
        Commands::Config { action } => commands::config::run(action),
        Commands::Watch => commands::watch::run(),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
