pub mod commands;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "backoffice",
    about = "Back-office support desk and purchasing CLI",
    long_about = "Operate the ticket SLA and requisition approval store: migrations, demo data, config inspection, and breach reports.",
    after_help = "Examples:\n  backoffice migrate\n  backoffice config\n  backoffice breaches --at 2026-03-12T09:00:00Z"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo categories, tickets and requisitions (skipped when present)")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "List tickets past their resolution deadline as JSON")]
    Breaches {
        #[arg(long, help = "Evaluate breaches at this RFC 3339 instant instead of now")]
        at: Option<DateTime<Utc>>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Breaches { at } => commands::breaches::run(at),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
