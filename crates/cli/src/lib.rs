pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use karmic_core::domain::subject::SubjectKind;
use karmic_core::leaderboard::{Direction, DEFAULT_LEADERBOARD_SIZE};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "karmic",
    about = "Karmic operator CLI",
    long_about = "Apply migrations, inspect configuration, and read karma totals without Slack.",
    after_help = "Examples:\n  karmic migrate\n  karmic config\n  karmic leaderboard things --bottom\n  karmic lookup '`rust`'"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Show the subjects with the most (or least) karma")]
    Leaderboard {
        #[arg(value_enum, help = "Which subjects to rank")]
        kind: KindArg,
        #[arg(long, help = "Rank from the lowest karma instead of the highest")]
        bottom: bool,
        #[arg(long, default_value_t = DEFAULT_LEADERBOARD_SIZE, help = "Number of rows")]
        limit: u32,
    },
    #[command(about = "Report the karma total of one subject, e.g. '<@U123>' or '`rust`'")]
    Lookup { subject: String },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KindArg {
    Users,
    Things,
}

impl From<KindArg> for SubjectKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::Users => SubjectKind::User,
            KindArg::Things => SubjectKind::Thing,
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Leaderboard { kind, bottom, limit } => {
            let direction = if bottom { Direction::Bottom } else { Direction::Top };
            commands::leaderboard::run(kind.into(), direction, limit)
        }
        Command::Lookup { subject } => commands::lookup::run(&subject),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
