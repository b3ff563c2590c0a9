pub mod commands;

use clap::{Parser, Subcommand};
use lapwise_core::config::{AppConfig, LogFormat};
use std::process::ExitCode;

use commands::chat::InterpreterKind;
use commands::query::QueryArgs;

#[derive(Debug, Parser)]
#[command(
    name = "lapwise",
    about = "Lapwise laptop shopping assistant",
    long_about = "Chat through laptop preferences, build search queries offline, and inspect configuration.",
    after_help = "Examples:\n  lapwise chat\n  lapwise query --purpose gaming --ram 16GB --price-range 40000-60000\n  lapwise doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate configuration and collaborator client readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Apply preferences offline and print the resulting search query as JSON")]
    Query(QueryArgs),
    #[command(about = "Start an interactive recommendation session on stdin/stdout")]
    Chat {
        #[arg(long, value_enum, default_value_t = InterpreterKind::Keyword)]
        interpreter: InterpreterKind,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Query(args) => commands::query::run(&args),
        Command::Chat { interpreter } => commands::chat::run(interpreter),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so command output on stdout stays machine-readable.
pub fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let initialised = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if initialised.is_err() {
        tracing::debug!(event_name = "system.logging.already_initialised", "subscriber already set");
    }
}
