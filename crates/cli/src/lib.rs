pub mod commands;

use clap::{Parser, Subcommand};
use quotecraft_core::config::{AppConfig, LoadOptions, LogFormat};
use quotecraft_core::domain::user::Role;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "quotecraft",
    about = "QuoteCraft operator CLI",
    long_about = "Operate QuoteCraft storage: migrations, demo data, config inspection, readiness checks and user accounts.",
    after_help = "Examples:\n  quotecraft doctor --json\n  quotecraft config\n  quotecraft user add --username ana --email ana@example.com --password 'long secret' --role admin"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo service catalogue and sample client (idempotent)")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, DB connectivity, schema state and the mail outbox")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(subcommand, about = "Manage user accounts")]
    User(UserCommand),
}

#[derive(Debug, Subcommand)]
enum UserCommand {
    #[command(about = "Create a user account")]
    Add {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "user", value_parser = parse_role)]
        role: Role,
        #[arg(long)]
        display_name: Option<String>,
    },
    #[command(about = "List user accounts")]
    List,
}

fn parse_role(raw: &str) -> Result<Role, String> {
    raw.parse::<Role>().map_err(|error| error.to_string())
}

/// Diagnostics go to stderr so stdout stays one JSON outcome. A config that
/// fails to load falls back to warnings only; the command reports the error.
fn init_logging() {
    let (level, format) = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => (config.logging.level, config.logging.format),
        Err(_) => ("warn".to_string(), LogFormat::Compact),
    };
    let level = level.parse::<tracing::Level>().unwrap_or(tracing::Level::WARN);
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_max_level(level);

    let _ = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::User(UserCommand::Add { username, email, password, role, display_name }) => {
            commands::user::add(commands::user::AddUser {
                username,
                email,
                password,
                display_name,
                role,
            })
        }
        Command::User(UserCommand::List) => commands::user::list(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
