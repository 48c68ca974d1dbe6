pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use playbook_core::config::{EngineConfig, LoadOptions, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "playbook",
    about = "Playbook engine operator CLI",
    long_about = "Inspect configuration, validate playbook definitions, and evaluate stages against recorded evidence.",
    after_help = "Examples:\n  playbook doctor --json\n  playbook validate playbooks/sales.toml\n  playbook evaluate --playbook playbooks/sales.toml --stage qualify --evidence evidence.json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, catalog readability, and every catalog definition")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run static validation on one playbook definition (.json or .toml)")]
    Validate {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    #[command(about = "Evaluate one stage of a playbook definition against a JSON evidence array")]
    Evaluate {
        #[arg(long, value_name = "FILE")]
        playbook: PathBuf,
        #[arg(long, value_name = "STAGE_ID")]
        stage: String,
        #[arg(long, value_name = "FILE")]
        evidence: PathBuf,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    // A broken config is reported by `config`/`doctor`; logging still comes up with defaults.
    let config = EngineConfig::load(LoadOptions::default()).unwrap_or_default();
    init_logging(&config);

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Validate { file } => commands::validate::run(&file),
        Command::Evaluate { playbook, stage, evidence } => {
            commands::evaluate::run(&playbook, &stage, &evidence)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

fn init_logging(config: &EngineConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    // Logs go to stderr so stdout stays parseable JSON.
    match config.logging.format {
        LogFormat::Compact => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_max_level(log_level)
                .compact()
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_max_level(log_level)
                .pretty()
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_max_level(log_level)
                .json()
                .init();
        }
    }
}
