pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "pizzabot",
    about = "Pizzabot operator CLI",
    long_about = "Inspect configuration, check readiness, preview the menu, and replay classified conversations.",
    after_help = "Examples:\n  pizzabot doctor --json\n  pizzabot config\n  pizzabot menu --ingredient mushrooms\n  pizzabot replay turns.jsonl"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Config file to load instead of pizzabot.toml")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, Telegram token and language service token readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Print the menu exactly as the bot would send it")]
    Menu {
        #[arg(long, help = "Only list pizzas with this ingredient")]
        ingredient: Option<String>,
    },
    #[command(about = "Feed a JSON-lines file of entity maps through the conversation engine")]
    Replay {
        #[arg(help = "One classified message (entity map) per line")]
        file: PathBuf,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config;

    let result = match cli.command {
        Command::Config => commands::CommandResult {
            exit_code: 0,
            output: commands::config::run(config_path.as_deref()),
        },
        Command::Doctor { json } => commands::doctor::run(config_path.as_deref(), json),
        Command::Menu { ingredient } => {
            commands::menu::run(config_path.as_deref(), ingredient.as_deref())
        }
        Command::Replay { file } => commands::replay::run(config_path.as_deref(), &file),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
