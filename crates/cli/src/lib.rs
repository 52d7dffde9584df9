pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "parley",
    about = "Parley operator CLI",
    long_about = "Prepare the trading database, inspect stock and configuration, and talk to the \
                  merchant from a terminal.",
    after_help = "Examples:\n  parley migrate\n  parley seed --clean\n  parley inventory 1\n  \
                  parley chat"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo world (pirate merchant, player and starter catalog)")]
    Seed {
        #[arg(long, help = "Wipe entities, stock, negotiations and trade history first")]
        clean: bool,
    },
    #[command(about = "List what an entity holds, with unit prices")]
    Inventory {
        #[arg(help = "Entity id, e.g. 1 for the demo merchant")]
        entity_id: String,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Talk to the merchant interactively (/reset drops an offer, /quit exits)")]
    Chat,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed { clean } => commands::seed::run(clean),
        Command::Inventory { entity_id } => commands::inventory::run(&entity_id),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Chat => commands::chat::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
