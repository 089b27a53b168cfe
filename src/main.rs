use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use leafrates::cli::setup::setup;
use leafrates::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for leafrates::AppCommand {
    fn from(cmd: Commands) -> leafrates::AppCommand {
        match cmd {
            Commands::Rates { json } => leafrates::AppCommand::Rates { json },
            Commands::Rate { code } => leafrates::AppCommand::Rate { code },
            Commands::Refresh => leafrates::AppCommand::Refresh,
            Commands::Provider { index } => leafrates::AppCommand::SelectProvider(index),
            Commands::Currency { code } => leafrates::AppCommand::SelectCurrency(code),
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Display all exchange rates
    Rates {
        /// Print rows as JSON
        #[arg(long)]
        json: bool,
    },
    /// Display the rate for one currency, with fallbacks
    Rate { code: Option<String> },
    /// Refresh rates now, ignoring the cache age
    Refresh,
    /// Select the LEAF/BTC conversion provider
    Provider { index: usize },
    /// Set the preferred currency
    Currency { code: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => setup(),
        Some(cmd) => leafrates::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
