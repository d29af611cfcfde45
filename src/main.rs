use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use fxtrend::core::log::init_logging;
use fxtrend::core::price::HistoryRange;

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

impl From<Commands> for fxtrend::AppCommand {
    fn from(cmd: Commands) -> fxtrend::AppCommand {
        match cmd {
            Commands::Refresh => fxtrend::AppCommand::Refresh,
            Commands::Process => fxtrend::AppCommand::Process,
            Commands::Sync => fxtrend::AppCommand::Sync,
            Commands::Rates => fxtrend::AppCommand::Rates,
            Commands::History { code, range } => fxtrend::AppCommand::History { code, range },
            Commands::Forecast { code, days } => fxtrend::AppCommand::Forecast {
                code,
                horizon_days: days,
            },
            Commands::Watch => fxtrend::AppCommand::Watch,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Download the latest tables into the import directory
    Refresh,
    /// Store prices from downloaded tables
    Process,
    /// Download and process in one go
    Sync,
    /// Display the latest average price of every currency
    Rates,
    /// Display the price history and trend of a currency
    History {
        /// Currency code, e.g. USD
        code: String,
        /// One of 1W, 1M, 6M, 1Y, 5Y or ALL
        #[arg(short, long, default_value = "1M")]
        range: HistoryRange,
    },
    /// Project the price of a currency from its recent trend
    Forecast {
        /// Currency code, e.g. USD
        code: String,
        /// Days to project, defaults to the configured horizon
        #[arg(short, long)]
        days: Option<u32>,
    },
    /// Keep downloading and processing on the configured schedule
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => fxtrend::cli::setup::setup_at_path(path),
            None => fxtrend::cli::setup::setup(),
        },
        Some(cmd) => fxtrend::run_command(cmd.into(), cli.config_path.as_deref()).await,
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
