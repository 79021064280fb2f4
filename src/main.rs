use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use kalshi_collector::app::{collect, correlate_news, import_news, CorrelateOptions};
use kalshi_collector::config::Config;
use kalshi_collector::error::Result;
use kalshi_collector::logging::init;

#[derive(Parser, Debug)]
#[command(name = "kalshi-collector", about = "Collects Kalshi markets into a local database")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch open events and update the market tables
    Collect {
        /// Keep running, collecting every N seconds
        #[arg(long, value_name = "SECS")]
        watch: Option<u64>,
    },
    /// Manage externally collected news
    News {
        #[command(subcommand)]
        command: NewsCommand,
    },
    /// Link recently closed markets to news published before they closed
    Correlate {
        #[arg(long, default_value_t = 48)]
        window_hours: i64,
        #[arg(long, default_value_t = 2)]
        min_overlap: usize,
        /// Closed markets from the last N days
        #[arg(long, default_value_t = 30)]
        days: i64,
    },
}

#[derive(Subcommand, Debug)]
enum NewsCommand {
    /// Import a JSON array of news events
    Import { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    init(config.debug);

    match cli.command.unwrap_or(Command::Collect { watch: None }) {
        Command::Collect { watch } => collect(config, watch.map(Duration::from_secs)).await,
        Command::News {
            command: NewsCommand::Import { file },
        } => import_news(config, &file).await,
        Command::Correlate {
            window_hours,
            min_overlap,
            days,
        } => {
            let options = CorrelateOptions::from_args(window_hours, min_overlap, days)?;
            correlate_news(config, options).await
        }
    }
}
