use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use sweep_backtest::api::MarketDataClient;
use sweep_backtest::backtest::BacktestOrchestrator;
use sweep_backtest::config::{DataPolicy, Settings};
use sweep_backtest::models::{TestParameters, TradeLocation};
use sweep_backtest::sweep::classify;

#[derive(Parser)]
#[command(name = "sweep-backtest")]
#[command(about = "Backtest directional option sweeps against realized price moves", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a sweep backtest
    Run {
        /// Underlying symbol (e.g., "SPY")
        #[arg(short, long)]
        ticker: String,
        /// First trade date (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,
        /// Last trade date (YYYY-MM-DD)
        #[arg(long)]
        end: NaiveDate,
        /// Days between the sweep and the exit price (1-30)
        #[arg(long, default_value_t = 5)]
        hold: u32,
        /// Trade locations to include, comma separated
        #[arg(short, long, value_delimiter = ',', default_value = "at-ask,above-ask,at-bid,below-bid")]
        locations: Vec<TradeLocation>,
        /// Data policy: fallback, live-only or synthetic-only (overrides settings)
        #[arg(long)]
        policy: Option<DataPolicy>,
        /// Print the full outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// List trade locations and the side each one implies
    Locations,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let settings = Settings::load().context("Failed to load settings")?;
    setup_logging(&settings.log_filter);

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            ticker,
            start,
            end,
            hold,
            locations,
            policy,
            json,
        } => {
            let params = TestParameters::new(&ticker, start, end, hold, locations)?;
            let orchestrator =
                build_orchestrator(&settings, policy.unwrap_or(settings.backtest.data_policy))?;

            let progress = |percent: u8, status: &str| {
                tracing::info!("[{:>3}%] {}", percent, status);
            };

            let outcome = orchestrator.run_test(&params, &progress).await?;

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&outcome).context("Failed to serialize outcome")?
                );
            } else {
                outcome.print_report();
            }
        }
        Commands::Locations => {
            println!("{:<12} {:>8}", "Location", "Side");
            println!("{}", "─".repeat(21));
            for location in TradeLocation::ALL {
                println!("{:<12} {:>8}", location.as_str(), classify(location));
            }
        }
    }

    Ok(())
}

// ============================================================================
// Initialization Functions
// ============================================================================

fn setup_logging(filter: &str) {
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_orchestrator(settings: &Settings, policy: DataPolicy) -> anyhow::Result<BacktestOrchestrator> {
    let mut backtest = settings.backtest.clone();
    backtest.data_policy = policy;
    let orchestrator = BacktestOrchestrator::from_settings(&backtest);

    if policy == DataPolicy::SyntheticOnly {
        return Ok(orchestrator);
    }

    match &settings.market_data.api_key {
        Some(api_key) => {
            let client = MarketDataClient::new(&settings.market_data, api_key.as_str())
                .context("Failed to build market data client")?;
            tracing::info!("Live market data: {}", settings.market_data.base_url);
            Ok(orchestrator.with_source(Arc::new(client)))
        }
        None => {
            tracing::warn!(
                "No market data API key configured (SWEEP_MARKET_DATA__API_KEY); policy is {}",
                policy
            );
            Ok(orchestrator)
        }
    }
}
