//! Stock research CLI
//!
//! Runs one research request (or a single routed lookup) and prints the JSON
//! result to stdout.
//!
//! # Usage
//!
//! ```bash
//! export ALPHA_VANTAGE_API_KEY="..."
//! export FINNHUB_API_KEY="..."
//! export CLAUDE_API_KEY="..."   # optional, templated narrative without it
//!
//! cargo run --bin stock-research -- research --ticker AAPL --compare MSFT --format report
//! cargo run --bin stock-research -- quote AAPL
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use research_utils::{AppInfo, LogFormat, init_tracing};
use serde::Serialize;
use stock_research::models::normalize_ticker;
use stock_research::{RawResearchRequest, ResearchConfig, ResearchEngine, Timeframe};
use tracing::info;

#[derive(Parser)]
#[command(name = "stock-research", version, about = "Provider-fallback stock research")]
struct Cli {
    /// Log format: text or json (overrides LOG_FORMAT)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Score a ticker and print a signal or a full report
    Research {
        /// Ticker symbol to analyze
        #[arg(long)]
        ticker: String,

        /// Optional peer ticker for a P/E comparison note
        #[arg(long)]
        compare: Option<String>,

        /// intraday, swing or longterm
        #[arg(long)]
        timeframe: Option<String>,

        /// conservative, moderate or aggressive
        #[arg(long)]
        risk_profile: Option<String>,

        /// signal or report
        #[arg(long)]
        format: Option<String>,
    },
    /// Latest price
    Price { ticker: String },
    /// Full quote snapshot
    Quote { ticker: String },
    /// Company profile
    Profile { ticker: String },
    /// Historical bars
    Ohlcv {
        ticker: String,
        #[arg(long, default_value = "swing")]
        timeframe: Timeframe,
        /// Keep only the most recent bars (0 keeps all)
        #[arg(long, default_value_t = 0)]
        limit: usize,
    },
    /// Indicator snapshot computed from historical bars
    Technicals {
        ticker: String,
        #[arg(long, default_value = "swing")]
        timeframe: Timeframe,
    },
    /// Provider-computed RSI(14)
    Rsi {
        ticker: String,
        #[arg(long, default_value = "swing")]
        timeframe: Timeframe,
    },
    /// Provider-computed MACD
    Macd {
        ticker: String,
        #[arg(long, default_value = "swing")]
        timeframe: Timeframe,
    },
    /// Fundamentals snapshot
    Fundamentals { ticker: String },
    /// Market cap, trailing multiples, dividend yield and margin
    KeyFinancials { ticker: String },
    /// Aggregate news sentiment
    Sentiment { ticker: String },
    /// Recent headlines
    News {
        ticker: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let app = AppInfo::from_env();
    init_tracing(&app.log_level, cli.log_format.unwrap_or(app.log_format));
    info!("{} v{}", app.app_name, app.app_version);

    let config = ResearchConfig::from_env().context("Failed to load configuration")?;
    let engine = ResearchEngine::from_config(&config).context("Failed to initialize providers")?;
    let router = engine.router();

    match cli.command {
        Command::Research {
            ticker,
            compare,
            timeframe,
            risk_profile,
            format,
        } => {
            let response = engine
                .run(RawResearchRequest {
                    ticker,
                    comparison_ticker: compare,
                    timeframe,
                    risk_profile,
                    output_format: format,
                })
                .await?;
            print_json(&response)
        }
        Command::Price { ticker } => print_json(&router.get_price(&normalize_ticker(&ticker)).await),
        Command::Quote { ticker } => print_json(&router.get_quote(&normalize_ticker(&ticker)).await),
        Command::Profile { ticker } => {
            print_json(&router.get_company_profile(&normalize_ticker(&ticker)).await)
        }
        Command::Ohlcv {
            ticker,
            timeframe,
            limit,
        } => print_json(
            &router
                .get_candles(&normalize_ticker(&ticker), timeframe, limit)
                .await,
        ),
        Command::Technicals { ticker, timeframe } => {
            print_json(&engine.technicals(&normalize_ticker(&ticker), timeframe).await)
        }
        Command::Rsi { ticker, timeframe } => {
            print_json(&router.get_rsi(&normalize_ticker(&ticker), timeframe).await)
        }
        Command::Macd { ticker, timeframe } => {
            print_json(&router.get_macd(&normalize_ticker(&ticker), timeframe).await)
        }
        Command::Fundamentals { ticker } => {
            print_json(&router.get_fundamentals(&normalize_ticker(&ticker)).await)
        }
        Command::KeyFinancials { ticker } => {
            print_json(&router.get_key_financials(&normalize_ticker(&ticker)).await)
        }
        Command::Sentiment { ticker } => {
            print_json(&router.get_news_sentiment(&normalize_ticker(&ticker)).await)
        }
        Command::News { ticker, limit } => {
            print_json(&router.get_stock_news(&normalize_ticker(&ticker), limit).await)
        }
    }
}
