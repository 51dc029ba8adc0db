//! Stock research pipeline
//!
//! This crate turns a ticker into a deterministic scorecard, a Buy/Hold/Sell
//! signal and (optionally) a narrative research report. It includes:
//!
//! - A primary/secondary provider router (Alpha Vantage, then Finnhub) that
//!   never fails a request and explains every fallback
//! - Technical indicators (EMA, RSI, MACD) computed from price bars
//! - A metrics normalizer (CAGR, margin trend, volatility, drawdown)
//! - A weighted scoring engine and a risk-profile aware signal classifier
//! - Narrative sections from Claude, with a templated fallback
//!
//! # Architecture
//!
//! Data flows one way: `providers` → `indicators` / `metrics` → `scoring` →
//! `signal`, with `engine` sequencing the steps for one request. The
//! computation modules are pure functions; only the providers and the
//! narrative generator perform I/O.
//!
//! # Example
//!
//! ```rust,ignore
//! use stock_research::{RawResearchRequest, ResearchConfig, ResearchEngine};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ResearchConfig::from_env()?;
//!     let engine = ResearchEngine::from_config(&config)?;
//!
//!     let response = engine
//!         .run(RawResearchRequest {
//!             ticker: "AAPL".to_string(),
//!             output_format: Some("report".to_string()),
//!             ..Default::default()
//!         })
//!         .await?;
//!     println!("{}", serde_json::to_string_pretty(&response)?);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod indicators;
pub mod metrics;
pub mod models;
pub mod narrative;
pub mod providers;
pub mod retry;
pub mod scoring;
pub mod signal;

// Re-export main types for convenience
pub use config::{ResearchConfig, ScoringWeights};
pub use engine::ResearchEngine;
pub use error::{FieldError, ResearchError, Result};
pub use models::{
    DISCLAIMER, KeyFinancials, MacdReading, MetricsTable, OutputFormat, RawResearchRequest,
    ResearchReport, ResearchRequest, ResearchResponse, RiskProfile, RsiReading, Scorecard, Signal,
    SignalResponse, TechnicalSnapshot, TickerType, Timeframe,
};
pub use narrative::{NarrativeGenerator, TemplateNarrativeGenerator};
pub use providers::{
    DataProvider, MarketDataProvider, ProviderError, ProviderId, ProviderRouter, RoutedResult,
    detect_ticker_type,
};
pub use retry::RetryPolicy;
