//! Upstream market data providers and the fallback router
//!
//! Exactly two providers exist, so they are modelled as a closed set
//! ([`DataProvider`]) behind one capability trait ([`MarketDataProvider`]).
//! Every provider call returns an explicit [`ProviderResult`]; an `Ok(None)`
//! or empty series means "no data" and is not an error.

pub mod alpha_vantage;
pub mod finnhub;
pub mod http;
pub mod router;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::{
    CompanyProfile, FundamentalsSnapshot, KeyFinancials, MacdReading, PriceBar, PriceQuote, Quote,
    RsiReading, SentimentSummary, StockNews, Timeframe,
};

pub use alpha_vantage::AlphaVantageProvider;
pub use finnhub::FinnhubProvider;
pub use http::HttpClient;
pub use router::{ProviderRouter, RoutedResult, detect_ticker_type};

/// Identity of an upstream provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    AlphaVantage,
    Finnhub,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlphaVantage => "alpha_vantage",
            Self::Finnhub => "finnhub",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single provider call
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Upstream answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Connection-level failure
    #[error("network error: {0}")]
    Network(String),

    /// Request exceeded the configured timeout
    #[error("request timed out")]
    Timeout,

    /// Body could not be decoded
    #[error("malformed response: {0}")]
    Decode(String),

    /// Upstream reported its rate limit
    #[error("rate limit exceeded for {provider}")]
    RateLimited { provider: ProviderId },

    /// Upstream reported an error in an otherwise valid body
    #[error("upstream error: {0}")]
    Upstream(String),
}

impl ProviderError {
    /// Whether retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout => true,
            Self::Http { status, .. } => *status >= 500,
            Self::Decode(_) | Self::RateLimited { .. } | Self::Upstream(_) => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        // Query strings carry API keys; keep them out of diagnostics.
        let err = err.without_url();
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Result of a single provider call
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Capability interface shared by every market data provider
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Provider identity used in provenance and diagnostics
    fn id(&self) -> ProviderId;

    /// Full quote snapshot
    async fn get_quote(&self, ticker: &str) -> ProviderResult<Option<Quote>>;

    /// Latest price, derived from the quote
    async fn get_price(&self, ticker: &str) -> ProviderResult<Option<PriceQuote>> {
        let quote = self.get_quote(ticker).await?;
        Ok(quote.map(|quote| PriceQuote {
            ticker: quote.ticker,
            price: quote.price,
            currency: "USD".to_string(),
            timestamp: quote.timestamp,
            source: quote.source,
        }))
    }

    /// Company profile
    async fn get_company_profile(&self, ticker: &str) -> ProviderResult<Option<CompanyProfile>>;

    /// Historical bars for the timeframe, ascending by date
    async fn get_ohlcv(&self, ticker: &str, timeframe: Timeframe) -> ProviderResult<Vec<PriceBar>>;

    /// The most recent `limit` bars (all bars when `limit` is 0)
    async fn get_candles(
        &self,
        ticker: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> ProviderResult<Vec<PriceBar>> {
        let bars = self.get_ohlcv(ticker, timeframe).await?;
        Ok(last_n(bars, limit))
    }

    /// Fundamentals snapshot
    async fn get_fundamentals(&self, ticker: &str) -> ProviderResult<Option<FundamentalsSnapshot>>;

    /// Aggregate news sentiment
    async fn get_news_sentiment(&self, ticker: &str) -> ProviderResult<Option<SentimentSummary>>;

    /// Recent headlines, at most `limit`
    async fn get_stock_news(&self, ticker: &str, limit: usize) -> ProviderResult<Option<StockNews>>;

    /// Latest RSI as computed by the provider
    async fn get_rsi(&self, ticker: &str, timeframe: Timeframe) -> ProviderResult<Option<RsiReading>>;

    /// Latest MACD line, signal and histogram as computed by the provider
    async fn get_macd(&self, ticker: &str, timeframe: Timeframe) -> ProviderResult<Option<MacdReading>>;

    /// Market cap, trailing multiples, dividend yield and margin
    async fn get_key_financials(&self, ticker: &str) -> ProviderResult<Option<KeyFinancials>>;
}

/// The closed set of production providers
pub enum DataProvider {
    AlphaVantage(AlphaVantageProvider),
    Finnhub(FinnhubProvider),
}

impl From<AlphaVantageProvider> for DataProvider {
    fn from(provider: AlphaVantageProvider) -> Self {
        Self::AlphaVantage(provider)
    }
}

impl From<FinnhubProvider> for DataProvider {
    fn from(provider: FinnhubProvider) -> Self {
        Self::Finnhub(provider)
    }
}

macro_rules! dispatch {
    ($self:ident.$method:ident($($arg:expr),*)) => {
        match $self {
            Self::AlphaVantage(provider) => provider.$method($($arg),*).await,
            Self::Finnhub(provider) => provider.$method($($arg),*).await,
        }
    };
}

#[async_trait]
impl MarketDataProvider for DataProvider {
    fn id(&self) -> ProviderId {
        match self {
            Self::AlphaVantage(_) => ProviderId::AlphaVantage,
            Self::Finnhub(_) => ProviderId::Finnhub,
        }
    }

    async fn get_quote(&self, ticker: &str) -> ProviderResult<Option<Quote>> {
        dispatch!(self.get_quote(ticker))
    }

    async fn get_company_profile(&self, ticker: &str) -> ProviderResult<Option<CompanyProfile>> {
        dispatch!(self.get_company_profile(ticker))
    }

    async fn get_ohlcv(&self, ticker: &str, timeframe: Timeframe) -> ProviderResult<Vec<PriceBar>> {
        dispatch!(self.get_ohlcv(ticker, timeframe))
    }

    async fn get_fundamentals(&self, ticker: &str) -> ProviderResult<Option<FundamentalsSnapshot>> {
        dispatch!(self.get_fundamentals(ticker))
    }

    async fn get_news_sentiment(&self, ticker: &str) -> ProviderResult<Option<SentimentSummary>> {
        dispatch!(self.get_news_sentiment(ticker))
    }

    async fn get_stock_news(&self, ticker: &str, limit: usize) -> ProviderResult<Option<StockNews>> {
        dispatch!(self.get_stock_news(ticker, limit))
    }

    async fn get_rsi(&self, ticker: &str, timeframe: Timeframe) -> ProviderResult<Option<RsiReading>> {
        dispatch!(self.get_rsi(ticker, timeframe))
    }

    async fn get_macd(&self, ticker: &str, timeframe: Timeframe) -> ProviderResult<Option<MacdReading>> {
        dispatch!(self.get_macd(ticker, timeframe))
    }

    async fn get_key_financials(&self, ticker: &str) -> ProviderResult<Option<KeyFinancials>> {
        dispatch!(self.get_key_financials(ticker))
    }
}

/// Keep the last `limit` items; 0 keeps everything
pub(crate) fn last_n<T>(mut items: Vec<T>, limit: usize) -> Vec<T> {
    if limit > 0 && items.len() > limit {
        items.drain(..items.len() - limit);
    }
    items
}

/// Lenient numeric read: accepts JSON numbers and numeric strings
pub(crate) fn as_f64(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => match s.trim() {
            "" | "None" | "none" | "null" | "-" => None,
            s => s.parse::<f64>().ok(),
        },
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Non-empty string field
pub(crate) fn as_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "None")
        .map(ToString::to_string)
}

/// Arithmetic mean, `None` for an empty slice
pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
