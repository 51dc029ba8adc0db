//! Primary/secondary provider routing with fallback diagnostics
//!
//! Every routed operation tries the primary provider first and only calls
//! the secondary when the primary failed or returned nothing. Provider
//! errors never escape: they end up as a human-readable diagnostic on the
//! returned [`RoutedResult`].

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use super::{DataProvider, MarketDataProvider, ProviderId, ProviderResult};
use crate::models::{
    CompanyProfile, FundamentalsSnapshot, KeyFinancials, MacdReading, PriceBar, PriceQuote, Quote,
    RsiReading, SentimentSummary, StockNews, TickerType, Timeframe, normalize_ticker,
};

const NO_DATA: &str = "no data returned";
const CANCELLED: &str = "request cancelled";
const ETF_TICKERS: [&str; 7] = ["SPY", "QQQ", "DIA", "VTI", "IWM", "GLD", "TLT"];

/// Outcome of one routed operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutedResult<T> {
    /// Data from whichever provider answered, `None` when both came up empty
    pub payload: Option<T>,
    /// Provider that supplied the payload
    pub source: Option<ProviderId>,
    /// Set whenever the primary provider did not deliver
    pub fallback_diagnostic: Option<String>,
}

impl<T> RoutedResult<T> {
    fn from_primary(payload: T, source: ProviderId) -> Self {
        Self {
            payload: Some(payload),
            source: Some(source),
            fallback_diagnostic: None,
        }
    }

    fn exhausted(diagnostic: String) -> Self {
        Self {
            payload: None,
            source: None,
            fallback_diagnostic: Some(diagnostic),
        }
    }

    /// Map the payload, keeping provenance and diagnostic
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> RoutedResult<U> {
        RoutedResult {
            payload: self.payload.map(f),
            source: self.source,
            fallback_diagnostic: self.fallback_diagnostic,
        }
    }
}

/// Whether a present value still carries no usable data
pub trait Payload {
    fn is_empty_payload(&self) -> bool {
        false
    }
}

impl Payload for Quote {}
impl Payload for PriceQuote {}
impl Payload for CompanyProfile {}

impl Payload for FundamentalsSnapshot {
    fn is_empty_payload(&self) -> bool {
        [
            self.pe,
            self.forward_pe,
            self.ps,
            self.ev_ebitda,
            self.beta,
            self.roe,
            self.debt_to_equity,
            self.gross_margin,
            self.operating_margin,
            self.net_margin,
            self.revenue_yoy,
            self.eps_yoy,
            self.forward_eps_growth,
        ]
        .iter()
        .all(Option::is_none)
            && self.revenue_history.is_empty()
    }
}

impl Payload for SentimentSummary {
    fn is_empty_payload(&self) -> bool {
        self.average_sentiment.is_none() && self.article_count == 0
    }
}

impl Payload for StockNews {
    fn is_empty_payload(&self) -> bool {
        self.items.is_empty()
    }
}

impl Payload for RsiReading {
    fn is_empty_payload(&self) -> bool {
        self.value.is_none()
    }
}

impl Payload for MacdReading {
    fn is_empty_payload(&self) -> bool {
        self.macd.is_none()
    }
}

impl Payload for KeyFinancials {
    fn is_empty_payload(&self) -> bool {
        [
            self.market_cap,
            self.pe_ttm,
            self.forward_pe,
            self.ps_ttm,
            self.beta,
            self.eps_ttm,
            self.dividend_yield,
            self.profit_margin,
        ]
        .iter()
        .all(Option::is_none)
    }
}

/// Normalizes a provider return value into "data" or "no data"
pub trait IntoPayload {
    type Item;

    fn into_payload(self) -> Option<Self::Item>;
}

impl<T: Payload> IntoPayload for Option<T> {
    type Item = T;

    fn into_payload(self) -> Option<T> {
        self.filter(|payload| !payload.is_empty_payload())
    }
}

impl<T> IntoPayload for Vec<T> {
    type Item = Vec<T>;

    fn into_payload(self) -> Option<Vec<T>> {
        (!self.is_empty()).then_some(self)
    }
}

/// Result of asking one provider
#[derive(Debug)]
pub(crate) enum Attempt<T> {
    Data(T),
    Empty,
    Failed(String),
}

impl<T> Attempt<T> {
    fn from_result<R>(result: ProviderResult<R>) -> Self
    where
        R: IntoPayload<Item = T>,
    {
        match result {
            Ok(value) => value.into_payload().map_or(Self::Empty, Self::Data),
            Err(err) => Self::Failed(err.to_string()),
        }
    }

    /// Diagnostic wording for an attempt that did not deliver
    fn reason(&self) -> String {
        match self {
            Self::Data(_) => String::new(),
            Self::Empty => NO_DATA.to_string(),
            Self::Failed(detail) => format!("request failed ({detail})"),
        }
    }
}

/// Decide the outcome once the primary did not deliver
pub(crate) fn fallback<T>(
    operation: &str,
    primary: ProviderId,
    primary_reason: &str,
    secondary: ProviderId,
    second: Attempt<T>,
) -> RoutedResult<T> {
    match second {
        Attempt::Data(payload) => RoutedResult {
            payload: Some(payload),
            source: Some(secondary),
            fallback_diagnostic: Some(format!(
                "Primary provider ({primary}) {primary_reason}; using fallback provider ({secondary})."
            )),
        },
        other => RoutedResult::exhausted(exhausted_diagnostic(
            operation,
            primary,
            primary_reason,
            secondary,
            &other.reason(),
        )),
    }
}

fn exhausted_diagnostic(
    operation: &str,
    primary: ProviderId,
    primary_reason: &str,
    secondary: ProviderId,
    secondary_reason: &str,
) -> String {
    format!(
        "Both providers failed for {operation}: {primary} ({primary_reason}); {secondary} ({secondary_reason})."
    )
}

/// Rough asset class of a ticker symbol; informational only
pub fn detect_ticker_type(ticker: &str) -> TickerType {
    let ticker = normalize_ticker(ticker);
    if ticker.ends_with("USD") && ticker.contains('-') {
        TickerType::Crypto
    } else if ETF_TICKERS.contains(&ticker.as_str()) {
        TickerType::Etf
    } else {
        TickerType::Stock
    }
}

/// Routes every market data operation through a primary and a secondary provider
///
/// Generic over the provider so tests can route through mocks; production
/// code uses the closed [`DataProvider`] set.
pub struct ProviderRouter<P: MarketDataProvider = DataProvider> {
    primary: P,
    secondary: P,
    deadline: Option<Duration>,
}

impl<P: MarketDataProvider> ProviderRouter<P> {
    /// Create a router with no overall deadline
    pub fn new(primary: P, secondary: P) -> Self {
        Self {
            primary,
            secondary,
            deadline: None,
        }
    }

    /// Bound each routed operation, both attempts included
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn primary(&self) -> &P {
        &self.primary
    }

    pub fn secondary(&self) -> &P {
        &self.secondary
    }

    pub async fn get_price(&self, ticker: &str) -> RoutedResult<PriceQuote> {
        self.route("get_price", |provider| provider.get_price(ticker))
            .await
    }

    pub async fn get_quote(&self, ticker: &str) -> RoutedResult<Quote> {
        self.route("get_quote", |provider| provider.get_quote(ticker))
            .await
    }

    pub async fn get_company_profile(&self, ticker: &str) -> RoutedResult<CompanyProfile> {
        self.route("get_company_profile", |provider| {
            provider.get_company_profile(ticker)
        })
        .await
    }

    pub async fn get_ohlcv(&self, ticker: &str, timeframe: Timeframe) -> RoutedResult<Vec<PriceBar>> {
        self.route("get_ohlcv", |provider| provider.get_ohlcv(ticker, timeframe))
            .await
    }

    pub async fn get_candles(
        &self,
        ticker: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> RoutedResult<Vec<PriceBar>> {
        self.route("get_candles", |provider| {
            provider.get_candles(ticker, timeframe, limit)
        })
        .await
    }

    pub async fn get_fundamentals(&self, ticker: &str) -> RoutedResult<FundamentalsSnapshot> {
        self.route("get_fundamentals", |provider| provider.get_fundamentals(ticker))
            .await
    }

    pub async fn get_news_sentiment(&self, ticker: &str) -> RoutedResult<SentimentSummary> {
        self.route("get_news_sentiment", |provider| {
            provider.get_news_sentiment(ticker)
        })
        .await
    }

    pub async fn get_stock_news(&self, ticker: &str, limit: usize) -> RoutedResult<StockNews> {
        self.route("get_stock_news", |provider| {
            provider.get_stock_news(ticker, limit)
        })
        .await
    }

    pub async fn get_rsi(&self, ticker: &str, timeframe: Timeframe) -> RoutedResult<RsiReading> {
        self.route("get_rsi", |provider| provider.get_rsi(ticker, timeframe))
            .await
    }

    pub async fn get_macd(&self, ticker: &str, timeframe: Timeframe) -> RoutedResult<MacdReading> {
        self.route("get_macd", |provider| provider.get_macd(ticker, timeframe))
            .await
    }

    pub async fn get_key_financials(&self, ticker: &str) -> RoutedResult<KeyFinancials> {
        self.route("get_key_financials", |provider| {
            provider.get_key_financials(ticker)
        })
        .await
    }

    async fn route<'a, F, Fut, R>(&'a self, operation: &str, call: F) -> RoutedResult<R::Item>
    where
        F: Fn(&'a P) -> Fut,
        Fut: Future<Output = ProviderResult<R>>,
        R: IntoPayload,
    {
        let attempts = self.attempt_both(operation, call);

        match self.deadline {
            None => attempts.await,
            Some(deadline) => match timeout(deadline, attempts).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("{} cancelled after {:?}", operation, deadline);
                    RoutedResult::exhausted(exhausted_diagnostic(
                        operation,
                        self.primary.id(),
                        CANCELLED,
                        self.secondary.id(),
                        CANCELLED,
                    ))
                }
            },
        }
    }

    async fn attempt_both<'a, F, Fut, R>(&'a self, operation: &str, call: F) -> RoutedResult<R::Item>
    where
        F: Fn(&'a P) -> Fut,
        Fut: Future<Output = ProviderResult<R>>,
        R: IntoPayload,
    {
        let primary = self.primary.id();

        let first = match Attempt::from_result(call(&self.primary).await) {
            Attempt::Data(payload) => {
                debug!("{} served by {}", operation, primary);
                return RoutedResult::from_primary(payload, primary);
            }
            other => other,
        };
        let primary_reason = first.reason();
        match &first {
            Attempt::Failed(detail) => warn!("{} failed on {}: {}", operation, primary, detail),
            _ => debug!("{} returned no data from {}", operation, primary),
        }

        let secondary = self.secondary.id();
        let second = Attempt::from_result(call(&self.secondary).await);
        match &second {
            Attempt::Data(_) => debug!("{} served by fallback {}", operation, secondary),
            Attempt::Failed(detail) => error!("{} failed on {}: {}", operation, secondary, detail),
            Attempt::Empty => debug!("{} returned no data from {}", operation, secondary),
        }

        fallback(operation, primary, &primary_reason, secondary, second)
    }
}
