//! Alpha Vantage provider

use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde_json::Value;

use super::{
    HttpClient, MarketDataProvider, ProviderError, ProviderId, ProviderResult, as_f64, as_string,
    mean,
};
use crate::models::{
    CompanyProfile, FundamentalsSnapshot, KeyFinancials, MacdReading, NewsItem, PriceBar, Quote,
    RsiReading, SentimentSummary, StockNews, Timeframe,
};

const BASE_URL: &str = "https://www.alphavantage.co/query";
const REVENUE_HISTORY_YEARS: usize = 6;
const RSI_PERIOD: &str = "14";

type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Alpha Vantage market data provider
#[derive(Clone)]
pub struct AlphaVantageProvider {
    http: HttpClient,
    api_key: String,
    rate_limiter: SharedRateLimiter,
}

impl AlphaVantageProvider {
    /// Create a provider
    ///
    /// # Arguments
    /// * `api_key` - Alpha Vantage API key
    /// * `rate_limit` - Maximum requests per minute (free tier: 5)
    pub fn new(http: HttpClient, api_key: impl Into<String>, rate_limit: u32) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(rate_limit).unwrap_or(NonZeroU32::MIN));

        Self {
            http,
            api_key: api_key.into(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    async fn query(&self, function: &str, params: &[(&str, &str)]) -> ProviderResult<Value> {
        self.rate_limiter.until_ready().await;

        let mut query = vec![("function", function), ("apikey", self.api_key.as_str())];
        query.extend_from_slice(params);

        let data = self.http.get_json(BASE_URL, &query).await?;
        check_api_error(&data)?;
        Ok(data)
    }

    async fn revenue_history(&self, ticker: &str) -> ProviderResult<Vec<f64>> {
        let data = self.query("INCOME_STATEMENT", &[("symbol", ticker)]).await?;
        Ok(parse_revenue_history(&data))
    }
}

#[async_trait]
impl MarketDataProvider for AlphaVantageProvider {
    fn id(&self) -> ProviderId {
        ProviderId::AlphaVantage
    }

    async fn get_quote(&self, ticker: &str) -> ProviderResult<Option<Quote>> {
        let data = self.query("GLOBAL_QUOTE", &[("symbol", ticker)]).await?;
        Ok(parse_global_quote(ticker, &data))
    }

    async fn get_company_profile(&self, ticker: &str) -> ProviderResult<Option<CompanyProfile>> {
        let data = self.query("OVERVIEW", &[("symbol", ticker)]).await?;
        Ok(parse_profile(ticker, &data))
    }

    async fn get_ohlcv(&self, ticker: &str, timeframe: Timeframe) -> ProviderResult<Vec<PriceBar>> {
        let data = match timeframe {
            Timeframe::Intraday => {
                self.query(
                    "TIME_SERIES_INTRADAY",
                    &[("symbol", ticker), ("interval", "60min"), ("outputsize", "compact")],
                )
                .await?
            }
            Timeframe::Swing | Timeframe::Longterm => {
                self.query(
                    "TIME_SERIES_DAILY",
                    &[("symbol", ticker), ("outputsize", "compact")],
                )
                .await?
            }
        };
        Ok(parse_time_series(&data))
    }

    async fn get_fundamentals(&self, ticker: &str) -> ProviderResult<Option<FundamentalsSnapshot>> {
        let overview = self.query("OVERVIEW", &[("symbol", ticker)]).await?;
        if !is_non_empty_object(&overview) {
            return Ok(None);
        }
        let revenue_history = self.revenue_history(ticker).await?;
        Ok(Some(parse_fundamentals(ticker, &overview, revenue_history)))
    }

    async fn get_news_sentiment(&self, ticker: &str) -> ProviderResult<Option<SentimentSummary>> {
        let data = self.query("NEWS_SENTIMENT", &[("tickers", ticker)]).await?;
        Ok(parse_sentiment(ticker, &data))
    }

    async fn get_stock_news(&self, ticker: &str, limit: usize) -> ProviderResult<Option<StockNews>> {
        let data = self.query("NEWS_SENTIMENT", &[("tickers", ticker)]).await?;
        Ok(parse_news(ticker, &data, limit))
    }

    async fn get_rsi(&self, ticker: &str, timeframe: Timeframe) -> ProviderResult<Option<RsiReading>> {
        let data = self
            .query(
                "RSI",
                &[
                    ("symbol", ticker),
                    ("interval", interval(timeframe)),
                    ("time_period", RSI_PERIOD),
                    ("series_type", "close"),
                ],
            )
            .await?;
        Ok(parse_rsi(ticker, &data))
    }

    async fn get_macd(&self, ticker: &str, timeframe: Timeframe) -> ProviderResult<Option<MacdReading>> {
        let data = self
            .query(
                "MACD",
                &[
                    ("symbol", ticker),
                    ("interval", interval(timeframe)),
                    ("series_type", "close"),
                ],
            )
            .await?;
        Ok(parse_macd(ticker, &data))
    }

    async fn get_key_financials(&self, ticker: &str) -> ProviderResult<Option<KeyFinancials>> {
        let data = self.query("OVERVIEW", &[("symbol", ticker)]).await?;
        Ok(parse_key_financials(ticker, &data))
    }
}

/// Indicator interval for a holding horizon
fn interval(timeframe: Timeframe) -> &'static str {
    match timeframe {
        Timeframe::Intraday => "60min",
        Timeframe::Swing => "daily",
        Timeframe::Longterm => "weekly",
    }
}

/// Alpha Vantage reports errors and throttling inside a 200 response
fn check_api_error(data: &Value) -> ProviderResult<()> {
    if let Some(message) = data.get("Error Message") {
        return Err(ProviderError::Upstream(
            message.as_str().unwrap_or_default().to_string(),
        ));
    }
    if data.get("Note").is_some() || data.get("Information").is_some() {
        return Err(ProviderError::RateLimited {
            provider: ProviderId::AlphaVantage,
        });
    }
    Ok(())
}

fn is_non_empty_object(data: &Value) -> bool {
    data.as_object().is_some_and(|obj| !obj.is_empty())
}

fn parse_global_quote(ticker: &str, data: &Value) -> Option<Quote> {
    let quote = data.get("Global Quote")?;
    let price = as_f64(quote.get("05. price"))?;
    let change_percent = quote
        .get("10. change percent")
        .and_then(Value::as_str)
        .and_then(|raw| raw.trim_end_matches('%').parse::<f64>().ok());

    Some(Quote {
        ticker: ticker.to_string(),
        price,
        change: as_f64(quote.get("09. change")),
        change_percent,
        high: as_f64(quote.get("03. high")),
        low: as_f64(quote.get("04. low")),
        open: as_f64(quote.get("02. open")),
        previous_close: as_f64(quote.get("08. previous close")),
        timestamp: Utc::now(),
        source: ProviderId::AlphaVantage.to_string(),
    })
}

fn parse_profile(ticker: &str, data: &Value) -> Option<CompanyProfile> {
    if !is_non_empty_object(data) {
        return None;
    }

    Some(CompanyProfile {
        ticker: ticker.to_string(),
        name: as_string(data.get("Name")),
        exchange: as_string(data.get("Exchange")),
        industry: as_string(data.get("Industry")),
        sector: as_string(data.get("Sector")),
        country: as_string(data.get("Country")),
        market_cap: as_f64(data.get("MarketCapitalization")),
        website: as_string(data.get("OfficialSite")),
        ipo: as_string(data.get("IPODate")).and_then(|raw| raw.parse::<NaiveDate>().ok()),
        source: ProviderId::AlphaVantage.to_string(),
    })
}

/// Bars from the first "Time Series (...)" object, sorted ascending
///
/// Rows with unparsable dates or prices are skipped.
fn parse_time_series(data: &Value) -> Vec<PriceBar> {
    let Some(points) = data
        .as_object()
        .and_then(|obj| obj.iter().find(|(key, _)| key.contains("Time Series")))
        .and_then(|(_, series)| series.as_object())
    else {
        return Vec::new();
    };

    let mut bars: Vec<PriceBar> = points
        .iter()
        .filter_map(|(stamp, row)| {
            let date = stamp.get(..10)?.parse::<NaiveDate>().ok()?;
            Some(PriceBar {
                date,
                open: as_f64(row.get("1. open"))?,
                high: as_f64(row.get("2. high"))?,
                low: as_f64(row.get("3. low"))?,
                close: as_f64(row.get("4. close"))?,
                volume: as_f64(row.get("5. volume")).unwrap_or(0.0),
            })
        })
        .collect();

    // Stable sort: intraday rows sharing a date keep their timestamp order.
    bars.sort_by_key(|bar| bar.date);
    bars
}

fn parse_fundamentals(ticker: &str, data: &Value, revenue_history: Vec<f64>) -> FundamentalsSnapshot {
    FundamentalsSnapshot {
        ticker: ticker.to_string(),
        pe: as_f64(data.get("PERatio")),
        forward_pe: as_f64(data.get("ForwardPE")),
        ps: as_f64(data.get("PriceToSalesRatioTTM")),
        ev_ebitda: as_f64(data.get("EVToEBITDA")),
        beta: as_f64(data.get("Beta")),
        roe: as_f64(data.get("ReturnOnEquityTTM")),
        debt_to_equity: as_f64(data.get("DebtToEquity")),
        gross_margin: as_f64(data.get("GrossProfitTTM")),
        operating_margin: as_f64(data.get("OperatingMarginTTM")),
        net_margin: as_f64(data.get("ProfitMargin")),
        revenue_yoy: as_f64(data.get("QuarterlyRevenueGrowthYOY")),
        eps_yoy: as_f64(data.get("QuarterlyEarningsGrowthYOY")),
        // Trailing EPS stands in for the forward estimate.
        forward_eps_growth: as_f64(data.get("EPS")).or_else(|| as_f64(data.get("DilutedEPSTTM"))),
        revenue_history,
        source: ProviderId::AlphaVantage.to_string(),
    }
}

/// Up to six annual revenues, oldest first
fn parse_revenue_history(data: &Value) -> Vec<f64> {
    let Some(reports) = data.get("annualReports").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut revenues: Vec<f64> = reports
        .iter()
        .take(REVENUE_HISTORY_YEARS)
        .filter_map(|report| as_f64(report.get("totalRevenue")))
        .collect();
    revenues.reverse();
    revenues
}

/// Most recent row of a "Technical Analysis: <name>" series
fn latest_indicator_row<'a>(data: &'a Value, name: &str) -> Option<&'a Value> {
    let label = format!("Technical Analysis: {name}");
    data.as_object()?
        .iter()
        .find(|(key, _)| key.contains(&label))?
        .1
        .as_object()?
        .iter()
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, row)| row)
        .filter(|row| row.is_object())
}

fn parse_rsi(ticker: &str, data: &Value) -> Option<RsiReading> {
    let row = latest_indicator_row(data, "RSI")?;

    Some(RsiReading {
        ticker: ticker.to_string(),
        value: as_f64(row.get("RSI")),
        source: ProviderId::AlphaVantage.to_string(),
    })
}

fn parse_macd(ticker: &str, data: &Value) -> Option<MacdReading> {
    let row = latest_indicator_row(data, "MACD")?;

    Some(MacdReading {
        ticker: ticker.to_string(),
        macd: as_f64(row.get("MACD")),
        signal: as_f64(row.get("MACD_Signal")),
        histogram: as_f64(row.get("MACD_Hist")),
        source: ProviderId::AlphaVantage.to_string(),
    })
}

fn parse_key_financials(ticker: &str, data: &Value) -> Option<KeyFinancials> {
    if !is_non_empty_object(data) {
        return None;
    }

    Some(KeyFinancials {
        ticker: ticker.to_string(),
        market_cap: as_f64(data.get("MarketCapitalization")),
        pe_ttm: as_f64(data.get("PERatio")),
        forward_pe: as_f64(data.get("ForwardPE")),
        ps_ttm: as_f64(data.get("PriceToSalesRatioTTM")),
        beta: as_f64(data.get("Beta")),
        eps_ttm: as_f64(data.get("EPS")).or_else(|| as_f64(data.get("DilutedEPSTTM"))),
        dividend_yield: as_f64(data.get("DividendYield")),
        profit_margin: as_f64(data.get("ProfitMargin")),
        source: ProviderId::AlphaVantage.to_string(),
    })
}

fn parse_sentiment(ticker: &str, data: &Value) -> Option<SentimentSummary> {
    let feed = data.get("feed")?.as_array()?;
    let scores: Vec<f64> = feed
        .iter()
        .filter_map(|item| as_f64(item.get("overall_sentiment_score")))
        .collect();

    Some(SentimentSummary {
        ticker: ticker.to_string(),
        average_sentiment: mean(&scores),
        article_count: feed.len(),
        source: ProviderId::AlphaVantage.to_string(),
    })
}

fn parse_news(ticker: &str, data: &Value, limit: usize) -> Option<StockNews> {
    let feed = data.get("feed")?.as_array()?;
    let items = feed
        .iter()
        .filter(|entry| entry.is_object())
        .take(limit)
        .map(|entry| NewsItem {
            headline: as_string(entry.get("title")).unwrap_or_else(|| "Untitled".to_string()),
            summary: as_string(entry.get("summary")),
            source: as_string(entry.get("source")),
            url: as_string(entry.get("url")),
            published_at: as_string(entry.get("time_published"))
                .and_then(|raw| NaiveDateTime::parse_from_str(&raw, "%Y%m%dT%H%M%S").ok())
                .map(|naive| naive.and_utc()),
        })
        .collect();

    Some(StockNews {
        ticker: ticker.to_string(),
        items,
        source: ProviderId::AlphaVantage.to_string(),
    })
}
