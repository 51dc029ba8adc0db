//! Finnhub provider
//!
//! Fallback provider. Finnhub takes the token as a query parameter and
//! reports missing data with zeroed or `"no_data"` bodies rather than errors.

use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde_json::Value;

use super::{
    HttpClient, MarketDataProvider, ProviderId, ProviderResult, as_f64, as_string, mean,
};
use crate::models::{
    CompanyProfile, FundamentalsSnapshot, KeyFinancials, MacdReading, NewsItem, PriceBar, Quote,
    RsiReading, SentimentSummary, StockNews, Timeframe,
};

const BASE_URL: &str = "https://finnhub.io/api/v1";
const NEWS_LOOKBACK_DAYS: i64 = 30;
const SENTIMENT_SAMPLE: usize = 30;

type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Finnhub market data provider
#[derive(Clone)]
pub struct FinnhubProvider {
    http: HttpClient,
    api_key: String,
    rate_limiter: SharedRateLimiter,
}

impl FinnhubProvider {
    /// Create a provider
    ///
    /// # Arguments
    /// * `api_key` - Finnhub API token
    /// * `rate_limit` - Maximum requests per minute (free tier: 60)
    pub fn new(http: HttpClient, api_key: impl Into<String>, rate_limit: u32) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(rate_limit).unwrap_or(NonZeroU32::MIN));

        Self {
            http,
            api_key: api_key.into(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    async fn get(&self, path: &str, params: &[(&str, &str)]) -> ProviderResult<Value> {
        self.rate_limiter.until_ready().await;

        let url = format!("{BASE_URL}{path}");
        let mut query = params.to_vec();
        query.push(("token", self.api_key.as_str()));

        self.http.get_json(&url, &query).await
    }

    async fn company_news(&self, ticker: &str) -> ProviderResult<Value> {
        let to = Utc::now().date_naive();
        let from = to - Duration::days(NEWS_LOOKBACK_DAYS);
        let (from, to) = (from.to_string(), to.to_string());

        self.get(
            "/company-news",
            &[("symbol", ticker), ("from", from.as_str()), ("to", to.as_str())],
        )
        .await
    }

    /// `/indicator` over the candle window of `timeframe`
    async fn indicator(
        &self,
        ticker: &str,
        timeframe: Timeframe,
        params: &[(&str, &str)],
    ) -> ProviderResult<Value> {
        let (from, to) = time_window(timeframe, Utc::now());
        let (from, to) = (from.to_string(), to.to_string());

        let mut query = vec![
            ("symbol", ticker),
            ("resolution", resolution(timeframe)),
            ("from", from.as_str()),
            ("to", to.as_str()),
        ];
        query.extend_from_slice(params);

        self.get("/indicator", &query).await
    }
}

#[async_trait]
impl MarketDataProvider for FinnhubProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Finnhub
    }

    async fn get_quote(&self, ticker: &str) -> ProviderResult<Option<Quote>> {
        let data = self.get("/quote", &[("symbol", ticker)]).await?;
        Ok(parse_quote(ticker, &data))
    }

    async fn get_company_profile(&self, ticker: &str) -> ProviderResult<Option<CompanyProfile>> {
        let data = self.get("/stock/profile2", &[("symbol", ticker)]).await?;
        Ok(parse_profile(ticker, &data))
    }

    async fn get_ohlcv(&self, ticker: &str, timeframe: Timeframe) -> ProviderResult<Vec<PriceBar>> {
        let (from, to) = time_window(timeframe, Utc::now());
        let (from, to) = (from.to_string(), to.to_string());

        let data = self
            .get(
                "/stock/candle",
                &[
                    ("symbol", ticker),
                    ("resolution", resolution(timeframe)),
                    ("from", from.as_str()),
                    ("to", to.as_str()),
                ],
            )
            .await?;
        Ok(parse_candles(&data))
    }

    async fn get_fundamentals(&self, ticker: &str) -> ProviderResult<Option<FundamentalsSnapshot>> {
        let data = self
            .get("/stock/metric", &[("symbol", ticker), ("metric", "all")])
            .await?;
        Ok(parse_fundamentals(ticker, &data))
    }

    async fn get_news_sentiment(&self, ticker: &str) -> ProviderResult<Option<SentimentSummary>> {
        let data = self.company_news(ticker).await?;
        Ok(parse_sentiment(ticker, &data))
    }

    async fn get_stock_news(&self, ticker: &str, limit: usize) -> ProviderResult<Option<StockNews>> {
        let data = self.company_news(ticker).await?;
        Ok(parse_news(ticker, &data, limit))
    }

    async fn get_rsi(&self, ticker: &str, timeframe: Timeframe) -> ProviderResult<Option<RsiReading>> {
        let data = self
            .indicator(ticker, timeframe, &[("indicator", "rsi"), ("timeperiod", "14")])
            .await?;
        Ok(parse_rsi(ticker, &data))
    }

    async fn get_macd(&self, ticker: &str, timeframe: Timeframe) -> ProviderResult<Option<MacdReading>> {
        let data = self
            .indicator(ticker, timeframe, &[("indicator", "macd")])
            .await?;
        Ok(parse_macd(ticker, &data))
    }

    async fn get_key_financials(&self, ticker: &str) -> ProviderResult<Option<KeyFinancials>> {
        let profile = self.get("/stock/profile2", &[("symbol", ticker)]).await?;
        let metrics = self
            .get("/stock/metric", &[("symbol", ticker), ("metric", "all")])
            .await?;
        Ok(parse_key_financials(ticker, &profile, &metrics))
    }
}

fn resolution(timeframe: Timeframe) -> &'static str {
    match timeframe {
        Timeframe::Intraday => "60",
        Timeframe::Swing | Timeframe::Longterm => "D",
    }
}

/// Unix `(from, to)` seconds for the candle lookback of a timeframe
fn time_window(timeframe: Timeframe, now: DateTime<Utc>) -> (i64, i64) {
    let lookback = match timeframe {
        Timeframe::Intraday => Duration::days(30),
        Timeframe::Swing => Duration::days(365),
        Timeframe::Longterm => Duration::days(3 * 365),
    };
    ((now - lookback).timestamp(), now.timestamp())
}

fn parse_quote(ticker: &str, data: &Value) -> Option<Quote> {
    // A zero current price is how Finnhub answers unknown symbols.
    let price = as_f64(data.get("c")).filter(|price| *price != 0.0)?;
    let timestamp = data
        .get("t")
        .and_then(Value::as_i64)
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now);

    Some(Quote {
        ticker: ticker.to_string(),
        price,
        change: as_f64(data.get("d")),
        change_percent: as_f64(data.get("dp")),
        high: as_f64(data.get("h")),
        low: as_f64(data.get("l")),
        open: as_f64(data.get("o")),
        previous_close: as_f64(data.get("pc")),
        timestamp,
        source: ProviderId::Finnhub.to_string(),
    })
}

fn parse_profile(ticker: &str, data: &Value) -> Option<CompanyProfile> {
    if data.as_object().is_none_or(serde_json::Map::is_empty) {
        return None;
    }

    Some(CompanyProfile {
        ticker: ticker.to_string(),
        name: as_string(data.get("name")),
        exchange: as_string(data.get("exchange")),
        industry: as_string(data.get("finnhubIndustry")),
        sector: None,
        country: as_string(data.get("country")),
        market_cap: as_f64(data.get("marketCapitalization")),
        website: as_string(data.get("weburl")),
        ipo: as_string(data.get("ipo")).and_then(|raw| raw.parse::<NaiveDate>().ok()),
        source: ProviderId::Finnhub.to_string(),
    })
}

/// Zip the parallel candle arrays into bars; anything but `s == "ok"` is empty
fn parse_candles(data: &Value) -> Vec<PriceBar> {
    if data.get("s").and_then(Value::as_str) != Some("ok") {
        return Vec::new();
    }

    let column = |key: &str| -> Vec<Value> {
        data.get(key)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    };
    let (times, opens, highs, lows, closes, volumes) = (
        column("t"),
        column("o"),
        column("h"),
        column("l"),
        column("c"),
        column("v"),
    );

    let mut bars: Vec<PriceBar> = times
        .iter()
        .enumerate()
        .filter_map(|(i, stamp)| {
            let date = DateTime::from_timestamp(stamp.as_i64()?, 0)?.date_naive();
            Some(PriceBar {
                date,
                open: as_f64(opens.get(i))?,
                high: as_f64(highs.get(i))?,
                low: as_f64(lows.get(i))?,
                close: as_f64(closes.get(i))?,
                volume: as_f64(volumes.get(i)).unwrap_or(0.0),
            })
        })
        .collect();

    bars.sort_by_key(|bar| bar.date);
    bars
}

fn parse_fundamentals(ticker: &str, data: &Value) -> Option<FundamentalsSnapshot> {
    let metric = data.get("metric").filter(|m| m.is_object())?;
    let field = |key: &str| as_f64(metric.get(key));

    Some(FundamentalsSnapshot {
        ticker: ticker.to_string(),
        pe: field("peTTM"),
        forward_pe: field("forwardPE"),
        ps: field("psTTM"),
        ev_ebitda: field("evToEbitdaTTM"),
        beta: field("beta"),
        roe: field("roeTTM"),
        debt_to_equity: field("totalDebt/totalEquityQuarterly"),
        gross_margin: field("grossMarginTTM"),
        operating_margin: field("operatingMarginTTM"),
        net_margin: field("netMarginTTM"),
        revenue_yoy: field("revenueGrowthTTMYoy"),
        eps_yoy: field("epsGrowthTTMYoy"),
        forward_eps_growth: field("epsGrowth5Y"),
        revenue_history: Vec::new(),
        source: ProviderId::Finnhub.to_string(),
    })
}

/// Last element of an indicator column
fn last_value(data: &Value, key: &str) -> Option<f64> {
    as_f64(data.get(key)?.as_array()?.last())
}

fn indicator_ok(data: &Value) -> bool {
    data.get("s").and_then(Value::as_str) == Some("ok")
}

fn parse_rsi(ticker: &str, data: &Value) -> Option<RsiReading> {
    let values = data.get("rsi")?.as_array()?;
    if !indicator_ok(data) || values.is_empty() {
        return None;
    }

    Some(RsiReading {
        ticker: ticker.to_string(),
        value: as_f64(values.last()),
        source: ProviderId::Finnhub.to_string(),
    })
}

fn parse_macd(ticker: &str, data: &Value) -> Option<MacdReading> {
    let values = data.get("macd")?.as_array()?;
    if !indicator_ok(data) || values.is_empty() {
        return None;
    }

    Some(MacdReading {
        ticker: ticker.to_string(),
        macd: as_f64(values.last()),
        signal: last_value(data, "signal"),
        histogram: last_value(data, "hist"),
        source: ProviderId::Finnhub.to_string(),
    })
}

/// Market cap from the profile, everything else from `/stock/metric`
fn parse_key_financials(ticker: &str, profile: &Value, data: &Value) -> Option<KeyFinancials> {
    if !data.is_object() {
        return None;
    }
    let metric = data.get("metric").filter(|m| m.is_object());
    let field = |key: &str| as_f64(metric.and_then(|m| m.get(key)));

    Some(KeyFinancials {
        ticker: ticker.to_string(),
        market_cap: as_f64(profile.get("marketCapitalization")),
        pe_ttm: field("peTTM"),
        forward_pe: field("forwardPE"),
        ps_ttm: field("psTTM"),
        beta: field("beta"),
        eps_ttm: field("epsTTM"),
        dividend_yield: field("dividendYieldIndicatedAnnual"),
        profit_margin: field("netMarginTTM"),
        source: ProviderId::Finnhub.to_string(),
    })
}

fn parse_sentiment(ticker: &str, data: &Value) -> Option<SentimentSummary> {
    let articles = data.as_array()?;
    let scores: Vec<f64> = articles
        .iter()
        .take(SENTIMENT_SAMPLE)
        .filter_map(|article| as_f64(article.get("sentiment")))
        .collect();

    Some(SentimentSummary {
        ticker: ticker.to_string(),
        average_sentiment: mean(&scores),
        article_count: articles.len(),
        source: ProviderId::Finnhub.to_string(),
    })
}

fn parse_news(ticker: &str, data: &Value, limit: usize) -> Option<StockNews> {
    let articles = data.as_array()?;
    let items = articles
        .iter()
        .filter(|article| article.is_object())
        .take(limit)
        .map(|article| NewsItem {
            headline: as_string(article.get("headline")).unwrap_or_else(|| "Untitled".to_string()),
            summary: as_string(article.get("summary")),
            source: as_string(article.get("source")),
            url: as_string(article.get("url")),
            published_at: article
                .get("datetime")
                .and_then(Value::as_i64)
                .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        })
        .collect();

    Some(StockNews {
        ticker: ticker.to_string(),
        items,
        source: ProviderId::Finnhub.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResearchConfig;
    use serde_json::json;

    #[test]
    fn test_provider_creation() {
        let http = HttpClient::from_config(&ResearchConfig::default()).unwrap();
        let provider = FinnhubProvider::new(http, "token", 60);
        assert_eq!(provider.id(), ProviderId::Finnhub);
    }

    #[test]
    fn test_time_window_and_resolution() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let (from, to) = time_window(Timeframe::Intraday, now);
        assert_eq!(to - from, 30 * 86_400);
        let (from, to) = time_window(Timeframe::Longterm, now);
        assert_eq!(to - from, 3 * 365 * 86_400);

        assert_eq!(resolution(Timeframe::Intraday), "60");
        assert_eq!(resolution(Timeframe::Swing), "D");
    }

    #[test]
    fn test_parse_quote() {
        let data = json!({"c": 261.74, "d": 1.2, "dp": 0.46, "h": 263.3, "l": 260.68, "o": 261.07, "pc": 260.54, "t": 1_700_000_000});
        let quote = parse_quote("AAPL", &data).unwrap();
        assert_eq!(quote.price, 261.74);
        assert_eq!(quote.previous_close, Some(260.54));
        assert_eq!(quote.timestamp.timestamp(), 1_700_000_000);

        assert!(parse_quote("NOPE", &json!({"c": 0, "d": null})).is_none());
    }

    #[test]
    fn test_parse_candles() {
        let data = json!({
            "s": "ok",
            "t": [1_700_086_400, 1_700_000_000],
            "o": [2.0, 1.0],
            "h": [2.5, 1.5],
            "l": [1.5, 0.5],
            "c": [2.2, 1.1],
            "v": [200, 100]
        });
        let bars = parse_candles(&data);
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 1.1);
        assert_eq!(bars[1].volume, 200.0);

        assert!(parse_candles(&json!({"s": "no_data"})).is_empty());
    }

    #[test]
    fn test_parse_fundamentals() {
        let data = json!({
            "metric": {
                "peTTM": 29.4,
                "psTTM": 7.6,
                "roeTTM": 1.47,
                "totalDebt/totalEquityQuarterly": 1.79,
                "epsGrowth5Y": 15.1
            }
        });
        let snapshot = parse_fundamentals("AAPL", &data).unwrap();
        assert_eq!(snapshot.pe, Some(29.4));
        assert_eq!(snapshot.debt_to_equity, Some(1.79));
        assert_eq!(snapshot.forward_eps_growth, Some(15.1));
        assert!(snapshot.revenue_history.is_empty());

        assert!(parse_fundamentals("AAPL", &json!({})).is_none());
    }

    #[test]
    fn test_parse_indicators() {
        let rsi = json!({"s": "ok", "rsi": [0, 48.2, 57.9], "t": [1, 2, 3]});
        assert_eq!(parse_rsi("AAPL", &rsi).unwrap().value, Some(57.9));
        assert!(parse_rsi("AAPL", &json!({"s": "no_data", "rsi": [50.0]})).is_none());
        assert!(parse_rsi("AAPL", &json!({"s": "ok", "rsi": []})).is_none());

        let macd = json!({"s": "ok", "macd": [0.8, 1.1], "signal": [0.6, 0.9], "hist": [0.2, 0.2]});
        let reading = parse_macd("AAPL", &macd).unwrap();
        assert_eq!(reading.macd, Some(1.1));
        assert_eq!(reading.signal, Some(0.9));
        assert_eq!(reading.histogram, Some(0.2));
        assert_eq!(reading.source, "finnhub");

        let partial = parse_macd("AAPL", &json!({"s": "ok", "macd": [1.0]})).unwrap();
        assert_eq!(partial.signal, None);
        assert_eq!(partial.histogram, None);
    }

    #[test]
    fn test_parse_key_financials() {
        let profile = json!({"name": "Apple Inc", "marketCapitalization": 2_900_000.0});
        let metrics = json!({
            "metric": {
                "peTTM": 29.4,
                "epsTTM": 6.42,
                "dividendYieldIndicatedAnnual": 0.5,
                "netMarginTTM": 25.3
            }
        });
        let financials = parse_key_financials("AAPL", &profile, &metrics).unwrap();
        assert_eq!(financials.market_cap, Some(2_900_000.0));
        assert_eq!(financials.eps_ttm, Some(6.42));
        assert_eq!(financials.profit_margin, Some(25.3));
        assert_eq!(financials.forward_pe, None);

        // Missing profile still yields the metric fields
        let financials = parse_key_financials("AAPL", &json!({}), &metrics).unwrap();
        assert_eq!(financials.market_cap, None);
        assert_eq!(financials.pe_ttm, Some(29.4));

        assert!(parse_key_financials("AAPL", &profile, &json!([])).is_none());
    }

    #[test]
    fn test_parse_news_and_sentiment() {
        let data = json!([
            {"headline": "Record quarter", "datetime": 1_700_000_000, "sentiment": 0.6},
            {"headline": "Supply worries", "source": "Wire", "sentiment": 0.2}
        ]);

        let sentiment = parse_sentiment("AAPL", &data).unwrap();
        assert_eq!(sentiment.article_count, 2);
        assert!((sentiment.average_sentiment.unwrap() - 0.4).abs() < 1e-9);

        let news = parse_news("AAPL", &data, 1).unwrap();
        assert_eq!(news.items.len(), 1);
        assert_eq!(news.items[0].headline, "Record quarter");
        assert!(news.items[0].published_at.is_some());

        let empty = parse_news("AAPL", &json!([]), 5).unwrap();
        assert!(empty.items.is_empty());
    }
}
