//! Request-scoped value types shared by the pipeline

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FieldError, ResearchError, Result};

/// Disclaimer attached to every response
pub const DISCLAIMER: &str =
    "For research and educational use only. Not investment advice; no orders are placed.";

/// One daily (or intraday) OHLCV bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Closing prices in ascending date order, whatever order the bars arrived in
pub fn sorted_closes(bars: &[PriceBar]) -> Vec<f64> {
    let mut sorted: Vec<&PriceBar> = bars.iter().collect();
    sorted.sort_by_key(|bar| bar.date);
    sorted.into_iter().map(|bar| bar.close).collect()
}

/// Latest traded price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub ticker: String,
    pub price: f64,
    pub currency: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

/// Full quote snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub ticker: String,
    pub price: f64,
    pub change: Option<f64>,
    pub change_percent: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub open: Option<f64>,
    pub previous_close: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

/// Company profile
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub ticker: String,
    pub name: Option<String>,
    pub exchange: Option<String>,
    pub industry: Option<String>,
    pub sector: Option<String>,
    pub country: Option<String>,
    pub market_cap: Option<f64>,
    pub website: Option<String>,
    pub ipo: Option<NaiveDate>,
    pub source: String,
}

/// Point-in-time company ratios plus revenue history (oldest first)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FundamentalsSnapshot {
    pub ticker: String,
    pub pe: Option<f64>,
    pub forward_pe: Option<f64>,
    pub ps: Option<f64>,
    pub ev_ebitda: Option<f64>,
    pub beta: Option<f64>,
    pub roe: Option<f64>,
    pub debt_to_equity: Option<f64>,
    pub gross_margin: Option<f64>,
    pub operating_margin: Option<f64>,
    pub net_margin: Option<f64>,
    pub revenue_yoy: Option<f64>,
    pub eps_yoy: Option<f64>,
    /// Populated from trailing EPS figures upstream, not a forward estimate
    pub forward_eps_growth: Option<f64>,
    pub revenue_history: Vec<f64>,
    pub source: String,
}

/// A single news headline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub headline: String,
    pub summary: Option<String>,
    pub source: Option<String>,
    pub url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Recent headlines for a ticker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockNews {
    pub ticker: String,
    pub items: Vec<NewsItem>,
    pub source: String,
}

/// Aggregate news sentiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentSummary {
    pub ticker: String,
    pub average_sentiment: Option<f64>,
    pub article_count: usize,
    pub source: String,
}

/// Latest provider-computed RSI(14)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RsiReading {
    pub ticker: String,
    pub value: Option<f64>,
    pub source: String,
}

/// Latest provider-computed MACD(12, 26, 9)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacdReading {
    pub ticker: String,
    pub macd: Option<f64>,
    pub signal: Option<f64>,
    pub histogram: Option<f64>,
    pub source: String,
}

/// Headline valuation and profitability figures
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct KeyFinancials {
    pub ticker: String,
    pub market_cap: Option<f64>,
    pub pe_ttm: Option<f64>,
    pub forward_pe: Option<f64>,
    pub ps_ttm: Option<f64>,
    pub beta: Option<f64>,
    pub eps_ttm: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub profit_margin: Option<f64>,
    pub source: String,
}

/// Indicator values computed from a bar series
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TechnicalSnapshot {
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub ema_20: Option<f64>,
    pub ema_50: Option<f64>,
    pub ema_200: Option<f64>,
    pub source: String,
}

/// Canonical metrics consumed by scoring; `None` means unknown
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricsTable {
    pub revenue_yoy: Option<f64>,
    pub revenue_cagr_3y: Option<f64>,
    pub revenue_cagr_5y: Option<f64>,
    pub eps_yoy: Option<f64>,
    pub forward_eps_growth: Option<f64>,
    pub margin_trend: Option<f64>,
    pub gross_margin: Option<f64>,
    pub operating_margin: Option<f64>,
    pub net_margin: Option<f64>,
    pub roe: Option<f64>,
    pub roic: Option<f64>,
    pub debt_equity: Option<f64>,
    pub pe: Option<f64>,
    pub forward_pe: Option<f64>,
    pub ps: Option<f64>,
    pub ev_ebitda: Option<f64>,
    pub beta: Option<f64>,
    pub volatility_proxy: Option<f64>,
    pub drawdown_risk: Option<f64>,
}

/// Five bounded sub-scores and their weighted composite
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scorecard {
    pub value: f64,
    pub growth: f64,
    pub quality: f64,
    pub momentum: f64,
    pub risk: f64,
    pub composite: f64,
}

/// Discrete trading signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    Buy,
    Hold,
    Sell,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Buy => "Buy",
            Self::Hold => "Hold",
            Self::Sell => "Sell",
        })
    }
}

/// Rough asset class of a ticker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TickerType {
    Stock,
    Etf,
    Crypto,
}

/// Narrative sections produced for a full report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeSections {
    pub executive_summary: String,
    pub growth_analysis: String,
    pub valuation_analysis: String,
    pub risk_assessment: String,
    pub competitive_positioning: String,
    pub final_investment_view: String,
    pub confidence: f64,
    pub key_drivers: Vec<String>,
    pub bear_case: String,
    pub bull_case: String,
    pub assumptions: Vec<String>,
}

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Wire name of this value
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            /// All accepted wire names
            pub fn variants() -> &'static [&'static str] {
                &[$($text),+]
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
                match value.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(format!(
                        "unknown value '{}' (expected one of: {})",
                        other,
                        Self::variants().join(", ")
                    )),
                }
            }
        }
    };
}

string_enum! {
    /// Caller sensitivity altering the Buy/Sell thresholds
    RiskProfile {
        Conservative => "conservative",
        Moderate => "moderate",
        Aggressive => "aggressive",
    }
}

string_enum! {
    /// Holding horizon; selects the bar resolution and lookback
    Timeframe {
        Intraday => "intraday",
        Swing => "swing",
        Longterm => "longterm",
    }
}

string_enum! {
    /// Response shape requested by the caller
    OutputFormat {
        Signal => "signal",
        Report => "report",
    }
}

impl Default for RiskProfile {
    fn default() -> Self {
        Self::Moderate
    }
}

impl Default for Timeframe {
    fn default() -> Self {
        Self::Swing
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Signal
    }
}

const MAX_TICKER_LEN: usize = 15;

/// Research request as received from a caller, before validation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawResearchRequest {
    pub ticker: String,
    #[serde(default)]
    pub comparison_ticker: Option<String>,
    #[serde(default)]
    pub timeframe: Option<String>,
    #[serde(default)]
    pub risk_profile: Option<String>,
    #[serde(default)]
    pub output_format: Option<String>,
}

/// Validated research request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub ticker: String,
    pub comparison_ticker: Option<String>,
    pub timeframe: Timeframe,
    pub risk_profile: RiskProfile,
    pub output_format: OutputFormat,
}

impl ResearchRequest {
    /// Create a request with default timeframe, risk profile and format
    pub fn new(ticker: impl Into<String>) -> Self {
        Self {
            ticker: normalize_ticker(&ticker.into()),
            comparison_ticker: None,
            timeframe: Timeframe::default(),
            risk_profile: RiskProfile::default(),
            output_format: OutputFormat::default(),
        }
    }

    pub fn with_comparison(mut self, ticker: impl Into<String>) -> Self {
        self.comparison_ticker = Some(normalize_ticker(&ticker.into()));
        self
    }

    pub fn with_timeframe(mut self, timeframe: Timeframe) -> Self {
        self.timeframe = timeframe;
        self
    }

    pub fn with_risk_profile(mut self, risk_profile: RiskProfile) -> Self {
        self.risk_profile = risk_profile;
        self
    }

    pub fn with_output_format(mut self, output_format: OutputFormat) -> Self {
        self.output_format = output_format;
        self
    }
}

impl TryFrom<RawResearchRequest> for ResearchRequest {
    type Error = ResearchError;

    /// Validate every field and report all offenders at once
    fn try_from(raw: RawResearchRequest) -> Result<Self> {
        let mut fields = Vec::new();

        let ticker = check_ticker("ticker", &raw.ticker, &mut fields);
        let comparison_ticker = raw
            .comparison_ticker
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .map(|value| check_ticker("comparison_ticker", value, &mut fields));
        let timeframe = parse_field("timeframe", raw.timeframe.as_deref(), &mut fields);
        let risk_profile = parse_field("risk_profile", raw.risk_profile.as_deref(), &mut fields);
        let output_format = parse_field("output_format", raw.output_format.as_deref(), &mut fields);

        if !fields.is_empty() {
            return Err(ResearchError::Validation { fields });
        }

        Ok(Self {
            ticker,
            comparison_ticker,
            timeframe,
            risk_profile,
            output_format,
        })
    }
}

/// Trim and upper-case a ticker symbol
pub fn normalize_ticker(ticker: &str) -> String {
    ticker.trim().to_uppercase()
}

fn check_ticker(field: &str, value: &str, fields: &mut Vec<FieldError>) -> String {
    let ticker = normalize_ticker(value);
    if ticker.is_empty() {
        fields.push(FieldError::new(field, "must not be empty"));
    } else if ticker.len() > MAX_TICKER_LEN {
        fields.push(FieldError::new(
            field,
            format!("must be at most {MAX_TICKER_LEN} characters"),
        ));
    } else if !ticker
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='))
    {
        fields.push(FieldError::new(
            field,
            "may only contain letters, digits, '.', '-', '^' or '='",
        ));
    }
    ticker
}

fn parse_field<T>(field: &str, value: Option<&str>, fields: &mut Vec<FieldError>) -> T
where
    T: FromStr<Err = String> + Default,
{
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => T::default(),
        Some(value) => value.parse().unwrap_or_else(|message| {
            fields.push(FieldError::new(field, message));
            T::default()
        }),
    }
}

/// Minimal response for `OutputFormat::Signal`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalResponse {
    pub ticker: String,
    pub signal: Signal,
    pub confidence: f64,
    pub disclaimer: String,
}

/// Full research report for `OutputFormat::Report`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchReport {
    pub ticker: String,
    pub comparison_ticker: Option<String>,
    pub ticker_type: TickerType,
    pub executive_summary: String,
    pub metrics_table: MetricsTable,
    pub scorecard: Scorecard,
    pub technicals: TechnicalSnapshot,
    pub growth_analysis: String,
    pub valuation_analysis: String,
    pub risk_assessment: String,
    pub peer_comparison: String,
    pub final_investment_view: String,
    pub confidence: f64,
    pub assumptions: Vec<String>,
    pub signal_if_requested: Option<Signal>,
    pub data_sources: Vec<String>,
    pub fallback_diagnostics: Vec<String>,
    pub disclaimer: String,
}

/// Either response shape, tagged by the requested output format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResearchResponse {
    Signal(SignalResponse),
    Report(Box<ResearchReport>),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(day: u32, close: f64) -> PriceBar {
        PriceBar {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000.0,
        }
    }

    #[test]
    fn test_sorted_closes_orders_by_date() {
        let bars = vec![bar(3, 30.0), bar(1, 10.0), bar(2, 20.0)];
        assert_eq!(sorted_closes(&bars), vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_request_defaults_and_normalization() {
        let raw = RawResearchRequest {
            ticker: " aapl ".to_string(),
            comparison_ticker: Some("msft".to_string()),
            ..Default::default()
        };
        let request = ResearchRequest::try_from(raw).unwrap();
        assert_eq!(request.ticker, "AAPL");
        assert_eq!(request.comparison_ticker.as_deref(), Some("MSFT"));
        assert_eq!(request.timeframe, Timeframe::Swing);
        assert_eq!(request.risk_profile, RiskProfile::Moderate);
        assert_eq!(request.output_format, OutputFormat::Signal);
    }

    #[test]
    fn test_request_validation_lists_every_field() {
        let raw = RawResearchRequest {
            ticker: "   ".to_string(),
            comparison_ticker: Some("BAD TICKER".to_string()),
            timeframe: Some("weekly".to_string()),
            risk_profile: Some("reckless".to_string()),
            output_format: Some("pdf".to_string()),
        };
        let err = ResearchRequest::try_from(raw).unwrap_err();
        let names: Vec<&str> = err.fields().iter().map(|f| f.field.as_str()).collect();
        assert_eq!(
            names,
            vec!["ticker", "comparison_ticker", "timeframe", "risk_profile", "output_format"]
        );
        assert!(err.to_string().contains("reckless"));
    }

    #[test]
    fn test_blank_comparison_ticker_is_ignored() {
        let raw = RawResearchRequest {
            ticker: "BTC-USD".to_string(),
            comparison_ticker: Some(String::new()),
            risk_profile: Some("Aggressive".to_string()),
            ..Default::default()
        };
        let request = ResearchRequest::try_from(raw).unwrap();
        assert!(request.comparison_ticker.is_none());
        assert_eq!(request.risk_profile, RiskProfile::Aggressive);
    }

    #[test]
    fn test_normalize_ticker() {
        assert_eq!(normalize_ticker("  brk.b \n"), "BRK.B");
        assert_eq!(normalize_ticker("aapl"), "AAPL");
    }

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(Timeframe::Longterm.to_string(), "longterm");
        assert_eq!("REPORT".parse::<OutputFormat>().unwrap(), OutputFormat::Report);
        assert_eq!(serde_json::to_string(&TickerType::Etf).unwrap(), "\"etf\"");
        assert_eq!(serde_json::to_string(&Signal::Buy).unwrap(), "\"Buy\"");
    }
}
