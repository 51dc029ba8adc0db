//! Research orchestration: fetch, normalize, score, classify, narrate

use std::sync::Arc;

use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::{ResearchConfig, ScoringWeights};
use crate::error::{ResearchError, Result};
use crate::indicators::compute_technicals;
use crate::metrics::compute_metrics;
use crate::models::{
    DISCLAIMER, FundamentalsSnapshot, OutputFormat, RawResearchRequest, ResearchReport,
    ResearchRequest, ResearchResponse, SignalResponse, TechnicalSnapshot, Timeframe,
};
use crate::narrative::{ClaudeNarrativeGenerator, NarrativeGenerator, TemplateNarrativeGenerator};
use crate::providers::{
    AlphaVantageProvider, DataProvider, FinnhubProvider, HttpClient, MarketDataProvider,
    ProviderRouter, RoutedResult, detect_ticker_type,
};
use crate::scoring::composite_score;
use crate::signal::generate_signal;

const COMPUTED_SOURCE: &str = "computed";
const NO_COMPARISON: &str = "No comparison ticker provided.";
const INSUFFICIENT_PEER_DATA: &str = "Comparison requested but not enough normalized peer data.";

/// Runs complete research requests against a provider router
pub struct ResearchEngine<P: MarketDataProvider = DataProvider> {
    router: ProviderRouter<P>,
    narrative: Arc<dyn NarrativeGenerator>,
    weights: ScoringWeights,
}

impl ResearchEngine {
    /// Wire the production providers from configuration
    ///
    /// Alpha Vantage is primary, Finnhub the fallback. Without a Claude key
    /// the templated narrative is used.
    pub fn from_config(config: &ResearchConfig) -> Result<Self> {
        let alpha_vantage_key = config.alpha_vantage_api_key.as_deref().ok_or_else(|| {
            ResearchError::ConfigError("ALPHA_VANTAGE_API_KEY is not set".to_string())
        })?;
        let finnhub_key = config
            .finnhub_api_key
            .as_deref()
            .ok_or_else(|| ResearchError::ConfigError("FINNHUB_API_KEY is not set".to_string()))?;

        let http = HttpClient::from_config(config)?;
        let primary = AlphaVantageProvider::new(
            http.clone(),
            alpha_vantage_key,
            config.alpha_vantage_rate_limit,
        );
        let secondary = FinnhubProvider::new(http, finnhub_key, config.finnhub_rate_limit);
        let router = ProviderRouter::new(primary.into(), secondary.into())
            .with_deadline(config.request_deadline);

        let narrative: Arc<dyn NarrativeGenerator> =
            match ClaudeNarrativeGenerator::from_config(config)? {
                Some(claude) => Arc::new(claude),
                None => Arc::new(TemplateNarrativeGenerator),
            };

        Ok(Self::new(router, narrative, config.scoring_weights))
    }
}

impl<P: MarketDataProvider> ResearchEngine<P> {
    pub fn new(
        router: ProviderRouter<P>,
        narrative: Arc<dyn NarrativeGenerator>,
        weights: ScoringWeights,
    ) -> Self {
        Self {
            router,
            narrative,
            weights,
        }
    }

    /// Router for single-operation lookups (quotes, news, profiles)
    pub fn router(&self) -> &ProviderRouter<P> {
        &self.router
    }

    /// Indicator snapshot from routed bars
    pub async fn technicals(&self, ticker: &str, timeframe: Timeframe) -> RoutedResult<TechnicalSnapshot> {
        let routed = self.router.get_ohlcv(ticker, timeframe).await;
        let technicals =
            compute_technicals(routed.payload.as_deref().unwrap_or_default(), COMPUTED_SOURCE);

        RoutedResult {
            payload: Some(technicals),
            source: routed.source,
            fallback_diagnostic: routed.fallback_diagnostic,
        }
    }

    /// Validate a raw request and run it
    ///
    /// Validation is the only failure; provider trouble shows up as
    /// diagnostics inside the response.
    pub async fn run(&self, raw: RawResearchRequest) -> Result<ResearchResponse> {
        let request = ResearchRequest::try_from(raw)?;
        Ok(self.research(&request).await)
    }

    /// Run a validated request and shape the response for its output format
    #[instrument(skip(self, request), fields(request_id = %Uuid::new_v4(), ticker = %request.ticker))]
    pub async fn research(&self, request: &ResearchRequest) -> ResearchResponse {
        let report = self.analyze(request).await;

        match request.output_format {
            OutputFormat::Signal => {
                let (signal, confidence) = generate_signal(&report.scorecard, request.risk_profile);
                ResearchResponse::Signal(SignalResponse {
                    ticker: report.ticker,
                    signal,
                    confidence,
                    disclaimer: report.disclaimer,
                })
            }
            OutputFormat::Report => ResearchResponse::Report(Box::new(report)),
        }
    }

    /// Full report for a validated request
    pub async fn analyze(&self, request: &ResearchRequest) -> ResearchReport {
        let ticker = request.ticker.as_str();
        let comparison = request.comparison_ticker.as_deref();

        let (ohlcv, fundamentals, peer) = tokio::join!(
            self.router.get_ohlcv(ticker, request.timeframe),
            self.router.get_fundamentals(ticker),
            async {
                match comparison {
                    Some(peer) => Some(self.router.get_fundamentals(peer).await),
                    None => None,
                }
            }
        );

        let mut data_sources = Vec::new();
        let mut fallback_diagnostics = Vec::new();
        let mut record = |source: Option<String>, diagnostic: Option<&String>| {
            if let Some(source) = source {
                if !data_sources.contains(&source) {
                    data_sources.push(source);
                }
            }
            if let Some(diagnostic) = diagnostic {
                fallback_diagnostics.push(diagnostic.clone());
            }
        };
        record(ohlcv.source.map(|s| s.to_string()), ohlcv.fallback_diagnostic.as_ref());
        record(
            fundamentals.source.map(|s| s.to_string()),
            fundamentals.fallback_diagnostic.as_ref(),
        );
        if let Some(peer) = &peer {
            record(peer.source.map(|s| s.to_string()), peer.fallback_diagnostic.as_ref());
        }

        let bars = ohlcv.payload.unwrap_or_default();
        let technicals = compute_technicals(&bars, COMPUTED_SOURCE);
        if !bars.is_empty() {
            record(Some(COMPUTED_SOURCE.to_string()), None);
        }

        let metrics = compute_metrics(fundamentals.payload.as_ref(), &bars);
        let scorecard = composite_score(&metrics, &self.weights);
        let (signal, _) = generate_signal(&scorecard, request.risk_profile);
        let peer_comparison = peer_note(
            ticker,
            comparison,
            fundamentals.payload.as_ref(),
            peer.and_then(|routed| routed.payload).as_ref(),
        );

        let sections = self
            .narrative
            .generate(ticker, comparison, &metrics, &scorecard)
            .await;

        info!(
            composite = scorecard.composite,
            %signal,
            bars = bars.len(),
            fallbacks = fallback_diagnostics.len(),
            "Research complete"
        );

        ResearchReport {
            ticker: ticker.to_string(),
            comparison_ticker: request.comparison_ticker.clone(),
            ticker_type: detect_ticker_type(ticker),
            executive_summary: sections.executive_summary,
            metrics_table: metrics,
            scorecard,
            technicals,
            growth_analysis: sections.growth_analysis,
            valuation_analysis: sections.valuation_analysis,
            risk_assessment: sections.risk_assessment,
            peer_comparison,
            final_investment_view: sections.final_investment_view,
            confidence: sections.confidence,
            assumptions: sections.assumptions,
            signal_if_requested: Some(signal),
            data_sources,
            fallback_diagnostics,
            disclaimer: DISCLAIMER.to_string(),
        }
    }
}

/// One-line P/E comparison, or why it could not be made
fn peer_note(
    ticker: &str,
    comparison: Option<&str>,
    fundamentals: Option<&FundamentalsSnapshot>,
    peer: Option<&FundamentalsSnapshot>,
) -> String {
    let Some(comparison) = comparison else {
        return NO_COMPARISON.to_string();
    };

    match (fundamentals.and_then(|f| f.pe), peer.and_then(|p| p.pe)) {
        (Some(pe), Some(peer_pe)) => format!(
            "{ticker} PE={} vs {comparison} PE={}.",
            format_ratio(pe),
            format_ratio(peer_pe)
        ),
        _ => INSUFFICIENT_PEER_DATA.to_string(),
    }
}

/// Shortest round-trip form, always with a decimal point
fn format_ratio(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}
