//! Narrative sections for research reports
//!
//! A [`NarrativeGenerator`] never fails. When the language model is not
//! configured, unreachable, or answers with something other than the expected
//! JSON, the templated [`fallback_sections`] are used instead.

pub mod anthropic;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{MetricsTable, NarrativeSections, Scorecard};

pub use anthropic::ClaudeNarrativeGenerator;

const MIN_FALLBACK_CONFIDENCE: f64 = 35.0;
const MAX_FALLBACK_CONFIDENCE: f64 = 85.0;

/// Failure while asking the language model for sections
#[derive(Debug, Error)]
pub enum NarrativeError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("unexpected response format: {0}")]
    Format(String),
}

/// Turns computed metrics into prose sections
#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    async fn generate(
        &self,
        ticker: &str,
        comparison_ticker: Option<&str>,
        metrics: &MetricsTable,
        scorecard: &Scorecard,
    ) -> NarrativeSections;
}

/// Deterministic sections used whenever no model output is available
///
/// Confidence is the composite score clamped to [35, 85].
pub fn fallback_sections(
    ticker: &str,
    comparison_ticker: Option<&str>,
    scorecard: &Scorecard,
) -> NarrativeSections {
    NarrativeSections {
        executive_summary: format!(
            "Deterministic analysis for {ticker} generated without LLM narrative due to response format issue."
        ),
        growth_analysis: "Growth trends inferred from computed metrics only.".to_string(),
        valuation_analysis: "Valuation view inferred from scorecard and available multiples."
            .to_string(),
        risk_assessment: "Risk view inferred from beta, volatility proxy, and drawdown.".to_string(),
        competitive_positioning: format!(
            "Peer comparison against {} is limited by available normalized data.",
            comparison_ticker.unwrap_or("market baseline")
        ),
        final_investment_view: "Use scorecard and signal output for decision support.".to_string(),
        confidence: scorecard
            .composite
            .clamp(MIN_FALLBACK_CONFIDENCE, MAX_FALLBACK_CONFIDENCE),
        key_drivers: vec![
            "Composite score".to_string(),
            "Growth metrics".to_string(),
            "Risk profile alignment".to_string(),
        ],
        bear_case: "Macro slowdown and earnings compression may weaken thesis.".to_string(),
        bull_case: "Execution upside and favorable valuation rerating may improve returns."
            .to_string(),
        assumptions: vec![
            "LLM output fallback path was used due to invalid JSON response.".to_string(),
        ],
    }
}

/// Generator that always answers with the templated sections
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateNarrativeGenerator;

#[async_trait]
impl NarrativeGenerator for TemplateNarrativeGenerator {
    async fn generate(
        &self,
        ticker: &str,
        comparison_ticker: Option<&str>,
        _metrics: &MetricsTable,
        scorecard: &Scorecard,
    ) -> NarrativeSections {
        let mut sections = fallback_sections(ticker, comparison_ticker, scorecard);
        sections.executive_summary =
            format!("Deterministic analysis for {ticker} generated from computed metrics.");
        sections.assumptions =
            vec!["No narrative model configured; sections are templated from computed metrics.".to_string()];
        sections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(composite: f64) -> Scorecard {
        Scorecard {
            value: 50.0,
            growth: 50.0,
            quality: 50.0,
            momentum: 50.0,
            risk: 50.0,
            composite,
        }
    }

    #[test]
    fn test_fallback_confidence_is_clamped() {
        assert_eq!(fallback_sections("AAPL", None, &card(10.0)).confidence, 35.0);
        assert_eq!(fallback_sections("AAPL", None, &card(62.4)).confidence, 62.4);
        assert_eq!(fallback_sections("AAPL", None, &card(97.0)).confidence, 85.0);
    }

    #[test]
    fn test_fallback_mentions_tickers() {
        let sections = fallback_sections("AAPL", Some("MSFT"), &card(50.0));
        assert!(sections.executive_summary.contains("AAPL"));
        assert!(sections.competitive_positioning.contains("MSFT"));

        let sections = fallback_sections("AAPL", None, &card(50.0));
        assert!(sections.competitive_positioning.contains("market baseline"));
        assert_eq!(sections.key_drivers.len(), 3);
    }

    #[tokio::test]
    async fn test_template_generator() {
        let sections = TemplateNarrativeGenerator
            .generate("NVDA", None, &MetricsTable::default(), &card(71.0))
            .await;
        assert_eq!(sections.confidence, 71.0);
        assert!(sections.assumptions[0].contains("No narrative model configured"));
        assert!(sections.executive_summary.contains("NVDA"));
        assert!(!sections.executive_summary.contains("response format"));
    }
}
