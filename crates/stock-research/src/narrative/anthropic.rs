//! Narrative sections from Anthropic Claude
//!
//! See: https://docs.anthropic.com/en/api/messages

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::{NarrativeError, NarrativeGenerator, fallback_sections};
use crate::config::ResearchConfig;
use crate::error::Result;
use crate::models::{MetricsTable, NarrativeSections, Scorecard};

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: usize = 1800;
const TEMPERATURE: f32 = 0.1;

/// Claude-backed narrative generator
pub struct ClaudeNarrativeGenerator {
    client: Client,
    api_key: String,
    model: String,
}

impl ClaudeNarrativeGenerator {
    /// Create a generator
    ///
    /// # Arguments
    ///
    /// * `api_key` - Anthropic API key
    /// * `model` - Claude model name
    /// * `timeout` - Per-request timeout
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// Create a generator when an API key is configured
    pub fn from_config(config: &ResearchConfig) -> Result<Option<Self>> {
        config
            .claude_api_key
            .as_deref()
            .map(|key| Self::new(key, &config.claude_model, config.request_timeout))
            .transpose()
    }

    #[instrument(skip(self, prompt), fields(model = %self.model))]
    async fn request_sections(&self, prompt: String) -> std::result::Result<NarrativeSections, NarrativeError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            messages: vec![RequestMessage {
                role: "user",
                content: prompt,
            }],
        };

        debug!("Sending narrative request to Anthropic API");
        let response = self
            .client
            .post(format!("{ANTHROPIC_API_BASE}/messages"))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NarrativeError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let response: MessagesResponse = response.json().await?;
        parse_sections(&response.text())
    }
}

#[async_trait]
impl NarrativeGenerator for ClaudeNarrativeGenerator {
    async fn generate(
        &self,
        ticker: &str,
        comparison_ticker: Option<&str>,
        metrics: &MetricsTable,
        scorecard: &Scorecard,
    ) -> NarrativeSections {
        let prompt = build_prompt(ticker, comparison_ticker, metrics, scorecard);

        match self.request_sections(prompt).await {
            Ok(sections) => sections,
            Err(e) => {
                warn!("Narrative generation failed, using templated sections: {}", e);
                fallback_sections(ticker, comparison_ticker, scorecard)
            }
        }
    }
}

/// Strict JSON-only analyst prompt
fn build_prompt(
    ticker: &str,
    comparison_ticker: Option<&str>,
    metrics: &MetricsTable,
    scorecard: &Scorecard,
) -> String {
    let metrics = serde_json::to_string(metrics).unwrap_or_default();
    let scorecard = serde_json::to_string(scorecard).unwrap_or_default();

    format!(
        "You are an institutional equity research analyst.\n\
         Rules:\n\
         1) Use ONLY the provided metrics and scorecard.\n\
         2) Do not invent numbers or facts.\n\
         3) If metric missing, explicitly mention data limitation.\n\
         4) Return STRICT JSON only with keys:\n\
         executive_summary,growth_analysis,valuation_analysis,risk_assessment,\
         competitive_positioning,final_investment_view,confidence,key_drivers,bear_case,bull_case,assumptions\n\n\
         ticker={ticker}\n\
         comparison_ticker={}\n\
         metrics={metrics}\n\
         scorecard={scorecard}\n",
        comparison_ticker.unwrap_or("none"),
    )
}

/// Decode model text into sections; anything but the exact shape is an error
fn parse_sections(text: &str) -> std::result::Result<NarrativeSections, NarrativeError> {
    let sections: NarrativeSections = serde_json::from_str(text.trim())?;

    if !(0.0..=100.0).contains(&sections.confidence) {
        return Err(NarrativeError::Format(format!(
            "confidence {} outside [0, 100]",
            sections.confidence
        )));
    }
    Ok(sections)
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    temperature: f32,
    messages: Vec<RequestMessage>,
}

#[derive(Debug, Serialize)]
struct RequestMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
}

impl MessagesResponse {
    /// Text blocks joined by newlines
    fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sections_json(confidence: f64) -> String {
        json!({
            "executive_summary": "Solid franchise.",
            "growth_analysis": "Revenue growing.",
            "valuation_analysis": "Fair multiple.",
            "risk_assessment": "Moderate beta.",
            "competitive_positioning": "Leader.",
            "final_investment_view": "Constructive.",
            "confidence": confidence,
            "key_drivers": ["Services"],
            "bear_case": "Regulation.",
            "bull_case": "New products.",
            "assumptions": ["Metrics as reported"]
        })
        .to_string()
    }

    #[test]
    fn test_generator_creation() {
        let generator = ClaudeNarrativeGenerator::new("key", "claude-test", Duration::from_secs(5));
        assert!(generator.is_ok());

        let config = ResearchConfig::default();
        assert!(ClaudeNarrativeGenerator::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn test_parse_sections() {
        let sections = parse_sections(&format!("  {}\n", sections_json(72.5))).unwrap();
        assert_eq!(sections.confidence, 72.5);
        assert_eq!(sections.key_drivers, vec!["Services".to_string()]);
    }

    #[test]
    fn test_parse_sections_rejects_malformed_output() {
        assert!(matches!(
            parse_sections("Here is my analysis: ..."),
            Err(NarrativeError::Decode(_))
        ));
        assert!(matches!(
            parse_sections(r#"{"executive_summary": "only one key"}"#),
            Err(NarrativeError::Decode(_))
        ));
        assert!(matches!(
            parse_sections(&sections_json(140.0)),
            Err(NarrativeError::Format(_))
        ));
    }

    #[test]
    fn test_response_text_joins_blocks() {
        let response: MessagesResponse = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "{\"a\":"},
                {"type": "tool_use", "id": "x"},
                {"type": "text", "text": "1}"}
            ]
        }))
        .unwrap();
        assert_eq!(response.text(), "{\"a\":\n1}");
    }

    #[test]
    fn test_prompt_carries_inputs() {
        let prompt = build_prompt(
            "AAPL",
            Some("MSFT"),
            &MetricsTable {
                pe: Some(28.0),
                ..Default::default()
            },
            &Scorecard {
                value: 40.0,
                growth: 60.0,
                quality: 70.0,
                momentum: 55.0,
                risk: 65.0,
                composite: 58.0,
            },
        );
        assert!(prompt.contains("ticker=AAPL"));
        assert!(prompt.contains("comparison_ticker=MSFT"));
        assert!(prompt.contains("\"pe\":28.0"));
        assert!(prompt.contains("\"composite\":58.0"));
        assert!(prompt.contains("STRICT JSON"));
    }
}
