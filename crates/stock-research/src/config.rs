//! Configuration for stock research operations

use std::time::Duration;

use research_utils::{env_parse, env_var};
use serde::{Deserialize, Serialize};

use crate::error::{ResearchError, Result};
use crate::retry::RetryPolicy;

const DEFAULT_CLAUDE_MODEL: &str = "claude-3-5-sonnet-latest";

/// Weights applied to the five sub-scores
///
/// Each weight must lie in [0, 1]. They are not required to sum to one; the
/// composite is a plain dot product.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub value: f64,
    pub growth: f64,
    pub quality: f64,
    pub momentum: f64,
    pub risk: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            value: 0.2,
            growth: 0.25,
            quality: 0.2,
            momentum: 0.2,
            risk: 0.15,
        }
    }
}

impl ScoringWeights {
    fn named(&self) -> [(&'static str, f64); 5] {
        [
            ("value", self.value),
            ("growth", self.growth),
            ("quality", self.quality),
            ("momentum", self.momentum),
            ("risk", self.risk),
        ]
    }
}

/// Configuration for the research pipeline
///
/// Built once at startup and shared read-only by every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Timeout for a single upstream HTTP request
    pub request_timeout: Duration,

    /// Retry policy for upstream HTTP requests
    pub retry: RetryPolicy,

    /// Overall budget for each routed operation of a research request
    pub request_deadline: Duration,

    /// Sub-score weights for the composite
    pub scoring_weights: ScoringWeights,

    /// Alpha Vantage API key (primary provider)
    pub alpha_vantage_api_key: Option<String>,

    /// Finnhub API key (fallback provider)
    pub finnhub_api_key: Option<String>,

    /// Anthropic API key for narrative generation
    pub claude_api_key: Option<String>,

    /// Anthropic model used for narratives
    pub claude_model: String,

    /// Alpha Vantage requests per minute (free tier: 5)
    pub alpha_vantage_rate_limit: u32,

    /// Finnhub requests per minute (free tier: 60)
    pub finnhub_rate_limit: u32,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(12),
            retry: RetryPolicy::default(),
            request_deadline: Duration::from_secs(30),
            scoring_weights: ScoringWeights::default(),
            alpha_vantage_api_key: None,
            finnhub_api_key: None,
            claude_api_key: None,
            claude_model: DEFAULT_CLAUDE_MODEL.to_string(),
            alpha_vantage_rate_limit: 5,
            finnhub_rate_limit: 60,
        }
    }
}

impl ResearchConfig {
    /// Create a new configuration builder
    pub fn builder() -> ResearchConfigBuilder {
        ResearchConfigBuilder::default()
    }

    /// Load configuration from the environment and validate it
    pub fn from_env() -> Result<Self> {
        Self::builder().with_env().build()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let timeout = self.request_timeout.as_secs_f64();
        if !(1.0..=120.0).contains(&timeout) {
            return Err(ResearchError::ConfigError(format!(
                "request_timeout must be between 1 and 120 seconds, got {timeout}"
            )));
        }

        if !(1..=10).contains(&self.retry.max_attempts) {
            return Err(ResearchError::ConfigError(
                "retry attempts must be between 1 and 10".to_string(),
            ));
        }

        let min_backoff = self.retry.initial_backoff.as_secs_f64();
        let max_backoff = self.retry.max_backoff.as_secs_f64();
        if !(0.1..=10.0).contains(&min_backoff) || !(0.1..=20.0).contains(&max_backoff) {
            return Err(ResearchError::ConfigError(
                "retry backoff must be within 0.1-10s (initial) and 0.1-20s (max)".to_string(),
            ));
        }
        if min_backoff > max_backoff {
            return Err(ResearchError::ConfigError(
                "retry initial backoff must not exceed max backoff".to_string(),
            ));
        }

        if self.request_deadline.is_zero() {
            return Err(ResearchError::ConfigError(
                "request_deadline must be greater than 0".to_string(),
            ));
        }

        for (name, weight) in self.scoring_weights.named() {
            if !(0.0..=1.0).contains(&weight) {
                return Err(ResearchError::ConfigError(format!(
                    "scoring weight '{name}' must be between 0 and 1, got {weight}"
                )));
            }
        }

        if self.alpha_vantage_rate_limit == 0 || self.finnhub_rate_limit == 0 {
            return Err(ResearchError::ConfigError(
                "provider rate limits must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for ResearchConfig
#[derive(Debug, Default)]
pub struct ResearchConfigBuilder {
    request_timeout: Option<Duration>,
    retry: Option<RetryPolicy>,
    request_deadline: Option<Duration>,
    scoring_weights: Option<ScoringWeights>,
    alpha_vantage_api_key: Option<String>,
    finnhub_api_key: Option<String>,
    claude_api_key: Option<String>,
    claude_model: Option<String>,
    alpha_vantage_rate_limit: Option<u32>,
    finnhub_rate_limit: Option<u32>,
}

impl ResearchConfigBuilder {
    /// Set the per-request HTTP timeout
    pub fn request_timeout(mut self, duration: Duration) -> Self {
        self.request_timeout = Some(duration);
        self
    }

    /// Set the retry policy
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Set the budget for each routed operation
    pub fn request_deadline(mut self, duration: Duration) -> Self {
        self.request_deadline = Some(duration);
        self
    }

    /// Set the scoring weights
    pub fn scoring_weights(mut self, weights: ScoringWeights) -> Self {
        self.scoring_weights = Some(weights);
        self
    }

    /// Set the Alpha Vantage API key
    pub fn alpha_vantage_api_key(mut self, key: impl Into<String>) -> Self {
        self.alpha_vantage_api_key = Some(key.into());
        self
    }

    /// Set the Finnhub API key
    pub fn finnhub_api_key(mut self, key: impl Into<String>) -> Self {
        self.finnhub_api_key = Some(key.into());
        self
    }

    /// Set the Anthropic API key
    pub fn claude_api_key(mut self, key: impl Into<String>) -> Self {
        self.claude_api_key = Some(key.into());
        self
    }

    /// Set the Anthropic model
    pub fn claude_model(mut self, model: impl Into<String>) -> Self {
        self.claude_model = Some(model.into());
        self
    }

    /// Set provider rate limits (requests per minute)
    pub fn rate_limits(mut self, alpha_vantage: u32, finnhub: u32) -> Self {
        self.alpha_vantage_rate_limit = Some(alpha_vantage);
        self.finnhub_rate_limit = Some(finnhub);
        self
    }

    /// Fill unset values from environment variables
    ///
    /// Reads `ALPHA_VANTAGE_API_KEY`, `FINNHUB_API_KEY`, `CLAUDE_API_KEY`
    /// (or `ANTHROPIC_API_KEY`), `CLAUDE_MODEL` and `REQUEST_TIMEOUT_SECONDS`.
    pub fn with_env(mut self) -> Self {
        self.alpha_vantage_api_key = self
            .alpha_vantage_api_key
            .or_else(|| env_var("ALPHA_VANTAGE_API_KEY"));
        self.finnhub_api_key = self.finnhub_api_key.or_else(|| env_var("FINNHUB_API_KEY"));
        self.claude_api_key = self
            .claude_api_key
            .or_else(|| env_var("CLAUDE_API_KEY"))
            .or_else(|| env_var("ANTHROPIC_API_KEY"));
        self.claude_model = self.claude_model.or_else(|| env_var("CLAUDE_MODEL"));
        self.request_timeout = self.request_timeout.or_else(|| {
            env_parse::<f64>("REQUEST_TIMEOUT_SECONDS")
                .filter(|secs| secs.is_finite() && *secs > 0.0)
                .map(Duration::from_secs_f64)
        });
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<ResearchConfig> {
        let defaults = ResearchConfig::default();

        let config = ResearchConfig {
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
            retry: self.retry.unwrap_or(defaults.retry),
            request_deadline: self.request_deadline.unwrap_or(defaults.request_deadline),
            scoring_weights: self.scoring_weights.unwrap_or(defaults.scoring_weights),
            alpha_vantage_api_key: self.alpha_vantage_api_key,
            finnhub_api_key: self.finnhub_api_key,
            claude_api_key: self.claude_api_key,
            claude_model: self.claude_model.unwrap_or(defaults.claude_model),
            alpha_vantage_rate_limit: self
                .alpha_vantage_rate_limit
                .unwrap_or(defaults.alpha_vantage_rate_limit),
            finnhub_rate_limit: self.finnhub_rate_limit.unwrap_or(defaults.finnhub_rate_limit),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ResearchConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(12));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.claude_model, "claude-3-5-sonnet-latest");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_weights() {
        let weights = ScoringWeights::default();
        let total = weights.value + weights.growth + weights.quality + weights.momentum + weights.risk;
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_config_builder() {
        let config = ResearchConfig::builder()
            .request_timeout(Duration::from_secs(60))
            .alpha_vantage_api_key("av")
            .finnhub_api_key("fh")
            .claude_model("claude-test")
            .rate_limits(75, 300)
            .build()
            .unwrap();

        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.alpha_vantage_api_key.as_deref(), Some("av"));
        assert_eq!(config.finnhub_api_key.as_deref(), Some("fh"));
        assert_eq!(config.claude_model, "claude-test");
        assert_eq!(config.alpha_vantage_rate_limit, 75);
    }

    #[test]
    fn test_validation_rejects_timeout_out_of_range() {
        let config = ResearchConfig {
            request_timeout: Duration::from_secs(500),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_weight() {
        let result = ResearchConfig::builder()
            .scoring_weights(ScoringWeights {
                growth: 1.5,
                ..ScoringWeights::default()
            })
            .build();

        let err = result.unwrap_err();
        assert!(err.to_string().contains("growth"));
    }

    #[test]
    fn test_validation_rejects_bad_retry() {
        let config = ResearchConfig {
            retry: RetryPolicy {
                max_attempts: 0,
                ..RetryPolicy::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ResearchConfig {
            retry: RetryPolicy {
                initial_backoff: Duration::from_secs(8),
                max_backoff: Duration::from_secs(2),
                ..RetryPolicy::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
