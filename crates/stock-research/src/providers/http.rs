//! Shared HTTP transport for providers

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::config::ResearchConfig;
use crate::error::Result;
use crate::providers::{ProviderError, ProviderResult};
use crate::retry::RetryPolicy;

/// Thin wrapper around `reqwest` adding a timeout and retries
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    retry: RetryPolicy,
}

impl HttpClient {
    /// Create a client with the given per-request timeout and retry policy
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, retry })
    }

    /// Create a client from the research configuration
    pub fn from_config(config: &ResearchConfig) -> Result<Self> {
        Self::new(config.request_timeout, config.retry.clone())
    }

    /// GET `url` with `query` and decode the JSON body
    ///
    /// Non-2xx statuses become [`ProviderError::Http`]; transient failures are
    /// retried according to the policy.
    pub async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> ProviderResult<Value> {
        let client = &self.client;

        self.retry
            .execute(url, || async move {
                debug!("GET {}", url);
                let response = client.get(url).query(query).send().await?;

                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(ProviderError::Http {
                        status: status.as_u16(),
                        body: truncate(&body, 200),
                    });
                }

                let payload: Value = response.json().await?;
                Ok(payload)
            })
            .await
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
