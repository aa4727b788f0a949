//! Anthropic Messages API client.

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, instrument};

use super::{EngineError, EngineRequest, EngineResponse, ReasoningEngine};
use crate::config::EngineConfig;

/// Messages API backend. One POST per turn, no retries.
pub struct AnthropicEngine {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
    anthropic_version: String,
}

impl AnthropicEngine {
    pub fn new(config: &EngineConfig, api_key: impl Into<String>) -> Result<Self, EngineError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(EngineError::MissingApiKey);
        }
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("etlbench/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            endpoint: format!("{}/v1/messages", config.api_url.trim_end_matches('/')),
            api_key,
            anthropic_version: config.anthropic_version.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ReasoningEngine for AnthropicEngine {
    fn name(&self) -> &str {
        "anthropic"
    }

    #[instrument(skip_all, fields(model = %request.model, messages = request.messages.len()))]
    async fn generate(&self, request: &EngineRequest<'_>) -> Result<EngineResponse, EngineError> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.anthropic_version)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(EngineError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let decoded = response
            .json::<EngineResponse>()
            .await
            .map_err(|e| EngineError::Decode(e.to_string()))?;
        debug!(stop_reason = ?decoded.stop_reason, "engine responded");
        Ok(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_base_url() {
        let config = EngineConfig {
            api_url: "https://api.example.test/".to_string(),
            ..EngineConfig::default()
        };
        let engine = AnthropicEngine::new(&config, "key").unwrap();
        assert_eq!(engine.endpoint(), "https://api.example.test/v1/messages");
        assert_eq!(engine.name(), "anthropic");
    }

    #[test]
    fn test_blank_api_key_rejected() {
        let err = AnthropicEngine::new(&EngineConfig::default(), "  ").err();
        assert!(matches!(err, Some(EngineError::MissingApiKey)));
    }
}
