use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{
    GenerateBody, GenerateOptions, GenerateResponse, Generation, GenerationRequest, TagsResponse,
    TokenUsage,
};
use super::TextGenerator;
use crate::config::{LlmConfig, RequestConfig};
use crate::error::{LlmError, LlmResult};

/// Client for a local LLM runtime exposing `/api/generate`
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    base_url: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    request_config: RequestConfig,
}

impl LlmClient {
    /// Create a new LLM client
    pub fn new(config: &LlmConfig, request_config: RequestConfig) -> LlmResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(LlmError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            request_config,
        })
    }

    /// Generate with retries and exponential backoff
    pub async fn generate_text(&self, request: &GenerationRequest) -> LlmResult<Generation> {
        let url = format!("{}/api/generate", self.base_url);

        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = Duration::from_millis(backoff_delay_ms(
                    self.request_config.retry_delay_ms,
                    retries,
                ));
                warn!(
                    model = %self.model,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying generation request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_request(&url, request).await {
                Ok(generation) => {
                    info!(
                        model = %self.model,
                        latency_ms = start.elapsed().as_millis(),
                        response_length = generation.text.len(),
                        prompt_tokens = generation.token_usage.prompt_tokens,
                        completion_tokens = generation.token_usage.completion_tokens,
                        "Generation succeeded"
                    );
                    return Ok(generation);
                }
                Err(e) => {
                    error!(
                        model = %self.model,
                        error = %e,
                        latency_ms = start.elapsed().as_millis(),
                        retry = retries,
                        "Generation failed"
                    );
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        Err(LlmError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries,
        })
    }

    /// Execute a single request (internal)
    async fn execute_request(
        &self,
        url: &str,
        request: &GenerationRequest,
    ) -> LlmResult<Generation> {
        debug!(
            model = %self.model,
            prompt_length = request.prompt.len(),
            "Calling generation endpoint"
        );

        let body = GenerateBody {
            model: &self.model,
            prompt: &request.prompt,
            stream: false,
            options: GenerateOptions {
                temperature: request.temperature.or(Some(self.temperature)),
                num_predict: request.max_tokens.or(Some(self.max_tokens)),
                stop: request.stop_sequences.clone(),
            },
        };

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    LlmError::Http(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let parsed: GenerateResponse =
            response
                .json()
                .await
                .map_err(|e| LlmError::InvalidResponse {
                    message: format!("Failed to parse response: {}", e),
                })?;

        if let Some(model) = parsed.model.as_deref() {
            if model != self.model {
                debug!(requested = %self.model, served = %model, "Runtime served a different model");
            }
        }

        Ok(Generation {
            text: parsed.response,
            token_usage: TokenUsage {
                prompt_tokens: parsed.prompt_eval_count.unwrap_or(0),
                completion_tokens: parsed.eval_count.unwrap_or(0),
            },
        })
    }

    /// Check that the runtime is reachable and serves the configured model
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);

        let response = match self.client.get(&url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                error!(status = r.status().as_u16(), "LLM health check failed");
                return false;
            }
            Err(e) => {
                error!(error = %e, "LLM health check failed");
                return false;
            }
        };

        match response.json::<TagsResponse>().await {
            Ok(tags) => {
                let available = tags.models.iter().any(|m| m.name == self.model);
                if available {
                    info!(model = %self.model, "LLM health check succeeded");
                } else {
                    warn!(model = %self.model, "Configured model not found on runtime");
                }
                available
            }
            Err(e) => {
                error!(error = %e, "LLM health check returned an unreadable body");
                false
            }
        }
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the configured model name
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate(&self, request: GenerationRequest) -> LlmResult<Generation> {
        self.generate_text(&request).await
    }
}

/// Longest pause between two attempts.
const MAX_BACKOFF_MS: u64 = 60_000;

/// Delay before retry `retry` (1-based): `base * 2^(retry-1)`, capped.
fn backoff_delay_ms(base_ms: u64, retry: u32) -> u64 {
    let factor = 2_u64
        .checked_pow(retry.saturating_sub(1))
        .unwrap_or(u64::MAX);
    base_ms.saturating_mul(factor).min(MAX_BACKOFF_MS)
}
