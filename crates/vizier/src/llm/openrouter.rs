// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use crate::llm::core::LLMAdapter;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vizier_contracts::{
    LLMError, LLMRequest, LLMResponse, LLMResult, Message, ProviderRequest, ProviderResponse,
    ResponseFormat, ResponseMetadata, Usage,
};

const DEFAULT_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";
const DEFAULT_MODEL: &str = "anthropic/claude-3.5-sonnet";

/// Chat-completions client for an OpenAI-compatible endpoint. The
/// credential and model identifier are supplied by the caller; the
/// client itself holds no mutable state between requests.
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
    timeout: Duration,
    max_retries: u32,
}

impl OpenRouterClient {
    pub fn new(api_key: String, model: String) -> LLMResult<Self> {
        if api_key.trim().is_empty() {
            return Err(LLMError::Configuration(
                "API key must not be empty".to_string(),
            ));
        }
        let timeout = Duration::from_secs(60);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LLMError::Internal(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            model,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout,
            max_retries: 3,
        })
    }

    /// Reads `OPENROUTER_API_KEY` and `MODEL_NAME` from the environment.
    pub fn from_env() -> LLMResult<Self> {
        let api_key = std::env::var("OPENROUTER_API_KEY").map_err(|_| {
            LLMError::Configuration("OPENROUTER_API_KEY is not set".to_string())
        })?;
        let model = std::env::var("MODEL_NAME").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        info!("Creating OpenRouter client for model {model}");
        Self::new(api_key, model)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_provider_request(&self, request: &LLMRequest) -> ProviderRequest {
        let mut messages = Vec::new();
        if let Some(system_prompt) = &request.system_prompt {
            messages.push(Message {
                role: "system".to_string(),
                content: system_prompt.clone(),
            });
        }
        messages.push(Message {
            role: "user".to_string(),
            content: request.prompt.clone(),
        });
        ProviderRequest {
            model: self.model.clone(),
            messages,
            max_tokens: request.generation_config.max_tokens,
            temperature: request.generation_config.temperature,
            top_p: request.generation_config.top_p,
            stop_sequences: request.generation_config.stop_sequences.clone(),
            response_format: Some(request.response_format),
            provider_specific: std::collections::HashMap::new(),
        }
    }

    fn build_payload(&self, request: &ProviderRequest) -> Value {
        let mut payload = json!({
            "model": request.model,
            "messages": request.messages.iter().map(|msg| {
                json!({
                    "role": msg.role,
                    "content": msg.content
                })
            }).collect::<Vec<_>>()
        });
        if let Some(max_tokens) = request.max_tokens {
            payload["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = request.temperature {
            payload["temperature"] = json!(temperature);
        }
        if let Some(top_p) = request.top_p {
            payload["top_p"] = json!(top_p);
        }
        if let Some(stop) = &request.stop_sequences {
            payload["stop"] = json!(stop);
        }
        if request.response_format == Some(ResponseFormat::JsonObject) {
            payload["response_format"] = json!({"type": "json_object"});
        }
        payload
    }

    fn parse_response(&self, response_data: Value) -> LLMResult<ProviderResponse> {
        let content = response_data["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                LLMError::Provider("Failed to extract content from response".to_string())
            })?;
        let usage = if let Some(usage_data) = response_data.get("usage") {
            Usage {
                prompt_tokens: usage_data["prompt_tokens"].as_u64().unwrap_or(0) as u32,
                completion_tokens: usage_data["completion_tokens"].as_u64().unwrap_or(0) as u32,
                total_tokens: usage_data["total_tokens"].as_u64().unwrap_or(0) as u32,
            }
        } else {
            Usage::default()
        };
        let finish_reason = response_data["choices"][0]["finish_reason"]
            .as_str()
            .map(|s| s.to_string());
        Ok(ProviderResponse {
            content: content.to_string(),
            model: self.model.clone(),
            usage,
            finish_reason,
            raw_response: response_data,
        })
    }

    async fn execute_with_retry(&self, payload: Value) -> LLMResult<(Value, u32)> {
        let mut last_error = None;
        for attempt in 0..self.max_retries {
            match tokio::time::timeout(
                self.timeout,
                self.client
                    .post(&self.endpoint)
                    .header("Authorization", format!("Bearer {}", self.api_key))
                    .header("Content-Type", "application/json")
                    .json(&payload)
                    .send(),
            )
            .await
            {
                Ok(Ok(response)) => match response.status() {
                    status if status.is_success() => {
                        let data = response.json().await.map_err(|e| {
                            LLMError::Serialisation(format!("Failed to parse response: {e}"))
                        })?;
                        return Ok((data, attempt));
                    }
                    status => {
                        let body = response
                            .text()
                            .await
                            .unwrap_or_else(|_| "Unknown error".to_string());
                        last_error = Some(match status.as_u16() {
                            401 | 403 => LLMError::Authentication(body),
                            429 => LLMError::RateLimit,
                            _ => LLMError::Provider(format!("API error {status}: {body}")),
                        });
                        if status.is_client_error() && status != 429 {
                            break;
                        }
                    }
                },
                Ok(Err(e)) => {
                    last_error = Some(LLMError::Network(format!("Request failed: {e}")));
                }
                Err(_) => {
                    last_error = Some(LLMError::Timeout);
                }
            }
            if attempt + 1 < self.max_retries {
                let wait = Duration::from_secs(2_u64.pow(attempt.min(3)));
                warn!("Request attempt {} failed, retrying in {:?}", attempt + 1, wait);
                tokio::time::sleep(wait).await;
            }
        }
        Err(last_error.unwrap_or_else(|| LLMError::Internal("Unknown error".to_string())))
    }
}

#[async_trait]
impl LLMAdapter for OpenRouterClient {
    async fn generate(&self, request: LLMRequest) -> LLMResult<LLMResponse> {
        let start_time = std::time::Instant::now();
        debug!("Sending request {} to {}", request.id, self.model);

        let provider_request = self.build_provider_request(&request);
        let payload = self.build_payload(&provider_request);
        let (response_data, retries) = self.execute_with_retry(payload).await?;
        let provider_response = self.parse_response(response_data)?;

        let processing_time = start_time.elapsed().as_millis() as u64;
        debug!(
            "Request {} completed in {}ms ({} completion tokens)",
            request.id, processing_time, provider_response.usage.completion_tokens
        );
        Ok(LLMResponse {
            id: Uuid::new_v4(),
            request_id: request.id,
            content: provider_response.content,
            model_used: provider_response.model,
            usage: provider_response.usage,
            metadata: ResponseMetadata {
                processing_time_ms: processing_time,
                retry_count: retries,
            },
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vizier_contracts::LLMRequest;

    #[test]
    fn empty_api_key_is_a_configuration_error() {
        let err = OpenRouterClient::new(String::new(), DEFAULT_MODEL.to_string()).unwrap_err();
        assert!(matches!(err, LLMError::Configuration(_)));
    }

    #[test]
    fn payload_carries_messages_and_json_mode() {
        let client =
            OpenRouterClient::new("key".to_string(), "test-model".to_string()).unwrap();
        let request = LLMRequest::new("system text", "user text")
            .with_temperature(0.0)
            .with_response_format(ResponseFormat::JsonObject);
        let provider_request = client.build_provider_request(&request);
        let payload = client.build_payload(&provider_request);
        assert_eq!(payload["model"], "test-model");
        assert_eq!(payload["messages"][0]["role"], "system");
        assert_eq!(payload["messages"][1]["content"], "user text");
        assert_eq!(payload["temperature"], 0.0);
        assert_eq!(payload["response_format"]["type"], "json_object");
    }

    #[test]
    fn parse_response_extracts_content_and_usage() {
        let client =
            OpenRouterClient::new("key".to_string(), "test-model".to_string()).unwrap();
        let data = json!({
            "choices": [{"message": {"content": "hello"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 2, "total_tokens": 12}
        });
        let parsed = client.parse_response(data).unwrap();
        assert_eq!(parsed.content, "hello");
        assert_eq!(parsed.usage.total_tokens, 12);
        assert_eq!(parsed.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn parse_response_without_content_is_a_provider_error() {
        let client =
            OpenRouterClient::new("key".to_string(), "test-model".to_string()).unwrap();
        let err = client.parse_response(json!({"choices": []})).unwrap_err();
        assert!(matches!(err, LLMError::Provider(_)));
    }
}
