use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{DiligenceError, Result};

use super::retry_with_backoff;

/// Configuration recognized by every LLM gateway call (`spec.md` §4.1).
#[derive(Debug, Clone, Serialize)]
pub struct GenerationConfig {
    pub model_id: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub timeout: Duration,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model_id: "default-model".to_string(),
            temperature: 0.2,
            max_output_tokens: 2048,
            timeout: Duration::from_secs(30),
        }
    }
}

/// A tool the LLM may call during a `generate_with_tools` invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
}

/// Result of a tool-augmented generation: either the model's final answer
/// or a record of the tool calls it made before answering.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolUseResult {
    pub final_text: String,
    pub tool_calls: Vec<ToolCallRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub result: serde_json::Value,
}

/// `spec.md` §4.1: the LLM gateway client surface.
#[async_trait]
pub trait LlmGatewayClient: Send + Sync {
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String>;

    async fn generate_with_file(
        &self,
        prompt: &str,
        file_bytes: &[u8],
        mime: &str,
        config: &GenerationConfig,
    ) -> Result<String>;

    async fn generate_with_tools(
        &self,
        prompt: &str,
        tools: &[ToolSpec],
        max_iterations: u32,
        config: &GenerationConfig,
    ) -> Result<ToolUseResult>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    model_id: &'a str,
    temperature: f32,
    max_output_tokens: u32,
    response_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    text: String,
}

/// Production `reqwest`-backed implementation, built once per process and
/// shared (`spec.md` §5 "Shared resources").
pub struct HttpLlmGatewayClient {
    http: reqwest::Client,
    base_url: String,
    max_attempts: u32,
}

impl HttpLlmGatewayClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            max_attempts: 3,
        }
    }
}

#[async_trait]
impl LlmGatewayClient for HttpLlmGatewayClient {
    #[tracing::instrument(skip(self, prompt, config), fields(model_id = %config.model_id))]
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String> {
        let url = format!("{}/generate", self.base_url);
        let body = GenerateRequest {
            prompt,
            model_id: &config.model_id,
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            response_format: "json",
        };

        let response = retry_with_backoff(self.max_attempts, Duration::from_millis(200), || async {
            self.http
                .post(&url)
                .timeout(config.timeout)
                .json(&body)
                .send()
                .await
                .and_then(|r| r.error_for_status())
        })
        .await
        .map_err(|err| {
            DiligenceError::service_unavailable("llm_gateway", err.to_string())
        })?;

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|err| DiligenceError::invalid_llm_response("generate", err.to_string()))?;
        Ok(parsed.text)
    }

    #[tracing::instrument(skip(self, prompt, file_bytes, config), fields(model_id = %config.model_id, mime = %mime))]
    async fn generate_with_file(
        &self,
        prompt: &str,
        file_bytes: &[u8],
        mime: &str,
        config: &GenerationConfig,
    ) -> Result<String> {
        let url = format!("{}/generate_with_file", self.base_url);
        let part = reqwest::multipart::Part::bytes(file_bytes.to_vec()).mime_str(mime).map_err(|err| {
            DiligenceError::InternalError(format!("invalid mime type {mime}: {err}"))
        })?;
        let form = reqwest::multipart::Form::new()
            .text("prompt", prompt.to_string())
            .text("model_id", config.model_id.clone())
            .part("file", part);

        let response = self
            .http
            .post(&url)
            .timeout(config.timeout)
            .multipart(form)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|err| DiligenceError::service_unavailable("llm_gateway", err.to_string()))?;

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|err| DiligenceError::invalid_llm_response("generate_with_file", err.to_string()))?;
        Ok(parsed.text)
    }

    #[tracing::instrument(skip(self, prompt, tools, config), fields(model_id = %config.model_id, max_iterations))]
    async fn generate_with_tools(
        &self,
        prompt: &str,
        tools: &[ToolSpec],
        max_iterations: u32,
        config: &GenerationConfig,
    ) -> Result<ToolUseResult> {
        let url = format!("{}/generate_with_tools", self.base_url);
        let body = serde_json::json!({
            "prompt": prompt,
            "model_id": config.model_id,
            "tools": tools,
            "max_iterations": max_iterations,
        });

        let response = self
            .http
            .post(&url)
            .timeout(config.timeout)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|err| DiligenceError::service_unavailable("llm_gateway", err.to_string()))?;

        response
            .json()
            .await
            .map_err(|err| DiligenceError::invalid_llm_response("generate_with_tools", err.to_string()))
    }
}
