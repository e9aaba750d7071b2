//! Mock LLM gateway for testing agents without a live model.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use diligence_core::error::{DiligenceError, Result};
use diligence_core::service_clients::{
    GenerationConfig, LlmGatewayClient, ToolSpec, ToolUseResult,
};

/// Handler function type for scripted mock responses.
pub type MockLlmHandler = Arc<dyn Fn(&str) -> Result<String> + Send + Sync>;

/// A configurable mock [`LlmGatewayClient`].
///
/// # Example
///
/// ```rust,ignore
/// use diligence_testing::MockLlmGatewayClient;
///
/// let llm = MockLlmGatewayClient::new()
///     .with_response(r#"{"team_section": null}"#);
/// ```
#[derive(Clone)]
pub struct MockLlmGatewayClient {
    handler: Option<MockLlmHandler>,
    fixed_response: String,
    prompts_seen: Arc<Mutex<Vec<String>>>,
    call_count: Arc<Mutex<usize>>,
    should_fail: Arc<Mutex<bool>>,
    error_message: String,
}

impl Default for MockLlmGatewayClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlmGatewayClient {
    pub fn new() -> Self {
        Self {
            handler: None,
            fixed_response: "{}".to_string(),
            prompts_seen: Arc::new(Mutex::new(Vec::new())),
            call_count: Arc::new(Mutex::new(0)),
            should_fail: Arc::new(Mutex::new(false)),
            error_message: "mock llm gateway error".to_string(),
        }
    }

    /// Set the fixed JSON/text response returned when no handler is set.
    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.fixed_response = response.into();
        self
    }

    /// Set a handler to compute the response from the prompt.
    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str) -> Result<String> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Configure the next call to fail with `ServiceUnavailable`.
    pub fn fail_next(&self) {
        *self.should_fail.lock().unwrap() = true;
    }

    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = message.into();
        self
    }

    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    pub fn prompts_seen(&self) -> Vec<String> {
        self.prompts_seen.lock().unwrap().clone()
    }

    fn respond(&self, prompt: &str) -> Result<String> {
        *self.call_count.lock().unwrap() += 1;
        self.prompts_seen.lock().unwrap().push(prompt.to_string());

        let mut should_fail = self.should_fail.lock().unwrap();
        if *should_fail {
            *should_fail = false;
            return Err(DiligenceError::service_unavailable("llm_gateway", self.error_message.clone()));
        }
        drop(should_fail);

        match &self.handler {
            Some(handler) => handler(prompt),
            None => Ok(self.fixed_response.clone()),
        }
    }
}

#[async_trait]
impl LlmGatewayClient for MockLlmGatewayClient {
    async fn generate(&self, prompt: &str, _config: &GenerationConfig) -> Result<String> {
        self.respond(prompt)
    }

    async fn generate_with_file(
        &self,
        prompt: &str,
        _file_bytes: &[u8],
        _mime: &str,
        _config: &GenerationConfig,
    ) -> Result<String> {
        self.respond(prompt)
    }

    async fn generate_with_tools(
        &self,
        prompt: &str,
        _tools: &[ToolSpec],
        _max_iterations: u32,
        _config: &GenerationConfig,
    ) -> Result<ToolUseResult> {
        let final_text = self.respond(prompt)?;
        Ok(ToolUseResult { final_text, tool_calls: Vec::new() })
    }
}
