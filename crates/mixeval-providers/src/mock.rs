//! Mock provider for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use mixeval_core::results::TokenUsage;
use mixeval_core::traits::{GenerateRequest, GenerateResponse, LlmProvider, ModelInfo};

/// A mock LLM provider for running evaluations without real API calls.
///
/// Replies are chosen by prompt substring; the longest matching key wins.
pub struct MockProvider {
    /// (prompt substring, response), longest substring first.
    responses: Vec<(String, String)>,
    /// Reply when no substring matches.
    default_response: String,
    call_count: AtomicU32,
    last_request: Mutex<Option<GenerateRequest>>,
}

impl MockProvider {
    /// Create a mock with prompt-substring → response mappings.
    pub fn new(responses: HashMap<String, String>) -> Self {
        let mut responses: Vec<(String, String)> = responses.into_iter().collect();
        responses.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        Self {
            responses,
            default_response: "I don't know.".to_string(),
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Create a mock that always returns the same response.
    pub fn with_fixed_response(response: &str) -> Self {
        Self::new(HashMap::new()).with_default(response)
    }

    /// Set the reply used when no substring matches.
    pub fn with_default(mut self, response: &str) -> Self {
        self.default_response = response.to_string();
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn last_request(&self) -> Option<GenerateRequest> {
        self.last_request
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request.clone());
        }

        let content = self
            .responses
            .iter()
            .find(|(key, _)| request.prompt.contains(key.as_str()))
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| self.default_response.clone());

        // Rough estimate: four characters per token.
        let prompt_tokens = (request.prompt.len() / 4) as u32;
        let completion_tokens = (content.len() / 4) as u32;

        Ok(GenerateResponse {
            content,
            model: request.model.clone(),
            token_usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
                estimated_cost_usd: 0.0,
            },
            latency_ms: 1,
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![ModelInfo {
            id: "mock-model".into(),
            name: "Mock Model".into(),
            provider: "mock".into(),
            max_context: 100_000,
            cost_per_1k_input: 0.0,
            cost_per_1k_output: 0.0,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str) -> GenerateRequest {
        GenerateRequest {
            model: "mock".into(),
            prompt: prompt.into(),
            system_prompt: None,
            max_tokens: 100,
            temperature: 0.0,
            stop_sequences: vec![],
        }
    }

    #[tokio::test]
    async fn fixed_response() {
        let provider = MockProvider::with_fixed_response("Answer: B");
        let response = provider.generate(&request("anything")).await.unwrap();
        assert_eq!(response.content, "Answer: B");
        assert_eq!(provider.call_count(), 1);
        assert_eq!(provider.last_request().unwrap().prompt, "anything");
    }

    #[tokio::test]
    async fn longest_match_wins() {
        let mut responses = HashMap::new();
        responses.insert("capital".to_string(), "Answer: Rome".to_string());
        responses.insert("capital of France".to_string(), "Answer: Paris".to_string());
        let provider = MockProvider::new(responses);

        let resp = provider
            .generate(&request("What is the capital of France?"))
            .await
            .unwrap();
        assert_eq!(resp.content, "Answer: Paris");

        let resp = provider
            .generate(&request("What is the capital of Italy?"))
            .await
            .unwrap();
        assert_eq!(resp.content, "Answer: Rome");

        let resp = provider.generate(&request("2 + 2?")).await.unwrap();
        assert_eq!(resp.content, "I don't know.");
        assert_eq!(provider.call_count(), 3);
    }
}
