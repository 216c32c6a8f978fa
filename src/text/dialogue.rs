//! Dialogue generation over the Ollama chat API

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::progress::PipelineStage;

/// A text generation engine answering a single prompt
#[async_trait]
pub trait DialogueEngine: Send + Sync {
    fn engine_name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// The configured dialogue engine, or `None` when dialogue is disabled
pub fn engine_for(config: &PipelineConfig) -> Option<Arc<dyn DialogueEngine>> {
    config
        .dialogue
        .enabled
        .then(|| Arc::new(OllamaClient::from_config(config)) as Arc<dyn DialogueEngine>)
}

/// Error for a request that needs dialogue while it is disabled
pub fn disabled() -> PipelineError {
    PipelineError::EngineUnavailable {
        engine: "dialogue".to_string(),
        message: "dialogue generation is disabled".to_string(),
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

/// Client for a local Ollama server
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            timeout,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            &config.dialogue.base_url,
            &config.dialogue.model,
            config.timeouts.for_stage(PipelineStage::GeneratingText),
        )
    }

    fn unavailable(&self, message: String) -> PipelineError {
        PipelineError::EngineUnavailable {
            engine: format!("ollama/{}", self.model),
            message,
        }
    }
}

#[async_trait]
impl DialogueEngine for OllamaClient {
    fn engine_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            stream: false,
        };
        log::debug!("POST {} (model {})", url, self.model);

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PipelineError::Timeout {
                        stage: PipelineStage::GeneratingText.as_str().to_string(),
                        seconds: self.timeout.as_secs(),
                    }
                } else {
                    self.unavailable(format!(
                        "{} (is the server running and '{}' pulled?)",
                        e, self.model
                    ))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(self.unavailable(format!("HTTP {}: {}", status, text.trim())));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| self.unavailable(format!("malformed response: {}", e)))?;

        let answer = parsed.message.content.trim().to_string();
        if answer.is_empty() {
            return Err(self.unavailable("empty response".to_string()));
        }
        Ok(answer)
    }
}
