//! Summarization for verbose and merged context items

use super::text::{sentences, truncate_chars};
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Summarizer trait for different summarization strategies
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize text into at most roughly `max_tokens` tokens
    async fn summarize(&self, text: &str, max_tokens: usize) -> Result<String, ProviderError>;
}

/// LLM-based summarizer using OpenAI-compatible API
pub struct LlmSummarizer {
    client: Client,
    config: ProviderConfig,
}

impl LlmSummarizer {
    /// Create a new LLM summarizer; fails without credentials
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        if !config.is_configured() {
            return Err(ProviderError::NotConfigured);
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ProviderError::Initialization(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Build summarization prompt
    fn build_prompt(&self, text: &str, max_tokens: usize) -> String {
        format!(
            "Summarize the following project context. \
            Keep decisions, their reasons, file and function names. \
            Keep the summary under {} tokens.\n\n{}",
            max_tokens, text
        )
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, text: &str, max_tokens: usize) -> Result<String, ProviderError> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }

        debug!("Summarizing {} chars, target: {} tokens", text.len(), max_tokens);

        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: "You are a concise summarizer of software project knowledge.".to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: self.build_prompt(text, max_tokens),
                },
            ],
            max_tokens: Some(max_tokens),
            temperature: Some(0.3),
        };

        // Retry logic
        let mut last_error = None;
        for attempt in 0..self.config.max_retries.max(1) {
            if attempt > 0 {
                debug!("Retry attempt {} for summarization", attempt);
                tokio::time::sleep(Duration::from_millis(100 * (1 << attempt))).await;
            }

            let mut req = self.client.post(&self.config.endpoint).json(&request);

            if let Some(ref api_key) = self.config.api_key {
                req = req.bearer_auth(api_key.expose_secret());
            }

            match req.send().await {
                Ok(response) => {
                    if !response.status().is_success() {
                        let status = response.status();
                        let body = response.text().await.unwrap_or_default();
                        last_error = Some(ProviderError::Api(format!("HTTP {}: {}", status, body)));
                        continue;
                    }

                    match response.json::<ChatCompletionResponse>().await {
                        Ok(resp) => match resp.choices.into_iter().next() {
                            Some(choice) if !choice.message.content.trim().is_empty() => {
                                debug!("Summarization successful");
                                return Ok(choice.message.content.trim().to_string());
                            }
                            _ => {
                                last_error = Some(ProviderError::InvalidResponse(
                                    "No choices in response".to_string(),
                                ));
                            }
                        },
                        Err(e) => {
                            last_error = Some(ProviderError::InvalidResponse(format!(
                                "Failed to parse response: {}",
                                e
                            )));
                        }
                    }
                }
                Err(e) => {
                    last_error = Some(ProviderError::Network(e.to_string()));
                }
            }
        }

        warn!("Summarization failed after {} attempts", self.config.max_retries.max(1));
        Err(last_error.unwrap_or(ProviderError::Api("no attempts made".to_string())))
    }
}

/// Words marking a sentence as carrying a decision
const DECISION_KEYWORDS: &[&str] = &[
    "decided", "decision", "chose", "choose", "because", "must", "should", "will use",
    "instead", "avoid", "important", "require",
];

/// Extractive summarizer (fallback).
///
/// Keeps the first sentence, every sentence with a decision keyword and the
/// last sentence, then truncates to the target length.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractiveSummarizer;

impl ExtractiveSummarizer {
    pub fn summarize_text(&self, text: &str, max_chars: usize) -> String {
        let all = sentences(text);
        if all.is_empty() {
            return String::new();
        }

        let last = all.len() - 1;
        let kept: Vec<&str> = all
            .iter()
            .enumerate()
            .filter(|(i, sentence)| {
                *i == 0 || *i == last || {
                    let lower = sentence.to_lowercase();
                    DECISION_KEYWORDS.iter().any(|kw| lower.contains(kw))
                }
            })
            .map(|(_, sentence)| *sentence)
            .collect();

        truncate_chars(&kept.join(" "), max_chars)
    }
}

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    async fn summarize(&self, text: &str, max_tokens: usize) -> Result<String, ProviderError> {
        Ok(self.summarize_text(text, max_tokens.saturating_mul(4).max(1)))
    }
}

// OpenAI-compatible API types
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}
