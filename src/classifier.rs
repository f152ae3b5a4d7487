//! Text-classification providers.
//!
//! A [`Classifier`] takes a fully built prompt and returns the model's raw
//! text. It knows nothing about scores or categories; parsing and
//! validation happen in [`crate::analysis`].
//!
//! Two providers are supported:
//!
//! | Provider | Endpoint | Credential |
//! |----------|----------|------------|
//! | `anthropic` | `POST {base}/messages` | `ANTHROPIC_API_KEY` |
//! | `openai` | `POST {base}/chat/completions` | `OPENAI_API_KEY` |
//!
//! Selection: the configured provider wins when its key is set; otherwise
//! OpenAI is used if its key is set; otherwise construction fails before
//! any item is read.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::config::AnalysisConfig;

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[async_trait]
pub trait Classifier: Send + Sync {
    /// Identifier recorded on every analysis this classifier produces.
    fn model_name(&self) -> &str;

    /// Send `prompt` and return the model's text response.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

// Anthropic Messages API

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicBlock>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    #[serde(default)]
    text: Option<String>,
}

pub struct AnthropicClassifier {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
}

impl AnthropicClassifier {
    pub fn new(config: &AnalysisConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
            api_key,
            model: config.anthropic_model.clone(),
            base_url: config
                .anthropic_base_url
                .clone()
                .unwrap_or_else(|| ANTHROPIC_BASE_URL.to_string()),
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl Classifier for AnthropicClassifier {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/messages", self.base_url.trim_end_matches('/'));
        let request = AnthropicRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .context("Anthropic API request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Anthropic API returned {}: {}", status, body);
        }

        let parsed: AnthropicResponse = response
            .json()
            .await
            .context("Failed to parse Anthropic response")?;

        parsed
            .content
            .into_iter()
            .find_map(|block| block.text)
            .map(|text| text.trim().to_string())
            .context("Empty Anthropic response")
    }
}

// OpenAI Chat Completions API

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiClassifier {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
}

impl OpenAiClassifier {
    pub fn new(config: &AnalysisConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
            api_key,
            model: config.openai_model.clone(),
            base_url: config
                .openai_base_url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl Classifier for OpenAiClassifier {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let request = OpenAiRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("OpenAI API request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("OpenAI API returned {}: {}", status, body);
        }

        let parsed: OpenAiResponse = response
            .json()
            .await
            .context("Failed to parse OpenAI response")?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .context("Empty OpenAI response")
    }
}

fn http_client(config: &AnalysisConfig) -> Result<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

/// Which provider a given set of credentials selects, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
    OpenAi,
}

pub fn select_provider(
    preferred: &str,
    anthropic_key: Option<&str>,
    openai_key: Option<&str>,
) -> Option<Provider> {
    let has = |key: Option<&str>| key.is_some_and(|k| !k.trim().is_empty());

    if preferred == "anthropic" && has(anthropic_key) {
        Some(Provider::Anthropic)
    } else if has(openai_key) {
        Some(Provider::OpenAi)
    } else {
        None
    }
}

/// Build a classifier from explicit credentials.
pub fn create_classifier_with_keys(
    config: &AnalysisConfig,
    anthropic_key: Option<String>,
    openai_key: Option<String>,
) -> Result<Box<dyn Classifier>> {
    match select_provider(
        &config.provider,
        anthropic_key.as_deref(),
        openai_key.as_deref(),
    ) {
        Some(Provider::Anthropic) => {
            let key = anthropic_key.unwrap_or_default();
            let classifier = AnthropicClassifier::new(config, key)?;
            info!(model = classifier.model_name(), "using Anthropic classifier");
            Ok(Box::new(classifier))
        }
        Some(Provider::OpenAi) => {
            let key = openai_key.unwrap_or_default();
            let classifier = OpenAiClassifier::new(config, key)?;
            info!(model = classifier.model_name(), "using OpenAI classifier");
            Ok(Box::new(classifier))
        }
        None => bail!(
            "No API key configured for analysis. Set ANTHROPIC_API_KEY or OPENAI_API_KEY."
        ),
    }
}

/// Build a classifier from `ANTHROPIC_API_KEY` / `OPENAI_API_KEY`.
pub fn create_classifier(config: &AnalysisConfig) -> Result<Box<dyn Classifier>> {
    create_classifier_with_keys(
        config,
        std::env::var("ANTHROPIC_API_KEY").ok(),
        std::env::var("OPENAI_API_KEY").ok(),
    )
}
