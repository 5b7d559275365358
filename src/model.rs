//! Model gateway and chat providers.
//!
//! [`ModelGateway`] is the one handle through which every command talks to
//! the language model. It is built once in `main` and cloned into each
//! consumer; clones share the same provider (and therefore the same HTTP
//! client), so a process never holds more than one model connection pool.
//!
//! The gateway is stateless: it sees only the messages it is given.
//! Conversation history lives in [`crate::memory`].
//!
//! # Providers
//!
//! | `model.provider` | Endpoint | Credentials |
//! |------------------|----------|-------------|
//! | `google_genai` | Gemini `models/{name}:generateContent` | `GOOGLE_API_KEY` or `GEMINI_API_KEY` |
//! | `openai` | `{base_url}/chat/completions` | `OPENAI_API_KEY` |
//! | `ollama` | `{base_url}/api/chat` | none |
//!
//! Errors are returned as-is: no retries, no backoff, no caching.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::ModelConfig;
use crate::models::{ChatMessage, Role};

/// A chat-capable language model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Provider identifier (e.g. `"openai"`).
    fn provider(&self) -> &str;
    /// Model identifier (e.g. `"gemini-2.0-flash"`).
    fn model(&self) -> &str;
    /// Complete the conversation, returning the assistant's text.
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Shared handle to the process's single chat model.
#[derive(Clone)]
pub struct ModelGateway {
    inner: Arc<dyn ChatModel>,
}

impl ModelGateway {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { inner: model }
    }

    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        Ok(Self::new(create_model(config)?))
    }

    /// Complete an ordered message sequence.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<ChatMessage> {
        debug!(
            provider = self.inner.provider(),
            model = self.inner.model(),
            messages = messages.len(),
            "model request"
        );
        let content = self.inner.chat(messages).await?;
        Ok(ChatMessage::assistant(content))
    }

    /// Stateless `{system, user}` request that bypasses conversation memory.
    pub async fn complete_with_system(
        &self,
        text: &str,
        system_prompt: &str,
    ) -> Result<ChatMessage> {
        self.complete(&[ChatMessage::system(system_prompt), ChatMessage::user(text)])
            .await
    }

    pub fn describe(&self) -> String {
        format!("{}/{}", self.inner.provider(), self.inner.model())
    }

    /// True when both gateways resolve to the same underlying provider.
    pub fn shares_handle_with(&self, other: &ModelGateway) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Create the provider named by `config.provider`.
pub fn create_model(config: &ModelConfig) -> Result<Arc<dyn ChatModel>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    match config.provider.as_str() {
        "google_genai" => Ok(Arc::new(GeminiChat {
            client,
            model: config.name.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string()),
            temperature: config.temperature,
        })),
        "openai" => Ok(Arc::new(OpenAiChat {
            client,
            model: config.name.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            temperature: config.temperature,
        })),
        "ollama" => Ok(Arc::new(OllamaChat {
            client,
            model: config.name.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            temperature: config.temperature,
        })),
        other => bail!("Unknown model provider: {}", other),
    }
}

async fn send_json(request: reqwest::RequestBuilder, label: &str) -> Result<Value> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        bail!("{} API error {}: {}", label, status, body_text);
    }
    Ok(response.json().await?)
}

// ============ Gemini ============

pub struct GeminiChat {
    client: reqwest::Client,
    model: String,
    base_url: String,
    temperature: Option<f32>,
}

#[async_trait]
impl ChatModel for GeminiChat {
    fn provider(&self) -> &str {
        "google_genai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let api_key = std::env::var("GOOGLE_API_KEY")
            .or_else(|_| std::env::var("GEMINI_API_KEY"))
            .map_err(|_| anyhow!("GOOGLE_API_KEY environment variable not set"))?;

        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let request = self
            .client
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(&gemini_request(messages, self.temperature));

        let json = send_json(request, "Gemini").await?;
        parse_gemini_response(&json)
    }
}

/// System messages become `systemInstruction`; assistant turns use role `model`.
fn gemini_request(messages: &[ChatMessage], temperature: Option<f32>) -> Value {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();

    let contents: Vec<Value> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| {
            let role = if m.role == Role::Assistant { "model" } else { "user" };
            json!({ "role": role, "parts": [{ "text": m.content }] })
        })
        .collect();

    let mut body = json!({ "contents": contents });
    if !system.is_empty() {
        body["systemInstruction"] = json!({ "parts": [{ "text": system.join("\n\n") }] });
    }
    if let Some(t) = temperature {
        body["generationConfig"] = json!({ "temperature": t });
    }
    body
}

fn parse_gemini_response(json: &Value) -> Result<String> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| anyhow!("Invalid Gemini response: missing candidates[0].content.parts"))?;

    Ok(parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join(""))
}

// ============ OpenAI ============

pub struct OpenAiChat {
    client: reqwest::Client,
    model: String,
    base_url: String,
    temperature: Option<f32>,
}

#[async_trait]
impl ChatModel for OpenAiChat {
    fn provider(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let request = self
            .client
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&chat_request(&self.model, messages, self.temperature, None));

        let json = send_json(request, "OpenAI").await?;
        json.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
    }
}

/// Request body shared by the OpenAI and Ollama chat endpoints.
fn chat_request(
    model: &str,
    messages: &[ChatMessage],
    temperature: Option<f32>,
    stream: Option<bool>,
) -> Value {
    let mut body = json!({ "model": model, "messages": messages });
    if let Some(t) = temperature {
        body["temperature"] = json!(t);
    }
    if let Some(s) = stream {
        body["stream"] = json!(s);
    }
    body
}

// ============ Ollama ============

pub struct OllamaChat {
    client: reqwest::Client,
    model: String,
    base_url: String,
    temperature: Option<f32>,
}

#[async_trait]
impl ChatModel for OllamaChat {
    fn provider(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = self
            .client
            .post(format!("{}/api/chat", self.base_url.trim_end_matches('/')))
            .json(&chat_request(&self.model, messages, self.temperature, Some(false)));

        let json = send_json(request, "Ollama").await.map_err(|e| {
            anyhow!(
                "Ollama request failed (is Ollama running at {}?): {}",
                self.base_url,
                e
            )
        })?;
        json.pointer("/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Invalid Ollama response: missing message.content"))
    }
}
