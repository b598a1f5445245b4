//! Model invokers: prompt in, free-form text out.
//!
//! Two HTTP backends are supported: an OpenAI-compatible chat.completions
//! endpoint and Google's Gemini `generateContent`. Calls are instrumented and
//! log model names, latencies and response sizes (not contents).
//!
//! NOTE: We never log API keys.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, instrument};

use crate::config::ModelSettings;

const UA: &str = "evocode-backend/0.1";

#[derive(Debug, Error)]
pub enum ModelError {
  #[error("no text-generation backend configured (set OPENAI_API_KEY or GEMINI_API_KEY)")]
  NotConfigured,
  #[error("request to {model} failed: {source}")]
  Transport { model: String, source: reqwest::Error },
  #[error("{model} returned HTTP {status}: {message}")]
  Status { model: String, status: u16, message: String },
  #[error("{model} returned no text")]
  Empty { model: String },
}

/// The text-generation service. Any text is a valid answer.
#[async_trait]
pub trait TextModel: Send + Sync {
  fn name(&self) -> &str;

  async fn invoke(&self, prompt: &str) -> Result<String, ModelError>;
}

/// Pick a backend from the environment: OpenAI first, then Gemini.
pub fn from_env(settings: &ModelSettings) -> Arc<dyn TextModel> {
  if let Some(oa) = OpenAiChat::from_env(settings) {
    info!(target: "evocode_backend", base_url = %oa.base_url, model = %oa.model, "OpenAI-compatible backend enabled.");
    return Arc::new(oa);
  }
  if let Some(g) = Gemini::from_env(settings) {
    info!(target: "evocode_backend", model = %g.model, "Gemini backend enabled.");
    return Arc::new(g);
  }
  error!(target: "evocode_backend", "No model API key set; every generation and evaluation will fail.");
  Arc::new(Unconfigured)
}

fn http_client(settings: &ModelSettings) -> Option<reqwest::Client> {
  reqwest::Client::builder()
    .timeout(Duration::from_secs(settings.timeout_secs))
    .build()
    .map_err(|e| error!(target: "llm", error = %e, "Failed to build HTTP client"))
    .ok()
}

/// Stand-in used when no API key is present.
pub struct Unconfigured;

#[async_trait]
impl TextModel for Unconfigured {
  fn name(&self) -> &str { "unconfigured" }

  async fn invoke(&self, _prompt: &str) -> Result<String, ModelError> {
    Err(ModelError::NotConfigured)
  }
}

// --- OpenAI-compatible chat.completions ---

#[derive(Clone)]
pub struct OpenAiChat {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub model: String,
  pub temperature: f32,
}

impl OpenAiChat {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env(settings: &ModelSettings) -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty())?;
    let base_url = std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let client = http_client(settings)?;
    Some(Self { client, api_key, base_url, model, temperature: settings.temperature })
  }
}

#[async_trait]
impl TextModel for OpenAiChat {
  fn name(&self) -> &str { &self.model }

  #[instrument(level = "info", target = "llm", skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
  async fn invoke(&self, prompt: &str) -> Result<String, ModelError> {
    let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![ChatMessageReq { role: "user".into(), content: prompt.into() }],
      temperature: self.temperature,
    };

    let start = Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, UA)
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await
      .map_err(|source| ModelError::Transport { model: self.model.clone(), source })?;

    if !res.status().is_success() {
      let status = res.status().as_u16();
      let body = res.text().await.unwrap_or_default();
      let message = extract_openai_error(&body).unwrap_or(body);
      return Err(ModelError::Status { model: self.model.clone(), status, message });
    }

    let body: ChatCompletionResponse = res.json().await
      .map_err(|source| ModelError::Transport { model: self.model.clone(), source })?;
    if let Some(usage) = &body.usage {
      info!(target: "llm", prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.into_iter().next()
      .and_then(|c| c.message.content)
      .unwrap_or_default();

    info!(target: "llm", elapsed = ?start.elapsed(), text_len = text.len(), "Model response received");
    if text.trim().is_empty() {
      return Err(ModelError::Empty { model: self.model.clone() });
    }
    Ok(text)
  }
}

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from an OpenAI-style error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}

// --- Gemini generateContent ---

#[derive(Clone)]
pub struct Gemini {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub model: String,
  pub temperature: f32,
}

impl Gemini {
  pub fn from_env(settings: &ModelSettings) -> Option<Self> {
    let api_key = std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty())?;
    let base_url = std::env::var("GEMINI_BASE_URL")
      .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".into());
    let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-1.5-flash".into());
    let client = http_client(settings)?;
    Some(Self { client, api_key, base_url, model, temperature: settings.temperature })
  }
}

#[async_trait]
impl TextModel for Gemini {
  fn name(&self) -> &str { &self.model }

  #[instrument(level = "info", target = "llm", skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
  async fn invoke(&self, prompt: &str) -> Result<String, ModelError> {
    let url = format!("{}/models/{}:generateContent", self.base_url.trim_end_matches('/'), self.model);
    let req = GeminiRequest {
      contents: vec![GeminiContent { parts: vec![GeminiPart { text: prompt.into() }] }],
      generation_config: GenerationConfig { temperature: self.temperature },
    };

    let start = Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, UA)
      .header("x-goog-api-key", &self.api_key)
      .json(&req).send().await
      .map_err(|source| ModelError::Transport { model: self.model.clone(), source })?;

    if !res.status().is_success() {
      let status = res.status().as_u16();
      let body = res.text().await.unwrap_or_default();
      let message = extract_openai_error(&body).unwrap_or(body);
      return Err(ModelError::Status { model: self.model.clone(), status, message });
    }

    let body: GeminiResponse = res.json().await
      .map_err(|source| ModelError::Transport { model: self.model.clone(), source })?;
    let text: String = body.candidates.into_iter().next()
      .map(|c| c.content.parts.into_iter().map(|p| p.text).collect())
      .unwrap_or_default();

    info!(target: "llm", elapsed = ?start.elapsed(), text_len = text.len(), "Model response received");
    if text.trim().is_empty() {
      return Err(ModelError::Empty { model: self.model.clone() });
    }
    Ok(text)
  }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
  contents: Vec<GeminiContent>,
  generation_config: GenerationConfig,
}
#[derive(Serialize, Deserialize)]
struct GeminiContent { parts: Vec<GeminiPart> }
#[derive(Serialize, Deserialize)]
struct GeminiPart { #[serde(default)] text: String }
#[derive(Serialize)]
struct GenerationConfig { temperature: f32 }

#[derive(Deserialize)]
struct GeminiResponse {
  #[serde(default)] candidates: Vec<GeminiCandidate>,
}
#[derive(Deserialize)]
struct GeminiCandidate { content: GeminiContent }
