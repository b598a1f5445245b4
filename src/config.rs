//! Loading service configuration (prompt templates + model tuning) from TOML.
//!
//! The file is optional: `EVOCODE_CONFIG_PATH` points at it. Any IO or parse
//! problem is logged and the built-in defaults are used instead.
//!
//! Example:
//! ```toml
//! [prompts]
//! language = "Rust"
//! topics = ["strings", "graphs"]
//! default_level = "medium"
//!
//! [model]
//! timeout_secs = 30
//!
//! [sessions]
//! idle_ttl_secs = 900
//! ```

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};

use crate::domain::Difficulty;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config file {path}: {source}")]
  Read { path: String, source: std::io::Error },
  #[error("failed to parse config file {path}: {source}")]
  Parse { path: String, source: toml::de::Error },
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ServiceConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub model: ModelSettings,
  #[serde(default)]
  pub sessions: SessionSettings,
}

/// Prompt templates. Placeholders use `{name}` syntax (see `util::fill_template`).
///
/// `question_template` knows `{level}`, `{topic_clause}` and `{language}`.
/// `evaluate_template` knows `{question}`, `{code_block}` and `{language}`;
/// the answer-format rules the report extractor relies on are always appended
/// by the prompt builder and cannot be overridden here.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub language: String,
  pub question_template: String,
  pub evaluate_template: String,
  pub topics: Vec<String>,
  pub default_level: Difficulty,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      language: "Python".into(),
      question_template: "Give me a random {level}-level coding question{topic_clause} in {language} with examples.".into(),
      evaluate_template: "You are a programming tutor. A student wrote this code in response to the following question.\n\nQuestion: {question}\n\nStudent's Code:\n{code_block}\n\nEvaluate whether the code is correct or not. If it's wrong, explain the issue. If correct, explain why and provide an analysis of the edge cases handled and the overall quality of the solution.".into(),
      topics: Vec::new(),
      default_level: Difficulty::Easy,
    }
  }
}

/// Knobs for the outbound model call.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
  /// Upper bound for one model call; a timeout surfaces as an upstream failure.
  pub timeout_secs: u64,
  pub temperature: f32,
}

impl Default for ModelSettings {
  fn default() -> Self {
    Self { timeout_secs: 60, temperature: 0.7 }
  }
}

/// Idle-session cleanup. Sessions with a live watcher (an open socket) are
/// never reaped.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
  pub idle_ttl_secs: u64,
  pub sweep_interval_secs: u64,
}

impl Default for SessionSettings {
  fn default() -> Self {
    Self { idle_ttl_secs: 1800, sweep_interval_secs: 60 }
  }
}

impl ServiceConfig {
  /// Parse a config file from disk.
  pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
    let display = path.display().to_string();
    let raw = std::fs::read_to_string(path)
      .map_err(|source| ConfigError::Read { path: display.clone(), source })?;
    toml::from_str::<ServiceConfig>(&raw).map_err(|source| ConfigError::Parse { path: display, source })
  }

  /// Load from EVOCODE_CONFIG_PATH when set; defaults otherwise or on error.
  pub fn load_from_env() -> Self {
    let Ok(path) = std::env::var("EVOCODE_CONFIG_PATH") else {
      return Self::default();
    };
    match Self::from_path(Path::new(&path)) {
      Ok(cfg) => {
        info!(target: "evocode_backend", %path, topics = cfg.prompts.topics.len(), "Loaded service config (TOML)");
        cfg
      }
      Err(e) => {
        error!(target: "evocode_backend", %path, error = %e, "Failed to load config; using defaults");
        Self::default()
      }
    }
  }
}
