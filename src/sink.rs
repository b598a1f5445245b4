//! Submission sinks: where completed evaluations are recorded.
//!
//! - `JsonlFileSink` appends one JSON object per line (SUBMISSIONS_PATH)
//! - `HttpSink` POSTs the record as JSON (SUBMISSIONS_URL)
//! - `MemorySink` keeps records in process (default, and for tests)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{error, info, instrument};

use crate::domain::SubmissionRecord;

#[derive(Debug, Error)]
pub enum SinkError {
  #[error("failed to write submission to {path}: {source}")]
  Io { path: String, source: std::io::Error },
  #[error("failed to encode submission: {0}")]
  Encode(#[from] serde_json::Error),
  #[error("submission endpoint request failed: {0}")]
  Http(#[from] reqwest::Error),
  #[error("submission endpoint returned HTTP {0}")]
  Status(u16),
}

#[async_trait]
pub trait SubmissionSink: Send + Sync {
  fn name(&self) -> &str;

  async fn record(&self, record: &SubmissionRecord) -> Result<(), SinkError>;
}

/// SUBMISSIONS_PATH wins over SUBMISSIONS_URL; in-memory otherwise.
pub fn from_env() -> Arc<dyn SubmissionSink> {
  if let Ok(path) = std::env::var("SUBMISSIONS_PATH") {
    info!(target: "evocode_backend", %path, "Recording submissions to JSON-lines file.");
    return Arc::new(JsonlFileSink::new(path));
  }
  if let Ok(url) = std::env::var("SUBMISSIONS_URL") {
    match HttpSink::new(url.clone()) {
      Ok(sink) => {
        info!(target: "evocode_backend", %url, "Recording submissions via HTTP.");
        return Arc::new(sink);
      }
      Err(e) => error!(target: "evocode_backend", %url, error = %e, "Failed to build submission HTTP client; falling back to memory"),
    }
  }
  info!(target: "evocode_backend", "No submission sink configured; keeping submissions in memory.");
  Arc::new(MemorySink::default())
}

pub struct JsonlFileSink {
  path: PathBuf,
  // Serializes appends so concurrent sessions never interleave lines.
  lock: Mutex<()>,
}

impl JsonlFileSink {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into(), lock: Mutex::new(()) }
  }
}

#[async_trait]
impl SubmissionSink for JsonlFileSink {
  fn name(&self) -> &str { "jsonl_file" }

  #[instrument(level = "debug", target = "sink", skip(self, record), fields(path = %self.path.display()))]
  async fn record(&self, record: &SubmissionRecord) -> Result<(), SinkError> {
    let mut line = serde_json::to_string(record)?;
    line.push('\n');

    let io_err = |source| SinkError::Io { path: self.path.display().to_string(), source };
    let _guard = self.lock.lock().await;
    let mut file = tokio::fs::OpenOptions::new()
      .create(true)
      .append(true)
      .open(&self.path)
      .await
      .map_err(io_err)?;
    file.write_all(line.as_bytes()).await.map_err(io_err)?;
    file.flush().await.map_err(io_err)?;
    Ok(())
  }
}

pub struct HttpSink {
  client: reqwest::Client,
  url: String,
}

impl HttpSink {
  pub fn new(url: impl Into<String>) -> Result<Self, SinkError> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(10))
      .build()?;
    Ok(Self { client, url: url.into() })
  }
}

#[async_trait]
impl SubmissionSink for HttpSink {
  fn name(&self) -> &str { "http" }

  #[instrument(level = "debug", target = "sink", skip(self, record), fields(url = %self.url))]
  async fn record(&self, record: &SubmissionRecord) -> Result<(), SinkError> {
    let res = self.client.post(&self.url).json(record).send().await?;
    if !res.status().is_success() {
      return Err(SinkError::Status(res.status().as_u16()));
    }
    Ok(())
  }
}

#[derive(Default)]
pub struct MemorySink {
  records: Mutex<Vec<SubmissionRecord>>,
}

impl MemorySink {
  pub async fn records(&self) -> Vec<SubmissionRecord> {
    self.records.lock().await.clone()
  }
}

#[async_trait]
impl SubmissionSink for MemorySink {
  fn name(&self) -> &str { "memory" }

  async fn record(&self, record: &SubmissionRecord) -> Result<(), SinkError> {
    self.records.lock().await.push(record.clone());
    Ok(())
  }
}
