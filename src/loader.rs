//! Knowledge-base document loading.
//!
//! The knowledge base is a single JSON document. [`HttpLoader`] fetches it
//! over HTTP(S), or reads it from disk when given a `file://` URL or a
//! plain path.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Fetch and parse the document at `source`.
    async fn fetch(&self, source: &str) -> Result<Value>;
}

pub struct HttpLoader {
    client: reqwest::Client,
}

impl HttpLoader {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client })
    }

    async fn fetch_http(&self, url: &str) -> Result<Value> {
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("Failed to reach knowledge base at {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Knowledge base returned {} for {}: {}", status, url, body);
        }

        let text = response.text().await?;
        serde_json::from_str(&text)
            .with_context(|| format!("Knowledge base at {} is not valid JSON", url))
    }

    async fn fetch_file(&self, path: PathBuf) -> Result<Value> {
        let text = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read knowledge base file: {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("{} is not valid JSON", path.display()))
    }
}

#[async_trait]
impl DocumentLoader for HttpLoader {
    async fn fetch(&self, source: &str) -> Result<Value> {
        match classify(source) {
            Source::Http => self.fetch_http(source).await,
            Source::File(path) => self.fetch_file(path).await,
        }
    }
}

#[derive(Debug, PartialEq)]
enum Source {
    Http,
    File(PathBuf),
}

fn classify(source: &str) -> Source {
    let lower = source.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        Source::Http
    } else if let Some(rest) = source.strip_prefix("file://") {
        Source::File(PathBuf::from(rest))
    } else {
        Source::File(PathBuf::from(source))
    }
}
