//! Retrieval-generation pipeline.
//!
//! Answering a question is two ordered stages:
//!
//! 1. **retrieve**: a [`ContextSource`] produces a context block for the
//!    query. [`IndexContext`] searches the vector index; [`ShellHistoryContext`]
//!    returns recent shell commands.
//! 2. **generate**: the model gets the system prompt plus the question and
//!    context rendered into the user template.
//!
//! An empty context still goes to the model.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::HistoryConfig;
use crate::history;
use crate::index::VectorIndex;
use crate::model::ModelGateway;
use crate::prompts::render_user_prompt;

#[async_trait]
pub trait ContextSource: Send + Sync {
    async fn context(&self, query: &str) -> Result<String>;
}

/// Top-k chunks from the vector index, joined by blank lines.
pub struct IndexContext {
    index: Arc<dyn VectorIndex>,
    k: usize,
}

impl IndexContext {
    pub fn new(index: Arc<dyn VectorIndex>, k: usize) -> Self {
        Self { index, k }
    }
}

#[async_trait]
impl ContextSource for IndexContext {
    async fn context(&self, query: &str) -> Result<String> {
        let hits = self.index.search(query, self.k).await?;
        tracing::debug!(hits = hits.len(), k = self.k, "retrieved context");
        Ok(hits
            .iter()
            .map(|hit| hit.chunk.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

/// Recent shell commands, newest first, one per line.
pub struct ShellHistoryContext {
    config: HistoryConfig,
}

impl ShellHistoryContext {
    pub fn new(config: HistoryConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ContextSource for ShellHistoryContext {
    async fn context(&self, _query: &str) -> Result<String> {
        Ok(history::recent_commands(&self.config).await?.join("\n"))
    }
}

pub struct AnswerPipeline {
    gateway: ModelGateway,
    system_prompt: &'static str,
}

impl AnswerPipeline {
    pub fn new(gateway: ModelGateway, system_prompt: &'static str) -> Self {
        Self {
            gateway,
            system_prompt,
        }
    }

    pub async fn answer(&self, query: &str, source: &dyn ContextSource) -> Result<String> {
        let context = source.context(query).await?;
        let prompt = render_user_prompt(query, &context);
        let reply = self
            .gateway
            .complete_with_system(&prompt, self.system_prompt)
            .await?;
        Ok(reply.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChatModel;
    use crate::models::{ChatMessage, Role};
    use crate::prompts::RAG_SYSTEM_PROMPT;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Capture {
        last: Mutex<Vec<ChatMessage>>,
    }

    #[async_trait]
    impl ChatModel for Capture {
        fn provider(&self) -> &str {
            "test"
        }
        fn model(&self) -> &str {
            "capture"
        }
        async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
            *self.last.lock().unwrap() = messages.to_vec();
            Ok("answer".to_string())
        }
    }

    struct Fixed(&'static str);

    #[async_trait]
    impl ContextSource for Fixed {
        async fn context(&self, _query: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Broken;

    #[async_trait]
    impl ContextSource for Broken {
        async fn context(&self, _query: &str) -> Result<String> {
            anyhow::bail!("index unavailable")
        }
    }

    #[tokio::test]
    async fn builds_system_and_user_messages() {
        let capture = Arc::new(Capture::default());
        let pipeline = AnswerPipeline::new(ModelGateway::new(capture.clone()), RAG_SYSTEM_PROMPT);

        let out = pipeline.answer("what is X", &Fixed("X is a thing")).await.unwrap();
        assert_eq!(out, "answer");

        let sent = capture.last.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].role, Role::System);
        assert_eq!(sent[0].content, RAG_SYSTEM_PROMPT);
        assert_eq!(sent[1].role, Role::User);
        assert!(sent[1].content.contains("Question: what is X"));
        assert!(sent[1].content.contains("Context: X is a thing"));
    }

    #[tokio::test]
    async fn empty_context_still_calls_model() {
        let capture = Arc::new(Capture::default());
        let pipeline = AnswerPipeline::new(ModelGateway::new(capture.clone()), RAG_SYSTEM_PROMPT);
        pipeline.answer("q", &Fixed("")).await.unwrap();
        assert_eq!(capture.last.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn retrieval_failure_skips_generation() {
        let capture = Arc::new(Capture::default());
        let pipeline = AnswerPipeline::new(ModelGateway::new(capture.clone()), RAG_SYSTEM_PROMPT);
        assert!(pipeline.answer("q", &Broken).await.is_err());
        assert!(capture.last.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn shell_history_context_lists_newest_first() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".zsh_history");
        std::fs::write(&path, ": 1:0;ls\n: 2:0;git push\n").unwrap();

        let source = ShellHistoryContext::new(HistoryConfig {
            max_lines: 100,
            file: Some(path),
        });
        assert_eq!(source.context("anything").await.unwrap(), "git push\nls");

        let missing = ShellHistoryContext::new(HistoryConfig {
            max_lines: 100,
            file: Some(PathBuf::from("/nope/.zsh_history")),
        });
        assert_eq!(missing.context("anything").await.unwrap(), "");
    }
}
