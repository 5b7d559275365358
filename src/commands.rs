//! Command dispatch.
//!
//! | Command | Interactive | One-shot | Pipeline |
//! |---------|-------------|----------|----------|
//! | converse | free text | n/a | conversation memory + model |
//! | docs | `/docs <q>` | `-d` | model with the help prompt, no memory |
//! | perform | `/perform <task>` | `-p` | shell history context + model |
//! | lookup | `/lookup <q>` | `-l` | ensure index, index context + model |
//!
//! The retrieval stack (embedder, SQLite index, loader) is opened on the
//! first `lookup`, so sessions that never look anything up never touch the
//! index directory.
//!
//! Model calls run under a "Thinking" spinner when the app is built
//! `with_spinner(true)`. Indexing reports its own progress lines instead.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::answer::{AnswerPipeline, IndexContext, ShellHistoryContext};
use crate::config::Config;
use crate::console::Console;
use crate::embedding::{create_embedder, Embedder};
use crate::error::ContractError;
use crate::index::{SqliteVectorIndex, VectorIndex};
use crate::ingest::{IndexOutcome, IndexingPipeline};
use crate::loader::{DocumentLoader, HttpLoader};
use crate::memory::ConversationStore;
use crate::model::ModelGateway;
use crate::models::{ChatMessage, SessionId};
use crate::progress::{self, with_spinner};
use crate::prompts::{HELP_SYSTEM_PROMPT, PERFORM_SYSTEM_PROMPT, RAG_SYSTEM_PROMPT};

pub const EMPTY_DOCS: &str = "Please enter a valid question for help.";
pub const EMPTY_PERFORM: &str = "Please enter a valid instruction to perform.";
pub const EMPTY_LOOKUP: &str = "Please enter a valid question to look up.";

const THINKING: &str = "Thinking";

pub const COMMAND_HELP: &str = "\
Commands:
  <text>            chat with LoweCLI about an error or problem
  /docs <question>  answer a programming question
  /perform <task>   suggest a shell command, using your shell history
  /lookup <query>   search the knowledge base and answer with citations
  /help             show this list
  exit | quit | q | bye  leave";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Converse(String),
    Docs(String),
    Perform(String),
    Lookup(String),
    Help,
}

impl Command {
    /// Parse text typed at the interactive prompt. Anything that is not a
    /// known slash command is conversation.
    pub fn parse(input: &str) -> Command {
        let trimmed = input.trim();
        let (head, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (trimmed, ""),
        };

        match head {
            "/docs" => Command::Docs(rest.to_string()),
            "/perform" => Command::Perform(rest.to_string()),
            "/lookup" => Command::Lookup(rest.to_string()),
            "/help" if rest.is_empty() => Command::Help,
            _ => Command::Converse(trimmed.to_string()),
        }
    }
}

/// Render a command failure. Contract errors are shown as they are;
/// anything else is prefixed.
pub fn render_error(console: &Console, err: &anyhow::Error) {
    if let Some(contract) = err.downcast_ref::<ContractError>() {
        console.error(&contract.to_string());
    } else {
        tracing::debug!(error = ?err, "command failed");
        console.error(&format!("Error processing command: {:#}", err));
    }
}

/// Everything `lookup` needs: indexing and search over one collection.
pub struct Retrieval {
    indexing: IndexingPipeline,
    index: Arc<dyn VectorIndex>,
}

impl Retrieval {
    pub fn new(
        loader: Arc<dyn DocumentLoader>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        config: &Config,
    ) -> Self {
        let indexing = IndexingPipeline::new(
            loader,
            embedder,
            index.clone(),
            config.chunking.clone(),
            config.embedding.batch_size,
            config.index.marker_path(),
        );
        Self { indexing, index }
    }

    /// Open the SQLite-backed stack described by `config`.
    pub async fn open(config: &Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let index = SqliteVectorIndex::open(
            &config.index.db_path(),
            &config.index.collection,
            embedder.clone(),
        )
        .await?;
        let loader = HttpLoader::new(config.model.timeout_secs)?;

        let mut retrieval = Self::new(Arc::new(loader), embedder, Arc::new(index), config);
        retrieval.indexing = retrieval
            .indexing
            .with_progress(progress::default_reporter());
        Ok(retrieval)
    }
}

pub struct App {
    config: Config,
    gateway: ModelGateway,
    console: Console,
    spinner: bool,
    retrieval: OnceCell<Retrieval>,
}

impl App {
    pub fn new(config: Config, gateway: ModelGateway, console: Console) -> Self {
        Self {
            config,
            gateway,
            console,
            spinner: false,
            retrieval: OnceCell::new(),
        }
    }

    /// Show a spinner on stderr while the model works.
    pub fn with_spinner(mut self, enabled: bool) -> Self {
        self.spinner = enabled;
        self
    }

    /// Use a prepared retrieval stack instead of opening one from config.
    pub fn with_retrieval(mut self, retrieval: Retrieval) -> Self {
        self.retrieval = OnceCell::from(retrieval);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn gateway(&self) -> &ModelGateway {
        &self.gateway
    }

    async fn retrieval(&self) -> Result<&Retrieval> {
        self.retrieval
            .get_or_try_init(|| Retrieval::open(&self.config))
            .await
    }

    /// Run one command and render its result.
    pub async fn execute(
        &self,
        command: Command,
        memory: &mut ConversationStore,
        session: &SessionId,
    ) -> Result<()> {
        match command {
            Command::Converse(text) => self.converse(memory, session, &text).await,
            Command::Docs(query) => self.docs(&query).await,
            Command::Perform(task) => self.perform(&task).await,
            Command::Lookup(query) => self.lookup(&query).await,
            Command::Help => {
                self.console.info(COMMAND_HELP);
                Ok(())
            }
        }
    }

    pub async fn converse(
        &self,
        memory: &mut ConversationStore,
        session: &SessionId,
        text: &str,
    ) -> Result<()> {
        let turn = memory.run_turn(&self.gateway, Some(session), vec![ChatMessage::user(text)]);
        let reply = with_spinner(THINKING, self.spinner, turn).await?;
        self.console.markdown(&reply.content);
        Ok(())
    }

    pub async fn docs(&self, query: &str) -> Result<()> {
        let query = non_empty(query, EMPTY_DOCS)?;
        let call = self.gateway.complete_with_system(query, HELP_SYSTEM_PROMPT);
        let reply = with_spinner(THINKING, self.spinner, call).await?;
        self.console.markdown(&reply.content);
        Ok(())
    }

    pub async fn perform(&self, task: &str) -> Result<()> {
        let task = non_empty(task, EMPTY_PERFORM)?;
        let source = ShellHistoryContext::new(self.config.history.clone());
        let pipeline = AnswerPipeline::new(self.gateway.clone(), PERFORM_SYSTEM_PROMPT);
        let answer = with_spinner(THINKING, self.spinner, pipeline.answer(task, &source)).await?;
        self.console.markdown(&answer);
        Ok(())
    }

    pub async fn lookup(&self, query: &str) -> Result<()> {
        let query = non_empty(query, EMPTY_LOOKUP)?;
        let retrieval = self.retrieval().await?;

        match retrieval
            .indexing
            .ensure_indexed(&self.config.knowledge_base.url)
            .await?
        {
            IndexOutcome::AlreadyIndexed => self.console.info("Index already exists"),
            IndexOutcome::Indexed { chunks } => self
                .console
                .success(&format!("Indexed {} chunks from the knowledge base", chunks)),
        }

        let source = IndexContext::new(retrieval.index.clone(), self.config.retrieval.k);
        let pipeline = AnswerPipeline::new(self.gateway.clone(), RAG_SYSTEM_PROMPT);
        let answer = with_spinner(THINKING, self.spinner, pipeline.answer(query, &source)).await?;
        self.console.markdown(&answer);
        Ok(())
    }

    /// Drop the index marker so the next lookup rebuilds the collection.
    pub async fn reindex(&self) -> Result<()> {
        self.retrieval().await?.indexing.remove_marker().await
    }
}

fn non_empty<'a>(text: &'a str, message: &'static str) -> Result<&'a str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ContractError::EmptyCommand(message).into());
    }
    Ok(trimmed)
}
