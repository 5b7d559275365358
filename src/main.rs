//! # LoweCLI (`lowe`)
//!
//! ```bash
//! lowe                          # interactive session
//! lowe -d "how do I reverse a list in python"
//! lowe -p "start the dev server"
//! lowe -l "how do we deploy" [--reindex]
//! ```
//!
//! Configuration comes from `--config` (default `./lowe.toml`, optional),
//! then `.env`, then the process environment (`MODEL_NAME`,
//! `MODEL_PROVIDER`, `KNOWLEDGE_BASE_URL`, `INDEX_PATH`).

use clap::Parser;
use std::path::PathBuf;

use lowe_cli::commands::{render_error, App, Command};
use lowe_cli::config;
use lowe_cli::console::{Console, INTRO};
use lowe_cli::input::RustylineSource;
use lowe_cli::logging;
use lowe_cli::progress;
use lowe_cli::memory::ConversationStore;
use lowe_cli::model::ModelGateway;
use lowe_cli::models::SessionId;
use lowe_cli::session::Session;

/// LoweCLI, a terminal assistant for developers.
///
/// Without flags, starts an interactive session: paste an error message
/// and finish with an empty line.
#[derive(Parser)]
#[command(name = "lowe", version)]
struct Cli {
    /// Answer a programming question and exit.
    #[arg(short, long, value_name = "QUESTION", conflicts_with_all = ["perform", "lookup"])]
    docs: Option<String>,

    /// Suggest a shell command for a task, using your shell history.
    #[arg(short, long, value_name = "TASK", conflicts_with = "lookup")]
    perform: Option<String>,

    /// Answer from the knowledge base, indexing it first if needed.
    #[arg(short, long, value_name = "QUERY")]
    lookup: Option<String>,

    /// Path to configuration file (TOML). A missing file means defaults.
    #[arg(long, default_value = "./lowe.toml")]
    config: PathBuf,

    /// Rebuild the knowledge-base index on the next lookup.
    #[arg(long)]
    reindex: bool,
}

impl Cli {
    fn one_shot(&self) -> Option<Command> {
        if let Some(q) = &self.docs {
            Some(Command::Docs(q.clone()))
        } else if let Some(task) = &self.perform {
            Some(Command::Perform(task.clone()))
        } else {
            self.lookup.as_ref().map(|q| Command::Lookup(q.clone()))
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let dotenv = dotenvy::dotenv();
    logging::init();
    if let Err(e) = dotenv {
        if !e.not_found() {
            tracing::warn!(error = %e, "ignoring .env");
        }
    }

    let config = config::load_config(&cli.config)?;
    let console = Console::stdout();
    let gateway = ModelGateway::from_config(&config.model)?;
    let app =
        App::new(config, gateway, console.clone()).with_spinner(progress::stderr_is_terminal());

    if cli.reindex {
        app.reindex().await?;
    }

    if let Some(command) = cli.one_shot() {
        let mut memory = ConversationStore::new();
        let session = SessionId::generate();
        let failed = tokio::select! {
            result = app.execute(command, &mut memory, &session) => match result {
                Ok(()) => false,
                Err(e) => {
                    render_error(&console, &e);
                    true
                }
            },
            _ = tokio::signal::ctrl_c() => {
                console.goodbye();
                false
            }
        };
        if failed {
            std::process::exit(1);
        }
        return Ok(());
    }

    console.info(INTRO);
    let mut session = Session::new(app, RustylineSource::new()?);
    session.run().await;
    Ok(())
}
