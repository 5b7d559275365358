//! Interactive session loop.
//!
//! ```text
//! PROMPTING ──▶ COLLECTING_INPUT ──▶ VALIDATING ──▶ DISPATCHING ──▶ RENDERING ──┐
//!     ▲               │                  │                                      │
//!     │               ▼                  └── empty / too long ──────────────────┤
//!     │             EXIT  (EOF, exit keyword, Ctrl+C during a command)          │
//!     └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The loop owns the [`ConversationStore`] for its session. The goodbye line
//! is printed here and only here, once, whichever way the loop ends.

use crate::commands::{render_error, App, Command};
use crate::error::ContractError;
use crate::input::{InputEvent, InputMachine, LineSource};
use crate::memory::ConversationStore;
use crate::models::SessionId;

const EXIT_KEYWORDS: [&str; 4] = ["exit", "quit", "q", "bye"];

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// End of input or an exit keyword.
    Exit,
    /// Ctrl+C while a command was running.
    Interrupted,
    /// The loop itself failed.
    Failed,
}

pub fn is_exit_keyword(text: &str) -> bool {
    let text = text.trim();
    EXIT_KEYWORDS.iter().any(|k| text.eq_ignore_ascii_case(k))
}

pub struct Session<S: LineSource> {
    app: App,
    input: InputMachine<S>,
    memory: ConversationStore,
    id: SessionId,
}

impl<S: LineSource> Session<S> {
    pub fn new(app: App, source: S) -> Self {
        let input = InputMachine::new(source, app.console().clone(), &app.config().input);
        Self {
            app,
            input,
            memory: ConversationStore::new(),
            id: SessionId::generate(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn memory(&self) -> &ConversationStore {
        &self.memory
    }

    /// Run until the user leaves. Prints the goodbye line exactly once.
    pub async fn run(&mut self) -> SessionEnd {
        tracing::debug!(
            session = %self.id,
            model = %self.app.gateway().describe(),
            "session started"
        );

        let end = self.run_loop().await;

        tracing::debug!(session = %self.id, ?end, "session ended");
        self.app.console().goodbye();
        end
    }

    async fn run_loop(&mut self) -> SessionEnd {
        let console = self.app.console().clone();
        let max_command_chars = self.app.config().input.max_command_chars;
        let prompt = console.prompt();

        loop {
            let text = match self.input.get_command(&prompt) {
                InputEvent::Exit => return SessionEnd::Exit,
                InputEvent::Cancelled => continue,
                InputEvent::Command(text) => text,
            };

            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            if is_exit_keyword(text) {
                return SessionEnd::Exit;
            }

            let len = text.chars().count();
            if len > max_command_chars {
                let err = ContractError::CommandTooLong {
                    len,
                    max: max_command_chars,
                };
                render_error(&console, &err.into());
                continue;
            }

            let command = Command::parse(text);
            tokio::select! {
                result = self.app.execute(command, &mut self.memory, &self.id) => {
                    if let Err(e) = result {
                        render_error(&console, &e);
                    }
                }
                signal = tokio::signal::ctrl_c() => {
                    return match signal {
                        Ok(()) => SessionEnd::Interrupted,
                        Err(e) => {
                            console.error(&format!("Unexpected error: {}", e));
                            SessionEnd::Failed
                        }
                    };
                }
            }
        }
    }
}
