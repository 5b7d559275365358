//! Terminal input state machine.
//!
//! Collects one logical command from the user. A command may span several
//! lines and ends at the first empty line:
//!
//! ```text
//!             line ──▶ buffer (COLLECTING)
//!       empty line ──▶ Command(buffer)
//!     EOF, no lines ──▶ Exit
//!   EOF, some lines ──▶ Command(buffer)
//!           Ctrl+C ──▶ Cancelled
//!   > max_lines lines ──▶ error + "Try again?" ──▶ COLLECTING | Cancelled | Exit
//! ```
//!
//! Lines are read from a [`LineSource`]: [`RustylineSource`] on a real
//! terminal, [`ScriptedLines`] in tests.

use std::collections::VecDeque;
use std::io;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::config::InputConfig;
use crate::console::Console;

pub const INPUT_HINT: &str =
    "Enter your input (empty line to finish, Ctrl+C to cancel, Ctrl+D to exit):";

/// Outcome of reading a single raw line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    Line(String),
    Eof,
    Interrupted,
}

/// Anything that can hand out lines of user input.
pub trait LineSource {
    fn read_line(&mut self, prompt: &str) -> io::Result<LineRead>;
}

/// Result of one `get_command` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// Assembled command text. May be empty when the input was rejected.
    Command(String),
    /// The user wants to leave (Ctrl+D, or EOF at a retry question).
    Exit,
    /// The current buffer was abandoned; return to the prompt.
    Cancelled,
}

enum Collected {
    Lines(Vec<String>),
    Exit,
    Cancelled,
    LimitExceeded,
    ReadError(io::Error),
}

enum Confirm {
    Yes,
    No,
    Eof,
}

pub struct InputMachine<S: LineSource> {
    source: S,
    console: Console,
    max_lines: usize,
    max_input_size: usize,
    shown_help: bool,
}

impl<S: LineSource> InputMachine<S> {
    pub fn new(source: S, console: Console, config: &InputConfig) -> Self {
        Self {
            source,
            console,
            max_lines: config.max_lines,
            max_input_size: config.max_input_size,
            shown_help: false,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Read one logical command. `prompt` is shown before the first line.
    pub fn get_command(&mut self, prompt: &str) -> InputEvent {
        if !self.shown_help {
            self.console.info(INPUT_HINT);
            self.shown_help = true;
        }

        loop {
            match self.collect(prompt) {
                Collected::Lines(lines) => return InputEvent::Command(self.assemble(&lines)),
                Collected::Exit => return InputEvent::Exit,
                Collected::Cancelled => return InputEvent::Cancelled,
                Collected::LimitExceeded => {
                    self.console
                        .error(&format!("Input too long (max {} lines)", self.max_lines));
                    match self.confirm("Input was too long. Try again?", true) {
                        Confirm::Yes => continue,
                        Confirm::No => return InputEvent::Cancelled,
                        Confirm::Eof => return InputEvent::Exit,
                    }
                }
                Collected::ReadError(e) => {
                    self.console.error(&format!("Error reading input: {}", e));
                    return InputEvent::Exit;
                }
            }
        }
    }

    fn collect(&mut self, prompt: &str) -> Collected {
        let mut lines: Vec<String> = Vec::new();

        loop {
            let line_prompt = match lines.len() {
                0 => prompt.to_string(),
                n if n > 5 => format!("{:3}> ", n + 1),
                _ => String::new(),
            };

            match self.source.read_line(&line_prompt) {
                Ok(LineRead::Line(line)) => {
                    if line.is_empty() {
                        return Collected::Lines(lines);
                    }
                    if lines.len() >= self.max_lines {
                        return Collected::LimitExceeded;
                    }
                    lines.push(line);
                }
                Ok(LineRead::Eof) if lines.is_empty() => return Collected::Exit,
                Ok(LineRead::Eof) => return Collected::Lines(lines),
                Ok(LineRead::Interrupted) => return Collected::Cancelled,
                Err(e) => return Collected::ReadError(e),
            }
        }
    }

    fn confirm(&mut self, message: &str, default: bool) -> Confirm {
        let suffix = if default { " [Y/n]" } else { " [y/N]" };
        let prompt = format!("{}{}: ", message, suffix);

        match self.source.read_line(&prompt) {
            Ok(LineRead::Line(answer)) => {
                let answer = answer.trim().to_lowercase();
                let yes = if answer.is_empty() {
                    default
                } else {
                    matches!(answer.as_str(), "y" | "yes" | "true" | "1")
                };
                if yes {
                    Confirm::Yes
                } else {
                    Confirm::No
                }
            }
            Ok(LineRead::Eof) => Confirm::Eof,
            Ok(LineRead::Interrupted) | Err(_) => Confirm::No,
        }
    }

    /// Right-trim every line, drop trailing blank lines, join with `\n`.
    fn assemble(&self, lines: &[String]) -> String {
        let mut cleaned: Vec<&str> = lines.iter().map(|l| l.trim_end()).collect();
        while cleaned.last().is_some_and(|l| l.is_empty()) {
            cleaned.pop();
        }

        let result = cleaned.join("\n");
        if result.chars().count() > self.max_input_size {
            self.console.error(&format!(
                "Input too large (max {} characters)",
                self.max_input_size
            ));
            return String::new();
        }
        result
    }
}

/// Line source backed by rustyline.
pub struct RustylineSource {
    editor: DefaultEditor,
}

impl RustylineSource {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            editor: DefaultEditor::new()?,
        })
    }
}

impl LineSource for RustylineSource {
    fn read_line(&mut self, prompt: &str) -> io::Result<LineRead> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = self.editor.add_history_entry(line.as_str());
                }
                Ok(LineRead::Line(line))
            }
            Err(ReadlineError::Eof) => Ok(LineRead::Eof),
            Err(ReadlineError::Interrupted) => Ok(LineRead::Interrupted),
            Err(ReadlineError::Io(e)) => Err(e),
            Err(other) => Err(io::Error::new(io::ErrorKind::Other, other.to_string())),
        }
    }
}

/// Pre-recorded input. Yields EOF once the script runs out.
#[derive(Debug, Default)]
pub struct ScriptedLines {
    reads: VecDeque<LineRead>,
    prompts: Vec<String>,
}

impl ScriptedLines {
    pub fn new(lines: &[&str]) -> Self {
        Self::from_reads(lines.iter().map(|l| LineRead::Line(l.to_string())))
    }

    pub fn from_reads(reads: impl IntoIterator<Item = LineRead>) -> Self {
        Self {
            reads: reads.into_iter().collect(),
            prompts: Vec::new(),
        }
    }

    /// Every prompt that was passed to `read_line`, in order.
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    pub fn remaining(&self) -> usize {
        self.reads.len()
    }
}

impl LineSource for ScriptedLines {
    fn read_line(&mut self, prompt: &str) -> io::Result<LineRead> {
        self.prompts.push(prompt.to_string());
        Ok(self.reads.pop_front().unwrap_or(LineRead::Eof))
    }
}
