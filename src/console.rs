//! Terminal rendering.
//!
//! All user-facing output (answers, errors, hints, the goodbye line) goes
//! through a [`Console`]. Diagnostics go to `tracing` instead, so stdout
//! stays reserved for the conversation.
//!
//! A console is a cheap `Clone` over a shared writer: the input state
//! machine and the session loop write to the same terminal.
//!
//! Model answers are markdown. On a terminal they are rendered with
//! `termimad`; redirected output keeps the markdown source.

use colored::Colorize;
use std::io::Write;
use std::sync::{Arc, Mutex};
use termimad::MadSkin;

pub const GOODBYE: &str = "bye bye 💥";

pub const INTRO: &str = "
Welcome to LoweCLI!
This tool is designed to assist developers by providing an interactive command-line assistant that can answer questions, generate code, and help with various programming tasks. Just type your query and let LoweCLI help you boost your productivity!
";

#[derive(Clone)]
pub struct Console {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
    skin: Option<Arc<MadSkin>>,
}

impl Console {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Arc::new(Mutex::new(out)),
            skin: None,
        }
    }

    /// Standard output, rendering markdown when it is a terminal.
    pub fn stdout() -> Self {
        let console = Self::new(Box::new(std::io::stdout()));
        console.with_markdown(atty::is(atty::Stream::Stdout))
    }

    pub fn with_markdown(mut self, render: bool) -> Self {
        self.skin = render.then(|| Arc::new(MadSkin::default()));
        self
    }

    /// A console writing into memory, for tests.
    pub fn buffered() -> (Self, SharedBuffer) {
        let buffer = SharedBuffer::default();
        (Self::new(Box::new(buffer.clone())), buffer)
    }

    fn write_line(&self, line: &str) {
        // A broken terminal is not worth crashing over.
        if let Ok(mut out) = self.out.lock() {
            let _ = writeln!(out, "{}", line);
            let _ = out.flush();
        }
    }

    pub fn error(&self, message: &str) {
        self.write_line(&message.red().bold().to_string());
    }

    pub fn success(&self, message: &str) {
        self.write_line(&message.green().to_string());
    }

    pub fn info(&self, message: &str) {
        self.write_line(&message.blue().to_string());
    }

    pub fn plain(&self, message: &str) {
        self.write_line(message);
    }

    /// Print a model answer.
    pub fn markdown(&self, content: &str) {
        let content = content.trim_end();
        match &self.skin {
            Some(skin) => self.write_line(skin.term_text(content).to_string().trim_end()),
            None => self.write_line(content),
        }
    }

    pub fn goodbye(&self) {
        self.write_line(GOODBYE);
    }

    /// The interactive prompt, styled for the line editor.
    pub fn prompt(&self) -> String {
        format!("{}{} ", "lowe-cli💡".green().bold(), ">".yellow())
    }
}

/// In-memory writer whose contents can be read back after the fact.
#[derive(Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn contents(&self) -> String {
        self.inner
            .lock()
            .map(|buf| String::from_utf8_lossy(&buf).to_string())
            .unwrap_or_default()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        let mut buf = self
            .inner
            .lock()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "buffer poisoned"))?;
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
