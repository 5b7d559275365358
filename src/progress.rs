//! Indexing progress and activity spinners.
//!
//! Progress goes to **stderr** so stdout carries only the answer. The
//! human reporter and the spinner are used when stderr is a TTY; otherwise
//! both are off.

use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use std::io::Write;
use std::time::Duration;

/// A single progress event from the indexing pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexProgressEvent {
    /// The knowledge base is being downloaded.
    Fetching { source: String },
    /// The document was split into `chunks` pieces.
    Chunked { chunks: u64 },
    /// `n` of `total` chunks are embedded and stored.
    Embedding { n: u64, total: u64 },
}

pub trait IndexProgressReporter: Send + Sync {
    fn report(&self, event: IndexProgressEvent);
}

/// Human-friendly lines on stderr: `index  embedding  1,200 / 5,000 chunks`.
pub struct StderrProgress;

impl IndexProgressReporter for StderrProgress {
    fn report(&self, event: IndexProgressEvent) {
        let line = render(&event);
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{}", line);
        let _ = stderr.flush();
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl IndexProgressReporter for NoProgress {
    fn report(&self, _event: IndexProgressEvent) {}
}

fn render(event: &IndexProgressEvent) -> String {
    match event {
        IndexProgressEvent::Fetching { source } => format!("index  fetching {}", source),
        IndexProgressEvent::Chunked { chunks } => {
            format!("index  split into {} chunks", format_number(*chunks))
        }
        IndexProgressEvent::Embedding { n, total } => format!(
            "index  embedding  {} / {} chunks",
            format_number(*n),
            format_number(*total)
        ),
    }
}

fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut result = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// Human progress when stderr is a TTY, otherwise none.
pub fn default_reporter() -> Box<dyn IndexProgressReporter> {
    if stderr_is_terminal() {
        Box::new(StderrProgress)
    } else {
        Box::new(NoProgress)
    }
}

/// Whether stderr is attended by a human.
pub fn stderr_is_terminal() -> bool {
    atty::is(atty::Stream::Stderr)
}

/// A "Thinking" style spinner on stderr while a slow call runs.
///
/// Disabled spinners draw nothing. A spinner that is dropped before it
/// finishes (a failed or interrupted call) clears its line.
pub struct Spinner {
    bar: Option<ProgressBar>,
    message: String,
}

impl Spinner {
    pub fn start(message: &str, enabled: bool) -> Self {
        let bar = enabled.then(|| {
            let bar = ProgressBar::new_spinner();
            let style = ProgressStyle::default_spinner().template("{spinner:.yellow} {msg}");
            if let Ok(style) = style {
                bar.set_style(style);
            }
            bar.set_message(message.to_string());
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        });
        Self {
            bar,
            message: message.to_string(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.bar.is_some()
    }

    /// Replace the spinner with `💡 <message>`.
    pub fn succeed(mut self) {
        if let Some(bar) = self.bar.take() {
            if let Ok(style) = ProgressStyle::default_spinner().template("{msg}") {
                bar.set_style(style);
            }
            bar.finish_with_message(format!("💡 {}", self.message));
        }
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

/// Run `work` under a spinner labelled `message`.
pub async fn with_spinner<T, F>(message: &str, enabled: bool, work: F) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    let spinner = Spinner::start(message, enabled);
    let result = work.await;
    if result.is_ok() {
        spinner.succeed();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_groups_thousands() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn renders_events() {
        assert_eq!(
            render(&IndexProgressEvent::Embedding { n: 1200, total: 5000 }),
            "index  embedding  1,200 / 5,000 chunks"
        );
        assert_eq!(
            render(&IndexProgressEvent::Chunked { chunks: 12 }),
            "index  split into 12 chunks"
        );
    }

    #[tokio::test]
    async fn disabled_spinner_passes_results_through() {
        assert!(!Spinner::start("Thinking", false).is_active());

        let value = with_spinner("Thinking", false, async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);

        let err = with_spinner::<(), _>("Thinking", false, async {
            Err(anyhow::anyhow!("model offline"))
        })
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "model offline");
    }

    #[test]
    fn hidden_spinner_finishes_without_a_terminal() {
        let spinner = Spinner::start("Indexing", true);
        assert!(spinner.is_active());
        spinner.succeed();

        // Dropped while still spinning.
        let _interrupted = Spinner::start("Thinking", true);
    }
}
