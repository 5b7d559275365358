//! Recent shell commands, used as context for `perform`.
//!
//! Reads the user's shell history file: `$HISTFILE` when set, otherwise
//! `~/.zsh_history`, otherwise `~/.bash_history`. Zsh extended-history
//! lines (`: 1700000000:0;git status`) are reduced to the command.

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::config::HistoryConfig;

/// Candidate history files, in lookup order.
pub fn history_candidates(config: &HistoryConfig) -> Vec<PathBuf> {
    if let Some(file) = &config.file {
        return vec![file.clone()];
    }

    let mut candidates = Vec::new();
    if let Some(histfile) = std::env::var_os("HISTFILE").filter(|v| !v.is_empty()) {
        candidates.push(PathBuf::from(histfile));
    }
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".zsh_history"));
        candidates.push(home.join(".bash_history"));
    }
    candidates
}

/// The most recent `config.max_lines` commands, newest first. A missing
/// history file yields an empty list.
pub async fn recent_commands(config: &HistoryConfig) -> Result<Vec<String>> {
    for path in history_candidates(config) {
        if let Some(commands) = read_history(&path, config.max_lines).await? {
            return Ok(commands);
        }
    }
    tracing::debug!("no shell history file found");
    Ok(Vec::new())
}

async fn read_history(path: &Path, max_lines: usize) -> Result<Option<Vec<String>>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot read shell history");
            return Ok(None);
        }
    };

    // zsh writes metafied bytes that are not always valid UTF-8.
    let text = String::from_utf8_lossy(&bytes);
    Ok(Some(parse_history(&text, max_lines)))
}

/// Newest-first commands from history file contents.
pub fn parse_history(text: &str, max_lines: usize) -> Vec<String> {
    text.lines()
        .rev()
        .map(strip_zsh_prefix)
        .map(str::trim)
        .filter(|line| !line.is_empty() && !is_bash_timestamp(line))
        .take(max_lines)
        .map(str::to_string)
        .collect()
}

/// `#1700000000`, written by bash before each command when `HISTTIMEFORMAT` is set.
fn is_bash_timestamp(line: &str) -> bool {
    line.strip_prefix('#')
        .is_some_and(|stamp| !stamp.is_empty() && stamp.chars().all(|c| c.is_ascii_digit()))
}

fn strip_zsh_prefix(line: &str) -> &str {
    let Some(rest) = line.strip_prefix(": ") else {
        return line;
    };
    match rest.split_once(';') {
        Some((stamp, command))
            if stamp
                .split(':')
                .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit())) =>
        {
            command
        }
        _ => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn strips_zsh_extended_prefix() {
        assert_eq!(strip_zsh_prefix(": 1700000000:0;git status"), "git status");
        assert_eq!(strip_zsh_prefix(": 1700000000:12;ls -la"), "ls -la");
        assert_eq!(strip_zsh_prefix("echo ': not;a prefix'"), "echo ': not;a prefix'");
        assert_eq!(strip_zsh_prefix(": comment; x"), ": comment; x");
    }

    #[test]
    fn newest_first_and_capped() {
        let text = "cd app\n\nbundle install\n: 1700000001:0;bin/rails s\n";
        assert_eq!(
            parse_history(text, 2),
            vec!["bin/rails s".to_string(), "bundle install".to_string()]
        );
    }

    #[tokio::test]
    async fn reads_configured_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("hist");
        std::fs::write(&path, "make test\ncargo fmt\n").unwrap();

        let config = HistoryConfig {
            max_lines: 100,
            file: Some(path),
        };
        assert_eq!(
            recent_commands(&config).await.unwrap(),
            vec!["cargo fmt".to_string(), "make test".to_string()]
        );
    }

    #[tokio::test]
    async fn missing_file_is_empty_not_error() {
        let config = HistoryConfig {
            max_lines: 100,
            file: Some(PathBuf::from("/definitely/not/here/.history")),
        };
        assert!(recent_commands(&config).await.unwrap().is_empty());
    }

    #[test]
    fn bash_timestamps_are_not_commands() {
        let text = "#1700000000\ngit pull\n#1700000042\ncargo test\n# a real comment\n#\n";
        assert_eq!(
            parse_history(text, 10),
            vec![
                "#".to_string(),
                "# a real comment".to_string(),
                "cargo test".to_string(),
                "git pull".to_string(),
            ]
        );
    }

    #[test]
    fn invalid_utf8_is_tolerated() {
        let text = String::from_utf8_lossy(b"ls\n\xffbroken\n");
        assert_eq!(parse_history(&text, 10).len(), 2);
    }
}
