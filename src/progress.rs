//! Runner Output Classification
//!
//! The external runner streams the generated script's stdout and stderr back
//! line by line. These helpers implement the wire contract: stdout lines
//! carrying a `<int>%|` marker (tqdm-style) are progress updates; stderr
//! lines mentioning an error or exception are failures. Classification is
//! pure; process spawning stays outside the compiler.

use regex::Regex;
use std::sync::LazyLock;

static PROGRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)%\|").expect("invalid progress regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// Percent complete, 0-100.
    Progress(u8),
    Info(String),
    Failure(String),
}

/// Classify one stdout line from a running script.
pub fn classify_stdout(line: &str) -> LineEvent {
    if let Some(caps) = PROGRESS_RE.captures(line) {
        if let Ok(pct) = caps[1].parse::<u8>() {
            if pct <= 100 {
                return LineEvent::Progress(pct);
            }
        }
    }
    LineEvent::Info(line.to_string())
}

/// Classify one stderr line. Informational unless it mentions an error or
/// exception (case-insensitive).
pub fn classify_stderr(line: &str) -> LineEvent {
    let lower = line.to_lowercase();
    if lower.contains("error") || lower.contains("exception") {
        LineEvent::Failure(line.to_string())
    } else {
        LineEvent::Info(line.to_string())
    }
}
