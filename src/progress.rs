//! Refresh progress reporting.
//!
//! Reports what a `ragx refresh` is doing: scanning, how many files changed,
//! embedding progress, persisting. Progress is emitted on **stderr** so
//! stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event for a refresh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefreshEvent {
    /// Walking and extracting the corpus. Total unknown.
    Scanning { root: String },
    /// Scan classified against the ledger.
    Diffed {
        added: usize,
        modified: usize,
        removed: usize,
        unchanged: usize,
    },
    /// `done` of `total` chunks embedded.
    Embedding { done: usize, total: usize },
    /// Writing the artifact and ledger.
    Persisting { chunks: usize },
}

/// Receives refresh progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: RefreshEvent);
}

/// Human-friendly progress on stderr: "refresh  embedding  1,234 / 5,000 chunks".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: RefreshEvent) {
        let line = match &event {
            RefreshEvent::Scanning { root } => format!("refresh {}  scanning...\n", root),
            RefreshEvent::Diffed {
                added,
                modified,
                removed,
                unchanged,
            } => format!(
                "refresh  {} added, {} modified, {} removed, {} unchanged\n",
                added, modified, removed, unchanged
            ),
            RefreshEvent::Embedding { done, total } => format!(
                "refresh  embedding  {} / {} chunks\n",
                format_number(*done as u64),
                format_number(*total as u64)
            ),
            RefreshEvent::Persisting { chunks } => format!(
                "refresh  saving index ({} chunks)\n",
                format_number(*chunks as u64)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl JsonProgress {
    fn to_json(event: &RefreshEvent) -> serde_json::Value {
        match event {
            RefreshEvent::Scanning { root } => serde_json::json!({
                "event": "progress",
                "phase": "scanning",
                "root": root
            }),
            RefreshEvent::Diffed {
                added,
                modified,
                removed,
                unchanged,
            } => serde_json::json!({
                "event": "progress",
                "phase": "diffed",
                "added": added,
                "modified": modified,
                "removed": removed,
                "unchanged": unchanged
            }),
            RefreshEvent::Embedding { done, total } => serde_json::json!({
                "event": "progress",
                "phase": "embedding",
                "n": done,
                "total": total
            }),
            RefreshEvent::Persisting { chunks } => serde_json::json!({
                "event": "progress",
                "phase": "persisting",
                "chunks": chunks
            }),
        }
    }
}

impl ProgressReporter for JsonProgress {
    fn report(&self, event: RefreshEvent) {
        if let Ok(line) = serde_json::to_string(&Self::to_json(&event)) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: RefreshEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Parse a `--progress` value; `auto` defers to [`default_for_tty`](Self::default_for_tty).
    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value {
            "auto" => Ok(Self::default_for_tty()),
            "off" | "none" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => anyhow::bail!(
                "Unknown progress mode: {}. Use auto, off, human, or json.",
                other
            ),
        }
    }

    pub fn reporter(&self) -> std::sync::Arc<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => std::sync::Arc::new(NoProgress),
            ProgressMode::Human => std::sync::Arc::new(StderrProgress),
            ProgressMode::Json => std::sync::Arc::new(JsonProgress),
        }
    }
}
