//! Search progress reporting.
//!
//! Reports observable progress during `scout search`: each executed query,
//! early stops, and detail fetches for borderline items. Progress is emitted
//! on **stderr** so stdout remains parseable for scripts.

use std::io::Write;
use std::sync::Arc;

use repo_scout_core::ContentType;

/// A single progress event.
#[derive(Clone, Debug)]
pub enum SearchProgressEvent {
    /// A query finished for one content type.
    Query {
        content_type: ContentType,
        index: usize,
        total: usize,
        query: String,
        new_items: usize,
        collected: usize,
    },
    /// A type stopped before running every planned query.
    EarlyStop {
        content_type: ContentType,
        executed: usize,
        total: usize,
        zero_streak: usize,
    },
    /// Comment and detail fetching for borderline items.
    Details {
        content_type: ContentType,
        n: u64,
        total: u64,
    },
    /// A type finished searching.
    Done {
        content_type: ContentType,
        unique: u64,
    },
}

/// Reports search progress. Implementations write to stderr (human or JSON).
pub trait SearchProgressReporter: Send + Sync {
    fn report(&self, event: SearchProgressEvent);
}

/// Human-friendly progress on stderr: `issues  [3/15]  +12 new  40 total  hipblaslt "page fault"`.
pub struct StderrProgress;

impl SearchProgressReporter for StderrProgress {
    fn report(&self, event: SearchProgressEvent) {
        let line = human_line(&event);
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

fn human_line(event: &SearchProgressEvent) -> String {
    match event {
        SearchProgressEvent::Query {
            content_type,
            index,
            total,
            query,
            new_items,
            collected,
        } => format!(
            "{:<12} [{}/{}]  +{} new  {} total  {}\n",
            content_type,
            index,
            total,
            new_items,
            format_number(*collected as u64),
            query
        ),
        SearchProgressEvent::EarlyStop {
            content_type,
            executed,
            total,
            zero_streak,
        } => format!(
            "{:<12} stopping after {}/{} queries ({} in a row found nothing new)\n",
            content_type, executed, total, zero_streak
        ),
        SearchProgressEvent::Details {
            content_type,
            n,
            total,
        } => format!(
            "{:<12} fetching details  {} / {} items\n",
            content_type,
            format_number(*n),
            format_number(*total)
        ),
        SearchProgressEvent::Done {
            content_type,
            unique,
        } => format!(
            "{:<12} done  {} unique items\n",
            content_type,
            format_number(*unique)
        ),
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl SearchProgressReporter for JsonProgress {
    fn report(&self, event: SearchProgressEvent) {
        if let Ok(line) = serde_json::to_string(&json_event(&event)) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

fn json_event(event: &SearchProgressEvent) -> serde_json::Value {
    match event {
        SearchProgressEvent::Query {
            content_type,
            index,
            total,
            query,
            new_items,
            collected,
        } => serde_json::json!({
            "event": "query",
            "type": content_type,
            "index": index,
            "total": total,
            "query": query,
            "new": new_items,
            "collected": collected
        }),
        SearchProgressEvent::EarlyStop {
            content_type,
            executed,
            total,
            zero_streak,
        } => serde_json::json!({
            "event": "early_stop",
            "type": content_type,
            "executed": executed,
            "total": total,
            "zero_streak": zero_streak
        }),
        SearchProgressEvent::Details {
            content_type,
            n,
            total,
        } => serde_json::json!({
            "event": "details",
            "type": content_type,
            "n": n,
            "total": total
        }),
        SearchProgressEvent::Done {
            content_type,
            unique,
        } => serde_json::json!({
            "event": "done",
            "type": content_type,
            "unique": unique
        }),
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl SearchProgressReporter for NoProgress {
    fn report(&self, _event: SearchProgressEvent) {}
}

pub fn format_number(n: u64) -> String {
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
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
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

    /// Build a reporter shared by every search worker.
    pub fn reporter(&self) -> Arc<dyn SearchProgressReporter> {
        match self {
            ProgressMode::Off => Arc::new(NoProgress),
            ProgressMode::Human => Arc::new(StderrProgress),
            ProgressMode::Json => Arc::new(JsonProgress),
        }
    }
}
