//! Sync progress rendering.
//!
//! The sync engine emits [`SyncProgressEvent`]s from its ticker; this
//! module turns them into a human line or a JSON object. Progress goes to
//! **stderr** so stdout stays parseable for scripts.

use std::io::Write;
use std::sync::Arc;

use slab_search_core::progress::{NoProgress, SyncProgressEvent, SyncProgressReporter};

/// Human-friendly progress on stderr:
/// `Progress: 1,200/5,000 (24.0%) - 3 new, 10 updated, 1,187 skipped, 0 errors`.
pub struct StderrProgress;

impl SyncProgressReporter for StderrProgress {
    fn report(&self, event: SyncProgressEvent) {
        let line = format_human(&event);
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

fn format_human(event: &SyncProgressEvent) -> String {
    match event {
        SyncProgressEvent::Discovering => "sync  listing documents...\n".to_string(),
        SyncProgressEvent::Syncing {
            processed,
            total,
            new,
            updated,
            skipped,
            errors,
        } => {
            let pct = if *total == 0 {
                100.0
            } else {
                *processed as f64 / *total as f64 * 100.0
            };
            format!(
                "Progress: {}/{} ({:.1}%) - {} new, {} updated, {} skipped, {} errors\n",
                format_number(*processed),
                format_number(*total),
                pct,
                format_number(*new),
                format_number(*updated),
                format_number(*skipped),
                format_number(*errors),
            )
        }
        SyncProgressEvent::RemovingArchived { count } => {
            format!("sync  removing {} archived documents\n", format_number(*count))
        }
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl SyncProgressReporter for JsonProgress {
    fn report(&self, event: SyncProgressEvent) {
        let mut obj = match serde_json::to_value(&event) {
            Ok(v) => v,
            Err(_) => return,
        };
        if let Some(map) = obj.as_object_mut() {
            map.insert("event".to_string(), serde_json::json!("progress"));
        }
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
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

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Arc<dyn SyncProgressReporter> {
        match self {
            ProgressMode::Off => Arc::new(NoProgress),
            ProgressMode::Human => Arc::new(StderrProgress),
            ProgressMode::Json => Arc::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1_000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn human_line_includes_counts_and_percent() {
        let line = format_human(&SyncProgressEvent::Syncing {
            processed: 50,
            total: 200,
            new: 2,
            updated: 3,
            skipped: 44,
            errors: 1,
        });
        assert_eq!(
            line,
            "Progress: 50/200 (25.0%) - 2 new, 3 updated, 44 skipped, 1 errors\n"
        );
    }

    #[test]
    fn json_event_is_tagged_by_phase() {
        let value = serde_json::to_value(SyncProgressEvent::RemovingArchived { count: 4 }).unwrap();
        assert_eq!(value["phase"], "removing_archived");
        assert_eq!(value["count"], 4);
    }
}
