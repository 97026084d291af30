//! Sync progress reporting.
//!
//! Reports observable progress during `kbsync sync` so users see which
//! source is being scanned and how far it got. Progress is emitted on
//! **stderr** so stdout remains parseable for scripts.

use std::io::Write;

use kbsync_core::models::RunStatus;

/// A single progress event for sync.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncProgressEvent {
    /// A source walk is starting.
    Scanning { source: String },
    /// Periodic update while walking a source.
    Files {
        source: String,
        seen: u64,
        ingested: u64,
    },
    /// A source finished (successfully or not).
    SourceDone {
        source: String,
        seen: u64,
        ingested: u64,
        deleted: u64,
    },
    /// The run was finalized.
    Finished { run_id: String, status: RunStatus },
}

/// Reports sync progress. Implementations write to stderr (human or JSON).
pub trait SyncProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the run coordinator.
    fn report(&self, event: SyncProgressEvent);
}

/// Human-friendly progress on stderr: "sync notes  1,234 seen  56 ingested".
pub struct StderrProgress;

impl SyncProgressReporter for StderrProgress {
    fn report(&self, event: SyncProgressEvent) {
        let line = match &event {
            SyncProgressEvent::Scanning { source } => format!("sync {}  scanning...\n", source),
            SyncProgressEvent::Files {
                source,
                seen,
                ingested,
            } => format!(
                "sync {}  {} seen  {} ingested\n",
                source,
                format_number(*seen),
                format_number(*ingested)
            ),
            SyncProgressEvent::SourceDone {
                source,
                seen,
                ingested,
                deleted,
            } => format!(
                "sync {}  done  {} seen  {} ingested  {} deleted\n",
                source,
                format_number(*seen),
                format_number(*ingested),
                format_number(*deleted)
            ),
            SyncProgressEvent::Finished { run_id, status } => {
                format!("run {}  {}\n", run_id, status)
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl SyncProgressReporter for JsonProgress {
    fn report(&self, event: SyncProgressEvent) {
        let obj = to_json(&event);
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

fn to_json(event: &SyncProgressEvent) -> serde_json::Value {
    match event {
        SyncProgressEvent::Scanning { source } => serde_json::json!({
            "event": "progress",
            "source": source,
            "phase": "scanning"
        }),
        SyncProgressEvent::Files {
            source,
            seen,
            ingested,
        } => serde_json::json!({
            "event": "progress",
            "source": source,
            "phase": "files",
            "seen": seen,
            "ingested": ingested
        }),
        SyncProgressEvent::SourceDone {
            source,
            seen,
            ingested,
            deleted,
        } => serde_json::json!({
            "event": "progress",
            "source": source,
            "phase": "done",
            "seen": seen,
            "ingested": ingested,
            "deleted": deleted
        }),
        SyncProgressEvent::Finished { run_id, status } => serde_json::json!({
            "event": "finished",
            "run_id": run_id,
            "status": status.as_str()
        }),
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl SyncProgressReporter for NoProgress {
    fn report(&self, _event: SyncProgressEvent) {}
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

    pub fn reporter(&self) -> Box<dyn SyncProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

impl std::str::FromStr for ProgressMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => anyhow::bail!("Unknown progress mode: '{}'. Use off, human, or json.", other),
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
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn json_events_name_their_phase() {
        let done = to_json(&SyncProgressEvent::SourceDone {
            source: "notes".to_string(),
            seen: 3,
            ingested: 2,
            deleted: 1,
        });
        assert_eq!(done["phase"], "done");
        assert_eq!(done["deleted"], 1);

        let finished = to_json(&SyncProgressEvent::Finished {
            run_id: "r1".to_string(),
            status: RunStatus::Partial,
        });
        assert_eq!(finished["status"], "partial");
    }

    #[test]
    fn progress_mode_parses() {
        assert_eq!("json".parse::<ProgressMode>().unwrap(), ProgressMode::Json);
        assert!("loud".parse::<ProgressMode>().is_err());
    }
}
