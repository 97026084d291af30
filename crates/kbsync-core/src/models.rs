//! Core data models used throughout kbsync.
//!
//! These types mirror the persisted bookkeeping records (sources, folders,
//! files), the materialized knowledge base (documents, fragments), and the
//! run-level audit trail (runs and per-file entries).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A project owns a set of sources and one logical knowledge base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: i64,
}

/// Policy governing when content hashing confirms a metadata change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeDetection {
    /// Size/mtime only. Never hashes.
    Mtime,
    /// Hash whenever metadata suggests a change (or on forced rehash).
    #[serde(alias = "sha256")]
    HashConfirmed,
    /// Same policy as [`ChangeDetection::HashConfirmed`]; the default.
    #[default]
    Auto,
}

impl ChangeDetection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeDetection::Mtime => "mtime",
            ChangeDetection::HashConfirmed => "hash-confirmed",
            ChangeDetection::Auto => "auto",
        }
    }

    /// Whether this mode ever reads file content to confirm a change.
    pub fn confirms_with_hash(&self) -> bool {
        !matches!(self, ChangeDetection::Mtime)
    }
}

impl FromStr for ChangeDetection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mtime" => Ok(ChangeDetection::Mtime),
            "hash-confirmed" | "sha256" => Ok(ChangeDetection::HashConfirmed),
            "auto" => Ok(ChangeDetection::Auto),
            other => anyhow::bail!(
                "Unknown change detection mode: '{}'. Must be mtime, hash-confirmed, or auto.",
                other
            ),
        }
    }
}

impl fmt::Display for ChangeDetection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured content root under a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Source {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub kind: String,
    pub root_path: String,
    pub recursive: bool,
    pub follow_symlinks: bool,
    pub include_globs: Vec<String>,
    pub exclude_globs: Vec<String>,
    pub change_detection: ChangeDetection,
    pub enabled: bool,
    pub last_scan_at: Option<i64>,
    pub last_ingest_at: Option<i64>,
}

/// Source definition as supplied by configuration, before it has an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub name: String,
    pub kind: String,
    pub root_path: String,
    pub recursive: bool,
    pub follow_symlinks: bool,
    pub include_globs: Vec<String>,
    pub exclude_globs: Vec<String>,
    pub change_detection: ChangeDetection,
    pub enabled: bool,
}

/// A discovered directory. The root folder has an empty `rel_path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Folder {
    pub id: String,
    pub source_id: String,
    pub rel_path: String,
    pub parent_id: Option<String>,
    pub depth: i64,
    pub last_seen_at: i64,
}

/// Arguments for inserting (or reviving) a folder row.
#[derive(Debug, Clone)]
pub struct FolderUpsert<'a> {
    pub source_id: &'a str,
    pub rel_path: &'a str,
    pub parent_id: Option<&'a str>,
    pub depth: i64,
    pub seen_at: i64,
}

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => anyhow::bail!(concat!("invalid ", stringify!($name), ": '{}'"), other),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(
    /// Presence of a file on disk as of the last walk.
    FileStatus { Seen => "seen", Deleted => "deleted" }
);

string_enum!(
    /// Result of the last ingest attempt for a file.
    IngestOutcome { Never => "never", Ok => "ok", Skipped => "skipped", Error => "error" }
);

string_enum!(
    /// Lifecycle state of an ingest run. `Running` is never a final state.
    RunStatus { Running => "running", Ok => "ok", Partial => "partial" }
);

string_enum!(
    /// What a run did to a file.
    RunAction { Ingest => "ingest", Delete => "delete" }
);

string_enum!(
    /// Outcome of a per-file run action.
    ActionOutcome { Ok => "ok", Error => "error" }
);

/// A discovered file, soft-deleted but never removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub id: String,
    pub source_id: String,
    pub folder_id: Option<String>,
    pub rel_path: String,
    pub ext: Option<String>,
    pub size_bytes: i64,
    pub mtime_epoch: i64,
    pub content_hash: Option<String>,
    pub status: FileStatus,
    pub last_seen_at: i64,
    pub last_ingested_at: Option<i64>,
    pub last_ingest_outcome: IngestOutcome,
    pub error: Option<String>,
}

/// Arguments for inserting or refreshing a file row.
///
/// Existing rows keep their ingest outcome; status is always reset to
/// `seen` and `last_seen_at` bumped.
#[derive(Debug, Clone)]
pub struct FileUpsert<'a> {
    pub source_id: &'a str,
    pub folder_id: Option<&'a str>,
    pub rel_path: &'a str,
    pub ext: Option<&'a str>,
    pub size_bytes: i64,
    pub mtime_epoch: i64,
    pub content_hash: Option<&'a str>,
    pub seen_at: i64,
}

/// The ingested unit derived from exactly one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    pub id: String,
    pub project_id: String,
    pub file_id: String,
    pub doc_type: String,
    pub title: String,
    pub body: String,
    pub content_hash: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// An ordered piece of a document body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fragment {
    pub id: String,
    pub document_id: String,
    pub project_id: String,
    pub section_label: String,
    pub fragment_index: i64,
    pub text: String,
    pub hash: String,
    pub metadata: serde_json::Value,
    /// Reserved slot; kbsync never computes vectors.
    pub embedding: Option<Vec<f32>>,
    pub embedding_model: String,
}

/// Aggregated counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub sources_total: u64,
    pub sources_scanned: u64,
    pub files_seen: u64,
    pub files_new: u64,
    pub files_changed: u64,
    pub files_unchanged: u64,
    pub files_deleted: u64,
    pub files_ingested: u64,
    pub files_deferred: u64,
    pub docs_ingested: u64,
    pub docs_skipped: u64,
    pub errors: Vec<String>,
}

/// One synchronization invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestRun {
    pub id: String,
    pub project_id: String,
    pub trigger: String,
    pub status: RunStatus,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub stats: Option<RunStats>,
    pub error: Option<String>,
}

/// One audit row per (run, file).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunFileEntry {
    pub run_id: String,
    pub file_id: String,
    pub action: RunAction,
    pub outcome: ActionOutcome,
    pub reason: Option<String>,
    pub error: Option<String>,
}

/// What the caller of a synchronization receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunResult {
    pub run_id: String,
    pub status: RunStatus,
    pub stats: RunStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_detection_accepts_sha256_alias() {
        assert_eq!(
            "sha256".parse::<ChangeDetection>().unwrap(),
            ChangeDetection::HashConfirmed
        );
        assert!("ctime".parse::<ChangeDetection>().is_err());
    }

    #[test]
    fn status_strings_round_trip_through_from_str() {
        for s in ["never", "ok", "skipped", "error"] {
            assert_eq!(s.parse::<IngestOutcome>().unwrap().as_str(), s);
        }
        assert!("done".parse::<RunStatus>().is_err());
    }
}
