//! Storage abstraction for kbsync.
//!
//! The synchronizer talks to persistence through two traits:
//!
//! - [`Store`] hands out transactions and serves committed reads for
//!   inspection (CLI listings, tests).
//! - [`StoreTx`] carries every read and write a run performs. Dropping a
//!   transaction without [`commit`](StoreTx::commit) discards its writes.
//!
//! Uniqueness keys the implementations must enforce:
//!
//! | Record | Key |
//! |--------|-----|
//! | project | `name` |
//! | source | `(project_id, name)` |
//! | folder | `(source_id, rel_path)` |
//! | file | `(source_id, rel_path)` |
//! | document | `(project_id, file_id)` |
//! | fragment | `(document_id, fragment_index)` |
//! | run file entry | `(run_id, file_id)` |
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    Document, FileRecord, FileUpsert, Folder, FolderUpsert, Fragment, IngestOutcome, IngestRun,
    Project, RunFileEntry, RunStats, RunStatus, Source, SourceSpec,
};

/// Identity and fingerprint of an existing document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    pub id: String,
    pub content_hash: String,
}

/// A transactional persistence backend.
#[async_trait]
pub trait Store: Send + Sync {
    /// Open a transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTx>>;

    async fn find_project_by_name(&self, name: &str) -> Result<Option<Project>>;

    /// All sources of a project, enabled or not, ordered by name.
    async fn list_sources(&self, project_id: &str) -> Result<Vec<Source>>;

    /// Folders of a source ordered by relative path.
    async fn list_folders(&self, source_id: &str) -> Result<Vec<Folder>>;

    /// Files of a source in every status, ordered by relative path.
    async fn list_files(&self, source_id: &str) -> Result<Vec<FileRecord>>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    /// Documents of a project in creation order.
    async fn list_documents(&self, project_id: &str) -> Result<Vec<Document>>;

    /// Fragments of a document ordered by index.
    async fn list_fragments(&self, document_id: &str) -> Result<Vec<Fragment>>;

    async fn get_run(&self, id: &str) -> Result<Option<IngestRun>>;

    /// Most recent runs of a project first.
    async fn list_runs(&self, project_id: &str, limit: i64) -> Result<Vec<IngestRun>>;

    /// Audit rows of a run in write order.
    async fn list_run_files(&self, run_id: &str) -> Result<Vec<RunFileEntry>>;
}

/// A unit of work against a [`Store`].
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_project`](StoreTx::upsert_project) / [`upsert_source`](StoreTx::upsert_source) | Register configuration |
/// | [`list_enabled_sources`](StoreTx::list_enabled_sources) | Sources to scan, ordered by name |
/// | [`upsert_folder`](StoreTx::upsert_folder) / [`touch_folder`](StoreTx::touch_folder) | Folder bookkeeping |
/// | [`upsert_file`](StoreTx::upsert_file) / [`mark_file_deleted`](StoreTx::mark_file_deleted) | File bookkeeping |
/// | [`find_document`](StoreTx::find_document) / [`upsert_document`](StoreTx::upsert_document) | Document keyed by (project, file) |
/// | [`replace_fragments`](StoreTx::replace_fragments) | Swap a document's whole fragment set |
/// | [`create_run`](StoreTx::create_run) / [`finalize_run`](StoreTx::finalize_run) | Run lifecycle |
/// | [`upsert_run_file`](StoreTx::upsert_run_file) | Per-file audit row |
/// | [`savepoint`](StoreTx::savepoint) and friends | Nested rollback scope |
#[async_trait]
pub trait StoreTx: Send {
    async fn project_exists(&mut self, project_id: &str) -> Result<bool>;

    /// Insert a project by name or update its description. Returns its id.
    async fn upsert_project(
        &mut self,
        name: &str,
        description: Option<&str>,
        now: i64,
    ) -> Result<String>;

    /// Insert a source by `(project, name)` or update its settings.
    /// Scan/ingest timestamps are preserved. Returns its id.
    async fn upsert_source(&mut self, project_id: &str, spec: &SourceSpec) -> Result<String>;

    /// Enabled sources of a project ordered by name.
    async fn list_enabled_sources(&mut self, project_id: &str) -> Result<Vec<Source>>;

    async fn stamp_source_scan(&mut self, source_id: &str, at: i64) -> Result<()>;

    async fn stamp_source_ingest(&mut self, source_id: &str, at: i64) -> Result<()>;

    async fn list_folders(&mut self, source_id: &str) -> Result<Vec<Folder>>;

    /// Insert a folder, or bump `last_seen_at` if it already exists.
    async fn upsert_folder(&mut self, folder: &FolderUpsert<'_>) -> Result<String>;

    async fn touch_folder(&mut self, folder_id: &str, at: i64) -> Result<()>;

    /// Files of a source in every status.
    async fn list_files(&mut self, source_id: &str) -> Result<Vec<FileRecord>>;

    /// Insert a file with outcome `never`, or refresh an existing one.
    /// Either way the file ends up `seen`. Returns its id.
    async fn upsert_file(&mut self, file: &FileUpsert<'_>) -> Result<String>;

    async fn record_ingest_outcome(
        &mut self,
        file_id: &str,
        outcome: IngestOutcome,
        error: Option<&str>,
        at: i64,
    ) -> Result<()>;

    async fn mark_file_deleted(&mut self, file_id: &str, at: i64) -> Result<()>;

    async fn find_document(&mut self, project_id: &str, file_id: &str)
        -> Result<Option<DocumentRef>>;

    /// Insert a document or update the one already keyed by
    /// `(doc.project_id, doc.file_id)` in place. Returns the stored id.
    async fn upsert_document(&mut self, doc: &Document) -> Result<String>;

    /// Delete every fragment of `document_id` and insert `fragments`.
    async fn replace_fragments(&mut self, document_id: &str, fragments: &[Fragment]) -> Result<()>;

    async fn create_run(&mut self, project_id: &str, trigger: &str, started_at: i64)
        -> Result<String>;

    /// Move a `running` run to its final status. Fails if the run is
    /// unknown or already finalized.
    async fn finalize_run(
        &mut self,
        run_id: &str,
        status: RunStatus,
        stats: &RunStats,
        error: Option<&str>,
        finished_at: i64,
    ) -> Result<()>;

    /// Insert an audit row, or overwrite action/outcome/error of the
    /// existing `(run, file)` row. The first reason is kept.
    async fn upsert_run_file(&mut self, entry: &RunFileEntry) -> Result<()>;

    async fn savepoint(&mut self, name: &str) -> Result<()>;

    async fn release_savepoint(&mut self, name: &str) -> Result<()>;

    /// Undo everything since `savepoint(name)`. The savepoint stays open
    /// and must still be released.
    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}
