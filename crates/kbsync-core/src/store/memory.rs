//! In-memory [`Store`] implementation for testing.
//!
//! All records live in one [`State`] behind a `Mutex`. A transaction works
//! on a private copy of the state and publishes it on commit; savepoints
//! are copies pushed on a stack. Overlapping transactions are last-commit
//! wins, so callers keep to one writer at a time.

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    Document, FileRecord, FileStatus, FileUpsert, Folder, FolderUpsert, Fragment, IngestOutcome,
    IngestRun, Project, RunFileEntry, RunStats, RunStatus, Source, SourceSpec,
};

use super::{DocumentRef, Store, StoreTx};

#[derive(Debug, Clone, Default)]
struct State {
    projects: Vec<Project>,
    sources: Vec<Source>,
    folders: Vec<Folder>,
    files: Vec<FileRecord>,
    documents: Vec<Document>,
    fragments: Vec<Fragment>,
    runs: Vec<IngestRun>,
    run_files: Vec<RunFileEntry>,
}

/// In-memory store for tests and embedding.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    /// Number of fragments held across all documents.
    pub fn fragment_count(&self) -> Result<usize> {
        Ok(self.read()?.fragments.len())
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn sorted_by_path<T>(items: impl Iterator<Item = T>, key: impl FnMut(&T) -> String) -> Vec<T> {
    let mut out: Vec<T> = items.collect();
    out.sort_by_key(key);
    out
}

impl State {
    fn folders_of(&self, source_id: &str) -> Vec<Folder> {
        sorted_by_path(
            self.folders.iter().filter(|f| f.source_id == source_id).cloned(),
            |f| f.rel_path.clone(),
        )
    }

    fn files_of(&self, source_id: &str) -> Vec<FileRecord> {
        sorted_by_path(
            self.files.iter().filter(|f| f.source_id == source_id).cloned(),
            |f| f.rel_path.clone(),
        )
    }

    fn sources_of(&self, project_id: &str, enabled_only: bool) -> Vec<Source> {
        sorted_by_path(
            self.sources
                .iter()
                .filter(|s| s.project_id == project_id && (!enabled_only || s.enabled))
                .cloned(),
            |s| s.name.clone(),
        )
    }

    fn source_mut(&mut self, source_id: &str) -> Result<&mut Source> {
        self.sources
            .iter_mut()
            .find(|s| s.id == source_id)
            .ok_or_else(|| anyhow!("source not found: {}", source_id))
    }

    fn file_mut(&mut self, file_id: &str) -> Result<&mut FileRecord> {
        self.files
            .iter_mut()
            .find(|f| f.id == file_id)
            .ok_or_else(|| anyhow!("file not found: {}", file_id))
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let working = self.read()?.clone();
        Ok(Box::new(MemoryTx {
            shared: Arc::clone(&self.state),
            working,
            savepoints: Vec::new(),
        }))
    }

    async fn find_project_by_name(&self, name: &str) -> Result<Option<Project>> {
        Ok(self.read()?.projects.iter().find(|p| p.name == name).cloned())
    }

    async fn list_sources(&self, project_id: &str) -> Result<Vec<Source>> {
        Ok(self.read()?.sources_of(project_id, false))
    }

    async fn list_folders(&self, source_id: &str) -> Result<Vec<Folder>> {
        Ok(self.read()?.folders_of(source_id))
    }

    async fn list_files(&self, source_id: &str) -> Result<Vec<FileRecord>> {
        Ok(self.read()?.files_of(source_id))
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.read()?.documents.iter().find(|d| d.id == id).cloned())
    }

    async fn list_documents(&self, project_id: &str) -> Result<Vec<Document>> {
        Ok(self
            .read()?
            .documents
            .iter()
            .filter(|d| d.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn list_fragments(&self, document_id: &str) -> Result<Vec<Fragment>> {
        let mut out: Vec<Fragment> = self
            .read()?
            .fragments
            .iter()
            .filter(|f| f.document_id == document_id)
            .cloned()
            .collect();
        out.sort_by_key(|f| f.fragment_index);
        Ok(out)
    }

    async fn get_run(&self, id: &str) -> Result<Option<IngestRun>> {
        Ok(self.read()?.runs.iter().find(|r| r.id == id).cloned())
    }

    async fn list_runs(&self, project_id: &str, limit: i64) -> Result<Vec<IngestRun>> {
        Ok(self
            .read()?
            .runs
            .iter()
            .rev()
            .filter(|r| r.project_id == project_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn list_run_files(&self, run_id: &str) -> Result<Vec<RunFileEntry>> {
        Ok(self
            .read()?
            .run_files
            .iter()
            .filter(|e| e.run_id == run_id)
            .cloned()
            .collect())
    }
}

struct MemoryTx {
    shared: Arc<Mutex<State>>,
    working: State,
    savepoints: Vec<(String, State)>,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn project_exists(&mut self, project_id: &str) -> Result<bool> {
        Ok(self.working.projects.iter().any(|p| p.id == project_id))
    }

    async fn upsert_project(
        &mut self,
        name: &str,
        description: Option<&str>,
        now: i64,
    ) -> Result<String> {
        if let Some(p) = self.working.projects.iter_mut().find(|p| p.name == name) {
            p.description = description.map(str::to_string);
            return Ok(p.id.clone());
        }
        let id = new_id();
        self.working.projects.push(Project {
            id: id.clone(),
            name: name.to_string(),
            description: description.map(str::to_string),
            created_at: now,
        });
        Ok(id)
    }

    async fn upsert_source(&mut self, project_id: &str, spec: &SourceSpec) -> Result<String> {
        if !self.working.projects.iter().any(|p| p.id == project_id) {
            bail!("project not found: {}", project_id);
        }
        if let Some(s) = self
            .working
            .sources
            .iter_mut()
            .find(|s| s.project_id == project_id && s.name == spec.name)
        {
            s.kind = spec.kind.clone();
            s.root_path = spec.root_path.clone();
            s.recursive = spec.recursive;
            s.follow_symlinks = spec.follow_symlinks;
            s.include_globs = spec.include_globs.clone();
            s.exclude_globs = spec.exclude_globs.clone();
            s.change_detection = spec.change_detection;
            s.enabled = spec.enabled;
            return Ok(s.id.clone());
        }
        let id = new_id();
        self.working.sources.push(Source {
            id: id.clone(),
            project_id: project_id.to_string(),
            name: spec.name.clone(),
            kind: spec.kind.clone(),
            root_path: spec.root_path.clone(),
            recursive: spec.recursive,
            follow_symlinks: spec.follow_symlinks,
            include_globs: spec.include_globs.clone(),
            exclude_globs: spec.exclude_globs.clone(),
            change_detection: spec.change_detection,
            enabled: spec.enabled,
            last_scan_at: None,
            last_ingest_at: None,
        });
        Ok(id)
    }

    async fn list_enabled_sources(&mut self, project_id: &str) -> Result<Vec<Source>> {
        Ok(self.working.sources_of(project_id, true))
    }

    async fn stamp_source_scan(&mut self, source_id: &str, at: i64) -> Result<()> {
        self.working.source_mut(source_id)?.last_scan_at = Some(at);
        Ok(())
    }

    async fn stamp_source_ingest(&mut self, source_id: &str, at: i64) -> Result<()> {
        self.working.source_mut(source_id)?.last_ingest_at = Some(at);
        Ok(())
    }

    async fn list_folders(&mut self, source_id: &str) -> Result<Vec<Folder>> {
        Ok(self.working.folders_of(source_id))
    }

    async fn upsert_folder(&mut self, folder: &FolderUpsert<'_>) -> Result<String> {
        if let Some(f) = self
            .working
            .folders
            .iter_mut()
            .find(|f| f.source_id == folder.source_id && f.rel_path == folder.rel_path)
        {
            f.last_seen_at = folder.seen_at;
            return Ok(f.id.clone());
        }
        let id = new_id();
        self.working.folders.push(Folder {
            id: id.clone(),
            source_id: folder.source_id.to_string(),
            rel_path: folder.rel_path.to_string(),
            parent_id: folder.parent_id.map(str::to_string),
            depth: folder.depth,
            last_seen_at: folder.seen_at,
        });
        Ok(id)
    }

    async fn touch_folder(&mut self, folder_id: &str, at: i64) -> Result<()> {
        let folder = self
            .working
            .folders
            .iter_mut()
            .find(|f| f.id == folder_id)
            .ok_or_else(|| anyhow!("folder not found: {}", folder_id))?;
        folder.last_seen_at = at;
        Ok(())
    }

    async fn list_files(&mut self, source_id: &str) -> Result<Vec<FileRecord>> {
        Ok(self.working.files_of(source_id))
    }

    async fn upsert_file(&mut self, file: &FileUpsert<'_>) -> Result<String> {
        if let Some(f) = self
            .working
            .files
            .iter_mut()
            .find(|f| f.source_id == file.source_id && f.rel_path == file.rel_path)
        {
            f.folder_id = file.folder_id.map(str::to_string);
            f.ext = file.ext.map(str::to_string);
            f.size_bytes = file.size_bytes;
            f.mtime_epoch = file.mtime_epoch;
            f.content_hash = file.content_hash.map(str::to_string);
            f.status = FileStatus::Seen;
            f.last_seen_at = file.seen_at;
            return Ok(f.id.clone());
        }
        let id = new_id();
        self.working.files.push(FileRecord {
            id: id.clone(),
            source_id: file.source_id.to_string(),
            folder_id: file.folder_id.map(str::to_string),
            rel_path: file.rel_path.to_string(),
            ext: file.ext.map(str::to_string),
            size_bytes: file.size_bytes,
            mtime_epoch: file.mtime_epoch,
            content_hash: file.content_hash.map(str::to_string),
            status: FileStatus::Seen,
            last_seen_at: file.seen_at,
            last_ingested_at: None,
            last_ingest_outcome: IngestOutcome::Never,
            error: None,
        });
        Ok(id)
    }

    async fn record_ingest_outcome(
        &mut self,
        file_id: &str,
        outcome: IngestOutcome,
        error: Option<&str>,
        at: i64,
    ) -> Result<()> {
        let file = self.working.file_mut(file_id)?;
        file.last_ingested_at = Some(at);
        file.last_ingest_outcome = outcome;
        file.error = error.map(str::to_string);
        Ok(())
    }

    async fn mark_file_deleted(&mut self, file_id: &str, at: i64) -> Result<()> {
        let file = self.working.file_mut(file_id)?;
        file.status = FileStatus::Deleted;
        file.last_seen_at = at;
        Ok(())
    }

    async fn find_document(
        &mut self,
        project_id: &str,
        file_id: &str,
    ) -> Result<Option<DocumentRef>> {
        Ok(self
            .working
            .documents
            .iter()
            .find(|d| d.project_id == project_id && d.file_id == file_id)
            .map(|d| DocumentRef {
                id: d.id.clone(),
                content_hash: d.content_hash.clone(),
            }))
    }

    async fn upsert_document(&mut self, doc: &Document) -> Result<String> {
        if let Some(d) = self
            .working
            .documents
            .iter_mut()
            .find(|d| d.project_id == doc.project_id && d.file_id == doc.file_id)
        {
            d.doc_type = doc.doc_type.clone();
            d.title = doc.title.clone();
            d.body = doc.body.clone();
            d.content_hash = doc.content_hash.clone();
            d.updated_at = doc.updated_at;
            return Ok(d.id.clone());
        }
        self.working.documents.push(doc.clone());
        Ok(doc.id.clone())
    }

    async fn replace_fragments(&mut self, document_id: &str, fragments: &[Fragment]) -> Result<()> {
        self.working
            .fragments
            .retain(|f| f.document_id != document_id);
        for (i, fragment) in fragments.iter().enumerate() {
            if fragments[..i]
                .iter()
                .any(|f| f.fragment_index == fragment.fragment_index)
            {
                bail!(
                    "duplicate fragment index {} for document {}",
                    fragment.fragment_index,
                    document_id
                );
            }
            let mut stored = fragment.clone();
            stored.document_id = document_id.to_string();
            self.working.fragments.push(stored);
        }
        Ok(())
    }

    async fn create_run(
        &mut self,
        project_id: &str,
        trigger: &str,
        started_at: i64,
    ) -> Result<String> {
        let id = new_id();
        self.working.runs.push(IngestRun {
            id: id.clone(),
            project_id: project_id.to_string(),
            trigger: trigger.to_string(),
            status: RunStatus::Running,
            started_at,
            finished_at: None,
            stats: None,
            error: None,
        });
        Ok(id)
    }

    async fn finalize_run(
        &mut self,
        run_id: &str,
        status: RunStatus,
        stats: &RunStats,
        error: Option<&str>,
        finished_at: i64,
    ) -> Result<()> {
        let run = self
            .working
            .runs
            .iter_mut()
            .find(|r| r.id == run_id)
            .ok_or_else(|| anyhow!("ingest run not found: {}", run_id))?;
        if run.status != RunStatus::Running {
            bail!("ingest run {} already finalized as {}", run_id, run.status);
        }
        run.status = status;
        run.stats = Some(stats.clone());
        run.error = error.map(str::to_string);
        run.finished_at = Some(finished_at);
        Ok(())
    }

    async fn upsert_run_file(&mut self, entry: &RunFileEntry) -> Result<()> {
        if let Some(existing) = self
            .working
            .run_files
            .iter_mut()
            .find(|e| e.run_id == entry.run_id && e.file_id == entry.file_id)
        {
            existing.action = entry.action;
            existing.outcome = entry.outcome;
            existing.error = entry.error.clone();
            return Ok(());
        }
        self.working.run_files.push(entry.clone());
        Ok(())
    }

    async fn savepoint(&mut self, name: &str) -> Result<()> {
        self.savepoints
            .push((name.to_string(), self.working.clone()));
        Ok(())
    }

    async fn release_savepoint(&mut self, name: &str) -> Result<()> {
        let pos = self
            .savepoints
            .iter()
            .rposition(|(n, _)| n == name)
            .ok_or_else(|| anyhow!("no such savepoint: {}", name))?;
        self.savepoints.truncate(pos);
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        let pos = self
            .savepoints
            .iter()
            .rposition(|(n, _)| n == name)
            .ok_or_else(|| anyhow!("no such savepoint: {}", name))?;
        self.savepoints.truncate(pos + 1);
        self.working = self.savepoints[pos].1.clone();
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTx {
            shared, working, ..
        } = *self;
        let mut guard = shared
            .lock()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActionOutcome, ChangeDetection, RunAction};

    fn spec(name: &str) -> SourceSpec {
        SourceSpec {
            name: name.to_string(),
            kind: "folder".to_string(),
            root_path: "/tmp/notes".to_string(),
            recursive: true,
            follow_symlinks: false,
            include_globs: vec![],
            exclude_globs: vec![],
            change_detection: ChangeDetection::Auto,
            enabled: true,
        }
    }

    #[tokio::test]
    async fn uncommitted_tx_is_discarded() {
        let store = InMemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.upsert_project("lost", None, 1).await.unwrap();
        }
        assert!(store.find_project_by_name("lost").await.unwrap().is_none());

        let mut tx = store.begin().await.unwrap();
        tx.upsert_project("kept", None, 1).await.unwrap();
        tx.commit().await.unwrap();
        assert!(store.find_project_by_name("kept").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn upserts_keep_identity() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let p1 = tx.upsert_project("campaign", None, 1).await.unwrap();
        let p2 = tx.upsert_project("campaign", Some("desc"), 2).await.unwrap();
        assert_eq!(p1, p2);

        let s1 = tx.upsert_source(&p1, &spec("notes")).await.unwrap();
        let mut changed = spec("notes");
        changed.enabled = false;
        let s2 = tx.upsert_source(&p1, &changed).await.unwrap();
        assert_eq!(s1, s2);
        assert!(tx.list_enabled_sources(&p1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn savepoint_rollback_restores_state() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.upsert_project("a", None, 1).await.unwrap();
        tx.savepoint("sp").await.unwrap();
        let b = tx.upsert_project("b", None, 1).await.unwrap();
        tx.rollback_to_savepoint("sp").await.unwrap();
        tx.release_savepoint("sp").await.unwrap();
        assert!(!tx.project_exists(&b).await.unwrap());
        tx.commit().await.unwrap();
        assert!(store.find_project_by_name("a").await.unwrap().is_some());
        assert!(store.find_project_by_name("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn run_finalizes_once_and_audit_keeps_first_reason() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let project = tx.upsert_project("p", None, 1).await.unwrap();
        let run = tx.create_run(&project, "test", 1).await.unwrap();

        let mut entry = RunFileEntry {
            run_id: run.clone(),
            file_id: "f1".to_string(),
            action: RunAction::Ingest,
            outcome: ActionOutcome::Ok,
            reason: Some("new".to_string()),
            error: None,
        };
        tx.upsert_run_file(&entry).await.unwrap();
        entry.outcome = ActionOutcome::Error;
        entry.reason = Some("other".to_string());
        entry.error = Some("boom".to_string());
        tx.upsert_run_file(&entry).await.unwrap();

        let stats = RunStats::default();
        tx.finalize_run(&run, RunStatus::Ok, &stats, None, 2).await.unwrap();
        assert!(tx.finalize_run(&run, RunStatus::Partial, &stats, None, 3).await.is_err());
        tx.commit().await.unwrap();

        let rows = store.list_run_files(&run).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].outcome, ActionOutcome::Error);
        assert_eq!(rows[0].reason.as_deref(), Some("new"));
        assert_eq!(rows[0].error.as_deref(), Some("boom"));
        assert_eq!(store.get_run(&run).await.unwrap().unwrap().status, RunStatus::Ok);
    }
}
