//! SQLite-backed [`Store`] implementation.
//!
//! Maps each [`Store`] and [`StoreTx`] operation onto the schema created by
//! [`crate::migrate`]. A [`SqliteTx`] wraps one `sqlx` transaction; nested
//! rollback scopes are plain SQL savepoints on that same connection.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::{Executor, Row, SqlitePool, Transaction};
use uuid::Uuid;

use kbsync_core::embedding::{blob_to_vec, vec_to_blob};
use kbsync_core::models::{
    Document, FileRecord, FileUpsert, Folder, FolderUpsert, Fragment, IngestOutcome, IngestRun,
    Project, RunFileEntry, RunStats, RunStatus, Source, SourceSpec,
};
use kbsync_core::store::{DocumentRef, Store, StoreTx};

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

const SOURCE_COLUMNS: &str = "id, project_id, name, kind, root_path, recursive, follow_symlinks, \
     include_globs, exclude_globs, change_detection, enabled, last_scan_at, last_ingest_at";

const FILE_COLUMNS: &str = "id, source_id, folder_id, rel_path, ext, size_bytes, mtime_epoch, \
     content_hash, status, last_seen_at, last_ingested_at, last_ingest_outcome, error";

const RUN_COLUMNS: &str =
    "id, project_id, trigger, status, started_at, finished_at, stats_json, error";

fn project_from_row(row: &SqliteRow) -> Project {
    Project {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        created_at: row.get("created_at"),
    }
}

fn source_from_row(row: &SqliteRow) -> Result<Source> {
    let include: String = row.get("include_globs");
    let exclude: String = row.get("exclude_globs");
    let mode: String = row.get("change_detection");
    Ok(Source {
        id: row.get("id"),
        project_id: row.get("project_id"),
        name: row.get("name"),
        kind: row.get("kind"),
        root_path: row.get("root_path"),
        recursive: row.get("recursive"),
        follow_symlinks: row.get("follow_symlinks"),
        include_globs: serde_json::from_str(&include)?,
        exclude_globs: serde_json::from_str(&exclude)?,
        change_detection: mode.parse()?,
        enabled: row.get("enabled"),
        last_scan_at: row.get("last_scan_at"),
        last_ingest_at: row.get("last_ingest_at"),
    })
}

fn folder_from_row(row: &SqliteRow) -> Folder {
    Folder {
        id: row.get("id"),
        source_id: row.get("source_id"),
        rel_path: row.get("rel_path"),
        parent_id: row.get("parent_id"),
        depth: row.get("depth"),
        last_seen_at: row.get("last_seen_at"),
    }
}

fn file_from_row(row: &SqliteRow) -> Result<FileRecord> {
    let status: String = row.get("status");
    let outcome: String = row.get("last_ingest_outcome");
    Ok(FileRecord {
        id: row.get("id"),
        source_id: row.get("source_id"),
        folder_id: row.get("folder_id"),
        rel_path: row.get("rel_path"),
        ext: row.get("ext"),
        size_bytes: row.get("size_bytes"),
        mtime_epoch: row.get("mtime_epoch"),
        content_hash: row.get("content_hash"),
        status: status.parse()?,
        last_seen_at: row.get("last_seen_at"),
        last_ingested_at: row.get("last_ingested_at"),
        last_ingest_outcome: outcome.parse()?,
        error: row.get("error"),
    })
}

fn document_from_row(row: &SqliteRow) -> Document {
    Document {
        id: row.get("id"),
        project_id: row.get("project_id"),
        file_id: row.get("file_id"),
        doc_type: row.get("doc_type"),
        title: row.get("title"),
        body: row.get("body"),
        content_hash: row.get("content_hash"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn fragment_from_row(row: &SqliteRow) -> Result<Fragment> {
    let metadata: String = row.get("metadata_json");
    let embedding: Option<Vec<u8>> = row.get("embedding");
    Ok(Fragment {
        id: row.get("id"),
        document_id: row.get("document_id"),
        project_id: row.get("project_id"),
        section_label: row.get("section_label"),
        fragment_index: row.get("fragment_index"),
        text: row.get("text"),
        hash: row.get("hash"),
        metadata: serde_json::from_str(&metadata)?,
        embedding: embedding.map(|b| blob_to_vec(&b)),
        embedding_model: row.get("embedding_model"),
    })
}

fn run_from_row(row: &SqliteRow) -> Result<IngestRun> {
    let status: String = row.get("status");
    let stats: Option<String> = row.get("stats_json");
    let stats = match stats {
        Some(json) => Some(serde_json::from_str::<RunStats>(&json)?),
        None => None,
    };
    Ok(IngestRun {
        id: row.get("id"),
        project_id: row.get("project_id"),
        trigger: row.get("trigger"),
        status: status.parse()?,
        started_at: row.get("started_at"),
        finished_at: row.get("finished_at"),
        stats,
        error: row.get("error"),
    })
}

fn run_file_from_row(row: &SqliteRow) -> Result<RunFileEntry> {
    let action: String = row.get("action");
    let outcome: String = row.get("outcome");
    Ok(RunFileEntry {
        run_id: row.get("run_id"),
        file_id: row.get("file_id"),
        action: action.parse()?,
        outcome: outcome.parse()?,
        reason: row.get("reason"),
        error: row.get("error"),
    })
}

async fn fetch_sources<'e, E>(exec: E, project_id: &str, enabled_only: bool) -> Result<Vec<Source>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT {} FROM sources WHERE project_id = ? AND (enabled = 1 OR ? = 0) ORDER BY name",
        SOURCE_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(project_id)
        .bind(enabled_only)
        .fetch_all(exec)
        .await?;
    rows.iter().map(source_from_row).collect()
}

async fn fetch_folders<'e, E>(exec: E, source_id: &str) -> Result<Vec<Folder>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        "SELECT id, source_id, rel_path, parent_id, depth, last_seen_at
         FROM source_folders WHERE source_id = ? ORDER BY rel_path",
    )
    .bind(source_id)
    .fetch_all(exec)
    .await?;
    Ok(rows.iter().map(folder_from_row).collect())
}

async fn fetch_files<'e, E>(exec: E, source_id: &str) -> Result<Vec<FileRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT {} FROM source_files WHERE source_id = ? ORDER BY rel_path",
        FILE_COLUMNS
    );
    let rows = sqlx::query(&sql).bind(source_id).fetch_all(exec).await?;
    rows.iter().map(file_from_row).collect()
}

#[async_trait]
impl Store for SqliteStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteTx { tx }))
    }

    async fn find_project_by_name(&self, name: &str) -> Result<Option<Project>> {
        let row = sqlx::query("SELECT id, name, description, created_at FROM projects WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(project_from_row))
    }

    async fn list_sources(&self, project_id: &str) -> Result<Vec<Source>> {
        fetch_sources(&self.pool, project_id, false).await
    }

    async fn list_folders(&self, source_id: &str) -> Result<Vec<Folder>> {
        fetch_folders(&self.pool, source_id).await
    }

    async fn list_files(&self, source_id: &str) -> Result<Vec<FileRecord>> {
        fetch_files(&self.pool, source_id).await
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, project_id, file_id, doc_type, title, body, content_hash, created_at, updated_at
             FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(document_from_row))
    }

    async fn list_documents(&self, project_id: &str) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            "SELECT id, project_id, file_id, doc_type, title, body, content_hash, created_at, updated_at
             FROM documents WHERE project_id = ? ORDER BY created_at, rowid",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(document_from_row).collect())
    }

    async fn list_fragments(&self, document_id: &str) -> Result<Vec<Fragment>> {
        let rows = sqlx::query(
            "SELECT id, document_id, project_id, section_label, fragment_index, text, hash,
                    metadata_json, embedding, embedding_model
             FROM fragments WHERE document_id = ? ORDER BY fragment_index",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(fragment_from_row).collect()
    }

    async fn get_run(&self, id: &str) -> Result<Option<IngestRun>> {
        let sql = format!("SELECT {} FROM ingest_runs WHERE id = ?", RUN_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(run_from_row).transpose()
    }

    async fn list_runs(&self, project_id: &str, limit: i64) -> Result<Vec<IngestRun>> {
        let sql = format!(
            "SELECT {} FROM ingest_runs WHERE project_id = ?
             ORDER BY started_at DESC, rowid DESC LIMIT ?",
            RUN_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(project_id)
            .bind(limit.max(0))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(run_from_row).collect()
    }

    async fn list_run_files(&self, run_id: &str) -> Result<Vec<RunFileEntry>> {
        let rows = sqlx::query(
            "SELECT run_id, file_id, action, outcome, reason, error
             FROM ingest_run_files WHERE run_id = ? ORDER BY rowid",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(run_file_from_row).collect()
    }
}

/// One open SQLite transaction. Dropping it rolls back.
pub struct SqliteTx {
    tx: Transaction<'static, Sqlite>,
}

fn check_savepoint_name(name: &str) -> Result<()> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        bail!("invalid savepoint name: '{}'", name);
    }
    Ok(())
}

#[async_trait]
impl StoreTx for SqliteTx {
    async fn project_exists(&mut self, project_id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM projects WHERE id = ?")
            .bind(project_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.is_some())
    }

    async fn upsert_project(
        &mut self,
        name: &str,
        description: Option<&str>,
        now: i64,
    ) -> Result<String> {
        let row = sqlx::query(
            r#"
            INSERT INTO projects (id, name, description, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET description = excluded.description
            RETURNING id
            "#,
        )
        .bind(new_id())
        .bind(name)
        .bind(description)
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.get("id"))
    }

    async fn upsert_source(&mut self, project_id: &str, spec: &SourceSpec) -> Result<String> {
        let row = sqlx::query(
            r#"
            INSERT INTO sources (id, project_id, name, kind, root_path, recursive,
                                 follow_symlinks, include_globs, exclude_globs,
                                 change_detection, enabled)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(project_id, name) DO UPDATE SET
                kind = excluded.kind,
                root_path = excluded.root_path,
                recursive = excluded.recursive,
                follow_symlinks = excluded.follow_symlinks,
                include_globs = excluded.include_globs,
                exclude_globs = excluded.exclude_globs,
                change_detection = excluded.change_detection,
                enabled = excluded.enabled
            RETURNING id
            "#,
        )
        .bind(new_id())
        .bind(project_id)
        .bind(&spec.name)
        .bind(&spec.kind)
        .bind(&spec.root_path)
        .bind(spec.recursive)
        .bind(spec.follow_symlinks)
        .bind(serde_json::to_string(&spec.include_globs)?)
        .bind(serde_json::to_string(&spec.exclude_globs)?)
        .bind(spec.change_detection.as_str())
        .bind(spec.enabled)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.get("id"))
    }

    async fn list_enabled_sources(&mut self, project_id: &str) -> Result<Vec<Source>> {
        fetch_sources(&mut *self.tx, project_id, true).await
    }

    async fn stamp_source_scan(&mut self, source_id: &str, at: i64) -> Result<()> {
        sqlx::query("UPDATE sources SET last_scan_at = ? WHERE id = ?")
            .bind(at)
            .bind(source_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn stamp_source_ingest(&mut self, source_id: &str, at: i64) -> Result<()> {
        sqlx::query("UPDATE sources SET last_ingest_at = ? WHERE id = ?")
            .bind(at)
            .bind(source_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn list_folders(&mut self, source_id: &str) -> Result<Vec<Folder>> {
        fetch_folders(&mut *self.tx, source_id).await
    }

    async fn upsert_folder(&mut self, folder: &FolderUpsert<'_>) -> Result<String> {
        let row = sqlx::query(
            r#"
            INSERT INTO source_folders (id, source_id, rel_path, parent_id, depth, last_seen_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(source_id, rel_path) DO UPDATE SET last_seen_at = excluded.last_seen_at
            RETURNING id
            "#,
        )
        .bind(new_id())
        .bind(folder.source_id)
        .bind(folder.rel_path)
        .bind(folder.parent_id)
        .bind(folder.depth)
        .bind(folder.seen_at)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.get("id"))
    }

    async fn touch_folder(&mut self, folder_id: &str, at: i64) -> Result<()> {
        let result = sqlx::query("UPDATE source_folders SET last_seen_at = ? WHERE id = ?")
            .bind(at)
            .bind(folder_id)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            bail!("folder not found: {}", folder_id);
        }
        Ok(())
    }

    async fn list_files(&mut self, source_id: &str) -> Result<Vec<FileRecord>> {
        fetch_files(&mut *self.tx, source_id).await
    }

    async fn upsert_file(&mut self, file: &FileUpsert<'_>) -> Result<String> {
        let row = sqlx::query(
            r#"
            INSERT INTO source_files (id, source_id, folder_id, rel_path, ext, size_bytes,
                                      mtime_epoch, content_hash, status, last_seen_at,
                                      last_ingest_outcome)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'seen', ?, 'never')
            ON CONFLICT(source_id, rel_path) DO UPDATE SET
                folder_id = excluded.folder_id,
                ext = excluded.ext,
                size_bytes = excluded.size_bytes,
                mtime_epoch = excluded.mtime_epoch,
                content_hash = excluded.content_hash,
                status = 'seen',
                last_seen_at = excluded.last_seen_at
            RETURNING id
            "#,
        )
        .bind(new_id())
        .bind(file.source_id)
        .bind(file.folder_id)
        .bind(file.rel_path)
        .bind(file.ext)
        .bind(file.size_bytes)
        .bind(file.mtime_epoch)
        .bind(file.content_hash)
        .bind(file.seen_at)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.get("id"))
    }

    async fn record_ingest_outcome(
        &mut self,
        file_id: &str,
        outcome: IngestOutcome,
        error: Option<&str>,
        at: i64,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE source_files SET last_ingested_at = ?, last_ingest_outcome = ?, error = ?
             WHERE id = ?",
        )
        .bind(at)
        .bind(outcome.as_str())
        .bind(error)
        .bind(file_id)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            bail!("file not found: {}", file_id);
        }
        Ok(())
    }

    async fn mark_file_deleted(&mut self, file_id: &str, at: i64) -> Result<()> {
        let result =
            sqlx::query("UPDATE source_files SET status = 'deleted', last_seen_at = ? WHERE id = ?")
                .bind(at)
                .bind(file_id)
                .execute(&mut *self.tx)
                .await?;
        if result.rows_affected() == 0 {
            bail!("file not found: {}", file_id);
        }
        Ok(())
    }

    async fn find_document(
        &mut self,
        project_id: &str,
        file_id: &str,
    ) -> Result<Option<DocumentRef>> {
        let row = sqlx::query(
            "SELECT id, content_hash FROM documents WHERE project_id = ? AND file_id = ?",
        )
        .bind(project_id)
        .bind(file_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(|r| DocumentRef {
            id: r.get("id"),
            content_hash: r.get("content_hash"),
        }))
    }

    async fn upsert_document(&mut self, doc: &Document) -> Result<String> {
        let row = sqlx::query(
            r#"
            INSERT INTO documents (id, project_id, file_id, doc_type, title, body,
                                   content_hash, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(project_id, file_id) DO UPDATE SET
                doc_type = excluded.doc_type,
                title = excluded.title,
                body = excluded.body,
                content_hash = excluded.content_hash,
                updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.project_id)
        .bind(&doc.file_id)
        .bind(&doc.doc_type)
        .bind(&doc.title)
        .bind(&doc.body)
        .bind(&doc.content_hash)
        .bind(doc.created_at)
        .bind(doc.updated_at)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.get("id"))
    }

    async fn replace_fragments(&mut self, document_id: &str, fragments: &[Fragment]) -> Result<()> {
        sqlx::query("DELETE FROM fragments WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *self.tx)
            .await?;

        for fragment in fragments {
            sqlx::query(
                r#"
                INSERT INTO fragments (id, document_id, project_id, section_label,
                                       fragment_index, text, hash, metadata_json,
                                       embedding, embedding_model)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&fragment.id)
            .bind(document_id)
            .bind(&fragment.project_id)
            .bind(&fragment.section_label)
            .bind(fragment.fragment_index)
            .bind(&fragment.text)
            .bind(&fragment.hash)
            .bind(serde_json::to_string(&fragment.metadata)?)
            .bind(fragment.embedding.as_deref().map(vec_to_blob))
            .bind(&fragment.embedding_model)
            .execute(&mut *self.tx)
            .await?;
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
        sqlx::query(
            "INSERT INTO ingest_runs (id, project_id, trigger, status, started_at)
             VALUES (?, ?, ?, 'running', ?)",
        )
        .bind(&id)
        .bind(project_id)
        .bind(trigger)
        .bind(started_at)
        .execute(&mut *self.tx)
        .await?;
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
        let result = sqlx::query(
            "UPDATE ingest_runs SET status = ?, stats_json = ?, error = ?, finished_at = ?
             WHERE id = ? AND status = 'running'",
        )
        .bind(status.as_str())
        .bind(serde_json::to_string(stats)?)
        .bind(error)
        .bind(finished_at)
        .bind(run_id)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            bail!("ingest run {} is unknown or already finalized", run_id);
        }
        Ok(())
    }

    async fn upsert_run_file(&mut self, entry: &RunFileEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ingest_run_files (run_id, file_id, action, outcome, reason, error)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(run_id, file_id) DO UPDATE SET
                action = excluded.action,
                outcome = excluded.outcome,
                error = excluded.error
            "#,
        )
        .bind(&entry.run_id)
        .bind(&entry.file_id)
        .bind(entry.action.as_str())
        .bind(entry.outcome.as_str())
        .bind(&entry.reason)
        .bind(&entry.error)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn savepoint(&mut self, name: &str) -> Result<()> {
        check_savepoint_name(name)?;
        sqlx::query(&format!("SAVEPOINT {}", name))
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn release_savepoint(&mut self, name: &str) -> Result<()> {
        check_savepoint_name(name)?;
        sqlx::query(&format!("RELEASE SAVEPOINT {}", name))
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        check_savepoint_name(name)?;
        sqlx::query(&format!("ROLLBACK TO SAVEPOINT {}", name))
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_path;
    use crate::migrate::migrate_pool;
    use kbsync_core::models::{ActionOutcome, ChangeDetection, FileStatus, RunAction};
    use tempfile::TempDir;

    async fn open() -> (TempDir, SqliteStore) {
        let dir = TempDir::new().unwrap();
        let pool = connect_path(&dir.path().join("kb.sqlite")).await.unwrap();
        migrate_pool(&pool).await.unwrap();
        (dir, SqliteStore::new(pool))
    }

    fn spec(name: &str) -> SourceSpec {
        SourceSpec {
            name: name.to_string(),
            kind: "folder".to_string(),
            root_path: "/srv/notes".to_string(),
            recursive: true,
            follow_symlinks: false,
            include_globs: vec!["**/*.md".to_string()],
            exclude_globs: vec![],
            change_detection: ChangeDetection::Mtime,
            enabled: true,
        }
    }

    #[tokio::test]
    async fn dropped_tx_rolls_back() {
        let (_dir, store) = open().await;
        {
            let mut tx = store.begin().await.unwrap();
            tx.upsert_project("lost", None, 1).await.unwrap();
        }
        assert!(store.find_project_by_name("lost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upserts_return_stable_ids() {
        let (_dir, store) = open().await;
        let mut tx = store.begin().await.unwrap();
        let p1 = tx.upsert_project("campaign", None, 1).await.unwrap();
        let p2 = tx.upsert_project("campaign", Some("notes"), 2).await.unwrap();
        assert_eq!(p1, p2);

        let s1 = tx.upsert_source(&p1, &spec("notes")).await.unwrap();
        let s2 = tx.upsert_source(&p1, &spec("notes")).await.unwrap();
        assert_eq!(s1, s2);

        let root = FolderUpsert {
            source_id: &s1,
            rel_path: "",
            parent_id: None,
            depth: 0,
            seen_at: 10,
        };
        let f1 = tx.upsert_folder(&root).await.unwrap();
        let f2 = tx.upsert_folder(&FolderUpsert { seen_at: 20, ..root.clone() }).await.unwrap();
        assert_eq!(f1, f2);

        let file = FileUpsert {
            source_id: &s1,
            folder_id: Some(&f1),
            rel_path: "a.md",
            ext: Some("md"),
            size_bytes: 3,
            mtime_epoch: 100,
            content_hash: None,
            seen_at: 20,
        };
        let id1 = tx.upsert_file(&file).await.unwrap();
        tx.mark_file_deleted(&id1, 21).await.unwrap();
        let id2 = tx.upsert_file(&FileUpsert { size_bytes: 4, ..file }).await.unwrap();
        assert_eq!(id1, id2);
        tx.commit().await.unwrap();

        let project = store.find_project_by_name("campaign").await.unwrap().unwrap();
        assert_eq!(project.description.as_deref(), Some("notes"));
        let sources = store.list_sources(&p1).await.unwrap();
        assert_eq!(sources[0].include_globs, vec!["**/*.md".to_string()]);
        assert_eq!(sources[0].change_detection, ChangeDetection::Mtime);

        let folders = store.list_folders(&s1).await.unwrap();
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].last_seen_at, 20);

        let files = store.list_files(&s1).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].status, FileStatus::Seen);
        assert_eq!(files[0].size_bytes, 4);
        assert_eq!(files[0].last_ingest_outcome, IngestOutcome::Never);
    }

    #[tokio::test]
    async fn savepoint_rollback_keeps_earlier_writes() {
        let (_dir, store) = open().await;
        let mut tx = store.begin().await.unwrap();
        tx.upsert_project("a", None, 1).await.unwrap();
        tx.savepoint("ingest_file").await.unwrap();
        tx.upsert_project("b", None, 1).await.unwrap();
        tx.rollback_to_savepoint("ingest_file").await.unwrap();
        tx.release_savepoint("ingest_file").await.unwrap();
        tx.commit().await.unwrap();

        assert!(store.find_project_by_name("a").await.unwrap().is_some());
        assert!(store.find_project_by_name("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn savepoint_names_are_checked() {
        let (_dir, store) = open().await;
        let mut tx = store.begin().await.unwrap();
        assert!(tx.savepoint("x; DROP TABLE projects").await.is_err());
    }

    #[tokio::test]
    async fn run_lifecycle_and_audit_rows() {
        let (_dir, store) = open().await;
        let mut tx = store.begin().await.unwrap();
        let project = tx.upsert_project("p", None, 1).await.unwrap();
        let source = tx.upsert_source(&project, &spec("s")).await.unwrap();
        let file = tx
            .upsert_file(&FileUpsert {
                source_id: &source,
                folder_id: None,
                rel_path: "x.md",
                ext: Some("md"),
                size_bytes: 1,
                mtime_epoch: 1,
                content_hash: None,
                seen_at: 1,
            })
            .await
            .unwrap();
        let run = tx.create_run(&project, "test", 5).await.unwrap();

        let mut entry = RunFileEntry {
            run_id: run.clone(),
            file_id: file.clone(),
            action: RunAction::Ingest,
            outcome: ActionOutcome::Ok,
            reason: Some("new".to_string()),
            error: None,
        };
        tx.upsert_run_file(&entry).await.unwrap();
        entry.outcome = ActionOutcome::Error;
        entry.reason = Some("retry".to_string());
        entry.error = Some("read failed".to_string());
        tx.upsert_run_file(&entry).await.unwrap();

        let stats = RunStats {
            files_seen: 1,
            errors: vec!["read failed".to_string()],
            ..RunStats::default()
        };
        tx.finalize_run(&run, RunStatus::Partial, &stats, Some("read failed"), 6)
            .await
            .unwrap();
        assert!(tx
            .finalize_run(&run, RunStatus::Ok, &stats, None, 7)
            .await
            .is_err());
        tx.commit().await.unwrap();

        let stored = store.get_run(&run).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Partial);
        assert_eq!(stored.finished_at, Some(6));
        assert_eq!(stored.stats, Some(stats));

        let rows = store.list_run_files(&run).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].outcome, ActionOutcome::Error);
        assert_eq!(rows[0].reason.as_deref(), Some("new"));

        assert_eq!(store.list_runs(&project, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fragments_are_replaced_wholesale() {
        let (_dir, store) = open().await;
        let mut tx = store.begin().await.unwrap();
        let project = tx.upsert_project("p", None, 1).await.unwrap();
        let source = tx.upsert_source(&project, &spec("s")).await.unwrap();
        let file = tx
            .upsert_file(&FileUpsert {
                source_id: &source,
                folder_id: None,
                rel_path: "x.md",
                ext: Some("md"),
                size_bytes: 1,
                mtime_epoch: 1,
                content_hash: None,
                seen_at: 1,
            })
            .await
            .unwrap();
        let doc = Document {
            id: new_id(),
            project_id: project.clone(),
            file_id: file,
            doc_type: "md".to_string(),
            title: "x".to_string(),
            body: "body".to_string(),
            content_hash: "h".to_string(),
            created_at: 1,
            updated_at: 1,
        };
        let doc_id = tx.upsert_document(&doc).await.unwrap();
        let make = |i: i64, embedding: Option<Vec<f32>>| Fragment {
            id: new_id(),
            document_id: doc_id.clone(),
            project_id: project.clone(),
            section_label: String::new(),
            fragment_index: i,
            text: format!("part {}", i),
            hash: format!("h{}", i),
            metadata: serde_json::json!({ "v": 0 }),
            embedding,
            embedding_model: "nomic-embed-text".to_string(),
        };
        tx.replace_fragments(&doc_id, &[make(0, None), make(1, None)])
            .await
            .unwrap();
        tx.replace_fragments(&doc_id, &[make(0, Some(vec![0.25, 0.5]))])
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let fragments = store.list_fragments(&doc_id).await.unwrap();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].embedding, Some(vec![0.25, 0.5]));
        assert_eq!(fragments[0].metadata, serde_json::json!({ "v": 0 }));
    }
}
