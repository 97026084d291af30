//! Database schema migrations (idempotent).
//!
//! Every statement is `CREATE ... IF NOT EXISTS`, so running `kbsync init`
//! repeatedly is safe.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS projects (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        description TEXT,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sources (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        kind TEXT NOT NULL DEFAULT 'folder',
        root_path TEXT NOT NULL,
        recursive INTEGER NOT NULL DEFAULT 1,
        follow_symlinks INTEGER NOT NULL DEFAULT 0,
        include_globs TEXT NOT NULL DEFAULT '[]',
        exclude_globs TEXT NOT NULL DEFAULT '[]',
        change_detection TEXT NOT NULL DEFAULT 'auto',
        enabled INTEGER NOT NULL DEFAULT 1,
        last_scan_at INTEGER,
        last_ingest_at INTEGER,
        UNIQUE(project_id, name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS source_folders (
        id TEXT PRIMARY KEY,
        source_id TEXT NOT NULL REFERENCES sources(id) ON DELETE CASCADE,
        rel_path TEXT NOT NULL,
        parent_id TEXT REFERENCES source_folders(id) ON DELETE CASCADE,
        depth INTEGER NOT NULL,
        last_seen_at INTEGER NOT NULL,
        UNIQUE(source_id, rel_path)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS source_files (
        id TEXT PRIMARY KEY,
        source_id TEXT NOT NULL REFERENCES sources(id) ON DELETE RESTRICT,
        folder_id TEXT REFERENCES source_folders(id) ON DELETE SET NULL,
        rel_path TEXT NOT NULL,
        ext TEXT,
        size_bytes INTEGER NOT NULL,
        mtime_epoch INTEGER NOT NULL,
        content_hash TEXT,
        status TEXT NOT NULL DEFAULT 'seen',
        last_seen_at INTEGER NOT NULL,
        last_ingested_at INTEGER,
        last_ingest_outcome TEXT NOT NULL DEFAULT 'never',
        error TEXT,
        UNIQUE(source_id, rel_path)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        file_id TEXT NOT NULL REFERENCES source_files(id) ON DELETE CASCADE,
        doc_type TEXT NOT NULL,
        title TEXT NOT NULL,
        body TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        UNIQUE(project_id, file_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS fragments (
        id TEXT PRIMARY KEY,
        document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
        project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        section_label TEXT NOT NULL DEFAULT '',
        fragment_index INTEGER NOT NULL,
        text TEXT NOT NULL,
        hash TEXT NOT NULL,
        metadata_json TEXT NOT NULL DEFAULT '{}',
        embedding BLOB,
        embedding_model TEXT NOT NULL,
        UNIQUE(document_id, fragment_index)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ingest_runs (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        trigger TEXT NOT NULL,
        status TEXT NOT NULL,
        started_at INTEGER NOT NULL,
        finished_at INTEGER,
        stats_json TEXT,
        error TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ingest_run_files (
        run_id TEXT NOT NULL REFERENCES ingest_runs(id) ON DELETE CASCADE,
        file_id TEXT NOT NULL REFERENCES source_files(id) ON DELETE CASCADE,
        action TEXT NOT NULL,
        outcome TEXT NOT NULL,
        reason TEXT,
        error TEXT,
        PRIMARY KEY (run_id, file_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_sources_project ON sources(project_id, name)",
    "CREATE INDEX IF NOT EXISTS idx_files_source_status ON source_files(source_id, status)",
    "CREATE INDEX IF NOT EXISTS idx_fragments_document ON fragments(document_id)",
    "CREATE INDEX IF NOT EXISTS idx_fragments_project ON fragments(project_id)",
    "CREATE INDEX IF NOT EXISTS idx_runs_project_started ON ingest_runs(project_id, started_at DESC)",
];

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Apply the schema to an already open pool.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
