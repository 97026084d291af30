//! Run history and audit trail.
//!
//! `kbsync runs <project>` lists recent runs with their counters;
//! `kbsync run <id>` shows one run with every per-file audit row.

use anyhow::{bail, Result};
use serde::Serialize;

use kbsync_core::models::{IngestRun, RunFileEntry};
use kbsync_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::get::format_ts_iso;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Clone, Serialize)]
pub struct RunDetail {
    #[serde(flatten)]
    pub run: IngestRun,
    pub files: Vec<RunFileEntry>,
}

pub async fn recent_runs(store: &dyn Store, project: &str, limit: i64) -> Result<Vec<IngestRun>> {
    let project = match store.find_project_by_name(project).await? {
        Some(p) => p,
        None => bail!("project not found: {}", project),
    };
    store.list_runs(&project.id, limit).await
}

pub async fn run_detail(store: &dyn Store, run_id: &str) -> Result<RunDetail> {
    let run = match store.get_run(run_id).await? {
        Some(run) => run,
        None => bail!("ingest run not found: {}", run_id),
    };
    let files = store.list_run_files(run_id).await?;
    Ok(RunDetail { run, files })
}

pub async fn run_runs(config: &Config, project: &str, limit: i64, json: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let runs = recent_runs(&store, project, limit).await;
    pool.close().await;
    let runs = runs?;

    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }
    if runs.is_empty() {
        println!("No runs recorded for {}.", project);
        return Ok(());
    }

    println!(
        "{:<36}  {:<8} {:<16} {:>6} {:>6} {:>6} {:>6}  {}",
        "RUN", "STATUS", "STARTED", "SEEN", "INGEST", "DELETE", "ERRORS", "TRIGGER"
    );
    println!("{}", "-".repeat(104));
    for run in &runs {
        let (seen, ingested, deleted, errors) = match &run.stats {
            Some(s) => (s.files_seen, s.files_ingested, s.files_deleted, s.errors.len() as u64),
            None => (0, 0, 0, 0),
        };
        println!(
            "{:<36}  {:<8} {:<16} {:>6} {:>6} {:>6} {:>6}  {}",
            run.id,
            run.status,
            format_ts_short(run.started_at),
            seen,
            ingested,
            deleted,
            errors,
            run.trigger
        );
    }
    Ok(())
}

pub async fn run_show(config: &Config, run_id: &str, json: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let detail = run_detail(&store, run_id).await;
    pool.close().await;
    let detail = detail?;

    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    let run = &detail.run;
    println!("--- Run ---");
    println!("id:          {}", run.id);
    println!("status:      {}", run.status);
    println!("trigger:     {}", run.trigger);
    println!("started_at:  {}", format_ts_iso(run.started_at));
    match run.finished_at {
        Some(ts) => println!("finished_at: {}", format_ts_iso(ts)),
        None => println!("finished_at: -"),
    }
    if let Some(stats) = &run.stats {
        println!();
        println!("  sources:   {} / {} scanned", stats.sources_scanned, stats.sources_total);
        println!(
            "  files:     {} seen, {} new, {} changed, {} unchanged, {} deleted",
            stats.files_seen,
            stats.files_new,
            stats.files_changed,
            stats.files_unchanged,
            stats.files_deleted
        );
        println!(
            "  ingested:  {} files ({} documents written, {} skipped), {} deferred",
            stats.files_ingested, stats.docs_ingested, stats.docs_skipped, stats.files_deferred
        );
    }
    if let Some(error) = &run.error {
        println!();
        println!("--- Errors ---");
        println!("{}", error);
    }

    println!();
    println!("--- Files ({}) ---", detail.files.len());
    for f in &detail.files {
        println!(
            "{:<7} {:<6} {:<16} {}{}",
            f.action,
            f.outcome,
            f.reason.as_deref().unwrap_or("-"),
            f.file_id,
            f.error
                .as_deref()
                .map(|e| format!("  ({})", e))
                .unwrap_or_default()
        );
    }
    Ok(())
}

fn format_ts_short(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbsync_core::models::{RunStats, RunStatus};
    use kbsync_core::store::memory::InMemoryStore;

    #[tokio::test]
    async fn runs_are_listed_newest_first() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let project = tx.upsert_project("campaign", None, 1).await.unwrap();
        let first = tx.create_run(&project, "cli", 10).await.unwrap();
        let second = tx.create_run(&project, "cli", 20).await.unwrap();
        tx.finalize_run(&first, RunStatus::Ok, &RunStats::default(), None, 11)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let runs = recent_runs(&store, "campaign", 10).await.unwrap();
        let ids: Vec<&str> = runs.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![second.as_str(), first.as_str()]);
        assert_eq!(recent_runs(&store, "campaign", 1).await.unwrap().len(), 1);
        assert!(recent_runs(&store, "other", 10).await.is_err());

        let detail = run_detail(&store, &first).await.unwrap();
        assert_eq!(detail.run.status, RunStatus::Ok);
        assert!(detail.files.is_empty());
    }

    #[test]
    fn short_timestamp() {
        assert_eq!(format_ts_short(0), "1970-01-01 00:00");
    }
}
