//! Ingestion run coordination.
//!
//! [`synchronize`] performs one run over every enabled source of a project:
//! walk the tree, revalidate folders, classify each included file against
//! its persisted record, materialize new and changed files, soft-delete
//! files that vanished, and finalize the run with aggregated counters.
//!
//! # Transactions
//!
//! | Scope | Contents |
//! |-------|----------|
//! | start | project check, source listing, run creation |
//! | per source | every bookkeeping write for that source |
//! | per file | savepoint around read + materialize |
//! | finish | run finalization |
//!
//! A storage failure inside a source rolls back that source only; the error
//! is recorded and the next source proceeds. A failing file rolls back to
//! its savepoint and is recorded as an `error` outcome.

use std::collections::{HashMap, HashSet};

use anyhow::{bail, Result};
use chrono::Utc;
use tracing::{debug, info, warn};

use kbsync_core::change::{classify, Classification, Observed, Prior, Verdict};
use kbsync_core::glob::PathFilter;
use kbsync_core::materialize::{materialize, DocumentInput, FragmentSettings, Materialized};
use kbsync_core::models::{
    ActionOutcome, FileRecord, FileStatus, FileUpsert, FolderUpsert, IngestOutcome, RunAction,
    RunFileEntry, RunResult, RunStats, RunStatus, Source,
};
use kbsync_core::store::{Store, StoreTx};

use crate::config::Config;
use crate::connector_fs::{self, DirListing, FileEntry, TreeWalker};
use crate::db;
use crate::migrate;
use crate::progress::{ProgressMode, SyncProgressEvent, SyncProgressReporter};
use crate::sources::register_config;
use crate::sqlite_store::SqliteStore;

const FILE_SAVEPOINT: &str = "ingest_file";
const PROGRESS_EVERY: u64 = 100;

/// Per-invocation switches.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Classify and count without persisting file, folder, document or
    /// audit changes.
    pub dry_run: bool,
    /// Hash every file under hash-confirming modes, even when size and
    /// mtime match.
    pub force_rehash: bool,
    /// Upper bound on ingest attempts in this run. Further files are
    /// deferred to a later run.
    pub max_files: Option<usize>,
}

/// Settings that stay fixed across runs.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub fragments: FragmentSettings,
    pub trigger: String,
    pub max_error_chars: usize,
}

impl RunSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            fragments: config.fragment_settings(),
            trigger: config.ingest.trigger.clone(),
            max_error_chars: config.ingest.max_error_chars,
        }
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            fragments: FragmentSettings::default(),
            trigger: "api".to_string(),
            max_error_chars: 5000,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The project does not exist; no run was recorded.
    #[error("project not found: {0}")]
    ProjectNotFound(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

fn now() -> i64 {
    Utc::now().timestamp()
}

/// Run one synchronization of `project_id`.
///
/// Returns [`SyncError::ProjectNotFound`] before anything is written when
/// the project is unknown. Source and file failures never surface here:
/// they are collected into the returned stats and degrade the status to
/// [`RunStatus::Partial`].
pub async fn synchronize(
    store: &dyn Store,
    settings: &RunSettings,
    project_id: &str,
    opts: &SyncOptions,
    progress: &dyn SyncProgressReporter,
) -> Result<RunResult, SyncError> {
    let started_at = now();

    let mut tx = store.begin().await?;
    if !tx.project_exists(project_id).await? {
        return Err(SyncError::ProjectNotFound(project_id.to_string()));
    }
    let sources = tx.list_enabled_sources(project_id).await?;
    let run_id = tx
        .create_run(project_id, &settings.trigger, started_at)
        .await?;
    tx.commit().await?;

    info!(
        run_id = %run_id,
        project_id,
        sources = sources.len(),
        dry_run = opts.dry_run,
        "sync started"
    );

    let mut run = Coordinator {
        settings,
        opts,
        project_id,
        run_id: run_id.clone(),
        progress,
        attempts: 0,
        errors: Vec::new(),
    };
    let mut stats = RunStats {
        sources_total: sources.len() as u64,
        ..RunStats::default()
    };

    for source in &sources {
        progress.report(SyncProgressEvent::Scanning {
            source: source.name.clone(),
        });
        let mut counts = RunStats::default();
        let attempts_before = run.attempts;
        match run.sync_source(store, source, &mut counts).await {
            Ok(scanned) => {
                absorb(&mut stats, &counts);
                if scanned {
                    stats.sources_scanned += 1;
                }
            }
            Err(e) => {
                run.record_error(format!("source {}: {:#}", source.name, e));
                run.attempts = attempts_before;
                counts = RunStats::default();
            }
        }
        info!(
            source = %source.name,
            seen = counts.files_seen,
            ingested = counts.files_ingested,
            deleted = counts.files_deleted,
            "source done"
        );
        progress.report(SyncProgressEvent::SourceDone {
            source: source.name.clone(),
            seen: counts.files_seen,
            ingested: counts.files_ingested,
            deleted: counts.files_deleted,
        });
    }

    stats.errors = std::mem::take(&mut run.errors);
    let status = if stats.errors.is_empty() {
        RunStatus::Ok
    } else {
        RunStatus::Partial
    };
    let error_text = if stats.errors.is_empty() {
        None
    } else {
        Some(truncate_chars(
            &stats.errors.join("\n"),
            settings.max_error_chars,
        ))
    };

    let finalized = finalize(store, &run_id, status, &stats, error_text.as_deref()).await;
    if let Err(e) = finalized {
        warn!(run_id = %run_id, error = %format!("{:#}", e), "finalize failed; retrying once");
        finalize(store, &run_id, status, &stats, error_text.as_deref()).await?;
    }

    info!(
        run_id = %run_id,
        status = %status,
        files_seen = stats.files_seen,
        files_ingested = stats.files_ingested,
        errors = stats.errors.len(),
        "sync finished"
    );
    progress.report(SyncProgressEvent::Finished {
        run_id: run_id.clone(),
        status,
    });

    Ok(RunResult {
        run_id,
        status,
        stats,
    })
}

/// CLI entry point: register the configuration, synchronize `project`
/// and print a summary (or the full result as JSON).
pub async fn run_sync(
    config: &Config,
    project: &str,
    opts: &SyncOptions,
    progress: ProgressMode,
    json: bool,
) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::migrate_pool(&pool).await?;
    let store = SqliteStore::new(pool.clone());

    let outcome = async {
        let ids = register_config(&store, config).await?;
        let project_id = match ids.get(project) {
            Some(id) => id.clone(),
            None => match store.find_project_by_name(project).await? {
                Some(p) => p.id,
                None => bail!("project not found: {}", project),
            },
        };
        let reporter = progress.reporter();
        let settings = RunSettings::from_config(config);
        let result = synchronize(&store, &settings, &project_id, opts, reporter.as_ref()).await?;
        Ok::<RunResult, anyhow::Error>(result)
    }
    .await;
    pool.close().await;
    let result = outcome?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(project, opts, &result);
    }
    Ok(())
}

fn print_summary(project: &str, opts: &SyncOptions, result: &RunResult) {
    let s = &result.stats;
    if opts.dry_run {
        println!("sync {} (dry-run)", project);
    } else {
        println!("sync {}", project);
    }
    println!("  run: {}", result.run_id);
    println!("  sources scanned: {} / {}", s.sources_scanned, s.sources_total);
    println!(
        "  files seen: {} (new {}, changed {}, unchanged {})",
        s.files_seen, s.files_new, s.files_changed, s.files_unchanged
    );
    println!("  files deleted: {}", s.files_deleted);
    println!(
        "  files ingested: {} (documents written {}, skipped {})",
        s.files_ingested, s.docs_ingested, s.docs_skipped
    );
    if s.files_deferred > 0 {
        println!("  files deferred: {}", s.files_deferred);
    }
    if !s.errors.is_empty() {
        println!("  errors: {}", s.errors.len());
        for e in &s.errors {
            println!("    - {}", e);
        }
    }
    println!("{}", result.status);
}

async fn finalize(
    store: &dyn Store,
    run_id: &str,
    status: RunStatus,
    stats: &RunStats,
    error: Option<&str>,
) -> Result<()> {
    let mut tx = store.begin().await?;
    tx.finalize_run(run_id, status, stats, error, now()).await?;
    tx.commit().await
}

fn absorb(total: &mut RunStats, part: &RunStats) {
    total.files_seen += part.files_seen;
    total.files_new += part.files_new;
    total.files_changed += part.files_changed;
    total.files_unchanged += part.files_unchanged;
    total.files_deleted += part.files_deleted;
    total.files_ingested += part.files_ingested;
    total.files_deferred += part.files_deferred;
    total.docs_ingested += part.docs_ingested;
    total.docs_skipped += part.docs_skipped;
}

/// Truncate to at most `max` characters, never splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte, _)) => text[..byte].to_string(),
        None => text.to_string(),
    }
}

fn parent_of(rel_path: &str) -> &str {
    rel_path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

/// What to do with a present file after classification.
enum Plan {
    Keep,
    Ingest { reason: &'static str },
    Defer,
}

struct Coordinator<'a> {
    settings: &'a RunSettings,
    opts: &'a SyncOptions,
    project_id: &'a str,
    run_id: String,
    progress: &'a dyn SyncProgressReporter,
    /// Ingest attempts made so far; compared against `max_files`.
    attempts: usize,
    errors: Vec<String>,
}

/// Per-source walk state.
struct SourceScan<'s> {
    source: &'s Source,
    filter: PathFilter,
    prior_files: HashMap<String, FileRecord>,
    folder_ids: HashMap<String, String>,
    present: HashSet<String>,
}

impl<'a> Coordinator<'a> {
    fn record_error(&mut self, message: String) {
        let message = truncate_chars(&message, self.settings.max_error_chars);
        warn!(run_id = %self.run_id, "{}", message);
        self.errors.push(message);
    }

    /// Returns `Ok(false)` when the source was skipped with a recorded error.
    async fn sync_source(
        &mut self,
        store: &dyn Store,
        source: &Source,
        counts: &mut RunStats,
    ) -> Result<bool> {
        let mut tx = store.begin().await?;
        let scanned = self.scan_source(tx.as_mut(), source, counts).await?;
        tx.commit().await?;
        Ok(scanned)
    }

    async fn scan_source(
        &mut self,
        tx: &mut dyn StoreTx,
        source: &Source,
        counts: &mut RunStats,
    ) -> Result<bool> {
        tx.stamp_source_scan(&source.id, now()).await?;

        if source.kind != "folder" {
            self.record_error(format!(
                "source {}: unsupported source kind '{}'",
                source.name, source.kind
            ));
            return Ok(false);
        }
        let walker = TreeWalker::for_source(source);
        if !walker.root_exists() {
            self.record_error(format!(
                "source {}: root not found: {}",
                source.name, source.root_path
            ));
            return Ok(false);
        }

        info!(source = %source.name, root = %source.root_path, "scanning source");

        let mut scan = SourceScan {
            source,
            filter: PathFilter::new(&source.include_globs, &source.exclude_globs),
            prior_files: tx
                .list_files(&source.id)
                .await?
                .into_iter()
                .map(|f| (f.rel_path.clone(), f))
                .collect(),
            folder_ids: tx
                .list_folders(&source.id)
                .await?
                .into_iter()
                .map(|f| (f.rel_path, f.id))
                .collect(),
            present: HashSet::new(),
        };

        let mut walk_complete = true;
        for listing in walker.walk() {
            let listing = match listing {
                Ok(listing) => listing,
                Err(e) => {
                    self.record_error(format!("source {}: {:#}", source.name, e));
                    walk_complete = false;
                    continue;
                }
            };
            for name in &listing.unreadable_names {
                self.record_error(format!(
                    "source {}: skipping non-UTF-8 name: {}",
                    source.name, name
                ));
            }
            let folder_id = self.revalidate_folder(tx, &mut scan, &listing).await?;
            for entry in &listing.files {
                if !scan.filter.is_included(&entry.rel_path) {
                    continue;
                }
                self.process_file(tx, &mut scan, folder_id.as_deref(), entry, counts)
                    .await?;
                if counts.files_seen > 0 && counts.files_seen % PROGRESS_EVERY == 0 {
                    self.progress.report(SyncProgressEvent::Files {
                        source: source.name.clone(),
                        seen: counts.files_seen,
                        ingested: counts.files_ingested,
                    });
                }
            }
        }

        if walk_complete {
            self.reconcile_deletions(tx, &scan, counts).await?;
        } else {
            warn!(source = %source.name, "walk incomplete; skipping deletion pass");
        }

        if !self.opts.dry_run {
            tx.stamp_source_ingest(&source.id, now()).await?;
        }
        Ok(true)
    }

    /// Ensure a folder row exists for `listing` and return its id. In a dry
    /// run only already-known folders have an id.
    async fn revalidate_folder(
        &mut self,
        tx: &mut dyn StoreTx,
        scan: &mut SourceScan<'_>,
        listing: &DirListing,
    ) -> Result<Option<String>> {
        let existing = scan.folder_ids.get(&listing.rel_path).cloned();
        if self.opts.dry_run {
            return Ok(existing);
        }
        if let Some(id) = existing {
            tx.touch_folder(&id, now()).await?;
            return Ok(Some(id));
        }

        let parent_id = if listing.rel_path.is_empty() {
            None
        } else {
            scan.folder_ids
                .get(parent_of(&listing.rel_path))
                .or_else(|| scan.folder_ids.get(""))
                .cloned()
        };
        let id = tx
            .upsert_folder(&FolderUpsert {
                source_id: &scan.source.id,
                rel_path: &listing.rel_path,
                parent_id: parent_id.as_deref(),
                depth: listing.depth,
                seen_at: now(),
            })
            .await?;
        scan.folder_ids.insert(listing.rel_path.clone(), id.clone());
        Ok(Some(id))
    }

    async fn process_file(
        &mut self,
        tx: &mut dyn StoreTx,
        scan: &mut SourceScan<'_>,
        folder_id: Option<&str>,
        entry: &FileEntry,
        counts: &mut RunStats,
    ) -> Result<()> {
        let source = scan.source;
        let observed = match connector_fs::stat_file(&entry.abs_path) {
            Ok(observed) => observed,
            Err(e) => {
                self.record_error(format!("source {}: {:#}", source.name, e));
                return Ok(());
            }
        };
        scan.present.insert(entry.rel_path.clone());
        counts.files_seen += 1;

        // A soft-deleted row compares as absent so a returning file is new.
        let record = scan.prior_files.get(&entry.rel_path);
        let prior = record
            .filter(|r| r.status == FileStatus::Seen)
            .map(|r| Prior {
                size_bytes: r.size_bytes,
                mtime_epoch: r.mtime_epoch,
                content_hash: r.content_hash.as_deref(),
            });

        let hashed = classify(
            source.change_detection,
            self.opts.force_rehash,
            observed,
            prior.as_ref(),
            || connector_fs::hash_file(&entry.abs_path),
        );
        let classification = match hashed {
            Ok(c) => c,
            Err(e) => {
                let verdict = if prior.is_some() {
                    Verdict::Changed
                } else {
                    Verdict::New
                };
                count_verdict(counts, verdict);
                let message = format!("{}: {:#}", entry.rel_path, e);
                return self
                    .fail_unhashed(tx, scan, folder_id, entry, verdict, observed, message)
                    .await;
            }
        };
        count_verdict(counts, classification.verdict);

        let prior_outcome = record.map(|r| r.last_ingest_outcome);
        let retry = classification.verdict == Verdict::Unchanged
            && matches!(
                prior_outcome,
                Some(IngestOutcome::Never | IngestOutcome::Error)
            );
        let plan = match (classification.verdict, retry) {
            (Verdict::Unchanged, false) => Plan::Keep,
            // Failed files are retried outside the cap.
            (Verdict::Unchanged, true) if prior_outcome == Some(IngestOutcome::Error) => {
                Plan::Ingest { reason: "retry" }
            }
            (verdict, _) => {
                let reason = match verdict {
                    Verdict::New => "new",
                    Verdict::Changed => "changed",
                    Verdict::Unchanged => "retry",
                };
                match self.opts.max_files {
                    Some(max) if self.attempts >= max => Plan::Defer,
                    _ => {
                        self.attempts += 1;
                        Plan::Ingest { reason }
                    }
                }
            }
        };

        debug!(
            source = %source.name,
            path = %entry.rel_path,
            verdict = classification.verdict.as_str(),
            "classified"
        );

        if matches!(plan, Plan::Defer) {
            counts.files_deferred += 1;
        }
        if self.opts.dry_run {
            return Ok(());
        }

        let file_id = self
            .upsert_file_row(tx, scan, folder_id, entry, &classification, &plan, observed)
            .await?;

        if let Plan::Ingest { reason } = plan {
            self.ingest_file(tx, &file_id, entry, reason, counts).await?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn upsert_file_row(
        &mut self,
        tx: &mut dyn StoreTx,
        scan: &SourceScan<'_>,
        folder_id: Option<&str>,
        entry: &FileEntry,
        classification: &Classification,
        plan: &Plan,
        observed: Observed,
    ) -> Result<String> {
        let record = scan.prior_files.get(&entry.rel_path);
        let ext = connector_fs::extension_of(&entry.rel_path);

        // A deferred change keeps the old fingerprint so the next run
        // still sees it as changed.
        let keep_prior = matches!(plan, Plan::Defer)
            && classification.verdict == Verdict::Changed
            && record.is_some();
        let (size_bytes, mtime_epoch, content_hash) = match record {
            Some(r) if keep_prior => (r.size_bytes, r.mtime_epoch, r.content_hash.clone()),
            _ => {
                let prior = record
                    .filter(|r| r.status == FileStatus::Seen)
                    .map(|r| Prior {
                        size_bytes: r.size_bytes,
                        mtime_epoch: r.mtime_epoch,
                        content_hash: r.content_hash.as_deref(),
                    });
                (
                    observed.size_bytes,
                    observed.mtime_epoch,
                    classification.persisted_hash(prior.as_ref()),
                )
            }
        };

        tx.upsert_file(&FileUpsert {
            source_id: &scan.source.id,
            folder_id,
            rel_path: &entry.rel_path,
            ext: ext.as_deref(),
            size_bytes,
            mtime_epoch,
            content_hash: content_hash.as_deref(),
            seen_at: now(),
        })
        .await
    }

    /// Hashing failed after a successful stat: the file is present but its
    /// content could not be read.
    #[allow(clippy::too_many_arguments)]
    async fn fail_unhashed(
        &mut self,
        tx: &mut dyn StoreTx,
        scan: &SourceScan<'_>,
        folder_id: Option<&str>,
        entry: &FileEntry,
        verdict: Verdict,
        observed: Observed,
        message: String,
    ) -> Result<()> {
        let message = truncate_chars(&message, self.settings.max_error_chars);
        self.record_error(message.clone());
        if self.opts.dry_run {
            return Ok(());
        }

        let record = scan.prior_files.get(&entry.rel_path);
        let (size_bytes, mtime_epoch, content_hash) = match record {
            Some(r) if verdict == Verdict::Changed => {
                (r.size_bytes, r.mtime_epoch, r.content_hash.clone())
            }
            _ => (observed.size_bytes, observed.mtime_epoch, None),
        };
        let ext = connector_fs::extension_of(&entry.rel_path);
        let file_id = tx
            .upsert_file(&FileUpsert {
                source_id: &scan.source.id,
                folder_id,
                rel_path: &entry.rel_path,
                ext: ext.as_deref(),
                size_bytes,
                mtime_epoch,
                content_hash: content_hash.as_deref(),
                seen_at: now(),
            })
            .await?;
        tx.record_ingest_outcome(&file_id, IngestOutcome::Error, Some(&message), now())
            .await?;
        tx.upsert_run_file(&RunFileEntry {
            run_id: self.run_id.clone(),
            file_id,
            action: RunAction::Ingest,
            outcome: ActionOutcome::Error,
            reason: Some(verdict.as_str().to_string()),
            error: Some(message),
        })
        .await
    }

    async fn ingest_file(
        &mut self,
        tx: &mut dyn StoreTx,
        file_id: &str,
        entry: &FileEntry,
        reason: &'static str,
        counts: &mut RunStats,
    ) -> Result<()> {
        tx.savepoint(FILE_SAVEPOINT).await?;
        let attempt = self.materialize_file(tx, file_id, entry).await;

        let (outcome, error) = match attempt {
            Ok(done) => {
                tx.release_savepoint(FILE_SAVEPOINT).await?;
                let outcome = match done {
                    Materialized::Ingested { .. } => {
                        counts.files_ingested += 1;
                        counts.docs_ingested += 1;
                        IngestOutcome::Ok
                    }
                    Materialized::Skipped { .. } => {
                        counts.docs_skipped += 1;
                        IngestOutcome::Skipped
                    }
                };
                (outcome, None)
            }
            Err(e) => {
                tx.rollback_to_savepoint(FILE_SAVEPOINT).await?;
                tx.release_savepoint(FILE_SAVEPOINT).await?;
                let message = truncate_chars(
                    &format!("{}: {:#}", entry.rel_path, e),
                    self.settings.max_error_chars,
                );
                self.record_error(message.clone());
                (IngestOutcome::Error, Some(message))
            }
        };

        tx.record_ingest_outcome(file_id, outcome, error.as_deref(), now())
            .await?;
        tx.upsert_run_file(&RunFileEntry {
            run_id: self.run_id.clone(),
            file_id: file_id.to_string(),
            action: RunAction::Ingest,
            outcome: if error.is_some() {
                ActionOutcome::Error
            } else {
                ActionOutcome::Ok
            },
            reason: Some(reason.to_string()),
            error,
        })
        .await
    }

    async fn materialize_file(
        &self,
        tx: &mut dyn StoreTx,
        file_id: &str,
        entry: &FileEntry,
    ) -> Result<Materialized> {
        let body = connector_fs::read_text(&entry.abs_path)?;
        let ext = connector_fs::extension_of(&entry.rel_path);
        let title = connector_fs::title_of(&entry.rel_path);
        let doc_type = connector_fs::doc_type_for(ext.as_deref());
        materialize(
            tx,
            &self.settings.fragments,
            &DocumentInput {
                project_id: self.project_id,
                file_id,
                title: &title,
                doc_type: &doc_type,
                body: &body,
            },
            now(),
        )
        .await
    }

    async fn reconcile_deletions(
        &mut self,
        tx: &mut dyn StoreTx,
        scan: &SourceScan<'_>,
        counts: &mut RunStats,
    ) -> Result<()> {
        let mut vanished: Vec<&FileRecord> = scan
            .prior_files
            .values()
            .filter(|f| f.status == FileStatus::Seen && !scan.present.contains(&f.rel_path))
            .collect();
        vanished.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));

        for file in vanished {
            counts.files_deleted += 1;
            debug!(source = %scan.source.name, path = %file.rel_path, "missing on disk");
            if self.opts.dry_run {
                continue;
            }
            tx.mark_file_deleted(&file.id, now()).await?;
            tx.upsert_run_file(&RunFileEntry {
                run_id: self.run_id.clone(),
                file_id: file.id.clone(),
                action: RunAction::Delete,
                outcome: ActionOutcome::Ok,
                reason: Some("missing on disk".to_string()),
                error: None,
            })
            .await?;
        }
        Ok(())
    }
}

fn count_verdict(counts: &mut RunStats, verdict: Verdict) {
    match verdict {
        Verdict::New => counts.files_new += 1,
        Verdict::Changed => counts.files_changed += 1,
        Verdict::Unchanged => counts.files_unchanged += 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn parent_of_nested_and_top_level() {
        assert_eq!(parent_of("a/b/c"), "a/b");
        assert_eq!(parent_of("a"), "");
    }

    #[test]
    fn absorb_sums_counters_but_not_errors() {
        let mut total = RunStats {
            files_seen: 2,
            ..RunStats::default()
        };
        let part = RunStats {
            files_seen: 3,
            files_deleted: 1,
            errors: vec!["x".to_string()],
            ..RunStats::default()
        };
        absorb(&mut total, &part);
        assert_eq!(total.files_seen, 5);
        assert_eq!(total.files_deleted, 1);
        assert!(total.errors.is_empty());
    }
}
