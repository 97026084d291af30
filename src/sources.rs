//! Configured projects and sources.
//!
//! [`register_config`] upserts every project and source named in the
//! configuration into the store so runs can find them by id. Sources that
//! disappear from the configuration are left untouched.

use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::Path;

use kbsync_core::store::Store;

use crate::config::Config;

/// Upsert all configured projects and sources in one transaction.
/// Returns project ids keyed by project name.
pub async fn register_config(
    store: &dyn Store,
    config: &Config,
) -> Result<BTreeMap<String, String>> {
    let now = Utc::now().timestamp();
    let mut ids = BTreeMap::new();

    let mut tx = store.begin().await?;
    for (name, project) in &config.projects {
        let project_id = tx
            .upsert_project(name, project.description.as_deref(), now)
            .await
            .with_context(|| format!("Failed to register project '{}'", name))?;
        for (source_name, source) in &project.sources {
            tx.upsert_source(&project_id, &source.to_spec(source_name))
                .await
                .with_context(|| {
                    format!("Failed to register source '{}.{}'", name, source_name)
                })?;
        }
        ids.insert(name.clone(), project_id);
    }
    tx.commit().await?;

    tracing::debug!(projects = ids.len(), "configuration registered");
    Ok(ids)
}

/// Health of one configured source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceHealth {
    pub project: String,
    pub source: String,
    pub root: String,
    pub enabled: bool,
    pub status: &'static str,
}

impl SourceHealth {
    pub fn healthy(&self) -> bool {
        self.status == "OK"
    }
}

pub fn source_health(config: &Config) -> Vec<SourceHealth> {
    let mut out = Vec::new();
    for (project, project_cfg) in &config.projects {
        for (name, source) in &project_cfg.sources {
            let status = if source.kind != "folder" {
                "UNSUPPORTED KIND"
            } else if !Path::new(&source.root).is_dir() {
                "ROOT MISSING"
            } else {
                "OK"
            };
            out.push(SourceHealth {
                project: project.clone(),
                source: name.clone(),
                root: source.root.display().to_string(),
                enabled: source.enabled,
                status,
            });
        }
    }
    out
}

pub fn list_sources(config: &Config) -> Result<()> {
    let health = source_health(config);
    if health.is_empty() {
        println!("No sources configured.");
        return Ok(());
    }

    println!(
        "{:<16} {:<16} {:<8} {:<18} ROOT",
        "PROJECT", "SOURCE", "ENABLED", "STATUS"
    );
    for h in &health {
        println!(
            "{:<16} {:<16} {:<8} {:<18} {}",
            h.project, h.source, h.enabled, h.status, h.root
        );
    }
    Ok(())
}
