//! TOML configuration parsing and validation.
//!
//! A single file describes the database location, chunking parameters,
//! the embedding slot stamped onto fragments, run settings, and the
//! projects with their named sources:
//!
//! ```toml
//! [db]
//! path = "./data/kbsync.sqlite"
//!
//! [chunking]
//! max_chars = 6000
//! overlap_chars = 300
//!
//! [projects.campaign.sources.notes]
//! root = "/home/gm/notes"
//! include_globs = ["**/*.md"]
//! exclude_globs = ["**/.git/**"]
//! change_detection = "auto"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use kbsync_core::materialize::FragmentSettings;
use kbsync_core::models::{ChangeDetection, SourceSpec};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    6000
}
fn default_overlap_chars() -> usize {
    300
}

/// Embedding slot settings. Vectors are computed elsewhere; fragments only
/// record which model they are meant for.
#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
        }
    }
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Tag recorded on every run started from this configuration.
    #[serde(default = "default_trigger")]
    pub trigger: String,
    /// Upper bound on persisted error text, in characters.
    #[serde(default = "default_max_error_chars")]
    pub max_error_chars: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            trigger: default_trigger(),
            max_error_chars: default_max_error_chars(),
        }
    }
}

fn default_trigger() -> String {
    "cli".to_string()
}
fn default_max_error_chars() -> usize {
    5000
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProjectConfig {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_kind")]
    pub kind: String,
    pub root: PathBuf,
    #[serde(default = "default_true")]
    pub recursive: bool,
    #[serde(default)]
    pub follow_symlinks: bool,
    #[serde(default)]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub change_detection: ChangeDetection,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_kind() -> String {
    "folder".to_string()
}
fn default_true() -> bool {
    true
}

impl SourceConfig {
    pub fn to_spec(&self, name: &str) -> SourceSpec {
        SourceSpec {
            name: name.to_string(),
            kind: self.kind.clone(),
            root_path: self.root.display().to_string(),
            recursive: self.recursive,
            follow_symlinks: self.follow_symlinks,
            include_globs: self.include_globs.clone(),
            exclude_globs: self.exclude_globs.clone(),
            change_detection: self.change_detection,
            enabled: self.enabled,
        }
    }
}

impl Config {
    pub fn fragment_settings(&self) -> FragmentSettings {
        FragmentSettings {
            max_chars: self.chunking.max_chars,
            overlap_chars: self.chunking.overlap_chars,
            embedding_model: self.embedding.model.clone(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.max_chars {
        anyhow::bail!(
            "chunking.overlap_chars ({}) must be < chunking.max_chars ({})",
            config.chunking.overlap_chars,
            config.chunking.max_chars
        );
    }

    if config.ingest.max_error_chars == 0 {
        anyhow::bail!("ingest.max_error_chars must be > 0");
    }

    for (project, project_cfg) in &config.projects {
        for (source, source_cfg) in &project_cfg.sources {
            if source_cfg.root.as_os_str().is_empty() {
                anyhow::bail!("projects.{}.sources.{}.root must not be empty", project, source);
            }
        }
    }

    Ok(config)
}
